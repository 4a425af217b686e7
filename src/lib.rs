// cglib-winsys/src/lib.rs
//
//! Windowing-system backends and swap-chain presentation for CGlib.
//!
//! A [`Renderer`] connects to exactly one platform windowing system (KMS/DRM, X11, Wayland,
//! Android or a headless "null" display), all of which render through EGL. A [`Display`] owns the
//! GPU context for that renderer, and each [`Onscreen`] is a presentable swap-chain target bound to
//! a native window or surface. Buffer presentation is asynchronous on the backends that support
//! it; completion is reported back as SYNC and COMPLETE [`FrameEvent`]s, delivered only from the
//! renderer's event loop dispatch so callbacks always run at a well-defined point.
//!
//! The crate is single-threaded: every handle is reference counted with `Rc` and must stay on the
//! thread that created it.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

pub mod platform;
pub use crate::platform::generic::egl::api::EglApi;
pub use crate::platform::{Backend, NativePlatform, Platform, WinsysId};

pub mod error;
pub use crate::error::{Error, ErrorKind, WindowingApiError};

mod closure;
pub use crate::closure::ClosureHandle;

mod display;
pub use crate::display::Display;

mod event_loop;
pub use crate::event_loop::{PollFd, PollFdEvents, PollInfo};

mod frame_info;
pub use crate::frame_info::{FrameEvent, FrameInfo};

mod info;
pub use crate::info::{DisplayFeatures, FeatureFlags, WinsysFeatureFlags};

mod onscreen;
pub use crate::onscreen::{Onscreen, WeakOnscreen};

mod renderer;
pub use crate::renderer::{Driver, Renderer, RendererConstraint};

mod template;
pub use crate::template::{FramebufferConfig, OnscreenTemplate};

/// Integer rectangles used for damage and dirty regions, in window coordinates with the origin
/// at the top left.
pub type Rect = euclid::default::Rect<i32>;

#[allow(non_camel_case_types, dead_code, clippy::all)]
pub mod egl {
    //! Raw EGL bindings generated at build time.

    use std::os::raw::{c_long, c_void};
    pub type khronos_utime_nanoseconds_t = khronos_uint64_t;
    pub type khronos_uint64_t = u64;
    pub type khronos_ssize_t = c_long;
    pub type EGLint = i32;
    pub type EGLNativeDisplayType = *const c_void;
    pub type EGLNativePixmapType = *const c_void;
    pub type EGLNativeWindowType = *const c_void;
    pub type NativeDisplayType = EGLNativeDisplayType;
    pub type NativePixmapType = EGLNativePixmapType;
    pub type NativeWindowType = EGLNativeWindowType;
    include!(concat!(env!("OUT_DIR"), "/egl_bindings.rs"));
}

#[cfg(test)]
mod tests;
