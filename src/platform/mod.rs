// cglib-winsys/src/platform/mod.rs
//
//! Platform-specific backends.
//!
//! Every backend renders through the shared EGL layer in [`generic::egl`]. The backends differ in
//! how they obtain the native display, how they create surfaces, and how presentation completes.
//! Those differences are expressed as the hooks of the crate-private `WinsysBackend` trait, whose
//! default methods are the plain EGL behavior.

pub mod generic;

pub mod android;
pub mod null;
pub mod unix;

use crate::egl::types::{EGLConfig, EGLint};
use crate::event_loop::MainLoop;
use crate::info::DisplayFeatures;
use crate::onscreen::{Onscreen, OnscreenInner};
use crate::renderer::{Renderer, RendererConstraint};
use crate::template::FramebufferConfig;
use crate::{Error, Rect};
use self::generic::egl::api::EglApi;
use self::generic::egl::{surface, EglDisplay, EglOnscreen, EglRenderer};
use self::null::{FixedSurfaceDisplay, FixedSurfaceRenderer};
use self::unix::kms::drm::DrmDevice;
use self::unix::kms::gbm::GbmDevice;
use self::unix::kms::{KmsDisplay, KmsOnscreen, KmsRenderer};
use self::unix::wayland::client::WaylandClient;
use self::unix::wayland::{WaylandDisplay, WaylandOnscreen, WaylandRenderer};
use self::unix::x11::client::XlibClient;
use self::unix::x11::{XlibDisplay, XlibOnscreen, XlibRenderer};

use std::env;
use std::fs::OpenOptions;
use std::io;
use std::os::raw::c_void;
use std::os::unix::io::{OwnedFd, RawFd};
use std::ptr::NonNull;
use std::rc::Rc;

/// Identifies a windowing system backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WinsysId {
    /// Direct scanout through KMS/DRM with GBM buffers.
    Kms,
    /// X11 windows through Xlib.
    X11,
    /// Wayland surfaces through `wl_shell`.
    Wayland,
    /// An Android `ANativeWindow`.
    Android,
    /// A single headless or framebuffer-device surface.
    Null,
}

impl WinsysId {
    /// The order backends are tried in when none is requested.
    pub(crate) const PROBE_ORDER: [WinsysId; 5] =
        [WinsysId::X11, WinsysId::Wayland, WinsysId::Kms, WinsysId::Android, WinsysId::Null];

    /// The name accepted by the `CG_RENDERER` environment variable.
    pub fn name(self) -> &'static str {
        match self {
            WinsysId::Kms => "EGL_KMS",
            WinsysId::X11 => "EGL_XLIB",
            WinsysId::Wayland => "EGL_WAYLAND",
            WinsysId::Android => "EGL_ANDROID",
            WinsysId::Null => "EGL_NULL",
        }
    }

    /// Looks up a backend by its [`WinsysId::name`], ignoring case.
    pub fn from_name(name: &str) -> Option<WinsysId> {
        WinsysId::PROBE_ORDER.iter().cloned().find(|id| id.name().eq_ignore_ascii_case(name))
    }

    pub(crate) fn constraints(self) -> RendererConstraint {
        let common = RendererConstraint::USES_EGL | RendererConstraint::SUPPORTS_GLES2;
        match self {
            WinsysId::X11 => common | RendererConstraint::USES_X11 | RendererConstraint::USES_XLIB,
            WinsysId::Kms | WinsysId::Wayland | WinsysId::Android | WinsysId::Null => common,
        }
    }
}

/// An explicit request for one backend, with the native handles it needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// KMS on a DRM device. With no fd, `/dev/dri/card0` is opened and closed again on
    /// disconnect; a supplied fd is never closed.
    Kms { fd: Option<RawFd> },
    /// X11, on an application-owned `Display *` or a newly opened one.
    X11 { foreign_display: Option<NonNull<c_void>> },
    /// Wayland, on an application-owned `wl_display *` or a newly connected one. With
    /// `event_dispatch` off the application must dispatch the display itself.
    Wayland { foreign_display: Option<NonNull<c_void>>, event_dispatch: bool },
    /// Android, rendering into the given `ANativeWindow *`.
    Android { native_window: NonNull<c_void> },
    /// The null backend.
    Null,
}

impl Backend {
    pub fn winsys_id(&self) -> WinsysId {
        match *self {
            Backend::Kms { .. } => WinsysId::Kms,
            Backend::X11 { .. } => WinsysId::X11,
            Backend::Wayland { .. } => WinsysId::Wayland,
            Backend::Android { .. } => WinsysId::Android,
            Backend::Null => WinsysId::Null,
        }
    }
}

/// Access to the native libraries and the operating system.
///
/// [`NativePlatform`] is used unless a renderer is created with
/// [`crate::Renderer::with_platform`]. Backends that the platform can't provide fail to connect
/// with [`Error::Init`].
pub trait Platform {
    fn egl(&self) -> Result<Rc<dyn EglApi>, Error>;

    fn env_var(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }

    /// Opens a device node for reading and writing.
    fn open_device(&self, path: &str) -> io::Result<OwnedFd> {
        Ok(OpenOptions::new().read(true).write(true).open(path)?.into())
    }

    fn drm_device(&self, _fd: RawFd) -> Result<Rc<dyn DrmDevice>, Error> {
        Err(Error::Init("KMS is not supported on this platform".to_owned()))
    }

    fn gbm_device(&self, _fd: RawFd) -> Result<Rc<dyn GbmDevice>, Error> {
        Err(Error::Init("GBM is not supported on this platform".to_owned()))
    }

    fn wayland_client(&self, _foreign_display: Option<NonNull<c_void>>)
                      -> Result<Rc<dyn WaylandClient>, Error> {
        Err(Error::Init("Wayland is not supported on this platform".to_owned()))
    }

    fn xlib_client(&self, _foreign_display: Option<NonNull<c_void>>)
                   -> Result<Rc<dyn XlibClient>, Error> {
        Err(Error::Init("Xlib is not supported on this platform".to_owned()))
    }

    /// Sets the pixel format of an Android native window's buffers.
    fn set_native_window_format(&self, _window: NonNull<c_void>, _format: EGLint)
                                -> Result<(), Error> {
        Ok(())
    }
}

/// The system libraries: `libEGL`, `libwayland-client` and Xlib, plus DRM and GBM on the open device.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativePlatform;

impl Platform for NativePlatform {
    fn egl(&self) -> Result<Rc<dyn EglApi>, Error> {
        Ok(Rc::new(generic::egl::device::NativeEgl::load()?))
    }

    #[cfg(linux)]
    fn drm_device(&self, fd: RawFd) -> Result<Rc<dyn DrmDevice>, Error> {
        Ok(Rc::new(unix::kms::device::NativeDrmDevice::new(fd)?))
    }

    #[cfg(linux)]
    fn gbm_device(&self, fd: RawFd) -> Result<Rc<dyn GbmDevice>, Error> {
        Ok(Rc::new(unix::kms::device::NativeGbmDevice::new(fd)?))
    }

    #[cfg(linux)]
    fn wayland_client(&self, foreign_display: Option<NonNull<c_void>>)
                      -> Result<Rc<dyn WaylandClient>, Error> {
        Ok(Rc::new(unix::wayland::native::NativeWaylandClient::connect(foreign_display)?))
    }

    #[cfg(x11)]
    fn xlib_client(&self, foreign_display: Option<NonNull<c_void>>)
                   -> Result<Rc<dyn XlibClient>, Error> {
        Ok(Rc::new(unix::x11::native::NativeXlibClient::open(foreign_display)?))
    }

    #[cfg(android)]
    fn set_native_window_format(&self, window: NonNull<c_void>, format: EGLint)
                                -> Result<(), Error> {
        android::ffi::set_buffers_geometry(window, format)
    }
}

pub(crate) enum RendererBackendState {
    Kms(KmsRenderer),
    X11(XlibRenderer),
    Wayland(WaylandRenderer),
    Android(FixedSurfaceRenderer),
    Null(FixedSurfaceRenderer),
}

pub(crate) enum DisplayBackendState {
    None,
    Kms(KmsDisplay),
    X11(XlibDisplay),
    Wayland(WaylandDisplay),
    Fixed(FixedSurfaceDisplay),
}

pub(crate) enum OnscreenBackendState {
    Kms(KmsOnscreen),
    X11(XlibOnscreen),
    Wayland(WaylandOnscreen),
    Fixed,
}

/// A connected backend. EGL is terminated before the backend state is dropped.
pub(crate) struct WinsysRenderer {
    pub(crate) egl: EglRenderer,
    pub(crate) backend: RendererBackendState,
}

impl WinsysRenderer {
    pub(crate) fn connect(renderer: &Renderer, id: WinsysId) -> Result<WinsysRenderer, Error> {
        match id {
            WinsysId::Kms => KmsRenderer::connect(renderer),
            WinsysId::X11 => XlibRenderer::connect(renderer),
            WinsysId::Wayland => WaylandRenderer::connect(renderer),
            WinsysId::Android => android::connect(renderer),
            WinsysId::Null => null::connect(renderer),
        }
    }

    pub(crate) fn id(&self) -> WinsysId {
        match self.backend {
            RendererBackendState::Kms(_) => WinsysId::Kms,
            RendererBackendState::X11(_) => WinsysId::X11,
            RendererBackendState::Wayland(_) => WinsysId::Wayland,
            RendererBackendState::Android(_) => WinsysId::Android,
            RendererBackendState::Null(_) => WinsysId::Null,
        }
    }

    pub(crate) fn backend(&self) -> &dyn WinsysBackend {
        match self.backend {
            RendererBackendState::Kms(ref kms) => kms,
            RendererBackendState::X11(ref xlib) => xlib,
            RendererBackendState::Wayland(ref wayland) => wayland,
            RendererBackendState::Android(ref fixed) | RendererBackendState::Null(ref fixed) => {
                fixed
            }
        }
    }
}

/// Per-backend hooks around the shared EGL implementation.
pub(crate) trait WinsysBackend {
    /// Unregisters event sources. EGL itself is terminated when the renderer state drops.
    fn disconnect(&self, _main_loop: &MainLoop) {}

    /// Attributes placed ahead of the generic ones when choosing a config.
    fn add_config_attributes(&self, _config: &FramebufferConfig, _attributes: &mut Vec<EGLint>) {
    }

    /// Runs before the context is created.
    fn display_setup(&self, _egl: &EglRenderer) -> Result<DisplayBackendState, Error> {
        Ok(DisplayBackendState::None)
    }

    /// Runs last when a display is torn down, after the context is gone.
    fn display_destroy(&self, _egl: &EglRenderer, _display: &mut EglDisplay) {}

    /// Runs once the context exists; typically binds a dummy surface.
    fn context_created(&self, _egl: &EglRenderer, _display: &mut EglDisplay)
                       -> Result<(), Error> {
        Ok(())
    }

    /// Releases whatever `context_created` made.
    fn cleanup_context(&self, _egl: &EglRenderer, _display: &mut EglDisplay) {}

    /// Adds backend features once the display is set up.
    fn display_init(&self, _egl: &EglRenderer, _display: &EglDisplay,
                    _features: &mut DisplayFeatures) {
    }

    fn onscreen_init(&self,
                     egl: &EglRenderer,
                     display: &mut EglDisplay,
                     onscreen: &Onscreen,
                     config: EGLConfig)
                     -> Result<EglOnscreen, Error>;

    /// Runs after the onscreen's EGL surface has been destroyed.
    fn onscreen_deinit(&self,
                       _egl: &EglRenderer,
                       _display: &mut EglDisplay,
                       _onscreen: &OnscreenInner,
                       _egl_onscreen: &mut EglOnscreen) {
    }

    fn swap_buffers_with_damage(&self, egl: &EglRenderer, onscreen: &Onscreen, rects: &[Rect]) {
        surface::swap_buffers_with_damage(egl, onscreen, rects)
    }

    fn supports_swap_region(&self) -> bool {
        true
    }

    fn set_visibility(&self, _onscreen: &Onscreen, _visible: bool) {}

    fn set_resizable(&self, _onscreen: &Onscreen, _resizable: bool) {}
}
