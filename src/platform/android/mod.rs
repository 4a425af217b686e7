// cglib-winsys/src/platform/android/mod.rs
//
//! Rendering into an Android `ANativeWindow`.
//!
//! The window belongs to the application. Its buffers are reconfigured to the chosen config's
//! native visual format when the context is created, and it is never released here.

#[cfg(android)]
pub(crate) mod ffi;

use super::null::FixedSurfaceRenderer;
use super::{RendererBackendState, WinsysRenderer};
use crate::egl::EGLNativeDisplayType;
use crate::onscreen::Onscreen;
use crate::platform::generic::egl::EglRenderer;
use crate::renderer::Renderer;
use crate::Error;

use std::ptr;

pub(crate) fn connect(renderer: &Renderer) -> Result<WinsysRenderer, Error> {
    let window = renderer.config().android_window.ok_or_else(|| {
        Error::Init("No ANativeWindow specified with Backend::Android".to_owned())
    })?;

    let egl = EglRenderer::connect(renderer.platform().egl()?,
                                   None,
                                   ptr::null() as EGLNativeDisplayType,
                                   renderer.resolved_driver())?;
    Ok(WinsysRenderer {
        egl,
        backend: RendererBackendState::Android(FixedSurfaceRenderer::new(renderer, Some(window))),
    })
}

impl Onscreen {
    /// Records a new window size, e.g. from `onNativeWindowResized`.
    ///
    /// Resize callbacks run at the renderer's next dispatch.
    pub fn android_update_size(&self, width: i32, height: i32) {
        self.update_size(width, height);
        self.queue_resize_notify();
    }
}
