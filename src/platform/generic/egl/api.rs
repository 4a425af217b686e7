// cglib-winsys/src/platform/generic/egl/api.rs
//
//! The subset of EGL the windowing backends drive.

use crate::egl::types::{EGLConfig, EGLContext, EGLDisplay, EGLSurface, EGLenum, EGLint};
use crate::egl::{EGLNativeDisplayType, EGLNativeWindowType};
use crate::WindowingApiError;

/// The EGL entry points used by the windowing backends.
///
/// [`crate::NativePlatform`] implements this on top of the system `libEGL`. Failures report the
/// EGL error code that was current when the call failed.
///
/// Attribute lists are passed without a terminating `EGL_NONE`; implementations append it. Damage
/// and region rectangles are flattened `x, y, width, height` quadruples with the origin at the
/// bottom left.
pub trait EglApi {
    /// Returns the display for a native display handle.
    ///
    /// `platform` is an `EGL_PLATFORM_*_KHR` value, or `None` to use `eglGetDisplay`.
    fn get_display(&self, platform: Option<EGLenum>, native_display: EGLNativeDisplayType)
                   -> Result<EGLDisplay, WindowingApiError>;
    /// Initializes the display and returns the EGL version.
    fn initialize(&self, display: EGLDisplay) -> Result<(EGLint, EGLint), WindowingApiError>;
    fn terminate(&self, display: EGLDisplay);
    fn query_string(&self, display: EGLDisplay, name: EGLint) -> Option<String>;
    fn bind_api(&self, api: EGLenum) -> Result<(), WindowingApiError>;
    /// Returns at most `max_configs` configs matching `attributes`, best match first.
    fn choose_config(&self, display: EGLDisplay, attributes: &[EGLint], max_configs: usize)
                     -> Result<Vec<EGLConfig>, WindowingApiError>;
    fn get_config_attrib(&self, display: EGLDisplay, config: EGLConfig, attribute: EGLint)
                         -> Result<EGLint, WindowingApiError>;
    fn create_context(&self,
                      display: EGLDisplay,
                      config: EGLConfig,
                      share_context: EGLContext,
                      attributes: &[EGLint])
                      -> Result<EGLContext, WindowingApiError>;
    fn destroy_context(&self, display: EGLDisplay, context: EGLContext)
                       -> Result<(), WindowingApiError>;
    fn create_window_surface(&self,
                             display: EGLDisplay,
                             config: EGLConfig,
                             window: EGLNativeWindowType,
                             attributes: &[EGLint])
                             -> Result<EGLSurface, WindowingApiError>;
    fn destroy_surface(&self, display: EGLDisplay, surface: EGLSurface)
                       -> Result<(), WindowingApiError>;
    fn make_current(&self,
                    display: EGLDisplay,
                    draw: EGLSurface,
                    read: EGLSurface,
                    context: EGLContext)
                    -> Result<(), WindowingApiError>;
    fn swap_buffers(&self, display: EGLDisplay, surface: EGLSurface)
                    -> Result<(), WindowingApiError>;
    /// `eglSwapBuffersWithDamageEXT`. Only called when the extension is advertised.
    fn swap_buffers_with_damage(&self, display: EGLDisplay, surface: EGLSurface, rects: &[EGLint])
                                -> Result<(), WindowingApiError>;
    /// `eglSwapBuffersRegionNOK`. Only called when the extension is advertised.
    fn swap_buffers_region(&self, display: EGLDisplay, surface: EGLSurface, rects: &[EGLint])
                           -> Result<(), WindowingApiError>;
    fn swap_interval(&self, display: EGLDisplay, interval: EGLint)
                     -> Result<(), WindowingApiError>;
    fn query_surface(&self, display: EGLDisplay, surface: EGLSurface, attribute: EGLint)
                     -> Result<EGLint, WindowingApiError>;
}
