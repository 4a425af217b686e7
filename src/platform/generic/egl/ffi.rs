// cglib-winsys/src/platform/generic/egl/ffi.rs
//
//! FFI-related functionality common to the various EGL backends.

use crate::egl::types::{EGLBoolean, EGLDisplay, EGLSurface, EGLenum, EGLint};

use std::os::raw::c_void;

pub const EGL_PLATFORM_X11_KHR:                          EGLenum = 0x31d5;
pub const EGL_PLATFORM_GBM_KHR:                          EGLenum = 0x31d7;
pub const EGL_PLATFORM_WAYLAND_KHR:                      EGLenum = 0x31d8;

pub const EGL_BUFFER_AGE_EXT:                            EGLint = 0x313d;

pub const EGL_CONTEXT_MAJOR_VERSION_KHR:                 EGLint = 0x3098;
pub const EGL_CONTEXT_MINOR_VERSION_KHR:                 EGLint = 0x30fb;
pub const EGL_CONTEXT_FLAGS_KHR:                         EGLint = 0x30fc;
pub const EGL_CONTEXT_OPENGL_PROFILE_MASK_KHR:           EGLint = 0x30fd;
pub const EGL_CONTEXT_OPENGL_CORE_PROFILE_BIT_KHR:       EGLint = 0x0001;
pub const EGL_CONTEXT_OPENGL_FORWARD_COMPATIBLE_BIT_KHR: EGLint = 0x0002;

#[allow(non_snake_case)]
pub(crate) struct EGLExtensionFunctions {
    pub(crate) GetPlatformDisplayEXT: Option<unsafe extern "C" fn(platform: EGLenum,
                                                                  native_display: *mut c_void,
                                                                  attrib_list: *const EGLint)
                                                                  -> EGLDisplay>,
    pub(crate) SwapBuffersWithDamageEXT: Option<unsafe extern "C" fn(dpy: EGLDisplay,
                                                                     surface: EGLSurface,
                                                                     rects: *const EGLint,
                                                                     n_rects: EGLint)
                                                                     -> EGLBoolean>,
    pub(crate) SwapBuffersWithDamageKHR: Option<unsafe extern "C" fn(dpy: EGLDisplay,
                                                                     surface: EGLSurface,
                                                                     rects: *const EGLint,
                                                                     n_rects: EGLint)
                                                                     -> EGLBoolean>,
    pub(crate) SwapBuffersRegionNOK: Option<unsafe extern "C" fn(dpy: EGLDisplay,
                                                                 surface: EGLSurface,
                                                                 n_rects: EGLint,
                                                                 rects: *const EGLint)
                                                                 -> EGLBoolean>,
}

lazy_static! {
    pub(crate) static ref EGL_EXTENSION_FUNCTIONS: EGLExtensionFunctions = {
        use crate::platform::generic::egl::device::lookup_egl_extension as get;
        use std::mem::transmute as cast;
        unsafe {
            EGLExtensionFunctions {
                GetPlatformDisplayEXT: cast(get(b"eglGetPlatformDisplayEXT\0")),
                SwapBuffersWithDamageEXT: cast(get(b"eglSwapBuffersWithDamageEXT\0")),
                SwapBuffersWithDamageKHR: cast(get(b"eglSwapBuffersWithDamageKHR\0")),
                SwapBuffersRegionNOK: cast(get(b"eglSwapBuffersRegionNOK\0")),
            }
        }
    };
}
