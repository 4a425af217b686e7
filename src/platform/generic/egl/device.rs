// cglib-winsys/src/platform/generic/egl/device.rs
//
//! The system EGL library.

use super::api::EglApi;
use super::ffi::EGL_EXTENSION_FUNCTIONS;
use crate::egl::types::{EGLConfig, EGLContext, EGLDisplay, EGLSurface, EGLenum, EGLint};
use crate::egl::{self, EGLNativeDisplayType, EGLNativeWindowType, Egl};
use crate::{Error, WindowingApiError};

use libc::{dlopen, dlsym, RTLD_LAZY};
use std::ffi::{CStr, CString};
use std::mem;
use std::os::raw::{c_char, c_void};
use std::ptr;

thread_local! {
    pub(crate) static EGL_FUNCTIONS: Egl = Egl::load_with(get_proc_address);
}

struct EglLibrary(*mut c_void);

unsafe impl Send for EglLibrary {}
unsafe impl Sync for EglLibrary {}

lazy_static! {
    static ref EGL_LIBRARY: EglLibrary = {
        unsafe {
            let mut library = dlopen(&b"libEGL.so.1\0"[0] as *const u8 as *const c_char,
                                     RTLD_LAZY);
            if library.is_null() {
                library = dlopen(&b"libEGL.so\0"[0] as *const u8 as *const c_char, RTLD_LAZY);
            }
            EglLibrary(library)
        }
    };
}

fn get_proc_address(symbol_name: &str) -> *const c_void {
    let symbol_name = match CString::new(symbol_name) {
        Ok(symbol_name) => symbol_name,
        Err(_) => return ptr::null(),
    };
    unsafe { dlsym(EGL_LIBRARY.0, symbol_name.as_ptr()) as *const c_void }
}

pub(crate) unsafe fn lookup_egl_extension(name: &'static [u8]) -> *mut c_void {
    EGL_FUNCTIONS.with(|egl| {
        mem::transmute(egl.GetProcAddress(&name[0] as *const u8 as *const c_char))
    })
}

fn terminated(attributes: &[EGLint]) -> Vec<EGLint> {
    let mut list = Vec::with_capacity(attributes.len() + 1);
    list.extend_from_slice(attributes);
    list.push(egl::NONE as EGLint);
    list
}

/// The error of the last failed EGL call on this thread.
fn last_error(egl: &Egl) -> WindowingApiError {
    let code = unsafe { egl.GetError() };
    match code as EGLenum {
        egl::NOT_INITIALIZED => WindowingApiError::NotInitialized,
        egl::BAD_ACCESS => WindowingApiError::BadAccess,
        egl::BAD_ALLOC => WindowingApiError::BadAlloc,
        egl::BAD_ATTRIBUTE => WindowingApiError::BadAttribute,
        egl::BAD_CONFIG => WindowingApiError::BadConfig,
        egl::BAD_CONTEXT => WindowingApiError::BadContext,
        egl::BAD_CURRENT_SURFACE => WindowingApiError::BadCurrentSurface,
        egl::BAD_DISPLAY => WindowingApiError::BadDisplay,
        egl::BAD_SURFACE => WindowingApiError::BadSurface,
        egl::BAD_MATCH => WindowingApiError::BadMatch,
        egl::BAD_PARAMETER => WindowingApiError::BadParameter,
        egl::BAD_NATIVE_PIXMAP => WindowingApiError::BadNativePixmap,
        egl::BAD_NATIVE_WINDOW => WindowingApiError::BadNativeWindow,
        egl::CONTEXT_LOST => WindowingApiError::ContextLost,
        _ => {
            debug!("Unrecognized EGL error {:#x}", code);
            WindowingApiError::Failed
        }
    }
}

fn check(egl: &Egl, result: egl::types::EGLBoolean) -> Result<(), WindowingApiError> {
    if result == egl::FALSE {
        Err(last_error(egl))
    } else {
        Ok(())
    }
}

/// [`EglApi`] backed by `libEGL`, loaded at runtime.
pub struct NativeEgl {
    _private: (),
}

impl NativeEgl {
    pub(crate) fn load() -> Result<NativeEgl, Error> {
        if EGL_LIBRARY.0.is_null() {
            return Err(Error::Init("Failed to load libEGL".to_owned()));
        }
        Ok(NativeEgl { _private: () })
    }
}

impl EglApi for NativeEgl {
    fn get_display(&self, platform: Option<EGLenum>, native_display: EGLNativeDisplayType)
                   -> Result<EGLDisplay, WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe {
            let display = match platform {
                None => egl.GetDisplay(native_display),
                Some(platform) if egl.GetPlatformDisplay.is_loaded() => {
                    egl.GetPlatformDisplay(platform, native_display as *mut c_void, ptr::null())
                }
                Some(platform) => match EGL_EXTENSION_FUNCTIONS.GetPlatformDisplayEXT {
                    Some(get_platform_display) => {
                        get_platform_display(platform,
                                             native_display as *mut c_void,
                                             ptr::null())
                    }
                    None => egl.GetDisplay(native_display),
                },
            };
            if display == egl::NO_DISPLAY {
                Err(last_error(egl))
            } else {
                Ok(display)
            }
        })
    }

    fn initialize(&self, display: EGLDisplay) -> Result<(EGLint, EGLint), WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe {
            let (mut major, mut minor) = (0, 0);
            check(egl, egl.Initialize(display, &mut major, &mut minor))?;
            Ok((major, minor))
        })
    }

    fn terminate(&self, display: EGLDisplay) {
        EGL_FUNCTIONS.with(|egl| unsafe {
            if egl.Terminate(display) == egl::FALSE {
                warn!("eglTerminate failed: {:?}", last_error(egl));
            }
        })
    }

    fn query_string(&self, display: EGLDisplay, name: EGLint) -> Option<String> {
        EGL_FUNCTIONS.with(|egl| unsafe {
            let string = egl.QueryString(display, name);
            if string.is_null() {
                None
            } else {
                Some(CStr::from_ptr(string).to_string_lossy().into_owned())
            }
        })
    }

    fn bind_api(&self, api: EGLenum) -> Result<(), WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe { check(egl, egl.BindAPI(api)) })
    }

    fn choose_config(&self, display: EGLDisplay, attributes: &[EGLint], max_configs: usize)
                     -> Result<Vec<EGLConfig>, WindowingApiError> {
        let attributes = terminated(attributes);
        EGL_FUNCTIONS.with(|egl| unsafe {
            let mut configs: Vec<EGLConfig> = vec![ptr::null(); max_configs];
            let mut config_count = 0;
            check(egl, egl.ChooseConfig(display,
                                        attributes.as_ptr(),
                                        configs.as_mut_ptr(),
                                        max_configs as EGLint,
                                        &mut config_count))?;
            configs.truncate(config_count.max(0) as usize);
            Ok(configs)
        })
    }

    fn get_config_attrib(&self, display: EGLDisplay, config: EGLConfig, attribute: EGLint)
                         -> Result<EGLint, WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe {
            let mut value = 0;
            check(egl, egl.GetConfigAttrib(display, config, attribute, &mut value))?;
            Ok(value)
        })
    }

    fn create_context(&self,
                      display: EGLDisplay,
                      config: EGLConfig,
                      share_context: EGLContext,
                      attributes: &[EGLint])
                      -> Result<EGLContext, WindowingApiError> {
        let attributes = terminated(attributes);
        EGL_FUNCTIONS.with(|egl| unsafe {
            let context = egl.CreateContext(display, config, share_context, attributes.as_ptr());
            if context == egl::NO_CONTEXT {
                Err(last_error(egl))
            } else {
                Ok(context)
            }
        })
    }

    fn destroy_context(&self, display: EGLDisplay, context: EGLContext)
                       -> Result<(), WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe { check(egl, egl.DestroyContext(display, context)) })
    }

    fn create_window_surface(&self,
                             display: EGLDisplay,
                             config: EGLConfig,
                             window: EGLNativeWindowType,
                             attributes: &[EGLint])
                             -> Result<EGLSurface, WindowingApiError> {
        let attributes = terminated(attributes);
        EGL_FUNCTIONS.with(|egl| unsafe {
            let surface = egl.CreateWindowSurface(display, config, window, attributes.as_ptr());
            if surface == egl::NO_SURFACE {
                Err(last_error(egl))
            } else {
                Ok(surface)
            }
        })
    }

    fn destroy_surface(&self, display: EGLDisplay, surface: EGLSurface)
                       -> Result<(), WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe { check(egl, egl.DestroySurface(display, surface)) })
    }

    fn make_current(&self,
                    display: EGLDisplay,
                    draw: EGLSurface,
                    read: EGLSurface,
                    context: EGLContext)
                    -> Result<(), WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe {
            check(egl, egl.MakeCurrent(display, draw, read, context))
        })
    }

    fn swap_buffers(&self, display: EGLDisplay, surface: EGLSurface)
                    -> Result<(), WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe { check(egl, egl.SwapBuffers(display, surface)) })
    }

    fn swap_buffers_with_damage(&self, display: EGLDisplay, surface: EGLSurface, rects: &[EGLint])
                                -> Result<(), WindowingApiError> {
        let swap = EGL_EXTENSION_FUNCTIONS.SwapBuffersWithDamageEXT
                                          .or(EGL_EXTENSION_FUNCTIONS.SwapBuffersWithDamageKHR)
                                          .ok_or(WindowingApiError::ExtensionUnavailable)?;
        EGL_FUNCTIONS.with(|egl| unsafe {
            check(egl, swap(display, surface, rects.as_ptr(), (rects.len() / 4) as EGLint))
        })
    }

    fn swap_buffers_region(&self, display: EGLDisplay, surface: EGLSurface, rects: &[EGLint])
                           -> Result<(), WindowingApiError> {
        let swap = EGL_EXTENSION_FUNCTIONS.SwapBuffersRegionNOK
                                          .ok_or(WindowingApiError::ExtensionUnavailable)?;
        EGL_FUNCTIONS.with(|egl| unsafe {
            check(egl, swap(display, surface, (rects.len() / 4) as EGLint, rects.as_ptr()))
        })
    }

    fn swap_interval(&self, display: EGLDisplay, interval: EGLint)
                     -> Result<(), WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe { check(egl, egl.SwapInterval(display, interval)) })
    }

    fn query_surface(&self, display: EGLDisplay, surface: EGLSurface, attribute: EGLint)
                     -> Result<EGLint, WindowingApiError> {
        EGL_FUNCTIONS.with(|egl| unsafe {
            let mut value = 0;
            check(egl, egl.QuerySurface(display, surface, attribute, &mut value))?;
            Ok(value)
        })
    }
}
