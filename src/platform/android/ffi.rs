// cglib-winsys/src/platform/android/ffi.rs

use crate::egl::types::EGLint;
use crate::Error;

use std::os::raw::{c_int, c_void};
use std::ptr::NonNull;

#[repr(C)]
pub struct ANativeWindow {
    opaque: i32,
}

#[link(name = "android")]
extern "C" {
    fn ANativeWindow_setBuffersGeometry(window: *mut ANativeWindow,
                                        width: i32,
                                        height: i32,
                                        format: i32)
                                        -> c_int;
}

/// Keeps the window's size and changes its buffer format.
pub(crate) fn set_buffers_geometry(window: NonNull<c_void>, format: EGLint) -> Result<(), Error> {
    let result = unsafe {
        ANativeWindow_setBuffersGeometry(window.as_ptr() as *mut ANativeWindow, 0, 0, format)
    };
    if result != 0 {
        return Err(Error::CreateContext(format!("ANativeWindow_setBuffersGeometry failed: {}",
                                                result)));
    }
    Ok(())
}
