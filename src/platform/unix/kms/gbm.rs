// cglib-winsys/src/platform/unix/kms/gbm.rs
//
//! The GBM buffer allocator.

use std::os::raw::c_void;

pub const GBM_FORMAT_XRGB8888: u32 = 0x3432_5258;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct GbmBufferFlags: u32 {
        const SCANOUT   = 1 << 0;
        const RENDERING = 1 << 2;
    }
}

/// A `struct gbm_surface *`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GbmSurface(pub *mut c_void);

/// A `struct gbm_bo *`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferObject(pub *mut c_void);

pub trait GbmDevice {
    /// The `struct gbm_device *` EGL is initialized on.
    fn native_display(&self) -> *mut c_void;

    fn create_surface(&self, width: u32, height: u32, format: u32, flags: GbmBufferFlags)
                      -> Option<GbmSurface>;

    fn destroy_surface(&self, surface: GbmSurface);

    /// Takes the buffer EGL just finished rendering to. It stays locked until released.
    fn lock_front_buffer(&self, surface: GbmSurface) -> Option<BufferObject>;

    fn release_buffer(&self, surface: GbmSurface, buffer: BufferObject);

    /// The buffer's kernel handle, as `add_framebuffer` expects it.
    fn buffer_handle(&self, buffer: BufferObject) -> u32;

    fn buffer_stride(&self, buffer: BufferObject) -> u32;
}
