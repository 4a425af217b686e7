// cglib-winsys/src/platform/unix/wayland/client.rs
//
//! The Wayland client calls the backend makes.

use std::io;
use std::os::raw::c_void;
use std::os::unix::io::RawFd;

/// A `wl_surface *`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WlSurface(pub *mut c_void);

/// A `wl_shell_surface *`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WlShellSurface(pub *mut c_void);

/// A `wl_egl_window *`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WlEglWindow(pub *mut c_void);

/// A `wl_callback *` requested with `wl_surface.frame`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameCallbackId(pub *mut c_void);

/// Events received while dispatching, collected until the backend takes them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaylandEvent {
    /// The compositor is ready for a new frame.
    FrameDone { callback: FrameCallbackId, time: u32 },
}

/// A connection to a Wayland compositor with `wl_compositor` and `wl_shell` bound.
///
/// Requests that create objects return `None` when the object couldn't be created. I/O errors
/// carry the `errno` of the failed call, so `WouldBlock` means the socket buffer is full.
pub trait WaylandClient {
    /// The `wl_display *`.
    fn display(&self) -> *mut c_void;
    fn fd(&self) -> RawFd;

    fn create_surface(&self) -> Option<WlSurface>;
    fn destroy_surface(&self, surface: WlSurface);
    fn get_shell_surface(&self, surface: WlSurface) -> Option<WlShellSurface>;
    fn destroy_shell_surface(&self, shell_surface: WlShellSurface);
    fn set_toplevel(&self, shell_surface: WlShellSurface);

    fn create_egl_window(&self, surface: WlSurface, width: i32, height: i32)
                         -> Option<WlEglWindow>;
    fn resize_egl_window(&self, window: WlEglWindow, width: i32, height: i32, dx: i32, dy: i32);
    fn destroy_egl_window(&self, window: WlEglWindow);

    /// Requests a frame callback, reported as [`WaylandEvent::FrameDone`].
    fn request_frame(&self, surface: WlSurface) -> Option<FrameCallbackId>;
    /// Destroys a frame callback that hasn't fired, or one that has been handled.
    fn destroy_frame_callback(&self, callback: FrameCallbackId);

    /// `wl_display_flush`.
    fn flush(&self) -> io::Result<()>;
    /// `wl_display_dispatch`: reads from the socket, blocking if nothing is queued.
    fn dispatch(&self) -> io::Result<()>;
    /// `wl_display_dispatch_pending`: handles only what has already been read.
    fn dispatch_pending(&self) -> io::Result<()>;
    /// Drains the events collected by the dispatch calls so far.
    fn take_events(&self) -> Vec<WaylandEvent>;
}
