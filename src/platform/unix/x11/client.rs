// cglib-winsys/src/platform/unix/x11/client.rs
//
//! The Xlib calls the backend makes.

use std::os::raw::c_void;
use std::os::unix::io::RawFd;

/// An X11 window id.
pub type XWindow = u64;

/// `StructureNotifyMask | ExposureMask`: the input the backend needs on every window it renders
/// to.
pub const ONSCREEN_EVENT_MASK: u32 = (1 << 17) | (1 << 15);

/// The X events the backend acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XlibEvent {
    /// `ConfigureNotify`. Synthetic events from the window manager carry root coordinates.
    Configure { window: XWindow, x: i32, y: i32, width: i32, height: i32, send_event: bool },
    /// `Expose`.
    Expose { window: XWindow, x: i32, y: i32, width: i32, height: i32 },
    /// Anything else.
    Other,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// An Xlib `Display` connection.
///
/// Calls that can raise X errors return the error text on failure.
pub trait XlibClient {
    /// The `Display *`.
    fn display(&self) -> *mut c_void;
    fn fd(&self) -> RawFd;

    /// Creates an unmapped child of the root window with the given visual and event mask.
    fn create_window(&self, visual_id: u32, width: i32, height: i32, event_mask: u32)
                     -> Result<XWindow, String>;
    fn destroy_window(&self, window: XWindow) -> Result<(), String>;
    fn map_window(&self, window: XWindow);
    fn unmap_window(&self, window: XWindow);
    /// Sets the WM normal hints' minimum and maximum size.
    fn set_size_hints(&self, window: XWindow, min: (i32, i32), max: (i32, i32));
    fn window_geometry(&self, window: XWindow) -> Result<WindowGeometry, String>;
    fn select_input(&self, window: XWindow, event_mask: u32);
    /// The position of the window's origin in root window coordinates.
    fn root_position(&self, window: XWindow) -> (i32, i32);

    /// Whether events are waiting, reading the connection if nothing is queued yet.
    fn has_pending_events(&self) -> bool;
    /// Removes and returns every queued event.
    fn next_events(&self) -> Vec<XlibEvent>;
}
