// cglib-winsys/src/platform/unix/x11/native.rs
//
//! [`XlibClient`] on the system Xlib, loaded through `x11-dl`.

use super::client::{WindowGeometry, XWindow, XlibClient, XlibEvent};
use crate::Error;

use std::cell::Cell;
use std::mem;
use std::os::raw::{c_char, c_int, c_long, c_uint, c_ulong, c_void};
use std::os::unix::io::RawFd;
use std::ptr::{self, NonNull};
use x11_dl::xlib::{self, Display, XErrorEvent, XEvent, XSetWindowAttributes, XVisualInfo};
use x11_dl::xlib::{XWindowAttributes, Xlib};

thread_local! {
    static TRAPPED_ERROR: Cell<u8> = Cell::new(0);
}

unsafe extern "C" fn trap_error(_: *mut Display, event: *mut XErrorEvent) -> c_int {
    TRAPPED_ERROR.with(|error| error.set((*event).error_code));
    0
}

/// An Xlib `Display`, closed on drop unless it was supplied by the application.
pub(crate) struct NativeXlibClient {
    xlib: Box<Xlib>,
    display: *mut Display,
    owns_display: bool,
}

impl NativeXlibClient {
    pub(crate) fn open(foreign_display: Option<NonNull<c_void>>)
                       -> Result<NativeXlibClient, Error> {
        let xlib = Xlib::open().map_err(|err| {
            Error::Init(format!("Failed to load Xlib: {}", err))
        })?;

        let (display, owns_display) = match foreign_display {
            Some(display) => (display.as_ptr() as *mut Display, false),
            None => (unsafe { (xlib.XOpenDisplay)(ptr::null()) }, true),
        };
        if display.is_null() {
            return Err(Error::Init("Failed to open X display".to_owned()));
        }

        Ok(NativeXlibClient { xlib: Box::new(xlib), display, owns_display })
    }

    /// Runs `f` with X errors trapped, then syncs and reports the first error raised.
    fn trap_errors<F, R>(&self, f: F) -> Result<R, String> where F: FnOnce() -> R {
        unsafe {
            TRAPPED_ERROR.with(|error| error.set(0));
            let old_handler = (self.xlib.XSetErrorHandler)(Some(trap_error));
            let result = f();
            (self.xlib.XSync)(self.display, xlib::False);
            (self.xlib.XSetErrorHandler)(old_handler);

            match TRAPPED_ERROR.with(Cell::get) {
                0 => Ok(result),
                code => Err(self.error_text(code)),
            }
        }
    }

    fn error_text(&self, code: u8) -> String {
        let mut buffer = vec![0u8; 256];
        unsafe {
            (self.xlib.XGetErrorText)(self.display,
                                      code as c_int,
                                      buffer.as_mut_ptr() as *mut c_char,
                                      buffer.len() as c_int - 1);
        }
        let length = buffer.iter().position(|&byte| byte == 0).unwrap_or(buffer.len());
        String::from_utf8_lossy(&buffer[..length]).into_owned()
    }

    fn root_window(&self) -> xlib::Window {
        unsafe {
            let screen = (self.xlib.XDefaultScreen)(self.display);
            (self.xlib.XRootWindow)(self.display, screen)
        }
    }

    fn visual_info(&self, visual_id: u32) -> Option<XVisualInfo> {
        unsafe {
            let mut template: XVisualInfo = mem::zeroed();
            template.visualid = visual_id as xlib::VisualID;
            let mut count = 0;
            let infos = (self.xlib.XGetVisualInfo)(self.display,
                                                   xlib::VisualIDMask,
                                                   &mut template,
                                                   &mut count);
            if infos.is_null() {
                return None;
            }
            let info = if count > 0 { Some(*infos) } else { None };
            (self.xlib.XFree)(infos as *mut c_void);
            info
        }
    }

    fn convert_event(event: &XEvent) -> XlibEvent {
        unsafe {
            match event.get_type() {
                xlib::ConfigureNotify => {
                    let configure = event.configure;
                    XlibEvent::Configure {
                        window: configure.window as XWindow,
                        x: configure.x,
                        y: configure.y,
                        width: configure.width,
                        height: configure.height,
                        send_event: configure.send_event != 0,
                    }
                }
                xlib::Expose => {
                    let expose = event.expose;
                    XlibEvent::Expose {
                        window: expose.window as XWindow,
                        x: expose.x,
                        y: expose.y,
                        width: expose.width,
                        height: expose.height,
                    }
                }
                _ => XlibEvent::Other,
            }
        }
    }
}

impl Drop for NativeXlibClient {
    fn drop(&mut self) {
        if self.owns_display {
            unsafe {
                (self.xlib.XCloseDisplay)(self.display);
            }
        }
    }
}

impl XlibClient for NativeXlibClient {
    fn display(&self) -> *mut c_void {
        self.display as *mut c_void
    }

    fn fd(&self) -> RawFd {
        unsafe { (self.xlib.XConnectionNumber)(self.display) }
    }

    fn create_window(&self, visual_id: u32, width: i32, height: i32, event_mask: u32)
                     -> Result<XWindow, String> {
        let info = self.visual_info(visual_id)
                       .ok_or_else(|| format!("No X visual with id 0x{:x}", visual_id))?;
        let root = self.root_window();

        let window = self.trap_errors(|| unsafe {
            let mut attributes: XSetWindowAttributes = mem::zeroed();
            attributes.border_pixel = 0;
            attributes.colormap = (self.xlib.XCreateColormap)(self.display,
                                                              root,
                                                              info.visual,
                                                              xlib::AllocNone);
            attributes.event_mask = event_mask as c_long;
            (self.xlib.XCreateWindow)(self.display,
                                      root,
                                      0,
                                      0,
                                      width.max(1) as c_uint,
                                      height.max(1) as c_uint,
                                      0,
                                      info.depth,
                                      xlib::InputOutput as c_uint,
                                      info.visual,
                                      (xlib::CWBorderPixel | xlib::CWColormap | xlib::CWEventMask)
                                          as c_ulong,
                                      &mut attributes)
        })?;
        Ok(window as XWindow)
    }

    fn destroy_window(&self, window: XWindow) -> Result<(), String> {
        self.trap_errors(|| unsafe {
            (self.xlib.XDestroyWindow)(self.display, window as xlib::Window);
        })
    }

    fn map_window(&self, window: XWindow) {
        unsafe {
            (self.xlib.XMapWindow)(self.display, window as xlib::Window);
            (self.xlib.XFlush)(self.display);
        }
    }

    fn unmap_window(&self, window: XWindow) {
        unsafe {
            (self.xlib.XUnmapWindow)(self.display, window as xlib::Window);
            (self.xlib.XFlush)(self.display);
        }
    }

    fn set_size_hints(&self, window: XWindow, min: (i32, i32), max: (i32, i32)) {
        unsafe {
            let hints = (self.xlib.XAllocSizeHints)();
            if hints.is_null() {
                warn!("Couldn't allocate X size hints");
                return;
            }
            (*hints).flags = xlib::PMinSize | xlib::PMaxSize;
            (*hints).min_width = min.0;
            (*hints).min_height = min.1;
            (*hints).max_width = max.0;
            (*hints).max_height = max.1;
            (self.xlib.XSetWMNormalHints)(self.display, window as xlib::Window, hints);
            (self.xlib.XFree)(hints as *mut c_void);
        }
    }

    fn window_geometry(&self, window: XWindow) -> Result<WindowGeometry, String> {
        let (status, attributes) = self.trap_errors(|| unsafe {
            let mut attributes: XWindowAttributes = mem::zeroed();
            let status = (self.xlib.XGetWindowAttributes)(self.display,
                                                          window as xlib::Window,
                                                          &mut attributes);
            (status, attributes)
        })?;
        if status == 0 {
            return Err("XGetWindowAttributes failed".to_owned());
        }
        Ok(WindowGeometry {
            x: attributes.x,
            y: attributes.y,
            width: attributes.width,
            height: attributes.height,
        })
    }

    fn select_input(&self, window: XWindow, event_mask: u32) {
        unsafe {
            (self.xlib.XSelectInput)(self.display, window as xlib::Window, event_mask as c_long);
        }
    }

    fn root_position(&self, window: XWindow) -> (i32, i32) {
        let (mut x, mut y) = (0, 0);
        let mut child = 0;
        unsafe {
            (self.xlib.XTranslateCoordinates)(self.display,
                                              window as xlib::Window,
                                              self.root_window(),
                                              0,
                                              0,
                                              &mut x,
                                              &mut y,
                                              &mut child);
        }
        (x, y)
    }

    fn has_pending_events(&self) -> bool {
        unsafe { (self.xlib.XPending)(self.display) > 0 }
    }

    fn next_events(&self) -> Vec<XlibEvent> {
        let mut events = vec![];
        unsafe {
            while (self.xlib.XPending)(self.display) > 0 {
                let mut event: XEvent = mem::zeroed();
                (self.xlib.XNextEvent)(self.display, &mut event);
                events.push(NativeXlibClient::convert_event(&event));
            }
        }
        events
    }
}
