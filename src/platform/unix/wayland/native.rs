// cglib-winsys/src/platform/unix/wayland/native.rs
//
//! [`WaylandClient`] on the system `libwayland-client` and `libwayland-egl`.
//!
//! Only the handful of core protocol requests the backend needs are marshalled here, by opcode,
//! against the interface descriptions exported by `libwayland-client`.

use super::client::{FrameCallbackId, WaylandClient, WaylandEvent, WlEglWindow, WlShellSurface};
use super::client::WlSurface;
use crate::Error;

use libc::{dlopen, dlsym, RTLD_LAZY};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::io;
use std::mem;
use std::os::raw::{c_char, c_int, c_void};
use std::os::unix::io::RawFd;
use std::ptr::{self, NonNull};
use wayland_sys::client::{wl_display, wl_proxy, wayland_client_handle};
use wayland_sys::common::{wl_argument, wl_interface};
use wayland_sys::egl::{wl_egl_window, wayland_egl_handle};

const WL_DISPLAY_GET_REGISTRY: u32 = 1;
const WL_REGISTRY_BIND: u32 = 0;
const WL_COMPOSITOR_CREATE_SURFACE: u32 = 0;
const WL_SURFACE_DESTROY: u32 = 0;
const WL_SURFACE_FRAME: u32 = 3;
const WL_SHELL_GET_SHELL_SURFACE: u32 = 0;
const WL_SHELL_SURFACE_SET_TOPLEVEL: u32 = 3;

struct Interfaces {
    registry: *const wl_interface,
    compositor: *const wl_interface,
    surface: *const wl_interface,
    callback: *const wl_interface,
    shell: *const wl_interface,
    shell_surface: *const wl_interface,
}

unsafe impl Send for Interfaces {}
unsafe impl Sync for Interfaces {}

unsafe fn open_library(names: &[&[u8]]) -> *mut c_void {
    for name in names {
        let library = dlopen(name.as_ptr() as *const c_char, RTLD_LAZY);
        if !library.is_null() {
            return library;
        }
    }
    ptr::null_mut()
}

unsafe fn interface(library: *mut c_void, name: &str) -> Option<*const wl_interface> {
    let name = CString::new(name).ok()?;
    let address = dlsym(library, name.as_ptr());
    if address.is_null() {
        None
    } else {
        Some(address as *const wl_interface)
    }
}

unsafe fn load_interfaces() -> Option<Interfaces> {
    let library = open_library(&[b"libwayland-client.so.0\0", b"libwayland-client.so\0"]);
    if library.is_null() {
        return None;
    }
    Some(Interfaces {
        registry: interface(library, "wl_registry_interface")?,
        compositor: interface(library, "wl_compositor_interface")?,
        surface: interface(library, "wl_surface_interface")?,
        callback: interface(library, "wl_callback_interface")?,
        shell: interface(library, "wl_shell_interface")?,
        shell_surface: interface(library, "wl_shell_surface_interface")?,
    })
}

lazy_static! {
    static ref INTERFACES: Option<Interfaces> = unsafe { load_interfaces() };
    static ref WAYLAND_EGL_AVAILABLE: bool = unsafe {
        !open_library(&[b"libwayland-egl.so.1\0", b"libwayland-egl.so\0"]).is_null()
    };
}

/// The globals the registry announced during the initial roundtrip.
struct Globals {
    interfaces: &'static Interfaces,
    compositor: Option<*mut wl_proxy>,
    shell: Option<*mut wl_proxy>,
}

#[repr(C)]
struct RegistryListener {
    global: unsafe extern "C" fn(*mut c_void, *mut wl_proxy, u32, *const c_char, u32),
    global_remove: unsafe extern "C" fn(*mut c_void, *mut wl_proxy, u32),
}

#[repr(C)]
struct CallbackListener {
    done: unsafe extern "C" fn(*mut c_void, *mut wl_proxy, u32),
}

static REGISTRY_LISTENER: RegistryListener = RegistryListener {
    global: registry_global,
    global_remove: registry_global_remove,
};

static CALLBACK_LISTENER: CallbackListener = CallbackListener { done: callback_done };

unsafe fn bind(registry: *mut wl_proxy, name: u32, interface: *const wl_interface)
               -> *mut wl_proxy {
    let mut arguments = [
        wl_argument { u: name },
        wl_argument { s: (*interface).name },
        wl_argument { u: 1 },
        wl_argument { n: 0 },
    ];
    (wayland_client_handle().wl_proxy_marshal_array_constructor_versioned)(registry,
                                                                         WL_REGISTRY_BIND,
                                                                         arguments.as_mut_ptr(),
                                                                         interface,
                                                                         1)
}

unsafe extern "C" fn registry_global(data: *mut c_void,
                                     registry: *mut wl_proxy,
                                     name: u32,
                                     interface: *const c_char,
                                     _version: u32) {
    let globals = &*(data as *const RefCell<Globals>);
    let mut globals = globals.borrow_mut();
    match CStr::from_ptr(interface).to_bytes() {
        b"wl_compositor" if globals.compositor.is_none() => {
            let compositor = bind(registry, name, globals.interfaces.compositor);
            globals.compositor = NonNull::new(compositor).map(NonNull::as_ptr);
        }
        b"wl_shell" if globals.shell.is_none() => {
            let shell = bind(registry, name, globals.interfaces.shell);
            globals.shell = NonNull::new(shell).map(NonNull::as_ptr);
        }
        _ => {}
    }
}

unsafe extern "C" fn registry_global_remove(_: *mut c_void, _: *mut wl_proxy, _: u32) {}

unsafe extern "C" fn callback_done(data: *mut c_void, callback: *mut wl_proxy, time: u32) {
    let events = &*(data as *const RefCell<Vec<WaylandEvent>>);
    events.borrow_mut().push(WaylandEvent::FrameDone {
        callback: FrameCallbackId(callback as *mut c_void),
        time,
    });
}

fn check(result: c_int) -> io::Result<()> {
    if result < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// A `wl_display` with `wl_compositor` and `wl_shell` bound.
pub(crate) struct NativeWaylandClient {
    display: *mut wl_display,
    owns_display: bool,
    interfaces: &'static Interfaces,
    registry: *mut wl_proxy,
    compositor: *mut wl_proxy,
    shell: *mut wl_proxy,
    // Listener data; boxed so the pointers the listeners hold stay put.
    _globals: Box<RefCell<Globals>>,
    events: Box<RefCell<Vec<WaylandEvent>>>,
}

impl NativeWaylandClient {
    /// Connects to the default compositor, or adopts `foreign_display`.
    pub(crate) fn connect(foreign_display: Option<NonNull<c_void>>)
                          -> Result<NativeWaylandClient, Error> {
        let interfaces = INTERFACES.as_ref().ok_or_else(|| {
            Error::Init("Failed to load libwayland-client".to_owned())
        })?;
        if !*WAYLAND_EGL_AVAILABLE {
            return Err(Error::Init("Failed to load libwayland-egl".to_owned()));
        }

        unsafe {
            let (display, owns_display) = match foreign_display {
                Some(display) => (display.as_ptr() as *mut wl_display, false),
                None => ((wayland_client_handle().wl_display_connect)(ptr::null()), true),
            };
            if display.is_null() {
                return Err(Error::Init("Failed to connect wayland display".to_owned()));
            }

            let mut arguments = [wl_argument { n: 0 }];
            let registry = (wayland_client_handle().wl_proxy_marshal_array_constructor_versioned)(
                display as *mut wl_proxy,
                WL_DISPLAY_GET_REGISTRY,
                arguments.as_mut_ptr(),
                interfaces.registry,
                1);
            let globals = Box::new(RefCell::new(Globals {
                interfaces,
                compositor: None,
                shell: None,
            }));

            if !registry.is_null() {
                (wayland_client_handle().wl_proxy_add_listener)(
                    registry,
                    &REGISTRY_LISTENER as *const RegistryListener as *mut extern "C" fn(),
                    &*globals as *const RefCell<Globals> as *mut c_void);
                (wayland_client_handle().wl_display_roundtrip)(display);
            }

            let (compositor, shell) = {
                let globals = globals.borrow();
                (globals.compositor, globals.shell)
            };
            match (registry.is_null(), compositor, shell) {
                (false, Some(compositor), Some(shell)) => {
                    Ok(NativeWaylandClient {
                        display,
                        owns_display,
                        interfaces,
                        registry,
                        compositor,
                        shell,
                        _globals: globals,
                        events: Box::new(RefCell::new(vec![])),
                    })
                }
                (_, compositor, shell) => {
                    for proxy in compositor.into_iter().chain(shell) {
                        (wayland_client_handle().wl_proxy_destroy)(proxy);
                    }
                    if !registry.is_null() {
                        (wayland_client_handle().wl_proxy_destroy)(registry);
                    }
                    if owns_display {
                        (wayland_client_handle().wl_display_disconnect)(display);
                    }
                    Err(Error::Init("Unable to find wl_compositor or wl_shell".to_owned()))
                }
            }
        }
    }

    unsafe fn create_object(&self,
                            parent: *mut wl_proxy,
                            opcode: u32,
                            arguments: &mut [wl_argument],
                            interface: *const wl_interface)
                            -> Option<*mut wl_proxy> {
        let proxy = (wayland_client_handle().wl_proxy_marshal_array_constructor_versioned)(
            parent,
            opcode,
            arguments.as_mut_ptr(),
            interface,
            1);
        NonNull::new(proxy).map(NonNull::as_ptr)
    }
}

impl Drop for NativeWaylandClient {
    fn drop(&mut self) {
        unsafe {
            (wayland_client_handle().wl_proxy_destroy)(self.shell);
            (wayland_client_handle().wl_proxy_destroy)(self.compositor);
            (wayland_client_handle().wl_proxy_destroy)(self.registry);
            if self.owns_display {
                (wayland_client_handle().wl_display_disconnect)(self.display);
            } else {
                (wayland_client_handle().wl_display_flush)(self.display);
            }
        }
    }
}

impl WaylandClient for NativeWaylandClient {
    fn display(&self) -> *mut c_void {
        self.display as *mut c_void
    }

    fn fd(&self) -> RawFd {
        unsafe { (wayland_client_handle().wl_display_get_fd)(self.display) }
    }

    fn create_surface(&self) -> Option<WlSurface> {
        unsafe {
            let mut arguments = [wl_argument { n: 0 }];
            self.create_object(self.compositor,
                               WL_COMPOSITOR_CREATE_SURFACE,
                               &mut arguments,
                               self.interfaces.surface)
                .map(|surface| WlSurface(surface as *mut c_void))
        }
    }

    fn destroy_surface(&self, surface: WlSurface) {
        unsafe {
            let proxy = surface.0 as *mut wl_proxy;
            (wayland_client_handle().wl_proxy_marshal_array)(proxy,
                                                          WL_SURFACE_DESTROY,
                                                          ptr::null_mut());
            (wayland_client_handle().wl_proxy_destroy)(proxy);
        }
    }

    fn get_shell_surface(&self, surface: WlSurface) -> Option<WlShellSurface> {
        unsafe {
            let mut arguments = [wl_argument { n: 0 }, wl_argument { o: surface.0 }];
            self.create_object(self.shell,
                               WL_SHELL_GET_SHELL_SURFACE,
                               &mut arguments,
                               self.interfaces.shell_surface)
                .map(|shell_surface| WlShellSurface(shell_surface as *mut c_void))
        }
    }

    fn destroy_shell_surface(&self, shell_surface: WlShellSurface) {
        unsafe { (wayland_client_handle().wl_proxy_destroy)(shell_surface.0 as *mut wl_proxy) }
    }

    fn set_toplevel(&self, shell_surface: WlShellSurface) {
        unsafe {
            (wayland_client_handle().wl_proxy_marshal_array)(shell_surface.0 as *mut wl_proxy,
                                                          WL_SHELL_SURFACE_SET_TOPLEVEL,
                                                          ptr::null_mut());
        }
    }

    fn create_egl_window(&self, surface: WlSurface, width: i32, height: i32)
                         -> Option<WlEglWindow> {
        let window = unsafe {
            (wayland_egl_handle().wl_egl_window_create)(surface.0 as *mut wl_proxy, width, height)
        };
        NonNull::new(window).map(|window| WlEglWindow(window.as_ptr() as *mut c_void))
    }

    fn resize_egl_window(&self, window: WlEglWindow, width: i32, height: i32, dx: i32, dy: i32) {
        unsafe {
            (wayland_egl_handle().wl_egl_window_resize)(window.0 as *mut wl_egl_window,
                                                      width,
                                                      height,
                                                      dx,
                                                      dy)
        }
    }

    fn destroy_egl_window(&self, window: WlEglWindow) {
        unsafe { (wayland_egl_handle().wl_egl_window_destroy)(window.0 as *mut wl_egl_window) }
    }

    fn request_frame(&self, surface: WlSurface) -> Option<FrameCallbackId> {
        unsafe {
            let mut arguments = [wl_argument { n: 0 }];
            let callback = self.create_object(surface.0 as *mut wl_proxy,
                                              WL_SURFACE_FRAME,
                                              &mut arguments,
                                              self.interfaces.callback)?;
            (wayland_client_handle().wl_proxy_add_listener)(
                callback,
                &CALLBACK_LISTENER as *const CallbackListener as *mut extern "C" fn(),
                &*self.events as *const RefCell<Vec<WaylandEvent>> as *mut c_void);
            Some(FrameCallbackId(callback as *mut c_void))
        }
    }

    fn destroy_frame_callback(&self, callback: FrameCallbackId) {
        unsafe { (wayland_client_handle().wl_proxy_destroy)(callback.0 as *mut wl_proxy) }
    }

    fn flush(&self) -> io::Result<()> {
        unsafe { check((wayland_client_handle().wl_display_flush)(self.display)) }
    }

    fn dispatch(&self) -> io::Result<()> {
        unsafe { check((wayland_client_handle().wl_display_dispatch)(self.display)) }
    }

    fn dispatch_pending(&self) -> io::Result<()> {
        unsafe { check((wayland_client_handle().wl_display_dispatch_pending)(self.display)) }
    }

    fn take_events(&self) -> Vec<WaylandEvent> {
        mem::take(&mut *self.events.borrow_mut())
    }
}
