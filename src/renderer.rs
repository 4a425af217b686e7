// cglib-winsys/src/renderer.rs
//
//! The connection to a windowing system.

use crate::event_loop::{MainLoop, PollFd, PollFdEvents, PollInfo};
use crate::platform::{Backend, NativePlatform, Platform, WinsysId, WinsysRenderer};
use crate::Error;

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::io;
use std::os::raw::c_void;
use std::os::unix::io::RawFd;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};
use std::time::Duration;

bitflags! {
    /// Requirements a backend must meet to be chosen.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RendererConstraint: u32 {
        /// The backend talks to an X11 server.
        const USES_X11       = 0x01;
        /// The backend uses Xlib, so the application can share its `Display`.
        const USES_XLIB      = 0x02;
        /// The backend renders through EGL.
        const USES_EGL       = 0x04;
        /// The backend can create GLES2 contexts.
        const SUPPORTS_GLES2 = 0x08;
    }
}

/// The GL flavor contexts are created for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Driver {
    /// Desktop OpenGL, compatibility profile.
    Gl,
    /// Desktop OpenGL 3.1 core profile.
    Gl3,
    /// OpenGL ES 2.0.
    Gles2,
}

impl Driver {
    fn from_name(name: &str) -> Option<Driver> {
        match &*name.to_ascii_lowercase() {
            "gl" => Some(Driver::Gl),
            "gl3" => Some(Driver::Gl3),
            "gles2" => Some(Driver::Gles2),
            _ => None,
        }
    }
}

/// Settings that are frozen once the renderer connects.
#[derive(Clone, Debug)]
pub(crate) struct RendererConfig {
    pub(crate) winsys_id: Option<WinsysId>,
    pub(crate) constraints: RendererConstraint,
    pub(crate) driver: Option<Driver>,
    pub(crate) kms_fd: Option<RawFd>,
    pub(crate) xlib_display: Option<NonNull<c_void>>,
    pub(crate) xlib_event_retrieval: bool,
    pub(crate) wayland_display: Option<NonNull<c_void>>,
    pub(crate) wayland_event_dispatch: bool,
    pub(crate) android_window: Option<NonNull<c_void>>,
}

impl Default for RendererConfig {
    fn default() -> RendererConfig {
        RendererConfig {
            winsys_id: None,
            constraints: RendererConstraint::empty(),
            driver: None,
            kms_fd: None,
            xlib_display: None,
            xlib_event_retrieval: true,
            wayland_display: None,
            wayland_event_dispatch: true,
            android_window: None,
        }
    }
}

pub(crate) struct RendererInner {
    pub(crate) platform: Rc<dyn Platform>,
    config: RefCell<RendererConfig>,
    driver: Cell<Option<Driver>>,
    pub(crate) main_loop: MainLoop,
    winsys: RefCell<Option<Rc<WinsysRenderer>>>,
}

/// A connection to one windowing system.
///
/// Configure the renderer, then [`Renderer::connect`] it (setting up a [`crate::Display`] does
/// this implicitly). The renderer also owns the event sources the backend needs serviced; the
/// application's main loop drives them through [`Renderer::poll_info`] and
/// [`Renderer::dispatch`], or simply calls [`Renderer::run_once`].
#[derive(Clone)]
pub struct Renderer {
    pub(crate) inner: Rc<RendererInner>,
}

#[derive(Clone)]
pub(crate) struct WeakRenderer(Weak<RendererInner>);

impl WeakRenderer {
    pub(crate) fn upgrade(&self) -> Option<Renderer> {
        self.0.upgrade().map(|inner| Renderer { inner })
    }
}

impl Default for Renderer {
    fn default() -> Renderer {
        Renderer::new()
    }
}

impl Renderer {
    /// Creates an unconnected renderer on the system libraries.
    pub fn new() -> Renderer {
        Renderer::with_platform(Rc::new(NativePlatform))
    }

    /// Creates an unconnected renderer whose native calls go through `platform`.
    pub fn with_platform(platform: Rc<dyn Platform>) -> Renderer {
        Renderer {
            inner: Rc::new(RendererInner {
                platform,
                config: RefCell::new(RendererConfig::default()),
                driver: Cell::new(None),
                main_loop: MainLoop::new(),
                winsys: RefCell::new(None),
            }),
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.inner.winsys.borrow().is_some()
    }

    /// Requests one backend explicitly, along with the native handles it needs.
    pub fn set_backend(&self, backend: Backend) {
        let mut config = self.config_mut();
        config.winsys_id = Some(backend.winsys_id());
        match backend {
            Backend::Kms { fd } => config.kms_fd = fd,
            Backend::X11 { foreign_display } => config.xlib_display = foreign_display,
            Backend::Wayland { foreign_display, event_dispatch } => {
                config.wayland_display = foreign_display;
                config.wayland_event_dispatch = event_dispatch;
            }
            Backend::Android { native_window } => config.android_window = Some(native_window),
            Backend::Null => {}
        }
    }

    /// Requests a backend by id, keeping any native handles already configured.
    pub fn set_winsys_id(&self, id: WinsysId) {
        self.config_mut().winsys_id = Some(id);
    }

    /// The connected backend, or the requested one before connecting.
    pub fn winsys_id(&self) -> Option<WinsysId> {
        match *self.inner.winsys.borrow() {
            Some(ref winsys) => Some(winsys.id()),
            None => self.inner.config.borrow().winsys_id,
        }
    }

    pub fn add_constraint(&self, constraint: RendererConstraint) {
        self.config_mut().constraints.insert(constraint);
    }

    pub fn remove_constraint(&self, constraint: RendererConstraint) {
        self.config_mut().constraints.remove(constraint);
    }

    pub fn set_driver(&self, driver: Driver) {
        self.config_mut().driver = Some(driver);
    }

    /// The driver contexts are created for. Only known once connected.
    #[inline]
    pub fn driver(&self) -> Option<Driver> {
        self.inner.driver.get()
    }

    /// The EGL version of the connected display.
    pub fn egl_version(&self) -> Option<(i32, i32)> {
        self.winsys().map(|winsys| winsys.egl.version)
    }

    /// Connects to a windowing system. Does nothing if already connected.
    ///
    /// An explicitly requested backend is the only candidate. Otherwise `CG_RENDERER` may name
    /// one, and failing that every backend that meets the constraints is tried in turn. If all
    /// candidates fail, the error lists each one's reason.
    pub fn connect(&self) -> Result<(), Error> {
        if self.is_connected() {
            return Ok(());
        }

        let driver = self.choose_driver()?;

        let config = self.inner.config.borrow().clone();
        let candidates: Vec<WinsysId> = match config.winsys_id {
            Some(id) => vec![id],
            None => match self.inner.platform.env_var("CG_RENDERER") {
                Some(name) => match WinsysId::from_name(&name) {
                    Some(id) => vec![id],
                    None => {
                        return Err(Error::Init(format!("Unknown renderer \"{}\" in CG_RENDERER",
                                                       name)))
                    }
                },
                None => WinsysId::PROBE_ORDER.to_vec(),
            },
        };

        // Backends read the driver while connecting.
        self.inner.driver.set(Some(driver));
        let mut failures = vec![];
        for id in candidates {
            if !id.constraints().contains(config.constraints) {
                debug!("Skipping {}: it doesn't meet the renderer constraints", id.name());
                continue;
            }
            match WinsysRenderer::connect(self, id) {
                Ok(winsys) => {
                    debug!("Connected to {}", id.name());
                    *self.inner.winsys.borrow_mut() = Some(Rc::new(winsys));
                    return Ok(());
                }
                Err(err) => {
                    debug!("Couldn't connect to {}: {}", id.name(), err);
                    failures.push(format!("{}: {}", id.name(), err.message()));
                }
            }
        }

        self.inner.driver.set(None);
        if failures.is_empty() {
            Err(Error::BadConstraint(
                "No windowing system backend meets the renderer constraints".to_owned()))
        } else {
            Err(Error::Init(format!("Failed to connect to any renderer: {}",
                                    failures.join("; "))))
        }
    }

    /// Disconnects, unregistering the backend's event sources.
    ///
    /// Displays that are still alive keep the EGL connection open until they are dropped.
    pub fn disconnect(&self) {
        let winsys = self.inner.winsys.borrow_mut().take();
        if let Some(winsys) = winsys {
            winsys.backend().disconnect(&self.inner.main_loop);
        }
        self.inner.driver.set(None);
    }

    /// The descriptors to poll and how long the main loop may block.
    pub fn poll_info(&self) -> PollInfo {
        self.inner.main_loop.info()
    }

    /// Runs pending idle work and dispatches the poll results.
    pub fn dispatch(&self, poll_fds: &[PollFd]) {
        self.inner.main_loop.dispatch(poll_fds)
    }

    /// Dispatches events for a single descriptor.
    pub fn dispatch_fd(&self, fd: RawFd, events: PollFdEvents) {
        self.inner.main_loop.dispatch_fd(fd, events)
    }

    /// Polls the renderer's descriptors for at most `timeout` and dispatches the results.
    pub fn run_once(&self, timeout: Option<Duration>) -> io::Result<()> {
        let info = self.poll_info();
        let timeout = match (info.timeout, timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let mut fds: Vec<libc::pollfd> = info.fds.iter().map(|poll_fd| {
            libc::pollfd { fd: poll_fd.fd, events: poll_fd.events.bits(), revents: 0 }
        }).collect();
        let timeout_ms = timeout.map_or(-1, |timeout| timeout.as_millis().min(i32::MAX as u128) as i32);

        let result = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
            for fd in &mut fds {
                fd.revents = 0;
            }
        }

        let poll_fds: Vec<PollFd> = fds.iter().map(|fd| {
            PollFd {
                fd: fd.fd,
                events: PollFdEvents::from_bits_truncate(fd.events),
                revents: PollFdEvents::from_bits_truncate(fd.revents),
            }
        }).collect();
        self.dispatch(&poll_fds);
        Ok(())
    }

    fn choose_driver(&self) -> Result<Driver, Error> {
        if let Some(driver) = self.inner.config.borrow().driver {
            return Ok(driver);
        }
        match self.inner.platform.env_var("CG_DRIVER") {
            None => Ok(Driver::Gles2),
            Some(name) => Driver::from_name(&name).ok_or_else(|| {
                Error::BadConstraint(format!("Invalid driver name \"{}\"", name))
            }),
        }
    }

    pub(crate) fn config(&self) -> Ref<RendererConfig> {
        self.inner.config.borrow()
    }

    pub(crate) fn config_mut(&self) -> RefMut<RendererConfig> {
        assert!(!self.is_connected(), "renderer settings can't change once it is connected");
        self.inner.config.borrow_mut()
    }

    pub(crate) fn resolved_driver(&self) -> Driver {
        self.inner.driver.get().unwrap_or(Driver::Gles2)
    }

    pub(crate) fn winsys(&self) -> Option<Rc<WinsysRenderer>> {
        self.inner.winsys.borrow().clone()
    }

    #[inline]
    pub(crate) fn platform(&self) -> &dyn Platform {
        &*self.inner.platform
    }

    #[inline]
    pub(crate) fn main_loop(&self) -> &MainLoop {
        &self.inner.main_loop
    }

    pub(crate) fn downgrade(&self) -> WeakRenderer {
        WeakRenderer(Rc::downgrade(&self.inner))
    }
}
