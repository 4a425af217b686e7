// cglib-winsys/src/event_loop.rs
//
//! File descriptor sources and idle callbacks driven by the application's main loop.
//!
//! The library never blocks on these itself (apart from the KMS flip slot wait). The application
//! asks the renderer for its [`PollInfo`], polls, and hands the results back to
//! [`crate::Renderer::dispatch`].

use crate::closure::{ClosureHandle, ClosureList};

use std::cell::{Cell, RefCell};
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;

bitflags! {
    /// Events a file descriptor can be polled for, with the same values as `poll(2)`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PollFdEvents: i16 {
        /// There is data to read.
        const IN = libc::POLLIN;
        /// There is urgent data to read.
        const PRI = libc::POLLPRI;
        /// Writing now will not block.
        const OUT = libc::POLLOUT;
        /// Error condition.
        const ERR = libc::POLLERR;
        /// Hung up.
        const HUP = libc::POLLHUP;
        /// Invalid request: the descriptor is not open.
        const NVAL = libc::POLLNVAL;
    }
}

/// One file descriptor the application should poll on behalf of the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollFd {
    /// The file descriptor.
    pub fd: RawFd,
    /// The events the renderer is interested in.
    pub events: PollFdEvents,
    /// The events that actually occurred, filled in by the application after polling.
    pub revents: PollFdEvents,
}

/// What the application's main loop should wait on before the next dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollInfo {
    /// File descriptors to poll.
    pub fds: Vec<PollFd>,
    /// How long the application may block. `None` means until one of the descriptors is ready.
    pub timeout: Option<Duration>,
    /// Changes whenever the descriptor set or an interest mask changes, so a loop that caches
    /// its poll set knows when to rebuild it.
    pub age: u64,
}

pub(crate) type PrepareCallback = Box<dyn FnMut() -> Option<Duration>>;
pub(crate) type DispatchCallback = Box<dyn FnMut(PollFdEvents)>;

struct PollSource {
    fd: RawFd,
    removed: Cell<bool>,
    prepare: Option<RefCell<PrepareCallback>>,
    dispatch: RefCell<DispatchCallback>,
}

pub(crate) struct MainLoop {
    // Most recently registered first.
    sources: RefCell<Vec<Rc<PollSource>>>,
    poll_fds: RefCell<Vec<PollFd>>,
    age: Cell<u64>,
    idles: ClosureList<dyn FnMut()>,
}

impl MainLoop {
    pub(crate) fn new() -> MainLoop {
        MainLoop {
            sources: RefCell::new(vec![]),
            poll_fds: RefCell::new(vec![]),
            age: Cell::new(0),
            idles: ClosureList::new(),
        }
    }

    /// Registers `fd`, replacing any existing registration of the same descriptor.
    pub(crate) fn add_fd(&self,
                         fd: RawFd,
                         events: PollFdEvents,
                         prepare: Option<PrepareCallback>,
                         dispatch: DispatchCallback) {
        self.remove_fd(fd);

        self.sources.borrow_mut().insert(0, Rc::new(PollSource {
            fd,
            removed: Cell::new(false),
            prepare: prepare.map(RefCell::new),
            dispatch: RefCell::new(dispatch),
        }));
        self.poll_fds.borrow_mut().push(PollFd { fd, events, revents: PollFdEvents::empty() });
        self.bump_age();
    }

    pub(crate) fn remove_fd(&self, fd: RawFd) {
        let mut poll_fds = self.poll_fds.borrow_mut();
        let index = match poll_fds.iter().position(|poll_fd| poll_fd.fd == fd) {
            None => return,
            Some(index) => index,
        };
        poll_fds.swap_remove(index);
        drop(poll_fds);
        self.bump_age();

        let mut sources = self.sources.borrow_mut();
        if let Some(index) = sources.iter().position(|source| source.fd == fd) {
            sources.remove(index).removed.set(true);
        }
    }

    pub(crate) fn modify_fd(&self, fd: RawFd, events: PollFdEvents) {
        let mut poll_fds = self.poll_fds.borrow_mut();
        match poll_fds.iter_mut().find(|poll_fd| poll_fd.fd == fd) {
            None => warn!("Tried to modify the events of unregistered fd {}", fd),
            Some(poll_fd) => {
                poll_fd.events = events;
                drop(poll_fds);
                self.bump_age();
            }
        }
    }

    pub(crate) fn is_registered(&self, fd: RawFd) -> bool {
        self.poll_fds.borrow().iter().any(|poll_fd| poll_fd.fd == fd)
    }

    pub(crate) fn add_idle(&self, callback: Box<dyn FnMut()>) -> ClosureHandle {
        self.idles.add(callback)
    }

    pub(crate) fn cancel_idle(&self, handle: ClosureHandle) {
        self.idles.remove(handle);
    }

    pub(crate) fn info(&self) -> PollInfo {
        let mut timeout = if self.idles.is_empty() { None } else { Some(Duration::ZERO) };

        // Prepare callbacks may unregister their own descriptor.
        let snapshot: Vec<_> = self.sources.borrow().clone();
        for source in snapshot {
            if source.removed.get() {
                continue;
            }
            let prepare = match source.prepare {
                None => continue,
                Some(ref prepare) => prepare,
            };
            let source_timeout = match prepare.try_borrow_mut() {
                Ok(mut prepare) => (*prepare)(),
                Err(_) => continue,
            };
            if let Some(source_timeout) = source_timeout {
                timeout = Some(match timeout {
                    Some(timeout) if timeout <= source_timeout => timeout,
                    _ => source_timeout,
                });
            }
        }

        // Read after the prepare callbacks in case one of them removed its descriptor.
        PollInfo { fds: self.poll_fds.borrow().clone(), timeout, age: self.age.get() }
    }

    pub(crate) fn dispatch(&self, poll_fds: &[PollFd]) {
        self.idles.invoke(|idle| idle());

        let snapshot: Vec<_> = self.sources.borrow().clone();
        for source in snapshot {
            if source.removed.get() {
                continue;
            }
            let revents = poll_fds.iter()
                                  .find(|poll_fd| poll_fd.fd == source.fd)
                                  .map_or(PollFdEvents::empty(), |poll_fd| poll_fd.revents);
            if let Ok(mut dispatch) = source.dispatch.try_borrow_mut() {
                (*dispatch)(revents);
            }
        }
    }

    pub(crate) fn dispatch_fd(&self, fd: RawFd, events: PollFdEvents) {
        let source = self.sources.borrow().iter().find(|source| source.fd == fd).cloned();
        if let Some(source) = source {
            if let Ok(mut dispatch) = source.dispatch.try_borrow_mut() {
                (*dispatch)(events);
            }
        }
    }

    pub(crate) fn clear(&self) {
        let fds: Vec<RawFd> = self.poll_fds.borrow().iter().map(|poll_fd| poll_fd.fd).collect();
        for fd in fds {
            self.remove_fd(fd);
        }
        self.idles.clear();
    }

    fn bump_age(&self) {
        self.age.set(self.age.get() + 1);
    }
}
