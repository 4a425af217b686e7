// cglib-winsys/src/tests/mod.rs
//
//! Tests for the backends, driven through mock native libraries.

mod mock;

mod wayland;

use self::mock::MockPlatform;
use crate::{Backend, FrameEvent, Onscreen, PollFd, PollFdEvents, Rect, Renderer};

use std::cell::RefCell;
use std::os::unix::io::RawFd;
use std::rc::Rc;

pub(crate) type Log<T> = Rc<RefCell<Vec<T>>>;

/// A renderer on the mock platform with one backend requested.
pub(crate) fn mock_renderer(platform: &Rc<MockPlatform>, backend: Backend) -> Renderer {
    let renderer = Renderer::with_platform(platform.clone());
    renderer.set_backend(backend);
    renderer
}

/// Records `(event, frame counter)` for every frame event the onscreen delivers.
pub(crate) fn record_frames(onscreen: &Onscreen) -> Log<(FrameEvent, i64)> {
    let log: Log<(FrameEvent, i64)> = Rc::new(RefCell::new(vec![]));
    let sink = log.clone();
    onscreen.add_frame_callback(move |_, event, info| {
        sink.borrow_mut().push((event, info.frame_counter()));
    });
    log
}

pub(crate) fn record_resizes(onscreen: &Onscreen) -> Log<(i32, i32)> {
    let log: Log<(i32, i32)> = Rc::new(RefCell::new(vec![]));
    let sink = log.clone();
    onscreen.add_resize_callback(move |_, width, height| sink.borrow_mut().push((width, height)));
    log
}

pub(crate) fn record_dirty(onscreen: &Onscreen) -> Log<Rect> {
    let log: Log<Rect> = Rc::new(RefCell::new(vec![]));
    let sink = log.clone();
    onscreen.add_dirty_callback(move |_, rect| sink.borrow_mut().push(*rect));
    log
}

/// Poll results with `revents` set for one descriptor.
pub(crate) fn ready(fd: RawFd, revents: PollFdEvents) -> Vec<PollFd> {
    vec![PollFd { fd, events: PollFdEvents::IN, revents }]
}

pub(crate) fn rect(x: i32, y: i32, width: i32, height: i32) -> Rect {
    Rect::new(euclid::default::Point2D::new(x, y), euclid::default::Size2D::new(width, height))
}

pub(crate) fn sync_and_complete(frame_counter: i64) -> [(FrameEvent, i64); 2] {
    [(FrameEvent::Sync, frame_counter), (FrameEvent::Complete, frame_counter)]
}
