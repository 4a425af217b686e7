// cglib-winsys/src/tests/wayland.rs
//
//! Frame callbacks, deferred resizes and the display socket on Wayland.

use super::mock::{MockEgl, MockPlatform, MOCK_WAYLAND_FD};
use super::{mock_renderer, ready, record_dirty, record_frames, record_resizes, rect};
use super::sync_and_complete;
use crate::platform::generic::egl::ffi::EGL_PLATFORM_WAYLAND_KHR;
use crate::{Backend, Display, FeatureFlags, Onscreen, PollFdEvents, Renderer};
use crate::WinsysFeatureFlags;

use std::io;
use std::os::raw::c_void;
use std::ptr::NonNull;
use std::rc::Rc;

const SURFACELESS: &str = "EGL_KHR_surfaceless_context";

fn wayland_platform(extensions: &str) -> Rc<MockPlatform> {
    Rc::new(MockPlatform::new(MockEgl::new(extensions)).with_wayland())
}

fn wayland_display(platform: &Rc<MockPlatform>) -> Display {
    let backend = Backend::Wayland { foreign_display: None, event_dispatch: true };
    Display::new(&mock_renderer(platform, backend), None)
}

fn allocated_onscreen(display: &Display, width: i32, height: i32) -> Onscreen {
    let onscreen = Onscreen::new(display, width, height);
    onscreen.allocate().unwrap();
    onscreen
}

/// Lets the backend handle what the compositor sent, then delivers the resulting events.
fn pump(renderer: &Renderer) {
    renderer.poll_info();
    renderer.dispatch(&[]);
}

#[test]
fn test_wayland_allocate_creates_shell_surface() {
    let platform = wayland_platform(SURFACELESS);
    let display = wayland_display(&platform);
    let onscreen = allocated_onscreen(&display, 320, 240);
    let wayland = platform.wayland();

    assert_eq!(wayland.surfaces.borrow().len(), 1);
    assert_eq!(wayland.shell_surfaces.borrow().len(), 1);
    let windows = wayland.egl_windows.borrow();
    assert_eq!(windows.len(), 1);
    assert_eq!((windows[0].1, windows[0].2), (320, 240));
    assert_eq!(onscreen.wayland_surface(), Some(wayland.surfaces.borrow()[0].0));
    assert_eq!(onscreen.wayland_shell_surface(), Some(wayland.shell_surfaces.borrow()[0].0));

    assert!(display.has_feature(FeatureFlags::ONSCREEN_MULTIPLE));
    assert!(display.has_winsys_feature(WinsysFeatureFlags::MULTIPLE_ONSCREEN));
    assert!(display.has_winsys_feature(WinsysFeatureFlags::SYNC_AND_COMPLETE_EVENT));
    assert_eq!(platform.egl.platform.get(), Some(EGL_PLATFORM_WAYLAND_KHR));
    assert_eq!(display.renderer().wayland_display(), Some(0x3d as *mut c_void));

    let info = display.renderer().poll_info();
    assert_eq!(info.fds.len(), 1);
    assert_eq!(info.fds[0].fd, MOCK_WAYLAND_FD);
    assert_eq!(info.fds[0].events, PollFdEvents::IN);
}

#[test]
fn test_wayland_show_sets_toplevel_once() {
    let platform = wayland_platform(SURFACELESS);
    let display = wayland_display(&platform);
    let onscreen = allocated_onscreen(&display, 320, 240);
    let dirty = record_dirty(&onscreen);

    onscreen.show();
    onscreen.show();
    onscreen.hide();
    assert_eq!(platform.wayland().toplevels.borrow().len(), 1);

    display.renderer().dispatch(&[]);
    assert_eq!(*dirty.borrow(), vec![rect(0, 0, 320, 240)]);
}

#[test]
fn test_wayland_frame_callback_completes_frame() {
    let platform = wayland_platform(SURFACELESS);
    let display = wayland_display(&platform);
    let renderer = display.renderer().clone();
    let onscreen = allocated_onscreen(&display, 320, 240);
    let frames = record_frames(&onscreen);

    onscreen.swap_buffers();
    assert_eq!(platform.wayland().callbacks.borrow().len(), 1);
    assert_eq!(platform.egl.swaps.borrow().len(), 1);

    // Nothing is reported until the compositor is done with the frame.
    pump(&renderer);
    assert!(frames.borrow().is_empty());

    platform.wayland().fire_frame_callbacks();
    pump(&renderer);
    assert_eq!(*frames.borrow(), sync_and_complete(0).to_vec());
    assert!(platform.wayland().callbacks.borrow().is_empty());
}

#[test]
fn test_wayland_frames_complete_in_submission_order() {
    let platform = wayland_platform(SURFACELESS);
    let display = wayland_display(&platform);
    let renderer = display.renderer().clone();
    let onscreen = allocated_onscreen(&display, 320, 240);
    let frames = record_frames(&onscreen);

    onscreen.swap_buffers();
    onscreen.swap_buffers();
    assert_eq!(platform.wayland().callbacks.borrow().len(), 2);

    platform.wayland().fire_frame_callbacks();
    pump(&renderer);

    let mut expected = sync_and_complete(0).to_vec();
    expected.extend_from_slice(&sync_and_complete(1));
    assert_eq!(*frames.borrow(), expected);
}

#[test]
fn test_wayland_callbacks_reach_their_own_onscreen() {
    let platform = wayland_platform(SURFACELESS);
    let display = wayland_display(&platform);
    let renderer = display.renderer().clone();
    let first = allocated_onscreen(&display, 320, 240);
    let second = allocated_onscreen(&display, 640, 480);
    let first_frames = record_frames(&first);
    let second_frames = record_frames(&second);

    first.swap_buffers();
    second.swap_buffers();
    second.swap_buffers();
    platform.wayland().fire_frame_callbacks();
    pump(&renderer);

    assert_eq!(*first_frames.borrow(), sync_and_complete(0).to_vec());
    let mut expected = sync_and_complete(0).to_vec();
    expected.extend_from_slice(&sync_and_complete(1));
    assert_eq!(*second_frames.borrow(), expected);
}

#[test]
fn test_wayland_frame_request_failure_completes_immediately() {
    let platform = wayland_platform(SURFACELESS);
    let display = wayland_display(&platform);
    let onscreen = allocated_onscreen(&display, 320, 240);
    let frames = record_frames(&onscreen);

    platform.wayland().fail_frame.set(true);
    onscreen.swap_buffers();
    // The swap still happens.
    assert_eq!(platform.egl.swaps.borrow().len(), 1);
    assert!(frames.borrow().is_empty());

    display.renderer().dispatch(&[]);
    assert_eq!(*frames.borrow(), sync_and_complete(0).to_vec());
}

#[test]
fn test_wayland_resize_mid_frame_waits_for_swap() {
    let platform = wayland_platform(SURFACELESS);
    let display = wayland_display(&platform);
    let onscreen = allocated_onscreen(&display, 320, 240);
    let resizes = record_resizes(&onscreen);
    let dirty = record_dirty(&onscreen);

    onscreen.begin_frame();
    onscreen.wayland_resize(400, 300, 5, 0);
    onscreen.wayland_resize(500, 350, 2, 3);
    assert!(platform.wayland().resizes.borrow().is_empty());
    assert_eq!(onscreen.width(), 320);

    // Offsets add up; the latest size wins.
    onscreen.swap_buffers();
    assert_eq!(*platform.wayland().resizes.borrow(), vec![(500, 350, 7, 3)]);
    assert_eq!((onscreen.width(), onscreen.height()), (500, 350));

    display.renderer().dispatch(&[]);
    assert_eq!(*resizes.borrow(), vec![(500, 350)]);
    assert_eq!(*dirty.borrow(), vec![rect(0, 0, 500, 350)]);

    // The next frame starts with nothing pending.
    onscreen.swap_buffers();
    assert_eq!(platform.wayland().resizes.borrow().len(), 1);
}

#[test]
fn test_wayland_resize_outside_frame_applies_immediately() {
    let platform = wayland_platform(SURFACELESS);
    let display = wayland_display(&platform);
    let onscreen = allocated_onscreen(&display, 320, 240);
    let resizes = record_resizes(&onscreen);

    onscreen.wayland_resize(100, 100, 0, 0);
    onscreen.wayland_resize(150, 120, 0, 0);
    onscreen.wayland_resize(200, 200, 0, 0);
    assert_eq!(platform.wayland().resizes.borrow().len(), 3);
    assert_eq!(onscreen.width(), 200);

    // Notifications collapse into one reporting the size at dispatch time.
    display.renderer().dispatch(&[]);
    assert_eq!(*resizes.borrow(), vec![(200, 200)]);
}

#[test]
fn test_wayland_resize_noop_and_unallocated() {
    let platform = wayland_platform(SURFACELESS);
    let display = wayland_display(&platform);

    let onscreen = Onscreen::new(&display, 320, 240);
    onscreen.wayland_resize(640, 480, 0, 0);
    assert_eq!((onscreen.width(), onscreen.height()), (640, 480));
    onscreen.allocate().unwrap();
    assert_eq!(platform.wayland().egl_windows.borrow()[0].1, 640);

    onscreen.wayland_resize(640, 480, 0, 0);
    assert!(platform.wayland().resizes.borrow().is_empty());

    // An offset alone still resizes.
    onscreen.wayland_resize(640, 480, 4, 4);
    assert_eq!(*platform.wayland().resizes.borrow(), vec![(640, 480, 4, 4)]);
}

#[test]
fn test_wayland_foreign_surface_is_not_owned() {
    let platform = wayland_platform(SURFACELESS);
    let display = wayland_display(&platform);
    let foreign = NonNull::new(0x1234 as *mut c_void).unwrap();

    let onscreen = Onscreen::new(&display, 320, 240);
    onscreen.wayland_set_foreign_surface(foreign);
    onscreen.allocate().unwrap();

    let wayland = platform.wayland();
    assert!(wayland.surfaces.borrow().is_empty());
    assert!(wayland.shell_surfaces.borrow().is_empty());
    assert_eq!(onscreen.wayland_surface(), Some(foreign.as_ptr()));
    assert_eq!(onscreen.wayland_shell_surface(), None);

    // No shell surface, so no role to give it.
    onscreen.show();
    assert!(wayland.toplevels.borrow().is_empty());

    drop(onscreen);
    assert!(wayland.egl_windows.borrow().is_empty());
}

#[test]
fn test_wayland_drop_destroys_pending_callbacks() {
    let platform = wayland_platform(SURFACELESS);
    let display = wayland_display(&platform);
    let renderer = display.renderer().clone();
    let onscreen = allocated_onscreen(&display, 320, 240);

    onscreen.swap_buffers();
    onscreen.swap_buffers();
    drop(onscreen);

    let wayland = platform.wayland();
    assert!(wayland.callbacks.borrow().is_empty());
    assert!(wayland.egl_windows.borrow().is_empty());
    assert!(wayland.shell_surfaces.borrow().is_empty());
    assert!(wayland.surfaces.borrow().is_empty());
    assert_eq!(platform.egl.live_surfaces(), 0);

    wayland.fire_frame_callbacks();
    pump(&renderer);
}

#[test]
fn test_wayland_flush_would_block_polls_for_output() {
    let platform = wayland_platform(SURFACELESS);
    let display = wayland_display(&platform);
    let renderer = display.renderer().clone();
    display.setup().unwrap();

    platform.wayland().flush_error.set(Some(io::ErrorKind::WouldBlock));
    let info = renderer.poll_info();
    assert_eq!(info.fds[0].events, PollFdEvents::IN | PollFdEvents::OUT);

    // Once writable and flushed, only input matters again.
    renderer.dispatch(&ready(MOCK_WAYLAND_FD, PollFdEvents::OUT));
    let after = renderer.poll_info();
    assert_eq!(after.fds[0].events, PollFdEvents::IN);
    assert!(after.age > info.age);
}

#[test]
fn test_wayland_fatal_flush_error_stops_polling() {
    let platform = wayland_platform(SURFACELESS);
    let display = wayland_display(&platform);
    display.setup().unwrap();

    platform.wayland().flush_error.set(Some(io::ErrorKind::BrokenPipe));
    assert!(display.renderer().poll_info().fds.is_empty());
}

#[test]
fn test_wayland_event_dispatch_disabled() {
    let platform = wayland_platform(SURFACELESS);
    let backend = Backend::Wayland { foreign_display: None, event_dispatch: false };
    let renderer = mock_renderer(&platform, backend);
    renderer.connect().unwrap();

    assert!(renderer.poll_info().fds.is_empty());
    renderer.disconnect();
    assert!(!renderer.is_connected());
}

#[test]
fn test_wayland_dummy_surface_without_surfaceless_context() {
    let platform = wayland_platform("");
    let display = wayland_display(&platform);
    display.setup().unwrap();

    {
        let wayland = platform.wayland();
        assert_eq!(wayland.surfaces.borrow().len(), 1);
        let windows = wayland.egl_windows.borrow();
        assert_eq!((windows[0].1, windows[0].2), (1, 1));
    }
    assert_eq!(platform.egl.live_surfaces(), 1);
    assert_eq!(platform.egl.current_draw(), platform.egl.surfaces.borrow()[0].0);
    assert!(display.has_feature(FeatureFlags::GLES2_CONTEXT));

    drop(display);
    assert!(platform.wayland().surfaces.borrow().is_empty());
    assert!(platform.wayland().egl_windows.borrow().is_empty());
    assert_eq!(platform.egl.live_surfaces(), 0);
    assert_eq!(platform.egl.live_contexts.get(), 0);
}
