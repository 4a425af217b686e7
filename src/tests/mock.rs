// cglib-winsys/src/tests/mock.rs
//
//! In-memory stand-ins for EGL and the native windowing libraries.
//!
//! Each mock records the calls the backends make and lets a test inject failures. Frame
//! completion is under the test's control: page flips and frame callbacks are only reported when
//! the test asks for them.

use crate::egl;
use crate::egl::types::{EGLConfig, EGLContext, EGLDisplay, EGLSurface, EGLenum, EGLint};
use crate::egl::{EGLNativeDisplayType, EGLNativeWindowType};
use crate::platform::generic::egl::ffi::EGL_BUFFER_AGE_EXT;
use crate::platform::unix::kms::drm::{DrmConnector, DrmCrtc, DrmDevice, DrmEncoder};
use crate::platform::unix::kms::drm::{DrmResources, ModeInfo, PageFlipEvent};
use crate::platform::unix::kms::drm::DRM_CAP_TIMESTAMP_MONOTONIC;
use crate::platform::unix::kms::gbm::{BufferObject, GbmBufferFlags, GbmDevice, GbmSurface};
use crate::platform::unix::wayland::client::{FrameCallbackId, WaylandClient, WaylandEvent};
use crate::platform::unix::wayland::client::{WlEglWindow, WlShellSurface, WlSurface};
use crate::platform::unix::x11::client::{WindowGeometry, XWindow, XlibClient, XlibEvent};
use crate::platform::Platform;
use crate::{EglApi, Error, WindowingApiError};

use fnv::{FnvHashMap, FnvHashSet};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::env;
use std::fs::File;
use std::io;
use std::os::raw::c_void;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::ptr::NonNull;
use std::rc::Rc;

pub(crate) const MOCK_DRM_FD: RawFd = 41;
pub(crate) const MOCK_WAYLAND_FD: RawFd = 42;
pub(crate) const MOCK_XLIB_FD: RawFd = 43;

pub(crate) const MOCK_CONTEXT: usize = 0xc0;

fn handle(id: usize) -> *mut c_void {
    id as *mut c_void
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MockConfig {
    pub(crate) stencil: EGLint,
    pub(crate) alpha: EGLint,
    pub(crate) samples: EGLint,
    pub(crate) visual: EGLint,
}

impl Default for MockConfig {
    fn default() -> MockConfig {
        MockConfig { stencil: 8, alpha: 0, samples: 0, visual: 0x21 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum MockSwap {
    Plain(usize),
    Damage(usize, Vec<EGLint>),
    Region(usize, Vec<EGLint>),
}

pub(crate) struct MockEgl {
    extensions: RefCell<String>,
    pub(crate) configs: RefCell<Vec<MockConfig>>,
    next_surface: Cell<usize>,
    /// Live surfaces and the native windows they were created on.
    pub(crate) surfaces: RefCell<Vec<(EGLSurface, EGLNativeWindowType)>>,
    pub(crate) current: Cell<(EGLSurface, EGLSurface, EGLContext)>,
    pub(crate) make_current_calls: Cell<usize>,
    pub(crate) swaps: RefCell<Vec<MockSwap>>,
    pub(crate) swap_intervals: RefCell<Vec<EGLint>>,
    pub(crate) buffer_age: Cell<EGLint>,
    pub(crate) buffer_age_queries: Cell<usize>,
    pub(crate) surface_size: Cell<(EGLint, EGLint)>,
    pub(crate) live_contexts: Cell<i32>,
    pub(crate) platform: Cell<Option<EGLenum>>,
    pub(crate) terminated: Cell<bool>,
    pub(crate) fail_initialize: Cell<bool>,
    pub(crate) fail_window_surface: Cell<bool>,
}

impl MockEgl {
    pub(crate) fn new(extensions: &str) -> MockEgl {
        MockEgl {
            extensions: RefCell::new(extensions.to_owned()),
            configs: RefCell::new(vec![MockConfig::default()]),
            next_surface: Cell::new(0x500),
            surfaces: RefCell::new(vec![]),
            current: Cell::new((egl::NO_SURFACE, egl::NO_SURFACE, egl::NO_CONTEXT)),
            make_current_calls: Cell::new(0),
            swaps: RefCell::new(vec![]),
            swap_intervals: RefCell::new(vec![]),
            buffer_age: Cell::new(0),
            buffer_age_queries: Cell::new(0),
            surface_size: Cell::new((800, 600)),
            live_contexts: Cell::new(0),
            platform: Cell::new(None),
            terminated: Cell::new(false),
            fail_initialize: Cell::new(false),
            fail_window_surface: Cell::new(false),
        }
    }

    pub(crate) fn live_surfaces(&self) -> usize {
        self.surfaces.borrow().len()
    }

    pub(crate) fn is_live(&self, surface: EGLSurface) -> bool {
        self.surfaces.borrow().iter().any(|&(live, _)| live == surface)
    }

    pub(crate) fn current_draw(&self) -> EGLSurface {
        self.current.get().0
    }

    fn config(&self, config: EGLConfig) -> Option<MockConfig> {
        let index = (config as usize).checked_sub(1)?;
        self.configs.borrow().get(index).cloned()
    }

    fn accepts(config: &MockConfig, attributes: &[EGLint]) -> bool {
        attributes.chunks(2).all(|pair| {
            let (name, value) = (pair[0], pair.get(1).cloned().unwrap_or(0));
            if value == egl::DONT_CARE as EGLint {
                return true;
            }
            match name as EGLenum {
                egl::STENCIL_SIZE => config.stencil >= value,
                egl::ALPHA_SIZE => config.alpha >= value,
                egl::SAMPLES => config.samples >= value,
                _ => true,
            }
        })
    }
}

impl EglApi for MockEgl {
    fn get_display(&self, platform: Option<EGLenum>, _: EGLNativeDisplayType)
                   -> Result<EGLDisplay, WindowingApiError> {
        self.platform.set(platform);
        Ok(handle(1) as EGLDisplay)
    }

    fn initialize(&self, _: EGLDisplay) -> Result<(EGLint, EGLint), WindowingApiError> {
        if self.fail_initialize.get() {
            return Err(WindowingApiError::NotInitialized);
        }
        Ok((1, 5))
    }

    fn terminate(&self, _: EGLDisplay) {
        self.terminated.set(true);
    }

    fn query_string(&self, _: EGLDisplay, name: EGLint) -> Option<String> {
        if name == egl::EXTENSIONS as EGLint {
            Some(self.extensions.borrow().clone())
        } else {
            None
        }
    }

    fn bind_api(&self, _: EGLenum) -> Result<(), WindowingApiError> {
        Ok(())
    }

    fn choose_config(&self, _: EGLDisplay, attributes: &[EGLint], max_configs: usize)
                     -> Result<Vec<EGLConfig>, WindowingApiError> {
        Ok(self.configs
               .borrow()
               .iter()
               .enumerate()
               .filter(|(_, config)| MockEgl::accepts(config, attributes))
               .map(|(index, _)| handle(index + 1) as EGLConfig)
               .take(max_configs)
               .collect())
    }

    fn get_config_attrib(&self, _: EGLDisplay, config: EGLConfig, attribute: EGLint)
                         -> Result<EGLint, WindowingApiError> {
        let config = self.config(config).ok_or(WindowingApiError::BadConfig)?;
        match attribute as EGLenum {
            egl::SAMPLES => Ok(config.samples),
            egl::NATIVE_VISUAL_ID => Ok(config.visual),
            egl::STENCIL_SIZE => Ok(config.stencil),
            egl::ALPHA_SIZE => Ok(config.alpha),
            _ => Err(WindowingApiError::BadAttribute),
        }
    }

    fn create_context(&self, _: EGLDisplay, _: EGLConfig, _: EGLContext, _: &[EGLint])
                      -> Result<EGLContext, WindowingApiError> {
        self.live_contexts.set(self.live_contexts.get() + 1);
        Ok(handle(MOCK_CONTEXT) as EGLContext)
    }

    fn destroy_context(&self, _: EGLDisplay, _: EGLContext) -> Result<(), WindowingApiError> {
        self.live_contexts.set(self.live_contexts.get() - 1);
        Ok(())
    }

    fn create_window_surface(&self,
                             _: EGLDisplay,
                             _: EGLConfig,
                             window: EGLNativeWindowType,
                             _: &[EGLint])
                             -> Result<EGLSurface, WindowingApiError> {
        if self.fail_window_surface.get() {
            return Err(WindowingApiError::BadNativeWindow);
        }
        let id = self.next_surface.get();
        self.next_surface.set(id + 1);
        let surface = handle(id) as EGLSurface;
        self.surfaces.borrow_mut().push((surface, window));
        Ok(surface)
    }

    fn destroy_surface(&self, _: EGLDisplay, surface: EGLSurface)
                       -> Result<(), WindowingApiError> {
        let mut surfaces = self.surfaces.borrow_mut();
        match surfaces.iter().position(|&(live, _)| live == surface) {
            Some(index) => {
                surfaces.remove(index);
                Ok(())
            }
            None => Err(WindowingApiError::BadSurface),
        }
    }

    fn make_current(&self,
                    _: EGLDisplay,
                    draw: EGLSurface,
                    read: EGLSurface,
                    context: EGLContext)
                    -> Result<(), WindowingApiError> {
        self.make_current_calls.set(self.make_current_calls.get() + 1);
        self.current.set((draw, read, context));
        Ok(())
    }

    fn swap_buffers(&self, _: EGLDisplay, surface: EGLSurface) -> Result<(), WindowingApiError> {
        self.swaps.borrow_mut().push(MockSwap::Plain(surface as usize));
        Ok(())
    }

    fn swap_buffers_with_damage(&self, _: EGLDisplay, surface: EGLSurface, rects: &[EGLint])
                                -> Result<(), WindowingApiError> {
        self.swaps.borrow_mut().push(MockSwap::Damage(surface as usize, rects.to_vec()));
        Ok(())
    }

    fn swap_buffers_region(&self, _: EGLDisplay, surface: EGLSurface, rects: &[EGLint])
                           -> Result<(), WindowingApiError> {
        self.swaps.borrow_mut().push(MockSwap::Region(surface as usize, rects.to_vec()));
        Ok(())
    }

    fn swap_interval(&self, _: EGLDisplay, interval: EGLint) -> Result<(), WindowingApiError> {
        self.swap_intervals.borrow_mut().push(interval);
        Ok(())
    }

    fn query_surface(&self, _: EGLDisplay, _: EGLSurface, attribute: EGLint)
                     -> Result<EGLint, WindowingApiError> {
        if attribute == EGL_BUFFER_AGE_EXT {
            self.buffer_age_queries.set(self.buffer_age_queries.get() + 1);
            return Ok(self.buffer_age.get());
        }
        match attribute as EGLenum {
            egl::WIDTH => Ok(self.surface_size.get().0),
            egl::HEIGHT => Ok(self.surface_size.get().1),
            _ => Err(WindowingApiError::BadAttribute),
        }
    }
}

pub(crate) fn mode(width: u16, height: u16) -> ModeInfo {
    ModeInfo {
        hdisplay: width,
        vdisplay: height,
        vrefresh: 60,
        name: format!("{}x{}", width, height),
        ..ModeInfo::default()
    }
}

pub(crate) const HDMI_CONNECTOR: u32 = 30;
pub(crate) const DP_CONNECTOR: u32 = 31;
pub(crate) const HDMI_CRTC: u32 = 50;
pub(crate) const DP_CRTC: u32 = 51;
pub(crate) const SAVED_FRAMEBUFFER: u32 = 99;

const DRM_MODE_CONNECTOR_HDMIA: u32 = 11;
const DRM_MODE_CONNECTOR_DISPLAYPORT: u32 = 10;

/// A DRM device with an HDMI output and a DisplayPort output, both connected.
///
/// Flips complete in submission order, when the backend reads events.
pub(crate) struct MockDrm {
    pub(crate) connectors: RefCell<Vec<DrmConnector>>,
    encoders: Vec<DrmEncoder>,
    crtcs: Vec<DrmCrtc>,
    next_framebuffer: Cell<u32>,
    pub(crate) framebuffers: RefCell<Vec<u32>>,
    pub(crate) set_crtc_calls: RefCell<Vec<(u32, u32, Vec<u32>)>>,
    pub(crate) page_flips: RefCell<Vec<(u32, u32)>>,
    queued: RefCell<VecDeque<PageFlipEvent>>,
    in_flight: RefCell<FnvHashSet<u64>>,
    pub(crate) max_in_flight: Cell<usize>,
    next_sequence: Cell<u32>,
    pub(crate) failing_crtcs: RefCell<Vec<u32>>,
    pub(crate) fail_read: Cell<bool>,
    pub(crate) monotonic: Cell<bool>,
}

impl MockDrm {
    pub(crate) fn new() -> MockDrm {
        let saved_mode = mode(1024, 768);
        MockDrm {
            connectors: RefCell::new(vec![
                DrmConnector {
                    id: HDMI_CONNECTOR,
                    connector_type: DRM_MODE_CONNECTOR_HDMIA,
                    connected: true,
                    modes: vec![mode(1920, 1080), mode(1280, 720)],
                    encoders: vec![40],
                },
                DrmConnector {
                    id: DP_CONNECTOR,
                    connector_type: DRM_MODE_CONNECTOR_DISPLAYPORT,
                    connected: true,
                    modes: vec![mode(2560, 1440), mode(1280, 720)],
                    encoders: vec![41],
                },
            ]),
            encoders: vec![
                DrmEncoder { id: 40, crtc_id: HDMI_CRTC },
                DrmEncoder { id: 41, crtc_id: DP_CRTC },
            ],
            crtcs: vec![
                DrmCrtc { id: HDMI_CRTC, buffer_id: SAVED_FRAMEBUFFER, x: 0, y: 0,
                          mode: Some(saved_mode) },
                DrmCrtc { id: DP_CRTC, buffer_id: 0, x: 0, y: 0, mode: None },
            ],
            next_framebuffer: Cell::new(100),
            framebuffers: RefCell::new(vec![]),
            set_crtc_calls: RefCell::new(vec![]),
            page_flips: RefCell::new(vec![]),
            queued: RefCell::new(VecDeque::new()),
            in_flight: RefCell::new(FnvHashSet::default()),
            max_in_flight: Cell::new(0),
            next_sequence: Cell::new(1),
            failing_crtcs: RefCell::new(vec![]),
            fail_read: Cell::new(false),
            monotonic: Cell::new(true),
        }
    }

    pub(crate) fn queued_flips(&self) -> usize {
        self.queued.borrow().len()
    }
}

impl DrmDevice for MockDrm {
    fn resources(&self) -> io::Result<DrmResources> {
        Ok(DrmResources {
            crtcs: self.crtcs.iter().map(|crtc| crtc.id).collect(),
            connectors: self.connectors.borrow().iter().map(|connector| connector.id).collect(),
            encoders: self.encoders.iter().map(|encoder| encoder.id).collect(),
        })
    }

    fn connector(&self, id: u32) -> Option<DrmConnector> {
        self.connectors.borrow().iter().find(|connector| connector.id == id).cloned()
    }

    fn encoder(&self, id: u32) -> Option<DrmEncoder> {
        self.encoders.iter().find(|encoder| encoder.id == id).cloned()
    }

    fn crtc(&self, id: u32) -> Option<DrmCrtc> {
        self.crtcs.iter().find(|crtc| crtc.id == id).cloned()
    }

    fn add_framebuffer(&self, _: u32, _: u32, _: u8, _: u8, _: u32, _: u32) -> io::Result<u32> {
        let framebuffer = self.next_framebuffer.get();
        self.next_framebuffer.set(framebuffer + 1);
        self.framebuffers.borrow_mut().push(framebuffer);
        Ok(framebuffer)
    }

    fn remove_framebuffer(&self, framebuffer: u32) -> io::Result<()> {
        let mut framebuffers = self.framebuffers.borrow_mut();
        match framebuffers.iter().position(|&live| live == framebuffer) {
            Some(index) => {
                framebuffers.remove(index);
                Ok(())
            }
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn set_crtc(&self,
                crtc: u32,
                framebuffer: u32,
                _: u32,
                _: u32,
                connectors: &[u32],
                _: Option<&ModeInfo>)
                -> io::Result<()> {
        self.set_crtc_calls.borrow_mut().push((crtc, framebuffer, connectors.to_vec()));
        Ok(())
    }

    fn page_flip(&self, crtc: u32, framebuffer: u32, user_data: u64) -> io::Result<()> {
        if self.failing_crtcs.borrow().contains(&crtc) {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        self.page_flips.borrow_mut().push((crtc, framebuffer));

        let sequence = self.next_sequence.get();
        self.next_sequence.set(sequence + 1);
        self.queued.borrow_mut().push_back(PageFlipEvent {
            user_data,
            sequence,
            tv_sec: 1000 + sequence,
            tv_usec: 0,
        });

        let mut in_flight = self.in_flight.borrow_mut();
        in_flight.insert(user_data);
        self.max_in_flight.set(self.max_in_flight.get().max(in_flight.len()));
        Ok(())
    }

    fn capability(&self, capability: u64) -> io::Result<u64> {
        match capability {
            DRM_CAP_TIMESTAMP_MONOTONIC => Ok(self.monotonic.get() as u64),
            _ => Err(io::Error::from_raw_os_error(libc::EINVAL)),
        }
    }

    fn read_events(&self) -> io::Result<Vec<PageFlipEvent>> {
        if self.fail_read.get() {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        let events: Vec<_> = self.queued.borrow_mut().drain(..).collect();
        let mut in_flight = self.in_flight.borrow_mut();
        for event in &events {
            in_flight.remove(&event.user_data);
        }
        Ok(events)
    }
}

pub(crate) struct MockGbm {
    next_handle: Cell<usize>,
    pub(crate) surfaces: RefCell<Vec<(GbmSurface, u32, u32)>>,
    pub(crate) locked: RefCell<Vec<BufferObject>>,
    pub(crate) max_locked: Cell<usize>,
    pub(crate) fail_lock: Cell<bool>,
}

impl MockGbm {
    pub(crate) fn new() -> MockGbm {
        MockGbm {
            next_handle: Cell::new(0x900),
            surfaces: RefCell::new(vec![]),
            locked: RefCell::new(vec![]),
            max_locked: Cell::new(0),
            fail_lock: Cell::new(false),
        }
    }

    fn next(&self) -> *mut c_void {
        let id = self.next_handle.get();
        self.next_handle.set(id + 1);
        handle(id)
    }

    pub(crate) fn surface_sizes(&self) -> Vec<(u32, u32)> {
        self.surfaces.borrow().iter().map(|&(_, width, height)| (width, height)).collect()
    }
}

impl GbmDevice for MockGbm {
    fn native_display(&self) -> *mut c_void {
        handle(0x6b)
    }

    fn create_surface(&self, width: u32, height: u32, _: u32, _: GbmBufferFlags)
                      -> Option<GbmSurface> {
        let surface = GbmSurface(self.next());
        self.surfaces.borrow_mut().push((surface, width, height));
        Some(surface)
    }

    fn destroy_surface(&self, surface: GbmSurface) {
        self.surfaces.borrow_mut().retain(|&(live, _, _)| live != surface);
    }

    fn lock_front_buffer(&self, _: GbmSurface) -> Option<BufferObject> {
        if self.fail_lock.get() {
            return None;
        }
        let buffer = BufferObject(self.next());
        let mut locked = self.locked.borrow_mut();
        locked.push(buffer);
        self.max_locked.set(self.max_locked.get().max(locked.len()));
        Some(buffer)
    }

    fn release_buffer(&self, _: GbmSurface, buffer: BufferObject) {
        self.locked.borrow_mut().retain(|&live| live != buffer);
    }

    fn buffer_handle(&self, buffer: BufferObject) -> u32 {
        buffer.0 as usize as u32
    }

    fn buffer_stride(&self, _: BufferObject) -> u32 {
        7680
    }
}

/// A compositor connection whose frame callbacks fire only when the test says so.
pub(crate) struct MockWayland {
    next_handle: Cell<usize>,
    pub(crate) surfaces: RefCell<Vec<WlSurface>>,
    pub(crate) shell_surfaces: RefCell<Vec<WlShellSurface>>,
    pub(crate) egl_windows: RefCell<Vec<(WlEglWindow, i32, i32)>>,
    pub(crate) resizes: RefCell<Vec<(i32, i32, i32, i32)>>,
    pub(crate) toplevels: RefCell<Vec<WlShellSurface>>,
    pub(crate) callbacks: RefCell<Vec<FrameCallbackId>>,
    events: RefCell<Vec<WaylandEvent>>,
    pub(crate) fail_frame: Cell<bool>,
    /// Returned once by the next flush.
    pub(crate) flush_error: Cell<Option<io::ErrorKind>>,
    pub(crate) flushes: Cell<usize>,
}

impl MockWayland {
    pub(crate) fn new() -> MockWayland {
        MockWayland {
            next_handle: Cell::new(0x700),
            surfaces: RefCell::new(vec![]),
            shell_surfaces: RefCell::new(vec![]),
            egl_windows: RefCell::new(vec![]),
            resizes: RefCell::new(vec![]),
            toplevels: RefCell::new(vec![]),
            callbacks: RefCell::new(vec![]),
            events: RefCell::new(vec![]),
            fail_frame: Cell::new(false),
            flush_error: Cell::new(None),
            flushes: Cell::new(0),
        }
    }

    fn next(&self) -> *mut c_void {
        let id = self.next_handle.get();
        self.next_handle.set(id + 1);
        handle(id)
    }

    /// Fires every outstanding frame callback, oldest first.
    pub(crate) fn fire_frame_callbacks(&self) {
        let callbacks = self.callbacks.borrow().clone();
        self.events.borrow_mut().extend(callbacks.into_iter().map(|callback| {
            WaylandEvent::FrameDone { callback, time: 16 }
        }));
    }
}

impl WaylandClient for MockWayland {
    fn display(&self) -> *mut c_void {
        handle(0x3d)
    }

    fn fd(&self) -> RawFd {
        MOCK_WAYLAND_FD
    }

    fn create_surface(&self) -> Option<WlSurface> {
        let surface = WlSurface(self.next());
        self.surfaces.borrow_mut().push(surface);
        Some(surface)
    }

    fn destroy_surface(&self, surface: WlSurface) {
        self.surfaces.borrow_mut().retain(|&live| live != surface);
    }

    fn get_shell_surface(&self, _: WlSurface) -> Option<WlShellSurface> {
        let shell_surface = WlShellSurface(self.next());
        self.shell_surfaces.borrow_mut().push(shell_surface);
        Some(shell_surface)
    }

    fn destroy_shell_surface(&self, shell_surface: WlShellSurface) {
        self.shell_surfaces.borrow_mut().retain(|&live| live != shell_surface);
    }

    fn set_toplevel(&self, shell_surface: WlShellSurface) {
        self.toplevels.borrow_mut().push(shell_surface);
    }

    fn create_egl_window(&self, _: WlSurface, width: i32, height: i32) -> Option<WlEglWindow> {
        let window = WlEglWindow(self.next());
        self.egl_windows.borrow_mut().push((window, width, height));
        Some(window)
    }

    fn resize_egl_window(&self, window: WlEglWindow, width: i32, height: i32, dx: i32, dy: i32) {
        self.resizes.borrow_mut().push((width, height, dx, dy));
        for entry in self.egl_windows.borrow_mut().iter_mut() {
            if entry.0 == window {
                *entry = (window, width, height);
            }
        }
    }

    fn destroy_egl_window(&self, window: WlEglWindow) {
        self.egl_windows.borrow_mut().retain(|&(live, _, _)| live != window);
    }

    fn request_frame(&self, _: WlSurface) -> Option<FrameCallbackId> {
        if self.fail_frame.get() {
            return None;
        }
        let callback = FrameCallbackId(self.next());
        self.callbacks.borrow_mut().push(callback);
        Some(callback)
    }

    fn destroy_frame_callback(&self, callback: FrameCallbackId) {
        self.callbacks.borrow_mut().retain(|&live| live != callback);
    }

    fn flush(&self) -> io::Result<()> {
        self.flushes.set(self.flushes.get() + 1);
        match self.flush_error.take() {
            Some(kind) => Err(io::Error::from(kind)),
            None => Ok(()),
        }
    }

    fn dispatch(&self) -> io::Result<()> {
        Ok(())
    }

    fn dispatch_pending(&self) -> io::Result<()> {
        Ok(())
    }

    fn take_events(&self) -> Vec<WaylandEvent> {
        self.events.replace(vec![])
    }
}

pub(crate) struct MockXlib {
    next_window: Cell<XWindow>,
    /// Windows created by the backend: id, visual, size and event mask.
    pub(crate) created: RefCell<Vec<(XWindow, u32, i32, i32, u32)>>,
    pub(crate) windows: RefCell<Vec<XWindow>>,
    pub(crate) destroyed: RefCell<Vec<XWindow>>,
    pub(crate) mapped: RefCell<Vec<XWindow>>,
    pub(crate) size_hints: RefCell<Vec<(XWindow, (i32, i32), (i32, i32))>>,
    pub(crate) selected_input: RefCell<Vec<(XWindow, u32)>>,
    pub(crate) foreign_geometry: Cell<WindowGeometry>,
    pub(crate) root_position: Cell<(i32, i32)>,
    pub(crate) events: RefCell<VecDeque<XlibEvent>>,
}

impl MockXlib {
    pub(crate) fn new() -> MockXlib {
        MockXlib {
            next_window: Cell::new(0x40_0001),
            created: RefCell::new(vec![]),
            windows: RefCell::new(vec![]),
            destroyed: RefCell::new(vec![]),
            mapped: RefCell::new(vec![]),
            size_hints: RefCell::new(vec![]),
            selected_input: RefCell::new(vec![]),
            foreign_geometry: Cell::new(WindowGeometry::default()),
            root_position: Cell::new((0, 0)),
            events: RefCell::new(VecDeque::new()),
        }
    }
}

impl XlibClient for MockXlib {
    fn display(&self) -> *mut c_void {
        handle(0x2d)
    }

    fn fd(&self) -> RawFd {
        MOCK_XLIB_FD
    }

    fn create_window(&self, visual_id: u32, width: i32, height: i32, event_mask: u32)
                     -> Result<XWindow, String> {
        let window = self.next_window.get();
        self.next_window.set(window + 1);
        self.created.borrow_mut().push((window, visual_id, width, height, event_mask));
        self.windows.borrow_mut().push(window);
        Ok(window)
    }

    fn destroy_window(&self, window: XWindow) -> Result<(), String> {
        self.destroyed.borrow_mut().push(window);
        let mut windows = self.windows.borrow_mut();
        match windows.iter().position(|&live| live == window) {
            Some(index) => {
                windows.remove(index);
                Ok(())
            }
            None => Err("BadWindow (invalid Window parameter)".to_owned()),
        }
    }

    fn map_window(&self, window: XWindow) {
        self.mapped.borrow_mut().push(window);
    }

    fn unmap_window(&self, window: XWindow) {
        self.mapped.borrow_mut().retain(|&mapped| mapped != window);
    }

    fn set_size_hints(&self, window: XWindow, min: (i32, i32), max: (i32, i32)) {
        self.size_hints.borrow_mut().push((window, min, max));
    }

    fn window_geometry(&self, _: XWindow) -> Result<WindowGeometry, String> {
        Ok(self.foreign_geometry.get())
    }

    fn select_input(&self, window: XWindow, event_mask: u32) {
        self.selected_input.borrow_mut().push((window, event_mask));
    }

    fn root_position(&self, _: XWindow) -> (i32, i32) {
        self.root_position.get()
    }

    fn has_pending_events(&self) -> bool {
        !self.events.borrow().is_empty()
    }

    fn next_events(&self) -> Vec<XlibEvent> {
        self.events.borrow_mut().drain(..).collect()
    }
}

/// A [`Platform`] whose libraries are the mocks above. Backends without a mock fail to connect.
pub(crate) struct MockPlatform {
    pub(crate) egl: Rc<MockEgl>,
    pub(crate) drm: Option<Rc<MockDrm>>,
    pub(crate) gbm: Rc<MockGbm>,
    pub(crate) wayland: Option<Rc<MockWayland>>,
    pub(crate) xlib: Option<Rc<MockXlib>>,
    env: RefCell<FnvHashMap<String, String>>,
    /// Whether variables not set with `set_env` are read from the process environment.
    pub(crate) process_env: Cell<bool>,
    pub(crate) window_formats: RefCell<Vec<EGLint>>,
    /// Paths passed to `open_device`, with the descriptors handed out for them.
    pub(crate) opened_devices: RefCell<Vec<(String, RawFd)>>,
    /// The descriptors the DRM and GBM devices were created on.
    pub(crate) device_fds: RefCell<Vec<RawFd>>,
}

impl MockPlatform {
    pub(crate) fn new(egl: MockEgl) -> MockPlatform {
        MockPlatform {
            egl: Rc::new(egl),
            drm: None,
            gbm: Rc::new(MockGbm::new()),
            wayland: None,
            xlib: None,
            env: RefCell::new(FnvHashMap::default()),
            process_env: Cell::new(false),
            window_formats: RefCell::new(vec![]),
            opened_devices: RefCell::new(vec![]),
            device_fds: RefCell::new(vec![]),
        }
    }

    pub(crate) fn with_drm(mut self, drm: MockDrm) -> MockPlatform {
        self.drm = Some(Rc::new(drm));
        self
    }

    pub(crate) fn with_wayland(mut self) -> MockPlatform {
        self.wayland = Some(Rc::new(MockWayland::new()));
        self
    }

    pub(crate) fn with_xlib(mut self) -> MockPlatform {
        self.xlib = Some(Rc::new(MockXlib::new()));
        self
    }

    pub(crate) fn set_env(&self, name: &str, value: &str) {
        self.env.borrow_mut().insert(name.to_owned(), value.to_owned());
    }

    pub(crate) fn drm(&self) -> &MockDrm {
        self.drm.as_ref().expect("no mock DRM device")
    }

    pub(crate) fn wayland(&self) -> &MockWayland {
        self.wayland.as_ref().expect("no mock Wayland client")
    }

    pub(crate) fn xlib(&self) -> &MockXlib {
        self.xlib.as_ref().expect("no mock Xlib client")
    }
}

impl Platform for MockPlatform {
    fn egl(&self) -> Result<Rc<dyn EglApi>, Error> {
        Ok(self.egl.clone() as Rc<dyn EglApi>)
    }

    fn env_var(&self, name: &str) -> Option<String> {
        if let Some(value) = self.env.borrow().get(name) {
            return Some(value.clone());
        }
        if self.process_env.get() {
            env::var(name).ok()
        } else {
            None
        }
    }

    fn open_device(&self, path: &str) -> io::Result<OwnedFd> {
        if self.drm.is_none() {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("{} doesn't exist", path)));
        }
        // Any real descriptor will do, so its lifetime can be observed.
        let fd = OwnedFd::from(File::open("/dev/null")?);
        self.opened_devices.borrow_mut().push((path.to_owned(), fd.as_raw_fd()));
        Ok(fd)
    }

    fn drm_device(&self, fd: RawFd) -> Result<Rc<dyn DrmDevice>, Error> {
        self.device_fds.borrow_mut().push(fd);
        match self.drm {
            Some(ref drm) => Ok(drm.clone() as Rc<dyn DrmDevice>),
            None => Err(Error::Init("No DRM device".to_owned())),
        }
    }

    fn gbm_device(&self, fd: RawFd) -> Result<Rc<dyn GbmDevice>, Error> {
        self.device_fds.borrow_mut().push(fd);
        Ok(self.gbm.clone() as Rc<dyn GbmDevice>)
    }

    fn wayland_client(&self, _: Option<NonNull<c_void>>)
                      -> Result<Rc<dyn WaylandClient>, Error> {
        match self.wayland {
            Some(ref wayland) => Ok(wayland.clone() as Rc<dyn WaylandClient>),
            None => Err(Error::Init("No Wayland compositor".to_owned())),
        }
    }

    fn xlib_client(&self, _: Option<NonNull<c_void>>) -> Result<Rc<dyn XlibClient>, Error> {
        match self.xlib {
            Some(ref xlib) => Ok(xlib.clone() as Rc<dyn XlibClient>),
            None => Err(Error::Init("No X server".to_owned())),
        }
    }

    fn set_native_window_format(&self, _: NonNull<c_void>, format: EGLint) -> Result<(), Error> {
        self.window_formats.borrow_mut().push(format);
        Ok(())
    }
}
