// cglib-winsys/src/platform/unix/wayland/mod.rs
//
//! Wayland surfaces through `wl_shell`.
//!
//! Presentation is paced by frame callbacks. Each swap requests one for the frame it submits,
//! and the compositor's `done` reports that frame as synced and complete. Resizes requested in
//! the middle of a frame wait for the next swap.

pub mod client;
#[cfg(linux)]
pub(crate) mod native;

use self::client::{FrameCallbackId, WaylandClient, WaylandEvent, WlEglWindow, WlShellSurface};
use self::client::WlSurface;
use crate::egl;
use crate::egl::types::{EGLConfig, EGLSurface};
use crate::egl::{EGLNativeDisplayType, EGLNativeWindowType};
use crate::event_loop::{MainLoop, PollFdEvents};
use crate::frame_info::{FrameEvent, FrameInfo};
use crate::info::{DisplayFeatures, FeatureFlags, PrivateFeatureFlags, WinsysFeatureFlags};
use crate::onscreen::{Onscreen, OnscreenInner, WeakOnscreen};
use crate::platform::generic::egl::context::make_current;
use crate::platform::generic::egl::ffi::EGL_PLATFORM_WAYLAND_KHR;
use crate::platform::generic::egl::{surface, CurrentBinding, EglDisplay, EglFeatureFlags};
use crate::platform::generic::egl::{EglOnscreen, EglRenderer};
use crate::platform::{DisplayBackendState, OnscreenBackendState, RendererBackendState};
use crate::platform::{WinsysBackend, WinsysRenderer};
use crate::renderer::Renderer;
use crate::{Error, Rect};

use fnv::FnvHashMap;
use std::cell::RefCell;
use std::io;
use std::os::raw::c_void;
use std::os::unix::io::RawFd;
use std::ptr::NonNull;
use std::rc::Rc;

/// The frame a frame callback was requested for.
struct PendingFrame {
    onscreen: WeakOnscreen,
    info: Rc<FrameInfo>,
}

pub(crate) struct WaylandRenderer {
    pub(crate) client: Rc<dyn WaylandClient>,
    fd: RawFd,
    event_dispatch: bool,
    frames: RefCell<FnvHashMap<FrameCallbackId, PendingFrame>>,
}

#[derive(Default)]
pub(crate) struct WaylandDisplay {
    dummy_surface: Option<WlSurface>,
    dummy_window: Option<WlEglWindow>,
}

/// A resize waiting for the next swap. Offsets accumulate; the size is the latest requested.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct PendingResize {
    width: i32,
    height: i32,
    dx: i32,
    dy: i32,
}

pub(crate) struct WaylandOnscreen {
    surface: WlSurface,
    shell_surface: Option<WlShellSurface>,
    egl_window: WlEglWindow,
    foreign: bool,
    toplevel_set: bool,
    pending_resize: Option<PendingResize>,
    frame_callbacks: Vec<FrameCallbackId>,
}

impl WaylandRenderer {
    pub(crate) fn connect(renderer: &Renderer) -> Result<WinsysRenderer, Error> {
        let platform = renderer.platform();
        let (foreign_display, event_dispatch) = {
            let config = renderer.config();
            (config.wayland_display, config.wayland_event_dispatch)
        };

        let client = platform.wayland_client(foreign_display)?;
        let egl = EglRenderer::connect(platform.egl()?,
                                       Some(EGL_PLATFORM_WAYLAND_KHR),
                                       client.display() as EGLNativeDisplayType,
                                       renderer.resolved_driver())?;

        let fd = client.fd();
        if event_dispatch {
            register_display_fd(renderer, fd);
        }

        Ok(WinsysRenderer {
            egl,
            backend: RendererBackendState::Wayland(WaylandRenderer {
                client,
                fd,
                event_dispatch,
                frames: RefCell::new(FnvHashMap::default()),
            }),
        })
    }

    /// Flushes requests before the main loop sleeps, and handles events already read.
    fn prepare(&self, main_loop: &MainLoop) {
        if let Err(err) = self.client.flush() {
            match err.kind() {
                // Wake up once the socket is writable again.
                io::ErrorKind::WouldBlock => {
                    main_loop.modify_fd(self.fd, PollFdEvents::IN | PollFdEvents::OUT)
                }
                io::ErrorKind::Interrupted => {}
                _ => {
                    warn!("Failed to flush the Wayland display, no longer polling it: {}", err);
                    main_loop.remove_fd(self.fd);
                }
            }
        }

        if let Err(err) = self.client.dispatch_pending() {
            warn!("Failed to dispatch pending Wayland events: {}", err);
        }
        self.handle_events();
    }

    fn dispatch(&self, main_loop: &MainLoop, revents: PollFdEvents) {
        if revents.contains(PollFdEvents::IN) {
            if let Err(err) = self.client.dispatch() {
                if !is_transient(&err) {
                    self.socket_error(main_loop, err);
                    return;
                }
            }
        }

        if revents.contains(PollFdEvents::OUT) {
            match self.client.flush() {
                // Nothing left to write.
                Ok(()) => main_loop.modify_fd(self.fd, PollFdEvents::IN),
                Err(ref err) if is_transient(err) => {}
                Err(err) => {
                    self.socket_error(main_loop, err);
                    return;
                }
            }
        }

        self.handle_events();
    }

    fn socket_error(&self, main_loop: &MainLoop, err: io::Error) {
        warn!("Error on the Wayland socket, no longer polling it: {}", err);
        main_loop.remove_fd(self.fd);
        self.handle_events();
    }

    /// Reports the frames whose callbacks fired.
    fn handle_events(&self) {
        for event in self.client.take_events() {
            match event {
                WaylandEvent::FrameDone { callback, .. } => self.frame_done(callback),
            }
        }
    }

    fn frame_done(&self, callback: FrameCallbackId) {
        let frame = self.frames.borrow_mut().remove(&callback);
        self.client.destroy_frame_callback(callback);

        let frame = match frame {
            None => {
                warn!("Frame callback {:?} doesn't belong to any onscreen", callback.0);
                return;
            }
            Some(frame) => frame,
        };
        if let Some(onscreen) = frame.onscreen.upgrade() {
            with_wayland_onscreen(&onscreen, |wayland_onscreen| {
                wayland_onscreen.frame_callbacks.retain(|&id| id != callback)
            });
            onscreen.queue_event(FrameEvent::Sync, frame.info.clone());
            onscreen.queue_event(FrameEvent::Complete, frame.info);
        }
    }

    /// Applies a resize that was held back while a frame was being drawn.
    fn flush_pending_resize(&self, onscreen: &Onscreen) {
        let pending = with_wayland_onscreen(onscreen, |wayland_onscreen| {
            wayland_onscreen.pending_resize.take().map(|resize| (wayland_onscreen.egl_window, resize))
        }).flatten();

        if let Some((egl_window, resize)) = pending {
            self.client.resize_egl_window(egl_window,
                                          resize.width,
                                          resize.height,
                                          resize.dx,
                                          resize.dy);
            onscreen.update_size(resize.width, resize.height);
            onscreen.queue_full_dirty();
            onscreen.queue_resize_notify();
        }
    }

    fn destroy_window_surfaces(&self, wayland_onscreen: &WaylandOnscreen) {
        self.client.destroy_egl_window(wayland_onscreen.egl_window);
        // The shell surface must go before its surface.
        if let Some(shell_surface) = wayland_onscreen.shell_surface {
            self.client.destroy_shell_surface(shell_surface);
        }
        if !wayland_onscreen.foreign {
            self.client.destroy_surface(wayland_onscreen.surface);
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

fn register_display_fd(renderer: &Renderer, fd: RawFd) {
    let prepare_renderer = renderer.downgrade();
    let dispatch_renderer = renderer.downgrade();
    renderer.main_loop().add_fd(fd, PollFdEvents::IN, Some(Box::new(move || {
        if let Some(renderer) = prepare_renderer.upgrade() {
            if let Some(winsys) = renderer.winsys() {
                if let RendererBackendState::Wayland(ref wayland) = winsys.backend {
                    wayland.prepare(renderer.main_loop());
                }
            }
        }
        None
    })), Box::new(move |revents| {
        if revents.is_empty() {
            return;
        }
        if let Some(renderer) = dispatch_renderer.upgrade() {
            if let Some(winsys) = renderer.winsys() {
                if let RendererBackendState::Wayland(ref wayland) = winsys.backend {
                    wayland.dispatch(renderer.main_loop(), revents);
                }
            }
        }
    }));
}

fn wayland_display_mut(display: &mut EglDisplay) -> Option<&mut WaylandDisplay> {
    match display.platform {
        DisplayBackendState::Wayland(ref mut wayland_display) => Some(wayland_display),
        _ => None,
    }
}

fn with_wayland_onscreen<F, R>(onscreen: &Onscreen, f: F) -> Option<R>
                               where F: FnOnce(&mut WaylandOnscreen) -> R {
    onscreen.with_winsys(|egl_onscreen| match egl_onscreen.platform {
        OnscreenBackendState::Wayland(ref mut wayland_onscreen) => Some(f(wayland_onscreen)),
        _ => None,
    }).flatten()
}

fn wayland_winsys(onscreen: &Onscreen) -> Option<Rc<WinsysRenderer>> {
    let winsys = onscreen.display().winsys_renderer()?;
    match winsys.backend {
        RendererBackendState::Wayland(_) => Some(winsys),
        _ => None,
    }
}

impl WinsysBackend for WaylandRenderer {
    fn disconnect(&self, main_loop: &MainLoop) {
        if self.event_dispatch {
            main_loop.remove_fd(self.fd);
        }
    }

    fn display_setup(&self, _egl: &EglRenderer) -> Result<DisplayBackendState, Error> {
        Ok(DisplayBackendState::Wayland(WaylandDisplay::default()))
    }

    fn context_created(&self, egl: &EglRenderer, display: &mut EglDisplay) -> Result<(), Error> {
        if !egl.has_feature(EglFeatureFlags::SURFACELESS_CONTEXT) {
            let surface = self.client.create_surface().ok_or_else(|| {
                Error::CreateContext("Failed to create a dummy wayland surface".to_owned())
            })?;
            let window = self.client.create_egl_window(surface, 1, 1);
            if let Some(wayland_display) = wayland_display_mut(display) {
                wayland_display.dummy_surface = Some(surface);
                wayland_display.dummy_window = window;
            }
            let window = window.ok_or_else(|| {
                Error::CreateContext("Failed to create a dummy wayland native egl surface"
                                         .to_owned())
            })?;

            display.dummy_surface = egl.api
                                       .create_window_surface(egl.display,
                                                              display.config,
                                                              window.0 as EGLNativeWindowType,
                                                              &[])
                                       .map_err(|err| {
                Error::CreateContext(format!("Failed to create a dummy EGL surface: {}", err))
            })?;
        }

        let binding = CurrentBinding {
            draw: display.dummy_surface,
            read: display.dummy_surface,
            context: display.context,
        };
        make_current(egl, display, binding).map_err(|err| {
            Error::CreateContext(format!("Unable to eglMakeCurrent with dummy surface: {}", err))
        })?;
        Ok(())
    }

    fn cleanup_context(&self, egl: &EglRenderer, display: &mut EglDisplay) {
        if display.dummy_surface != egl::NO_SURFACE {
            if let Err(err) = egl.api.destroy_surface(egl.display, display.dummy_surface) {
                warn!("Failed to destroy the dummy EGL surface: {}", err);
            }
            display.dummy_surface = egl::NO_SURFACE;
        }
        if let Some(wayland_display) = wayland_display_mut(display) {
            if let Some(window) = wayland_display.dummy_window.take() {
                self.client.destroy_egl_window(window);
            }
            if let Some(surface) = wayland_display.dummy_surface.take() {
                self.client.destroy_surface(surface);
            }
        }
    }

    fn display_init(&self, _egl: &EglRenderer, _display: &EglDisplay,
                    features: &mut DisplayFeatures) {
        features.features |= FeatureFlags::ONSCREEN_MULTIPLE;
        features.winsys_features |= WinsysFeatureFlags::MULTIPLE_ONSCREEN |
            WinsysFeatureFlags::SYNC_AND_COMPLETE_EVENT;
        features.private_features |= PrivateFeatureFlags::DIRTY_EVENTS;
    }

    fn onscreen_init(&self,
                     egl: &EglRenderer,
                     _display: &mut EglDisplay,
                     onscreen: &Onscreen,
                     config: EGLConfig)
                     -> Result<EglOnscreen, Error> {
        let foreign_surface = onscreen.inner.foreign.borrow().wayland_surface;
        let (surface, foreign) = match foreign_surface {
            Some(surface) => (WlSurface(surface.as_ptr()), true),
            None => {
                let surface = self.client.create_surface().ok_or_else(|| {
                    Error::CreateOnscreen("Error while creating wayland surface for Onscreen"
                                              .to_owned())
                })?;
                (surface, false)
            }
        };

        let egl_window = match self.client.create_egl_window(surface,
                                                             onscreen.width(),
                                                             onscreen.height()) {
            Some(egl_window) => egl_window,
            None => {
                if !foreign {
                    self.client.destroy_surface(surface);
                }
                return Err(Error::CreateOnscreen(
                    "Error while creating wayland egl native window".to_owned()));
            }
        };

        // Foreign surfaces get their role from the application.
        let shell_surface = if foreign { None } else { self.client.get_shell_surface(surface) };
        let wayland_onscreen = WaylandOnscreen {
            surface,
            shell_surface,
            egl_window,
            foreign,
            toplevel_set: false,
            pending_resize: None,
            frame_callbacks: vec![],
        };
        if !foreign && shell_surface.is_none() {
            self.destroy_window_surfaces(&wayland_onscreen);
            return Err(Error::CreateOnscreen(
                "Error while creating wayland shell surface for Onscreen".to_owned()));
        }

        let egl_surface: EGLSurface =
            match egl.api.create_window_surface(egl.display,
                                                config,
                                                egl_window.0 as EGLNativeWindowType,
                                                &[]) {
                Ok(egl_surface) => egl_surface,
                Err(err) => {
                    self.destroy_window_surfaces(&wayland_onscreen);
                    return Err(Error::CreateOnscreen(
                        format!("Unable to create an EGL window surface: {}", err)));
                }
            };

        Ok(EglOnscreen {
            surface: egl_surface,
            owns_surface: true,
            platform: OnscreenBackendState::Wayland(wayland_onscreen),
        })
    }

    fn onscreen_deinit(&self,
                       _egl: &EglRenderer,
                       _display: &mut EglDisplay,
                       _onscreen: &OnscreenInner,
                       egl_onscreen: &mut EglOnscreen) {
        if let OnscreenBackendState::Wayland(ref mut wayland_onscreen) = egl_onscreen.platform {
            let mut frames = self.frames.borrow_mut();
            for callback in wayland_onscreen.frame_callbacks.drain(..) {
                frames.remove(&callback);
                self.client.destroy_frame_callback(callback);
            }
            drop(frames);
            self.destroy_window_surfaces(wayland_onscreen);
        }
    }

    fn swap_buffers_with_damage(&self, egl: &EglRenderer, onscreen: &Onscreen, rects: &[Rect]) {
        self.flush_pending_resize(onscreen);

        // Completion is reported per frame, so the record can leave the queue now.
        let info = onscreen.pop_pending_frame_back();
        let surface = with_wayland_onscreen(onscreen, |wayland_onscreen| wayland_onscreen.surface);

        if let (Some(info), Some(surface)) = (info, surface) {
            match self.client.request_frame(surface) {
                Some(callback) => {
                    with_wayland_onscreen(onscreen, |wayland_onscreen| {
                        wayland_onscreen.frame_callbacks.push(callback)
                    });
                    self.frames.borrow_mut().insert(callback, PendingFrame {
                        onscreen: onscreen.downgrade(),
                        info,
                    });
                }
                None => {
                    warn!("Failed to request a frame callback");
                    onscreen.queue_event(FrameEvent::Sync, info.clone());
                    onscreen.queue_event(FrameEvent::Complete, info);
                }
            }
        }

        surface::swap_buffers_with_damage(egl, onscreen, rects);
    }

    fn set_visibility(&self, onscreen: &Onscreen, visible: bool) {
        // Hiding has no wl_shell equivalent.
        if !visible {
            return;
        }
        let shown = with_wayland_onscreen(onscreen, |wayland_onscreen| {
            match wayland_onscreen.shell_surface {
                Some(shell_surface) if !wayland_onscreen.toplevel_set => {
                    wayland_onscreen.toplevel_set = true;
                    Some(shell_surface)
                }
                _ => None,
            }
        }).flatten();
        if let Some(shell_surface) = shown {
            self.client.set_toplevel(shell_surface);
            onscreen.queue_full_dirty();
        }
    }
}

impl Renderer {
    /// Uses an application-owned `wl_display` instead of connecting to the default one.
    ///
    /// The display is never disconnected by the renderer.
    pub fn wayland_set_foreign_display(&self, display: NonNull<c_void>) {
        self.config_mut().wayland_display = Some(display);
    }

    /// Whether the renderer registers the display fd with its event loop. When disabled the
    /// application must dispatch the display itself for frame callbacks to arrive.
    pub fn wayland_set_event_dispatch_enabled(&self, enabled: bool) {
        self.config_mut().wayland_event_dispatch = enabled;
    }

    /// The `wl_display` in use, once connected to Wayland.
    pub fn wayland_display(&self) -> Option<*mut c_void> {
        let winsys = self.winsys()?;
        match winsys.backend {
            RendererBackendState::Wayland(ref wayland) => Some(wayland.client.display()),
            _ => None,
        }
    }
}

impl Onscreen {
    /// Renders into an application-owned `wl_surface`.
    ///
    /// Must be called before allocation. No shell surface is created for it.
    pub fn wayland_set_foreign_surface(&self, surface: NonNull<c_void>) {
        assert!(!self.is_allocated(), "foreign surfaces must be set before allocation");
        self.inner.foreign.borrow_mut().wayland_surface = Some(surface);
    }

    /// The `wl_surface`, once allocated on Wayland.
    pub fn wayland_surface(&self) -> Option<*mut c_void> {
        with_wayland_onscreen(self, |wayland_onscreen| wayland_onscreen.surface.0)
    }

    /// The `wl_shell_surface`, once allocated on Wayland. Foreign surfaces have none.
    pub fn wayland_shell_surface(&self) -> Option<*mut c_void> {
        with_wayland_onscreen(self, |wayland_onscreen| {
            wayland_onscreen.shell_surface.map(|shell_surface| shell_surface.0)
        }).flatten()
    }

    /// Resizes the surface, moving its contents by `dx`, `dy`.
    ///
    /// While a frame is being drawn (after [`Onscreen::begin_frame`]) the resize waits for the
    /// next swap. Repeated requests before then keep the latest size and add up the offsets.
    pub fn wayland_resize(&self, width: i32, height: i32, dx: i32, dy: i32) {
        if !self.is_allocated() {
            let mut state = self.inner.state.borrow_mut();
            state.width = width;
            state.height = height;
            return;
        }

        if self.width() == width && self.height() == height && dx == 0 && dy == 0 {
            return;
        }

        with_wayland_onscreen(self, |wayland_onscreen| {
            let mut resize = wayland_onscreen.pending_resize.unwrap_or_default();
            resize.width = width;
            resize.height = height;
            resize.dx += dx;
            resize.dy += dy;
            wayland_onscreen.pending_resize = Some(resize);
        });

        // Mesa may only apply the resize at the next swap if something has been drawn.
        let mid_scene = self.inner.state.borrow().mid_scene;
        if !mid_scene {
            if let Some(winsys) = wayland_winsys(self) {
                if let RendererBackendState::Wayland(ref wayland) = winsys.backend {
                    wayland.flush_pending_resize(self);
                }
            }
        }
    }
}
