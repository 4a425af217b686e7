// cglib-winsys/src/platform/unix/x11/mod.rs
//
//! X11 windows through Xlib.
//!
//! Xlib gives no presentation feedback, so frame events are synthesized right after each swap.
//! `ConfigureNotify` drives resizes and `Expose` drives dirty regions.

pub mod client;
#[cfg(x11)]
pub(crate) mod native;

use self::client::{WindowGeometry, XWindow, XlibClient, XlibEvent, ONSCREEN_EVENT_MASK};
use crate::egl;
use crate::egl::types::{EGLConfig, EGLint};
use crate::egl::{EGLNativeDisplayType, EGLNativeWindowType};
use crate::event_loop::{MainLoop, PollFdEvents};
use crate::info::{DisplayFeatures, FeatureFlags, PrivateFeatureFlags, WinsysFeatureFlags};
use crate::onscreen::{Onscreen, OnscreenInner, WeakOnscreen};
use crate::platform::generic::egl::context::make_current;
use crate::platform::generic::egl::ffi::EGL_PLATFORM_X11_KHR;
use crate::platform::generic::egl::{CurrentBinding, EglDisplay, EglFeatureFlags, EglOnscreen};
use crate::platform::generic::egl::EglRenderer;
use crate::platform::{DisplayBackendState, OnscreenBackendState, RendererBackendState};
use crate::platform::{WinsysBackend, WinsysRenderer};
use crate::renderer::Renderer;
use crate::{Error, Rect};

use euclid::default::{Point2D, Size2D};
use fnv::FnvHashMap;
use std::cell::RefCell;
use std::os::raw::c_void;
use std::os::unix::io::RawFd;
use std::ptr::NonNull;
use std::rc::Rc;
use std::time::Duration;

pub(crate) struct XlibRenderer {
    pub(crate) client: Rc<dyn XlibClient>,
    fd: RawFd,
    event_retrieval: bool,
    windows: RefCell<FnvHashMap<XWindow, WeakOnscreen>>,
}

#[derive(Default)]
pub(crate) struct XlibDisplay {
    dummy_window: Option<XWindow>,
}

pub(crate) struct XlibOnscreen {
    window: XWindow,
    foreign: bool,
    x: i32,
    y: i32,
}

impl XlibRenderer {
    pub(crate) fn connect(renderer: &Renderer) -> Result<WinsysRenderer, Error> {
        let platform = renderer.platform();
        let (foreign_display, event_retrieval) = {
            let config = renderer.config();
            (config.xlib_display, config.xlib_event_retrieval)
        };

        let client = platform.xlib_client(foreign_display)?;
        let egl = EglRenderer::connect(platform.egl()?,
                                       Some(EGL_PLATFORM_X11_KHR),
                                       client.display() as EGLNativeDisplayType,
                                       renderer.resolved_driver())?;

        let fd = client.fd();
        if event_retrieval {
            let prepare_client = client.clone();
            let weak_renderer = renderer.downgrade();
            renderer.main_loop().add_fd(fd, PollFdEvents::IN, Some(Box::new(move || {
                // Xlib may already have read events off the socket.
                if prepare_client.has_pending_events() { Some(Duration::ZERO) } else { None }
            })), Box::new(move |_| {
                let winsys = match weak_renderer.upgrade().and_then(|renderer| renderer.winsys()) {
                    None => return,
                    Some(winsys) => winsys,
                };
                if let RendererBackendState::X11(ref xlib) = winsys.backend {
                    for event in xlib.client.next_events() {
                        xlib.handle_event(&event);
                    }
                }
            }));
        }

        Ok(WinsysRenderer {
            egl,
            backend: RendererBackendState::X11(XlibRenderer {
                client,
                fd,
                event_retrieval,
                windows: RefCell::new(FnvHashMap::default()),
            }),
        })
    }

    fn find_onscreen(&self, window: XWindow) -> Option<Onscreen> {
        self.windows.borrow().get(&window).and_then(WeakOnscreen::upgrade)
    }

    pub(crate) fn handle_event(&self, event: &XlibEvent) {
        match *event {
            XlibEvent::Configure { window, x, y, width, height, send_event } => {
                let onscreen = match self.find_onscreen(window) {
                    None => {
                        warn!("Ignoring spurious ConfigureNotify that couldn't be mapped to an \
                               onscreen window");
                        return;
                    }
                    Some(onscreen) => onscreen,
                };

                onscreen.update_size(width, height);

                let foreign = with_xlib_onscreen(&onscreen, |xlib_onscreen| xlib_onscreen.foreign);
                if foreign == Some(false) {
                    // Only synthetic events from the window manager are in root coordinates.
                    let (x, y) = if send_event { (x, y) } else { self.client.root_position(window) };
                    with_xlib_onscreen(&onscreen, |xlib_onscreen| {
                        xlib_onscreen.x = x;
                        xlib_onscreen.y = y;
                    });
                }

                onscreen.queue_resize_notify();
            }
            XlibEvent::Expose { window, x, y, width, height } => {
                if let Some(onscreen) = self.find_onscreen(window) {
                    onscreen.queue_dirty(Rect::new(Point2D::new(x, y), Size2D::new(width, height)));
                }
            }
            XlibEvent::Other => {}
        }
    }

    fn visual_id(&self, egl: &EglRenderer, config: EGLConfig) -> Result<u32, Error> {
        egl.api
           .get_config_attrib(egl.display, config, egl::NATIVE_VISUAL_ID as EGLint)
           .map(|visual_id| visual_id as u32)
           .map_err(|err| {
               Error::CreateOnscreen(format!("Unable to retrieve the X11 visual: {}", err))
           })
    }

    fn destroy_window(&self, window: XWindow) {
        if let Err(err) = self.client.destroy_window(window) {
            warn!("X Error while destroying X window: {}", err);
        }
    }
}

fn xlib_display_mut(display: &mut EglDisplay) -> Option<&mut XlibDisplay> {
    match display.platform {
        DisplayBackendState::X11(ref mut xlib_display) => Some(xlib_display),
        _ => None,
    }
}

fn with_xlib_onscreen<F, R>(onscreen: &Onscreen, f: F) -> Option<R>
                            where F: FnOnce(&mut XlibOnscreen) -> R {
    onscreen.with_winsys(|egl_onscreen| match egl_onscreen.platform {
        OnscreenBackendState::X11(ref mut xlib_onscreen) => Some(f(xlib_onscreen)),
        _ => None,
    }).flatten()
}

impl WinsysBackend for XlibRenderer {
    fn disconnect(&self, main_loop: &MainLoop) {
        if self.event_retrieval {
            main_loop.remove_fd(self.fd);
        }
    }

    fn display_setup(&self, _egl: &EglRenderer) -> Result<DisplayBackendState, Error> {
        Ok(DisplayBackendState::X11(XlibDisplay::default()))
    }

    fn context_created(&self, egl: &EglRenderer, display: &mut EglDisplay) -> Result<(), Error> {
        if egl.has_feature(EglFeatureFlags::SURFACELESS_CONTEXT) {
            let binding = CurrentBinding {
                draw: egl::NO_SURFACE,
                read: egl::NO_SURFACE,
                context: display.context,
            };
            return make_current(egl, display, binding).map(|_| ()).map_err(|err| {
                Error::CreateContext(format!("Unable to eglMakeCurrent with no surface: {}", err))
            });
        }

        let visual_id = self.visual_id(egl, display.config).map_err(|err| {
            Error::CreateContext(err.message().to_owned())
        })?;
        let window = self.client.create_window(visual_id, 1, 1, 0).map_err(|err| {
            Error::CreateContext(format!("Unable to create a dummy X window: {}", err))
        })?;
        if let Some(xlib_display) = xlib_display_mut(display) {
            xlib_display.dummy_window = Some(window);
        }

        display.dummy_surface = egl.api
                                   .create_window_surface(egl.display,
                                                          display.config,
                                                          window as usize as EGLNativeWindowType,
                                                          &[])
                                   .map_err(|err| {
            Error::CreateContext(format!("Unable to create an EGL surface: {}", err))
        })?;

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
        if let Some(window) = xlib_display_mut(display).and_then(|xlib| xlib.dummy_window.take()) {
            self.destroy_window(window);
        }
    }

    fn display_init(&self, _egl: &EglRenderer, _display: &EglDisplay,
                    features: &mut DisplayFeatures) {
        features.features |= FeatureFlags::ONSCREEN_MULTIPLE;
        features.winsys_features |= WinsysFeatureFlags::MULTIPLE_ONSCREEN;
        features.private_features |= PrivateFeatureFlags::DIRTY_EVENTS;
    }

    fn onscreen_init(&self,
                     egl: &EglRenderer,
                     _display: &mut EglDisplay,
                     onscreen: &Onscreen,
                     config: EGLConfig)
                     -> Result<EglOnscreen, Error> {
        let (foreign_xid, update_mask) = {
            let mut foreign = onscreen.inner.foreign.borrow_mut();
            (foreign.x11_xid, foreign.x11_update_mask.take())
        };

        let window = match foreign_xid {
            Some(xid) => {
                let geometry: WindowGeometry = self.client.window_geometry(xid).map_err(|err| {
                    Error::CreateOnscreen(format!("Unable to query geometry of foreign xid \
                                                   0x{:08X}: {}",
                                                  xid,
                                                  err))
                })?;
                onscreen.update_size(geometry.width, geometry.height);

                match update_mask {
                    Some(mut update_mask) => update_mask(ONSCREEN_EVENT_MASK),
                    None => self.client.select_input(xid, ONSCREEN_EVENT_MASK),
                }
                xid
            }
            None => {
                let visual_id = self.visual_id(egl, config)?;
                let window = self.client
                                 .create_window(visual_id,
                                                onscreen.width(),
                                                onscreen.height(),
                                                ONSCREEN_EVENT_MASK)
                                 .map_err(|err| {
                    Error::CreateOnscreen(format!("X error while creating Window for Onscreen: {}",
                                                  err))
                })?;
                if !onscreen.is_resizable() {
                    let size = (onscreen.width(), onscreen.height());
                    self.client.set_size_hints(window, size, size);
                }
                window
            }
        };
        let foreign = foreign_xid.is_some();

        let surface = egl.api.create_window_surface(egl.display,
                                                    config,
                                                    window as usize as EGLNativeWindowType,
                                                    &[]);
        let surface = match surface {
            Ok(surface) => surface,
            Err(err) => {
                if !foreign {
                    self.destroy_window(window);
                }
                return Err(Error::CreateOnscreen(format!("Failed to create an EGL surface: {}",
                                                         err)));
            }
        };

        self.windows.borrow_mut().insert(window, onscreen.downgrade());
        Ok(EglOnscreen {
            surface,
            owns_surface: true,
            platform: OnscreenBackendState::X11(XlibOnscreen { window, foreign, x: 0, y: 0 }),
        })
    }

    fn onscreen_deinit(&self,
                       _egl: &EglRenderer,
                       _display: &mut EglDisplay,
                       _onscreen: &OnscreenInner,
                       egl_onscreen: &mut EglOnscreen) {
        if let OnscreenBackendState::X11(ref xlib_onscreen) = egl_onscreen.platform {
            self.windows.borrow_mut().remove(&xlib_onscreen.window);
            if !xlib_onscreen.foreign {
                self.destroy_window(xlib_onscreen.window);
            }
        }
    }

    fn set_visibility(&self, onscreen: &Onscreen, visible: bool) {
        if let Some(window) = with_xlib_onscreen(onscreen, |xlib_onscreen| xlib_onscreen.window) {
            if visible {
                self.client.map_window(window);
            } else {
                self.client.unmap_window(window);
            }
        }
    }

    fn set_resizable(&self, onscreen: &Onscreen, resizable: bool) {
        let window = match with_xlib_onscreen(onscreen, |xlib_onscreen| xlib_onscreen.window) {
            None => return,
            Some(window) => window,
        };
        if resizable {
            self.client.set_size_hints(window, (1, 1), (i32::MAX, i32::MAX));
        } else {
            let size = (onscreen.width(), onscreen.height());
            self.client.set_size_hints(window, size, size);
        }
    }
}

impl Renderer {
    /// Uses an application-owned Xlib `Display` instead of opening the default one.
    ///
    /// The display is never closed by the renderer.
    pub fn xlib_set_foreign_display(&self, display: NonNull<c_void>) {
        self.config_mut().xlib_display = Some(display);
    }

    /// Whether the renderer polls the X connection itself. When disabled the application must
    /// pass X events to [`Renderer::xlib_handle_event`].
    pub fn xlib_set_event_retrieval_enabled(&self, enabled: bool) {
        self.config_mut().xlib_event_retrieval = enabled;
    }

    /// The Xlib `Display` in use, once connected to X11.
    pub fn xlib_display(&self) -> Option<*mut c_void> {
        let winsys = self.winsys()?;
        match winsys.backend {
            RendererBackendState::X11(ref xlib) => Some(xlib.client.display()),
            _ => None,
        }
    }

    /// Processes an X event the application retrieved itself.
    pub fn xlib_handle_event(&self, event: &XlibEvent) {
        if let Some(winsys) = self.winsys() {
            if let RendererBackendState::X11(ref xlib) = winsys.backend {
                xlib.handle_event(event);
            }
        }
    }
}

impl Onscreen {
    /// Renders into an application-owned X window.
    ///
    /// Must be called before allocation. `update_mask` is called with the event mask the renderer
    /// needs; the application must add it to whatever it selects on the window.
    pub fn x11_set_foreign_window_xid<F>(&self, xid: XWindow, update_mask: F)
                                         where F: FnMut(u32) + 'static {
        assert!(!self.is_allocated(), "foreign windows must be set before allocation");
        let mut foreign = self.inner.foreign.borrow_mut();
        foreign.x11_xid = Some(xid);
        foreign.x11_update_mask = Some(Box::new(update_mask));
    }

    /// The X window, once allocated on X11.
    pub fn x11_window_xid(&self) -> Option<XWindow> {
        with_xlib_onscreen(self, |xlib_onscreen| xlib_onscreen.window)
    }

    /// The window position in root coordinates as of the last `ConfigureNotify`. Foreign windows
    /// aren't tracked.
    pub fn x11_window_position(&self) -> Option<(i32, i32)> {
        with_xlib_onscreen(self, |xlib_onscreen| {
            if xlib_onscreen.foreign { None } else { Some((xlib_onscreen.x, xlib_onscreen.y)) }
        }).flatten()
    }
}
