// cglib-winsys/src/platform/unix/kms/mod.rs
//
//! Direct scanout through KMS, with buffers allocated by GBM.
//!
//! One onscreen covers the whole layout. Each swap locks the buffer EGL just rendered, registers
//! it as a framebuffer and queues a page flip on every CRTC of the layout. Only one flip is ever
//! in flight per onscreen: the next swap blocks until the previous one completes.

pub mod drm;
pub mod gbm;
pub(crate) mod output;
mod swap;

#[cfg(linux)]
pub(crate) mod device;

pub use self::output::{KmsCrtc, KmsLayout};

use self::drm::{DrmDevice, DRM_CAP_TIMESTAMP_MONOTONIC};
use self::gbm::{BufferObject, GbmBufferFlags, GbmDevice, GbmSurface, GBM_FORMAT_XRGB8888};
use self::output::{KmsEnvConfig, KmsOutput};
use crate::display::Display;
use crate::egl::types::{EGLConfig, EGLSurface};
use crate::egl::{self, EGLNativeDisplayType, EGLNativeWindowType};
use crate::event_loop::{MainLoop, PollFdEvents};
use crate::info::{DisplayFeatures, FeatureFlags, WinsysFeatureFlags};
use crate::onscreen::{Onscreen, OnscreenInner, WeakOnscreen};
use crate::platform::generic::egl::context::make_current;
use crate::platform::generic::egl::ffi::EGL_PLATFORM_GBM_KHR;
use crate::platform::generic::egl::{CurrentBinding, EglDisplay, EglFeatureFlags, EglOnscreen};
use crate::platform::generic::egl::EglRenderer;
use crate::platform::{DisplayBackendState, OnscreenBackendState, RendererBackendState};
use crate::platform::{WinsysBackend, WinsysRenderer};
use crate::renderer::Renderer;
use crate::{Error, Rect};

use fnv::FnvHashMap;
use std::cell::{Cell, RefCell};
use std::mem;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::rc::Rc;

const DEVICE_NAME: &str = "/dev/dri/card0";

/// A flip queued on one or more CRTCs. Holds the onscreen until every CRTC has flipped.
struct FlipRecord {
    onscreen: Onscreen,
    pending: u32,
}

pub(crate) struct KmsRenderer {
    flips: RefCell<FnvHashMap<u64, FlipRecord>>,
    next_flip_id: Cell<u64>,
    pub(crate) drm: Rc<dyn DrmDevice>,
    pub(crate) gbm: Rc<dyn GbmDevice>,
    pub(crate) fd: RawFd,
    env: KmsEnvConfig,
    // Dropped last so the GBM device goes first. `None` for an application-supplied fd.
    _opened_fd: Option<OwnedFd>,
}

pub(crate) struct KmsDisplay {
    outputs: Vec<KmsOutput>,
    pub(crate) layout: KmsLayout,
    pub(crate) pending_set_crtc: bool,
    onscreen: Option<WeakOnscreen>,
    dummy_surface: Option<GbmSurface>,
}

/// A locked GBM buffer registered for scanout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ScanoutBuffer {
    pub(crate) bo: BufferObject,
    pub(crate) framebuffer: u32,
}

pub(crate) struct KmsOnscreen {
    pub(crate) surface: GbmSurface,
    /// On screen now.
    pub(crate) current: Option<ScanoutBuffer>,
    /// Waiting for its flip to complete.
    pub(crate) next: Option<ScanoutBuffer>,
    /// A surface replaced by a resize, whose last buffer stays on screen until the first flip
    /// on the new surface completes.
    pub(crate) retired: Option<(GbmSurface, ScanoutBuffer)>,
}

impl KmsRenderer {
    pub(crate) fn connect(renderer: &Renderer) -> Result<WinsysRenderer, Error> {
        let platform = renderer.platform();
        let env = KmsEnvConfig::read(platform)?;
        let kms_fd = renderer.config().kms_fd;

        let (fd, opened_fd) = match kms_fd {
            Some(fd) if fd >= 0 => (fd, None),
            _ => {
                let opened = platform.open_device(DEVICE_NAME).map_err(|err| {
                    Error::Init(format!("Couldn't open {}: {}", DEVICE_NAME, err))
                })?;
                (opened.as_raw_fd(), Some(opened))
            }
        };

        let drm = platform.drm_device(fd)?;
        let gbm = platform.gbm_device(fd).map_err(|err| {
            Error::Init(format!("Couldn't create gbm device: {}", err.message()))
        })?;

        let egl = EglRenderer::connect(platform.egl()?,
                                       Some(EGL_PLATFORM_GBM_KHR),
                                       gbm.native_display() as EGLNativeDisplayType,
                                       renderer.resolved_driver())?;

        let weak_renderer = renderer.downgrade();
        renderer.main_loop().add_fd(fd, PollFdEvents::IN, None, Box::new(move |revents| {
            if revents.is_empty() {
                return;
            }
            let winsys = match weak_renderer.upgrade().and_then(|renderer| renderer.winsys()) {
                None => return,
                Some(winsys) => winsys,
            };
            if let RendererBackendState::Kms(ref kms) = winsys.backend {
                kms.dispatch_events();
            }
        }));

        Ok(WinsysRenderer {
            egl,
            backend: RendererBackendState::Kms(KmsRenderer {
                flips: RefCell::new(FnvHashMap::default()),
                next_flip_id: Cell::new(1),
                drm,
                gbm,
                fd,
                env,
                _opened_fd: opened_fd,
            }),
        })
    }

    /// Unlocks a buffer that is no longer scanned out.
    fn release_scanout(&self, surface: GbmSurface, buffer: ScanoutBuffer) {
        if let Err(err) = self.drm.remove_framebuffer(buffer.framebuffer) {
            warn!("Failed to remove framebuffer {}: {}", buffer.framebuffer, err);
        }
        self.gbm.release_buffer(surface, buffer.bo);
    }

    /// Unlocks the last buffer of a replaced surface and destroys the surface.
    fn release_retired(&self, surface: GbmSurface, buffer: ScanoutBuffer) {
        self.release_scanout(surface, buffer);
        self.gbm.destroy_surface(surface);
    }

    /// Creates a scanout-capable GBM surface and an EGL surface on it.
    fn create_surfaces(&self, egl: &EglRenderer, config: EGLConfig, width: i32, height: i32)
                       -> Option<(GbmSurface, EGLSurface)> {
        let gbm_surface = self.gbm.create_surface(width as u32,
                                                  height as u32,
                                                  GBM_FORMAT_XRGB8888,
                                                  GbmBufferFlags::SCANOUT |
                                                  GbmBufferFlags::RENDERING)?;
        match egl.api.create_window_surface(egl.display,
                                            config,
                                            gbm_surface.0 as EGLNativeWindowType,
                                            &[]) {
            Ok(egl_surface) => Some((gbm_surface, egl_surface)),
            Err(err) => {
                warn!("Failed to create an EGL surface on the GBM surface: {}", err);
                self.gbm.destroy_surface(gbm_surface);
                None
            }
        }
    }

    /// Swaps in new GBM and EGL surfaces of the given size for the onscreen.
    fn resize_onscreen(&self,
                       egl: &EglRenderer,
                       display: &Display,
                       onscreen: &Onscreen,
                       width: i32,
                       height: i32)
                       -> Result<(), Error> {
        let failed = || Error::CreateOnscreen("Failed to allocate new surface".to_owned());

        // The buffer in flight belongs to the old surface.
        if !self.wait_for_flip_slot(onscreen) {
            return Err(failed());
        }

        let config = display.with_egl(|egl_display| egl_display.config).ok_or_else(failed)?;
        let (gbm_surface, egl_surface) =
            self.create_surfaces(egl, config, width, height).ok_or_else(failed)?;

        let old_surface = onscreen.egl_surface();
        display.with_egl(|egl_display| {
            if egl_display.current.draw == old_surface || egl_display.current.read == old_surface {
                let dummy = egl_display.dummy_surface;
                let binding = CurrentBinding {
                    draw: dummy,
                    read: dummy,
                    context: egl_display.current.context,
                };
                if let Err(err) = make_current(egl, egl_display, binding) {
                    warn!("Failed to rebind the context to its dummy surface: {}", err);
                }
            }
        });
        if let Err(err) = egl.api.destroy_surface(egl.display, old_surface) {
            warn!("Failed to destroy EGL surface: {}", err);
        }

        // The old surface's buffer is still scanned out, so it is kept until the next flip.
        let (stale, unused) = onscreen.with_winsys(|egl_onscreen| {
            egl_onscreen.surface = egl_surface;
            match egl_onscreen.platform {
                OnscreenBackendState::Kms(ref mut kms_onscreen) => {
                    let old = mem::replace(&mut kms_onscreen.surface, gbm_surface);
                    match kms_onscreen.current.take() {
                        Some(current) => (kms_onscreen.retired.replace((old, current)), None),
                        None => (None, Some(old)),
                    }
                }
                _ => (None, None),
            }
        }).unwrap_or((None, None));
        if let Some((surface, buffer)) = stale {
            self.release_retired(surface, buffer);
        }
        if let Some(surface) = unused {
            self.gbm.destroy_surface(surface);
        }

        onscreen.update_size(width, height);
        onscreen.queue_resize_notify();
        Ok(())
    }
}

fn kms_display_mut(display: &mut EglDisplay) -> Option<&mut KmsDisplay> {
    match display.platform {
        DisplayBackendState::Kms(ref mut kms_display) => Some(kms_display),
        _ => None,
    }
}

pub(crate) fn with_kms_display<F, R>(display: &Display, f: F) -> Option<R>
                                     where F: FnOnce(&mut KmsDisplay) -> R {
    display.with_egl(|egl_display| kms_display_mut(egl_display).map(f)).flatten()
}

pub(crate) fn with_kms_onscreen<F, R>(onscreen: &Onscreen, f: F) -> Option<R>
                                      where F: FnOnce(&mut KmsOnscreen) -> R {
    onscreen.with_winsys(|egl_onscreen| match egl_onscreen.platform {
        OnscreenBackendState::Kms(ref mut kms_onscreen) => Some(f(kms_onscreen)),
        _ => None,
    }).flatten()
}

impl WinsysBackend for KmsRenderer {
    fn disconnect(&self, main_loop: &MainLoop) {
        main_loop.remove_fd(self.fd);
        self.drain_flips();
    }

    fn display_setup(&self, _egl: &EglRenderer) -> Result<DisplayBackendState, Error> {
        let setup = output::discover_outputs(&*self.drm, &self.env)?;
        // Modes are set by the first swap.
        Ok(DisplayBackendState::Kms(KmsDisplay {
            outputs: setup.outputs,
            layout: setup.layout,
            pending_set_crtc: true,
            onscreen: None,
            dummy_surface: None,
        }))
    }

    fn display_destroy(&self, _egl: &EglRenderer, display: &mut EglDisplay) {
        if let Some(kms_display) = kms_display_mut(display) {
            for output in kms_display.outputs.drain(..) {
                output::restore_output(&*self.drm, &output);
            }
            kms_display.layout.crtcs.clear();
        }
    }

    fn context_created(&self, egl: &EglRenderer, display: &mut EglDisplay) -> Result<(), Error> {
        if !egl.has_feature(EglFeatureFlags::SURFACELESS_CONTEXT) {
            let gbm_surface = self.gbm
                                  .create_surface(16, 16, GBM_FORMAT_XRGB8888,
                                                  GbmBufferFlags::RENDERING)
                                  .ok_or_else(|| {
                Error::CreateContext("Failed to create dummy GBM surface".to_owned())
            })?;
            if let Some(kms_display) = kms_display_mut(display) {
                kms_display.dummy_surface = Some(gbm_surface);
            }

            display.dummy_surface = egl.api
                                       .create_window_surface(egl.display,
                                                              display.config,
                                                              gbm_surface.0 as EGLNativeWindowType,
                                                              &[])
                                       .map_err(|err| {
                Error::CreateContext(format!("Failed to create dummy EGL surface: {}", err))
            })?;
        }

        let binding = CurrentBinding {
            draw: display.dummy_surface,
            read: display.dummy_surface,
            context: display.context,
        };
        make_current(egl, display, binding).map_err(|err| {
            Error::CreateContext(format!("Failed to make context current: {}", err))
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
        if let Some(gbm_surface) = kms_display_mut(display).and_then(|kms| kms.dummy_surface.take()) {
            self.gbm.destroy_surface(gbm_surface);
        }
    }

    fn display_init(&self, _egl: &EglRenderer, _display: &EglDisplay,
                    features: &mut DisplayFeatures) {
        features.winsys_features |= WinsysFeatureFlags::SYNC_AND_COMPLETE_EVENT;
        if let Ok(1) = self.drm.capability(DRM_CAP_TIMESTAMP_MONOTONIC) {
            features.features |= FeatureFlags::PRESENTATION_TIME;
            features.presentation_clock_is_monotonic = true;
        }
    }

    fn onscreen_init(&self,
                     egl: &EglRenderer,
                     display: &mut EglDisplay,
                     onscreen: &Onscreen,
                     config: EGLConfig)
                     -> Result<EglOnscreen, Error> {
        let kms_display = kms_display_mut(display).ok_or_else(|| {
            Error::CreateOnscreen("The display was not set up for KMS".to_owned())
        })?;

        let existing = kms_display.onscreen.as_ref().and_then(|weak| weak.upgrade());
        if existing.is_some() {
            return Err(Error::CreateOnscreen(
                "Cannot have multiple onscreens in the KMS platform".to_owned()));
        }

        let (width, height) = (kms_display.layout.width, kms_display.layout.height);
        let (gbm_surface, egl_surface) =
            self.create_surfaces(egl, config, width, height).ok_or_else(|| {
                Error::CreateOnscreen("Failed to allocate surface".to_owned())
            })?;
        kms_display.onscreen = Some(onscreen.downgrade());

        onscreen.update_size(width, height);

        Ok(EglOnscreen {
            surface: egl_surface,
            owns_surface: true,
            platform: OnscreenBackendState::Kms(KmsOnscreen {
                surface: gbm_surface,
                current: None,
                next: None,
                retired: None,
            }),
        })
    }

    fn onscreen_deinit(&self,
                       _egl: &EglRenderer,
                       display: &mut EglDisplay,
                       _onscreen: &OnscreenInner,
                       egl_onscreen: &mut EglOnscreen) {
        if let Some(kms_display) = kms_display_mut(display) {
            kms_display.onscreen = None;
        }

        if let OnscreenBackendState::Kms(ref mut kms_onscreen) = egl_onscreen.platform {
            // In-flight flips hold the onscreen, so none can be pending here.
            debug_assert!(kms_onscreen.next.is_none());
            if let Some(current) = kms_onscreen.current.take() {
                self.release_scanout(kms_onscreen.surface, current);
            }
            if let Some((surface, buffer)) = kms_onscreen.retired.take() {
                self.release_retired(surface, buffer);
            }
            self.gbm.destroy_surface(kms_onscreen.surface);
        }
    }

    fn swap_buffers_with_damage(&self, egl: &EglRenderer, onscreen: &Onscreen, rects: &[Rect]) {
        self.swap_buffers(egl, onscreen, rects)
    }

    fn supports_swap_region(&self) -> bool {
        false
    }
}

impl Renderer {
    /// Uses an already open DRM device instead of opening `/dev/dri/card0`.
    ///
    /// The descriptor is never closed by the renderer.
    pub fn kms_set_fd(&self, fd: RawFd) {
        self.config_mut().kms_fd = Some(fd);
    }

    /// The DRM device in use, once connected to KMS.
    pub fn kms_fd(&self) -> Option<RawFd> {
        let winsys = self.winsys()?;
        match winsys.backend {
            RendererBackendState::Kms(ref kms) => Some(kms.fd),
            _ => None,
        }
    }
}

impl Display {
    /// Replaces the output layout.
    ///
    /// The CRTC list is copied. If the size changes the onscreen's surfaces are reallocated, and
    /// the new modes are set by the next swap.
    pub fn kms_set_layout(&self, width: i32, height: i32, crtcs: &[KmsCrtc]) -> Result<(), Error> {
        let winsys = self.winsys_renderer().ok_or_else(|| {
            Error::Init("The display has not been set up".to_owned())
        })?;
        let kms = match winsys.backend {
            RendererBackendState::Kms(ref kms) => kms,
            _ => return Err(Error::Init("The display is not using the KMS backend".to_owned())),
        };

        let (old_size, onscreen) = with_kms_display(self, |kms_display| {
            let onscreen = kms_display.onscreen.as_ref().and_then(|weak| weak.upgrade());
            ((kms_display.layout.width, kms_display.layout.height), onscreen)
        }).ok_or_else(|| Error::Init("The display has not been set up".to_owned()))?;

        if old_size != (width, height) {
            if let Some(ref onscreen) = onscreen {
                kms.resize_onscreen(&winsys.egl, self, onscreen, width, height)?;
            }
        }

        with_kms_display(self, |kms_display| {
            kms_display.layout = KmsLayout { width, height, crtcs: crtcs.to_vec() };
            kms_display.pending_set_crtc = true;
        });
        Ok(())
    }

    /// Makes the next swap set the CRTC modes again, e.g. after another client changed them.
    pub fn kms_queue_modes_reset(&self) {
        with_kms_display(self, |kms_display| kms_display.pending_set_crtc = true);
    }

    /// The current layout, if the display is set up on KMS.
    pub fn kms_layout(&self) -> Option<KmsLayout> {
        with_kms_display(self, |kms_display| kms_display.layout.clone())
    }

    /// Whether the next swap will set the CRTC modes.
    pub fn kms_pending_set_crtc(&self) -> bool {
        with_kms_display(self, |kms_display| kms_display.pending_set_crtc).unwrap_or(false)
    }
}
