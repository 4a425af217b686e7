// cglib-winsys/src/platform/null/mod.rs
//
//! Backends that render into one surface fixed for the lifetime of the display.
//!
//! The null backend creates a window surface on a null native window, the way framebuffer-device
//! EGL drivers expect. The Android backend shares this implementation with the application's
//! `ANativeWindow` as the native window.

use crate::display::Display;
use crate::egl;
use crate::egl::types::{EGLConfig, EGLSurface, EGLint};
use crate::egl::{EGLNativeDisplayType, EGLNativeWindowType};
use crate::onscreen::{Onscreen, WeakOnscreen};
use crate::platform::generic::egl::context::make_current;
use crate::platform::generic::egl::{CurrentBinding, EglDisplay, EglOnscreen, EglRenderer};
use crate::platform::{DisplayBackendState, OnscreenBackendState, Platform, RendererBackendState};
use crate::platform::{WinsysBackend, WinsysRenderer};
use crate::renderer::Renderer;
use crate::Error;

use std::os::raw::c_void;
use std::ptr::{self, NonNull};
use std::rc::Rc;

pub(crate) struct FixedSurfaceRenderer {
    native_window: EGLNativeWindowType,
    /// Android windows get their buffer format set to the config's native visual.
    android_window: Option<NonNull<c_void>>,
    platform: Rc<dyn Platform>,
}

pub(crate) struct FixedSurfaceDisplay {
    surface: EGLSurface,
    width: i32,
    height: i32,
    onscreen: Option<WeakOnscreen>,
}

/// Connects the null backend.
pub(crate) fn connect(renderer: &Renderer) -> Result<WinsysRenderer, Error> {
    let egl = EglRenderer::connect(renderer.platform().egl()?,
                                   None,
                                   ptr::null() as EGLNativeDisplayType,
                                   renderer.resolved_driver())?;
    Ok(WinsysRenderer {
        egl,
        backend: RendererBackendState::Null(FixedSurfaceRenderer::new(renderer, None)),
    })
}

impl FixedSurfaceRenderer {
    pub(crate) fn new(renderer: &Renderer, android_window: Option<NonNull<c_void>>)
                      -> FixedSurfaceRenderer {
        let native_window = match android_window {
            Some(window) => window.as_ptr() as EGLNativeWindowType,
            None => ptr::null(),
        };
        FixedSurfaceRenderer {
            native_window,
            android_window,
            platform: renderer.inner.platform.clone(),
        }
    }

    fn create_surface(&self, egl: &EglRenderer, display: &mut EglDisplay) -> Result<(), Error> {
        if let Some(window) = self.android_window {
            // EGL_NATIVE_VISUAL_ID is always accepted as the buffer format.
            let format = egl.api
                            .get_config_attrib(egl.display,
                                               display.config,
                                               egl::NATIVE_VISUAL_ID as EGLint)
                            .map_err(|err| {
                Error::CreateContext(format!("Unable to query the native visual: {}", err))
            })?;
            self.platform.set_native_window_format(window, format)?;
        }

        let surface = egl.api
                         .create_window_surface(egl.display, display.config, self.native_window, &[])
                         .map_err(|err| {
            Error::CreateContext(format!("Unable to create EGL window surface: {}", err))
        })?;
        if let Some(fixed) = fixed_display_mut(display) {
            fixed.surface = surface;
        }

        let binding = CurrentBinding { draw: surface, read: surface, context: display.context };
        make_current(egl, display, binding).map_err(|err| {
            Error::CreateContext(format!("Unable to eglMakeCurrent with egl surface: {}", err))
        })?;

        let width = egl.api.query_surface(egl.display, surface, egl::WIDTH as EGLint);
        let height = egl.api.query_surface(egl.display, surface, egl::HEIGHT as EGLint);
        match (width, height) {
            (Ok(width), Ok(height)) => {
                if let Some(fixed) = fixed_display_mut(display) {
                    fixed.width = width;
                    fixed.height = height;
                }
            }
            (Err(err), _) | (_, Err(err)) => warn!("Couldn't query the surface size: {}", err),
        }
        Ok(())
    }
}

fn fixed_display_mut(display: &mut EglDisplay) -> Option<&mut FixedSurfaceDisplay> {
    match display.platform {
        DisplayBackendState::Fixed(ref mut fixed) => Some(fixed),
        _ => None,
    }
}

impl WinsysBackend for FixedSurfaceRenderer {
    fn display_setup(&self, _egl: &EglRenderer) -> Result<DisplayBackendState, Error> {
        Ok(DisplayBackendState::Fixed(FixedSurfaceDisplay {
            surface: egl::NO_SURFACE,
            width: 0,
            height: 0,
            onscreen: None,
        }))
    }

    fn context_created(&self, egl: &EglRenderer, display: &mut EglDisplay) -> Result<(), Error> {
        self.create_surface(egl, display)
    }

    fn cleanup_context(&self, egl: &EglRenderer, display: &mut EglDisplay) {
        let surface = match fixed_display_mut(display) {
            Some(fixed) => std::mem::replace(&mut fixed.surface, egl::NO_SURFACE),
            None => return,
        };
        if surface != egl::NO_SURFACE {
            if let Err(err) = egl.api.destroy_surface(egl.display, surface) {
                warn!("Failed to destroy the EGL window surface: {}", err);
            }
        }
    }

    fn onscreen_init(&self,
                     _egl: &EglRenderer,
                     display: &mut EglDisplay,
                     onscreen: &Onscreen,
                     _config: EGLConfig)
                     -> Result<EglOnscreen, Error> {
        let fixed = fixed_display_mut(display).ok_or_else(|| {
            Error::CreateOnscreen("The display has no surface".to_owned())
        })?;
        if fixed.onscreen.as_ref().and_then(|weak| weak.upgrade()).is_some() {
            return Err(Error::CreateOnscreen(
                "EGL platform only supports a single onscreen window".to_owned()));
        }
        fixed.onscreen = Some(onscreen.downgrade());

        onscreen.update_size(fixed.width, fixed.height);
        Ok(EglOnscreen {
            surface: fixed.surface,
            owns_surface: false,
            platform: OnscreenBackendState::Fixed,
        })
    }
}

impl Display {
    /// The size of the fixed surface, once set up on the Android or null backend.
    pub fn fixed_surface_size(&self) -> Option<(i32, i32)> {
        self.with_egl(|egl_display| {
            fixed_display_mut(egl_display).map(|fixed| (fixed.width, fixed.height))
        }).flatten()
    }
}
