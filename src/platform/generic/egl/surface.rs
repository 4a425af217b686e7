// cglib-winsys/src/platform/generic/egl/surface.rs
//
//! Onscreen surfaces: creation, binding and presentation.

use super::context::{find_config, make_current};
use super::ffi::EGL_BUFFER_AGE_EXT;
use super::{CurrentBinding, EglFeatureFlags, EglRenderer};
use crate::display::DisplayInner;
use crate::egl;
use crate::egl::types::{EGLSurface, EGLint};
use crate::onscreen::{Onscreen, OnscreenInner};
use crate::platform::WinsysRenderer;
use crate::{Error, Rect};

/// Chooses a config for the onscreen's attributes and has the backend create its surface.
pub(crate) fn onscreen_init(winsys: &WinsysRenderer, onscreen: &Onscreen) -> Result<(), Error> {
    let egl = &winsys.egl;
    let config = onscreen.framebuffer_config();
    let display = onscreen.display();

    let mut display_state = display.inner.winsys.borrow_mut();
    let egl_display = display_state.as_mut().ok_or_else(|| {
        Error::CreateOnscreen("The display has not been set up".to_owned())
    })?;
    debug_assert!(egl_display.context != egl::NO_CONTEXT);

    let egl_config = find_config(winsys, &config).map_err(|err| {
        Error::CreateOnscreen(format!("Failed to find a suitable EGL configuration: {}", err))
    })?;

    // The driver may round the multisample count up.
    if config.samples_per_pixel > 0 {
        match egl.api.get_config_attrib(egl.display, egl_config, egl::SAMPLES as EGLint) {
            Ok(samples) => onscreen.set_samples_per_pixel(samples.max(0) as u32),
            Err(err) => warn!("Couldn't query the number of samples of the config: {}", err),
        }
    }

    let egl_onscreen = winsys.backend().onscreen_init(egl, egl_display, onscreen, egl_config)?;
    drop(display_state);

    *onscreen.inner.winsys.borrow_mut() = Some(egl_onscreen);
    Ok(())
}

/// Destroys the onscreen's surface, first moving the context to the dummy surface if the
/// onscreen is current.
pub(crate) fn onscreen_deinit(winsys: &WinsysRenderer,
                              display: &DisplayInner,
                              onscreen: &OnscreenInner) {
    let mut egl_onscreen = match onscreen.winsys.borrow_mut().take() {
        None => return,
        Some(egl_onscreen) => egl_onscreen,
    };
    let mut display_state = display.winsys.borrow_mut();
    let egl_display = match display_state.as_mut() {
        None => return,
        Some(egl_display) => egl_display,
    };

    let egl = &winsys.egl;
    let surface = egl_onscreen.surface;
    if egl_onscreen.owns_surface && surface != egl::NO_SURFACE {
        if egl_display.current.draw == surface || egl_display.current.read == surface {
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
        if let Err(err) = egl.api.destroy_surface(egl.display, surface) {
            warn!("Failed to destroy EGL surface: {}", err);
        }
        egl_onscreen.surface = egl::NO_SURFACE;
    }

    winsys.backend().onscreen_deinit(egl, egl_display, onscreen, &mut egl_onscreen);
}

/// Makes the onscreen current and applies its swap interval.
pub(crate) fn bind(egl: &EglRenderer, onscreen: &Onscreen) -> Result<(), Error> {
    let surface = onscreen.egl_surface();
    let throttled = onscreen.framebuffer_config().swap_throttled;
    let display = onscreen.display();

    let mut display_state = display.inner.winsys.borrow_mut();
    let egl_display = display_state.as_mut().ok_or_else(|| {
        Error::MakeCurrent("The display has not been set up".to_owned())
    })?;

    let binding = CurrentBinding { draw: surface, read: surface, context: egl_display.context };
    let changed = make_current(egl, egl_display, binding).map_err(|err| {
        Error::MakeCurrent(format!("Failed to make the onscreen current: {}", err))
    })?;

    if changed {
        let interval = if throttled { 1 } else { 0 };
        if let Err(err) = egl.api.swap_interval(egl.display, interval) {
            warn!("Failed to set the swap interval: {}", err);
        }
    }
    Ok(())
}

/// Reapplies the swap interval if the onscreen is bound.
pub(crate) fn update_swap_throttled(egl: &EglRenderer, onscreen: &Onscreen) {
    let surface = onscreen.egl_surface();
    let is_current = onscreen.display().with_egl(|egl_display| {
        if egl_display.current.draw != surface {
            return false;
        }
        // Forces the next bind to go through to EGL.
        egl_display.current.draw = egl::NO_SURFACE;
        true
    });

    if is_current == Some(true) {
        if let Err(err) = bind(egl, onscreen) {
            warn!("{}", err);
        }
    }
}

/// Returns the back buffer's age, or 0 when the contents are undefined or can't be known.
pub(crate) fn buffer_age(egl: &EglRenderer, onscreen: &Onscreen) -> i32 {
    if !egl.has_feature(EglFeatureFlags::BUFFER_AGE) {
        return 0;
    }
    if let Err(err) = bind(egl, onscreen) {
        warn!("{}", err);
        return 0;
    }
    match egl.api.query_surface(egl.display, onscreen.egl_surface(), EGL_BUFFER_AGE_EXT) {
        Ok(age) => age.max(0),
        Err(err) => {
            warn!("Failed to query the buffer age: {}", err);
            0
        }
    }
}

/// Converts top-left-origin rectangles to EGL's bottom-left-origin quadruples.
pub(crate) fn flip_rects(rects: &[Rect], framebuffer_height: i32) -> Vec<EGLint> {
    rects.iter().flat_map(|rect| {
        [
            rect.origin.x,
            framebuffer_height - rect.origin.y - rect.size.height,
            rect.size.width,
            rect.size.height,
        ]
    }).collect()
}

pub(crate) fn swap_region(egl: &EglRenderer, onscreen: &Onscreen, rects: &[Rect]) {
    if let Err(err) = bind(egl, onscreen) {
        warn!("{}", err);
        return;
    }
    let flipped = flip_rects(rects, onscreen.height());
    if let Err(err) = egl.api.swap_buffers_region(egl.display, onscreen.egl_surface(), &flipped) {
        warn!("Error reported by eglSwapBuffersRegion: {}", err);
    }
}

/// The plain EGL swap, with damage when the driver supports it.
pub(crate) fn swap_buffers_with_damage(egl: &EglRenderer, onscreen: &Onscreen, rects: &[Rect]) {
    if let Err(err) = bind(egl, onscreen) {
        warn!("{}", err);
        return;
    }
    let surface: EGLSurface = onscreen.egl_surface();
    let result = if egl.has_feature(EglFeatureFlags::SWAP_BUFFERS_WITH_DAMAGE) {
        let flipped = flip_rects(rects, onscreen.height());
        egl.api.swap_buffers_with_damage(egl.display, surface, &flipped)
    } else {
        egl.api.swap_buffers(egl.display, surface)
    };
    if let Err(err) = result {
        warn!("Error reported by eglSwapBuffers: {}", err);
    }
}
