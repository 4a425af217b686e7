// cglib-winsys/src/platform/generic/egl/context.rs
//
//! Config selection, context creation and the display's current binding.

use super::ffi::{EGL_CONTEXT_FLAGS_KHR, EGL_CONTEXT_MAJOR_VERSION_KHR};
use super::ffi::{EGL_CONTEXT_MINOR_VERSION_KHR, EGL_CONTEXT_OPENGL_CORE_PROFILE_BIT_KHR};
use super::ffi::{EGL_CONTEXT_OPENGL_FORWARD_COMPATIBLE_BIT_KHR};
use super::ffi::EGL_CONTEXT_OPENGL_PROFILE_MASK_KHR;
use super::{CurrentBinding, EglDisplay, EglFeatureFlags, EglRenderer};
use crate::egl;
use crate::egl::types::{EGLConfig, EGLint};
use crate::info::{DisplayFeatures, FeatureFlags, WinsysFeatureFlags};
use crate::platform::WinsysRenderer;
use crate::renderer::Driver;
use crate::template::{FramebufferConfig, OnscreenTemplate};
use crate::{Error, WindowingApiError};

use std::ptr;

/// Builds the `eglChooseConfig` attribute list, without the terminating `EGL_NONE`.
pub(crate) fn config_attributes(winsys: &WinsysRenderer, config: &FramebufferConfig)
                                -> Vec<EGLint> {
    let mut attributes = vec![];
    winsys.backend().add_config_attributes(config, &mut attributes);

    if config.need_stencil {
        attributes.extend_from_slice(&[egl::STENCIL_SIZE as EGLint, 2]);
    }

    attributes.extend_from_slice(&[
        egl::RED_SIZE as EGLint,   1,
        egl::GREEN_SIZE as EGLint, 1,
        egl::BLUE_SIZE as EGLint,  1,
        egl::ALPHA_SIZE as EGLint, if config.has_alpha { 1 } else { egl::DONT_CARE as EGLint },
        egl::DEPTH_SIZE as EGLint, 1,
        egl::BUFFER_SIZE as EGLint, egl::DONT_CARE as EGLint,
    ]);

    let renderable_type = match winsys.egl.driver {
        Driver::Gl | Driver::Gl3 => egl::OPENGL_BIT,
        Driver::Gles2 => egl::OPENGL_ES2_BIT,
    };
    attributes.extend_from_slice(&[
        egl::RENDERABLE_TYPE as EGLint, renderable_type as EGLint,
        egl::SURFACE_TYPE as EGLint, egl::WINDOW_BIT as EGLint,
    ]);

    if config.samples_per_pixel > 0 {
        attributes.extend_from_slice(&[
            egl::SAMPLE_BUFFERS as EGLint, 1,
            egl::SAMPLES as EGLint, config.samples_per_pixel as EGLint,
        ]);
    }

    attributes
}

/// Returns the first config the driver offers for `config`, if any.
///
/// Alpha is only a preference: if nothing has it, a config without alpha is accepted.
pub(crate) fn find_config(winsys: &WinsysRenderer, config: &FramebufferConfig)
                          -> Result<EGLConfig, WindowingApiError> {
    match choose_first_config(winsys, config) {
        Err(WindowingApiError::BadConfig) if config.has_alpha => {
            debug!("No config with alpha; retrying without");
            let opaque = FramebufferConfig { has_alpha: false, ..*config };
            choose_first_config(winsys, &opaque)
        }
        result => result,
    }
}

fn choose_first_config(winsys: &WinsysRenderer, config: &FramebufferConfig)
                       -> Result<EGLConfig, WindowingApiError> {
    let attributes = config_attributes(winsys, config);
    let egl = &winsys.egl;
    egl.api
       .choose_config(egl.display, &attributes, 1)?
       .into_iter()
       .next()
       .ok_or(WindowingApiError::BadConfig)
}

/// Makes `binding` current unless it already is.
///
/// The cached binding is updated even when EGL reports a failure. Returns whether EGL was called.
pub(crate) fn make_current(egl: &EglRenderer, display: &mut EglDisplay, binding: CurrentBinding)
                           -> Result<bool, WindowingApiError> {
    if display.current == binding {
        return Ok(false);
    }
    let result = egl.api.make_current(egl.display, binding.draw, binding.read, binding.context);
    display.current = binding;
    result.map(|()| true)
}

/// Runs backend setup, creates the context, and lets the backend bind its dummy surface.
///
/// Everything created so far is torn down again if any step fails.
pub(crate) fn display_setup(winsys: &WinsysRenderer, template: &OnscreenTemplate)
                            -> Result<EglDisplay, Error> {
    let platform = winsys.backend().display_setup(&winsys.egl)?;
    let mut display = EglDisplay {
        config: ptr::null(),
        context: egl::NO_CONTEXT,
        dummy_surface: egl::NO_SURFACE,
        current: CurrentBinding::none(),
        platform,
    };

    match try_create_context(winsys, &mut display, template) {
        Ok(()) => Ok(display),
        Err(err) => {
            display_destroy(winsys, display);
            Err(err)
        }
    }
}

fn try_create_context(winsys: &WinsysRenderer,
                      display: &mut EglDisplay,
                      template: &OnscreenTemplate)
                      -> Result<(), Error> {
    assert!(display.context == egl::NO_CONTEXT, "a display can only have one context");

    let egl = &winsys.egl;
    let api = match egl.driver {
        Driver::Gl | Driver::Gl3 => egl::OPENGL_API,
        Driver::Gles2 => egl::OPENGL_ES_API,
    };
    egl.api.bind_api(api).map_err(|err| {
        Error::CreateContext(format!("Failed to bind the rendering API: {}", err))
    })?;

    display.config = find_config(winsys, &template.config).map_err(|_| {
        Error::CreateContext("Unable to find a usable EGL configuration".to_owned())
    })?;

    let attributes: Vec<EGLint> = match egl.driver {
        Driver::Gl3 => {
            if !egl.has_feature(EglFeatureFlags::CREATE_CONTEXT) {
                return Err(Error::CreateContext("Driver does not support GL 3 contexts".to_owned()));
            }
            // A 3.1 core profile with no deprecated features.
            vec![
                EGL_CONTEXT_MAJOR_VERSION_KHR, 3,
                EGL_CONTEXT_MINOR_VERSION_KHR, 1,
                EGL_CONTEXT_FLAGS_KHR, EGL_CONTEXT_OPENGL_FORWARD_COMPATIBLE_BIT_KHR,
                EGL_CONTEXT_OPENGL_PROFILE_MASK_KHR, EGL_CONTEXT_OPENGL_CORE_PROFILE_BIT_KHR,
            ]
        }
        Driver::Gles2 => vec![egl::CONTEXT_CLIENT_VERSION as EGLint, 2],
        Driver::Gl => vec![],
    };

    display.context = egl.api
                         .create_context(egl.display, display.config, egl::NO_CONTEXT, &attributes)
                         .map_err(|err| {
        Error::CreateContext(format!("Unable to create a suitable EGL context: {}", err))
    })?;

    winsys.backend().context_created(egl, display)
}

fn cleanup_context(winsys: &WinsysRenderer, display: &mut EglDisplay) {
    let egl = &winsys.egl;
    if display.context != egl::NO_CONTEXT {
        if let Err(err) = make_current(egl, display, CurrentBinding::none()) {
            warn!("Failed to unbind the EGL context: {}", err);
        }
        if let Err(err) = egl.api.destroy_context(egl.display, display.context) {
            error!("Failed to destroy the EGL context: {}", err);
        }
        display.context = egl::NO_CONTEXT;
    }

    winsys.backend().cleanup_context(egl, display);
}

/// Unbinds and destroys the context, then lets the backend release its display state.
pub(crate) fn display_destroy(winsys: &WinsysRenderer, mut display: EglDisplay) {
    cleanup_context(winsys, &mut display);
    winsys.backend().display_destroy(&winsys.egl, &mut display);
}

pub(crate) fn display_features(winsys: &WinsysRenderer, display: &EglDisplay)
                               -> DisplayFeatures {
    let egl = &winsys.egl;
    let mut features = DisplayFeatures::default();

    if egl.has_feature(EglFeatureFlags::SWAP_REGION) && winsys.backend().supports_swap_region() {
        features.winsys_features |= WinsysFeatureFlags::SWAP_REGION |
            WinsysFeatureFlags::SWAP_REGION_THROTTLE;
    }
    if egl.has_feature(EglFeatureFlags::FENCE_SYNC) {
        features.features |= FeatureFlags::FENCE;
    }
    if egl.has_feature(EglFeatureFlags::BUFFER_AGE) {
        features.winsys_features |= WinsysFeatureFlags::BUFFER_AGE;
    }
    // Standalone GLES2 contexts need something to bind to.
    if display.dummy_surface != egl::NO_SURFACE && egl.driver == Driver::Gles2 {
        features.features |= FeatureFlags::GLES2_CONTEXT;
    }

    winsys.backend().display_init(egl, display, &mut features);
    features
}
