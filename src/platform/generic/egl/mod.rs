// cglib-winsys/src/platform/generic/egl/mod.rs
//
//! Functionality common to EGL-based backends.
//!
//! Every backend in this crate renders through EGL. The state here is shared: `EglRenderer`
//! belongs to a connected renderer, `EglDisplay` to a display that has been set up, and
//! `EglOnscreen` to an allocated onscreen. Each of them carries the typed per-backend state next
//! to the generic EGL handles.

pub mod api;
pub(crate) mod context;
pub(crate) mod device;
pub(crate) mod ffi;
pub(crate) mod surface;

use self::api::EglApi;
use crate::egl::types::{EGLConfig, EGLContext, EGLDisplay, EGLSurface, EGLint};
use crate::egl::{self, EGLNativeDisplayType};
use crate::platform::{DisplayBackendState, OnscreenBackendState};
use crate::renderer::Driver;
use crate::Error;

use std::rc::Rc;

bitflags! {
    /// EGL extensions the backends make use of.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub(crate) struct EglFeatureFlags: u32 {
        const SWAP_REGION              = 0x01;
        const CREATE_CONTEXT           = 0x02;
        const BUFFER_AGE               = 0x04;
        const FENCE_SYNC               = 0x08;
        const SURFACELESS_CONTEXT      = 0x10;
        const SWAP_BUFFERS_WITH_DAMAGE = 0x20;
    }
}

static EXTENSION_FEATURES: &[(&[&str], EglFeatureFlags)] = &[
    (&["EGL_NOK_swap_region"], EglFeatureFlags::SWAP_REGION),
    (&["EGL_KHR_create_context"], EglFeatureFlags::CREATE_CONTEXT),
    (&["EGL_EXT_buffer_age"], EglFeatureFlags::BUFFER_AGE),
    (&["EGL_KHR_fence_sync"], EglFeatureFlags::FENCE_SYNC),
    (&["EGL_KHR_surfaceless_context"], EglFeatureFlags::SURFACELESS_CONTEXT),
    (&["EGL_EXT_swap_buffers_with_damage", "EGL_KHR_swap_buffers_with_damage"],
     EglFeatureFlags::SWAP_BUFFERS_WITH_DAMAGE),
];

pub(crate) fn features_from_extensions(extensions: &str) -> EglFeatureFlags {
    let advertised: Vec<&str> = extensions.split_whitespace().collect();
    EXTENSION_FEATURES.iter()
                      .filter(|(names, _)| names.iter().any(|name| advertised.contains(name)))
                      .fold(EglFeatureFlags::empty(), |features, &(_, feature)| features | feature)
}

/// A connected EGL display. Terminated on drop.
pub(crate) struct EglRenderer {
    pub(crate) api: Rc<dyn EglApi>,
    pub(crate) display: EGLDisplay,
    pub(crate) version: (EGLint, EGLint),
    pub(crate) features: EglFeatureFlags,
    pub(crate) driver: Driver,
}

impl EglRenderer {
    /// Gets and initializes the EGL display for a native display, then probes extensions.
    pub(crate) fn connect(api: Rc<dyn EglApi>,
                          platform: Option<egl::types::EGLenum>,
                          native_display: EGLNativeDisplayType,
                          driver: Driver)
                          -> Result<EglRenderer, Error> {
        let display = api.get_display(platform, native_display).map_err(|err| {
            Error::Init(format!("Failed to get EGL display: {}", err))
        })?;

        let version = match api.initialize(display) {
            Ok(version) => version,
            Err(err) => {
                api.terminate(display);
                return Err(Error::Init(format!("Couldn't initialize EGL: {}", err)));
            }
        };

        let extensions = api.query_string(display, egl::EXTENSIONS as EGLint).unwrap_or_default();
        let features = features_from_extensions(&extensions);
        debug!("EGL {}.{} with features {:?}", version.0, version.1, features);

        Ok(EglRenderer { api, display, version, features, driver })
    }

    #[inline]
    pub(crate) fn has_feature(&self, feature: EglFeatureFlags) -> bool {
        self.features.contains(feature)
    }
}

impl Drop for EglRenderer {
    fn drop(&mut self) {
        self.api.terminate(self.display);
    }
}

/// The draw/read/context triple last made current.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct CurrentBinding {
    pub(crate) draw: EGLSurface,
    pub(crate) read: EGLSurface,
    pub(crate) context: EGLContext,
}

impl CurrentBinding {
    pub(crate) fn none() -> CurrentBinding {
        CurrentBinding { draw: egl::NO_SURFACE, read: egl::NO_SURFACE, context: egl::NO_CONTEXT }
    }
}

/// Per-display EGL state: the chosen config, the one context, and the current binding.
pub(crate) struct EglDisplay {
    pub(crate) config: EGLConfig,
    pub(crate) context: EGLContext,
    pub(crate) dummy_surface: EGLSurface,
    pub(crate) current: CurrentBinding,
    pub(crate) platform: DisplayBackendState,
}

pub(crate) struct EglOnscreen {
    pub(crate) surface: EGLSurface,
    // False when the surface belongs to the display (fixed-surface backends).
    pub(crate) owns_surface: bool,
    pub(crate) platform: OnscreenBackendState,
}
