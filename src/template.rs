// cglib-winsys/src/template.rs
//
//! Requested framebuffer attributes.

/// Attributes an onscreen framebuffer is created with.
///
/// The requested bit depths are minimums. The configuration actually chosen may offer more and
/// the real multisample count is read back after the onscreen is allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramebufferConfig {
    /// Whether swaps wait for the display refresh.
    pub swap_throttled: bool,
    /// Whether a stencil buffer is required. Configurations without one are rejected.
    pub need_stencil: bool,
    /// Whether an alpha channel is wanted. Configurations without one are still accepted.
    pub has_alpha: bool,
    /// Multisample count, or 0 for single-sampled rendering.
    pub samples_per_pixel: u32,
}

impl Default for FramebufferConfig {
    fn default() -> FramebufferConfig {
        FramebufferConfig {
            swap_throttled: true,
            need_stencil: true,
            has_alpha: false,
            samples_per_pixel: 0,
        }
    }
}

/// The attributes a display chooses its GPU configuration for.
///
/// Onscreens created later under the display should request compatible attributes, since they
/// share the display's context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OnscreenTemplate {
    pub(crate) config: FramebufferConfig,
}

impl OnscreenTemplate {
    #[inline]
    pub fn new() -> OnscreenTemplate {
        OnscreenTemplate::default()
    }

    #[inline]
    pub fn config(&self) -> &FramebufferConfig {
        &self.config
    }

    pub fn set_swap_throttled(&mut self, throttled: bool) {
        self.config.swap_throttled = throttled;
    }

    pub fn set_need_stencil(&mut self, need_stencil: bool) {
        self.config.need_stencil = need_stencil;
    }

    pub fn set_has_alpha(&mut self, has_alpha: bool) {
        self.config.has_alpha = has_alpha;
    }

    pub fn set_samples_per_pixel(&mut self, samples: u32) {
        self.config.samples_per_pixel = samples;
    }
}
