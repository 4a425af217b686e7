// cglib-winsys/src/display.rs
//
//! The GPU context and per-output state for a renderer.

use crate::info::{DisplayFeatures, FeatureFlags, WinsysFeatureFlags};
use crate::platform::generic::egl::{context, EglDisplay};
use crate::platform::WinsysRenderer;
use crate::renderer::Renderer;
use crate::template::OnscreenTemplate;
use crate::Error;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub(crate) struct DisplayInner {
    pub(crate) renderer: Renderer,
    template: OnscreenTemplate,
    features: Cell<DisplayFeatures>,
    // Kept so the EGL connection outlives the display even if the renderer disconnects.
    winsys_renderer: RefCell<Option<Rc<WinsysRenderer>>>,
    pub(crate) winsys: RefCell<Option<EglDisplay>>,
}

/// A renderer's GPU context together with the backend's display state.
///
/// Setting up the display chooses a framebuffer configuration for the template, creates the one
/// context all onscreens under it share, and on KMS picks the outputs to drive. Dropping the last
/// handle unbinds and destroys the context and restores whatever the backend changed.
#[derive(Clone)]
pub struct Display {
    pub(crate) inner: Rc<DisplayInner>,
}

impl Display {
    /// Creates a display that will choose its configuration for `template`.
    pub fn new(renderer: &Renderer, template: Option<OnscreenTemplate>) -> Display {
        Display {
            inner: Rc::new(DisplayInner {
                renderer: renderer.clone(),
                template: template.unwrap_or_default(),
                features: Cell::new(DisplayFeatures::default()),
                winsys_renderer: RefCell::new(None),
                winsys: RefCell::new(None),
            }),
        }
    }

    /// Connects the renderer if needed and creates the GPU context.
    ///
    /// Nothing is left allocated if this fails. Calling it again after success does nothing.
    pub fn setup(&self) -> Result<(), Error> {
        if self.is_setup() {
            return Ok(());
        }

        let renderer = &self.inner.renderer;
        renderer.connect()?;
        let winsys = renderer.winsys().ok_or_else(|| {
            Error::Init("The renderer is not connected".to_owned())
        })?;

        let egl_display = context::display_setup(&winsys, &self.inner.template)?;
        self.inner.features.set(context::display_features(&winsys, &egl_display));

        *self.inner.winsys.borrow_mut() = Some(egl_display);
        *self.inner.winsys_renderer.borrow_mut() = Some(winsys);
        Ok(())
    }

    #[inline]
    pub fn is_setup(&self) -> bool {
        self.inner.winsys.borrow().is_some()
    }

    #[inline]
    pub fn renderer(&self) -> &Renderer {
        &self.inner.renderer
    }

    #[inline]
    pub fn template(&self) -> &OnscreenTemplate {
        &self.inner.template
    }

    /// Everything learned about the backend during setup. Empty before setup.
    #[inline]
    pub fn features(&self) -> DisplayFeatures {
        self.inner.features.get()
    }

    #[inline]
    pub fn has_feature(&self, feature: FeatureFlags) -> bool {
        self.features().features.contains(feature)
    }

    #[inline]
    pub fn has_winsys_feature(&self, feature: WinsysFeatureFlags) -> bool {
        self.features().winsys_features.contains(feature)
    }

    pub(crate) fn winsys_renderer(&self) -> Option<Rc<WinsysRenderer>> {
        self.inner.winsys_renderer.borrow().clone()
    }

    /// Runs `f` on the EGL display state, if the display is set up.
    pub(crate) fn with_egl<F, R>(&self, f: F) -> Option<R> where F: FnOnce(&mut EglDisplay) -> R {
        self.inner.winsys.borrow_mut().as_mut().map(f)
    }
}

impl DisplayInner {
    pub(crate) fn winsys_renderer(&self) -> Option<Rc<WinsysRenderer>> {
        self.winsys_renderer.borrow().clone()
    }
}

impl Drop for DisplayInner {
    fn drop(&mut self) {
        let egl_display = self.winsys.borrow_mut().take();
        let winsys = self.winsys_renderer.borrow_mut().take();
        if let (Some(egl_display), Some(winsys)) = (egl_display, winsys) {
            context::display_destroy(&winsys, egl_display);
        }
    }
}
