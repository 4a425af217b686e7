// cglib-winsys/src/onscreen.rs
//
//! Onscreen framebuffers and their event queues.
//!
//! An onscreen owns the native surface it renders to and three queues that are drained together
//! at the owning renderer's next dispatch: frame events, dirty rectangles and a pending resize.
//! Backends only ever queue; application callbacks run from the renderer's idle dispatch.

use crate::closure::{ClosureHandle, ClosureList};
use crate::display::Display;
use crate::egl;
use crate::egl::types::EGLSurface;
use crate::frame_info::{self, FrameEvent, FrameInfo};
use crate::info::{FeatureFlags, PrivateFeatureFlags, WinsysFeatureFlags};
use crate::platform::generic::egl::{surface, EglOnscreen};
use crate::platform::unix::x11::client::XWindow;
use crate::template::FramebufferConfig;
use crate::{Error, Rect};

use euclid::default::{Point2D, Size2D};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::raw::c_void;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

#[cfg(feature = "sm-raw-window-handle-06")]
use rwh_06::RawWindowHandle;

pub(crate) type FrameCallback = dyn FnMut(&Onscreen, FrameEvent, &FrameInfo);
pub(crate) type ResizeCallback = dyn FnMut(&Onscreen, i32, i32);
pub(crate) type DirtyCallback = dyn FnMut(&Onscreen, &Rect);

pub(crate) struct OnscreenState {
    pub(crate) width: i32,
    pub(crate) height: i32,
    pub(crate) config: FramebufferConfig,
    pub(crate) allocated: bool,
    pub(crate) resizable: bool,
    pub(crate) frame_counter: i64,
    pub(crate) mid_scene: bool,
    // Oldest submission first.
    pub(crate) pending_frames: VecDeque<Rc<FrameInfo>>,
    events: VecDeque<(FrameEvent, Rc<FrameInfo>)>,
    dirty: VecDeque<Rect>,
    resize_pending: bool,
    dispatch_idle: Option<ClosureHandle>,
}

/// Native surfaces supplied by the application instead of letting the backend create them.
#[derive(Default)]
pub(crate) struct ForeignSurface {
    pub(crate) x11_xid: Option<XWindow>,
    /// Called with the event mask the backend needs selected on a foreign X window.
    pub(crate) x11_update_mask: Option<Box<dyn FnMut(u32)>>,
    pub(crate) wayland_surface: Option<NonNull<c_void>>,
}

pub(crate) struct OnscreenInner {
    display: Display,
    pub(crate) state: RefCell<OnscreenState>,
    pub(crate) winsys: RefCell<Option<EglOnscreen>>,
    pub(crate) foreign: RefCell<ForeignSurface>,
    frame_closures: ClosureList<FrameCallback>,
    resize_closures: ClosureList<ResizeCallback>,
    dirty_closures: ClosureList<DirtyCallback>,
}

/// A framebuffer that is presented by the windowing system.
///
/// Handles are cheap to clone and share the same onscreen. While a backend still has a frame of
/// this onscreen in flight it holds a handle of its own, so the native surface outlives the
/// application's last handle until the frame completes.
#[derive(Clone)]
pub struct Onscreen {
    pub(crate) inner: Rc<OnscreenInner>,
}

/// A non-owning reference to an [`Onscreen`].
#[derive(Clone)]
pub struct WeakOnscreen(Weak<OnscreenInner>);

impl WeakOnscreen {
    pub fn upgrade(&self) -> Option<Onscreen> {
        self.0.upgrade().map(|inner| Onscreen { inner })
    }
}

impl PartialEq for Onscreen {
    fn eq(&self, other: &Onscreen) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Onscreen {
    /// Creates an onscreen of the given size, using the display template's configuration.
    ///
    /// Nothing native is created until [`Onscreen::allocate`].
    pub fn new(display: &Display, width: i32, height: i32) -> Onscreen {
        let config = display.template().config;
        Onscreen::with_config(display, width, height, config)
    }

    pub fn with_config(display: &Display, width: i32, height: i32, config: FramebufferConfig)
                       -> Onscreen {
        Onscreen {
            inner: Rc::new(OnscreenInner {
                display: display.clone(),
                state: RefCell::new(OnscreenState {
                    width,
                    height,
                    config,
                    allocated: false,
                    resizable: false,
                    frame_counter: 0,
                    mid_scene: false,
                    pending_frames: VecDeque::new(),
                    events: VecDeque::new(),
                    dirty: VecDeque::new(),
                    resize_pending: false,
                    dispatch_idle: None,
                }),
                winsys: RefCell::new(None),
                foreign: RefCell::new(ForeignSurface::default()),
                frame_closures: ClosureList::new(),
                resize_closures: ClosureList::new(),
                dirty_closures: ClosureList::new(),
            }),
        }
    }

    /// Sets up the display if needed and creates the native surface.
    ///
    /// Does nothing if the onscreen is already allocated.
    pub fn allocate(&self) -> Result<(), Error> {
        if self.is_allocated() {
            return Ok(());
        }

        let display = self.display();
        display.setup()?;
        let winsys = display.winsys_renderer().ok_or_else(|| {
            Error::CreateOnscreen("The display has no connected renderer".to_owned())
        })?;

        surface::onscreen_init(&winsys, self)?;
        self.inner.state.borrow_mut().allocated = true;

        let resizable = self.is_resizable();
        if resizable {
            winsys.backend().set_resizable(self, true);
        }
        Ok(())
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.inner.state.borrow().allocated
    }

    #[inline]
    pub fn display(&self) -> &Display {
        &self.inner.display
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.inner.state.borrow().width
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.inner.state.borrow().height
    }

    pub fn size(&self) -> Size2D<i32> {
        let state = self.inner.state.borrow();
        Size2D::new(state.width, state.height)
    }

    /// The framebuffer configuration. After allocation `samples_per_pixel` is the count the
    /// driver actually chose.
    #[inline]
    pub fn framebuffer_config(&self) -> FramebufferConfig {
        self.inner.state.borrow().config
    }

    #[inline]
    pub fn samples_per_pixel(&self) -> u32 {
        self.inner.state.borrow().config.samples_per_pixel
    }

    /// Makes this onscreen the draw and read target of its display's context.
    pub fn bind(&self) -> Result<(), Error> {
        let winsys = self.allocated_winsys()
                         .ok_or_else(|| Error::MakeCurrent("The onscreen is not allocated".to_owned()))?;
        surface::bind(&winsys.egl, self)
    }

    /// Presents the whole back buffer.
    pub fn swap_buffers(&self) {
        self.swap_buffers_with_damage(&[])
    }

    /// Presents the back buffer, hinting that only `rects` changed since the last frame.
    ///
    /// An empty slice damages the whole buffer. Rectangles have a top-left origin. Failures are
    /// logged and drop the frame.
    pub fn swap_buffers_with_damage(&self, rects: &[Rect]) {
        let winsys = match self.allocated_winsys() {
            None => {
                warn!("Tried to swap an onscreen that isn't allocated");
                return;
            }
            Some(winsys) => winsys,
        };
        self.present(|onscreen| {
            winsys.backend().swap_buffers_with_damage(&winsys.egl, onscreen, rects)
        });
    }

    /// Copies only `rects` of the back buffer to the front.
    ///
    /// Requires [`WinsysFeatureFlags::SWAP_REGION`]. Without it nothing is presented.
    pub fn swap_region(&self, rects: &[Rect]) {
        if !self.display().has_winsys_feature(WinsysFeatureFlags::SWAP_REGION) {
            warn!("swap_region needs the SWAP_REGION winsys feature");
            return;
        }
        let winsys = match self.allocated_winsys() {
            None => {
                warn!("Tried to swap an onscreen that isn't allocated");
                return;
            }
            Some(winsys) => winsys,
        };
        self.present(|onscreen| surface::swap_region(&winsys.egl, onscreen, rects));
    }

    /// How many frames ago the back buffer's contents were defined. 0 means undefined.
    ///
    /// Valid until the next swap.
    pub fn buffer_age(&self) -> i32 {
        if !self.display().has_winsys_feature(WinsysFeatureFlags::BUFFER_AGE) {
            return 0;
        }
        match self.allocated_winsys() {
            None => 0,
            Some(winsys) => surface::buffer_age(&winsys.egl, self),
        }
    }

    pub fn set_swap_throttled(&self, throttled: bool) {
        self.inner.state.borrow_mut().config.swap_throttled = throttled;
        if let Some(winsys) = self.allocated_winsys() {
            surface::update_swap_throttled(&winsys.egl, self);
        }
    }

    /// Maps the onscreen, allocating it first if needed.
    pub fn show(&self) {
        if let Err(err) = self.allocate() {
            warn!("Couldn't allocate the onscreen to show it: {}", err);
            return;
        }
        if let Some(winsys) = self.allocated_winsys() {
            winsys.backend().set_visibility(self, true);
        }
    }

    pub fn hide(&self) {
        if let Some(winsys) = self.allocated_winsys() {
            winsys.backend().set_visibility(self, false);
        }
    }

    /// Lets the window manager resize the onscreen. Only meaningful on X11.
    pub fn set_resizable(&self, resizable: bool) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.resizable == resizable {
                return;
            }
            state.resizable = resizable;
        }
        if let Some(winsys) = self.allocated_winsys() {
            winsys.backend().set_resizable(self, resizable);
        }
    }

    #[inline]
    pub fn is_resizable(&self) -> bool {
        self.inner.state.borrow().resizable
    }

    /// The number of swaps so far. The next swap's [`FrameInfo`] carries this value.
    #[inline]
    pub fn frame_counter(&self) -> i64 {
        self.inner.state.borrow().frame_counter
    }

    /// Marks the start of rendering a frame. Wayland defers resizes until the next swap while a
    /// frame is in progress.
    pub fn begin_frame(&self) {
        self.inner.state.borrow_mut().mid_scene = true;
    }

    pub fn add_frame_callback<F>(&self, callback: F) -> ClosureHandle
                                 where F: FnMut(&Onscreen, FrameEvent, &FrameInfo) + 'static {
        self.inner.frame_closures.add(Box::new(callback))
    }

    pub fn remove_frame_callback(&self, handle: ClosureHandle) {
        if !self.inner.frame_closures.remove(handle) {
            warn!("Tried to remove an unknown frame callback");
        }
    }

    /// Adds a callback run with the new size after the windowing system resizes the onscreen.
    pub fn add_resize_callback<F>(&self, callback: F) -> ClosureHandle
                                  where F: FnMut(&Onscreen, i32, i32) + 'static {
        self.inner.resize_closures.add(Box::new(callback))
    }

    pub fn remove_resize_callback(&self, handle: ClosureHandle) {
        if !self.inner.resize_closures.remove(handle) {
            warn!("Tried to remove an unknown resize callback");
        }
    }

    /// Adds a callback run for each rectangle whose contents the windowing system lost.
    pub fn add_dirty_callback<F>(&self, callback: F) -> ClosureHandle
                                 where F: FnMut(&Onscreen, &Rect) + 'static {
        self.inner.dirty_closures.add(Box::new(callback))
    }

    pub fn remove_dirty_callback(&self, handle: ClosureHandle) {
        if !self.inner.dirty_closures.remove(handle) {
            warn!("Tried to remove an unknown dirty callback");
        }
    }

    pub fn downgrade(&self) -> WeakOnscreen {
        WeakOnscreen(Rc::downgrade(&self.inner))
    }

    /// Renders into a native window the application created.
    ///
    /// Must be called before allocation. Xlib, XCB and Wayland handles are supported; on X11 the
    /// backend selects the input events it needs on the window itself.
    #[cfg(feature = "sm-raw-window-handle-06")]
    pub fn set_foreign_window_handle(&self, handle: RawWindowHandle) -> Result<(), Error> {
        assert!(!self.is_allocated(), "foreign surfaces must be set before allocation");
        let mut foreign = self.inner.foreign.borrow_mut();
        match handle {
            RawWindowHandle::Xlib(handle) => foreign.x11_xid = Some(handle.window as XWindow),
            RawWindowHandle::Xcb(handle) => foreign.x11_xid = Some(handle.window.get() as XWindow),
            RawWindowHandle::Wayland(handle) => foreign.wayland_surface = Some(handle.surface),
            _ => {
                return Err(Error::CreateOnscreen("Unsupported native window handle".to_owned()))
            }
        }
        Ok(())
    }

    /// Runs a backend swap and does the frame bookkeeping around it.
    fn present<F>(&self, swap: F) where F: FnOnce(&Onscreen) {
        let features = self.display().features();
        let info = {
            let mut state = self.inner.state.borrow_mut();
            let info = Rc::new(FrameInfo::new(state.frame_counter));
            state.pending_frames.push_back(info.clone());
            info
        };

        swap(self);

        if !(features.features.contains(FeatureFlags::PRESENTATION_TIME) &&
                features.presentation_clock_is_monotonic) {
            info.set_presentation_time(frame_info::monotonic_time_ns());
        }

        // Backends without presentation feedback complete the frame right away.
        if !features.winsys_features.contains(WinsysFeatureFlags::SYNC_AND_COMPLETE_EVENT) {
            if let Some(info) = self.pop_pending_frame_back() {
                self.queue_event(FrameEvent::Sync, info.clone());
                self.queue_event(FrameEvent::Complete, info);
            }
        }

        let mut state = self.inner.state.borrow_mut();
        state.frame_counter += 1;
        state.mid_scene = false;
    }

    fn allocated_winsys(&self) -> Option<Rc<crate::platform::WinsysRenderer>> {
        if !self.is_allocated() {
            return None;
        }
        self.display().winsys_renderer()
    }

    pub(crate) fn egl_surface(&self) -> EGLSurface {
        self.inner.winsys.borrow().as_ref().map_or(egl::NO_SURFACE, |egl_onscreen| {
            egl_onscreen.surface
        })
    }

    pub(crate) fn set_samples_per_pixel(&self, samples: u32) {
        self.inner.state.borrow_mut().config.samples_per_pixel = samples;
    }

    /// Runs `f` on the onscreen's backend state, if it is allocated.
    pub(crate) fn with_winsys<F, R>(&self, f: F) -> Option<R> where F: FnOnce(&mut EglOnscreen) -> R {
        self.inner.winsys.borrow_mut().as_mut().map(f)
    }

    /// Records a size change made by the windowing system.
    ///
    /// Unless the backend reports damage itself the whole surface is queued as dirty.
    pub(crate) fn update_size(&self, width: i32, height: i32) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.width == width && state.height == height {
                return;
            }
            state.width = width;
            state.height = height;
        }

        let features = self.display().features();
        if !features.private_features.contains(PrivateFeatureFlags::DIRTY_EVENTS) {
            self.queue_full_dirty();
        }
    }

    pub(crate) fn pop_pending_frame_front(&self) -> Option<Rc<FrameInfo>> {
        self.inner.state.borrow_mut().pending_frames.pop_front()
    }

    pub(crate) fn pop_pending_frame_back(&self) -> Option<Rc<FrameInfo>> {
        self.inner.state.borrow_mut().pending_frames.pop_back()
    }

    pub(crate) fn newest_pending_frame(&self) -> Option<Rc<FrameInfo>> {
        self.inner.state.borrow().pending_frames.back().cloned()
    }

    pub(crate) fn queue_event(&self, event: FrameEvent, info: Rc<FrameInfo>) {
        self.inner.state.borrow_mut().events.push_back((event, info));
        self.queue_dispatch();
    }

    pub(crate) fn queue_dirty(&self, rect: Rect) {
        self.inner.state.borrow_mut().dirty.push_back(rect);
        self.queue_dispatch();
    }

    pub(crate) fn queue_full_dirty(&self) {
        let size = self.size();
        self.queue_dirty(Rect::new(Point2D::zero(), size));
    }

    /// Notifications already pending collapse into one that reports the size at dispatch time.
    pub(crate) fn queue_resize_notify(&self) {
        self.inner.state.borrow_mut().resize_pending = true;
        self.queue_dispatch();
    }

    fn queue_dispatch(&self) {
        if self.inner.state.borrow().dispatch_idle.is_some() {
            return;
        }
        let weak = self.downgrade();
        let handle = self.display().renderer().main_loop().add_idle(Box::new(move || {
            if let Some(onscreen) = weak.upgrade() {
                onscreen.dispatch_queued();
            }
        }));
        self.inner.state.borrow_mut().dispatch_idle = Some(handle);
    }

    /// Delivers everything queued so far: frame events, then dirty rectangles, then the resize.
    fn dispatch_queued(&self) {
        // Callbacks may swap and queue more; those wait for the next dispatch.
        let (events, resize_pending, idle) = {
            let mut state = self.inner.state.borrow_mut();
            let events = std::mem::take(&mut state.events);
            let resize_pending = std::mem::replace(&mut state.resize_pending, false);
            (events, resize_pending, state.dispatch_idle.take())
        };
        if let Some(idle) = idle {
            self.display().renderer().main_loop().cancel_idle(idle);
        }

        for (event, info) in events {
            match event {
                FrameEvent::Sync => debug!("Notify frame sync for frame {}", info.frame_counter()),
                FrameEvent::Complete => {
                    debug!("Notify frame complete for frame {}", info.frame_counter())
                }
            }
            self.inner.frame_closures.invoke(|callback| callback(self, event, &info));
        }

        loop {
            let rect = match self.inner.state.borrow_mut().dirty.pop_front() {
                None => break,
                Some(rect) => rect,
            };
            self.inner.dirty_closures.invoke(|callback| callback(self, &rect));
        }

        if resize_pending {
            let size = self.size();
            self.inner.resize_closures.invoke(|callback| {
                callback(self, size.width, size.height)
            });
        }
    }
}

impl Drop for OnscreenInner {
    fn drop(&mut self) {
        if let Some(idle) = self.state.get_mut().dispatch_idle.take() {
            self.display.renderer().main_loop().cancel_idle(idle);
        }
        self.frame_closures.clear();
        self.resize_closures.clear();
        self.dirty_closures.clear();
        self.state.get_mut().pending_frames.clear();

        if !self.state.get_mut().allocated {
            return;
        }
        if let Some(winsys) = self.display.winsys_renderer() {
            surface::onscreen_deinit(&winsys, &self.display.inner, self);
        }
    }
}
