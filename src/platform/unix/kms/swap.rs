// cglib-winsys/src/platform/unix/kms/swap.rs
//
//! Presenting frames with page flips, and completing them.

use super::drm::PageFlipEvent;
use super::{with_kms_display, with_kms_onscreen, FlipRecord, KmsCrtc, KmsRenderer};
use super::ScanoutBuffer;
use crate::frame_info::FrameEvent;
use crate::onscreen::Onscreen;
use crate::platform::generic::egl::{surface, EglRenderer};
use crate::Rect;

use std::mem;

fn flip_in_flight(onscreen: &Onscreen) -> bool {
    with_kms_onscreen(onscreen, |kms_onscreen| kms_onscreen.next.is_some()).unwrap_or(false)
}

impl KmsRenderer {
    /// Blocks until the onscreen has no flip in flight.
    ///
    /// Returns false if DRM events couldn't be read, in which case the flip is still pending.
    pub(crate) fn wait_for_flip_slot(&self, onscreen: &Onscreen) -> bool {
        while flip_in_flight(onscreen) {
            match self.drm.read_events() {
                Ok(events) => self.handle_page_flips(events),
                Err(err) => {
                    warn!("Failed to read DRM events while waiting for a page flip: {}", err);
                    return false;
                }
            }
        }
        true
    }

    /// Handles whatever events are readable on the DRM fd.
    pub(crate) fn dispatch_events(&self) {
        match self.drm.read_events() {
            Ok(events) => self.handle_page_flips(events),
            Err(err) => warn!("Failed to read DRM events: {}", err),
        }
    }

    /// Blocks until every outstanding flip has completed.
    pub(crate) fn drain_flips(&self) {
        while !self.flips.borrow().is_empty() {
            match self.drm.read_events() {
                Ok(events) => self.handle_page_flips(events),
                Err(err) => {
                    warn!("Failed to read DRM events while draining page flips: {}", err);
                    break;
                }
            }
        }

        // Whatever is left will never complete. Its buffers are released before the records
        // drop what may be the last handle on their onscreens.
        let abandoned = mem::take(&mut *self.flips.borrow_mut());
        if !abandoned.is_empty() {
            warn!("Abandoning {} page flips", abandoned.len());
        }
        for (_, flip) in abandoned {
            self.abandon_flip(&flip.onscreen);
        }
    }

    fn handle_page_flips(&self, events: Vec<PageFlipEvent>) {
        for event in events {
            let finished = {
                let mut flips = self.flips.borrow_mut();
                match flips.get_mut(&event.user_data) {
                    None => {
                        warn!("Page flip event for unknown flip {}", event.user_data);
                        continue;
                    }
                    // Only complete once every CRTC has flipped.
                    Some(flip) if flip.pending > 1 => {
                        flip.pending -= 1;
                        continue;
                    }
                    Some(_) => {}
                }
                flips.remove(&event.user_data)
            };

            if let Some(flip) = finished {
                self.complete_flip(flip, &event);
            }
        }
    }

    /// Reports the frame and retires the buffer it replaced. Drops the flip's onscreen handle.
    fn complete_flip(&self, flip: FlipRecord, event: &PageFlipEvent) {
        let onscreen = &flip.onscreen;
        if let Some(info) = onscreen.pop_pending_frame_front() {
            info.set_presentation_time(event.time_ns());
            onscreen.queue_event(FrameEvent::Sync, info.clone());
            onscreen.queue_event(FrameEvent::Complete, info);
        }

        let (replaced, retired) = with_kms_onscreen(onscreen, |kms_onscreen| {
            let replaced = kms_onscreen.current.take().map(|buffer| (kms_onscreen.surface, buffer));
            kms_onscreen.current = kms_onscreen.next.take();
            // A surface dropped by a resize is off screen once anything has flipped.
            (replaced, kms_onscreen.retired.take())
        }).unwrap_or((None, None));
        if let Some((surface, buffer)) = replaced {
            self.release_scanout(surface, buffer);
        }
        if let Some((surface, buffer)) = retired {
            self.release_retired(surface, buffer);
        }
    }

    fn abandon_flip(&self, onscreen: &Onscreen) {
        onscreen.pop_pending_frame_front();
        let next = with_kms_onscreen(onscreen, |kms_onscreen| {
            kms_onscreen.next.take().map(|buffer| (kms_onscreen.surface, buffer))
        }).flatten();
        if let Some((surface, buffer)) = next {
            self.release_scanout(surface, buffer);
        }
    }

    /// Forgets the frame just submitted. It still gets its events if nothing earlier is in
    /// flight, so frame-paced applications keep going.
    fn drop_frame(&self, onscreen: &Onscreen) {
        let info = onscreen.pop_pending_frame_back();
        if let Some(info) = info {
            if !flip_in_flight(onscreen) {
                onscreen.queue_event(FrameEvent::Sync, info.clone());
                onscreen.queue_event(FrameEvent::Complete, info);
            }
        }
    }

    fn set_crtc_modes(&self, crtcs: &[KmsCrtc], framebuffer: u32) {
        for crtc in crtcs {
            let mode = if crtc.connectors.is_empty() { None } else { Some(&crtc.mode) };
            if let Err(err) = self.drm.set_crtc(crtc.id,
                                                framebuffer,
                                                crtc.x,
                                                crtc.y,
                                                &crtc.connectors,
                                                mode) {
                warn!("Failed to set crtc mode {}: {}", crtc.mode.name, err);
            }
        }
    }

    /// Queues a flip on every CRTC that drives a connector. Returns how many accepted it.
    fn flip_all_crtcs(&self, crtcs: &[KmsCrtc], framebuffer: u32, flip_id: u64) -> u32 {
        let mut accepted = 0;
        for crtc in crtcs.iter().filter(|crtc| !crtc.connectors.is_empty()) {
            match self.drm.page_flip(crtc.id, framebuffer, flip_id) {
                Ok(()) => accepted += 1,
                Err(err) => warn!("Failed to flip CRTC {}: {}", crtc.id, err),
            }
        }
        accepted
    }

    pub(crate) fn swap_buffers(&self, egl: &EglRenderer, onscreen: &Onscreen, rects: &[Rect]) {
        if !self.wait_for_flip_slot(onscreen) {
            self.drop_frame(onscreen);
            return;
        }

        surface::swap_buffers_with_damage(egl, onscreen, rects);

        let gbm_surface = match with_kms_onscreen(onscreen, |kms_onscreen| kms_onscreen.surface) {
            None => return,
            Some(gbm_surface) => gbm_surface,
        };
        let layout = match with_kms_display(onscreen.display(), |kms_display| {
            let set_crtc = mem::replace(&mut kms_display.pending_set_crtc, false);
            (kms_display.layout.clone(), set_crtc)
        }) {
            None => return,
            Some(layout) => layout,
        };
        let (layout, set_crtc) = layout;

        let bo = match self.gbm.lock_front_buffer(gbm_surface) {
            Some(bo) => bo,
            None => {
                warn!("Failed to lock the front buffer");
                self.restore_pending_set_crtc(onscreen, set_crtc);
                self.drop_frame(onscreen);
                return;
            }
        };

        let framebuffer = match self.drm.add_framebuffer(layout.width as u32,
                                                         layout.height as u32,
                                                         24,
                                                         32,
                                                         self.gbm.buffer_stride(bo),
                                                         self.gbm.buffer_handle(bo)) {
            Ok(framebuffer) => framebuffer,
            Err(err) => {
                warn!("Failed to create new back buffer handle: {}", err);
                self.gbm.release_buffer(gbm_surface, bo);
                self.restore_pending_set_crtc(onscreen, set_crtc);
                self.drop_frame(onscreen);
                return;
            }
        };
        let buffer = ScanoutBuffer { bo, framebuffer };

        // The first frame after the layout is (re)established sets the modes.
        if set_crtc {
            self.set_crtc_modes(&layout.crtcs, framebuffer);
        }

        let flip_id = self.next_flip_id.get();
        self.next_flip_id.set(flip_id + 1);

        let accepted = self.flip_all_crtcs(&layout.crtcs, framebuffer, flip_id);
        if accepted == 0 {
            // No completion will ever arrive for this buffer.
            self.release_scanout(gbm_surface, buffer);
            self.drop_frame(onscreen);
            return;
        }

        with_kms_onscreen(onscreen, |kms_onscreen| kms_onscreen.next = Some(buffer));
        self.flips.borrow_mut().insert(flip_id, FlipRecord {
            onscreen: onscreen.clone(),
            pending: accepted,
        });
    }

    fn restore_pending_set_crtc(&self, onscreen: &Onscreen, set_crtc: bool) {
        if set_crtc {
            with_kms_display(onscreen.display(), |kms_display| kms_display.pending_set_crtc = true);
        }
    }
}
