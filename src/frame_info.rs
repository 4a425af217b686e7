// cglib-winsys/src/frame_info.rs
//
//! Per-frame presentation records.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// The two frame events reported for every swap, always in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameEvent {
    /// The frame has been handed to the display and the application may start the next one.
    Sync,
    /// The frame is on screen and its presentation time is known.
    Complete,
}

/// Information about one submitted frame.
///
/// A record is created for every swap, queued on the onscreen until the backend reports the
/// frame as presented, and then handed to the frame callbacks with the [`FrameEvent::Sync`] and
/// [`FrameEvent::Complete`] events.
#[derive(Debug)]
pub struct FrameInfo {
    frame_id: u64,
    frame_counter: i64,
    submission_time: i64,
    presentation_time: Cell<i64>,
}

impl FrameInfo {
    pub(crate) fn new(frame_counter: i64) -> FrameInfo {
        FrameInfo {
            frame_id: NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed),
            frame_counter,
            submission_time: monotonic_time_ns(),
            presentation_time: Cell::new(0),
        }
    }

    /// A process-wide unique identifier for this frame.
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// The onscreen's frame counter at the time of the swap.
    #[inline]
    pub fn frame_counter(&self) -> i64 {
        self.frame_counter
    }

    /// Monotonic time in nanoseconds at which the swap was requested.
    #[inline]
    pub fn submission_time(&self) -> i64 {
        self.submission_time
    }

    /// Time in nanoseconds at which the frame became visible, or 0 if not yet known.
    ///
    /// Whether this is on the monotonic clock is reported by
    /// [`crate::DisplayFeatures::presentation_clock_is_monotonic`].
    #[inline]
    pub fn presentation_time(&self) -> i64 {
        self.presentation_time.get()
    }

    pub(crate) fn set_presentation_time(&self, time: i64) {
        self.presentation_time.set(time)
    }
}

/// Current `CLOCK_MONOTONIC` time in nanoseconds.
pub(crate) fn monotonic_time_ns() -> i64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    ts.tv_sec as i64 * 1_000_000_000 + ts.tv_nsec as i64
}
