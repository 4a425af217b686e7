// cglib-winsys/src/info.rs
//
//! Capabilities discovered while setting up a display.

bitflags! {
    /// Features exposed to applications.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FeatureFlags: u32 {
        /// More than one onscreen may exist at a time.
        const ONSCREEN_MULTIPLE = 0x01;
        /// Frame infos carry a real presentation time from the display hardware.
        const PRESENTATION_TIME = 0x02;
        /// GPU fences are available.
        const FENCE             = 0x04;
        /// A GLES2 context can be created without an extra surface.
        const GLES2_CONTEXT     = 0x08;
    }
}

bitflags! {
    /// Features of the windowing system backend.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct WinsysFeatureFlags: u32 {
        /// More than one onscreen may exist at a time.
        const MULTIPLE_ONSCREEN       = 0x01;
        /// Sub-regions of an onscreen can be presented.
        const SWAP_REGION             = 0x02;
        /// Swapping a region is throttled to the display refresh.
        const SWAP_REGION_THROTTLE    = 0x04;
        /// The age of the back buffer can be queried.
        const BUFFER_AGE              = 0x08;
        /// SYNC and COMPLETE events are driven by the display rather than synthesized at swap
        /// time.
        const SYNC_AND_COMPLETE_EVENT = 0x10;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub(crate) struct PrivateFeatureFlags: u32 {
        // The backend queues dirty rectangles itself.
        const DIRTY_EVENTS = 0x01;
    }
}

/// Everything a display learned about the backend during setup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisplayFeatures {
    /// Application-visible features.
    pub features: FeatureFlags,
    /// Windowing system features.
    pub winsys_features: WinsysFeatureFlags,
    /// Whether [`crate::FrameInfo::presentation_time`] is on the `CLOCK_MONOTONIC` clock.
    pub presentation_clock_is_monotonic: bool,
    pub(crate) private_features: PrivateFeatureFlags,
}
