// cglib-winsys/src/platform/unix/kms/drm.rs
//
//! The kernel mode-setting interface.

use std::io;

pub const DRM_MODE_CONNECTOR_LVDS: u32 = 7;
pub const DRM_MODE_CONNECTOR_EDP: u32 = 14;

pub const DRM_MODE_FLAG_NHSYNC: u32 = 1 << 1;
pub const DRM_MODE_FLAG_PVSYNC: u32 = 1 << 2;

pub const DRM_CAP_TIMESTAMP_MONOTONIC: u64 = 6;

/// A display mode, as the kernel describes it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModeInfo {
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    pub vrefresh: u32,
    pub flags: u32,
    pub mode_type: u32,
    pub name: String,
}

impl ModeInfo {
    /// The 1024x768 mode offered on panels in addition to whatever they report.
    pub fn builtin_1024x768() -> ModeInfo {
        ModeInfo {
            clock: 63500,
            hdisplay: 1024,
            hsync_start: 1072,
            hsync_end: 1176,
            htotal: 1328,
            hskew: 0,
            vdisplay: 768,
            vsync_start: 771,
            vsync_end: 775,
            vtotal: 798,
            vscan: 0,
            vrefresh: 59920,
            flags: DRM_MODE_FLAG_NHSYNC | DRM_MODE_FLAG_PVSYNC,
            mode_type: 0,
            name: "1024x768".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrmResources {
    pub crtcs: Vec<u32>,
    pub connectors: Vec<u32>,
    pub encoders: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrmConnector {
    pub id: u32,
    pub connector_type: u32,
    pub connected: bool,
    pub modes: Vec<ModeInfo>,
    pub encoders: Vec<u32>,
}

impl DrmConnector {
    /// Whether this is a built-in panel.
    pub fn is_panel(&self) -> bool {
        self.connector_type == DRM_MODE_CONNECTOR_LVDS ||
            self.connector_type == DRM_MODE_CONNECTOR_EDP
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrmEncoder {
    pub id: u32,
    pub crtc_id: u32,
}

/// A CRTC's configuration, saved so it can be restored on exit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrmCrtc {
    pub id: u32,
    pub buffer_id: u32,
    pub x: u32,
    pub y: u32,
    /// `None` when the CRTC has no valid mode.
    pub mode: Option<ModeInfo>,
}

/// A completed page flip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageFlipEvent {
    /// The value passed to [`DrmDevice::page_flip`].
    pub user_data: u64,
    pub sequence: u32,
    pub tv_sec: u32,
    pub tv_usec: u32,
}

impl PageFlipEvent {
    /// The flip's timestamp in nanoseconds.
    pub fn time_ns(&self) -> i64 {
        self.tv_sec as i64 * 1_000_000_000 + self.tv_usec as i64 * 1000
    }
}

/// A DRM device, as used by the KMS backend.
pub trait DrmDevice {
    fn resources(&self) -> io::Result<DrmResources>;

    fn connector(&self, id: u32) -> Option<DrmConnector>;

    fn encoder(&self, id: u32) -> Option<DrmEncoder>;

    fn crtc(&self, id: u32) -> Option<DrmCrtc>;

    /// Registers a buffer for scanout and returns its framebuffer id.
    fn add_framebuffer(&self,
                       width: u32,
                       height: u32,
                       depth: u8,
                       bpp: u8,
                       pitch: u32,
                       handle: u32)
                       -> io::Result<u32>;

    fn remove_framebuffer(&self, framebuffer: u32) -> io::Result<()>;

    fn set_crtc(&self,
                crtc: u32,
                framebuffer: u32,
                x: u32,
                y: u32,
                connectors: &[u32],
                mode: Option<&ModeInfo>)
                -> io::Result<()>;

    /// Queues a flip to `framebuffer` at the next vblank. Its completion is reported by
    /// [`DrmDevice::read_events`] carrying `user_data`.
    fn page_flip(&self, crtc: u32, framebuffer: u32, user_data: u64) -> io::Result<()>;

    fn capability(&self, capability: u64) -> io::Result<u64>;

    /// Blocks until at least one event is available and returns the page flips among them.
    fn read_events(&self) -> io::Result<Vec<PageFlipEvent>>;
}
