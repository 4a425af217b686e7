// cglib-winsys/src/platform/unix/kms/device.rs
//
//! [`DrmDevice`] and [`GbmDevice`] on the `drm` and `gbm` crates.

use super::drm::{DrmConnector, DrmCrtc, DrmDevice, DrmEncoder, DrmResources, ModeInfo};
use super::drm::{PageFlipEvent, DRM_CAP_TIMESTAMP_MONOTONIC};
use super::gbm::{BufferObject, GbmBufferFlags, GbmDevice, GbmSurface};
use crate::Error;

use drm::buffer::{self, DrmFourcc};
use drm::control::{self, connector, Device as ControlDevice, Event, Mode, PageFlipFlags};
use drm::{Device as BasicDevice, DriverCapability};
use drm_ffi::drm_mode_modeinfo;
use fnv::FnvHashMap;
use gbm::AsRaw;
use std::cell::RefCell;
use std::ffi::CStr;
use std::io;
use std::os::raw::c_void;
use std::os::unix::io::{AsFd, BorrowedFd, RawFd};

/// A DRM device node the renderer keeps open. Never closed here.
struct Card(RawFd);

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        // The fd outlives every device created on it.
        unsafe { BorrowedFd::borrow_raw(self.0) }
    }
}

impl BasicDevice for Card {}
impl ControlDevice for Card {}

fn handle<T: From<control::RawResourceHandle>>(id: u32) -> io::Result<T> {
    control::from_u32(id).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("{} is not a DRM object id", id))
    })
}

pub(crate) fn mode_from_drm(mode: Mode) -> ModeInfo {
    let raw: drm_mode_modeinfo = mode.into();
    let name = unsafe { CStr::from_ptr(raw.name.as_ptr()) };
    ModeInfo {
        clock: raw.clock,
        hdisplay: raw.hdisplay,
        hsync_start: raw.hsync_start,
        hsync_end: raw.hsync_end,
        htotal: raw.htotal,
        hskew: raw.hskew,
        vdisplay: raw.vdisplay,
        vsync_start: raw.vsync_start,
        vsync_end: raw.vsync_end,
        vtotal: raw.vtotal,
        vscan: raw.vscan,
        vrefresh: raw.vrefresh,
        flags: raw.flags,
        mode_type: raw.type_,
        name: name.to_string_lossy().into_owned(),
    }
}

pub(crate) fn mode_to_drm(mode: &ModeInfo) -> Mode {
    let mut name = [0; 32];
    for (dest, &byte) in name.iter_mut().zip(mode.name.as_bytes()).take(31) {
        *dest = byte as _;
    }
    Mode::from(drm_mode_modeinfo {
        clock: mode.clock,
        hdisplay: mode.hdisplay,
        hsync_start: mode.hsync_start,
        hsync_end: mode.hsync_end,
        htotal: mode.htotal,
        hskew: mode.hskew,
        vdisplay: mode.vdisplay,
        vsync_start: mode.vsync_start,
        vsync_end: mode.vsync_end,
        vtotal: mode.vtotal,
        vscan: mode.vscan,
        vrefresh: mode.vrefresh,
        flags: mode.flags,
        type_: mode.mode_type,
        name,
    })
}

/// A locked GBM buffer, described the way `add_framebuffer` wants it.
struct ScanoutDescription {
    width: u32,
    height: u32,
    pitch: u32,
    handle: buffer::Handle,
}

impl buffer::Buffer for ScanoutDescription {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> DrmFourcc {
        DrmFourcc::Xrgb8888
    }

    fn pitch(&self) -> u32 {
        self.pitch
    }

    fn handle(&self) -> buffer::Handle {
        self.handle
    }
}

/// A DRM device on an open fd. The fd is not owned.
pub struct NativeDrmDevice {
    card: Card,
    /// The caller's `user_data` for the flip queued on each CRTC. The kernel reports flips by
    /// CRTC, and accepts one at a time on each.
    queued_flips: RefCell<FnvHashMap<u32, u64>>,
}

impl NativeDrmDevice {
    pub(crate) fn new(fd: RawFd) -> Result<NativeDrmDevice, Error> {
        let card = Card(fd);
        card.resource_handles().map_err(|err| {
            Error::Init(format!("{} is not a mode-setting device: {}", fd, err))
        })?;
        Ok(NativeDrmDevice { card, queued_flips: RefCell::new(FnvHashMap::default()) })
    }

    fn wait_readable(&self) -> io::Result<()> {
        let mut poll_fd = libc::pollfd { fd: self.card.0, events: libc::POLLIN, revents: 0 };
        loop {
            let result = unsafe { libc::poll(&mut poll_fd, 1, -1) };
            if result >= 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl DrmDevice for NativeDrmDevice {
    fn resources(&self) -> io::Result<DrmResources> {
        let handles = self.card.resource_handles()?;
        Ok(DrmResources {
            crtcs: handles.crtcs().iter().map(|&id| u32::from(id)).collect(),
            connectors: handles.connectors().iter().map(|&id| u32::from(id)).collect(),
            encoders: handles.encoders().iter().map(|&id| u32::from(id)).collect(),
        })
    }

    fn connector(&self, id: u32) -> Option<DrmConnector> {
        let info = self.card.get_connector(handle(id).ok()?, true).ok()?;
        Some(DrmConnector {
            id: u32::from(info.handle()),
            connector_type: u32::from(info.interface()),
            connected: info.state() == connector::State::Connected,
            modes: info.modes().iter().map(|&mode| mode_from_drm(mode)).collect(),
            encoders: info.encoders().iter().map(|&id| u32::from(id)).collect(),
        })
    }

    fn encoder(&self, id: u32) -> Option<DrmEncoder> {
        let info = self.card.get_encoder(handle(id).ok()?).ok()?;
        Some(DrmEncoder {
            id: u32::from(info.handle()),
            crtc_id: info.crtc().map_or(0, u32::from),
        })
    }

    fn crtc(&self, id: u32) -> Option<DrmCrtc> {
        let info = self.card.get_crtc(handle(id).ok()?).ok()?;
        let (x, y) = info.position();
        Some(DrmCrtc {
            id: u32::from(info.handle()),
            buffer_id: info.framebuffer().map_or(0, u32::from),
            x,
            y,
            mode: info.mode().map(mode_from_drm),
        })
    }

    fn add_framebuffer(&self,
                       width: u32,
                       height: u32,
                       depth: u8,
                       bpp: u8,
                       pitch: u32,
                       buffer_handle: u32)
                       -> io::Result<u32> {
        let description = ScanoutDescription {
            width,
            height,
            pitch,
            handle: handle(buffer_handle)?,
        };
        let framebuffer = self.card.add_framebuffer(&description, depth as u32, bpp as u32)?;
        Ok(u32::from(framebuffer))
    }

    fn remove_framebuffer(&self, framebuffer: u32) -> io::Result<()> {
        self.card.destroy_framebuffer(handle(framebuffer)?)
    }

    fn set_crtc(&self,
                crtc: u32,
                framebuffer: u32,
                x: u32,
                y: u32,
                connectors: &[u32],
                mode: Option<&ModeInfo>)
                -> io::Result<()> {
        let connectors = connectors.iter()
                                   .map(|&connector| handle(connector))
                                   .collect::<io::Result<Vec<connector::Handle>>>()?;
        // Framebuffer 0 turns the CRTC off.
        self.card.set_crtc(handle(crtc)?,
                           control::from_u32(framebuffer),
                           (x, y),
                           &connectors,
                           mode.map(mode_to_drm))
    }

    fn page_flip(&self, crtc: u32, framebuffer: u32, user_data: u64) -> io::Result<()> {
        self.card.page_flip(handle(crtc)?, handle(framebuffer)?, PageFlipFlags::EVENT, None)?;
        self.queued_flips.borrow_mut().insert(crtc, user_data);
        Ok(())
    }

    fn capability(&self, capability: u64) -> io::Result<u64> {
        match capability {
            DRM_CAP_TIMESTAMP_MONOTONIC => {
                self.card.get_driver_capability(DriverCapability::MonotonicTimestamp)
            }
            _ => Err(io::Error::new(io::ErrorKind::Unsupported,
                                    format!("DRM capability {} is not queried", capability))),
        }
    }

    fn read_events(&self) -> io::Result<Vec<PageFlipEvent>> {
        self.wait_readable()?;

        let mut flips = vec![];
        let mut queued_flips = self.queued_flips.borrow_mut();
        for event in self.card.receive_events()? {
            let flip = match event {
                Event::PageFlip(flip) => flip,
                _ => continue,
            };
            let crtc = u32::from(flip.crtc);
            match queued_flips.remove(&crtc) {
                Some(user_data) => flips.push(PageFlipEvent {
                    user_data,
                    sequence: flip.frame,
                    tv_sec: flip.duration.as_secs() as u32,
                    tv_usec: flip.duration.subsec_micros(),
                }),
                None => warn!("Page flip completed on CRTC {} with nothing queued", crtc),
            }
        }
        Ok(flips)
    }
}

/// A GBM device on an open DRM fd.
///
/// The surfaces and locked buffers handed out are owned here and looked up by their pointers.
pub struct NativeGbmDevice {
    // Dropped in order: buffers, then their surfaces, then the device.
    buffers: RefCell<FnvHashMap<BufferObject, gbm::BufferObject<()>>>,
    surfaces: RefCell<FnvHashMap<GbmSurface, gbm::Surface<()>>>,
    device: gbm::Device<Card>,
}

impl NativeGbmDevice {
    pub(crate) fn new(fd: RawFd) -> Result<NativeGbmDevice, Error> {
        let device = gbm::Device::new(Card(fd)).map_err(|err| {
            Error::Init(format!("gbm_create_device failed: {}", err))
        })?;
        Ok(NativeGbmDevice {
            buffers: RefCell::new(FnvHashMap::default()),
            surfaces: RefCell::new(FnvHashMap::default()),
            device,
        })
    }
}

impl GbmDevice for NativeGbmDevice {
    fn native_display(&self) -> *mut c_void {
        self.device.as_raw() as *mut c_void
    }

    fn create_surface(&self, width: u32, height: u32, format: u32, flags: GbmBufferFlags)
                      -> Option<GbmSurface> {
        let format = match gbm::Format::try_from(format) {
            Ok(format) => format,
            Err(_) => {
                warn!("Unknown GBM format {:#x}", format);
                return None;
            }
        };
        let usage = gbm::BufferObjectFlags::from_bits_truncate(flags.bits());
        let surface = match self.device.create_surface::<()>(width, height, format, usage) {
            Ok(surface) => surface,
            Err(err) => {
                warn!("Failed to create a {}x{} GBM surface: {}", width, height, err);
                return None;
            }
        };
        let key = GbmSurface(surface.as_raw() as *mut c_void);
        self.surfaces.borrow_mut().insert(key, surface);
        Some(key)
    }

    fn destroy_surface(&self, surface: GbmSurface) {
        if self.surfaces.borrow_mut().remove(&surface).is_none() {
            warn!("Tried to destroy unknown GBM surface {:?}", surface);
        }
    }

    fn lock_front_buffer(&self, surface: GbmSurface) -> Option<BufferObject> {
        let surfaces = self.surfaces.borrow();
        let surface = surfaces.get(&surface)?;
        // Only called after EGL has swapped the surface.
        let bo = match unsafe { surface.lock_front_buffer() } {
            Ok(bo) => bo,
            Err(err) => {
                warn!("gbm_surface_lock_front_buffer failed: {}", err);
                return None;
            }
        };
        let key = BufferObject(bo.as_raw() as *mut c_void);
        self.buffers.borrow_mut().insert(key, bo);
        Some(key)
    }

    fn release_buffer(&self, _surface: GbmSurface, buffer: BufferObject) {
        // Dropping a locked buffer returns it to its surface.
        if self.buffers.borrow_mut().remove(&buffer).is_none() {
            warn!("Tried to release unknown GBM buffer {:?}", buffer);
        }
    }

    fn buffer_handle(&self, buffer: BufferObject) -> u32 {
        match self.buffers.borrow().get(&buffer) {
            Some(bo) => unsafe { bo.handle().u32_ },
            None => 0,
        }
    }

    fn buffer_stride(&self, buffer: BufferObject) -> u32 {
        self.buffers.borrow().get(&buffer).map_or(0, |bo| bo.stride())
    }
}
