// cglib-winsys/src/platform/unix/kms/output.rs
//
//! Choosing the connectors, modes and CRTCs to drive.

use super::drm::{DrmConnector, DrmCrtc, DrmDevice, DrmEncoder, DrmResources, ModeInfo};
use crate::platform::Platform;
use crate::Error;

/// Output overrides read from the environment when the renderer connects.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct KmsEnvConfig {
    /// `CG_KMS_CONNECTOR0` and `CG_KMS_CONNECTOR1`.
    pub(crate) connectors: [Option<u32>; 2],
    /// `CG_KMS_CONNECTOR0_MODE` and `CG_KMS_CONNECTOR1_MODE`.
    pub(crate) modes: [Option<String>; 2],
    /// `CG_KMS_MIRROR`.
    pub(crate) mirror: bool,
}

impl KmsEnvConfig {
    pub(crate) fn read(platform: &dyn Platform) -> Result<KmsEnvConfig, Error> {
        let mut config = KmsEnvConfig::default();
        for index in 0..2 {
            let name = format!("CG_KMS_CONNECTOR{}", index);
            if let Some(value) = platform.env_var(&name) {
                let id = value.trim().parse().map_err(|_| {
                    Error::Init(format!("Invalid connector id \"{}\" in {}", value, name))
                })?;
                config.connectors[index] = Some(id);
            }
            config.modes[index] = platform.env_var(&format!("CG_KMS_CONNECTOR{}_MODE", index));
        }
        config.mirror = platform.env_var("CG_KMS_MIRROR").is_some();
        Ok(config)
    }
}

/// A connector chosen for output, with the CRTC it was driving before.
#[derive(Clone, Debug)]
pub(crate) struct KmsOutput {
    pub(crate) connector: DrmConnector,
    pub(crate) encoder: DrmEncoder,
    pub(crate) saved_crtc: Option<DrmCrtc>,
    pub(crate) modes: Vec<ModeInfo>,
    pub(crate) mode: ModeInfo,
}

/// A CRTC and the connectors it drives from the shared framebuffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KmsCrtc {
    pub id: u32,
    /// Position of the CRTC's viewport within the framebuffer.
    pub x: u32,
    pub y: u32,
    pub mode: ModeInfo,
    /// A CRTC with no connectors is left alone when flipping.
    pub connectors: Vec<u32>,
}

impl KmsCrtc {
    fn for_output(output: &KmsOutput) -> KmsCrtc {
        KmsCrtc {
            id: output.encoder.crtc_id,
            x: 0,
            y: 0,
            mode: output.mode.clone(),
            connectors: vec![output.connector.id],
        }
    }
}

/// The framebuffer size and the CRTCs presenting it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KmsLayout {
    pub width: i32,
    pub height: i32,
    pub crtcs: Vec<KmsCrtc>,
}

/// The outputs found at display setup and the layout derived from them.
pub(crate) struct OutputSetup {
    pub(crate) outputs: Vec<KmsOutput>,
    pub(crate) layout: KmsLayout,
}

fn find_connector(drm: &dyn DrmDevice, resources: &DrmResources, excluded: &[u32])
                  -> Option<DrmConnector> {
    resources.connectors.iter().filter_map(|&id| drm.connector(id)).find(|connector| {
        connector.connected && !connector.modes.is_empty() && !excluded.contains(&connector.id)
    })
}

fn find_output(index: usize,
               drm: &dyn DrmDevice,
               resources: &DrmResources,
               env: &KmsEnvConfig,
               excluded: &[u32])
               -> Result<KmsOutput, Error> {
    let connector = match env.connectors[index] {
        Some(id) => match drm.connector(id) {
            Some(ref connector) if connector.connected && !connector.modes.is_empty() => {
                connector.clone()
            }
            Some(_) => {
                return Err(Error::Init(format!("CG_KMS_CONNECTOR{} {} is not connected",
                                               index, id)))
            }
            None => {
                return Err(Error::Init(format!("CG_KMS_CONNECTOR{} {} could not be found",
                                               index, id)))
            }
        },
        None => find_connector(drm, resources, excluded).ok_or_else(|| {
            Error::Init("No currently active connector found".to_owned())
        })?,
    };

    // The connector's current encoder id can be 0 even when it is connected.
    let encoder = connector.encoders.first().and_then(|&id| drm.encoder(id)).ok_or_else(|| {
        Error::Init(format!("No encoder found for connector {}", connector.id))
    })?;
    let saved_crtc = drm.crtc(encoder.crtc_id);

    let mut modes = connector.modes.clone();
    if connector.is_panel() {
        modes.push(ModeInfo::builtin_1024x768());
    }

    if let Some(ref name) = env.modes[index] {
        let mode = modes.iter().find(|mode| mode.name == *name).cloned().ok_or_else(|| {
            Error::Init(format!("CG_KMS_CONNECTOR{}_MODE of {} could not be found", index, name))
        })?;
        modes = vec![mode];
    }

    let mode = modes[0].clone();
    Ok(KmsOutput { connector, encoder, saved_crtc, modes, mode })
}

/// Returns the first pair of modes, one from each list, with the same resolution.
pub(crate) fn find_mirror_modes(modes0: &[ModeInfo], modes1: &[ModeInfo])
                                -> Option<(ModeInfo, ModeInfo)> {
    modes0.iter().find_map(|mode0| {
        modes1.iter()
              .find(|mode1| mode1.hdisplay == mode0.hdisplay && mode1.vdisplay == mode0.vdisplay)
              .map(|mode1| (mode0.clone(), mode1.clone()))
    })
}

/// Picks one output, or two mirrored ones, and lays them out at the origin.
pub(crate) fn discover_outputs(drm: &dyn DrmDevice, env: &KmsEnvConfig)
                               -> Result<OutputSetup, Error> {
    let resources = drm.resources().map_err(|err| {
        Error::Init(format!("drmModeGetResources failed: {}", err))
    })?;

    let mut output0 = find_output(0, drm, &resources, env, &[])?;
    let mut outputs = vec![];

    if env.mirror {
        let mut output1 = find_output(1, drm, &resources, env, &[output0.connector.id])?;
        let (mode0, mode1) = find_mirror_modes(&output0.modes, &output1.modes).ok_or_else(|| {
            Error::Init("Failed to find matching modes for mirroring".to_owned())
        })?;
        output0.mode = mode0;
        output1.mode = mode1;
        outputs.push(output0);
        outputs.push(output1);
    } else {
        outputs.push(output0);
    }

    let mode = &outputs[0].mode;
    debug!("Using mode {} ({}x{}) on connector {}",
           mode.name, mode.hdisplay, mode.vdisplay, outputs[0].connector.id);

    let layout = KmsLayout {
        width: mode.hdisplay as i32,
        height: mode.vdisplay as i32,
        crtcs: outputs.iter().rev().map(KmsCrtc::for_output).collect(),
    };
    Ok(OutputSetup { outputs, layout })
}

/// Puts back the CRTC configuration that was active before the output was taken over.
pub(crate) fn restore_output(drm: &dyn DrmDevice, output: &KmsOutput) {
    let saved = match output.saved_crtc {
        None => return,
        Some(ref saved) => saved,
    };
    if let Err(err) = drm.set_crtc(saved.id,
                                   saved.buffer_id,
                                   saved.x,
                                   saved.y,
                                   &[output.connector.id],
                                   saved.mode.as_ref()) {
        warn!("Error restoring saved CRTC {}: {}", saved.id, err);
    }
}
