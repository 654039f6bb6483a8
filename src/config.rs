use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum FrameRate {
    Fps5,
    Fps15,
    #[default]
    Fps30,
}

impl FrameRate {
    pub fn fps(&self) -> u32 {
        match self {
            FrameRate::Fps5 => 5,
            FrameRate::Fps15 => 15,
            FrameRate::Fps30 => 30,
        }
    }

    /// Capture wait timeout: one frame period, rounded up to whole milliseconds.
    pub fn frame_time(&self) -> Duration {
        Duration::from_millis(1_000u64.div_ceil(u64::from(self.fps())))
    }
}

impl TryFrom<u32> for FrameRate {
    type Error = ConfigError;

    fn try_from(fps: u32) -> Result<Self, Self::Error> {
        match fps {
            5 => Ok(FrameRate::Fps5),
            15 => Ok(FrameRate::Fps15),
            30 => Ok(FrameRate::Fps30),
            other => Err(ConfigError::FrameRate(other)),
        }
    }
}

impl From<FrameRate> for u32 {
    fn from(rate: FrameRate) -> Self {
        rate.fps()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColourResolution {
    #[serde(rename = "off")]
    Off,
    #[default]
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "1536p")]
    P1536,
    #[serde(rename = "2160p")]
    P2160,
    #[serde(rename = "3072p")]
    P3072,
}

impl ColourResolution {
    pub fn is_enabled(&self) -> bool {
        *self != ColourResolution::Off
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            ColourResolution::Off => None,
            ColourResolution::P720 => Some((1280, 720)),
            ColourResolution::P1440 => Some((2560, 1440)),
            ColourResolution::P1536 => Some((2048, 1536)),
            ColourResolution::P2160 => Some((3840, 2160)),
            ColourResolution::P3072 => Some((4096, 3072)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthMode {
    #[serde(rename = "off")]
    Off,
    #[serde(rename = "nfov_2x2_binned")]
    Nfov2x2Binned,
    #[default]
    #[serde(rename = "nfov_unbinned")]
    NfovUnbinned,
    #[serde(rename = "wfov_2x2_binned")]
    Wfov2x2Binned,
    #[serde(rename = "wfov_unbinned")]
    WfovUnbinned,
    #[serde(rename = "passive_ir")]
    PassiveIr,
}

impl DepthMode {
    pub fn is_enabled(&self) -> bool {
        *self != DepthMode::Off
    }

    /// Whether the mode yields depth images (passive IR only yields infrared).
    pub fn produces_depth(&self) -> bool {
        !matches!(self, DepthMode::Off | DepthMode::PassiveIr)
    }

    /// Resolution of both the depth and the infrared image.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            DepthMode::Off => None,
            DepthMode::Nfov2x2Binned => Some((320, 288)),
            DepthMode::NfovUnbinned => Some((640, 576)),
            DepthMode::Wfov2x2Binned => Some((512, 512)),
            DepthMode::WfovUnbinned => Some((1024, 1024)),
            DepthMode::PassiveIr => Some((1024, 1024)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorOrientation {
    #[default]
    Default,
    Clockwise90,
    Anticlockwise90,
    Flip180,
}

/// Which stream is reprojected into the other stream's camera geometry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remapping {
    ColourToDepth,
    #[default]
    DepthToColour,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerProcessing {
    #[default]
    Disabled,
    Gpu,
    Cpu,
    GpuCuda,
    #[serde(rename = "gpu_tensorrt")]
    GpuTensorRt,
    #[serde(rename = "gpu_directml")]
    GpuDirectMl,
}

impl TrackerProcessing {
    pub fn is_enabled(&self) -> bool {
        *self != TrackerProcessing::Disabled
    }
}

/// Stream and tracker settings. Only read when the session starts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Index of the device to open; `None` until a device is selected.
    pub device_index: Option<u32>,
    pub frame_rate: FrameRate,
    pub colour_resolution: ColourResolution,
    pub depth_mode: DepthMode,
    pub sensor_orientation: SensorOrientation,
    pub remapping: Remapping,
    pub synchronised_images_only: bool,
    pub disable_streaming_indicator: bool,
    pub body_tracking: TrackerProcessing,
    /// Directory holding the tracker's native dependencies. Defaults to the
    /// directory of the running executable.
    pub tracker_library_dir: Option<PathBuf>,
}

impl DeviceConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn frame_time(&self) -> Duration {
        self.frame_rate.frame_time()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.colour_resolution.is_enabled() && !self.depth_mode.is_enabled() {
            return Err(ConfigError::NoCameraEnabled);
        }

        if self.body_tracking.is_enabled() && !self.depth_mode.produces_depth() {
            return Err(ConfigError::TrackingWithoutDepth);
        }

        if self.synchronised_images_only
            && (!self.colour_resolution.is_enabled() || !self.depth_mode.is_enabled())
        {
            return Err(ConfigError::SynchronisedWithoutBothCameras);
        }

        if self.frame_rate == FrameRate::Fps30 {
            if self.depth_mode == DepthMode::WfovUnbinned {
                return Err(ConfigError::UnsupportedAtThirtyFps("WFOV unbinned depth"));
            }
            if self.colour_resolution == ColourResolution::P3072 {
                return Err(ConfigError::UnsupportedAtThirtyFps("3072p colour"));
            }
        }

        Ok(())
    }
}
