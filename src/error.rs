use std::{io, path::PathBuf};

use thiserror::Error;

/// Failure reported by the device, transformation, or tracker backend.
///
/// Timeouts are not errors: the seam reports them as `Ok(None)` / `Ok(false)`.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("failed to open device {index}: {message}")]
    Open { index: u32, message: String },
    #[error("{0}")]
    Backend(String),
}

impl SdkError {
    pub fn backend(message: impl Into<String>) -> Self {
        SdkError::Backend(message.into())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported frame rate {0} fps (expected 5, 15 or 30)")]
    FrameRate(u32),
    #[error("body tracking requires a depth mode that produces depth images")]
    TrackingWithoutDepth,
    #[error("synchronised images require both the colour and the depth camera")]
    SynchronisedWithoutBothCameras,
    #[error("both the colour and the depth camera are disabled")]
    NoCameraEnabled,
    #[error("{0} is not supported at 30 fps")]
    UnsupportedAtThirtyFps(&'static str),
    #[error("failed to read config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Stage of session start-up that a backend failure happened in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartStage {
    OpenDevice,
    StartCameras,
    Calibration,
    Transformation,
    Tracker,
}

impl StartStage {
    pub fn label(&self) -> &'static str {
        match self {
            StartStage::OpenDevice => "opening the device",
            StartStage::StartCameras => "starting the cameras",
            StartStage::Calibration => "reading the calibration",
            StartStage::Transformation => "creating the transformation engine",
            StartStage::Tracker => "creating the body tracker",
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("the device is already open")]
    AlreadyOpen,
    #[error("the device is not open")]
    NotOpen,
    #[error("no device has been selected")]
    NoDeviceSelected,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed {} on device {index}: {source}", stage.label())]
    Sdk {
        stage: StartStage,
        index: u32,
        source: SdkError,
    },
    #[error("failed to spawn the capture thread: {0}")]
    Spawn(#[source] io::Error),
}
