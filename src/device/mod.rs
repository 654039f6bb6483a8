//! Seam between the capture engine and a depth-camera SDK.
//!
//! Every handle is owned and moved, never shared: the session acquires them
//! on the controlling thread, hands them to the capture thread for the
//! lifetime of the session, and releases them in reverse order on stop.
//! Handles release their SDK resources on drop, so an early return during
//! start-up unwinds whatever was acquired so far.

pub mod synthetic;

use std::time::Duration;

use crate::{
    config::{ColourResolution, DeviceConfig, DepthMode, SensorOrientation, TrackerProcessing},
    error::SdkError,
    types::JOINT_COUNT,
};

/// Body-index value marking pixels that belong to no body.
pub const BODY_INDEX_BACKGROUND: u8 = 255;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    /// 4 bytes per pixel, blue first.
    ColourBgra32,
    /// 16-bit little-endian depth in millimetres.
    Depth16,
    /// 16-bit little-endian infrared intensity.
    Ir16,
    /// 1 byte per pixel body index map.
    BodyIndex8,
}

impl ImageFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ImageFormat::ColourBgra32 => 4,
            ImageFormat::Depth16 | ImageFormat::Ir16 => 2,
            ImageFormat::BodyIndex8 => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes per row, at least `width * bytes_per_pixel`.
    pub stride: usize,
    pub data: Vec<u8>,
}

impl Image {
    /// Allocates a zeroed, tightly packed image.
    pub fn new(format: ImageFormat, width: u32, height: u32) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            format,
            width,
            height,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    pub fn from_data(format: ImageFormat, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            format,
            width,
            height,
            stride: width as usize * format.bytes_per_pixel(),
            data,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One synchronised bundle of images from the device.
#[derive(Clone, Debug, Default)]
pub struct Capture {
    pub colour: Option<Image>,
    pub depth: Option<Image>,
    pub infrared: Option<Image>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraIntrinsics {
    pub width: u32,
    pub height: u32,
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

/// Calibration for one depth-mode / colour-resolution pair.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    pub depth_mode: DepthMode,
    pub colour_resolution: ColourResolution,
    pub depth_camera: Option<CameraIntrinsics>,
    pub colour_camera: Option<CameraIntrinsics>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerConfig {
    pub sensor_orientation: SensorOrientation,
    pub processing_mode: TrackerProcessing,
}

/// Joint pose as reported by the tracker: millimetres, +X right, +Y down,
/// +Z forward; orientation as (w, x, y, z).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VendorJoint {
    pub position: [f32; 3],
    pub orientation: [f32; 4],
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackedBody {
    pub id: u32,
    pub joints: [VendorJoint; JOINT_COUNT],
}

/// Tracker output for a single capture.
#[derive(Clone, Debug, Default)]
pub struct BodyFrame {
    /// Bodies in tracker-assigned order.
    pub bodies: Vec<TrackedBody>,
    pub body_index_map: Option<Image>,
}

pub trait DeviceDriver: Send + Sync + 'static {
    type Device: Device;
    type Transformation: Transformation;
    type Tracker: BodyTracker;

    fn installed_count(&self) -> u32;

    fn open(&self, index: u32) -> Result<Self::Device, SdkError>;

    fn create_transformation(
        &self,
        calibration: &Calibration,
    ) -> Result<Self::Transformation, SdkError>;

    fn create_tracker(
        &self,
        calibration: &Calibration,
        config: &TrackerConfig,
    ) -> Result<Self::Tracker, SdkError>;
}

/// An open device. Dropping it closes the device.
pub trait Device: Send + 'static {
    fn serial_number(&self) -> Result<String, SdkError>;

    fn start_cameras(&mut self, config: &DeviceConfig) -> Result<(), SdkError>;

    fn stop_cameras(&mut self);

    fn calibration(
        &self,
        depth_mode: DepthMode,
        colour_resolution: ColourResolution,
    ) -> Result<Calibration, SdkError>;

    /// Waits up to `timeout` for the next capture; `Ok(None)` on timeout.
    fn get_capture(&mut self, timeout: Duration) -> Result<Option<Capture>, SdkError>;
}

/// Cross-registration between the depth and colour camera geometries.
pub trait Transformation: Send + 'static {
    /// Reprojects `colour` into the depth camera; `out` is BGRA32 at the
    /// depth resolution.
    fn colour_to_depth(
        &self,
        depth: &Image,
        colour: &Image,
        out: &mut Image,
    ) -> Result<(), SdkError>;

    /// Reprojects `depth` into the colour camera; `out` is Depth16 at the
    /// colour resolution.
    fn depth_to_colour(&self, depth: &Image, out: &mut Image) -> Result<(), SdkError>;
}

/// Body tracker. Dropping it destroys the tracker.
pub trait BodyTracker: Send + 'static {
    /// Queues a capture; `Ok(false)` when the queue stayed full for `timeout`.
    fn enqueue_capture(&mut self, capture: &Capture, timeout: Duration) -> Result<bool, SdkError>;

    /// Pops the next result; `Ok(None)` when none arrived within `timeout`.
    fn pop_result(&mut self, timeout: Duration) -> Result<Option<BodyFrame>, SdkError>;

    fn shutdown(&mut self);
}
