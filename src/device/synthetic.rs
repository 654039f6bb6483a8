//! In-process device backend producing deterministic test imagery and bodies.
//!
//! Every acquisition and release is counted in [`ResourceStats`] so callers
//! can verify that a session leaves no handle behind.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use rayon::prelude::*;

use super::{
    BODY_INDEX_BACKGROUND, BodyFrame, BodyTracker, Calibration, CameraIntrinsics, Capture,
    Device, DeviceDriver, Image, ImageFormat, TrackedBody, TrackerConfig, Transformation,
    VendorJoint,
};
use crate::{
    config::{ColourResolution, DeviceConfig, DepthMode},
    error::SdkError,
    types::JOINT_COUNT,
};

// Standing pose in tracker space (mm, +Y down), roughly two metres away.
const BASE_POSE: [[f32; 3]; JOINT_COUNT] = [
    [0.0, 0.0, 2000.0],       // pelvis
    [0.0, -200.0, 2000.0],    // spine navel
    [0.0, -380.0, 2000.0],    // spine chest
    [0.0, -560.0, 2010.0],    // neck
    [-40.0, -520.0, 2000.0],  // clavicle left
    [-180.0, -500.0, 2000.0], // shoulder left
    [-200.0, -240.0, 2000.0], // elbow left
    [-210.0, -10.0, 1990.0],  // wrist left
    [-215.0, 60.0, 1990.0],   // hand left
    [-220.0, 140.0, 1990.0],  // hand tip left
    [-180.0, 70.0, 1960.0],   // thumb left
    [40.0, -520.0, 2000.0],   // clavicle right
    [180.0, -500.0, 2000.0],  // shoulder right
    [200.0, -240.0, 2000.0],  // elbow right
    [210.0, -10.0, 1990.0],   // wrist right
    [215.0, 60.0, 1990.0],    // hand right
    [220.0, 140.0, 1990.0],   // hand tip right
    [180.0, 70.0, 1960.0],    // thumb right
    [-100.0, 20.0, 2000.0],   // hip left
    [-110.0, 430.0, 2010.0],  // knee left
    [-115.0, 830.0, 2030.0],  // ankle left
    [-115.0, 880.0, 1920.0],  // foot left
    [100.0, 20.0, 2000.0],    // hip right
    [110.0, 430.0, 2010.0],   // knee right
    [115.0, 830.0, 2030.0],   // ankle right
    [115.0, 880.0, 1920.0],   // foot right
    [0.0, -680.0, 2010.0],    // head
    [0.0, -700.0, 1920.0],    // nose
    [-35.0, -730.0, 1940.0],  // eye left
    [-75.0, -710.0, 2010.0],  // ear left
    [35.0, -730.0, 1940.0],   // eye right
    [75.0, -710.0, 2010.0],   // ear right
];

const BODY_SPACING_MM: f32 = 800.0;
const INVALID_DEPTH_BORDER: u32 = 8;

#[derive(Debug, Default)]
pub struct ResourceStats {
    devices_opened: AtomicUsize,
    devices_closed: AtomicUsize,
    cameras_started: AtomicUsize,
    cameras_stopped: AtomicUsize,
    transformations_created: AtomicUsize,
    transformations_released: AtomicUsize,
    trackers_created: AtomicUsize,
    trackers_shut_down: AtomicUsize,
    trackers_destroyed: AtomicUsize,
    captures: AtomicUsize,
}

/// Point-in-time copy of [`ResourceStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub devices_opened: usize,
    pub devices_closed: usize,
    pub cameras_started: usize,
    pub cameras_stopped: usize,
    pub transformations_created: usize,
    pub transformations_released: usize,
    pub trackers_created: usize,
    pub trackers_shut_down: usize,
    pub trackers_destroyed: usize,
    pub captures: usize,
}

impl StatsSnapshot {
    /// Every acquired handle has been released.
    pub fn is_balanced(&self) -> bool {
        self.devices_opened == self.devices_closed
            && self.cameras_started == self.cameras_stopped
            && self.transformations_created == self.transformations_released
            && self.trackers_created == self.trackers_destroyed
    }
}

impl ResourceStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |counter: &AtomicUsize| counter.load(Ordering::SeqCst);
        StatsSnapshot {
            devices_opened: get(&self.devices_opened),
            devices_closed: get(&self.devices_closed),
            cameras_started: get(&self.cameras_started),
            cameras_stopped: get(&self.cameras_stopped),
            transformations_created: get(&self.transformations_created),
            transformations_released: get(&self.transformations_released),
            trackers_created: get(&self.trackers_created),
            trackers_shut_down: get(&self.trackers_shut_down),
            trackers_destroyed: get(&self.trackers_destroyed),
            captures: get(&self.captures),
        }
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug)]
pub struct SyntheticOptions {
    pub devices: u32,
    /// Bodies reported by every tracker frame.
    pub bodies: usize,
    pub emit_colour: bool,
    pub emit_depth: bool,
    pub emit_infrared: bool,
    /// Sleep so captures arrive at the configured frame rate.
    pub pace_frames: bool,
    pub fail_open: Vec<u32>,
    pub fail_start_cameras: bool,
    pub fail_tracker: bool,
    pub fail_captures: bool,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            devices: 1,
            bodies: 1,
            emit_colour: true,
            emit_depth: true,
            emit_infrared: true,
            pace_frames: true,
            fail_open: Vec::new(),
            fail_start_cameras: false,
            fail_tracker: false,
            fail_captures: false,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SyntheticDriver {
    options: SyntheticOptions,
    stats: Arc<ResourceStats>,
}

impl SyntheticDriver {
    pub fn new(options: SyntheticOptions) -> Self {
        Self {
            options,
            stats: Arc::new(ResourceStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ResourceStats> {
        self.stats.clone()
    }
}

impl DeviceDriver for SyntheticDriver {
    type Device = SyntheticDevice;
    type Transformation = SyntheticTransformation;
    type Tracker = SyntheticTracker;

    fn installed_count(&self) -> u32 {
        self.options.devices
    }

    fn open(&self, index: u32) -> Result<SyntheticDevice, SdkError> {
        if index >= self.options.devices {
            return Err(SdkError::Open {
                index,
                message: format!("only {} devices attached", self.options.devices),
            });
        }
        if self.options.fail_open.contains(&index) {
            return Err(SdkError::Open {
                index,
                message: "device is in use by another process".to_string(),
            });
        }

        ResourceStats::bump(&self.stats.devices_opened);
        Ok(SyntheticDevice {
            index,
            options: self.options.clone(),
            stats: self.stats.clone(),
            streaming: None,
            frame: 0,
            last_capture: None,
        })
    }

    fn create_transformation(
        &self,
        calibration: &Calibration,
    ) -> Result<SyntheticTransformation, SdkError> {
        ResourceStats::bump(&self.stats.transformations_created);
        Ok(SyntheticTransformation {
            calibration: calibration.clone(),
            stats: self.stats.clone(),
        })
    }

    fn create_tracker(
        &self,
        calibration: &Calibration,
        _config: &TrackerConfig,
    ) -> Result<SyntheticTracker, SdkError> {
        if self.options.fail_tracker {
            return Err(SdkError::backend("tracker backend could not load its models"));
        }
        let Some(depth) = calibration.depth_camera else {
            return Err(SdkError::backend("tracker requires a depth calibration"));
        };

        ResourceStats::bump(&self.stats.trackers_created);
        Ok(SyntheticTracker {
            bodies: self.options.bodies,
            depth_size: (depth.width, depth.height),
            pending: None,
            frame: 0,
            stats: self.stats.clone(),
        })
    }
}

pub struct SyntheticDevice {
    index: u32,
    options: SyntheticOptions,
    stats: Arc<ResourceStats>,
    streaming: Option<DeviceConfig>,
    frame: u64,
    last_capture: Option<Instant>,
}

impl SyntheticDevice {
    fn wait_for_frame(&mut self, period: Duration, timeout: Duration) -> bool {
        if !self.options.pace_frames {
            return true;
        }
        let wait = self
            .last_capture
            .map(|last| period.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO);
        if wait > timeout {
            thread::sleep(timeout);
            return false;
        }
        thread::sleep(wait);
        true
    }
}

impl Device for SyntheticDevice {
    fn serial_number(&self) -> Result<String, SdkError> {
        Ok(format!("SYN-{:06}", self.index))
    }

    fn start_cameras(&mut self, config: &DeviceConfig) -> Result<(), SdkError> {
        if self.options.fail_start_cameras {
            return Err(SdkError::backend("camera start was rejected by the device"));
        }
        if self.streaming.is_some() {
            return Err(SdkError::backend("cameras are already running"));
        }
        ResourceStats::bump(&self.stats.cameras_started);
        self.streaming = Some(config.clone());
        Ok(())
    }

    fn stop_cameras(&mut self) {
        if self.streaming.take().is_some() {
            ResourceStats::bump(&self.stats.cameras_stopped);
        }
    }

    fn calibration(
        &self,
        depth_mode: DepthMode,
        colour_resolution: ColourResolution,
    ) -> Result<Calibration, SdkError> {
        Ok(Calibration {
            depth_mode,
            colour_resolution,
            depth_camera: depth_mode.dimensions().map(intrinsics),
            colour_camera: colour_resolution.dimensions().map(intrinsics),
        })
    }

    fn get_capture(&mut self, timeout: Duration) -> Result<Option<Capture>, SdkError> {
        let Some(config) = self.streaming.clone() else {
            return Err(SdkError::backend("cameras are not running"));
        };
        if self.options.fail_captures {
            return Err(SdkError::backend("USB transfer failed"));
        }
        if !self.wait_for_frame(config.frame_time(), timeout) {
            return Ok(None);
        }

        self.last_capture = Some(Instant::now());
        self.frame += 1;
        ResourceStats::bump(&self.stats.captures);

        let frame = self.frame;
        let colour = config
            .colour_resolution
            .dimensions()
            .filter(|_| self.options.emit_colour)
            .map(|(w, h)| colour_pattern(w, h, frame));
        let depth = config
            .depth_mode
            .dimensions()
            .filter(|_| self.options.emit_depth && config.depth_mode.produces_depth())
            .map(|(w, h)| depth_pattern(w, h, frame));
        let infrared = config
            .depth_mode
            .dimensions()
            .filter(|_| self.options.emit_infrared)
            .map(|(w, h)| infrared_pattern(w, h));

        Ok(Some(Capture {
            colour,
            depth,
            infrared,
        }))
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        self.stop_cameras();
        ResourceStats::bump(&self.stats.devices_closed);
    }
}

pub struct SyntheticTransformation {
    calibration: Calibration,
    stats: Arc<ResourceStats>,
}

impl Transformation for SyntheticTransformation {
    fn colour_to_depth(
        &self,
        depth: &Image,
        colour: &Image,
        out: &mut Image,
    ) -> Result<(), SdkError> {
        check_target(out, ImageFormat::ColourBgra32, depth.size())?;
        if colour.format != ImageFormat::ColourBgra32 {
            return Err(SdkError::backend("colour image must be BGRA32"));
        }

        let (src_w, src_h) = colour.size();
        let (dst_w, dst_h) = depth.size();
        let stride = out.stride;
        out.data
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                let sy = nearest(y as u32, dst_h, src_h);
                for x in 0..dst_w as usize {
                    let d = x * 2 + y * depth.stride;
                    let valid = depth.data[d] != 0 || depth.data[d + 1] != 0;
                    let dst = &mut row[x * 4..x * 4 + 4];
                    if valid {
                        let sx = nearest(x as u32, dst_w, src_w);
                        let s = sy * colour.stride + sx * 4;
                        dst.copy_from_slice(&colour.data[s..s + 4]);
                    } else {
                        dst.fill(0);
                    }
                }
            });
        Ok(())
    }

    fn depth_to_colour(&self, depth: &Image, out: &mut Image) -> Result<(), SdkError> {
        let Some(colour) = self.calibration.colour_camera else {
            return Err(SdkError::backend("colour camera is not calibrated"));
        };
        check_target(out, ImageFormat::Depth16, (colour.width, colour.height))?;

        let (src_w, src_h) = depth.size();
        let (dst_w, dst_h) = (colour.width, colour.height);
        let stride = out.stride;
        out.data
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                let sy = nearest(y as u32, dst_h, src_h);
                for x in 0..dst_w as usize {
                    let sx = nearest(x as u32, dst_w, src_w);
                    let s = sy * depth.stride + sx * 2;
                    row[x * 2..x * 2 + 2].copy_from_slice(&depth.data[s..s + 2]);
                }
            });
        Ok(())
    }
}

impl Drop for SyntheticTransformation {
    fn drop(&mut self) {
        ResourceStats::bump(&self.stats.transformations_released);
    }
}

pub struct SyntheticTracker {
    bodies: usize,
    depth_size: (u32, u32),
    pending: Option<u64>,
    frame: u64,
    stats: Arc<ResourceStats>,
}

impl BodyTracker for SyntheticTracker {
    fn enqueue_capture(&mut self, capture: &Capture, _timeout: Duration) -> Result<bool, SdkError> {
        if capture.depth.is_none() {
            return Err(SdkError::backend("capture has no depth image"));
        }
        if self.pending.is_some() {
            return Ok(false);
        }
        self.frame += 1;
        self.pending = Some(self.frame);
        Ok(true)
    }

    fn pop_result(&mut self, _timeout: Duration) -> Result<Option<BodyFrame>, SdkError> {
        let Some(frame) = self.pending.take() else {
            return Ok(None);
        };

        let bodies = (0..self.bodies)
            .map(|slot| synthetic_body(slot, frame))
            .collect();
        let (w, h) = self.depth_size;
        Ok(Some(BodyFrame {
            bodies,
            body_index_map: Some(body_index_pattern(w, h, self.bodies)),
        }))
    }

    fn shutdown(&mut self) {
        ResourceStats::bump(&self.stats.trackers_shut_down);
    }
}

impl Drop for SyntheticTracker {
    fn drop(&mut self) {
        ResourceStats::bump(&self.stats.trackers_destroyed);
    }
}

fn intrinsics((width, height): (u32, u32)) -> CameraIntrinsics {
    CameraIntrinsics {
        width,
        height,
        fx: width as f32 * 0.8,
        fy: width as f32 * 0.8,
        cx: width as f32 / 2.0,
        cy: height as f32 / 2.0,
    }
}

fn check_target(out: &Image, format: ImageFormat, size: (u32, u32)) -> Result<(), SdkError> {
    if out.format != format || out.size() != size {
        return Err(SdkError::backend(format!(
            "target image is {:?} {:?}, expected {:?} {:?}",
            out.format,
            out.size(),
            format,
            size
        )));
    }
    Ok(())
}

fn nearest(dst: u32, dst_len: u32, src_len: u32) -> usize {
    ((u64::from(dst) * u64::from(src_len)) / u64::from(dst_len.max(1))) as usize
}

fn colour_pattern(width: u32, height: u32, frame: u64) -> Image {
    let mut image = Image::new(ImageFormat::ColourBgra32, width, height);
    let stride = image.stride;
    let shade = (frame % 256) as u8;
    image
        .data
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let g = (y * 255 / height.max(1) as usize) as u8;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                px[0] = (x * 255 / width.max(1) as usize) as u8;
                px[1] = g;
                px[2] = shade;
                px[3] = 0xFF;
            }
        });
    image
}

fn depth_pattern(width: u32, height: u32, frame: u64) -> Image {
    let mut image = Image::new(ImageFormat::Depth16, width, height);
    let stride = image.stride;
    image
        .data
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(2).enumerate() {
                let border = x < INVALID_DEPTH_BORDER as usize
                    || x >= (width - INVALID_DEPTH_BORDER.min(width)) as usize;
                let mm: u16 = if border {
                    0
                } else {
                    500 + ((x + y + frame as usize) % 3000) as u16
                };
                px.copy_from_slice(&mm.to_le_bytes());
            }
        });
    image
}

fn infrared_pattern(width: u32, height: u32) -> Image {
    let mut image = Image::new(ImageFormat::Ir16, width, height);
    let stride = image.stride;
    image
        .data
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(2).enumerate() {
                let value = ((x * y) % 1024) as u16;
                px.copy_from_slice(&value.to_le_bytes());
            }
        });
    image
}

fn body_index_pattern(width: u32, height: u32, bodies: usize) -> Image {
    let mut image = Image::new(ImageFormat::BodyIndex8, width, height);
    let band = (width as usize / (bodies + 1)).max(1);
    for row in image.data.chunks_exact_mut(width as usize) {
        for (x, px) in row.iter_mut().enumerate() {
            let slot = x / band;
            *px = if slot < bodies && x % band >= band / 2 {
                slot as u8
            } else {
                BODY_INDEX_BACKGROUND
            };
        }
    }
    image
}

fn synthetic_body(slot: usize, frame: u64) -> TrackedBody {
    let phase = frame as f32 * 0.1 + slot as f32;
    let offset_x = (slot as f32 - 0.5) * BODY_SPACING_MM;
    let sway = phase.sin() * 30.0;
    let half_angle = phase.sin() * 0.1;
    let orientation = [half_angle.cos(), 0.0, half_angle.sin(), 0.0];

    let mut joints = [VendorJoint::default(); JOINT_COUNT];
    for (joint, base) in joints.iter_mut().zip(BASE_POSE.iter()) {
        joint.position = [base[0] + offset_x + sway, base[1], base[2]];
        joint.orientation = orientation;
    }

    TrackedBody {
        id: slot as u32 + 1,
        joints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_device(driver: &SyntheticDriver, config: &DeviceConfig) -> SyntheticDevice {
        let mut device = driver.open(0).unwrap();
        device.start_cameras(config).unwrap();
        device
    }

    #[test]
    fn open_and_drop_are_counted() {
        let driver = SyntheticDriver::new(SyntheticOptions {
            pace_frames: false,
            ..SyntheticOptions::default()
        });
        {
            let _device = started_device(&driver, &DeviceConfig::default());
        }
        let stats = driver.stats().snapshot();
        assert_eq!(stats.devices_opened, 1);
        assert_eq!(stats.cameras_started, 1);
        assert!(stats.is_balanced());
    }

    #[test]
    fn open_rejects_missing_and_failing_devices() {
        let driver = SyntheticDriver::new(SyntheticOptions {
            devices: 2,
            fail_open: vec![1],
            ..SyntheticOptions::default()
        });
        assert!(driver.open(0).is_ok());
        assert!(matches!(driver.open(1), Err(SdkError::Open { index: 1, .. })));
        assert!(matches!(driver.open(2), Err(SdkError::Open { index: 2, .. })));
    }

    #[test]
    fn capture_matches_configured_resolutions() {
        let driver = SyntheticDriver::new(SyntheticOptions {
            pace_frames: false,
            ..SyntheticOptions::default()
        });
        let mut device = started_device(&driver, &DeviceConfig::default());
        let capture = device
            .get_capture(Duration::from_millis(34))
            .unwrap()
            .unwrap();

        let colour = capture.colour.unwrap();
        assert_eq!(colour.size(), (1280, 720));
        assert_eq!(colour.data.len(), 1280 * 720 * 4);
        let depth = capture.depth.unwrap();
        assert_eq!(depth.size(), (640, 576));
        assert_eq!(depth.data.len(), 640 * 576 * 2);
        assert_eq!(&depth.data[..2], &[0, 0]);
        assert_eq!(capture.infrared.unwrap().size(), (640, 576));
    }

    #[test]
    fn tracker_queue_holds_one_capture() {
        let driver = SyntheticDriver::new(SyntheticOptions {
            bodies: 2,
            pace_frames: false,
            ..SyntheticOptions::default()
        });
        let mut device = started_device(&driver, &DeviceConfig::default());
        let calibration = device
            .calibration(DepthMode::NfovUnbinned, ColourResolution::P720)
            .unwrap();
        let mut tracker = driver
            .create_tracker(
                &calibration,
                &TrackerConfig {
                    sensor_orientation: Default::default(),
                    processing_mode: crate::config::TrackerProcessing::Cpu,
                },
            )
            .unwrap();

        let capture = device.get_capture(Duration::ZERO).unwrap().unwrap();
        let timeout = Duration::from_millis(34);
        assert!(tracker.enqueue_capture(&capture, timeout).unwrap());
        assert!(!tracker.enqueue_capture(&capture, timeout).unwrap());

        let frame = tracker.pop_result(timeout).unwrap().unwrap();
        assert_eq!(frame.bodies.len(), 2);
        assert_eq!(frame.bodies[0].id, 1);
        assert_eq!(frame.bodies[1].id, 2);
        assert_eq!(frame.body_index_map.unwrap().size(), (640, 576));
        assert!(tracker.pop_result(timeout).unwrap().is_none());
    }

    #[test]
    fn depth_to_colour_fills_colour_grid() {
        let driver = SyntheticDriver::default();
        let device = driver.open(0).unwrap();
        let calibration = device
            .calibration(DepthMode::Nfov2x2Binned, ColourResolution::P720)
            .unwrap();
        let transformation = driver.create_transformation(&calibration).unwrap();

        let depth = depth_pattern(320, 288, 1);
        let mut out = Image::new(ImageFormat::Depth16, 1280, 720);
        transformation.depth_to_colour(&depth, &mut out).unwrap();
        assert_eq!(&out.data[..2], &[0, 0]);
        assert!(out.data.chunks_exact(2).any(|px| px != [0, 0]));

        let mut wrong = Image::new(ImageFormat::Depth16, 320, 288);
        assert!(transformation.depth_to_colour(&depth, &mut wrong).is_err());
    }
}
