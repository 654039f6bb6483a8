//! Device session: owns the configuration, the output sinks and the skeleton
//! store, and runs the capture thread between [`DeviceSession::start`] and
//! [`DeviceSession::stop`].

mod acquisition;

use std::{mem, sync::Arc};

use crate::{
    config::DeviceConfig,
    device::{Device, DeviceDriver, TrackerConfig},
    error::{SdkError, SessionError, StartStage},
    library_path::{self, SearchPathUpdate},
    logging::Logger,
    pipeline::{capture::CaptureLoop, sink::FrameSink},
    store::SkeletonStore,
    types::Skeleton,
};

use acquisition::Acquisition;

/// Output streams a sink can be attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stream {
    Colour,
    Depth,
    Infrared,
    BodyIndex,
}

/// Sinks attached to the session. Lent to the capture thread while open.
#[derive(Default)]
pub struct StreamSinks {
    pub colour: Option<Box<dyn FrameSink>>,
    pub depth: Option<Box<dyn FrameSink>>,
    pub infrared: Option<Box<dyn FrameSink>>,
    pub body_index: Option<Box<dyn FrameSink>>,
}

impl StreamSinks {
    fn slot(&mut self, stream: Stream) -> &mut Option<Box<dyn FrameSink>> {
        match stream {
            Stream::Colour => &mut self.colour,
            Stream::Depth => &mut self.depth,
            Stream::Infrared => &mut self.infrared,
            Stream::BodyIndex => &mut self.body_index,
        }
    }

    pub fn is_attached(&self, stream: Stream) -> bool {
        match stream {
            Stream::Colour => self.colour.is_some(),
            Stream::Depth => self.depth.is_some(),
            Stream::Infrared => self.infrared.is_some(),
            Stream::BodyIndex => self.body_index.is_some(),
        }
    }
}

/// A device found by [`DeviceSession::refresh_devices`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: u32,
    pub serial_number: String,
}

pub struct DeviceSession<D: DeviceDriver> {
    driver: D,
    config: DeviceConfig,
    devices: Vec<DeviceInfo>,
    sinks: StreamSinks,
    store: Arc<SkeletonStore>,
    capture: Option<CaptureLoop<Acquisition<D>>>,
    log: Logger,
}

impl<D: DeviceDriver> DeviceSession<D> {
    pub fn new(driver: D) -> Self {
        Self::with_logger(driver, Logger::default())
    }

    pub fn with_logger(driver: D, log: Logger) -> Self {
        Self {
            driver,
            config: DeviceConfig::default(),
            devices: Vec::new(),
            sinks: StreamSinks::default(),
            store: Arc::new(SkeletonStore::new(log.child("skeletons"))),
            capture: None,
            log,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Replaces the configuration. Only allowed while closed.
    pub fn set_config(&mut self, config: DeviceConfig) -> Result<(), SessionError> {
        self.ensure_closed()?;
        self.config = config;
        Ok(())
    }

    pub fn select_device(&mut self, index: u32) -> Result<(), SessionError> {
        self.ensure_closed()?;
        self.config.device_index = Some(index);
        Ok(())
    }

    /// Attaches `sink` to `stream`, replacing any previous sink.
    pub fn set_sink(&mut self, stream: Stream, sink: impl FrameSink) -> Result<(), SessionError> {
        self.ensure_closed()?;
        *self.sinks.slot(stream) = Some(Box::new(sink));
        Ok(())
    }

    pub fn clear_sink(&mut self, stream: Stream) -> Result<Option<Box<dyn FrameSink>>, SessionError> {
        self.ensure_closed()?;
        Ok(self.sinks.slot(stream).take())
    }

    /// Sinks currently held by the session; empty while the capture thread
    /// has them.
    pub fn sinks(&self) -> &StreamSinks {
        &self.sinks
    }

    pub fn is_open(&self) -> bool {
        self.capture.is_some()
    }

    fn ensure_closed(&self) -> Result<(), SessionError> {
        if self.is_open() {
            return Err(SessionError::AlreadyOpen);
        }
        Ok(())
    }

    /// Opens the selected device and starts capturing. Returns whether the
    /// device is open; failures are logged.
    pub fn start(&mut self) -> bool {
        match self.try_start() {
            Ok(()) => true,
            Err(SessionError::AlreadyOpen) => {
                self.log
                    .warn(format_args!("start ignored: the device is already open"));
                false
            }
            Err(err) => {
                self.log.error(format_args!("{err}"));
                false
            }
        }
    }

    pub fn try_start(&mut self) -> Result<(), SessionError> {
        self.ensure_closed()?;
        let Some(index) = self.config.device_index else {
            return Err(SessionError::NoDeviceSelected);
        };
        self.config.validate()?;

        let sdk = |stage| move |source: SdkError| SessionError::Sdk { stage, index, source };

        // Handles drop in reverse order if a later stage fails.
        let mut device = self.driver.open(index).map_err(sdk(StartStage::OpenDevice))?;
        device
            .start_cameras(&self.config)
            .map_err(sdk(StartStage::StartCameras))?;
        let calibration = device
            .calibration(self.config.depth_mode, self.config.colour_resolution)
            .map_err(sdk(StartStage::Calibration))?;
        let transformation = self
            .driver
            .create_transformation(&calibration)
            .map_err(sdk(StartStage::Transformation))?;

        let tracker = if self.config.body_tracking.is_enabled() {
            self.prepare_tracker_search_path();
            let tracker_config = TrackerConfig {
                sensor_orientation: self.config.sensor_orientation,
                processing_mode: self.config.body_tracking,
            };
            let tracker = self
                .driver
                .create_tracker(&calibration, &tracker_config)
                .map_err(sdk(StartStage::Tracker))?;
            Some(tracker)
        } else {
            None
        };

        self.store.reset(tracker.is_some());
        let worker = Acquisition::<D>::new(
            &self.config,
            device,
            transformation,
            tracker,
            mem::take(&mut self.sinks),
            self.store.clone(),
            self.log.child("thread"),
        );
        let capture =
            CaptureLoop::spawn(worker, self.log.child("thread")).map_err(SessionError::Spawn)?;
        self.capture = Some(capture);

        self.log.info(format_args!(
            "device {index} opened at {} fps, colour {:?}, depth {:?}, tracking {:?}",
            self.config.frame_rate.fps(),
            self.config.colour_resolution,
            self.config.depth_mode,
            self.config.body_tracking
        ));
        Ok(())
    }

    fn prepare_tracker_search_path(&self) {
        let Some(dir) = self
            .config
            .tracker_library_dir
            .clone()
            .or_else(library_path::plugin_directory)
        else {
            self.log.warn(format_args!(
                "could not locate the tracker library directory; relying on the system search path"
            ));
            return;
        };

        match library_path::ensure_library_search_path(&dir) {
            Ok(SearchPathUpdate::Present) => {}
            Ok(SearchPathUpdate::Added) => self.log.debug(format_args!(
                "added {} to {}",
                dir.display(),
                library_path::SEARCH_PATH_VAR
            )),
            Ok(SearchPathUpdate::NeedsRestart) => self.log.warn(format_args!(
                "{} is not on {}; set it before launching if the tracker fails to load its libraries",
                dir.display(),
                library_path::SEARCH_PATH_VAR
            )),
            Err(err) => self.log.warn(format_args!("{err:#}")),
        }
    }

    /// Stops capturing and closes the device. Returns whether the device is
    /// now closed.
    pub fn stop(&mut self) -> bool {
        match self.try_stop() {
            Ok(()) => !self.is_open(),
            Err(err) => {
                self.log.warn(format_args!("stop ignored: {err}"));
                false
            }
        }
    }

    pub fn try_stop(&mut self) -> Result<(), SessionError> {
        let Some(mut capture) = self.capture.take() else {
            return Err(SessionError::NotOpen);
        };

        if let Some(worker) = capture.ensure_completion() {
            self.sinks = worker.release();
        }
        self.store.reset(false);

        self.log.info(format_args!(
            "device {} closed",
            self.config.device_index.unwrap_or_default()
        ));
        Ok(())
    }

    /// Number of devices currently attached.
    pub fn count_devices(&self) -> u32 {
        self.driver.installed_count()
    }

    /// Re-enumerates attached devices, reading each one's serial number.
    /// Devices that cannot be opened are logged and skipped.
    pub fn refresh_devices(&mut self) -> &[DeviceInfo] {
        let count = self.driver.installed_count();
        self.devices.clear();

        for index in 0..count {
            match self.driver.open(index).and_then(|device| device.serial_number()) {
                Ok(serial_number) => {
                    self.log
                        .debug(format_args!("device {index} has serial {serial_number}"));
                    self.devices.push(DeviceInfo {
                        index,
                        serial_number,
                    });
                }
                Err(err) => self
                    .log
                    .error(format_args!("failed to query device {index}: {err}")),
            }
        }

        &self.devices
    }

    /// Devices found by the last [`refresh_devices`](Self::refresh_devices).
    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    /// Shared handle to the skeleton store for readers on other threads.
    pub fn skeleton_store(&self) -> Arc<SkeletonStore> {
        self.store.clone()
    }

    /// All skeletons from the latest body frame; empty when closed.
    pub fn get_skeletons(&self) -> Vec<Skeleton> {
        self.store.read().into_skeletons()
    }

    pub fn get_skeleton(&self, index: usize) -> Skeleton {
        if !self.is_open() {
            self.log.warn(format_args!(
                "an empty skeleton was returned as the device is not open"
            ));
            return Skeleton::empty();
        }
        self.store.read_one(index)
    }

    pub fn get_tracked_skeletons(&self) -> usize {
        if !self.is_open() {
            self.log.warn(format_args!(
                "no skeletons are tracked as the device is not open"
            ));
            return 0;
        }
        if !self.store.is_tracking_enabled() {
            self.log.warn(format_args!(
                "no skeletons are tracked as skeleton tracking is disabled"
            ));
            return 0;
        }
        self.store.tracked_count()
    }

    pub fn has_tracked_skeletons(&self) -> bool {
        self.get_tracked_skeletons() > 0
    }
}

impl<D: DeviceDriver> Drop for DeviceSession<D> {
    fn drop(&mut self) {
        if self.is_open() {
            let _ = self.try_stop();
        }
    }
}
