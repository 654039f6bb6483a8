use std::{ops::ControlFlow, sync::Arc, time::Duration};

use crate::{
    config::{DeviceConfig, Remapping},
    device::{BodyTracker, Capture, Device, DeviceDriver, Image, ImageFormat, Transformation},
    logging::Logger,
    pipeline::{
        capture::CaptureWorker,
        rgba_converter,
        sink::{self, FrameSink},
        skeleton,
    },
    store::SkeletonStore,
};

use super::StreamSinks;

/// Scratch image for cross-registration, reused across cycles.
#[derive(Debug, Default)]
pub(crate) struct RemapBuffer {
    image: Option<Image>,
    allocations: usize,
}

impl RemapBuffer {
    /// Returns the buffer, reallocating only if format or size changed.
    fn prepare(&mut self, format: ImageFormat, width: u32, height: u32) -> &mut Image {
        let reusable = self
            .image
            .as_ref()
            .is_some_and(|image| image.format == format && image.size() == (width, height));
        if !reusable {
            self.allocations += 1;
            self.image = None;
        }
        self.image
            .get_or_insert_with(|| Image::new(format, width, height))
    }

    #[cfg(test)]
    pub(crate) fn allocations(&self) -> usize {
        self.allocations
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct ActiveStreams {
    colour: bool,
    depth: bool,
    infrared: bool,
    body_index: bool,
}

/// Everything the capture thread owns while a session is open.
///
/// Handles are declared in reverse order of acquisition so that dropping the
/// worker without [`Acquisition::release`] still closes the device last.
pub(crate) struct Acquisition<D: DeviceDriver> {
    tracker: Option<D::Tracker>,
    remap: RemapBuffer,
    transformation: D::Transformation,
    device: D::Device,
    sinks: StreamSinks,
    streams: ActiveStreams,
    remapping: Remapping,
    frame_time: Duration,
    store: Arc<SkeletonStore>,
    log: Logger,
}

impl<D: DeviceDriver> Acquisition<D> {
    pub(crate) fn new(
        config: &DeviceConfig,
        device: D::Device,
        transformation: D::Transformation,
        tracker: Option<D::Tracker>,
        sinks: StreamSinks,
        store: Arc<SkeletonStore>,
        log: Logger,
    ) -> Self {
        let streams = ActiveStreams {
            colour: config.colour_resolution.is_enabled() && sinks.colour.is_some(),
            depth: config.depth_mode.is_enabled() && sinks.depth.is_some(),
            infrared: config.depth_mode.is_enabled() && sinks.infrared.is_some(),
            body_index: tracker.is_some() && sinks.body_index.is_some(),
        };
        log.debug(format_args!(
            "active streams: colour={} depth={} infrared={} body_index={} skeletons={}",
            streams.colour,
            streams.depth,
            streams.infrared,
            streams.body_index,
            tracker.is_some()
        ));

        Self {
            tracker,
            remap: RemapBuffer::default(),
            transformation,
            device,
            sinks,
            streams,
            remapping: config.remapping,
            frame_time: config.frame_time(),
            store,
            log,
        }
    }

    #[cfg(test)]
    pub(crate) fn remap(&self) -> &RemapBuffer {
        &self.remap
    }

    /// Runs every enabled stream on one capture. A stream missing from the
    /// capture is skipped without affecting the others.
    pub(crate) fn process(&mut self, capture: &Capture) {
        if self.streams.colour {
            self.publish_colour(capture);
        }
        if self.streams.depth {
            self.publish_depth(capture);
        }
        if self.streams.infrared {
            self.publish_infrared(capture);
        }
        if self.tracker.is_some() {
            self.update_skeletons(capture);
        }
    }

    fn publish_colour(&mut self, capture: &Capture) {
        let Some(colour) = capture.colour.as_ref() else {
            self.log.trace(format_args!("capture has no colour image"));
            return;
        };

        let source = match (self.remapping, capture.depth.as_ref()) {
            (Remapping::ColourToDepth, Some(depth)) => {
                let target = self
                    .remap
                    .prepare(ImageFormat::ColourBgra32, depth.width, depth.height);
                if let Err(err) = self.transformation.colour_to_depth(depth, colour, target) {
                    self.log
                        .error(format_args!("failed to transform colour to depth: {err}"));
                    return;
                }
                &*target
            }
            (Remapping::ColourToDepth, None) => {
                self.log.trace(format_args!(
                    "capture has no depth image to register colour with, publishing it unmapped"
                ));
                colour
            }
            (Remapping::DepthToColour, _) => colour,
        };

        emit(&self.log, "colour", source, self.sinks.colour.as_mut());
    }

    fn publish_depth(&mut self, capture: &Capture) {
        let Some(depth) = capture.depth.as_ref() else {
            self.log.trace(format_args!("capture has no depth image"));
            return;
        };

        let source = match (self.remapping, capture.colour.as_ref()) {
            (Remapping::DepthToColour, Some(colour)) => {
                let target = self
                    .remap
                    .prepare(ImageFormat::Depth16, colour.width, colour.height);
                if let Err(err) = self.transformation.depth_to_colour(depth, target) {
                    self.log
                        .error(format_args!("failed to transform depth to colour: {err}"));
                    return;
                }
                &*target
            }
            (Remapping::DepthToColour, None) => {
                self.log.trace(format_args!(
                    "capture has no colour image to register depth with, publishing it unmapped"
                ));
                depth
            }
            (Remapping::ColourToDepth, _) => depth,
        };

        emit(&self.log, "depth", source, self.sinks.depth.as_mut());
    }

    fn publish_infrared(&mut self, capture: &Capture) {
        let Some(infrared) = capture.infrared.as_ref() else {
            self.log.trace(format_args!("capture has no infrared image"));
            return;
        };
        emit(&self.log, "infrared", infrared, self.sinks.infrared.as_mut());
    }

    fn update_skeletons(&mut self, capture: &Capture) {
        let Some(tracker) = self.tracker.as_mut() else {
            return;
        };

        match tracker.enqueue_capture(capture, self.frame_time) {
            Ok(true) => {}
            Ok(false) => {
                self.log
                    .warn(format_args!("failed to queue the capture for body tracking"));
                return;
            }
            Err(err) => {
                self.log
                    .error(format_args!("failed to queue the capture for body tracking: {err}"));
                return;
            }
        }

        let frame = match tracker.pop_result(self.frame_time) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.log
                    .warn(format_args!("failed to obtain the body tracking frame in time"));
                return;
            }
            Err(err) => {
                self.log
                    .error(format_args!("failed to obtain the body tracking frame: {err}"));
                return;
            }
        };

        if self.streams.body_index {
            match frame.body_index_map.as_ref() {
                Some(map) => emit(&self.log, "body index", map, self.sinks.body_index.as_mut()),
                None => self.log.trace(format_args!("body frame has no index map")),
            }
        }

        self.store.write(skeleton::to_snapshot(&frame));
    }

    /// Releases the SDK handles in reverse order of acquisition and returns
    /// the sinks to the session.
    pub(crate) fn release(self) -> StreamSinks {
        let Acquisition {
            mut device,
            transformation,
            tracker,
            remap,
            sinks,
            log,
            ..
        } = self;

        if let Some(mut tracker) = tracker {
            tracker.shutdown();
            drop(tracker);
        }
        drop(remap);
        drop(transformation);
        device.stop_cameras();
        drop(device);

        log.debug(format_args!("device handles released"));
        sinks
    }
}

impl<D: DeviceDriver> CaptureWorker for Acquisition<D> {
    fn capture_cycle(&mut self) -> ControlFlow<()> {
        match self.device.get_capture(self.frame_time) {
            Ok(Some(capture)) => self.process(&capture),
            Ok(None) => self.log.trace(format_args!("capture timed out")),
            Err(err) => self
                .log
                .error(format_args!("failed capturing from the device: {err}")),
        }
        ControlFlow::Continue(())
    }
}

fn emit(log: &Logger, stream: &str, image: &Image, sink: Option<&mut Box<dyn FrameSink>>) {
    let Some(sink) = sink else {
        return;
    };
    if image.is_empty() {
        log.warn(format_args!("{stream} image is empty"));
        return;
    }

    match rgba_converter::convert_image(image) {
        Ok(frame) => sink::publish(&mut **sink, frame),
        Err(err) => log.warn(format_args!("failed to convert {stream} image: {err:?}")),
    }
}
