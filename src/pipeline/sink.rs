use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::types::{ChannelLayout, PixelBuffer};

/// Destination for converted frames, typically a GPU texture upload queue.
///
/// The capture thread owns the sink while the session is open and is its
/// only producer.
pub trait FrameSink: Send + 'static {
    /// Current surface size, `None` before the first allocation.
    fn size(&self) -> Option<(u32, u32)>;

    /// (Re)allocates the surface.
    fn resize(&mut self, width: u32, height: u32, layout: ChannelLayout);

    /// Replaces the whole surface with `frame`.
    fn update(&mut self, frame: PixelBuffer);
}

/// Reallocates the sink only when its size differs, then hands the frame over.
pub fn publish(sink: &mut dyn FrameSink, frame: PixelBuffer) {
    let (width, height) = frame.size();
    if sink.size() != Some((width, height)) {
        sink.resize(width, height, frame.layout);
    }
    sink.update(frame);
}

/// Forwards frames over a bounded channel, dropping them while the consumer
/// is still busy with earlier ones.
#[derive(Debug)]
pub struct ChannelSink {
    size: Option<(u32, u32)>,
    layout: Option<ChannelLayout>,
    resizes: usize,
    dropped: usize,
    tx: Sender<PixelBuffer>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, Receiver<PixelBuffer>) {
        let (tx, rx) = bounded(capacity);
        let sink = Self {
            size: None,
            layout: None,
            resizes: 0,
            dropped: 0,
            tx,
        };
        (sink, rx)
    }

    pub fn layout(&self) -> Option<ChannelLayout> {
        self.layout
    }

    /// Number of surface (re)allocations so far.
    pub fn resizes(&self) -> usize {
        self.resizes
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl FrameSink for ChannelSink {
    fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32, layout: ChannelLayout) {
        self.size = Some((width, height));
        self.layout = Some(layout);
        self.resizes += 1;
    }

    fn update(&mut self, frame: PixelBuffer) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::new(
            width,
            height,
            ChannelLayout::Rgba8,
            vec![0; (width * height * 4) as usize],
        )
    }

    #[test]
    fn resizes_only_when_size_changes() {
        let (mut sink, rx) = ChannelSink::new(4);
        publish(&mut sink, frame(4, 2));
        publish(&mut sink, frame(4, 2));
        assert_eq!(sink.resizes(), 1);
        assert_eq!(sink.layout(), Some(ChannelLayout::Rgba8));
        publish(&mut sink, frame(2, 2));
        assert_eq!(sink.resizes(), 2);
        assert_eq!(sink.size(), Some((2, 2)));
        assert_eq!(rx.len(), 3);
    }

    #[test]
    fn drops_frames_when_full() {
        let (mut sink, rx) = ChannelSink::new(1);
        publish(&mut sink, frame(1, 1));
        publish(&mut sink, frame(1, 1));
        assert_eq!(sink.dropped(), 1);
        assert_eq!(rx.try_recv().unwrap().size(), (1, 1));
    }
}
