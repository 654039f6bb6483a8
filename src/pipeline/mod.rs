pub mod capture;
pub mod rgba_converter;
pub mod sink;
pub mod skeleton;

// Re-exports for convenience
pub use capture::{CaptureLoop, CaptureWorker};
pub use rgba_converter::convert_image;
pub use sink::{ChannelSink, FrameSink};
pub use skeleton::{to_engine_transform, to_snapshot};
