//! Capture engine for depth cameras with skeletal body tracking.
//!
//! A [`DeviceSession`] opens one device, runs a capture thread that converts
//! colour, depth and infrared images into display-ready buffers for
//! [`FrameSink`]s, and publishes tracked skeletons in engine coordinates to a
//! [`SkeletonStore`] that any thread can read.

pub mod animation;
pub mod config;
pub mod device;
pub mod error;
pub mod library_path;
pub mod logging;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod types;

pub use config::DeviceConfig;
pub use error::{ConfigError, SdkError, SessionError};
pub use logging::Logger;
pub use pipeline::{ChannelSink, FrameSink};
pub use session::{DeviceInfo, DeviceSession, Stream, StreamSinks};
pub use store::SkeletonStore;
pub use types::{BodyJoint, JointTransform, PixelBuffer, Skeleton, SkeletonSnapshot};
