//! Capture source for the overlay pipelines.
//!
//! A webcam is opened with [`CaptureConstraints`] (see `sensors`, behind the
//! `webcam` feature), a blocking capture thread started by [`start_capture`]
//! publishes decoded frames into a [`CameraFeed`], and consumers read the
//! latest frame through the [`FrameSource`] trait.
pub mod error;
pub mod feed;
#[cfg(feature = "webcam")]
pub mod sensors;

pub use error::CameraAccessError;
pub use feed::{
    start_capture, CameraFeed, CaptureConstraints, CaptureFn, FrameSource, VideoFrame,
};
