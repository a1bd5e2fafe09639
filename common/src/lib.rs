//! Common code shared between `overlay_server` and `cam_capture`.
//!
//! Holds the per-frame detection data model. Nothing in here outlives a single
//! frame: batches are created by a detector, consumed by the overlay renderer
//! and the label summary, then dropped.
pub mod detection;
pub mod face;
pub mod geometry;

pub use detection::{DetectionBatch, LabelSummary, ObjectDetection};
pub use face::{Expression, Expressions, FaceDetection, Gender};
pub use geometry::{BBox, Point};
