//! Generic object detection results.
//!
use itertools::Itertools;
use serde::Serialize;

use crate::geometry::BBox;

/// One detected object in one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDetection {
    /// Class label, e.g. `person`.
    pub label: String,
    /// Confidence in `0.0..=1.0`.
    pub score: f32,
    pub bbox: BBox,
}

impl ObjectDetection {
    pub fn new(label: impl Into<String>, score: f32, bbox: BBox) -> Self {
        Self {
            label: label.into(),
            score,
            bbox,
        }
    }

    /// Text drawn next to the bounding box.
    pub fn caption(&self) -> String {
        format!("{} {:.2}%", self.label, self.score * 100.0)
    }
}

/// All detections of one frame. The order is whatever the detector produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionBatch {
    pub detections: Vec<ObjectDetection>,
}

impl DetectionBatch {
    pub fn new(detections: Vec<ObjectDetection>) -> Self {
        Self { detections }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ObjectDetection> {
        self.detections.iter()
    }
}

impl FromIterator<ObjectDetection> for DetectionBatch {
    fn from_iter<I: IntoIterator<Item = ObjectDetection>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Distinct labels of a batch in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelSummary(Vec<String>);

impl LabelSummary {
    pub fn from_batch(batch: &DetectionBatch) -> Self {
        Self(
            batch
                .iter()
                .map(|detection| detection.label.clone())
                .unique()
                .collect(),
        )
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
