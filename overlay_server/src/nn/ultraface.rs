//! Ultraface face box detector.
//!
use std::path::Path;

use common::BBox;
use image::RgbImage;
use ndarray::s;
use tract_onnx::prelude::*;

use super::{load_onnx, output_vec, to_nchw, NnModel, NnOut, EPS};
use crate::model_loader::ModelLoadError;

/// Face box in normalized `[x_tl, y_tl, x_br, y_br]` corners with confidence.
type Candidate = (f32, [f32; 4]);

pub struct UltrafaceModel {
    model: NnModel,
    width: u32,
    height: u32,
    max_iou: f32,
    min_confidence: f32,
}

impl UltrafaceModel {
    /// RFB-320 variant, input 320x240.
    pub const WIDTH: u32 = 320;
    pub const HEIGHT: u32 = 240;

    pub fn load(path: &Path, max_iou: f32, min_confidence: f32) -> Result<Self, ModelLoadError> {
        let input_fact = InferenceFact::dt_shape(
            f32::datum_type(),
            tvec!(1, 3, Self::HEIGHT as usize, Self::WIDTH as usize),
        );
        Ok(Self {
            model: load_onnx(path, input_fact)?,
            width: Self::WIDTH,
            height: Self::HEIGHT,
            max_iou,
            min_confidence,
        })
    }

    /// Confidence and box in frame pixels of every face, most confident first.
    pub fn detect(&self, frame: &RgbImage) -> anyhow::Result<Vec<(f32, BBox)>> {
        let raw_nn_out = self.model.run(tvec!(self.preproc(frame).into()))?;
        let candidates = self.postproc(raw_nn_out)?;

        let (width, height) = (frame.width() as f32, frame.height() as f32);
        Ok(candidates
            .into_iter()
            .map(|(confidence, [x_tl, y_tl, x_br, y_br])| {
                let bbox = BBox::from_corners(x_tl * width, y_tl * height, x_br * width, y_br * height)
                    .clamped(width, height);
                (confidence, bbox)
            })
            .collect())
    }

    fn preproc(&self, frame: &RgbImage) -> Tensor {
        to_nchw(frame, self.width, self.height, |c, value| {
            // Note: Mean/std are from MobileNet, not from Ultraface, but work well
            let mean = [0.485, 0.456, 0.406][c];
            let std = [0.229, 0.224, 0.225][c];
            (value as f32 / 255.0 - mean) / std
        })
    }

    /// Output 0 holds `[background, face]` scores per prior, output 1 the
    /// normalized corner points per prior.
    fn postproc(&self, raw_nn_out: NnOut) -> Result<Vec<Candidate>, ModelLoadError> {
        let confidences = raw_nn_out
            .first()
            .ok_or_else(|| ModelLoadError::UnexpectedOutputs("no score output".into()))?
            .to_array_view::<f32>()
            .map_err(|err| ModelLoadError::UnexpectedOutputs(format!("{err:#}")))?
            .slice(s![0, .., 1])
            .to_vec();

        let bboxes = output_vec(&raw_nn_out, 1)?;
        if bboxes.len() != confidences.len() * 4 {
            return Err(ModelLoadError::UnexpectedOutputs(format!(
                "{} scores but {} box values",
                confidences.len(),
                bboxes.len()
            )));
        }

        let candidates = confidences
            .into_iter()
            .zip(bboxes.chunks_exact(4))
            .filter(|(confidence, _)| *confidence > self.min_confidence)
            .map(|(confidence, bbox)| (confidence, [bbox[0], bbox[1], bbox[2], bbox[3]]))
            .collect();

        Ok(non_maximum_suppression(candidates, self.max_iou))
    }
}

/// Run non-maximum-suppression on candidate bounding boxes.
///
/// Start with the most confident bounding box and iterate over all other
/// bounding boxes in the order of sinking confidence. A candidate is selected
/// only if its IoU with every already selected box is at most `max_iou`.
pub fn non_maximum_suppression(mut candidates: Vec<Candidate>, max_iou: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut selected: Vec<Candidate> = vec![];
    // Most confident candidates sit at the back of the ascending sort
    while let Some((confidence, bbox)) = candidates.pop() {
        if selected
            .iter()
            .all(|(_, selected_bbox)| iou(&bbox, selected_bbox) <= max_iou)
        {
            selected.push((confidence, bbox));
        }
    }

    selected
}

/// Calculate the intersection-over-union metric for two bounding boxes.
fn iou(bbox_a: &[f32; 4], bbox_b: &[f32; 4]) -> f32 {
    // Non-overlapping boxes give an ill-defined overlap box of area zero
    let overlap_box: [f32; 4] = [
        f32::max(bbox_a[0], bbox_b[0]),
        f32::max(bbox_a[1], bbox_b[1]),
        f32::min(bbox_a[2], bbox_b[2]),
        f32::min(bbox_a[3], bbox_b[3]),
    ];

    let overlap_area = bbox_area(&overlap_box);

    overlap_area / (bbox_area(bbox_a) + bbox_area(bbox_b) - overlap_area + EPS)
}

/// Area of `[x_top_left, y_top_left, x_bottom_right, y_bottom_right]`, zero if
/// the bottom-right point lies above or left of the top-left point.
fn bbox_area(bbox: &[f32; 4]) -> f32 {
    let width = bbox[2] - bbox[0];
    let height = bbox[3] - bbox[1];
    if width < 0.0 || height < 0.0 {
        return 0.0;
    }

    width * height
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_iou() {
        let a = [0.0, 0.0, 0.5, 0.5];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-4);
        assert_eq!(iou(&a, &[0.6, 0.6, 0.9, 0.9]), 0.0);

        // Half overlap: 0.125 / (0.25 + 0.25 - 0.125)
        let b = [0.25, 0.0, 0.75, 0.5];
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_bbox_area_of_ill_defined_box() {
        assert_eq!(bbox_area(&[0.5, 0.5, 0.2, 0.9]), 0.0);
        assert!((bbox_area(&[0.1, 0.2, 0.5, 0.4]) - 0.08).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_most_confident_of_overlapping() {
        let candidates = vec![
            (0.7, [0.0, 0.0, 0.5, 0.5]),
            (0.9, [0.02, 0.02, 0.52, 0.52]),
            (0.8, [0.6, 0.6, 0.9, 0.9]),
        ];

        let selected = non_maximum_suppression(candidates, 0.5);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].0, 0.9);
        assert_eq!(selected[1].0, 0.8);
    }

    #[test]
    fn test_nms_keeps_disjoint_boxes() {
        let candidates = vec![(0.6, [0.0, 0.0, 0.1, 0.1]), (0.6, [0.5, 0.5, 0.6, 0.6])];
        assert_eq!(non_maximum_suppression(candidates, 0.5).len(), 2);
        assert!(non_maximum_suppression(vec![], 0.5).is_empty());
    }
}
