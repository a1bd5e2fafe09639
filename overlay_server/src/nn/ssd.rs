//! SSD-MobileNet object detector trained on COCO.
//!
use std::path::Path;

use common::{BBox, DetectionBatch, ObjectDetection};
use image::RgbImage;
use tract_onnx::prelude::*;

use super::{coco::coco_label, compile, output_vec, read_onnx, NnModel, NnOut};
use crate::{detection_loop::Detector, model_loader::ModelLoadError};

/// Upper bound of detections reported per frame.
pub const MAX_DETECTIONS: usize = 20;

/// Positions of the named outputs in the model's output list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputLayout {
    boxes: usize,
    classes: usize,
    scores: usize,
}

impl OutputLayout {
    fn find(names: &[String]) -> Result<Self, ModelLoadError> {
        let position = |key: &str| {
            names
                .iter()
                .position(|name| name.contains(key))
                .ok_or_else(|| {
                    ModelLoadError::UnexpectedOutputs(format!(
                        "no output named like `{key}` in {names:?}"
                    ))
                })
        };
        Ok(Self {
            boxes: position("boxes")?,
            classes: position("classes")?,
            scores: position("scores")?,
        })
    }
}

pub struct SsdMobilenet {
    model: NnModel,
    layout: OutputLayout,
    input_size: u32,
    min_score: f32,
}

impl SsdMobilenet {
    pub const INPUT_SIZE: u32 = 300;

    /// Load a model taking a `1xHxWx3` u8 image and returning normalized
    /// `[y_tl, x_tl, y_br, x_br]` boxes, COCO class ids and scores.
    pub fn load(path: &Path, min_score: f32) -> Result<Self, ModelLoadError> {
        let model = read_onnx(path)?;
        let names: Vec<String> = model
            .output_outlets()
            .map_err(|err| ModelLoadError::UnexpectedOutputs(format!("{err:#}")))?
            .iter()
            .map(|outlet| {
                model
                    .outlet_label(*outlet)
                    .unwrap_or(&model.node(outlet.node).name)
                    .to_owned()
            })
            .collect();
        let layout = OutputLayout::find(&names)?;
        log::debug!("SSD outputs {names:?}");

        let size = Self::INPUT_SIZE as usize;
        let input_fact = InferenceFact::dt_shape(u8::datum_type(), tvec!(1, size, size, 3));

        Ok(Self {
            model: compile(path, model, input_fact)?,
            layout,
            input_size: Self::INPUT_SIZE,
            min_score,
        })
    }

    fn preproc(&self, frame: &RgbImage) -> Tensor {
        let resized: RgbImage = image::imageops::resize(
            frame,
            self.input_size,
            self.input_size,
            image::imageops::FilterType::Triangle,
        );
        let size = self.input_size as usize;

        tract_ndarray::Array4::from_shape_fn((1, size, size, 3), |(_, y, x, c)| {
            resized[(x as _, y as _)][c]
        })
        .into()
    }

    fn postproc(
        &self,
        raw_nn_out: &NnOut,
        width: f32,
        height: f32,
    ) -> Result<DetectionBatch, ModelLoadError> {
        let boxes = output_vec(raw_nn_out, self.layout.boxes)?;
        let classes = output_vec(raw_nn_out, self.layout.classes)?;
        let scores = output_vec(raw_nn_out, self.layout.scores)?;

        Ok(select_detections(
            &boxes,
            &classes,
            &scores,
            self.min_score,
            width,
            height,
        ))
    }
}

impl Detector for SsdMobilenet {
    type Output = DetectionBatch;

    fn detect(&self, frame: &RgbImage) -> anyhow::Result<DetectionBatch> {
        let raw_nn_out = self.model.run(tvec!(self.preproc(frame).into()))?;
        let batch = self.postproc(&raw_nn_out, frame.width() as f32, frame.height() as f32)?;
        Ok(batch)
    }
}

/// Keep detections scoring at least `min_score` with a known class, most
/// confident first, at most [`MAX_DETECTIONS`], boxes in frame pixels.
fn select_detections(
    boxes: &[f32],
    classes: &[f32],
    scores: &[f32],
    min_score: f32,
    width: f32,
    height: f32,
) -> DetectionBatch {
    let mut candidates: Vec<_> = scores
        .iter()
        .zip(classes)
        .zip(boxes.chunks_exact(4))
        .filter(|((score, _), _)| **score >= min_score)
        .filter_map(|((score, class_id), bbox)| {
            let label = coco_label(class_id.round() as usize)?;
            let bbox = BBox::from_corners(
                bbox[1] * width,
                bbox[0] * height,
                bbox[3] * width,
                bbox[2] * height,
            )
            .clamped(width, height);
            Some(ObjectDetection::new(label, *score, bbox))
        })
        .collect();

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(MAX_DETECTIONS);
    DetectionBatch::new(candidates)
}
