//! Per-face models run on crops of the detected face boxes.
//!
use std::path::{Path, PathBuf};

use anyhow::Result;
use common::{BBox, Expressions, FaceDetection, Gender, Point};
use image::{imageops::FilterType, RgbImage};
use tract_onnx::prelude::*;

use super::{load_onnx, output_vec, softmax, to_nchw, NnModel, UltrafaceModel};
use crate::{detection_loop::Detector, model_loader::ModelLoadError};

const NUM_LANDMARKS: usize = 68;
const NUM_EXPRESSIONS: usize = 8;

/// Cut the face box out of the frame. `None` if nothing of it is visible.
fn crop(frame: &RgbImage, bbox: &BBox) -> Option<(RgbImage, BBox)> {
    let bbox = bbox.clamped(frame.width() as f32, frame.height() as f32);
    let (x, y) = (bbox.x.floor() as u32, bbox.y.floor() as u32);
    let width = (bbox.width.round() as u32).min(frame.width().saturating_sub(x));
    let height = (bbox.height.round() as u32).min(frame.height().saturating_sub(y));
    if width == 0 || height == 0 {
        return None;
    }

    let face = image::imageops::crop_imm(frame, x, y, width, height).to_image();
    let region = BBox::new(x as f32, y as f32, width as f32, height as f32);
    Some((face, region))
}

/// 68 point facial landmarks from a 112x112 crop.
pub struct LandmarkModel {
    model: NnModel,
}

impl LandmarkModel {
    const SIZE: u32 = 112;

    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let size = Self::SIZE as usize;
        let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size));
        Ok(Self {
            model: load_onnx(path, input_fact)?,
        })
    }

    /// Landmarks in frame pixels of a face cropped from `region`.
    pub fn run(&self, face: &RgbImage, region: &BBox) -> Result<Vec<Point>> {
        let input = to_nchw(face, Self::SIZE, Self::SIZE, |_, value| value as f32 / 255.0);
        let raw_nn_out = self.model.run(tvec!(input.into()))?;
        Ok(landmarks_from_output(&output_vec(&raw_nn_out, 0)?, region)?)
    }
}

/// Map `[x0, y0, x1, y1, ...]` normalized to the crop into frame pixels.
fn landmarks_from_output(output: &[f32], region: &BBox) -> Result<Vec<Point>, ModelLoadError> {
    if output.len() != NUM_LANDMARKS * 2 {
        return Err(ModelLoadError::UnexpectedOutputs(format!(
            "expected {} landmark values, got {}",
            NUM_LANDMARKS * 2,
            output.len()
        )));
    }

    Ok(output
        .chunks_exact(2)
        .map(|xy| {
            Point::new(
                region.x + xy[0] * region.width,
                region.y + xy[1] * region.height,
            )
        })
        .collect())
}

/// FER+ expression classifier on a 64x64 grayscale crop.
pub struct ExpressionModel {
    model: NnModel,
}

impl ExpressionModel {
    const SIZE: u32 = 64;

    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let size = Self::SIZE as usize;
        let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 1, size, size));
        Ok(Self {
            model: load_onnx(path, input_fact)?,
        })
    }

    pub fn run(&self, face: &RgbImage) -> Result<Expressions> {
        let gray = image::imageops::grayscale(face);
        let resized = image::imageops::resize(&gray, Self::SIZE, Self::SIZE, FilterType::Triangle);

        let size = Self::SIZE as usize;
        let input: Tensor =
            tract_ndarray::Array4::from_shape_fn((1, 1, size, size), |(_, _, y, x)| {
                resized[(x as _, y as _)][0] as f32
            })
            .into();

        let raw_nn_out = self.model.run(tvec!(input.into()))?;
        Ok(expressions_from_logits(&output_vec(&raw_nn_out, 0)?)?)
    }
}

fn expressions_from_logits(logits: &[f32]) -> Result<Expressions, ModelLoadError> {
    let probabilities: [f32; NUM_EXPRESSIONS] =
        softmax(logits).try_into().map_err(|probs: Vec<f32>| {
            ModelLoadError::UnexpectedOutputs(format!(
                "expected {NUM_EXPRESSIONS} expression scores, got {}",
                probs.len()
            ))
        })?;
    Ok(Expressions(probabilities))
}

/// Age and gender from a 96x96 crop. Outputs `[female, male, age / 100]`.
pub struct AgeGenderModel {
    model: NnModel,
}

/// Estimated age, gender and the probability of that gender.
pub type AgeGender = (f32, Gender, f32);

impl AgeGenderModel {
    const SIZE: u32 = 96;

    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let size = Self::SIZE as usize;
        let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size));
        Ok(Self {
            model: load_onnx(path, input_fact)?,
        })
    }

    pub fn run(&self, face: &RgbImage) -> Result<AgeGender> {
        let input = to_nchw(face, Self::SIZE, Self::SIZE, |_, value| value as f32);
        let raw_nn_out = self.model.run(tvec!(input.into()))?;
        Ok(age_gender_from_output(&output_vec(&raw_nn_out, 0)?)?)
    }
}

fn age_gender_from_output(output: &[f32]) -> Result<AgeGender, ModelLoadError> {
    let [female, male, age] = output else {
        return Err(ModelLoadError::UnexpectedOutputs(format!(
            "expected 3 age/gender values, got {}",
            output.len()
        )));
    };

    let probs = softmax(&[*female, *male]);
    let (gender, probability) = if probs[1] >= probs[0] {
        (Gender::Male, probs[1])
    } else {
        (Gender::Female, probs[0])
    };
    Ok((age * 100.0, gender, probability))
}

/// Files of the four face models.
#[derive(Debug, Clone)]
pub struct FaceModelFiles {
    pub detector: PathBuf,
    pub landmarks: PathBuf,
    pub expressions: PathBuf,
    pub age_gender: PathBuf,
}

/// Face boxes plus landmarks, expressions, age and gender per face.
pub struct FaceAnalyzer {
    faces: UltrafaceModel,
    landmarks: LandmarkModel,
    expressions: ExpressionModel,
    age_gender: AgeGenderModel,
}

impl FaceAnalyzer {
    pub fn load(files: &FaceModelFiles, max_iou: f32, min_confidence: f32) -> Result<Self> {
        Ok(Self {
            faces: UltrafaceModel::load(&files.detector, max_iou, min_confidence)?,
            landmarks: LandmarkModel::load(&files.landmarks)?,
            expressions: ExpressionModel::load(&files.expressions)?,
            age_gender: AgeGenderModel::load(&files.age_gender)?,
        })
    }

    fn analyze(&self, frame: &RgbImage, score: f32, bbox: BBox) -> Result<Option<FaceDetection>> {
        let Some((face, region)) = crop(frame, &bbox) else {
            return Ok(None);
        };

        let (age, gender, gender_probability) = self.age_gender.run(&face)?;
        Ok(Some(FaceDetection {
            score,
            bbox,
            landmarks: self.landmarks.run(&face, &region)?,
            expressions: self.expressions.run(&face)?,
            age,
            gender,
            gender_probability,
        }))
    }
}

impl Detector for FaceAnalyzer {
    type Output = Vec<FaceDetection>;

    fn detect(&self, frame: &RgbImage) -> Result<Vec<FaceDetection>> {
        let mut detections = vec![];
        for (score, bbox) in self.faces.detect(frame)? {
            if let Some(detection) = self.analyze(frame, score, bbox)? {
                detections.push(detection);
            }
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod test {
    use common::Expression;

    use super::*;

    #[test]
    fn test_crop_is_clamped_to_frame() {
        let frame = RgbImage::new(100, 80);

        let (face, region) = crop(&frame, &BBox::new(90.0, 70.0, 30.0, 30.0)).unwrap();
        assert_eq!(face.dimensions(), (10, 10));
        assert_eq!(region, BBox::new(90.0, 70.0, 10.0, 10.0));

        assert!(crop(&frame, &BBox::new(120.0, 10.0, 10.0, 10.0)).is_none());
    }

    #[test]
    fn test_landmarks_in_frame_pixels() {
        let mut output = vec![0.5; NUM_LANDMARKS * 2];
        output[0] = 0.0;
        output[1] = 1.0;
        let region = BBox::new(100.0, 50.0, 40.0, 20.0);

        let points = landmarks_from_output(&output, &region).unwrap();
        assert_eq!(points.len(), NUM_LANDMARKS);
        assert_eq!(points[0], Point::new(100.0, 70.0));
        assert_eq!(points[1], Point::new(120.0, 60.0));

        assert!(landmarks_from_output(&output[..10], &region).is_err());
    }

    #[test]
    fn test_expressions_from_logits() {
        let expressions =
            expressions_from_logits(&[0.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(expressions.ranked(0.1)[0].0, Expression::Happy);

        assert!(expressions_from_logits(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_age_gender_from_output() {
        let (age, gender, probability) = age_gender_from_output(&[-2.0, 2.0, 0.296]).unwrap();
        assert!((age - 29.6).abs() < 1e-3);
        assert_eq!(gender, Gender::Male);
        assert!(probability > 0.9);

        let (_, gender, _) = age_gender_from_output(&[3.0, 0.0, 0.4]).unwrap();
        assert_eq!(gender, Gender::Female);

        assert!(age_gender_from_output(&[0.1, 0.2]).is_err());
    }
}
