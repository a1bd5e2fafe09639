//! ONNX models run with tract.
//!
//! Every model is compiled once for a fixed input shape. Preprocessing resizes
//! the frame (or a face crop) to that shape; postprocessing maps the raw
//! outputs back into frame pixel coordinates.
use std::path::Path;

use image::RgbImage;
use tract_onnx::prelude::*;

use crate::model_loader::ModelLoadError;

pub mod coco;
pub mod face_attributes;
pub mod ssd;
pub mod ultraface;

pub use face_attributes::{
    AgeGenderModel, ExpressionModel, FaceAnalyzer, FaceModelFiles, LandmarkModel,
};
pub use ssd::SsdMobilenet;
pub use ultraface::UltrafaceModel;

pub type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;
pub type NnOut = TVec<TValue>;

/// Positive additive constant to avoid divide-by-zero.
const EPS: f32 = 1.0e-7;

/// Parse an ONNX file without optimizing it yet.
pub fn read_onnx(path: &Path) -> Result<InferenceModel, ModelLoadError> {
    tract_onnx::onnx()
        .model_for_path(path)
        .map_err(|err| onnx_error(path, err))
}

/// Fix the input shape, optimize and make the model runnable.
pub fn compile(
    path: &Path,
    model: InferenceModel,
    input_fact: InferenceFact,
) -> Result<NnModel, ModelLoadError> {
    model
        .with_input_fact(0, input_fact)
        .and_then(|model| model.into_optimized())
        .and_then(|model| model.into_runnable())
        .map_err(|err| onnx_error(path, err))
}

/// Parse and compile in one go.
pub fn load_onnx(path: &Path, input_fact: InferenceFact) -> Result<NnModel, ModelLoadError> {
    compile(path, read_onnx(path)?, input_fact)
}

fn onnx_error(path: &Path, err: TractError) -> ModelLoadError {
    ModelLoadError::Onnx {
        path: path.to_owned(),
        reason: format!("{err:#}"),
    }
}

/// Resize `image` and lay it out as a `1x3xHxW` f32 tensor.
///
/// `normalize` maps a channel index and raw channel value to the model input.
pub fn to_nchw(
    image: &RgbImage,
    width: u32,
    height: u32,
    normalize: impl Fn(usize, u8) -> f32,
) -> Tensor {
    let resized: RgbImage = image::imageops::resize(
        image,
        width,
        height,
        image::imageops::FilterType::Triangle,
    );

    tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, c, y, x)| normalize(c, resized[(x as _, y as _)][c]),
    )
    .into()
}

/// Flatten the f32 output at `index`.
pub fn output_vec(raw_nn_out: &NnOut, index: usize) -> Result<Vec<f32>, ModelLoadError> {
    let output = raw_nn_out.get(index).ok_or_else(|| {
        ModelLoadError::UnexpectedOutputs(format!(
            "expected at least {} outputs, got {}",
            index + 1,
            raw_nn_out.len()
        ))
    })?;
    let view = output
        .to_array_view::<f32>()
        .map_err(|err| ModelLoadError::UnexpectedOutputs(format!("{err:#}")))?;
    Ok(view.iter().copied().collect())
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum::<f32>() + EPS;
    exps.iter().map(|x| x / sum).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_softmax() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);

        // Large logits must not overflow
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_to_nchw_layout() {
        let image = RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30]));

        let tensor = to_nchw(&image, 4, 2, |_, value| value as f32);
        assert_eq!(tensor.shape(), &[1, 3, 2, 4]);

        // Channel planes of 2x4 values each
        let values = tensor.as_slice::<f32>().unwrap();
        assert!(values[..8].iter().all(|v| *v == 10.0));
        assert!(values[8..16].iter().all(|v| *v == 20.0));
        assert!(values[16..].iter().all(|v| *v == 30.0));
    }

    #[test]
    fn test_missing_output_is_reported() {
        let out = NnOut::new();
        assert!(matches!(
            output_vec(&out, 0),
            Err(ModelLoadError::UnexpectedOutputs(_))
        ));
    }

    #[test]
    fn test_missing_model_file() {
        assert!(matches!(
            read_onnx(Path::new("/nonexistent/model.onnx")),
            Err(ModelLoadError::Onnx { .. })
        ));
    }
}
