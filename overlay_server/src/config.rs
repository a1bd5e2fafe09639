//! Command line configuration of the two pipelines.
//!
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Args, Parser};

use crate::{
    detection_loop::OverlapPolicy,
    model_loader::{default_model_dir, ModelSource},
};

pub const OBJECT_TICK_PERIOD: Duration = Duration::from_millis(10);
pub const FACE_TICK_PERIOD: Duration = Duration::from_millis(1000);

/// Minimum score of reported objects.
pub const OBJECT_MIN_SCORE: f32 = 0.6;

/// Face detector thresholds.
pub const FACE_MAX_IOU: f32 = 0.5;
pub const FACE_MIN_CONFIDENCE: f32 = 0.5;

/// Fixed video and overlay size of the face pipeline.
pub const FACE_DISPLAY_SIZE: (u32, u32) = (640, 480);

const DEFAULT_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf";

/// Options shared by both binaries.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Address to serve the web page on
    #[clap(long, default_value = "127.0.0.1:3000")]
    pub server_address: String,

    /// Video device to capture from
    #[clap(long, default_value = "/dev/video0")]
    pub device: String,

    /// Directory for model files given by relative path or downloaded
    #[clap(long)]
    pub model_dir: Option<PathBuf>,

    /// TrueType font for overlay labels
    #[clap(long, default_value = DEFAULT_FONT)]
    pub font: PathBuf,

    /// Detection interval in milliseconds [default: per pipeline]
    #[clap(long)]
    pub tick_ms: Option<u64>,

    /// Skip ticks while a detection is still running
    #[clap(long)]
    pub skip_if_busy: bool,
}

impl CommonArgs {
    pub fn model_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(default_model_dir)
    }

    pub fn tick_period(&self, default: Duration) -> Duration {
        self.tick_ms
            .map(|ms| Duration::from_millis(ms.max(1)))
            .unwrap_or(default)
    }

    pub fn overlap_policy(&self) -> OverlapPolicy {
        if self.skip_if_busy {
            OverlapPolicy::SkipIfBusy
        } else {
            OverlapPolicy::Allow
        }
    }

    pub fn model_source(&self, path: &Path, url: &Option<String>) -> ModelSource {
        ModelSource::new(path, url.clone()).in_dir(&self.model_dir())
    }
}

/// Live object detection overlay.
#[derive(Parser, Debug)]
#[clap(author, version)]
pub struct ObjectArgs {
    #[clap(flatten)]
    pub common: CommonArgs,

    /// Requested capture width
    #[clap(long, default_value_t = 1280)]
    pub width: u32,

    /// Requested capture height
    #[clap(long, default_value_t = 720)]
    pub height: u32,

    /// SSD-MobileNet ONNX model
    #[clap(long, default_value = "ssd_mobilenet_v1.onnx")]
    pub model: PathBuf,

    /// Where to download the model from if it is missing
    #[clap(long)]
    pub model_url: Option<String>,

    /// Minimum score of reported objects
    #[clap(long, default_value_t = OBJECT_MIN_SCORE)]
    pub min_score: f32,
}

impl ObjectArgs {
    pub fn model_source(&self) -> ModelSource {
        self.common.model_source(&self.model, &self.model_url)
    }
}

/// Live face detection overlay with landmarks, expressions, age and gender.
#[derive(Parser, Debug)]
#[clap(author, version)]
pub struct FaceArgs {
    #[clap(flatten)]
    pub common: CommonArgs,

    /// Ultraface RFB-320 face detector
    #[clap(long, default_value = "version-RFB-320.onnx")]
    pub detector_model: PathBuf,

    #[clap(long)]
    pub detector_url: Option<String>,

    /// 68 point landmark model
    #[clap(long, default_value = "face_landmarks_68.onnx")]
    pub landmark_model: PathBuf,

    #[clap(long)]
    pub landmark_url: Option<String>,

    /// FER+ expression model
    #[clap(long, default_value = "emotion-ferplus-8.onnx")]
    pub expression_model: PathBuf,

    #[clap(long)]
    pub expression_url: Option<String>,

    /// Age and gender model
    #[clap(long, default_value = "genderage.onnx")]
    pub age_gender_model: PathBuf,

    #[clap(long)]
    pub age_gender_url: Option<String>,
}

impl FaceArgs {
    /// Sources of detector, landmark, expression and age/gender model.
    pub fn model_sources(&self) -> [ModelSource; 4] {
        [
            self.common
                .model_source(&self.detector_model, &self.detector_url),
            self.common
                .model_source(&self.landmark_model, &self.landmark_url),
            self.common
                .model_source(&self.expression_model, &self.expression_url),
            self.common
                .model_source(&self.age_gender_model, &self.age_gender_url),
        ]
    }
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definitions() {
        ObjectArgs::command().debug_assert();
        FaceArgs::command().debug_assert();
    }

    #[test]
    fn test_object_defaults() {
        let args = ObjectArgs::parse_from(["object_detection", "--model-dir", "/models"]);
        assert_eq!(args.common.server_address, "127.0.0.1:3000");
        assert_eq!((args.width, args.height), (1280, 720));
        assert_eq!(args.min_score, OBJECT_MIN_SCORE);
        assert_eq!(args.common.tick_period(OBJECT_TICK_PERIOD), OBJECT_TICK_PERIOD);
        assert_eq!(args.common.overlap_policy(), OverlapPolicy::Allow);
        assert_eq!(
            args.model_source().path,
            PathBuf::from("/models/ssd_mobilenet_v1.onnx")
        );
    }

    #[test]
    fn test_face_overrides() {
        let args = FaceArgs::parse_from([
            "face_detection",
            "--tick-ms",
            "250",
            "--skip-if-busy",
            "--detector-model",
            "/abs/faces.onnx",
            "--detector-url",
            "http://localhost/faces.onnx",
        ]);
        assert_eq!(
            args.common.tick_period(FACE_TICK_PERIOD),
            Duration::from_millis(250)
        );
        assert_eq!(args.common.overlap_policy(), OverlapPolicy::SkipIfBusy);

        let [detector, ..] = args.model_sources();
        assert_eq!(detector.path, PathBuf::from("/abs/faces.onnx"));
        assert_eq!(detector.url.as_deref(), Some("http://localhost/faces.onnx"));
    }
}
