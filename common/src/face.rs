//! Face detection results with landmarks, expressions, age and gender.
//!
use std::fmt;

use serde::Serialize;

use crate::geometry::{BBox, Point};

/// Estimated gender of a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Female => f.write_str("female"),
            Gender::Male => f.write_str("male"),
        }
    }
}

/// Facial expressions in the output order of the expression network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Happy,
    Surprised,
    Sad,
    Angry,
    Disgusted,
    Fearful,
    Contempt,
}

impl Expression {
    pub const ALL: [Expression; 8] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Surprised,
        Expression::Sad,
        Expression::Angry,
        Expression::Disgusted,
        Expression::Fearful,
        Expression::Contempt,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Surprised => "surprised",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Disgusted => "disgusted",
            Expression::Fearful => "fearful",
            Expression::Contempt => "contempt",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Probability per expression, indexed like [`Expression::ALL`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Expressions(pub [f32; 8]);

impl Expressions {
    pub fn probability(&self, expression: Expression) -> f32 {
        self.0[expression as usize]
    }

    /// Expressions above `min_probability`, most probable first.
    pub fn ranked(&self, min_probability: f32) -> Vec<(Expression, f32)> {
        let mut ranked: Vec<_> = Expression::ALL
            .iter()
            .copied()
            .zip(self.0.iter().copied())
            .filter(|(_, probability)| *probability > min_probability)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

/// One analysed face in one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceDetection {
    /// Face detector confidence in `0.0..=1.0`.
    pub score: f32,
    pub bbox: BBox,
    /// Landmark points in frame pixel coordinates (68 for the default model).
    pub landmarks: Vec<Point>,
    pub expressions: Expressions,
    /// Estimated age in years, unrounded.
    pub age: f32,
    pub gender: Gender,
    pub gender_probability: f32,
}

impl FaceDetection {
    /// Rescale box and landmarks from detection size to display size.
    pub fn scaled(self, sx: f32, sy: f32) -> Self {
        Self {
            bbox: self.bbox.scaled(sx, sy),
            landmarks: self
                .landmarks
                .into_iter()
                .map(|point| point.scaled(sx, sy))
                .collect(),
            ..self
        }
    }

    /// Synthesized age/gender label, e.g. `Age: 30 | Gender: male`.
    pub fn age_gender_label(&self) -> String {
        format!("Age: {} | Gender: {}", self.age.round() as i64, self.gender)
    }
}
