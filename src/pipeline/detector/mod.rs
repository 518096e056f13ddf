mod common;
mod ort;

use crate::{
    models::ModelBundle,
    types::{Detections, Frame},
};

pub use self::ort::OrtFaceDetector;

/// Maps one frame to the faces found in it, in the detector's working
/// coordinates. Implementations own whatever model state they need.
pub trait FaceDetector: Send + 'static {
    fn detect(&mut self, frame: &Frame, options: &DetectOptions) -> anyhow::Result<Detections>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectOptions {
    pub score_threshold: f32,
    pub iou_threshold: f32,
    pub max_faces: usize,
    pub with_landmarks: bool,
    pub with_expressions: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            iou_threshold: 0.3,
            max_faces: 16,
            with_landmarks: true,
            with_expressions: true,
        }
    }
}

impl DetectOptions {
    /// Bundles that must load before detection can start.
    pub fn required_bundles(&self) -> Vec<ModelBundle> {
        let mut bundles = vec![ModelBundle::FaceDetector];
        if self.with_landmarks {
            bundles.push(ModelBundle::FaceLandmark68);
        }
        if self.with_expressions {
            bundles.push(ModelBundle::FaceExpression);
        }
        bundles
    }
}
