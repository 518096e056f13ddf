use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    DetectOptions, FaceDetector,
    common::{self, CropRect, LANDMARK_CROP_SCALE, NUM_LANDMARKS},
};
use crate::{
    error::ModelLoadError,
    models::{ModelBundle, ModelSet},
    types::{DetectionResult, Detections, FaceBox, Frame},
};

/// ONNX Runtime backed detector: a face box network plus optional landmark
/// and expression networks run on per-face crops.
pub struct OrtFaceDetector {
    detector: Session,
    landmarks: Option<Session>,
    expressions: Option<Session>,
}

fn build_session(bundle: ModelBundle, model_path: &Path) -> Result<Session, ModelLoadError> {
    open_session(model_path).map_err(|err| ModelLoadError::Session {
        bundle,
        message: format!("{err:#}"),
    })
}

fn open_session(model_path: &Path) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;
    Ok(session)
}

impl OrtFaceDetector {
    pub fn new(models: &ModelSet, options: &DetectOptions) -> Result<Self, ModelLoadError> {
        let detector = build_session(
            ModelBundle::FaceDetector,
            models.require(ModelBundle::FaceDetector)?,
        )?;

        let landmarks = if options.with_landmarks {
            let path = models.require(ModelBundle::FaceLandmark68)?;
            Some(build_session(ModelBundle::FaceLandmark68, path)?)
        } else {
            None
        };

        let expressions = if options.with_expressions {
            let path = models.require(ModelBundle::FaceExpression)?;
            Some(build_session(ModelBundle::FaceExpression, path)?)
        } else {
            None
        };

        log::info!(
            "ORT face detector ready (landmarks: {}, expressions: {})",
            landmarks.is_some(),
            expressions.is_some()
        );

        Ok(Self {
            detector,
            landmarks,
            expressions,
        })
    }

    fn detect_boxes(&mut self, frame: &Frame, options: &DetectOptions) -> Result<Vec<DetectionResult>> {
        let input = common::prepare_detector_input(frame)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .detector
            .run(ort::inputs![tensor])
            .context("failed to run face detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "face detector returned {} outputs, expected scores and boxes",
                outputs.len()
            ));
        }

        let scores = outputs[0].try_extract_array::<f32>()?;
        let boxes = outputs[1].try_extract_array::<f32>()?;
        let scores: Vec<f32> = scores.iter().copied().collect();
        let boxes: Vec<f32> = boxes.iter().copied().collect();

        common::decode_detections(
            &scores,
            &boxes,
            common::working_size(),
            options.score_threshold,
            options.iou_threshold,
            options.max_faces,
        )
    }
}

fn run_on_crop(session: &mut Session, input: ndarray::Array4<f32>, min_len: usize) -> Result<Vec<f32>> {
    let tensor = Tensor::from_array(input)?;
    let outputs = session
        .run(ort::inputs![tensor])
        .context("failed to run ORT session")?;

    // Some landmark exports prepend auxiliary outputs; take the last one
    // large enough to hold the result.
    for idx in (0..outputs.len()).rev() {
        let values = outputs[idx].try_extract_array::<f32>()?;
        if values.len() >= min_len {
            return Ok(values.iter().copied().collect());
        }
    }
    Err(anyhow!("model returned no output with at least {min_len} values"))
}

impl FaceDetector for OrtFaceDetector {
    fn detect(&mut self, frame: &Frame, options: &DetectOptions) -> Result<Detections> {
        let working = common::working_size();
        let mut faces = self.detect_boxes(frame, options)?;

        let to_frame = (
            frame.width as f32 / working.width,
            frame.height as f32 / working.height,
        );
        let to_working = (1.0 / to_frame.0, 1.0 / to_frame.1);

        for face in &mut faces {
            let frame_box = FaceBox::new(
                face.bbox.x * to_frame.0,
                face.bbox.y * to_frame.1,
                face.bbox.width * to_frame.0,
                face.bbox.height * to_frame.1,
            );

            if options.with_landmarks {
                if let Some(session) = self.landmarks.as_mut() {
                    if let Some(crop) = CropRect::around(
                        &frame_box,
                        frame.width,
                        frame.height,
                        LANDMARK_CROP_SCALE,
                        true,
                    ) {
                        let input = common::prepare_landmark_input(frame, &crop)?;
                        let flat = run_on_crop(session, input, NUM_LANDMARKS * 2)?;
                        face.landmarks = Some(common::decode_landmarks(&flat, &crop, to_working)?);
                    }
                }
            }

            if options.with_expressions {
                if let Some(session) = self.expressions.as_mut() {
                    if let Some(crop) =
                        CropRect::around(&frame_box, frame.width, frame.height, 1.0, true)
                    {
                        let input = common::prepare_expression_input(frame, &crop)?;
                        let logits = run_on_crop(session, input, common::EXPRESSION_LABELS.len())?;
                        face.expressions = Some(common::decode_expressions(&logits)?);
                    }
                }
            }
        }

        Ok(Detections { working_size: working, faces })
    }
}
