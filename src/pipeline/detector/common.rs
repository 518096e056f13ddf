use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use image::{ImageBuffer, Rgba, RgbaImage, imageops::FilterType};
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{
    DetectionResult, DisplaySize, Expression, ExpressionScores, FaceBox, Frame, Point,
};

pub const WORKING_WIDTH: u32 = 320;
pub const WORKING_HEIGHT: u32 = 240;
pub const LANDMARK_INPUT_SIZE: u32 = 112;
pub const EXPRESSION_INPUT_SIZE: u32 = 64;
pub const NUM_LANDMARKS: usize = 68;

/// Landmark crops are widened so the jaw line fits.
pub const LANDMARK_CROP_SCALE: f32 = 1.2;

/// FER+ output order.
pub const EXPRESSION_LABELS: [Expression; 8] = [
    Expression::Neutral,
    Expression::Happy,
    Expression::Surprised,
    Expression::Sad,
    Expression::Angry,
    Expression::Disgusted,
    Expression::Fearful,
    Expression::Contemptuous,
];

pub fn working_size() -> DisplaySize {
    DisplaySize::new(WORKING_WIDTH as f32, WORKING_HEIGHT as f32)
}

/// Integer pixel rectangle inside a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Rectangle around `bbox` (frame pixels) grown by `scale`, optionally
    /// squared on its longer side, then clipped to the frame. `None` when
    /// nothing of it lies inside the frame.
    pub fn around(
        bbox: &FaceBox,
        frame_w: u32,
        frame_h: u32,
        scale: f32,
        square: bool,
    ) -> Option<Self> {
        let (mut w, mut h) = (bbox.width * scale, bbox.height * scale);
        if square {
            let side = w.max(h);
            w = side;
            h = side;
        }
        let cx = bbox.x + bbox.width / 2.0;
        let cy = bbox.y + bbox.height / 2.0;

        let x1 = (cx - w / 2.0).max(0.0).floor();
        let y1 = (cy - h / 2.0).max(0.0).floor();
        let x2 = (cx + w / 2.0).min(frame_w as f32).ceil();
        let y2 = (cy + h / 2.0).min(frame_h as f32).ceil();
        if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
            return None;
        }

        Some(Self {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

fn frame_view(frame: &Frame) -> Result<ImageBuffer<Rgba<u8>, &[u8]>> {
    ImageBuffer::from_raw(frame.width, frame.height, frame.rgba.as_slice())
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))
}

fn crop_resized(frame: &Frame, crop: &CropRect, size: u32) -> Result<RgbaImage> {
    let view = frame_view(frame)?;
    let cropped = image::imageops::crop_imm(&view, crop.x, crop.y, crop.width, crop.height);
    Ok(image::imageops::resize(
        &*cropped,
        size,
        size,
        FilterType::Triangle,
    ))
}

/// Downscales the frame to the working resolution and lays it out as
/// `[1, 3, H, W]` normalised to roughly `[-1, 1]`.
pub fn prepare_detector_input(frame: &Frame) -> Result<Array4<f32>> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(WORKING_WIDTH, WORKING_HEIGHT, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;

    Ok(rgba_to_chw(
        &dst_image.into_vec(),
        WORKING_WIDTH,
        WORKING_HEIGHT,
        |v| (v - 127.0) / 128.0,
    ))
}

pub fn prepare_landmark_input(frame: &Frame, crop: &CropRect) -> Result<Array4<f32>> {
    let resized = crop_resized(frame, crop, LANDMARK_INPUT_SIZE)?;
    Ok(rgba_to_chw(
        resized.as_raw(),
        LANDMARK_INPUT_SIZE,
        LANDMARK_INPUT_SIZE,
        |v| v / 255.0,
    ))
}

/// Grayscale `[1, 1, 64, 64]` with raw 0..255 intensities.
pub fn prepare_expression_input(frame: &Frame, crop: &CropRect) -> Result<Array4<f32>> {
    let resized = crop_resized(frame, crop, EXPRESSION_INPUT_SIZE)?;
    let gray = image::imageops::grayscale(&resized);
    let side = EXPRESSION_INPUT_SIZE as usize;
    let data: Vec<f32> = gray.as_raw().iter().map(|&v| v as f32).collect();
    Array4::from_shape_vec((1, 1, side, side), data)
        .map_err(|err| anyhow!("failed to build expression tensor: {err}"))
}

fn rgba_to_chw(rgba: &[u8], width: u32, height: u32, normalize: fn(f32) -> f32) -> Array4<f32> {
    let plane = width as usize * height as usize;
    let mut data = vec![0f32; plane * 3];
    let (r, rest) = data.split_at_mut(plane);
    let (g, b) = rest.split_at_mut(plane);
    r.par_iter_mut()
        .zip(g.par_iter_mut())
        .zip(b.par_iter_mut())
        .zip(rgba.par_chunks_exact(4))
        .for_each(|(((r, g), b), px)| {
            *r = normalize(px[0] as f32);
            *g = normalize(px[1] as f32);
            *b = normalize(px[2] as f32);
        });
    Array4::from_shape_vec((1, 3, height as usize, width as usize), data)
        .unwrap_or_else(|_| Array4::zeros((1, 3, height as usize, width as usize)))
}

/// Decodes `scores [N, 2]` (background, face) and `boxes [N, 4]` (normalised
/// corners) into working-space detections above the threshold, then
/// suppresses overlaps.
pub fn decode_detections(
    scores: &[f32],
    boxes: &[f32],
    working: DisplaySize,
    score_threshold: f32,
    iou_threshold: f32,
    top_k: usize,
) -> Result<Vec<DetectionResult>> {
    let count = scores.len() / 2;
    if boxes.len() < count * 4 {
        return Err(anyhow!(
            "detector output mismatch: {} scores but {} box values",
            count,
            boxes.len()
        ));
    }

    let candidates: Vec<DetectionResult> = scores
        .chunks_exact(2)
        .zip(boxes.chunks_exact(4))
        .filter(|(score, _)| score[1] >= score_threshold)
        .map(|(score, corners)| {
            let x1 = (corners[0] * working.width).clamp(0.0, working.width);
            let y1 = (corners[1] * working.height).clamp(0.0, working.height);
            let x2 = (corners[2] * working.width).clamp(0.0, working.width);
            let y2 = (corners[3] * working.height).clamp(0.0, working.height);
            DetectionResult::new(FaceBox::from_corners(x1, y1, x2, y2), score[1])
        })
        .filter(|d| d.bbox.area() > 0.0)
        .collect();

    Ok(nms(candidates, iou_threshold, top_k))
}

/// Greedy non-maximum suppression, highest score first.
pub fn nms(mut candidates: Vec<DetectionResult>, threshold: f32, top_k: usize) -> Vec<DetectionResult> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<DetectionResult> = Vec::new();
    for candidate in candidates {
        if keep.iter().any(|k| k.bbox.iou(&candidate.bbox) >= threshold) {
            continue;
        }
        keep.push(candidate);
        if keep.len() >= top_k {
            break;
        }
    }
    keep
}

/// Maps normalised crop-relative landmarks back to frame pixels, then scales
/// them into working space.
pub fn decode_landmarks(
    flat: &[f32],
    crop: &CropRect,
    frame_to_working: (f32, f32),
) -> Result<Vec<Point>> {
    if flat.len() < NUM_LANDMARKS * 2 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_LANDMARKS * 2
        ));
    }

    let (sx, sy) = frame_to_working;
    Ok(flat
        .chunks_exact(2)
        .take(NUM_LANDMARKS)
        .map(|xy| {
            let fx = crop.x as f32 + xy[0] * crop.width as f32;
            let fy = crop.y as f32 + xy[1] * crop.height as f32;
            Point::new(fx * sx, fy * sy)
        })
        .collect())
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|v| v / sum).collect()
}

pub fn decode_expressions(logits: &[f32]) -> Result<ExpressionScores> {
    if logits.len() < EXPRESSION_LABELS.len() {
        return Err(anyhow!(
            "unexpected expression output length: got {}, need {}",
            logits.len(),
            EXPRESSION_LABELS.len()
        ));
    }
    let probs = softmax(&logits[..EXPRESSION_LABELS.len()]);
    Ok(ExpressionScores::new(
        EXPRESSION_LABELS.iter().copied().zip(probs).collect(),
    ))
}
