use std::{fmt, time::Instant};

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    pub fn display_size(&self) -> DisplaySize {
        DisplaySize::new(self.width as f32, self.height as f32)
    }
}

/// Pixel dimensions of a coordinate space: the detector's working input or
/// the on-screen video.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplaySize {
    pub width: f32,
    pub height: f32,
}

impl DisplaySize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1, y1, (x2 - x1).max(0.0), (y2 - y1).max(0.0))
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn iou(&self, other: &FaceBox) -> f32 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = self.right().min(other.right());
        let iy2 = self.bottom().min(other.bottom());

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Expression {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
    Contemptuous,
}

impl Expression {
    pub fn name(&self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Fearful => "fearful",
            Expression::Disgusted => "disgusted",
            Expression::Surprised => "surprised",
            Expression::Contemptuous => "contemptuous",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Expression name → probability. Scores are kept in model output order and
/// are not required to sum to one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpressionScores {
    scores: Vec<(Expression, f32)>,
}

impl ExpressionScores {
    pub fn new(scores: Vec<(Expression, f32)>) -> Self {
        Self { scores }
    }

    pub fn get(&self, expression: Expression) -> Option<f32> {
        self.scores
            .iter()
            .find(|(e, _)| *e == expression)
            .map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Expression, f32)> {
        self.scores.iter()
    }

    pub fn dominant(&self) -> Option<(Expression, f32)> {
        self.scores
            .iter()
            .copied()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Scores at or above `min_probability`, most likely first.
    pub fn above(&self, min_probability: f32) -> Vec<(Expression, f32)> {
        let mut kept: Vec<_> = self
            .scores
            .iter()
            .copied()
            .filter(|(_, p)| *p >= min_probability)
            .collect();
        kept.sort_by(|a, b| b.1.total_cmp(&a.1));
        kept
    }
}

/// One face found in one frame. Never carried across frames.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    pub bbox: FaceBox,
    pub score: f32,
    pub landmarks: Option<Vec<Point>>,
    pub expressions: Option<ExpressionScores>,
}

impl DetectionResult {
    pub fn new(bbox: FaceBox, score: f32) -> Self {
        Self {
            bbox,
            score,
            landmarks: None,
            expressions: None,
        }
    }

    pub fn with_landmarks(mut self, landmarks: Vec<Point>) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    pub fn with_expressions(mut self, expressions: ExpressionScores) -> Self {
        self.expressions = Some(expressions);
        self
    }
}

/// A detector result set, with geometry expressed in the detector's working
/// resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct Detections {
    pub working_size: DisplaySize,
    pub faces: Vec<DetectionResult>,
}

impl Detections {
    pub fn empty(working_size: DisplaySize) -> Self {
        Self {
            working_size,
            faces: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// What the detection loop publishes for one processed frame.
#[derive(Clone, Debug)]
pub struct FrameDetections {
    pub seq: u64,
    pub frame: Frame,
    pub detections: Detections,
}
