use fast_image_resize as fir;

use crate::types::{DetectionResult, Detections, DisplaySize, FaceBox, Frame, Point};

pub type Color = [u8; 4];

const TRANSPARENT: Color = [0, 0, 0, 0];

// Primitive style.
pub const BOX_COLOR: Color = [0, 255, 0, 255];
pub const EYE_COLOR: Color = [255, 0, 0, 255];
pub const NOSE_COLOR: Color = [0, 255, 255, 255];
pub const MOUTH_COLOR: Color = [255, 102, 0, 255];
pub const DEFAULT_POINT_COLOR: Color = [255, 255, 0, 255];
pub const POLYGON_COLOR: Color = [255, 255, 255, 255];
const BOX_THICKNESS: i32 = 3;
const POINT_RADIUS: i32 = 2;

// Helper style.
pub const HELPER_BOX_COLOR: Color = [0, 0, 255, 255];
pub const HELPER_LINE_COLOR: Color = [0, 255, 255, 255];
pub const HELPER_POINT_COLOR: Color = [255, 0, 255, 255];
pub const LABEL_COLOR: Color = [255, 255, 255, 255];
const HELPER_BOX_THICKNESS: i32 = 2;
const LABEL_LINE_HEIGHT: f32 = 18.0;

/// Anatomical runs of the 68-point layout: `(first, last, closed)`.
pub const FACE_CONTOURS: &[(usize, usize, bool)] = &[
    (0, 16, false),
    (17, 21, false),
    (22, 26, false),
    (27, 35, false),
    (36, 41, true),
    (42, 47, true),
    (48, 59, true),
    (60, 67, true),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayStyle {
    /// Green box, region-coloured points, index-order closed polygon.
    Primitives,
    /// Detection box with score, landmark contours, expression labels.
    Helpers,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayOptions {
    pub style: OverlayStyle,
    pub redraw_video: bool,
    pub min_expression_probability: f32,
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self {
            style: OverlayStyle::Primitives,
            redraw_video: true,
            min_expression_probability: 0.1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LandmarkRegion {
    Eye,
    Nose,
    Mouth,
    Other,
}

impl LandmarkRegion {
    pub fn of(index: usize) -> Self {
        match index {
            36..=47 => LandmarkRegion::Eye,
            27..=35 => LandmarkRegion::Nose,
            48..=67 => LandmarkRegion::Mouth,
            _ => LandmarkRegion::Other,
        }
    }

    pub fn color(&self) -> Color {
        match self {
            LandmarkRegion::Eye => EYE_COLOR,
            LandmarkRegion::Nose => NOSE_COLOR,
            LandmarkRegion::Mouth => MOUTH_COLOR,
            LandmarkRegion::Other => DEFAULT_POINT_COLOR,
        }
    }
}

impl DetectionResult {
    /// Same face with geometry moved from the `from` coordinate space into
    /// `to`, scaling each axis independently.
    pub fn rescaled(&self, from: DisplaySize, to: DisplaySize) -> DetectionResult {
        if from.is_empty() {
            return self.clone();
        }
        let sx = to.width / from.width;
        let sy = to.height / from.height;

        DetectionResult {
            bbox: FaceBox::new(
                self.bbox.x * sx,
                self.bbox.y * sy,
                self.bbox.width * sx,
                self.bbox.height * sy,
            ),
            score: self.score,
            landmarks: self
                .landmarks
                .as_ref()
                .map(|points| points.iter().map(|p| Point::new(p.x * sx, p.y * sy)).collect()),
            expressions: self.expressions.clone(),
        }
    }
}

pub fn resize_results(detections: &Detections, display: DisplaySize) -> Vec<DetectionResult> {
    detections
        .faces
        .iter()
        .map(|face| face.rescaled(detections.working_size, display))
        .collect()
}

/// Segments joining each point to the next by index, plus one closing
/// segment from the last back to the first: N segments for N points.
pub fn closed_polygon(points: &[Point]) -> Vec<(Point, Point)> {
    let n = points.len();
    (0..n).map(|i| (points[i], points[(i + 1) % n])).collect()
}

/// Segments along the anatomical contours present in `points`.
pub fn contour_segments(points: &[Point]) -> Vec<(Point, Point)> {
    let mut segments = Vec::new();
    for &(first, last, closed) in FACE_CONTOURS {
        if last >= points.len() {
            continue;
        }
        for i in first..last {
            segments.push((points[i], points[i + 1]));
        }
        if closed {
            segments.push((points[last], points[first]));
        }
    }
    segments
}

/// A 2-D drawing target the overlay renders onto.
pub trait Surface {
    fn size(&self) -> DisplaySize;
    fn match_dimensions(&mut self, size: DisplaySize);
    fn clear(&mut self);
    fn draw_frame(&mut self, frame: &Frame);
    fn stroke_rect(&mut self, rect: &FaceBox, color: Color, thickness: i32);
    fn fill_point(&mut self, at: Point, radius: i32, color: Color);
    fn line(&mut self, from: Point, to: Point, color: Color, thickness: i32);
    fn text(&mut self, at: Point, text: &str, color: Color);
}

/// Clears the surface and redraws the overlay for one frame. Returns the
/// number of faces drawn.
pub fn render_overlay<S: Surface + ?Sized>(
    surface: &mut S,
    frame: &Frame,
    detections: &Detections,
    options: &OverlayOptions,
) -> usize {
    let display = frame.display_size();
    if surface.size() != display {
        surface.match_dimensions(display);
    }
    surface.clear();
    if options.redraw_video {
        surface.draw_frame(frame);
    }

    let faces = resize_results(detections, display);
    for face in &faces {
        match options.style {
            OverlayStyle::Primitives => draw_primitives(surface, face),
            OverlayStyle::Helpers => draw_with_helpers(surface, face, options),
        }
    }
    faces.len()
}

fn draw_primitives<S: Surface + ?Sized>(surface: &mut S, face: &DetectionResult) {
    surface.stroke_rect(&face.bbox, BOX_COLOR, BOX_THICKNESS);

    let Some(points) = face.landmarks.as_deref() else {
        return;
    };
    for (index, point) in points.iter().enumerate() {
        surface.fill_point(*point, POINT_RADIUS, LandmarkRegion::of(index).color());
    }
    for (from, to) in closed_polygon(points) {
        surface.line(from, to, POLYGON_COLOR, 1);
    }
}

fn draw_with_helpers<S: Surface + ?Sized>(
    surface: &mut S,
    face: &DetectionResult,
    options: &OverlayOptions,
) {
    surface.stroke_rect(&face.bbox, HELPER_BOX_COLOR, HELPER_BOX_THICKNESS);
    surface.text(
        Point::new(face.bbox.x, face.bbox.y),
        &format!("{:.2}", face.score),
        HELPER_BOX_COLOR,
    );

    if let Some(points) = face.landmarks.as_deref() {
        for (from, to) in contour_segments(points) {
            surface.line(from, to, HELPER_LINE_COLOR, 1);
        }
        for point in points {
            surface.fill_point(*point, POINT_RADIUS, HELPER_POINT_COLOR);
        }
    }

    if let Some(expressions) = &face.expressions {
        let above = expressions.above(options.min_expression_probability);
        for (row, (expression, probability)) in above.iter().enumerate() {
            let at = Point::new(
                face.bbox.x,
                face.bbox.bottom() + row as f32 * LABEL_LINE_HEIGHT,
            );
            surface.text(at, &format!("{expression} ({probability:.2})"), LABEL_COLOR);
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextLabel {
    pub position: Point,
    pub text: String,
    pub color: Color,
}

/// Transparent RGBA drawing surface. Text is not rasterised; labels are
/// kept for the UI to lay out over the image.
#[derive(Clone, Debug)]
pub struct RgbaCanvas {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
    labels: Vec<TextLabel>,
}

impl RgbaCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
            labels: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn labels(&self) -> &[TextLabel] {
        &self.labels
    }

    pub fn is_blank(&self) -> bool {
        self.labels.is_empty() && self.rgba.iter().all(|&b| b == 0)
    }

    /// Alpha-blends the canvas over a frame of the same size.
    pub fn composite_over(&self, frame: &Frame) -> Vec<u8> {
        let mut out = frame.rgba.clone();
        if frame.width != self.width || frame.height != self.height {
            return out;
        }
        for (dst, src) in out.chunks_exact_mut(4).zip(self.rgba.chunks_exact(4)) {
            let alpha = src[3] as u32;
            if alpha == 0 {
                continue;
            }
            for c in 0..3 {
                dst[c] = ((src[c] as u32 * alpha + dst[c] as u32 * (255 - alpha)) / 255) as u8;
            }
            dst[3] = 255;
        }
        out
    }

    fn put_pixel_safe(&mut self, x: i64, y: i64, color: Color) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        if idx + 3 < self.rgba.len() {
            self.rgba[idx..idx + 4].copy_from_slice(&color);
        }
    }

    fn draw_circle(&mut self, center: Point, radius: i32, color: Color) {
        if !center.x.is_finite() || !center.y.is_finite() {
            return;
        }
        let radius = i64::from(radius.max(0));
        let (cx, cy) = (center.x as i64, center.y as i64);
        if cx + radius < 0
            || cy + radius < 0
            || cx - radius >= i64::from(self.width)
            || cy - radius >= i64::from(self.height)
        {
            return;
        }
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel_safe(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn draw_line(&mut self, p0: Point, p1: Point, color: Color, thickness: i32) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let radius = i64::from((thickness.max(1) - 1) / 2);
        let bounds = ClipBounds {
            min_x: -radius as f64,
            min_y: -radius as f64,
            max_x: (i64::from(self.width) - 1 + radius) as f64,
            max_y: (i64::from(self.height) - 1 + radius) as f64,
        };
        let Some(((fx0, fy0), (fx1, fy1))) = bounds.clip(p0, p1) else {
            return;
        };

        let (mut x0, mut y0) = (fx0 as i64, fy0 as i64);
        let (x1, y1) = (fx1 as i64, fy1 as i64);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.put_pixel_safe(x0, y0, color);
            if radius > 0 {
                for ox in -radius..=radius {
                    for oy in -radius..=radius {
                        if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                            self.put_pixel_safe(x0 + ox, y0 + oy, color);
                        }
                    }
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }
}

/// Inclusive rectangle for Cohen–Sutherland segment clipping.
#[derive(Clone, Copy, Debug)]
struct ClipBounds {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl ClipBounds {
    const LEFT: u8 = 1;
    const RIGHT: u8 = 2;
    const TOP: u8 = 4;
    const BOTTOM: u8 = 8;

    fn outcode(&self, x: f64, y: f64) -> u8 {
        let mut code = 0;
        if x < self.min_x {
            code |= Self::LEFT;
        } else if x > self.max_x {
            code |= Self::RIGHT;
        }
        if y < self.min_y {
            code |= Self::TOP;
        } else if y > self.max_y {
            code |= Self::BOTTOM;
        }
        code
    }

    /// The part of `p0`–`p1` inside the bounds. `None` when the segment
    /// misses them or has a non-finite endpoint.
    fn clip(&self, p0: Point, p1: Point) -> Option<((f64, f64), (f64, f64))> {
        if ![p0.x, p0.y, p1.x, p1.y].iter().all(|v| v.is_finite()) {
            return None;
        }
        let (mut x0, mut y0) = (f64::from(p0.x), f64::from(p0.y));
        let (mut x1, mut y1) = (f64::from(p1.x), f64::from(p1.y));
        let mut c0 = self.outcode(x0, y0);
        let mut c1 = self.outcode(x1, y1);

        // Each pass moves one endpoint onto an edge; rounding can cost a
        // few extra passes but never more than one per edge and endpoint.
        for _ in 0..8 {
            if c0 | c1 == 0 {
                return Some(((x0, y0), (x1, y1)));
            }
            if c0 & c1 != 0 {
                return None;
            }
            let out = if c0 != 0 { c0 } else { c1 };
            let (x, y) = if out & Self::BOTTOM != 0 {
                (x0 + (x1 - x0) * (self.max_y - y0) / (y1 - y0), self.max_y)
            } else if out & Self::TOP != 0 {
                (x0 + (x1 - x0) * (self.min_y - y0) / (y1 - y0), self.min_y)
            } else if out & Self::RIGHT != 0 {
                (self.max_x, y0 + (y1 - y0) * (self.max_x - x0) / (x1 - x0))
            } else {
                (self.min_x, y0 + (y1 - y0) * (self.min_x - x0) / (x1 - x0))
            };
            if out == c0 {
                (x0, y0) = (x, y);
                c0 = self.outcode(x0, y0);
            } else {
                (x1, y1) = (x, y);
                c1 = self.outcode(x1, y1);
            }
        }
        None
    }
}

impl Surface for RgbaCanvas {
    fn size(&self) -> DisplaySize {
        DisplaySize::new(self.width as f32, self.height as f32)
    }

    fn match_dimensions(&mut self, size: DisplaySize) {
        let (width, height) = (size.width.max(0.0) as u32, size.height.max(0.0) as u32);
        if width != self.width || height != self.height {
            *self = RgbaCanvas::new(width, height);
        }
    }

    fn clear(&mut self) {
        self.rgba.fill(0);
        self.labels.clear();
    }

    fn draw_frame(&mut self, frame: &Frame) {
        if frame.width == self.width && frame.height == self.height {
            if frame.rgba.len() == self.rgba.len() {
                self.rgba.copy_from_slice(&frame.rgba);
            }
            return;
        }
        match resize_rgba(frame, self.width, self.height) {
            Ok(resized) => self.rgba = resized,
            Err(err) => log::warn!("failed to scale frame onto overlay canvas: {err}"),
        }
    }

    fn stroke_rect(&mut self, rect: &FaceBox, color: Color, thickness: i32) {
        let (x1, y1, x2, y2) = (rect.x, rect.y, rect.right(), rect.bottom());
        self.draw_line(Point::new(x1, y1), Point::new(x2, y1), color, thickness);
        self.draw_line(Point::new(x2, y1), Point::new(x2, y2), color, thickness);
        self.draw_line(Point::new(x2, y2), Point::new(x1, y2), color, thickness);
        self.draw_line(Point::new(x1, y2), Point::new(x1, y1), color, thickness);
    }

    fn fill_point(&mut self, at: Point, radius: i32, color: Color) {
        self.draw_circle(at, radius, color);
    }

    fn line(&mut self, from: Point, to: Point, color: Color, thickness: i32) {
        self.draw_line(from, to, color, thickness);
    }

    fn text(&mut self, at: Point, text: &str, color: Color) {
        self.labels.push(TextLabel {
            position: at,
            text: text.to_string(),
            color,
        });
    }
}

fn resize_rgba(frame: &Frame, width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }
    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(width, height, fir::PixelType::U8x4);
    fir::Resizer::new().resize(&src_image, &mut dst_image, None)?;
    Ok(dst_image.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Expression, ExpressionScores};
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[derive(Clone, Debug, PartialEq)]
    enum Op {
        Match(DisplaySize),
        Clear,
        Frame,
        Rect(Color),
        Point(Color),
        Line(Color),
        Text(String),
    }

    #[derive(Default)]
    struct RecordingSurface {
        size: Option<DisplaySize>,
        ops: Vec<Op>,
    }

    impl RecordingSurface {
        fn count(&self, pred: impl Fn(&Op) -> bool) -> usize {
            self.ops.iter().filter(|op| pred(op)).count()
        }
    }

    impl Surface for RecordingSurface {
        fn size(&self) -> DisplaySize {
            self.size.unwrap_or(DisplaySize::new(0.0, 0.0))
        }
        fn match_dimensions(&mut self, size: DisplaySize) {
            self.size = Some(size);
            self.ops.push(Op::Match(size));
        }
        fn clear(&mut self) {
            self.ops.push(Op::Clear);
        }
        fn draw_frame(&mut self, _frame: &Frame) {
            self.ops.push(Op::Frame);
        }
        fn stroke_rect(&mut self, _rect: &FaceBox, color: Color, _thickness: i32) {
            self.ops.push(Op::Rect(color));
        }
        fn fill_point(&mut self, _at: Point, _radius: i32, color: Color) {
            self.ops.push(Op::Point(color));
        }
        fn line(&mut self, _from: Point, _to: Point, color: Color, _thickness: i32) {
            self.ops.push(Op::Line(color));
        }
        fn text(&mut self, _at: Point, text: &str, _color: Color) {
            self.ops.push(Op::Text(text.to_string()));
        }
    }

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![40; (width * height * 4) as usize], width, height)
    }

    fn landmarks(n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| Point::new(10.0 + i as f32, 20.0 + (i % 7) as f32))
            .collect()
    }

    fn one_face(working: DisplaySize) -> Detections {
        Detections {
            working_size: working,
            faces: vec![
                DetectionResult::new(FaceBox::new(10.0, 10.0, 40.0, 40.0), 0.9)
                    .with_landmarks(landmarks(68))
                    .with_expressions(ExpressionScores::new(vec![
                        (Expression::Neutral, 0.05),
                        (Expression::Happy, 0.8),
                        (Expression::Sad, 0.15),
                    ])),
            ],
        }
    }

    // ── Rescaling ────────────────────────────────────────────────────

    #[rstest]
    #[case((320.0, 240.0), (640.0, 480.0), (10.0, 20.0, 30.0, 40.0))]
    #[case((320.0, 240.0), (1280.0, 720.0), (5.0, 7.5, 100.0, 60.0))]
    #[case((640.0, 480.0), (320.0, 240.0), (64.0, 48.0, 128.0, 96.0))]
    #[case((100.0, 100.0), (100.0, 100.0), (1.0, 2.0, 3.0, 4.0))]
    fn test_rescaled_box_scales_each_axis(
        #[case] from: (f32, f32),
        #[case] to: (f32, f32),
        #[case] bbox: (f32, f32, f32, f32),
    ) {
        let r1 = DisplaySize::new(from.0, from.1);
        let r2 = DisplaySize::new(to.0, to.1);
        let (x, y, w, h) = bbox;
        let face = DetectionResult::new(FaceBox::new(x, y, w, h), 0.5);

        let out = face.rescaled(r1, r2);
        assert_relative_eq!(out.bbox.x, x * r2.width / r1.width);
        assert_relative_eq!(out.bbox.y, y * r2.height / r1.height);
        assert_relative_eq!(out.bbox.width, w * r2.width / r1.width);
        assert_relative_eq!(out.bbox.height, h * r2.height / r1.height);
    }

    #[test]
    fn test_rescale_moves_landmarks_with_box() {
        let face = DetectionResult::new(FaceBox::new(0.0, 0.0, 1.0, 1.0), 0.5)
            .with_landmarks(vec![Point::new(32.0, 24.0)]);
        let out = face.rescaled(DisplaySize::new(320.0, 240.0), DisplaySize::new(640.0, 720.0));
        let p = out.landmarks.unwrap()[0];
        assert_relative_eq!(p.x, 64.0);
        assert_relative_eq!(p.y, 72.0);
    }

    #[test]
    fn test_rescale_from_empty_size_is_identity() {
        let face = DetectionResult::new(FaceBox::new(3.0, 4.0, 5.0, 6.0), 0.5);
        let out = face.rescaled(DisplaySize::new(0.0, 240.0), DisplaySize::new(640.0, 480.0));
        assert_eq!(out, face);
    }

    #[test]
    fn test_resize_results_uses_working_size() {
        let detections = one_face(DisplaySize::new(320.0, 240.0));
        let out = resize_results(&detections, DisplaySize::new(640.0, 480.0));
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].bbox.x, 20.0);
        assert_relative_eq!(out[0].bbox.width, 80.0);
    }

    // ── Landmark colouring ───────────────────────────────────────────

    #[test]
    fn test_landmark_region_exhaustive() {
        for index in 0..68 {
            let eyes = (36..=41).contains(&index) || (42..=47).contains(&index);
            let nose = (27..=35).contains(&index);
            let mouth = (48..=67).contains(&index);
            let expected = if eyes {
                EYE_COLOR
            } else if nose {
                NOSE_COLOR
            } else if mouth {
                MOUTH_COLOR
            } else {
                DEFAULT_POINT_COLOR
            };
            assert_eq!(LandmarkRegion::of(index).color(), expected, "index {index}");
        }
    }

    #[rstest]
    #[case(0, LandmarkRegion::Other)]
    #[case(26, LandmarkRegion::Other)]
    #[case(27, LandmarkRegion::Nose)]
    #[case(35, LandmarkRegion::Nose)]
    #[case(36, LandmarkRegion::Eye)]
    #[case(47, LandmarkRegion::Eye)]
    #[case(48, LandmarkRegion::Mouth)]
    #[case(67, LandmarkRegion::Mouth)]
    #[case(68, LandmarkRegion::Other)]
    fn test_landmark_region_boundaries(#[case] index: usize, #[case] region: LandmarkRegion) {
        assert_eq!(LandmarkRegion::of(index), region);
    }

    // ── Polygon ──────────────────────────────────────────────────────

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    #[case(5)]
    #[case(68)]
    fn test_closed_polygon_has_one_segment_per_point(#[case] n: usize) {
        let points = landmarks(n);
        let segments = closed_polygon(&points);
        assert_eq!(segments.len(), n);
        if n > 0 {
            assert_eq!(segments[n - 1], (points[n - 1], points[0]));
        }
    }

    #[test]
    fn test_contours_need_full_landmark_set() {
        assert_eq!(contour_segments(&landmarks(68)).len(), 16 + 4 + 4 + 8 + 6 + 6 + 12 + 8);
        assert!(contour_segments(&landmarks(10)).is_empty());
    }

    // ── Rendering ────────────────────────────────────────────────────

    #[test]
    fn test_zero_faces_only_clears() {
        let mut surface = RecordingSurface::default();
        let options = OverlayOptions {
            redraw_video: false,
            ..OverlayOptions::default()
        };
        let drawn = render_overlay(
            &mut surface,
            &frame(64, 48),
            &Detections::empty(DisplaySize::new(320.0, 240.0)),
            &options,
        );
        assert_eq!(drawn, 0);
        assert_eq!(
            surface.ops,
            vec![Op::Match(DisplaySize::new(64.0, 48.0)), Op::Clear]
        );
    }

    #[test]
    fn test_zero_faces_with_video_redraw() {
        let mut surface = RecordingSurface::default();
        render_overlay(
            &mut surface,
            &frame(64, 48),
            &Detections::empty(DisplaySize::new(320.0, 240.0)),
            &OverlayOptions::default(),
        );
        assert_eq!(surface.ops[1..], [Op::Clear, Op::Frame]);
    }

    #[test]
    fn test_primitives_draw_points_and_polygon() {
        let mut surface = RecordingSurface::default();
        render_overlay(
            &mut surface,
            &frame(320, 240),
            &one_face(DisplaySize::new(320.0, 240.0)),
            &OverlayOptions::default(),
        );

        assert_eq!(surface.count(|op| *op == Op::Rect(BOX_COLOR)), 1);
        assert_eq!(surface.count(|op| matches!(op, Op::Point(_))), 68);
        assert_eq!(surface.count(|op| *op == Op::Line(POLYGON_COLOR)), 68);
        assert_eq!(surface.count(|op| *op == Op::Point(EYE_COLOR)), 12);
        assert_eq!(surface.count(|op| *op == Op::Point(NOSE_COLOR)), 9);
        assert_eq!(surface.count(|op| *op == Op::Point(MOUTH_COLOR)), 20);
        assert_eq!(surface.count(|op| matches!(op, Op::Text(_))), 0);
    }

    #[test]
    fn test_helpers_label_score_and_likely_expressions() {
        let mut surface = RecordingSurface::default();
        let options = OverlayOptions {
            style: OverlayStyle::Helpers,
            ..OverlayOptions::default()
        };
        render_overlay(
            &mut surface,
            &frame(320, 240),
            &one_face(DisplaySize::new(320.0, 240.0)),
            &options,
        );

        let texts: Vec<String> = surface
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Text(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["0.90", "happy (0.80)", "sad (0.15)"]);
        assert_eq!(surface.count(|op| *op == Op::Point(HELPER_POINT_COLOR)), 68);
    }

    #[test]
    fn test_canvas_has_no_leftovers_after_empty_frame() {
        let mut canvas = RgbaCanvas::new(0, 0);
        let options = OverlayOptions {
            style: OverlayStyle::Helpers,
            redraw_video: false,
            ..OverlayOptions::default()
        };
        let f = frame(320, 240);

        render_overlay(&mut canvas, &f, &one_face(DisplaySize::new(320.0, 240.0)), &options);
        assert!(!canvas.is_blank());

        render_overlay(&mut canvas, &f, &Detections::empty(DisplaySize::new(320.0, 240.0)), &options);
        assert!(canvas.is_blank());
    }

    #[test]
    fn test_canvas_follows_frame_resolution() {
        let mut canvas = RgbaCanvas::new(0, 0);
        let empty = Detections::empty(DisplaySize::new(320.0, 240.0));
        render_overlay(&mut canvas, &frame(64, 48), &empty, &OverlayOptions::default());
        assert_eq!((canvas.width(), canvas.height()), (64, 48));

        render_overlay(&mut canvas, &frame(32, 16), &empty, &OverlayOptions::default());
        assert_eq!((canvas.width(), canvas.height()), (32, 16));
        assert_eq!(canvas.rgba().len(), 32 * 16 * 4);
        assert_eq!(&canvas.rgba()[..4], &[40, 40, 40, 40]);
    }

    #[test]
    fn test_stroke_rect_paints_outline_only() {
        let mut canvas = RgbaCanvas::new(20, 20);
        canvas.stroke_rect(&FaceBox::new(2.0, 2.0, 10.0, 10.0), BOX_COLOR, 1);
        let px = |x: usize, y: usize| &canvas.rgba()[(y * 20 + x) * 4..(y * 20 + x) * 4 + 4];
        assert_eq!(px(2, 2), &BOX_COLOR);
        assert_eq!(px(12, 7), &BOX_COLOR);
        assert_eq!(px(7, 7), &TRANSPARENT);
    }

    #[test]
    fn test_non_finite_geometry_draws_nothing() {
        let mut canvas = RgbaCanvas::new(64, 48);
        canvas.line(Point::new(-5.0, 0.0), Point::new(f32::INFINITY, 0.0), BOX_COLOR, 1);
        canvas.line(Point::new(f32::NAN, 3.0), Point::new(10.0, 10.0), BOX_COLOR, 3);
        canvas.fill_point(Point::new(f32::NEG_INFINITY, 5.0), POINT_RADIUS, EYE_COLOR);
        canvas.fill_point(Point::new(f32::NAN, f32::NAN), POINT_RADIUS, EYE_COLOR);
        assert!(canvas.is_blank());
    }

    #[test]
    fn test_far_off_canvas_lines_are_clipped() {
        let mut canvas = RgbaCanvas::new(64, 48);
        canvas.line(Point::new(0.0, 0.0), Point::new(2e8, 0.0), BOX_COLOR, 1);
        let px = |c: &RgbaCanvas, x: usize, y: usize| {
            c.rgba()[(y * 64 + x) * 4..(y * 64 + x) * 4 + 4].to_vec()
        };
        assert!((0..64).all(|x| px(&canvas, x, 0) == BOX_COLOR));
        assert_eq!(px(&canvas, 0, 1), TRANSPARENT);

        let mut diagonal = RgbaCanvas::new(64, 48);
        diagonal.line(Point::new(-1e9, -1e9), Point::new(1e9, 1e9), EYE_COLOR, 1);
        assert_eq!(px(&diagonal, 10, 10), EYE_COLOR);
        assert_eq!(px(&diagonal, 47, 47), EYE_COLOR);
        assert_eq!(px(&diagonal, 11, 10), TRANSPARENT);

        let mut outside = RgbaCanvas::new(64, 48);
        outside.line(Point::new(100.0, 100.0), Point::new(3e9, 200.0), BOX_COLOR, 3);
        outside.fill_point(Point::new(-1e9, 20.0), POINT_RADIUS, BOX_COLOR);
        assert!(outside.is_blank());
    }

    #[test]
    fn test_composite_over_blends_opaque_and_skips_transparent() {
        let mut canvas = RgbaCanvas::new(2, 1);
        canvas.fill_point(Point::new(0.0, 0.0), 0, [255, 0, 0, 255]);
        let base = Frame::new(vec![10, 20, 30, 255, 10, 20, 30, 255], 2, 1);
        let out = canvas.composite_over(&base);
        assert_eq!(out, vec![255, 0, 0, 255, 10, 20, 30, 255]);
    }
}
