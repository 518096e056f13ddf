use std::sync::Arc;

use gpui::RenderImage;
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    pipeline::RgbaCanvas,
    types::{Detections, Frame, FrameDetections},
};

/// Final RGBA pixels for display: the canvas itself when it already holds
/// the video, otherwise the canvas blended over the frame.
pub(super) fn compose(canvas: &RgbaCanvas, frame: &Frame, video_on_canvas: bool) -> Vec<u8> {
    if video_on_canvas && canvas.width() == frame.width && canvas.height() == frame.height {
        canvas.rgba().to_vec()
    } else {
        canvas.composite_over(frame)
    }
}

/// Frame and detections to draw this refresh, or `None` to keep the current
/// image. With the video on the canvas, the picture only advances when a new
/// result arrives and shows the frame that result was computed on, so boxes
/// stay aligned with the faces. Until the first result, live frames are shown
/// bare.
pub(super) fn overlay_source<'a>(
    live: Option<&'a Frame>,
    latest: Option<&'a FrameDetections>,
    fresh: bool,
    video_on_canvas: bool,
) -> Option<(&'a Frame, Option<&'a Detections>)> {
    if video_on_canvas {
        match latest {
            Some(result) if fresh => Some((&result.frame, Some(&result.detections))),
            Some(_) => None,
            None => live.map(|frame| (frame, None)),
        }
    } else {
        live.map(|frame| (frame, latest.map(|r| &r.detections)))
    }
}

pub(super) fn rgba_to_image(mut rgba: Vec<u8>, width: u32, height: u32) -> Option<Arc<RenderImage>> {
    // GPUI expects BGRA; convert in place to avoid the async asset pipeline and flicker.
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, rgba)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Surface;
    use crate::types::{DisplaySize, Point};

    fn result(seq: u64, width: u32) -> FrameDetections {
        FrameDetections {
            seq,
            frame: Frame::new(vec![0; (width * 4) as usize], width, 1),
            detections: Detections::empty(DisplaySize::new(320.0, 240.0)),
        }
    }

    #[test]
    fn test_compose_blends_when_video_not_on_canvas() {
        let mut canvas = RgbaCanvas::new(2, 1);
        canvas.fill_point(Point::new(1.0, 0.0), 0, [0, 255, 0, 255]);
        let frame = Frame::new(vec![9, 9, 9, 255, 9, 9, 9, 255], 2, 1);

        assert_eq!(compose(&canvas, &frame, false), vec![9, 9, 9, 255, 0, 255, 0, 255]);
        assert_eq!(compose(&canvas, &frame, true), vec![0, 0, 0, 0, 0, 255, 0, 255]);
    }

    #[test]
    fn test_video_on_canvas_shows_the_detected_frame() {
        let live = Frame::new(vec![0; 8], 2, 1);
        let latest = result(3, 5);

        let (frame, detections) = overlay_source(Some(&live), Some(&latest), true, true).unwrap();
        assert_eq!(frame.width, 5);
        assert!(detections.is_some());

        assert!(overlay_source(Some(&live), Some(&latest), false, true).is_none());

        let (frame, detections) = overlay_source(Some(&live), None, false, true).unwrap();
        assert_eq!(frame.width, 2);
        assert!(detections.is_none());
    }

    #[test]
    fn test_overlay_only_follows_live_frames() {
        let live = Frame::new(vec![0; 8], 2, 1);
        let latest = result(1, 5);

        let (frame, detections) = overlay_source(Some(&live), Some(&latest), false, false).unwrap();
        assert_eq!(frame.width, 2);
        assert!(detections.is_some());
        assert!(overlay_source(None, Some(&latest), true, false).is_none());
    }
}
