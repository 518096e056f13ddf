use std::sync::Arc;

use gpui::{
    AnyElement, Context, IntoElement, ObjectFit, ParentElement, RenderImage, Styled, StyledImage,
    Window, div, img, px,
};
use gpui_component::{ActiveTheme, h_flex, v_flex};

use super::{
    AppView, DEFAULT_CAMERA_RATIO, VIEW_MAX_WIDTH, VIEW_MIN_WIDTH,
    render_util::{compose, overlay_source, rgba_to_image},
};
use crate::{pipeline::render_overlay, types::Detections};

impl AppView {
    pub(super) fn render_main(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let mut fresh = false;
        while let Ok(result) = self.result_rx.try_recv() {
            if self.gate.accept(&result) {
                self.latest_result = Some(result);
                fresh = true;
            }
        }

        let mut newest = None;
        while let Ok(frame) = self.frame_rx.try_recv() {
            newest = Some(frame);
        }

        let video_on_canvas = self.config.overlay.redraw_video;
        let image = match overlay_source(
            newest.as_ref(),
            self.latest_result.as_ref(),
            fresh,
            video_on_canvas,
        ) {
            Some((frame, detections)) => {
                let empty = Detections::empty(frame.display_size());
                render_overlay(
                    &mut self.canvas,
                    frame,
                    detections.unwrap_or(&empty),
                    &self.config.overlay,
                );
                let rgba = compose(&self.canvas, frame, video_on_canvas);
                rgba_to_image(rgba, frame.width, frame.height)
            }
            None => None,
        };
        if let Some(image) = image {
            self.replace_latest_image(image, window, cx);
        }
        if let Some(frame) = newest {
            self.latest_frame = Some(frame);
        }

        let ratio = self.camera_aspect_ratio();
        let view_width = (f32::from(window.viewport_size().width) - 32.0)
            .clamp(VIEW_MIN_WIDTH, VIEW_MAX_WIDTH);
        let view_height = view_width / ratio;

        let frame_view: AnyElement = if let Some(image) = &self.latest_image {
            img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element()
        } else {
            div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child("Waiting for camera...")
                .into_any_element()
        };

        let theme = cx.theme();
        let frame_status = self
            .latest_frame
            .as_ref()
            .map(|f| format!("{}x{}", f.width, f.height))
            .unwrap_or_else(|| "--".to_string());

        let mut labels = v_flex().gap_1();
        for label in self.canvas.labels() {
            let [r, g, b, _] = label.color;
            labels = labels.child(
                div()
                    .text_xs()
                    .text_color(gpui::rgb(u32::from_be_bytes([0, r, g, b])))
                    .child(format!(
                        "({:.0}, {:.0}) {}",
                        label.position.x, label.position.y, label.text
                    )),
            );
        }

        v_flex()
            .size_full()
            .gap_3()
            .p_4()
            .items_center()
            .bg(gpui::rgb(0x1a2332))
            .child(
                div()
                    .w(px(view_width))
                    .h(px(view_height))
                    .overflow_hidden()
                    .rounded_lg()
                    .bg(gpui::rgb(0x000000))
                    .child(frame_view),
            )
            .child(
                h_flex()
                    .w(px(view_width))
                    .justify_between()
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.foreground)
                            .child(self.status.text()),
                    )
                    .child(
                        div()
                            .text_xs()
                            .text_color(theme.muted_foreground)
                            .child(frame_status),
                    ),
            )
            .child(div().w(px(view_width)).child(labels))
            .into_any_element()
    }

    fn camera_aspect_ratio(&self) -> f32 {
        if let Some(frame) = &self.latest_frame {
            if frame.height > 0 {
                return frame.width as f32 / frame.height as f32;
            }
        }
        DEFAULT_CAMERA_RATIO
    }

    fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // The sprite atlas keeps every frame's texture until it is dropped explicitly.
            cx.drop_image(old_image, Some(window));
        }
    }
}
