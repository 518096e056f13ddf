use gpui::{AnyElement, Context, IntoElement, ParentElement, Styled, div};
use gpui_component::{ActiveTheme, StyledExt, h_flex, tag::Tag, v_flex};

use super::AppView;
use crate::models::ModelLoadEvent;

impl AppView {
    pub(super) fn apply_model_event(&mut self, event: ModelLoadEvent) {
        match event {
            ModelLoadEvent::AlreadyPresent { bundle } | ModelLoadEvent::Finished { bundle } => {
                self.loading.bundle = Some(bundle.to_string());
                self.loading.downloaded = 0;
                self.loading.total = None;
            }
            ModelLoadEvent::Started { bundle, total } => {
                self.loading.bundle = Some(bundle.to_string());
                self.loading.downloaded = 0;
                self.loading.total = total;
            }
            ModelLoadEvent::Progress {
                bundle,
                downloaded,
                total,
            } => {
                self.loading.bundle = Some(bundle.to_string());
                self.loading.downloaded = downloaded;
                self.loading.total = total;
            }
        }
    }

    pub(super) fn render_loading(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();
        let status = self.status.get();

        let (status_icon, status_color) = if status.is_failed() {
            ("✗", theme.accent)
        } else {
            ("⟳", theme.foreground)
        };

        let mut container = v_flex()
            .gap_3()
            .p_6()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                h_flex().gap_2().items_center().child(
                    div()
                        .text_color(status_color)
                        .font_semibold()
                        .child(format!("{status_icon} {status}")),
                ),
            );

        if let Some(bundle) = &self.loading.bundle {
            if !status.is_failed() {
                container = container
                    .child(
                        div()
                            .px_3()
                            .py_2()
                            .rounded_md()
                            .border_1()
                            .border_color(theme.border)
                            .bg(theme.muted)
                            .font_family(theme.mono_font_family.clone())
                            .text_color(theme.foreground)
                            .child(progress_bar_string(self.loading.downloaded, self.loading.total)),
                    )
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.muted_foreground)
                            .child(format!("model: {bundle}")),
                    );
            }
        }

        if status.is_failed() && self.init_finished {
            container = container.child(
                Tag::danger()
                    .rounded_full()
                    .child("Initialization failed, see log for details"),
            );
        }

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(container)
            .into_any_element()
    }
}

fn progress_bar_string(downloaded: u64, total: Option<u64>) -> String {
    const BAR_LEN: usize = 30;
    match total {
        Some(total) if total > 0 => {
            let pct = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
            let filled = ((pct * BAR_LEN as f64).round() as usize).min(BAR_LEN);
            format!(
                "[{}{}] {:>5.1}%",
                "=".repeat(filled),
                " ".repeat(BAR_LEN - filled),
                pct * 100.0
            )
        }
        _ => format!("[{}] {} KB", "-".repeat(BAR_LEN), downloaded / 1024),
    }
}

#[cfg(test)]
mod tests {
    use super::progress_bar_string;

    #[test]
    fn test_progress_bar_known_total() {
        let bar = progress_bar_string(50, Some(100));
        assert_eq!(bar, format!("[{}{}]  50.0%", "=".repeat(15), " ".repeat(15)));
    }

    #[test]
    fn test_progress_bar_unknown_total() {
        assert!(progress_bar_string(4096, None).ends_with("4 KB"));
    }
}
