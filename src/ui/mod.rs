use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use gpui::{
    App, AppContext, Context, Render, RenderImage, TitlebarOptions, Window, WindowOptions,
};
use gpui_component::Root;

use crate::{
    config::TrackerConfig,
    models::{ModelLoadEvent, ModelSource, store_for},
    pipeline::{CameraBackend, LatestResult, OrtFaceDetector, RgbaCanvas},
    session::{SessionChannels, TrackerSession},
    status::StatusReporter,
    types::{Frame, FrameDetections},
};

mod loading;
mod main_view;
mod render_util;

const DEFAULT_CAMERA_RATIO: f32 = 4.0 / 3.0;
const VIEW_MIN_WIDTH: f32 = 320.0;
const VIEW_MAX_WIDTH: f32 = 960.0;

pub fn launch_ui<B: CameraBackend>(
    app: &mut App,
    config: TrackerConfig,
    backend: B,
) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Face Tracking".into()),
            appears_transparent: false,
            traffic_light_position: None,
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| AppView::new(config, backend));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

/// Messages from the initialization thread.
enum InitMessage {
    Model(ModelLoadEvent),
    Started(TrackerSession),
    Failed,
}

struct LoadingState {
    bundle: Option<String>,
    downloaded: u64,
    total: Option<u64>,
}

struct AppView {
    config: TrackerConfig,
    status: StatusReporter,
    init_rx: Receiver<InitMessage>,
    frame_rx: Receiver<Frame>,
    result_rx: Receiver<FrameDetections>,
    session: Option<TrackerSession>,
    init_finished: bool,
    loading: LoadingState,
    gate: LatestResult,
    latest_frame: Option<Frame>,
    latest_result: Option<FrameDetections>,
    canvas: RgbaCanvas,
    latest_image: Option<Arc<RenderImage>>,
}

impl AppView {
    fn new<B: CameraBackend>(config: TrackerConfig, backend: B) -> Self {
        let status = StatusReporter::new();
        let (frame_tx, frame_rx) = bounded(1);
        let (result_tx, result_rx) = bounded(4);
        let (init_tx, init_rx) = unbounded();

        spawn_initialization(
            config.clone(),
            backend,
            status.clone(),
            SessionChannels {
                frames: frame_tx,
                results: result_tx,
            },
            init_tx,
        );

        Self {
            config,
            status,
            init_rx,
            frame_rx,
            result_rx,
            session: None,
            init_finished: false,
            loading: LoadingState {
                bundle: None,
                downloaded: 0,
                total: None,
            },
            gate: LatestResult::default(),
            latest_frame: None,
            latest_result: None,
            canvas: RgbaCanvas::new(0, 0),
            latest_image: None,
        }
    }

    fn poll_init(&mut self) {
        while let Ok(msg) = self.init_rx.try_recv() {
            match msg {
                InitMessage::Model(event) => self.apply_model_event(event),
                InitMessage::Started(session) => {
                    self.session = Some(session);
                    self.init_finished = true;
                }
                InitMessage::Failed => self.init_finished = true,
            }
        }
    }
}

fn spawn_initialization<B: CameraBackend>(
    config: TrackerConfig,
    backend: B,
    status: StatusReporter,
    channels: SessionChannels,
    tx: Sender<InitMessage>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let source = ModelSource::parse(&config.models_base);
        let store = store_for(&source, &config.cache_dir);
        let events_tx = tx.clone();

        let started = TrackerSession::start(
            &config,
            backend,
            store.as_ref(),
            OrtFaceDetector::new,
            &status,
            channels,
            &mut |event| {
                let _ = events_tx.send(InitMessage::Model(event));
            },
        );

        // The session logs and reports its own failure.
        let msg = match started {
            Ok(session) => InitMessage::Started(session),
            Err(_) => InitMessage::Failed,
        };
        let _ = tx.send(msg);
    })
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        self.poll_init();
        if self.session.is_some() {
            self.render_main(window, cx)
        } else {
            self.render_loading(cx)
        }
    }
}
