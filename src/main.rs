mod config;
mod error;
mod models;
mod pipeline;
mod server;
mod session;
mod status;
mod types;
mod ui;

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

use config::{
    DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH, DEFAULT_DETECT_INTERVAL, DEFAULT_MODELS_BASE,
    DEFAULT_SERVER_ADDR, ServerConfig, TrackerConfig,
};
use pipeline::{DetectSchedule, OverlayStyle};
use server::StaticServer;

/// Live webcam face tracking with landmark and expression overlay.
#[derive(Parser)]
#[command(name = "face-tracking", version, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    track: TrackArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Open the tracking window (default).
    Track(TrackArgs),
    /// Serve the page shell and model files over HTTP.
    Serve(ServeArgs),
    /// List capture devices.
    Cameras,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StyleArg {
    Primitives,
    Helpers,
}

#[derive(Args, Clone, Debug)]
struct TrackArgs {
    /// Camera index as listed by `cameras`.
    #[arg(long, default_value_t = 0)]
    camera: u32,

    #[arg(long, default_value_t = DEFAULT_CAPTURE_WIDTH)]
    width: u32,

    #[arg(long, default_value_t = DEFAULT_CAPTURE_HEIGHT)]
    height: u32,

    /// Model base: local directory or http(s) URL prefix.
    #[arg(long, default_value = DEFAULT_MODELS_BASE)]
    models: String,

    /// Download target when --models is a URL.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Detection interval in milliseconds.
    #[arg(long, default_value_t = DEFAULT_DETECT_INTERVAL.as_millis() as u64)]
    interval_ms: u64,

    /// Detect on every delivered frame instead of on a timer.
    #[arg(long)]
    per_frame: bool,

    #[arg(long, value_enum, default_value_t = StyleArg::Primitives)]
    style: StyleArg,

    /// Draw only the overlay instead of copying the video into the canvas first.
    #[arg(long)]
    no_redraw_video: bool,

    #[arg(long)]
    no_landmarks: bool,

    #[arg(long)]
    no_expressions: bool,

    /// Minimum face score (0.0-1.0).
    #[arg(long, default_value_t = 0.5)]
    score_threshold: f32,
}

#[derive(Args, Clone, Debug)]
struct ServeArgs {
    #[arg(long, default_value = DEFAULT_SERVER_ADDR)]
    addr: SocketAddr,

    /// HTML document served at `/`.
    #[arg(long, default_value = "index.html")]
    shell: PathBuf,

    #[arg(long, default_value = DEFAULT_MODELS_BASE)]
    models_dir: PathBuf,

    /// Serve the shell for unknown paths instead of 404.
    #[arg(long)]
    spa_fallback: bool,
}

impl TrackArgs {
    fn to_config(&self) -> TrackerConfig {
        let mut cfg = TrackerConfig::default();
        cfg.capture.camera_index = self.camera;
        cfg.capture.width = self.width;
        cfg.capture.height = self.height;
        cfg.models_base = self.models.clone();
        cfg.cache_dir = self
            .cache_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_BASE));
        cfg.schedule = if self.per_frame {
            DetectSchedule::PerFrame
        } else {
            DetectSchedule::Interval(Duration::from_millis(self.interval_ms.max(1)))
        };
        cfg.detect.with_landmarks = !self.no_landmarks;
        cfg.detect.with_expressions = !self.no_expressions;
        cfg.detect.score_threshold = self.score_threshold;
        cfg.overlay.style = match self.style {
            StyleArg::Primitives => OverlayStyle::Primitives,
            StyleArg::Helpers => OverlayStyle::Helpers,
        };
        cfg.overlay.redraw_video = !self.no_redraw_video;
        cfg
    }
}

impl ServeArgs {
    fn to_config(&self) -> ServerConfig {
        ServerConfig {
            addr: self.addr,
            shell_path: self.shell.clone(),
            models_dir: self.models_dir.clone(),
            spa_fallback: self.spa_fallback,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        None => run_tracker(cli.track.to_config()),
        Some(Command::Track(args)) => run_tracker(args.to_config()),
        Some(Command::Serve(args)) => run_server(args.to_config()),
        Some(Command::Cameras) => list_cameras(),
    }
}

fn run_server(cfg: ServerConfig) -> Result<()> {
    let handle = StaticServer::new(cfg).spawn()?;
    println!("Server running at http://{}", handle.addr);
    handle.wait()
}

#[cfg(feature = "camera-nokhwa")]
fn run_tracker(config: TrackerConfig) -> Result<()> {
    use gpui::Application;

    log::info!(
        "tracking camera {} at {}x{}, models from {}",
        config.capture.camera_index,
        config.capture.width,
        config.capture.height,
        config.models_base
    );

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, config, pipeline::NokhwaBackend) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn run_tracker(_config: TrackerConfig) -> Result<()> {
    anyhow::bail!("built without camera support; enable the `camera-nokhwa` feature")
}

#[cfg(feature = "camera-nokhwa")]
fn list_cameras() -> Result<()> {
    let cameras = pipeline::available_cameras()?;
    if cameras.is_empty() {
        println!("No cameras found");
    }
    for camera in cameras {
        println!("{}: {}", camera.index, camera.label);
    }
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn list_cameras() -> Result<()> {
    anyhow::bail!("built without camera support; enable the `camera-nokhwa` feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_invocation_tracks_with_defaults() {
        let cli = Cli::try_parse_from(["face-tracking"]).unwrap();
        assert!(cli.command.is_none());

        let cfg = cli.track.to_config();
        assert_eq!((cfg.capture.width, cfg.capture.height), (640, 480));
        assert_eq!(cfg.schedule, DetectSchedule::Interval(DEFAULT_DETECT_INTERVAL));
        assert_eq!(cfg.overlay.style, OverlayStyle::Primitives);
        assert!(cfg.overlay.redraw_video);
    }

    #[test]
    fn test_track_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "face-tracking",
            "track",
            "--per-frame",
            "--style",
            "helpers",
            "--no-expressions",
            "--models",
            "https://example.com/models",
        ])
        .unwrap();
        let Some(Command::Track(args)) = cli.command else {
            panic!("expected track subcommand");
        };

        let cfg = args.to_config();
        assert_eq!(cfg.schedule, DetectSchedule::PerFrame);
        assert_eq!(cfg.overlay.style, OverlayStyle::Helpers);
        assert!(cfg.detect.with_landmarks);
        assert!(!cfg.detect.with_expressions);
        assert_eq!(cfg.models_base, "https://example.com/models");
    }

    #[test]
    fn test_interval_flag_sets_timer() {
        let cli = Cli::try_parse_from(["face-tracking", "--interval-ms", "250"]).unwrap();
        let cfg = cli.track.to_config();
        assert_eq!(cfg.schedule, DetectSchedule::Interval(Duration::from_millis(250)));
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["face-tracking", "serve", "--spa-fallback"]).unwrap();
        let Some(Command::Serve(args)) = cli.command else {
            panic!("expected serve subcommand");
        };
        let cfg = args.to_config();
        assert_eq!(cfg.addr.to_string(), "127.0.0.1:3000");
        assert!(cfg.spa_fallback);
    }
}
