use std::{net::SocketAddr, path::PathBuf, time::Duration};

use crate::pipeline::{CaptureRequest, DetectOptions, DetectSchedule, OverlayOptions};

pub const DEFAULT_CAPTURE_WIDTH: u32 = 640;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
pub const DEFAULT_DETECT_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MODELS_BASE: &str = "models";
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:3000";

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub capture: CaptureRequest,
    /// URL prefix (`http://`, `https://`) or local directory holding the bundles.
    pub models_base: String,
    /// Download target when `models_base` is a URL prefix.
    pub cache_dir: PathBuf,
    pub schedule: DetectSchedule,
    pub detect: DetectOptions,
    pub overlay: OverlayOptions,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            capture: CaptureRequest {
                camera_index: 0,
                width: DEFAULT_CAPTURE_WIDTH,
                height: DEFAULT_CAPTURE_HEIGHT,
            },
            models_base: DEFAULT_MODELS_BASE.to_string(),
            cache_dir: PathBuf::from(DEFAULT_MODELS_BASE),
            schedule: DetectSchedule::Interval(DEFAULT_DETECT_INTERVAL),
            detect: DetectOptions::default(),
            overlay: OverlayOptions::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub shell_path: PathBuf,
    pub models_dir: PathBuf,
    /// Serve the shell document for unmatched paths instead of 404.
    pub spa_fallback: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            shell_path: PathBuf::from("index.html"),
            models_dir: PathBuf::from(DEFAULT_MODELS_BASE),
            spa_fallback: false,
        }
    }
}
