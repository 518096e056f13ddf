use std::path::PathBuf;

use thiserror::Error;

use crate::models::ModelBundle;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera device found")]
    NoDevice,
    #[error("{0}")]
    Open(String),
    #[error("camera stream ended before delivering a frame")]
    NoFrames,
    #[error("frame read failed: {0}")]
    Read(String),
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model {bundle} not found at {path}")]
    Missing { bundle: ModelBundle, path: PathBuf },
    #[error("download of model {bundle} from {url} failed: {source}")]
    Download {
        bundle: ModelBundle,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model {bundle} to {path}: {source}")]
    Io {
        bundle: ModelBundle,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to initialise model {bundle}: {message}")]
    Session {
        bundle: ModelBundle,
        message: String,
    },
}

/// Terminal initialization failures. The display text is what the status
/// line shows.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Error accessing camera: {0}")]
    CameraAcquisition(#[from] CameraError),
    #[error("Error: {0}")]
    ModelLoad(#[from] ModelLoadError),
}
