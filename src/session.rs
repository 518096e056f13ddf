use crossbeam_channel::{Sender, bounded};

use crate::{
    config::TrackerConfig,
    error::{ModelLoadError, TrackerError},
    models::{ModelLoadEvent, ModelSet, ModelStore, load_models},
    pipeline::{
        CameraBackend, CameraStream, DetectOptions, DetectionLoop, FaceDetector,
        start_camera_stream, start_detection_loop,
    },
    status::{Stage, Status, StatusReporter},
    types::{DisplaySize, Frame, FrameDetections},
};

/// Where a running session delivers its output.
pub struct SessionChannels {
    /// Every captured frame, for display. Dropped when the consumer is busy.
    pub frames: Sender<Frame>,
    /// Completed detections, in increasing `seq` order.
    pub results: Sender<FrameDetections>,
}

/// A running tracker: camera capture feeding the detection loop. Dropping
/// it stops detection first, then releases the camera.
pub struct TrackerSession {
    detection: Option<DetectionLoop>,
    camera: Option<CameraStream>,
    display_size: DisplaySize,
}

impl TrackerSession {
    /// Acquires the camera, loads every model the options need and starts
    /// detecting. Blocks until tracking has started or initialization has
    /// failed; a failure is also reported through `status`.
    pub fn start<B, D, F>(
        config: &TrackerConfig,
        backend: B,
        store: &dyn ModelStore,
        build_detector: F,
        status: &StatusReporter,
        channels: SessionChannels,
        on_model_event: &mut dyn FnMut(ModelLoadEvent),
    ) -> Result<Self, TrackerError>
    where
        B: CameraBackend,
        D: FaceDetector,
        F: FnOnce(&ModelSet, &DetectOptions) -> Result<D, ModelLoadError>,
    {
        status.set(Status::Initializing(Stage::Starting));
        let result = Self::initialize(
            config,
            backend,
            store,
            build_detector,
            status,
            channels,
            on_model_event,
        );
        if let Err(err) = &result {
            log::error!("{err}");
            status.set(Status::Failed(err.to_string()));
        }
        result
    }

    fn initialize<B, D, F>(
        config: &TrackerConfig,
        backend: B,
        store: &dyn ModelStore,
        build_detector: F,
        status: &StatusReporter,
        channels: SessionChannels,
        on_model_event: &mut dyn FnMut(ModelLoadEvent),
    ) -> Result<Self, TrackerError>
    where
        B: CameraBackend,
        D: FaceDetector,
        F: FnOnce(&ModelSet, &DetectOptions) -> Result<D, ModelLoadError>,
    {
        status.set(Status::Initializing(Stage::SettingUpCamera));
        let (detect_tx, detect_rx) = bounded::<Frame>(1);
        let camera = start_camera_stream(backend, config.capture.clone(), channels.frames, detect_tx)?;
        let display_size = camera.display_size();

        // The camera is released by drop if anything below fails.
        status.set(Status::Initializing(Stage::LoadingModels));
        let models = load_models(store, &config.detect.required_bundles(), on_model_event)?;
        let detector = build_detector(&models, &config.detect)?;

        status.set(Status::Initializing(Stage::StartingDetection));
        let detection = start_detection_loop(
            detector,
            config.schedule,
            config.detect.clone(),
            detect_rx,
            channels.results,
            status.clone(),
        );
        log::info!(
            "tracking started at {}x{}",
            display_size.width,
            display_size.height
        );

        Ok(Self {
            detection: Some(detection),
            camera: Some(camera),
            display_size,
        })
    }

    /// Size of the frames the camera actually delivers.
    pub fn display_size(&self) -> DisplaySize {
        self.display_size
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(mut detection) = self.detection.take() {
            detection.signal_stop();
            detection.stop();
        }
        if let Some(camera) = self.camera.take() {
            camera.stop();
        }
    }
}

impl Drop for TrackerSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
