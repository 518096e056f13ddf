use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use crossbeam_channel::{Sender, bounded};

use crate::{
    error::CameraError,
    types::{DisplaySize, Frame},
};

/// Video-only capture request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureRequest {
    pub camera_index: u32,
    pub width: u32,
    pub height: u32,
}

/// A live hardware video track.
pub trait VideoTrack {
    fn read_frame(&mut self) -> Result<Frame, CameraError>;
    fn stop(&mut self);
}

/// Opens tracks. `open` runs on the capture thread, so tracks themselves need
/// not be `Send`.
pub trait CameraBackend: Send + 'static {
    type Track: VideoTrack;

    fn open(&self, request: &CaptureRequest) -> Result<Self::Track, CameraError>;
}

/// Scoped handle over a running capture thread. Stopping or dropping it joins
/// the thread, which stops the hardware track before exiting.
#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    display_size: DisplaySize,
}

impl CameraStream {
    /// Native resolution of the first delivered frame.
    pub fn display_size(&self) -> DisplaySize {
        self.display_size
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Starts capturing and blocks until the first frame arrives or the camera
/// fails to open. There is no timeout.
pub fn start_camera_stream<B: CameraBackend>(
    backend: B,
    request: CaptureRequest,
    ui_tx: Sender<Frame>,
    detect_tx: Sender<Frame>,
) -> Result<CameraStream, CameraError> {
    let (ready_tx, ready_rx) = bounded::<Result<DisplaySize, CameraError>>(1);
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        let mut track = match backend.open(&request) {
            Ok(track) => track,
            Err(err) => {
                let _ = ready_tx.send(Err(err));
                return;
            }
        };

        let first = match track.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("camera produced no first frame: {err}");
                track.stop();
                let _ = ready_tx.send(Err(err));
                return;
            }
        };
        log::info!(
            "camera {} streaming at {}x{}",
            request.camera_index,
            first.width,
            first.height
        );
        let _ = ready_tx.send(Ok(first.display_size()));
        forward(first, &ui_tx, &detect_tx);

        while !stop_flag.load(Ordering::Relaxed) {
            match track.read_frame() {
                Ok(frame) => forward(frame, &ui_tx, &detect_tx),
                Err(err) => log::warn!("camera frame read failed: {err}"),
            }
        }

        track.stop();
        log::info!("camera {} released", request.camera_index);
    });

    let ready = ready_rx.recv().unwrap_or(Err(CameraError::NoFrames));
    match ready {
        Ok(display_size) => Ok(CameraStream {
            stop,
            handle: Some(handle),
            display_size,
        }),
        Err(err) => {
            let _ = handle.join();
            Err(err)
        }
    }
}

fn forward(frame: Frame, ui_tx: &Sender<Frame>, detect_tx: &Sender<Frame>) {
    // Either consumer may be busy; a full queue just drops this frame for it.
    let _ = detect_tx.try_send(frame.clone());
    let _ = ui_tx.try_send(frame);
}

#[cfg(feature = "camera-nokhwa")]
pub use self::native::{CameraDevice, NokhwaBackend, available_cameras};

#[cfg(feature = "camera-nokhwa")]
mod native {
    use nokhwa::{
        Camera,
        pixel_format::RgbFormat,
        query,
        utils::{
            ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
            RequestedFormatType, Resolution,
        },
    };

    use super::{CameraBackend, CaptureRequest, VideoTrack};
    use crate::{error::CameraError, pipeline::rgba_converter, types::Frame};

    // Formats macOS built-in cameras accept reliably come first; YUYV is often
    // advertised and then rejected.
    const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
        FrameFormat::RAWRGB,
        FrameFormat::RAWBGR,
        FrameFormat::GRAY,
        FrameFormat::YUYV,
        FrameFormat::NV12,
        FrameFormat::MJPEG,
    ];

    fn requested_formats(request: &CaptureRequest) -> [RequestedFormat<'static>; 4] {
        let target = Resolution::new(request.width, request.height);
        [
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
                target,
                FrameFormat::MJPEG,
                30,
            ))),
            RequestedFormat::with_formats(
                RequestedFormatType::HighestFrameRate(30),
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    #[derive(Clone, Debug)]
    pub struct CameraDevice {
        pub index: u32,
        pub label: String,
    }

    pub fn available_cameras() -> Result<Vec<CameraDevice>, CameraError> {
        let cameras = query(ApiBackend::Auto).map_err(|e| CameraError::Open(e.to_string()))?;
        Ok(cameras
            .iter()
            .enumerate()
            .map(|(pos, info)| CameraDevice {
                index: device_index(info).unwrap_or(pos as u32),
                label: info.human_name(),
            })
            .collect())
    }

    fn device_index(info: &CameraInfo) -> Option<u32> {
        match info.index() {
            CameraIndex::Index(idx) => Some(*idx),
            CameraIndex::String(_) => None,
        }
    }

    #[derive(Clone, Debug, Default)]
    pub struct NokhwaBackend;

    impl CameraBackend for NokhwaBackend {
        type Track = NokhwaTrack;

        fn open(&self, request: &CaptureRequest) -> Result<NokhwaTrack, CameraError> {
            let index = CameraIndex::Index(request.camera_index);
            let mut last_err = None;

            for requested in requested_formats(request) {
                match Camera::new(index.clone(), requested) {
                    Ok(mut camera) => match camera.open_stream() {
                        Ok(()) => return Ok(NokhwaTrack { camera }),
                        Err(err) => last_err = Some(err.to_string()),
                    },
                    Err(err) => last_err = Some(err.to_string()),
                }
            }

            match last_err {
                Some(message) => Err(CameraError::Open(message)),
                None => Err(CameraError::NoDevice),
            }
        }
    }

    pub struct NokhwaTrack {
        camera: Camera,
    }

    impl VideoTrack for NokhwaTrack {
        fn read_frame(&mut self) -> Result<Frame, CameraError> {
            let buffer = self
                .camera
                .frame()
                .map_err(|e| CameraError::Read(e.to_string()))?;
            rgba_converter::convert_camera_frame(&buffer)
                .map_err(|e| CameraError::Read(format!("{e:#}")))
        }

        fn stop(&mut self) {
            if let Err(err) = self.camera.stop_stream() {
                log::warn!("failed to stop camera stream: {err}");
            }
        }
    }
}
