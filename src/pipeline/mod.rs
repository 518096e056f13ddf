pub mod camera;
pub mod detection_loop;
pub mod detector;
pub mod overlay;
pub mod rgba_converter;

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraDevice, NokhwaBackend, available_cameras};
pub use camera::{CameraBackend, CameraStream, CaptureRequest, VideoTrack, start_camera_stream};
pub use detection_loop::{DetectSchedule, DetectionLoop, LatestResult, start_detection_loop};
pub use detector::{DetectOptions, FaceDetector, OrtFaceDetector};
pub use overlay::{OverlayOptions, OverlayStyle, RgbaCanvas, Surface, render_overlay};
