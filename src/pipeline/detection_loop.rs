use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, select, tick};

use super::detector::{DetectOptions, FaceDetector};
use crate::{
    status::{Status, StatusReporter},
    types::{Frame, FrameDetections},
};

/// When detection runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectSchedule {
    /// Once per tick, on the newest frame. A tick that fires while a
    /// detection is still running is skipped.
    Interval(Duration),
    /// Once per delivered frame, skipping frames that queued up meanwhile.
    PerFrame,
}

/// Handle over the running detection thread. Results carry increasing
/// sequence numbers; nothing is published once stopping has begun.
pub struct DetectionLoop {
    stopping: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DetectionLoop {
    /// Marks the loop as stopping without waiting for it. An in-flight
    /// detection finishes but its result is discarded.
    pub fn signal_stop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.stop_tx.take();
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Starts detecting on `frame_rx` with an already loaded detector. Reports
/// "tracking started" before returning, then a face count per completed
/// detection.
pub fn start_detection_loop<D: FaceDetector>(
    mut detector: D,
    schedule: DetectSchedule,
    options: DetectOptions,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<FrameDetections>,
    status: StatusReporter,
) -> DetectionLoop {
    let stopping = Arc::new(AtomicBool::new(false));
    let stopping_flag = stopping.clone();
    let (stop_tx, stop_rx) = bounded::<()>(0);

    status.set(Status::Tracking { faces: None });

    let handle = thread::spawn(move || {
        let mut seq = 0u64;
        let mut next_frame = FrameSource::new(schedule, frame_rx, stop_rx);

        while let Some(frame) = next_frame.next() {
            if stopping_flag.load(Ordering::SeqCst) {
                break;
            }

            let detections = match detector.detect(&frame, &options) {
                Ok(detections) => detections,
                Err(err) => {
                    log::warn!("face detection failed: {err:#}");
                    continue;
                }
            };

            // Stop may have been requested while the detector was running.
            if stopping_flag.load(Ordering::SeqCst) {
                break;
            }

            seq += 1;
            status.set(Status::Tracking {
                faces: Some(detections.len()),
            });
            log::debug!(
                "result {seq}: {} face(s), {:?} after capture",
                detections.len(),
                frame.timestamp.elapsed()
            );
            let _ = result_tx.try_send(FrameDetections {
                seq,
                frame,
                detections,
            });
        }
        log::info!("detection loop stopped after {seq} result(s)");
    });

    DetectionLoop {
        stopping,
        stop_tx: Some(stop_tx),
        handle: Some(handle),
    }
}

/// Yields the frame each detection should run on, or `None` when the loop
/// must end.
struct FrameSource {
    ticker: Option<Receiver<std::time::Instant>>,
    frame_rx: Receiver<Frame>,
    stop_rx: Receiver<()>,
    latest: Option<Frame>,
}

impl FrameSource {
    fn new(schedule: DetectSchedule, frame_rx: Receiver<Frame>, stop_rx: Receiver<()>) -> Self {
        let ticker = match schedule {
            DetectSchedule::Interval(period) => Some(tick(period)),
            DetectSchedule::PerFrame => None,
        };
        Self {
            ticker,
            frame_rx,
            stop_rx,
            latest: None,
        }
    }

    fn next(&mut self) -> Option<Frame> {
        let stop_rx = self.stop_rx.clone();
        match self.ticker.clone() {
            Some(ticker) => loop {
                select! {
                    recv(stop_rx) -> _ => return None,
                    recv(ticker) -> _ => {
                        // A tick that elapsed while detecting is still
                        // buffered; drain it so ticks never stack up.
                        while ticker.try_recv().is_ok() {}
                        if !self.refresh_latest() {
                            return None;
                        }
                        if let Some(frame) = &self.latest {
                            return Some(frame.clone());
                        }
                    }
                }
            },
            None => {
                let frame_rx = self.frame_rx.clone();
                select! {
                    recv(stop_rx) -> _ => None,
                    recv(frame_rx) -> msg => msg.ok().map(|frame| drain_newer(frame, &frame_rx)),
                }
            }
        }
    }

    /// Pulls every pending frame, keeping the newest. Returns false once the
    /// camera side has gone away.
    fn refresh_latest(&mut self) -> bool {
        loop {
            match self.frame_rx.try_recv() {
                Ok(frame) => self.latest = Some(frame),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }
}

fn drain_newer(mut frame: Frame, frame_rx: &Receiver<Frame>) -> Frame {
    // Drop stale frames if the detector is still busy to avoid backlog.
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    frame
}

/// Consumer-side filter that only lets results newer than the last accepted
/// one through.
#[derive(Debug, Default)]
pub struct LatestResult {
    last_seq: u64,
}

impl LatestResult {
    pub fn accept(&mut self, result: &FrameDetections) -> bool {
        if result.seq <= self.last_seq {
            return false;
        }
        self.last_seq = result.seq;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use anyhow::anyhow;

    use super::*;
    use crate::types::{DetectionResult, Detections, DisplaySize, FaceBox};

    /// Detector returning a fixed number of faces, optionally failing on
    /// chosen calls or blocking until released.
    struct StubDetector {
        faces: usize,
        calls: Arc<AtomicUsize>,
        fail_on: Vec<usize>,
        gate: Option<(Sender<()>, Receiver<()>)>,
        delay: Duration,
    }

    impl StubDetector {
        fn new(faces: usize) -> Self {
            Self {
                faces,
                calls: Arc::new(AtomicUsize::new(0)),
                fail_on: Vec::new(),
                gate: None,
                delay: Duration::ZERO,
            }
        }
    }

    impl FaceDetector for StubDetector {
        fn detect(&mut self, _frame: &Frame, _options: &DetectOptions) -> anyhow::Result<Detections> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((entered_tx, release_rx)) = &self.gate {
                let _ = entered_tx.send(());
                let _ = release_rx.recv();
            }
            thread::sleep(self.delay);
            if self.fail_on.contains(&call) {
                return Err(anyhow!("stub failure on call {call}"));
            }
            let face = DetectionResult::new(FaceBox::new(1.0, 1.0, 4.0, 4.0), 0.9);
            Ok(Detections {
                working_size: DisplaySize::new(320.0, 240.0),
                faces: vec![face; self.faces],
            })
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0; 4 * 4 * 4], 4, 4)
    }

    fn wait_for_calls(calls: &AtomicUsize, n: usize) {
        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) >= n {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("detector was not called {n} time(s)");
    }

    fn recv(rx: &Receiver<FrameDetections>) -> FrameDetections {
        rx.recv_timeout(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_per_frame_publishes_increasing_seq_and_status() {
        let status = StatusReporter::new();
        let (frame_tx, frame_rx) = bounded(1);
        let (result_tx, result_rx) = bounded(4);

        let detection = start_detection_loop(
            StubDetector::new(2),
            DetectSchedule::PerFrame,
            DetectOptions::default(),
            frame_rx,
            result_tx,
            status.clone(),
        );
        assert_eq!(status.text(), "Face tracking started");

        frame_tx.send(frame()).unwrap();
        let first = recv(&result_rx);
        frame_tx.send(frame()).unwrap();
        let second = recv(&result_rx);

        assert_eq!((first.seq, second.seq), (1, 2));
        assert_eq!(second.detections.len(), 2);
        assert_eq!(status.text(), "Detected 2 face(s)");
        detection.stop();
    }

    #[test]
    fn test_failed_detection_is_skipped() {
        let (frame_tx, frame_rx) = bounded(1);
        let (result_tx, result_rx) = bounded(4);
        let mut stub = StubDetector::new(1);
        stub.fail_on = vec![1];
        let calls = stub.calls.clone();

        let detection = start_detection_loop(
            stub,
            DetectSchedule::PerFrame,
            DetectOptions::default(),
            frame_rx,
            result_tx,
            StatusReporter::new(),
        );

        frame_tx.send(frame()).unwrap();
        wait_for_calls(&calls, 1);
        frame_tx.send(frame()).unwrap();
        let result = recv(&result_rx);

        assert_eq!(result.seq, 1);
        assert!(calls.load(Ordering::SeqCst) >= 2);
        detection.stop();
    }

    #[test]
    fn test_interval_reuses_latest_frame_without_overlap() {
        let (frame_tx, frame_rx) = bounded(1);
        let (result_tx, result_rx) = bounded(64);
        let mut stub = StubDetector::new(0);
        stub.delay = Duration::from_millis(30);
        let calls = stub.calls.clone();

        let detection = start_detection_loop(
            stub,
            DetectSchedule::Interval(Duration::from_millis(10)),
            DetectOptions::default(),
            frame_rx,
            result_tx,
            StatusReporter::new(),
        );
        frame_tx.send(frame()).unwrap();

        let first = recv(&result_rx);
        let second = recv(&result_rx);
        assert!(second.seq > first.seq);

        thread::sleep(Duration::from_millis(150));
        detection.stop();

        // With detection taking 30ms, 10ms ticks cannot all be honoured.
        let total = calls.load(Ordering::SeqCst);
        assert!(total >= 2);
        assert!(total <= 12, "detector ran {total} times");
    }

    #[test]
    fn test_nothing_published_after_stop() {
        let status = StatusReporter::new();
        let (frame_tx, frame_rx) = bounded(1);
        let (result_tx, result_rx) = bounded(4);
        let (entered_tx, entered_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        let mut stub = StubDetector::new(3);
        stub.gate = Some((entered_tx, release_rx));

        let mut detection = start_detection_loop(
            stub,
            DetectSchedule::PerFrame,
            DetectOptions::default(),
            frame_rx,
            result_tx,
            status.clone(),
        );
        frame_tx.send(frame()).unwrap();
        entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        detection.signal_stop();
        release_tx.send(()).unwrap();
        drop(detection);

        assert!(result_rx.try_recv().is_err());
        assert_eq!(status.text(), "Face tracking started");
    }

    #[test]
    fn test_loop_ends_when_camera_goes_away() {
        let (frame_tx, frame_rx) = bounded::<Frame>(1);
        let (result_tx, _result_rx) = bounded(1);
        let detection = start_detection_loop(
            StubDetector::new(0),
            DetectSchedule::Interval(Duration::from_millis(5)),
            DetectOptions::default(),
            frame_rx,
            result_tx,
            StatusReporter::new(),
        );
        drop(frame_tx);
        // Joins without hanging.
        detection.stop();
    }

    #[test]
    fn test_latest_result_drops_stale() {
        let mut gate = LatestResult::default();
        let make = |seq| FrameDetections {
            seq,
            frame: frame(),
            detections: Detections::empty(DisplaySize::new(320.0, 240.0)),
        };
        assert!(gate.accept(&make(1)));
        assert!(gate.accept(&make(3)));
        assert!(!gate.accept(&make(2)));
        assert!(!gate.accept(&make(3)));
    }
}
