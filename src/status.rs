use std::{
    fmt,
    sync::{Arc, Mutex},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Starting,
    SettingUpCamera,
    LoadingModels,
    StartingDetection,
}

impl Stage {
    pub fn message(&self) -> &'static str {
        match self {
            Stage::Starting => "Initializing...",
            Stage::SettingUpCamera => "Setting up camera...",
            Stage::LoadingModels => "Loading face detection models...",
            Stage::StartingDetection => "Models loaded, starting face detection...",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Idle,
    Initializing(Stage),
    Tracking { faces: Option<usize> },
    Failed(String),
}

impl Status {
    pub fn is_failed(&self) -> bool {
        matches!(self, Status::Failed(_))
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self, Status::Tracking { .. })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => f.write_str("Idle"),
            Status::Initializing(stage) => f.write_str(stage.message()),
            Status::Tracking { faces: None } => f.write_str("Face tracking started"),
            Status::Tracking { faces: Some(n) } => write!(f, "Detected {n} face(s)"),
            Status::Failed(message) => f.write_str(message),
        }
    }
}

/// Shared handle to the one current status value. Last writer wins.
#[derive(Clone, Debug)]
pub struct StatusReporter {
    current: Arc<Mutex<Status>>,
}

impl StatusReporter {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Status::Idle)),
        }
    }

    pub fn set(&self, status: Status) {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *current != status {
            log::info!("status: {status}");
        }
        *current = status;
    }

    pub fn get(&self) -> Status {
        match self.current.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn text(&self) -> String {
        self.get().to_string()
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Status::Idle, "Idle")]
    #[case(Status::Initializing(Stage::Starting), "Initializing...")]
    #[case(Status::Initializing(Stage::SettingUpCamera), "Setting up camera...")]
    #[case(
        Status::Initializing(Stage::LoadingModels),
        "Loading face detection models..."
    )]
    #[case(Status::Tracking { faces: None }, "Face tracking started")]
    #[case(Status::Tracking { faces: Some(0) }, "Detected 0 face(s)")]
    #[case(Status::Tracking { faces: Some(2) }, "Detected 2 face(s)")]
    #[case(Status::Failed("Error: boom".into()), "Error: boom")]
    fn test_status_text(#[case] status: Status, #[case] expected: &str) {
        assert_eq!(status.to_string(), expected);
    }

    #[test]
    fn test_last_writer_wins_across_clones() {
        let reporter = StatusReporter::new();
        let other = reporter.clone();
        reporter.set(Status::Initializing(Stage::Starting));
        other.set(Status::Tracking { faces: Some(1) });
        assert_eq!(reporter.text(), "Detected 1 face(s)");
        assert!(reporter.get().is_tracking());
    }
}
