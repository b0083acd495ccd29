use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Packed RGB24 frame as produced by the capture thread.
#[derive(Clone, Debug)]
pub struct Frame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[allow(dead_code)]
    pub timestamp: Instant,
}

/// Coarse hand state derived from the landmark set.
///
/// The wire payload on the status topic is exactly the string returned
/// by [`GestureState::payload`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureState {
    Open,
    Closed,
    NoHand,
}

impl GestureState {
    pub fn payload(&self) -> &'static str {
        match self {
            GestureState::Open => "OPEN",
            GestureState::Closed => "CLOSED",
            GestureState::NoHand => "NO_HAND",
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            GestureState::Open => "🤚",
            GestureState::Closed => "✊",
            GestureState::NoHand => "❌",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GestureState::Open => "Open",
            GestureState::Closed => "Closed",
            GestureState::NoHand => "No hand",
        }
    }
}

/// A frame that went through the tracker: pixels already annotated,
/// gesture state decided.
#[derive(Clone, Debug)]
pub struct TrackedFrame {
    pub frame: Frame,
    pub state: GestureState,
    pub confidence: f32,
    pub landmarks: Option<Vec<(f32, f32)>>,
}

/// Freshest tracked frame, shared between the tracking worker (writer)
/// and the video streamer (reader). The streamer re-sends the current
/// content on every tick, new or not.
pub type LatestFrame = Arc<Mutex<Option<TrackedFrame>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Failed => "Connection Failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CameraStatus {
    Initializing,
    Active,
    Error(String),
}

impl CameraStatus {
    pub fn label(&self) -> String {
        match self {
            CameraStatus::Initializing => "Initializing...".to_string(),
            CameraStatus::Active => "Active".to_string(),
            CameraStatus::Error(e) => format!("Error: {e}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelStatus {
    Loading,
    Downloading { name: &'static str, percent: u8 },
    Ready,
    Failed(String),
}

impl ModelStatus {
    pub fn label(&self) -> String {
        match self {
            ModelStatus::Loading => "Loading...".to_string(),
            ModelStatus::Downloading { name, percent } => {
                format!("Downloading {name} ({percent}%)")
            }
            ModelStatus::Ready => "Ready".to_string(),
            ModelStatus::Failed(e) => format!("Failed: {e}"),
        }
    }
}

/// Log panel categories, one per kind of line the original operator
/// page distinguishes by color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogCategory {
    Info,
    Connect,
    Success,
    Error,
    Publish,
    Stream,
    Disconnect,
}

impl LogCategory {
    pub fn from_target(target: &str, level: log::Level) -> Self {
        match target {
            "connect" => LogCategory::Connect,
            "success" => LogCategory::Success,
            "publish" => LogCategory::Publish,
            "stream" => LogCategory::Stream,
            "disconnect" => LogCategory::Disconnect,
            _ if level <= log::Level::Error => LogCategory::Error,
            _ => LogCategory::Info,
        }
    }

}

#[derive(Clone, Debug)]
pub struct LogEntry {
    pub at: chrono::DateTime<chrono::Local>,
    pub category: LogCategory,
    pub message: String,
}

impl LogEntry {
    pub fn new(category: LogCategory, message: impl Into<String>) -> Self {
        Self {
            at: chrono::Local::now(),
            category,
            message: message.into(),
        }
    }

    /// One exported/rendered line, `[HH:MM:SS] message`.
    pub fn render(&self) -> String {
        format!("[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// Everything the controller loop reacts to, multiplexed onto one
/// channel so the UI thread has a single receive point.
#[derive(Clone, Debug)]
pub enum AppEvent {
    Connected,
    ConnectionFailed(String),
    ConnectionLost(String),
    Disconnected,
    StreamRate { fps: f32 },
    StreamFrame { bytes: usize },
    StreamError(String),
    Camera(CameraStatus),
    Model(ModelStatus),
    Log(LogEntry),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_payloads_match_wire_format() {
        assert_eq!(GestureState::Open.payload(), "OPEN");
        assert_eq!(GestureState::Closed.payload(), "CLOSED");
        assert_eq!(GestureState::NoHand.payload(), "NO_HAND");
    }

    #[test]
    fn test_log_categories_from_target() {
        assert_eq!(
            LogCategory::from_target("publish", log::Level::Info),
            LogCategory::Publish
        );
        assert_eq!(
            LogCategory::from_target("gesture_relay::app", log::Level::Error),
            LogCategory::Error
        );
        assert_eq!(
            LogCategory::from_target("gesture_relay::app", log::Level::Info),
            LogCategory::Info
        );
    }
}
