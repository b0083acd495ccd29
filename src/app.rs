use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use crossbeam_channel::Sender;

use crate::config::{MAX_FPS, MIN_FPS, Settings, Transport};
use crate::publish::stream::{self, Streamer, StreamerConfig};
use crate::publish::{Session, StatusGate};
use crate::types::{
    AppEvent, CameraStatus, ConnectionStatus, GestureState, LatestFrame, LogEntry, ModelStatus,
    TrackedFrame,
};

const LOG_CAP: usize = 500;

/// Editable form fields of the settings pane. The port field follows
/// the selected transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsField {
    Host,
    Port,
    StatusTopic,
    VideoTopic,
}

impl SettingsField {
    pub const ALL: [SettingsField; 4] = [
        SettingsField::Host,
        SettingsField::Port,
        SettingsField::StatusTopic,
        SettingsField::VideoTopic,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SettingsField::Host => "Broker host",
            SettingsField::Port => "Port",
            SettingsField::StatusTopic => "Status topic",
            SettingsField::VideoTopic => "Video topic",
        }
    }
}

/// Connection manager and stream wiring, shared by the dashboard and
/// headless modes. Owns the broker session, the streamer handle, the
/// publish-on-change gate and the status snapshot the UI renders; the
/// frontend feeds it tracked frames and app events and calls its
/// operations from key handlers or CLI flags.
pub struct App {
    pub settings: Settings,
    config_path: PathBuf,
    events: Sender<AppEvent>,
    latest: LatestFrame,
    base64_flag: Arc<AtomicBool>,

    session: Option<Session>,
    streamer: Option<Streamer>,
    gate: StatusGate,

    pub connection: ConnectionStatus,
    pub camera: CameraStatus,
    pub model: ModelStatus,
    pub gesture: GestureState,
    pub confidence: f32,
    pub resolution: Option<(u32, u32)>,
    pub measured_fps: Option<f32>,
    pub last_frame_bytes: Option<usize>,
    pub stream_error: Option<String>,
    pub logs: VecDeque<LogEntry>,
}

impl App {
    pub fn new(
        settings: Settings,
        config_path: PathBuf,
        latest: LatestFrame,
        events: Sender<AppEvent>,
    ) -> Self {
        let base64_flag = Arc::new(AtomicBool::new(settings.base64));
        Self {
            settings,
            config_path,
            events,
            latest,
            base64_flag,
            session: None,
            streamer: None,
            gate: StatusGate::default(),
            connection: ConnectionStatus::Disconnected,
            camera: CameraStatus::Initializing,
            model: ModelStatus::Loading,
            gesture: GestureState::NoHand,
            confidence: 0.0,
            resolution: None,
            measured_fps: None,
            last_frame_bytes: None,
            stream_error: None,
            logs: VecDeque::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionStatus::Connected
    }

    pub fn is_streaming(&self) -> bool {
        self.streamer.is_some()
    }

    /// Commits the current form values and opens a broker session.
    /// The result arrives later as a `Connected` or `ConnectionFailed`
    /// event.
    pub fn connect(&mut self) {
        if self.session.is_some() {
            return;
        }
        self.commit_settings();
        self.connection = ConnectionStatus::Connecting;
        self.session = Some(Session::connect(&self.settings, self.events.clone()));
    }

    /// Streamer first, then the session (mirrors the enable order on
    /// connect).
    pub fn disconnect(&mut self) {
        self.halt_streamer(true);
        if let Some(session) = self.session.take() {
            session.disconnect();
        }
    }

    pub fn toggle_video(&mut self) {
        self.set_video_enabled(!self.settings.publish_video);
    }

    /// Enabling video only arms the flag; the timer starts when a
    /// connection exists (or later, when one is established). It never
    /// runs while disconnected.
    pub fn set_video_enabled(&mut self, enabled: bool) {
        self.settings.publish_video = enabled;
        if enabled {
            if self.spawn_streamer() {
                self.log_stream_started();
            } else if !self.is_connected() {
                log::info!("Video streaming enabled; starts once connected");
            }
        } else {
            self.halt_streamer(true);
        }
    }

    pub fn toggle_hand(&mut self) {
        self.set_hand_enabled(!self.settings.publish_hand);
    }

    /// Re-enabling forgets the last published state so the current one
    /// is announced again on the next tracked frame.
    pub fn set_hand_enabled(&mut self, enabled: bool) {
        self.settings.publish_hand = enabled;
        if enabled {
            self.gate.reset();
            log::info!("Hand status publishing enabled");
        } else {
            log::info!("Hand status publishing disabled");
        }
    }

    /// Live switch; the streamer reads the flag at every tick.
    pub fn toggle_base64(&mut self) {
        self.settings.base64 = !self.settings.base64;
        self.base64_flag.store(self.settings.base64, Ordering::Relaxed);
        log::info!(
            "Frame payload: {}",
            if self.settings.base64 { "base64" } else { "binary JPEG" }
        );
    }

    pub fn toggle_transport(&mut self) {
        self.settings.transport = match self.settings.transport {
            Transport::Ws => Transport::Tcp,
            Transport::Tcp => Transport::Ws,
        };
        log::info!("Transport: {}", self.settings.broker_display());
    }

    pub fn set_fps(&mut self, fps: u32) {
        let fps = fps.clamp(MIN_FPS, MAX_FPS);
        if fps == self.settings.fps {
            return;
        }
        self.settings.set_fps(fps);
        log::info!("Stream rate set to {fps} FPS");
        // A running timer is rebuilt at the new period.
        if self.streamer.is_some() {
            self.halt_streamer(false);
            self.spawn_streamer();
        }
    }

    pub fn bump_fps(&mut self, delta: i32) {
        let fps = (self.settings.fps as i32 + delta).clamp(MIN_FPS as i32, MAX_FPS as i32);
        self.set_fps(fps as u32);
    }

    pub fn field_value(&self, field: SettingsField) -> String {
        match field {
            SettingsField::Host => self.settings.host.clone(),
            SettingsField::Port => self.settings.active_port().to_string(),
            SettingsField::StatusTopic => self.settings.status_topic.clone(),
            SettingsField::VideoTopic => self.settings.video_topic.clone(),
        }
    }

    /// Applies an edited field value. Blank text and unparsable ports
    /// leave the setting untouched.
    pub fn set_field_value(&mut self, field: SettingsField, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match field {
            SettingsField::Host => self.settings.host = text.to_string(),
            SettingsField::Port => match text.parse::<u16>() {
                Ok(port) => match self.settings.transport {
                    Transport::Ws => self.settings.ws_port = port,
                    Transport::Tcp => self.settings.tcp_port = port,
                },
                Err(_) => log::warn!("Ignoring invalid port {text:?}"),
            },
            SettingsField::StatusTopic => self.settings.status_topic = text.to_string(),
            SettingsField::VideoTopic => self.settings.video_topic = text.to_string(),
        }
    }

    /// Steps a field through its saved history, wrapping at both ends.
    pub fn cycle_field(&mut self, field: SettingsField, step: i32) {
        match field {
            SettingsField::Host => {
                if let Some(v) = cycled(&self.settings.host_history, &self.settings.host, step) {
                    self.settings.host = v;
                }
            }
            SettingsField::Port => match self.settings.transport {
                Transport::Ws => {
                    if let Some(v) =
                        cycled(&self.settings.ws_port_history, &self.settings.ws_port, step)
                    {
                        self.settings.ws_port = v;
                    }
                }
                Transport::Tcp => {
                    if let Some(v) =
                        cycled(&self.settings.tcp_port_history, &self.settings.tcp_port, step)
                    {
                        self.settings.tcp_port = v;
                    }
                }
            },
            SettingsField::StatusTopic => {
                if let Some(v) = cycled(
                    &self.settings.status_topic_history,
                    &self.settings.status_topic,
                    step,
                ) {
                    self.settings.status_topic = v;
                }
            }
            SettingsField::VideoTopic => {
                if let Some(v) = cycled(
                    &self.settings.video_topic_history,
                    &self.settings.video_topic,
                    step,
                ) {
                    self.settings.video_topic = v;
                }
            }
        }
    }

    /// Pushes current values into their histories and saves the file.
    pub fn commit_settings(&mut self) {
        self.settings.remember();
        if let Err(err) = self.settings.save(&self.config_path) {
            log::warn!("Failed to save settings: {err:#}");
        }
    }

    /// Status snapshot update plus the publish-on-change rule for the
    /// status topic.
    pub fn on_tracked_frame(&mut self, tracked: &TrackedFrame) {
        self.gesture = tracked.state;
        self.confidence = tracked.confidence;
        self.resolution = Some((tracked.frame.width, tracked.frame.height));

        let connected = self.is_connected();
        if self
            .gate
            .should_publish(tracked.state, self.settings.publish_hand, connected)
        {
            if let Some(session) = &self.session {
                match session.publish(&self.settings.status_topic, tracked.state.payload()) {
                    Ok(()) => log::info!(
                        target: "publish",
                        "Hand: {} -> {}",
                        tracked.state.payload(),
                        self.settings.status_topic
                    ),
                    Err(err) => log::warn!("Status publish failed: {err}"),
                }
            }
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Connected => {
                self.connection = ConnectionStatus::Connected;
                // Fresh connection announces the current state on the
                // next tracked frame.
                self.gate.reset();
                log::info!(target: "success", "Connected to {}", self.settings.broker_display());
                if self.settings.publish_video && self.spawn_streamer() {
                    self.log_stream_started();
                }
            }
            AppEvent::ConnectionFailed(reason) => {
                self.connection = ConnectionStatus::Failed;
                self.halt_streamer(false);
                self.session = None;
                log::error!("Connection failed: {reason}");
            }
            AppEvent::ConnectionLost(reason) => {
                self.connection = ConnectionStatus::Disconnected;
                self.halt_streamer(true);
                self.session = None;
                log::error!("Connection lost: {reason}");
            }
            AppEvent::Disconnected => {
                self.connection = ConnectionStatus::Disconnected;
                self.halt_streamer(true);
                self.session = None;
                log::info!(target: "disconnect", "Disconnected from broker");
            }
            AppEvent::StreamRate { fps } => self.measured_fps = Some(fps),
            AppEvent::StreamFrame { bytes } => self.last_frame_bytes = Some(bytes),
            AppEvent::StreamError(reason) => {
                log::error!("Frame encode failed: {reason}");
                self.stream_error = Some(reason);
            }
            AppEvent::Camera(status) => self.camera = status,
            AppEvent::Model(status) => self.model = status,
            AppEvent::Log(entry) => {
                self.logs.push_back(entry);
                while self.logs.len() > LOG_CAP {
                    self.logs.pop_front();
                }
            }
        }
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    /// Writes the visible log to `gesture-relay-log-<timestamp>.txt`
    /// under `dir` and returns the path.
    pub fn export_logs(&self, dir: &Path) -> Result<PathBuf> {
        let name = format!(
            "gesture-relay-log-{}.txt",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        );
        let path = dir.join(name);
        let mut text = String::new();
        for entry in &self.logs {
            text.push_str(&entry.render());
            text.push('\n');
        }
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    /// Final teardown: streamer, session, settings file.
    pub fn shutdown(&mut self) {
        self.halt_streamer(false);
        if let Some(session) = self.session.take() {
            session.disconnect();
        }
        if let Err(err) = self.settings.save(&self.config_path) {
            log::warn!("Failed to save settings: {err:#}");
        }
    }

    fn spawn_streamer(&mut self) -> bool {
        if self.streamer.is_some() || !self.is_connected() || !self.settings.publish_video {
            return false;
        }
        let Some(session) = &self.session else {
            return false;
        };
        let cfg = StreamerConfig {
            topic: self.settings.video_topic.clone(),
            interval: self.settings.frame_interval(),
            jpeg_quality: self.settings.jpeg_quality,
        };
        self.stream_error = None;
        self.streamer = Some(stream::start_streamer(
            cfg,
            self.base64_flag.clone(),
            self.latest.clone(),
            session.frame_publisher(),
            self.events.clone(),
        ));
        true
    }

    fn halt_streamer(&mut self, announce: bool) {
        if let Some(streamer) = self.streamer.take() {
            streamer.stop();
            self.measured_fps = None;
            self.last_frame_bytes = None;
            if announce {
                log::info!(target: "stream", "Video streaming stopped");
            }
        }
    }

    fn log_stream_started(&self) {
        log::info!(
            target: "stream",
            "Video streaming started ({} FPS -> {})",
            self.settings.fps,
            self.settings.video_topic
        );
    }
}

fn cycled<T: Clone + PartialEq>(history: &[T], current: &T, step: i32) -> Option<T> {
    if history.is_empty() {
        return None;
    }
    let len = history.len() as i32;
    let base = history.iter().position(|v| v == current).unwrap_or(0) as i32;
    let idx = (base + step).rem_euclid(len) as usize;
    Some(history[idx].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogCategory;
    use std::sync::Mutex;

    fn test_app() -> App {
        let (tx, rx) = crossbeam_channel::unbounded();
        // Keep the receiver alive for the app's lifetime.
        std::mem::forget(rx);
        App::new(
            Settings::default(),
            PathBuf::from("unused-config.toml"),
            Arc::new(Mutex::new(None)),
            tx,
        )
    }

    #[test]
    fn test_video_toggle_while_disconnected_does_not_start_streamer() {
        let mut app = test_app();
        assert_eq!(app.connection, ConnectionStatus::Disconnected);

        app.toggle_video();

        assert!(app.settings.publish_video);
        assert!(!app.is_streaming());
        assert_eq!(app.measured_fps, None);
    }

    #[test]
    fn test_fps_clamps_at_range_edges() {
        let mut app = test_app();
        app.set_fps(99);
        assert_eq!(app.settings.fps, MAX_FPS);
        app.bump_fps(1);
        assert_eq!(app.settings.fps, MAX_FPS);
        app.set_fps(0);
        assert_eq!(app.settings.fps, MIN_FPS);
        app.bump_fps(-1);
        assert_eq!(app.settings.fps, MIN_FPS);
    }

    #[test]
    fn test_cycle_field_wraps_history() {
        let mut app = test_app();
        app.settings.host_history =
            vec!["localhost".to_string(), "a.lan".to_string(), "b.lan".to_string()];

        app.cycle_field(SettingsField::Host, 1);
        assert_eq!(app.settings.host, "a.lan");
        app.cycle_field(SettingsField::Host, 1);
        assert_eq!(app.settings.host, "b.lan");
        app.cycle_field(SettingsField::Host, 1);
        assert_eq!(app.settings.host, "localhost");
        app.cycle_field(SettingsField::Host, -1);
        assert_eq!(app.settings.host, "b.lan");
    }

    #[test]
    fn test_port_field_follows_transport_and_rejects_junk() {
        let mut app = test_app();
        app.set_field_value(SettingsField::Port, "9100");
        assert_eq!(app.settings.ws_port, 9100);
        assert_eq!(app.settings.tcp_port, crate::config::DEFAULT_TCP_PORT);

        app.toggle_transport();
        app.set_field_value(SettingsField::Port, "1884");
        assert_eq!(app.settings.tcp_port, 1884);

        app.set_field_value(SettingsField::Port, "not-a-port");
        assert_eq!(app.settings.tcp_port, 1884);
        assert_eq!(app.field_value(SettingsField::Port), "1884");
    }

    #[test]
    fn test_log_ring_is_capped() {
        let mut app = test_app();
        for i in 0..(LOG_CAP + 100) {
            app.handle_event(AppEvent::Log(LogEntry::new(
                LogCategory::Info,
                format!("line {i}"),
            )));
        }
        assert_eq!(app.logs.len(), LOG_CAP);
        assert_eq!(app.logs.front().unwrap().message, "line 100");
    }

    #[test]
    fn test_export_logs_renders_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app();
        app.handle_event(AppEvent::Log(LogEntry::new(LogCategory::Connect, "hello")));

        let path = app.export_logs(dir.path()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("hello\n"));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("gesture-relay-log-"));
    }

    #[test]
    fn test_status_events_update_snapshot() {
        let mut app = test_app();
        app.handle_event(AppEvent::Connected);
        assert_eq!(app.connection, ConnectionStatus::Connected);

        app.handle_event(AppEvent::Camera(CameraStatus::Active));
        assert_eq!(app.camera, CameraStatus::Active);

        app.handle_event(AppEvent::Model(ModelStatus::Ready));
        assert_eq!(app.model, ModelStatus::Ready);

        app.handle_event(AppEvent::StreamRate { fps: 9.6 });
        assert_eq!(app.measured_fps, Some(9.6));

        app.handle_event(AppEvent::ConnectionLost("gone".to_string()));
        assert_eq!(app.connection, ConnectionStatus::Disconnected);
        assert!(app.session.is_none());
    }
}
