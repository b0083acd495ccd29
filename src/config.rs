use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_TCP_PORT: u16 = 1883;
pub const DEFAULT_WS_PORT: u16 = 9001;
pub const DEFAULT_STATUS_TOPIC: &str = "webcam/hand_status";
pub const DEFAULT_VIDEO_TOPIC: &str = "webcam/stream";

pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Ws,
    Tcp,
}

impl Transport {
    pub fn label(&self) -> &'static str {
        match self {
            Transport::Ws => "ws",
            Transport::Tcp => "tcp",
        }
    }
}

/// Operator settings plus the per-field value histories backing the
/// dropdown-style cycling in the UI. Persisted as TOML.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub tcp_port: u16,
    pub ws_port: u16,
    pub transport: Transport,
    pub status_topic: String,
    pub video_topic: String,
    pub fps: u32,
    pub jpeg_quality: u8,
    pub base64: bool,
    pub publish_hand: bool,
    pub publish_video: bool,
    pub camera_index: u32,
    pub host_history: Vec<String>,
    pub tcp_port_history: Vec<u16>,
    pub ws_port_history: Vec<u16>,
    pub status_topic_history: Vec<String>,
    pub video_topic_history: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            tcp_port: DEFAULT_TCP_PORT,
            ws_port: DEFAULT_WS_PORT,
            transport: Transport::Ws,
            status_topic: DEFAULT_STATUS_TOPIC.to_string(),
            video_topic: DEFAULT_VIDEO_TOPIC.to_string(),
            fps: 10,
            jpeg_quality: 70,
            base64: true,
            publish_hand: true,
            publish_video: false,
            camera_index: 0,
            host_history: vec![DEFAULT_HOST.to_string()],
            tcp_port_history: vec![DEFAULT_TCP_PORT],
            ws_port_history: vec![DEFAULT_WS_PORT],
            status_topic_history: vec![DEFAULT_STATUS_TOPIC.to_string()],
            video_topic_history: vec![DEFAULT_VIDEO_TOPIC.to_string()],
        }
    }
}

impl Settings {
    /// Loads from `path`, falling back to defaults when the file is
    /// missing or malformed. A broken config never blocks startup.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => match toml::from_str::<Settings>(&text) {
                Ok(mut settings) => {
                    settings.normalize();
                    settings
                }
                Err(e) => {
                    log::warn!("Ignoring malformed config {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Self::default(),
            Err(e) => {
                log::warn!("Failed to read config {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating config directory {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(self).context("serializing settings")?;
        fs::write(path, text)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    /// Clamps numeric ranges and makes sure every history contains its
    /// default and its current value, defaults first.
    pub fn normalize(&mut self) {
        self.fps = self.fps.clamp(MIN_FPS, MAX_FPS);
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);

        merge_front(&mut self.host_history, DEFAULT_HOST.to_string());
        merge_front(&mut self.tcp_port_history, DEFAULT_TCP_PORT);
        merge_front(&mut self.ws_port_history, DEFAULT_WS_PORT);
        merge_front(&mut self.status_topic_history, DEFAULT_STATUS_TOPIC.to_string());
        merge_front(&mut self.video_topic_history, DEFAULT_VIDEO_TOPIC.to_string());
        self.remember();
    }

    /// Pushes the current field values into their histories. Called
    /// when the operator commits a value (edits a field, connects).
    pub fn remember(&mut self) {
        push_unique(&mut self.host_history, self.host.clone());
        push_unique(&mut self.tcp_port_history, self.tcp_port);
        push_unique(&mut self.ws_port_history, self.ws_port);
        push_unique(&mut self.status_topic_history, self.status_topic.clone());
        push_unique(&mut self.video_topic_history, self.video_topic.clone());
    }

    pub fn set_fps(&mut self, fps: u32) {
        self.fps = fps.clamp(MIN_FPS, MAX_FPS);
    }

    /// Stream tick period; one frame is published per tick.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(MIN_FPS) as f64)
    }

    pub fn active_port(&self) -> u16 {
        match self.transport {
            Transport::Ws => self.ws_port,
            Transport::Tcp => self.tcp_port,
        }
    }

    /// Broker address as shown in logs and the status pane.
    pub fn broker_display(&self) -> String {
        match self.transport {
            Transport::Ws => format!("ws://{}:{}/mqtt", self.host, self.ws_port),
            Transport::Tcp => format!("tcp://{}:{}", self.host, self.tcp_port),
        }
    }
}

fn push_unique<T: PartialEq>(history: &mut Vec<T>, value: T) {
    if !history.contains(&value) {
        history.push(value);
    }
}

fn merge_front<T: PartialEq>(history: &mut Vec<T>, default: T) {
    if let Some(pos) = history.iter().position(|v| v == &default) {
        history.remove(pos);
    }
    history.insert(0, default);
}

/// `<platform config dir>/gesture-relay/config.toml` unless overridden
/// on the command line.
pub fn config_path(override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }
    let base = dirs::config_dir().context("no config directory on this platform")?;
    Ok(base.join("gesture-relay").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_seed_histories() {
        let s = Settings::default();
        assert_eq!(s.host_history, vec![DEFAULT_HOST.to_string()]);
        assert_eq!(s.ws_port_history, vec![DEFAULT_WS_PORT]);
        assert!(s.base64);
        assert_eq!(s.fps, 10);
    }

    #[test]
    fn test_remember_dedups() {
        let mut s = Settings::default();
        s.host = "broker.local".to_string();
        s.remember();
        s.remember();
        assert_eq!(
            s.host_history,
            vec!["localhost".to_string(), "broker.local".to_string()]
        );
    }

    #[test]
    fn test_normalize_clamps_and_front_merges() {
        let mut s = Settings {
            fps: 500,
            jpeg_quality: 0,
            host: "10.0.0.9".to_string(),
            host_history: vec!["10.0.0.9".to_string()],
            ..Settings::default()
        };
        s.normalize();
        assert_eq!(s.fps, MAX_FPS);
        assert_eq!(s.jpeg_quality, 1);
        assert_eq!(s.host_history[0], DEFAULT_HOST);
        assert!(s.host_history.contains(&"10.0.0.9".to_string()));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut s = Settings::default();
        s.host = "broker.lan".to_string();
        s.transport = Transport::Tcp;
        s.fps = 24;
        s.base64 = false;
        s.remember();
        s.save(&path).unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded.host, "broker.lan");
        assert_eq!(loaded.transport, Transport::Tcp);
        assert_eq!(loaded.fps, 24);
        assert!(!loaded.base64);
        assert!(loaded.host_history.contains(&"broker.lan".to_string()));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(&dir.path().join("absent.toml"));
        assert_eq!(s.host, DEFAULT_HOST);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "fps = \"many\"").unwrap();
        let s = Settings::load(&path);
        assert_eq!(s.fps, 10);
    }

    #[test]
    fn test_frame_interval_matches_fps() {
        let mut s = Settings::default();
        s.set_fps(10);
        assert_eq!(s.frame_interval(), Duration::from_millis(100));
        s.set_fps(0);
        assert_eq!(s.fps, MIN_FPS);
    }

    #[test]
    fn test_active_port_follows_transport() {
        let mut s = Settings::default();
        assert_eq!(s.active_port(), DEFAULT_WS_PORT);
        s.transport = Transport::Tcp;
        assert_eq!(s.active_port(), DEFAULT_TCP_PORT);
        assert_eq!(s.broker_display(), "tcp://localhost:1883");
    }
}
