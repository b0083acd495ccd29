use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use log::{LevelFilter, Log, Metadata, Record};

use crate::types::{AppEvent, LogCategory, LogEntry};

pub const LOG_FILE: &str = "gesture-relay.log";

/// Sink for TUI mode: the terminal owns stdout, so records go to the
/// on-screen log panel (as [`AppEvent::Log`]) and are teed to a file.
struct PanelLogger {
    events: Sender<AppEvent>,
    file: Option<Mutex<File>>,
    filter: LevelFilter,
}

impl Log for PanelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = LogEntry::new(
            LogCategory::from_target(record.target(), record.level()),
            record.args().to_string(),
        );
        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(
                    f,
                    "{} {:5} {}",
                    entry.at.format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    entry.message
                );
            }
        }
        let _ = self.events.send(AppEvent::Log(entry));
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                let _ = f.flush();
            }
        }
    }
}

pub fn init_panel(events: Sender<AppEvent>) -> Result<()> {
    let filter = level_from_env();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE)
        .ok();
    log::set_boxed_logger(Box::new(PanelLogger {
        events,
        file: file.map(Mutex::new),
        filter,
    }))
    .context("installing logger")?;
    log::set_max_level(filter);
    Ok(())
}

/// Headless mode logs to stderr like any other CLI tool.
pub fn init_headless() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn level_from_env() -> LevelFilter {
    match std::env::var("RUST_LOG") {
        Ok(value) => value.parse().unwrap_or(LevelFilter::Info),
        Err(_) => LevelFilter::Info,
    }
}
