use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use crossbeam_channel::Sender;
use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;

use super::FramePublisher;
use crate::types::{AppEvent, Frame, LatestFrame};

#[derive(Clone, Debug)]
pub struct StreamerConfig {
    pub topic: String,
    pub interval: Duration,
    pub jpeg_quality: u8,
}

/// Fixed-interval video publisher. Each tick samples the latest
/// tracked frame (possibly the same one again), encodes it and sends
/// it out; it never queues frames and never waits for the tracker.
pub struct Streamer {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Streamer {
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

impl Drop for Streamer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The payload flag is shared and re-read on every tick, so flipping
/// base64/binary mid-stream takes effect with the next frame.
pub fn start_streamer(
    cfg: StreamerConfig,
    base64_payload: Arc<AtomicBool>,
    latest: LatestFrame,
    publisher: FramePublisher,
    events: Sender<AppEvent>,
) -> Streamer {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        let ticker = crossbeam_channel::tick(cfg.interval);
        let mut window = FpsWindow::default();

        while !stop_flag.load(Ordering::Relaxed) {
            if ticker.recv().is_err() {
                break;
            }
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }

            let Some(tracked) = latest.lock().ok().and_then(|slot| slot.clone()) else {
                // Nothing captured yet.
                continue;
            };

            let jpeg = match encode_jpeg(&tracked.frame, cfg.jpeg_quality) {
                Ok(jpeg) => jpeg,
                Err(err) => {
                    let _ = events.send(AppEvent::StreamError(err.to_string()));
                    continue;
                }
            };
            let jpeg_len = jpeg.len();
            let payload = if base64_payload.load(Ordering::Relaxed) {
                BASE64.encode(&jpeg).into_bytes()
            } else {
                jpeg
            };

            match publisher.try_publish(&cfg.topic, payload) {
                Ok(()) => {
                    log::debug!(
                        target: "stream",
                        "Video frame: {}KB -> {}",
                        jpeg_len.div_ceil(1024),
                        cfg.topic
                    );
                    let _ = events.send(AppEvent::StreamFrame { bytes: jpeg_len });
                    if let Some(fps) = window.record(Instant::now()) {
                        let _ = events.send(AppEvent::StreamRate { fps });
                    }
                }
                Err(err) => {
                    // Queue full or the session just went away; the
                    // frame is simply dropped.
                    log::debug!(target: "stream", "frame publish skipped: {err}");
                }
            }
        }
    });

    Streamer {
        stop,
        handle: Some(handle),
    }
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder
        .write_image(
            &frame.rgb,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgb8,
        )
        .context("jpeg encode failed")?;
    Ok(jpeg)
}

/// Achieved-rate meter matching the status pane readout: counts sent
/// frames and reports once per elapsed second.
#[derive(Debug)]
pub struct FpsWindow {
    window_start: Instant,
    frames: u32,
}

impl Default for FpsWindow {
    fn default() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
        }
    }
}

impl FpsWindow {
    pub fn record(&mut self, now: Instant) -> Option<f32> {
        self.frames += 1;
        let elapsed = now.duration_since(self.window_start);
        if elapsed >= Duration::from_secs(1) {
            let fps = self.frames as f32 / elapsed.as_secs_f32();
            self.frames = 0;
            self.window_start = now;
            Some(fps)
        } else {
            None
        }
    }
}
