use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use anyhow::{Result, anyhow};
use crossbeam_channel::Sender;
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
};

use super::convert;
use crate::types::{AppEvent, CameraStatus, Frame};

// Prefer formats the converter handles directly; some drivers reject
// YUYV even though it is reported, hence the ladder.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        // Last resort: anything the backend can decode for us.
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: info.human_name(),
        })
        .collect())
}

/// Running capture thread. Dropping it stops capture and joins.
#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
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

fn build_camera(index: CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

/// Opens the camera at `index` and streams RGB frames into `frame_tx`.
/// The channel is bounded; frames are dropped with `try_send` whenever
/// the tracker is still busy with the previous one.
pub fn start_camera_stream(
    index: CameraIndex,
    frame_tx: Sender<Frame>,
    events: Sender<AppEvent>,
) -> Result<CameraStream> {
    // Fail fast before spawning the capture thread; the camera itself
    // is rebuilt inside the thread since handles are not portable
    // across threads on every backend.
    build_camera(index.clone())?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        let mut camera = match build_camera(index) {
            Ok(cam) => cam,
            Err(err) => {
                log::error!("failed to open camera: {err:?}");
                let _ = events.send(AppEvent::Camera(CameraStatus::Error(err.to_string())));
                return;
            }
        };

        let resolution = camera.resolution();
        log::info!(
            "camera active at {}x{} ({:?})",
            resolution.width_x,
            resolution.height_y,
            camera.frame_format()
        );
        let _ = events.send(AppEvent::Camera(CameraStatus::Active));

        while !stop_flag.load(Ordering::Relaxed) {
            let read_start = Instant::now();
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::warn!(
                        "camera frame read failed (after {:?}): {err:?}",
                        read_start.elapsed()
                    );
                    continue;
                }
            };

            let converted = match convert::convert_camera_frame(&buffer) {
                Ok(rgb) => rgb,
                Err(err) => {
                    log::warn!("failed to decode camera frame: {err:?}");
                    continue;
                }
            };

            let frame = Frame {
                rgb: converted.rgb,
                width: converted.width,
                height: converted.height,
                timestamp: Instant::now(),
            };

            // Drop if the tracker is busy, otherwise forward every frame.
            let _ = frame_tx.try_send(frame);
        }
    });

    Ok(CameraStream {
        stop,
        handle: Some(handle),
    })
}
