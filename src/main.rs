mod app;
mod config;
mod gesture;
mod logging;
mod model_download;
mod pipeline;
mod publish;
mod types;
mod ui;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::{bounded, unbounded};

use crate::app::App;
use crate::config::{Settings, Transport};
use crate::types::{AppEvent, Frame, LatestFrame};

#[derive(Parser)]
#[command(
    name = "gesture-relay",
    about = "Relays webcam hand gestures and video frames to an MQTT broker",
    version
)]
struct Cli {
    /// Broker hostname or IP
    #[arg(long)]
    host: Option<String>,

    /// Broker websocket port
    #[arg(long)]
    ws_port: Option<u16>,

    /// Connect over plain TCP instead of websockets
    #[arg(long)]
    tcp: bool,

    /// Camera index to capture from
    #[arg(long)]
    camera: Option<u32>,

    /// Video stream rate in frames per second (clamped to 1-30)
    #[arg(long)]
    fps: Option<u32>,

    /// Alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run without the dashboard, logging to stderr
    #[arg(long)]
    headless: bool,

    /// Publish video frames (headless auto-connect implies hand state)
    #[arg(long)]
    stream: bool,

    /// List capture devices and exit
    #[arg(long)]
    list_cameras: bool,

    /// Download the tracking models and exit
    #[arg(long)]
    fetch_models: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.fetch_models {
        logging::init_headless();
        return model_download::fetch_models_with_progress(
            &model_download::default_handpose_model_path(),
            &model_download::default_palm_model_path(),
        );
    }
    if cli.list_cameras {
        logging::init_headless();
        return list_cameras();
    }

    let config_path = config::config_path(cli.config.as_deref())?;
    let mut settings = Settings::load(&config_path);
    apply_cli_overrides(&mut settings, &cli);

    if cli.headless {
        run_headless(settings, config_path)
    } else {
        run_dashboard(settings, config_path)
    }
}

fn apply_cli_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(host) = &cli.host {
        settings.host = host.clone();
    }
    if let Some(port) = cli.ws_port {
        settings.ws_port = port;
    }
    if cli.tcp {
        settings.transport = Transport::Tcp;
    }
    if let Some(camera) = cli.camera {
        settings.camera_index = camera;
    }
    if let Some(fps) = cli.fps {
        settings.set_fps(fps);
    }
    if cli.stream {
        settings.publish_video = true;
    }
}

fn run_dashboard(settings: Settings, config_path: PathBuf) -> Result<()> {
    let (events_tx, events_rx) = unbounded();
    logging::init_panel(events_tx.clone())?;
    log::info!("gesture-relay {} starting", env!("CARGO_PKG_VERSION"));

    let latest: LatestFrame = Arc::new(Mutex::new(None));
    let (frame_tx, frame_rx) = bounded(1);
    let (tracked_tx, tracked_rx) = bounded(1);

    let _camera = start_capture(&settings, frame_tx, events_tx.clone());
    let _tracker = pipeline::start_tracker(frame_rx, tracked_tx, latest.clone(), events_tx.clone());

    let mut app = App::new(settings, config_path, latest, events_tx);
    let result = ui::run(&mut app, tracked_rx, events_rx);
    app.shutdown();
    result
}

/// Pipeline without a dashboard: auto-connects, always publishes hand
/// state, streams video when asked to. Ends when the connection does.
fn run_headless(settings: Settings, config_path: PathBuf) -> Result<()> {
    logging::init_headless();
    log::info!("gesture-relay {} headless", env!("CARGO_PKG_VERSION"));

    let (events_tx, events_rx) = unbounded();
    let latest: LatestFrame = Arc::new(Mutex::new(None));
    let (frame_tx, frame_rx) = bounded(1);
    let (tracked_tx, tracked_rx) = bounded(1);

    let _camera = start_capture(&settings, frame_tx, events_tx.clone());
    let _tracker = pipeline::start_tracker(frame_rx, tracked_tx, latest.clone(), events_tx.clone());

    let mut app = App::new(settings, config_path, latest, events_tx);
    app.settings.publish_hand = true;
    app.connect();

    loop {
        crossbeam_channel::select! {
            recv(events_rx) -> event => match event {
                Ok(event) => {
                    let fatal = matches!(
                        event,
                        AppEvent::ConnectionFailed(_)
                            | AppEvent::ConnectionLost(_)
                            | AppEvent::Disconnected
                    );
                    app.handle_event(event);
                    if fatal {
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(tracked_rx) -> tracked => match tracked {
                Ok(tracked) => app.on_tracked_frame(&tracked),
                // Capture side is gone; nothing left to relay.
                Err(_) => break,
            },
        }
    }

    app.shutdown();
    Ok(())
}

#[cfg(feature = "camera-nokhwa")]
fn start_capture(
    settings: &Settings,
    frame_tx: crossbeam_channel::Sender<Frame>,
    events: crossbeam_channel::Sender<AppEvent>,
) -> Option<pipeline::CameraStream> {
    use nokhwa::utils::CameraIndex;

    match pipeline::start_camera_stream(
        CameraIndex::Index(settings.camera_index),
        frame_tx,
        events.clone(),
    ) {
        Ok(stream) => Some(stream),
        Err(err) => {
            log::error!("failed to start camera {}: {err:#}", settings.camera_index);
            let _ = events.send(AppEvent::Camera(types::CameraStatus::Error(
                err.to_string(),
            )));
            None
        }
    }
}

#[cfg(not(feature = "camera-nokhwa"))]
fn start_capture(
    _settings: &Settings,
    frame_tx: crossbeam_channel::Sender<Frame>,
    events: crossbeam_channel::Sender<AppEvent>,
) {
    // Closing the frame channel lets the tracker wind down on its own.
    drop(frame_tx);
    let _ = events.send(AppEvent::Camera(types::CameraStatus::Error(
        "built without camera support".to_string(),
    )));
}

#[cfg(feature = "camera-nokhwa")]
fn list_cameras() -> Result<()> {
    let cameras = pipeline::available_cameras()?;
    if cameras.is_empty() {
        println!("no cameras found");
        return Ok(());
    }
    for device in cameras {
        println!("{}: {}", device.index, device.label);
    }
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn list_cameras() -> Result<()> {
    anyhow::bail!("built without camera support")
}
