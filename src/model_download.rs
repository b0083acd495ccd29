use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

const HANDPOSE_MODEL_FILENAME: &str = "handpose_estimation_mediapipe_2023feb.onnx";
const HANDPOSE_MODEL_URL: &str = "https://media.githubusercontent.com/media/opencv/opencv_zoo/main/models/handpose_estimation_mediapipe/handpose_estimation_mediapipe_2023feb.onnx";
const PALM_MODEL_FILENAME: &str = "palm_detection_mediapipe_2023feb.onnx";
const PALM_MODEL_URL: &str = "https://media.githubusercontent.com/media/opencv/opencv_zoo/main/models/palm_detection_mediapipe/palm_detection_mediapipe_2023feb.onnx";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    Handpose,
    Palm,
}

impl ModelKind {
    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::Handpose => "handpose estimator",
            ModelKind::Palm => "palm detector",
        }
    }

    fn url(&self) -> &'static str {
        match self {
            ModelKind::Handpose => HANDPOSE_MODEL_URL,
            ModelKind::Palm => PALM_MODEL_URL,
        }
    }
}

pub fn default_handpose_model_path() -> PathBuf {
    PathBuf::from("models").join(HANDPOSE_MODEL_FILENAME)
}

pub fn default_palm_model_path() -> PathBuf {
    PathBuf::from("models").join(PALM_MODEL_FILENAME)
}

#[derive(Clone, Debug)]
pub enum ModelDownloadEvent {
    AlreadyPresent {
        model: ModelKind,
    },
    Started {
        model: ModelKind,
        total: Option<u64>,
    },
    Progress {
        model: ModelKind,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        model: ModelKind,
    },
}

/// Makes sure both ONNX files exist, downloading whatever is missing.
/// The palm detector comes first since the pipeline needs it first.
pub fn ensure_models_ready<F>(
    handpose_path: &Path,
    palm_path: &Path,
    mut on_event: F,
) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    ensure_model_ready(ModelKind::Palm, palm_path, &mut on_event)?;
    ensure_model_ready(ModelKind::Handpose, handpose_path, &mut on_event)
}

pub fn ensure_model_ready<F>(kind: ModelKind, path: &Path, on_event: &mut F) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    if path.exists() {
        on_event(ModelDownloadEvent::AlreadyPresent { model: kind });
        on_event(ModelDownloadEvent::Finished { model: kind });
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    download_to_path(kind, kind.url(), path, on_event)
        .with_context(|| format!("failed to download {} model to {}", kind.label(), path.display()))
}

fn download_to_path<F>(
    model: ModelKind,
    url: &str,
    dest: &Path,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    log::info!(
        "downloading {} model from {url} to {}",
        model.label(),
        dest.display()
    );

    let client = Client::new();
    let mut response = client
        .get(url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let total_size = response.content_length();
    on_event(ModelDownloadEvent::Started {
        model,
        total: total_size,
    });

    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = response
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .context("failed while writing model to disk")?;
        downloaded += bytes_read as u64;
        on_event(ModelDownloadEvent::Progress {
            model,
            downloaded,
            total: total_size,
        });
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")?;
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move temp model {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    on_event(ModelDownloadEvent::Finished { model });
    Ok(())
}

/// Terminal variant for headless runs and `--fetch-models`: same
/// ensure pass, with an indicatif bar per download.
pub fn fetch_models_with_progress(handpose_path: &Path, palm_path: &Path) -> anyhow::Result<()> {
    let mut progress: Option<ProgressBar> = None;
    ensure_models_ready(handpose_path, palm_path, |event| match &event {
        ModelDownloadEvent::AlreadyPresent { model } => {
            println!("{} model already present", model.label());
        }
        ModelDownloadEvent::Started { total, .. } => {
            progress = Some(create_progress_bar(*total));
        }
        ModelDownloadEvent::Progress { downloaded, .. } => {
            if let Some(pb) = progress.as_ref() {
                pb.set_position(*downloaded);
            }
        }
        ModelDownloadEvent::Finished { model } => {
            if let Some(pb) = progress.take() {
                pb.finish_with_message(format!("{} model ready", model.label()));
            }
        }
    })
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} downloading model") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_model_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PALM_MODEL_FILENAME);
        fs::write(&path, b"onnx").unwrap();

        let mut events = Vec::new();
        ensure_model_ready(ModelKind::Palm, &path, &mut |e| events.push(e)).unwrap();

        assert!(matches!(
            events[0],
            ModelDownloadEvent::AlreadyPresent {
                model: ModelKind::Palm
            }
        ));
        assert!(matches!(
            events[1],
            ModelDownloadEvent::Finished {
                model: ModelKind::Palm
            }
        ));
    }
}
