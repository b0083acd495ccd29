use std::{path::Path, thread};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    common::{self, HandInference},
    palm::{PalmDetector, PalmDetectorConfig, crop_from_palm, pick_primary_region},
    run_worker_loop,
};
use crate::model_download::{self, ModelDownloadEvent, ModelKind};
use crate::types::{AppEvent, Frame, LatestFrame, ModelStatus, TrackedFrame};

pub fn start_worker(
    frame_rx: Receiver<Frame>,
    tracked_tx: Sender<TrackedFrame>,
    latest: LatestFrame,
    events: Sender<AppEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let _ = events.send(AppEvent::Model(ModelStatus::Loading));

        let hand_path = model_download::default_handpose_model_path();
        let palm_path = model_download::default_palm_model_path();

        let progress = events.clone();
        if let Err(err) = model_download::ensure_models_ready(&hand_path, &palm_path, |event| {
            if let Some(status) = download_status(&event) {
                let _ = progress.send(AppEvent::Model(status));
            }
        }) {
            log::error!("failed to prepare tracking models: {err:?}");
            let _ = events.send(AppEvent::Model(ModelStatus::Failed(err.to_string())));
            return;
        }

        let engine = match OrtEngine::new(&hand_path, &palm_path) {
            Ok(engine) => {
                log::info!(
                    "hand tracker ready with {} and {}",
                    hand_path.display(),
                    palm_path.display()
                );
                let _ = events.send(AppEvent::Model(ModelStatus::Ready));
                engine
            }
            Err(err) => {
                log::error!("failed to load tracking models: {err:?}");
                let _ = events.send(AppEvent::Model(ModelStatus::Failed(err.to_string())));
                return;
            }
        };

        run_worker_loop(engine, frame_rx, tracked_tx, latest);
    })
}

fn download_status(event: &ModelDownloadEvent) -> Option<ModelStatus> {
    match event {
        ModelDownloadEvent::Started { model, .. } => Some(ModelStatus::Downloading {
            name: model.label(),
            percent: 0,
        }),
        ModelDownloadEvent::Progress {
            model,
            downloaded,
            total,
        } => Some(ModelStatus::Downloading {
            name: model.label(),
            percent: percent_of(*downloaded, *total),
        }),
        ModelDownloadEvent::AlreadyPresent { .. } | ModelDownloadEvent::Finished { .. } => None,
    }
}

fn percent_of(downloaded: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => ((downloaded * 100) / total).min(100) as u8,
        _ => 0,
    }
}

struct OrtEngine {
    handpose: Session,
    palm: PalmDetector,
}

impl OrtEngine {
    fn new(handpose_path: &Path, palm_path: &Path) -> Result<Self> {
        let handpose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(handpose_path)
            .with_context(|| {
                format!("failed to load handpose model from {}", handpose_path.display())
            })?;

        let palm = PalmDetector::new(palm_path, PalmDetectorConfig::default())?;

        Ok(Self { handpose, palm })
    }
}

impl super::TrackerEngine for OrtEngine {
    fn infer(&mut self, frame: &Frame) -> Result<HandInference> {
        let regions = self.palm.detect(frame).unwrap_or_else(|err| {
            log::warn!("palm detection failed: {err:?}");
            Vec::new()
        });

        let Some(selected) = pick_primary_region(&regions) else {
            return Ok(HandInference::none());
        };

        let (center, side, angle) = crop_from_palm(selected);
        let (input, transform) =
            common::rotated_crop_tensor(frame, center, side, angle, common::HAND_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run handpose session")?;
        if outputs.len() == 0 {
            return Err(anyhow!("handpose model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flat: Vec<f32> = coords.iter().copied().collect();
        let landmarks = common::decode_landmarks(&flat)?;

        let confidence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };

        let projected = common::project_from_crop(&landmarks, &transform);

        Ok(HandInference {
            landmarks,
            projected,
            confidence: (confidence * selected.score).clamp(0.0, 1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_handles_unknown_total() {
        assert_eq!(percent_of(512, None), 0);
        assert_eq!(percent_of(50, Some(200)), 25);
        assert_eq!(percent_of(400, Some(200)), 100);
    }
}
