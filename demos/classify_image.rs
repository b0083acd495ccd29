#[allow(dead_code)]
#[path = "../src/gesture.rs"]
mod gesture;
#[allow(dead_code)]
#[path = "../src/model_download.rs"]
mod model_download;
#[allow(dead_code)]
#[path = "../src/types.rs"]
mod types;

#[allow(dead_code)]
#[path = "../src/pipeline/tracker/common.rs"]
mod common;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use model_download::ModelKind;
use types::{Frame, GestureState};

// Single-stage variant: the whole image is letterboxed into the
// handpose estimator, no palm detection pass. Good enough for photos
// where the hand fills most of the frame.
const PRESENCE_THRESHOLD: f32 = 0.5;

fn main() -> Result<()> {
    env_logger::init();

    let image_paths: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if image_paths.is_empty() {
        anyhow::bail!("usage: classify_image <image>...");
    }

    let model_path = model_download::default_handpose_model_path();
    model_download::ensure_model_ready(ModelKind::Handpose, &model_path, &mut |_| {})?;

    let mut session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(&model_path)
        .with_context(|| format!("failed to load {}", model_path.display()))?;

    for path in &image_paths {
        let frame =
            load_frame(path).with_context(|| format!("failed to read {}", path.display()))?;
        let (state, confidence) = classify_frame(&mut session, &frame)?;
        println!(
            "{}: {} (confidence {confidence:.2})",
            path.display(),
            state.payload()
        );
    }

    Ok(())
}

fn load_frame(path: &Path) -> Result<Frame> {
    let rgb = image::open(path)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Frame {
        rgb: rgb.into_raw(),
        width,
        height,
        timestamp: Instant::now(),
    })
}

fn classify_frame(session: &mut Session, frame: &Frame) -> Result<(GestureState, f32)> {
    let (input, letterbox) = common::letterbox_tensor(frame, common::HAND_INPUT_SIZE)?;
    let tensor = Tensor::from_array(input)?;
    let outputs = session
        .run(ort::inputs![tensor])
        .context("failed to run handpose session")?;
    if outputs.len() == 0 {
        anyhow::bail!("handpose model returned no outputs");
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

    if confidence < PRESENCE_THRESHOLD {
        return Ok((GestureState::NoHand, confidence));
    }

    let projected = common::project_landmarks(&landmarks, &letterbox);
    Ok((gesture::classify(Some(&projected)), confidence))
}
