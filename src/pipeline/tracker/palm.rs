use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use crate::types::Frame;

use super::common::{LetterboxInfo, PALM_INPUT_SIZE, letterbox_tensor};

const PALM_LANDMARKS: usize = 7;
const BOX_FEATURES: usize = 4 + PALM_LANDMARKS * 2;

/// Anchor grid of the 192x192 full-range palm model: strides
/// [8, 16, 16, 16], so a 24x24 layer with 2 anchors per cell and a
/// 12x12 layer with 6. Centers only; the model regresses sizes.
const ANCHOR_LAYERS: [(usize, usize); 2] = [(24, 2), (12, 6)];
pub const NUM_ANCHORS: usize = 24 * 24 * 2 + 12 * 12 * 6;

fn generate_anchors() -> Vec<(f32, f32)> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (cells, per_cell) in ANCHOR_LAYERS {
        for y in 0..cells {
            for x in 0..cells {
                let cx = (x as f32 + 0.5) / cells as f32;
                let cy = (y as f32 + 0.5) / cells as f32;
                for _ in 0..per_cell {
                    anchors.push((cx, cy));
                }
            }
        }
    }
    anchors
}

/// One decoded palm detection in source-frame pixels.
#[derive(Clone, Debug)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub landmarks: Vec<(f32, f32)>,
    pub score: f32,
}

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 32,
        }
    }
}

pub struct PalmDetector {
    session: Session,
    cfg: PalmDetectorConfig,
    anchors: Vec<(f32, f32)>,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            cfg,
            anchors: generate_anchors(),
        })
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = letterbox_tensor(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;
        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let box_shape = boxes.shape().to_vec();
        let score_shape = scores.shape().to_vec();

        decode_palm_outputs(
            boxes
                .as_slice()
                .ok_or_else(|| anyhow!("palm boxes not contiguous"))?,
            &box_shape,
            scores
                .as_slice()
                .ok_or_else(|| anyhow!("palm scores not contiguous"))?,
            &score_shape,
            &self.anchors,
            &letterbox,
            &self.cfg,
        )
    }
}

/// Decodes raw SSD outputs into frame-space regions: anchor-relative
/// deltas scaled by the model input size, sigmoid scores, letterbox
/// inversion, then NMS.
fn decode_palm_outputs(
    boxes: &[f32],
    box_shape: &[usize],
    scores: &[f32],
    score_shape: &[usize],
    anchors: &[(f32, f32)],
    letterbox: &LetterboxInfo,
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    let (anchor_dim, feature_dim) = trailing_dims(box_shape)
        .ok_or_else(|| anyhow!("unexpected palm box shape {box_shape:?}"))?;
    let (score_anchor_dim, score_feature_dim) = trailing_dims(score_shape)
        .ok_or_else(|| anyhow!("unexpected palm score shape {score_shape:?}"))?;

    if feature_dim < BOX_FEATURES {
        return Err(anyhow!("palm box feature dimension too small: {feature_dim}"));
    }
    if anchor_dim != score_anchor_dim {
        return Err(anyhow!(
            "anchor dimension mismatch: boxes {anchor_dim}, scores {score_anchor_dim}"
        ));
    }
    if boxes.len() < anchor_dim * feature_dim || scores.len() < anchor_dim * score_feature_dim {
        return Err(anyhow!("palm detector output shorter than its shape"));
    }

    let count = anchors.len().min(anchor_dim);
    let pad_bias_x = letterbox.pad_x / letterbox.scale;
    let pad_bias_y = letterbox.pad_y / letterbox.scale;
    let scale = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let input_size = PALM_INPUT_SIZE as f32;

    let mut candidates = Vec::new();
    for (idx, &(ax, ay)) in anchors.iter().enumerate().take(count) {
        let score = sigmoid(scores[idx * score_feature_dim]);
        if score < cfg.score_threshold {
            continue;
        }

        let features = &boxes[idx * feature_dim..idx * feature_dim + BOX_FEATURES];
        let cx = features[0] / input_size + ax;
        let cy = features[1] / input_size + ay;
        let hw = features[2] / input_size / 2.0;
        let hh = features[3] / input_size / 2.0;

        let mut x1 = (cx - hw) * scale - pad_bias_x;
        let mut y1 = (cy - hh) * scale - pad_bias_y;
        let mut x2 = (cx + hw) * scale - pad_bias_x;
        let mut y2 = (cy + hh) * scale - pad_bias_y;
        if x2 <= x1 || y2 <= y1 {
            continue;
        }
        clamp_box(&mut x1, &mut y1, &mut x2, &mut y2, letterbox.orig_w, letterbox.orig_h);

        let landmarks = (0..PALM_LANDMARKS)
            .map(|l| {
                let lx = features[4 + l * 2] / input_size + ax;
                let ly = features[4 + l * 2 + 1] / input_size + ay;
                (lx * scale - pad_bias_x, ly * scale - pad_bias_y)
            })
            .collect();

        candidates.push(PalmRegion {
            bbox: [x1, y1, x2, y2],
            landmarks,
            score,
        });
    }

    let kept = nms(&candidates, cfg.nms_threshold, cfg.top_k);
    Ok(kept
        .into_iter()
        .filter_map(|idx| candidates.get(idx).cloned())
        .collect())
}

/// Last two dimensions of a shape, for outputs that may or may not
/// carry a leading batch axis.
fn trailing_dims(shape: &[usize]) -> Option<(usize, usize)> {
    if shape.len() < 2 {
        return None;
    }
    Some((shape[shape.len() - 2], shape[shape.len() - 1]))
}

pub fn pick_primary_region(regions: &[PalmRegion]) -> Option<&PalmRegion> {
    regions
        .iter()
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal))
}

/// Square crop around the palm: centered on its landmarks, sides
/// expanded well past the palm so the fingers stay inside, rotated to
/// the palm's principal axis.
pub fn crop_from_palm(region: &PalmRegion) -> ((f32, f32), f32, f32) {
    let center = if region.landmarks.is_empty() {
        (
            (region.bbox[0] + region.bbox[2]) * 0.5,
            (region.bbox[1] + region.bbox[3]) * 0.5,
        )
    } else {
        let (sum_x, sum_y) = region
            .landmarks
            .iter()
            .fold((0.0_f32, 0.0_f32), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        (
            sum_x / region.landmarks.len() as f32,
            sum_y / region.landmarks.len() as f32,
        )
    };

    let base_w = (region.bbox[2] - region.bbox[0]).abs();
    let base_h = (region.bbox[3] - region.bbox[1]).abs();
    let landmark_span = if region.landmarks.is_empty() {
        0.0
    } else {
        let (min_x, max_x, min_y, max_y) = region
            .landmarks
            .iter()
            .fold((f32::MAX, f32::MIN, f32::MAX, f32::MIN), |acc, (x, y)| {
                (acc.0.min(*x), acc.1.max(*x), acc.2.min(*y), acc.3.max(*y))
            });
        (max_x - min_x).max(max_y - min_y)
    };
    let side = base_w.max(base_h).max(landmark_span).max(80.0) * 2.4;

    (center, side, estimate_orientation(region))
}

/// Palm orientation from the principal axis of its landmarks, offset
/// so the crop presents the hand upright to the estimator.
pub fn estimate_orientation(region: &PalmRegion) -> f32 {
    if region.landmarks.len() < 2 {
        return 0.0;
    }

    let n = region.landmarks.len() as f32;
    let (sum_x, sum_y) = region
        .landmarks
        .iter()
        .fold((0.0_f32, 0.0_f32), |acc, (x, y)| (acc.0 + x, acc.1 + y));
    let mean = (sum_x / n, sum_y / n);

    let mut cov_xx = 0.0;
    let mut cov_xy = 0.0;
    let mut cov_yy = 0.0;
    for (x, y) in &region.landmarks {
        let dx = x - mean.0;
        let dy = y - mean.1;
        cov_xx += dx * dx;
        cov_xy += dx * dy;
        cov_yy += dy * dy;
    }
    cov_xx /= n;
    cov_xy /= n;
    cov_yy /= n;

    let trace = cov_xx + cov_yy;
    let det = cov_xx * cov_yy - cov_xy * cov_xy;
    let lambda1 = (trace * 0.5 + ((trace * 0.5).powi(2) - det).max(0.0).sqrt()).max(1e-6);
    let (vx, vy) = if cov_xy.abs() > 1e-6 {
        (lambda1 - cov_yy, cov_xy)
    } else if cov_xx >= cov_yy {
        (1.0, 0.0)
    } else {
        (0.0, 1.0)
    };

    vy.atan2(vx) - PI * 0.5
}

fn nms(candidates: &[PalmRegion], threshold: f32, top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| {
        candidates[*b]
            .score
            .partial_cmp(&candidates[*a].score)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    'outer: for &idx in &order {
        for &k in &keep {
            if iou(&candidates[idx].bbox, &candidates[k].bbox) >= threshold {
                continue 'outer;
            }
        }
        keep.push(idx);
        if keep.len() >= top_k {
            break;
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn clamp_box(x1: &mut f32, y1: &mut f32, x2: &mut f32, y2: &mut f32, w: u32, h: u32) {
    let max_w = (w.saturating_sub(1)) as f32;
    let max_h = (h.saturating_sub(1)) as f32;
    *x1 = x1.clamp(0.0, max_w);
    *y1 = y1.clamp(0.0, max_h);
    *x2 = x2.clamp(0.0, max_w);
    *y2 = y2.clamp(0.0, max_h);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(bbox: [f32; 4], score: f32) -> PalmRegion {
        PalmRegion {
            bbox,
            landmarks: Vec::new(),
            score,
        }
    }

    #[test]
    fn test_anchor_table_shape() {
        let anchors = generate_anchors();
        assert_eq!(anchors.len(), NUM_ANCHORS);
        assert_eq!(anchors.len(), 2016);
        // First cell of the stride-8 layer, both anchors at its center.
        assert_eq!(anchors[0], (0.5 / 24.0, 0.5 / 24.0));
        assert_eq!(anchors[1], anchors[0]);
        // First cell of the stride-16 layer.
        assert_eq!(anchors[24 * 24 * 2], (0.5 / 12.0, 0.5 / 12.0));
        // Every anchor is a normalized center.
        assert!(anchors.iter().all(|&(x, y)| (0.0..1.0).contains(&x) && (0.0..1.0).contains(&y)));
    }

    #[test]
    fn test_sigmoid_midpoint() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_iou_extremes() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    }

    #[test]
    fn test_nms_suppresses_overlaps() {
        let candidates = vec![
            region([0.0, 0.0, 10.0, 10.0], 0.9),
            region([1.0, 1.0, 11.0, 11.0], 0.8),
            region([50.0, 50.0, 60.0, 60.0], 0.7),
        ];
        let kept = nms(&candidates, 0.3, 32);
        assert_eq!(kept, vec![0, 2]);
    }

    #[test]
    fn test_nms_honors_top_k() {
        let candidates = vec![
            region([0.0, 0.0, 10.0, 10.0], 0.9),
            region([50.0, 50.0, 60.0, 60.0], 0.8),
            region([100.0, 100.0, 110.0, 110.0], 0.7),
        ];
        assert_eq!(nms(&candidates, 0.3, 2).len(), 2);
    }

    #[test]
    fn test_crop_side_has_a_floor() {
        let r = region([10.0, 10.0, 14.0, 14.0], 0.9);
        let (center, side, angle) = crop_from_palm(&r);
        assert_eq!(center, (12.0, 12.0));
        assert_eq!(side, 80.0 * 2.4);
        assert_eq!(angle, 0.0);
    }

    #[test]
    fn test_orientation_of_horizontal_palm() {
        let r = PalmRegion {
            bbox: [0.0, 0.0, 100.0, 20.0],
            landmarks: (0..7).map(|i| (i as f32 * 10.0, 5.0)).collect(),
            score: 0.9,
        };
        // Principal axis along x, rotated down by a quarter turn.
        assert!((estimate_orientation(&r) + PI * 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_decode_turns_one_hot_anchor_into_region() {
        let anchors = generate_anchors();
        let mut boxes = vec![0.0f32; NUM_ANCHORS * BOX_FEATURES];
        let mut scores = vec![-20.0f32; NUM_ANCHORS];
        // Anchor 0 fires with a 48px box (in model-input units).
        scores[0] = 10.0;
        boxes[2] = 48.0;
        boxes[3] = 48.0;

        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: 192,
            orig_h: 192,
        };
        let regions = decode_palm_outputs(
            &boxes,
            &[1, NUM_ANCHORS, BOX_FEATURES],
            &scores,
            &[1, NUM_ANCHORS, 1],
            &anchors,
            &letterbox,
            &PalmDetectorConfig::default(),
        )
        .unwrap();

        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert!(r.score > 0.999);
        // Center (0.5/24)*192 = 4, half side 24, clamped at the frame edge.
        assert_eq!(r.bbox[0], 0.0);
        assert_eq!(r.bbox[1], 0.0);
        assert!((r.bbox[2] - 28.0).abs() < 1e-3);
        assert!((r.bbox[3] - 28.0).abs() < 1e-3);
        assert_eq!(r.landmarks.len(), PALM_LANDMARKS);
        assert!((r.landmarks[0].0 - 4.0).abs() < 1e-4);
        assert!((r.landmarks[0].1 - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_rejects_shape_mismatch() {
        let anchors = generate_anchors();
        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: 192,
            orig_h: 192,
        };
        let result = decode_palm_outputs(
            &[0.0; 18],
            &[1, NUM_ANCHORS, BOX_FEATURES],
            &[0.0; 1],
            &[1, NUM_ANCHORS, 1],
            &anchors,
            &letterbox,
            &PalmDetectorConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_pick_primary_takes_highest_score() {
        let regions = vec![
            region([0.0, 0.0, 1.0, 1.0], 0.4),
            region([0.0, 0.0, 1.0, 1.0], 0.9),
            region([0.0, 0.0, 1.0, 1.0], 0.6),
        ];
        let best = pick_primary_region(&regions).unwrap();
        assert_eq!(best.score, 0.9);
    }
}
