use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::gesture::landmark;
use crate::types::Frame;

pub const HAND_INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;

/// Raw output of one two-stage inference pass.
#[derive(Clone, Debug)]
pub struct HandInference {
    /// Landmarks in crop space, straight from the estimator.
    pub landmarks: Vec<[f32; 3]>,
    /// Landmarks projected back onto the source frame, pixels.
    pub projected: Vec<(f32, f32)>,
    pub confidence: f32,
}

impl HandInference {
    pub fn none() -> Self {
        Self {
            landmarks: Vec::new(),
            projected: Vec::new(),
            confidence: 0.0,
        }
    }
}

/// How a frame was scaled and padded into a square model input.
#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// The rotated square crop fed to the handpose estimator, kept around
/// to map its landmarks back to source pixels.
#[derive(Clone, Debug)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

fn check_frame_len(frame: &Frame) -> Result<()> {
    let expected = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(3);
    if frame.rgb.len() != expected {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgb.len(),
            expected
        ));
    }
    Ok(())
}

/// Scales the frame into a `target_size` square with symmetric black
/// padding and returns the normalized NHWC tensor plus the geometry
/// needed to undo it.
pub fn letterbox_tensor(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame_len(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = (frame.width as f32 * scale).round().max(1.0) as u32;
    let new_h = (frame.height as f32 * scale).round().max(1.0) as u32;

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgb.clone(),
        fir::PixelType::U8x3,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x3);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size as i64 - new_w as i64) / 2).max(0) as usize;
    let pad_y = ((target_size as i64 - new_h as i64) / 2).max(0) as usize;
    let dst_stride = target_size as usize * 3;
    let src_stride = new_w as usize * 3;
    let mut canvas = vec![0u8; (target_size as usize) * dst_stride];
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 3;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(3)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec(
        (1, target_size as usize, target_size as usize, 3),
        normalized,
    )
    .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

pub fn decode_landmarks(flat: &[f32]) -> Result<Vec<[f32; 3]>> {
    if flat.len() < landmark::COUNT * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            landmark::COUNT * 3
        ));
    }

    Ok(flat
        .chunks_exact(3)
        .take(landmark::COUNT)
        .map(|chunk| [chunk[0], chunk[1], chunk[2]])
        .collect())
}

/// Maps model-input coordinates back through a letterbox to source
/// pixels, clamped to the frame.
#[allow(dead_code)]
pub fn project_landmarks(landmarks: &[[f32; 3]], letterbox: &LetterboxInfo) -> Vec<(f32, f32)> {
    landmarks
        .iter()
        .map(|[x, y, _z]| {
            let px = (x - letterbox.pad_x) / letterbox.scale;
            let py = (y - letterbox.pad_y) / letterbox.scale;
            (
                px.clamp(0.0, (letterbox.orig_w.saturating_sub(1)) as f32),
                py.clamp(0.0, (letterbox.orig_h.saturating_sub(1)) as f32),
            )
        })
        .collect()
}

/// Samples a rotated square region (bilinear) into a normalized NHWC
/// tensor for the handpose estimator.
pub fn rotated_crop_tensor(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame_len(frame)?;

    let mut data = Vec::with_capacity((output_size as usize).pow(2) * 3);
    let half = output_size as f32 / 2.0;
    let scale = side / output_size as f32;
    let cos = angle.cos();
    let sin = angle.sin();

    for y in 0..output_size {
        let dy = (y as f32 + 0.5 - half) * scale;
        for x in 0..output_size {
            let dx = (x as f32 + 0.5 - half) * scale;
            let src_x = center.0 + dx * cos - dy * sin;
            let src_y = center.1 + dx * sin + dy * cos;
            data.extend_from_slice(&sample_rgb(frame, src_x, src_y));
        }
    }

    let array =
        Array4::<f32>::from_shape_vec((1, output_size as usize, output_size as usize, 3), data)
            .map_err(|err| anyhow!("failed to build crop tensor: {err}"))?;

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((array, transform))
}

pub fn project_from_crop(landmarks: &[[f32; 3]], transform: &CropTransform) -> Vec<(f32, f32)> {
    landmarks
        .iter()
        .map(|[x, y, _z]| transform.project(*x, *y))
        .collect()
}

impl CropTransform {
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.side / self.output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let cos = self.angle.cos();
        let sin = self.angle.sin();
        let ox = self.center.0 + dx * cos - dy * sin;
        let oy = self.center.1 + dx * sin + dy * cos;
        (
            ox.clamp(0.0, (self.orig_w.saturating_sub(1)) as f32),
            oy.clamp(0.0, (self.orig_h.saturating_sub(1)) as f32),
        )
    }
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0, 0.0, 0.0];
    }
    let x0 = x.floor();
    let y0 = y.floor();
    let x1 = x0 + 1.0;
    let y1 = y0 + 1.0;

    let (w, h) = (frame.width as i32, frame.height as i32);
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let ix = cx as i32;
        let iy = cy as i32;
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0, 0.0, 0.0];
        }
        let idx = ((iy as u32 * frame.width + ix as u32) as usize) * 3;
        if idx + 2 >= frame.rgb.len() {
            return [0.0, 0.0, 0.0];
        }
        [
            frame.rgb[idx] as f32 / 255.0,
            frame.rgb[idx + 1] as f32 / 255.0,
            frame.rgb[idx + 2] as f32 / 255.0,
        ]
    };

    let fx = x - x0;
    let fy = y - y0;
    let c00 = fetch(x0, y0);
    let c10 = fetch(x1, y0);
    let c01 = fetch(x0, y1);
    let c11 = fetch(x1, y1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    [
        lerp(lerp(c00[0], c10[0], fx), lerp(c01[0], c11[0], fx), fy),
        lerp(lerp(c00[1], c10[1], fx), lerp(c01[1], c11[1], fx), fy),
        lerp(lerp(c00[2], c10[2], fx), lerp(c01[2], c11[2], fx), fy),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn solid_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame {
            rgb: vec![value; (width * height * 3) as usize],
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn test_letterbox_pads_the_short_axis() {
        let frame = solid_frame(64, 48, 255);
        let (tensor, letterbox) = letterbox_tensor(&frame, 192).unwrap();

        assert_eq!(tensor.shape(), &[1, 192, 192, 3]);
        assert_eq!(letterbox.scale, 3.0);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 24.0);
        // Padding rows stay black, content rows carry the frame.
        assert_eq!(tensor[[0, 0, 96, 0]], 0.0);
        assert_eq!(tensor[[0, 96, 96, 0]], 1.0);
    }

    #[test]
    fn test_letterbox_rejects_wrong_buffer_size() {
        let mut frame = solid_frame(8, 8, 0);
        frame.rgb.pop();
        assert!(letterbox_tensor(&frame, 192).is_err());
    }

    #[test]
    fn test_project_landmarks_inverts_letterbox() {
        let letterbox = LetterboxInfo {
            scale: 3.0,
            pad_x: 0.0,
            pad_y: 24.0,
            orig_w: 64,
            orig_h: 48,
        };
        let projected = project_landmarks(&[[0.0, 24.0, 0.0], [96.0, 96.0, 0.0]], &letterbox);
        assert_eq!(projected[0], (0.0, 0.0));
        assert_eq!(projected[1], (32.0, 24.0));
    }

    #[test]
    fn test_crop_projection_identity() {
        let transform = CropTransform {
            center: (50.0, 50.0),
            side: 100.0,
            angle: 0.0,
            output_size: 100,
            orig_w: 200,
            orig_h: 200,
        };
        assert_eq!(transform.project(50.0, 50.0), (50.0, 50.0));
        assert_eq!(transform.project(0.0, 0.0), (0.0, 0.0));
        assert_eq!(transform.project(100.0, 100.0), (100.0, 100.0));
    }

    #[test]
    fn test_crop_projection_rotates() {
        let transform = CropTransform {
            center: (50.0, 50.0),
            side: 100.0,
            angle: std::f32::consts::FRAC_PI_2,
            output_size: 100,
            orig_w: 200,
            orig_h: 200,
        };
        let (x, y) = transform.project(100.0, 50.0);
        assert!((x - 50.0).abs() < 1e-3);
        assert!((y - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_rotated_crop_samples_frame_values() {
        let frame = solid_frame(4, 4, 128);
        let (tensor, _) = rotated_crop_tensor(&frame, (2.0, 2.0), 4.0, 0.0, 4).unwrap();
        assert_eq!(tensor.shape(), &[1, 4, 4, 3]);
        let v = tensor[[0, 1, 1, 0]];
        assert!((v - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_landmarks_takes_first_21() {
        let flat: Vec<f32> = (0..66).map(|i| i as f32).collect();
        let landmarks = decode_landmarks(&flat).unwrap();
        assert_eq!(landmarks.len(), landmark::COUNT);
        assert_eq!(landmarks[0], [0.0, 1.0, 2.0]);
        assert_eq!(landmarks[20], [60.0, 61.0, 62.0]);
    }

    #[test]
    fn test_decode_landmarks_rejects_short_input() {
        assert!(decode_landmarks(&[0.0; 10]).is_err());
    }
}
