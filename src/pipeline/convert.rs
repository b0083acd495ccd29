use anyhow::{Result, anyhow};
#[cfg(feature = "camera-nokhwa")]
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgb, yuyv422_to_rgb,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

/// Packed RGB24 pixels plus dimensions, the working format for the
/// whole pipeline (tensors, annotation and JPEG encode all take RGB).
#[derive(Debug)]
pub struct RgbFrame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[cfg(feature = "camera-nokhwa")]
pub fn convert_camera_frame(frame: &Buffer) -> Result<RgbFrame> {
    let resolution = frame.resolution();
    let width = resolution.width_x;
    let height = resolution.height_y;
    let data = frame.buffer();

    let rgb = match frame.source_frame_format() {
        FrameFormat::NV12 => nv12_to_rgb(data, width, height)?,
        FrameFormat::YUYV => yuyv_to_rgb(data, width, height)?,
        FrameFormat::MJPEG => mjpeg_to_rgb(data)?,
        FrameFormat::RAWRGB => raw_rgb_to_rgb(data, width, height)?,
        FrameFormat::RAWBGR => bgr_to_rgb(data, width, height)?,
        FrameFormat::GRAY => gray_to_rgb(data, width, height)?,
    };

    Ok(RgbFrame { rgb, width, height })
}

fn nv12_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = y_plane_len / 2;

    if data.len() < y_plane_len + uv_plane_len {
        return Err(anyhow!(
            "NV12 buffer too small: got {}, expected {}",
            data.len(),
            y_plane_len + uv_plane_len
        ));
    }

    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };

    let mut rgb = vec![0u8; y_plane_len * 3];
    yuv_nv12_to_rgb(
        &image,
        &mut rgb,
        width * 3,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGB failed: {err:?}"))?;

    Ok(rgb)
}

fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 2;
    if data.len() < expected_len {
        return Err(anyhow!(
            "YUYV buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    let mut rgb = vec![0u8; (width as usize * height as usize) * 3];
    yuyv422_to_rgb(
        &packed,
        &mut rgb,
        width * 3,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGB failed: {err:?}"))?;

    Ok(rgb)
}

fn mjpeg_to_rgb(data: &[u8]) -> Result<Vec<u8>> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGB);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgb = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    if let Some(info) = decoder.info() {
        let expected_len = info.width as usize * info.height as usize * 3;
        if rgb.len() < expected_len {
            return Err(anyhow!(
                "MJPEG decode produced too few bytes: got {}, expected {}",
                rgb.len(),
                expected_len
            ));
        }
    }

    Ok(rgb)
}

fn raw_rgb_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 3;
    if data.len() < expected_len {
        return Err(anyhow!(
            "RGB buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }
    Ok(data[..expected_len].to_vec())
}

fn bgr_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 3;
    if data.len() < expected_len {
        return Err(anyhow!(
            "BGR buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgb = vec![0u8; expected_len];
    rgb.par_chunks_mut(3)
        .zip(data[..expected_len].par_chunks_exact(3))
        .for_each(|(dst, src)| {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
        });

    Ok(rgb)
}

fn gray_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize;
    if data.len() < expected_len {
        return Err(anyhow!(
            "GRAY buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgb = vec![0u8; expected_len * 3];
    rgb.par_chunks_mut(3)
        .zip(data[..expected_len].par_iter().copied())
        .for_each(|(dst, value)| {
            dst[0] = value;
            dst[1] = value;
            dst[2] = value;
        });

    Ok(rgb)
}
