use anyhow::{Result, anyhow};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

/// Byte layouts a camera may hand us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    Nv12,
    Yuyv,
    Mjpeg,
    Rgb,
    Bgr,
    Gray,
}

#[cfg(feature = "camera-nokhwa")]
pub fn convert_camera_frame(buffer: &nokhwa::Buffer) -> Result<Frame> {
    use nokhwa::utils::FrameFormat;

    let resolution = buffer.resolution();
    let layout = match buffer.source_frame_format() {
        FrameFormat::NV12 => PixelLayout::Nv12,
        FrameFormat::YUYV => PixelLayout::Yuyv,
        FrameFormat::MJPEG => PixelLayout::Mjpeg,
        FrameFormat::RAWRGB => PixelLayout::Rgb,
        FrameFormat::RAWBGR => PixelLayout::Bgr,
        FrameFormat::GRAY => PixelLayout::Gray,
    };
    to_frame(
        layout,
        buffer.buffer(),
        resolution.width_x,
        resolution.height_y,
    )
}

/// Decodes one camera buffer into an RGBA frame. For MJPEG the dimensions
/// come from the JPEG header rather than the declared geometry.
pub fn to_frame(layout: PixelLayout, data: &[u8], width: u32, height: u32) -> Result<Frame> {
    let (rgba, width, height) = match layout {
        PixelLayout::Nv12 => (nv12_to_rgba(data, width, height)?, width, height),
        PixelLayout::Yuyv => (yuyv_to_rgba(data, width, height)?, width, height),
        PixelLayout::Mjpeg => mjpeg_to_rgba(data)?,
        PixelLayout::Rgb => (rgb_like_to_rgba(data, width, height, false)?, width, height),
        PixelLayout::Bgr => (rgb_like_to_rgba(data, width, height, true)?, width, height),
        PixelLayout::Gray => (gray_to_rgba(data, width, height)?, width, height),
    };
    Ok(Frame::new(rgba, width, height))
}

fn ensure_len(kind: &str, data: &[u8], expected_len: usize) -> Result<()> {
    if data.len() < expected_len {
        return Err(anyhow!(
            "{kind} buffer too small: got {}, expected {expected_len}",
            data.len()
        ));
    }
    Ok(())
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = pixel_count(width, height);
    let uv_plane_len = y_plane_len / 2;
    ensure_len("NV12", data, y_plane_len + uv_plane_len)?;

    let mut rgba = vec![0u8; y_plane_len * 4];
    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };

    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    ensure_len("YUYV", data, pixel_count(width, height) * 2)?;

    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn mjpeg_to_rgba(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder returned no image info"))?;
    let width = u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width out of range"))?;
    let height = u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height out of range"))?;
    let expected_len = pixel_count(width, height) * 4;
    if rgba.len() < expected_len {
        return Err(anyhow!(
            "MJPEG decode produced too few bytes: got {}, expected {expected_len}",
            rgba.len()
        ));
    }

    Ok((rgba, width, height))
}

fn rgb_like_to_rgba(data: &[u8], width: u32, height: u32, swap_rb: bool) -> Result<Vec<u8>> {
    ensure_len("RGB", data, pixel_count(width, height) * 3)?;

    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            let (r, b) = if swap_rb { (src[2], src[0]) } else { (src[0], src[2]) };
            dst.copy_from_slice(&[r, src[1], b, 255]);
        });

    Ok(rgba)
}

fn gray_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = pixel_count(width, height);
    ensure_len("GRAY", data, expected_len)?;

    let mut rgba = vec![0u8; expected_len * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_iter().copied())
        .for_each(|(dst, value)| dst.copy_from_slice(&[value, value, value, 255]));

    Ok(rgba)
}
