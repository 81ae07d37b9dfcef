//! Bridge between files on disk and [`durometer_core::RgbaImage`], plus the
//! pixel operations delegated to `image::imageops`.

use crate::core::{ImageError, ImageInfo, RgbaImage};
use crate::map::OVERLAY_MARGIN;
use image::{imageops, DynamicImage, ImageFormat, ImageReader};
use std::fs;
use std::path::Path;

fn decode_error(path: &Path, e: impl std::fmt::Display) -> ImageError {
    ImageError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn encode_error(path: &Path, e: impl std::fmt::Display) -> ImageError {
    ImageError::Encode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn to_buffer(img: &RgbaImage) -> Result<image::RgbaImage, ImageError> {
    image::RgbaImage::from_raw(img.width as u32, img.height as u32, img.data.clone()).ok_or(
        ImageError::BufferSize {
            width: img.width,
            height: img.height,
        },
    )
}

fn from_buffer(buf: image::RgbaImage) -> RgbaImage {
    let (w, h) = buf.dimensions();
    RgbaImage {
        width: w as usize,
        height: h as usize,
        data: buf.into_raw(),
    }
}

/// Pixel size of the image at `path` without decoding the pixel data.
pub fn load_image_info(path: impl AsRef<Path>) -> Result<ImageInfo, ImageError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ImageError::FileNotFound(path.to_path_buf()));
    }
    let (width, height) = image::image_dimensions(path).map_err(|e| decode_error(path, e))?;
    log::debug!("{}: {width}x{height}", path.display());
    Ok(ImageInfo {
        path: path.to_path_buf(),
        width,
        height,
    })
}

/// Decode the image at `path` into RGBA.
pub fn load_rgba(path: impl AsRef<Path>) -> Result<RgbaImage, ImageError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ImageError::FileNotFound(path.to_path_buf()));
    }
    let decoded = ImageReader::open(path)
        .map_err(|e| decode_error(path, e))?
        .with_guessed_format()
        .map_err(|e| decode_error(path, e))?
        .decode()
        .map_err(|e| decode_error(path, e))?
        .to_rgba8();
    Ok(from_buffer(decoded))
}

/// Write `img` as PNG, creating the parent directory when needed.
pub fn save_png(img: &RgbaImage, path: impl AsRef<Path>) -> Result<(), ImageError> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| encode_error(path, e))?;
    }
    let buf = to_buffer(img)?;
    buf.save_with_format(path, ImageFormat::Png)
        .map_err(|e| encode_error(path, e))?;
    log::info!("wrote {}", path.display());
    Ok(())
}

/// Grayscale and/or colour negative of `img`; alpha is kept.
pub fn adjust(img: &RgbaImage, grayscale: bool, invert: bool) -> Result<RgbaImage, ImageError> {
    let mut buf = to_buffer(img)?;
    if grayscale {
        buf = DynamicImage::ImageRgba8(buf).grayscale().to_rgba8();
    }
    if invert {
        imageops::invert(&mut buf);
    }
    Ok(from_buffer(buf))
}

/// `surface` on a white canvas, inset by [`OVERLAY_MARGIN`], with `rings`
/// (from [`crate::map::point_rings`]) blended on top.
pub fn compose_overlay(surface: &RgbaImage, rings: &RgbaImage) -> Result<RgbaImage, ImageError> {
    let mut canvas = image::RgbaImage::from_pixel(
        rings.width as u32,
        rings.height as u32,
        image::Rgba([255, 255, 255, 255]),
    );
    let m = OVERLAY_MARGIN as i64;
    imageops::overlay(&mut canvas, &to_buffer(surface)?, m, m);
    imageops::overlay(&mut canvas, &to_buffer(rings)?, 0, 0);
    Ok(from_buffer(canvas))
}
