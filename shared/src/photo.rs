//! Normalization of fetched place photos into the cached, string-encoded
//! form stored on a place.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Limits};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::config::PhotoConfig;

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("failed to decode image: {source}")]
    Decode {
        #[from]
        source: image::ImageError,
    },

    #[error("input bytes empty")]
    EmptyInput,

    #[error("input too large: {size} bytes, max {max_size}")]
    InputTooLarge { size: usize, max_size: usize },

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("invalid cached photo encoding: {0}")]
    InvalidEncoding(#[from] hex::FromHexError),

    #[error("photo task failed: {0}")]
    Task(String),
}

/// Decodes `raw_bytes` off the async runtime and returns the cached form.
#[instrument(skip(config, raw_bytes), fields(input_size = raw_bytes.len()))]
pub async fn normalize_photo(
    config: PhotoConfig,
    raw_bytes: Vec<u8>,
    max_width: u32,
    max_height: u32,
) -> Result<String, PhotoError> {
    let result = tokio::task::spawn_blocking(move || {
        normalize_photo_sync(&config, &raw_bytes, max_width, max_height)
    })
    .await
    .map_err(|e| PhotoError::Task(e.to_string()))?;

    if let Err(e) = &result {
        warn!(error = %e, "photo normalization failed");
    }
    result
}

/// Fits the image inside `max_width` x `max_height`, re-encodes it as PNG
/// and hex-encodes the bytes.
pub fn normalize_photo_sync(
    config: &PhotoConfig,
    raw_bytes: &[u8],
    max_width: u32,
    max_height: u32,
) -> Result<String, PhotoError> {
    let img = decode_image(config, raw_bytes)?;
    let (w, h) = img.dimensions();

    let fitted = if w > max_width || h > max_height {
        img.resize(max_width.max(1), max_height.max(1), FilterType::Triangle)
    } else {
        img
    };

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(fitted.to_rgba8()).write_to(&mut out, ImageFormat::Png)?;
    Ok(hex::encode(out.into_inner()))
}

/// Raw PNG bytes of a cached photo.
pub fn decode_cached(photo: &str) -> Result<Vec<u8>, PhotoError> {
    Ok(hex::decode(photo)?)
}

fn decode_image(config: &PhotoConfig, raw_bytes: &[u8]) -> Result<DynamicImage, PhotoError> {
    if raw_bytes.is_empty() {
        return Err(PhotoError::EmptyInput);
    }

    if raw_bytes.len() > config.max_input_bytes {
        return Err(PhotoError::InputTooLarge {
            size: raw_bytes.len(),
            max_size: config.max_input_bytes,
        });
    }

    let mut reader = ImageReader::new(Cursor::new(raw_bytes))
        .with_guessed_format()
        .map_err(|e| PhotoError::Decode { source: e.into() })?;

    if reader.format().is_none() {
        return Err(PhotoError::UnsupportedFormat);
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(config.max_dimension);
    limits.max_image_height = Some(config.max_dimension);
    limits.max_alloc = Some(config.max_alloc_bytes);
    reader.limits(limits);

    Ok(reader.decode()?)
}
