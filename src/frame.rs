//! Sampled frames.
//!
//! A `SampledFrame` owns its decoded RGB pixels. Samples are independent of the
//! source that produced them; nothing references back into a decoder.

use std::path::Path;

use anyhow::{Context, Result};
use image::RgbImage;

use crate::error::InspectError;

/// One frame selected by the sampler.
#[derive(Clone, Debug)]
pub struct SampledFrame {
    pub image: RgbImage,
    /// Dense 0-based counter over emitted samples.
    pub frame_index: usize,
    /// Position in the source, in seconds.
    pub timestamp_sec: f64,
}

impl SampledFrame {
    pub fn new(image: RgbImage, frame_index: usize, timestamp_sec: f64) -> Self {
        Self {
            image,
            frame_index,
            timestamp_sec,
        }
    }

    /// A lone still image: index 0 at t=0.
    pub fn still(image: RgbImage) -> Self {
        Self::new(image, 0, 0.0)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Decode an encoded image (jpeg/png/bmp) held in memory.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes).context("decode image bytes")?;
    Ok(image.to_rgb8())
}

/// Decode an image file from disk.
pub fn load_image(path: &Path) -> Result<RgbImage> {
    let image = image::open(path)
        .map_err(|err| InspectError::unreadable(path.display().to_string(), err))?;
    Ok(image.to_rgb8())
}

/// Whether the path names a still image by extension.
pub fn is_still_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            matches!(
                ext.to_ascii_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "bmp"
            )
        })
        .unwrap_or(false)
}
