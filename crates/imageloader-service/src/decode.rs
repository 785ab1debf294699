//! Decoding raw payloads into images.

use image::{DynamicImage, ImageFormat};
use thiserror::Error;

use crate::config::Config;

/// An error that happens when a fetched payload can not be turned into an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload is not in any known image format.
    #[error("unknown image format")]
    UnknownFormat,
    /// The payload looks like an image, but could not be decoded.
    #[error("malformed: {0}")]
    Malformed(String),
    /// The image exceeds the configured pixel budget.
    #[error("image too large: {width}x{height}")]
    TooLarge { width: u32, height: u32 },
}

/// Synchronously decodes a fetched payload.
///
/// Decoding is CPU bound and is run on the blocking thread pool by the loader.
pub trait Decode: Send + Sync + 'static {
    /// The decoded resource, shared between all requesters of the same URL.
    type Image: Send + Sync + 'static;

    fn decode(&self, data: &[u8]) -> Result<Self::Image, DecodeError>;
}

/// Decodes raster images using the [`image`] crate.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    max_pixels: u64,
}

impl ImageDecoder {
    pub fn new(max_pixels: u64) -> Self {
        Self { max_pixels }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_image_pixels)
    }

    fn sniff_format(data: &[u8]) -> Option<ImageFormat> {
        image::guess_format(data).ok()
    }
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Decode for ImageDecoder {
    type Image = DynamicImage;

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, DecodeError> {
        let format = Self::sniff_format(data).ok_or(DecodeError::UnknownFormat)?;
        let image = image::load_from_memory_with_format(data, format)
            .map_err(|err| DecodeError::Malformed(err.to_string()))?;

        let (width, height) = (image.width(), image.height());
        if u64::from(width) * u64::from(height) > self.max_pixels {
            return Err(DecodeError::TooLarge { width, height });
        }

        Ok(image)
    }
}
