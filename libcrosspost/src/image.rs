//! Image attachments and size adaptation
//!
//! Services impose byte budgets (and sometimes pixel budgets) on uploaded
//! images. [`Image::resize_to_target`] iteratively downscales an image until
//! it fits, re-encoding in its original format. Images that already fit are
//! returned without re-encoding.

use std::io::{Cursor, Read};
use std::path::Path;

use bytes::Bytes;
use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};

use crate::error::ImageError;

/// Downscale attempts before giving up. The margin schedule (0.90 stepping
/// down by 0.05) runs out of headroom before this fires in practice.
const MAX_RESIZE_ITERATIONS: u32 = 16;

/// Supported attachment MIME types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMime {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMime {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
            ImageMime::Gif => "image/gif",
            ImageMime::WebP => "image/webp",
        }
    }

    pub fn from_mime_str(s: &str) -> Option<Self> {
        match s {
            "image/jpeg" | "image/jpg" => Some(ImageMime::Jpeg),
            "image/png" => Some(ImageMime::Png),
            "image/gif" => Some(ImageMime::Gif),
            "image/webp" => Some(ImageMime::WebP),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageMime::Jpeg),
            "png" => Some(ImageMime::Png),
            "gif" => Some(ImageMime::Gif),
            "webp" => Some(ImageMime::WebP),
            _ => None,
        }
    }

    fn from_format(format: ImageFormat) -> Option<Self> {
        Self::from_mime_str(format.to_mime_type())
    }
}

/// An immutable image attachment: raw bytes plus optional MIME type and
/// alt-text description.
#[derive(Debug, Clone)]
pub struct Image {
    bytes: Bytes,
    mime: Option<ImageMime>,
    description: Option<String>,
}

impl Image {
    /// Create an image from raw bytes already in memory
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            mime: None,
            description: None,
        }
    }

    /// Read an image from a file, inferring the MIME type from the extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mime = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageMime::from_extension);
        Ok(Self {
            bytes: Bytes::from(bytes),
            mime,
            description: None,
        })
    }

    /// Read an image from an arbitrary reader
    pub fn from_reader(mut reader: impl Read) -> Result<Self, ImageError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::from_bytes(bytes))
    }

    /// Attach an alt-text description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Override the MIME type
    pub fn with_mime(mut self, mime: ImageMime) -> Self {
        self.mime = Some(mime);
        self
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime(&self) -> Option<ImageMime> {
        self.mime
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Shrink the image until it fits within `max_bytes` (and `max_pixels`,
    /// when given).
    ///
    /// If no pixel budget is given and the bytes already fit, the image is
    /// returned as-is without decoding (the underlying buffer is shared, not
    /// copied). Otherwise the image is decoded and iteratively downscaled:
    /// each pass aims for `original_pixels * max_bytes * margin /
    /// original_bytes` pixels (clamped to the pixel budget), starting with a
    /// margin of 0.90 and stepping down by 0.05 per pass, then re-encodes in
    /// the source format. The attempt is bounded; an image that still does
    /// not fit yields [`ImageError::TooLarge`].
    pub fn resize_to_target(
        &self,
        max_bytes: usize,
        max_pixels: Option<u64>,
    ) -> Result<Image, ImageError> {
        if max_pixels.is_none() && self.bytes.len() < max_bytes {
            return Ok(self.clone());
        }

        let format = image::guess_format(&self.bytes)?;
        let decoded = image::load_from_memory_with_format(&self.bytes, format)?;
        let (width, height) = decoded.dimensions();
        let original_pixels = u64::from(width) * u64::from(height);

        let pixels_fit = max_pixels.map(|cap| original_pixels <= cap).unwrap_or(true);
        if pixels_fit && self.bytes.len() < max_bytes {
            return Ok(self.clone());
        }

        let mut margin = 0.90f64;
        for _ in 0..MAX_RESIZE_ITERATIONS {
            if margin <= 0.0 {
                break;
            }

            let mut target_pixels =
                original_pixels as f64 * max_bytes as f64 * margin / self.bytes.len() as f64;
            if let Some(cap) = max_pixels {
                target_pixels = target_pixels.min(cap as f64);
            }

            let scale = (target_pixels / original_pixels as f64).sqrt();
            let new_width = (((f64::from(width)) * scale).floor() as u32).max(1);
            let new_height = (((f64::from(height)) * scale).floor() as u32).max(1);

            let resized = decoded.resize_exact(new_width, new_height, FilterType::Triangle);
            let mut encoded = Vec::new();
            resized.write_to(&mut Cursor::new(&mut encoded), format)?;

            if encoded.len() < max_bytes {
                return Ok(Image {
                    bytes: Bytes::from(encoded),
                    mime: ImageMime::from_format(format),
                    description: self.description.clone(),
                });
            }

            margin -= 0.05;
        }

        Err(ImageError::TooLarge {
            bytes: self.bytes.len(),
            budget: max_bytes,
        })
    }
}
