//! Serialization of finished sprites.
//!
//! PNG and WebP expose the encoder knobs artists usually tune; every other
//! raster format the `image` crate can write is encoded with its defaults.

use std::io::Cursor;
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, Rgba};
use imageproc::definitions::Image;
use serde::{Deserialize, Serialize};

use crate::error::EncodeError;

/// Highest accepted PNG compression level
pub const PNG_MAX_COMPRESS_LEVEL: u8 = 9;
/// Highest accepted WebP quality
pub const WEBP_MAX_QUALITY: u8 = 100;
/// Highest accepted WebP method (slowest, best)
pub const WEBP_MAX_METHOD: u8 = 6;

/// PNG encoder knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PngSettings {
    /// 0 = fastest, 9 = smallest output
    pub compress_level: u8,
}

impl Default for PngSettings {
    fn default() -> Self {
        Self { compress_level: 6 }
    }
}

/// WebP encoder knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebpSettings {
    /// Lossless mode; `quality` then trades encode effort for size
    pub lossless: bool,
    /// 0..=100; in lossy mode 0 gives the smallest file and 100 the largest
    pub quality: u8,
    /// 0..=6 speed/quality trade-off (0 = fast, 6 = slower but better)
    pub method: u8,
}

impl Default for WebpSettings {
    fn default() -> Self {
        Self {
            lossless: true,
            quality: 95,
            method: 6,
        }
    }
}

/// Encoder configuration passed down at encode time
///
/// Only the section matching the output format is consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingSettings {
    pub png: PngSettings,
    pub webp: WebpSettings,
}

impl EncodingSettings {
    /// Checks every knob against the range its encoder accepts
    ///
    /// # Errors
    ///
    /// * `EncodeError::InvalidSetting` - For the first out-of-range knob
    pub fn validate(&self) -> Result<(), EncodeError> {
        check_range(
            "PNG",
            "compress_level",
            self.png.compress_level,
            PNG_MAX_COMPRESS_LEVEL,
            "0..=9",
        )?;
        check_range("WebP", "quality", self.webp.quality, WEBP_MAX_QUALITY, "0..=100")?;
        check_range("WebP", "method", self.webp.method, WEBP_MAX_METHOD, "0..=6")?;
        Ok(())
    }

    /// Settings for diagnostic mask previews: the same knobs, but WebP is
    /// always lossless so the preview keeps exactly its two colours
    pub fn for_preview(&self) -> Self {
        Self {
            webp: WebpSettings {
                lossless: true,
                ..self.webp
            },
            ..*self
        }
    }
}

#[inline]
fn check_range(
    format: &'static str,
    key: &'static str,
    value: u8,
    max: u8,
    accepted: &'static str,
) -> Result<(), EncodeError> {
    if value > max {
        return Err(EncodeError::InvalidSetting {
            format,
            key,
            value: i64::from(value),
            accepted,
        });
    }
    Ok(())
}

/// Raster format a sprite is written as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    WebP,
    /// Any other format supported by `image`, written with its defaults
    Other(ImageFormat),
}

impl OutputFormat {
    /// Resolves a format from a file extension (with or without the leading dot)
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.trim_start_matches('.');
        ImageFormat::from_extension(extension).map(Self::from)
    }

    /// Resolves a format from the extension of `path`
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        ImageFormat::from_path(path).ok().map(Self::from)
    }

    pub fn name(&self) -> String {
        match self {
            Self::Png => "PNG".to_string(),
            Self::WebP => "WebP".to_string(),
            Self::Other(format) => format!("{format:?}"),
        }
    }
}

impl From<ImageFormat> for OutputFormat {
    fn from(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Png => Self::Png,
            ImageFormat::WebP => Self::WebP,
            other => Self::Other(other),
        }
    }
}

/// Serializes a sprite into `format`
///
/// The PNG and lossless WebP paths preserve every pixel value. Lossy WebP
/// may quantize colours irrecoverably.
///
/// # Errors
///
/// * `EncodeError::InvalidSetting` - When a knob is out of range
/// * `EncodeError::Encoder` - When the encoder rejects the image or configuration
pub fn encode(
    sprite: &Image<Rgba<u8>>,
    settings: &EncodingSettings,
    format: OutputFormat,
) -> Result<Vec<u8>, EncodeError> {
    settings.validate()?;

    match format {
        OutputFormat::Png => encode_png(sprite, &settings.png),
        OutputFormat::WebP => encode_webp(sprite, &settings.webp),
        OutputFormat::Other(image_format) => encode_other(sprite, image_format),
    }
}

fn encode_png(sprite: &Image<Rgba<u8>>, settings: &PngSettings) -> Result<Vec<u8>, EncodeError> {
    let compression = match settings.compress_level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    };

    let mut buffer = Vec::new();
    PngEncoder::new_with_quality(&mut buffer, compression, FilterType::Adaptive)
        .write_image(
            sprite.as_raw(),
            sprite.width(),
            sprite.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| encoder_error("PNG", e))?;

    Ok(buffer)
}

fn encode_webp(sprite: &Image<Rgba<u8>>, settings: &WebpSettings) -> Result<Vec<u8>, EncodeError> {
    let mut config = webp::WebPConfig::new()
        .map_err(|()| encoder_error("WebP", "libwebp rejected its default configuration"))?;
    config.lossless = i32::from(settings.lossless);
    config.quality = f32::from(settings.quality);
    config.method = i32::from(settings.method);

    let memory = webp::Encoder::from_rgba(sprite.as_raw(), sprite.width(), sprite.height())
        .encode_advanced(&config)
        .map_err(|e| encoder_error("WebP", format!("{e:?}")))?;

    Ok(memory.to_vec())
}

fn encode_other(sprite: &Image<Rgba<u8>>, format: ImageFormat) -> Result<Vec<u8>, EncodeError> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(sprite.clone())
        .write_to(&mut cursor, format)
        .map_err(|e| encoder_error(&format!("{format:?}"), e))?;

    Ok(cursor.into_inner())
}

fn encoder_error(format: &str, reason: impl ToString) -> EncodeError {
    EncodeError::Encoder {
        format: format.to_string(),
        reason: reason.to_string(),
    }
}
