//! Tile image decoding and encoding.
//!
//! Tiles travel as encoded PNG/JPEG bytes between the tile server, the disk
//! store and HTTP clients, and as decoded [`DynamicImage`]s inside the memory
//! cache.
//!
//! # Design Decisions
//!
//! - **Format sniffing**: payloads are decoded by content, not by file
//!   extension, so a JPEG stored under a `.png` name still decodes.
//!
//! - **Passthrough on write**: when the server already delivers the store's
//!   format the original bytes are persisted unchanged; only mismatches are
//!   re-encoded.
//!
//! - **Shared ownership**: decoded tiles are handed out as [`TileImage`]
//!   (`Arc<DynamicImage>`). Evicting an entry drops the cache's reference and
//!   the pixels are freed once the last holder lets go.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};

use crate::error::CodecError;

/// Edge length of a standard slippy-map tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// JPEG quality used when re-encoding tiles for the disk store.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Decoded tile image shared between the cache and its callers.
pub type TileImage = Arc<DynamicImage>;

// =============================================================================
// Tile Format
// =============================================================================

/// Encoding used for tiles on disk and over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileFormat {
    #[default]
    Png,
    Jpeg,
}

impl TileFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
        }
    }

    /// MIME type for HTTP responses.
    pub fn content_type(&self) -> &'static str {
        match self {
            TileFormat::Png => "image/png",
            TileFormat::Jpeg => "image/jpeg",
        }
    }

    /// Matching `image` crate format.
    pub fn image_format(&self) -> ImageFormat {
        match self {
            TileFormat::Png => ImageFormat::Png,
            TileFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

impl FromStr for TileFormat {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(TileFormat::Png),
            "jpg" | "jpeg" => Ok(TileFormat::Jpeg),
            other => Err(CodecError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// =============================================================================
// Decode / Encode
// =============================================================================

/// Decode an encoded tile, detecting the format from its content.
pub fn decode(data: &[u8]) -> Result<DynamicImage, CodecError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| CodecError::Decode {
            message: e.to_string(),
        })?;

    reader.decode().map_err(|e| CodecError::Decode {
        message: e.to_string(),
    })
}

/// Encode an image into `format`. `quality` only applies to JPEG.
pub fn encode(image: &DynamicImage, format: TileFormat, quality: u8) -> Result<Bytes, CodecError> {
    let mut output = Vec::new();

    match format {
        TileFormat::Png => {
            image
                .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
                .map_err(|e| CodecError::Encode {
                    message: e.to_string(),
                })?;
        }
        TileFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = image.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100));
            encoder
                .encode_image(&rgb)
                .map_err(|e| CodecError::Encode {
                    message: e.to_string(),
                })?;
        }
    }

    Ok(Bytes::from(output))
}

/// Bytes to persist for a freshly fetched tile.
///
/// Returns `payload` unchanged when it is already encoded as `format`,
/// otherwise re-encodes the decoded `image`.
pub fn prepare_for_store(
    payload: &Bytes,
    image: &DynamicImage,
    format: TileFormat,
    quality: u8,
) -> Result<Bytes, CodecError> {
    match image::guess_format(payload) {
        Ok(detected) if detected == format.image_format() => Ok(payload.clone()),
        _ => encode(image, format, quality),
    }
}

/// Fully transparent square tile.
pub fn blank_tile(size: u32) -> TileImage {
    Arc::new(DynamicImage::ImageRgba8(RgbaImage::new(size, size)))
}

// =============================================================================
// Tests
// =============================================================================
