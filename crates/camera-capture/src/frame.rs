//! Video frame types and payload decoding

use crate::DecodeError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self { data, width, height }
    }

    /// Solid-color frame, used for placeholders and tests
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(data, width, height)
    }

    /// Encode the frame as JPEG
    pub fn to_jpeg(&self) -> Result<Vec<u8>, DecodeError> {
        let img = RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| DecodeError::Encode("pixel buffer does not match dimensions".into()))?;

        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Jpeg)
            .map_err(|e| DecodeError::Encode(e.to_string()))?;
        Ok(out.into_inner())
    }
}

/// A frame together with the encoded bytes it was decoded from
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// JPEG bytes: the payload itself when it already was a JPEG,
    /// otherwise the decoded pixels re-encoded
    pub encoded: Vec<u8>,
    /// Decoded pixels
    pub frame: VideoFrame,
}

/// Decode an encoded image (any format `image` can sniff) to RGB
pub fn decode_image(encoded: &[u8]) -> Result<VideoFrame, DecodeError> {
    if encoded.is_empty() {
        return Err(DecodeError::Empty);
    }

    let img = image::load_from_memory(encoded).map_err(|e| DecodeError::Image(e.to_string()))?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    debug!(width, height, bytes = encoded.len(), "Decoded frame");

    Ok(VideoFrame::new(rgb.into_raw(), width, height))
}

/// Decode a base64 image payload.
///
/// ASCII whitespace (line wrapping from some device firmwares) is ignored.
/// Non-JPEG images (PNG, BMP, ...) are re-encoded so `encoded` is always a JPEG.
pub fn decode_base64(payload: &str) -> Result<DecodedFrame, DecodeError> {
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(DecodeError::Empty);
    }

    let encoded = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    let frame = decode_image(&encoded)?;

    let encoded = match image::guess_format(&encoded) {
        Ok(ImageFormat::Jpeg) => encoded,
        format => {
            debug!(?format, "Re-encoding frame as JPEG");
            frame.to_jpeg()?
        }
    };

    Ok(DecodedFrame { encoded, frame })
}
