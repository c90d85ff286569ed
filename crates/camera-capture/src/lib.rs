//! Camera Frame Library for the Drowsiness Monitor
//!
//! Frames arrive from cabin edge devices as encoded images, either as raw
//! request bodies (live preview) or base64 text (detect calls). This crate
//! turns those payloads into decoded RGB frames.

pub mod frame;

pub use frame::{decode_base64, decode_image, DecodedFrame, VideoFrame};

use thiserror::Error;

/// Frame decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Empty image payload")]
    Empty,

    #[error("Invalid base64 payload: {0}")]
    Base64(String),

    #[error("Image decode failed: {0}")]
    Image(String),

    #[error("Image encode failed: {0}")]
    Encode(String),
}
