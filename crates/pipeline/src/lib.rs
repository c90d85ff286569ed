//! Detection Pipeline
//!
//! Orchestrates one detect call end to end:
//!
//! ```text
//! decode ──► geometry ─┐
//!        └─► identity ─┴─► registry ──► archive ──► persist ──► outcome
//! ```
//!
//! and, separately, the registration/login flow that enrolls unknown faces.
//! Only decoding can abort a detect call; durable side effects are best
//! effort and never change the outcome.

mod detect;
mod enroll;

pub use detect::{DetectRequest, DetectionOutcome, DetectionPipeline};
pub use enroll::{EnrollmentFlow, EnrollmentOutcome};

use camera_capture::DecodeError;
use driver_auth::AuthError;
use storage::StorageError;
use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Frame decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("No face found in frame")]
    NoFace,

    #[error("Identity error: {0}")]
    Identity(#[from] AuthError),

    #[error("Storage unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error("Analysis task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        PipelineError::Task(e.to_string())
    }
}
