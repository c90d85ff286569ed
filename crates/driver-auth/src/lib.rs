//! Driver Authentication Module
//!
//! Face recognition-based driver identification:
//! - Embedding model declaration (dimension + acceptance threshold)
//! - Nearest-neighbour matching over a snapshot of enrolled drivers
//! - Bearer session validation for the authenticated detect flow

pub mod embedding;
pub mod matcher;
pub mod session;

pub use embedding::{EmbeddingExtractor, EmbeddingModel, FaceEmbedding, NoModelExtractor, StaticEmbeddingExtractor};
pub use matcher::{cosine_similarity, DriverRecord, IdentityMatcher, MatchResult, UNKNOWN_DRIVER};
pub use session::{InMemorySessions, Session, SessionValidator};

use thiserror::Error;

/// Authentication error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Embedding extraction failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedding has {actual} dimensions, model {model} expects {expected}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown embedding model: {0}")]
    UnknownModel(String),

    #[error("Session token missing, unknown or expired")]
    Unauthorized,
}
