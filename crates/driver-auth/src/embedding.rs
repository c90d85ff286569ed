//! Face embedding types and the embedding model seam

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};
use tracing::warn;
use crate::AuthError;

/// Face embedding produced by an embedding model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceEmbedding {
    pub vector: Vec<f32>,
    pub quality: f32,
}

impl FaceEmbedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector, quality: 1.0 }
    }
}

/// An embedding model and the similarity threshold tuned for it.
///
/// Thresholds are not portable between models: a score of 0.5 means
/// different things for different embedding spaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingModel {
    pub name: String,
    /// Vector length every stored and queried embedding must have
    pub dimension: usize,
    /// Cosine similarity a candidate must strictly exceed to match
    pub match_threshold: f64,
}

impl EmbeddingModel {
    /// Production 128-d face descriptor
    pub fn compact_128() -> Self {
        Self {
            name: "compact-128".to_string(),
            dimension: 128,
            match_threshold: 0.45,
        }
    }

    /// On-device 128-d embedding; its space is tighter so it needs a higher bar
    pub fn edge_128() -> Self {
        Self {
            name: "edge-128".to_string(),
            dimension: 128,
            match_threshold: 0.85,
        }
    }

    /// Look up a built-in model by name
    pub fn by_name(name: &str) -> Result<Self, AuthError> {
        match name {
            "compact-128" => Ok(Self::compact_128()),
            "edge-128" => Ok(Self::edge_128()),
            other => Err(AuthError::UnknownModel(other.to_string())),
        }
    }

    /// Check an embedding belongs to this model's space
    pub fn check_dimension(&self, vector: &[f32]) -> Result<(), AuthError> {
        if vector.len() == self.dimension {
            Ok(())
        } else {
            Err(AuthError::DimensionMismatch {
                model: self.name.clone(),
                expected: self.dimension,
                actual: vector.len(),
            })
        }
    }
}

impl Default for EmbeddingModel {
    fn default() -> Self {
        Self::compact_128()
    }
}

/// External face embedding model.
///
/// `Ok(None)` means no face was found in the frame.
pub trait EmbeddingExtractor: Send + Sync {
    fn model(&self) -> &EmbeddingModel;

    fn extract(&self, frame: &VideoFrame) -> Result<Option<FaceEmbedding>, AuthError>;
}

/// Stand-in used when no embedding model is configured: never finds a face.
#[derive(Debug)]
pub struct NoModelExtractor {
    model: EmbeddingModel,
}

impl NoModelExtractor {
    pub fn new(model: EmbeddingModel) -> Self {
        warn!(model = %model.name, "No embedding model weights configured. Every driver will be unmatched.");
        Self { model }
    }
}

impl EmbeddingExtractor for NoModelExtractor {
    fn model(&self) -> &EmbeddingModel {
        &self.model
    }

    fn extract(&self, _frame: &VideoFrame) -> Result<Option<FaceEmbedding>, AuthError> {
        Ok(None)
    }
}

/// Extractor that returns the same embedding for every frame (replays, tests)
#[derive(Debug, Clone)]
pub struct StaticEmbeddingExtractor {
    model: EmbeddingModel,
    embedding: Option<FaceEmbedding>,
}

impl StaticEmbeddingExtractor {
    pub fn new(model: EmbeddingModel, embedding: Option<FaceEmbedding>) -> Self {
        Self { model, embedding }
    }
}

impl EmbeddingExtractor for StaticEmbeddingExtractor {
    fn model(&self) -> &EmbeddingModel {
        &self.model
    }

    fn extract(&self, _frame: &VideoFrame) -> Result<Option<FaceEmbedding>, AuthError> {
        Ok(self.embedding.clone())
    }
}
