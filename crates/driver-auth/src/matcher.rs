//! Nearest-neighbour identity matching

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;
use crate::EmbeddingModel;

/// Label reported for frames that match no enrolled driver
pub const UNKNOWN_DRIVER: &str = "Unknown";

/// Enrolled driver as read from the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverRecord {
    pub id: Uuid,
    pub display_name: String,
    /// Not every driver has enrolled a face
    pub embedding: Option<Vec<f32>>,
}

/// Outcome of a match query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchResult {
    Matched {
        driver_id: Uuid,
        display_name: String,
        similarity: f64,
    },
    Unmatched {
        /// Highest score seen, even though it was below the threshold
        best_similarity: Option<f64>,
    },
}

impl MatchResult {
    /// Driver name, or "Unknown"
    pub fn label(&self) -> &str {
        match self {
            MatchResult::Matched { display_name, .. } => display_name,
            MatchResult::Unmatched { .. } => UNKNOWN_DRIVER,
        }
    }

    pub fn driver_id(&self) -> Option<Uuid> {
        match self {
            MatchResult::Matched { driver_id, .. } => Some(*driver_id),
            MatchResult::Unmatched { .. } => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, MatchResult::Matched { .. })
    }
}

/// Compute cosine similarity between two vectors.
///
/// Zero when either vector has zero norm or the inputs are not finite.
/// Accumulates in f64 and clamps, so the result is always in [-1, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if similarity.is_finite() {
        similarity.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Linear-scan matcher bound to one embedding model.
///
/// Callers pass a pre-fetched snapshot of candidates, so an indexed store can
/// replace the scan without changing call sites.
#[derive(Debug, Clone, Default)]
pub struct IdentityMatcher {
    model: EmbeddingModel,
}

impl IdentityMatcher {
    pub fn new(model: EmbeddingModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &EmbeddingModel {
        &self.model
    }

    pub fn threshold(&self) -> f64 {
        self.model.match_threshold
    }

    /// Find the enrolled driver most similar to `query`.
    ///
    /// A candidate only becomes the best if it beats both the running best and
    /// the model threshold. Candidates without an embedding, or whose length
    /// differs from the query, are skipped.
    pub fn best_match(&self, query: &[f32], candidates: &[DriverRecord]) -> MatchResult {
        let threshold = self.threshold();
        let mut best: Option<(&DriverRecord, f64)> = None;
        let mut highest: Option<f64> = None;

        for candidate in candidates {
            let Some(stored) = candidate.embedding.as_deref() else {
                continue;
            };
            if stored.len() != query.len() {
                warn!(
                    driver_id = %candidate.id,
                    stored = stored.len(),
                    query = query.len(),
                    "Skipping driver with mismatched embedding length"
                );
                continue;
            }

            let similarity = cosine_similarity(query, stored);
            highest = Some(highest.map_or(similarity, |h: f64| h.max(similarity)));

            let beats_best = best.map_or(true, |(_, score)| similarity > score);
            if similarity > threshold && beats_best {
                best = Some((candidate, similarity));
            }
        }

        match best {
            Some((driver, similarity)) => {
                debug!(driver_id = %driver.id, similarity, "Driver matched");
                MatchResult::Matched {
                    driver_id: driver.id,
                    display_name: driver.display_name.clone(),
                    similarity,
                }
            }
            None => {
                debug!(best = ?highest, threshold, "No driver above threshold");
                MatchResult::Unmatched {
                    best_similarity: highest,
                }
            }
        }
    }
}
