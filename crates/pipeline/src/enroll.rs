//! Registration/login flow: recognize a face or enroll it

use crate::PipelineError;
use camera_capture::decode_base64;
use driver_auth::{EmbeddingExtractor, IdentityMatcher, MatchResult};
use serde::Serialize;
use std::sync::Arc;
use storage::{DetectionStore, DriverRoster};
use tracing::info;
use uuid::Uuid;

/// Result of an identify call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrollmentOutcome {
    /// Face matched an enrolled driver
    Recognized {
        driver_id: Uuid,
        display_name: String,
        similarity: f64,
    },
    /// Face matched nobody and was enrolled as a new driver
    Enrolled {
        driver_id: Uuid,
        display_name: String,
    },
}

impl EnrollmentOutcome {
    pub fn driver_id(&self) -> Uuid {
        match self {
            EnrollmentOutcome::Recognized { driver_id, .. } | EnrollmentOutcome::Enrolled { driver_id, .. } => *driver_id,
        }
    }
}

/// Unlike the detect flow, an unmatched face here creates a driver. Storage
/// errors fail the call instead of degrading to "unknown".
#[derive(Clone)]
pub struct EnrollmentFlow {
    extractor: Arc<dyn EmbeddingExtractor>,
    matcher: IdentityMatcher,
    store: Arc<dyn DetectionStore>,
    roster: Arc<dyn DriverRoster>,
}

impl EnrollmentFlow {
    pub fn new(
        extractor: Arc<dyn EmbeddingExtractor>,
        store: Arc<dyn DetectionStore>,
        roster: Arc<dyn DriverRoster>,
    ) -> Self {
        let matcher = IdentityMatcher::new(extractor.model().clone());
        Self {
            extractor,
            matcher,
            store,
            roster,
        }
    }

    /// Match the face in `image` against enrolled drivers, enrolling it under
    /// `name` (or a generated name) when nobody matches.
    pub async fn identify(&self, image: &str, name: Option<&str>) -> Result<EnrollmentOutcome, PipelineError> {
        let decoded = decode_base64(image).map_err(|e| {
            metrics::counter!("decode_failures_total").increment(1);
            e
        })?;

        let extractor = Arc::clone(&self.extractor);
        let frame = decoded.frame;
        let embedding = tokio::task::spawn_blocking(move || extractor.extract(&frame))
            .await??
            .ok_or(PipelineError::NoFace)?;
        self.matcher.model().check_dimension(&embedding.vector)?;

        let candidates = self.store.find_drivers_with_embedding().await?;
        match self.matcher.best_match(&embedding.vector, &candidates) {
            MatchResult::Matched {
                driver_id,
                display_name,
                similarity,
            } => {
                info!(driver_id = %driver_id, similarity, "Driver recognized");
                Ok(EnrollmentOutcome::Recognized {
                    driver_id,
                    display_name,
                    similarity,
                })
            }
            MatchResult::Unmatched { best_similarity } => {
                let display_name = match name.map(str::trim).filter(|n| !n.is_empty()) {
                    Some(name) => name.to_string(),
                    None => generated_name(),
                };
                let driver = self.roster.enroll_driver(&display_name, embedding.vector).await?;
                info!(driver_id = %driver.id, best = ?best_similarity, "Enrolled new driver");
                Ok(EnrollmentOutcome::Enrolled {
                    driver_id: driver.id,
                    display_name: driver.display_name,
                })
            }
        }
    }
}

fn generated_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("Driver {}", &id[..8])
}
