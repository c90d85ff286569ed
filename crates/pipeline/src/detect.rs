//! Detect call orchestration

use crate::PipelineError;
use bytes::Bytes;
use camera_capture::{decode_base64, VideoFrame};
use chrono::{DateTime, Utc};
use dms::{AlertKind, DrowsinessMetrics, GeometryAnalyzer, LandmarkDetector};
use driver_auth::{EmbeddingExtractor, IdentityMatcher, MatchResult, UNKNOWN_DRIVER};
use live_stream::DeviceStreamRegistry;
use serde::Serialize;
use std::sync::Arc;
use storage::{AlertEvent, DetectionEvent, DetectionStore, FrameArchive};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One detect call
#[derive(Debug, Clone)]
pub struct DetectRequest {
    pub device_id: String,
    /// Base64 encoded JPEG/PNG
    pub image: String,
    /// Session owner, for the authenticated variant
    pub user_id: Option<Uuid>,
    /// Run identity matching alongside geometry
    pub identify: bool,
}

/// Result of a successful detect call
#[derive(Debug, Clone, Serialize)]
pub struct DetectionOutcome {
    pub device_id: String,
    pub metrics: DrowsinessMetrics,
    /// `None` when identity matching was not requested
    pub identity: Option<MatchResult>,
    pub alert: Option<AlertKind>,
    /// `None` when the detection could not be persisted
    pub detection_id: Option<i64>,
    pub image_path: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl DetectionOutcome {
    /// Matched driver name, or "Unknown"
    pub fn driver_label(&self) -> &str {
        self.identity.as_ref().map_or(UNKNOWN_DRIVER, MatchResult::label)
    }
}

/// Runs geometry and identity on a frame, then updates the registry and storage
#[derive(Clone)]
pub struct DetectionPipeline {
    analyzer: GeometryAnalyzer,
    detector: Arc<dyn LandmarkDetector>,
    extractor: Arc<dyn EmbeddingExtractor>,
    matcher: IdentityMatcher,
    registry: DeviceStreamRegistry,
    store: Arc<dyn DetectionStore>,
    archive: Option<FrameArchive>,
}

impl DetectionPipeline {
    pub fn new(
        analyzer: GeometryAnalyzer,
        detector: Arc<dyn LandmarkDetector>,
        extractor: Arc<dyn EmbeddingExtractor>,
        registry: DeviceStreamRegistry,
        store: Arc<dyn DetectionStore>,
    ) -> Self {
        let matcher = IdentityMatcher::new(extractor.model().clone());
        Self {
            analyzer,
            detector,
            extractor,
            matcher,
            registry,
            store,
            archive: None,
        }
    }

    /// Archive every decoded frame to disk
    pub fn with_archive(mut self, archive: FrameArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Run a detect call.
    ///
    /// Fails only when the payload cannot be decoded, in which case nothing
    /// has been touched. Storage and archive failures are logged and counted.
    pub async fn detect(&self, request: DetectRequest) -> Result<DetectionOutcome, PipelineError> {
        let device_id = request.device_id;
        let decoded = decode_base64(&request.image).map_err(|e| {
            metrics::counter!("decode_failures_total").increment(1);
            warn!(device_id = %device_id, error = %e, "Rejected detect payload");
            e
        })?;
        let captured_at = Utc::now();
        let frame = Arc::new(decoded.frame);
        let encoded = Bytes::from(decoded.encoded);

        let (metrics, identity) = tokio::join!(
            self.run_geometry(Arc::clone(&frame), &device_id),
            self.run_identity(Arc::clone(&frame), &device_id, request.identify),
        );

        self.registry.push(&device_id, encoded.clone());
        self.registry.set_drowsy(&device_id, metrics.is_drowsy);

        let image_path = self.archive_frame(&device_id, captured_at, &encoded).await;
        let alert = metrics.alert_kind();

        let event = DetectionEvent {
            device_id: device_id.clone(),
            driver_id: identity.as_ref().and_then(MatchResult::driver_id),
            user_id: request.user_id,
            similarity: identity.as_ref().and_then(similarity),
            metrics,
            image_path: image_path.clone(),
            captured_at,
        };
        let detection_id = self.persist(&event, alert).await;

        if let Some(kind) = alert {
            info!(
                device_id = %device_id,
                kind = kind.as_str(),
                ear = metrics.ear,
                mar = metrics.mar,
                head_tilt = metrics.head_tilt,
                "Drowsiness alert"
            );
        }

        Ok(DetectionOutcome {
            device_id,
            metrics,
            identity,
            alert,
            detection_id,
            image_path,
            captured_at,
        })
    }

    async fn run_geometry(&self, frame: Arc<VideoFrame>, device_id: &str) -> DrowsinessMetrics {
        let analyzer = self.analyzer.clone();
        let detector = Arc::clone(&self.detector);

        let result = tokio::task::spawn_blocking(move || {
            let faces = detector.detect(&frame)?;
            analyzer.analyze_faces(&faces, frame.width, frame.height)
        })
        .await;

        match result {
            Ok(Ok(metrics)) => metrics,
            Ok(Err(e)) => {
                warn!(device_id, error = %e, "Geometry analysis failed, treating as no face");
                DrowsinessMetrics::no_face()
            }
            Err(e) => {
                warn!(device_id, error = %e, "Landmark task aborted, treating as no face");
                DrowsinessMetrics::no_face()
            }
        }
    }

    async fn run_identity(
        &self,
        frame: Arc<VideoFrame>,
        device_id: &str,
        enabled: bool,
    ) -> Option<MatchResult> {
        if !enabled {
            return None;
        }
        let unmatched = MatchResult::Unmatched { best_similarity: None };

        let extractor = Arc::clone(&self.extractor);
        let embedding = match tokio::task::spawn_blocking(move || extractor.extract(&frame)).await {
            Ok(Ok(Some(embedding))) => embedding,
            Ok(Ok(None)) => {
                debug!(device_id, "No face to identify");
                return Some(unmatched);
            }
            Ok(Err(e)) => {
                warn!(device_id, error = %e, "Embedding extraction failed");
                return Some(unmatched);
            }
            Err(e) => {
                warn!(device_id, error = %e, "Embedding task aborted");
                return Some(unmatched);
            }
        };
        if let Err(e) = self.matcher.model().check_dimension(&embedding.vector) {
            warn!(device_id, error = %e, "Discarding embedding");
            return Some(unmatched);
        }

        // Fresh snapshot per call, no caching
        let candidates = match self.store.find_drivers_with_embedding().await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(device_id, error = %e, "Driver snapshot unavailable, reporting unknown driver");
                metrics::counter!("persistence_failures_total").increment(1);
                return Some(unmatched);
            }
        };

        Some(self.matcher.best_match(&embedding.vector, &candidates))
    }

    async fn archive_frame(&self, device_id: &str, captured_at: DateTime<Utc>, encoded: &[u8]) -> Option<String> {
        let archive = self.archive.as_ref()?;
        match archive.save(device_id, captured_at, encoded).await {
            Ok(path) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                warn!(device_id, error = %e, "Failed to archive frame");
                metrics::counter!("persistence_failures_total").increment(1);
                None
            }
        }
    }

    async fn persist(&self, event: &DetectionEvent, alert: Option<AlertKind>) -> Option<i64> {
        let detection_id = match self.store.record_detection(event).await {
            Ok(id) => {
                metrics::counter!("detections_total").increment(1);
                Some(id)
            }
            Err(e) => {
                warn!(device_id = %event.device_id, error = %e, "Failed to persist detection");
                metrics::counter!("persistence_failures_total").increment(1);
                None
            }
        };

        if let Some(kind) = alert {
            let alert = AlertEvent {
                detection_id,
                device_id: event.device_id.clone(),
                driver_id: event.driver_id,
                kind,
                created_at: event.captured_at,
            };
            match self.store.record_alert(&alert).await {
                Ok(_) => metrics::counter!("alerts_total", "kind" => kind.as_str()).increment(1),
                Err(e) => {
                    warn!(device_id = %event.device_id, error = %e, "Failed to persist alert");
                    metrics::counter!("persistence_failures_total").increment(1);
                }
            }
        }

        detection_id
    }
}

fn similarity(result: &MatchResult) -> Option<f64> {
    match result {
        MatchResult::Matched { similarity, .. } => Some(*similarity),
        MatchResult::Unmatched { best_similarity } => *best_similarity,
    }
}
