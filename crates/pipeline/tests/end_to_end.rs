//! Detect and enrollment flows against a recording store

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use camera_capture::VideoFrame;
use dms::{
    AlertKind, DmsConfig, DmsError, GeometryAnalyzer, Landmark, LandmarkDetector, LandmarkLayout, LandmarkSet,
    StaticLandmarkDetector,
};
use driver_auth::{
    AuthError, DriverRecord, EmbeddingExtractor, EmbeddingModel, FaceEmbedding, MatchResult, StaticEmbeddingExtractor,
};
use live_stream::{DeviceStreamRegistry, PUSH_STALENESS};
use pipeline::{DetectRequest, DetectionPipeline, EnrollmentFlow, EnrollmentOutcome, PipelineError};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use storage::{AlertEvent, DetectionEvent, DetectionStore, DriverRoster, FrameArchive, StorageError};
use uuid::Uuid;

#[derive(Default)]
struct RecordingStore {
    detections: Mutex<Vec<DetectionEvent>>,
    alerts: Mutex<Vec<AlertEvent>>,
    drivers: Mutex<Vec<DriverRecord>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingStore {
    fn with_drivers(drivers: Vec<DriverRecord>) -> Self {
        let store = Self::default();
        *store.drivers.lock().unwrap() = drivers;
        store
    }

    fn failing() -> Self {
        let store = Self::default();
        store.failing.store(true, Ordering::SeqCst);
        store
    }

    fn call(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::DatabaseError("database is locked".into()))
        } else {
            Ok(())
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetectionStore for RecordingStore {
    async fn record_detection(&self, event: &DetectionEvent) -> Result<i64, StorageError> {
        self.call()?;
        let mut detections = self.detections.lock().unwrap();
        detections.push(event.clone());
        Ok(detections.len() as i64)
    }

    async fn record_alert(&self, event: &AlertEvent) -> Result<i64, StorageError> {
        self.call()?;
        let mut alerts = self.alerts.lock().unwrap();
        alerts.push(event.clone());
        Ok(alerts.len() as i64)
    }

    async fn find_drivers_with_embedding(&self) -> Result<Vec<DriverRecord>, StorageError> {
        self.call()?;
        Ok(self.drivers.lock().unwrap().clone())
    }
}

#[async_trait]
impl DriverRoster for RecordingStore {
    async fn enroll_driver(&self, display_name: &str, embedding: Vec<f32>) -> Result<DriverRecord, StorageError> {
        self.call()?;
        let driver = DriverRecord {
            id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            embedding: Some(embedding),
        };
        self.drivers.lock().unwrap().push(driver.clone());
        Ok(driver)
    }
}

fn layout() -> LandmarkLayout {
    LandmarkLayout {
        left_eye: [0, 1, 2, 3, 4, 5],
        right_eye: [6, 7, 8, 9, 10, 11],
        mouth: [12, 13, 14, 15, 16, 17],
        head_top: 18,
        chin: 19,
    }
}

/// Six points whose aspect ratio is `ratio`
fn six(cx: f64, cy: f64, half_width: f64, ratio: f64) -> Vec<Landmark> {
    let half_open = half_width * ratio;
    vec![
        Landmark::new(cx - half_width, cy),
        Landmark::new(cx - half_width / 3.0, cy - half_open),
        Landmark::new(cx + half_width / 3.0, cy - half_open),
        Landmark::new(cx + half_width, cy),
        Landmark::new(cx + half_width / 3.0, cy + half_open),
        Landmark::new(cx - half_width / 3.0, cy + half_open),
    ]
}

fn face(ear: f64, mar: f64) -> LandmarkSet {
    let mut points = Vec::new();
    points.extend(six(0.35, 0.4, 0.05, ear));
    points.extend(six(0.65, 0.4, 0.05, ear));
    points.extend(six(0.5, 0.75, 0.1, mar));
    points.push(Landmark::new(0.5, 0.1));
    points.push(Landmark::new(0.5, 0.9));
    LandmarkSet::new(points)
}

fn jpeg_base64() -> String {
    let jpeg = VideoFrame::filled(64, 48, [90, 90, 90]).to_jpeg().unwrap();
    STANDARD.encode(jpeg)
}

fn compact_model() -> EmbeddingModel {
    EmbeddingModel {
        name: "compact-2".into(),
        dimension: 2,
        match_threshold: 0.45,
    }
}

/// Unit vector whose cosine with the x axis is `similarity`
fn at_similarity(similarity: f32) -> Vec<f32> {
    vec![similarity, (1.0 - similarity * similarity).sqrt()]
}

struct Harness {
    pipeline: DetectionPipeline,
    registry: DeviceStreamRegistry,
    store: Arc<RecordingStore>,
}

fn harness(faces: Vec<LandmarkSet>, query: Option<Vec<f32>>, store: RecordingStore) -> Harness {
    let registry = DeviceStreamRegistry::default();
    let store = Arc::new(store);
    let analyzer = GeometryAnalyzer::new(DmsConfig {
        layout: layout(),
        ..Default::default()
    })
    .unwrap();
    let extractor = StaticEmbeddingExtractor::new(compact_model(), query.map(FaceEmbedding::new));

    let pipeline = DetectionPipeline::new(
        analyzer,
        Arc::new(StaticLandmarkDetector::new(faces)),
        Arc::new(extractor),
        registry.clone(),
        store.clone(),
    );
    Harness { pipeline, registry, store }
}

fn request(device: &str, image: String, identify: bool) -> DetectRequest {
    DetectRequest {
        device_id: device.to_string(),
        image,
        user_id: None,
        identify,
    }
}

#[tokio::test]
async fn test_no_face_is_not_drowsy_and_raises_no_alert() {
    let h = harness(Vec::new(), None, RecordingStore::default());

    let outcome = h.pipeline.detect(request("cab-1", jpeg_base64(), false)).await.unwrap();

    assert_eq!((outcome.metrics.ear, outcome.metrics.mar, outcome.metrics.head_tilt), (0.0, 0.0, 0.0));
    assert!(!outcome.metrics.is_drowsy);
    assert_eq!(outcome.alert, None);
    assert_eq!(h.store.detections.lock().unwrap().len(), 1);
    assert!(h.store.alerts.lock().unwrap().is_empty());
    assert_eq!(h.registry.is_drowsy("cab-1"), Some(false));
}

#[tokio::test]
async fn test_closed_eyes_raise_drowsy_alert() {
    let h = harness(vec![face(0.15, 0.3)], None, RecordingStore::default());

    let outcome = h.pipeline.detect(request("cab-1", jpeg_base64(), false)).await.unwrap();

    assert!((outcome.metrics.ear - 0.15).abs() < 1e-9);
    assert!(outcome.metrics.is_drowsy);
    assert_eq!(outcome.alert, Some(AlertKind::Drowsy));
    assert_eq!(outcome.detection_id, Some(1));

    let alerts = h.store.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Drowsy);
    assert_eq!(alerts[0].detection_id, Some(1));
    assert_eq!(h.registry.is_drowsy("cab-1"), Some(true));
}

#[tokio::test]
async fn test_yawn_raises_yawning_alert() {
    let h = harness(vec![face(0.3, 0.7)], None, RecordingStore::default());

    let outcome = h.pipeline.detect(request("cab-1", jpeg_base64(), false)).await.unwrap();

    assert_eq!(outcome.alert, Some(AlertKind::Yawning));
    assert_eq!(h.store.alerts.lock().unwrap()[0].kind, AlertKind::Yawning);
}

#[tokio::test]
async fn test_similarity_above_threshold_matches() {
    let alice = DriverRecord {
        id: Uuid::new_v4(),
        display_name: "Alice".into(),
        embedding: Some(vec![1.0, 0.0]),
    };
    let h = harness(Vec::new(), Some(at_similarity(0.50)), RecordingStore::with_drivers(vec![alice.clone()]));

    let outcome = h.pipeline.detect(request("cab-1", jpeg_base64(), true)).await.unwrap();

    assert!(matches!(outcome.identity, Some(MatchResult::Matched { driver_id, .. }) if driver_id == alice.id));
    assert_eq!(outcome.driver_label(), "Alice");
    assert_eq!(h.store.detections.lock().unwrap()[0].driver_id, Some(alice.id));
}

#[tokio::test]
async fn test_similarity_below_threshold_is_unknown() {
    let alice = DriverRecord {
        id: Uuid::new_v4(),
        display_name: "Alice".into(),
        embedding: Some(vec![1.0, 0.0]),
    };
    let h = harness(Vec::new(), Some(at_similarity(0.40)), RecordingStore::with_drivers(vec![alice]));

    let outcome = h.pipeline.detect(request("cab-1", jpeg_base64(), true)).await.unwrap();

    assert!(matches!(outcome.identity, Some(MatchResult::Unmatched { .. })));
    assert_eq!(outcome.driver_label(), "Unknown");
    assert_eq!(h.store.detections.lock().unwrap()[0].driver_id, None);
}

#[tokio::test]
async fn test_malformed_payload_touches_nothing() {
    let h = harness(vec![face(0.15, 0.3)], Some(at_similarity(0.9)), RecordingStore::default());

    let err = h
        .pipeline
        .detect(request("cab-1", "not base64 at all!".into(), true))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Decode(_)));
    assert_eq!(h.registry.device_count(), 0);
    assert_eq!(h.store.calls(), 0);
}

#[tokio::test]
async fn test_base64_of_non_image_is_decode_error() {
    let h = harness(Vec::new(), None, RecordingStore::default());

    let err = h
        .pipeline
        .detect(request("cab-1", STANDARD.encode(b"plain text"), false))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Decode(_)));
    assert_eq!(h.store.calls(), 0);
}

#[tokio::test]
async fn test_storage_failure_does_not_fail_detect() {
    let h = harness(vec![face(0.15, 0.3)], Some(at_similarity(0.9)), RecordingStore::failing());

    let outcome = h.pipeline.detect(request("cab-1", jpeg_base64(), true)).await.unwrap();

    assert!(outcome.metrics.is_drowsy);
    assert_eq!(outcome.detection_id, None);
    assert_eq!(outcome.driver_label(), "Unknown");
    // snapshot, detection and alert were all attempted
    assert_eq!(h.store.calls(), 3);
    assert_eq!(h.registry.frames("cab-1").len(), 1);
    assert_eq!(h.registry.is_drowsy("cab-1"), Some(true));
}

#[tokio::test]
async fn test_detect_feeds_live_registry() {
    let h = harness(Vec::new(), None, RecordingStore::default());

    h.pipeline.detect(request("cab-7", jpeg_base64(), false)).await.unwrap();

    assert!(h.registry.latest("cab-7").is_some());
    assert_eq!(h.registry.list_active(Instant::now(), PUSH_STALENESS), vec!["cab-7".to_string()]);
}

#[tokio::test]
async fn test_truncated_landmarks_degrade_to_no_face() {
    let h = harness(vec![LandmarkSet::new(vec![Landmark::new(0.5, 0.5); 3])], None, RecordingStore::default());

    let outcome = h.pipeline.detect(request("cab-1", jpeg_base64(), false)).await.unwrap();

    assert!(!outcome.metrics.face_detected);
    assert!(!outcome.metrics.is_drowsy);
}

#[tokio::test]
async fn test_archive_path_is_recorded() {
    let dir = std::env::temp_dir().join(format!("pipeline-archive-{}", Uuid::new_v4()));
    let mut h = harness(Vec::new(), None, RecordingStore::default());
    h.pipeline = h.pipeline.with_archive(FrameArchive::new(&dir));

    let outcome = h.pipeline.detect(request("cab-1", jpeg_base64(), false)).await.unwrap();

    let path = outcome.image_path.clone().unwrap();
    assert!(path.contains("cab-1_"));
    assert_eq!(h.store.detections.lock().unwrap()[0].image_path, Some(path));
    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

fn enrollment(query: Option<Vec<f32>>, store: Arc<RecordingStore>) -> EnrollmentFlow {
    let extractor = StaticEmbeddingExtractor::new(compact_model(), query.map(FaceEmbedding::new));
    EnrollmentFlow::new(Arc::new(extractor), store.clone(), store)
}

#[tokio::test]
async fn test_unknown_face_is_enrolled_then_recognized() {
    let store = Arc::new(RecordingStore::default());
    let flow = enrollment(Some(vec![1.0, 0.0]), store.clone());

    let first = flow.identify(&jpeg_base64(), Some("Bob")).await.unwrap();
    assert!(matches!(&first, EnrollmentOutcome::Enrolled { display_name, .. } if display_name == "Bob"));

    let second = flow.identify(&jpeg_base64(), None).await.unwrap();
    assert!(matches!(second, EnrollmentOutcome::Recognized { .. }));
    assert_eq!(first.driver_id(), second.driver_id());
    assert_eq!(store.drivers.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_enrollment_without_face_fails() {
    let store = Arc::new(RecordingStore::default());
    let flow = enrollment(None, store.clone());

    let err = flow.identify(&jpeg_base64(), Some("Bob")).await.unwrap_err();
    assert!(matches!(err, PipelineError::NoFace));
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_enrollment_surfaces_storage_errors() {
    let store = Arc::new(RecordingStore::failing());
    let flow = enrollment(Some(vec![1.0, 0.0]), store);

    let err = flow.identify(&jpeg_base64(), None).await.unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)));
}

fn png_base64() -> String {
    let img = image::RgbImage::from_pixel(16, 16, image::Rgb([200, 40, 40]));
    let mut png = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut png, image::ImageFormat::Png)
        .unwrap();
    STANDARD.encode(png.into_inner())
}

#[tokio::test]
async fn test_png_payload_is_archived_and_streamed_as_jpeg() {
    let dir = std::env::temp_dir().join(format!("pipeline-png-{}", Uuid::new_v4()));
    let mut h = harness(Vec::new(), None, RecordingStore::default());
    h.pipeline = h.pipeline.with_archive(FrameArchive::new(&dir));

    let outcome = h.pipeline.detect(request("cab", png_base64(), false)).await.unwrap();

    let path = outcome.image_path.unwrap();
    assert!(path.ends_with(".jpg"));
    let archived = tokio::fs::read(&path).await.unwrap();
    assert_eq!(image::guess_format(&archived).unwrap(), image::ImageFormat::Jpeg);

    let live = h.registry.latest("cab").unwrap();
    assert_eq!(&live[..2], &[0xFF, 0xD8]);
    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

struct PanickingDetector;

impl LandmarkDetector for PanickingDetector {
    fn detect(&self, _frame: &VideoFrame) -> Result<Vec<LandmarkSet>, DmsError> {
        panic!("landmark model crashed");
    }
}

struct PanickingExtractor(EmbeddingModel);

impl EmbeddingExtractor for PanickingExtractor {
    fn model(&self) -> &EmbeddingModel {
        &self.0
    }

    fn extract(&self, _frame: &VideoFrame) -> Result<Option<FaceEmbedding>, AuthError> {
        panic!("embedding model crashed");
    }
}

#[tokio::test]
async fn test_crashed_model_tasks_still_update_registry() {
    let registry = DeviceStreamRegistry::default();
    let store = Arc::new(RecordingStore::default());
    let pipeline = DetectionPipeline::new(
        GeometryAnalyzer::new(DmsConfig::default()).unwrap(),
        Arc::new(PanickingDetector),
        Arc::new(PanickingExtractor(compact_model())),
        registry.clone(),
        store.clone(),
    );

    let outcome = pipeline.detect(request("cab-1", jpeg_base64(), true)).await.unwrap();

    assert!(!outcome.metrics.face_detected);
    assert!(matches!(outcome.identity, Some(MatchResult::Unmatched { best_similarity: None })));
    assert_eq!(registry.frames("cab-1").len(), 1);
    assert_eq!(registry.is_drowsy("cab-1"), Some(false));
    assert_eq!(store.detections.lock().unwrap().len(), 1);
}
