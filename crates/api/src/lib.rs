//! Drowsiness Monitor API Server
//!
//! HTTP surface for cabin camera devices and dashboards: frame push, live
//! multipart previews, drowsiness detection and driver identification.

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use camera_capture::VideoFrame;
use dms::{GeometryAnalyzer, LandmarkDetector, NoModelDetector};
use driver_auth::{EmbeddingExtractor, EmbeddingModel, InMemorySessions, NoModelExtractor, SessionValidator};
use live_stream::{DeviceStreamRegistry, StreamMultiplexer};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use pipeline::{DetectionPipeline, EnrollmentFlow};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{DetectionStore, DriverRoster, FrameArchive, Repository, SqliteRepository};
use tower_governor::GovernorLayer;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod settings;
mod error;
pub mod rate_limit;
mod routes;

pub use settings::Settings;
pub use error::ApiError;

use rate_limit::{create_governor_config, IdentifyGovernorConfig};

/// Model-backed and storage-backed collaborators of the pipeline
#[derive(Clone)]
pub struct Collaborators {
    pub detector: Arc<dyn LandmarkDetector>,
    pub extractor: Arc<dyn EmbeddingExtractor>,
    pub store: Arc<dyn DetectionStore>,
    pub roster: Arc<dyn DriverRoster>,
    pub sessions: Arc<dyn SessionValidator>,
}

impl Collaborators {
    /// Storage and sessions from settings. No landmark or embedding model is
    /// bundled, so both seams report "no face" until one is plugged in.
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let model = EmbeddingModel::by_name(&settings.identity.model)?;

        let (store, roster): (Arc<dyn DetectionStore>, Arc<dyn DriverRoster>) = match &settings.storage.database_url {
            Some(url) => {
                let repo = Arc::new(
                    SqliteRepository::connect(url)
                        .await
                        .with_context(|| format!("opening database {url}"))?,
                );
                let store: Arc<dyn DetectionStore> = repo.clone();
                let roster: Arc<dyn DriverRoster> = repo;
                (store, roster)
            }
            None => {
                warn!("No database configured, detections are kept in memory only");
                let repo = Arc::new(Repository::new());
                let store: Arc<dyn DetectionStore> = repo.clone();
                let roster: Arc<dyn DriverRoster> = repo;
                (store, roster)
            }
        };

        let sessions: InMemorySessions = settings
            .auth
            .sessions
            .iter()
            .map(|(token, user)| (token.clone(), *user))
            .collect();
        if sessions.is_empty() {
            warn!("No sessions configured, /api/v1/detect will reject every request");
        }

        Ok(Self {
            detector: Arc::new(NoModelDetector::new()),
            extractor: Arc::new(NoModelExtractor::new(model)),
            store,
            roster,
            sessions: Arc::new(sessions),
        })
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub registry: DeviceStreamRegistry,
    pub multiplexer: StreamMultiplexer,
    pub pipeline: DetectionPipeline,
    pub enrollment: EnrollmentFlow,
    pub sessions: Arc<dyn SessionValidator>,
    /// Window for `/api/streams`
    pub push_staleness: Duration,
    /// Window for `/api/devices`
    pub device_staleness: Duration,
    pub max_body_bytes: usize,
    pub identify_limit: Arc<IdentifyGovernorConfig>,
    /// Set when the Prometheus recorder is installed
    pub prometheus: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: &Settings, collaborators: Collaborators) -> anyhow::Result<Self> {
        let analyzer = GeometryAnalyzer::new(settings.geometry.dms_config())?;
        let registry = DeviceStreamRegistry::new(settings.stream.buffer_capacity);

        let placeholder = match &settings.stream.placeholder_path {
            Some(path) => std::fs::read(path).with_context(|| format!("reading placeholder {}", path.display()))?,
            None => VideoFrame::filled(320, 240, [32, 32, 32]).to_jpeg()?,
        };
        let multiplexer =
            StreamMultiplexer::new(registry.clone(), settings.stream.poll_interval()).with_placeholder(&placeholder);

        let mut pipeline = DetectionPipeline::new(
            analyzer,
            collaborators.detector,
            Arc::clone(&collaborators.extractor),
            registry.clone(),
            Arc::clone(&collaborators.store),
        );
        if let Some(dir) = &settings.storage.upload_dir {
            info!(dir = %dir.display(), "Archiving detect frames");
            pipeline = pipeline.with_archive(FrameArchive::new(dir));
        }
        let enrollment = EnrollmentFlow::new(collaborators.extractor, collaborators.store, collaborators.roster);

        let identify_limit =
            create_governor_config(&settings.rate_limit).context("rate_limit needs a non-zero period and burst")?;

        Ok(Self {
            registry,
            multiplexer,
            pipeline,
            enrollment,
            sessions: collaborators.sessions,
            push_staleness: settings.stream.push_staleness(),
            device_staleness: settings.stream.device_staleness(),
            max_body_bytes: settings.server.max_body_bytes,
            identify_limit,
            prometheus: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        })
    }

    /// Expose metrics at `/metrics`
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub devices: DeviceCounts,
    pub viewers: usize,
}

#[derive(Debug, Serialize)]
pub struct DeviceCounts {
    /// Devices seen since startup
    pub known: usize,
    /// Pushed within the push staleness window
    pub streaming: usize,
    /// Seen within the device staleness window
    pub online: usize,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let identify_limit = GovernorLayer {
        config: Arc::clone(&state.identify_limit),
    };

    Router::new()
        .route("/", get(root_handler))
        .route("/api/v1/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/stream/push/:device_id", post(routes::stream::push_frame))
        .route("/api/stream/:device_id", get(routes::stream::stream_device))
        .route("/api/streams", get(routes::stream::list_streams))
        .route("/api/devices", get(routes::stream::list_devices))
        .route("/api/detect", post(routes::detect::detect))
        .route("/api/v1/detect", post(routes::detect::detect_driver))
        .route(
            "/api/v1/drivers/identify",
            post(routes::drivers::identify).layer(identify_limit),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Hello World!" }))
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let now = Instant::now();
    let streaming = state.registry.list_active(now, state.push_staleness).len();
    let online = state.registry.list_active(now, state.device_staleness).len();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        devices: DeviceCounts {
            known: state.registry.device_count(),
            streaming,
            online,
        },
        viewers: state.multiplexer.viewer_count(),
    })
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Initialize logging. `RUST_LOG` overrides the default `info` level.
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {e}"))
}

/// Install the global Prometheus recorder and describe the pipeline metrics
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("installing Prometheus recorder")?;

    metrics::describe_counter!("frames_pushed_total", "Frames added to device buffers");
    metrics::describe_counter!("detections_total", "Detections persisted");
    metrics::describe_counter!("alerts_total", "Drowsiness alerts persisted, by kind");
    metrics::describe_counter!("persistence_failures_total", "Storage or archive writes that failed");
    metrics::describe_counter!("decode_failures_total", "Image payloads that could not be decoded");
    metrics::describe_gauge!("stream_viewers", "Attached live preview viewers");
    metrics::describe_gauge!("stream_devices", "Devices seen since startup");
    Ok(handle)
}

/// Run the server until Ctrl-C
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let collaborators = Collaborators::from_settings(&settings).await?;
    let state = AppState::new(&settings, collaborators)?.with_prometheus(init_metrics()?);
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&settings.server.bind)
        .await
        .with_context(|| format!("binding {}", settings.server.bind))?;
    info!("Starting API server on {}", settings.server.bind);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
