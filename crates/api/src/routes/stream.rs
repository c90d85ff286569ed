//! Live Stream Routes

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use camera_capture::DecodeError;
use chrono::{DateTime, Utc};
use live_stream::DeviceSummary;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::{ApiError, AppState};

/// Entry of the registered-device listing
#[derive(Debug, Serialize)]
pub struct DeviceStatus {
    pub device_id: String,
    pub online: bool,
    pub is_drowsy: bool,
    pub last_seen: DateTime<Utc>,
    pub frame_count: u64,
}

impl From<DeviceSummary> for DeviceStatus {
    fn from(summary: DeviceSummary) -> Self {
        Self {
            device_id: summary.device_id,
            online: summary.active,
            is_drowsy: summary.is_drowsy,
            last_seen: summary.last_seen,
            frame_count: summary.frame_count,
        }
    }
}

/// Accept a raw preview frame from a device. No analysis runs on this path.
pub async fn push_frame(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    if body.is_empty() {
        return Err(ApiError::Decode(DecodeError::Empty));
    }
    debug!(device_id = %device_id, bytes = body.len(), "Preview frame received");
    state.registry.push(&device_id, body);
    Ok(StatusCode::NO_CONTENT)
}

/// Long-lived multipart stream of a device's latest frames
pub async fn stream_device(State(state): State<Arc<AppState>>, Path(device_id): Path<String>) -> Response {
    let viewer = state.multiplexer.subscribe(&device_id);
    (
        [
            (header::CONTENT_TYPE, live_stream::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store"),
        ],
        Body::from_stream(viewer),
    )
        .into_response()
}

/// Devices that pushed within the push staleness window
pub async fn list_streams(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceSummary>> {
    let streams = state
        .registry
        .summaries(Instant::now(), state.push_staleness)
        .into_iter()
        .filter(|summary| summary.active)
        .collect();
    Json(streams)
}

/// Every known device, online if seen within the device staleness window
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceStatus>> {
    let devices = state
        .registry
        .summaries(Instant::now(), state.device_staleness)
        .into_iter()
        .map(DeviceStatus::from)
        .collect();
    Json(devices)
}
