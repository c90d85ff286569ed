//! Immutable detection and alert events

use chrono::{DateTime, Utc};
use dms::{AlertKind, DrowsinessMetrics};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One analyzed detect call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub device_id: String,
    /// Matched driver, if any
    pub driver_id: Option<Uuid>,
    /// Session owner in the authenticated flow
    pub user_id: Option<Uuid>,
    pub similarity: Option<f64>,
    pub metrics: DrowsinessMetrics,
    /// Archived frame, when archiving is enabled and succeeded
    pub image_path: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// Raised for a drowsy detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// `None` when the detection row itself failed to persist
    pub detection_id: Option<i64>,
    pub device_id: String,
    pub driver_id: Option<Uuid>,
    pub kind: AlertKind,
    pub created_at: DateTime<Utc>,
}

/// Stored detection
#[derive(Debug, Clone, Serialize)]
pub struct DetectionRecord {
    pub id: i64,
    #[serde(flatten)]
    pub event: DetectionEvent,
}

/// Stored alert
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    pub id: i64,
    #[serde(flatten)]
    pub event: AlertEvent,
}
