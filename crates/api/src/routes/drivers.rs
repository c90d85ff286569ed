//! Driver Routes

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use pipeline::EnrollmentOutcome;
use serde::Deserialize;
use std::sync::Arc;

use crate::{ApiError, AppState};

/// Body of the identify call
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentifyRequest {
    /// Base64 encoded image
    pub image: String,
    /// Name to enroll under if the face is new
    #[serde(default)]
    pub name: Option<String>,
}

/// Recognize a driver, enrolling them when nobody matches.
///
/// 200 for a recognized driver, 201 for a new enrollment.
pub async fn identify(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IdentifyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EnrollmentOutcome>), ApiError> {
    let Json(body) = payload?;
    let outcome = state.enrollment.identify(&body.image, body.name.as_deref()).await?;

    let status = match outcome {
        EnrollmentOutcome::Recognized { .. } => StatusCode::OK,
        EnrollmentOutcome::Enrolled { .. } => StatusCode::CREATED,
    };
    Ok((status, Json(outcome)))
}
