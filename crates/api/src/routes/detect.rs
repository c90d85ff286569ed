//! Detection Routes

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap},
    Json,
};
use chrono::Utc;
use driver_auth::SessionValidator;
use pipeline::{DetectRequest, DetectionOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{ApiError, AppState};

/// Body of the device detect call
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceDetectRequest {
    pub esp32_id: String,
    /// Base64 encoded image
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct DeviceDetectResponse {
    pub is_drowsy: bool,
    pub ear: f64,
    pub mar: f64,
    pub head_tilt: f64,
}

/// Body of the authenticated detect call
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverDetectRequest {
    pub device_id: String,
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct DriverDetectResponse {
    pub driver: String,
    pub is_drowsy: bool,
    pub ear: f64,
    pub mar: f64,
    pub tilt: f64,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl From<&DetectionOutcome> for DeviceDetectResponse {
    fn from(outcome: &DetectionOutcome) -> Self {
        let m = &outcome.metrics;
        Self {
            is_drowsy: m.is_drowsy,
            ear: round_to(m.ear, 2),
            mar: round_to(m.mar, 2),
            head_tilt: round_to(m.head_tilt, 1),
        }
    }
}

impl From<&DetectionOutcome> for DriverDetectResponse {
    fn from(outcome: &DetectionOutcome) -> Self {
        let m = &outcome.metrics;
        Self {
            driver: outcome.driver_label().to_string(),
            is_drowsy: m.is_drowsy,
            ear: round_to(m.ear, 2),
            mar: round_to(m.mar, 2),
            tilt: round_to(m.head_tilt, 1),
        }
    }
}

/// Geometry-only detect for edge devices
pub async fn detect(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeviceDetectRequest>, JsonRejection>,
) -> Result<Json<DeviceDetectResponse>, ApiError> {
    let Json(body) = payload?;
    let outcome = state
        .pipeline
        .detect(DetectRequest {
            device_id: body.esp32_id,
            image: body.image,
            user_id: None,
            identify: false,
        })
        .await?;
    Ok(Json(DeviceDetectResponse::from(&outcome)))
}

/// Authenticated detect with driver identification.
///
/// The session is checked before the body is looked at.
pub async fn detect_driver(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<DriverDetectRequest>, JsonRejection>,
) -> Result<Json<DriverDetectResponse>, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    let session = state
        .sessions
        .validate(token, Utc::now())
        .map_err(|_| ApiError::Unauthorized)?;

    let Json(body) = payload?;
    let outcome = state
        .pipeline
        .detect(DetectRequest {
            device_id: body.device_id,
            image: body.image,
            user_id: Some(session.user_id),
            identify: true,
        })
        .await?;
    Ok(Json(DriverDetectResponse::from(&outcome)))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_rounding() {
        assert_eq!(round_to(0.2149, 2), 0.21);
        assert_eq!(round_to(0.2151, 2), 0.22);
        assert_eq!(round_to(22.6199, 1), 22.6);
        assert_eq!(round_to(0.0, 2), 0.0);
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer  abc123 "));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let parsed: Result<DeviceDetectRequest, _> =
            serde_json::from_str(r#"{"esp32_id": "cab-1", "image": "", "extra": 1}"#);
        assert!(parsed.is_err());

        let parsed: Result<DeviceDetectRequest, _> = serde_json::from_str(r#"{"esp32_id": "cab-1"}"#);
        assert!(parsed.is_err());
    }
}
