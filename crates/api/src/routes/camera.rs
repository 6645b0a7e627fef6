//! Live Camera Session Routes
//!
//! A camera session is keyed by username (`camera_{username}`). Frames are
//! either pushed by the client or pulled by a background worker from a
//! video file, a frame directory or a capture device.

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use camera_capture::{open_device, open_path};
use fatigue::Modality;
use serde::{Deserialize, Serialize};
use session_lifecycle::{camera_session_id, FrameOutcome, SessionOrigin, SessionStatus};
use std::sync::Arc;
use storage::DetectionRecord;
use tracing::info;

use super::models::resolve_model;
use crate::{ApiError, AppState};

fn default_username() -> String {
    "camera_user".to_string()
}

/// Username query parameter
#[derive(Debug, Deserialize)]
pub struct CameraQuery {
    #[serde(default = "default_username")]
    pub username: String,
}

/// Body of session control requests
#[derive(Debug, Deserialize)]
pub struct CameraRequest {
    #[serde(default = "default_username")]
    pub username: String,
    /// Video file or frame directory to stream from
    pub path: Option<String>,
    /// Capture device index, used when no path is given.
    /// Clients push frames when neither is set.
    pub device: Option<i32>,
    pub fps: Option<f64>,
    /// Model pinned to the session instead of the current one
    pub model: Option<String>,
}

/// Where a background stream reads from
enum StreamSource {
    Path(String),
    Device(i32),
}

/// Response for session start
#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub success: bool,
    pub session_id: String,
    pub streaming: bool,
    pub source: Option<String>,
}

/// Response for a pushed frame
#[derive(Debug, Serialize)]
pub struct FrameResponse {
    pub success: bool,
    pub session_id: String,
    #[serde(flatten)]
    pub outcome: FrameOutcome,
    pub status: SessionStatus,
}

/// Response for session status
#[derive(Debug, Serialize)]
pub struct CameraStatusResponse {
    pub success: bool,
    #[serde(flatten)]
    pub status: SessionStatus,
}

/// Response for stop, save and reset
#[derive(Debug, Serialize)]
pub struct PersistResponse {
    pub success: bool,
    pub session_id: String,
    pub message: String,
    /// `None` when there was no open session
    pub record: Option<DetectionRecord>,
}

/// Open a camera session, optionally streaming from a file, directory or device
pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CameraRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let session_id = camera_session_id(&request.username);
    let origin = SessionOrigin::camera(request.username);
    let service = state.service.clone();
    let models = Arc::clone(&state.models);
    let (model, fps) = (request.model, request.fps);

    let source = match (request.path, request.device) {
        (Some(path), _) => Some(StreamSource::Path(path)),
        (None, Some(index)) => Some(StreamSource::Device(index)),
        (None, None) => None,
    };

    let Some(source) = source else {
        let id = session_id.clone();
        tokio::task::spawn_blocking(move || {
            let classifier = resolve_model(&models, model.as_deref())?;
            service
                .open_session(&id, &origin, classifier)
                .map_err(ApiError::from)
        })
        .await??;
        info!("Camera session {} opened for pushed frames", session_id);
        return Ok(Json(StartResponse {
            success: true,
            session_id,
            streaming: false,
            source: None,
        }));
    };

    let id = session_id.clone();
    let started = tokio::task::spawn_blocking(move || {
        let classifier = resolve_model(&models, model.as_deref())?;
        let source = match source {
            StreamSource::Path(path) => open_path(&path, fps)?,
            StreamSource::Device(index) => open_device(index, fps)?,
        };
        service
            .start_stream(&id, origin, source, classifier)
            .map_err(ApiError::from)
    })
    .await??;

    Ok(Json(StartResponse {
        success: true,
        session_id,
        streaming: true,
        source: Some(started.source),
    }))
}

/// Classify one pushed frame into the user's camera session
pub async fn submit_frame(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CameraQuery>,
    body: Bytes,
) -> Result<Json<FrameResponse>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("No frame uploaded".to_string()));
    }

    let session_id = camera_session_id(&params.username);
    let origin = SessionOrigin::camera(params.username);
    let service = state.service.clone();
    let id = session_id.clone();
    let (outcome, status) = tokio::task::spawn_blocking(move || {
        let outcome = service.submit_encoded(&id, &origin, &body);
        let status = service.get_status(&id, Modality::Camera);
        (outcome, status)
    })
    .await?;

    if outcome == FrameOutcome::Unavailable {
        return Err(ApiError::Unavailable);
    }

    Ok(Json(FrameResponse {
        success: true,
        session_id,
        outcome,
        status,
    }))
}

/// Current fatigue level of the user's camera session
pub async fn status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CameraQuery>,
) -> Json<CameraStatusResponse> {
    let session_id = camera_session_id(&params.username);
    Json(CameraStatusResponse {
        success: true,
        status: state.service.get_status(&session_id, Modality::Camera),
    })
}

/// Stop streaming, persist the session and close it
pub async fn stop(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CameraRequest>>,
) -> Json<PersistResponse> {
    let session_id = camera_session_id(&username_of(body));
    let record = state.service.stop(&session_id);
    let message = match &record {
        Some(r) => format!("Session saved with fatigue level {}", r.fatigue_level),
        None => "No active session".to_string(),
    };
    Json(PersistResponse {
        success: true,
        session_id,
        message,
        record,
    })
}

/// Same as stop: the session is persisted once and then closed
pub async fn save(
    state: State<Arc<AppState>>,
    body: Option<Json<CameraRequest>>,
) -> Json<PersistResponse> {
    stop(state, body).await
}

/// Persist the current segment and restart counting in the same session
pub async fn reset(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CameraRequest>>,
) -> Json<PersistResponse> {
    let session_id = camera_session_id(&username_of(body));
    let record = state.service.reset(&session_id);
    let message = match &record {
        Some(_) => "Session reset".to_string(),
        None => "No active session".to_string(),
    };
    Json(PersistResponse {
        success: true,
        session_id,
        message,
        record,
    })
}

/// Username from an optional control body
fn username_of(body: Option<Json<CameraRequest>>) -> String {
    body.map_or_else(default_username, |Json(request)| request.username)
}
