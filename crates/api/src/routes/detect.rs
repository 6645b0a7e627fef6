//! Image and Video Detection Routes

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use camera_capture::{open_path, VideoFrame};
use fatigue::{ClassificationPolicy, Modality};
use serde::{Deserialize, Serialize};
use session_lifecycle::{
    SessionOrigin, SessionStatus, SingleImageReport, VideoPolicy, VideoReport,
};
use std::sync::Arc;
use tracing::info;

use super::models::resolve_model;
use crate::{ApiError, AppState};

/// Query parameters for image uploads
#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    #[serde(default = "default_username")]
    pub username: String,
    /// Model to classify with instead of the current one
    pub model: Option<String>,
}

fn default_username() -> String {
    "anonymous".to_string()
}

/// Offline video job request
#[derive(Debug, Deserialize)]
pub struct VideoRequest {
    #[serde(default = "default_username")]
    pub username: String,
    /// Video file, or a directory holding the clip's frames as images
    pub path: String,
    /// Clip frame rate (defaults to the rate the clip reports, then the
    /// configured video fps)
    pub fps: Option<f64>,
    /// Session id to poll through `/api/video/status` while the job runs
    pub session_id: Option<String>,
    /// Model to classify with instead of the current one
    pub model: Option<String>,
}

/// Query parameters for video status
#[derive(Debug, Deserialize)]
pub struct VideoStatusQuery {
    pub session_id: String,
}

/// Response for image detection
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub success: bool,
    pub username: String,
    #[serde(flatten)]
    pub report: SingleImageReport,
}

/// Response for video detection
#[derive(Debug, Serialize)]
pub struct VideoResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: VideoReport,
}

/// Response for video status
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(flatten)]
    pub status: SessionStatus,
}

/// Classify one uploaded image with the single-image table
pub async fn detect_image(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ImageQuery>,
    body: Bytes,
) -> Result<Json<ImageResponse>, ApiError> {
    run_image(state, params, body, ClassificationPolicy::SingleImage).await
}

/// Classify one uploaded image with the rolling-window table
pub async fn monitor_image(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ImageQuery>,
    body: Bytes,
) -> Result<Json<ImageResponse>, ApiError> {
    run_image(state, params, body, ClassificationPolicy::WindowCount).await
}

/// Run a clip with the cumulative rate policy
pub async fn detect_video(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VideoRequest>,
) -> Result<Json<VideoResponse>, ApiError> {
    run_video(state, request, VideoPolicy::Cumulative).await
}

/// Run a clip with the rolling-window policy
pub async fn monitor_video(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VideoRequest>,
) -> Result<Json<VideoResponse>, ApiError> {
    run_video(state, request, VideoPolicy::RollingWindow).await
}

/// Status of a running (or unknown) video job
pub async fn video_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VideoStatusQuery>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        status: state.service.get_status(&params.session_id, Modality::Video),
    })
}

async fn run_image(
    state: Arc<AppState>,
    params: ImageQuery,
    body: Bytes,
    policy: ClassificationPolicy,
) -> Result<Json<ImageResponse>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("No image uploaded".to_string()));
    }

    let service = state.service.clone();
    let models = Arc::clone(&state.models);
    let user = params.username.clone();
    let report = tokio::task::spawn_blocking(move || {
        let classifier = resolve_model(&models, params.model.as_deref())?;
        let frame = VideoFrame::decode(&body, 0)?;
        service
            .detect_image(&user, &frame, policy, classifier)
            .map_err(ApiError::from)
    })
    .await??;

    Ok(Json(ImageResponse {
        success: true,
        username: params.username,
        report,
    }))
}

async fn run_video(
    state: Arc<AppState>,
    request: VideoRequest,
    policy: VideoPolicy,
) -> Result<Json<VideoResponse>, ApiError> {
    info!("Video job requested by {} for {}", request.username, request.path);

    let service = state.service.clone();
    let models = Arc::clone(&state.models);
    let report = tokio::task::spawn_blocking(move || {
        let classifier = resolve_model(&models, request.model.as_deref())?;
        let source = open_path(&request.path, request.fps)?;
        let origin = SessionOrigin::video(request.username);
        let result = match request.session_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => service.run_video_job_as(&id, origin, source, policy, classifier),
            None => service.run_video_job(origin, source, policy, classifier),
        };
        result.map_err(ApiError::from)
    })
    .await??;

    Ok(Json(VideoResponse { success: true, report }))
}
