//! Detection Record Routes

use axum::{
    extract::{Path, Query, State},
    Json,
};
use fatigue::FatigueLevel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::{DetectionRecord, RecordMethod};

use crate::{ApiError, AppState};

/// Query parameters for records endpoint
#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    /// Filter by method (`image`, `video`, `camera`)
    pub method: Option<String>,
    /// Only records of this user
    pub username: Option<String>,
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for records endpoint
#[derive(Debug, Serialize)]
pub struct RecordsResponse {
    pub success: bool,
    pub data: Vec<DetectionRecord>,
    pub count: usize,
}

/// Single record response
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub success: bool,
    pub data: DetectionRecord,
}

/// Fatigue level correction
#[derive(Debug, Deserialize)]
pub struct UpdateLevelRequest {
    pub fatigue_level: String,
}

/// Get records, most recent first
pub async fn get_records(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecordQuery>,
) -> Result<Json<RecordsResponse>, ApiError> {
    let limit = params.limit.min(500);
    let method = match params.method.as_deref().filter(|m| !m.is_empty()) {
        Some(label) => Some(RecordMethod::parse(label).ok_or_else(|| {
            ApiError::BadRequest(format!("Unknown detection method: {}", label))
        })?),
        None => None,
    };

    let data = match params.username.as_deref() {
        Some(username) => state
            .repository
            .get_user_records(username, usize::MAX)?
            .into_iter()
            .filter(|r| method.map_or(true, |m| r.method == m))
            .take(limit)
            .collect(),
        None => state.repository.get_records(method, limit)?,
    };

    Ok(Json(RecordsResponse {
        success: true,
        count: data.len(),
        data,
    }))
}

/// Get one record
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<RecordResponse>, ApiError> {
    let data = state.repository.get(id)?;
    Ok(Json(RecordResponse { success: true, data }))
}

/// Delete one record
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<RecordResponse>, ApiError> {
    let data = state.repository.delete(id)?;
    Ok(Json(RecordResponse { success: true, data }))
}

/// Correct the fatigue level of a record
pub async fn update_fatigue_level(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateLevelRequest>,
) -> Result<Json<RecordResponse>, ApiError> {
    let level = FatigueLevel::parse(&body.fatigue_level).ok_or_else(|| {
        ApiError::BadRequest(format!("Unknown fatigue level: {}", body.fatigue_level))
    })?;
    let data = state.repository.update_fatigue_level(id, level.as_str())?;
    Ok(Json(RecordResponse { success: true, data }))
}
