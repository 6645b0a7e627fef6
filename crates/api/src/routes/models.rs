//! Model Routes

use axum::{extract::State, Json};
use detector::{DetectError, FrameClassifier, ModelInfo, ModelRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::{ApiError, AppState};

/// Response for models endpoint
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub success: bool,
    pub data: Vec<ModelInfo>,
    pub count: usize,
    pub default_model: String,
    /// Model the service is running with
    pub loaded: Option<String>,
}

/// Response for the current model
#[derive(Debug, Serialize)]
pub struct CurrentModelResponse {
    pub success: bool,
    pub model: Option<String>,
    pub default_model: String,
}

/// Request to switch the current model
#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    pub model: String,
}

/// List model files available to the detector
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let models = Arc::clone(&state.models);
    let data = tokio::task::spawn_blocking(move || models.list())
        .await
        .unwrap_or_default();

    Json(ModelsResponse {
        success: true,
        count: data.len(),
        default_model: state.models.default_model().to_string(),
        loaded: state.service.detector_name(),
        data,
    })
}

/// Model used by requests that do not pick one
pub async fn current_model(State(state): State<Arc<AppState>>) -> Json<CurrentModelResponse> {
    Json(current(&state))
}

/// Switch the current model; sessions that pinned a model keep theirs
pub async fn select_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectModelRequest>,
) -> Result<Json<CurrentModelResponse>, ApiError> {
    let models = Arc::clone(&state.models);
    let name = request.model;
    let classifier = tokio::task::spawn_blocking(move || resolve_model(&models, Some(&name)))
        .await??
        .ok_or_else(|| ApiError::BadRequest("Model name is required".to_string()))?;

    info!("Switching current model to {}", classifier.name());
    state.service.set_detector(classifier);
    Ok(Json(current(&state)))
}

/// Classifier for a per-request `model` field.
///
/// Blank or missing names select nothing (the service's current model
/// applies). Loads the model on first use, so call it off the async runtime.
pub fn resolve_model(
    models: &ModelRegistry,
    name: Option<&str>,
) -> Result<Option<Arc<dyn FrameClassifier>>, ApiError> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    match models.get(Some(name)) {
        Ok(classifier) => Ok(Some(classifier)),
        Err(DetectError::ModelUnavailable) => {
            Err(ApiError::NotFound(format!("Model not found: {}", name)))
        }
        Err(e) => Err(ApiError::BadRequest(e.to_string())),
    }
}

fn current(state: &AppState) -> CurrentModelResponse {
    CurrentModelResponse {
        success: true,
        model: state.service.detector_name(),
        default_model: state.models.default_model().to_string(),
    }
}
