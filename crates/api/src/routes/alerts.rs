//! Alert Routes

use alerting::PendingAlert;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{ApiError, AppState};

/// Query parameters for alerts endpoint
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Maximum number of alerts
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for alerts endpoint
#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub success: bool,
    pub data: Vec<PendingAlert>,
    pub count: usize,
    pub alerts_this_hour: usize,
}

/// Acknowledge request
#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    pub session_id: String,
}

/// Response for acknowledge
#[derive(Debug, Serialize)]
pub struct AcknowledgeResponse {
    pub success: bool,
    pub session_id: String,
    /// Whether an alert was pending
    pub acknowledged: bool,
}

/// Unacknowledged alerts, oldest first
pub async fn get_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertQuery>,
) -> Json<AlertResponse> {
    let mut alerts = state.service.pending_alerts();
    alerts.truncate(params.limit);

    Json(AlertResponse {
        success: true,
        count: alerts.len(),
        alerts_this_hour: state.service.alerts_this_hour(),
        data: alerts,
    })
}

/// Acknowledge a session's last alert
pub async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AcknowledgeRequest>,
) -> Result<Json<AcknowledgeResponse>, ApiError> {
    let acknowledged = state.service.acknowledge_alert(&request.session_id)?;
    Ok(Json(AcknowledgeResponse {
        success: true,
        session_id: request.session_id,
        acknowledged,
    }))
}
