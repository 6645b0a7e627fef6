//! Fatigue Monitor API Server
//!
//! REST API for image, video and live camera fatigue detection, plus the
//! detection record history.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use detector::{FrameClassifier, MockClassifier, ModelRegistry};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use storage::Repository;
use tower_governor::GovernorLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod error;
pub mod rate_limit;
mod routes;

pub use config::{AppConfig, ServerConfig};
pub use error::ApiError;

use rate_limit::{create_governor_config, RateLimitConfig};
use session_lifecycle::FatigueService;

/// Application state shared across handlers
pub struct AppState {
    pub service: FatigueService,
    pub repository: Arc<Repository>,
    pub models: Arc<ModelRegistry>,
    /// Prometheus exporter, when a recorder was installed
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire the service onto `repository` as its record sink
    pub fn new(
        config: &AppConfig,
        detector: Option<Arc<dyn FrameClassifier>>,
        repository: Arc<Repository>,
        models: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            service: FatigueService::new(config.session_config(), detector, repository.clone()),
            repository,
            models,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub version: String,
    pub uptime_seconds: u64,
    pub model_loaded: bool,
    pub model: Option<String>,
    pub active_sessions: usize,
    pub record_count: usize,
}

/// Create the application router
pub fn create_router(
    state: Arc<AppState>,
    rate_limit: &RateLimitConfig,
    max_body_bytes: usize,
) -> Router {
    let uploads = Router::new()
        .route("/api/detect/image", post(routes::detect::detect_image))
        .route("/api/detect/video", post(routes::detect::detect_video))
        .route("/api/monitor/detect/image", post(routes::detect::monitor_image))
        .route("/api/monitor/detect/video", post(routes::detect::monitor_video))
        .route("/api/camera/frame", post(routes::camera::submit_frame));

    let uploads = match create_governor_config(rate_limit) {
        Some(config) => uploads.layer(GovernorLayer { config }),
        None => uploads,
    };

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/video/status", get(routes::detect::video_status))
        .route("/api/camera/start", post(routes::camera::start))
        .route("/api/camera/status", get(routes::camera::status))
        .route("/api/camera/stop", post(routes::camera::stop))
        .route("/api/camera/save", post(routes::camera::save))
        .route("/api/camera/reset", post(routes::camera::reset))
        .route("/api/records", get(routes::records::get_records))
        .route(
            "/api/records/:id",
            get(routes::records::get_record).delete(routes::records::delete_record),
        )
        .route("/api/records/:id/fatigue-level", put(routes::records::update_fatigue_level))
        .route("/api/models", get(routes::models::list_models))
        .route(
            "/api/models/current",
            get(routes::models::current_model).post(routes::models::select_model),
        )
        .route("/api/alerts", get(routes::alerts::get_alerts))
        .route("/api/alerts/acknowledge", post(routes::alerts::acknowledge))
        .merge(uploads)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let model = state.service.detector_name();
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().timestamp(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        model_loaded: model.is_some(),
        model,
        active_sessions: state.service.sessions().store().len(),
        record_count: state.repository.count(),
    })
}

/// Prometheus scrape endpoint
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

/// Initialize logging
pub fn init_logging(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level: Level = config.log_level.parse().unwrap_or(Level::INFO);

    if config.json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

/// Load the default model, falling back to the mock detector when allowed.
///
/// The mock is registered as `mock`, so requests can select it by name.
pub fn load_detector(
    config: &AppConfig,
    registry: &ModelRegistry,
) -> Option<Arc<dyn FrameClassifier>> {
    match registry.get(None) {
        Ok(detector) => Some(detector),
        Err(e) if config.server.mock_detector => {
            warn!("Default model unavailable ({}), using mock detector", e);
            let mock: Arc<dyn FrameClassifier> = Arc::new(MockClassifier::new());
            registry.insert(mock.name(), Arc::clone(&mock));
            Some(mock)
        }
        Err(e) => {
            warn!("Default model unavailable ({}), detection disabled", e);
            None
        }
    }
}

/// Run the API server until Ctrl-C, then persist every open session
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            session_lifecycle::describe_metrics();
            Some(handle)
        }
        Err(e) => {
            warn!("Metrics recorder not installed: {}", e);
            None
        }
    };

    let models = Arc::new(ModelRegistry::new(config.detector.clone()));
    let detector = {
        let registry = Arc::clone(&models);
        let app_config = config.clone();
        tokio::task::spawn_blocking(move || load_detector(&app_config, &registry)).await?
    };

    let repository = Arc::new(Repository::new());
    let mut state = AppState::new(&config, detector, repository, models);
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }
    let state = Arc::new(state);

    if let Some(secs) = config.session.idle_timeout_secs {
        let service = state.service.clone();
        // Sweeps run at most a minute apart
        let period = std::time::Duration::from_secs(secs.clamp(1, 60));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let service = service.clone();
                let saved = tokio::task::spawn_blocking(move || service.sweep_configured())
                    .await
                    .map(|records| records.len())
                    .unwrap_or(0);
                if saved > 0 {
                    info!("Idle sweep persisted {} session(s)", saved);
                }
            }
        });
    }

    let app = create_router(
        Arc::clone(&state),
        &config.rate_limit,
        config.server.max_body_bytes,
    );

    info!("Starting API server on {}", config.server.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    let service = state.service.clone();
    let saved = tokio::task::spawn_blocking(move || service.stop_all()).await?;
    info!("Shutdown complete, {} session(s) persisted", saved.len());
    Ok(())
}
