//! Model lookup and cache
//!
//! Models are loaded once per file name and shared read-only afterwards.

use crate::classifier::FrameClassifier;
use crate::yolo::YoloOnnxClassifier;
use crate::{DetectError, DetectorConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// Model file extensions the registry can load
pub const MODEL_EXTENSION: &str = "onnx";

/// Model file metadata
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: u64,
    pub size_mb: f64,
    pub modified: DateTime<Utc>,
    pub path: String,
}

/// Resolves model names to loaded classifiers
pub struct ModelRegistry {
    config: DetectorConfig,
    cache: RwLock<HashMap<String, Arc<dyn FrameClassifier>>>,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new(config: DetectorConfig) -> Self {
        info!("Creating model registry (search dirs: {:?})", config.model_dirs);
        Self {
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Default model name
    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    /// Register an already constructed classifier under `name`
    pub fn insert(&self, name: impl Into<String>, classifier: Arc<dyn FrameClassifier>) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), classifier);
    }

    /// Get a classifier, loading the model on first use.
    ///
    /// `None` selects the default model. Unknown models yield
    /// [`DetectError::ModelUnavailable`].
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn FrameClassifier>, DetectError> {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.config.default_model);

        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(Arc::clone(cached));
        }

        let path = self.resolve(name).ok_or_else(|| {
            warn!("Model file not found: {}", name);
            DetectError::ModelUnavailable
        })?;

        let loaded: Arc<dyn FrameClassifier> =
            Arc::new(YoloOnnxClassifier::load(&path, &self.config)?);

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // Another request may have loaded it meanwhile; keep the first
        let entry = cache.entry(name.to_string()).or_insert(loaded);
        Ok(Arc::clone(entry))
    }

    /// Find a model file in the search directories
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if !is_plain_file_name(name) {
            warn!("Rejecting model name with path components: {}", name);
            return None;
        }

        self.config
            .model_dirs
            .iter()
            .map(|dir| Path::new(dir).join(name))
            .find(|path| path.is_file())
    }

    /// List model files across search directories.
    ///
    /// Names appearing in several directories are reported once (first
    /// directory wins); the result is ordered by modification time.
    pub fn list(&self) -> Vec<ModelInfo> {
        let mut by_name: HashMap<String, ModelInfo> = HashMap::new();

        for dir in &self.config.model_dirs {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };

            for entry in entries.flatten() {
                let path = entry.path();
                let is_model = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map_or(false, |e| e.eq_ignore_ascii_case(MODEL_EXTENSION));
                if !is_model {
                    continue;
                }
                let Ok(meta) = entry.metadata() else {
                    continue;
                };
                let name = entry.file_name().to_string_lossy().into_owned();
                let modified = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());

                by_name.entry(name.clone()).or_insert(ModelInfo {
                    name,
                    size: meta.len(),
                    size_mb: (meta.len() as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
                    modified,
                    path: path.display().to_string(),
                });
            }
        }

        let mut models: Vec<ModelInfo> = by_name.into_values().collect();
        models.sort_by_key(|m| m.modified);
        models
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let path = Path::new(name);
    path.file_name().map_or(false, |f| f == path.as_os_str()) && !name.starts_with('.')
}
