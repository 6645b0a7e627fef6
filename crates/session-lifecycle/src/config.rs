//! Session lifecycle configuration

use alerting::AlertConfig;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum spacing between two fatigue evaluations (seconds)
    pub fatigue_interval_secs: f64,

    /// Frame rate assumed for video sources that report none
    pub default_video_fps: f64,

    /// Evict (and persist) sessions without updates for this long.
    /// `None` disables the sweep.
    pub idle_timeout_secs: Option<u64>,

    /// Alert cooldown and throttling
    pub alerting: AlertConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fatigue_interval_secs: fatigue::DEFAULT_INTERVAL_SECS,
            default_video_fps: camera_capture::DEFAULT_FPS,
            idle_timeout_secs: None,
            alerting: AlertConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn cadence(&self) -> fatigue::FatigueCadence {
        fatigue::FatigueCadence::new(self.fatigue_interval_secs)
    }

    /// Frame rate for a video source, falling back to `default_video_fps`
    pub fn video_fps(&self, reported: Option<f64>) -> f64 {
        camera_capture::effective_fps(reported.or(Some(self.default_video_fps)))
    }

    /// Idle timeout as a duration.
    ///
    /// `None` when the sweep is disabled or the value does not fit a
    /// [`Duration`] (beyond roughly 292 million years).
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
    }

    /// Reject settings that cannot be honored
    pub fn validate(&self) -> Result<(), String> {
        match self.idle_timeout_secs {
            Some(secs) if self.idle_timeout().is_none() => {
                Err(format!("session.idle_timeout_secs = {} is out of range", secs))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_timeout_conversion() {
        let mut config = SessionConfig::default();
        assert_eq!(config.idle_timeout(), None);
        assert!(config.validate().is_ok());

        config.idle_timeout_secs = Some(300);
        assert_eq!(config.idle_timeout(), Some(Duration::minutes(5)));

        for secs in [u64::MAX, 10_000_000_000_000_000] {
            config.idle_timeout_secs = Some(secs);
            assert_eq!(config.idle_timeout(), None);
            assert!(config.validate().is_err());
        }
    }
}
