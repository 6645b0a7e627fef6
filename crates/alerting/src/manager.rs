//! Alert Manager Implementation

use chrono::{DateTime, Duration, Utc};
use fatigue::FatigueLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Cooldown between two alerts of the same session (seconds)
    pub cooldown_seconds: u64,
    /// Maximum alerts per hour across all sessions before throttling
    pub max_alerts_per_hour: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 5,
            max_alerts_per_hour: 600,
        }
    }
}

/// State of one session's alerts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertState {
    /// Last time an alert was fired
    pub last_fired: DateTime<Utc>,
    /// Level of the last alert
    pub last_level: FatigueLevel,
    /// Number of times fired
    pub fire_count: usize,
    /// Whether the last alert is acknowledged
    pub acknowledged: bool,
}

/// An alert that was fired
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FatigueAlert {
    pub session_id: String,
    pub level: FatigueLevel,
    pub message: String,
    pub fired_at: DateTime<Utc>,
}

/// A session whose last alert is not acknowledged yet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingAlert {
    pub session_id: String,
    #[serde(flatten)]
    pub state: AlertState,
}

/// Alert manager for deduplication and throttling
pub struct AlertManager {
    config: AlertConfig,
    /// Alert states by session id
    states: HashMap<String, AlertState>,
    /// Alerts fired in current hour
    hourly_count: usize,
    hour_start: Option<DateTime<Utc>>,
}

impl AlertManager {
    /// Create a new alert manager
    pub fn new(config: AlertConfig) -> Self {
        info!("Creating alert manager with config: {:?}", config);
        Self {
            config,
            states: HashMap::new(),
            hourly_count: 0,
            hour_start: None,
        }
    }

    /// Check whether `level` should raise an alert for `session_id` at `now`
    pub fn should_fire(
        &mut self,
        session_id: &str,
        level: FatigueLevel,
        now: DateTime<Utc>,
    ) -> bool {
        if !level.is_alarming() {
            return false;
        }

        // Reset hourly counter if needed
        match self.hour_start {
            Some(start) if now - start <= Duration::hours(1) => {}
            _ => {
                self.hourly_count = 0;
                self.hour_start = Some(now);
            }
        }

        if self.hourly_count >= self.config.max_alerts_per_hour {
            warn!("Alert throttled: max alerts per hour reached");
            return false;
        }

        if let Some(state) = self.states.get(session_id) {
            if now - state.last_fired < self.cooldown() {
                debug!("Alert for {} suppressed: in cooldown period", session_id);
                return false;
            }
        }

        true
    }

    /// Cooldown as a duration; out-of-range values never expire
    fn cooldown(&self) -> Duration {
        i64::try_from(self.config.cooldown_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    /// Record that an alert was fired
    pub fn record_fire(
        &mut self,
        session_id: &str,
        level: FatigueLevel,
        now: DateTime<Utc>,
    ) -> FatigueAlert {
        self.hourly_count += 1;

        let state = self.states.entry(session_id.to_string()).or_insert(AlertState {
            last_fired: now,
            last_level: level,
            fire_count: 0,
            acknowledged: false,
        });

        state.last_fired = now;
        state.last_level = level;
        state.fire_count += 1;
        state.acknowledged = false;

        warn!("Fatigue alert for {}: {} (count: {})", session_id, level, state.fire_count);

        FatigueAlert {
            session_id: session_id.to_string(),
            level,
            message: format!("{} detected, please take a break", level.display_text()),
            fired_at: now,
        }
    }

    /// Fire an alert if allowed
    pub fn evaluate(
        &mut self,
        session_id: &str,
        level: FatigueLevel,
        now: DateTime<Utc>,
    ) -> Option<FatigueAlert> {
        if self.should_fire(session_id, level, now) {
            Some(self.record_fire(session_id, level, now))
        } else {
            None
        }
    }

    /// Acknowledge a session's alert
    pub fn acknowledge(&mut self, session_id: &str) -> bool {
        if let Some(state) = self.states.get_mut(session_id) {
            state.acknowledged = true;
            info!("Alert acknowledged: {}", session_id);
            true
        } else {
            false
        }
    }

    /// Get pending (unacknowledged) alerts, oldest first
    pub fn get_pending(&self) -> Vec<PendingAlert> {
        let mut pending: Vec<PendingAlert> = self
            .states
            .iter()
            .filter(|(_, state)| !state.acknowledged)
            .map(|(session_id, state)| PendingAlert {
                session_id: session_id.clone(),
                state: state.clone(),
            })
            .collect();
        pending.sort_by_key(|p| p.state.last_fired);
        pending
    }

    /// Forget a finished session
    pub fn forget(&mut self, session_id: &str) {
        self.states.remove(session_id);
    }

    /// Get hourly alert count
    pub fn hourly_count(&self) -> usize {
        self.hourly_count
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_only_alarming_levels_fire() {
        let mut manager = AlertManager::default();

        assert!(!manager.should_fire("camera_alice", FatigueLevel::Moderate, t0()));
        assert!(!manager.should_fire("camera_alice", FatigueLevel::Medium, t0()));
        assert!(manager.should_fire("camera_alice", FatigueLevel::Severe, t0()));
        assert!(manager.should_fire("camera_alice", FatigueLevel::High, t0()));
    }

    #[test]
    fn test_deduplication() {
        let mut manager = AlertManager::default();

        let alert = manager.evaluate("camera_alice", FatigueLevel::Severe, t0()).unwrap();
        assert_eq!(alert.level, FatigueLevel::Severe);
        assert!(alert.message.starts_with("Severe Fatigue"));

        // Immediate duplicate should not fire
        let soon = t0() + Duration::seconds(2);
        assert!(manager.evaluate("camera_alice", FatigueLevel::Severe, soon).is_none());
        // Other sessions are independent
        assert!(manager.evaluate("camera_bob", FatigueLevel::Severe, t0()).is_some());
        // Cooldown elapsed
        let later = t0() + Duration::seconds(5);
        assert!(manager.evaluate("camera_alice", FatigueLevel::Severe, later).is_some());
    }

    #[test]
    fn test_hourly_throttle() {
        let mut manager = AlertManager::new(AlertConfig {
            cooldown_seconds: 0,
            max_alerts_per_hour: 2,
        });

        assert!(manager.evaluate("a", FatigueLevel::High, t0()).is_some());
        assert!(manager.evaluate("b", FatigueLevel::High, t0()).is_some());
        assert!(manager.evaluate("c", FatigueLevel::High, t0()).is_none());
        assert_eq!(manager.hourly_count(), 2);

        assert!(manager.evaluate("c", FatigueLevel::High, t0() + Duration::minutes(61)).is_some());
    }

    #[test]
    fn test_acknowledgement() {
        let mut manager = AlertManager::default();
        manager.record_fire("camera_alice", FatigueLevel::Severe, t0());

        manager.record_fire("camera_bob", FatigueLevel::High, t0() + Duration::seconds(1));

        let pending = manager.get_pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].session_id, "camera_alice");
        assert_eq!(pending[0].state.fire_count, 1);
        assert!(manager.acknowledge("camera_alice"));
        assert_eq!(manager.get_pending()[0].session_id, "camera_bob");
        manager.forget("camera_bob");
        assert!(manager.get_pending().is_empty());

        manager.forget("camera_alice");
        assert!(!manager.acknowledge("camera_alice"));
    }

    #[test]
    fn test_huge_cooldown_does_not_wrap() {
        let mut manager = AlertManager::new(AlertConfig {
            cooldown_seconds: u64::MAX,
            max_alerts_per_hour: 10,
        });

        assert!(manager.evaluate("camera_alice", FatigueLevel::Severe, t0()).is_some());
        let next_day = t0() + Duration::days(1);
        assert!(manager.evaluate("camera_alice", FatigueLevel::Severe, next_day).is_none());
    }
}
