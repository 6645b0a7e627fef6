//! Alerting System
//!
//! Decides when an alarming fatigue level turns into a driver alert,
//! with per-session cooldown and an hourly cap.

mod manager;

pub use manager::{AlertConfig, AlertManager, AlertState, FatigueAlert, PendingAlert};
