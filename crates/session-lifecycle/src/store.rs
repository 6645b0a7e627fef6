//! Session store
//!
//! The map lock is only held to look up, create or remove an entry; all
//! per-session work happens under that session's own mutex.

use alerting::FatigueAlert;
use chrono::{DateTime, Utc};
use detector::FrameClassifier;
use fatigue::{Modality, RollingWindow, SessionStats, Timebase};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Who a session belongs to and how its frames arrive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOrigin {
    pub username: String,
    pub modality: Modality,
}

impl SessionOrigin {
    pub fn new(username: impl Into<String>, modality: Modality) -> Self {
        Self {
            username: username.into(),
            modality,
        }
    }

    pub fn camera(username: impl Into<String>) -> Self {
        Self::new(username, Modality::Camera)
    }

    pub fn video(username: impl Into<String>) -> Self {
        Self::new(username, Modality::Video)
    }

    pub fn image(username: impl Into<String>) -> Self {
        Self::new(username, Modality::Image)
    }
}

/// Camera session id convention
pub fn camera_session_id(username: &str) -> String {
    format!("camera_{}", username)
}

/// Mutable state of one session
#[derive(Debug)]
pub struct SessionEntry {
    pub stats: SessionStats,
    pub origin: SessionOrigin,
    /// Present for sessions classified with the rolling window
    pub window: Option<RollingWindow>,
    /// Set once the entry has been claimed for final persistence
    pub closed: bool,
    pub last_alert: Option<FatigueAlert>,
    /// Model pinned for this session; `None` follows the service's current model
    pub classifier: Option<Arc<dyn FrameClassifier>>,
}

impl SessionEntry {
    pub fn new(origin: SessionOrigin, now: DateTime<Utc>, timebase: Timebase) -> Self {
        Self {
            stats: SessionStats::new(now, timebase),
            origin,
            window: None,
            closed: false,
            last_alert: None,
            classifier: None,
        }
    }

    pub fn with_window(mut self, window: RollingWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_classifier(mut self, classifier: Option<Arc<dyn FrameClassifier>>) -> Self {
        self.classifier = classifier;
        self
    }
}

pub type SessionHandle = Arc<Mutex<SessionEntry>>;

/// Lock a session entry, recovering from a poisoned mutex
pub fn lock_entry(handle: &SessionHandle) -> MutexGuard<'_, SessionEntry> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Concurrency-safe map of session id to entry
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    /// Existing entry, or a new one built by `create`.
    ///
    /// Returns the handle and whether it was created.
    pub fn get_or_create(
        &self,
        session_id: &str,
        create: impl FnOnce() -> SessionEntry,
    ) -> (SessionHandle, bool) {
        if let Some(existing) = self.get(session_id) {
            return (existing, false);
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = sessions.get(session_id) {
            return (Arc::clone(existing), false);
        }
        let handle = Arc::new(Mutex::new(create()));
        sessions.insert(session_id.to_string(), Arc::clone(&handle));
        (handle, true)
    }

    /// Insert a fresh entry, failing if the id is taken
    pub fn insert_new(&self, session_id: &str, entry: SessionEntry) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(session_id) {
            return None;
        }
        let handle = Arc::new(Mutex::new(entry));
        sessions.insert(session_id.to_string(), Arc::clone(&handle));
        Some(handle)
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
    }

    /// Remove `session_id` only if it still maps to `handle`
    pub fn remove_if_same(&self, session_id: &str, handle: &SessionHandle) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(session_id) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                sessions.remove(session_id);
                true
            }
            _ => false,
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> SessionEntry {
        SessionEntry::new(SessionOrigin::camera("alice"), Utc::now(), Timebase::WallClock)
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = SessionStore::new();
        let (first, created) = store.get_or_create("camera_alice", entry);
        assert!(created);
        let (second, created) =
            store.get_or_create("camera_alice", || panic!("must not create twice"));
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_if_same() {
        let store = SessionStore::new();
        let (old, _) = store.get_or_create("camera_alice", entry);
        store.remove("camera_alice");
        let (_new, created) = store.get_or_create("camera_alice", entry);
        assert!(created);

        // A stale handle does not evict its replacement
        assert!(!store.remove_if_same("camera_alice", &old));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_new_rejects_duplicates() {
        let store = SessionStore::new();
        assert!(store.insert_new("video_1", entry()).is_some());
        assert!(store.insert_new("video_1", entry()).is_none());
        assert_eq!(store.ids(), vec!["video_1".to_string()]);
    }

    #[test]
    fn test_camera_session_id() {
        assert_eq!(camera_session_id("alice"), "camera_alice");
    }
}
