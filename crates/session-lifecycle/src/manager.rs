//! Session accumulation and persistence
//!
//! Every session segment ends in exactly one [`DetectionRecord`]: an entry
//! is claimed under its own lock (`closed = true`) before it is persisted,
//! and later stop/reset calls on a claimed entry do nothing.

use crate::clock::Clock;
use crate::store::{lock_entry, SessionEntry, SessionHandle, SessionOrigin, SessionStore};
use crate::{ACTIVE_SESSIONS, DETECTION_RECORDS_TOTAL};
use chrono::{DateTime, Duration, Utc};
use detector::DetectionEvent;
use fatigue::{Modality, SessionStats, Timebase};
use std::sync::Arc;
use storage::{DetectionRecord, RecordDetails, RecordMethod, RecordSink};
use tracing::{debug, error, info};

/// Owns the session store and hands finished segments to the record sink
pub struct SessionManager {
    store: SessionStore,
    sink: Arc<dyn RecordSink>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(sink: Arc<dyn RecordSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: SessionStore::new(),
            sink,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Existing stats for `session_id`, or zeroed stats starting now
    pub fn ensure_session(&self, session_id: &str, origin: &SessionOrigin) -> SessionStats {
        let handle = self.ensure_entry(session_id, || {
            SessionEntry::new(origin.clone(), self.now(), Timebase::WallClock)
        });
        let entry = lock_entry(&handle);
        entry.stats.clone()
    }

    /// Existing entry, or one built by `create`
    pub fn ensure_entry(
        &self,
        session_id: &str,
        create: impl FnOnce() -> SessionEntry,
    ) -> SessionHandle {
        let (handle, created) = self.store.get_or_create(session_id, create);
        if created {
            info!("Session {} started", session_id);
            self.update_gauge();
        }
        handle
    }

    /// Register a brand-new entry; `None` if the id is already in use
    pub fn create_entry(&self, session_id: &str, entry: SessionEntry) -> Option<SessionHandle> {
        let handle = self.store.insert_new(session_id, entry)?;
        info!("Session {} started", session_id);
        self.update_gauge();
        Some(handle)
    }

    /// Add events to an existing session.
    ///
    /// Returns `false` when the session is absent or already persisted.
    pub fn record(&self, session_id: &str, events: &[DetectionEvent]) -> bool {
        let now = self.now();
        self.with_entry(session_id, |entry| entry.stats.record(events, now))
            .is_some()
    }

    /// Read-only copy of a session's stats
    pub fn snapshot(&self, session_id: &str) -> Option<SessionStats> {
        self.with_entry(session_id, |entry| entry.stats.clone())
    }

    /// Run `f` on an open session's entry under its lock
    pub fn with_entry<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionEntry) -> R,
    ) -> Option<R> {
        let handle = self.store.get(session_id)?;
        let mut entry = lock_entry(&handle);
        if entry.closed {
            return None;
        }
        Some(f(&mut entry))
    }

    /// Persist the current segment and start a new one in the same session.
    ///
    /// The session stays active; a stream feeding it keeps recording into
    /// the zeroed counters.
    pub fn reset(&self, session_id: &str) -> Option<DetectionRecord> {
        let handle = self.store.get(session_id)?;
        let now = self.now();

        let record = {
            let mut entry = lock_entry(&handle);
            if entry.closed {
                return None;
            }
            let record = build_record(session_id, &entry, now);
            entry.stats.reset(now);
            if let Some(window) = entry.window.as_mut() {
                window.clear();
            }
            entry.last_alert = None;
            record
        };

        info!("Session {} reset", session_id);
        Some(self.persist(record))
    }

    /// Persist the session and remove it
    pub fn stop(&self, session_id: &str) -> Option<DetectionRecord> {
        let handle = self.store.remove(session_id)?;
        self.update_gauge();
        let record = self.claim(session_id, &handle)?;
        info!("Session {} stopped", session_id);
        Some(self.persist(record))
    }

    /// Persist and remove a session through a handle obtained earlier.
    ///
    /// Only removes the map entry if it still refers to `handle`.
    pub fn finish(&self, session_id: &str, handle: &SessionHandle) -> Option<DetectionRecord> {
        if self.store.remove_if_same(session_id, handle) {
            self.update_gauge();
        }
        let record = self.claim(session_id, handle)?;
        info!("Session {} finished", session_id);
        Some(self.persist(record))
    }

    /// Ids of open sessions whose last update is older than `max_idle`
    pub fn idle_sessions(&self, max_idle: Duration) -> Vec<String> {
        let now = self.now();
        self.store
            .ids()
            .into_iter()
            .filter(|id| {
                self.with_entry(id, |entry| now - entry.stats.last_update() > max_idle)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Persist and evict sessions idle for longer than `max_idle`
    pub fn sweep_idle(&self, max_idle: Duration) -> Vec<DetectionRecord> {
        let idle = self.idle_sessions(max_idle);
        if !idle.is_empty() {
            info!("Evicting {} idle session(s)", idle.len());
        }
        idle.iter()
            .filter_map(|id| self.stop_if_idle(id, max_idle))
            .collect()
    }

    /// Persist and remove `session_id` if it is still idle.
    ///
    /// Idleness is re-checked under the entry lock, so a frame that lands
    /// after the session was listed as idle keeps it alive.
    pub fn stop_if_idle(&self, session_id: &str, max_idle: Duration) -> Option<DetectionRecord> {
        let handle = self.store.get(session_id)?;
        let now = self.now();

        let record = {
            let mut entry = lock_entry(&handle);
            if entry.closed || now - entry.stats.last_update() <= max_idle {
                return None;
            }
            close_entry(session_id, &mut entry, now)
        };

        if self.store.remove_if_same(session_id, &handle) {
            self.update_gauge();
        }
        info!("Session {} evicted after idling", session_id);
        Some(self.persist(record))
    }

    /// Hand a record to the sink.
    ///
    /// Storage failures are logged; the returned record then keeps id 0.
    pub fn persist(&self, mut record: DetectionRecord) -> DetectionRecord {
        match self.sink.persist(record.clone()) {
            Ok(id) => {
                record.id = id;
                metrics::counter!(DETECTION_RECORDS_TOTAL).increment(1);
                debug!("Persisted record {} ({})", id, record.details.session_id);
            }
            Err(e) => {
                error!("Failed to persist record for {}: {}", record.details.session_id, e);
            }
        }
        record
    }

    fn claim(&self, session_id: &str, handle: &SessionHandle) -> Option<DetectionRecord> {
        let mut entry = lock_entry(handle);
        if entry.closed {
            debug!("Session {} already persisted", session_id);
            return None;
        }
        Some(close_entry(session_id, &mut entry, self.now()))
    }

    fn update_gauge(&self) {
        metrics::gauge!(ACTIVE_SESSIONS).set(self.store.len() as f64);
    }
}

/// Mark a claimed entry closed and summarize it
fn close_entry(session_id: &str, entry: &mut SessionEntry, now: DateTime<Utc>) -> DetectionRecord {
    entry.closed = true;
    entry.stats.set_detection_active(false);
    build_record(session_id, entry, now)
}

/// Record method for a modality
pub fn record_method(modality: Modality) -> RecordMethod {
    match modality {
        Modality::Image => RecordMethod::Image,
        Modality::Video => RecordMethod::Video,
        Modality::Camera => RecordMethod::Camera,
    }
}

/// Summarize a session segment.
///
/// Windowed sessions report the window's level; all others the rate
/// table over total elapsed time.
pub fn build_record(
    session_id: &str,
    entry: &SessionEntry,
    now: DateTime<Utc>,
) -> DetectionRecord {
    let stats = &entry.stats;
    let elapsed = stats.elapsed_seconds(now);
    let rates = stats.rates(now);
    let level = match &entry.window {
        Some(window) => window.level(),
        None => stats.final_level(now),
    };

    let details = RecordDetails {
        session_id: session_id.to_string(),
        total_seconds: elapsed,
        closed_eyes_count: stats.closed_eyes_count(),
        closed_mouth_count: stats.closed_mouth_count(),
        open_eyes_count: stats.open_eyes_count(),
        open_mouth_count: stats.open_mouth_count(),
        total_detections: stats.total_detections(),
        total_frames: stats.total_frames(),
        closed_eyes_per_sec: rates.closed_eyes_per_second,
        open_mouth_per_sec: rates.open_mouth_per_second,
    };

    DetectionRecord::completed(
        entry.origin.username.clone(),
        record_method(entry.origin.modality),
        level.as_str(),
        details,
        stats.mean_confidence(),
        now,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use detector::DetectionClass;
    use fatigue::FatigueLevel;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use storage::{Repository, StorageError};

    fn setup() -> (SessionManager, Arc<Repository>, Arc<ManualClock>) {
        let repo = Arc::new(Repository::new());
        let clock = Arc::new(ManualClock::default());
        let manager = SessionManager::new(repo.clone(), clock.clone());
        (manager, repo, clock)
    }

    fn events(class: DetectionClass, n: usize) -> Vec<DetectionEvent> {
        (0..n)
            .map(|_| DetectionEvent {
                class,
                confidence: 0.8,
                observed_at: Utc::now(),
            })
            .collect()
    }

    struct FailingSink;

    impl RecordSink for FailingSink {
        fn persist(&self, _record: DetectionRecord) -> Result<i64, StorageError> {
            Err(StorageError::DatabaseError("disk full".to_string()))
        }
    }

    #[test]
    fn test_ensure_session_is_idempotent() {
        let (manager, _repo, clock) = setup();
        let origin = SessionOrigin::camera("alice");

        let first = manager.ensure_session("camera_alice", &origin);
        clock.advance_secs(3);
        manager.record("camera_alice", &events(DetectionClass::OpenEyes, 2));
        let second = manager.ensure_session("camera_alice", &origin);

        assert_eq!(first.start_time(), second.start_time());
        assert_eq!(second.open_eyes_count(), 2);
        assert_eq!(manager.store().len(), 1);
    }

    #[test]
    fn test_record_on_absent_session() {
        let (manager, _repo, _clock) = setup();
        assert!(!manager.record("camera_ghost", &events(DetectionClass::ClosedEyes, 1)));
        assert!(manager.store().is_empty());
    }

    #[test]
    fn test_reset_persists_then_zeroes() {
        let (manager, repo, clock) = setup();
        manager.ensure_session("camera_alice", &SessionOrigin::camera("alice"));
        manager.record("camera_alice", &events(DetectionClass::ClosedEyes, 3));
        manager.record("camera_alice", &events(DetectionClass::OpenMouth, 1));
        clock.advance_secs(10);

        let record = manager.reset("camera_alice").unwrap();
        assert_eq!(record.id, 1);
        assert_eq!(record.method, RecordMethod::Camera);
        assert_eq!(record.details.closed_eyes_count, 3);
        assert_eq!(record.details.open_mouth_count, 1);
        assert_eq!(record.details.total_detections, 4);
        assert_eq!(record.details.total_seconds, 10.0);
        assert_eq!(repo.count(), 1);

        let stats = manager.snapshot("camera_alice").unwrap();
        assert_eq!(stats.total_detections(), 0);
        assert_eq!(stats.start_time(), clock.now());
        assert!(stats.detection_active());
    }

    #[test]
    fn test_stop_persists_once() {
        let (manager, repo, clock) = setup();
        manager.ensure_session("camera_alice", &SessionOrigin::camera("alice"));
        manager.record("camera_alice", &events(DetectionClass::ClosedEyes, 41));
        clock.advance_secs(10);

        let record = manager.stop("camera_alice").unwrap();
        assert_eq!(record.fatigue_level, FatigueLevel::Moderate.as_str());
        assert_eq!(record.details.closed_eyes_per_sec, 4.1);
        assert!(manager.stop("camera_alice").is_none());
        assert!(manager.reset("camera_alice").is_none());
        assert_eq!(repo.count(), 1);
        assert!(manager.snapshot("camera_alice").is_none());
    }

    #[test]
    fn test_storage_failure_still_cleans_up() {
        let clock = Arc::new(ManualClock::default());
        let manager = SessionManager::new(Arc::new(FailingSink), clock);
        manager.ensure_session("camera_alice", &SessionOrigin::camera("alice"));

        let record = manager.stop("camera_alice").unwrap();
        assert_eq!(record.id, 0);
        assert!(manager.store().is_empty());
    }

    #[test]
    fn test_finish_ignores_replaced_entry() {
        let (manager, repo, _clock) = setup();
        let origin = SessionOrigin::video("bob");
        let old = manager.ensure_entry("video_1", || {
            SessionEntry::new(origin.clone(), Utc::now(), Timebase::WallClock)
        });
        manager.stop("video_1");
        manager.ensure_session("video_1", &origin);

        assert!(manager.finish("video_1", &old).is_none());
        assert_eq!(manager.store().len(), 1);
        assert_eq!(repo.count(), 1);
    }

    #[test]
    fn test_sweep_idle() {
        let (manager, repo, clock) = setup();
        manager.ensure_session("camera_alice", &SessionOrigin::camera("alice"));
        clock.advance_secs(100);
        manager.ensure_session("camera_bob", &SessionOrigin::camera("bob"));
        clock.advance_secs(30);

        let evicted = manager.sweep_idle(Duration::seconds(60));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].username, "alice");
        assert!(manager.snapshot("camera_bob").is_some());
        assert_eq!(repo.count(), 1);
    }

    #[test]
    fn test_frame_after_idle_listing_keeps_session() {
        let (manager, repo, clock) = setup();
        manager.ensure_session("camera_alice", &SessionOrigin::camera("alice"));
        clock.advance_secs(100);

        let idle = manager.idle_sessions(Duration::seconds(60));
        assert_eq!(idle, vec!["camera_alice".to_string()]);

        // A frame arrives between the listing and the eviction
        manager.record("camera_alice", &events(DetectionClass::OpenEyes, 1));
        assert!(manager.stop_if_idle("camera_alice", Duration::seconds(60)).is_none());
        assert!(manager.sweep_idle(Duration::seconds(60)).is_empty());

        assert_eq!(manager.snapshot("camera_alice").unwrap().open_eyes_count(), 1);
        assert_eq!(repo.count(), 0);
    }

    #[test]
    fn test_stop_if_idle_races_stop_once() {
        let (manager, repo, clock) = setup();
        manager.ensure_session("camera_alice", &SessionOrigin::camera("alice"));
        clock.advance_secs(100);

        let evicted = manager.stop_if_idle("camera_alice", Duration::seconds(60)).unwrap();
        assert_eq!(evicted.username, "alice");
        assert!(manager.stop("camera_alice").is_none());
        assert!(manager.store().is_empty());
        assert_eq!(repo.count(), 1);
    }

    #[test]
    fn test_concurrent_record_keeps_sum() {
        let (manager, _repo, _clock) = setup();
        let manager = Arc::new(manager);
        manager.ensure_session("camera_alice", &SessionOrigin::camera("alice"));

        let handles: Vec<_> = DetectionClass::ALL
            .into_iter()
            .map(|class| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    for _ in 0..200 {
                        manager.record("camera_alice", &events(class, 3));
                        let stats = manager.snapshot("camera_alice").unwrap();
                        assert_eq!(stats.total_detections(), stats.counts().total());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = manager.snapshot("camera_alice").unwrap();
        assert_eq!(stats.total_detections(), 4 * 200 * 3);
        assert_eq!(stats.closed_eyes_count(), 600);
    }

    #[test]
    fn test_stop_reset_race_persists_each_segment_once() {
        for _ in 0..50 {
            let (manager, repo, _clock) = setup();
            let manager = Arc::new(manager);
            manager.ensure_session("camera_alice", &SessionOrigin::camera("alice"));
            manager.record("camera_alice", &events(DetectionClass::ClosedEyes, 5));

            let go = Arc::new(AtomicBool::new(false));
            let results = Arc::new(Mutex::new(Vec::new()));
            let workers: Vec<_> = (0..4)
                .map(|i| {
                    let manager = Arc::clone(&manager);
                    let go = Arc::clone(&go);
                    let results = Arc::clone(&results);
                    thread::spawn(move || {
                        while !go.load(Ordering::Acquire) {
                            std::hint::spin_loop();
                        }
                        let record = if i % 2 == 0 {
                            manager.stop("camera_alice")
                        } else {
                            manager.reset("camera_alice")
                        };
                        if let Some(record) = record {
                            results.lock().unwrap().push(record);
                        }
                    })
                })
                .collect();
            go.store(true, Ordering::Release);
            for worker in workers {
                worker.join().unwrap();
            }

            let results = results.lock().unwrap();
            // The five detections appear in exactly one record
            let persisted: u64 = results.iter().map(|r| r.details.closed_eyes_count).sum();
            assert_eq!(persisted, 5);
            assert_eq!(repo.count(), results.len());
            assert!(manager.snapshot("camera_alice").is_none());
        }
    }
}
