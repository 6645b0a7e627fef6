//! Repository Implementation

use crate::{DetectionRecord, RecordMethod, RecordSink, StorageError};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, info};

/// Default number of records retained
pub const DEFAULT_MAX_RECORDS: usize = 10_000;

struct RecordLog {
    records: VecDeque<DetectionRecord>,
    next_id: i64,
}

/// In-memory detection record store with bounded retention
pub struct Repository {
    log: Mutex<RecordLog>,
    max_records: usize,
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_RECORDS)
    }

    /// Repository that keeps at most `max_records` (oldest are dropped first)
    pub fn with_capacity(max_records: usize) -> Self {
        info!("Creating in-memory repository (max {} records)", max_records);
        Self {
            log: Mutex::new(RecordLog {
                records: VecDeque::with_capacity(max_records.min(1024)),
                next_id: 1,
            }),
            max_records: max_records.max(1),
        }
    }

    /// Insert a record, assigning its id
    pub fn insert(&self, mut record: DetectionRecord) -> Result<i64, StorageError> {
        let mut log = self
            .log
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        record.id = log.next_id;
        log.next_id += 1;

        // Enforce retention
        while log.records.len() >= self.max_records {
            log.records.pop_front();
        }

        let id = record.id;
        debug!(
            "Inserted {} record {} for {} ({})",
            record.method, id, record.username, record.fatigue_level
        );
        log.records.push_back(record);
        Ok(id)
    }

    /// Most recent records first, optionally filtered by method
    pub fn get_records(
        &self,
        method: Option<RecordMethod>,
        limit: usize,
    ) -> Result<Vec<DetectionRecord>, StorageError> {
        let log = self
            .log
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        Ok(log
            .records
            .iter()
            .rev()
            .filter(|r| method.map_or(true, |m| r.method == m))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Look up one record by id
    pub fn get(&self, id: i64) -> Result<DetectionRecord, StorageError> {
        let log = self
            .log
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        log.records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    /// Delete one record by id
    pub fn delete(&self, id: i64) -> Result<DetectionRecord, StorageError> {
        let mut log = self
            .log
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        let index = log
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or(StorageError::NotFound)?;
        let removed = log.records.remove(index).ok_or(StorageError::NotFound)?;
        info!("Deleted record {}", id);
        Ok(removed)
    }

    /// Overwrite the stored fatigue level of a record
    pub fn update_fatigue_level(
        &self,
        id: i64,
        level: &str,
    ) -> Result<DetectionRecord, StorageError> {
        let mut log = self
            .log
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        let record = log
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StorageError::NotFound)?;
        record.fatigue_level = level.to_string();
        Ok(record.clone())
    }

    /// Records of one user, most recent first
    pub fn get_user_records(
        &self,
        username: &str,
        limit: usize,
    ) -> Result<Vec<DetectionRecord>, StorageError> {
        let log = self
            .log
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        Ok(log
            .records
            .iter()
            .rev()
            .filter(|r| r.username == username)
            .take(limit)
            .cloned()
            .collect())
    }

    /// Get total record count
    pub fn count(&self) -> usize {
        self.log.lock().map(|l| l.records.len()).unwrap_or(0)
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSink for Repository {
    fn persist(&self, record: DetectionRecord) -> Result<i64, StorageError> {
        self.insert(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordDetails;
    use chrono::Utc;

    fn record(username: &str, method: RecordMethod, level: &str) -> DetectionRecord {
        DetectionRecord::completed(
            username,
            method,
            level,
            RecordDetails {
                session_id: format!("{}_{}", method, username),
                total_seconds: 10.0,
                closed_eyes_count: 41,
                total_detections: 41,
                ..Default::default()
            },
            0.9,
            Utc::now(),
        )
    }

    #[test]
    fn test_insert_and_retrieve() {
        let repo = Repository::new();

        let id = repo.insert(record("alice", RecordMethod::Camera, "moderate")).unwrap();
        assert_eq!(id, 1);

        let records = repo.get_records(None, 10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[0].details.closed_eyes_count, 41);
        assert_eq!(repo.get(1).unwrap().fatigue_level, "moderate");
        assert!(matches!(repo.get(2), Err(StorageError::NotFound)));
    }

    #[test]
    fn test_method_filter_and_order() {
        let repo = Repository::new();
        repo.persist(record("alice", RecordMethod::Camera, "none")).unwrap();
        repo.persist(record("bob", RecordMethod::Video, "mild")).unwrap();
        repo.persist(record("carol", RecordMethod::Camera, "severe")).unwrap();

        let camera = repo.get_records(Some(RecordMethod::Camera), 10).unwrap();
        assert_eq!(camera.len(), 2);
        assert_eq!(camera[0].username, "carol");
        assert_eq!(repo.get_records(None, 1).unwrap()[0].username, "carol");
        assert_eq!(repo.get_user_records("bob", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_and_update() {
        let repo = Repository::new();
        let id = repo.insert(record("alice", RecordMethod::Camera, "mild")).unwrap();

        let updated = repo.update_fatigue_level(id, "severe").unwrap();
        assert_eq!(updated.fatigue_level, "severe");
        assert_eq!(repo.get(id).unwrap().fatigue_level, "severe");

        repo.delete(id).unwrap();
        assert_eq!(repo.count(), 0);
        assert!(matches!(repo.delete(id), Err(StorageError::NotFound)));
        assert!(matches!(repo.update_fatigue_level(id, "low"), Err(StorageError::NotFound)));
    }

    #[test]
    fn test_retention_limit() {
        let repo = Repository::with_capacity(5);

        for i in 0..10 {
            repo.insert(record(&format!("user{}", i), RecordMethod::Image, "low")).unwrap();
        }

        assert_eq!(repo.count(), 5);
        // Ids keep increasing after eviction
        assert_eq!(repo.get_records(None, 1).unwrap()[0].id, 10);
    }
}
