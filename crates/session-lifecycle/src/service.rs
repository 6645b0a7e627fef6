//! Outward fatigue detection service
//!
//! Frames are classified before any session lock is taken, so status reads
//! never wait on the detector.

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::manager::{record_method, SessionManager};
use crate::store::{lock_entry, SessionEntry, SessionHandle, SessionOrigin};
use crate::worker::{self, StopFlag, StopReason, StreamHandle, WorkerSummary};
use crate::{SessionError, FRAMES_PROCESSED_TOTAL, FRAMES_SKIPPED_TOTAL};
use alerting::{AlertManager, FatigueAlert, PendingAlert};
use camera_capture::{FrameSource, VideoFrame};
use chrono::{DateTime, Duration, Utc};
use detector::{normalize, DetectError, DetectionEvent, FrameClassifier};
use fatigue::{
    ClassCounts, ClassificationPolicy, FatigueCadence, FatigueIndicator, FatigueLevel, Modality,
    Reevaluation, RollingWindow, SessionStats, Timebase, WINDOW_CAPACITY, WINDOW_SECONDS,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use storage::{DetectionRecord, RecordDetails, RecordSink};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of feeding one frame into a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FrameOutcome {
    /// Detections were added to the session
    Recorded { detections: usize, counts: ClassCounts },
    /// The frame could not be decoded or classified; nothing changed
    Skipped { reason: String },
    /// No model is loaded; nothing changed
    Unavailable,
    /// The session was already persisted
    Closed,
}

/// Fatigue state of a session as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub modality: Modality,
    /// Whether the session is currently held in memory
    pub exists: bool,
    pub active: bool,
    pub streaming: bool,
    pub fatigue_level: FatigueLevel,
    pub display_text: String,
    /// Whether this read recomputed the level
    pub recomputed: bool,
    pub counts: ClassCounts,
    pub total_detections: u64,
    pub fatigue_indicators: Vec<FatigueIndicator>,
    pub elapsed_seconds: f64,
    pub total_frames: u64,
    pub alert: Option<FatigueAlert>,
}

impl SessionStatus {
    /// Status of a session that is not held in memory
    pub fn absent(session_id: impl Into<String>, modality: Modality) -> Self {
        let level = modality.absent_level();
        Self {
            session_id: session_id.into(),
            modality,
            exists: false,
            active: false,
            streaming: false,
            fatigue_level: level,
            display_text: level.display_text().to_string(),
            recomputed: false,
            counts: ClassCounts::default(),
            total_detections: 0,
            fatigue_indicators: Vec::new(),
            elapsed_seconds: 0.0,
            total_frames: 0,
            alert: None,
        }
    }
}

/// Classification of one still image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleImageReport {
    pub fatigue_level: FatigueLevel,
    pub policy: ClassificationPolicy,
    pub counts: ClassCounts,
    pub detections: Vec<DetectionEvent>,
    pub fatigue_indicators: Vec<FatigueIndicator>,
    /// Mean confidence of accepted detections
    pub confidence: f64,
    /// Set once the image result was persisted
    pub record_id: Option<i64>,
}

/// How an offline clip is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoPolicy {
    /// Rate table over the whole clip, refreshed every `interval * fps` frames
    #[default]
    Cumulative,
    /// Count table over the most recent 10 seconds of the clip
    RollingWindow,
}

/// Result of an offline video job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoReport {
    pub session_id: String,
    pub username: String,
    pub policy: VideoPolicy,
    pub fatigue_level: FatigueLevel,
    pub counts: ClassCounts,
    pub fatigue_indicators: Vec<FatigueIndicator>,
    pub total_frames: u64,
    pub skipped_frames: u64,
    pub elapsed_seconds: f64,
    pub fps: f64,
    pub stop_reason: StopReason,
    /// `None` if the session was persisted by a concurrent stop
    pub record: Option<DetectionRecord>,
}

/// A background stream that was started
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStarted {
    pub session_id: String,
    pub source: String,
    pub created: bool,
}

struct Inner {
    config: SessionConfig,
    cadence: FatigueCadence,
    /// Model used when neither the request nor the session picks one
    detector: RwLock<Option<Arc<dyn FrameClassifier>>>,
    sessions: SessionManager,
    alerts: Mutex<AlertManager>,
    streams: Mutex<HashMap<String, StreamHandle>>,
}

/// Fatigue detection over images, offline clips and live streams
#[derive(Clone)]
pub struct FatigueService {
    inner: Arc<Inner>,
}

impl FatigueService {
    /// Service on the system clock
    pub fn new(
        config: SessionConfig,
        detector: Option<Arc<dyn FrameClassifier>>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self::with_clock(config, detector, sink, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SessionConfig,
        detector: Option<Arc<dyn FrameClassifier>>,
        sink: Arc<dyn RecordSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        match &detector {
            Some(d) => info!("Fatigue service using detector {}", d.name()),
            None => warn!("Fatigue service started without a detection model"),
        }
        Self {
            inner: Arc::new(Inner {
                cadence: config.cadence(),
                alerts: Mutex::new(AlertManager::new(config.alerting.clone())),
                config,
                detector: RwLock::new(detector),
                sessions: SessionManager::new(sink, clock),
                streams: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    /// The current default model, if any
    pub fn detector(&self) -> Option<Arc<dyn FrameClassifier>> {
        self.inner.current()
    }

    /// Name of the current default model, if any
    pub fn detector_name(&self) -> Option<String> {
        self.detector().map(|d| d.name().to_string())
    }

    /// Replace the default model.
    ///
    /// Sessions and streams that pinned a model keep it.
    pub fn set_detector(&self, classifier: Arc<dyn FrameClassifier>) {
        info!("Default detector switched to {}", classifier.name());
        *self
            .inner
            .detector
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(classifier);
    }

    /// Open (or keep) a session, pinning `classifier` to it when given.
    ///
    /// Fails when no model is available for the session.
    pub fn open_session(
        &self,
        session_id: &str,
        origin: &SessionOrigin,
        classifier: Option<Arc<dyn FrameClassifier>>,
    ) -> Result<SessionStats, SessionError> {
        if classifier.is_none() {
            self.inner.resolve(session_id, None)?;
        }

        let stats = self.inner.sessions.ensure_session(session_id, origin);
        if let Some(classifier) = classifier {
            debug!("Session {} pinned to {}", session_id, classifier.name());
            self.inner
                .sessions
                .with_entry(session_id, |entry| entry.classifier = Some(classifier));
        }
        Ok(stats)
    }

    /// Classify a frame and add it to `session_id`, creating the session if needed
    pub fn submit_frame(
        &self,
        session_id: &str,
        origin: &SessionOrigin,
        frame: &VideoFrame,
    ) -> FrameOutcome {
        let Ok(classifier) = self.inner.resolve(session_id, None) else {
            return FrameOutcome::Unavailable;
        };
        let now = self.inner.sessions.now();
        let events = match self.inner.classify(classifier.as_ref(), frame, now) {
            Ok(events) => events,
            Err(outcome) => return outcome,
        };

        let handle = self.inner.sessions.ensure_entry(session_id, || {
            SessionEntry::new(origin.clone(), now, Timebase::WallClock)
        });
        self.inner.record_into(&handle, &events, now)
    }

    /// Decode an encoded image and submit it; undecodable input skips the frame
    pub fn submit_encoded(
        &self,
        session_id: &str,
        origin: &SessionOrigin,
        bytes: &[u8],
    ) -> FrameOutcome {
        match VideoFrame::decode(bytes, 0) {
            Ok(frame) => self.submit_frame(session_id, origin, &frame),
            Err(e) => {
                metrics::counter!(FRAMES_SKIPPED_TOTAL).increment(1);
                debug!("Skipping undecodable frame for {}: {}", session_id, e);
                FrameOutcome::Skipped { reason: e.to_string() }
            }
        }
    }

    /// Current fatigue state, re-evaluated if the cadence allows it.
    ///
    /// Unknown sessions get the modality's default level.
    pub fn get_status(&self, session_id: &str, modality: Modality) -> SessionStatus {
        let now = self.inner.sessions.now();
        let streaming = self.is_streaming(session_id);

        let snapshot = self.inner.sessions.with_entry(session_id, |entry| {
            let evaluation = match (&entry.window, entry.stats.timebase()) {
                (Some(window), _) => Reevaluation::Held(window.level()),
                // Frame-timed sessions are evaluated as frames arrive
                (None, Timebase::Frames { .. }) => {
                    Reevaluation::Held(entry.stats.current_fatigue_level())
                }
                (None, Timebase::WallClock) => entry.stats.reevaluate(now, &self.inner.cadence),
            };
            let level = evaluation.level();

            let counts = entry.stats.counts();
            SessionStatus {
                session_id: session_id.to_string(),
                modality: entry.origin.modality,
                exists: true,
                active: entry.stats.detection_active(),
                streaming,
                fatigue_level: level,
                display_text: level.display_text().to_string(),
                recomputed: evaluation.is_recomputed(),
                counts,
                total_detections: entry.stats.total_detections(),
                fatigue_indicators: counts.indicators(),
                elapsed_seconds: entry.stats.elapsed_seconds(now),
                total_frames: entry.stats.total_frames(),
                alert: None,
            }
        });
        let Some(mut status) = snapshot else {
            return SessionStatus::absent(session_id, modality);
        };

        // The entry lock is released before the alert manager is consulted
        let alarming = status.fatigue_level.is_alarming();
        let fired = if alarming {
            self.inner
                .lock_alerts()
                .evaluate(session_id, status.fatigue_level, now)
        } else {
            None
        };

        status.alert = self
            .inner
            .sessions
            .with_entry(session_id, |entry| {
                if !alarming {
                    entry.last_alert = None;
                } else if fired.is_some() {
                    entry.last_alert = fired;
                }
                entry.last_alert.clone()
            })
            .flatten();
        status
    }

    /// Stop any stream feeding the session, persist it and remove it
    pub fn stop(&self, session_id: &str) -> Option<DetectionRecord> {
        if let Some(stream) = self.take_stream(session_id) {
            stream.stop();
            debug!("Signalled stream {} to stop", session_id);
        }
        self.inner.forget_alerts(session_id);
        self.inner.sessions.stop(session_id)
    }

    /// Persist the current segment and keep the session running with zeroed counters
    pub fn reset(&self, session_id: &str) -> Option<DetectionRecord> {
        let record = self.inner.sessions.reset(session_id);
        self.inner.forget_alerts(session_id);
        record
    }

    /// Sessions whose last alert has not been acknowledged, oldest first
    pub fn pending_alerts(&self) -> Vec<PendingAlert> {
        self.inner.lock_alerts().get_pending()
    }

    /// Alerts fired in the current hour across all sessions
    pub fn alerts_this_hour(&self) -> usize {
        self.inner.lock_alerts().hourly_count()
    }

    /// Acknowledge the last alert of `session_id`.
    ///
    /// Returns whether an alert was pending; unknown sessions are an error.
    pub fn acknowledge_alert(&self, session_id: &str) -> Result<bool, SessionError> {
        let acknowledged = self.inner.lock_alerts().acknowledge(session_id);
        if acknowledged || self.inner.sessions.store().get(session_id).is_some() {
            Ok(acknowledged)
        } else {
            Err(SessionError::SessionNotFound(session_id.to_string()))
        }
    }

    /// Classify one image with the single-image table (nothing is stored)
    pub fn classify_single(&self, frame: &VideoFrame) -> Result<SingleImageReport, DetectError> {
        self.analyze(frame, ClassificationPolicy::SingleImage, None)
    }

    /// Classify one image as a rolling-window batch (nothing is stored)
    pub fn analyze_monitor_image(
        &self,
        frame: &VideoFrame,
    ) -> Result<SingleImageReport, DetectError> {
        self.analyze(frame, ClassificationPolicy::WindowCount, None)
    }

    /// Classify one image and persist the result as an image record.
    ///
    /// `classifier` overrides the default model for this image.
    pub fn detect_image(
        &self,
        username: &str,
        frame: &VideoFrame,
        policy: ClassificationPolicy,
        classifier: Option<Arc<dyn FrameClassifier>>,
    ) -> Result<SingleImageReport, SessionError> {
        let mut report = self.analyze(frame, policy, classifier)?;
        let session_id = format!("image_{}", Uuid::new_v4());

        let details = RecordDetails {
            session_id,
            closed_eyes_count: report.counts.closed_eyes,
            closed_mouth_count: report.counts.closed_mouth,
            open_eyes_count: report.counts.open_eyes,
            open_mouth_count: report.counts.open_mouth,
            total_detections: report.counts.total(),
            total_frames: 1,
            ..Default::default()
        };
        let record = DetectionRecord::completed(
            username,
            record_method(Modality::Image),
            report.fatigue_level.as_str(),
            details,
            report.confidence,
            self.inner.sessions.now(),
        );

        let record = self.inner.sessions.persist(record);
        report.record_id = (record.id > 0).then_some(record.id);
        Ok(report)
    }

    /// Start a background worker feeding `source` into `session_id`.
    ///
    /// The session is created if needed; an existing one keeps its counts.
    /// The stream classifies with `classifier`, else the session's pinned
    /// model, else the default model at start time.
    pub fn start_stream<S>(
        &self,
        session_id: &str,
        origin: SessionOrigin,
        source: S,
        classifier: Option<Arc<dyn FrameClassifier>>,
    ) -> Result<StreamStarted, SessionError>
    where
        S: FrameSource + 'static,
    {
        let classifier = self.inner.resolve(session_id, classifier)?;

        let mut streams = self.inner.streams.lock().unwrap_or_else(PoisonError::into_inner);
        if streams.get(session_id).is_some_and(|s| !s.is_finished()) {
            return Err(SessionError::StreamActive(session_id.to_string()));
        }

        let now = self.inner.sessions.now();
        let existed = self.inner.sessions.store().get(session_id).is_some();
        let handle = self
            .inner
            .sessions
            .ensure_entry(session_id, || SessionEntry::new(origin, now, Timebase::WallClock));
        lock_entry(&handle).classifier = Some(Arc::clone(&classifier));

        let label = source.describe();
        let inner = Arc::clone(&self.inner);
        let name = format!("stream-{}", session_id);
        let stream = worker::spawn_named(name, StopFlag::new(), move |flag| {
            worker::drive(source, &flag, |frame| {
                inner.feed(&handle, classifier.as_ref(), &frame)
            })
        })
        .map_err(|e| SessionError::Worker(e.to_string()))?;

        streams.insert(session_id.to_string(), stream);
        info!("Stream {} started from {}", session_id, label);
        Ok(StreamStarted {
            session_id: session_id.to_string(),
            source: label,
            created: !existed,
        })
    }

    /// Whether a worker is currently feeding `session_id`
    pub fn is_streaming(&self, session_id: &str) -> bool {
        self.inner
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .is_some_and(|s| !s.is_finished())
    }

    /// Wait for the worker of `session_id` to finish.
    ///
    /// Call [`stop`](Self::stop) or let the source run out first.
    pub fn wait_stream(&self, session_id: &str) -> Option<WorkerSummary> {
        self.take_stream(session_id)?.join()
    }

    /// Run an offline clip to completion under a fresh session id and persist it
    pub fn run_video_job<S>(
        &self,
        origin: SessionOrigin,
        source: S,
        policy: VideoPolicy,
        classifier: Option<Arc<dyn FrameClassifier>>,
    ) -> Result<VideoReport, SessionError>
    where
        S: FrameSource,
    {
        let session_id = format!("video_{}", Uuid::new_v4());
        self.run_video_job_as(&session_id, origin, source, policy, classifier)
    }

    /// Run an offline clip under `session_id`.
    ///
    /// Progress is pollable through [`get_status`](Self::get_status) while
    /// the job runs.
    pub fn run_video_job_as<S>(
        &self,
        session_id: &str,
        origin: SessionOrigin,
        source: S,
        policy: VideoPolicy,
        classifier: Option<Arc<dyn FrameClassifier>>,
    ) -> Result<VideoReport, SessionError>
    where
        S: FrameSource,
    {
        let classifier = classifier
            .or_else(|| self.inner.current())
            .ok_or(SessionError::ModelUnavailable)?;

        let fps = self.inner.config.video_fps(source.frame_rate());
        let now = self.inner.sessions.now();
        let username = origin.username.clone();
        let mut entry = SessionEntry::new(origin, now, Timebase::Frames { fps })
            .with_classifier(Some(Arc::clone(&classifier)));
        if policy == VideoPolicy::RollingWindow {
            let cadence = FatigueCadence::new(WINDOW_SECONDS);
            entry = entry.with_window(RollingWindow::new(WINDOW_CAPACITY, cadence));
        }
        let handle = self
            .inner
            .sessions
            .create_entry(session_id, entry)
            .ok_or_else(|| SessionError::StreamActive(session_id.to_string()))?;

        info!(
            "Video job {} started ({}, {:.1} fps, {:?}, model {})",
            session_id,
            source.describe(),
            fps,
            policy,
            classifier.name()
        );

        let flag = StopFlag::new();
        self.register_inline(session_id, &flag);
        let mut skipped = 0;
        let summary = worker::drive(source, &flag, |frame| {
            match self.inner.process(&handle, classifier.as_ref(), &frame) {
                FrameOutcome::Closed => ControlFlow::Break(()),
                FrameOutcome::Recorded { .. } => ControlFlow::Continue(()),
                FrameOutcome::Skipped { .. } | FrameOutcome::Unavailable => {
                    skipped += 1;
                    ControlFlow::Continue(())
                }
            }
        });
        self.take_stream(session_id);

        let record = self.inner.sessions.finish(session_id, &handle);
        self.inner.forget_alerts(session_id);
        let end = self.inner.sessions.now();
        let entry = lock_entry(&handle);
        let fatigue_level = match &entry.window {
            Some(window) => window.level(),
            None => entry.stats.final_level(end),
        };
        let counts = entry.stats.counts();

        info!(
            "Video job {} finished: {} frames, level {}",
            session_id,
            entry.stats.total_frames(),
            fatigue_level
        );

        Ok(VideoReport {
            session_id: session_id.to_string(),
            username,
            policy,
            fatigue_level,
            counts,
            fatigue_indicators: counts.indicators(),
            total_frames: entry.stats.total_frames(),
            skipped_frames: skipped + summary.source_errors,
            elapsed_seconds: entry.stats.elapsed_seconds(end),
            fps,
            stop_reason: summary.reason,
            record,
        })
    }

    /// Persist and evict sessions idle for longer than `max_idle`
    pub fn sweep_idle(&self, max_idle: Duration) -> Vec<DetectionRecord> {
        let records = self.inner.sessions.sweep_idle(max_idle);
        for record in &records {
            let session_id = &record.details.session_id;
            if let Some(stream) = self.take_stream(session_id) {
                stream.stop();
            }
            self.inner.forget_alerts(session_id);
        }
        records
    }

    /// Idle sweep with the configured timeout (no-op when disabled)
    pub fn sweep_configured(&self) -> Vec<DetectionRecord> {
        let Some(secs) = self.inner.config.idle_timeout_secs else {
            return Vec::new();
        };
        match self.inner.config.idle_timeout() {
            Some(max_idle) => self.sweep_idle(max_idle),
            None => {
                warn!("Idle timeout of {}s is out of range, sweep skipped", secs);
                Vec::new()
            }
        }
    }

    /// Stop every stream and persist every open session
    pub fn stop_all(&self) -> Vec<DetectionRecord> {
        let ids = self.inner.sessions.store().ids();
        info!("Stopping {} session(s)", ids.len());
        ids.iter().filter_map(|id| self.stop(id)).collect()
    }

    fn analyze(
        &self,
        frame: &VideoFrame,
        policy: ClassificationPolicy,
        classifier: Option<Arc<dyn FrameClassifier>>,
    ) -> Result<SingleImageReport, DetectError> {
        let detector = classifier
            .or_else(|| self.inner.current())
            .ok_or(DetectError::ModelUnavailable)?;
        let raw = detector.classify(frame)?;
        metrics::counter!(FRAMES_PROCESSED_TOTAL).increment(1);

        let detections: Vec<_> = normalize(&raw, self.inner.sessions.now()).collect();
        let counts = ClassCounts::from_events(&detections);
        let confidence = if detections.is_empty() {
            0.0
        } else {
            let sum: f64 = detections.iter().map(|d| d.confidence as f64).sum();
            sum / detections.len() as f64
        };

        Ok(SingleImageReport {
            fatigue_level: policy.classify(&counts, 0.0),
            policy,
            counts,
            fatigue_indicators: counts.indicators(),
            detections,
            confidence,
            record_id: None,
        })
    }

    fn register_inline(&self, session_id: &str, flag: &StopFlag) {
        self.inner
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.to_string(), StreamHandle::inline(flag.clone()));
    }

    fn take_stream(&self, session_id: &str) -> Option<StreamHandle> {
        self.inner
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
    }
}

impl Inner {
    fn current(&self) -> Option<Arc<dyn FrameClassifier>> {
        self.detector.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Model for a session: the requested one, the pinned one, or the default
    fn resolve(
        &self,
        session_id: &str,
        chosen: Option<Arc<dyn FrameClassifier>>,
    ) -> Result<Arc<dyn FrameClassifier>, SessionError> {
        chosen
            .or_else(|| {
                self.sessions
                    .with_entry(session_id, |entry| entry.classifier.clone())
                    .flatten()
            })
            .or_else(|| self.current())
            .ok_or(SessionError::ModelUnavailable)
    }

    fn lock_alerts(&self) -> MutexGuard<'_, AlertManager> {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn forget_alerts(&self, session_id: &str) {
        self.lock_alerts().forget(session_id);
    }

    /// Normalized events for a frame, or the outcome explaining why there are none
    fn classify(
        &self,
        classifier: &dyn FrameClassifier,
        frame: &VideoFrame,
        now: DateTime<Utc>,
    ) -> Result<Vec<DetectionEvent>, FrameOutcome> {
        match classifier.classify(frame) {
            Ok(raw) => {
                metrics::counter!(FRAMES_PROCESSED_TOTAL).increment(1);
                Ok(normalize(&raw, now).collect())
            }
            Err(DetectError::ModelUnavailable) => Err(FrameOutcome::Unavailable),
            Err(e) => {
                metrics::counter!(FRAMES_SKIPPED_TOTAL).increment(1);
                debug!("Skipping frame {}: {}", frame.sequence, e);
                Err(FrameOutcome::Skipped { reason: e.to_string() })
            }
        }
    }

    fn process(
        &self,
        handle: &SessionHandle,
        classifier: &dyn FrameClassifier,
        frame: &VideoFrame,
    ) -> FrameOutcome {
        let now = self.sessions.now();
        match self.classify(classifier, frame, now) {
            Ok(events) => self.record_into(handle, &events, now),
            Err(outcome) => outcome,
        }
    }

    /// Worker frame handler
    fn feed(
        &self,
        handle: &SessionHandle,
        classifier: &dyn FrameClassifier,
        frame: &VideoFrame,
    ) -> ControlFlow<()> {
        match self.process(handle, classifier, frame) {
            FrameOutcome::Closed => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    }

    fn record_into(
        &self,
        handle: &SessionHandle,
        events: &[DetectionEvent],
        now: DateTime<Utc>,
    ) -> FrameOutcome {
        let mut guard = lock_entry(handle);
        let entry = &mut *guard;
        if entry.closed {
            return FrameOutcome::Closed;
        }

        entry.stats.record_frame(events, now);
        let counts = ClassCounts::from_events(events);
        let position = entry.stats.elapsed_seconds(now);
        match entry.window.as_mut() {
            Some(window) => {
                window.observe(position, &counts);
            }
            None => {
                if let Timebase::Frames { .. } = entry.stats.timebase() {
                    entry.stats.reevaluate(now, &self.cadence);
                }
            }
        }

        FrameOutcome::Recorded {
            detections: events.len(),
            counts,
        }
    }
}
