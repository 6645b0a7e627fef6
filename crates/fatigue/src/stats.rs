//! Per-session detection statistics

use crate::cadence::{FatigueCadence, Reevaluation};
use crate::level::FatigueLevel;
use crate::policy::{classify_rate, FatigueRates};
use chrono::{DateTime, Utc};
use detector::{DetectionClass, DetectionEvent};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-class detection counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub closed_eyes: u64,
    pub closed_mouth: u64,
    pub open_eyes: u64,
    pub open_mouth: u64,
}

impl ClassCounts {
    /// Count events by class
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a DetectionEvent>) -> Self {
        let mut counts = Self::default();
        for event in events {
            counts.add(event.class);
        }
        counts
    }

    pub fn add(&mut self, class: DetectionClass) {
        match class {
            DetectionClass::ClosedEyes => self.closed_eyes += 1,
            DetectionClass::ClosedMouth => self.closed_mouth += 1,
            DetectionClass::OpenEyes => self.open_eyes += 1,
            DetectionClass::OpenMouth => self.open_mouth += 1,
        }
    }

    pub fn get(&self, class: DetectionClass) -> u64 {
        match class {
            DetectionClass::ClosedEyes => self.closed_eyes,
            DetectionClass::ClosedMouth => self.closed_mouth,
            DetectionClass::OpenEyes => self.open_eyes,
            DetectionClass::OpenMouth => self.open_mouth,
        }
    }

    pub fn total(&self) -> u64 {
        self.closed_eyes + self.closed_mouth + self.open_eyes + self.open_mouth
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Fatigue indicators present in these counts
    pub fn indicators(&self) -> Vec<FatigueIndicator> {
        [DetectionClass::ClosedEyes, DetectionClass::OpenMouth]
            .into_iter()
            .filter(|class| self.get(*class) > 0)
            .map(|class| FatigueIndicator {
                kind: class,
                count: self.get(class),
            })
            .collect()
    }
}

/// A fatigue indicator class and how often it was seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatigueIndicator {
    #[serde(rename = "type")]
    pub kind: DetectionClass,
    pub count: u64,
}

/// How elapsed session time is measured
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Timebase {
    /// Wall-clock time since `start_time` (live streams)
    WallClock,
    /// Processed frames divided by the clip frame rate (offline video)
    Frames { fps: f64 },
}

/// Accumulated statistics for one session.
///
/// Counters only change through [`record`](Self::record) (all of them in
/// one step) and [`reset`](Self::reset), so `total_detections` always equals
/// the sum of the four class counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    closed_eyes_count: u64,
    closed_mouth_count: u64,
    open_eyes_count: u64,
    open_mouth_count: u64,
    total_detections: u64,
    total_frames: u64,
    confidence_sum: f64,
    start_time: DateTime<Utc>,
    last_update: DateTime<Utc>,
    /// Timebase position (seconds) of the last evaluation
    last_fatigue_check: Option<f64>,
    current_fatigue_level: FatigueLevel,
    detection_active: bool,
    timebase: Timebase,
}

impl SessionStats {
    /// Zeroed statistics starting at `now`
    pub fn new(now: DateTime<Utc>, timebase: Timebase) -> Self {
        Self {
            closed_eyes_count: 0,
            closed_mouth_count: 0,
            open_eyes_count: 0,
            open_mouth_count: 0,
            total_detections: 0,
            total_frames: 0,
            confidence_sum: 0.0,
            start_time: now,
            last_update: now,
            last_fatigue_check: None,
            current_fatigue_level: FatigueLevel::None,
            detection_active: true,
            timebase,
        }
    }

    /// Add a batch of events
    pub fn record<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a DetectionEvent>,
        now: DateTime<Utc>,
    ) {
        let mut batch = ClassCounts::default();
        let mut confidence = 0.0;
        for event in events {
            batch.add(event.class);
            confidence += event.confidence as f64;
        }

        self.closed_eyes_count += batch.closed_eyes;
        self.closed_mouth_count += batch.closed_mouth;
        self.open_eyes_count += batch.open_eyes;
        self.open_mouth_count += batch.open_mouth;
        self.total_detections += batch.total();
        self.confidence_sum += confidence;
        self.last_update = now;

        debug_assert_eq!(self.total_detections, self.counts().total());
    }

    /// Add the events of one processed frame
    pub fn record_frame<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a DetectionEvent>,
        now: DateTime<Utc>,
    ) {
        self.total_frames += 1;
        self.record(events, now);
    }

    /// Zero all counters and restart the session clock at `now`
    pub fn reset(&mut self, now: DateTime<Utc>) {
        let active = self.detection_active;
        *self = Self::new(now, self.timebase);
        self.detection_active = active;
    }

    pub fn counts(&self) -> ClassCounts {
        ClassCounts {
            closed_eyes: self.closed_eyes_count,
            closed_mouth: self.closed_mouth_count,
            open_eyes: self.open_eyes_count,
            open_mouth: self.open_mouth_count,
        }
    }

    pub fn closed_eyes_count(&self) -> u64 {
        self.closed_eyes_count
    }

    pub fn closed_mouth_count(&self) -> u64 {
        self.closed_mouth_count
    }

    pub fn open_eyes_count(&self) -> u64 {
        self.open_eyes_count
    }

    pub fn open_mouth_count(&self) -> u64 {
        self.open_mouth_count
    }

    pub fn total_detections(&self) -> u64 {
        self.total_detections
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    pub fn last_fatigue_check(&self) -> Option<f64> {
        self.last_fatigue_check
    }

    pub fn current_fatigue_level(&self) -> FatigueLevel {
        self.current_fatigue_level
    }

    pub fn detection_active(&self) -> bool {
        self.detection_active
    }

    pub fn set_detection_active(&mut self, active: bool) {
        self.detection_active = active;
    }

    pub fn timebase(&self) -> Timebase {
        self.timebase
    }

    /// Mean confidence of accepted detections (0 when none)
    pub fn mean_confidence(&self) -> f64 {
        if self.total_detections == 0 {
            0.0
        } else {
            self.confidence_sum / self.total_detections as f64
        }
    }

    /// Seconds elapsed on the session timebase
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        match self.timebase {
            Timebase::WallClock => (now - self.start_time).num_milliseconds() as f64 / 1000.0,
            Timebase::Frames { fps } => {
                if fps > 0.0 {
                    self.total_frames as f64 / fps
                } else {
                    0.0
                }
            }
        }
    }

    pub fn rates(&self, now: DateTime<Utc>) -> FatigueRates {
        FatigueRates::compute(
            self.elapsed_seconds(now),
            self.closed_eyes_count,
            self.open_mouth_count,
        )
    }

    /// Rate-table level over the whole session, ignoring the cadence
    pub fn final_level(&self, now: DateTime<Utc>) -> FatigueLevel {
        classify_rate(self.elapsed_seconds(now), self.closed_eyes_count, self.open_mouth_count)
    }

    /// Re-classify with the rate table if the cadence allows it.
    ///
    /// When due, the level is recomputed from totals and the check marker
    /// moves to the current position; otherwise the stored level is held.
    pub fn reevaluate(&mut self, now: DateTime<Utc>, cadence: &FatigueCadence) -> Reevaluation {
        let position = self.elapsed_seconds(now);
        if !cadence.is_due(self.last_fatigue_check, position) {
            return Reevaluation::Held(self.current_fatigue_level);
        }

        let level = self.final_level(now);
        if level != self.current_fatigue_level {
            debug!(
                from = %self.current_fatigue_level,
                to = %level,
                position,
                "fatigue level changed"
            );
        }
        self.current_fatigue_level = level;
        self.last_fatigue_check = Some(position);
        Reevaluation::Recomputed(self.current_fatigue_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn event(class: DetectionClass, at: DateTime<Utc>) -> DetectionEvent {
        DetectionEvent {
            class,
            confidence: 0.9,
            observed_at: at,
        }
    }

    fn class_from(i: u8) -> DetectionClass {
        DetectionClass::ALL[(i % 4) as usize]
    }

    #[test]
    fn test_record_counts_by_class() {
        let mut stats = SessionStats::new(t0(), Timebase::WallClock);
        let events = [
            event(DetectionClass::ClosedEyes, t0()),
            event(DetectionClass::ClosedEyes, t0()),
            event(DetectionClass::OpenMouth, t0()),
            event(DetectionClass::OpenEyes, t0()),
        ];
        stats.record(&events, t0() + Duration::seconds(1));

        assert_eq!(stats.closed_eyes_count(), 2);
        assert_eq!(stats.open_mouth_count(), 1);
        assert_eq!(stats.open_eyes_count(), 1);
        assert_eq!(stats.closed_mouth_count(), 0);
        assert_eq!(stats.total_detections(), 4);
        assert_eq!(stats.last_update(), t0() + Duration::seconds(1));
        assert!((stats.mean_confidence() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_reset_zeroes_and_restarts_clock() {
        let mut stats = SessionStats::new(t0(), Timebase::WallClock);
        stats.record_frame(&[event(DetectionClass::ClosedEyes, t0())], t0());
        stats.reevaluate(t0() + Duration::seconds(1), &FatigueCadence::default());

        let later = t0() + Duration::seconds(30);
        stats.reset(later);

        assert_eq!(stats.counts(), ClassCounts::default());
        assert_eq!(stats.total_detections(), 0);
        assert_eq!(stats.total_frames(), 0);
        assert_eq!(stats.start_time(), later);
        assert_eq!(stats.last_fatigue_check(), None);
        assert_eq!(stats.current_fatigue_level(), FatigueLevel::None);
        assert!(stats.detection_active());
    }

    #[test]
    fn test_zero_elapsed_is_none() {
        let mut stats = SessionStats::new(t0(), Timebase::WallClock);
        let result = stats.reevaluate(t0(), &FatigueCadence::default());
        assert_eq!(result, Reevaluation::Recomputed(FatigueLevel::None));
    }

    #[test]
    fn test_ten_second_camera_session_is_moderate() {
        let mut stats = SessionStats::new(t0(), Timebase::WallClock);
        let events: Vec<_> = (0..41).map(|_| event(DetectionClass::ClosedEyes, t0())).collect();
        stats.record(&events, t0() + Duration::seconds(9));

        let result = stats.reevaluate(t0() + Duration::seconds(10), &FatigueCadence::default());
        assert_eq!(result, Reevaluation::Recomputed(FatigueLevel::Moderate));
    }

    #[test]
    fn test_level_held_within_interval() {
        let cadence = FatigueCadence::default();
        let mut stats = SessionStats::new(t0(), Timebase::WallClock);
        stats.record(&[event(DetectionClass::ClosedEyes, t0())], t0());

        // 1 closed eye over 2 s is below every threshold
        let first = stats.reevaluate(t0() + Duration::seconds(2), &cadence);
        assert_eq!(first, Reevaluation::Recomputed(FatigueLevel::None));

        // Counts now justify severe, but the interval has not elapsed
        let burst: Vec<_> = (0..100).map(|_| event(DetectionClass::ClosedEyes, t0())).collect();
        stats.record(&burst, t0() + Duration::seconds(3));
        let second = stats.reevaluate(t0() + Duration::seconds(5), &cadence);
        let third = stats.reevaluate(t0() + Duration::seconds(6), &cadence);
        assert_eq!(second, Reevaluation::Held(FatigueLevel::None));
        assert_eq!(third, second);

        let due = stats.reevaluate(t0() + Duration::seconds(12), &cadence);
        assert_eq!(due, Reevaluation::Recomputed(FatigueLevel::Severe));
    }

    #[test]
    fn test_frame_timebase() {
        let cadence = FatigueCadence::default();
        let mut stats = SessionStats::new(t0(), Timebase::Frames { fps: 25.0 });
        let closed = [event(DetectionClass::ClosedEyes, t0())];

        for _ in 0..250 {
            stats.record_frame(&closed, t0());
        }
        // Wall-clock time is irrelevant for video
        assert_eq!(stats.elapsed_seconds(t0() + Duration::hours(1)), 10.0);
        assert_eq!(stats.final_level(t0()), FatigueLevel::Moderate);

        assert!(stats.reevaluate(t0(), &cadence).is_recomputed());
        for _ in 0..249 {
            stats.record_frame(&closed, t0());
        }
        assert!(!stats.reevaluate(t0(), &cadence).is_recomputed());
        stats.record_frame(&closed, t0());
        assert!(stats.reevaluate(t0(), &cadence).is_recomputed());
    }

    #[test]
    fn test_indicators() {
        let counts = ClassCounts {
            closed_eyes: 0,
            closed_mouth: 4,
            open_eyes: 9,
            open_mouth: 2,
        };
        let indicators = counts.indicators();
        assert_eq!(indicators.len(), 1);
        assert_eq!(indicators[0].kind, DetectionClass::OpenMouth);
        assert_eq!(indicators[0].count, 2);
    }

    proptest! {
        #[test]
        fn prop_total_matches_sum(
            batches in proptest::collection::vec(proptest::collection::vec(0u8..4, 0..20), 0..30)
        ) {
            let mut stats = SessionStats::new(t0(), Timebase::WallClock);
            let mut previous = stats.counts();
            for batch in batches {
                let events: Vec<_> = batch.iter().map(|i| event(class_from(*i), t0())).collect();
                stats.record_frame(&events, t0());

                let counts = stats.counts();
                prop_assert_eq!(stats.total_detections(), counts.total());
                for class in DetectionClass::ALL {
                    prop_assert!(counts.get(class) >= previous.get(class));
                }
                previous = counts;
            }
        }
    }
}
