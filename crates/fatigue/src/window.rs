//! Rolling-window fatigue analyzer

use crate::cadence::{FatigueCadence, Reevaluation};
use crate::level::FatigueLevel;
use crate::policy::classify_window_count;
use crate::stats::ClassCounts;
use std::collections::VecDeque;

/// Window length in seconds
pub const WINDOW_SECONDS: f64 = 10.0;

/// Maximum number of per-frame entries kept
pub const WINDOW_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    at: f64,
    closed_eyes: u64,
    open_mouth: u64,
}

/// Bounded per-frame history classified with the window count table.
///
/// Positions are seconds on the session timebase. Every `interval` the
/// entries newer than `at - WINDOW_SECONDS` are summed and classified;
/// between evaluations the previous level is held.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    entries: VecDeque<WindowEntry>,
    capacity: usize,
    cadence: FatigueCadence,
    last_check: Option<f64>,
    level: FatigueLevel,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(WINDOW_CAPACITY, FatigueCadence::new(WINDOW_SECONDS))
    }
}

impl RollingWindow {
    pub fn new(capacity: usize, cadence: FatigueCadence) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            cadence,
            last_check: None,
            level: FatigueLevel::Low,
        }
    }

    /// Push one frame's counts and re-classify if due
    pub fn observe(&mut self, at: f64, counts: &ClassCounts) -> Reevaluation {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(WindowEntry {
            at,
            closed_eyes: counts.closed_eyes,
            open_mouth: counts.open_mouth,
        });

        if !self.cadence.is_due(self.last_check, at) {
            return Reevaluation::Held(self.level);
        }

        let (closed_eyes, open_mouth) = self.recent_totals(at);
        self.level = classify_window_count(closed_eyes, open_mouth);
        self.last_check = Some(at);
        Reevaluation::Recomputed(self.level)
    }

    /// Closed-eye and open-mouth sums of entries strictly newer than `at - WINDOW_SECONDS`
    pub fn recent_totals(&self, at: f64) -> (u64, u64) {
        let cutoff = at - WINDOW_SECONDS;
        self.entries
            .iter()
            .filter(|entry| entry.at > cutoff)
            .fold((0, 0), |(ce, om), entry| (ce + entry.closed_eyes, om + entry.open_mouth))
    }

    pub fn level(&self) -> FatigueLevel {
        self.level
    }

    /// Drop all entries and return to the fresh `Low` state
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_check = None;
        self.level = FatigueLevel::Low;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
