//! Engine configuration
//!
//! Carries the reward rule table and the timing knobs. Values are plain
//! data with serde derives so deployments can load them from file; the
//! defaults match the production catalog.

use chrono::Duration;
use matrix_types::{LevelSchedule, SequenceRule, MAX_LAYER_DEPTH};
use serde::{Deserialize, Serialize};

/// Configuration for the matrix engine
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hours a pending reward waits before the expiry sweep may take it
    pub pending_window_hours: i64,
    /// Per-level reward rules
    pub schedule: LevelSchedule,
    /// Escalation rule for level-1-triggered rewards
    pub sequence: SequenceRule,
    /// Hard bound on ancestor-chain walks and layer derivation
    pub max_depth: u8,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pending_window_hours(mut self, hours: i64) -> Self {
        self.pending_window_hours = hours;
        self
    }

    pub fn with_schedule(mut self, schedule: LevelSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_sequence(mut self, sequence: SequenceRule) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_max_depth(mut self, depth: u8) -> Self {
        self.max_depth = depth;
        self
    }

    /// The pending countdown as a chrono duration
    pub fn pending_window(&self) -> Duration {
        Duration::hours(self.pending_window_hours)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pending_window_hours: 72,
            schedule: LevelSchedule::standard(),
            sequence: SequenceRule::default(),
            max_depth: MAX_LAYER_DEPTH,
        }
    }
}
