//! Round Scoring
//!
//! `score = base_score * distance_factor * time_factor`, both factors
//! monotonically non-increasing and bounded in [0, 1]. The decay shape is
//! a tunable parameter set, not a constant - operators adjust it without
//! touching the engine.

use serde::{Serialize, Deserialize};

/// Tunable scoring parameters.
///
/// The defaults keep the 2 000 km error cutoff the game has always used:
/// a guess at or beyond `max_error_m` scores zero no matter how fast.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ScoreParams {
    /// Maximum achievable score for a single round.
    pub base_score: f64,
    /// Distance error at which `distance_factor` reaches zero, in meters.
    pub max_error_m: f64,
    /// Elapsed seconds during which `time_factor` stays at 1.0.
    pub time_grace_secs: f64,
    /// Lower bound of `time_factor` at the round deadline.
    pub time_floor: f64,
    /// Round window the time decay is stretched across, in seconds.
    pub round_duration_secs: f64,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            base_score: 1000.0,
            max_error_m: 2_000_000.0,
            time_grace_secs: 10.0,
            time_floor: 0.2,
            round_duration_secs: crate::ROUND_DURATION_SECS as f64,
        }
    }
}

impl ScoreParams {
    /// Distance decay: 1.0 at a perfect guess, linearly down to 0.0 at
    /// `max_error_m` and beyond.
    pub fn distance_factor(&self, distance_m: f64) -> f64 {
        if self.max_error_m <= 0.0 {
            return 0.0;
        }
        (1.0 - distance_m.max(0.0) / self.max_error_m).clamp(0.0, 1.0)
    }

    /// Time decay: 1.0 through the grace window, then linear down to
    /// `time_floor` at the round deadline. Never rises for later answers.
    pub fn time_factor(&self, elapsed_secs: f64) -> f64 {
        let elapsed = elapsed_secs.max(0.0);
        if elapsed <= self.time_grace_secs {
            return 1.0;
        }
        let window = self.round_duration_secs - self.time_grace_secs;
        if window <= 0.0 {
            return self.time_floor.clamp(0.0, 1.0);
        }
        let progress = ((elapsed - self.time_grace_secs) / window).clamp(0.0, 1.0);
        let floor = self.time_floor.clamp(0.0, 1.0);
        1.0 - progress * (1.0 - floor)
    }

    /// Score for one guess. Always within `[0, base_score]`.
    pub fn compute_score(&self, distance_m: f64, elapsed_secs: f64) -> f64 {
        self.base_score * self.distance_factor(distance_m) * self.time_factor(elapsed_secs)
    }
}

// =============================================================================
// TESTS
// =============================================================================
