//! Game Logic Module
//!
//! The round engine and everything it governs.
//!
//! ## Module Structure
//!
//! - `round`: Round records and the explicit lifecycle state
//! - `quota`: Daily move quota gating round creation
//! - `engine`: The round state machine (start, guess, expiry)
//! - `stats`: Leaderboard and per-location difficulty aggregation

pub mod round;
pub mod quota;
pub mod engine;
pub mod stats;

// Re-export key types
pub use round::{RoundId, RoundRecord, RoundState};
pub use quota::{QuotaConfig, QuotaTracker};
pub use engine::{EngineConfig, EngineError, GuessOutcome, GuessScore, RoundEngine, RoundStarted};
pub use stats::{Aggregator, LeaderboardEntry, SortKey};
