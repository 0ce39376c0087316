//! # GeoGuess Game Server
//!
//! Authoritative server for a geo-guessing game: players are shown a
//! panorama tied to a hidden coordinate and must place a guess on the map
//! within a fixed window. Guesses are scored by great-circle distance and
//! elapsed time; a daily move quota gates round creation; leaderboards and
//! per-location difficulty statistics are derived from round history.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     GEOGUESS SERVER                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  core/           - Pure primitives                           │
//! │  ├── geo.rs      - Coordinates, great-circle distance        │
//! │  └── score.rs    - Distance/time decay scoring formula       │
//! │                                                              │
//! │  game/           - Game rules                                │
//! │  ├── round.rs    - Round records, tagged lifecycle state     │
//! │  ├── quota.rs    - Daily move quota                          │
//! │  ├── engine.rs   - Round state machine (start/guess/expire)  │
//! │  └── stats.rs    - Leaderboard & location aggregator         │
//! │                                                              │
//! │  store/          - Persistence contract, in-memory backing   │
//! │  content/        - Location source (content collaborator)    │
//! │                                                              │
//! │  network/        - Non-game plumbing                         │
//! │  ├── auth.rs     - JWT validation (identity collaborator)    │
//! │  ├── protocol.rs - Wire message types                        │
//! │  └── server.rs   - WebSocket server & maintenance loops      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//!
//! The engine guarantees, under arbitrary concurrency:
//! - a round reaches exactly one terminal state (Completed or Expired);
//! - a user holds at most one Active round;
//! - the daily move counter never goes negative;
//! - the 120-second deadline is enforced from server timestamps only.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod store;
pub mod content;
pub mod network;

// Re-export commonly used types
pub use core::geo::{Coordinate, great_circle_distance_m};
pub use core::score::ScoreParams;
pub use game::engine::{EngineConfig, EngineError, GuessOutcome, RoundEngine};
pub use game::quota::{QuotaConfig, QuotaTracker};
pub use game::round::{RoundId, RoundRecord, RoundState};
pub use game::stats::{Aggregator, LeaderboardEntry, SortKey};
pub use store::{GameStore, LocationId, LocationRecord, UserId, UserRecord};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Guessing window per round (seconds)
pub const ROUND_DURATION_SECS: i64 = 120;

/// Default daily move allotment
pub const DEFAULT_DAILY_MOVES: u32 = 10;
