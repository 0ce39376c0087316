//! Core pure primitives.
//!
//! Geographic math and the scoring formula. Nothing in this module touches
//! shared state, the clock, or I/O - everything is a deterministic function
//! of its inputs, which is what makes rounds testable and replayable.

pub mod geo;
pub mod score;

// Re-export core types
pub use geo::{Coordinate, great_circle_distance_m, EARTH_RADIUS_M};
pub use score::ScoreParams;
