//! Round Records
//!
//! The state of one guessing round as an explicit tagged variant. A round is
//! `Active` from creation until exactly one terminal transition: `Completed`
//! carries the guess and its scoring, `Expired` carries nothing. There is no
//! way to hold a score and an expiry at once.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Deserialize};

use crate::core::geo::Coordinate;
use crate::store::{LocationId, UserId};

// =============================================================================
// ROUND ID
// =============================================================================

/// Unique round identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoundId(pub [u8; 16]);

impl RoundId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Mint a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }

    /// Parse from a UUID string.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(|u| Self(*u.as_bytes()))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        uuid::Uuid::from_bytes(self.0).fmt(f)
    }
}

// =============================================================================
// ROUND STATE
// =============================================================================

/// Lifecycle state of a round. `Active -> {Completed, Expired}` and nothing
/// else; the guess and its scoring exist only inside `Completed`.
///
/// Externally-tagged serde representation on purpose: these records pass
/// through the bincode store snapshot, which cannot encode tagged enums.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RoundState {
    /// Awaiting a guess, until the deadline.
    Active,
    /// Guess accepted and scored before the deadline.
    Completed {
        /// The submitted coordinate.
        guess: Coordinate,
        /// Server receive time of the guess.
        submitted_at: DateTime<Utc>,
        /// Great-circle error of the guess in meters.
        distance_error_m: f64,
        /// Score awarded for the guess.
        score: f64,
    },
    /// Deadline passed without a countable guess.
    Expired,
}

impl RoundState {
    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            RoundState::Active => "active",
            RoundState::Completed { .. } => "completed",
            RoundState::Expired => "expired",
        }
    }
}

// =============================================================================
// ROUND RECORD
// =============================================================================

/// One guessing round, owned exclusively by its creating user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Unique round id.
    pub id: RoundId,
    /// Owning user.
    pub user_id: UserId,
    /// The location being guessed.
    pub location_id: LocationId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Hard deadline, fixed at creation: `created_at + round duration`.
    pub expires_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: RoundState,
    /// Optimistic-concurrency version, bumped by the terminal transition.
    pub version: u64,
}

impl RoundRecord {
    /// Create an Active round. The deadline is derived here and never
    /// mutated afterwards.
    pub fn new(
        id: RoundId,
        user_id: UserId,
        location_id: LocationId,
        created_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            id,
            user_id,
            location_id,
            created_at,
            expires_at: created_at + duration,
            state: RoundState::Active,
            version: 0,
        }
    }

    /// Is the round still awaiting a guess?
    pub fn is_active(&self) -> bool {
        matches!(self.state, RoundState::Active)
    }

    /// Has the deadline passed at `now`?
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Seconds between creation and `at`, clamped to non-negative.
    pub fn elapsed_secs(&self, at: DateTime<Utc>) -> f64 {
        ((at - self.created_at).num_milliseconds() as f64 / 1000.0).max(0.0)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_round_id_round_trip() {
        let id = RoundId::generate();
        let parsed = RoundId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(RoundId::parse("not-a-uuid").is_none());
    }

    #[test]
    fn test_deadline_fixed_at_creation() {
        let round = RoundRecord::new(
            RoundId::generate(),
            UserId::new([1; 16]),
            42,
            t0(),
            Duration::seconds(120),
        );
        assert_eq!(round.expires_at, t0() + Duration::seconds(120));
        assert!(round.is_active());
        assert!(!round.is_past_deadline(t0() + Duration::seconds(120)));
        assert!(round.is_past_deadline(t0() + Duration::seconds(121)));
    }

    #[test]
    fn test_elapsed_is_clamped() {
        let round = RoundRecord::new(
            RoundId::generate(),
            UserId::new([1; 16]),
            42,
            t0(),
            Duration::seconds(120),
        );
        assert_eq!(round.elapsed_secs(t0() - Duration::seconds(5)), 0.0);
        assert!((round.elapsed_secs(t0() + Duration::milliseconds(4500)) - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(RoundState::Active.label(), "active");
        assert_eq!(RoundState::Expired.label(), "expired");
        let completed = RoundState::Completed {
            guess: Coordinate::new(0.0, 0.0).unwrap(),
            submitted_at: t0(),
            distance_error_m: 12.0,
            score: 900.0,
        };
        assert_eq!(completed.label(), "completed");
    }
}
