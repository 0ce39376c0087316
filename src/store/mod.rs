//! Game State Store
//!
//! In-memory realization of the persistence contract: typed records behind
//! `RwLock`ed BTreeMaps, read-modify-write as closures under the write guard,
//! a unique active-round index per user, and a versioned compare-and-swap for
//! the single terminal transition of a round.
//!
//! Every durable mutation in the server goes through this type. Nothing else
//! caches quota or round state, so a fresh read here is always authoritative.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tokio::sync::RwLock;

use crate::core::geo::Coordinate;
use crate::game::round::{RoundId, RoundRecord, RoundState};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Stable user identifier (16 bytes, derived from the identity provider's
/// subject claim).
///
/// Implements Ord for deterministic BTreeMap ordering, which also fixes the
/// leaderboard tie-break.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub [u8; 16]);

impl UserId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parse from a 32-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Location identifier assigned by the content collaborator.
pub type LocationId = u64;

// =============================================================================
// RECORDS
// =============================================================================

/// Difficulty bucket for a location, set by the content collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Served preferentially to new players.
    Easy,
    /// The default difficulty.
    Normal,
    /// Sparse on clues; served once a player has some games behind them.
    Hard,
}

/// Durable per-user record.
///
/// Cumulative stats are mutated only by the aggregator; quota fields only by
/// the quota tracker. The engine never deletes users.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable identifier from the identity boundary.
    pub id: UserId,
    /// Human-readable name shown on the leaderboard.
    pub display_name: String,
    /// Sum of all round scores.
    pub total_score: f64,
    /// Number of completed rounds.
    pub games_played: u32,
    /// Running mean of distance error in meters.
    pub avg_error_m: f64,
    /// Running mean of time-to-guess in seconds.
    pub avg_time_secs: f64,
    /// Rounds the user may still start today. Never negative.
    pub daily_moves_remaining: u32,
    /// Next instant the daily quota refills.
    pub quota_reset_at: DateTime<Utc>,
    /// The user's reference timezone as minutes east of UTC; day boundaries
    /// for the quota are computed against it.
    pub utc_offset_minutes: i32,
}

impl UserRecord {
    /// Fresh record for a first-time user.
    ///
    /// `quota_reset_at` starts at `now`, so the first quota check performs
    /// the initial refill and schedules the real next-midnight reset.
    pub fn new(id: UserId, display_name: String, daily_moves: u32, now: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name,
            total_score: 0.0,
            games_played: 0,
            avg_error_m: 0.0,
            avg_time_secs: 0.0,
            daily_moves_remaining: daily_moves,
            quota_reset_at: now,
            utc_offset_minutes: 0,
        }
    }
}

/// Durable per-location record with running difficulty aggregates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Identifier assigned by the content collaborator.
    pub id: LocationId,
    /// True coordinate, revealed to players only after their round ends.
    pub coordinate: Coordinate,
    /// Opaque reference to the panorama content.
    pub content_ref: String,
    /// Difficulty bucket.
    pub complexity: Complexity,
    /// Number of completed rounds at this location.
    pub times_played: u32,
    /// Running mean of distance error in meters.
    pub avg_error_m: f64,
    /// Running mean of time-to-guess in seconds.
    pub avg_time_secs: f64,
}

impl LocationRecord {
    /// New location with empty aggregates.
    pub fn new(id: LocationId, coordinate: Coordinate, content_ref: String, complexity: Complexity) -> Self {
        Self {
            id,
            coordinate,
            content_ref,
            complexity,
            times_played: 0,
            avg_error_m: 0.0,
            avg_time_secs: 0.0,
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Store errors. Mapped to engine errors at the call site - the store knows
/// nothing about business rules.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The keyed record does not exist.
    #[error("record not found")]
    NotFound,

    /// A compare-and-swap lost to a concurrent writer.
    #[error("version conflict")]
    VersionConflict,

    /// The unique (user, active-round) index already holds an entry.
    #[error("user already has an active round")]
    ActiveRoundExists,

    /// Snapshot encoding or decoding failed.
    #[error("snapshot codec error: {0}")]
    Snapshot(String),
}

// =============================================================================
// STORE
// =============================================================================

/// Serialized form of the store contents (bincode).
#[derive(Serialize, Deserialize)]
struct StoreSnapshot {
    users: BTreeMap<UserId, UserRecord>,
    locations: BTreeMap<LocationId, LocationRecord>,
    rounds: BTreeMap<RoundId, RoundRecord>,
}

/// The shared game state store.
///
/// Lock order is users -> locations -> rounds -> active_rounds; methods that
/// need more than one map acquire guards in that order and never hold a guard
/// across another lock acquisition out of order.
#[derive(Debug, Default)]
pub struct GameStore {
    users: RwLock<BTreeMap<UserId, UserRecord>>,
    locations: RwLock<BTreeMap<LocationId, LocationRecord>>,
    rounds: RwLock<BTreeMap<RoundId, RoundRecord>>,
    /// Unique index: at most one Active round per user.
    active_rounds: RwLock<BTreeMap<UserId, RoundId>>,
}

impl GameStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    /// Insert a user unless one already exists. Returns true when inserted.
    pub async fn register_user(&self, user: UserRecord) -> bool {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return false;
        }
        users.insert(user.id, user);
        true
    }

    /// Fetch a user by id.
    pub async fn get_user(&self, id: &UserId) -> Option<UserRecord> {
        self.users.read().await.get(id).cloned()
    }

    /// Atomically read-modify-write a user record under the write guard.
    ///
    /// The closure's return value is passed through, which lets callers make
    /// a decision (consume a move, skip a reset) inside the atomic section.
    pub async fn update_user<R>(
        &self,
        id: &UserId,
        f: impl FnOnce(&mut UserRecord) -> R,
    ) -> Result<R, StoreError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(id).ok_or(StoreError::NotFound)?;
        Ok(f(user))
    }

    /// Ids of every registered user.
    pub async fn user_ids(&self) -> Vec<UserId> {
        self.users.read().await.keys().copied().collect()
    }

    /// Clone of every user record.
    pub async fn all_users(&self) -> Vec<UserRecord> {
        self.users.read().await.values().cloned().collect()
    }

    // -------------------------------------------------------------------------
    // Locations
    // -------------------------------------------------------------------------

    /// Insert or replace a location record.
    pub async fn insert_location(&self, location: LocationRecord) {
        self.locations.write().await.insert(location.id, location);
    }

    /// Fetch a location by id.
    pub async fn get_location(&self, id: &LocationId) -> Option<LocationRecord> {
        self.locations.read().await.get(id).cloned()
    }

    /// Atomically read-modify-write a location record.
    pub async fn update_location<R>(
        &self,
        id: &LocationId,
        f: impl FnOnce(&mut LocationRecord) -> R,
    ) -> Result<R, StoreError> {
        let mut locations = self.locations.write().await;
        let location = locations.get_mut(id).ok_or(StoreError::NotFound)?;
        Ok(f(location))
    }

    /// Clone of every location record.
    pub async fn all_locations(&self) -> Vec<LocationRecord> {
        self.locations.read().await.values().cloned().collect()
    }

    /// Number of locations in the catalog.
    pub async fn location_count(&self) -> usize {
        self.locations.read().await.len()
    }

    // -------------------------------------------------------------------------
    // Rounds
    // -------------------------------------------------------------------------

    /// Insert a new round.
    ///
    /// For an Active round this also claims the unique per-user slot; a second
    /// Active round for the same user fails with `ActiveRoundExists` no matter
    /// how the callers interleave.
    pub async fn insert_round(&self, round: RoundRecord) -> Result<(), StoreError> {
        let mut rounds = self.rounds.write().await;
        let mut active = self.active_rounds.write().await;
        if round.is_active() {
            if active.contains_key(&round.user_id) {
                return Err(StoreError::ActiveRoundExists);
            }
            active.insert(round.user_id, round.id);
        }
        rounds.insert(round.id, round);
        Ok(())
    }

    /// Fetch a round by id.
    pub async fn get_round(&self, id: &RoundId) -> Option<RoundRecord> {
        self.rounds.read().await.get(id).cloned()
    }

    /// Compare-and-swap a round into a terminal state.
    ///
    /// Succeeds only when the stored version matches `expected_version` and
    /// the round is still Active; exactly one of any set of racing callers
    /// wins. The winner's write releases the per-user active slot.
    pub async fn transition_round(
        &self,
        id: &RoundId,
        expected_version: u64,
        next: RoundState,
    ) -> Result<RoundRecord, StoreError> {
        debug_assert!(!matches!(next, RoundState::Active), "transition target must be terminal");
        let mut rounds = self.rounds.write().await;
        let mut active = self.active_rounds.write().await;
        let round = rounds.get_mut(id).ok_or(StoreError::NotFound)?;
        if round.version != expected_version || !round.is_active() {
            return Err(StoreError::VersionConflict);
        }
        round.state = next;
        round.version += 1;
        if active.get(&round.user_id) == Some(id) {
            active.remove(&round.user_id);
        }
        Ok(round.clone())
    }

    /// The user's Active round, if any.
    pub async fn active_round_of(&self, user_id: &UserId) -> Option<RoundId> {
        self.active_rounds.read().await.get(user_id).copied()
    }

    /// Active rounds whose deadline has passed.
    pub async fn stale_active_rounds(&self, now: DateTime<Utc>) -> Vec<RoundRecord> {
        self.rounds
            .read()
            .await
            .values()
            .filter(|r| r.is_active() && r.expires_at <= now)
            .cloned()
            .collect()
    }

    /// Every round that reached Completed (the aggregator's input set).
    pub async fn completed_rounds(&self) -> Vec<RoundRecord> {
        self.rounds
            .read()
            .await
            .values()
            .filter(|r| matches!(r.state, RoundState::Completed { .. }))
            .cloned()
            .collect()
    }

    /// Locations this user has already played, in any round state.
    pub async fn locations_played_by(&self, user_id: &UserId) -> BTreeSet<LocationId> {
        self.rounds
            .read()
            .await
            .values()
            .filter(|r| r.user_id == *user_id)
            .map(|r| r.location_id)
            .collect()
    }

    /// Total number of rounds ever created.
    pub async fn round_count(&self) -> usize {
        self.rounds.read().await.len()
    }

    // -------------------------------------------------------------------------
    // Snapshot
    // -------------------------------------------------------------------------

    /// Serialize the full store contents for backup.
    pub async fn snapshot(&self) -> Result<Vec<u8>, StoreError> {
        let snapshot = StoreSnapshot {
            users: self.users.read().await.clone(),
            locations: self.locations.read().await.clone(),
            rounds: self.rounds.read().await.clone(),
        };
        bincode::serialize(&snapshot).map_err(|e| StoreError::Snapshot(e.to_string()))
    }

    /// Rebuild a store from a snapshot, reconstructing the active-round index.
    ///
    /// Aggregates restored this way can be reconciled with a follow-up
    /// `recompute_all`.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, StoreError> {
        let snapshot: StoreSnapshot =
            bincode::deserialize(bytes).map_err(|e| StoreError::Snapshot(e.to_string()))?;
        let active: BTreeMap<UserId, RoundId> = snapshot
            .rounds
            .values()
            .filter(|r| r.is_active())
            .map(|r| (r.user_id, r.id))
            .collect();
        Ok(Self {
            users: RwLock::new(snapshot.users),
            locations: RwLock::new(snapshot.locations),
            rounds: RwLock::new(snapshot.rounds),
            active_rounds: RwLock::new(active),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn user(byte: u8) -> UserRecord {
        UserRecord::new(UserId::new([byte; 16]), format!("player-{byte}"), 10, now())
    }

    fn location(id: LocationId) -> LocationRecord {
        LocationRecord::new(
            id,
            Coordinate::new(48.8584, 2.2945).unwrap(),
            format!("pano:{id}"),
            Complexity::Normal,
        )
    }

    fn active_round(user_id: UserId, location_id: LocationId) -> RoundRecord {
        RoundRecord::new(RoundId::generate(), user_id, location_id, now(), chrono::Duration::seconds(120))
    }

    #[tokio::test]
    async fn test_register_user_once() {
        let store = GameStore::new();
        assert!(store.register_user(user(1)).await);
        assert!(!store.register_user(user(1)).await);
        assert_eq!(store.user_ids().await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_user_passes_value_through() {
        let store = GameStore::new();
        store.register_user(user(1)).await;
        let id = UserId::new([1; 16]);

        let remaining = store
            .update_user(&id, |u| {
                u.daily_moves_remaining -= 1;
                u.daily_moves_remaining
            })
            .await
            .unwrap();
        assert_eq!(remaining, 9);

        let missing = UserId::new([9; 16]);
        assert!(matches!(
            store.update_user(&missing, |_| ()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_single_active_round_index() {
        let store = GameStore::new();
        let uid = UserId::new([1; 16]);
        store.insert_location(location(7)).await;

        let first = active_round(uid, 7);
        let first_id = first.id;
        store.insert_round(first).await.unwrap();
        assert_eq!(store.active_round_of(&uid).await, Some(first_id));

        let second = active_round(uid, 7);
        assert!(matches!(
            store.insert_round(second).await,
            Err(StoreError::ActiveRoundExists)
        ));
    }

    #[tokio::test]
    async fn test_transition_cas_single_winner() {
        let store = GameStore::new();
        let uid = UserId::new([1; 16]);
        let round = active_round(uid, 7);
        let rid = round.id;
        let version = round.version;
        store.insert_round(round).await.unwrap();

        let won = store.transition_round(&rid, version, RoundState::Expired).await;
        assert!(won.is_ok());
        // The active slot is free again.
        assert_eq!(store.active_round_of(&uid).await, None);

        // Same expected version loses now.
        assert!(matches!(
            store.transition_round(&rid, version, RoundState::Expired).await,
            Err(StoreError::VersionConflict)
        ));
    }

    #[tokio::test]
    async fn test_stale_scan_ignores_terminal() {
        let store = GameStore::new();
        let uid = UserId::new([1; 16]);
        let round = active_round(uid, 7);
        let rid = round.id;
        let version = round.version;
        store.insert_round(round).await.unwrap();

        let later = now() + chrono::Duration::seconds(200);
        assert_eq!(store.stale_active_rounds(later).await.len(), 1);

        store.transition_round(&rid, version, RoundState::Expired).await.unwrap();
        assert!(store.stale_active_rounds(later).await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let store = GameStore::new();
        store.register_user(user(1)).await;
        store.insert_location(location(7)).await;
        let round = active_round(UserId::new([1; 16]), 7);
        let rid = round.id;
        store.insert_round(round).await.unwrap();

        let bytes = store.snapshot().await.unwrap();
        let restored = GameStore::from_snapshot(&bytes).unwrap();

        assert_eq!(restored.user_ids().await.len(), 1);
        assert_eq!(restored.location_count().await, 1);
        assert_eq!(restored.round_count().await, 1);
        // Active index is rebuilt, not serialized.
        assert_eq!(restored.active_round_of(&UserId::new([1; 16])).await, Some(rid));
    }

    #[tokio::test]
    async fn test_from_snapshot_rejects_garbage() {
        assert!(matches!(
            GameStore::from_snapshot(&[0xff, 0x00, 0x13]),
            Err(StoreError::Snapshot(_))
        ));
    }
}
