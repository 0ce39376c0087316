//! Round State Machine
//!
//! Owns the lifecycle of a round: quota-gated creation, guess acceptance,
//! scoring, and expiry. `Active -> {Completed, Expired}` with exactly one
//! terminal transition per round; the 120-second deadline is enforced by
//! comparing server timestamps at submission time, never trusted from the
//! client and never dependent on the background sweep.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::content::LocationSource;
use crate::core::geo::{great_circle_distance_m, Coordinate};
use crate::core::score::ScoreParams;
use crate::game::quota::{QuotaConfig, QuotaTracker};
use crate::game::round::{RoundId, RoundRecord, RoundState};
use crate::game::stats::Aggregator;
use crate::store::{GameStore, StoreError, UserId};

// =============================================================================
// ERRORS
// =============================================================================

/// Engine failure taxonomy. Every variant is recoverable from the caller's
/// perspective and maps to a distinct wire error code; the engine never
/// terminates the process on any of these.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// No moves left in today's quota.
    #[error("no moves left today")]
    QuotaExhausted,

    /// The user already has an active round.
    #[error("a round is already in progress")]
    RoundAlreadyInProgress,

    /// The round already reached a terminal state.
    #[error("round is not active")]
    RoundNotActive,

    /// The round belongs to another user.
    #[error("round belongs to another user")]
    Forbidden,

    /// The content collaborator returned nothing.
    #[error("no location available")]
    LocationUnavailable,

    /// A concurrent-write race lost even after the internal retry.
    #[error("concurrent update conflict")]
    Conflict,

    /// Malformed guess coordinate (validation, not business rule).
    #[error("coordinate out of range: lat={lat}, lng={lng}")]
    InvalidCoordinate {
        /// Offending latitude.
        lat: f64,
        /// Offending longitude.
        lng: f64,
    },

    /// Round id does not exist (validation, not business rule).
    #[error("unknown round {0}")]
    UnknownRound(RoundId),

    /// User id is not registered (validation, not business rule).
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    /// Unexpected persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// CONFIG & RESULTS
// =============================================================================

/// Engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Length of the guessing window in seconds.
    pub round_duration_secs: i64,
    /// Exclude locations the user already played when picking a candidate.
    pub exclude_played: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            round_duration_secs: crate::ROUND_DURATION_SECS,
            exclude_played: true,
        }
    }
}

/// Successful round creation. The true coordinate is deliberately absent.
#[derive(Debug, Clone)]
pub struct RoundStarted {
    /// Id of the new round.
    pub round_id: RoundId,
    /// Opaque panorama reference for the client to render.
    pub content_ref: String,
    /// Server-authoritative deadline.
    pub expires_at: DateTime<Utc>,
    /// Moves left today after this round was paid for.
    pub moves_remaining: u32,
}

/// Scoring details of an accepted guess.
#[derive(Debug, Clone)]
pub struct GuessScore {
    /// Great-circle error in meters.
    pub distance_error_m: f64,
    /// Awarded score.
    pub score: f64,
    /// Seconds between round creation and the guess.
    pub elapsed_secs: f64,
    /// The true coordinate, safe to reveal now.
    pub true_coordinate: Coordinate,
}

/// Outcome of a well-formed guess submission.
#[derive(Debug, Clone)]
pub enum GuessOutcome {
    /// The guess arrived in time and was scored.
    Scored(GuessScore),
    /// The deadline had passed; the round expired and the guess was
    /// discarded as a non-submission.
    Expired {
        /// The deadline that was missed.
        expired_at: DateTime<Utc>,
    },
}

// =============================================================================
// PER-USER SERIALIZATION
// =============================================================================

/// Per-user mutexes serializing round creation.
///
/// The store's unique active-round index would catch a race on its own; the
/// lock keeps quota consumption and round insertion a single critical
/// section so a failed insert can't strand a consumed move.
#[derive(Default)]
struct UserLocks {
    inner: Mutex<BTreeMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, user_id: UserId) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(user_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        lock.lock_owned().await
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// The round state machine and its collaborators.
pub struct RoundEngine {
    store: Arc<GameStore>,
    source: Arc<dyn LocationSource>,
    quota: QuotaTracker,
    stats: Aggregator,
    scoring: ScoreParams,
    config: EngineConfig,
    user_locks: UserLocks,
}

impl RoundEngine {
    /// Wire up the engine over the shared store and a location source.
    pub fn new(
        store: Arc<GameStore>,
        source: Arc<dyn LocationSource>,
        config: EngineConfig,
        quota_config: QuotaConfig,
        scoring: ScoreParams,
    ) -> Self {
        Self {
            quota: QuotaTracker::new(store.clone(), quota_config),
            stats: Aggregator::new(store.clone()),
            store,
            source,
            scoring,
            config,
            user_locks: UserLocks::default(),
        }
    }

    /// The quota tracker (scheduler and purchase-flow entry points).
    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// The aggregator (leaderboard queries, periodic recompute).
    pub fn stats(&self) -> &Aggregator {
        &self.stats
    }

    /// Start a new round for `user_id`.
    ///
    /// Runs under the user's serialization lock: at most one active round
    /// per user, and the quota decrement is atomic with round creation.
    /// Quota consumption is the precondition and happens first - on quota
    /// failure no round is created and the error propagates unchanged. Any
    /// failure after the decrement refunds the move inside the same critical
    /// section, so a rejected start never strands quota.
    pub async fn start_round(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<RoundStarted, EngineError> {
        if self.store.get_user(&user_id).await.is_none() {
            return Err(EngineError::UnknownUser(user_id));
        }

        let _guard = self.user_locks.acquire(user_id).await;

        let moves_remaining = self.quota.try_consume_move(user_id, now).await?;
        match self.create_round(user_id, now, moves_remaining).await {
            Ok(started) => Ok(started),
            Err(err) => {
                let _ = self
                    .store
                    .update_user(&user_id, |u| {
                        u.daily_moves_remaining = u.daily_moves_remaining.saturating_add(1);
                    })
                    .await;
                Err(err)
            }
        }
    }

    /// The post-quota half of `start_round`; callers refund on failure.
    async fn create_round(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        moves_remaining: u32,
    ) -> Result<RoundStarted, EngineError> {
        if self.store.active_round_of(&user_id).await.is_some() {
            return Err(EngineError::RoundAlreadyInProgress);
        }

        // Pick a location the user has not played; relax to the full pool
        // when the exclusion empties it, per the repetition-reduction
        // contract.
        let exclude = if self.config.exclude_played {
            self.store.locations_played_by(&user_id).await
        } else {
            BTreeSet::new()
        };
        let candidate = match self.source.candidate_location(&exclude).await {
            Some(c) => c,
            None if !exclude.is_empty() => {
                debug!(user = %user_id, "exclusion exhausted the pool, relaxing");
                self.source
                    .candidate_location(&BTreeSet::new())
                    .await
                    .ok_or(EngineError::LocationUnavailable)?
            }
            None => return Err(EngineError::LocationUnavailable),
        };

        let round = RoundRecord::new(
            RoundId::generate(),
            user_id,
            candidate.id,
            now,
            Duration::seconds(self.config.round_duration_secs),
        );
        let round_id = round.id;
        let expires_at = round.expires_at;
        match self.store.insert_round(round).await {
            Ok(()) => {}
            Err(StoreError::ActiveRoundExists) => return Err(EngineError::RoundAlreadyInProgress),
            Err(other) => return Err(other.into()),
        }

        info!(
            user = %user_id,
            round = %round_id,
            location = candidate.id,
            moves_remaining,
            "round started"
        );
        Ok(RoundStarted {
            round_id,
            content_ref: candidate.content_ref,
            expires_at,
            moves_remaining,
        })
    }

    /// Submit a guess for an active round.
    ///
    /// A guess past the deadline expires the round instead of scoring it.
    /// The terminal transition is a versioned compare-and-swap; a lost race
    /// (for example against the expiry sweep) is retried once with fresh
    /// state, after which the terminal loser surfaces `RoundNotActive`.
    pub async fn submit_guess(
        &self,
        round_id: RoundId,
        user_id: UserId,
        guess: Coordinate,
        now: DateTime<Utc>,
    ) -> Result<GuessOutcome, EngineError> {
        if !guess.in_bounds() {
            return Err(EngineError::InvalidCoordinate { lat: guess.lat, lng: guess.lng });
        }

        let mut retried = false;
        loop {
            let round = self
                .store
                .get_round(&round_id)
                .await
                .ok_or(EngineError::UnknownRound(round_id))?;
            if round.user_id != user_id {
                return Err(EngineError::Forbidden);
            }
            if !round.is_active() {
                return Err(EngineError::RoundNotActive);
            }

            if round.is_past_deadline(now) {
                match self
                    .store
                    .transition_round(&round_id, round.version, RoundState::Expired)
                    .await
                {
                    Ok(_) => {
                        info!(user = %user_id, round = %round_id, "late guess, round expired");
                        return Ok(GuessOutcome::Expired { expired_at: round.expires_at });
                    }
                    Err(StoreError::VersionConflict) if !retried => {
                        retried = true;
                        continue;
                    }
                    Err(StoreError::VersionConflict) => return Err(EngineError::Conflict),
                    Err(other) => return Err(other.into()),
                }
            }

            let location = self
                .store
                .get_location(&round.location_id)
                .await
                .ok_or(EngineError::LocationUnavailable)?;
            let distance_error_m = great_circle_distance_m(guess, location.coordinate);
            let elapsed_secs = round.elapsed_secs(now);
            let score = self.scoring.compute_score(distance_error_m, elapsed_secs);

            let next = RoundState::Completed {
                guess,
                submitted_at: now,
                distance_error_m,
                score,
            };
            match self.store.transition_round(&round_id, round.version, next).await {
                Ok(completed) => {
                    self.stats.on_round_completed(&completed).await?;
                    info!(
                        user = %user_id,
                        round = %round_id,
                        distance_m = distance_error_m as i64,
                        score = score as i64,
                        "guess scored"
                    );
                    return Ok(GuessOutcome::Scored(GuessScore {
                        distance_error_m,
                        score,
                        elapsed_secs,
                        true_coordinate: location.coordinate,
                    }));
                }
                Err(StoreError::VersionConflict) if !retried => {
                    debug!(round = %round_id, "terminal transition lost a race, re-reading");
                    retried = true;
                    continue;
                }
                Err(StoreError::VersionConflict) => return Err(EngineError::Conflict),
                Err(StoreError::NotFound) => return Err(EngineError::UnknownRound(round_id)),
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Expire every active round whose deadline has passed.
    ///
    /// Cleanup convenience for the background scheduler - deadline
    /// enforcement itself lives in `submit_guess`. Idempotent, and safe to
    /// run concurrently with submissions: a round that completes mid-sweep
    /// simply loses the CAS here and is skipped. Returns how many rounds
    /// were expired.
    pub async fn expire_stale_rounds(&self, now: DateTime<Utc>) -> usize {
        let stale = self.store.stale_active_rounds(now).await;
        let mut expired = 0;
        for round in stale {
            match self
                .store
                .transition_round(&round.id, round.version, RoundState::Expired)
                .await
            {
                Ok(_) => {
                    debug!(user = %round.user_id, round = %round.id, "round expired by sweep");
                    expired += 1;
                }
                // Lost to a concurrent submission or an overlapping sweep.
                Err(StoreError::VersionConflict) | Err(StoreError::NotFound) => {}
                Err(other) => {
                    warn!(round = %round.id, error = %other, "expiry sweep store failure");
                }
            }
        }
        if expired > 0 {
            info!(expired, "expiry sweep closed stale rounds");
        }
        expired
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::content::Candidate;
    use crate::store::{Complexity, LocationRecord, UserRecord};

    /// Deterministic source: lowest-id location not excluded.
    struct OrderedSource {
        store: Arc<GameStore>,
    }

    #[async_trait]
    impl LocationSource for OrderedSource {
        async fn candidate_location(&self, exclude: &BTreeSet<u64>) -> Option<Candidate> {
            self.store
                .all_locations()
                .await
                .into_iter()
                .find(|l| !exclude.contains(&l.id))
                .map(Candidate::from)
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    fn uid(byte: u8) -> UserId {
        UserId::new([byte; 16])
    }

    async fn engine_with(daily_moves: u32, locations: usize) -> (Arc<GameStore>, RoundEngine) {
        let store = Arc::new(GameStore::new());
        for byte in 1..=2u8 {
            store
                .register_user(UserRecord::new(uid(byte), format!("player-{byte}"), daily_moves, t0()))
                .await;
        }
        for id in 0..locations as u64 {
            store
                .insert_location(LocationRecord::new(
                    id + 1,
                    Coordinate::new(10.0 + id as f64, 20.0).unwrap(),
                    format!("pano:{}", id + 1),
                    Complexity::Normal,
                ))
                .await;
        }
        let source = Arc::new(OrderedSource { store: store.clone() });
        let engine = RoundEngine::new(
            store.clone(),
            source,
            EngineConfig::default(),
            QuotaConfig { daily_moves },
            ScoreParams::default(),
        );
        (store, engine)
    }

    #[tokio::test]
    async fn test_start_round_happy_path() {
        let (store, engine) = engine_with(5, 3).await;

        let started = engine.start_round(uid(1), t0()).await.unwrap();
        assert_eq!(started.content_ref, "pano:1");
        assert_eq!(started.expires_at, at(120));
        assert_eq!(started.moves_remaining, 4);

        let round = store.get_round(&started.round_id).await.unwrap();
        assert!(round.is_active());
        assert_eq!(store.active_round_of(&uid(1)).await, Some(started.round_id));
    }

    #[tokio::test]
    async fn test_start_round_unknown_user() {
        let (_, engine) = engine_with(5, 3).await;
        assert!(matches!(
            engine.start_round(uid(9), t0()).await,
            Err(EngineError::UnknownUser(_))
        ));
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_active() {
        let (store, engine) = engine_with(5, 3).await;
        engine.start_round(uid(1), t0()).await.unwrap();
        assert!(matches!(
            engine.start_round(uid(1), at(1)).await,
            Err(EngineError::RoundAlreadyInProgress)
        ));
        // The rejected attempt refunded its move.
        assert_eq!(store.get_user(&uid(1)).await.unwrap().daily_moves_remaining, 4);
    }

    #[tokio::test]
    async fn test_empty_catalog_costs_no_move() {
        let (store, engine) = engine_with(2, 0).await;
        assert!(matches!(
            engine.start_round(uid(1), t0()).await,
            Err(EngineError::LocationUnavailable)
        ));
        assert_eq!(store.get_user(&uid(1)).await.unwrap().daily_moves_remaining, 2);
    }

    #[tokio::test]
    async fn test_exclusion_relaxes_when_everything_played() {
        let (_, engine) = engine_with(5, 1).await;

        let first = engine.start_round(uid(1), t0()).await.unwrap();
        let guess = Coordinate::new(10.0, 20.0).unwrap();
        engine.submit_guess(first.round_id, uid(1), guess, at(10)).await.unwrap();

        // The only location is now played; the constraint must relax rather
        // than fail.
        let second = engine.start_round(uid(1), at(20)).await.unwrap();
        assert_eq!(second.content_ref, "pano:1");
    }

    #[tokio::test]
    async fn test_perfect_guess_scores_base() {
        let (store, engine) = engine_with(5, 3).await;
        let started = engine.start_round(uid(1), t0()).await.unwrap();

        let truth = Coordinate::new(10.0, 20.0).unwrap();
        let outcome = engine.submit_guess(started.round_id, uid(1), truth, at(5)).await.unwrap();

        let GuessOutcome::Scored(scored) = outcome else {
            panic!("expected scored outcome");
        };
        assert_eq!(scored.distance_error_m, 0.0);
        assert!((scored.score - ScoreParams::default().base_score).abs() < 1e-9);
        assert_eq!(scored.true_coordinate, truth);

        // Aggregates applied exactly once.
        let user = store.get_user(&uid(1)).await.unwrap();
        assert_eq!(user.games_played, 1);
        assert!((user.total_score - scored.score).abs() < 1e-9);
        let location = store.get_location(&1).await.unwrap();
        assert_eq!(location.times_played, 1);
        // The active slot is free again.
        assert_eq!(store.active_round_of(&uid(1)).await, None);
    }

    #[tokio::test]
    async fn test_submit_by_non_owner_is_forbidden() {
        let (_, engine) = engine_with(5, 3).await;
        let started = engine.start_round(uid(1), t0()).await.unwrap();
        let guess = Coordinate::new(0.0, 0.0).unwrap();
        assert!(matches!(
            engine.submit_guess(started.round_id, uid(2), guess, at(5)).await,
            Err(EngineError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_invalid_coordinate_fails_fast() {
        let (_, engine) = engine_with(5, 3).await;
        let started = engine.start_round(uid(1), t0()).await.unwrap();
        let bad = Coordinate { lat: 91.0, lng: 0.0 };
        assert!(matches!(
            engine.submit_guess(started.round_id, uid(1), bad, at(5)).await,
            Err(EngineError::InvalidCoordinate { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_round_fails_fast() {
        let (_, engine) = engine_with(5, 3).await;
        let guess = Coordinate::new(0.0, 0.0).unwrap();
        assert!(matches!(
            engine.submit_guess(RoundId::generate(), uid(1), guess, t0()).await,
            Err(EngineError::UnknownRound(_))
        ));
    }

    #[tokio::test]
    async fn test_late_submission_expires_instead_of_scoring() {
        let (store, engine) = engine_with(5, 3).await;
        let started = engine.start_round(uid(1), t0()).await.unwrap();

        // t = 121s: one second past the 120s window, coordinate supplied.
        let guess = Coordinate::new(10.0, 20.0).unwrap();
        let outcome = engine.submit_guess(started.round_id, uid(1), guess, at(121)).await.unwrap();
        assert!(matches!(outcome, GuessOutcome::Expired { expired_at } if expired_at == at(120)));

        let round = store.get_round(&started.round_id).await.unwrap();
        assert_eq!(round.state, RoundState::Expired);
        // An expiry is not a game: no aggregates move.
        assert_eq!(store.get_user(&uid(1)).await.unwrap().games_played, 0);
    }

    #[tokio::test]
    async fn test_submission_at_deadline_still_counts() {
        let (_, engine) = engine_with(5, 3).await;
        let started = engine.start_round(uid(1), t0()).await.unwrap();
        let guess = Coordinate::new(10.0, 20.0).unwrap();
        let outcome = engine.submit_guess(started.round_id, uid(1), guess, at(120)).await.unwrap();
        assert!(matches!(outcome, GuessOutcome::Scored(_)));
    }

    #[tokio::test]
    async fn test_double_submit_is_rejected() {
        let (_, engine) = engine_with(5, 3).await;
        let started = engine.start_round(uid(1), t0()).await.unwrap();
        let guess = Coordinate::new(10.0, 20.0).unwrap();
        engine.submit_guess(started.round_id, uid(1), guess, at(5)).await.unwrap();
        assert!(matches!(
            engine.submit_guess(started.round_id, uid(1), guess, at(6)).await,
            Err(EngineError::RoundNotActive)
        ));
    }

    #[tokio::test]
    async fn test_expiry_sweep_is_idempotent_and_skips_terminal() {
        let (store, engine) = engine_with(5, 3).await;
        let a = engine.start_round(uid(1), t0()).await.unwrap();
        let b = engine.start_round(uid(2), t0()).await.unwrap();

        // User 2 answers in time; user 1 never does.
        let guess = Coordinate::new(10.0, 20.0).unwrap();
        engine.submit_guess(b.round_id, uid(2), guess, at(30)).await.unwrap();

        assert_eq!(engine.expire_stale_rounds(at(121)).await, 1);
        assert_eq!(engine.expire_stale_rounds(at(121)).await, 0);

        assert_eq!(store.get_round(&a.round_id).await.unwrap().state, RoundState::Expired);
        assert!(matches!(
            store.get_round(&b.round_id).await.unwrap().state,
            RoundState::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_start_with_one_move() {
        let (store, engine) = engine_with(1, 3).await;
        let engine = Arc::new(engine);

        let mut tasks = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move { engine.start_round(uid(1), t0()).await }));
        }

        let mut ok = 0;
        let mut exhausted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => ok += 1,
                Err(EngineError::QuotaExhausted) => exhausted += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(exhausted, 1, "the loser must see the empty quota");
        assert_eq!(store.get_user(&uid(1)).await.unwrap().daily_moves_remaining, 0);
    }

    #[tokio::test]
    async fn test_single_active_round_under_concurrent_starts() {
        let (store, engine) = engine_with(8, 3).await;
        let engine = Arc::new(engine);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move { engine.start_round(uid(1), t0()).await }));
        }

        let mut ok = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1, "only one round may go active");
        // Exactly one move was paid for.
        assert_eq!(store.get_user(&uid(1)).await.unwrap().daily_moves_remaining, 7);
    }

    #[tokio::test]
    async fn test_submit_races_expiry_sweep_single_terminal() {
        let (store, engine) = engine_with(5, 3).await;
        let engine = Arc::new(engine);
        let started = engine.start_round(uid(1), t0()).await.unwrap();
        let round_id = started.round_id;

        // The guess arrives exactly at the deadline while the sweep already
        // considers the round stale - both race for the one transition.
        let submit = {
            let engine = engine.clone();
            tokio::spawn(async move {
                let guess = Coordinate::new(10.0, 20.0).unwrap();
                engine.submit_guess(round_id, uid(1), guess, at(120)).await
            })
        };
        let sweep = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.expire_stale_rounds(at(120)).await })
        };

        let submit_result = submit.await.unwrap();
        let swept = sweep.await.unwrap();

        let round = store.get_round(&round_id).await.unwrap();
        let user = store.get_user(&uid(1)).await.unwrap();
        match round.state {
            RoundState::Completed { .. } => {
                assert!(matches!(submit_result, Ok(GuessOutcome::Scored(_))));
                assert_eq!(swept, 0);
                assert_eq!(user.games_played, 1);
            }
            RoundState::Expired => {
                assert!(matches!(submit_result, Err(EngineError::RoundNotActive)));
                assert_eq!(swept, 1);
                assert_eq!(user.games_played, 0);
            }
            RoundState::Active => panic!("round must be terminal after the race"),
        }
        // The score, if any, was never overwritten by the expiry.
        assert_eq!(round.version, 1);
    }
}
