//! Leaderboard & Location Aggregator
//!
//! Derives ranked player standings and per-location difficulty statistics
//! from completed rounds. Updates are incremental running means; the caller
//! (the round state machine) guarantees exactly one application per round
//! via its single-terminal-transition invariant. `recompute_all` rebuilds
//! everything from round history for reconciliation and bootstrap.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::game::engine::EngineError;
use crate::game::round::{RoundRecord, RoundState};
use crate::store::{GameStore, LocationId, StoreError, UserId};

/// Default leaderboard page size.
pub const DEFAULT_PAGE_SIZE: usize = 10;

// =============================================================================
// LEADERBOARD TYPES
// =============================================================================

/// Metric a leaderboard page is ranked by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Cumulative score across all completed rounds.
    #[default]
    TotalScore,
    /// Number of completed rounds.
    GamesPlayed,
    /// `total_score / games_played`; users with zero games are excluded.
    AvgScore,
}

/// One ranked leaderboard row. Derived, never stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Ranked user.
    pub user_id: UserId,
    /// Name to render.
    pub display_name: String,
    /// 1-based global rank under the requested sort key.
    pub rank: u32,
    /// Cumulative score.
    pub total_score: f64,
    /// Completed rounds.
    pub games_played: u32,
    /// Mean score per game (0 when no games were played).
    pub avg_score: f64,
}

// =============================================================================
// AGGREGATOR
// =============================================================================

/// Running accumulator used by the full rebuild.
#[derive(Default)]
struct Totals {
    games: u32,
    total_score: f64,
    sum_error_m: f64,
    sum_time_secs: f64,
}

impl Totals {
    fn push(&mut self, score: f64, error_m: f64, time_secs: f64) {
        self.games += 1;
        self.total_score += score;
        self.sum_error_m += error_m;
        self.sum_time_secs += time_secs;
    }

    fn avg_error_m(&self) -> f64 {
        if self.games == 0 { 0.0 } else { self.sum_error_m / f64::from(self.games) }
    }

    fn avg_time_secs(&self) -> f64 {
        if self.games == 0 { 0.0 } else { self.sum_time_secs / f64::from(self.games) }
    }
}

/// Maintains user and location statistics derived from round history.
pub struct Aggregator {
    store: Arc<GameStore>,
}

impl Aggregator {
    /// Create an aggregator over the shared store.
    pub fn new(store: Arc<GameStore>) -> Self {
        Self { store }
    }

    /// Fold one completed round into the owner's and the location's running
    /// aggregates. Rounds in any other state are ignored (expired rounds
    /// carry no guess to average).
    pub async fn on_round_completed(&self, round: &RoundRecord) -> Result<(), EngineError> {
        let RoundState::Completed { distance_error_m, score, submitted_at, .. } = round.state
        else {
            warn!(round = %round.id, state = round.state.label(), "aggregator skipped non-completed round");
            return Ok(());
        };
        let elapsed_secs = round.elapsed_secs(submitted_at);

        self.store
            .update_user(&round.user_id, |user| {
                user.games_played += 1;
                user.total_score += score;
                let n = f64::from(user.games_played);
                user.avg_error_m += (distance_error_m - user.avg_error_m) / n;
                user.avg_time_secs += (elapsed_secs - user.avg_time_secs) / n;
            })
            .await
            .map_err(|e| match e {
                StoreError::NotFound => EngineError::UnknownUser(round.user_id),
                other => EngineError::Store(other),
            })?;

        self.store
            .update_location(&round.location_id, |location| {
                location.times_played += 1;
                let n = f64::from(location.times_played);
                location.avg_error_m += (distance_error_m - location.avg_error_m) / n;
                location.avg_time_secs += (elapsed_secs - location.avg_time_secs) / n;
            })
            .await
            .map_err(EngineError::Store)?;

        Ok(())
    }

    /// A stable page of leaderboard entries.
    ///
    /// Descending by the sort key, ties broken by user id ascending so two
    /// requests for the same page always agree. Ranks are global, not
    /// per-page.
    pub async fn get_leaderboard(
        &self,
        key: SortKey,
        page: usize,
        page_size: usize,
    ) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<LeaderboardEntry> = self
            .store
            .all_users()
            .await
            .into_iter()
            .filter(|u| key != SortKey::AvgScore || u.games_played > 0)
            .map(|u| {
                let avg_score = if u.games_played == 0 {
                    0.0
                } else {
                    u.total_score / f64::from(u.games_played)
                };
                LeaderboardEntry {
                    user_id: u.id,
                    display_name: u.display_name,
                    rank: 0,
                    total_score: u.total_score,
                    games_played: u.games_played,
                    avg_score,
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            let ordering = match key {
                SortKey::TotalScore => b.total_score.total_cmp(&a.total_score),
                SortKey::GamesPlayed => b.games_played.cmp(&a.games_played),
                SortKey::AvgScore => b.avg_score.total_cmp(&a.avg_score),
            };
            ordering.then_with(|| a.user_id.cmp(&b.user_id))
        });

        for (i, row) in rows.iter_mut().enumerate() {
            row.rank = (i + 1) as u32;
        }

        let page_size = page_size.max(1);
        rows.into_iter().skip(page * page_size).take(page_size).collect()
    }

    /// Rebuild every user and location aggregate from the complete history
    /// of completed rounds. Idempotent; numerically equivalent to the
    /// incremental path within floating tolerance. Quota fields and display
    /// names are untouched. Returns the number of rounds folded.
    pub async fn recompute_all(&self) -> usize {
        let rounds = self.store.completed_rounds().await;

        let mut by_user: BTreeMap<UserId, Totals> = BTreeMap::new();
        let mut by_location: BTreeMap<LocationId, Totals> = BTreeMap::new();

        for round in &rounds {
            let RoundState::Completed { distance_error_m, score, submitted_at, .. } = round.state
            else {
                continue;
            };
            let elapsed_secs = round.elapsed_secs(submitted_at);
            by_user.entry(round.user_id).or_default().push(score, distance_error_m, elapsed_secs);
            by_location
                .entry(round.location_id)
                .or_default()
                .push(score, distance_error_m, elapsed_secs);
        }

        let empty = Totals::default();
        for user_id in self.store.user_ids().await {
            let totals = by_user.get(&user_id).unwrap_or(&empty);
            let result = self
                .store
                .update_user(&user_id, |user| {
                    user.games_played = totals.games;
                    user.total_score = totals.total_score;
                    user.avg_error_m = totals.avg_error_m();
                    user.avg_time_secs = totals.avg_time_secs();
                })
                .await;
            if result.is_err() {
                warn!(user = %user_id, "user vanished during recompute");
            }
        }

        for location in self.store.all_locations().await {
            let totals = by_location.get(&location.id).unwrap_or(&empty);
            let result = self
                .store
                .update_location(&location.id, |loc| {
                    loc.times_played = totals.games;
                    loc.avg_error_m = totals.avg_error_m();
                    loc.avg_time_secs = totals.avg_time_secs();
                })
                .await;
            if result.is_err() {
                warn!(location = location.id, "location vanished during recompute");
            }
        }

        info!(
            rounds = rounds.len(),
            users = by_user.len(),
            locations = by_location.len(),
            "aggregates recomputed from round history"
        );
        rounds.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
