//! Daily Move Quota
//!
//! Per-user, per-day counter gating round creation. Reset-if-due always runs
//! before the decrement check inside one atomic store update, so a user
//! crossing their day boundary is refreshed before consumption and the
//! counter can never go negative under any interleaving.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::game::engine::EngineError;
use crate::store::{GameStore, StoreError, UserId};

/// Quota configuration.
#[derive(Debug, Clone, Copy)]
pub struct QuotaConfig {
    /// Rounds a user may start per calendar day.
    pub daily_moves: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_moves: crate::DEFAULT_DAILY_MOVES,
        }
    }
}

/// Tracks and gates each user's daily round allowance.
pub struct QuotaTracker {
    store: Arc<GameStore>,
    config: QuotaConfig,
}

impl QuotaTracker {
    /// Create a tracker over the shared store.
    pub fn new(store: Arc<GameStore>, config: QuotaConfig) -> Self {
        Self { store, config }
    }

    /// The configured daily allotment.
    pub fn daily_moves(&self) -> u32 {
        self.config.daily_moves
    }

    /// Consume one move, refreshing the quota first when the day boundary
    /// has passed. Returns the moves remaining after consumption, or
    /// `QuotaExhausted` when the counter is already zero.
    pub async fn try_consume_move(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u32, EngineError> {
        let daily = self.config.daily_moves;
        let consumed = self
            .store
            .update_user(&user_id, |user| {
                refill_if_due(user, now, daily);
                if user.daily_moves_remaining == 0 {
                    None
                } else {
                    user.daily_moves_remaining -= 1;
                    Some(user.daily_moves_remaining)
                }
            })
            .await
            .map_err(|e| map_user_store_error(e, user_id))?;

        match consumed {
            Some(remaining) => {
                debug!(user = %user_id, remaining, "move consumed");
                Ok(remaining)
            }
            None => Err(EngineError::QuotaExhausted),
        }
    }

    /// Refill the quota if the user's reset instant has passed. Idempotent
    /// within a day: a successful refill schedules the next reset strictly
    /// in the future. Returns true when a refill happened.
    pub async fn reset_if_due(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let daily = self.config.daily_moves;
        let refreshed = self
            .store
            .update_user(&user_id, |user| refill_if_due(user, now, daily))
            .await
            .map_err(|e| map_user_store_error(e, user_id))?;
        if refreshed {
            debug!(user = %user_id, "daily quota refreshed");
        }
        Ok(refreshed)
    }

    /// Grant extra moves (purchase-flow extension point). Saturating, so the
    /// `daily_moves_remaining >= 0` invariant holds for any caller. Returns
    /// the new remainder.
    pub async fn add_moves(&self, user_id: UserId, n: u32) -> Result<u32, EngineError> {
        let remaining = self
            .store
            .update_user(&user_id, |user| {
                user.daily_moves_remaining = user.daily_moves_remaining.saturating_add(n);
                user.daily_moves_remaining
            })
            .await
            .map_err(|e| map_user_store_error(e, user_id))?;
        info!(user = %user_id, granted = n, remaining, "moves granted");
        Ok(remaining)
    }

    /// Sweep every user, refilling those whose reset is due. The scheduler's
    /// entry point; safe at arbitrary and overlapping invocation times.
    /// Returns how many users were refreshed.
    pub async fn reset_all_due(&self, now: DateTime<Utc>) -> usize {
        let mut refreshed = 0;
        for user_id in self.store.user_ids().await {
            if matches!(self.reset_if_due(user_id, now).await, Ok(true)) {
                refreshed += 1;
            }
        }
        if refreshed > 0 {
            info!(refreshed, "daily quota sweep refreshed users");
        }
        refreshed
    }
}

/// In-place refill when due. Runs inside the store's atomic update.
fn refill_if_due(user: &mut crate::store::UserRecord, now: DateTime<Utc>, daily: u32) -> bool {
    if now < user.quota_reset_at {
        return false;
    }
    user.daily_moves_remaining = daily;
    user.quota_reset_at = next_reset_after(now, user.utc_offset_minutes);
    true
}

/// The next midnight in the user's reference timezone, as a UTC instant.
///
/// Fixed-offset arithmetic, so there is no DST ambiguity to resolve.
pub(crate) fn next_reset_after(now: DateTime<Utc>, utc_offset_minutes: i32) -> DateTime<Utc> {
    let offset_secs = i64::from(utc_offset_minutes) * 60;
    let local_secs = now.timestamp() + offset_secs;
    let local_day = local_secs.div_euclid(86_400);
    let next_midnight_utc = (local_day + 1) * 86_400 - offset_secs;
    DateTime::<Utc>::from_timestamp(next_midnight_utc, 0)
        .unwrap_or(now + chrono::Duration::days(1))
}

fn map_user_store_error(err: StoreError, user_id: UserId) -> EngineError {
    match err {
        StoreError::NotFound => EngineError::UnknownUser(user_id),
        other => EngineError::Store(other),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::store::UserRecord;

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    async fn tracker_with_user(daily: u32) -> (QuotaTracker, UserId) {
        let store = Arc::new(GameStore::new());
        let id = UserId::new([1; 16]);
        store
            .register_user(UserRecord::new(id, "tester".into(), daily, t(0, 0)))
            .await;
        (QuotaTracker::new(store, QuotaConfig { daily_moves: daily }), id)
    }

    #[test]
    fn test_next_reset_utc() {
        let now = t(15, 30);
        let reset = next_reset_after(now, 0);
        assert_eq!(reset, Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_next_reset_respects_offset() {
        // 21:00 UTC on June 1 is 00:00 June 2 in UTC+3; the next local
        // midnight is June 3, i.e. 21:00 UTC June 2.
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 21, 0, 0).unwrap();
        let reset = next_reset_after(now, 180);
        assert_eq!(reset, Utc.with_ymd_and_hms(2024, 6, 2, 21, 0, 0).unwrap());

        // Same instant in UTC-5 is still mid-evening June 1; next local
        // midnight is 05:00 UTC June 2.
        let reset_west = next_reset_after(now, -300);
        assert_eq!(reset_west, Utc.with_ymd_and_hms(2024, 6, 2, 5, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_consume_until_exhausted() {
        let (tracker, id) = tracker_with_user(3).await;
        let now = t(10, 0);

        assert_eq!(tracker.try_consume_move(id, now).await.unwrap(), 2);
        assert_eq!(tracker.try_consume_move(id, now).await.unwrap(), 1);
        assert_eq!(tracker.try_consume_move(id, now).await.unwrap(), 0);
        assert!(matches!(
            tracker.try_consume_move(id, now).await,
            Err(EngineError::QuotaExhausted)
        ));
    }

    #[tokio::test]
    async fn test_reset_is_idempotent_within_day() {
        let (tracker, id) = tracker_with_user(5).await;

        // First call performs the bootstrap refill and schedules midnight.
        assert!(tracker.reset_if_due(id, t(10, 0)).await.unwrap());
        assert!(!tracker.reset_if_due(id, t(10, 1)).await.unwrap());
        assert!(!tracker.reset_if_due(id, t(23, 59)).await.unwrap());
    }

    #[tokio::test]
    async fn test_day_boundary_refills_before_consumption() {
        let (tracker, id) = tracker_with_user(2).await;
        let day_one = t(10, 0);

        tracker.try_consume_move(id, day_one).await.unwrap();
        tracker.try_consume_move(id, day_one).await.unwrap();
        assert!(tracker.try_consume_move(id, day_one).await.is_err());

        // Next day: the same call refreshes, then consumes.
        let day_two = Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 1).unwrap();
        assert_eq!(tracker.try_consume_move(id, day_two).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_moves_extends_quota() {
        let (tracker, id) = tracker_with_user(1).await;
        let now = t(10, 0);

        tracker.try_consume_move(id, now).await.unwrap();
        assert!(tracker.try_consume_move(id, now).await.is_err());

        assert_eq!(tracker.add_moves(id, 2).await.unwrap(), 2);
        assert_eq!(tracker.try_consume_move(id, now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_user_fails_fast() {
        let (tracker, _) = tracker_with_user(1).await;
        let ghost = UserId::new([9; 16]);
        assert!(matches!(
            tracker.try_consume_move(ghost, t(10, 0)).await,
            Err(EngineError::UnknownUser(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_consumption_never_oversells() {
        let store = Arc::new(GameStore::new());
        let id = UserId::new([1; 16]);
        store
            .register_user(UserRecord::new(id, "tester".into(), 5, t(0, 0)))
            .await;
        let tracker = Arc::new(QuotaTracker::new(store.clone(), QuotaConfig { daily_moves: 5 }));

        let now = t(10, 0);
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let tracker = tracker.clone();
            tasks.push(tokio::spawn(async move {
                tracker.try_consume_move(id, now).await.is_ok()
            }));
        }

        let mut successes = 0;
        for task in tasks {
            if task.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 5);
        let user = store.get_user(&id).await.unwrap();
        assert_eq!(user.daily_moves_remaining, 0);
    }
}
