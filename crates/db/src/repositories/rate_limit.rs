use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use tracing::debug;

use actiongate_core::errors::StoreError;
use actiongate_core::rate_limit::{
    fixed_window_start, CounterKey, RateLimitDecision, RateLimitStore, WindowAlgorithm,
};

use super::{db_error, decode_ts, encode_ts};
use crate::DbPool;

/// Shared quota counters. Every check-and-increment is a single conditional write so that
/// concurrent dispatchers never grant more than `max` calls per window.
pub struct SqlRateLimitStore {
    pool: DbPool,
    algorithm: WindowAlgorithm,
}

impl SqlRateLimitStore {
    pub fn new(pool: DbPool, algorithm: WindowAlgorithm) -> Self {
        Self { pool, algorithm }
    }

    async fn consume_fixed(
        &self,
        key: &CounterKey,
        max: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, StoreError> {
        let window_start = fixed_window_start(now, window);
        let reset_at = window_start + window;

        let row = sqlx::query(
            "INSERT INTO rate_limit_counters (counter, scope, window_start, hit_count)
             VALUES (?, ?, ?, 1)
             ON CONFLICT(counter, scope) DO UPDATE SET
                 hit_count = CASE
                     WHEN rate_limit_counters.window_start = excluded.window_start
                         THEN rate_limit_counters.hit_count + 1
                     ELSE 1
                 END,
                 window_start = excluded.window_start
             WHERE rate_limit_counters.window_start <> excluded.window_start
                OR rate_limit_counters.hit_count < ?
             RETURNING hit_count",
        )
        .bind(&key.counter)
        .bind(&key.scope)
        .bind(encode_ts(window_start))
        .bind(i64::from(max))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        match row {
            Some(row) => {
                let used: i64 = row.try_get("hit_count").map_err(db_error)?;
                let used = u32::try_from(used).unwrap_or(max);
                Ok(RateLimitDecision::granted(max.saturating_sub(used), reset_at))
            }
            None => {
                debug!(
                    event_name = "rate_limit.counter.exhausted",
                    counter = %key.counter,
                    scope = %key.scope,
                    algorithm = "fixed",
                    "quota exhausted for window"
                );
                Ok(RateLimitDecision::exhausted(reset_at))
            }
        }
    }

    async fn consume_sliding(
        &self,
        key: &CounterKey,
        max: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, StoreError> {
        let horizon = now - window;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // The delete takes the write lock before the count is read.
        sqlx::query("DELETE FROM rate_limit_hits WHERE counter = ? AND scope = ? AND hit_at <= ?")
            .bind(&key.counter)
            .bind(&key.scope)
            .bind(encode_ts(horizon))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let inserted = sqlx::query(
            "INSERT INTO rate_limit_hits (counter, scope, hit_at)
             SELECT ?, ?, ?
             WHERE (SELECT COUNT(*) FROM rate_limit_hits WHERE counter = ? AND scope = ?) < ?",
        )
        .bind(&key.counter)
        .bind(&key.scope)
        .bind(encode_ts(now))
        .bind(&key.counter)
        .bind(&key.scope)
        .bind(i64::from(max))
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let summary = sqlx::query(
            "SELECT COUNT(*) AS hits, MIN(hit_at) AS oldest
             FROM rate_limit_hits WHERE counter = ? AND scope = ?",
        )
        .bind(&key.counter)
        .bind(&key.scope)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        let hits: i64 = summary.try_get("hits").map_err(db_error)?;
        let oldest: Option<String> = summary.try_get("oldest").map_err(db_error)?;
        let oldest = oldest.as_deref().map(decode_ts).transpose()?.unwrap_or(now);
        let reset_at = oldest + window;

        if inserted.rows_affected() == 0 {
            debug!(
                event_name = "rate_limit.counter.exhausted",
                counter = %key.counter,
                scope = %key.scope,
                algorithm = "sliding",
                "quota exhausted for window"
            );
            return Ok(RateLimitDecision::exhausted(reset_at));
        }
        let used = u32::try_from(hits).unwrap_or(max);
        Ok(RateLimitDecision::granted(max.saturating_sub(used), reset_at))
    }
}

#[async_trait]
impl RateLimitStore for SqlRateLimitStore {
    async fn try_consume(
        &self,
        key: &CounterKey,
        max: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, StoreError> {
        match self.algorithm {
            WindowAlgorithm::Fixed => self.consume_fixed(key, max, window, now).await,
            WindowAlgorithm::Sliding => self.consume_sliding(key, max, window, now).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use actiongate_core::rate_limit::{CounterKey, RateLimitStore, WindowAlgorithm};

    use super::SqlRateLimitStore;
    use crate::repositories::test_support::setup;
    use crate::{connect_with_settings, migrations, DbPool};

    fn key(scope: &str) -> CounterKey {
        CounterKey { counter: "sendCampaignMessage".to_string(), scope: scope.to_string() }
    }

    #[tokio::test]
    async fn fixed_window_grants_up_to_max_then_resets() {
        let store = SqlRateLimitStore::new(setup().await, WindowAlgorithm::Fixed);
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 15, 10, 0).single().expect("timestamp");
        let window = Duration::hours(1);

        let first = store.try_consume(&key("DOT-1"), 2, window, now).await.expect("first");
        let second = store.try_consume(&key("DOT-1"), 2, window, now).await.expect("second");
        let third = store.try_consume(&key("DOT-1"), 2, window, now).await.expect("third");

        assert!(first.granted && second.granted);
        assert_eq!(second.remaining, 0);
        assert!(!third.granted);
        assert_eq!(
            third.reset_at,
            Utc.with_ymd_and_hms(2026, 3, 2, 16, 0, 0).single().expect("timestamp")
        );

        let other_scope = store.try_consume(&key("DOT-2"), 2, window, now).await.expect("other");
        assert!(other_scope.granted, "scopes have independent counters");

        let next_window = store
            .try_consume(&key("DOT-1"), 2, window, now + Duration::hours(1))
            .await
            .expect("next window");
        assert!(next_window.granted);
        assert_eq!(next_window.remaining, 1);
    }

    #[tokio::test]
    async fn sliding_window_frees_quota_as_hits_age_out() {
        let store = SqlRateLimitStore::new(setup().await, WindowAlgorithm::Sliding);
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).single().expect("timestamp");
        let window = Duration::minutes(10);

        assert!(store.try_consume(&key("u-1"), 2, window, start).await.expect("one").granted);
        let second = store
            .try_consume(&key("u-1"), 2, window, start + Duration::minutes(5))
            .await
            .expect("two");
        assert!(second.granted);

        let denied = store
            .try_consume(&key("u-1"), 2, window, start + Duration::minutes(9))
            .await
            .expect("three");
        assert!(!denied.granted);
        assert_eq!(denied.reset_at, start + window);

        let freed = store
            .try_consume(&key("u-1"), 2, window, start + Duration::minutes(11))
            .await
            .expect("after first hit aged out");
        assert!(freed.granted);
        assert_eq!(freed.remaining, 0);
    }

    async fn file_pool(dir: &tempfile::TempDir) -> DbPool {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("limits.db").display());
        let pool = connect_with_settings(&url, 8, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_on_a_shared_file_never_exceed_max() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 15, 10, 0).single().expect("timestamp");

        for algorithm in [WindowAlgorithm::Fixed, WindowAlgorithm::Sliding] {
            let dir = tempfile::tempdir().expect("temp dir");
            let pool = file_pool(&dir).await;
            let store = Arc::new(SqlRateLimitStore::new(pool.clone(), algorithm));

            let mut tasks = Vec::new();
            for _ in 0..21 {
                let store = store.clone();
                tasks.push(tokio::spawn(async move {
                    store.try_consume(&key("DOT-9"), 5, Duration::hours(1), now).await
                }));
            }

            let mut granted = 0;
            for task in tasks {
                if task.await.expect("join").expect("consume").granted {
                    granted += 1;
                }
            }
            assert_eq!(granted, 5, "{algorithm:?} granted more than the quota");

            let after = store.try_consume(&key("DOT-9"), 5, Duration::hours(1), now).await.expect("after");
            assert!(!after.granted);
            pool.close().await;
        }
    }
}
