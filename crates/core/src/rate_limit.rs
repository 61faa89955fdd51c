//! Quota enforcement for rate-limited actions.
//!
//! Counters are keyed by `(counter, scope)` where the counter is either the action name
//! or a shared channel name (e.g. `sms`) so several actions draw from one budget.
//! A denied attempt never consumes quota.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Offset, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::action::{ActionName, RateLimitPolicy};
use crate::errors::{RateLimitDenial, StoreError};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub counter: String,
    pub scope: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowAlgorithm {
    #[default]
    Fixed,
    Sliding,
}

impl WindowAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Sliding => "sliding",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(Self::Fixed),
            "sliding" => Some(Self::Sliding),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub granted: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub denial: Option<RateLimitDenial>,
}

impl RateLimitDecision {
    pub fn granted(remaining: u32, reset_at: DateTime<Utc>) -> Self {
        Self { granted: true, remaining, reset_at, denial: None }
    }

    pub fn exhausted(reset_at: DateTime<Utc>) -> Self {
        Self { granted: false, remaining: 0, reset_at, denial: Some(RateLimitDenial::QuotaExhausted) }
    }
}

/// Start of the fixed window containing `now`, aligned to the Unix epoch.
pub fn fixed_window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window_secs = window.num_seconds().max(1);
    let start = now.timestamp() - now.timestamp().rem_euclid(window_secs);
    Utc.timestamp_opt(start, 0).single().unwrap_or(now)
}

/// Atomic check-and-increment over a counter.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn try_consume(
        &self,
        key: &CounterKey,
        max: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, StoreError>;
}

#[derive(Debug, Default)]
struct Counters {
    fixed: HashMap<CounterKey, (DateTime<Utc>, u32)>,
    sliding: HashMap<CounterKey, VecDeque<DateTime<Utc>>>,
}

#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    algorithm: WindowAlgorithm,
    counters: Mutex<Counters>,
}

impl InMemoryRateLimitStore {
    pub fn new(algorithm: WindowAlgorithm) -> Self {
        Self { algorithm, counters: Mutex::new(Counters::default()) }
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn try_consume(
        &self,
        key: &CounterKey,
        max: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, StoreError> {
        let mut counters = self.counters.lock().await;

        let decision = match self.algorithm {
            WindowAlgorithm::Fixed => {
                let current_start = fixed_window_start(now, window);
                let reset_at = current_start + window;
                let entry = counters.fixed.entry(key.clone()).or_insert((current_start, 0));
                if entry.0 != current_start {
                    *entry = (current_start, 0);
                }
                if entry.1 >= max {
                    RateLimitDecision::exhausted(reset_at)
                } else {
                    entry.1 += 1;
                    RateLimitDecision::granted(max - entry.1, reset_at)
                }
            }
            WindowAlgorithm::Sliding => {
                let hits = counters.sliding.entry(key.clone()).or_default();
                let horizon = now - window;
                while hits.front().is_some_and(|hit| *hit <= horizon) {
                    hits.pop_front();
                }
                if hits.len() as u32 >= max {
                    let oldest = hits.front().copied().unwrap_or(now);
                    RateLimitDecision::exhausted(oldest + window)
                } else {
                    hits.push_back(now);
                    let oldest = hits.front().copied().unwrap_or(now);
                    RateLimitDecision::granted(max - hits.len() as u32, oldest + window)
                }
            }
        };

        Ok(decision)
    }
}

/// Synchronous regulatory check evaluated before any quota is consumed.
pub trait CompliancePredicate: Send + Sync {
    fn name(&self) -> &str;

    fn allows(&self, recipient: &str, now: DateTime<Utc>) -> bool;

    fn next_allowed_at(&self, _now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        None
    }
}

/// Blocks outbound contact outside `[start_hour, end_hour)` in a fixed UTC offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuietHoursPredicate {
    name: String,
    utc_offset_hours: i32,
    start_hour: u32,
    end_hour: u32,
}

impl QuietHoursPredicate {
    pub const NAME: &'static str = "quiet_hours";

    pub fn new(utc_offset_hours: i32, start_hour: u32, end_hour: u32) -> Self {
        Self { name: Self::NAME.to_string(), utc_offset_hours, start_hour, end_hour }
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

impl CompliancePredicate for QuietHoursPredicate {
    fn name(&self) -> &str {
        &self.name
    }

    fn allows(&self, _recipient: &str, now: DateTime<Utc>) -> bool {
        let hour = now.with_timezone(&self.offset()).hour();
        hour >= self.start_hour && hour < self.end_hour
    }

    fn next_allowed_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let offset = self.offset();
        let local = now.with_timezone(&offset);
        let day = if local.hour() >= self.end_hour {
            local.date_naive().succ_opt()?
        } else {
            local.date_naive()
        };
        let opens = day.and_hms_opt(self.start_hour, 0, 0)?;
        offset.from_local_datetime(&opens).single().map(|at| at.with_timezone(&Utc))
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    predicates: HashMap<String, Arc<dyn CompliancePredicate>>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store, predicates: HashMap::new() }
    }

    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: CompliancePredicate + 'static,
    {
        self.predicates.insert(predicate.name().to_string(), Arc::new(predicate));
        self
    }

    pub fn has_predicate(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Evaluates the compliance predicate (if any) for every recipient, then the quota for `scope`.
    pub async fn try_consume(
        &self,
        policy: &RateLimitPolicy,
        action: &ActionName,
        scope: &str,
        recipients: &[String],
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, StoreError> {
        let window = Duration::seconds(policy.window_secs);

        if let Some(name) = &policy.compliance {
            let Some(predicate) = self.predicates.get(name) else {
                return Err(StoreError::Persistence(format!(
                    "compliance predicate `{name}` is not registered"
                )));
            };
            if let Some(recipient) = recipients.iter().find(|recipient| !predicate.allows(recipient, now)) {
                let reset_at = predicate.next_allowed_at(now).unwrap_or(now + window);
                warn!(
                    event_name = "rate_limit.compliance_denied",
                    action = %action,
                    predicate = %name,
                    scope = %scope,
                    recipient = %recipient,
                    reset_at = %reset_at,
                    "compliance window closed"
                );
                return Ok(RateLimitDecision {
                    granted: false,
                    remaining: 0,
                    reset_at,
                    denial: Some(RateLimitDenial::ComplianceWindow { predicate: name.clone() }),
                });
            }
        }

        let key = CounterKey { counter: policy.counter_name(action), scope: scope.to_string() };
        let decision = self.store.try_consume(&key, policy.max, window, now).await?;
        if decision.granted {
            debug!(
                event_name = "rate_limit.granted",
                counter = %key.counter,
                scope = %key.scope,
                remaining = decision.remaining,
                "quota consumed"
            );
        } else {
            warn!(
                event_name = "rate_limit.denied",
                counter = %key.counter,
                scope = %key.scope,
                limit = policy.max,
                reset_at = %decision.reset_at,
                "rate limit exceeded"
            );
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::{
        fixed_window_start, CompliancePredicate, CounterKey, InMemoryRateLimitStore,
        QuietHoursPredicate, RateLimitStore, RateLimiter, WindowAlgorithm,
    };
    use crate::domain::action::{ActionName, RateLimitPolicy};
    use crate::errors::RateLimitDenial;

    fn at(hour: u32, minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).single().expect("timestamp")
    }

    fn key(scope: &str) -> CounterKey {
        CounterKey { counter: "sendCampaign".to_string(), scope: scope.to_string() }
    }

    #[tokio::test]
    async fn fixed_window_denies_after_max_and_resets_on_boundary() {
        let store = InMemoryRateLimitStore::new(WindowAlgorithm::Fixed);
        let window = Duration::hours(1);

        let first = store.try_consume(&key("dot-1"), 1, window, at(15, 10)).await.expect("ok");
        assert!(first.granted);
        assert_eq!(first.remaining, 0);
        assert_eq!(first.reset_at, at(16, 0));

        let second = store.try_consume(&key("dot-1"), 1, window, at(15, 50)).await.expect("ok");
        assert!(!second.granted);
        assert_eq!(second.denial, Some(RateLimitDenial::QuotaExhausted));

        let other_scope = store.try_consume(&key("dot-2"), 1, window, at(15, 50)).await.expect("ok");
        assert!(other_scope.granted);

        let next_window = store.try_consume(&key("dot-1"), 1, window, at(16, 0)).await.expect("ok");
        assert!(next_window.granted);
    }

    #[tokio::test]
    async fn sliding_window_counts_trailing_interval() {
        let store = InMemoryRateLimitStore::new(WindowAlgorithm::Sliding);
        let window = Duration::hours(1);

        assert!(store.try_consume(&key("u"), 2, window, at(15, 10)).await.expect("ok").granted);
        assert!(store.try_consume(&key("u"), 2, window, at(15, 40)).await.expect("ok").granted);

        let denied = store.try_consume(&key("u"), 2, window, at(16, 5)).await.expect("ok");
        assert!(!denied.granted);
        assert_eq!(denied.reset_at, at(16, 10));

        assert!(store.try_consume(&key("u"), 2, window, at(16, 11)).await.expect("ok").granted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_never_exceed_max() {
        let store = Arc::new(InMemoryRateLimitStore::new(WindowAlgorithm::Fixed));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_consume(&key("shared"), 5, Duration::hours(1), at(15, 0)).await
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.expect("join").expect("consume").granted {
                granted += 1;
            }
        }
        assert_eq!(granted, 5);
    }

    #[test]
    fn window_start_aligns_to_epoch_multiples() {
        assert_eq!(fixed_window_start(at(15, 59), Duration::hours(1)), at(15, 0));
        assert_eq!(fixed_window_start(at(15, 59), Duration::minutes(15)), at(15, 45));
    }

    #[test]
    fn quiet_hours_follow_local_offset() {
        let predicate = QuietHoursPredicate::new(-6, 9, 20);

        // 15:00 UTC is 09:00 at UTC-6.
        assert!(predicate.allows("+15125550100", at(15, 0)));
        assert!(!predicate.allows("+15125550100", at(14, 59)));
        // 02:00 UTC is 20:00 the previous local day.
        let late = Utc.with_ymd_and_hms(2026, 3, 3, 2, 0, 0).single().expect("timestamp");
        assert!(!predicate.allows("+15125550100", late));
        assert_eq!(
            predicate.next_allowed_at(late),
            Some(Utc.with_ymd_and_hms(2026, 3, 3, 15, 0, 0).single().expect("timestamp"))
        );
    }

    #[tokio::test]
    async fn compliance_denial_consumes_no_quota() {
        let store = Arc::new(InMemoryRateLimitStore::new(WindowAlgorithm::Fixed));
        let limiter =
            RateLimiter::new(store.clone()).with_predicate(QuietHoursPredicate::new(-6, 9, 20));
        let policy = RateLimitPolicy::per_actor(1, 3600)
            .on_channel("sms")
            .with_compliance(QuietHoursPredicate::NAME, "phone");
        let action = ActionName("sendSms".to_string());
        let phone = vec!["+15125550100".to_string()];

        let night =
            limiter.try_consume(&policy, &action, "driver-1", &phone, at(4, 0)).await.expect("ok");
        assert!(!night.granted);
        assert!(matches!(night.denial, Some(RateLimitDenial::ComplianceWindow { .. })));

        let day =
            limiter.try_consume(&policy, &action, "driver-1", &phone, at(16, 0)).await.expect("ok");
        assert!(day.granted);
    }

    struct OptOutList(Vec<&'static str>);

    impl CompliancePredicate for OptOutList {
        fn name(&self) -> &str {
            "opt_out"
        }

        fn allows(&self, recipient: &str, _now: chrono::DateTime<Utc>) -> bool {
            !self.0.iter().any(|blocked| *blocked == recipient)
        }
    }

    #[tokio::test]
    async fn compliance_checks_each_recipient_not_the_quota_scope() {
        let store = Arc::new(InMemoryRateLimitStore::default());
        let limiter = RateLimiter::new(store).with_predicate(OptOutList(vec!["+15125550199"]));
        let policy = RateLimitPolicy::per_actor(5, 3600).with_compliance("opt_out", "recipientIds");
        let action = ActionName("createSmsCampaign".to_string());

        let clean = vec!["+15125550100".to_string(), "+15125550101".to_string()];
        let allowed =
            limiter.try_consume(&policy, &action, "+15125550199", &clean, at(15, 0)).await.expect("ok");
        assert!(allowed.granted, "the quota scope is never treated as a recipient");

        let mixed = vec!["+15125550100".to_string(), "+15125550199".to_string()];
        let denied = limiter.try_consume(&policy, &action, "rec-1", &mixed, at(15, 0)).await.expect("ok");
        assert!(!denied.granted);
        assert!(matches!(denied.denial, Some(RateLimitDenial::ComplianceWindow { ref predicate }) if predicate == "opt_out"));
    }

    #[tokio::test]
    async fn shared_channel_counts_across_actions() {
        let limiter = RateLimiter::new(Arc::new(InMemoryRateLimitStore::default()));
        let policy = RateLimitPolicy::per_actor(1, 3600).on_channel("sms");

        let first = limiter
            .try_consume(&policy, &ActionName("sendSms".to_string()), "r-1", &[], at(15, 0))
            .await
            .expect("ok");
        let second = limiter
            .try_consume(&policy, &ActionName("sendTemplateSms".to_string()), "r-1", &[], at(15, 1))
            .await
            .expect("ok");

        assert!(first.granted);
        assert!(!second.granted);
    }
}
