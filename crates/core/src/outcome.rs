//! Post-run evaluation and aggregate outcome statistics.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::action::ActionName;
use crate::domain::gate::GateState;
use crate::domain::outcome::{
    ActionEffectiveness, ActionRegression, ObjectiveMet, OutcomeFilter, OutcomeRecord,
    OutcomeStats,
};
use crate::domain::run::{RunId, RunStatus, StepStatus};
use crate::errors::StoreError;
use crate::ledger::{RunLedger, RunTrace};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OutcomeError {
    #[error("run {0} has not completed")]
    RunNotComplete(RunId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait OutcomeRepository: Send + Sync {
    /// Stores `record` unless one already exists for the run; returns whichever is stored.
    async fn insert_if_absent(&self, record: OutcomeRecord) -> Result<OutcomeRecord, StoreError>;

    async fn find(&self, run_id: &RunId) -> Result<Option<OutcomeRecord>, StoreError>;

    async fn list(&self, filter: &OutcomeFilter) -> Result<Vec<OutcomeRecord>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryOutcomeRepository {
    records: RwLock<HashMap<RunId, OutcomeRecord>>,
}

#[async_trait]
impl OutcomeRepository for InMemoryOutcomeRepository {
    async fn insert_if_absent(&self, record: OutcomeRecord) -> Result<OutcomeRecord, StoreError> {
        let mut records = self.records.write().await;
        Ok(records.entry(record.run_id.clone()).or_insert(record).clone())
    }

    async fn find(&self, run_id: &RunId) -> Result<Option<OutcomeRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(run_id).cloned())
    }

    async fn list(&self, filter: &OutcomeFilter) -> Result<Vec<OutcomeRecord>, StoreError> {
        let records = self.records.read().await;
        let mut matching: Vec<OutcomeRecord> =
            records.values().filter(|record| filter.matches(record)).cloned().collect();
        matching.sort_by(|left, right| left.evaluated_at.cmp(&right.evaluated_at));
        Ok(matching)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegressionConfig {
    /// Minimum drop, in percentage points, reported as a regression
    pub threshold_points: f64,
    /// Both windows need at least this many finished steps for an action
    pub min_samples: u32,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self { threshold_points: 15.0, min_samples: 3 }
    }
}

pub struct OutcomeEvaluator {
    ledger: Arc<dyn RunLedger>,
    outcomes: Arc<dyn OutcomeRepository>,
    regression: RegressionConfig,
}

impl OutcomeEvaluator {
    pub fn new(ledger: Arc<dyn RunLedger>, outcomes: Arc<dyn OutcomeRepository>) -> Self {
        Self { ledger, outcomes, regression: RegressionConfig::default() }
    }

    pub fn with_regression_config(mut self, regression: RegressionConfig) -> Self {
        self.regression = regression;
        self
    }

    /// Scores a completed run once; later calls return the stored record unchanged.
    /// Open and aborted runs are refused with `RunNotComplete`.
    pub async fn evaluate_run(
        &self,
        run_id: &RunId,
        now: DateTime<Utc>,
    ) -> Result<OutcomeRecord, OutcomeError> {
        if let Some(existing) = self.outcomes.find(run_id).await? {
            return Ok(existing);
        }

        let trace = self.ledger.run_trace(run_id).await?;
        if trace.run.status != RunStatus::Completed {
            return Err(OutcomeError::RunNotComplete(run_id.clone()));
        }

        let record = score_trace(&trace, now);
        let stored = self.outcomes.insert_if_absent(record).await?;
        info!(
            event_name = "outcome.run.evaluated",
            run_id = %stored.run_id,
            quality_score = stored.quality_score,
            objective_met = stored.objective_met.as_str(),
            "run outcome recorded"
        );
        Ok(stored)
    }

    pub async fn get_outcome_stats(&self, filter: &OutcomeFilter) -> Result<OutcomeStats, StoreError> {
        let records = self.outcomes.list(filter).await?;
        Ok(aggregate(&records))
    }

    pub async fn action_effectiveness(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ActionEffectiveness>, StoreError> {
        let steps = self.ledger.list_steps_between(since, until).await?;
        let mut tallies: BTreeMap<ActionName, (u32, u32)> = BTreeMap::new();
        for step in steps {
            let tally = tallies.entry(step.action.clone()).or_default();
            match step.status {
                StepStatus::Succeeded => {
                    tally.0 += 1;
                    tally.1 += 1;
                }
                StepStatus::Failed => tally.0 += 1,
                _ => {}
            }
        }

        Ok(tallies
            .into_iter()
            .filter(|(_, (attempts, _))| *attempts > 0)
            .map(|(action, (attempts, succeeded))| ActionEffectiveness {
                action,
                attempts,
                succeeded,
                success_rate: percentage(succeeded, attempts),
            })
            .collect())
    }

    /// Compares the window ending at `now` with the window before it.
    pub async fn detect_action_regressions(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<ActionRegression>, StoreError> {
        let current = self.action_effectiveness(now - window, now).await?;
        let baseline: HashMap<ActionName, ActionEffectiveness> = self
            .action_effectiveness(now - window - window, now - window)
            .await?
            .into_iter()
            .map(|entry| (entry.action.clone(), entry))
            .collect();

        let mut regressions = Vec::new();
        for entry in current {
            let Some(previous) = baseline.get(&entry.action) else {
                continue;
            };
            if entry.attempts < self.regression.min_samples
                || previous.attempts < self.regression.min_samples
            {
                continue;
            }
            let drop = previous.success_rate - entry.success_rate;
            if drop > self.regression.threshold_points {
                warn!(
                    event_name = "outcome.action.regression",
                    action = %entry.action,
                    baseline_rate = previous.success_rate,
                    current_rate = entry.success_rate,
                    "action success rate dropped"
                );
                regressions.push(ActionRegression {
                    action: entry.action,
                    baseline_rate: previous.success_rate,
                    current_rate: entry.success_rate,
                    drop,
                });
            }
        }
        Ok(regressions)
    }
}

/// Succeeded steps count fully, denied or still-gated steps count half, failures count zero.
pub fn score_trace(trace: &RunTrace, now: DateTime<Utc>) -> OutcomeRecord {
    let mut succeeded = 0u32;
    let mut failed = 0u32;
    let mut denied = 0u32;
    let mut waiting = 0u32;
    let mut attempts = 0u32;
    for step in &trace.steps {
        attempts += step.attempts;
        match step.status {
            StepStatus::Succeeded => succeeded += 1,
            StepStatus::Failed => failed += 1,
            StepStatus::Denied => denied += 1,
            StepStatus::AwaitingApproval | StepStatus::Started => waiting += 1,
        }
    }

    let count_gates =
        |state: GateState| trace.gates.iter().filter(|gate| gate.state == state).count() as u32;
    let total = trace.steps.len() as u32;
    let quality_score = if total == 0 {
        100
    } else {
        let weighted = f64::from(succeeded) + 0.5 * f64::from(denied + waiting);
        (100.0 * weighted / f64::from(total)).round().clamp(0.0, 100.0) as u8
    };

    OutcomeRecord {
        run_id: trace.run.run_id.clone(),
        role: trace.run.actor.role,
        total_steps: total,
        succeeded_steps: succeeded,
        failed_steps: failed,
        denied_steps: denied,
        gates_approved: count_gates(GateState::Approved),
        gates_rejected: count_gates(GateState::Rejected),
        gates_expired: count_gates(GateState::Expired),
        total_attempts: attempts,
        quality_score,
        objective_met: ObjectiveMet::from_score(quality_score),
        latency_ms: trace.run.latency_ms(),
        total_tokens: trace.run.usage.total_tokens,
        total_cost_usd: trace.run.usage.total_cost_usd,
        evaluated_at: now,
    }
}

pub fn aggregate(records: &[OutcomeRecord]) -> OutcomeStats {
    if records.is_empty() {
        return OutcomeStats::default();
    }

    let total = records.len() as u32;
    let count = |objective: ObjectiveMet| {
        records.iter().filter(|record| record.objective_met == objective).count() as u32
    };
    let quality_sum: u32 = records.iter().map(|record| u32::from(record.quality_score)).sum();
    let resolved_gates: u32 = records
        .iter()
        .map(|record| record.gates_approved + record.gates_rejected + record.gates_expired)
        .sum();
    let refused_gates: u32 =
        records.iter().map(|record| record.gates_rejected + record.gates_expired).sum();

    OutcomeStats {
        total_runs: total,
        avg_quality_score: round_two(f64::from(quality_sum) / f64::from(total)),
        success_rate: percentage(count(ObjectiveMet::Yes), total),
        partial_rate: percentage(count(ObjectiveMet::Partial), total),
        failure_rate: percentage(count(ObjectiveMet::No), total),
        approval_rejection_rate: percentage(refused_gates, resolved_gates),
        total_tokens: records.iter().map(|record| record.total_tokens).sum(),
        total_cost_usd: records.iter().map(|record| record.total_cost_usd).sum::<Decimal>(),
    }
}

fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_two(100.0 * f64::from(part) / f64::from(whole))
}

fn round_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{InMemoryOutcomeRepository, OutcomeError, OutcomeEvaluator};
    use crate::domain::action::{ActionName, ActorRole};
    use crate::domain::outcome::{ObjectiveMet, OutcomeFilter};
    use crate::domain::run::{Actor, NewRun, RunStatus, RunUsage, StepStatus, StepUpdate};
    use crate::ledger::{InMemoryRunLedger, RunLedger};

    async fn finished_step(
        ledger: &InMemoryRunLedger,
        run_id: &crate::domain::run::RunId,
        action: &str,
        status: StepStatus,
        at: chrono::DateTime<Utc>,
    ) {
        let step = ledger
            .log_step(run_id, &ActionName(action.to_string()), &json!({}), StepStatus::Started, at)
            .await
            .expect("step");
        ledger
            .update_step(&step.step_id, StepStatus::Started, StepUpdate::to(status).with_attempts(1), at)
            .await
            .expect("finish");
    }

    #[tokio::test]
    async fn evaluation_requires_closed_run_and_is_written_once() {
        let ledger = Arc::new(InMemoryRunLedger::new());
        let evaluator =
            OutcomeEvaluator::new(ledger.clone(), Arc::new(InMemoryOutcomeRepository::default()));
        let now = Utc::now();
        let actor = Actor::new("driver-1", ActorRole::Driver);
        let run = ledger.start_run(&actor, NewRun::default(), now).await.expect("run");

        finished_step(&ledger, &run.run_id, "searchJobs", StepStatus::Succeeded, now).await;
        finished_step(&ledger, &run.run_id, "saveJob", StepStatus::Succeeded, now).await;
        finished_step(&ledger, &run.run_id, "applyToJob", StepStatus::Denied, now).await;
        finished_step(&ledger, &run.run_id, "uploadDoc", StepStatus::Failed, now).await;

        let early = evaluator.evaluate_run(&run.run_id, now).await;
        assert_eq!(early, Err(OutcomeError::RunNotComplete(run.run_id.clone())));

        let usage = RunUsage { total_tokens: 900, total_cost_usd: Decimal::new(12, 3) };
        ledger.complete_run(&run.run_id, RunStatus::Completed, usage, now).await.expect("complete");

        let record = evaluator.evaluate_run(&run.run_id, now).await.expect("evaluate");
        // (2 + 0.5) / 4 = 62.5 -> 63
        assert_eq!(record.quality_score, 63);
        assert_eq!(record.objective_met, ObjectiveMet::Partial);
        assert_eq!(record.total_steps, 4);
        assert_eq!(record.total_tokens, 900);

        let again = evaluator.evaluate_run(&run.run_id, now + Duration::hours(1)).await.expect("again");
        assert_eq!(again.evaluated_at, record.evaluated_at);
    }

    #[tokio::test]
    async fn aborted_run_is_never_scored() {
        let ledger = Arc::new(InMemoryRunLedger::new());
        let outcomes = Arc::new(InMemoryOutcomeRepository::default());
        let evaluator = OutcomeEvaluator::new(ledger.clone(), outcomes.clone());
        let now = Utc::now();
        let actor = Actor::new("driver-2", ActorRole::Driver);
        let run = ledger.start_run(&actor, NewRun::default(), now).await.expect("run");
        finished_step(&ledger, &run.run_id, "searchJobs", StepStatus::Succeeded, now).await;
        ledger
            .complete_run(&run.run_id, RunStatus::Aborted, RunUsage::default(), now)
            .await
            .expect("abort");

        let result = evaluator.evaluate_run(&run.run_id, now).await;
        assert_eq!(result, Err(OutcomeError::RunNotComplete(run.run_id.clone())));

        let stats = evaluator.get_outcome_stats(&OutcomeFilter::default()).await.expect("stats");
        assert_eq!(stats.total_runs, 0);
    }

    #[tokio::test]
    async fn stats_aggregate_by_objective() {
        let ledger = Arc::new(InMemoryRunLedger::new());
        let evaluator =
            OutcomeEvaluator::new(ledger.clone(), Arc::new(InMemoryOutcomeRepository::default()));
        let now = Utc::now();

        for statuses in [
            vec![StepStatus::Succeeded],
            vec![StepStatus::Succeeded, StepStatus::Failed],
            vec![StepStatus::Failed],
        ] {
            let actor = Actor::new("rec-1", ActorRole::Recruiter);
            let run = ledger.start_run(&actor, NewRun::default(), now).await.expect("run");
            for status in statuses {
                finished_step(&ledger, &run.run_id, "sendSms", status, now).await;
            }
            ledger
                .complete_run(&run.run_id, RunStatus::Completed, RunUsage::default(), now)
                .await
                .expect("complete");
            evaluator.evaluate_run(&run.run_id, now).await.expect("evaluate");
        }

        let stats = evaluator
            .get_outcome_stats(&OutcomeFilter { role: Some(ActorRole::Recruiter), ..OutcomeFilter::default() })
            .await
            .expect("stats");
        assert_eq!(stats.total_runs, 3);
        assert_eq!(stats.avg_quality_score, 50.0);
        assert_eq!(stats.success_rate, 33.33);
        assert_eq!(stats.partial_rate, 33.33);
        assert_eq!(stats.failure_rate, 33.33);

        let drivers = evaluator
            .get_outcome_stats(&OutcomeFilter { role: Some(ActorRole::Driver), ..OutcomeFilter::default() })
            .await
            .expect("stats");
        assert_eq!(drivers.total_runs, 0);
    }

    #[tokio::test]
    async fn regression_flags_drops_above_threshold() {
        let ledger = Arc::new(InMemoryRunLedger::new());
        let evaluator =
            OutcomeEvaluator::new(ledger.clone(), Arc::new(InMemoryOutcomeRepository::default()));
        let now = Utc::now();
        let actor = Actor::new("driver-1", ActorRole::Driver);
        let run = ledger.start_run(&actor, NewRun::default(), now - Duration::days(14)).await.expect("run");

        let baseline_at = now - Duration::days(10);
        let current_at = now - Duration::days(2);
        for _ in 0..4 {
            finished_step(&ledger, &run.run_id, "searchJobs", StepStatus::Succeeded, baseline_at).await;
            finished_step(&ledger, &run.run_id, "getWeather", StepStatus::Succeeded, baseline_at).await;
            finished_step(&ledger, &run.run_id, "getWeather", StepStatus::Succeeded, current_at).await;
        }
        for status in [StepStatus::Succeeded, StepStatus::Failed, StepStatus::Failed, StepStatus::Succeeded] {
            finished_step(&ledger, &run.run_id, "searchJobs", status, current_at).await;
        }

        let regressions =
            evaluator.detect_action_regressions(now, Duration::days(7)).await.expect("regressions");
        assert_eq!(regressions.len(), 1);
        assert_eq!(regressions[0].action.0, "searchJobs");
        assert_eq!(regressions[0].baseline_rate, 100.0);
        assert_eq!(regressions[0].current_rate, 50.0);
    }
}
