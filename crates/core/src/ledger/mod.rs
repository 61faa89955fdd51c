//! Append-only record of runs, steps, and approval gates.
//!
//! The ledger is the source of truth for audit: every dispatch attempt leaves a step,
//! and step and gate states only move forward.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::action::{ActionName, ActorRole};
use crate::domain::gate::{ApprovalGate, GateId, GateState};
use crate::domain::run::{
    Actor, AgentRun, NewRun, RunId, RunStatus, RunUsage, Step, StepId, StepStatus, StepUpdate,
};
use crate::errors::StoreError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunQuery {
    pub actor_id: Option<String>,
    pub role: Option<ActorRole>,
    pub status: Option<RunStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl RunQuery {
    pub fn matches(&self, run: &AgentRun) -> bool {
        self.actor_id.as_ref().map_or(true, |id| run.actor.id.as_ref() == Some(id))
            && self.role.map_or(true, |role| run.actor.role == role)
            && self.status.map_or(true, |status| run.status == status)
            && self.since.map_or(true, |since| run.started_at >= since)
            && self.until.map_or(true, |until| run.started_at < until)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub event: String,
    pub step_id: Option<StepId>,
    pub gate_id: Option<GateId>,
    pub action: Option<ActionName>,
    pub detail: Option<String>,
}

/// Full execution history of one run, ordered for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunTrace {
    pub run: AgentRun,
    pub steps: Vec<Step>,
    pub gates: Vec<ApprovalGate>,
    pub timeline: Vec<TimelineEntry>,
}

impl RunTrace {
    pub fn assemble(run: AgentRun, steps: Vec<Step>, gates: Vec<ApprovalGate>) -> Self {
        let mut timeline = vec![TimelineEntry {
            at: run.started_at,
            event: "run.started".to_string(),
            step_id: None,
            gate_id: None,
            action: None,
            detail: run.goal.clone(),
        }];

        for step in &steps {
            timeline.push(TimelineEntry {
                at: step.started_at,
                event: "step.logged".to_string(),
                step_id: Some(step.step_id.clone()),
                gate_id: None,
                action: Some(step.action.clone()),
                detail: Some(format!("sequence {}", step.sequence)),
            });
            if let Some(finished_at) = step.finished_at {
                timeline.push(TimelineEntry {
                    at: finished_at,
                    event: format!("step.{}", step.status.as_str()),
                    step_id: Some(step.step_id.clone()),
                    gate_id: step.gate_id.clone(),
                    action: Some(step.action.clone()),
                    detail: step.error.as_ref().map(|error| error.message.clone()),
                });
            }
        }

        for gate in &gates {
            timeline.push(TimelineEntry {
                at: gate.requested_at,
                event: "gate.requested".to_string(),
                step_id: Some(gate.step_id.clone()),
                gate_id: Some(gate.gate_id.clone()),
                action: Some(gate.action.clone()),
                detail: Some(gate.reason.clone()),
            });
            if let Some(resolved_at) = gate.resolved_at {
                timeline.push(TimelineEntry {
                    at: resolved_at,
                    event: format!("gate.{}", gate.state.as_str()),
                    step_id: Some(gate.step_id.clone()),
                    gate_id: Some(gate.gate_id.clone()),
                    action: Some(gate.action.clone()),
                    detail: gate.resolved_by.clone(),
                });
            }
        }

        if let Some(completed_at) = run.completed_at {
            timeline.push(TimelineEntry {
                at: completed_at,
                event: format!("run.{}", run.status.as_str()),
                step_id: None,
                gate_id: None,
                action: None,
                detail: None,
            });
        }

        timeline.sort_by(|left, right| left.at.cmp(&right.at));
        Self { run, steps, gates, timeline }
    }
}

#[async_trait]
pub trait RunLedger: Send + Sync {
    async fn start_run(
        &self,
        actor: &Actor,
        new_run: NewRun,
        now: DateTime<Utc>,
    ) -> Result<AgentRun, StoreError>;

    async fn get_run(&self, run_id: &RunId) -> Result<Option<AgentRun>, StoreError>;

    /// Closes an open run. Completing an already closed run fails with `RunClosed`.
    async fn complete_run(
        &self,
        run_id: &RunId,
        status: RunStatus,
        usage: RunUsage,
        now: DateTime<Utc>,
    ) -> Result<AgentRun, StoreError>;

    async fn list_runs(&self, query: &RunQuery) -> Result<Vec<AgentRun>, StoreError>;

    /// Appends a step with the next sequence number. The run must be open.
    async fn log_step(
        &self,
        run_id: &RunId,
        action: &ActionName,
        args_snapshot: &Value,
        status: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<Step, StoreError>;

    /// Applies a forward transition, failing with `StaleStep` when the step is not in `expected`.
    async fn update_step(
        &self,
        step_id: &StepId,
        expected: StepStatus,
        update: StepUpdate,
        now: DateTime<Utc>,
    ) -> Result<Step, StoreError>;

    async fn get_step(&self, step_id: &StepId) -> Result<Option<Step>, StoreError>;

    async fn list_steps(&self, run_id: &RunId) -> Result<Vec<Step>, StoreError>;

    async fn list_steps_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Step>, StoreError>;

    /// Stores a new gate and links it to its step. A step owns at most one gate.
    async fn create_gate(&self, gate: ApprovalGate) -> Result<ApprovalGate, StoreError>;

    async fn get_gate(&self, gate_id: &GateId) -> Result<Option<ApprovalGate>, StoreError>;

    /// Replaces a gate only if its stored state still equals `expected`.
    async fn transition_gate(
        &self,
        gate: &ApprovalGate,
        expected: GateState,
    ) -> Result<ApprovalGate, StoreError>;

    async fn list_gates(&self, run_id: &RunId) -> Result<Vec<ApprovalGate>, StoreError>;

    async fn list_pending_gates(&self, limit: usize) -> Result<Vec<ApprovalGate>, StoreError>;

    async fn list_overdue_gates(&self, now: DateTime<Utc>)
        -> Result<Vec<ApprovalGate>, StoreError>;

    async fn run_trace(&self, run_id: &RunId) -> Result<RunTrace, StoreError> {
        let run =
            self.get_run(run_id).await?.ok_or_else(|| StoreError::RunNotFound(run_id.clone()))?;
        let steps = self.list_steps(run_id).await?;
        let gates = self.list_gates(run_id).await?;
        Ok(RunTrace::assemble(run, steps, gates))
    }
}

#[derive(Default)]
struct LedgerState {
    runs: HashMap<RunId, AgentRun>,
    steps: HashMap<StepId, Step>,
    run_steps: HashMap<RunId, Vec<StepId>>,
    gates: HashMap<GateId, ApprovalGate>,
}

#[derive(Default)]
pub struct InMemoryRunLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryRunLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunLedger for InMemoryRunLedger {
    async fn start_run(
        &self,
        actor: &Actor,
        new_run: NewRun,
        now: DateTime<Utc>,
    ) -> Result<AgentRun, StoreError> {
        let run = AgentRun {
            run_id: RunId::generate(),
            actor: actor.clone(),
            conversation_id: new_run.conversation_id,
            goal: new_run.goal,
            status: RunStatus::Open,
            usage: RunUsage::default(),
            started_at: now,
            completed_at: None,
        };
        let mut state = self.state.write().await;
        state.runs.insert(run.run_id.clone(), run.clone());
        Ok(run)
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Option<AgentRun>, StoreError> {
        let state = self.state.read().await;
        Ok(state.runs.get(run_id).cloned())
    }

    async fn complete_run(
        &self,
        run_id: &RunId,
        status: RunStatus,
        usage: RunUsage,
        now: DateTime<Utc>,
    ) -> Result<AgentRun, StoreError> {
        let mut state = self.state.write().await;
        let run =
            state.runs.get_mut(run_id).ok_or_else(|| StoreError::RunNotFound(run_id.clone()))?;
        if !run.is_open() {
            return Err(StoreError::RunClosed(run_id.clone()));
        }
        run.status = status;
        run.usage = usage;
        run.completed_at = Some(now);
        Ok(run.clone())
    }

    async fn list_runs(&self, query: &RunQuery) -> Result<Vec<AgentRun>, StoreError> {
        let state = self.state.read().await;
        let mut runs: Vec<AgentRun> =
            state.runs.values().filter(|run| query.matches(run)).cloned().collect();
        runs.sort_by(|left, right| right.started_at.cmp(&left.started_at));
        if let Some(limit) = query.limit {
            runs.truncate(limit);
        }
        Ok(runs)
    }

    async fn log_step(
        &self,
        run_id: &RunId,
        action: &ActionName,
        args_snapshot: &Value,
        status: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<Step, StoreError> {
        let mut state = self.state.write().await;
        let run = state.runs.get(run_id).ok_or_else(|| StoreError::RunNotFound(run_id.clone()))?;
        if !run.is_open() {
            return Err(StoreError::RunClosed(run_id.clone()));
        }

        let sequence = state.run_steps.get(run_id).map_or(0, Vec::len) as u32 + 1;
        let step = Step {
            step_id: StepId::generate(),
            run_id: run_id.clone(),
            sequence,
            action: action.clone(),
            args_snapshot: args_snapshot.clone(),
            mapped_args: None,
            status,
            result: None,
            error: None,
            attempts: 0,
            gate_id: None,
            started_at: now,
            updated_at: now,
            finished_at: None,
        };
        state.run_steps.entry(run_id.clone()).or_default().push(step.step_id.clone());
        state.steps.insert(step.step_id.clone(), step.clone());
        Ok(step)
    }

    async fn update_step(
        &self,
        step_id: &StepId,
        expected: StepStatus,
        update: StepUpdate,
        now: DateTime<Utc>,
    ) -> Result<Step, StoreError> {
        let mut state = self.state.write().await;
        let step =
            state.steps.get_mut(step_id).ok_or_else(|| StoreError::StepNotFound(step_id.clone()))?;
        if step.status != expected {
            return Err(StoreError::StaleStep {
                step_id: step_id.clone(),
                expected,
                actual: step.status,
            });
        }
        step.apply(update, now)?;
        Ok(step.clone())
    }

    async fn get_step(&self, step_id: &StepId) -> Result<Option<Step>, StoreError> {
        let state = self.state.read().await;
        Ok(state.steps.get(step_id).cloned())
    }

    async fn list_steps(&self, run_id: &RunId) -> Result<Vec<Step>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .run_steps
            .get(run_id)
            .map(|ids| ids.iter().filter_map(|id| state.steps.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    async fn list_steps_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Step>, StoreError> {
        let state = self.state.read().await;
        let mut steps: Vec<Step> = state
            .steps
            .values()
            .filter(|step| step.started_at >= since && step.started_at < until)
            .cloned()
            .collect();
        steps.sort_by(|left, right| left.started_at.cmp(&right.started_at));
        Ok(steps)
    }

    async fn create_gate(&self, gate: ApprovalGate) -> Result<ApprovalGate, StoreError> {
        let mut state = self.state.write().await;
        let step = state
            .steps
            .get_mut(&gate.step_id)
            .ok_or_else(|| StoreError::StepNotFound(gate.step_id.clone()))?;
        if step.gate_id.is_some() {
            return Err(StoreError::DuplicateGate(gate.step_id.clone()));
        }
        step.gate_id = Some(gate.gate_id.clone());
        state.gates.insert(gate.gate_id.clone(), gate.clone());
        Ok(gate)
    }

    async fn get_gate(&self, gate_id: &GateId) -> Result<Option<ApprovalGate>, StoreError> {
        let state = self.state.read().await;
        Ok(state.gates.get(gate_id).cloned())
    }

    async fn transition_gate(
        &self,
        gate: &ApprovalGate,
        expected: GateState,
    ) -> Result<ApprovalGate, StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .gates
            .get_mut(&gate.gate_id)
            .ok_or_else(|| StoreError::GateNotFound(gate.gate_id.clone()))?;
        if stored.state != expected {
            return Err(StoreError::StaleGate {
                gate_id: gate.gate_id.clone(),
                expected,
                actual: stored.state,
            });
        }
        *stored = gate.clone();
        Ok(stored.clone())
    }

    async fn list_gates(&self, run_id: &RunId) -> Result<Vec<ApprovalGate>, StoreError> {
        let state = self.state.read().await;
        let mut gates: Vec<ApprovalGate> =
            state.gates.values().filter(|gate| gate.run_id == *run_id).cloned().collect();
        gates.sort_by(|left, right| left.requested_at.cmp(&right.requested_at));
        Ok(gates)
    }

    async fn list_pending_gates(&self, limit: usize) -> Result<Vec<ApprovalGate>, StoreError> {
        let state = self.state.read().await;
        let mut gates: Vec<ApprovalGate> = state
            .gates
            .values()
            .filter(|gate| gate.state == GateState::Pending)
            .cloned()
            .collect();
        gates.sort_by(|left, right| left.requested_at.cmp(&right.requested_at));
        gates.truncate(limit);
        Ok(gates)
    }

    async fn list_overdue_gates(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ApprovalGate>, StoreError> {
        let state = self.state.read().await;
        let mut gates: Vec<ApprovalGate> =
            state.gates.values().filter(|gate| gate.is_overdue(now)).cloned().collect();
        gates.sort_by(|left, right| left.expires_at.cmp(&right.expires_at));
        Ok(gates)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{InMemoryRunLedger, RunLedger, RunQuery};
    use crate::domain::action::{ActionName, ActorRole};
    use crate::domain::gate::{ApprovalGate, GateId, GateState};
    use crate::domain::run::{Actor, NewRun, RunStatus, RunUsage, StepStatus, StepUpdate};
    use crate::errors::StoreError;

    fn driver() -> Actor {
        Actor::new("driver-1", ActorRole::Driver)
    }

    #[tokio::test]
    async fn steps_get_monotonic_sequence_numbers() {
        let ledger = InMemoryRunLedger::new();
        let now = Utc::now();
        let run = ledger.start_run(&driver(), NewRun::default(), now).await.expect("run");
        let action = ActionName("searchJobs".to_string());

        let first = ledger
            .log_step(&run.run_id, &action, &json!({}), StepStatus::Started, now)
            .await
            .expect("step");
        let second = ledger
            .log_step(&run.run_id, &action, &json!({}), StepStatus::Started, now)
            .await
            .expect("step");

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(ledger.list_steps(&run.run_id).await.expect("steps").len(), 2);
    }

    #[tokio::test]
    async fn closed_run_rejects_new_steps_and_second_completion() {
        let ledger = InMemoryRunLedger::new();
        let now = Utc::now();
        let run = ledger.start_run(&driver(), NewRun::default(), now).await.expect("run");

        let usage = RunUsage { total_tokens: 1200, total_cost_usd: Decimal::new(42, 3) };
        let closed = ledger
            .complete_run(&run.run_id, RunStatus::Completed, usage.clone(), now)
            .await
            .expect("complete");
        assert_eq!(closed.usage, usage);
        assert_eq!(closed.latency_ms(), Some(0));

        let logged = ledger
            .log_step(&run.run_id, &ActionName("x".to_string()), &json!({}), StepStatus::Started, now)
            .await;
        assert!(matches!(logged, Err(StoreError::RunClosed(_))));

        let again = ledger.complete_run(&run.run_id, RunStatus::Aborted, usage, now).await;
        assert!(matches!(again, Err(StoreError::RunClosed(_))));
    }

    #[tokio::test]
    async fn stale_and_backward_step_updates_fail() {
        let ledger = InMemoryRunLedger::new();
        let now = Utc::now();
        let run = ledger.start_run(&driver(), NewRun::default(), now).await.expect("run");
        let step = ledger
            .log_step(&run.run_id, &ActionName("a".to_string()), &json!({}), StepStatus::Started, now)
            .await
            .expect("step");

        ledger
            .update_step(&step.step_id, StepStatus::Started, StepUpdate::to(StepStatus::Failed), now)
            .await
            .expect("fail");

        let stale = ledger
            .update_step(&step.step_id, StepStatus::Started, StepUpdate::to(StepStatus::Succeeded), now)
            .await;
        assert!(matches!(stale, Err(StoreError::StaleStep { actual: StepStatus::Failed, .. })));

        let backward = ledger
            .update_step(&step.step_id, StepStatus::Failed, StepUpdate::to(StepStatus::Started), now)
            .await;
        assert!(matches!(backward, Err(StoreError::StepTransition(_))));
    }

    #[tokio::test]
    async fn gate_compare_and_set_and_one_gate_per_step() {
        let ledger = InMemoryRunLedger::new();
        let now = Utc::now();
        let run = ledger.start_run(&driver(), NewRun::default(), now).await.expect("run");
        let action = ActionName("sendCampaign".to_string());
        let step = ledger
            .log_step(&run.run_id, &action, &json!({}), StepStatus::AwaitingApproval, now)
            .await
            .expect("step");

        let gate = ApprovalGate {
            gate_id: GateId::generate(),
            run_id: run.run_id.clone(),
            step_id: step.step_id.clone(),
            action,
            args_snapshot: json!({}),
            reason: "send".to_string(),
            approver_roles: vec![ActorRole::Admin],
            state: GateState::Pending,
            requested_at: now,
            expires_at: now + Duration::hours(24),
            resolved_at: None,
            resolved_by: None,
        };
        ledger.create_gate(gate.clone()).await.expect("gate");

        let mut duplicate = gate.clone();
        duplicate.gate_id = GateId::generate();
        assert!(matches!(ledger.create_gate(duplicate).await, Err(StoreError::DuplicateGate(_))));

        let mut approved = gate.clone();
        approved.state = GateState::Approved;
        ledger.transition_gate(&approved, GateState::Pending).await.expect("approve");

        let mut rejected = gate.clone();
        rejected.state = GateState::Rejected;
        let lost = ledger.transition_gate(&rejected, GateState::Pending).await;
        assert!(matches!(lost, Err(StoreError::StaleGate { actual: GateState::Approved, .. })));

        assert!(ledger.list_pending_gates(10).await.expect("pending").is_empty());
        assert_eq!(
            ledger.get_step(&step.step_id).await.expect("step").and_then(|s| s.gate_id),
            Some(gate.gate_id)
        );
    }

    #[tokio::test]
    async fn run_queries_filter_by_role_and_status() {
        let ledger = InMemoryRunLedger::new();
        let now = Utc::now();
        let open = ledger.start_run(&driver(), NewRun::default(), now).await.expect("run");
        let recruiter = Actor::new("rec-1", ActorRole::Recruiter);
        let done = ledger
            .start_run(&recruiter, NewRun { goal: Some("send".into()), ..NewRun::default() }, now)
            .await
            .expect("run");
        ledger
            .complete_run(&done.run_id, RunStatus::Completed, RunUsage::default(), now)
            .await
            .expect("complete");

        let drivers = ledger
            .list_runs(&RunQuery { role: Some(ActorRole::Driver), ..RunQuery::default() })
            .await
            .expect("runs");
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].run_id, open.run_id);

        let completed = ledger
            .list_runs(&RunQuery { status: Some(RunStatus::Completed), ..RunQuery::default() })
            .await
            .expect("runs");
        assert_eq!(completed[0].run_id, done.run_id);

        let trace = ledger.run_trace(&done.run_id).await.expect("trace");
        assert_eq!(trace.timeline.first().map(|e| e.event.as_str()), Some("run.started"));
        assert_eq!(trace.timeline.last().map(|e| e.event.as_str()), Some("run.completed"));
    }
}
