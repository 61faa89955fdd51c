use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::action::{ActionName, ActorRole};
use crate::domain::gate::GateId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn generate() -> Self {
        Self(format!("run-{}", uuid::Uuid::new_v4()))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    pub fn generate() -> Self {
        Self(format!("step-{}", uuid::Uuid::new_v4()))
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable key handed to target operations so retries of one step never double-apply.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(pub String);

impl IdempotencyKey {
    pub fn for_step(step_id: &StepId, action: &ActionName) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(step_id.0.as_bytes());
        hasher.update(b":");
        hasher.update(action.0.as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        Self(format!("idem-{}", &hex[..32]))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<String>,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self { id: Some(id.into()), role }
    }

    pub fn anonymous(role: ActorRole) -> Self {
        Self { id: None, role }
    }

    /// Counter scope used when no user id is known.
    pub fn scope_key(&self) -> &str {
        self.id.as_deref().unwrap_or("anonymous")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Open,
    Completed,
    Aborted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunUsage {
    pub total_tokens: u64,
    pub total_cost_usd: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRun {
    pub run_id: RunId,
    pub actor: Actor,
    pub conversation_id: Option<String>,
    pub goal: Option<String>,
    pub status: RunStatus,
    pub usage: RunUsage,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentRun {
    pub fn is_open(&self) -> bool {
        self.status == RunStatus::Open
    }

    pub fn latency_ms(&self) -> Option<i64> {
        self.completed_at.map(|done| (done - self.started_at).num_milliseconds())
    }
}

#[derive(Clone, Debug, Default)]
pub struct NewRun {
    pub conversation_id: Option<String>,
    pub goal: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    AwaitingApproval,
    Started,
    Succeeded,
    Failed,
    Denied,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingApproval => "awaiting_approval",
            Self::Started => "started",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Denied => "denied",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "awaiting_approval" => Some(Self::AwaitingApproval),
            "started" => Some(Self::Started),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Denied)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::AwaitingApproval => 0,
            Self::Started => 1,
            Self::Succeeded | Self::Failed | Self::Denied => 2,
        }
    }

    /// Steps only move forward: awaiting_approval -> started -> terminal.
    /// A gated step may also go straight to `denied` when its gate is rejected or expires.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        next.rank() > self.rank()
            && !(*self == Self::AwaitingApproval && matches!(next, Self::Succeeded | Self::Failed))
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("step cannot move from {from} to {to}")]
pub struct StepTransitionError {
    pub from: StepStatus,
    pub to: StepStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub class: String,
    pub message: String,
    pub retryable: bool,
}

impl StepError {
    pub fn new(class: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self { class: class.into(), message: message.into(), retryable }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: StepId,
    pub run_id: RunId,
    pub sequence: u32,
    pub action: ActionName,
    pub args_snapshot: Value,
    pub mapped_args: Option<Value>,
    pub status: StepStatus,
    pub result: Option<Value>,
    pub error: Option<StepError>,
    pub attempts: u32,
    pub gate_id: Option<GateId>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepUpdate {
    pub status: StepStatus,
    pub mapped_args: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<StepError>,
    pub attempts: Option<u32>,
}

impl StepUpdate {
    pub fn to(status: StepStatus) -> Self {
        Self { status, mapped_args: None, result: None, error: None, attempts: None }
    }

    pub fn with_mapped_args(mut self, mapped_args: Value) -> Self {
        self.mapped_args = Some(mapped_args);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: StepError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }
}

impl Step {
    pub fn apply(&mut self, update: StepUpdate, now: DateTime<Utc>) -> Result<(), StepTransitionError> {
        if !self.status.can_transition_to(update.status) {
            return Err(StepTransitionError { from: self.status, to: update.status });
        }

        self.status = update.status;
        if let Some(mapped_args) = update.mapped_args {
            self.mapped_args = Some(mapped_args);
        }
        if let Some(result) = update.result {
            self.result = Some(result);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        if let Some(attempts) = update.attempts {
            self.attempts = attempts;
        }
        self.updated_at = now;
        if self.status.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{
        ActionName, IdempotencyKey, RunId, Step, StepId, StepStatus, StepTransitionError,
        StepUpdate,
    };

    fn step(status: StepStatus) -> Step {
        let now = Utc::now();
        Step {
            step_id: StepId("step-1".to_string()),
            run_id: RunId("run-1".to_string()),
            sequence: 1,
            action: ActionName("saveJob".to_string()),
            args_snapshot: json!({"jobId": "J-1"}),
            mapped_args: None,
            status,
            result: None,
            error: None,
            attempts: 0,
            gate_id: None,
            started_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    #[test]
    fn started_step_finishes_once() {
        let mut step = step(StepStatus::Started);
        step.apply(
            StepUpdate::to(StepStatus::Succeeded).with_result(json!({"ok": true})).with_attempts(1),
            Utc::now(),
        )
        .expect("started -> succeeded");

        assert_eq!(step.status, StepStatus::Succeeded);
        assert!(step.finished_at.is_some());
        assert_eq!(step.attempts, 1);

        let error = step.apply(StepUpdate::to(StepStatus::Failed), Utc::now()).expect_err("terminal");
        assert_eq!(error, StepTransitionError { from: StepStatus::Succeeded, to: StepStatus::Failed });
    }

    #[test]
    fn gated_step_must_start_before_it_can_succeed() {
        assert!(StepStatus::AwaitingApproval.can_transition_to(StepStatus::Started));
        assert!(StepStatus::AwaitingApproval.can_transition_to(StepStatus::Denied));
        assert!(!StepStatus::AwaitingApproval.can_transition_to(StepStatus::Succeeded));
        assert!(!StepStatus::Started.can_transition_to(StepStatus::AwaitingApproval));
    }

    #[test]
    fn idempotency_key_is_stable_per_step() {
        let action = ActionName("sendCampaignMessage".to_string());
        let first = IdempotencyKey::for_step(&StepId("step-a".to_string()), &action);
        let again = IdempotencyKey::for_step(&StepId("step-a".to_string()), &action);
        let other = IdempotencyKey::for_step(&StepId("step-b".to_string()), &action);

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert!(first.0.starts_with("idem-"));
    }
}
