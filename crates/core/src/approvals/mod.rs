//! Approval gate lifecycle: open, resolve, and expire.
//!
//! Resolution is a compare-and-set on the gate state so concurrent approve/reject calls
//! settle on exactly one outcome. Expiry is applied lazily whenever an overdue gate is
//! read and eagerly by [`GateManager::sweep_expired`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::action::{ActionName, ActorRole};
use crate::domain::gate::{
    ApprovalGate, GateDecision, GateId, GateState, GateTransition, GateTransitionError, Resolver,
};
use crate::domain::run::{RunId, StepError, StepId, StepStatus, StepUpdate};
use crate::errors::StoreError;
use crate::ledger::RunLedger;

/// Conflicting resolution attempts re-read the gate at most this many times.
const MAX_RESOLVE_ATTEMPTS: usize = 3;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("approval gate not found: {0}")]
    GateNotFound(GateId),
    #[error("approval gate {0} expired")]
    GateExpired(GateId),
    #[error("approval gate {gate_id} is already {current}; cannot {requested}")]
    Conflict { gate_id: GateId, current: GateState, requested: GateDecision },
    #[error("role `{role}` may not resolve approval gate {gate_id}")]
    UnauthorizedResolver { gate_id: GateId, role: ActorRole },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateRequest {
    pub run_id: RunId,
    pub step_id: StepId,
    pub action: ActionName,
    pub args_snapshot: Value,
    pub reason: String,
    pub approver_roles: Vec<ActorRole>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateResolution {
    pub gate: ApprovalGate,
    /// False when the same decision had already been recorded.
    pub changed: bool,
}

#[derive(Clone)]
pub struct GateManager {
    ledger: Arc<dyn RunLedger>,
    timeout: Duration,
}

impl GateManager {
    pub fn new(ledger: Arc<dyn RunLedger>, timeout: Duration) -> Self {
        Self { ledger, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn open_gate(
        &self,
        request: GateRequest,
        now: DateTime<Utc>,
    ) -> Result<ApprovalGate, StoreError> {
        let gate = ApprovalGate {
            gate_id: GateId::generate(),
            run_id: request.run_id,
            step_id: request.step_id,
            action: request.action,
            args_snapshot: request.args_snapshot,
            reason: request.reason,
            approver_roles: request.approver_roles,
            state: GateState::Pending,
            requested_at: now,
            expires_at: now + self.timeout,
            resolved_at: None,
            resolved_by: None,
        };
        let gate = self.ledger.create_gate(gate).await?;
        info!(
            event_name = "approval.gate.opened",
            gate_id = %gate.gate_id,
            run_id = %gate.run_id,
            step_id = %gate.step_id,
            action = %gate.action,
            expires_at = %gate.expires_at,
            "approval gate opened"
        );
        Ok(gate)
    }

    /// Reads a gate, expiring it first when its deadline has passed.
    pub async fn check_gate(
        &self,
        gate_id: &GateId,
        now: DateTime<Utc>,
    ) -> Result<ApprovalGate, ApprovalError> {
        let gate = self.load(gate_id).await?;
        if gate.is_overdue(now) {
            return Ok(self.expire(&gate, now).await?);
        }
        Ok(gate)
    }

    pub async fn resolve_gate(
        &self,
        gate_id: &GateId,
        decision: GateDecision,
        resolver: &Resolver,
        now: DateTime<Utc>,
    ) -> Result<GateResolution, ApprovalError> {
        for _ in 0..MAX_RESOLVE_ATTEMPTS {
            let gate = self.load(gate_id).await?;
            if gate.is_overdue(now) {
                self.expire(&gate, now).await?;
                return Err(ApprovalError::GateExpired(gate_id.clone()));
            }

            let next = match gate.decide(decision, resolver, now) {
                Ok(GateTransition::Unchanged(gate)) => {
                    return Ok(GateResolution { gate, changed: false });
                }
                Ok(GateTransition::Applied(next)) => next,
                Err(GateTransitionError::Expired { .. }) => {
                    return Err(ApprovalError::GateExpired(gate_id.clone()));
                }
                Err(GateTransitionError::Conflict { current, requested }) => {
                    return Err(ApprovalError::Conflict {
                        gate_id: gate_id.clone(),
                        current,
                        requested,
                    });
                }
                Err(GateTransitionError::UnauthorizedResolver { role }) => {
                    return Err(ApprovalError::UnauthorizedResolver {
                        gate_id: gate_id.clone(),
                        role,
                    });
                }
            };

            match self.ledger.transition_gate(&next, GateState::Pending).await {
                Ok(stored) => {
                    info!(
                        event_name = "approval.gate.resolved",
                        gate_id = %stored.gate_id,
                        run_id = %stored.run_id,
                        state = %stored.state,
                        resolver_id = %resolver.id,
                        resolver_role = %resolver.role,
                        "approval gate resolved"
                    );
                    if stored.state == GateState::Rejected {
                        self.deny_step(&stored, "gate_rejected", "approval was rejected", now)
                            .await?;
                    }
                    return Ok(GateResolution { gate: stored, changed: true });
                }
                Err(StoreError::StaleGate { .. }) => continue,
                Err(error) => return Err(error.into()),
            }
        }

        Err(ApprovalError::Store(StoreError::Persistence(format!(
            "gate {gate_id} kept changing during resolution"
        ))))
    }

    /// Expires every overdue pending gate and denies the steps waiting on them.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalGate>, StoreError> {
        let overdue = self.ledger.list_overdue_gates(now).await?;
        let mut expired = Vec::with_capacity(overdue.len());
        for gate in overdue {
            let gate = self.expire(&gate, now).await?;
            if gate.state == GateState::Expired {
                expired.push(gate);
            }
        }
        if !expired.is_empty() {
            info!(
                event_name = "approval.gate.sweep",
                expired = expired.len(),
                "expired overdue approval gates"
            );
        }
        Ok(expired)
    }

    pub async fn list_pending(&self, limit: usize) -> Result<Vec<ApprovalGate>, StoreError> {
        self.ledger.list_pending_gates(limit).await
    }

    async fn load(&self, gate_id: &GateId) -> Result<ApprovalGate, ApprovalError> {
        self.ledger.get_gate(gate_id).await?.ok_or_else(|| ApprovalError::GateNotFound(gate_id.clone()))
    }

    async fn expire(
        &self,
        gate: &ApprovalGate,
        now: DateTime<Utc>,
    ) -> Result<ApprovalGate, StoreError> {
        let expired = match self.ledger.transition_gate(&gate.expired(now), GateState::Pending).await
        {
            Ok(expired) => expired,
            Err(StoreError::StaleGate { .. }) => {
                return self
                    .ledger
                    .get_gate(&gate.gate_id)
                    .await?
                    .ok_or_else(|| StoreError::GateNotFound(gate.gate_id.clone()));
            }
            Err(error) => return Err(error),
        };

        warn!(
            event_name = "approval.gate.expired",
            gate_id = %expired.gate_id,
            run_id = %expired.run_id,
            step_id = %expired.step_id,
            expires_at = %expired.expires_at,
            "approval gate expired before resolution"
        );
        self.deny_step(&expired, "gate_expired", "approval gate expired", now).await?;
        Ok(expired)
    }

    async fn deny_step(
        &self,
        gate: &ApprovalGate,
        class: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let update = StepUpdate::to(StepStatus::Denied).with_error(StepError::new(class, message, false));
        match self
            .ledger
            .update_step(&gate.step_id, StepStatus::AwaitingApproval, update, now)
            .await
        {
            Ok(_) | Err(StoreError::StaleStep { .. }) => Ok(()),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::{ApprovalError, GateManager, GateRequest};
    use crate::domain::action::{ActionName, ActorRole};
    use crate::domain::gate::{GateDecision, GateState, Resolver};
    use crate::domain::run::{Actor, NewRun, StepStatus};
    use crate::ledger::{InMemoryRunLedger, RunLedger};

    async fn pending_gate(
        ledger: &Arc<InMemoryRunLedger>,
        manager: &GateManager,
        now: chrono::DateTime<Utc>,
    ) -> crate::domain::gate::ApprovalGate {
        let actor = Actor::new("rec-1", ActorRole::Recruiter);
        let run = ledger.start_run(&actor, NewRun::default(), now).await.expect("run");
        let action = ActionName("sendCampaign".to_string());
        let step = ledger
            .log_step(&run.run_id, &action, &json!({"campaignId": "C-1"}), StepStatus::AwaitingApproval, now)
            .await
            .expect("step");
        manager
            .open_gate(
                GateRequest {
                    run_id: run.run_id,
                    step_id: step.step_id,
                    action,
                    args_snapshot: json!({"campaignId": "C-1"}),
                    reason: "Send campaign C-1".to_string(),
                    approver_roles: vec![ActorRole::Recruiter, ActorRole::Admin],
                },
                now,
            )
            .await
            .expect("gate")
    }

    fn admin() -> Resolver {
        Resolver { id: "admin-1".to_string(), role: ActorRole::Admin }
    }

    #[tokio::test]
    async fn reject_denies_waiting_step_and_repeat_is_idempotent() {
        let ledger = Arc::new(InMemoryRunLedger::new());
        let manager = GateManager::new(ledger.clone(), Duration::hours(24));
        let now = Utc::now();
        let gate = pending_gate(&ledger, &manager, now).await;

        let first = manager
            .resolve_gate(&gate.gate_id, GateDecision::Reject, &admin(), now)
            .await
            .expect("reject");
        assert!(first.changed);
        assert_eq!(first.gate.state, GateState::Rejected);

        let repeat = manager
            .resolve_gate(&gate.gate_id, GateDecision::Reject, &admin(), now)
            .await
            .expect("repeat");
        assert!(!repeat.changed);

        let conflict =
            manager.resolve_gate(&gate.gate_id, GateDecision::Approve, &admin(), now).await;
        assert!(matches!(conflict, Err(ApprovalError::Conflict { current: GateState::Rejected, .. })));

        let step = ledger.get_step(&gate.step_id).await.expect("read").expect("step");
        assert_eq!(step.status, StepStatus::Denied);
        assert_eq!(step.error.map(|error| error.class), Some("gate_rejected".to_string()));
    }

    #[tokio::test]
    async fn concurrent_resolutions_settle_on_one_outcome() {
        let ledger = Arc::new(InMemoryRunLedger::new());
        let manager = GateManager::new(ledger.clone(), Duration::hours(24));
        let now = Utc::now();
        let gate = pending_gate(&ledger, &manager, now).await;

        let approve = {
            let manager = manager.clone();
            let gate_id = gate.gate_id.clone();
            tokio::spawn(async move {
                manager.resolve_gate(&gate_id, GateDecision::Approve, &admin(), now).await
            })
        };
        let reject = {
            let manager = manager.clone();
            let gate_id = gate.gate_id.clone();
            tokio::spawn(async move {
                manager.resolve_gate(&gate_id, GateDecision::Reject, &admin(), now).await
            })
        };

        let outcomes = [approve.await.expect("join"), reject.await.expect("join")];
        let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Err(ApprovalError::Conflict { .. })))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(conflicts, 1);
    }

    #[tokio::test]
    async fn overdue_gate_expires_lazily_and_by_sweep() {
        let ledger = Arc::new(InMemoryRunLedger::new());
        let manager = GateManager::new(ledger.clone(), Duration::hours(1));
        let now = Utc::now();
        let lazy = pending_gate(&ledger, &manager, now).await;
        let swept = pending_gate(&ledger, &manager, now).await;
        let later = now + Duration::hours(2);

        let error = manager
            .resolve_gate(&lazy.gate_id, GateDecision::Approve, &admin(), later)
            .await
            .expect_err("expired");
        assert_eq!(error, ApprovalError::GateExpired(lazy.gate_id.clone()));

        let expired = manager.sweep_expired(later).await.expect("sweep");
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].gate_id, swept.gate_id);

        for gate in [lazy, swept] {
            let step = ledger.get_step(&gate.step_id).await.expect("read").expect("step");
            assert_eq!(step.status, StepStatus::Denied);
        }
        assert!(manager.list_pending(10).await.expect("pending").is_empty());
    }

    #[tokio::test]
    async fn unlisted_resolver_role_is_refused() {
        let ledger = Arc::new(InMemoryRunLedger::new());
        let manager = GateManager::new(ledger.clone(), Duration::hours(24));
        let now = Utc::now();
        let gate = pending_gate(&ledger, &manager, now).await;

        let driver = Resolver { id: "driver-1".to_string(), role: ActorRole::Driver };
        let error = manager
            .resolve_gate(&gate.gate_id, GateDecision::Approve, &driver, now)
            .await
            .expect_err("unauthorized");
        assert!(matches!(error, ApprovalError::UnauthorizedResolver { role: ActorRole::Driver, .. }));
    }
}
