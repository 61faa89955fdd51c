use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::action::{ActionName, ActorRole};
use crate::domain::run::{RunId, StepId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GateId(pub String);

impl GateId {
    pub fn generate() -> Self {
        Self(format!("gate-{}", uuid::Uuid::new_v4()))
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Approve,
    Reject,
}

impl GateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Some(Self::Approve),
            "reject" | "rejected" => Some(Self::Reject),
            _ => None,
        }
    }

    pub fn target_state(&self) -> GateState {
        match self {
            Self::Approve => GateState::Approved,
            Self::Reject => GateState::Rejected,
        }
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolver {
    pub id: String,
    pub role: ActorRole,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalGate {
    pub gate_id: GateId,
    pub run_id: RunId,
    pub step_id: StepId,
    pub action: ActionName,
    /// Raw arguments captured when the gate opened; resumption replays exactly these.
    pub args_snapshot: Value,
    pub reason: String,
    pub approver_roles: Vec<ActorRole>,
    pub state: GateState,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GateTransitionError {
    #[error("gate expired at {expires_at}")]
    Expired { expires_at: DateTime<Utc> },
    #[error("gate already {current}; cannot {requested}")]
    Conflict { current: GateState, requested: GateDecision },
    #[error("role `{role}` may not resolve this gate")]
    UnauthorizedResolver { role: ActorRole },
}

/// Result of applying a decision: either a new gate state or an idempotent repeat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateTransition {
    Applied(ApprovalGate),
    Unchanged(ApprovalGate),
}

impl ApprovalGate {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.state == GateState::Pending && now >= self.expires_at
    }

    pub fn expired(&self, now: DateTime<Utc>) -> ApprovalGate {
        let mut gate = self.clone();
        gate.state = GateState::Expired;
        gate.resolved_at = Some(now);
        gate
    }

    pub fn decide(
        &self,
        decision: GateDecision,
        resolver: &Resolver,
        now: DateTime<Utc>,
    ) -> Result<GateTransition, GateTransitionError> {
        let target = decision.target_state();
        match self.state {
            GateState::Pending if self.is_overdue(now) => {
                Err(GateTransitionError::Expired { expires_at: self.expires_at })
            }
            GateState::Pending => {
                if !self.approver_roles.contains(&resolver.role) {
                    return Err(GateTransitionError::UnauthorizedResolver { role: resolver.role });
                }
                let mut gate = self.clone();
                gate.state = target;
                gate.resolved_at = Some(now);
                gate.resolved_by = Some(resolver.id.clone());
                Ok(GateTransition::Applied(gate))
            }
            GateState::Expired => Err(GateTransitionError::Expired { expires_at: self.expires_at }),
            current if current == target => Ok(GateTransition::Unchanged(self.clone())),
            current => Err(GateTransitionError::Conflict { current, requested: decision }),
        }
    }
}
