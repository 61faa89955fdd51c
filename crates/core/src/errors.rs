use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::action::{ActionName, ActorRole};
use crate::domain::conversation::ConversationId;
use crate::domain::gate::{GateId, GateState};
use crate::domain::run::{RunId, StepId, StepStatus, StepTransitionError};

/// Failures raised while assembling the action registry. All of them abort startup.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("action `{0}` is declared more than once")]
    DuplicateAction(ActionName),
    #[error("action `{0}` has no resolvable target operation")]
    MissingTarget(ActionName),
    #[error("action `{0}` requires approval but names no approver role")]
    NoApprovalPath(ActionName),
    #[error("action `{action}` has an invalid policy: {reason}")]
    InvalidPolicy { action: ActionName, reason: String },
    #[error("action `{action}` has an invalid reason template: {reason}")]
    InvalidTemplate { action: ActionName, reason: String },
    #[error("action `{action}` targets `{target}` but no operation is bound to it")]
    UnboundTarget { action: ActionName, target: String },
    #[error("action `{action}` does not match the contract of `{target}`: {reason}")]
    ArgumentContractMismatch { action: ActionName, target: String, reason: String },
    #[error("action `{action}` references unknown compliance predicate `{predicate}`")]
    UnknownCompliancePredicate { action: ActionName, predicate: String },
    #[error("router `{0}` declares no roles")]
    RouterWithoutRoles(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationErrorKind {
    Transient,
    Permanent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationErrorCode {
    Timeout,
    Unavailable,
    BusinessRule,
    NotFound,
    Unauthorized,
    InvalidInput,
}

impl OperationErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
            Self::BusinessRule => "business_rule",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::InvalidInput => "invalid_input",
        }
    }

    pub fn kind(&self) -> OperationErrorKind {
        match self {
            Self::Timeout | Self::Unavailable => OperationErrorKind::Transient,
            _ => OperationErrorKind::Permanent,
        }
    }
}

impl fmt::Display for OperationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a target operation. Only transient errors are ever retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("operation failed ({code}): {message}")]
pub struct OperationError {
    pub code: OperationErrorCode,
    pub message: String,
}

impl OperationError {
    pub fn new(code: OperationErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(OperationErrorCode::Timeout, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(OperationErrorCode::Unavailable, message)
    }

    pub fn business_rule(message: impl Into<String>) -> Self {
        Self::new(OperationErrorCode::BusinessRule, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(OperationErrorCode::NotFound, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(OperationErrorCode::Unauthorized, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(OperationErrorCode::InvalidInput, message)
    }

    pub fn kind(&self) -> OperationErrorKind {
        self.code.kind()
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == OperationErrorKind::Transient
    }
}

/// Persistence-layer failures shared by the ledger and the other stores.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("run not found: {0}")]
    RunNotFound(RunId),
    #[error("run {0} is no longer open")]
    RunClosed(RunId),
    #[error("step not found: {0}")]
    StepNotFound(StepId),
    #[error("step {step_id} is {actual}, expected {expected}")]
    StaleStep { step_id: StepId, expected: StepStatus, actual: StepStatus },
    #[error(transparent)]
    StepTransition(#[from] StepTransitionError),
    #[error("gate not found: {0}")]
    GateNotFound(GateId),
    #[error("step {0} already has an approval gate")]
    DuplicateGate(StepId),
    #[error("gate {gate_id} is {actual}, expected {expected}")]
    StaleGate { gate_id: GateId, expected: GateState, actual: GateState },
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDenial {
    QuotaExhausted,
    ComplianceWindow { predicate: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown action `{0}`")]
    UnknownAction(ActionName),
    #[error("invalid argument `{field}`: {reason}")]
    Validation { field: String, reason: String },
    #[error("role `{role}` may not invoke `{action}`")]
    Forbidden { role: ActorRole, action: ActionName },
    #[error("rate limit reached for `{scope}`; resets at {reset_at}")]
    RateLimited { scope: String, reset_at: DateTime<Utc>, denial: RateLimitDenial },
    #[error("approval gate {0} expired")]
    GateExpired(GateId),
    #[error("approval gate not found: {0}")]
    GateNotFound(GateId),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("run not found: {0}")]
    RunNotFound(RunId),
    #[error("run {0} is no longer open")]
    RunClosed(RunId),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DispatchError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::RunNotFound(run_id) => Self::RunNotFound(run_id),
            StoreError::RunClosed(run_id) => Self::RunClosed(run_id),
            StoreError::GateNotFound(gate_id) => Self::GateNotFound(gate_id),
            StoreError::StaleStep { step_id, actual, .. } => {
                Self::Conflict(format!("step {step_id} is already {actual}"))
            }
            other => Self::Store(other),
        }
    }
}

impl DispatchError {
    /// Stable machine-readable class recorded on steps and surfaced to callers.
    pub fn class(&self) -> &'static str {
        match self {
            Self::UnknownAction(_) => "unknown_action",
            Self::Validation { .. } => "validation",
            Self::Forbidden { .. } => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::GateExpired(_) => "gate_expired",
            Self::GateNotFound(_) => "gate_not_found",
            Self::Conflict(_) => "conflict",
            Self::RunNotFound(_) => "run_not_found",
            Self::RunClosed(_) => "run_closed",
            Self::Operation(error) if error.is_transient() => "operation_transient",
            Self::Operation(_) => "operation_permanent",
            Self::Store(_) => "store",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Operation(error) => error.is_transient(),
            Self::Store(StoreError::Persistence(_)) => true,
            _ => false,
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::Retryable { correlation_id: id, .. }
            | InterfaceError::Clarification { correlation_id: id, .. }
            | InterfaceError::Rejected { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

/// Caller-facing shape of a dispatch failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("retryable: {message}")]
    Retryable { message: String, retry_after: Option<DateTime<Utc>>, correlation_id: String },
    #[error("clarification needed for `{field}`: {message}")]
    Clarification { field: String, message: String, correlation_id: String },
    #[error("rejected: {message}")]
    Rejected { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Retryable { .. } => "That action is limited right now. Please try again shortly.",
            Self::Clarification { .. } => {
                "I need a bit more information before I can do that. Check the details and try again."
            }
            Self::Rejected { .. } => "That action cannot be completed.",
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Retryable { correlation_id, .. }
            | Self::Clarification { correlation_id, .. }
            | Self::Rejected { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl From<DispatchError> for InterfaceError {
    fn from(value: DispatchError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            DispatchError::RateLimited { reset_at, .. } => Self::Retryable {
                message: value.to_string(),
                retry_after: Some(reset_at),
                correlation_id,
            },
            DispatchError::Operation(ref error) if error.is_transient() => Self::Retryable {
                message: value.to_string(),
                retry_after: None,
                correlation_id,
            },
            DispatchError::Store(StoreError::Persistence(message)) => {
                Self::Retryable { message, retry_after: None, correlation_id }
            }
            DispatchError::Validation { field, reason } => {
                Self::Clarification { field, message: reason, correlation_id }
            }
            DispatchError::UnknownAction(_)
            | DispatchError::Forbidden { .. }
            | DispatchError::GateExpired(_)
            | DispatchError::GateNotFound(_)
            | DispatchError::Conflict(_)
            | DispatchError::RunNotFound(_)
            | DispatchError::RunClosed(_)
            | DispatchError::Operation(_) => {
                Self::Rejected { message: value.to_string(), correlation_id }
            }
            DispatchError::Store(error) => Self::Internal { message: error.to_string(), correlation_id },
        }
    }
}
