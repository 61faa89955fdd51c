use std::collections::BTreeSet;

use actiongate_core::{DispatchError, DispatchOutcome, GateId, InterfaceError, RiskLevel};
use chrono::{DateTime, Utc};

use crate::llm::{ActionProposal, ProposalError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow {
        user_message: String,
    },
    /// The action is parked behind an approval gate; this is a status, not a failure.
    Wait {
        gate_id: GateId,
        user_message: String,
        expires_at: DateTime<Utc>,
    },
    Deny {
        reason_code: &'static str,
        user_message: String,
        fallback_path: &'static str,
    },
    Degrade {
        reason_code: &'static str,
        user_message: String,
        fallback_path: &'static str,
        retry_after: Option<DateTime<Utc>>,
    },
}

impl GuardrailDecision {
    pub fn user_message(&self) -> &str {
        match self {
            Self::Allow { user_message }
            | Self::Wait { user_message, .. }
            | Self::Deny { user_message, .. }
            | Self::Degrade { user_message, .. } => user_message,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Allow { .. } => "allow",
            Self::Wait { .. } => "wait",
            Self::Deny { .. } => "deny",
            Self::Degrade { .. } => "degrade",
        }
    }

    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::Deny { reason_code, .. } | Self::Degrade { reason_code, .. } => Some(reason_code),
            Self::Allow { .. } | Self::Wait { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    /// When false, the model may not propose `execute_high` actions at all.
    pub sensitive_actions_enabled: bool,
    pub blocked_actions: BTreeSet<String>,
    pub max_actions_per_session: u32,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            sensitive_actions_enabled: true,
            blocked_actions: BTreeSet::new(),
            max_actions_per_session: 25,
        }
    }
}

impl GuardrailPolicy {
    /// Screens a model proposal before it reaches the dispatcher. Unknown actions pass
    /// through so the dispatcher reports them.
    pub fn evaluate_proposal(
        &self,
        proposal: &ActionProposal,
        risk: Option<RiskLevel>,
        actions_taken: u32,
    ) -> GuardrailDecision {
        if actions_taken >= self.max_actions_per_session {
            return GuardrailDecision::Deny {
                reason_code: "session_action_budget_exhausted",
                user_message: "This session has run as many actions as it is allowed to. Please start a new one."
                    .to_string(),
                fallback_path: "start_new_session",
            };
        }
        if self.blocked_actions.contains(&proposal.action) {
            return GuardrailDecision::Deny {
                reason_code: "action_blocked",
                user_message: format!("I am not allowed to run {} from chat.", proposal.action),
                fallback_path: "manual_workflow",
            };
        }
        if risk == Some(RiskLevel::ExecuteHigh) && !self.sensitive_actions_enabled {
            return GuardrailDecision::Deny {
                reason_code: "sensitive_actions_disabled",
                user_message: "Actions that need approval are switched off for the assistant right now."
                    .to_string(),
                fallback_path: "manual_workflow",
            };
        }
        GuardrailDecision::Allow { user_message: String::new() }
    }

    pub fn translate_outcome(&self, outcome: &DispatchOutcome) -> GuardrailDecision {
        match outcome {
            DispatchOutcome::Completed { .. } => {
                GuardrailDecision::Allow { user_message: "Done.".to_string() }
            }
            DispatchOutcome::PendingApproval { gate_id, reason, expires_at, .. } => {
                GuardrailDecision::Wait {
                    gate_id: gate_id.clone(),
                    user_message: format!(
                        "Waiting for approval: {reason}. I will continue once it is approved."
                    ),
                    expires_at: *expires_at,
                }
            }
            DispatchOutcome::Denied { reason, .. } => GuardrailDecision::Deny {
                reason_code: "approval_denied",
                user_message: format!("That request was not approved: {reason}."),
                fallback_path: "choose_another_action",
            },
        }
    }

    pub fn translate_error(&self, error: DispatchError, correlation_id: &str) -> GuardrailDecision {
        let class = error.class();
        let interface = error.into_interface(correlation_id);
        let user_message = interface.user_message().to_string();
        match interface {
            InterfaceError::Retryable { retry_after, .. } => GuardrailDecision::Degrade {
                reason_code: class,
                user_message,
                fallback_path: "retry_later",
                retry_after,
            },
            InterfaceError::Clarification { field, message, .. } => GuardrailDecision::Degrade {
                reason_code: class,
                user_message: format!("I need a bit more information about `{field}`: {message}."),
                fallback_path: "ask_for_details",
                retry_after: None,
            },
            InterfaceError::Rejected { .. } => GuardrailDecision::Deny {
                reason_code: class,
                user_message,
                fallback_path: "choose_another_action",
            },
            InterfaceError::Internal { correlation_id, .. } => GuardrailDecision::Deny {
                reason_code: "internal_error",
                user_message: format!("{user_message} Reference: {correlation_id}."),
                fallback_path: "contact_support",
            },
        }
    }

    pub fn translate_proposal_error(&self, error: &ProposalError) -> GuardrailDecision {
        let reason_code = match error {
            ProposalError::Empty => "empty_proposal",
            ProposalError::Malformed(_) => "malformed_proposal",
            ProposalError::MissingAction => "proposal_without_action",
            ProposalError::InvalidParams => "invalid_proposal_params",
        };
        GuardrailDecision::Degrade {
            reason_code,
            user_message: "I could not work out what to do from that. Could you rephrase it?"
                .to_string(),
            fallback_path: "rephrase_request",
            retry_after: None,
        }
    }
}
