//! Single entry point through which every agent-initiated action passes.
//!
//! A dispatch resolves the action, checks the caller's role, maps and validates
//! arguments, applies rate limits, opens an approval gate for sensitive actions, and
//! finally invokes the bound operation. Every attempt that reaches the run leaves a step
//! in the ledger.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::approvals::{ApprovalError, GateManager, GateRequest};
use crate::domain::action::{
    ActionDefinition, ActionName, ApprovalPolicy, RateLimitPolicy, RateLimitScope,
};
use crate::domain::gate::{ApprovalGate, GateId, GateState};
use crate::domain::run::{
    Actor, AgentRun, IdempotencyKey, RunId, Step, StepError, StepId, StepStatus, StepUpdate,
};
use crate::errors::{DispatchError, OperationError, RateLimitDenial, RegistryError, StoreError};
use crate::ledger::RunLedger;
use crate::rate_limit::RateLimiter;
use crate::registry::{
    ActionRegistry, InvocationRequest, MappedArguments, OperationCatalog, TargetOperation,
};

/// Retry and gate settings for the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Extra attempts allowed for transient failures of idempotent operations
    pub max_transient_retries: u32,
    /// Delay before the first retry, in milliseconds
    pub retry_base_delay_ms: u64,
    /// Backoff multiplier applied per retry
    pub retry_backoff_multiplier: u32,
    /// Upper bound of random jitter added to each delay, in milliseconds
    pub retry_jitter_ms: u64,
    /// How long an approval gate stays pending before it expires
    pub gate_timeout_secs: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_transient_retries: 2,
            retry_base_delay_ms: 200,
            retry_backoff_multiplier: 2,
            retry_jitter_ms: 50,
            gate_timeout_secs: 86_400, // 24 hours
        }
    }
}

impl DispatcherConfig {
    pub fn retry_delay(&self, attempt: u32) -> std::time::Duration {
        let exponent = attempt.saturating_sub(1);
        let base = self
            .retry_base_delay_ms
            .saturating_mul(u64::from(self.retry_backoff_multiplier).saturating_pow(exponent));
        let jitter =
            if self.retry_jitter_ms == 0 { 0 } else { rand::thread_rng().gen_range(0..=self.retry_jitter_ms) };
        std::time::Duration::from_millis(base.saturating_add(jitter))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchContext {
    pub run_id: RunId,
    pub actor: Actor,
    /// Set when resuming an action whose gate has been approved.
    pub approved_gate: Option<GateId>,
    pub correlation_id: String,
}

impl DispatchContext {
    pub fn new(run_id: RunId, actor: Actor) -> Self {
        Self {
            run_id,
            actor,
            approved_gate: None,
            correlation_id: format!("req-{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn with_approved_gate(mut self, gate_id: GateId) -> Self {
        self.approved_gate = Some(gate_id);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Completed {
        step_id: StepId,
        result: Value,
        attempts: u32,
        /// True when an already-executed approved step was returned without re-invoking.
        replayed: bool,
    },
    PendingApproval {
        gate_id: GateId,
        step_id: StepId,
        reason: String,
        expires_at: DateTime<Utc>,
    },
    Denied {
        gate_id: GateId,
        step_id: StepId,
        reason: String,
    },
}

impl DispatchOutcome {
    pub fn step_id(&self) -> &StepId {
        match self {
            Self::Completed { step_id, .. }
            | Self::PendingApproval { step_id, .. }
            | Self::Denied { step_id, .. } => step_id,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<ActionRegistry>,
    bindings: HashMap<ActionName, Arc<dyn TargetOperation>>,
    ledger: Arc<dyn RunLedger>,
    rate_limiter: Arc<RateLimiter>,
    gates: GateManager,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Binds every registered action to its operation and checks argument contracts.
    pub fn new(
        registry: Arc<ActionRegistry>,
        operations: &OperationCatalog,
        ledger: Arc<dyn RunLedger>,
        rate_limiter: RateLimiter,
    ) -> Result<Self, RegistryError> {
        let mut bindings = HashMap::with_capacity(registry.len());
        for definition in registry.actions() {
            let operation = operations.get(&definition.target).ok_or_else(|| {
                RegistryError::UnboundTarget {
                    action: definition.name.clone(),
                    target: definition.target.to_string(),
                }
            })?;
            check_contract(definition, operation.as_ref())?;

            if let Some(predicate) =
                definition.rate_limit.as_ref().and_then(|policy| policy.compliance.as_ref())
            {
                if !rate_limiter.has_predicate(predicate) {
                    return Err(RegistryError::UnknownCompliancePredicate {
                        action: definition.name.clone(),
                        predicate: predicate.clone(),
                    });
                }
            }
            bindings.insert(definition.name.clone(), operation);
        }

        let config = DispatcherConfig::default();
        let gates = GateManager::new(ledger.clone(), Duration::seconds(config.gate_timeout_secs));
        Ok(Self { registry, bindings, ledger, rate_limiter: Arc::new(rate_limiter), gates, config })
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.gates = GateManager::new(self.ledger.clone(), Duration::seconds(config.gate_timeout_secs));
        self.config = config;
        self
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> Arc<dyn RunLedger> {
        self.ledger.clone()
    }

    pub fn gates(&self) -> &GateManager {
        &self.gates
    }

    pub async fn execute(
        &self,
        action: &str,
        params: Value,
        context: &DispatchContext,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.execute_at(action, params, context, Utc::now()).await
    }

    pub async fn execute_at(
        &self,
        action: &str,
        params: Value,
        context: &DispatchContext,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let definition = self.registry.lookup(action)?;
        let operation = self.operation_for(definition)?;
        let run = self.open_run(&context.run_id, &context.actor).await?;

        if let Some(gate_id) = &context.approved_gate {
            return self.resume(definition, operation, params, gate_id, context, now).await;
        }

        if !definition.allows_role(context.actor.role) {
            let error =
                DispatchError::Forbidden { role: context.actor.role, action: definition.name.clone() };
            self.record_rejection(&run, definition, &params, StepStatus::Denied, &error, context, now)
                .await?;
            return Err(error);
        }

        let mapped = match definition.arguments.apply(&params, context.actor.id.as_deref()) {
            Ok(mapped) => mapped,
            Err(error) => {
                self.record_rejection(&run, definition, &params, StepStatus::Failed, &error, context, now)
                    .await?;
                return Err(error);
            }
        };

        if let Some(policy) = &definition.rate_limit {
            let scope = scope_value(&policy.scope, &mapped, &context.actor);
            let recipients = recipient_values(policy, &mapped);
            let decision = self
                .rate_limiter
                .try_consume(policy, &definition.name, &scope, &recipients, now)
                .await?;
            if !decision.granted {
                let error = DispatchError::RateLimited {
                    scope,
                    reset_at: decision.reset_at,
                    denial: decision.denial.unwrap_or(RateLimitDenial::QuotaExhausted),
                };
                self.record_rejection(&run, definition, &params, StepStatus::Denied, &error, context, now)
                    .await?;
                return Err(error);
            }
        }

        if let ApprovalPolicy::Required { approver_roles, .. } = &definition.approval {
            let step = self
                .ledger
                .log_step(&run.run_id, &definition.name, &params, StepStatus::AwaitingApproval, now)
                .await?;
            let reason = self.registry.render_reason(definition, &params);
            let gate = self
                .gates
                .open_gate(
                    GateRequest {
                        run_id: run.run_id.clone(),
                        step_id: step.step_id.clone(),
                        action: definition.name.clone(),
                        args_snapshot: params,
                        reason: reason.clone(),
                        approver_roles: approver_roles.clone(),
                    },
                    now,
                )
                .await?;
            info!(
                event_name = "dispatch.approval.requested",
                correlation_id = %context.correlation_id,
                run_id = %run.run_id,
                step_id = %step.step_id,
                gate_id = %gate.gate_id,
                action = %definition.name,
                "sensitive action is waiting for approval"
            );
            return Ok(DispatchOutcome::PendingApproval {
                gate_id: gate.gate_id,
                step_id: step.step_id,
                reason,
                expires_at: gate.expires_at,
            });
        }

        let step = self
            .ledger
            .log_step(&run.run_id, &definition.name, &params, StepStatus::Started, now)
            .await?;
        self.invoke(definition, operation, &step, mapped, context, now).await
    }

    async fn resume(
        &self,
        definition: &ActionDefinition,
        operation: Arc<dyn TargetOperation>,
        params: Value,
        gate_id: &GateId,
        context: &DispatchContext,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let gate = self.gates.check_gate(gate_id, now).await.map_err(approval_to_dispatch)?;
        if gate.run_id != context.run_id || gate.action != definition.name {
            return Err(DispatchError::Conflict(format!(
                "gate {gate_id} does not belong to `{}` in run {}",
                definition.name, context.run_id
            )));
        }
        if !params.is_null() && params != gate.args_snapshot {
            return Err(DispatchError::Conflict(format!(
                "arguments differ from those approved on gate {gate_id}"
            )));
        }

        let step = self
            .ledger
            .get_step(&gate.step_id)
            .await?
            .ok_or_else(|| StoreError::StepNotFound(gate.step_id.clone()))?;

        match gate.state {
            GateState::Pending => Ok(pending(&gate)),
            GateState::Rejected => Ok(DispatchOutcome::Denied {
                gate_id: gate.gate_id,
                step_id: gate.step_id,
                reason: gate.reason,
            }),
            GateState::Expired => Err(DispatchError::GateExpired(gate.gate_id)),
            GateState::Approved => match step.status {
                StepStatus::Succeeded => Ok(DispatchOutcome::Completed {
                    step_id: step.step_id,
                    result: step.result.unwrap_or(Value::Null),
                    attempts: step.attempts,
                    replayed: true,
                }),
                StepStatus::AwaitingApproval => {
                    let mapped = definition
                        .arguments
                        .apply(&gate.args_snapshot, context.actor.id.as_deref())?;
                    let step = self
                        .ledger
                        .update_step(
                            &step.step_id,
                            StepStatus::AwaitingApproval,
                            StepUpdate::to(StepStatus::Started)
                                .with_mapped_args(Value::Object(mapped.clone())),
                            now,
                        )
                        .await?;
                    info!(
                        event_name = "dispatch.approval.resumed",
                        correlation_id = %context.correlation_id,
                        run_id = %step.run_id,
                        step_id = %step.step_id,
                        gate_id = %gate.gate_id,
                        action = %definition.name,
                        "resuming approved action"
                    );
                    self.invoke(definition, operation, &step, mapped, context, now).await
                }
                other => Err(DispatchError::Conflict(format!(
                    "approved step {} is already {other}",
                    step.step_id
                ))),
            },
        }
    }

    async fn invoke(
        &self,
        definition: &ActionDefinition,
        operation: Arc<dyn TargetOperation>,
        step: &Step,
        mapped: MappedArguments,
        context: &DispatchContext,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let idempotency_key = IdempotencyKey::for_step(&step.step_id, &definition.name);
        let retries_allowed = operation.supports_idempotency();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = InvocationRequest {
                action: definition.name.clone(),
                target: definition.target.clone(),
                arguments: mapped.clone(),
                idempotency_key: idempotency_key.clone(),
                attempt,
                actor: context.actor.clone(),
            };

            match operation.invoke(request).await {
                Ok(result) => {
                    let mut update = StepUpdate::to(StepStatus::Succeeded)
                        .with_result(result.clone())
                        .with_attempts(attempt);
                    if step.mapped_args.is_none() {
                        update = update.with_mapped_args(Value::Object(mapped));
                    }
                    self.ledger
                        .update_step(&step.step_id, StepStatus::Started, update, finished_at(now))
                        .await?;
                    info!(
                        event_name = "dispatch.step.succeeded",
                        correlation_id = %context.correlation_id,
                        run_id = %step.run_id,
                        step_id = %step.step_id,
                        action = %definition.name,
                        attempts = attempt,
                        "action completed"
                    );
                    return Ok(DispatchOutcome::Completed {
                        step_id: step.step_id.clone(),
                        result,
                        attempts: attempt,
                        replayed: false,
                    });
                }
                Err(error)
                    if error.is_transient()
                        && retries_allowed
                        && attempt <= self.config.max_transient_retries =>
                {
                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        event_name = "dispatch.step.retrying",
                        correlation_id = %context.correlation_id,
                        step_id = %step.step_id,
                        action = %definition.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    let mut update = StepUpdate::to(StepStatus::Failed)
                        .with_error(step_error_from_operation(&error))
                        .with_attempts(attempt);
                    if step.mapped_args.is_none() {
                        update = update.with_mapped_args(Value::Object(mapped));
                    }
                    self.ledger
                        .update_step(&step.step_id, StepStatus::Started, update, finished_at(now))
                        .await?;
                    warn!(
                        event_name = "dispatch.step.failed",
                        correlation_id = %context.correlation_id,
                        run_id = %step.run_id,
                        step_id = %step.step_id,
                        action = %definition.name,
                        attempts = attempt,
                        error = %error,
                        "action failed"
                    );
                    return Err(DispatchError::Operation(error));
                }
            }
        }
    }

    async fn open_run(&self, run_id: &RunId, actor: &Actor) -> Result<AgentRun, DispatchError> {
        let run = self
            .ledger
            .get_run(run_id)
            .await?
            .ok_or_else(|| DispatchError::RunNotFound(run_id.clone()))?;
        if !run.is_open() {
            return Err(DispatchError::RunClosed(run_id.clone()));
        }
        if run.actor.id != actor.id {
            return Err(DispatchError::Conflict(format!(
                "run {run_id} belongs to a different actor"
            )));
        }
        Ok(run)
    }

    fn operation_for(
        &self,
        definition: &ActionDefinition,
    ) -> Result<Arc<dyn TargetOperation>, DispatchError> {
        self.bindings.get(&definition.name).cloned().ok_or_else(|| {
            DispatchError::Operation(OperationError::unavailable(format!(
                "no operation bound to {}",
                definition.target
            )))
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_rejection(
        &self,
        run: &AgentRun,
        definition: &ActionDefinition,
        params: &Value,
        status: StepStatus,
        error: &DispatchError,
        context: &DispatchContext,
        now: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let step = self
            .ledger
            .log_step(&run.run_id, &definition.name, params, StepStatus::Started, now)
            .await?;
        self.ledger
            .update_step(
                &step.step_id,
                StepStatus::Started,
                StepUpdate::to(status).with_error(StepError::new(
                    error.class(),
                    error.to_string(),
                    error.is_retryable(),
                )),
                now,
            )
            .await?;
        warn!(
            event_name = "dispatch.step.rejected",
            correlation_id = %context.correlation_id,
            run_id = %run.run_id,
            step_id = %step.step_id,
            action = %definition.name,
            status = %status,
            error_class = error.class(),
            "action rejected before execution"
        );
        Ok(())
    }
}

fn pending(gate: &ApprovalGate) -> DispatchOutcome {
    DispatchOutcome::PendingApproval {
        gate_id: gate.gate_id.clone(),
        step_id: gate.step_id.clone(),
        reason: gate.reason.clone(),
        expires_at: gate.expires_at,
    }
}

fn finished_at(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(now)
}

fn scope_value(scope: &RateLimitScope, mapped: &MappedArguments, actor: &Actor) -> String {
    match scope {
        RateLimitScope::Actor => actor.scope_key().to_string(),
        RateLimitScope::Global => "global".to_string(),
        RateLimitScope::Argument(field) => match mapped.get(field) {
            Some(Value::String(value)) => value.clone(),
            Some(value) if !value.is_null() => value.to_string(),
            _ => actor.scope_key().to_string(),
        },
    }
}

fn recipient_values(policy: &RateLimitPolicy, mapped: &MappedArguments) -> Vec<String> {
    let Some(field) = &policy.recipient else {
        return Vec::new();
    };
    let text = |value: &Value| match value {
        Value::String(value) => value.clone(),
        other => other.to_string(),
    };
    match mapped.get(field) {
        Some(Value::Array(values)) => values.iter().map(text).collect(),
        Some(value) if !value.is_null() => vec![text(value)],
        _ => Vec::new(),
    }
}

fn step_error_from_operation(error: &OperationError) -> StepError {
    StepError::new(error.code.as_str(), error.message.clone(), error.is_transient())
}

fn approval_to_dispatch(error: ApprovalError) -> DispatchError {
    match error {
        ApprovalError::GateNotFound(gate_id) => DispatchError::GateNotFound(gate_id),
        ApprovalError::GateExpired(gate_id) => DispatchError::GateExpired(gate_id),
        ApprovalError::Conflict { .. } | ApprovalError::UnauthorizedResolver { .. } => {
            DispatchError::Conflict(error.to_string())
        }
        ApprovalError::Store(error) => error.into(),
    }
}

/// Argument names produced by the mapping must equal the operation's declared parameters.
fn check_contract(
    definition: &ActionDefinition,
    operation: &dyn TargetOperation,
) -> Result<(), RegistryError> {
    let Some(expected) = operation.expected_arguments() else {
        return Ok(());
    };
    let expected: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
    let mapped: BTreeSet<&str> = definition.arguments.argument_names().into_iter().collect();
    if expected == mapped {
        return Ok(());
    }

    let missing: Vec<&str> = expected.difference(&mapped).copied().collect();
    let unexpected: Vec<&str> = mapped.difference(&expected).copied().collect();
    Err(RegistryError::ArgumentContractMismatch {
        action: definition.name.clone(),
        target: definition.target.to_string(),
        reason: format!("missing {missing:?}, unexpected {unexpected:?}"),
    })
}
