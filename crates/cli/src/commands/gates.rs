use std::sync::Arc;

use actiongate_core::{
    ActorRole, ApprovalError, GateDecision, GateId, GateManager, Resolver, RunLedger,
};
use actiongate_db::SqlRunLedger;
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::commands::{block_on, load_config, open_pool, CommandResult, Failure};

pub fn pending(limit: usize) -> CommandResult {
    const COMMAND: &str = "gates.pending";
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = block_on(COMMAND, async {
        let pool = open_pool(&config).await?;
        let gates = SqlRunLedger::new(pool.clone()).list_pending_gates(limit).await;
        pool.close().await;
        Ok::<_, Failure>(gates?)
    });

    match result {
        Ok(gates) => CommandResult::report(COMMAND, format!("{} pending gates", gates.len()), &gates),
        Err(result) => result,
    }
}

pub fn resolve(gate_id: &str, decision: &str, resolver_id: &str, resolver_role: &str) -> CommandResult {
    const COMMAND: &str = "gates.resolve";
    let Some(decision) = GateDecision::parse(decision) else {
        return Failure::invalid_input(format!("unknown decision `{decision}` (expected approve|reject)"))
            .into_result(COMMAND);
    };
    let Some(role) = ActorRole::parse(resolver_role) else {
        return Failure::invalid_input(format!("unknown role `{resolver_role}`")).into_result(COMMAND);
    };
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let gate_id = GateId(gate_id.to_string());
    let resolver = Resolver { id: resolver_id.to_string(), role };
    let result = block_on(COMMAND, async {
        let pool = open_pool(&config).await?;
        let ledger: Arc<dyn RunLedger> = Arc::new(SqlRunLedger::new(pool.clone()));
        let manager =
            GateManager::new(ledger, Duration::seconds(config.approvals.gate_timeout_secs));
        let resolution = manager.resolve_gate(&gate_id, decision, &resolver, Utc::now()).await;
        pool.close().await;
        resolution.map_err(approval_failure)
    });

    match result {
        Ok(resolution) => {
            let message = if resolution.changed {
                format!("gate {} is now {}", resolution.gate.gate_id, resolution.gate.state)
            } else {
                format!("gate {} was already {}", resolution.gate.gate_id, resolution.gate.state)
            };
            CommandResult::report(
                COMMAND,
                message,
                &json!({ "changed": resolution.changed, "gate": resolution.gate }),
            )
        }
        Err(result) => result,
    }
}

/// Expires every pending gate past its deadline and denies the steps behind them.
pub fn sweep() -> CommandResult {
    const COMMAND: &str = "gates.sweep";
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = block_on(COMMAND, async {
        let pool = open_pool(&config).await?;
        let ledger: Arc<dyn RunLedger> = Arc::new(SqlRunLedger::new(pool.clone()));
        let manager =
            GateManager::new(ledger, Duration::seconds(config.approvals.gate_timeout_secs));
        let expired = manager.sweep_expired(Utc::now()).await;
        pool.close().await;
        Ok::<_, Failure>(expired?)
    });

    match result {
        Ok(expired) => CommandResult::report(COMMAND, format!("expired {} gates", expired.len()), &expired),
        Err(result) => result,
    }
}

/// Sweeps every `approvals.sweep_interval_secs` until Ctrl-C, or until `max_passes` passes ran.
pub fn watch(max_passes: Option<u32>) -> CommandResult {
    const COMMAND: &str = "gates.sweep";
    if max_passes == Some(0) {
        return Failure::invalid_input("passes must be at least one").into_result(COMMAND);
    }
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let period = std::time::Duration::from_secs(config.approvals.sweep_interval_secs);
    let result = block_on(COMMAND, async {
        let pool = open_pool(&config).await?;
        let ledger: Arc<dyn RunLedger> = Arc::new(SqlRunLedger::new(pool.clone()));
        let manager =
            GateManager::new(ledger, Duration::seconds(config.approvals.gate_timeout_secs));

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut passes = 0u32;
        let mut expired = Vec::new();
        let stopped = loop {
            tokio::select! {
                _ = ticker.tick() => {}
                signal = tokio::signal::ctrl_c() => {
                    break signal.map_err(|error| Failure::new("signal", error.to_string(), 3));
                }
            }
            match manager.sweep_expired(Utc::now()).await {
                Ok(batch) => expired.extend(batch),
                Err(error) => break Err(Failure::from(error)),
            }
            passes += 1;
            info!(
                event_name = "approval.sweep.pass",
                pass = passes,
                expired_total = expired.len(),
                interval_secs = period.as_secs(),
                "sweep pass finished"
            );
            if max_passes.is_some_and(|max| passes >= max) {
                break Ok(());
            }
        };
        pool.close().await;
        stopped?;
        Ok::<_, Failure>((passes, expired))
    });

    match result {
        Ok((passes, expired)) => CommandResult::report(
            COMMAND,
            format!("expired {} gates over {} passes", expired.len(), passes),
            &json!({ "passes": passes, "expired": expired }),
        ),
        Err(result) => result,
    }
}

fn approval_failure(error: ApprovalError) -> Failure {
    match error {
        ApprovalError::GateNotFound(_) => Failure::new("not_found", error.to_string(), 6),
        ApprovalError::GateExpired(_) => Failure::new("gate_expired", error.to_string(), 8),
        ApprovalError::Conflict { .. } => Failure::new("conflict", error.to_string(), 8),
        ApprovalError::UnauthorizedResolver { .. } => Failure::new("forbidden", error.to_string(), 8),
        ApprovalError::Store(error) => Failure::from(error),
    }
}
