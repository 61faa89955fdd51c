use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::warn;

use actiongate_core::domain::action::{ActionName, ActorRole};
use actiongate_core::domain::gate::{ApprovalGate, GateId, GateState};
use actiongate_core::domain::run::{
    Actor, AgentRun, NewRun, RunId, RunStatus, RunUsage, Step, StepError, StepId, StepStatus,
    StepUpdate,
};
use actiongate_core::errors::StoreError;
use actiongate_core::ledger::{RunLedger, RunQuery};

use super::{
    actor_columns, column, db_error, decimal_column, encode_ts, json_column, optional_json_column,
    optional_ts_column, ts_column, u32_column, u64_column, RepositoryError,
};
use crate::DbPool;

const RUN_COLUMNS: &str = "run_id, actor_id, actor_role, conversation_id, goal, status,
    total_tokens, total_cost_usd, started_at, completed_at";

const STEP_COLUMNS: &str = "step_id, run_id, sequence, action, args_snapshot, mapped_args, status,
    result, error_class, error_message, error_retryable, attempts, gate_id, started_at,
    updated_at, finished_at";

const GATE_COLUMNS: &str = "gate_id, run_id, step_id, action, args_snapshot, reason,
    approver_roles, state, requested_at, expires_at, resolved_at, resolved_by";

/// SQLite-backed ledger. Compare-and-set semantics are enforced in the `WHERE` clause of each
/// state update so concurrent writers cannot both win.
pub struct SqlRunLedger {
    pool: DbPool,
}

impl SqlRunLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn require_step(&self, step_id: &StepId) -> Result<Step, StoreError> {
        self.get_step(step_id).await?.ok_or_else(|| StoreError::StepNotFound(step_id.clone()))
    }
}

fn row_to_run(row: &SqliteRow) -> Result<AgentRun, RepositoryError> {
    let status: String = column(row, "status")?;
    Ok(AgentRun {
        run_id: RunId(column(row, "run_id")?),
        actor: actor_columns(row)?,
        conversation_id: column(row, "conversation_id")?,
        goal: column(row, "goal")?,
        status: RunStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown run status `{status}`")))?,
        usage: RunUsage {
            total_tokens: u64_column(row, "total_tokens")?,
            total_cost_usd: decimal_column(row, "total_cost_usd")?,
        },
        started_at: ts_column(row, "started_at")?,
        completed_at: optional_ts_column(row, "completed_at")?,
    })
}

fn row_to_step(row: &SqliteRow) -> Result<Step, RepositoryError> {
    let status: String = column(row, "status")?;
    let error_class: Option<String> = column(row, "error_class")?;
    let error = match error_class {
        Some(class) => Some(StepError {
            class,
            message: column::<Option<String>>(row, "error_message")?.unwrap_or_default(),
            retryable: column::<Option<bool>>(row, "error_retryable")?.unwrap_or(false),
        }),
        None => None,
    };

    Ok(Step {
        step_id: StepId(column(row, "step_id")?),
        run_id: RunId(column(row, "run_id")?),
        sequence: u32_column(row, "sequence")?,
        action: ActionName(column(row, "action")?),
        args_snapshot: json_column(row, "args_snapshot")?,
        mapped_args: optional_json_column(row, "mapped_args")?,
        status: StepStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown step status `{status}`")))?,
        result: optional_json_column(row, "result")?,
        error,
        attempts: u32_column(row, "attempts")?,
        gate_id: column::<Option<String>>(row, "gate_id")?.map(GateId),
        started_at: ts_column(row, "started_at")?,
        updated_at: ts_column(row, "updated_at")?,
        finished_at: optional_ts_column(row, "finished_at")?,
    })
}

fn row_to_gate(row: &SqliteRow) -> Result<ApprovalGate, RepositoryError> {
    let state: String = column(row, "state")?;
    let roles: Vec<String> = serde_json::from_value(json_column(row, "approver_roles")?)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let approver_roles = roles
        .iter()
        .map(|role| {
            ActorRole::parse(role)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role}`")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ApprovalGate {
        gate_id: GateId(column(row, "gate_id")?),
        run_id: RunId(column(row, "run_id")?),
        step_id: StepId(column(row, "step_id")?),
        action: ActionName(column(row, "action")?),
        args_snapshot: json_column(row, "args_snapshot")?,
        reason: column(row, "reason")?,
        approver_roles,
        state: GateState::parse(&state)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown gate state `{state}`")))?,
        requested_at: ts_column(row, "requested_at")?,
        expires_at: ts_column(row, "expires_at")?,
        resolved_at: optional_ts_column(row, "resolved_at")?,
        resolved_by: column(row, "resolved_by")?,
    })
}

fn encode_json(value: &Value) -> String {
    value.to_string()
}

fn encode_roles(roles: &[ActorRole]) -> String {
    Value::from(roles.iter().map(|role| role.as_str()).collect::<Vec<_>>()).to_string()
}

#[async_trait]
impl RunLedger for SqlRunLedger {
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

        sqlx::query(
            "INSERT INTO agent_runs (run_id, actor_id, actor_role, conversation_id, goal, status,
                                     total_tokens, total_cost_usd, started_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, '0', ?)",
        )
        .bind(&run.run_id.0)
        .bind(&run.actor.id)
        .bind(run.actor.role.as_str())
        .bind(&run.conversation_id)
        .bind(&run.goal)
        .bind(run.status.as_str())
        .bind(encode_ts(now))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(run)
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Option<AgentRun>, StoreError> {
        let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM agent_runs WHERE run_id = ?"))
            .bind(&run_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(row.as_ref().map(row_to_run).transpose()?)
    }

    async fn complete_run(
        &self,
        run_id: &RunId,
        status: RunStatus,
        usage: RunUsage,
        now: DateTime<Utc>,
    ) -> Result<AgentRun, StoreError> {
        let updated = sqlx::query(
            "UPDATE agent_runs
             SET status = ?, total_tokens = ?, total_cost_usd = ?, completed_at = ?
             WHERE run_id = ? AND status = 'open'",
        )
        .bind(status.as_str())
        .bind(i64::try_from(usage.total_tokens).unwrap_or(i64::MAX))
        .bind(usage.total_cost_usd.to_string())
        .bind(encode_ts(now))
        .bind(&run_id.0)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        let run =
            self.get_run(run_id).await?.ok_or_else(|| StoreError::RunNotFound(run_id.clone()))?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::RunClosed(run_id.clone()));
        }
        Ok(run)
    }

    async fn list_runs(&self, query: &RunQuery) -> Result<Vec<AgentRun>, StoreError> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {RUN_COLUMNS} FROM agent_runs WHERE 1=1"));
        if let Some(actor_id) = &query.actor_id {
            builder.push(" AND actor_id = ").push_bind(actor_id.clone());
        }
        if let Some(role) = query.role {
            builder.push(" AND actor_role = ").push_bind(role.as_str());
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(since) = query.since {
            builder.push(" AND started_at >= ").push_bind(encode_ts(since));
        }
        if let Some(until) = query.until {
            builder.push(" AND started_at < ").push_bind(encode_ts(until));
        }
        builder.push(" ORDER BY started_at DESC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = builder.build().fetch_all(&self.pool).await.map_err(db_error)?;
        Ok(rows.iter().map(row_to_run).collect::<Result<Vec<_>, _>>()?)
    }

    async fn log_step(
        &self,
        run_id: &RunId,
        action: &ActionName,
        args_snapshot: &Value,
        status: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<Step, StoreError> {
        let step_id = StepId::generate();
        let inserted = sqlx::query(
            "INSERT INTO run_steps (step_id, run_id, sequence, action, args_snapshot, status,
                                    attempts, started_at, updated_at)
             SELECT ?, ?, COALESCE((SELECT MAX(sequence) FROM run_steps WHERE run_id = ?), 0) + 1,
                    ?, ?, ?, 0, ?, ?
             WHERE EXISTS (SELECT 1 FROM agent_runs WHERE run_id = ? AND status = 'open')
             RETURNING sequence",
        )
        .bind(&step_id.0)
        .bind(&run_id.0)
        .bind(&run_id.0)
        .bind(&action.0)
        .bind(encode_json(args_snapshot))
        .bind(status.as_str())
        .bind(encode_ts(now))
        .bind(encode_ts(now))
        .bind(&run_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some(row) = inserted else {
            return match self.get_run(run_id).await? {
                Some(_) => Err(StoreError::RunClosed(run_id.clone())),
                None => Err(StoreError::RunNotFound(run_id.clone())),
            };
        };

        let sequence: i64 = row.try_get("sequence").map_err(db_error)?;
        Ok(Step {
            step_id,
            run_id: run_id.clone(),
            sequence: u32::try_from(sequence).unwrap_or(u32::MAX),
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
        })
    }

    async fn update_step(
        &self,
        step_id: &StepId,
        expected: StepStatus,
        update: StepUpdate,
        now: DateTime<Utc>,
    ) -> Result<Step, StoreError> {
        let mut step = self.require_step(step_id).await?;
        if step.status != expected {
            return Err(StoreError::StaleStep {
                step_id: step_id.clone(),
                expected,
                actual: step.status,
            });
        }
        step.apply(update, now)?;

        let updated = sqlx::query(
            "UPDATE run_steps
             SET status = ?, mapped_args = ?, result = ?, error_class = ?, error_message = ?,
                 error_retryable = ?, attempts = ?, updated_at = ?, finished_at = ?
             WHERE step_id = ? AND status = ?",
        )
        .bind(step.status.as_str())
        .bind(step.mapped_args.as_ref().map(encode_json))
        .bind(step.result.as_ref().map(encode_json))
        .bind(step.error.as_ref().map(|error| error.class.clone()))
        .bind(step.error.as_ref().map(|error| error.message.clone()))
        .bind(step.error.as_ref().map(|error| error.retryable))
        .bind(i64::from(step.attempts))
        .bind(encode_ts(step.updated_at))
        .bind(step.finished_at.map(encode_ts))
        .bind(&step_id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if updated.rows_affected() == 0 {
            let actual = self.require_step(step_id).await?.status;
            warn!(
                event_name = "ledger.step.stale_write",
                step_id = %step_id.0,
                expected = expected.as_str(),
                actual = actual.as_str(),
                "step changed under a concurrent writer"
            );
            return Err(StoreError::StaleStep { step_id: step_id.clone(), expected, actual });
        }
        Ok(step)
    }

    async fn get_step(&self, step_id: &StepId) -> Result<Option<Step>, StoreError> {
        let row = sqlx::query(&format!("SELECT {STEP_COLUMNS} FROM run_steps WHERE step_id = ?"))
            .bind(&step_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(row.as_ref().map(row_to_step).transpose()?)
    }

    async fn list_steps(&self, run_id: &RunId) -> Result<Vec<Step>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM run_steps WHERE run_id = ? ORDER BY sequence ASC"
        ))
        .bind(&run_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.iter().map(row_to_step).collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_steps_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Step>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM run_steps
             WHERE started_at >= ? AND started_at < ?
             ORDER BY started_at ASC"
        ))
        .bind(encode_ts(since))
        .bind(encode_ts(until))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.iter().map(row_to_step).collect::<Result<Vec<_>, _>>()?)
    }

    async fn create_gate(&self, gate: ApprovalGate) -> Result<ApprovalGate, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let linked = sqlx::query(
            "UPDATE run_steps SET gate_id = ? WHERE step_id = ? AND gate_id IS NULL",
        )
        .bind(&gate.gate_id.0)
        .bind(&gate.step_id.0)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        if linked.rows_affected() == 0 {
            drop(tx);
            return match self.get_step(&gate.step_id).await? {
                Some(_) => Err(StoreError::DuplicateGate(gate.step_id.clone())),
                None => Err(StoreError::StepNotFound(gate.step_id.clone())),
            };
        }

        sqlx::query(
            "INSERT INTO approval_gates (gate_id, run_id, step_id, action, args_snapshot, reason,
                                         approver_roles, state, requested_at, expires_at,
                                         resolved_at, resolved_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&gate.gate_id.0)
        .bind(&gate.run_id.0)
        .bind(&gate.step_id.0)
        .bind(&gate.action.0)
        .bind(encode_json(&gate.args_snapshot))
        .bind(&gate.reason)
        .bind(encode_roles(&gate.approver_roles))
        .bind(gate.state.as_str())
        .bind(encode_ts(gate.requested_at))
        .bind(encode_ts(gate.expires_at))
        .bind(gate.resolved_at.map(encode_ts))
        .bind(&gate.resolved_by)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(gate)
    }

    async fn get_gate(&self, gate_id: &GateId) -> Result<Option<ApprovalGate>, StoreError> {
        let row =
            sqlx::query(&format!("SELECT {GATE_COLUMNS} FROM approval_gates WHERE gate_id = ?"))
                .bind(&gate_id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        Ok(row.as_ref().map(row_to_gate).transpose()?)
    }

    async fn transition_gate(
        &self,
        gate: &ApprovalGate,
        expected: GateState,
    ) -> Result<ApprovalGate, StoreError> {
        let updated = sqlx::query(
            "UPDATE approval_gates
             SET state = ?, resolved_at = ?, resolved_by = ?
             WHERE gate_id = ? AND state = ?",
        )
        .bind(gate.state.as_str())
        .bind(gate.resolved_at.map(encode_ts))
        .bind(&gate.resolved_by)
        .bind(&gate.gate_id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if updated.rows_affected() == 0 {
            let stored = self
                .get_gate(&gate.gate_id)
                .await?
                .ok_or_else(|| StoreError::GateNotFound(gate.gate_id.clone()))?;
            warn!(
                event_name = "ledger.gate.stale_write",
                gate_id = %gate.gate_id.0,
                expected = expected.as_str(),
                actual = stored.state.as_str(),
                "gate changed under a concurrent writer"
            );
            return Err(StoreError::StaleGate {
                gate_id: gate.gate_id.clone(),
                expected,
                actual: stored.state,
            });
        }

        self.get_gate(&gate.gate_id)
            .await?
            .ok_or_else(|| StoreError::GateNotFound(gate.gate_id.clone()))
    }

    async fn list_gates(&self, run_id: &RunId) -> Result<Vec<ApprovalGate>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {GATE_COLUMNS} FROM approval_gates WHERE run_id = ? ORDER BY requested_at ASC"
        ))
        .bind(&run_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.iter().map(row_to_gate).collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_pending_gates(&self, limit: usize) -> Result<Vec<ApprovalGate>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {GATE_COLUMNS} FROM approval_gates
             WHERE state = 'pending'
             ORDER BY requested_at ASC
             LIMIT ?"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.iter().map(row_to_gate).collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_overdue_gates(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ApprovalGate>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {GATE_COLUMNS} FROM approval_gates
             WHERE state = 'pending' AND expires_at <= ?
             ORDER BY expires_at ASC"
        ))
        .bind(encode_ts(now))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.iter().map(row_to_gate).collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use actiongate_core::approvals::{GateManager, GateRequest};
    use actiongate_core::domain::action::{ActionName, ActorRole};
    use actiongate_core::domain::gate::{GateDecision, GateState, Resolver};
    use actiongate_core::domain::run::{
        Actor, NewRun, RunStatus, RunUsage, StepError, StepStatus, StepUpdate,
    };
    use actiongate_core::errors::StoreError;
    use actiongate_core::ledger::{RunLedger, RunQuery};

    use super::SqlRunLedger;
    use crate::repositories::test_support::setup;

    fn recruiter() -> Actor {
        Actor::new("recruiter-4", ActorRole::Recruiter)
    }

    #[tokio::test]
    async fn run_lifecycle_round_trips_through_sqlite() {
        let ledger = SqlRunLedger::new(setup().await);
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).single().expect("timestamp");

        let run = ledger
            .start_run(
                &recruiter(),
                NewRun { conversation_id: None, goal: Some("fill lane".to_string()) },
                now,
            )
            .await
            .expect("start");
        let usage = RunUsage { total_tokens: 1200, total_cost_usd: Decimal::new(42, 3) };
        let done = ledger
            .complete_run(&run.run_id, RunStatus::Completed, usage.clone(), now + Duration::seconds(5))
            .await
            .expect("complete");

        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.usage, usage);
        assert_eq!(done.latency_ms(), Some(5_000));
        assert_eq!(done.goal.as_deref(), Some("fill lane"));

        let again = ledger
            .complete_run(&run.run_id, RunStatus::Aborted, RunUsage::default(), now)
            .await
            .expect_err("closed");
        assert!(matches!(again, StoreError::RunClosed(_)));

        let closed_step = ledger
            .log_step(&run.run_id, &ActionName("searchJobs".to_string()), &json!({}), StepStatus::Started, now)
            .await
            .expect_err("closed run");
        assert!(matches!(closed_step, StoreError::RunClosed(_)));
    }

    #[tokio::test]
    async fn steps_are_sequenced_and_updated_with_compare_and_set() {
        let ledger = SqlRunLedger::new(setup().await);
        let now = Utc::now();
        let run = ledger.start_run(&recruiter(), NewRun::default(), now).await.expect("run");
        let action = ActionName("sendCampaignMessage".to_string());

        let first = ledger
            .log_step(&run.run_id, &action, &json!({"campaignId": "C-1"}), StepStatus::Started, now)
            .await
            .expect("first");
        let second = ledger
            .log_step(&run.run_id, &action, &json!({}), StepStatus::Started, now)
            .await
            .expect("second");
        assert_eq!((first.sequence, second.sequence), (1, 2));

        let failed = ledger
            .update_step(
                &first.step_id,
                StepStatus::Started,
                StepUpdate::to(StepStatus::Failed)
                    .with_error(StepError::new("timeout", "upstream timed out", true))
                    .with_attempts(3),
                now,
            )
            .await
            .expect("fail step");
        assert_eq!(failed.attempts, 3);

        let stored = ledger.get_step(&first.step_id).await.expect("get").expect("exists");
        assert_eq!(stored.status, StepStatus::Failed);
        assert_eq!(stored.error.as_ref().map(|error| error.class.as_str()), Some("timeout"));
        assert_eq!(stored.args_snapshot, json!({"campaignId": "C-1"}));
        assert!(stored.finished_at.is_some());

        let stale = ledger
            .update_step(&first.step_id, StepStatus::Started, StepUpdate::to(StepStatus::Succeeded), now)
            .await
            .expect_err("stale");
        assert!(matches!(stale, StoreError::StaleStep { actual: StepStatus::Failed, .. }));
    }

    #[tokio::test]
    async fn gate_manager_runs_on_sql_ledger() {
        let ledger = Arc::new(SqlRunLedger::new(setup().await));
        let gates = GateManager::new(ledger.clone(), Duration::hours(24));
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).single().expect("timestamp");

        let run = ledger.start_run(&recruiter(), NewRun::default(), now).await.expect("run");
        let action = ActionName("sendCampaignMessage".to_string());
        let step = ledger
            .log_step(&run.run_id, &action, &json!({"campaignId": "C-9"}), StepStatus::AwaitingApproval, now)
            .await
            .expect("step");

        let gate = gates
            .open_gate(
                GateRequest {
                    run_id: run.run_id.clone(),
                    step_id: step.step_id.clone(),
                    action: action.clone(),
                    args_snapshot: json!({"campaignId": "C-9"}),
                    reason: "Send campaign C-9".to_string(),
                    approver_roles: vec![ActorRole::Admin],
                },
                now,
            )
            .await
            .expect("open");

        let duplicate = ledger.create_gate(gate.clone()).await.expect_err("one gate per step");
        assert!(matches!(duplicate, StoreError::DuplicateGate(_)));

        let pending = ledger.list_pending_gates(10).await.expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].approver_roles, vec![ActorRole::Admin]);

        let admin = Resolver { id: "admin-1".to_string(), role: ActorRole::Admin };
        let resolution = gates
            .resolve_gate(&gate.gate_id, GateDecision::Reject, &admin, now + Duration::minutes(3))
            .await
            .expect("reject");
        assert_eq!(resolution.gate.state, GateState::Rejected);

        let step = ledger.get_step(&step.step_id).await.expect("get").expect("exists");
        assert_eq!(step.status, StepStatus::Denied);
        assert_eq!(step.gate_id, Some(gate.gate_id.clone()));

        let trace = ledger.run_trace(&run.run_id).await.expect("trace");
        assert_eq!(trace.gates.len(), 1);
        assert!(trace.timeline.iter().any(|entry| entry.event == "gate.rejected"));
    }

    #[tokio::test]
    async fn overdue_gates_are_listed_by_expiry() {
        let ledger = Arc::new(SqlRunLedger::new(setup().await));
        let gates = GateManager::new(ledger.clone(), Duration::hours(1));
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).single().expect("timestamp");

        let run = ledger.start_run(&recruiter(), NewRun::default(), now).await.expect("run");
        let action = ActionName("deleteAccount".to_string());
        let step = ledger
            .log_step(&run.run_id, &action, &json!({}), StepStatus::AwaitingApproval, now)
            .await
            .expect("step");
        gates
            .open_gate(
                GateRequest {
                    run_id: run.run_id.clone(),
                    step_id: step.step_id.clone(),
                    action,
                    args_snapshot: json!({}),
                    reason: "Delete account".to_string(),
                    approver_roles: vec![ActorRole::Admin],
                },
                now,
            )
            .await
            .expect("open");

        assert!(ledger.list_overdue_gates(now).await.expect("overdue").is_empty());
        let later = now + Duration::hours(2);
        assert_eq!(ledger.list_overdue_gates(later).await.expect("overdue").len(), 1);

        let expired = gates.sweep_expired(later).await.expect("sweep");
        assert_eq!(expired.len(), 1);
        assert!(ledger.list_overdue_gates(later).await.expect("overdue").is_empty());
    }

    #[tokio::test]
    async fn list_runs_filters_and_orders_newest_first() {
        let ledger = SqlRunLedger::new(setup().await);
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).single().expect("timestamp");
        let driver = Actor::new("driver-1", ActorRole::Driver);

        for offset in 0..3 {
            ledger
                .start_run(&driver, NewRun::default(), base + Duration::minutes(offset))
                .await
                .expect("driver run");
        }
        ledger.start_run(&recruiter(), NewRun::default(), base).await.expect("recruiter run");

        let runs = ledger
            .list_runs(&RunQuery {
                role: Some(ActorRole::Driver),
                limit: Some(2),
                ..RunQuery::default()
            })
            .await
            .expect("list");

        assert_eq!(runs.len(), 2);
        assert!(runs[0].started_at > runs[1].started_at);
        assert!(runs.iter().all(|run| run.actor.role == ActorRole::Driver));
    }
}
