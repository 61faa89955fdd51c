use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Sqlite};

use actiongate_core::domain::outcome::{ObjectiveMet, OutcomeFilter, OutcomeRecord};
use actiongate_core::domain::run::RunId;
use actiongate_core::errors::StoreError;
use actiongate_core::outcome::OutcomeRepository;

use super::{
    column, db_error, decimal_column, encode_ts, role_column, ts_column, u32_column, u64_column,
    RepositoryError,
};
use crate::DbPool;

const OUTCOME_COLUMNS: &str = "run_id, role, total_steps, succeeded_steps, failed_steps,
    denied_steps, gates_approved, gates_rejected, gates_expired, total_attempts, quality_score,
    objective_met, latency_ms, total_tokens, total_cost_usd, evaluated_at";

pub struct SqlOutcomeRepository {
    pool: DbPool,
}

impl SqlOutcomeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_outcome(row: &SqliteRow) -> Result<OutcomeRecord, RepositoryError> {
    let objective: String = column(row, "objective_met")?;
    let score = u32_column(row, "quality_score")?;
    Ok(OutcomeRecord {
        run_id: RunId(column(row, "run_id")?),
        role: role_column(row, "role")?,
        total_steps: u32_column(row, "total_steps")?,
        succeeded_steps: u32_column(row, "succeeded_steps")?,
        failed_steps: u32_column(row, "failed_steps")?,
        denied_steps: u32_column(row, "denied_steps")?,
        gates_approved: u32_column(row, "gates_approved")?,
        gates_rejected: u32_column(row, "gates_rejected")?,
        gates_expired: u32_column(row, "gates_expired")?,
        total_attempts: u32_column(row, "total_attempts")?,
        quality_score: u8::try_from(score)
            .map_err(|_| RepositoryError::Decode(format!("quality_score out of range: {score}")))?,
        objective_met: ObjectiveMet::parse(&objective).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown objective_met `{objective}`"))
        })?,
        latency_ms: column(row, "latency_ms")?,
        total_tokens: u64_column(row, "total_tokens")?,
        total_cost_usd: decimal_column(row, "total_cost_usd")?,
        evaluated_at: ts_column(row, "evaluated_at")?,
    })
}

#[async_trait]
impl OutcomeRepository for SqlOutcomeRepository {
    async fn insert_if_absent(&self, record: OutcomeRecord) -> Result<OutcomeRecord, StoreError> {
        sqlx::query(
            "INSERT INTO run_outcomes (run_id, role, total_steps, succeeded_steps, failed_steps,
                                       denied_steps, gates_approved, gates_rejected,
                                       gates_expired, total_attempts, quality_score,
                                       objective_met, latency_ms, total_tokens, total_cost_usd,
                                       evaluated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(run_id) DO NOTHING",
        )
        .bind(&record.run_id.0)
        .bind(record.role.as_str())
        .bind(i64::from(record.total_steps))
        .bind(i64::from(record.succeeded_steps))
        .bind(i64::from(record.failed_steps))
        .bind(i64::from(record.denied_steps))
        .bind(i64::from(record.gates_approved))
        .bind(i64::from(record.gates_rejected))
        .bind(i64::from(record.gates_expired))
        .bind(i64::from(record.total_attempts))
        .bind(i64::from(record.quality_score))
        .bind(record.objective_met.as_str())
        .bind(record.latency_ms)
        .bind(i64::try_from(record.total_tokens).unwrap_or(i64::MAX))
        .bind(record.total_cost_usd.to_string())
        .bind(encode_ts(record.evaluated_at))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        self.find(&record.run_id)
            .await?
            .ok_or_else(|| StoreError::Persistence(format!("outcome for {} vanished", record.run_id)))
    }

    async fn find(&self, run_id: &RunId) -> Result<Option<OutcomeRecord>, StoreError> {
        let row =
            sqlx::query(&format!("SELECT {OUTCOME_COLUMNS} FROM run_outcomes WHERE run_id = ?"))
                .bind(&run_id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        Ok(row.as_ref().map(row_to_outcome).transpose()?)
    }

    async fn list(&self, filter: &OutcomeFilter) -> Result<Vec<OutcomeRecord>, StoreError> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {OUTCOME_COLUMNS} FROM run_outcomes WHERE 1=1"));
        if let Some(role) = filter.role {
            builder.push(" AND role = ").push_bind(role.as_str());
        }
        if let Some(since) = filter.since {
            builder.push(" AND evaluated_at >= ").push_bind(encode_ts(since));
        }
        if let Some(until) = filter.until {
            builder.push(" AND evaluated_at < ").push_bind(encode_ts(until));
        }
        builder.push(" ORDER BY evaluated_at ASC");

        let rows = builder.build().fetch_all(&self.pool).await.map_err(db_error)?;
        Ok(rows.iter().map(row_to_outcome).collect::<Result<Vec<_>, _>>()?)
    }
}
