use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use actiongate_core::domain::action::ActorRole;
use actiongate_core::domain::run::Actor;
use actiongate_core::errors::StoreError;

pub mod conversation;
pub mod ledger;
pub mod outcome;
pub mod rate_limit;

pub use conversation::SqlConversationStore;
pub use ledger::SqlRunLedger;
pub use outcome::SqlOutcomeRepository;
pub use rate_limit::SqlRateLimitStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        StoreError::Persistence(error.to_string())
    }
}

pub(crate) fn db_error(error: sqlx::Error) -> StoreError {
    RepositoryError::Database(error).into()
}

/// Fixed-width timestamps so that text comparison in SQL matches chronological order.
pub(crate) fn encode_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_ts(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|error| RepositoryError::Decode(error.to_string()))
}

pub(crate) fn ts_column(row: &SqliteRow, name: &str) -> Result<DateTime<Utc>, RepositoryError> {
    let raw: String = column(row, name)?;
    decode_ts(&raw)
}

pub(crate) fn optional_ts_column(
    row: &SqliteRow,
    name: &str,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    let raw: Option<String> = column(row, name)?;
    raw.as_deref().map(decode_ts).transpose()
}

pub(crate) fn json_column(row: &SqliteRow, name: &str) -> Result<Value, RepositoryError> {
    let raw: String = column(row, name)?;
    decode_json(&raw)
}

pub(crate) fn optional_json_column(
    row: &SqliteRow,
    name: &str,
) -> Result<Option<Value>, RepositoryError> {
    let raw: Option<String> = column(row, name)?;
    raw.as_deref().map(decode_json).transpose()
}

fn decode_json(raw: &str) -> Result<Value, RepositoryError> {
    serde_json::from_str(raw).map_err(|error| RepositoryError::Decode(error.to_string()))
}

pub(crate) fn decimal_column(row: &SqliteRow, name: &str) -> Result<Decimal, RepositoryError> {
    let raw: String = column(row, name)?;
    raw.parse::<Decimal>()
        .map_err(|error| RepositoryError::Decode(format!("invalid decimal `{raw}`: {error}")))
}

pub(crate) fn role_column(row: &SqliteRow, name: &str) -> Result<ActorRole, RepositoryError> {
    let raw: String = column(row, name)?;
    ActorRole::parse(&raw).ok_or_else(|| RepositoryError::Decode(format!("unknown role `{raw}`")))
}

pub(crate) fn actor_columns(row: &SqliteRow) -> Result<Actor, RepositoryError> {
    Ok(Actor { id: column(row, "actor_id")?, role: role_column(row, "actor_role")? })
}

pub(crate) fn u32_column(row: &SqliteRow, name: &str) -> Result<u32, RepositoryError> {
    let raw: i64 = column(row, name)?;
    u32::try_from(raw).map_err(|_| RepositoryError::Decode(format!("{name} out of range: {raw}")))
}

pub(crate) fn u64_column(row: &SqliteRow, name: &str) -> Result<u64, RepositoryError> {
    let raw: i64 = column(row, name)?;
    u64::try_from(raw).map_err(|_| RepositoryError::Decode(format!("{name} out of range: {raw}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{connect_with_settings, migrations, DbPool};

    pub async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }
}
