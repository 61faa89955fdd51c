use sqlx::migrate::{MigrateError, Migrator};
use tracing::info;

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await?;
    info!(
        event_name = "db.migrations.applied",
        known_migrations = MIGRATOR.iter().count(),
        "database schema is up to date"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_TABLES: &[&str] = &[
        "agent_runs",
        "run_steps",
        "approval_gates",
        "rate_limit_counters",
        "rate_limit_hits",
        "conversations",
        "conversation_turns",
        "run_outcomes",
    ];

    async fn table_names(pool: &sqlx::SqlitePool) -> Vec<String> {
        let mut names: Vec<String> =
            sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(pool)
                .await
                .expect("load tables")
                .into_iter()
                .map(|row| row.get::<String, _>("name"))
                .filter(|name| MANAGED_TABLES.contains(&name.as_str()))
                .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        assert_eq!(table_names(&pool).await.len(), MANAGED_TABLES.len());
    }

    #[tokio::test]
    async fn migrations_up_down_up_round_trip() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        let initial = table_names(&pool).await;

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(table_names(&pool).await.is_empty(), "all managed tables should be dropped");

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(table_names(&pool).await, initial);
    }
}
