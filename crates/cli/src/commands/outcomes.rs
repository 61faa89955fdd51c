use std::sync::Arc;

use actiongate_core::domain::outcome::OutcomeFilter;
use actiongate_core::outcome::OutcomeError;
use actiongate_core::{ActorRole, OutcomeEvaluator, RunId};
use actiongate_db::{DbPool, SqlOutcomeRepository, SqlRunLedger};
use chrono::{Duration, Utc};
use serde_json::json;

use crate::commands::{block_on, load_config, open_pool, CommandResult, Failure};

fn evaluator(pool: &DbPool) -> OutcomeEvaluator {
    OutcomeEvaluator::new(
        Arc::new(SqlRunLedger::new(pool.clone())),
        Arc::new(SqlOutcomeRepository::new(pool.clone())),
    )
}

/// Scores a completed run; repeated calls return the record written the first time.
pub fn evaluate(run_id: &str) -> CommandResult {
    const COMMAND: &str = "outcomes.evaluate";
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let run_id = RunId(run_id.to_string());
    let result = block_on(COMMAND, async {
        let pool = open_pool(&config).await?;
        let record = evaluator(&pool).evaluate_run(&run_id, Utc::now()).await;
        pool.close().await;
        record.map_err(outcome_failure)
    });

    match result {
        Ok(record) => {
            let message = format!(
                "run {} scored {} (objective met: {})",
                record.run_id,
                record.quality_score,
                record.objective_met.as_str()
            );
            CommandResult::report(COMMAND, message, &record)
        }
        Err(result) => result,
    }
}

pub fn stats(role: Option<&str>, since_hours: Option<i64>) -> CommandResult {
    const COMMAND: &str = "outcomes.stats";
    let role = match role.map(|value| (value, ActorRole::parse(value))) {
        None => None,
        Some((_, Some(role))) => Some(role),
        Some((value, None)) => {
            return Failure::invalid_input(format!("unknown role `{value}`")).into_result(COMMAND);
        }
    };
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let now = Utc::now();
    let filter = OutcomeFilter {
        role,
        since: since_hours.map(|hours| now - Duration::hours(hours)),
        until: None,
    };
    let result = block_on(COMMAND, async {
        let pool = open_pool(&config).await?;
        let evaluator = evaluator(&pool);
        let stats = evaluator.get_outcome_stats(&filter).await;
        let effectiveness = match filter.since {
            Some(since) => evaluator.action_effectiveness(since, now).await.map(Some),
            None => Ok(None),
        };
        pool.close().await;
        Ok::<_, Failure>((stats?, effectiveness?))
    });

    match result {
        Ok((stats, effectiveness)) => {
            let message = format!(
                "{} runs, average quality {:.1}",
                stats.total_runs, stats.avg_quality_score
            );
            CommandResult::report(
                COMMAND,
                message,
                &json!({ "stats": stats, "action_effectiveness": effectiveness }),
            )
        }
        Err(result) => result,
    }
}

/// Compares per-action success over the last `window_hours` against the window before it.
pub fn regressions(window_hours: i64) -> CommandResult {
    const COMMAND: &str = "outcomes.regressions";
    if window_hours <= 0 {
        return Failure::invalid_input("window must be at least one hour").into_result(COMMAND);
    }
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = block_on(COMMAND, async {
        let pool = open_pool(&config).await?;
        let regressions = evaluator(&pool)
            .detect_action_regressions(Utc::now(), Duration::hours(window_hours))
            .await;
        pool.close().await;
        Ok::<_, Failure>(regressions?)
    });

    match result {
        Ok(regressions) => CommandResult::report(
            COMMAND,
            format!("{} actions regressed", regressions.len()),
            &regressions,
        ),
        Err(result) => result,
    }
}

fn outcome_failure(error: OutcomeError) -> Failure {
    match error {
        OutcomeError::Store(error) => Failure::from(error),
        other => Failure::new("run_not_complete", other.to_string(), 8),
    }
}
