use actiongate_core::{ActorRole, RunId, RunLedger, RunQuery, RunStatus};
use actiongate_db::SqlRunLedger;

use crate::commands::{block_on, load_config, open_pool, CommandResult, Failure};

pub fn trace(run_id: &str) -> CommandResult {
    const COMMAND: &str = "runs.trace";
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let run_id = RunId(run_id.to_string());
    let result = block_on(COMMAND, async {
        let pool = open_pool(&config).await?;
        let trace = SqlRunLedger::new(pool.clone()).run_trace(&run_id).await;
        pool.close().await;
        Ok::<_, Failure>(trace?)
    });

    match result {
        Ok(trace) => {
            let message = format!(
                "run {} is {} with {} steps and {} gates",
                trace.run.run_id,
                trace.run.status.as_str(),
                trace.steps.len(),
                trace.gates.len()
            );
            CommandResult::report(COMMAND, message, &trace)
        }
        Err(result) => result,
    }
}

pub fn list(
    actor_id: Option<&str>,
    role: Option<&str>,
    status: Option<&str>,
    limit: usize,
) -> CommandResult {
    const COMMAND: &str = "runs.list";
    let query = match build_query(actor_id, role, status, limit) {
        Ok(query) => query,
        Err(failure) => return failure.into_result(COMMAND),
    };
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = block_on(COMMAND, async {
        let pool = open_pool(&config).await?;
        let runs = SqlRunLedger::new(pool.clone()).list_runs(&query).await;
        pool.close().await;
        Ok::<_, Failure>(runs?)
    });

    match result {
        Ok(runs) => CommandResult::report(COMMAND, format!("{} runs", runs.len()), &runs),
        Err(result) => result,
    }
}

fn build_query(
    actor_id: Option<&str>,
    role: Option<&str>,
    status: Option<&str>,
    limit: usize,
) -> Result<RunQuery, Failure> {
    let role = role
        .map(|value| {
            ActorRole::parse(value)
                .ok_or_else(|| Failure::invalid_input(format!("unknown role `{value}`")))
        })
        .transpose()?;
    let status = status
        .map(|value| {
            RunStatus::parse(value)
                .ok_or_else(|| Failure::invalid_input(format!("unknown run status `{value}`")))
        })
        .transpose()?;

    Ok(RunQuery {
        actor_id: actor_id.map(str::to_string),
        role,
        status,
        limit: Some(limit),
        ..RunQuery::default()
    })
}
