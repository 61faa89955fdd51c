use std::sync::Arc;

use actiongate_agent::services::EchoBackend;
use actiongate_agent::{build_dispatcher, AgentRuntime, HttpAiRouter};
use actiongate_core::{Actor, ActorRole, AppConfig, OutcomeEvaluator, RunStatus};
use actiongate_db::{
    DbPool, SqlConversationStore, SqlOutcomeRepository, SqlRateLimitStore, SqlRunLedger,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::commands::{block_on, load_config, open_pool, CommandResult, Failure};

/// Runs one agent turn through the configured model. Actions are recorded in the ledger
/// and answered by the echo backend, so nothing leaves the process except the model call.
/// The run stays open while a gate is pending; otherwise it is completed and scored.
pub fn run(actor_id: &str, role: &str, message: &str, goal: Option<&str>) -> CommandResult {
    const COMMAND: &str = "ask";
    let Some(role) = ActorRole::parse(role) else {
        return Failure::invalid_input(format!("unknown role `{role}`")).into_result(COMMAND);
    };
    if message.trim().is_empty() {
        return Failure::invalid_input("message must not be empty").into_result(COMMAND);
    }
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let router = match HttpAiRouter::from_config(&config.ai) {
        Ok(router) => router,
        Err(error) => return Failure::new("ai_config", error.to_string(), 2).into_result(COMMAND),
    };

    let actor = Actor::new(actor_id, role);
    let goal = goal.map(str::to_string);
    let result = block_on(COMMAND, async {
        let pool = open_pool(&config).await?;
        let turn = converse(&config, &pool, router, actor, message, goal).await;
        pool.close().await;
        turn
    });

    match result {
        Ok(data) => {
            let summary = data["message"].as_str().unwrap_or_default().to_string();
            CommandResult::report(COMMAND, summary, &data)
        }
        Err(result) => result,
    }
}

async fn converse(
    config: &AppConfig,
    pool: &DbPool,
    router: HttpAiRouter,
    actor: Actor,
    message: &str,
    goal: Option<String>,
) -> Result<Value, Failure> {
    let ledger = Arc::new(SqlRunLedger::new(pool.clone()));
    let dispatcher = build_dispatcher(
        config,
        ledger.clone(),
        Arc::new(SqlRateLimitStore::new(pool.clone(), config.rate_limit.algorithm)),
        Arc::new(EchoBackend),
    )
    .map_err(|error| Failure::new("registry", error.to_string(), 9))?;
    let conversations =
        Arc::new(SqlConversationStore::with_max_turns(pool.clone(), config.conversation.max_turns));
    let evaluator =
        Arc::new(OutcomeEvaluator::new(ledger, Arc::new(SqlOutcomeRepository::new(pool.clone()))));
    let runtime =
        AgentRuntime::new(Arc::new(dispatcher), conversations, evaluator, Arc::new(router));

    let mut session = runtime.start_session(actor, goal, Utc::now()).await.map_err(agent_failure)?;
    let reply = runtime.handle_message(&mut session, message, Utc::now()).await.map_err(agent_failure)?;

    let run_id = session.run_id.clone();
    let conversation_id = session.conversation_id.0.clone();
    let pending_gates = session.pending_gates.clone();
    let evaluation = if pending_gates.is_empty() {
        runtime
            .finish_session(session, RunStatus::Completed, Utc::now())
            .await
            .map_err(agent_failure)?
    } else {
        None
    };

    Ok(json!({
        "run_id": run_id,
        "conversation_id": conversation_id,
        "message": reply.message,
        "decision": reply.decision.kind(),
        "reason_code": reply.decision.reason_code(),
        "action": reply.action,
        "outcome": reply.outcome,
        "pending_gates": pending_gates,
        "evaluation": evaluation,
    }))
}

fn agent_failure(error: anyhow::Error) -> Failure {
    Failure::new("agent", format!("{error:#}"), 7)
}
