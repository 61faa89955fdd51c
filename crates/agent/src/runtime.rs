use std::sync::Arc;

use actiongate_core::context::ConversationStore;
use actiongate_core::domain::conversation::{ConversationId, NewTurn};
use actiongate_core::domain::run::{NewRun, RunUsage};
use actiongate_core::rate_limit::RateLimitStore;
use actiongate_core::{
    ActionName, Actor, AppConfig, DispatchContext, DispatchOutcome, Dispatcher, GateId,
    OutcomeEvaluator, OutcomeRecord, RateLimiter, RegistryError, RunId, RunLedger, RunStatus,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::{
    build_prompt, function_id_for, parse_reply, ActionProposal, ActionSummary, AiRequestContext,
    AiRouter, ModelReply,
};
use crate::routers::build_registry;
use crate::services::{operation_catalog, ServiceBackend};

pub const DEFAULT_CONTEXT_TURNS: usize = 12;

/// Wires the production catalog to `backend` with the configured limits and retries.
pub fn build_dispatcher(
    config: &AppConfig,
    ledger: Arc<dyn RunLedger>,
    rate_limits: Arc<dyn RateLimitStore>,
    backend: Arc<dyn ServiceBackend>,
) -> Result<Dispatcher, RegistryError> {
    let registry = Arc::new(build_registry()?);
    let catalog = operation_catalog(backend);
    let limiter = RateLimiter::new(rate_limits).with_predicate(config.quiet_hours());
    Ok(Dispatcher::new(registry, &catalog, ledger, limiter)?.with_config(config.dispatcher_config()))
}

/// One conversation with one actor, backed by one ledger run.
#[derive(Clone, Debug)]
pub struct AgentSession {
    pub run_id: RunId,
    pub conversation_id: ConversationId,
    pub actor: Actor,
    pub usage: RunUsage,
    pub actions_taken: u32,
    /// Gates opened in this session that have not produced a final outcome yet.
    pub pending_gates: Vec<GateId>,
}

#[derive(Clone, Debug)]
pub struct TurnReply {
    pub message: String,
    pub decision: GuardrailDecision,
    pub action: Option<ActionName>,
    pub outcome: Option<DispatchOutcome>,
}

pub struct AgentRuntime {
    dispatcher: Arc<Dispatcher>,
    conversations: Arc<dyn ConversationStore>,
    evaluator: Arc<OutcomeEvaluator>,
    ai: Arc<dyn AiRouter>,
    guardrails: GuardrailPolicy,
    context_turns: usize,
}

impl AgentRuntime {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        conversations: Arc<dyn ConversationStore>,
        evaluator: Arc<OutcomeEvaluator>,
        ai: Arc<dyn AiRouter>,
    ) -> Self {
        Self {
            dispatcher,
            conversations,
            evaluator,
            ai,
            guardrails: GuardrailPolicy::default(),
            context_turns: DEFAULT_CONTEXT_TURNS,
        }
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailPolicy) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn with_context_turns(mut self, context_turns: usize) -> Self {
        self.context_turns = context_turns.max(1);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn start_session(
        &self,
        actor: Actor,
        goal: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<AgentSession> {
        let conversation = self.conversations.create_conversation(&actor, now).await?;
        let run = self
            .dispatcher
            .ledger()
            .start_run(
                &actor,
                NewRun { conversation_id: Some(conversation.conversation_id.0.clone()), goal },
                now,
            )
            .await?;

        info!(
            event_name = "agent.session.started",
            run_id = %run.run_id,
            conversation_id = %conversation.conversation_id.0,
            role = %actor.role,
            "agent session started"
        );
        Ok(AgentSession {
            run_id: run.run_id,
            conversation_id: conversation.conversation_id,
            actor,
            usage: RunUsage::default(),
            actions_taken: 0,
            pending_gates: Vec::new(),
        })
    }

    /// Handles one user message: ask the model, screen its proposal, dispatch, and record
    /// every turn in the conversation.
    pub async fn handle_message(
        &self,
        session: &mut AgentSession,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<TurnReply> {
        let history =
            self.conversations.recent_context(&session.conversation_id, self.context_turns).await?;
        self.add_turn(session, NewTurn::user(text), now).await?;

        let context = AiRequestContext {
            role: session.actor.role,
            run_id: session.run_id.clone(),
            history,
            actions: self
                .dispatcher
                .registry()
                .actions_for_role(session.actor.role)
                .into_iter()
                .map(ActionSummary::from)
                .collect(),
        };
        let prompt = build_prompt(text, &context);
        let function_id = function_id_for(session.actor.role);

        let routed = match self.ai.route_ai_request(&function_id, &prompt, &context).await {
            Ok(routed) => routed,
            Err(error) => {
                warn!(
                    event_name = "agent.ai.route_failed",
                    run_id = %session.run_id,
                    function_id = %function_id,
                    error = %error,
                    "AI routing failed"
                );
                let decision = GuardrailDecision::Degrade {
                    reason_code: "ai_unavailable",
                    user_message: "The assistant is unavailable right now. Please try again shortly."
                        .to_string(),
                    fallback_path: "retry_later",
                    retry_after: None,
                };
                return self.reply(session, decision, None, None, now).await;
            }
        };
        session.usage.total_tokens += routed.usage.tokens;
        session.usage.total_cost_usd += routed.usage.cost_usd;

        let proposal = match parse_reply(&routed.response) {
            Ok(ModelReply::Message(message)) => {
                let decision = GuardrailDecision::Allow { user_message: message };
                return self.reply(session, decision, None, None, now).await;
            }
            Ok(ModelReply::Action(proposal)) => proposal,
            Err(error) => {
                warn!(
                    event_name = "agent.proposal.rejected",
                    run_id = %session.run_id,
                    provider = %routed.provider,
                    model = %routed.model,
                    error = %error,
                    "model proposal could not be parsed"
                );
                let decision = self.guardrails.translate_proposal_error(&error);
                return self.reply(session, decision, None, None, now).await;
            }
        };

        let risk = self.dispatcher.registry().get(&proposal.action).map(|definition| definition.risk_level);
        let screened = self.guardrails.evaluate_proposal(&proposal, risk, session.actions_taken);
        if !screened.is_allowed() {
            let action = ActionName(proposal.action.clone());
            return self.reply(session, screened, Some(action), None, now).await;
        }

        session.actions_taken += 1;
        let dispatch = DispatchContext::new(session.run_id.clone(), session.actor.clone());
        self.dispatch(session, proposal, dispatch, now).await
    }

    /// Re-enters an action whose gate has been resolved, using the approved arguments.
    pub async fn resume_approved(
        &self,
        session: &mut AgentSession,
        gate_id: &GateId,
        now: DateTime<Utc>,
    ) -> Result<TurnReply> {
        let gate = self
            .dispatcher
            .ledger()
            .get_gate(gate_id)
            .await?
            .ok_or_else(|| anyhow!("approval gate {gate_id} not found"))?;
        let proposal =
            ActionProposal { action: gate.action.0.clone(), params: Value::Null, message: None };
        let dispatch = DispatchContext::new(session.run_id.clone(), session.actor.clone())
            .with_approved_gate(gate_id.clone());
        self.dispatch(session, proposal, dispatch, now).await
    }

    /// Closes the run with the session's usage. Only completed runs are scored.
    pub async fn finish_session(
        &self,
        session: AgentSession,
        status: RunStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<OutcomeRecord>> {
        self.dispatcher.ledger().complete_run(&session.run_id, status, session.usage, now).await?;
        if status != RunStatus::Completed {
            info!(
                event_name = "agent.session.finished",
                run_id = %session.run_id,
                status = status.as_str(),
                "agent session finished without evaluation"
            );
            return Ok(None);
        }

        let outcome = self.evaluator.evaluate_run(&session.run_id, now).await?;
        info!(
            event_name = "agent.session.finished",
            run_id = %session.run_id,
            status = status.as_str(),
            quality_score = outcome.quality_score,
            "agent session finished"
        );
        Ok(Some(outcome))
    }

    async fn dispatch(
        &self,
        session: &mut AgentSession,
        proposal: ActionProposal,
        dispatch: DispatchContext,
        now: DateTime<Utc>,
    ) -> Result<TurnReply> {
        let action = ActionName(proposal.action.clone());
        let resumed_gate = dispatch.approved_gate.clone();
        let result =
            self.dispatcher.execute_at(&proposal.action, proposal.params, &dispatch, now).await;

        let (decision, outcome, tool_content) = match result {
            Ok(outcome) => {
                let decision = self.guardrails.translate_outcome(&outcome);
                let content = serde_json::to_string(&outcome)?;
                (decision, Some(outcome), content)
            }
            Err(error) => {
                let content = json!({
                    "status": "error",
                    "class": error.class(),
                    "message": error.to_string(),
                })
                .to_string();
                (self.guardrails.translate_error(error, &dispatch.correlation_id), None, content)
            }
        };

        if let Some(gate_id) = &resumed_gate {
            if !matches!(outcome, Some(DispatchOutcome::PendingApproval { .. })) {
                session.pending_gates.retain(|pending| pending != gate_id);
            }
        }
        if let Some(DispatchOutcome::PendingApproval { gate_id, .. }) = &outcome {
            if !session.pending_gates.contains(gate_id) {
                session.pending_gates.push(gate_id.clone());
            }
        }

        self.add_turn(session, NewTurn::tool(action.clone(), tool_content), now).await?;

        let decision = match (decision, proposal.message) {
            (GuardrailDecision::Allow { .. }, Some(message)) => {
                GuardrailDecision::Allow { user_message: message }
            }
            (decision, _) => decision,
        };
        self.reply(session, decision, Some(action), outcome, now).await
    }

    async fn reply(
        &self,
        session: &AgentSession,
        decision: GuardrailDecision,
        action: Option<ActionName>,
        outcome: Option<DispatchOutcome>,
        now: DateTime<Utc>,
    ) -> Result<TurnReply> {
        let message = decision.user_message().to_string();
        self.add_turn(session, NewTurn::assistant(message.clone()), now).await?;
        Ok(TurnReply { message, decision, action, outcome })
    }

    async fn add_turn(&self, session: &AgentSession, turn: NewTurn, now: DateTime<Utc>) -> Result<()> {
        self.conversations
            .add_turn(&session.conversation_id, turn.in_run(session.run_id.clone()), now)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actiongate_core::context::ConversationStore;
    use actiongate_core::domain::conversation::TurnRole;
    use actiongate_core::{
        Actor, ActorRole, AppConfig, DispatchOutcome, GateDecision, InMemoryConversationStore,
        InMemoryOutcomeRepository, InMemoryRateLimitStore, InMemoryRunLedger, ObjectiveMet,
        OutcomeEvaluator, Resolver, RunLedger, RunStatus, StepStatus, WindowAlgorithm,
    };
    use chrono::{DateTime, TimeZone, Utc};

    use super::{build_dispatcher, AgentRuntime};
    use crate::guardrails::GuardrailDecision;
    use crate::llm::ScriptedAiRouter;
    use crate::services::EchoBackend;

    struct Harness {
        runtime: AgentRuntime,
        ledger: Arc<InMemoryRunLedger>,
        conversations: Arc<InMemoryConversationStore>,
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 17, 0, 0).unwrap()
    }

    fn harness(responses: Vec<&'static str>) -> Harness {
        let ledger = Arc::new(InMemoryRunLedger::new());
        let conversations = Arc::new(InMemoryConversationStore::default());
        let dispatcher = build_dispatcher(
            &AppConfig::default(),
            ledger.clone(),
            Arc::new(InMemoryRateLimitStore::new(WindowAlgorithm::Fixed)),
            Arc::new(EchoBackend),
        )
        .expect("dispatcher");
        let evaluator =
            OutcomeEvaluator::new(ledger.clone(), Arc::new(InMemoryOutcomeRepository::default()));
        let runtime = AgentRuntime::new(
            Arc::new(dispatcher),
            conversations.clone(),
            Arc::new(evaluator),
            Arc::new(ScriptedAiRouter::new(responses)),
        );
        Harness { runtime, ledger, conversations }
    }

    #[tokio::test]
    async fn read_action_completes_and_is_recorded_in_the_conversation() {
        let harness = harness(vec![
            r#"{"action": "findParking", "params": {"lat": 35.14, "lng": -90.05}}"#,
        ]);
        let mut session = harness
            .runtime
            .start_session(Actor::new("driver-7", ActorRole::Driver), Some("park".to_string()), now())
            .await
            .expect("session");

        let reply = harness
            .runtime
            .handle_message(&mut session, "find me parking near Memphis", now())
            .await
            .expect("reply");
        assert_eq!(reply.decision, GuardrailDecision::Allow { user_message: "Done.".to_string() });
        assert!(matches!(reply.outcome, Some(DispatchOutcome::Completed { attempts: 1, .. })));

        let turns = harness
            .conversations
            .recent_context(&session.conversation_id, 10)
            .await
            .expect("turns");
        let roles: Vec<TurnRole> = turns.iter().map(|turn| turn.role).collect();
        assert_eq!(roles, vec![TurnRole::User, TurnRole::Tool, TurnRole::Assistant]);
        assert_eq!(turns[1].action.as_ref().map(|action| action.as_str()), Some("findParking"));

        let run_id = session.run_id.clone();
        let outcome = harness
            .runtime
            .finish_session(session, RunStatus::Completed, now())
            .await
            .expect("finish")
            .expect("completed runs are scored");
        assert_eq!(outcome.run_id, run_id);
        assert_eq!(outcome.quality_score, 100);
        assert_eq!(outcome.objective_met, ObjectiveMet::Yes);
    }

    #[tokio::test]
    async fn campaign_waits_for_approval_then_resumes_once() {
        let harness = harness(vec![
            r#"{"action": "sendCampaignMessage", "params": {"campaignId": "spring", "carrierDot": "123456"}}"#,
        ]);
        let mut session = harness
            .runtime
            .start_session(Actor::new("rec-1", ActorRole::Recruiter), None, now())
            .await
            .expect("session");

        let reply =
            harness.runtime.handle_message(&mut session, "send the spring campaign", now()).await.expect("reply");
        let GuardrailDecision::Wait { gate_id, .. } = reply.decision else {
            panic!("expected a waiting decision, got {:?}", reply.decision);
        };
        assert_eq!(session.pending_gates, vec![gate_id.clone()]);

        let steps = harness.ledger.list_steps(&session.run_id).await.expect("steps");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, StepStatus::AwaitingApproval);

        harness
            .runtime
            .dispatcher()
            .gates()
            .resolve_gate(
                &gate_id,
                GateDecision::Approve,
                &Resolver { id: "lead-1".to_string(), role: ActorRole::Admin },
                now(),
            )
            .await
            .expect("approve");

        let resumed =
            harness.runtime.resume_approved(&mut session, &gate_id, now()).await.expect("resume");
        assert!(matches!(
            resumed.outcome,
            Some(DispatchOutcome::Completed { replayed: false, .. })
        ));
        assert!(session.pending_gates.is_empty());

        let replay =
            harness.runtime.resume_approved(&mut session, &gate_id, now()).await.expect("replay");
        assert!(matches!(replay.outcome, Some(DispatchOutcome::Completed { replayed: true, .. })));

        let steps = harness.ledger.list_steps(&session.run_id).await.expect("steps");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, StepStatus::Succeeded);
        assert_eq!(steps[0].attempts, 1);
    }

    #[tokio::test]
    async fn malformed_model_output_never_reaches_the_ledger() {
        let harness = harness(vec![r#"{"action": "findParking", "params": "#]);
        let mut session = harness
            .runtime
            .start_session(Actor::new("driver-7", ActorRole::Driver), None, now())
            .await
            .expect("session");

        let reply = harness.runtime.handle_message(&mut session, "parking?", now()).await.expect("reply");
        assert!(matches!(
            reply.decision,
            GuardrailDecision::Degrade { reason_code: "malformed_proposal", .. }
        ));
        assert!(harness.ledger.list_steps(&session.run_id).await.expect("steps").is_empty());
        assert_eq!(session.actions_taken, 0);
    }

    #[tokio::test]
    async fn missing_argument_asks_for_clarification_and_logs_a_failed_step() {
        let harness = harness(vec![r#"{"action": "getJobDetails", "params": {}}"#]);
        let mut session = harness
            .runtime
            .start_session(Actor::new("driver-7", ActorRole::Driver), None, now())
            .await
            .expect("session");

        let reply =
            harness.runtime.handle_message(&mut session, "tell me about that job", now()).await.expect("reply");
        assert!(matches!(
            reply.decision,
            GuardrailDecision::Degrade { reason_code: "validation", fallback_path: "ask_for_details", .. }
        ));

        let steps = harness.ledger.list_steps(&session.run_id).await.expect("steps");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn exhausted_script_degrades_instead_of_failing_the_session() {
        let harness = harness(Vec::new());
        let mut session = harness
            .runtime
            .start_session(Actor::new("admin-1", ActorRole::Admin), None, now())
            .await
            .expect("session");

        let reply = harness.runtime.handle_message(&mut session, "status?", now()).await.expect("reply");
        assert!(matches!(reply.decision, GuardrailDecision::Degrade { reason_code: "ai_unavailable", .. }));
    }

    #[tokio::test]
    async fn aborted_session_closes_the_run_without_scoring_it() {
        let harness = harness(vec![
            r#"{"action": "findParking", "params": {"lat": 35.14, "lng": -90.05}}"#,
        ]);
        let mut session = harness
            .runtime
            .start_session(Actor::new("driver-7", ActorRole::Driver), None, now())
            .await
            .expect("session");
        harness.runtime.handle_message(&mut session, "parking?", now()).await.expect("reply");

        let run_id = session.run_id.clone();
        let outcome = harness
            .runtime
            .finish_session(session, RunStatus::Aborted, now())
            .await
            .expect("finish");
        assert!(outcome.is_none());

        let run = harness.ledger.get_run(&run_id).await.expect("lookup").expect("run");
        assert_eq!(run.status, RunStatus::Aborted);
    }
}
