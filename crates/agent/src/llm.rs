use std::collections::VecDeque;
use std::fmt::Write as _;

use actiongate_core::domain::conversation::ConversationTurn;
use actiongate_core::{ActionDefinition, ActorRole, RiskLevel, RunId};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;

/// Catalog entry shown to the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionSummary {
    pub name: String,
    pub description: String,
    pub risk_level: RiskLevel,
    pub arguments: Vec<String>,
}

impl From<&ActionDefinition> for ActionSummary {
    fn from(definition: &ActionDefinition) -> Self {
        Self {
            name: definition.name.0.clone(),
            description: definition.description.clone(),
            risk_level: definition.risk_level,
            arguments: definition
                .arguments
                .argument_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AiRequestContext {
    pub role: ActorRole,
    pub run_id: RunId,
    pub history: Vec<ConversationTurn>,
    pub actions: Vec<ActionSummary>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub tokens: u64,
    pub cost_usd: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiRouteResponse {
    pub provider: String,
    pub model: String,
    pub response: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Upstream collaborator that picks a provider/model and returns its raw completion.
#[async_trait]
pub trait AiRouter: Send + Sync {
    async fn route_ai_request(
        &self,
        function_id: &str,
        prompt: &str,
        context: &AiRequestContext,
    ) -> Result<AiRouteResponse>;
}

pub fn function_id_for(role: ActorRole) -> String {
    format!("agent.{}.propose_action", role.as_str())
}

pub fn build_prompt(user_text: &str, context: &AiRequestContext) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You act for a {} user. Reply with JSON {{\"action\": name, \"params\": {{...}}}} to run an \
         action, or {{\"reply\": text}} to answer directly.",
        context.role.as_str()
    );
    let _ = writeln!(prompt, "\nAvailable actions:");
    for action in &context.actions {
        let _ = writeln!(
            prompt,
            "- {} [{}] ({}): {}",
            action.name,
            action.risk_level.as_str(),
            action.arguments.join(", "),
            action.description
        );
    }
    if !context.history.is_empty() {
        let _ = writeln!(prompt, "\nConversation so far:");
        for turn in &context.history {
            let _ = writeln!(prompt, "{}: {}", turn.role.as_str(), turn.content);
        }
    }
    let _ = write!(prompt, "\nUser: {user_text}");
    prompt
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActionProposal {
    pub action: String,
    pub params: Value,
    /// Optional text the model wants shown alongside the action.
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelReply {
    Action(ActionProposal),
    Message(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProposalError {
    #[error("model returned an empty response")]
    Empty,
    #[error("model response is not valid JSON: {0}")]
    Malformed(String),
    #[error("model proposal does not name an action")]
    MissingAction,
    #[error("model proposal parameters must be an object")]
    InvalidParams,
}

/// Interprets a raw completion. Plain text is a direct reply; anything that looks like
/// JSON must be a well-formed proposal.
pub fn parse_reply(raw: &str) -> Result<ModelReply, ProposalError> {
    let text = strip_code_fence(raw.trim());
    if text.is_empty() {
        return Err(ProposalError::Empty);
    }

    let Some(start) = text.find('{') else {
        return Ok(ModelReply::Message(text.to_string()));
    };
    let end = match text.rfind('}') {
        Some(end) if end > start => end,
        _ => return Err(ProposalError::Malformed("unbalanced braces".to_string())),
    };

    let value: Value = serde_json::from_str(&text[start..=end])
        .map_err(|error| ProposalError::Malformed(error.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(ProposalError::Malformed("expected a JSON object".to_string()));
    };

    let message = take_string(&mut object, "message");
    match object.remove("action") {
        Some(Value::String(action)) if !action.trim().is_empty() => {
            let params = match object.remove("params") {
                None | Some(Value::Null) => Value::Object(Map::new()),
                Some(params @ Value::Object(_)) => params,
                Some(_) => return Err(ProposalError::InvalidParams),
            };
            Ok(ModelReply::Action(ActionProposal { action: action.trim().to_string(), params, message }))
        }
        Some(_) => Err(ProposalError::MissingAction),
        None => match take_string(&mut object, "reply").or(message) {
            Some(reply) => Ok(ModelReply::Message(reply)),
            None => Err(ProposalError::MissingAction),
        },
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text),
        _ => None,
    }
}

/// Replays canned completions in order; used for offline sessions and tests.
pub struct ScriptedAiRouter {
    provider: String,
    model: String,
    responses: Mutex<VecDeque<AiRouteResponse>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedAiRouter {
    pub fn new(responses: impl IntoIterator<Item = &'static str>) -> Self {
        let provider = "scripted".to_string();
        let model = "scripted-v1".to_string();
        let responses = responses
            .into_iter()
            .map(|response| AiRouteResponse {
                provider: provider.clone(),
                model: model.clone(),
                response: response.to_string(),
                usage: TokenUsage::default(),
            })
            .collect();
        Self { provider, model, responses: Mutex::new(responses), calls: Mutex::new(Vec::new()) }
    }

    pub async fn push(&self, response: impl Into<String>, usage: TokenUsage) {
        self.responses.lock().await.push_back(AiRouteResponse {
            provider: self.provider.clone(),
            model: self.model.clone(),
            response: response.into(),
            usage,
        });
    }

    /// Function ids of every request received so far.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl AiRouter for ScriptedAiRouter {
    async fn route_ai_request(
        &self,
        function_id: &str,
        _prompt: &str,
        _context: &AiRequestContext,
    ) -> Result<AiRouteResponse> {
        self.calls.lock().await.push(function_id.to_string());
        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted response left for {function_id}"))
    }
}

#[cfg(test)]
mod tests {
    use actiongate_core::{ActorRole, RunId};
    use serde_json::json;

    use super::{
        build_prompt, function_id_for, parse_reply, ActionSummary, AiRequestContext, AiRouter,
        ModelReply, ProposalError, ScriptedAiRouter,
    };

    fn context() -> AiRequestContext {
        AiRequestContext {
            role: ActorRole::Driver,
            run_id: RunId("run-1".to_string()),
            history: Vec::new(),
            actions: vec![ActionSummary {
                name: "findParking".to_string(),
                description: "Find truck parking near a location".to_string(),
                risk_level: actiongate_core::RiskLevel::Read,
                arguments: vec!["lat".to_string(), "lng".to_string()],
            }],
        }
    }

    #[test]
    fn parses_fenced_action_proposal() {
        let reply = parse_reply(
            "```json\n{\"action\": \"findParking\", \"params\": {\"lat\": 35.1, \"lng\": -90.0}}\n```",
        )
        .expect("proposal");

        let ModelReply::Action(proposal) = reply else {
            panic!("expected an action proposal");
        };
        assert_eq!(proposal.action, "findParking");
        assert_eq!(proposal.params, json!({ "lat": 35.1, "lng": -90.0 }));
        assert_eq!(proposal.message, None);
    }

    #[test]
    fn missing_params_become_an_empty_object() {
        let reply = parse_reply(r#"Sure. {"action": "getDashboardSummary"}"#).expect("proposal");
        assert!(matches!(reply, ModelReply::Action(ref p) if p.params == json!({})));
    }

    #[test]
    fn plain_text_and_reply_objects_are_direct_messages() {
        assert_eq!(
            parse_reply("Parking near Memphis fills up after 6pm.").expect("text"),
            ModelReply::Message("Parking near Memphis fills up after 6pm.".to_string())
        );
        assert_eq!(
            parse_reply(r#"{"reply": "Which state are you in?"}"#).expect("reply"),
            ModelReply::Message("Which state are you in?".to_string())
        );
    }

    #[test]
    fn malformed_proposals_are_rejected() {
        assert_eq!(parse_reply("   "), Err(ProposalError::Empty));
        assert!(matches!(parse_reply(r#"{"action": "findParking", "#), Err(ProposalError::Malformed(_))));
        assert_eq!(parse_reply(r#"{"action": "", "params": {}}"#), Err(ProposalError::MissingAction));
        assert_eq!(parse_reply(r#"{"action": 42}"#), Err(ProposalError::MissingAction));
        assert_eq!(
            parse_reply(r#"{"action": "findParking", "params": [1, 2]}"#),
            Err(ProposalError::InvalidParams)
        );
        assert_eq!(parse_reply(r#"{"params": {}}"#), Err(ProposalError::MissingAction));
    }

    #[test]
    fn prompt_lists_role_scoped_actions() {
        let prompt = build_prompt("where can I park?", &context());
        assert!(prompt.contains("driver user"));
        assert!(prompt.contains("- findParking [read] (lat, lng)"));
        assert!(prompt.ends_with("User: where can I park?"));
    }

    #[tokio::test]
    async fn scripted_router_replays_in_order_then_fails() {
        let router = ScriptedAiRouter::new(["first", "second"]);
        let function_id = function_id_for(ActorRole::Driver);

        let first = router.route_ai_request(&function_id, "p", &context()).await.expect("first");
        let second = router.route_ai_request(&function_id, "p", &context()).await.expect("second");
        assert_eq!((first.response.as_str(), second.response.as_str()), ("first", "second"));
        assert_eq!(first.provider, "scripted");

        assert!(router.route_ai_request(&function_id, "p", &context()).await.is_err());
        assert_eq!(router.calls().await, vec!["agent.driver.propose_action".to_string(); 3]);
    }
}
