use actiongate_agent::routers::build_registry;
use actiongate_core::{ActionDefinition, ActorRole, RiskLevel};
use serde::Serialize;

use crate::commands::{CommandResult, Failure};

#[derive(Debug, Serialize)]
struct ActionRow<'a> {
    name: &'a str,
    router: &'a str,
    target: String,
    risk_level: RiskLevel,
    arguments: Vec<&'a str>,
    requires_approval: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    rate_limit: Option<String>,
}

impl<'a> From<&'a ActionDefinition> for ActionRow<'a> {
    fn from(definition: &'a ActionDefinition) -> Self {
        Self {
            name: definition.name.as_str(),
            router: &definition.domain,
            target: definition.target.to_string(),
            risk_level: definition.risk_level,
            arguments: definition.arguments.argument_names(),
            requires_approval: definition.approval.is_required(),
            rate_limit: definition.rate_limit.as_ref().map(|policy| {
                let counter = policy.counter_name(&definition.name);
                format!("{} per {}s on `{counter}`", policy.max, policy.window_secs)
            }),
        }
    }
}

/// Lists the action catalog, optionally narrowed to one role and one router.
pub fn run(role: Option<&str>, router: Option<&str>) -> CommandResult {
    match list(role, router) {
        Ok(result) => result,
        Err(failure) => failure.into_result("actions"),
    }
}

fn list(role: Option<&str>, router: Option<&str>) -> Result<CommandResult, Failure> {
    let role = role
        .map(|value| {
            ActorRole::parse(value)
                .ok_or_else(|| Failure::invalid_input(format!("unknown role `{value}`")))
        })
        .transpose()?;
    let registry = build_registry().map_err(|error| Failure::new("registry", error.to_string(), 9))?;

    let definitions: Vec<&ActionDefinition> = match role {
        Some(role) => registry.actions_for_role(role),
        None => registry.actions().collect(),
    };
    let rows: Vec<ActionRow<'_>> = definitions
        .into_iter()
        .filter(|definition| router.map_or(true, |router| definition.domain == router))
        .map(ActionRow::from)
        .collect();

    let gated = rows.iter().filter(|row| row.requires_approval).count();
    let message = format!("{} actions ({} require approval)", rows.len(), gated);
    Ok(CommandResult::report("actions", message, &rows))
}
