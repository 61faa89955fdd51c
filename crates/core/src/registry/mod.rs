//! Static action catalogue assembled from per-domain router definitions.
//!
//! The registry is built once at startup and is immutable afterwards. Every structural
//! problem (duplicate names, missing targets, approval policies with no approver) is
//! reported by [`ActionRegistry::build`] rather than at dispatch time.

pub mod mapping;
pub mod targets;

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};
use tracing::warn;

use crate::domain::action::{
    ActionDefinition, ActionName, ActorRole, ApprovalPolicy, ArgumentSource, RateLimitScope,
    SideEffectClass,
};
use crate::errors::{DispatchError, RegistryError};

pub use mapping::MappedArguments;
pub use targets::{InvocationRequest, OperationCatalog, TargetOperation};

/// One domain router: a namespace of actions plus the roles it serves.
#[derive(Clone, Debug)]
pub struct RouterDefinition {
    pub name: String,
    pub description: String,
    pub roles: Vec<ActorRole>,
    pub actions: Vec<ActionDefinition>,
}

impl RouterDefinition {
    pub fn new(name: &str, description: &str, roles: &[ActorRole]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            roles: roles.to_vec(),
            actions: Vec::new(),
        }
    }

    pub fn action(mut self, action: ActionDefinition) -> Self {
        self.actions.push(action);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouterSummary {
    pub name: String,
    pub description: String,
    pub roles: Vec<ActorRole>,
    pub action_count: usize,
}

pub struct ActionRegistry {
    actions: BTreeMap<ActionName, ActionDefinition>,
    routers: Vec<RouterSummary>,
    templates: Tera,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions.len())
            .field("routers", &self.routers)
            .finish()
    }
}

impl ActionRegistry {
    pub fn build(routers: Vec<RouterDefinition>) -> Result<Self, RegistryError> {
        let mut actions = BTreeMap::new();
        let mut summaries = Vec::with_capacity(routers.len());
        let mut templates = Tera::default();

        for router in routers {
            if router.roles.is_empty() {
                return Err(RegistryError::RouterWithoutRoles(router.name));
            }
            summaries.push(RouterSummary {
                name: router.name.clone(),
                description: router.description.clone(),
                roles: router.roles.clone(),
                action_count: router.actions.len(),
            });

            for mut definition in router.actions {
                definition.domain = router.name.clone();
                if definition.roles.is_empty() {
                    definition.roles = router.roles.clone();
                }
                validate_action(&definition)?;

                if let ApprovalPolicy::Required { reason_template, .. } = &definition.approval {
                    templates.add_raw_template(&definition.name.0, reason_template).map_err(
                        |error| RegistryError::InvalidTemplate {
                            action: definition.name.clone(),
                            reason: error.to_string(),
                        },
                    )?;
                }

                if actions.contains_key(&definition.name) {
                    return Err(RegistryError::DuplicateAction(definition.name));
                }
                actions.insert(definition.name.clone(), definition);
            }
        }

        Ok(Self { actions, routers: summaries, templates })
    }

    pub fn lookup(&self, name: &str) -> Result<&ActionDefinition, DispatchError> {
        self.get(name).ok_or_else(|| DispatchError::UnknownAction(ActionName(name.to_string())))
    }

    pub fn get(&self, name: &str) -> Option<&ActionDefinition> {
        self.actions.get(&ActionName(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionDefinition> {
        self.actions.values()
    }

    pub fn routers(&self) -> &[RouterSummary] {
        &self.routers
    }

    pub fn actions_for_role(&self, role: ActorRole) -> Vec<&ActionDefinition> {
        self.actions.values().filter(|definition| definition.allows_role(role)).collect()
    }

    /// Renders the approval reason for a gated action against the caller's arguments.
    /// Falls back to the raw template when a referenced argument is absent.
    pub fn render_reason(&self, definition: &ActionDefinition, args: &Value) -> String {
        let ApprovalPolicy::Required { reason_template, .. } = &definition.approval else {
            return format!("Approval required for {}", definition.name);
        };

        let mut context = Context::new();
        if let Value::Object(map) = args {
            for (key, value) in map {
                context.insert(key.as_str(), value);
            }
        }

        match self.templates.render(&definition.name.0, &context) {
            Ok(rendered) => rendered,
            Err(error) => {
                warn!(
                    event_name = "registry.reason_template.render_failed",
                    action = %definition.name,
                    error = %error,
                    "falling back to raw approval reason template"
                );
                reason_template.clone()
            }
        }
    }
}

fn validate_action(definition: &ActionDefinition) -> Result<(), RegistryError> {
    let action = &definition.name;
    let invalid = |reason: &str| RegistryError::InvalidPolicy {
        action: action.clone(),
        reason: reason.to_string(),
    };

    if action.0.trim().is_empty() {
        return Err(invalid("action name must not be empty"));
    }
    if !definition.target.is_complete() {
        return Err(RegistryError::MissingTarget(action.clone()));
    }
    if definition.side_effect != definition.risk_level.side_effect_class() {
        return Err(invalid("side-effect class does not match risk level"));
    }

    match (&definition.approval, definition.side_effect) {
        (ApprovalPolicy::Required { approver_roles, .. }, _) if approver_roles.is_empty() => {
            return Err(RegistryError::NoApprovalPath(action.clone()));
        }
        (ApprovalPolicy::Required { .. }, SideEffectClass::Sensitive) => {}
        (ApprovalPolicy::Required { .. }, _) => {
            return Err(invalid("approval gates are reserved for sensitive actions"));
        }
        (ApprovalPolicy::None, SideEffectClass::Sensitive) => {
            return Err(invalid("sensitive actions must require approval"));
        }
        (ApprovalPolicy::None, _) => {}
    }

    let mut seen = HashSet::new();
    for rule in &definition.arguments.rules {
        if rule.name.trim().is_empty() {
            return Err(invalid("argument names must not be empty"));
        }
        if !seen.insert(rule.name.as_str()) {
            return Err(invalid(&format!("argument `{}` is mapped twice", rule.name)));
        }
    }

    if let Some(policy) = &definition.rate_limit {
        if policy.max == 0 {
            return Err(invalid("rate limit max must be at least 1"));
        }
        if policy.window_secs <= 0 {
            return Err(invalid("rate limit window must be positive"));
        }
        let is_required_param = |field: &str| {
            definition.arguments.rules.iter().any(|rule| {
                rule.name == field && rule.required && matches!(rule.source, ArgumentSource::Param(_))
            })
        };
        if let RateLimitScope::Argument(field) = &policy.scope {
            if !is_required_param(field) {
                return Err(invalid(&format!(
                    "rate limit scope `{field}` must be a required mapped argument"
                )));
            }
        }
        if policy.compliance.is_some() {
            match &policy.recipient {
                Some(field) if is_required_param(field) => {}
                Some(field) => {
                    return Err(invalid(&format!(
                        "compliance recipient `{field}` must be a required mapped argument"
                    )));
                }
                None => return Err(invalid("compliance checks must name a recipient argument")),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ActionRegistry, RouterDefinition};
    use crate::domain::action::{ActionDefinition, ActorRole, RateLimitPolicy};
    use crate::errors::{DispatchError, RegistryError};

    fn outreach_router() -> RouterDefinition {
        RouterDefinition::new("recruiter_outreach", "Campaign outreach", &[ActorRole::Recruiter])
            .action(
                ActionDefinition::read("listCampaigns", "outreachService.listCampaigns")
                    .actor_arg("recruiterId"),
            )
            .action(
                ActionDefinition::sensitive("sendCampaign", "outreachService.sendCampaign")
                    .actor_arg("recruiterId")
                    .param("campaignId")
                    .param("carrierDot")
                    .requires_approval(
                        &[ActorRole::Recruiter, ActorRole::Admin],
                        "Send campaign {{ campaignId }} for carrier {{ carrierDot }}",
                    )
                    .rate_limited(RateLimitPolicy::per_argument("carrierDot", 1, 3600)),
            )
    }

    #[test]
    fn build_inherits_router_roles_and_domain() {
        let registry = ActionRegistry::build(vec![outreach_router()]).expect("registry");

        let definition = registry.lookup("listCampaigns").expect("declared");
        assert_eq!(definition.domain, "recruiter_outreach");
        assert_eq!(definition.roles, vec![ActorRole::Recruiter]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.routers()[0].action_count, 2);
        assert_eq!(registry.actions_for_role(ActorRole::Driver).len(), 0);
    }

    #[test]
    fn unknown_action_lookup_fails() {
        let registry = ActionRegistry::build(vec![outreach_router()]).expect("registry");
        assert!(matches!(
            registry.lookup("deleteEverything"),
            Err(DispatchError::UnknownAction(ref name)) if name.0 == "deleteEverything"
        ));
    }

    #[test]
    fn duplicate_names_across_routers_abort_build() {
        let other = RouterDefinition::new("admin", "Admin tools", &[ActorRole::Admin])
            .action(ActionDefinition::read("listCampaigns", "adminService.listCampaigns"));

        let error = ActionRegistry::build(vec![outreach_router(), other]).expect_err("duplicate");
        assert!(matches!(error, RegistryError::DuplicateAction(ref name) if name.0 == "listCampaigns"));
    }

    #[test]
    fn structural_policy_errors_are_reported() {
        let build_one = |definition: ActionDefinition| {
            ActionRegistry::build(vec![RouterDefinition::new("t", "t", &[ActorRole::Admin])
                .action(definition)])
        };

        assert!(matches!(
            build_one(ActionDefinition::read("orphan", "noService")),
            Err(RegistryError::MissingTarget(_))
        ));
        assert!(matches!(
            build_one(ActionDefinition::sensitive("wire", "payService.wire")),
            Err(RegistryError::InvalidPolicy { .. })
        ));
        assert!(matches!(
            build_one(
                ActionDefinition::sensitive("wire", "payService.wire").requires_approval(&[], "Wire")
            ),
            Err(RegistryError::NoApprovalPath(_))
        ));
        assert!(matches!(
            build_one(
                ActionDefinition::write("note", "crmService.note")
                    .requires_approval(&[ActorRole::Admin], "Note")
            ),
            Err(RegistryError::InvalidPolicy { .. })
        ));
        assert!(matches!(
            build_one(
                ActionDefinition::sensitive("wire", "payService.wire")
                    .requires_approval(&[ActorRole::Admin], "Wire {{ amount")
            ),
            Err(RegistryError::InvalidTemplate { .. })
        ));
        assert!(matches!(
            build_one(
                ActionDefinition::write("ping", "smsService.ping")
                    .rate_limited(RateLimitPolicy::per_argument("phone", 1, 60))
            ),
            Err(RegistryError::InvalidPolicy { .. })
        ));
        assert!(matches!(
            build_one(
                ActionDefinition::write("ping", "smsService.ping")
                    .rate_limited(RateLimitPolicy::per_actor(0, 60))
            ),
            Err(RegistryError::InvalidPolicy { .. })
        ));
        assert!(matches!(
            build_one(
                ActionDefinition::write("ping", "smsService.ping")
                    .param("message")
                    .rate_limited(RateLimitPolicy::per_actor(1, 60).with_compliance("quiet_hours", "phone"))
            ),
            Err(RegistryError::InvalidPolicy { ref reason, .. }) if reason.contains("recipient `phone`")
        ));
    }

    #[test]
    fn router_without_roles_is_rejected() {
        let error = ActionRegistry::build(vec![RouterDefinition::new("empty", "none", &[])])
            .expect_err("no roles");
        assert_eq!(error, RegistryError::RouterWithoutRoles("empty".to_string()));
    }

    #[test]
    fn reason_template_renders_caller_arguments() {
        let registry = ActionRegistry::build(vec![outreach_router()]).expect("registry");
        let definition = registry.lookup("sendCampaign").expect("declared");

        let reason =
            registry.render_reason(definition, &json!({"campaignId": "C-9", "carrierDot": "123"}));
        assert_eq!(reason, "Send campaign C-9 for carrier 123");

        let fallback = registry.render_reason(definition, &json!({}));
        assert_eq!(fallback, "Send campaign {{ campaignId }} for carrier {{ carrierDot }}");
    }
}
