use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionName(pub String);

impl ActionName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Driver,
    Recruiter,
    Carrier,
    Admin,
}

impl ActorRole {
    pub const ALL: [ActorRole; 4] = [Self::Driver, Self::Recruiter, Self::Carrier, Self::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::Recruiter => "recruiter",
            Self::Carrier => "carrier",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "driver" => Some(Self::Driver),
            "recruiter" => Some(Self::Recruiter),
            "carrier" => Some(Self::Carrier),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse side-effect class used for policy decisions.
///
/// `Sensitive` covers financial, legal, or irreversible-communication impact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectClass {
    Read,
    Write,
    Sensitive,
}

impl SideEffectClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Sensitive => "sensitive",
        }
    }
}

/// Finer-grained risk label carried alongside the side-effect class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Read,
    Suggest,
    ExecuteLow,
    ExecuteHigh,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Suggest => "suggest",
            Self::ExecuteLow => "execute_low",
            Self::ExecuteHigh => "execute_high",
        }
    }

    pub fn side_effect_class(&self) -> SideEffectClass {
        match self {
            Self::Read | Self::Suggest => SideEffectClass::Read,
            Self::ExecuteLow => SideEffectClass::Write,
            Self::ExecuteHigh => SideEffectClass::Sensitive,
        }
    }
}

/// Reference to the backend operation an action resolves to, written `service.function`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetRef {
    pub service: String,
    pub function: String,
}

impl TargetRef {
    pub fn new(service: impl Into<String>, function: impl Into<String>) -> Self {
        Self { service: service.into(), function: function.into() }
    }

    pub fn parse(value: &str) -> Self {
        match value.split_once('.') {
            Some((service, function)) => Self::new(service.trim(), function.trim()),
            None => Self::new(String::new(), value.trim()),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.service.is_empty() && !self.function.is_empty()
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.function)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalPolicy {
    None,
    Required { approver_roles: Vec<ActorRole>, reason_template: String },
}

impl ApprovalPolicy {
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Required { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum RateLimitScope {
    /// One quota per acting user.
    Actor,
    /// One quota per value of a mapped argument (e.g. a carrier DOT number).
    Argument(String),
    Global,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Shared channel counter; defaults to the action name when absent.
    pub channel: Option<String>,
    pub scope: RateLimitScope,
    pub window_secs: i64,
    pub max: u32,
    /// Name of a compliance predicate evaluated before the quota.
    pub compliance: Option<String>,
    /// Mapped argument naming who gets contacted; each value is checked by the predicate.
    #[serde(default)]
    pub recipient: Option<String>,
}

impl RateLimitPolicy {
    pub fn per_actor(max: u32, window_secs: i64) -> Self {
        Self { channel: None, scope: RateLimitScope::Actor, window_secs, max, compliance: None, recipient: None }
    }

    pub fn per_argument(field: impl Into<String>, max: u32, window_secs: i64) -> Self {
        Self {
            channel: None,
            scope: RateLimitScope::Argument(field.into()),
            window_secs,
            max,
            compliance: None,
            recipient: None,
        }
    }

    pub fn global(max: u32, window_secs: i64) -> Self {
        Self { channel: None, scope: RateLimitScope::Global, window_secs, max, compliance: None, recipient: None }
    }

    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Requires `predicate` to allow every value of the `recipient` argument before any quota is spent.
    pub fn with_compliance(mut self, predicate: impl Into<String>, recipient: impl Into<String>) -> Self {
        self.compliance = Some(predicate.into());
        self.recipient = Some(recipient.into());
        self
    }

    pub fn counter_name(&self, action: &ActionName) -> String {
        self.channel.clone().unwrap_or_else(|| action.0.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum ArgumentSource {
    /// Read from the caller-supplied parameter object under this key.
    Param(String),
    /// Injected from the acting user's id.
    ActorId,
    /// The whole caller-supplied parameter object.
    AllParams,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentKind {
    Any,
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ArgumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentRule {
    pub name: String,
    pub source: ArgumentSource,
    pub kind: ArgumentKind,
    pub required: bool,
    pub default: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentMapping {
    pub rules: Vec<ArgumentRule>,
}

impl ArgumentMapping {
    pub fn required_fields(&self) -> Vec<&str> {
        self.rules.iter().filter(|rule| rule.required).map(|rule| rule.name.as_str()).collect()
    }

    pub fn argument_names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name.as_str()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: ActionName,
    /// Router namespace the action was declared in; filled during registry assembly.
    pub domain: String,
    pub description: String,
    pub target: TargetRef,
    pub arguments: ArgumentMapping,
    pub side_effect: SideEffectClass,
    pub risk_level: RiskLevel,
    pub approval: ApprovalPolicy,
    pub rate_limit: Option<RateLimitPolicy>,
    /// Roles allowed to invoke the action; empty means "inherit from router".
    pub roles: Vec<ActorRole>,
}

impl ActionDefinition {
    pub fn new(name: &str, target: &str, risk_level: RiskLevel) -> Self {
        Self {
            name: ActionName(name.to_string()),
            domain: String::new(),
            description: String::new(),
            target: TargetRef::parse(target),
            arguments: ArgumentMapping::default(),
            side_effect: risk_level.side_effect_class(),
            risk_level,
            approval: ApprovalPolicy::None,
            rate_limit: None,
            roles: Vec::new(),
        }
    }

    pub fn read(name: &str, target: &str) -> Self {
        Self::new(name, target, RiskLevel::Read)
    }

    pub fn suggest(name: &str, target: &str) -> Self {
        Self::new(name, target, RiskLevel::Suggest)
    }

    pub fn write(name: &str, target: &str) -> Self {
        Self::new(name, target, RiskLevel::ExecuteLow)
    }

    pub fn sensitive(name: &str, target: &str) -> Self {
        Self::new(name, target, RiskLevel::ExecuteHigh)
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    fn rule(mut self, rule: ArgumentRule) -> Self {
        self.arguments.rules.push(rule);
        self
    }

    pub fn actor_arg(self, name: &str) -> Self {
        self.rule(ArgumentRule {
            name: name.to_string(),
            source: ArgumentSource::ActorId,
            kind: ArgumentKind::String,
            required: false,
            default: None,
        })
    }

    pub fn all_params(self, name: &str) -> Self {
        self.rule(ArgumentRule {
            name: name.to_string(),
            source: ArgumentSource::AllParams,
            kind: ArgumentKind::Object,
            required: false,
            default: None,
        })
    }

    pub fn param(self, name: &str) -> Self {
        self.typed_param(name, ArgumentKind::Any)
    }

    pub fn typed_param(self, name: &str, kind: ArgumentKind) -> Self {
        self.rule(ArgumentRule {
            name: name.to_string(),
            source: ArgumentSource::Param(name.to_string()),
            kind,
            required: true,
            default: None,
        })
    }

    pub fn optional(self, name: &str) -> Self {
        self.optional_typed(name, ArgumentKind::Any)
    }

    pub fn optional_typed(self, name: &str, kind: ArgumentKind) -> Self {
        self.rule(ArgumentRule {
            name: name.to_string(),
            source: ArgumentSource::Param(name.to_string()),
            kind,
            required: false,
            default: None,
        })
    }

    /// Reads `source` from the caller's parameters and passes it on as `name`.
    pub fn renamed(self, name: &str, source: &str, kind: ArgumentKind) -> Self {
        self.rule(ArgumentRule {
            name: name.to_string(),
            source: ArgumentSource::Param(source.to_string()),
            kind,
            required: true,
            default: None,
        })
    }

    pub fn defaulted(self, name: &str, kind: ArgumentKind, default: Value) -> Self {
        self.rule(ArgumentRule {
            name: name.to_string(),
            source: ArgumentSource::Param(name.to_string()),
            kind,
            required: false,
            default: Some(default),
        })
    }

    pub fn requires_approval(mut self, approver_roles: &[ActorRole], reason_template: &str) -> Self {
        self.approval = ApprovalPolicy::Required {
            approver_roles: approver_roles.to_vec(),
            reason_template: reason_template.to_string(),
        };
        self
    }

    pub fn rate_limited(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    pub fn roles(mut self, roles: &[ActorRole]) -> Self {
        self.roles = roles.to_vec();
        self
    }

    pub fn allows_role(&self, role: ActorRole) -> bool {
        self.roles.is_empty() || self.roles.contains(&role)
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionDefinition, ActorRole, RiskLevel, SideEffectClass, TargetRef};

    #[test]
    fn risk_levels_map_onto_side_effect_classes() {
        assert_eq!(RiskLevel::Read.side_effect_class(), SideEffectClass::Read);
        assert_eq!(RiskLevel::Suggest.side_effect_class(), SideEffectClass::Read);
        assert_eq!(RiskLevel::ExecuteLow.side_effect_class(), SideEffectClass::Write);
        assert_eq!(RiskLevel::ExecuteHigh.side_effect_class(), SideEffectClass::Sensitive);
    }

    #[test]
    fn target_ref_splits_service_and_function() {
        let target = TargetRef::parse("recruiterOutreachService.sendCampaignMessage");
        assert_eq!(target.service, "recruiterOutreachService");
        assert_eq!(target.function, "sendCampaignMessage");
        assert!(target.is_complete());

        assert!(!TargetRef::parse("orphanFunction").is_complete());
    }

    #[test]
    fn builder_collects_arguments_in_declaration_order() {
        let definition = ActionDefinition::write("saveJob", "driverCockpitService.saveJob")
            .actor_arg("driverId")
            .param("jobId")
            .optional("note");

        assert_eq!(definition.arguments.argument_names(), vec!["driverId", "jobId", "note"]);
        assert_eq!(definition.arguments.required_fields(), vec!["jobId"]);
        assert_eq!(definition.side_effect, SideEffectClass::Write);
    }

    #[test]
    fn empty_role_list_allows_everyone() {
        let open = ActionDefinition::read("getWeatherAlerts", "weatherService.getWeatherAlerts");
        assert!(open.allows_role(ActorRole::Carrier));

        let scoped = open.roles(&[ActorRole::Driver]);
        assert!(scoped.allows_role(ActorRole::Driver));
        assert!(!scoped.allows_role(ActorRole::Recruiter));
    }

    #[test]
    fn actor_roles_round_trip_from_storage_encoding() {
        for role in ActorRole::ALL {
            assert_eq!(ActorRole::parse(role.as_str()), Some(role));
        }
    }
}
