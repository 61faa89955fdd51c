use actiongate_core::domain::action::ArgumentKind;
use actiongate_core::{ActionDefinition, ActorRole, RateLimitPolicy, RouterDefinition};
use serde_json::json;

const B2B: &[ActorRole] = &[ActorRole::Admin, ActorRole::Recruiter];

pub fn routers() -> Vec<RouterDefinition> {
    vec![suite()]
}

fn suite() -> RouterDefinition {
    RouterDefinition::new("b2b_suite", "Carrier account sales pipeline and research", B2B)
        .action(
            ActionDefinition::suggest("getMatchIntelligence", "b2bAgentService.getMatchIntelligence")
                .actor_arg("userId")
                .all_params("filters"),
        )
        .action(
            ActionDefinition::read("getOpportunities", "b2bPipelineService.getOpportunities")
                .actor_arg("userId")
                .optional_typed("stage", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("updateOpportunityStage", "b2bAgentService.updateOpportunityStage")
                .actor_arg("userId")
                .typed_param("opportunityId", ArgumentKind::String)
                .typed_param("stage", ArgumentKind::String),
        )
        .action(
            ActionDefinition::sensitive("createOutreach", "b2bAgentService.createOutreach")
                .describe("Send an outbound sales sequence to a carrier account")
                .actor_arg("userId")
                .typed_param("accountId", ArgumentKind::String)
                .typed_param("channel", ArgumentKind::String)
                .typed_param("message", ArgumentKind::String)
                .requires_approval(
                    &[ActorRole::Admin],
                    "Start {{ channel }} outreach to account {{ accountId }}",
                )
                .rate_limited(RateLimitPolicy::per_argument("accountId", 3, 86_400)),
        )
        .action(
            ActionDefinition::write("runResearchAgent", "b2bAgentService.runResearchAgent")
                .actor_arg("userId")
                .typed_param("accountId", ArgumentKind::String)
                .rate_limited(RateLimitPolicy::global(30, 3_600)),
        )
        .action(
            ActionDefinition::read("getResearchResults", "b2bAgentService.getResearchResults")
                .actor_arg("userId")
                .typed_param("accountId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getAccount", "b2bAccountService.getAccount")
                .typed_param("accountId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getSignals", "b2bMatchSignalService.getSignals")
                .typed_param("accountId", ArgumentKind::String)
                .defaulted("limit", ArgumentKind::Integer, json!(25)),
        )
        .action(
            ActionDefinition::write("enrichCarrier", "aiEnrichment.enrichCarrier")
                .renamed("dotNumber", "carrierDot", ArgumentKind::String)
                .rate_limited(RateLimitPolicy::global(60, 3_600)),
        )
        .action(
            ActionDefinition::read("getTasks", "b2bAgentService.getTasks")
                .actor_arg("userId")
                .defaulted("status", ArgumentKind::String, json!("open")),
        )
        .action(
            ActionDefinition::write("createTask", "b2bAgentService.createTask")
                .actor_arg("userId")
                .typed_param("accountId", ArgumentKind::String)
                .typed_param("title", ArgumentKind::String)
                .optional_typed("dueOn", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("completeTask", "b2bAgentService.completeTask")
                .actor_arg("userId")
                .typed_param("taskId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getContacts", "b2bAgentService.getContacts")
                .typed_param("accountId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("addContact", "b2bAgentService.addContact")
                .actor_arg("userId")
                .typed_param("accountId", ArgumentKind::String)
                .typed_param("name", ArgumentKind::String)
                .optional_typed("email", ArgumentKind::String)
                .optional_typed("phone", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getNotes", "b2bAgentService.getNotes")
                .typed_param("accountId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("addNote", "b2bAgentService.addNote")
                .actor_arg("userId")
                .typed_param("accountId", ArgumentKind::String)
                .typed_param("body", ArgumentKind::String),
        )
        .action(
            ActionDefinition::suggest("getAccountScore", "b2bAgentService.getAccountScore")
                .typed_param("accountId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::suggest("findMatchingCarriers", "carrierMatching.findMatchingCarriers")
                .all_params("criteria"),
        )
}
