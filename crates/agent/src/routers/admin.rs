use actiongate_core::domain::action::ArgumentKind;
use actiongate_core::{ActionDefinition, ActorRole, RateLimitPolicy, RouterDefinition};
use serde_json::json;

const ADMIN: &[ActorRole] = &[ActorRole::Admin];

pub fn routers() -> Vec<RouterDefinition> {
    vec![operations()]
}

fn operations() -> RouterDefinition {
    RouterDefinition::new("admin_ops", "Platform operations, prompts and remediation", ADMIN)
        .action(
            ActionDefinition::read("getDashboardStats", "admin_dashboard_service.getDashboardStats")
                .defaulted("periodDays", ArgumentKind::Integer, json!(7)),
        )
        .action(
            ActionDefinition::read("getDrivers", "admin_service.getDrivers").all_params("filters"),
        )
        .action(
            ActionDefinition::read("getMetrics", "observabilityService.getMetrics")
                .typed_param("metric", ArgumentKind::String)
                .defaulted("windowMinutes", ArgumentKind::Integer, json!(60)),
        )
        .action(
            ActionDefinition::read("getPipelineHealth", "pipelineExecutionAgent.getPipelineHealth"),
        )
        .action(
            ActionDefinition::suggest("triageIssue", "selfHealingService.triageIssue")
                .actor_arg("adminId")
                .typed_param("issueId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::sensitive("executeRemediation", "selfHealingService.executeRemediation")
                .describe("Run an automated remediation playbook against production data")
                .actor_arg("adminId")
                .typed_param("issueId", ArgumentKind::String)
                .typed_param("playbook", ArgumentKind::String)
                .requires_approval(ADMIN, "Run remediation {{ playbook }} for issue {{ issueId }}")
                .rate_limited(RateLimitPolicy::global(10, 3_600)),
        )
        .action(
            ActionDefinition::read("getPrompts", "promptLibraryService.getPrompts")
                .optional_typed("category", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getActivePrompt", "promptLibraryService.getActivePrompt")
                .typed_param("promptKey", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("createPrompt", "promptLibraryService.createPrompt")
                .actor_arg("adminId")
                .typed_param("promptKey", ArgumentKind::String)
                .typed_param("template", ArgumentKind::String),
        )
        .action(
            ActionDefinition::sensitive("updatePrompt", "promptLibraryService.updatePrompt")
                .actor_arg("adminId")
                .typed_param("promptKey", ArgumentKind::String)
                .typed_param("template", ArgumentKind::String)
                .requires_approval(ADMIN, "Replace the live prompt {{ promptKey }}"),
        )
        .action(
            ActionDefinition::sensitive("startAutopilot", "autopilotService.startAutopilot")
                .actor_arg("adminId")
                .typed_param("workflow", ArgumentKind::String)
                .requires_approval(ADMIN, "Start autopilot workflow {{ workflow }}"),
        )
        .action(
            ActionDefinition::read("getAutopilotStatus", "autopilotService.getAutopilotStatus")
                .optional_typed("workflow", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("triggerKnowledgeCurator", "compendiumService.triggerKnowledgeCurator")
                .actor_arg("adminId")
                .rate_limited(RateLimitPolicy::global(2, 3_600)),
        )
        .action(
            ActionDefinition::read("listMetaIntegrations", "metaGovernanceService.listMetaIntegrations"),
        )
}
