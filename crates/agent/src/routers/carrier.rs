use actiongate_core::domain::action::ArgumentKind;
use actiongate_core::{ActionDefinition, ActorRole, RateLimitPolicy, RouterDefinition};
use serde_json::json;

const CARRIER: &[ActorRole] = &[ActorRole::Carrier];
const CARRIER_APPROVERS: &[ActorRole] = &[ActorRole::Carrier, ActorRole::Admin];

pub fn routers() -> Vec<RouterDefinition> {
    vec![fleet(), compliance(), communication()]
}

fn fleet() -> RouterDefinition {
    RouterDefinition::new("carrier_fleet", "Fleet roster, equipment and utilization", CARRIER)
        .action(
            ActionDefinition::read("getFleetRoster", "carrierFleetAgentService.getFleetRoster")
                .actor_arg("carrierId")
                .all_params("filters"),
        )
        .action(
            ActionDefinition::read("getDriverScorecard", "carrierFleetAgentService.getDriverScorecard")
                .actor_arg("carrierId")
                .typed_param("driverId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getEquipmentList", "carrierFleetAgentService.getEquipmentList")
                .actor_arg("carrierId")
                .optional_typed("equipmentType", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getEquipmentStatus", "carrierFleetAgentService.getEquipmentStatus")
                .actor_arg("carrierId")
                .typed_param("equipmentId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getFleetCapacity", "carrierFleetAgentService.getFleetCapacity")
                .actor_arg("carrierId"),
        )
        .action(
            ActionDefinition::read("getEldFleetSummary", "carrierFleetAgentService.getELDFleetSummary")
                .actor_arg("carrierId"),
        )
        .action(
            ActionDefinition::suggest("getFleetUtilization", "carrierFleetAgentService.getFleetUtilization")
                .actor_arg("carrierId")
                .defaulted("periodDays", ArgumentKind::Integer, json!(30)),
        )
        .action(
            ActionDefinition::read("getFleetCosts", "carrierFleetAgentService.getFleetCosts")
                .actor_arg("carrierId")
                .optional_typed("period", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("assignDriverToUnit", "carrierFleetAgentService.assignDriverToUnit")
                .actor_arg("carrierId")
                .typed_param("driverId", ArgumentKind::String)
                .typed_param("equipmentId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("updateEquipmentStatus", "carrierFleetAgentService.updateEquipmentStatus")
                .actor_arg("carrierId")
                .typed_param("equipmentId", ArgumentKind::String)
                .typed_param("status", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getFleetAlerts", "carrierFleetAgentService.getFleetAlerts")
                .actor_arg("carrierId")
                .optional_typed("severity", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getDriverAvailability", "carrierFleetAgentService.getDriverAvailability")
                .actor_arg("carrierId")
                .optional_typed("date", ArgumentKind::String),
        )
}

fn compliance() -> RouterDefinition {
    RouterDefinition::new("carrier_compliance", "Document vault, DQ files, CSA and incidents", CARRIER)
        .action(
            ActionDefinition::read("getComplianceCalendar", "carrierComplianceAgentService.getComplianceCalendar")
                .actor_arg("carrierId")
                .defaulted("daysAhead", ArgumentKind::Integer, json!(90)),
        )
        .action(
            ActionDefinition::read("getDocumentVault", "carrierComplianceAgentService.getDocumentVault")
                .actor_arg("carrierId")
                .optional_typed("documentType", ArgumentKind::String),
        )
        .action(
            ActionDefinition::sensitive("uploadCarrierDocument", "carrierComplianceAgentService.uploadCarrierDocument")
                .actor_arg("carrierId")
                .typed_param("documentType", ArgumentKind::String)
                .typed_param("fileUrl", ArgumentKind::String)
                .requires_approval(CARRIER_APPROVERS, "Store {{ documentType }} in the carrier document vault"),
        )
        .action(
            ActionDefinition::read("getDqTracker", "carrierComplianceAgentService.getDQTracker")
                .actor_arg("carrierId"),
        )
        .action(
            ActionDefinition::suggest("getDqGaps", "carrierComplianceAgentService.getDQGaps")
                .actor_arg("carrierId"),
        )
        .action(
            ActionDefinition::read("getCsaScores", "carrierComplianceAgentService.getCSAScores")
                .actor_arg("carrierId"),
        )
        .action(
            ActionDefinition::read("getCsaAlerts", "carrierComplianceAgentService.getCSAAlerts")
                .actor_arg("carrierId"),
        )
        .action(
            ActionDefinition::sensitive("logIncident", "carrierComplianceAgentService.logIncident")
                .actor_arg("carrierId")
                .typed_param("driverId", ArgumentKind::String)
                .typed_param("incidentType", ArgumentKind::String)
                .typed_param("occurredAt", ArgumentKind::String)
                .optional_typed("description", ArgumentKind::String)
                .requires_approval(
                    CARRIER_APPROVERS,
                    "Record a {{ incidentType }} incident for driver {{ driverId }}",
                ),
        )
        .action(
            ActionDefinition::read("getIncidentHistory", "carrierComplianceAgentService.getIncidentHistory")
                .actor_arg("carrierId")
                .optional_typed("driverId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::suggest("getAuditReadiness", "carrierComplianceAgentService.getAuditReadiness")
                .actor_arg("carrierId"),
        )
}

fn communication() -> RouterDefinition {
    RouterDefinition::new("carrier_communication", "Announcements, policies and recognition", CARRIER)
        .action(
            ActionDefinition::sensitive("createAnnouncement", "carrierCommunicationAgentService.createAnnouncement")
                .describe("Broadcast an announcement to every driver in the fleet")
                .actor_arg("carrierId")
                .typed_param("title", ArgumentKind::String)
                .typed_param("body", ArgumentKind::String)
                .defaulted("audience", ArgumentKind::String, json!("all_drivers"))
                .requires_approval(CARRIER_APPROVERS, "Broadcast announcement \"{{ title }}\"")
                .rate_limited(RateLimitPolicy::per_actor(10, 86_400)),
        )
        .action(
            ActionDefinition::read("getAnnouncements", "carrierCommunicationAgentService.getAnnouncements")
                .actor_arg("carrierId")
                .defaulted("limit", ArgumentKind::Integer, json!(20)),
        )
        .action(
            ActionDefinition::sensitive("createPolicyUpdate", "carrierCommunicationAgentService.createPolicyUpdate")
                .actor_arg("carrierId")
                .typed_param("title", ArgumentKind::String)
                .typed_param("body", ArgumentKind::String)
                .optional_typed("effectiveOn", ArgumentKind::String)
                .requires_approval(CARRIER_APPROVERS, "Publish policy update \"{{ title }}\""),
        )
        .action(
            ActionDefinition::read("getPolicies", "carrierCommunicationAgentService.getPolicies")
                .actor_arg("carrierId"),
        )
        .action(
            ActionDefinition::write("createRecognition", "carrierCommunicationAgentService.createRecognition")
                .actor_arg("carrierId")
                .typed_param("driverId", ArgumentKind::String)
                .typed_param("message", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getRecognitions", "carrierCommunicationAgentService.getRecognitions")
                .actor_arg("carrierId"),
        )
        .action(
            ActionDefinition::write("createFeedbackRequest", "carrierCommunicationAgentService.createFeedbackRequest")
                .actor_arg("carrierId")
                .typed_param("question", ArgumentKind::String)
                .optional_typed("driverIds", ArgumentKind::Array),
        )
        .action(
            ActionDefinition::read("getFeedbackResponses", "carrierCommunicationAgentService.getFeedbackResponses")
                .actor_arg("carrierId")
                .typed_param("requestId", ArgumentKind::String),
        )
}
