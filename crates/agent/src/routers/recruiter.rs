use actiongate_core::domain::action::ArgumentKind;
use actiongate_core::{ActionDefinition, ActorRole, RateLimitPolicy, RouterDefinition};
use serde_json::json;

use crate::routers::{QUIET_HOURS, SMS_CHANNEL, VOICE_CHANNEL};

const RECRUITER: &[ActorRole] = &[ActorRole::Recruiter, ActorRole::Admin];
const RECRUITER_APPROVERS: &[ActorRole] = &[ActorRole::Recruiter, ActorRole::Admin];

pub fn routers() -> Vec<RouterDefinition> {
    vec![outreach(), pipeline(), onboarding()]
}

fn outreach() -> RouterDefinition {
    RouterDefinition::new("recruiter_outreach", "SMS, email, voice and job board outreach", RECRUITER)
        .action(
            ActionDefinition::sensitive("sendCampaignMessage", "recruiterOutreachService.sendCampaignMessage")
                .describe("Send a recruiting campaign message to a carrier's drivers")
                .actor_arg("recruiterId")
                .typed_param("campaignId", ArgumentKind::String)
                .typed_param("carrierDot", ArgumentKind::String)
                .optional_typed("message", ArgumentKind::String)
                .requires_approval(
                    RECRUITER_APPROVERS,
                    "Send campaign {{ campaignId }} to carrier {{ carrierDot }}",
                )
                .rate_limited(RateLimitPolicy::per_argument("carrierDot", 1, 3_600)),
        )
        .action(
            ActionDefinition::sensitive("createSmsCampaign", "smsCampaignService.createSMSCampaign")
                .actor_arg("recruiterId")
                .typed_param("name", ArgumentKind::String)
                .typed_param("message", ArgumentKind::String)
                .typed_param("recipientIds", ArgumentKind::Array)
                .requires_approval(RECRUITER_APPROVERS, "Text {{ name }} to the selected drivers")
                .rate_limited(
                    RateLimitPolicy::per_actor(5, 3_600)
                        .on_channel(SMS_CHANNEL)
                        .with_compliance(QUIET_HOURS, "recipientIds"),
                ),
        )
        .action(
            ActionDefinition::write("sendSmsReminder", "smsCampaignService.sendReminder")
                .actor_arg("recruiterId")
                .typed_param("driverId", ArgumentKind::String)
                .typed_param("message", ArgumentKind::String)
                .rate_limited(
                    RateLimitPolicy::per_actor(50, 3_600)
                        .on_channel(SMS_CHANNEL)
                        .with_compliance(QUIET_HOURS, "driverId"),
                ),
        )
        .action(
            ActionDefinition::sensitive("createEmailCampaign", "emailCampaignService.createEmailCampaign")
                .actor_arg("recruiterId")
                .typed_param("name", ArgumentKind::String)
                .typed_param("subject", ArgumentKind::String)
                .typed_param("body", ArgumentKind::String)
                .typed_param("recipientIds", ArgumentKind::Array)
                .requires_approval(RECRUITER_APPROVERS, "Email campaign \"{{ subject }}\"")
                .rate_limited(RateLimitPolicy::per_actor(10, 86_400)),
        )
        .action(
            ActionDefinition::read("getCampaignStatus", "recruiterOutreachService.getCampaignStatus")
                .actor_arg("recruiterId")
                .typed_param("campaignId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("pauseCampaign", "recruiterOutreachService.pauseCampaign")
                .actor_arg("recruiterId")
                .typed_param("campaignId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("resumeCampaign", "recruiterOutreachService.resumeCampaign")
                .actor_arg("recruiterId")
                .typed_param("campaignId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getCampaignHistory", "recruiterOutreachService.getCampaignHistory")
                .actor_arg("recruiterId")
                .defaulted("limit", ArgumentKind::Integer, json!(20)),
        )
        .action(
            ActionDefinition::read("getMessageTemplates", "recruiterOutreachService.getMessageTemplates")
                .actor_arg("recruiterId")
                .optional_typed("channel", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("createMessageTemplate", "recruiterOutreachService.createMessageTemplate")
                .actor_arg("recruiterId")
                .typed_param("name", ArgumentKind::String)
                .typed_param("channel", ArgumentKind::String)
                .typed_param("body", ArgumentKind::String),
        )
        .action(
            ActionDefinition::suggest("previewCampaignReach", "recruiterOutreachService.previewCampaignReach")
                .actor_arg("recruiterId")
                .all_params("audience"),
        )
        .action(
            ActionDefinition::sensitive("syndicateJob", "jobBoardService.syndicateJob")
                .actor_arg("recruiterId")
                .typed_param("jobId", ArgumentKind::String)
                .typed_param("boards", ArgumentKind::Array)
                .requires_approval(RECRUITER_APPROVERS, "Publish job {{ jobId }} to external job boards"),
        )
        .action(
            ActionDefinition::read("getJobPostings", "jobBoardService.getJobPostings")
                .actor_arg("recruiterId")
                .optional_typed("status", ArgumentKind::String),
        )
        .action(
            ActionDefinition::sensitive("createSocialPost", "socialPostingService.createSocialPost")
                .actor_arg("recruiterId")
                .typed_param("platform", ArgumentKind::String)
                .typed_param("content", ArgumentKind::String)
                .requires_approval(RECRUITER_APPROVERS, "Post to {{ platform }}"),
        )
        .action(
            ActionDefinition::sensitive("createVoiceCampaign", "voiceCampaignService.createCampaign")
                .actor_arg("recruiterId")
                .typed_param("name", ArgumentKind::String)
                .typed_param("assistantId", ArgumentKind::String)
                .typed_param("recipientIds", ArgumentKind::Array)
                .requires_approval(RECRUITER_APPROVERS, "Start voice campaign {{ name }}")
                .rate_limited(
                    RateLimitPolicy::per_actor(3, 86_400)
                        .on_channel(VOICE_CHANNEL)
                        .with_compliance(QUIET_HOURS, "recipientIds"),
                ),
        )
        .action(
            ActionDefinition::sensitive("initiateOutboundCall", "voiceService.initiateOutboundCall")
                .actor_arg("recruiterId")
                .typed_param("driverId", ArgumentKind::String)
                .typed_param("assistantId", ArgumentKind::String)
                .requires_approval(RECRUITER_APPROVERS, "Place an AI call to driver {{ driverId }}")
                .rate_limited(
                    RateLimitPolicy::per_actor(20, 3_600)
                        .on_channel(VOICE_CHANNEL)
                        .with_compliance(QUIET_HOURS, "driverId"),
                ),
        )
        .action(
            ActionDefinition::read("getVoiceTemplates", "voiceAgentTemplates.getTemplatesByCategory")
                .typed_param("category", ArgumentKind::String),
        )
}

fn pipeline() -> RouterDefinition {
    RouterDefinition::new("recruiter_pipeline", "Candidate pipeline, analytics and retention", RECRUITER)
        .action(
            ActionDefinition::read("getPipelineCandidates", "recruiter_service.getPipelineCandidates")
                .actor_arg("recruiterId")
                .optional_typed("stage", ArgumentKind::String)
                .defaulted("limit", ArgumentKind::Integer, json!(50)),
        )
        .action(
            ActionDefinition::write("updateCandidateStatus", "recruiter_service.updateCandidateStatus")
                .actor_arg("recruiterId")
                .typed_param("candidateId", ArgumentKind::String)
                .typed_param("status", ArgumentKind::String)
                .optional_typed("note", ArgumentKind::String),
        )
        .action(
            ActionDefinition::sensitive("bulkUpdatePipeline", "recruiterPipelineService.bulkUpdatePipeline")
                .actor_arg("recruiterId")
                .typed_param("candidateIds", ArgumentKind::Array)
                .typed_param("status", ArgumentKind::String)
                .requires_approval(RECRUITER_APPROVERS, "Move the selected candidates to {{ status }}"),
        )
        .action(
            ActionDefinition::suggest("findMatchingDrivers", "driverMatching.findMatchingDrivers")
                .actor_arg("recruiterId")
                .typed_param("jobId", ArgumentKind::String)
                .defaulted("limit", ArgumentKind::Integer, json!(25)),
        )
        .action(
            ActionDefinition::write("saveDriverSearch", "recruiterPipelineService.saveDriverSearch")
                .actor_arg("recruiterId")
                .typed_param("name", ArgumentKind::String)
                .typed_param("criteria", ArgumentKind::Object),
        )
        .action(
            ActionDefinition::read("runSavedSearch", "recruiterPipelineService.runSavedSearch")
                .actor_arg("recruiterId")
                .typed_param("searchId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getStaleCandidates", "recruiterPipelineService.getStaleCandidates")
                .actor_arg("recruiterId")
                .defaulted("idleDays", ArgumentKind::Integer, json!(14)),
        )
        .action(
            ActionDefinition::write("requestAvailability", "interviewScheduler.requestAvailability")
                .actor_arg("recruiterId")
                .typed_param("candidateId", ArgumentKind::String)
                .optional_typed("slots", ArgumentKind::Array),
        )
        .action(
            ActionDefinition::write("logCallOutcome", "callOutcomeService.logCallOutcome")
                .actor_arg("recruiterId")
                .typed_param("candidateId", ArgumentKind::String)
                .typed_param("outcome", ArgumentKind::String)
                .optional_typed("notes", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getFunnelMetrics", "recruiterAnalyticsService.getFunnelMetrics")
                .actor_arg("recruiterId")
                .defaulted("periodDays", ArgumentKind::Integer, json!(30)),
        )
        .action(
            ActionDefinition::read("getCostPerHire", "recruiterAnalyticsService.calculateCostPerHire")
                .actor_arg("recruiterId")
                .defaulted("periodDays", ArgumentKind::Integer, json!(90)),
        )
        .action(
            ActionDefinition::suggest("getHiringForecast", "recruiterAnalyticsService.getHiringForecast")
                .actor_arg("recruiterId")
                .defaulted("weeks", ArgumentKind::Integer, json!(8)),
        )
        .action(
            ActionDefinition::read("getRetentionRisks", "recruiterRetentionService.getRetentionRisks")
                .actor_arg("recruiterId")
                .optional_typed("minScore", ArgumentKind::Integer),
        )
        .action(
            ActionDefinition::write("addToWatchlist", "recruiterRetentionService.addToWatchlist")
                .actor_arg("recruiterId")
                .typed_param("driverId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::suggest("reverseSearchDrivers", "recruiterReverseMatchService.reverseSearchDrivers")
                .actor_arg("recruiterId")
                .all_params("criteria"),
        )
}

fn onboarding() -> RouterDefinition {
    RouterDefinition::new("recruiter_onboarding", "Hiring paperwork and screening", RECRUITER)
        .action(
            ActionDefinition::write("createOnboardingWorkflow", "onboardingWorkflowService.createOnboardingWorkflow")
                .actor_arg("recruiterId")
                .typed_param("candidateId", ArgumentKind::String)
                .optional_typed("templateId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getWorkflowStatus", "onboardingWorkflowService.getWorkflowStatus")
                .typed_param("workflowId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("requestDocuments", "recruiterOnboardingService.requestDocuments")
                .actor_arg("recruiterId")
                .typed_param("candidateId", ArgumentKind::String)
                .typed_param("documentTypes", ArgumentKind::Array),
        )
        .action(
            ActionDefinition::sensitive("initiateBackgroundCheck", "recruiterOnboardingService.initiateBGC")
                .describe("Order a paid background check")
                .actor_arg("recruiterId")
                .typed_param("candidateId", ArgumentKind::String)
                .defaulted("package", ArgumentKind::String, json!("standard"))
                .requires_approval(RECRUITER_APPROVERS, "Order a {{ package }} background check for {{ candidateId }}"),
        )
        .action(
            ActionDefinition::sensitive("initiateDrugTest", "recruiterOnboardingService.initiateDrugTest")
                .actor_arg("recruiterId")
                .typed_param("candidateId", ArgumentKind::String)
                .requires_approval(RECRUITER_APPROVERS, "Order a drug test for {{ candidateId }}"),
        )
        .action(
            ActionDefinition::sensitive("sendESignRequest", "recruiterOnboardingService.sendESignRequest")
                .actor_arg("recruiterId")
                .typed_param("candidateId", ArgumentKind::String)
                .typed_param("documentId", ArgumentKind::String)
                .requires_approval(RECRUITER_APPROVERS, "Send document {{ documentId }} for signature"),
        )
        .action(
            ActionDefinition::write("scheduleOrientation", "recruiterOnboardingService.scheduleOrientation")
                .actor_arg("recruiterId")
                .typed_param("candidateId", ArgumentKind::String)
                .typed_param("slotId", ArgumentKind::String),
        )
}
