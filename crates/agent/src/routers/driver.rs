use actiongate_core::domain::action::ArgumentKind;
use actiongate_core::{ActionDefinition, ActorRole, RateLimitPolicy, RouterDefinition};
use serde_json::json;

const DRIVER: &[ActorRole] = &[ActorRole::Driver];
const DRIVER_APPROVERS: &[ActorRole] = &[ActorRole::Driver, ActorRole::Admin];

pub fn routers() -> Vec<RouterDefinition> {
    vec![cockpit(), road(), compliance(), financial(), community()]
}

fn cockpit() -> RouterDefinition {
    RouterDefinition::new("driver_cockpit", "Job search, applications, matches and messages", DRIVER)
        .action(
            ActionDefinition::read("searchJobs", "driverCockpitService.searchJobs")
                .describe("Search open driving jobs")
                .actor_arg("driverId")
                .all_params("filters"),
        )
        .action(
            ActionDefinition::read("getJobDetails", "driverCockpitService.getJobDetails")
                .actor_arg("driverId")
                .typed_param("jobId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::sensitive("quickApply", "driverCockpitService.submitApplication")
                .describe("Submit an application to a carrier on the driver's behalf")
                .actor_arg("driverId")
                .typed_param("jobId", ArgumentKind::String)
                .renamed("carrierDot", "carrierId", ArgumentKind::String)
                .optional_typed("coverNote", ArgumentKind::String)
                .requires_approval(DRIVER_APPROVERS, "Apply to job {{ jobId }} with carrier {{ carrierId }}")
                .rate_limited(RateLimitPolicy::per_actor(10, 86_400)),
        )
        .action(
            ActionDefinition::write("withdrawApplication", "driverCockpitService.withdrawApplication")
                .actor_arg("driverId")
                .typed_param("applicationId", ArgumentKind::String)
                .optional_typed("reason", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getApplicationStatus", "driverCockpitService.getApplicationStatus")
                .actor_arg("driverId")
                .optional_typed("applicationId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("saveJob", "driverCockpitService.saveJob")
                .actor_arg("driverId")
                .typed_param("jobId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getDashboardSummary", "driverCockpitService.getDashboardSummary")
                .actor_arg("driverId"),
        )
        .action(
            ActionDefinition::write("sendDriverMessage", "messagingService.sendDriverMessage")
                .describe("Message a recruiter from the driver inbox")
                .actor_arg("driverId")
                .typed_param("recipientId", ArgumentKind::String)
                .typed_param("body", ArgumentKind::String)
                .rate_limited(RateLimitPolicy::per_actor(30, 3_600)),
        )
        .action(
            ActionDefinition::read("getUnreadCount", "messagingService.getDriverUnreadCount")
                .actor_arg("driverId"),
        )
        .action(
            ActionDefinition::write("updateProfile", "driverProfileService.updateDriverProfile")
                .actor_arg("driverId")
                .all_params("updates"),
        )
        .action(
            ActionDefinition::sensitive("uploadDocument", "documentService.recordDriverDocumentUpload")
                .actor_arg("driverId")
                .typed_param("documentType", ArgumentKind::String)
                .typed_param("fileUrl", ArgumentKind::String)
                .requires_approval(DRIVER_APPROVERS, "Upload {{ documentType }} to the driver file"),
        )
        .action(
            ActionDefinition::suggest("getMatches", "matchingService.getDriverMatches")
                .actor_arg("driverId")
                .defaulted("limit", ArgumentKind::Integer, json!(10)),
        )
        .action(
            ActionDefinition::write("expressInterest", "matchingService.expressDriverInterest")
                .actor_arg("driverId")
                .typed_param("matchId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("dismissMatch", "matchingService.dismissMatch")
                .actor_arg("driverId")
                .typed_param("matchId", ArgumentKind::String)
                .optional_typed("reason", ArgumentKind::String),
        )
        .action(
            ActionDefinition::suggest("getMatchExplanation", "matchExplanationService.getMatchExplanationForDriver")
                .actor_arg("driverId")
                .renamed("carrierDot", "carrierId", ArgumentKind::String),
        )
}

fn road() -> RouterDefinition {
    RouterDefinition::new("driver_road", "On-the-road utilities", DRIVER)
        .action(
            ActionDefinition::read("findParking", "parkingService.findTruckParking")
                .describe("Find truck parking near a location")
                .typed_param("lat", ArgumentKind::Number)
                .typed_param("lng", ArgumentKind::Number)
                .defaulted("radiusMiles", ArgumentKind::Integer, json!(25))
                .rate_limited(RateLimitPolicy::per_actor(20, 60)),
        )
        .action(
            ActionDefinition::read("findFuelPrices", "fuelService.findDieselPrices")
                .typed_param("lat", ArgumentKind::Number)
                .typed_param("lng", ArgumentKind::Number)
                .defaulted("radiusMiles", ArgumentKind::Integer, json!(50))
                .rate_limited(RateLimitPolicy::per_actor(20, 60)),
        )
        .action(
            ActionDefinition::read("getWeighStationStatus", "roadUtilitiesService.getWeighStationStatus")
                .typed_param("state", ArgumentKind::String)
                .optional_typed("highway", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("reportHazard", "roadUtilitiesService.reportRoadHazard")
                .actor_arg("driverId")
                .typed_param("hazardType", ArgumentKind::String)
                .typed_param("lat", ArgumentKind::Number)
                .typed_param("lng", ArgumentKind::Number)
                .optional_typed("details", ArgumentKind::String)
                .rate_limited(RateLimitPolicy::per_actor(10, 3_600)),
        )
        .action(
            ActionDefinition::write("rateRestStop", "roadUtilitiesService.rateRestStop")
                .actor_arg("driverId")
                .typed_param("locationId", ArgumentKind::String)
                .typed_param("rating", ArgumentKind::Integer)
                .optional_typed("comment", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getWeatherAlerts", "weatherService.getWeatherAlerts")
                .typed_param("lat", ArgumentKind::Number)
                .typed_param("lng", ArgumentKind::Number),
        )
        .action(
            ActionDefinition::read("getWeatherForecast", "weatherService.getWeatherForecast")
                .typed_param("route", ArgumentKind::Array)
                .defaulted("hours", ArgumentKind::Integer, json!(24)),
        )
        .action(
            ActionDefinition::read("getRoadConditions", "roadConditionService.getRoadConditions")
                .typed_param("state", ArgumentKind::String)
                .optional_typed("corridor", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("findPetFriendlyStops", "petFriendlyService.searchLocations")
                .typed_param("lat", ArgumentKind::Number)
                .typed_param("lng", ArgumentKind::Number)
                .defaulted("radiusMiles", ArgumentKind::Integer, json!(50)),
        )
        .action(
            ActionDefinition::read("getHealthResources", "healthService.getResourcesByCategory")
                .typed_param("category", ArgumentKind::String),
        )
}

fn compliance() -> RouterDefinition {
    RouterDefinition::new("driver_compliance", "Hours of service, ELD and training", DRIVER)
        .action(
            ActionDefinition::read("getHosSummary", "hosService.getHOSSummary")
                .actor_arg("driverId")
                .optional_typed("date", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("logHosEntry", "hosService.logHOSEntry")
                .actor_arg("driverId")
                .typed_param("status", ArgumentKind::String)
                .typed_param("startedAt", ArgumentKind::String)
                .optional_typed("location", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("syncEld", "eldService.syncELDData")
                .actor_arg("driverId")
                .typed_param("provider", ArgumentKind::String)
                .rate_limited(RateLimitPolicy::per_actor(6, 3_600)),
        )
        .action(
            ActionDefinition::read("getAvailableCourses", "trainingService.getAvailableCourses")
                .actor_arg("driverId")
                .optional_typed("category", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("enrollInCourse", "trainingService.enrollInCourse")
                .actor_arg("driverId")
                .typed_param("courseId", ArgumentKind::String),
        )
        .action(
            ActionDefinition::sensitive("uploadComplianceDoc", "documentService.uploadComplianceDocument")
                .actor_arg("driverId")
                .typed_param("documentType", ArgumentKind::String)
                .typed_param("fileUrl", ArgumentKind::String)
                .optional_typed("expiresOn", ArgumentKind::String)
                .requires_approval(DRIVER_APPROVERS, "Submit {{ documentType }} for compliance review"),
        )
        .action(
            ActionDefinition::read("getComplianceStatus", "documentService.getDriverComplianceStatus")
                .actor_arg("driverId"),
        )
        .action(
            ActionDefinition::read("getCarrierSafety", "externalFmcsaApi.getCarrierSafety")
                .renamed("dotNumber", "carrierDot", ArgumentKind::String),
        )
}

fn financial() -> RouterDefinition {
    RouterDefinition::new("driver_financial", "Expenses, settlements and taxes", DRIVER)
        .action(
            ActionDefinition::write("logExpense", "driverFinancialService.logExpense")
                .actor_arg("driverId")
                .typed_param("category", ArgumentKind::String)
                .typed_param("amount", ArgumentKind::Number)
                .optional_typed("incurredOn", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getExpenses", "driverFinancialService.getExpenses")
                .actor_arg("driverId")
                .all_params("filters"),
        )
        .action(
            ActionDefinition::suggest("calculateTripCost", "driverFinancialService.calculateTripCost")
                .actor_arg("driverId")
                .typed_param("miles", ArgumentKind::Number)
                .optional_typed("mpg", ArgumentKind::Number)
                .optional_typed("fuelPrice", ArgumentKind::Number),
        )
        .action(
            ActionDefinition::read("getPerDiemRates", "driverFinancialService.getPerDiemRates")
                .defaulted("year", ArgumentKind::Integer, json!(2026)),
        )
        .action(
            ActionDefinition::read("getSettlementHistory", "settlementService.getSettlementHistory")
                .actor_arg("driverId")
                .defaulted("limit", ArgumentKind::Integer, json!(20)),
        )
        .action(
            ActionDefinition::sensitive("disputeSettlement", "settlementService.disputeSettlement")
                .actor_arg("driverId")
                .typed_param("settlementId", ArgumentKind::String)
                .typed_param("reason", ArgumentKind::String)
                .requires_approval(DRIVER_APPROVERS, "Dispute settlement {{ settlementId }}"),
        )
        .action(
            ActionDefinition::read("getTaxSummary", "taxService.getDriverTaxSummary")
                .actor_arg("driverId")
                .typed_param("year", ArgumentKind::Integer),
        )
        .action(
            ActionDefinition::suggest("getMarketInsights", "marketIntelService.getDriverMarketInsights")
                .actor_arg("driverId")
                .optional_typed("region", ArgumentKind::String),
        )
}

fn community() -> RouterDefinition {
    RouterDefinition::new("driver_community", "Forums, mentorship and career lifecycle", DRIVER)
        .action(
            ActionDefinition::read("getForumPosts", "communityService.getForumPosts")
                .optional_typed("topic", ArgumentKind::String)
                .defaulted("limit", ArgumentKind::Integer, json!(20)),
        )
        .action(
            ActionDefinition::write("createForumPost", "communityService.createForumPost")
                .actor_arg("driverId")
                .typed_param("topic", ArgumentKind::String)
                .typed_param("body", ArgumentKind::String)
                .rate_limited(RateLimitPolicy::per_actor(5, 3_600)),
        )
        .action(
            ActionDefinition::read("findMentors", "mentorshipService.findMentors")
                .actor_arg("driverId")
                .optional_typed("specialty", ArgumentKind::String),
        )
        .action(
            ActionDefinition::write("requestMentorship", "mentorshipService.requestMentorship")
                .actor_arg("driverId")
                .typed_param("mentorId", ArgumentKind::String)
                .optional_typed("message", ArgumentKind::String),
        )
        .action(
            ActionDefinition::read("getTimeline", "driverLifecycleService.getDriverTimeline")
                .actor_arg("driverId"),
        )
        .action(
            ActionDefinition::read("getPendingSurveys", "surveyService.getPendingSurveys")
                .actor_arg("driverId"),
        )
        .action(
            ActionDefinition::write("submitSurveyResponse", "surveyService.submitSurveyResponse")
                .actor_arg("driverId")
                .typed_param("surveyId", ArgumentKind::String)
                .typed_param("answers", ArgumentKind::Object),
        )
        .action(
            ActionDefinition::write("createReverseAlert", "alertService.createReverseAlert")
                .actor_arg("driverId")
                .all_params("criteria"),
        )
}
