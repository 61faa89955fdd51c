use super::ServiceContract;

/// Every backend function reachable from the action catalog, with the argument names it
/// accepts.
pub static SERVICE_CONTRACTS: &[ServiceContract] = &[
    // driver
    ServiceContract::query("driverCockpitService.searchJobs", &["driverId", "filters"]),
    ServiceContract::query("driverCockpitService.getJobDetails", &["driverId", "jobId"]),
    ServiceContract::keyed(
        "driverCockpitService.submitApplication",
        &["driverId", "jobId", "carrierDot", "coverNote"],
    ),
    ServiceContract::command(
        "driverCockpitService.withdrawApplication",
        &["driverId", "applicationId", "reason"],
    ),
    ServiceContract::query(
        "driverCockpitService.getApplicationStatus",
        &["driverId", "applicationId"],
    ),
    ServiceContract::command("driverCockpitService.saveJob", &["driverId", "jobId"]),
    ServiceContract::query("driverCockpitService.getDashboardSummary", &["driverId"]),
    ServiceContract::command(
        "messagingService.sendDriverMessage",
        &["driverId", "recipientId", "body"],
    ),
    ServiceContract::query("messagingService.getDriverUnreadCount", &["driverId"]),
    ServiceContract::command("driverProfileService.updateDriverProfile", &["driverId", "updates"]),
    ServiceContract::keyed(
        "documentService.recordDriverDocumentUpload",
        &["driverId", "documentType", "fileUrl"],
    ),
    ServiceContract::query("matchingService.getDriverMatches", &["driverId", "limit"]),
    ServiceContract::command("matchingService.expressDriverInterest", &["driverId", "matchId"]),
    ServiceContract::command("matchingService.dismissMatch", &["driverId", "matchId", "reason"]),
    ServiceContract::query(
        "matchExplanationService.getMatchExplanationForDriver",
        &["driverId", "carrierDot"],
    ),
    ServiceContract::query("parkingService.findTruckParking", &["lat", "lng", "radiusMiles"]),
    ServiceContract::query("fuelService.findDieselPrices", &["lat", "lng", "radiusMiles"]),
    ServiceContract::query("roadUtilitiesService.getWeighStationStatus", &["state", "highway"]),
    ServiceContract::command(
        "roadUtilitiesService.reportRoadHazard",
        &["driverId", "hazardType", "lat", "lng", "details"],
    ),
    ServiceContract::command(
        "roadUtilitiesService.rateRestStop",
        &["driverId", "locationId", "rating", "comment"],
    ),
    ServiceContract::query("weatherService.getWeatherAlerts", &["lat", "lng"]),
    ServiceContract::query("weatherService.getWeatherForecast", &["route", "hours"]),
    ServiceContract::query("roadConditionService.getRoadConditions", &["state", "corridor"]),
    ServiceContract::query("petFriendlyService.searchLocations", &["lat", "lng", "radiusMiles"]),
    ServiceContract::query("healthService.getResourcesByCategory", &["category"]),
    ServiceContract::query("hosService.getHOSSummary", &["driverId", "date"]),
    ServiceContract::command(
        "hosService.logHOSEntry",
        &["driverId", "status", "startedAt", "location"],
    ),
    ServiceContract::command("eldService.syncELDData", &["driverId", "provider"]),
    ServiceContract::query("trainingService.getAvailableCourses", &["driverId", "category"]),
    ServiceContract::command("trainingService.enrollInCourse", &["driverId", "courseId"]),
    ServiceContract::keyed(
        "documentService.uploadComplianceDocument",
        &["driverId", "documentType", "fileUrl", "expiresOn"],
    ),
    ServiceContract::query("documentService.getDriverComplianceStatus", &["driverId"]),
    ServiceContract::query("externalFmcsaApi.getCarrierSafety", &["dotNumber"]),
    ServiceContract::command(
        "driverFinancialService.logExpense",
        &["driverId", "category", "amount", "incurredOn"],
    ),
    ServiceContract::query("driverFinancialService.getExpenses", &["driverId", "filters"]),
    ServiceContract::query(
        "driverFinancialService.calculateTripCost",
        &["driverId", "miles", "mpg", "fuelPrice"],
    ),
    ServiceContract::query("driverFinancialService.getPerDiemRates", &["year"]),
    ServiceContract::query("settlementService.getSettlementHistory", &["driverId", "limit"]),
    ServiceContract::keyed(
        "settlementService.disputeSettlement",
        &["driverId", "settlementId", "reason"],
    ),
    ServiceContract::query("taxService.getDriverTaxSummary", &["driverId", "year"]),
    ServiceContract::query("marketIntelService.getDriverMarketInsights", &["driverId", "region"]),
    ServiceContract::query("communityService.getForumPosts", &["topic", "limit"]),
    ServiceContract::command("communityService.createForumPost", &["driverId", "topic", "body"]),
    ServiceContract::query("mentorshipService.findMentors", &["driverId", "specialty"]),
    ServiceContract::command(
        "mentorshipService.requestMentorship",
        &["driverId", "mentorId", "message"],
    ),
    ServiceContract::query("driverLifecycleService.getDriverTimeline", &["driverId"]),
    ServiceContract::query("surveyService.getPendingSurveys", &["driverId"]),
    ServiceContract::command(
        "surveyService.submitSurveyResponse",
        &["driverId", "surveyId", "answers"],
    ),
    ServiceContract::command("alertService.createReverseAlert", &["driverId", "criteria"]),
    // carrier
    ServiceContract::query("carrierFleetAgentService.getFleetRoster", &["carrierId", "filters"]),
    ServiceContract::query(
        "carrierFleetAgentService.getDriverScorecard",
        &["carrierId", "driverId"],
    ),
    ServiceContract::query(
        "carrierFleetAgentService.getEquipmentList",
        &["carrierId", "equipmentType"],
    ),
    ServiceContract::query(
        "carrierFleetAgentService.getEquipmentStatus",
        &["carrierId", "equipmentId"],
    ),
    ServiceContract::query("carrierFleetAgentService.getFleetCapacity", &["carrierId"]),
    ServiceContract::query("carrierFleetAgentService.getELDFleetSummary", &["carrierId"]),
    ServiceContract::query(
        "carrierFleetAgentService.getFleetUtilization",
        &["carrierId", "periodDays"],
    ),
    ServiceContract::query("carrierFleetAgentService.getFleetCosts", &["carrierId", "period"]),
    ServiceContract::command(
        "carrierFleetAgentService.assignDriverToUnit",
        &["carrierId", "driverId", "equipmentId"],
    ),
    ServiceContract::command(
        "carrierFleetAgentService.updateEquipmentStatus",
        &["carrierId", "equipmentId", "status"],
    ),
    ServiceContract::query("carrierFleetAgentService.getFleetAlerts", &["carrierId", "severity"]),
    ServiceContract::query(
        "carrierFleetAgentService.getDriverAvailability",
        &["carrierId", "date"],
    ),
    ServiceContract::query(
        "carrierComplianceAgentService.getComplianceCalendar",
        &["carrierId", "daysAhead"],
    ),
    ServiceContract::query(
        "carrierComplianceAgentService.getDocumentVault",
        &["carrierId", "documentType"],
    ),
    ServiceContract::keyed(
        "carrierComplianceAgentService.uploadCarrierDocument",
        &["carrierId", "documentType", "fileUrl"],
    ),
    ServiceContract::query("carrierComplianceAgentService.getDQTracker", &["carrierId"]),
    ServiceContract::query("carrierComplianceAgentService.getDQGaps", &["carrierId"]),
    ServiceContract::query("carrierComplianceAgentService.getCSAScores", &["carrierId"]),
    ServiceContract::query("carrierComplianceAgentService.getCSAAlerts", &["carrierId"]),
    ServiceContract::keyed(
        "carrierComplianceAgentService.logIncident",
        &["carrierId", "driverId", "incidentType", "occurredAt", "description"],
    ),
    ServiceContract::query(
        "carrierComplianceAgentService.getIncidentHistory",
        &["carrierId", "driverId"],
    ),
    ServiceContract::query("carrierComplianceAgentService.getAuditReadiness", &["carrierId"]),
    ServiceContract::keyed(
        "carrierCommunicationAgentService.createAnnouncement",
        &["carrierId", "title", "body", "audience"],
    ),
    ServiceContract::query(
        "carrierCommunicationAgentService.getAnnouncements",
        &["carrierId", "limit"],
    ),
    ServiceContract::keyed(
        "carrierCommunicationAgentService.createPolicyUpdate",
        &["carrierId", "title", "body", "effectiveOn"],
    ),
    ServiceContract::query("carrierCommunicationAgentService.getPolicies", &["carrierId"]),
    ServiceContract::command(
        "carrierCommunicationAgentService.createRecognition",
        &["carrierId", "driverId", "message"],
    ),
    ServiceContract::query("carrierCommunicationAgentService.getRecognitions", &["carrierId"]),
    ServiceContract::command(
        "carrierCommunicationAgentService.createFeedbackRequest",
        &["carrierId", "question", "driverIds"],
    ),
    ServiceContract::query(
        "carrierCommunicationAgentService.getFeedbackResponses",
        &["carrierId", "requestId"],
    ),
    // b2b
    ServiceContract::query("b2bAgentService.getMatchIntelligence", &["userId", "filters"]),
    ServiceContract::query("b2bPipelineService.getOpportunities", &["userId", "stage"]),
    ServiceContract::command(
        "b2bAgentService.updateOpportunityStage",
        &["userId", "opportunityId", "stage"],
    ),
    ServiceContract::keyed(
        "b2bAgentService.createOutreach",
        &["userId", "accountId", "channel", "message"],
    ),
    ServiceContract::command("b2bAgentService.runResearchAgent", &["userId", "accountId"]),
    ServiceContract::query("b2bAgentService.getResearchResults", &["userId", "accountId"]),
    ServiceContract::query("b2bAccountService.getAccount", &["accountId"]),
    ServiceContract::query("b2bMatchSignalService.getSignals", &["accountId", "limit"]),
    ServiceContract::command("aiEnrichment.enrichCarrier", &["dotNumber"]),
    ServiceContract::query("b2bAgentService.getTasks", &["userId", "status"]),
    ServiceContract::command(
        "b2bAgentService.createTask",
        &["userId", "accountId", "title", "dueOn"],
    ),
    ServiceContract::command("b2bAgentService.completeTask", &["userId", "taskId"]),
    ServiceContract::query("b2bAgentService.getContacts", &["accountId"]),
    ServiceContract::command(
        "b2bAgentService.addContact",
        &["userId", "accountId", "name", "email", "phone"],
    ),
    ServiceContract::query("b2bAgentService.getNotes", &["accountId"]),
    ServiceContract::command("b2bAgentService.addNote", &["userId", "accountId", "body"]),
    ServiceContract::query("b2bAgentService.getAccountScore", &["accountId"]),
    ServiceContract::query("carrierMatching.findMatchingCarriers", &["criteria"]),
    // recruiter
    ServiceContract::keyed(
        "recruiterOutreachService.sendCampaignMessage",
        &["recruiterId", "campaignId", "carrierDot", "message"],
    ),
    ServiceContract::keyed(
        "smsCampaignService.createSMSCampaign",
        &["recruiterId", "name", "message", "recipientIds"],
    ),
    ServiceContract::command(
        "smsCampaignService.sendReminder",
        &["recruiterId", "driverId", "message"],
    ),
    ServiceContract::keyed(
        "emailCampaignService.createEmailCampaign",
        &["recruiterId", "name", "subject", "body", "recipientIds"],
    ),
    ServiceContract::query(
        "recruiterOutreachService.getCampaignStatus",
        &["recruiterId", "campaignId"],
    ),
    ServiceContract::command(
        "recruiterOutreachService.pauseCampaign",
        &["recruiterId", "campaignId"],
    ),
    ServiceContract::command(
        "recruiterOutreachService.resumeCampaign",
        &["recruiterId", "campaignId"],
    ),
    ServiceContract::query(
        "recruiterOutreachService.getCampaignHistory",
        &["recruiterId", "limit"],
    ),
    ServiceContract::query(
        "recruiterOutreachService.getMessageTemplates",
        &["recruiterId", "channel"],
    ),
    ServiceContract::command(
        "recruiterOutreachService.createMessageTemplate",
        &["recruiterId", "name", "channel", "body"],
    ),
    ServiceContract::query(
        "recruiterOutreachService.previewCampaignReach",
        &["recruiterId", "audience"],
    ),
    ServiceContract::keyed("jobBoardService.syndicateJob", &["recruiterId", "jobId", "boards"]),
    ServiceContract::query("jobBoardService.getJobPostings", &["recruiterId", "status"]),
    ServiceContract::keyed(
        "socialPostingService.createSocialPost",
        &["recruiterId", "platform", "content"],
    ),
    ServiceContract::keyed(
        "voiceCampaignService.createCampaign",
        &["recruiterId", "name", "assistantId", "recipientIds"],
    ),
    ServiceContract::keyed(
        "voiceService.initiateOutboundCall",
        &["recruiterId", "driverId", "assistantId"],
    ),
    ServiceContract::query("voiceAgentTemplates.getTemplatesByCategory", &["category"]),
    ServiceContract::query(
        "recruiter_service.getPipelineCandidates",
        &["recruiterId", "stage", "limit"],
    ),
    ServiceContract::command(
        "recruiter_service.updateCandidateStatus",
        &["recruiterId", "candidateId", "status", "note"],
    ),
    ServiceContract::keyed(
        "recruiterPipelineService.bulkUpdatePipeline",
        &["recruiterId", "candidateIds", "status"],
    ),
    ServiceContract::query(
        "driverMatching.findMatchingDrivers",
        &["recruiterId", "jobId", "limit"],
    ),
    ServiceContract::command(
        "recruiterPipelineService.saveDriverSearch",
        &["recruiterId", "name", "criteria"],
    ),
    ServiceContract::query("recruiterPipelineService.runSavedSearch", &["recruiterId", "searchId"]),
    ServiceContract::query(
        "recruiterPipelineService.getStaleCandidates",
        &["recruiterId", "idleDays"],
    ),
    ServiceContract::command(
        "interviewScheduler.requestAvailability",
        &["recruiterId", "candidateId", "slots"],
    ),
    ServiceContract::command(
        "callOutcomeService.logCallOutcome",
        &["recruiterId", "candidateId", "outcome", "notes"],
    ),
    ServiceContract::query(
        "recruiterAnalyticsService.getFunnelMetrics",
        &["recruiterId", "periodDays"],
    ),
    ServiceContract::query(
        "recruiterAnalyticsService.calculateCostPerHire",
        &["recruiterId", "periodDays"],
    ),
    ServiceContract::query(
        "recruiterAnalyticsService.getHiringForecast",
        &["recruiterId", "weeks"],
    ),
    ServiceContract::query(
        "recruiterRetentionService.getRetentionRisks",
        &["recruiterId", "minScore"],
    ),
    ServiceContract::command(
        "recruiterRetentionService.addToWatchlist",
        &["recruiterId", "driverId"],
    ),
    ServiceContract::query(
        "recruiterReverseMatchService.reverseSearchDrivers",
        &["recruiterId", "criteria"],
    ),
    ServiceContract::command(
        "onboardingWorkflowService.createOnboardingWorkflow",
        &["recruiterId", "candidateId", "templateId"],
    ),
    ServiceContract::query("onboardingWorkflowService.getWorkflowStatus", &["workflowId"]),
    ServiceContract::command(
        "recruiterOnboardingService.requestDocuments",
        &["recruiterId", "candidateId", "documentTypes"],
    ),
    ServiceContract::keyed(
        "recruiterOnboardingService.initiateBGC",
        &["recruiterId", "candidateId", "package"],
    ),
    ServiceContract::keyed(
        "recruiterOnboardingService.initiateDrugTest",
        &["recruiterId", "candidateId"],
    ),
    ServiceContract::keyed(
        "recruiterOnboardingService.sendESignRequest",
        &["recruiterId", "candidateId", "documentId"],
    ),
    ServiceContract::command(
        "recruiterOnboardingService.scheduleOrientation",
        &["recruiterId", "candidateId", "slotId"],
    ),
    // admin
    ServiceContract::query("admin_dashboard_service.getDashboardStats", &["periodDays"]),
    ServiceContract::query("admin_service.getDrivers", &["filters"]),
    ServiceContract::query("observabilityService.getMetrics", &["metric", "windowMinutes"]),
    ServiceContract::query("pipelineExecutionAgent.getPipelineHealth", &[]),
    ServiceContract::query("selfHealingService.triageIssue", &["adminId", "issueId"]),
    ServiceContract::keyed(
        "selfHealingService.executeRemediation",
        &["adminId", "issueId", "playbook"],
    ),
    ServiceContract::query("promptLibraryService.getPrompts", &["category"]),
    ServiceContract::query("promptLibraryService.getActivePrompt", &["promptKey"]),
    ServiceContract::command(
        "promptLibraryService.createPrompt",
        &["adminId", "promptKey", "template"],
    ),
    ServiceContract::keyed(
        "promptLibraryService.updatePrompt",
        &["adminId", "promptKey", "template"],
    ),
    ServiceContract::keyed("autopilotService.startAutopilot", &["adminId", "workflow"]),
    ServiceContract::query("autopilotService.getAutopilotStatus", &["workflow"]),
    ServiceContract::command("compendiumService.triggerKnowledgeCurator", &["adminId"]),
    ServiceContract::query("metaGovernanceService.listMetaIntegrations", &[]),
];
