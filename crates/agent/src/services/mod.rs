//! Backend service contracts and the operation catalog built from them.
//!
//! The contract table is maintained independently of the routers so that startup can
//! prove every action resolves to a real backend function with a matching argument list.

mod contracts;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use actiongate_core::registry::InvocationRequest;
use actiongate_core::{
    ActionName, ActionRegistry, OperationCatalog, OperationError, TargetOperation, TargetRef,
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

pub use contracts::SERVICE_CONTRACTS;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceContract {
    /// `service.function` the contract describes.
    pub target: &'static str,
    pub arguments: &'static [&'static str],
    pub mutates: bool,
    /// Whether the service deduplicates calls carrying the same idempotency key.
    pub accepts_idempotency_key: bool,
}

impl ServiceContract {
    /// Side-effect free lookup; safe to repeat.
    pub const fn query(target: &'static str, arguments: &'static [&'static str]) -> Self {
        Self { target, arguments, mutates: false, accepts_idempotency_key: true }
    }

    pub const fn command(target: &'static str, arguments: &'static [&'static str]) -> Self {
        Self { target, arguments, mutates: true, accepts_idempotency_key: false }
    }

    /// Mutating call that deduplicates on the idempotency key.
    pub const fn keyed(target: &'static str, arguments: &'static [&'static str]) -> Self {
        Self { target, arguments, mutates: true, accepts_idempotency_key: true }
    }

    pub fn target_ref(&self) -> TargetRef {
        TargetRef::parse(self.target)
    }
}

pub fn contract_for(target: &TargetRef) -> Option<&'static ServiceContract> {
    let key = target.to_string();
    SERVICE_CONTRACTS.iter().find(|contract| contract.target == key)
}

/// Transport to the backend services. Implementations own retries below the dispatcher.
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    async fn call(&self, request: InvocationRequest) -> Result<Value, OperationError>;
}

/// Answers every call with a description of the request it received.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoBackend;

#[async_trait]
impl ServiceBackend for EchoBackend {
    async fn call(&self, request: InvocationRequest) -> Result<Value, OperationError> {
        Ok(json!({
            "target": request.target.to_string(),
            "arguments": Value::Object(request.arguments),
            "idempotencyKey": request.idempotency_key.0,
            "attempt": request.attempt,
        }))
    }
}

struct ServiceOperation {
    contract: ServiceContract,
    backend: Arc<dyn ServiceBackend>,
}

#[async_trait]
impl TargetOperation for ServiceOperation {
    async fn invoke(&self, request: InvocationRequest) -> Result<Value, OperationError> {
        debug!(
            event_name = "service.call.started",
            target = self.contract.target,
            action = %request.action,
            attempt = request.attempt,
            "calling backend service"
        );
        self.backend.call(request).await
    }

    fn expected_arguments(&self) -> Option<Vec<String>> {
        Some(self.contract.arguments.iter().map(|name| (*name).to_string()).collect())
    }

    fn supports_idempotency(&self) -> bool {
        self.contract.accepts_idempotency_key
    }
}

/// Binds every contracted service function to `backend`.
pub fn operation_catalog(backend: Arc<dyn ServiceBackend>) -> OperationCatalog {
    let mut catalog = OperationCatalog::default();
    for contract in SERVICE_CONTRACTS {
        catalog.register(
            contract.target,
            ServiceOperation { contract: *contract, backend: backend.clone() },
        );
    }
    catalog
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContractMismatch {
    pub action: ActionName,
    pub target: String,
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompletenessReport {
    pub actions: usize,
    pub contracts: usize,
    /// Actions whose target has no contract.
    pub uncovered: Vec<ActionName>,
    /// Contracts no action points at.
    pub unused: Vec<String>,
    pub mismatched: Vec<ContractMismatch>,
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        self.uncovered.is_empty() && self.mismatched.is_empty()
    }
}

/// Compares the registry against the contract table without building a dispatcher.
pub fn check_completeness(registry: &ActionRegistry) -> CompletenessReport {
    let contracts: BTreeMap<&str, &ServiceContract> =
        SERVICE_CONTRACTS.iter().map(|contract| (contract.target, contract)).collect();
    let mut used = BTreeSet::new();
    let mut report =
        CompletenessReport { actions: registry.len(), contracts: contracts.len(), ..Default::default() };

    for definition in registry.actions() {
        let target = definition.target.to_string();
        let Some(contract) = contracts.get(target.as_str()) else {
            report.uncovered.push(definition.name.clone());
            continue;
        };
        used.insert(contract.target);

        let expected: BTreeSet<&str> = contract.arguments.iter().copied().collect();
        let mapped: BTreeSet<&str> = definition.arguments.argument_names().into_iter().collect();
        if expected != mapped {
            report.mismatched.push(ContractMismatch {
                action: definition.name.clone(),
                target,
                missing: expected.difference(&mapped).map(|name| name.to_string()).collect(),
                unexpected: mapped.difference(&expected).map(|name| name.to_string()).collect(),
            });
        }
    }

    report.unused = contracts
        .keys()
        .filter(|target| !used.contains(*target))
        .map(|target| target.to_string())
        .collect();
    report
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use actiongate_core::{ActionDefinition, ActionRegistry, ActorRole, RouterDefinition, TargetRef};

    use super::{check_completeness, contract_for, SERVICE_CONTRACTS};
    use crate::routers::build_registry;

    #[test]
    fn contract_targets_are_unique_and_well_formed() {
        let targets: BTreeSet<&str> = SERVICE_CONTRACTS.iter().map(|contract| contract.target).collect();
        assert_eq!(targets.len(), SERVICE_CONTRACTS.len());
        for contract in SERVICE_CONTRACTS {
            assert!(contract.target_ref().is_complete(), "{} has no service", contract.target);
        }
    }

    #[test]
    fn production_catalog_is_fully_covered_by_contracts() {
        let registry = build_registry().expect("registry");
        let report = check_completeness(&registry);

        assert!(report.is_complete(), "{report:?}");
        assert!(report.unused.is_empty(), "unused contracts: {:?}", report.unused);
        assert_eq!(report.actions, registry.len());
    }

    #[test]
    fn reports_uncovered_actions_and_argument_drift() {
        let registry = ActionRegistry::build(vec![RouterDefinition::new(
            "driver_cockpit",
            "drift",
            &[ActorRole::Driver],
        )
        .action(
            ActionDefinition::read("searchJobs", "driverCockpitService.searchJobs")
                .actor_arg("driverId")
                .param("keyword"),
        )
        .action(ActionDefinition::read("teleport", "warpService.teleport"))])
        .expect("registry");

        let report = check_completeness(&registry);
        assert!(!report.is_complete());
        assert_eq!(report.uncovered.len(), 1);
        assert_eq!(report.uncovered[0].as_str(), "teleport");

        let drift = &report.mismatched[0];
        assert_eq!(drift.missing, vec!["filters".to_string()]);
        assert_eq!(drift.unexpected, vec!["keyword".to_string()]);
    }

    #[test]
    fn sensitive_targets_accept_idempotency_keys() {
        let contract = contract_for(&TargetRef::parse("recruiterOutreachService.sendCampaignMessage"))
            .expect("contract");
        assert!(contract.mutates);
        assert!(contract.accepts_idempotency_key);

        let lookup = contract_for(&TargetRef::parse("parkingService.findTruckParking")).expect("contract");
        assert!(!lookup.mutates);
    }
}
