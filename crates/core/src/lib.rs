pub mod approvals;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod outcome;
pub mod rate_limit;
pub mod registry;

pub use approvals::{ApprovalError, GateManager, GateRequest, GateResolution};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use context::{ConversationStore, InMemoryConversationStore};
pub use dispatcher::{DispatchContext, DispatchOutcome, Dispatcher, DispatcherConfig};
pub use domain::action::{
    ActionDefinition, ActionName, ActorRole, ApprovalPolicy, RateLimitPolicy, RiskLevel,
    SideEffectClass, TargetRef,
};
pub use domain::gate::{ApprovalGate, GateDecision, GateId, GateState, Resolver};
pub use domain::outcome::{ObjectiveMet, OutcomeFilter, OutcomeRecord, OutcomeStats};
pub use domain::run::{Actor, AgentRun, RunId, RunStatus, Step, StepId, StepStatus};
pub use errors::{DispatchError, InterfaceError, OperationError, RegistryError, StoreError};
pub use ledger::{InMemoryRunLedger, RunLedger, RunQuery, RunTrace};
pub use outcome::{InMemoryOutcomeRepository, OutcomeEvaluator, OutcomeRepository};
pub use rate_limit::{InMemoryRateLimitStore, RateLimitStore, RateLimiter, WindowAlgorithm};
pub use registry::{ActionRegistry, OperationCatalog, RouterDefinition, TargetOperation};
