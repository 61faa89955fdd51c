//! Agent runtime on top of the action dispatcher.
//!
//! The model never executes anything itself. It proposes an action by name; the runtime
//! screens the proposal with [`guardrails`], hands it to the dispatcher, and turns the
//! outcome back into a user-facing message.
//!
//! # Modules
//!
//! - [`routers`]: the production action catalog, one router per audience and domain
//! - [`services`]: backend service contracts and the operation catalog bound to them
//! - [`llm`]: prompt construction, the [`llm::AiRouter`] seam, and proposal parsing
//! - [`providers`]: the HTTP [`llm::AiRouter`] built from the `ai` config section
//! - [`guardrails`]: pre-dispatch screening and outcome translation
//! - [`runtime`]: sessions that tie a conversation to a ledger run

pub mod guardrails;
pub mod llm;
pub mod providers;
pub mod routers;
pub mod runtime;
pub mod services;

pub use providers::HttpAiRouter;
pub use runtime::{build_dispatcher, AgentRuntime, AgentSession, TurnReply};
