//! Per-domain router definitions that make up the production action catalog.
//!
//! Each submodule owns the routers for one audience. [`all_routers`] is the only list the
//! registry is built from; adding a router means adding it here.

pub mod admin;
pub mod b2b;
pub mod carrier;
pub mod driver;
pub mod recruiter;

use actiongate_core::{ActionRegistry, RegistryError, RouterDefinition};

/// Counter shared by every outbound text action.
pub const SMS_CHANNEL: &str = "sms";
/// Counter shared by every outbound voice action.
pub const VOICE_CHANNEL: &str = "voice";
/// Compliance predicate guarding outbound SMS and voice.
pub const QUIET_HOURS: &str = "quiet_hours";

pub fn all_routers() -> Vec<RouterDefinition> {
    let mut routers = Vec::new();
    routers.extend(driver::routers());
    routers.extend(carrier::routers());
    routers.extend(b2b::routers());
    routers.extend(recruiter::routers());
    routers.extend(admin::routers());
    routers
}

pub fn build_registry() -> Result<ActionRegistry, RegistryError> {
    ActionRegistry::build(all_routers())
}
