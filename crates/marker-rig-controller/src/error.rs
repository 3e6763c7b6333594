use marker_rig_core::BoxError;

use crate::ControllerId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookPhase {
    Configure,
    Start,
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookPhase::Configure => f.write_str("configure"),
            HookPhase::Start => f.write_str("start"),
        }
    }
}

/// Lifecycle contract violations and hook failures.
#[derive(thiserror::Error, Debug)]
pub enum ControllerError {
    #[error("unknown controller {0}")]
    UnknownController(ControllerId),
    #[error("simultaneous access to the same controller")]
    OverlappingAccess,
    #[error("controller '{name}' is started")]
    AlreadyStarted { name: String },
    #[error("controller '{name}' is not configured")]
    NotConfigured { name: String },
    #[error("controller '{name}' is not ready ({pending} dependencies not started)")]
    NotReady { name: String, pending: usize },
    #[error("controller '{name}' is not started")]
    NotStarted { name: String },
    #[error("controller '{name}' cannot depend on itself")]
    SelfDependency { name: String },
    #[error("dependency '{dependent}' -> '{dependency}' would close a cycle")]
    DependencyCycle {
        dependent: String,
        dependency: String,
    },
    #[error("{phase} hook of controller '{name}' failed")]
    Hook {
        name: String,
        phase: HookPhase,
        #[source]
        source: BoxError,
    },
    /// An automatic start triggered by another controller's transition
    /// failed. The triggering transition itself completed.
    #[error("cascaded start of controller '{name}' failed")]
    Cascade {
        name: String,
        #[source]
        source: Box<ControllerError>,
    },
}
