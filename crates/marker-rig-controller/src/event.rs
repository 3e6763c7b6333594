use crate::ControllerId;

/// Snapshot of a controller's lifecycle flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControllerStatus {
    pub(crate) configured: bool,
    pub(crate) ready: bool,
    pub(crate) started: bool,
}

impl ControllerStatus {
    #[inline]
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Configured and started: the state in which per-tick work runs.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.configured && self.started
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEventKind {
    Configured,
    Ready,
    Started,
    Stopped,
}

impl std::fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleEventKind::Configured => "configured",
            LifecycleEventKind::Ready => "ready",
            LifecycleEventKind::Started => "started",
            LifecycleEventKind::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Notification delivered to observers when a controller changes state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub controller: ControllerId,
    pub kind: LifecycleEventKind,
}
