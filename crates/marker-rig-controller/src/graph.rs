use std::fmt;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    ControllerError, ControllerHooks, ControllerStatus, HookPhase, LifecycleEvent,
    LifecycleEventKind,
};

/// Handle of a controller inside a [`ControllerGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(usize);

impl ControllerId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Observer = Box<dyn FnMut(&LifecycleEvent) + Send>;

struct Node<H> {
    name: String,
    auto_start: bool,
    status: ControllerStatus,
    // Insertion ordered; cascades visit dependents in this order.
    dependencies: Vec<ControllerId>,
    dependents: Vec<ControllerId>,
    // Dependencies that are not started right now.
    pending: Vec<ControllerId>,
    observers: Vec<Observer>,
    hooks: H,
}

/// Arena of controllers and the "must be started before I am ready" edges
/// between them.
///
/// Every transition runs synchronously: when `start` or `stop` returns, all
/// cascaded transitions of dependents have already happened and all
/// observers have been called, in registration order.
pub struct ControllerGraph<H = Box<dyn ControllerHooks + Send>> {
    nodes: Vec<Node<H>>,
    observers: Vec<Observer>,
}

impl<H> Default for ControllerGraph<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> ControllerGraph<H> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Add an unconfigured controller without dependencies.
    pub fn insert(&mut self, name: impl Into<String>, auto_start: bool, hooks: H) -> ControllerId {
        let id = ControllerId(self.nodes.len());
        self.nodes.push(Node {
            name: name.into(),
            auto_start,
            status: ControllerStatus::default(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            pending: Vec::new(),
            observers: Vec::new(),
            hooks,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ControllerId> + '_ {
        (0..self.nodes.len()).map(ControllerId)
    }

    fn node(&self, id: ControllerId) -> Result<&Node<H>, ControllerError> {
        self.nodes
            .get(id.0)
            .ok_or(ControllerError::UnknownController(id))
    }

    fn node_mut(&mut self, id: ControllerId) -> Result<&mut Node<H>, ControllerError> {
        self.nodes
            .get_mut(id.0)
            .ok_or(ControllerError::UnknownController(id))
    }

    pub fn name(&self, id: ControllerId) -> Result<&str, ControllerError> {
        Ok(&self.node(id)?.name)
    }

    pub fn status(&self, id: ControllerId) -> Result<ControllerStatus, ControllerError> {
        Ok(self.node(id)?.status)
    }

    pub fn auto_start(&self, id: ControllerId) -> Result<bool, ControllerError> {
        Ok(self.node(id)?.auto_start)
    }

    /// Takes effect at the next ready transition.
    pub fn set_auto_start(&mut self, id: ControllerId, auto_start: bool) -> Result<(), ControllerError> {
        self.node_mut(id)?.auto_start = auto_start;
        Ok(())
    }

    pub fn dependencies(&self, id: ControllerId) -> Result<&[ControllerId], ControllerError> {
        Ok(&self.node(id)?.dependencies)
    }

    pub fn dependents(&self, id: ControllerId) -> Result<&[ControllerId], ControllerError> {
        Ok(&self.node(id)?.dependents)
    }

    /// Dependencies of `id` that are currently not started.
    pub fn pending(&self, id: ControllerId) -> Result<&[ControllerId], ControllerError> {
        Ok(&self.node(id)?.pending)
    }

    pub fn hooks(&self, id: ControllerId) -> Result<&H, ControllerError> {
        Ok(&self.node(id)?.hooks)
    }

    pub fn hooks_mut(&mut self, id: ControllerId) -> Result<&mut H, ControllerError> {
        Ok(&mut self.node_mut(id)?.hooks)
    }

    /// Mutable access to the hooks of several distinct controllers at once.
    pub fn hooks_disjoint_mut<const N: usize>(
        &mut self,
        ids: [ControllerId; N],
    ) -> Result<[&mut H; N], ControllerError> {
        if let Some(id) = ids.iter().copied().find(|id| id.0 >= self.nodes.len()) {
            return Err(ControllerError::UnknownController(id));
        }
        let nodes = self
            .nodes
            .get_disjoint_mut(ids.map(ControllerId::index))
            .map_err(|_| ControllerError::OverlappingAccess)?;
        Ok(nodes.map(|node| &mut node.hooks))
    }

    /// Register a callback for the transitions of one controller.
    pub fn observe(
        &mut self,
        id: ControllerId,
        observer: impl FnMut(&LifecycleEvent) + Send + 'static,
    ) -> Result<(), ControllerError> {
        self.node_mut(id)?.observers.push(Box::new(observer));
        Ok(())
    }

    /// Register a callback for the transitions of every controller. It runs
    /// after the per-controller observers of the same event.
    pub fn observe_all(&mut self, observer: impl FnMut(&LifecycleEvent) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn emit(&mut self, id: ControllerId, kind: LifecycleEventKind) {
        let event = LifecycleEvent {
            controller: id,
            kind,
        };
        let node = &mut self.nodes[id.0];
        log::debug!("controller '{}' {}", node.name, kind);
        for observer in node.observers.iter_mut() {
            observer(&event);
        }
        for observer in self.observers.iter_mut() {
            observer(&event);
        }
    }

    /// True if `target` is reachable from `from` along dependency edges.
    fn reaches(&self, from: ControllerId, target: ControllerId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if std::mem::replace(&mut visited[id.0], true) {
                continue;
            }
            stack.extend(self.nodes[id.0].dependencies.iter().copied());
        }
        false
    }
}

impl<H: ControllerHooks> ControllerGraph<H> {
    /// Make `dependent` wait for `dependency` to be started before it can
    /// become ready. Adding an existing edge is a no-op.
    pub fn add_dependency(
        &mut self,
        dependent: ControllerId,
        dependency: ControllerId,
    ) -> Result<(), ControllerError> {
        let dependency_started = self.node(dependency)?.status.started;
        let node = self.node(dependent)?;
        if node.status.started {
            return Err(ControllerError::AlreadyStarted {
                name: node.name.clone(),
            });
        }
        if dependent == dependency {
            return Err(ControllerError::SelfDependency {
                name: node.name.clone(),
            });
        }
        if node.dependencies.contains(&dependency) {
            return Ok(());
        }
        if self.reaches(dependency, dependent) {
            return Err(ControllerError::DependencyCycle {
                dependent: node.name.clone(),
                dependency: self.nodes[dependency.0].name.clone(),
            });
        }

        log::debug!(
            "controller '{}' depends on '{}'",
            node.name,
            self.nodes[dependency.0].name
        );
        self.nodes[dependency.0].dependents.push(dependent);
        let node = &mut self.nodes[dependent.0];
        node.dependencies.push(dependency);
        if !dependency_started {
            node.pending.push(dependency);
            node.status.ready = false;
        }
        Ok(())
    }

    /// Drop the edge `dependent -> dependency`. If that was the last
    /// dependency holding `dependent` back, it becomes ready (and starts
    /// when it auto-starts).
    pub fn remove_dependency(
        &mut self,
        dependent: ControllerId,
        dependency: ControllerId,
    ) -> Result<(), ControllerError> {
        self.node(dependency)?;
        let node = self.node_mut(dependent)?;
        if node.status.started {
            return Err(ControllerError::AlreadyStarted {
                name: node.name.clone(),
            });
        }
        let Some(pos) = node.dependencies.iter().position(|d| *d == dependency) else {
            return Ok(());
        };
        node.dependencies.remove(pos);
        node.pending.retain(|d| *d != dependency);
        self.nodes[dependency.0]
            .dependents
            .retain(|d| *d != dependent);
        self.check_ready(dependent)
    }

    /// Run the configuration hook and mark the controller configured.
    ///
    /// Readiness is reset first; the controller becomes ready again right
    /// away if all of its dependencies are started.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn configure(&mut self, id: ControllerId) -> Result<(), ControllerError> {
        let node = self.node_mut(id)?;
        if node.status.started {
            return Err(ControllerError::AlreadyStarted {
                name: node.name.clone(),
            });
        }
        node.status.ready = false;
        node.status.configured = false;
        if let Err(source) = node.hooks.configure() {
            log::warn!("configuring controller '{}' failed: {}", node.name, source);
            return Err(ControllerError::Hook {
                name: node.name.clone(),
                phase: HookPhase::Configure,
                source,
            });
        }
        node.status.configured = true;
        self.emit(id, LifecycleEventKind::Configured);
        self.check_ready(id)
    }

    fn check_ready(&mut self, id: ControllerId) -> Result<(), ControllerError> {
        let node = &mut self.nodes[id.0];
        if !node.status.configured || node.status.ready || !node.pending.is_empty() {
            return Ok(());
        }
        node.status.ready = true;
        let auto_start = node.auto_start;
        self.emit(id, LifecycleEventKind::Ready);
        if auto_start {
            self.start(id)
        } else {
            Ok(())
        }
    }

    /// Start a configured, ready controller, then let its dependents react.
    ///
    /// A dependent that auto-starts as a consequence and fails does not undo
    /// this start; the failure is returned as [`ControllerError::Cascade`].
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn start(&mut self, id: ControllerId) -> Result<(), ControllerError> {
        let node = self.node_mut(id)?;
        if !node.status.configured {
            return Err(ControllerError::NotConfigured {
                name: node.name.clone(),
            });
        }
        if node.status.started {
            return Err(ControllerError::AlreadyStarted {
                name: node.name.clone(),
            });
        }
        if !node.status.ready {
            return Err(ControllerError::NotReady {
                name: node.name.clone(),
                pending: node.pending.len(),
            });
        }
        if let Err(source) = node.hooks.on_start() {
            log::warn!("starting controller '{}' failed: {}", node.name, source);
            return Err(ControllerError::Hook {
                name: node.name.clone(),
                phase: HookPhase::Start,
                source,
            });
        }
        node.status.started = true;
        self.emit(id, LifecycleEventKind::Started);

        let mut result = Ok(());
        for dependent in self.nodes[id.0].dependents.clone() {
            self.nodes[dependent.0].pending.retain(|d| *d != id);
            if let Err(err) = self.check_ready(dependent) {
                let err = match err {
                    ControllerError::Cascade { .. } => err,
                    other => ControllerError::Cascade {
                        name: self.nodes[dependent.0].name.clone(),
                        source: Box::new(other),
                    },
                };
                log::warn!("{}", err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Stop a started controller. Every started dependent is stopped,
    /// recursively, before this returns.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn stop(&mut self, id: ControllerId) -> Result<(), ControllerError> {
        let node = self.node_mut(id)?;
        if !node.status.configured {
            return Err(ControllerError::NotConfigured {
                name: node.name.clone(),
            });
        }
        if !node.status.started {
            return Err(ControllerError::NotStarted {
                name: node.name.clone(),
            });
        }
        node.hooks.on_stop();
        node.status.started = false;
        self.emit(id, LifecycleEventKind::Stopped);

        for dependent in self.nodes[id.0].dependents.clone() {
            let node = &mut self.nodes[dependent.0];
            if !node.pending.contains(&id) {
                node.pending.push(id);
            }
            if node.status.started {
                self.stop(dependent)?;
            }
            self.nodes[dependent.0].status.ready = false;
        }
        Ok(())
    }
}
