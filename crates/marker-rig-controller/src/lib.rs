//! Controller lifecycle with dependency tracking.
//!
//! A controller moves through `configure -> ready -> start -> stop`. It is
//! ready only while every controller it depends on is started; starting a
//! dependency cascades readiness (and auto-start) to its dependents, and
//! stopping it force-stops every started dependent before returning.
//!
//! ## Quickstart
//!
//! ```
//! use marker_rig_controller::{ControllerGraph, NoopHooks};
//!
//! let mut graph: ControllerGraph<NoopHooks> = ControllerGraph::new();
//! let camera = graph.insert("camera", false, NoopHooks);
//! let tracker = graph.insert("tracker", true, NoopHooks);
//! graph.add_dependency(tracker, camera).unwrap();
//!
//! graph.configure(tracker).unwrap();
//! assert!(!graph.status(tracker).unwrap().is_ready());
//!
//! graph.configure(camera).unwrap();
//! graph.start(camera).unwrap();
//! assert!(graph.status(tracker).unwrap().is_started());
//! ```

mod error;
mod event;
mod graph;
mod hooks;

pub use error::{ControllerError, HookPhase};
pub use event::{ControllerStatus, LifecycleEvent, LifecycleEventKind};
pub use graph::{ControllerGraph, ControllerId};
pub use hooks::{ControllerHooks, NoopHooks};
pub use marker_rig_core::BoxError;
