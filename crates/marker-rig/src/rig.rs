//! A camera rig: camera, optional undistortion and optional tracker wired
//! as a controller graph and driven once per tick.

use marker_rig_controller::{
    BoxError, ControllerError, ControllerGraph, ControllerHooks, ControllerId, ControllerStatus,
};
use marker_rig_core::{FrameFormat, FrameSlot};
use marker_rig_pipeline::{
    FramePipeline, FrameProcessor, FrameSink, FrameSource, PipelineError, ProcessFn,
    UpdateOutcome, WorkerError, WorkerOffload,
};
use serde::Serialize;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::{CameraParams, ConfigError, RigParams, TrackerParams};

#[derive(thiserror::Error, Debug)]
pub enum RigError {
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{node} is enabled but no processor was supplied")]
    MissingProcessor { node: &'static str },
    #[error("controller {id} does not hold a {expected} node")]
    NodeKind {
        id: ControllerId,
        expected: &'static str,
    },
}

/// Camera controller state: the frame source and its double buffer.
pub struct CameraNode {
    params: CameraParams,
    source: Box<dyn FrameSource + Send>,
    pipeline: Option<FramePipeline>,
}

impl CameraNode {
    pub fn params(&self) -> &CameraParams {
        &self.params
    }

    /// The double buffer, allocated on configure.
    pub fn pipeline(&self) -> Option<&FramePipeline> {
        self.pipeline.as_ref()
    }

    pub fn pipeline_mut(&mut self) -> Option<&mut FramePipeline> {
        self.pipeline.as_mut()
    }

    fn capture(
        &mut self,
        status: ControllerStatus,
        processor: Option<&mut dyn FrameProcessor>,
    ) -> Result<bool, PipelineError> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(false);
        };
        pipeline.capture(status, self.source.as_mut(), processor)
    }
}

impl ControllerHooks for CameraNode {
    fn configure(&mut self) -> Result<(), BoxError> {
        let formats = if self.params.streams.is_empty() {
            self.source.formats()
        } else {
            self.params.streams.clone()
        };
        let pipeline = FramePipeline::new(&formats, self.params.flip())?;
        log::info!(
            "camera '{}': {} stream(s), flip {:?}",
            self.params.name,
            formats.len(),
            pipeline.flip()
        );
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn on_stop(&mut self) {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.reset();
        }
    }
}

pub struct UndistortionNode {
    processor: Box<dyn FrameProcessor + Send>,
}

impl ControllerHooks for UndistortionNode {}

/// Tracker controller state. Starting it spawns the worker; stopping it
/// joins the worker.
pub struct TrackerNode {
    params: TrackerParams,
    worker: WorkerOffload,
    formats: Vec<FrameFormat>,
}

impl TrackerNode {
    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    pub fn worker(&self) -> &WorkerOffload {
        &self.worker
    }
}

impl ControllerHooks for TrackerNode {
    fn configure(&mut self) -> Result<(), BoxError> {
        if self.formats.is_empty() {
            return Err("tracker has no stream layout; configure the camera first".into());
        }
        Ok(())
    }

    fn on_start(&mut self) -> Result<(), BoxError> {
        self.worker.start(&self.formats)?;
        Ok(())
    }

    fn on_stop(&mut self) {
        self.worker.stop();
    }
}

/// Hooks stored in the rig's controller graph.
pub enum RigNode {
    Camera(CameraNode),
    Undistortion(UndistortionNode),
    Tracker(TrackerNode),
}

impl ControllerHooks for RigNode {
    fn configure(&mut self) -> Result<(), BoxError> {
        match self {
            RigNode::Camera(node) => node.configure(),
            RigNode::Undistortion(node) => node.configure(),
            RigNode::Tracker(node) => node.configure(),
        }
    }

    fn on_start(&mut self) -> Result<(), BoxError> {
        match self {
            RigNode::Camera(node) => node.on_start(),
            RigNode::Undistortion(node) => node.on_start(),
            RigNode::Tracker(node) => node.on_start(),
        }
    }

    fn on_stop(&mut self) {
        match self {
            RigNode::Camera(node) => node.on_stop(),
            RigNode::Undistortion(node) => node.on_stop(),
            RigNode::Tracker(node) => node.on_stop(),
        }
    }
}

fn camera_of(node: &mut RigNode, id: ControllerId) -> Result<&mut CameraNode, RigError> {
    match node {
        RigNode::Camera(camera) => Ok(camera),
        _ => Err(RigError::NodeKind {
            id,
            expected: "camera",
        }),
    }
}

fn undistortion_of(
    node: &mut RigNode,
    id: ControllerId,
) -> Result<&mut UndistortionNode, RigError> {
    match node {
        RigNode::Undistortion(undistortion) => Ok(undistortion),
        _ => Err(RigError::NodeKind {
            id,
            expected: "undistortion",
        }),
    }
}

fn tracker_of(node: &mut RigNode, id: ControllerId) -> Result<&mut TrackerNode, RigError> {
    match node {
        RigNode::Tracker(tracker) => Ok(tracker),
        _ => Err(RigError::NodeKind {
            id,
            expected: "tracker",
        }),
    }
}

/// What one [`Rig::tick`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// A new frame set was captured into `next`.
    pub updated: bool,
    /// The captured frame set was handed to the tracker worker.
    pub submitted: bool,
    /// The sink was called and the buffers swapped.
    pub presented: bool,
    /// Sequence number of the latest captured frame set.
    pub frame_seq: u64,
}

/// Camera rig driven by a per-tick loop.
///
/// The camera has no dependencies. Undistortion depends on the camera and
/// the tracker depends on the camera and, when present, on undistortion, so
/// starting the camera cascades to every auto-start node and stopping it
/// stops everything downstream.
pub struct Rig {
    graph: ControllerGraph<RigNode>,
    camera: ControllerId,
    undistortion: Option<ControllerId>,
    tracker: Option<ControllerId>,
}

impl Rig {
    /// Build the controller graph. The undistortion and tracker nodes exist
    /// only when enabled in `params`; an enabled node needs its processor.
    pub fn new(
        params: RigParams,
        source: Box<dyn FrameSource + Send>,
        undistort: Option<Box<dyn FrameProcessor + Send>>,
        track: Option<ProcessFn>,
    ) -> Result<Self, RigError> {
        let mut graph = ControllerGraph::new();
        let camera_name = params.camera.name.clone();
        let camera = graph.insert(
            camera_name.clone(),
            params.camera.auto_start,
            RigNode::Camera(CameraNode {
                params: params.camera,
                source,
                pipeline: None,
            }),
        );

        let undistortion = match (params.undistortion.enabled, undistort) {
            (true, Some(processor)) => {
                let id = graph.insert(
                    "undistortion",
                    params.undistortion.auto_start,
                    RigNode::Undistortion(UndistortionNode { processor }),
                );
                graph.add_dependency(id, camera)?;
                Some(id)
            }
            (true, None) => {
                return Err(RigError::MissingProcessor {
                    node: "undistortion",
                })
            }
            (false, processor) => {
                if processor.is_some() {
                    log::debug!("undistortion disabled, processor unused");
                }
                None
            }
        };

        let tracker = match (params.tracker.enabled, track) {
            (true, Some(process)) => {
                let worker = WorkerOffload::new(format!("{camera_name}-tracker"), process)
                    .with_copy_back_images(params.tracker.copy_back_images);
                let id = graph.insert(
                    "tracker",
                    params.tracker.auto_start,
                    RigNode::Tracker(TrackerNode {
                        params: params.tracker,
                        worker,
                        formats: Vec::new(),
                    }),
                );
                graph.add_dependency(id, camera)?;
                if let Some(undistortion) = undistortion {
                    graph.add_dependency(id, undistortion)?;
                }
                Some(id)
            }
            (true, None) => return Err(RigError::MissingProcessor { node: "tracker" }),
            (false, process) => {
                if process.is_some() {
                    log::debug!("tracker disabled, processing function unused");
                }
                None
            }
        };

        Ok(Self {
            graph,
            camera,
            undistortion,
            tracker,
        })
    }

    pub fn graph(&self) -> &ControllerGraph<RigNode> {
        &self.graph
    }

    /// Direct access to the graph, for observers and manual transitions of
    /// individual nodes.
    pub fn graph_mut(&mut self) -> &mut ControllerGraph<RigNode> {
        &mut self.graph
    }

    pub fn camera_id(&self) -> ControllerId {
        self.camera
    }

    pub fn undistortion_id(&self) -> Option<ControllerId> {
        self.undistortion
    }

    pub fn tracker_id(&self) -> Option<ControllerId> {
        self.tracker
    }

    pub fn camera(&self) -> Result<&CameraNode, RigError> {
        match self.graph.hooks(self.camera)? {
            RigNode::Camera(camera) => Ok(camera),
            _ => Err(RigError::NodeKind {
                id: self.camera,
                expected: "camera",
            }),
        }
    }

    pub fn tracker(&self) -> Result<Option<&TrackerNode>, RigError> {
        let Some(id) = self.tracker else {
            return Ok(None);
        };
        match self.graph.hooks(id)? {
            RigNode::Tracker(tracker) => Ok(Some(tracker)),
            _ => Err(RigError::NodeKind {
                id,
                expected: "tracker",
            }),
        }
    }

    /// Frames last presented, or `None` before the camera is configured.
    pub fn current_frames(&self) -> Result<Option<&[FrameSlot]>, RigError> {
        Ok(self.camera()?.pipeline().map(FramePipeline::current_frames))
    }

    /// Configure every node, dependencies first. The tracker takes its
    /// stream layout from the configured camera.
    pub fn configure(&mut self) -> Result<(), RigError> {
        self.graph.configure(self.camera)?;
        if let Some(tracker) = self.tracker {
            let formats = self
                .camera()?
                .pipeline()
                .map(FramePipeline::formats)
                .unwrap_or_default();
            tracker_of(self.graph.hooks_mut(tracker)?, tracker)?.formats = formats;
        }
        for id in self.undistortion.into_iter().chain(self.tracker) {
            self.graph.configure(id)?;
        }
        Ok(())
    }

    /// Start the camera. Auto-start nodes follow through the cascade.
    pub fn start(&mut self) -> Result<(), RigError> {
        Ok(self.graph.start(self.camera)?)
    }

    /// Stop the camera and, through the cascade, every started node.
    pub fn stop(&mut self) -> Result<(), RigError> {
        Ok(self.graph.stop(self.camera)?)
    }

    fn active(&self, id: Option<ControllerId>) -> Result<Option<ControllerId>, RigError> {
        match id {
            Some(id) if self.graph.status(id)?.is_active() => Ok(Some(id)),
            _ => Ok(None),
        }
    }

    /// Run one tick: capture into `next`, hand it to the tracker, then show
    /// `current` through `sink` and swap.
    ///
    /// A worker fault stops the tracker controller and is returned here.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn tick(&mut self, sink: &mut dyn FrameSink) -> Result<TickReport, RigError> {
        let camera_status = self.graph.status(self.camera)?;
        let undistortion = self.active(self.undistortion)?;
        let tracker = self.active(self.tracker)?;

        let updated = match undistortion {
            Some(undistortion) => {
                let [camera, node] = self.graph.hooks_disjoint_mut([self.camera, undistortion])?;
                let processor: &mut dyn FrameProcessor =
                    undistortion_of(node, undistortion)?.processor.as_mut();
                camera_of(camera, self.camera)?.capture(camera_status, Some(processor))?
            }
            None => camera_of(self.graph.hooks_mut(self.camera)?, self.camera)?
                .capture(camera_status, None)?,
        };

        let mut submitted = false;
        if let (true, Some(tracker)) = (updated, tracker) {
            let outcome = {
                let [camera, node] = self.graph.hooks_disjoint_mut([self.camera, tracker])?;
                let worker = &mut tracker_of(node, tracker)?.worker;
                match camera_of(camera, self.camera)?.pipeline.as_mut() {
                    Some(pipeline) => worker.update(pipeline.next_frames_mut()),
                    None => Ok(UpdateOutcome::Busy),
                }
            };
            match outcome {
                Ok(UpdateOutcome::Submitted) => submitted = true,
                Ok(UpdateOutcome::Busy) => log::trace!("tracker busy, frame set skipped"),
                Err(err) => {
                    if matches!(err, WorkerError::Fault { .. }) {
                        self.graph.stop(tracker)?;
                    }
                    return Err(err.into());
                }
            }
        }

        let camera = camera_of(self.graph.hooks_mut(self.camera)?, self.camera)?;
        let Some(pipeline) = camera.pipeline.as_mut() else {
            return Ok(TickReport::default());
        };
        let presented = pipeline.present(sink);
        Ok(TickReport {
            updated,
            submitted,
            presented,
            frame_seq: pipeline.last_seq(),
        })
    }
}
