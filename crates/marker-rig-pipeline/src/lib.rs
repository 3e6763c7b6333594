//! Frame handoff between capture, processing and display.
//!
//! Two variants share the same slot types from `marker-rig-core`:
//!
//! - [`FramePipeline`]: two frame sets per camera, filled and swapped at
//!   fixed points of a single-threaded tick. No locks.
//! - [`WorkerOffload`]: three frame sets shared with one background thread
//!   that runs an expensive processing function (marker detection, for
//!   instance) without stalling the tick.

mod double_buffer;
mod traits;
mod worker;

pub use double_buffer::{FramePipeline, PipelineError};
pub use traits::{FrameProcessor, FrameSink, FrameSource};
pub use worker::{ProcessFn, UpdateOutcome, WorkerError, WorkerOffload};
