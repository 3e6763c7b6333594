//! Camera-side front end of a marker tracker.
//!
//! This crate provides:
//! - re-exports of the `marker-rig-*` crates
//! - [`Rig`]: a camera, an optional undistortion step and an optional
//!   tracker worker wired as a controller graph and driven per tick
//! - JSON parameters ([`RigParams`]) and a synthetic [`TestPatternSource`]
//!
//! ## Quickstart
//!
//! ```
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! use marker_rig::core::{FrameFormat, FrameSlot};
//! use marker_rig::pipeline::ProcessFn;
//! use marker_rig::{Rig, RigParams, TestPatternSource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = TestPatternSource::new(&[FrameFormat::gray8(16, 12)])?;
//! let tracked = Arc::new(AtomicU64::new(0));
//! let counter = tracked.clone();
//! let track: ProcessFn = Box::new(move |_: &mut [FrameSlot]| {
//!     counter.fetch_add(1, Ordering::Relaxed);
//!     Ok(())
//! });
//!
//! let mut rig = Rig::new(RigParams::default(), Box::new(source), None, Some(track))?;
//! rig.configure()?;
//! rig.start()?;
//! for _ in 0..3 {
//!     rig.tick(&mut |_: usize, _: &FrameSlot| {})?;
//! }
//! rig.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `marker_rig::core`: frame formats, slots, flips, logger.
//! - `marker_rig::controller`: lifecycle graph with dependency cascades.
//! - `marker_rig::pipeline`: double buffer and worker offload.

pub use marker_rig_controller as controller;
pub use marker_rig_core as core;
pub use marker_rig_pipeline as pipeline;

mod config;
mod rig;
mod synthetic;

pub use config::{CameraParams, ConfigError, RigParams, TrackerParams, UndistortionParams};
pub use rig::{CameraNode, Rig, RigError, RigNode, TickReport, TrackerNode, UndistortionNode};
pub use synthetic::TestPatternSource;
