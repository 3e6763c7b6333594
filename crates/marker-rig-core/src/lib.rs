//! Core types shared by the `marker-rig-*` crates.
//!
//! This crate is intentionally small. It knows about raw pixel buffers and
//! their layout, but nothing about cameras, controllers or threads.

mod flip;
mod frame;
mod logger;

pub use flip::{flip_in_place, Flip};
pub use frame::{FrameError, FrameFormat, FrameSlot, FrameView};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;

/// Error type used at the seams where external collaborators plug in.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
