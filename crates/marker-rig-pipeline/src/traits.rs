//! Seams for the collaborators around the pipeline.

use marker_rig_core::{BoxError, FrameFormat, FrameSlot, FrameView};

/// Delivers raw frames, one per stream and tick.
pub trait FrameSource {
    /// Formats of the streams this source delivers. Queried once, when the
    /// pipeline is configured.
    fn formats(&self) -> Vec<FrameFormat>;

    /// Frame of `stream` captured since the previous tick, or `None` when
    /// the device has nothing new yet.
    fn frame(&mut self, stream: usize) -> Result<Option<FrameView<'_>>, BoxError>;
}

/// In-place post-processing (undistortion, rectification).
pub trait FrameProcessor {
    fn process(&mut self, stream: usize, frame: &mut FrameSlot) -> Result<(), BoxError>;
}

impl<F> FrameProcessor for F
where
    F: FnMut(usize, &mut FrameSlot) -> Result<(), BoxError>,
{
    fn process(&mut self, stream: usize, frame: &mut FrameSlot) -> Result<(), BoxError> {
        self(stream, frame)
    }
}

/// Reads the frame that is current for display.
pub trait FrameSink {
    fn present(&mut self, stream: usize, frame: &FrameSlot);
}

impl<F> FrameSink for F
where
    F: FnMut(usize, &FrameSlot),
{
    fn present(&mut self, stream: usize, frame: &FrameSlot) {
        self(stream, frame)
    }
}
