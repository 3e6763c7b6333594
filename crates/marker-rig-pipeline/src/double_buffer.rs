use marker_rig_controller::ControllerStatus;
use marker_rig_core::{flip_in_place, BoxError, Flip, FrameError, FrameFormat, FrameSlot};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{FrameProcessor, FrameSink, FrameSource};

/// Errors produced while filling the `next` frame set.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("a frame pipeline needs at least one stream")]
    NoStreams,
    #[error("invalid layout for stream {stream}")]
    Layout {
        stream: usize,
        #[source]
        source: FrameError,
    },
    #[error("capture failed on stream {stream}")]
    Capture {
        stream: usize,
        #[source]
        source: BoxError,
    },
    #[error("captured frame does not fit stream {stream}")]
    FrameSizeMismatch {
        stream: usize,
        #[source]
        source: FrameError,
    },
    #[error("post-processing failed on stream {stream}")]
    Process {
        stream: usize,
        #[source]
        source: BoxError,
    },
}

type UpdatedObserver = Box<dyn FnMut(u64) + Send>;

/// Double-buffered frame sets for one camera.
///
/// Per tick the owner calls [`capture`](Self::capture) and, later in the
/// same tick, [`present`](Self::present). Capture only ever writes the
/// `next` set; present hands the `current` set to the sink and then swaps.
/// Both run on the owning thread, so readers never see a half-written
/// frame.
pub struct FramePipeline {
    buffers: [Vec<FrameSlot>; 2],
    current: usize,
    flip: Flip,
    updated: bool,
    seq: u64,
    observers: Vec<UpdatedObserver>,
}

impl FramePipeline {
    /// Allocate both frame sets for the given stream formats.
    pub fn new(formats: &[FrameFormat], flip: Flip) -> Result<Self, PipelineError> {
        if formats.is_empty() {
            return Err(PipelineError::NoStreams);
        }
        let alloc = || {
            formats
                .iter()
                .enumerate()
                .map(|(stream, format)| {
                    FrameSlot::new(*format)
                        .map_err(|source| PipelineError::Layout { stream, source })
                })
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            buffers: [alloc()?, alloc()?],
            current: 0,
            flip,
            updated: false,
            seq: 0,
            observers: Vec::new(),
        })
    }

    #[inline]
    pub fn stream_count(&self) -> usize {
        self.buffers[0].len()
    }

    pub fn formats(&self) -> Vec<FrameFormat> {
        self.buffers[0].iter().map(FrameSlot::format).collect()
    }

    #[inline]
    pub fn flip(&self) -> Flip {
        self.flip
    }

    /// A captured frame set is waiting to be presented.
    #[inline]
    pub fn is_updated(&self) -> bool {
        self.updated
    }

    /// Sequence number of the most recent capture (0 before the first).
    #[inline]
    pub fn last_seq(&self) -> u64 {
        self.seq
    }

    /// Frames visible to readers.
    pub fn current_frames(&self) -> &[FrameSlot] {
        &self.buffers[self.current]
    }

    /// Frames being prepared for the next swap.
    pub fn next_frames(&self) -> &[FrameSlot] {
        &self.buffers[1 - self.current]
    }

    /// Mutable access to the frames being prepared. Only meaningful between
    /// `capture` and `present` of the same tick.
    pub fn next_frames_mut(&mut self) -> &mut [FrameSlot] {
        &mut self.buffers[1 - self.current]
    }

    /// Register a callback invoked with the frame sequence number every
    /// time a capture completes.
    pub fn on_updated(&mut self, observer: impl FnMut(u64) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Fill `next` from `source`, flip it and run `processor` on it.
    ///
    /// Does nothing unless `status` is configured and started. Returns
    /// `Ok(true)` when a new frame set is ready for [`present`](Self::present).
    /// A stream without a new frame leaves the tick without an update. Once
    /// a frame has been written into `next`, any earlier pending capture is
    /// dropped, so a failed or partial capture never gets presented.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip(self, source, processor), fields(streams = self.stream_count()))
    )]
    pub fn capture(
        &mut self,
        status: ControllerStatus,
        source: &mut dyn FrameSource,
        mut processor: Option<&mut dyn FrameProcessor>,
    ) -> Result<bool, PipelineError> {
        if !status.is_active() {
            return Ok(false);
        }

        let next = 1 - self.current;
        for (stream, slot) in self.buffers[next].iter_mut().enumerate() {
            let view = source
                .frame(stream)
                .map_err(|source| PipelineError::Capture { stream, source })?;
            let Some(view) = view else {
                log::trace!("stream {} has no new frame", stream);
                return Ok(false);
            };
            // `next` is about to change; a pending capture is gone.
            self.updated = false;
            slot.copy_from(view)
                .map_err(|source| PipelineError::FrameSizeMismatch { stream, source })?;
        }

        let seq = self.seq + 1;
        for (stream, slot) in self.buffers[next].iter_mut().enumerate() {
            slot.set_seq(seq);
            flip_in_place(slot, self.flip);
            if let Some(processor) = processor.as_deref_mut() {
                processor
                    .process(stream, slot)
                    .map_err(|source| PipelineError::Process { stream, source })?;
            }
        }

        self.seq = seq;
        self.updated = true;
        for observer in self.observers.iter_mut() {
            observer(seq);
        }
        Ok(true)
    }

    /// Hand `current` to `sink` and swap, if a capture is pending.
    ///
    /// Returns whether a swap happened; without a pending capture `current`
    /// is left untouched and the sink is not called.
    pub fn present(&mut self, sink: &mut dyn FrameSink) -> bool {
        if !self.updated {
            return false;
        }
        for (stream, slot) in self.buffers[self.current].iter().enumerate() {
            sink.present(stream, slot);
        }
        self.current = 1 - self.current;
        self.updated = false;
        true
    }

    /// Drop a pending capture without presenting it.
    pub fn reset(&mut self) {
        self.updated = false;
    }

    /// Capture and present in one call.
    pub fn tick(
        &mut self,
        status: ControllerStatus,
        source: &mut dyn FrameSource,
        processor: Option<&mut dyn FrameProcessor>,
        sink: &mut dyn FrameSink,
    ) -> Result<bool, PipelineError> {
        self.capture(status, source, processor)?;
        Ok(self.present(sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marker_rig_core::FrameView;

    struct Counter {
        format: FrameFormat,
        data: Vec<u8>,
        value: u8,
    }

    impl FrameSource for Counter {
        fn formats(&self) -> Vec<FrameFormat> {
            vec![self.format]
        }

        fn frame(&mut self, _stream: usize) -> Result<Option<FrameView<'_>>, BoxError> {
            self.value += 1;
            self.data.fill(self.value);
            Ok(Some(FrameView {
                format: self.format,
                data: &self.data,
            }))
        }
    }

    #[test]
    fn next_is_never_the_current_set() {
        let format = FrameFormat::gray8(2, 2);
        let mut pipeline = FramePipeline::new(&[format], Flip::None).expect("pipeline");
        for _ in 0..4 {
            let current = pipeline.current_frames().as_ptr();
            let next = pipeline.next_frames().as_ptr();
            assert_ne!(current, next);
            pipeline.updated = true;
            pipeline.present(&mut |_: usize, _: &FrameSlot| {});
        }
    }

    #[test]
    fn rejects_empty_stream_list() {
        assert!(matches!(
            FramePipeline::new(&[], Flip::None),
            Err(PipelineError::NoStreams)
        ));
    }

    #[test]
    fn observers_see_each_capture() {
        let format = FrameFormat::gray8(2, 1);
        let mut source = Counter {
            format,
            data: vec![0; 2],
            value: 0,
        };
        let mut pipeline = FramePipeline::new(&[format], Flip::None).expect("pipeline");
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        pipeline.on_updated(move |seq| sink.lock().unwrap().push(seq));

        let mut status = ControllerStatus::default();
        assert!(!pipeline.capture(status, &mut source, None).expect("inactive"));

        status = active();
        for _ in 0..3 {
            assert!(pipeline.capture(status, &mut source, None).expect("capture"));
            pipeline.present(&mut |_: usize, _: &FrameSlot| {});
        }
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(pipeline.current_frames()[0].data(), &[3, 3]);
    }

    fn active() -> ControllerStatus {
        use marker_rig_controller::{ControllerGraph, NoopHooks};
        let mut graph: ControllerGraph<NoopHooks> = ControllerGraph::new();
        let id = graph.insert("camera", true, NoopHooks);
        graph.configure(id).expect("configure");
        graph.status(id).expect("status")
    }
}
