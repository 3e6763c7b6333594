//! Deterministic frame source for demos and tests.

use marker_rig_core::{BoxError, FrameError, FrameFormat, FrameView};
use marker_rig_pipeline::FrameSource;

/// Diagonal gradient that moves by a few pixels per frame.
///
/// Every stream keeps its own frame counter, so the pattern of frame `n`
/// on stream `s` is reproducible with [`TestPatternSource::pattern_value`].
#[derive(Debug, Clone)]
pub struct TestPatternSource {
    formats: Vec<FrameFormat>,
    buffers: Vec<Vec<u8>>,
    counters: Vec<u64>,
    skip_every: Option<u64>,
}

impl TestPatternSource {
    pub fn new(formats: &[FrameFormat]) -> Result<Self, FrameError> {
        let buffers = formats
            .iter()
            .map(|format| format.byte_len().map(|len| vec![0u8; len]))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            formats: formats.to_vec(),
            buffers,
            counters: vec![0; formats.len()],
            skip_every: None,
        })
    }

    /// Report "no new frame" on every `n`-th request of each stream, the way
    /// a device running slower than the tick rate would. `0` disables it.
    pub fn with_skip_every(mut self, n: u64) -> Self {
        self.skip_every = (n > 0).then_some(n);
        self
    }

    /// Number of frames requested so far on `stream`, skipped ones included.
    pub fn requests(&self, stream: usize) -> u64 {
        self.counters.get(stream).copied().unwrap_or(0)
    }

    /// Byte at pixel `(x, y)`, channel `channel`, of frame `index` of `stream`.
    pub fn pattern_value(stream: usize, index: u64, x: usize, y: usize, channel: usize) -> u8 {
        let shift = (index % 256) as usize * 5;
        ((x + 3 * y + shift + 17 * stream + 85 * channel) & 0xff) as u8
    }
}

impl FrameSource for TestPatternSource {
    fn formats(&self) -> Vec<FrameFormat> {
        self.formats.clone()
    }

    fn frame(&mut self, stream: usize) -> Result<Option<FrameView<'_>>, BoxError> {
        let Some(format) = self.formats.get(stream).copied() else {
            return Err(format!("no stream {stream}").into());
        };
        let index = self.counters[stream];
        self.counters[stream] += 1;
        if self.skip_every.is_some_and(|n| (index + 1) % n == 0) {
            return Ok(None);
        }

        let buffer = &mut self.buffers[stream];
        for (y, row) in buffer.chunks_exact_mut(format.row_stride()).enumerate() {
            for (x, pixel) in row.chunks_exact_mut(format.bytes_per_pixel).enumerate() {
                for (channel, byte) in pixel.iter_mut().enumerate() {
                    *byte = Self::pattern_value(stream, index, x, y, channel);
                }
            }
        }
        Ok(Some(FrameView {
            format,
            data: buffer,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matches_pattern_value() {
        let format = FrameFormat::rgb8(3, 2);
        let mut source = TestPatternSource::new(&[format]).expect("source");
        source.frame(0).expect("frame");
        let view = source.frame(0).expect("frame").expect("not skipped");
        assert_eq!(view.data.len(), 18);
        let (x, y, c) = (2, 1, 1);
        let offset = y * format.row_stride() + x * 3 + c;
        assert_eq!(view.data[offset], TestPatternSource::pattern_value(0, 1, x, y, c));
    }

    #[test]
    fn skips_every_nth_request() {
        let mut source = TestPatternSource::new(&[FrameFormat::gray8(1, 1)])
            .expect("source")
            .with_skip_every(3);
        let delivered: Vec<bool> = (0..6)
            .map(|_| source.frame(0).expect("frame").is_some())
            .collect();
        assert_eq!(delivered, vec![true, true, false, true, true, false]);
        assert_eq!(source.requests(0), 6);
    }

    #[test]
    fn unknown_stream_is_an_error() {
        let mut source = TestPatternSource::new(&[FrameFormat::gray8(1, 1)]).expect("source");
        assert!(source.frame(1).is_err());
    }
}
