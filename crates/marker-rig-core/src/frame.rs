use serde::{Deserialize, Serialize};

/// Errors raised when a frame does not fit the buffer it is copied into.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid frame format (width={width}, height={height}, bytes_per_pixel={bytes_per_pixel})")]
    InvalidFormat {
        width: usize,
        height: usize,
        bytes_per_pixel: usize,
    },
    #[error("frame format mismatch (expected {expected}, got {got})")]
    FormatMismatch {
        expected: FrameFormat,
        got: FrameFormat,
    },
    #[error("frame buffer size mismatch (expected {expected} bytes, got {got})")]
    SizeMismatch { expected: usize, got: usize },
}

/// Logical layout of a tightly packed, row-major frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameFormat {
    pub width: usize,
    pub height: usize,
    pub bytes_per_pixel: usize,
}

impl FrameFormat {
    pub fn new(width: usize, height: usize, bytes_per_pixel: usize) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// 8-bit single channel.
    pub fn gray8(width: usize, height: usize) -> Self {
        Self::new(width, height, 1)
    }

    /// 8-bit RGB, the layout most capture sources deliver.
    pub fn rgb8(width: usize, height: usize) -> Self {
        Self::new(width, height, 3)
    }

    #[inline]
    pub fn row_stride(&self) -> usize {
        self.width * self.bytes_per_pixel
    }

    /// Total byte length, or an error for empty or overflowing layouts.
    pub fn byte_len(&self) -> Result<usize, FrameError> {
        let invalid = FrameError::InvalidFormat {
            width: self.width,
            height: self.height,
            bytes_per_pixel: self.bytes_per_pixel,
        };
        if self.width == 0 || self.height == 0 || self.bytes_per_pixel == 0 {
            return Err(invalid);
        }
        self.width
            .checked_mul(self.height)
            .and_then(|n| n.checked_mul(self.bytes_per_pixel))
            .ok_or(invalid)
    }
}

impl std::fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.bytes_per_pixel)
    }
}

/// Borrowed frame as delivered by a capture source.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub format: FrameFormat,
    pub data: &'a [u8], // row-major, len = format.byte_len()
}

/// Fixed-size pixel buffer owned by a pipeline stage.
///
/// A slot is allocated once for a given format and never resized; copies
/// into it are rejected unless the source has exactly the same layout.
#[derive(Clone, Debug)]
pub struct FrameSlot {
    format: FrameFormat,
    data: Vec<u8>,
    seq: u64,
}

impl FrameSlot {
    /// Allocate a zero-filled slot for `format`.
    pub fn new(format: FrameFormat) -> Result<Self, FrameError> {
        let len = format.byte_len()?;
        Ok(Self {
            format,
            data: vec![0; len],
            seq: 0,
        })
    }

    #[inline]
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Sequence number of the frame currently held (0 = never written).
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[inline]
    pub fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            format: self.format,
            data: &self.data,
        }
    }

    /// Overwrite the pixels with `src`. The sequence number is left alone.
    pub fn copy_from(&mut self, src: FrameView<'_>) -> Result<(), FrameError> {
        if src.format != self.format {
            return Err(FrameError::FormatMismatch {
                expected: self.format,
                got: src.format,
            });
        }
        if src.data.len() != self.data.len() {
            return Err(FrameError::SizeMismatch {
                expected: self.data.len(),
                got: src.data.len(),
            });
        }
        self.data.copy_from_slice(src.data);
        Ok(())
    }

    /// Overwrite pixels and sequence number with those of `other`.
    pub fn copy_from_slot(&mut self, other: &FrameSlot) -> Result<(), FrameError> {
        self.copy_from(other.view())?;
        self.seq = other.seq;
        Ok(())
    }
}
