use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use marker_rig_core::{BoxError, FrameError, FrameFormat, FrameSlot};

/// Processing function run on the worker thread, once per submitted frame set.
pub type ProcessFn = Box<dyn FnMut(&mut [FrameSlot]) -> Result<(), BoxError> + Send>;

const SLOT_COUNT: usize = 3;

#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error("worker offload '{name}' is already started")]
    AlreadyStarted { name: String },
    #[error("worker offload '{name}' is not started")]
    NotStarted { name: String },
    #[error("expected {expected} streams, got {got}")]
    StreamCountMismatch { expected: usize, got: usize },
    #[error("frame does not fit worker slot of stream {stream}")]
    FrameSizeMismatch {
        stream: usize,
        #[source]
        source: FrameError,
    },
    #[error("failed to spawn worker thread")]
    Spawn(#[source] std::io::Error),
    /// The processing function failed or panicked on the worker thread.
    /// `source` is the returned error; it is `None` for a panic.
    #[error("worker processing failed: {message}")]
    Fault {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

/// Handoff state guarded by one mutex.
#[derive(Default)]
struct Handoff {
    // A submitted frame set waits for (or is being processed by) the worker.
    images_updated: bool,
    // Slot the worker processes next; the producer fills it while
    // `images_updated` is false.
    index: usize,
    // At least one job completed since `start`; the slot before `index`
    // holds its output.
    finished: bool,
    fault: Option<Fault>,
    running: bool,
}

struct Fault {
    message: String,
    source: Option<BoxError>,
}

struct Shared {
    slots: [Mutex<Vec<FrameSlot>>; SLOT_COUNT],
    handoff: Mutex<Handoff>,
    wake: Condvar,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Triple-buffered handoff of frame sets to one background thread.
///
/// The producer calls [`update`](Self::update) once per tick. When the
/// worker has finished the previous frame set, the new one is copied into
/// the slot the worker owns next and the worker is woken. Each slot has a
/// single owner at any time: ownership moves to the worker when
/// `images_updated` is raised and back when the worker clears it.
///
/// A failure on the worker thread is not reported there. It is stored and
/// returned by the next `update`, which also stops the offload.
pub struct WorkerOffload {
    name: String,
    copy_back_images: bool,
    process: Arc<Mutex<ProcessFn>>,
    processed: Arc<AtomicU64>,
    formats: Vec<FrameFormat>,
    shared: Option<Arc<Shared>>,
    handle: Option<JoinHandle<()>>,
}

/// Result of a producer-side update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The frame set was handed to the worker.
    Submitted,
    /// The worker is still busy with the previous frame set; nothing was
    /// copied.
    Busy,
}

impl WorkerOffload {
    pub fn new(
        name: impl Into<String>,
        process: impl FnMut(&mut [FrameSlot]) -> Result<(), BoxError> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            copy_back_images: false,
            process: Arc::new(Mutex::new(Box::new(process))),
            processed: Arc::new(AtomicU64::new(0)),
            formats: Vec::new(),
            shared: None,
            handle: None,
        }
    }

    /// Copy the last processed frame set back into the producer's frames on
    /// every submission.
    pub fn with_copy_back_images(mut self, copy_back_images: bool) -> Self {
        self.copy_back_images = copy_back_images;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn copy_back_images(&self) -> bool {
        self.copy_back_images
    }

    pub fn set_copy_back_images(&mut self, copy_back_images: bool) {
        self.copy_back_images = copy_back_images;
    }

    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    /// Number of frame sets the worker finished since construction.
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    /// Allocate the three slot sets for `formats` and spawn the worker.
    pub fn start(&mut self, formats: &[FrameFormat]) -> Result<(), WorkerError> {
        if self.is_started() {
            return Err(WorkerError::AlreadyStarted {
                name: self.name.clone(),
            });
        }
        if formats.is_empty() {
            return Err(WorkerError::StreamCountMismatch {
                expected: 1,
                got: 0,
            });
        }
        let alloc = || {
            formats
                .iter()
                .enumerate()
                .map(|(stream, format)| {
                    FrameSlot::new(*format)
                        .map_err(|source| WorkerError::FrameSizeMismatch { stream, source })
                })
                .collect::<Result<Vec<_>, _>>()
        };
        let shared = Arc::new(Shared {
            slots: [
                Mutex::new(alloc()?),
                Mutex::new(alloc()?),
                Mutex::new(alloc()?),
            ],
            handoff: Mutex::new(Handoff {
                running: true,
                ..Handoff::default()
            }),
            wake: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let process = self.process.clone();
        let processed = self.processed.clone();
        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || worker_loop(&worker_shared, &process, &processed))
            .map_err(WorkerError::Spawn)?;

        log::debug!("worker offload '{}' started ({} streams)", self.name, formats.len());
        self.formats = formats.to_vec();
        self.shared = Some(shared);
        self.handle = Some(handle);
        Ok(())
    }

    /// Ask the worker to exit and wait for it. A frame set being processed
    /// is finished first. Safe to call when not started.
    pub fn stop(&mut self) {
        if let Some(shared) = self.shared.take() {
            lock(&shared.handoff).running = false;
            shared.wake.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("worker offload '{}' thread panicked", self.name);
            }
            log::debug!("worker offload '{}' stopped", self.name);
        }
    }

    /// Producer side of the handoff, called once per tick.
    ///
    /// Returns the stored worker fault, if any, after stopping the offload.
    /// Otherwise submits `frames` when the worker is idle and, with
    /// copy-back enabled, overwrites `frames` with the last processed set.
    pub fn update(&mut self, frames: &mut [FrameSlot]) -> Result<UpdateOutcome, WorkerError> {
        let Some(shared) = self.shared.clone() else {
            return Err(WorkerError::NotStarted {
                name: self.name.clone(),
            });
        };

        let (fault, busy, index, finished) = {
            let mut handoff = lock(&shared.handoff);
            (
                handoff.fault.take(),
                handoff.images_updated,
                handoff.index,
                handoff.finished,
            )
        };
        if let Some(Fault { message, source }) = fault {
            log::error!("worker offload '{}' failed: {}", self.name, message);
            self.stop();
            return Err(WorkerError::Fault { message, source });
        }
        if busy {
            return Ok(UpdateOutcome::Busy);
        }
        if frames.len() != self.formats.len() {
            return Err(WorkerError::StreamCountMismatch {
                expected: self.formats.len(),
                got: frames.len(),
            });
        }

        {
            let mut input = lock(&shared.slots[index]);
            for (stream, (dst, src)) in input.iter_mut().zip(frames.iter()).enumerate() {
                dst.copy_from_slot(src)
                    .map_err(|source| WorkerError::FrameSizeMismatch { stream, source })?;
            }
        }
        if self.copy_back_images && finished {
            let finished = lock(&shared.slots[(index + SLOT_COUNT - 1) % SLOT_COUNT]);
            for (stream, (dst, src)) in frames.iter_mut().zip(finished.iter()).enumerate() {
                dst.copy_from_slot(src)
                    .map_err(|source| WorkerError::FrameSizeMismatch { stream, source })?;
            }
        }

        lock(&shared.handoff).images_updated = true;
        shared.wake.notify_one();
        Ok(UpdateOutcome::Submitted)
    }
}

impl Drop for WorkerOffload {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: &Shared, process: &Mutex<ProcessFn>, processed: &AtomicU64) {
    loop {
        let index = {
            let mut handoff = lock(&shared.handoff);
            while handoff.running && !handoff.images_updated {
                handoff = shared
                    .wake
                    .wait(handoff)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if !handoff.running {
                break;
            }
            handoff.index
        };

        let outcome = {
            let mut frames = lock(&shared.slots[index]);
            let mut process = lock(process);
            panic::catch_unwind(AssertUnwindSafe(|| (*process)(&mut frames[..])))
        };
        let fault = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(Fault {
                message: err.to_string(),
                source: Some(err),
            }),
            Err(payload) => Some(Fault {
                message: panic_message(payload.as_ref()),
                source: None,
            }),
        };

        let mut handoff = lock(&shared.handoff);
        if let Some(fault) = fault {
            log::warn!("worker processing failed: {}", fault.message);
            handoff.fault = Some(fault);
            break;
        }
        handoff.index = (handoff.index + 1) % SLOT_COUNT;
        handoff.finished = true;
        handoff.images_updated = false;
        processed.fetch_add(1, Ordering::AcqRel);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
