use std::error::Error as _;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use marker_rig_core::{BoxError, FrameFormat, FrameSlot};
use marker_rig_pipeline::{UpdateOutcome, WorkerError, WorkerOffload};

const TIMEOUT: Duration = Duration::from_secs(10);

fn frames(format: FrameFormat, value: u8, seq: u64) -> Vec<FrameSlot> {
    let mut slot = FrameSlot::new(format).unwrap();
    slot.data_mut().fill(value);
    slot.set_seq(seq);
    vec![slot]
}

/// Retry `update` until the worker accepts the frame set.
fn submit(worker: &mut WorkerOffload, frames: &mut [FrameSlot]) {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        match worker.update(frames).unwrap() {
            UpdateOutcome::Submitted => return,
            UpdateOutcome::Busy => {
                assert!(Instant::now() < deadline, "worker never became idle");
                thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

fn wait_processed(worker: &WorkerOffload, count: u64) {
    let deadline = Instant::now() + TIMEOUT;
    while worker.processed_count() < count {
        assert!(Instant::now() < deadline, "worker stalled");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Keep calling `update` until the stored fault comes back.
fn wait_fault(worker: &mut WorkerOffload, frames: &mut [FrameSlot]) -> (String, Option<BoxError>) {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        match worker.update(frames) {
            Err(WorkerError::Fault { message, source }) => return (message, source),
            Ok(UpdateOutcome::Busy) => {
                assert!(Instant::now() < deadline, "fault never surfaced");
                thread::sleep(Duration::from_millis(1));
            }
            other => panic!("unexpected update result: {other:?}"),
        }
    }
}

#[test]
fn every_submission_is_processed_once_in_order() {
    let format = FrameFormat::gray8(4, 4);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut worker = WorkerOffload::new("tracker", move |frames: &mut [FrameSlot]| {
        sink.lock().unwrap().push((frames[0].seq(), frames[0].data()[0]));
        Ok(())
    });
    worker.start(&[format]).unwrap();

    for i in 1..=20u8 {
        let mut input = frames(format, i, u64::from(i));
        submit(&mut worker, &mut input);
    }
    wait_processed(&worker, 20);
    worker.stop();

    let expected: Vec<_> = (1..=20u8).map(|i| (u64::from(i), i)).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
}

#[test]
fn update_reports_busy_while_worker_runs() {
    let format = FrameFormat::gray8(1, 1);
    let gate = Arc::new(Mutex::new(()));
    let held = gate.lock().unwrap();
    let worker_gate = gate.clone();
    let mut worker = WorkerOffload::new("slow", move |_: &mut [FrameSlot]| {
        drop(worker_gate.lock().unwrap());
        Ok(())
    });
    worker.start(&[format]).unwrap();

    let mut input = frames(format, 1, 1);
    assert_eq!(worker.update(&mut input).unwrap(), UpdateOutcome::Submitted);
    assert_eq!(worker.update(&mut input).unwrap(), UpdateOutcome::Busy);
    drop(held);
    wait_processed(&worker, 1);
    assert_eq!(worker.update(&mut input).unwrap(), UpdateOutcome::Submitted);
}

#[test]
fn processing_error_is_returned_by_next_update() {
    let format = FrameFormat::gray8(2, 2);
    let mut worker = WorkerOffload::new("tracker", |_: &mut [FrameSlot]| {
        Err("marker dictionary not loaded".into())
    });
    worker.start(&[format]).unwrap();

    let mut input = frames(format, 1, 1);
    submit(&mut worker, &mut input);
    let (message, source) = wait_fault(&mut worker, &mut input);
    assert_eq!(message, "marker dictionary not loaded");
    assert_eq!(source.unwrap().to_string(), message);
    assert!(!worker.is_started());
    assert!(matches!(
        worker.update(&mut input),
        Err(WorkerError::NotStarted { .. })
    ));
}

#[test]
fn processing_panic_is_returned_by_next_update() {
    let format = FrameFormat::gray8(2, 2);
    let mut worker = WorkerOffload::new("tracker", |frames: &mut [FrameSlot]| {
        if frames[0].seq() == 2 {
            panic!("pose solver diverged");
        }
        Ok(())
    });
    worker.start(&[format]).unwrap();

    submit(&mut worker, &mut frames(format, 1, 1));
    wait_processed(&worker, 1);
    let mut second = frames(format, 2, 2);
    submit(&mut worker, &mut second);
    let (message, source) = wait_fault(&mut worker, &mut second);
    assert_eq!(message, "pose solver diverged");
    assert!(source.is_none());
    assert!(!worker.is_started());
    assert_eq!(worker.processed_count(), 1);
}

#[test]
fn copy_back_returns_processed_frames() {
    let format = FrameFormat::gray8(2, 1);
    let mut worker = WorkerOffload::new("tracker", |frames: &mut [FrameSlot]| {
        for byte in frames[0].data_mut() {
            *byte += 100;
        }
        Ok(())
    })
    .with_copy_back_images(true);
    worker.start(&[format]).unwrap();

    // Nothing has been processed yet, so the producer's frames stay as they are.
    let mut first = frames(format, 1, 1);
    submit(&mut worker, &mut first);
    assert_eq!(first[0].data(), &[1, 1]);
    wait_processed(&worker, 1);

    let mut second = frames(format, 2, 2);
    submit(&mut worker, &mut second);
    assert_eq!(second[0].data(), &[101, 101]);
    assert_eq!(second[0].seq(), 1);
    wait_processed(&worker, 2);

    let mut third = frames(format, 3, 3);
    submit(&mut worker, &mut third);
    assert_eq!(third[0].data(), &[102, 102]);
    assert_eq!(third[0].seq(), 2);
}

#[test]
fn stream_count_must_match_started_layout() {
    let format = FrameFormat::gray8(1, 1);
    let mut worker = WorkerOffload::new("tracker", |_: &mut [FrameSlot]| Ok(()));
    worker.start(&[format, format]).unwrap();
    let mut input = frames(format, 0, 1);
    assert!(matches!(
        worker.update(&mut input),
        Err(WorkerError::StreamCountMismatch {
            expected: 2,
            got: 1
        })
    ));
}

#[test]
fn fault_keeps_the_original_error_as_source() {
    let format = FrameFormat::gray8(1, 1);
    let mut worker = WorkerOffload::new("tracker", |_: &mut [FrameSlot]| {
        Err(Box::new(io::Error::new(io::ErrorKind::TimedOut, "camera link timed out")) as BoxError)
    });
    worker.start(&[format]).unwrap();

    let mut input = frames(format, 1, 1);
    submit(&mut worker, &mut input);
    let deadline = Instant::now() + TIMEOUT;
    let err = loop {
        match worker.update(&mut input) {
            Ok(UpdateOutcome::Busy) => {
                assert!(Instant::now() < deadline, "fault never surfaced");
                thread::sleep(Duration::from_millis(1));
            }
            Ok(UpdateOutcome::Submitted) => panic!("worker accepted a frame after failing"),
            Err(err) => break err,
        }
    };
    assert_eq!(err.to_string(), "worker processing failed: camera link timed out");
    let source = err.source().expect("error source");
    let io_err = source.downcast_ref::<io::Error>().expect("io::Error source");
    assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);
}

#[test]
fn copy_back_after_restart_leaves_frames_until_a_job_finishes() {
    let format = FrameFormat::gray8(2, 1);
    let mut worker = WorkerOffload::new("tracker", |frames: &mut [FrameSlot]| {
        for byte in frames[0].data_mut() {
            *byte += 100;
        }
        Ok(())
    })
    .with_copy_back_images(true);
    worker.start(&[format]).unwrap();
    submit(&mut worker, &mut frames(format, 1, 1));
    wait_processed(&worker, 1);

    worker.stop();
    worker.start(&[format]).unwrap();

    // No job of this run has finished: nothing to copy back yet.
    let mut input = frames(format, 7, 5);
    submit(&mut worker, &mut input);
    assert_eq!(input[0].data(), &[7, 7]);
    assert_eq!(input[0].seq(), 5);
    wait_processed(&worker, 2);

    let mut next = frames(format, 8, 6);
    submit(&mut worker, &mut next);
    assert_eq!(next[0].data(), &[107, 107]);
    assert_eq!(next[0].seq(), 5);
}

#[test]
fn stop_waits_for_the_running_job() {
    let format = FrameFormat::gray8(1, 1);
    let running = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicBool::new(false));
    let (worker_running, worker_done) = (running.clone(), done.clone());
    let mut worker = WorkerOffload::new("slow", move |_: &mut [FrameSlot]| {
        worker_running.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        worker_done.store(true, Ordering::SeqCst);
        Ok(())
    });
    worker.start(&[format]).unwrap();
    submit(&mut worker, &mut frames(format, 1, 1));

    let deadline = Instant::now() + TIMEOUT;
    while !running.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline, "job never started");
        thread::sleep(Duration::from_millis(1));
    }
    worker.stop();
    assert!(done.load(Ordering::SeqCst), "stop returned before the job finished");
    assert!(!worker.is_started());
    assert_eq!(worker.processed_count(), 1);
}

#[test]
fn restart_with_a_submission_in_flight_keeps_processing() {
    let format = FrameFormat::gray8(1, 1);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut worker = WorkerOffload::new("tracker", move |frames: &mut [FrameSlot]| {
        sink.lock().unwrap().push(frames[0].seq());
        Ok(())
    });
    worker.start(&[format]).unwrap();
    submit(&mut worker, &mut frames(format, 1, 1));
    worker.stop();

    worker.start(&[format]).unwrap();
    let before = worker.processed_count();
    submit(&mut worker, &mut frames(format, 2, 2));
    wait_processed(&worker, before + 1);
    submit(&mut worker, &mut frames(format, 3, 3));
    wait_processed(&worker, before + 2);
    worker.stop();

    let seen = seen.lock().unwrap();
    assert_eq!(&seen[seen.len() - 2..], &[2, 3]);
}
