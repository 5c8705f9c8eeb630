//! Dedicated pipeline worker with a latest-wins frame slot.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use notescan_model::InferenceEngine;
use notescan_preprocess::ImageFrame;
use tracing::debug;

use crate::{Detector, DetectorListener};

struct SlotState {
    frame: Option<ImageFrame>,
    closed: bool,
}

/// Capacity-1, latest-wins frame exchange.
///
/// The capture side overwrites the slot and never blocks; the worker side
/// atomically swaps the newest frame out, so a busy worker coalesces bursts
/// down to the most recent frame.  Frames displaced before the worker takes
/// them are simply dropped.
#[derive(Clone)]
pub struct FrameSlot {
    inner: Arc<(Mutex<SlotState>, Condvar)>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(SlotState {
                    frame: None,
                    closed: false,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Publish a frame, replacing any undelivered one.  Never blocks.
    pub fn publish(&self, frame: ImageFrame) {
        let (lock, cond) = &*self.inner;
        let mut state = lock.lock().unwrap_or_else(|e| e.into_inner());
        if state.frame.replace(frame).is_some() {
            debug!("dropped stale frame");
        }
        cond.notify_one();
    }

    /// Block until a frame is available or the slot is closed.
    pub fn take_blocking(&self) -> Option<ImageFrame> {
        let (lock, cond) = &*self.inner;
        let mut state = lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(frame) = state.frame.take() {
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            state = cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Close the slot; pending and future takes return `None`.
    pub fn close(&self) {
        let (lock, cond) = &*self.inner;
        let mut state = lock.lock().unwrap_or_else(|e| e.into_inner());
        state.closed = true;
        state.frame = None;
        cond.notify_all();
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the worker thread running the per-frame pipeline.
pub struct PipelineWorker;

impl PipelineWorker {
    /// Spawn the dedicated worker.
    ///
    /// The worker runs each frame to completion before taking the next;
    /// callbacks fire from the worker thread in strict per-frame order.
    pub fn spawn<E>(
        mut detector: Detector<E>,
        listener: Arc<dyn DetectorListener>,
    ) -> WorkerHandle
    where
        E: InferenceEngine + 'static,
    {
        let slot = FrameSlot::new();
        let worker_slot = slot.clone();
        let join = thread::Builder::new()
            .name("notescan-pipeline".into())
            .spawn(move || {
                while let Some(frame) = worker_slot.take_blocking() {
                    detector.process(&frame, listener.as_ref());
                }
            })
            .expect("failed to spawn pipeline worker thread");
        WorkerHandle {
            slot,
            join: Some(join),
        }
    }
}

/// Handle for submitting frames and tearing the worker down.
pub struct WorkerHandle {
    slot: FrameSlot,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Hand the newest frame to the worker; never blocks the capture path.
    pub fn submit(&self, frame: ImageFrame) {
        self.slot.publish(frame);
    }

    /// Stop after the in-flight frame (there is no mid-frame cancellation)
    /// and join the worker.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        self.slot.close();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
