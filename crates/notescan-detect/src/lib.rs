// notescan-detect/src/lib.rs
// ============================================================
// Detection post-processing pipeline for NoteScan
// Raw frame → preprocess → infer → decode → NMS → map → labels
// ------------------------------------------------------------
// Public API
//   * Detector::new(engine, config)     – build the pipeline
//   * Detector::process(frame, listener) – run one frame and
//     fire on_detect / on_empty_detect
//   * PipelineWorker::spawn(..)         – dedicated worker with
//     a latest-wins frame slot
// ============================================================

//! NoteScan – detection layer
//!
//! Turns the model's raw output tensor into a clean, deduplicated,
//! coordinate-correct set of labeled currency detections.  The pipeline is
//! stateless per frame: nothing persists between calls, no detection
//! identity is tracked across frames, and the whole run is a bounded,
//! blocking computation suitable for a dedicated worker thread.
//!
//! The inference engine is an opaque [`InferenceEngine`] from
//! `notescan-model`; any conforming implementation (CPU, accelerated, or a
//! fixture-returning test double) slots in without touching the decode, NMS
//! or mapping logic.

use std::time::Instant;

use notescan_model::{InferenceEngine, ModelError};
use notescan_preprocess::{ImageFrame, PreprocessError, Preprocessor};
use thiserror::Error;
use tracing::{debug, warn};

mod config;
mod coords;
mod decode;
mod geometry;
mod nms;
mod worker;

pub use config::{
    load_labels, DetectorConfig, OutputLayout, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_INPUT_SIZE, DEFAULT_IOU_THRESHOLD,
};
pub use coords::{frame_dims, map_to_frame};
pub use decode::{decode, Candidate};
pub use geometry::Rect;
pub use nms::non_max_suppression;
pub use worker::{FrameSlot, PipelineWorker, WorkerHandle};

#[derive(Debug, Error)]
pub enum DetectError {
    /// Missing/corrupt assets or a label/class-count mismatch.  Fatal to
    /// the detector instance, surfaced once at setup.
    #[error("Initialization failed: {0}")]
    Init(String),
    /// Preprocessed tensor does not match the model input.  A config bug,
    /// not a per-frame condition; checked defensively before every call.
    #[error("Input shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("Preprocess failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("Inference failed: {0}")]
    Inference(#[from] ModelError),
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),
}

pub type Result<T> = std::result::Result<T, DetectError>;

/// A final detection in original frame pixel space.
#[derive(Debug, Clone)]
pub struct Detection {
    pub class_id: usize,
    /// Label resolved from the class table, e.g. `"50 rupee note"`.
    pub label: String,
    pub confidence: f32,
    /// Box in original frame pixels.
    pub rect: Rect,
}

/// Consumer of per-frame results; exactly one callback fires per processed
/// frame.
pub trait DetectorListener: Send + Sync {
    fn on_detect(&self, detections: &[Detection], inference_time_ms: u64);
    fn on_empty_detect(&self);
}

/// The full per-frame pipeline around an opaque inference engine.
pub struct Detector<E: InferenceEngine> {
    engine: E,
    config: DetectorConfig,
    preprocessor: Preprocessor,
}

impl<E: InferenceEngine> Detector<E> {
    /// Validate the config against the engine and build the pipeline.
    pub fn new(engine: E, config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        let expected = (config.input_height, config.input_width);
        if engine.input_shape() != expected {
            return Err(DetectError::Init(format!(
                "engine expects input {:?}, config says {:?}",
                engine.input_shape(),
                expected
            )));
        }
        let preprocessor = Preprocessor::new(
            config.input_width as u32,
            config.input_height as u32,
            config.normalization,
        );
        Ok(Self {
            engine,
            config,
            preprocessor,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run the pure pipeline on one frame.
    ///
    /// Returns the final detections plus the inference wall time in whole
    /// milliseconds (engine call only).  An empty vector is a normal
    /// outcome, never an error.
    pub fn run_frame(&mut self, frame: &ImageFrame) -> Result<(Vec<Detection>, u64)> {
        let (tensor, transform) = self.preprocessor.run(frame)?;

        // The engine never validates shape; we guarantee it here.
        let expected = (self.config.input_height, self.config.input_width);
        let got = (tensor.shape()[0], tensor.shape()[1]);
        if got != expected {
            return Err(DetectError::ShapeMismatch { expected, got });
        }

        let started = Instant::now();
        let raw = self.engine.infer(&tensor)?;
        let inference_time_ms = started.elapsed().as_millis() as u64;

        let candidates = decode(&raw, &self.config)?;
        let kept = non_max_suppression(candidates, self.config.iou_threshold);

        let detections = kept
            .into_iter()
            .map(|c| Detection {
                label: self.config.labels[c.class_id].clone(),
                class_id: c.class_id,
                confidence: c.confidence,
                rect: map_to_frame(c.rect, &transform, frame.rotation, frame.mirrored),
            })
            .collect();
        Ok((detections, inference_time_ms))
    }

    /// Process one frame and fire the listener.
    ///
    /// Failure policy: a degenerate empty frame is skipped silently; any
    /// other per-frame failure is fail-safe – logged and reported as an
    /// empty detection, and the pipeline stays usable for the next frame.
    pub fn process(&mut self, frame: &ImageFrame, listener: &dyn DetectorListener) {
        match self.run_frame(frame) {
            Ok((detections, _)) if detections.is_empty() => listener.on_empty_detect(),
            Ok((detections, inference_time_ms)) => {
                debug!(
                    count = detections.len(),
                    inference_time_ms, "frame detections"
                );
                listener.on_detect(&detections, inference_time_ms);
            }
            Err(DetectError::Preprocess(PreprocessError::EmptyFrame { width, height })) => {
                debug!(width, height, "skipping empty frame");
            }
            Err(e) => {
                warn!(error = %e, "frame failed, reporting empty");
                listener.on_empty_detect();
            }
        }
    }
}
