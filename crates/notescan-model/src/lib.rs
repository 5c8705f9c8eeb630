// notescan-model/src/lib.rs
// ============================================================
// Inference engine seam for NoteScan
// Wraps the opaque ONNX Runtime session behind the
// InferenceEngine trait so the detection pipeline never
// depends on a specific runtime binding.
// ------------------------------------------------------------
// Public API
//   * InferenceEngine            – infer(tensor) -> RawOutput
//   * OrtEngine::new(path, dims) – load an ONNX model via ort
// ============================================================

//! NoteScan – model layer
//!
//! The detection pipeline treats the network as an opaque function from a
//! fixed-shape image tensor to a fixed-shape float tensor.  [`InferenceEngine`]
//! is that contract; [`OrtEngine`] is the production implementation on ONNX
//! Runtime.  Test doubles returning fixture tensors implement the same trait,
//! which keeps decode/NMS/mapping testable without a model file.
//!
//! Callers must guarantee input shape correctness before invoking – the
//! engine does not validate it (the detect crate checks and reports a shape
//! mismatch as a defensive assertion).

use ndarray::{Array3, Array4};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// Raw model output: a flat float buffer plus its shape.
///
/// Interpretation (row layout, box encoding) is a configured contract owned
/// by the decoder, not by this crate.
#[derive(Debug, Clone)]
pub struct RawOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl RawOutput {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }
}

/// The opaque model invocation: `infer(tensor) -> tensor`.
///
/// Synchronous; may block the calling thread for tens of milliseconds.
pub trait InferenceEngine: Send {
    /// Run the model on an `(H, W, 3)` f32 tensor.
    fn infer(&mut self, input: &Array3<f32>) -> Result<RawOutput>;

    /// `(height, width)` the model expects.
    fn input_shape(&self) -> (usize, usize);
}

/// ONNX Runtime backed engine.
pub struct OrtEngine {
    session: Session,
    input_name: String,
    output_name: String,
    input_h: usize,
    input_w: usize,
}

impl OrtEngine {
    /// Load and optimize an ONNX model, preparing it for inference.
    ///
    /// `input_size` is `(height, width)` of the exported model input.
    pub fn new(model_path: &str, input_size: (usize, usize)) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_cpus::get_physical())?
            .commit_from_file(model_path)?;

        let input_name = session.inputs[0].name.clone();
        let output_name = session.outputs[0].name.clone();
        debug!(model = model_path, input = %input_name, output = %output_name, "model loaded");

        Ok(Self {
            session,
            input_name,
            output_name,
            input_h: input_size.0,
            input_w: input_size.1,
        })
    }
}

impl InferenceEngine for OrtEngine {
    fn infer(&mut self, input: &Array3<f32>) -> Result<RawOutput> {
        let (h, w) = (input.shape()[0], input.shape()[1]);
        debug_assert_eq!(input.shape()[2], 3);

        // HWC → NCHW, allocated once per frame.
        let mut chw = Array4::<f32>::zeros((1, 3, h, w));
        for y in 0..h {
            for x in 0..w {
                for c in 0..3 {
                    chw[(0, c, y, x)] = input[(y, x, c)];
                }
            }
        }

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => TensorRef::from_array_view(&chw)?])?;
        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::MalformedOutput(e.to_string()))?;

        Ok(RawOutput::new(
            shape.iter().map(|&d| d as usize).collect(),
            data.to_vec(),
        ))
    }

    fn input_shape(&self) -> (usize, usize) {
        (self.input_h, self.input_w)
    }
}
