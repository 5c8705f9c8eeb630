//! Detector configuration and the class-label table.

use std::path::Path;

use notescan_preprocess::Normalization;
use serde::{Deserialize, Serialize};

use crate::{DetectError, Result};

/// Default confidence cutoff for candidate detections.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.4;
/// Default IoU cutoff for per-class suppression.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;
/// Default exported model input edge.
pub const DEFAULT_INPUT_SIZE: usize = 640;

/// Memory layout of the raw output tensor.
///
/// Model-specific contract, matched against the exported model and verified
/// by a golden-tensor fixture test rather than assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputLayout {
    /// `[num_detections][4 + num_classes]` – one detection per row.
    RowMajor,
    /// `[4 + num_classes][num_detections]` – one channel per row
    /// (the YOLOv8 export convention).
    #[default]
    Transposed,
}

/// Immutable pipeline configuration, set once at initialization.
///
/// Reconfiguration means building a new detector, never mutating this in
/// place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub input_width: usize,
    pub input_height: usize,
    pub num_classes: usize,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub normalization: Normalization,
    pub output_layout: OutputLayout,
    /// Human-readable class names, indexed by class id.
    pub labels: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            num_classes: 0,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            normalization: Normalization::ZeroToOne,
            output_layout: OutputLayout::Transposed,
            labels: Vec::new(),
        }
    }
}

impl DetectorConfig {
    /// Config with the given label table; `num_classes` follows the table.
    pub fn with_labels(labels: Vec<String>) -> Self {
        Self {
            num_classes: labels.len(),
            labels,
            ..Self::default()
        }
    }

    /// Load from a JSON asset.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| DetectError::Init(format!("config {}: {e}", path.as_ref().display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| DetectError::Init(format!("config parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the startup invariants; violation is fatal to the instance.
    pub fn validate(&self) -> Result<()> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(DetectError::Init(format!(
                "input size {}x{} must be non-zero",
                self.input_width, self.input_height
            )));
        }
        if self.num_classes == 0 {
            return Err(DetectError::Init("num_classes must be non-zero".into()));
        }
        if self.labels.len() != self.num_classes {
            return Err(DetectError::Init(format!(
                "label table has {} entries but model expects {} classes",
                self.labels.len(),
                self.num_classes
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold)
            || !(0.0..=1.0).contains(&self.iou_threshold)
        {
            return Err(DetectError::Init(format!(
                "thresholds must lie in [0, 1]: conf {} iou {}",
                self.confidence_threshold, self.iou_threshold
            )));
        }
        Ok(())
    }
}

/// Read a label table asset: one label per line, blank lines skipped.
pub fn load_labels(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| DetectError::Init(format!("labels {}: {e}", path.as_ref().display())))?;
    let labels: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect();
    if labels.is_empty() {
        return Err(DetectError::Init(format!(
            "label table {} is empty",
            path.as_ref().display()
        )));
    }
    Ok(labels)
}
