//! Raw output tensor → candidate detections.

use notescan_model::RawOutput;

use crate::config::{DetectorConfig, OutputLayout};
use crate::geometry::Rect;
use crate::{DetectError, Result};

/// A thresholded detection candidate, alive only between decode and NMS.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub rect: Rect,
}

/// Interpret the raw tensor as `(num_detections, stride)` per the layout.
///
/// A leading batch dimension of 1 is accepted and skipped.
fn dims(raw: &RawOutput, layout: OutputLayout, stride: usize) -> Result<usize> {
    let shape: &[usize] = match raw.shape.as_slice() {
        [1, rest @ ..] if rest.len() == 2 => rest,
        s if s.len() == 2 => s,
        s => {
            return Err(DetectError::MalformedOutput(format!(
                "expected 2-D output (plus optional batch), got shape {s:?}"
            )))
        }
    };
    let (row_width, n) = match layout {
        OutputLayout::RowMajor => (shape[1], shape[0]),
        OutputLayout::Transposed => (shape[0], shape[1]),
    };
    if row_width != stride {
        return Err(DetectError::MalformedOutput(format!(
            "layout {layout:?} expects a {stride}-wide detection row, shape is {:?}",
            raw.shape
        )));
    }
    if raw.data.len() != stride * n {
        return Err(DetectError::MalformedOutput(format!(
            "buffer holds {} floats, shape {:?} needs {}",
            raw.data.len(),
            raw.shape,
            stride * n
        )));
    }
    Ok(n)
}

/// Decode detection rows into thresholded candidates.
///
/// Each row carries `cx, cy, w, h` followed by `num_classes` scores.  The
/// max-score class wins; ties resolve to the first class index encountered.
/// Rows whose best score is below `confidence_threshold` are dropped –
/// rejection is normal control flow, not an error, and the scan is a single
/// linear pass with no per-row allocation beyond the output vector.
pub fn decode(raw: &RawOutput, config: &DetectorConfig) -> Result<Vec<Candidate>> {
    let stride = 4 + config.num_classes;
    let n = dims(raw, config.output_layout, stride)?;
    let data = &raw.data;

    // Field j of detection i, per layout.
    let at = |i: usize, j: usize| -> f32 {
        match config.output_layout {
            OutputLayout::RowMajor => data[i * stride + j],
            OutputLayout::Transposed => data[j * n + i],
        }
    };

    let mut candidates = Vec::new();
    for i in 0..n {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for c in 0..config.num_classes {
            let score = at(i, 4 + c);
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }
        if best_score >= config.confidence_threshold {
            let rect = Rect::from_center_size(at(i, 0), at(i, 1), at(i, 2), at(i, 3))
                .clamp(1.0, 1.0);
            candidates.push(Candidate {
                class_id: best_class,
                confidence: best_score,
                rect,
            });
        }
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(num_classes: usize) -> DetectorConfig {
        DetectorConfig {
            output_layout: OutputLayout::RowMajor,
            ..DetectorConfig::with_labels(
                (0..num_classes).map(|i| format!("class {i}")).collect(),
            )
        }
    }

    fn row_major(rows: &[Vec<f32>]) -> RawOutput {
        let stride = rows[0].len();
        RawOutput::new(
            vec![1, rows.len(), stride],
            rows.iter().flatten().copied().collect(),
        )
    }

    #[test]
    fn threshold_is_inclusive() {
        let cfg = config(2);
        // Best score exactly at the 0.4 default threshold.
        let raw = row_major(&[vec![0.5, 0.5, 0.2, 0.2, 0.4, 0.1]]);
        let out = decode(&raw, &cfg).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_id, 0);
        assert!((out[0].confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn row_just_below_threshold_is_dropped() {
        let cfg = config(2);
        let raw = row_major(&[vec![0.5, 0.5, 0.2, 0.2, 0.39, 0.1]]);
        assert!(decode(&raw, &cfg).unwrap().is_empty());
    }

    #[test]
    fn class_ties_resolve_to_first_index() {
        let cfg = config(3);
        let raw = row_major(&[vec![0.5, 0.5, 0.2, 0.2, 0.3, 0.9, 0.9]]);
        let out = decode(&raw, &cfg).unwrap();
        assert_eq!(out[0].class_id, 1);
    }

    #[test]
    fn center_size_converts_to_corners() {
        let cfg = config(1);
        let raw = row_major(&[vec![0.5, 0.5, 0.2, 0.4, 0.9]]);
        let out = decode(&raw, &cfg).unwrap();
        let r = out[0].rect;
        assert!((r.x1 - 0.4).abs() < 1e-6 && (r.x2 - 0.6).abs() < 1e-6);
        assert!((r.y1 - 0.3).abs() < 1e-6 && (r.y2 - 0.7).abs() < 1e-6);
    }

    #[test]
    fn transposed_layout_reads_columns() {
        let mut cfg = config(2);
        cfg.output_layout = OutputLayout::Transposed;
        // Two detections, stride 6, stored channel-major: [6][2].
        let raw = RawOutput::new(
            vec![1, 6, 2],
            vec![
                0.25, 0.75, // cx
                0.25, 0.75, // cy
                0.1, 0.1, // w
                0.1, 0.1, // h
                0.9, 0.2, // class 0 scores
                0.1, 0.8, // class 1 scores
            ],
        );
        let out = decode(&raw, &cfg).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].class_id, 0);
        assert_eq!(out[1].class_id, 1);
        let (cx, _) = out[1].rect.center();
        assert!((cx - 0.75).abs() < 1e-6);
    }

    #[test]
    fn shape_disagreement_is_an_error() {
        let cfg = config(2);
        let raw = RawOutput::new(vec![1, 5, 3], vec![0.0; 15]);
        assert!(matches!(
            decode(&raw, &cfg),
            Err(DetectError::MalformedOutput(_))
        ));
    }

    #[test]
    fn all_below_threshold_yields_empty_not_error() {
        let cfg = config(2);
        let rows: Vec<Vec<f32>> = (0..100)
            .map(|_| vec![0.5, 0.5, 0.1, 0.1, 0.01, 0.02])
            .collect();
        let out = decode(&row_major(&rows), &cfg).unwrap();
        assert!(out.is_empty());
    }
}
