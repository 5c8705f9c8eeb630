//! End-to-end pipeline tests against fixture tensors.
//!
//! The inference engine is swapped for doubles returning canned raw
//! outputs, which exercises decode → NMS → mapping exactly as the
//! production path does.

use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use ndarray::Array3;
use notescan_detect::{
    Detection, Detector, DetectorConfig, DetectorListener, OutputLayout,
};
use notescan_model::{InferenceEngine, ModelError, RawOutput};
use notescan_preprocess::ImageFrame;

const INPUT: usize = 640;

fn rupee_config() -> DetectorConfig {
    // Index 3 is the 50-rupee note, index 5 the 500-rupee note.
    let labels = [
        "10 rupee note",
        "20 rupee note",
        "100 rupee note",
        "50 rupee note",
        "200 rupee note",
        "500 rupee note",
        "2000 rupee note",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    DetectorConfig {
        output_layout: OutputLayout::Transposed,
        ..DetectorConfig::with_labels(labels)
    }
}

/// One decoded row: box in center+size model space plus per-class scores.
struct Row {
    cx: f32,
    cy: f32,
    w: f32,
    h: f32,
    scores: Vec<f32>,
}

fn row(cx: f32, cy: f32, w: f32, h: f32, class_id: usize, score: f32, nc: usize) -> Row {
    let mut scores = vec![0.01; nc];
    scores[class_id] = score;
    Row { cx, cy, w, h, scores }
}

/// Pack rows into the `[1][4+nc][n]` transposed export layout.
fn transposed(rows: &[Row], nc: usize) -> RawOutput {
    let n = rows.len();
    let stride = 4 + nc;
    let mut data = vec![0.0f32; stride * n];
    for (i, r) in rows.iter().enumerate() {
        data[i] = r.cx;
        data[n + i] = r.cy;
        data[2 * n + i] = r.w;
        data[3 * n + i] = r.h;
        for (c, &s) in r.scores.iter().enumerate() {
            data[(4 + c) * n + i] = s;
        }
    }
    RawOutput::new(vec![1, stride, n], data)
}

struct FixtureEngine {
    raw: RawOutput,
}

impl InferenceEngine for FixtureEngine {
    fn infer(&mut self, _input: &Array3<f32>) -> notescan_model::Result<RawOutput> {
        Ok(self.raw.clone())
    }

    fn input_shape(&self) -> (usize, usize) {
        (INPUT, INPUT)
    }
}

struct FailingEngine;

impl InferenceEngine for FailingEngine {
    fn infer(&mut self, _input: &Array3<f32>) -> notescan_model::Result<RawOutput> {
        Err(ModelError::MalformedOutput("fixture failure".into()))
    }

    fn input_shape(&self) -> (usize, usize) {
        (INPUT, INPUT)
    }
}

#[derive(Debug, Clone)]
enum Event {
    Detect(Vec<Detection>, u64),
    Empty,
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl DetectorListener for Recorder {
    fn on_detect(&self, detections: &[Detection], inference_time_ms: u64) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Detect(detections.to_vec(), inference_time_ms));
    }

    fn on_empty_detect(&self) {
        self.events.lock().unwrap().push(Event::Empty);
    }
}

fn camera_frame() -> ImageFrame {
    ImageFrame::rgb(vec![90; 640 * 480 * 3], 640, 480)
}

fn detector(raw: RawOutput) -> Detector<FixtureEngine> {
    Detector::new(FixtureEngine { raw }, rupee_config()).unwrap()
}

#[test]
fn overlapping_fifty_rupee_notes_collapse_to_one() -> anyhow::Result<()> {
    let nc = rupee_config().num_classes;
    // Two class-3 boxes with IoU 0.8; only the 0.9 survives NMS at 0.5.
    let raw = transposed(
        &[
            row(0.3, 0.30, 0.4, 0.40, 3, 0.90, nc),
            row(0.3, 0.26, 0.4, 0.32, 3, 0.85, nc),
        ],
        nc,
    );
    let mut det = detector(raw);
    let (out, _) = det.run_frame(&camera_frame())?;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].label, "50 rupee note");
    assert!((out[0].confidence - 0.9).abs() < 1e-6);
    Ok(())
}

#[test]
fn fully_overlapping_boxes_of_different_classes_both_survive() -> anyhow::Result<()> {
    let nc = rupee_config().num_classes;
    let raw = transposed(
        &[
            row(0.5, 0.5, 0.3, 0.3, 1, 0.95, nc),
            row(0.5, 0.5, 0.3, 0.3, 5, 0.92, nc),
        ],
        nc,
    );
    let mut det = detector(raw);
    let (out, _) = det.run_frame(&camera_frame())?;
    assert_eq!(out.len(), 2);
    let labels: Vec<&str> = out.iter().map(|d| d.label.as_str()).collect();
    assert!(labels.contains(&"20 rupee note"));
    assert!(labels.contains(&"500 rupee note"));
    Ok(())
}

#[test]
fn all_below_threshold_fires_empty_detect() {
    let nc = rupee_config().num_classes;
    let rows: Vec<Row> = (0..50)
        .map(|i| row(0.5, 0.5, 0.1, 0.1, i % nc, 0.39, nc))
        .collect();
    let mut det = detector(transposed(&rows, nc));
    let recorder = Recorder::default();
    det.process(&camera_frame(), &recorder);
    let events = recorder.events.lock().unwrap();
    assert!(matches!(events.as_slice(), [Event::Empty]));
}

#[test]
fn inference_failure_is_fail_safe() {
    let mut det = Detector::new(FailingEngine, rupee_config()).unwrap();
    let recorder = Recorder::default();
    det.process(&camera_frame(), &recorder);
    let events = recorder.events.lock().unwrap();
    assert!(matches!(events.as_slice(), [Event::Empty]));
}

#[test]
fn degenerate_frame_is_skipped_without_callback() {
    let nc = rupee_config().num_classes;
    let mut det = detector(transposed(&[], nc));
    let recorder = Recorder::default();
    det.process(&ImageFrame::rgb(Vec::new(), 0, 0), &recorder);
    assert!(recorder.events.lock().unwrap().is_empty());
}

#[test]
fn label_count_mismatch_is_an_initialization_error() {
    let nc = rupee_config().num_classes;
    let mut config = rupee_config();
    config.labels.pop();
    assert!(Detector::new(FixtureEngine { raw: transposed(&[], nc) }, config).is_err());
}

#[test]
fn final_output_honors_both_thresholds() -> anyhow::Result<()> {
    let config = rupee_config();
    let nc = config.num_classes;
    // A noisy spread of candidates across classes and scores.
    let rows: Vec<Row> = (0..40)
        .map(|i| {
            row(
                0.2 + 0.015 * i as f32,
                0.4 + 0.005 * i as f32,
                0.25,
                0.25,
                i % nc,
                0.1 + 0.022 * i as f32,
                nc,
            )
        })
        .collect();
    let mut det = detector(transposed(&rows, nc));
    let (out, _) = det.run_frame(&camera_frame())?;
    assert!(!out.is_empty());
    for d in &out {
        assert!(d.confidence >= config.confidence_threshold);
    }
    // Per-class IoU property: no surviving same-class pair overlaps at or
    // above the suppression threshold.  Boxes are compared in a common
    // space; frame pixels preserve IoU since the mapping is affine.
    for a in &out {
        for b in &out {
            if std::ptr::eq(a, b) || a.class_id != b.class_id {
                continue;
            }
            assert!(a.rect.iou(&b.rect) < config.iou_threshold);
        }
    }
    Ok(())
}

#[test]
fn pipeline_output_is_deterministic() -> anyhow::Result<()> {
    let nc = rupee_config().num_classes;
    let rows: Vec<Row> = (0..20)
        .map(|i| row(0.1 + 0.04 * i as f32, 0.5, 0.2, 0.2, i % nc, 0.6, nc))
        .collect();
    let raw = transposed(&rows, nc);
    let mut det = detector(raw.clone());
    let (first, _) = det.run_frame(&camera_frame())?;
    let (second, _) = det.run_frame(&camera_frame())?;
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.class_id, b.class_id);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.rect, b.rect);
    }
    Ok(())
}

#[test]
fn detections_come_back_in_frame_pixel_space() -> anyhow::Result<()> {
    let nc = rupee_config().num_classes;
    // 640x480 frame letterboxed into 640x640: scale 1.0, 80px bars.
    let raw = transposed(&[row(0.5, 0.5, 0.25, 0.25, 3, 0.9, nc)], nc);
    let mut det = detector(raw);
    let (out, _) = det.run_frame(&camera_frame())?;
    let r = out[0].rect;
    assert!((r.x1 - 240.0).abs() < 1.0 && (r.x2 - 400.0).abs() < 1.0);
    assert!((r.y1 - 160.0).abs() < 1.0 && (r.y2 - 320.0).abs() < 1.0);
    Ok(())
}

#[test]
fn worker_delivers_results_from_its_own_thread() {
    struct Channel(Mutex<mpsc::Sender<Event>>);
    impl DetectorListener for Channel {
        fn on_detect(&self, detections: &[Detection], inference_time_ms: u64) {
            let _ = self
                .0
                .lock()
                .unwrap()
                .send(Event::Detect(detections.to_vec(), inference_time_ms));
        }
        fn on_empty_detect(&self) {
            let _ = self.0.lock().unwrap().send(Event::Empty);
        }
    }

    let nc = rupee_config().num_classes;
    let raw = transposed(&[row(0.5, 0.5, 0.25, 0.25, 3, 0.9, nc)], nc);
    let (tx, rx) = mpsc::channel();
    let handle = notescan_detect::PipelineWorker::spawn(
        detector(raw),
        Arc::new(Channel(Mutex::new(tx))),
    );

    handle.submit(camera_frame());
    match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
        Event::Detect(dets, _) => {
            assert_eq!(dets.len(), 1);
            assert_eq!(dets[0].label, "50 rupee note");
        }
        Event::Empty => panic!("expected a detection"),
    }
    handle.shutdown();
}
