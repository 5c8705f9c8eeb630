// demos/synthetic_pipeline.rs
//------------------------------------------------------------
// Worker + latest-wins slot demo, no model file required.
// A fixture engine stands in for the network; a burst of
// synthetic frames shows stale frames being coalesced away.
//------------------------------------------------------------

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ndarray::Array3;
use notescan_detect::{
    Detection, Detector, DetectorConfig, DetectorListener, OutputLayout, PipelineWorker,
};
use notescan_model::{InferenceEngine, RawOutput};
use notescan_preprocess::ImageFrame;

const INPUT: usize = 640;

/// Pretends to be the network: ~30 ms per call, one fixed 50-rupee box.
struct SlowFixtureEngine {
    raw: RawOutput,
}

impl InferenceEngine for SlowFixtureEngine {
    fn infer(&mut self, _input: &Array3<f32>) -> notescan_model::Result<RawOutput> {
        std::thread::sleep(Duration::from_millis(30));
        Ok(self.raw.clone())
    }

    fn input_shape(&self) -> (usize, usize) {
        (INPUT, INPUT)
    }
}

struct Printer;

impl DetectorListener for Printer {
    fn on_detect(&self, detections: &[Detection], inference_time_ms: u64) {
        for d in detections {
            println!(
                "detected {} conf={:.2} ({} ms inference)",
                d.label, d.confidence, inference_time_ms
            );
        }
    }

    fn on_empty_detect(&self) {
        println!("no currency detected");
    }
}

/// One detection row in the transposed export layout.
fn fixture_output(num_classes: usize) -> RawOutput {
    let stride = 4 + num_classes;
    let mut data = vec![0.0f32; stride];
    data[0] = 0.5; // cx
    data[1] = 0.5; // cy
    data[2] = 0.3; // w
    data[3] = 0.3; // h
    data[4 + 2] = 0.92; // class 2 score
    RawOutput::new(vec![1, stride, 1], data)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let labels: Vec<String> = [
        "10 rupee note",
        "20 rupee note",
        "50 rupee note",
        "100 rupee note",
        "200 rupee note",
        "500 rupee note",
        "2000 rupee note",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let config = DetectorConfig {
        output_layout: OutputLayout::Transposed,
        ..DetectorConfig::with_labels(labels)
    };

    let engine = SlowFixtureEngine {
        raw: fixture_output(config.num_classes),
    };
    let detector = Detector::new(engine, config)?;
    let handle = PipelineWorker::spawn(detector, Arc::new(Printer));

    // Burst frames faster than the engine can run; the slot keeps only the
    // newest, so most of the burst is dropped rather than queued.
    for i in 0..30 {
        handle.submit(ImageFrame::rgb(vec![i as u8; 640 * 480 * 3], 640, 480));
        std::thread::sleep(Duration::from_millis(5));
    }
    std::thread::sleep(Duration::from_millis(100));
    handle.shutdown();
    Ok(())
}
