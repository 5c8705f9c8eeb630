// demos/detect_image.rs
//------------------------------------------------------------
// Single-shot pipeline: image file → OrtEngine → detections
//------------------------------------------------------------
// Usage: detect_image <model.onnx> <labels.txt> <photo.jpg>

use anyhow::{Context, Result};
use notescan_detect::{load_labels, Detector, DetectorConfig};
use notescan_model::OrtEngine;
use notescan_preprocess::ImageFrame;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let model_path = args.next().context("usage: detect_image <model.onnx> <labels.txt> <photo>")?;
    let labels_path = args.next().context("missing labels path")?;
    let image_path = args.next().context("missing image path")?;

    let config = DetectorConfig::with_labels(load_labels(&labels_path)?);
    let engine = OrtEngine::new(&model_path, (config.input_height, config.input_width))?;
    let mut detector = Detector::new(engine, config)?;

    let img = image::open(&image_path)
        .with_context(|| format!("failed to open {image_path}"))?
        .to_rgb8();
    let frame = ImageFrame::from_rgb_image(&img);

    let (detections, inference_time_ms) = detector.run_frame(&frame)?;
    if detections.is_empty() {
        println!("no currency detected ({inference_time_ms} ms)");
        return Ok(());
    }
    println!("{} detection(s) in {inference_time_ms} ms:", detections.len());
    for d in &detections {
        println!(
            "  {:<16} conf={:.3} box=({:.0},{:.0})-({:.0},{:.0})",
            d.label, d.confidence, d.rect.x1, d.rect.y1, d.rect.x2, d.rect.y2
        );
    }
    Ok(())
}
