// notescan-preprocess/src/lib.rs
// ============================================================
// Image preprocessing stage for NoteScan
// Letterboxes an arbitrary-size RGB frame onto the fixed model
// canvas and normalizes pixel values for inference.
// ------------------------------------------------------------
// Public API
//   * Preprocessor::run(frame)  – ImageFrame → (Array3<f32>, LetterboxTransform)
//   * LetterboxTransform        – forward/invert mapping shared
//                                 with the coordinate mapper
// ============================================================

//! NoteScan – preprocessing layer
//!
//! Turns a captured [`ImageFrame`] (RGB8, any resolution) into the exact
//! `H×W×3` f32 tensor the detection model expects.  The aspect ratio is
//! preserved by letterboxing onto a gray canvas; the resulting
//! [`LetterboxTransform`] records the scale and padding so detections can be
//! mapped back into frame pixel space by the detect crate.  `run` is a pure
//! function of frame + config and allocates only the output tensor.

use ndarray::Array3;
use resize::{new as new_resizer, Pixel, Type};
use rgb::FromSlice;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gray value used for the letterbox padding bars.
pub const PAD_VALUE: u8 = 114;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Empty frame: {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },
    #[error("Unsupported channel count: expected 3, got {0}")]
    UnsupportedChannels(u8),
    #[error("Pixel buffer size mismatch: expected {expected} bytes, got {got}")]
    BufferSize { expected: usize, got: usize },
    #[error("Resize failed: {0}")]
    Resize(#[from] resize::Error),
}

pub type Result<T> = std::result::Result<T, PreprocessError>;

/// Clockwise rotation applied upstream to bring the frame upright.
///
/// The pixel buffer in [`ImageFrame`] is always upright; this enum records
/// what the capture path already applied so detections can be mapped back
/// into the original sensor orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// True when the rotation swaps frame width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Cw90 | Rotation::Cw270)
    }
}

/// Pixel value range the model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Normalization {
    /// `px / 255` → `[0, 1]`
    #[default]
    ZeroToOne,
    /// `px / 127.5 - 1` → `[-1, 1]`
    NegOneToOne,
}

impl Normalization {
    #[inline]
    pub fn apply(self, px: u8) -> f32 {
        match self {
            Normalization::ZeroToOne => px as f32 / 255.0,
            Normalization::NegOneToOne => px as f32 / 127.5 - 1.0,
        }
    }
}

/// An upright RGB8 frame plus the capture metadata needed to map
/// detections back to the sensor frame.
#[derive(Debug, Clone)]
pub struct ImageFrame {
    /// Interleaved RGB bytes, row-major, `width * height * channels` long.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    /// Rotation the capture path applied to make the buffer upright.
    pub rotation: Rotation,
    /// Front-facing capture; mapped boxes get a final horizontal flip.
    pub mirrored: bool,
}

impl ImageFrame {
    /// Wrap an interleaved RGB8 buffer.
    pub fn rgb(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
            channels: 3,
            rotation: Rotation::None,
            mirrored: false,
        }
    }

    pub fn from_rgb_image(img: &image::RgbImage) -> Self {
        Self::rgb(img.as_raw().clone(), img.width(), img.height())
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_mirroring(mut self, mirrored: bool) -> Self {
        self.mirrored = mirrored;
        self
    }
}

/// Record of the letterbox transform applied by [`Preprocessor::run`].
///
/// `forward` maps frame pixel coordinates into normalized model space,
/// `invert` maps back.  The coordinate mapper must use exactly this record –
/// the pairing is the most error-prone seam in the pipeline and is covered
/// by a round-trip test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub src_w: u32,
    pub src_h: u32,
    pub dst_w: u32,
    pub dst_h: u32,
}

impl LetterboxTransform {
    fn compute(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Self {
        let scale = (dst_w as f32 / src_w as f32).min(dst_h as f32 / src_h as f32);
        let scaled_w = ((src_w as f32 * scale).round() as u32).clamp(1, dst_w);
        let scaled_h = ((src_h as f32 * scale).round() as u32).clamp(1, dst_h);
        Self {
            scale,
            pad_x: ((dst_w - scaled_w) / 2) as f32,
            pad_y: ((dst_h - scaled_h) / 2) as f32,
            src_w,
            src_h,
            dst_w,
            dst_h,
        }
    }

    /// Scaled content size inside the canvas, without the padding bars.
    pub fn content_size(&self) -> (u32, u32) {
        let w = ((self.src_w as f32 * self.scale).round() as u32).clamp(1, self.dst_w);
        let h = ((self.src_h as f32 * self.scale).round() as u32).clamp(1, self.dst_h);
        (w, h)
    }

    /// Frame pixel coordinates → normalized model-space `[0, 1]`.
    pub fn forward(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x * self.scale + self.pad_x) / self.dst_w as f32,
            (y * self.scale + self.pad_y) / self.dst_h as f32,
        )
    }

    /// Normalized model-space `[0, 1]` → frame pixel coordinates.
    pub fn invert(&self, u: f32, v: f32) -> (f32, f32) {
        (
            (u * self.dst_w as f32 - self.pad_x) / self.scale,
            (v * self.dst_h as f32 - self.pad_y) / self.scale,
        )
    }
}

/// Resizes + letterboxes + normalizes frames for the model.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    dst_w: u32,
    dst_h: u32,
    normalization: Normalization,
}

impl Preprocessor {
    /// Create a preprocessor producing `dst_w × dst_h` RGB tensors.
    pub fn new(dst_w: u32, dst_h: u32, normalization: Normalization) -> Self {
        Self {
            dst_w,
            dst_h,
            normalization,
        }
    }

    /// Letterbox `frame` onto the model canvas and normalize.
    ///
    /// Returns the `(dst_h, dst_w, 3)` tensor together with the transform
    /// that was applied, for later inversion by the coordinate mapper.
    pub fn run(&self, frame: &ImageFrame) -> Result<(Array3<f32>, LetterboxTransform)> {
        if frame.width == 0 || frame.height == 0 {
            return Err(PreprocessError::EmptyFrame {
                width: frame.width,
                height: frame.height,
            });
        }
        if frame.channels != 3 {
            return Err(PreprocessError::UnsupportedChannels(frame.channels));
        }
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.pixels.len() != expected {
            return Err(PreprocessError::BufferSize {
                expected,
                got: frame.pixels.len(),
            });
        }

        let transform =
            LetterboxTransform::compute(frame.width, frame.height, self.dst_w, self.dst_h);
        let (scaled_w, scaled_h) = transform.content_size();

        // 1. Resize the full frame to the scaled content size (Lanczos3).
        let mut scaled = vec![0u8; scaled_w as usize * scaled_h as usize * 3];
        let mut resizer = new_resizer(
            frame.width as usize,
            frame.height as usize,
            scaled_w as usize,
            scaled_h as usize,
            Pixel::RGB8,
            Type::Lanczos3,
        )?;
        resizer.resize(frame.pixels.as_rgb(), scaled.as_rgb_mut())?;

        // 2. Paste onto the gray canvas at the padding offset.
        let mut canvas = vec![PAD_VALUE; self.dst_w as usize * self.dst_h as usize * 3];
        let (px, py) = (transform.pad_x as usize, transform.pad_y as usize);
        let row_bytes = scaled_w as usize * 3;
        for row in 0..scaled_h as usize {
            let src = row * row_bytes;
            let dst = ((py + row) * self.dst_w as usize + px) * 3;
            canvas[dst..dst + row_bytes].copy_from_slice(&scaled[src..src + row_bytes]);
        }

        // 3. Normalize into (H, W, C) ndarray.
        let mut arr = Array3::<f32>::zeros((self.dst_h as usize, self.dst_w as usize, 3));
        let flat = arr.as_slice_mut().expect("freshly allocated array is contiguous");
        for (out, &px) in flat.iter_mut().zip(canvas.iter()) {
            *out = self.normalization.apply(px);
        }
        Ok((arr, transform))
    }
}
