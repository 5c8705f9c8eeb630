//! Model-space boxes → original frame pixel space.

use notescan_preprocess::{LetterboxTransform, Rotation};

use crate::geometry::Rect;

/// Map a normalized model-space box back into original frame pixels.
///
/// Inverts exactly the letterbox the preprocessor applied, then undoes the
/// capture rotation, and last applies the front-camera horizontal flip
/// (`x' = frame_w - x`).  `transform.src_w/src_h` are the upright buffer
/// dimensions; for 90°/270° rotations the original sensor frame has them
/// swapped.  The result is clamped to the frame bounds.
pub fn map_to_frame(
    rect: Rect,
    transform: &LetterboxTransform,
    rotation: Rotation,
    mirrored: bool,
) -> Rect {
    let (ax, ay) = map_point(rect.x1, rect.y1, transform, rotation, mirrored);
    let (bx, by) = map_point(rect.x2, rect.y2, transform, rotation, mirrored);
    let (frame_w, frame_h) = frame_dims(transform, rotation);
    Rect::from_corners(ax, ay, bx, by).clamp(frame_w, frame_h)
}

/// Original frame dimensions after undoing the capture rotation.
pub fn frame_dims(transform: &LetterboxTransform, rotation: Rotation) -> (f32, f32) {
    if rotation.swaps_axes() {
        (transform.src_h as f32, transform.src_w as f32)
    } else {
        (transform.src_w as f32, transform.src_h as f32)
    }
}

fn map_point(
    u: f32,
    v: f32,
    transform: &LetterboxTransform,
    rotation: Rotation,
    mirrored: bool,
) -> (f32, f32) {
    // 1. Undo the letterbox: normalized model space → upright pixels.
    let (x, y) = transform.invert(u, v);
    let (uw, uh) = (transform.src_w as f32, transform.src_h as f32);

    // 2. Undo the clockwise capture rotation.
    let (x, y) = match rotation {
        Rotation::None => (x, y),
        Rotation::Cw90 => (y, uw - x),
        Rotation::Cw180 => (uw - x, uh - y),
        Rotation::Cw270 => (uh - y, x),
    };

    // 3. Mirror flip last, against the original frame width.
    if mirrored {
        let (frame_w, _) = frame_dims(transform, rotation);
        (frame_w - x, y)
    } else {
        (x, y)
    }
}
