// Millimetre conversions shared by every encoder.
//
// All encoders go through these helpers so the same millimetre value always
// lands on the same native coordinate. Negative inputs clamp to zero.

use crate::label::{Position, Rotation};

pub const DPI: f32 = 203.0;
pub const MM_PER_INCH: f32 = 25.4;

/// Round half up. Inputs are already clamped to be non-negative.
fn round_half_up(value: f32) -> u32 {
    (value + 0.5).floor() as u32
}

pub fn mm_to_dots(mm: f32) -> u32 {
    round_half_up(mm.max(0.0) * DPI / MM_PER_INCH)
}

/// PPLA metric mode counts in tenths of a millimetre.
pub fn mm_to_tenths(mm: f32) -> u32 {
    round_half_up(mm.max(0.0) * 10.0)
}

/// Axis-aligned box `(x, y, width, height)` in millimetres covered by a line
/// of `length` drawn from `at` in the direction given by `rotation`.
pub fn line_box(at: Position, length: f32, thickness: f32, rotation: Rotation) -> (f32, f32, f32, f32) {
    let length = length.max(0.0);
    let thickness = thickness.max(0.0);
    let (x, y, w, h) = match rotation {
        Rotation::R0 => (at.x, at.y, length, thickness),
        Rotation::R90 => (at.x, at.y, thickness, length),
        Rotation::R180 => (at.x - length, at.y, length, thickness),
        Rotation::R270 => (at.x, at.y - length, thickness, length),
    };
    (x.max(0.0), y.max(0.0), w, h)
}
