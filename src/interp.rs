use crate::types::{Rgb, Value, Vector};

// linearly map a number from one range to another
pub fn remap(s: Value, range_in: [Value; 2], range_out: [Value; 2]) -> Value {
    range_out[0] + (s - range_in[0]) * (range_out[1] - range_out[0]) / (range_in[1] - range_in[0])
}

// Linear interpolation
pub fn lerp(a: Value, b: Value, t: Value) -> Value {
    a + (b - a) * t
}

// Component-wise linear interpolation between two colors
pub fn mix(a: Rgb, b: Rgb, t: Value) -> Rgb {
    a + (b - a) * t
}

pub fn saturate(v: Value) -> Value {
    v.clamp(0.0, 1.0)
}

/// Trilinear blend of the 8 corner values of a cell.
///
/// Corner `i` sits at offset `(i & 1, (i >> 1) & 1, (i >> 2) & 1)`; `t` is the
/// fractional position inside the cell.
pub fn trilinear(corners: [Value; 8], t: Vector) -> Value {
    let x00 = lerp(corners[0], corners[1], t.x);
    let x10 = lerp(corners[2], corners[3], t.x);
    let x01 = lerp(corners[4], corners[5], t.x);
    let x11 = lerp(corners[6], corners[7], t.x);
    let y0 = lerp(x00, x10, t.y);
    let y1 = lerp(x01, x11, t.y);
    lerp(y0, y1, t.z)
}
