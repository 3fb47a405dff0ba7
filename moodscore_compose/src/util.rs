// Scalar helpers shared by every stage: interpolation and unit clamping.

/// Linear interpolation from `a` to `b` by `t` (unclamped).
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Clamp into [0, 1].
pub fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Interpolate inside a `(min, max)` range.
pub fn lerp_range(range: (f64, f64), t: f64) -> f64 {
    lerp(range.0, range.1, t)
}
