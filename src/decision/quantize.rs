//! Irrigation amount quantization onto the controller's discrete levels

/// Smallest level not below `value`; above the top level maps to the top
/// level; non-positive values map to zero. `levels` must be ascending.
pub fn quantize(value: f64, levels: &[f64]) -> f64 {
    if value.is_nan() || value <= 0.0 {
        return 0.0;
    }
    levels
        .iter()
        .copied()
        .find(|level| value <= *level)
        .or_else(|| levels.last().copied())
        .unwrap_or(0.0)
}
