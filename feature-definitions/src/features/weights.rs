/// Clamps a coverage or weight value into [0, 1].
pub fn clamp_unit(value: f64) -> f64 {
    if value < 0.0 {
        0.0
    } else if value > 1.0 {
        1.0
    } else {
        value
    }
}

/// Clamps a variation weight into [0, 1] and rounds it to three decimals.
/// Weights are normalized one at a time, the set is never rescaled to sum to 1.
pub fn normalize(weight: f64) -> f64 {
    (clamp_unit(weight) * 1000.0).round() / 1000.0
}
