//! Normalization of weight vectors before they are surfaced.

/// Scale non-negative weights so they sum to 1.
///
/// Zero-sum (or non-finite sum) input returns an all-zero vector of the same
/// length instead of dividing by zero.
pub fn normalize_distribution(weights: &[f32]) -> Vec<f32> {
    let sum: f64 = weights.iter().map(|&w| w as f64).sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![0.0; weights.len()];
    }
    weights.iter().map(|&w| (w as f64 / sum) as f32).collect()
}

/// f64 variant used for aggregated (summed) distributions
pub fn normalize_distribution_f64(weights: &[f64]) -> Vec<f64> {
    let sum: f64 = weights.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![0.0; weights.len()];
    }
    weights.iter().map(|&w| w / sum).collect()
}

/// Index of the largest weight, lowest index on ties.
/// `None` for an empty slice.
pub fn argmax(weights: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &w) in weights.iter().enumerate() {
        match best {
            Some((_, b)) if w <= b => {}
            _ if w.is_nan() => {}
            _ => best = Some((i, w)),
        }
    }
    best.map(|(i, _)| i)
}

/// Round to `digits` decimals, as stored in similarity lists
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}
