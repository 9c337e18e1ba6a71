//! Data Sanitization
//!
//! Numerical stability utilities.
//!
//! Functions:
//! - Probability / mastery clipping
//! - Feature vector sanitization
//! - Weight health diagnostics

use serde::{Deserialize, Serialize};

/// Lower bound for probabilities that are fed into a logarithm
pub const PROB_EPSILON: f64 = 1e-9;

/// Largest absolute value allowed in a state vector slot
pub const MAX_FEATURE_ABS: f64 = 50.0;

/// Whether the slice contains NaN or Inf
pub fn has_invalid_values(arr: &[f64]) -> bool {
    arr.iter().any(|&x| x.is_nan() || x.is_infinite())
}

/// Clips a value to [0, 1]; NaN becomes 0.0.
pub fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Clips a probability to [1e-9, 1 - 1e-9] before it is logged.
pub fn clip_probability(p: f64) -> f64 {
    if p.is_nan() {
        return 0.5;
    }
    p.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON)
}

/// Logistic function
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Rounds to two decimals, the precision used for reported scores.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Cleans a feature vector in place: invalid values become 0.0 and
/// magnitudes are capped at `MAX_FEATURE_ABS`.
pub fn sanitize_feature_vector(x: &mut [f64]) {
    for val in x.iter_mut() {
        if val.is_nan() || val.is_infinite() {
            *val = 0.0;
        } else if *val > MAX_FEATURE_ABS {
            *val = MAX_FEATURE_ABS;
        } else if *val < -MAX_FEATURE_ABS {
            *val = -MAX_FEATURE_ABS;
        }
    }
}

/// Health report for a set of network weights
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightDiagnostics {
    pub is_healthy: bool,
    pub invalid_count: usize,
    pub max_abs: f64,
    pub message: String,
}

/// Scans weights for NaN/Inf and reports the largest magnitude.
pub fn diagnose_weights<'a>(tensors: impl IntoIterator<Item = &'a [f64]>) -> WeightDiagnostics {
    let mut invalid_count = 0;
    let mut max_abs: f64 = 0.0;

    for tensor in tensors {
        for &w in tensor {
            if w.is_finite() {
                max_abs = max_abs.max(w.abs());
            } else {
                invalid_count += 1;
            }
        }
    }

    let is_healthy = invalid_count == 0;
    let message = if is_healthy {
        "weights are finite".to_string()
    } else {
        format!("{} non-finite weights", invalid_count)
    };

    WeightDiagnostics {
        is_healthy,
        invalid_count,
        max_abs,
        message,
    }
}
