//! Fixed output precision for every number the engine reports, so results
//! compare stably across runs.

/// Currency amounts (revenue, spend).
pub const CURRENCY_DP: u32 = 2;
/// Ratios, scores, correlations and effect sizes.
pub const RATIO_DP: u32 = 4;
/// p-values.
pub const P_VALUE_DP: u32 = 6;
/// Per-day trend slopes, which are small by construction.
pub const SLOPE_DP: u32 = 6;

pub fn round_to(value: f64, places: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(places as i32);
    // Adding zero folds -0.0 into 0.0 so tiny negatives serialize as 0.
    (value * factor).round() / factor + 0.0
}

pub fn currency(value: f64) -> f64 {
    round_to(value, CURRENCY_DP)
}

pub fn ratio(value: f64) -> f64 {
    round_to(value, RATIO_DP)
}

pub fn p_value(value: f64) -> f64 {
    round_to(value, P_VALUE_DP)
}

pub fn slope(value: f64) -> f64 {
    round_to(value, SLOPE_DP)
}
