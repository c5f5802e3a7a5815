//! Closed-form statistics shared by the analysis engines.
//!
//! Every function returns `None` instead of a misleadingly precise number
//! when its sample is too small or has no variance.

use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Two-sided 95% critical value of the standard normal.
pub const Z_95: f64 = 1.96;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample (n − 1) standard deviation. Needs at least two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

fn standard_normal() -> Option<Normal> {
    Normal::new(0.0, 1.0).ok()
}

/// Two-tailed p-value of a z statistic.
pub fn two_tailed_p_from_z(z: f64) -> f64 {
    if !z.is_finite() {
        return if z.is_nan() { 1.0 } else { 0.0 };
    }
    match standard_normal() {
        Some(n) => (2.0 * n.cdf(-z.abs())).min(1.0),
        None => 1.0,
    }
}

/// Two-tailed p-value of a Student's t statistic.
pub fn two_tailed_p_from_t(t: f64, degrees_of_freedom: f64) -> Option<f64> {
    if degrees_of_freedom <= 0.0 {
        return None;
    }
    if !t.is_finite() {
        return Some(if t.is_nan() { 1.0 } else { 0.0 });
    }
    let dist = StudentsT::new(0.0, 1.0, degrees_of_freedom).ok()?;
    Some((2.0 * dist.cdf(-t.abs())).min(1.0))
}

/// Benjamini–Hochberg adjusted p-values, returned in input order.
///
/// For ascending raw p-values p(1) ≤ … ≤ p(m) the adjusted value of rank i
/// is `min over j ≥ i of p(j)·m/j`, capped at 1.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    if m == 0 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]).then(a.cmp(&b)));

    let mut adjusted = vec![0.0; m];
    let mut running_min = 1.0_f64;
    for (rank, &idx) in order.iter().enumerate().rev() {
        let scaled = p_values[idx] * m as f64 / (rank + 1) as f64;
        running_min = running_min.min(scaled).min(1.0);
        adjusted[idx] = running_min.max(p_values[idx]);
    }
    adjusted
}

/// Pearson correlation coefficient. `None` for fewer than two pairs,
/// mismatched lengths or zero variance on either side.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }
    if vx <= 0.0 || vy <= 0.0 {
        return None;
    }
    Some((cov / (vx.sqrt() * vy.sqrt())).clamp(-1.0, 1.0))
}

/// Two-tailed p-value of a Pearson correlation on `n` pairs, via
/// `t = r·√((n − 2)/(1 − r²))` with n − 2 degrees of freedom.
pub fn correlation_p_value(r: f64, n: usize) -> Option<f64> {
    if n < 3 {
        return None;
    }
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= 0.0 {
        return Some(0.0);
    }
    two_tailed_p_from_t(r * (df / denom).sqrt(), df)
}

/// Ordinary least-squares slope of `ys` against `xs`.
pub fn ols_slope(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
    }
    if sxx <= 0.0 {
        return None;
    }
    Some(sxy / sxx)
}

/// Power of a two-sided z-test at level `alpha` to detect standardized
/// effect `effect_size` with `n` observations. Non-decreasing in `n` and
/// `|effect_size|`, and never above 1.
pub fn z_test_power(effect_size: f64, n: usize, alpha: f64) -> f64 {
    if n == 0 || !effect_size.is_finite() {
        return 0.0;
    }
    let Some(normal) = standard_normal() else {
        return 0.0;
    };
    let critical = normal.inverse_cdf(1.0 - alpha / 2.0);
    let shift = effect_size.abs() * (n as f64).sqrt();
    (normal.cdf(shift - critical) + normal.cdf(-shift - critical)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values).unwrap() - 5.0).abs() < 1e-12);
        assert!((sample_std_dev(&values).unwrap() - 2.138_089_935).abs() < 1e-6);
        assert!(sample_std_dev(&[1.0]).is_none());
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn test_z_p_values() {
        assert!((two_tailed_p_from_z(1.96) - 0.05).abs() < 1e-3);
        assert!((two_tailed_p_from_z(0.0) - 1.0).abs() < 1e-12);
        assert!(two_tailed_p_from_z(-8.0) < 1e-10);
    }

    #[test]
    fn test_benjamini_hochberg_known_values() {
        let raw = [0.01, 0.04, 0.03, 0.005];
        let adjusted = benjamini_hochberg(&raw);
        // sorted: 0.005 (0.02), 0.01 (0.02), 0.03 (0.04), 0.04 (0.04)
        assert!((adjusted[3] - 0.02).abs() < 1e-12);
        assert!((adjusted[0] - 0.02).abs() < 1e-12);
        assert!((adjusted[2] - 0.04).abs() < 1e-12);
        assert!((adjusted[1] - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_benjamini_hochberg_caps_at_one() {
        let adjusted = benjamini_hochberg(&[0.9, 0.95, 1.0]);
        assert!(adjusted.iter().all(|p| *p <= 1.0));
        assert!(benjamini_hochberg(&[]).is_empty());
    }

    #[test]
    fn test_pearson() {
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [2.0, 4.0, 6.0, 8.0, 10.0];
        assert!((pearson(&xs, &ys).unwrap() - 1.0).abs() < 1e-12);
        let inverse: Vec<f64> = ys.iter().rev().copied().collect();
        assert!((pearson(&xs, &inverse).unwrap() + 1.0).abs() < 1e-12);
        assert!(pearson(&xs, &[3.0; 5]).is_none());
    }

    #[test]
    fn test_correlation_p_value() {
        // r = 0.5 with 20 pairs: t ≈ 2.449 on 18 df, p ≈ 0.0248.
        let p = correlation_p_value(0.5, 20).unwrap();
        assert!((p - 0.0248).abs() < 1e-3, "p was {p}");
        assert!(correlation_p_value(0.9, 2).is_none());
        assert_eq!(correlation_p_value(1.0, 10), Some(0.0));
    }

    #[test]
    fn test_ols_slope() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [0.03, 0.028, 0.026, 0.024];
        assert!((ols_slope(&xs, &ys).unwrap() + 0.002).abs() < 1e-12);
        assert!(ols_slope(&[1.0, 1.0], &[0.1, 0.2]).is_none());
    }

    #[test]
    fn test_power_is_monotonic_and_bounded() {
        let small = z_test_power(0.3, 10, 0.05);
        let larger_n = z_test_power(0.3, 40, 0.05);
        let larger_effect = z_test_power(0.8, 10, 0.05);
        assert!(larger_n > small);
        assert!(larger_effect > small);
        assert!(z_test_power(5.0, 500, 0.05) <= 1.0);
        assert!((z_test_power(0.0, 10, 0.05) - 0.05).abs() < 1e-6);
    }
}
