use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Two-sided 95% standard normal quantile.
const Z_95: f64 = 1.959_963_984_540_054;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance; zero for fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64
}

/// Least-squares slope of `ys` on `xs`; zero when `xs` has no spread.
pub fn ols_slope(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let mx = mean(&xs[..n]);
    let my = mean(&ys[..n]);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for i in 0..n {
        sxy += (xs[i] - mx) * (ys[i] - my);
        sxx += (xs[i] - mx) * (xs[i] - mx);
    }
    if sxx <= f64::EPSILON {
        0.0
    } else {
        sxy / sxx
    }
}

pub fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

/// Two-sided standard normal critical value for a confidence level.
pub fn z_critical(level: f64) -> f64 {
    Normal::new(0.0, 1.0)
        .map(|n| n.inverse_cdf(0.5 + level / 2.0))
        .unwrap_or(Z_95)
}

/// Two-sided Student t critical value; falls back to the normal quantile
/// when the degrees of freedom are not usable.
pub fn t_critical(level: f64, df: f64) -> f64 {
    if !df.is_finite() || df <= 0.0 {
        return z_critical(level);
    }
    StudentsT::new(0.0, 1.0, df)
        .map(|t| t.inverse_cdf(0.5 + level / 2.0))
        .unwrap_or_else(|_| z_critical(level))
}

/// Welch-Satterthwaite degrees of freedom for two independent means.
pub fn welch_df(var_a: f64, n_a: usize, var_b: f64, n_b: usize) -> f64 {
    let a = var_a / n_a as f64;
    let b = var_b / n_b as f64;
    let num = (a + b) * (a + b);
    let mut den = 0.0;
    if n_a > 1 {
        den += a * a / (n_a - 1) as f64;
    }
    if n_b > 1 {
        den += b * b / (n_b - 1) as f64;
    }
    if den <= 0.0 {
        f64::INFINITY
    } else {
        num / den
    }
}

/// Two-sided p-value of a Fisher z test for a (partial) correlation `r`
/// estimated from `n` samples with `cond` conditioning variables.
pub fn fisher_z_p_value(r: f64, n: usize, cond: usize) -> f64 {
    let dof = n as f64 - cond as f64 - 3.0;
    if dof <= 0.0 {
        return 1.0;
    }
    let r = r.clamp(-1.0 + 1e-12, 1.0 - 1e-12);
    let z = 0.5 * ((1.0 + r) / (1.0 - r)).ln() * dof.sqrt();
    match Normal::new(0.0, 1.0) {
        Ok(n) => (2.0 * (1.0 - n.cdf(z.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_variance() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((mean(&v) - 2.5).abs() < 1e-12);
        assert!((sample_variance(&v) - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(sample_variance(&[7.0]), 0.0);
    }

    #[test]
    fn slope_of_linear_series() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        assert!((ols_slope(&xs, &ys) - 2.0).abs() < 1e-12);
        assert_eq!(ols_slope(&[1.0, 1.0], &[2.0, 5.0]), 0.0);
    }

    #[test]
    fn critical_values_match_tables() {
        assert!((z_critical(0.95) - 1.959964).abs() < 1e-4);
        assert!((t_critical(0.95, 10.0) - 2.228139).abs() < 1e-3);
        assert!((t_critical(0.95, f64::INFINITY) - 1.959964).abs() < 1e-4);
    }

    #[test]
    fn fisher_z_separates_strong_and_null_correlations() {
        assert!(fisher_z_p_value(0.0, 100, 0) > 0.99);
        assert!(fisher_z_p_value(0.6, 100, 1) < 1e-6);
        assert_eq!(fisher_z_p_value(0.9, 3, 0), 1.0);
    }
}
