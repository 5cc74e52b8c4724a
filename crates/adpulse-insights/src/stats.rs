//! Welch's unequal-variance t-test.
//!
//! The statistic and Welch-Satterthwaite degrees of freedom are computed here;
//! the Student-t tail and quantile come from `statrs`.

use statrs::distribution::{ContinuousCDF, StudentsT};

/// Result of comparing a sample against a reference sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WelchTest {
    pub t_statistic: f64,
    pub degrees_of_freedom: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// `mean(sample) - mean(reference)`.
    pub mean_difference: f64,
    /// 95 % confidence interval for `mean_difference`.
    pub confidence_interval: [f64; 2],
}

const CI_ALPHA: f64 = 0.05;

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sample_variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0)
}

/// Run Welch's t-test. Needs at least two values on each side and a
/// finite, positive degrees of freedom.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn welch_t_test(sample: &[f64], reference: &[f64]) -> Option<WelchTest> {
    if sample.len() < 2 || reference.len() < 2 {
        return None;
    }
    let (n1, n2) = (sample.len() as f64, reference.len() as f64);
    let diff = mean(sample) - mean(reference);
    let a = sample_variance(sample) / n1;
    let b = sample_variance(reference) / n2;
    let se = (a + b).sqrt();

    if se == 0.0 || !se.is_finite() {
        // Both samples constant: any difference is exact.
        let p_value = if diff == 0.0 { 1.0 } else { 0.0 };
        return Some(WelchTest {
            t_statistic: if diff == 0.0 { 0.0 } else { diff.signum() * f64::INFINITY },
            degrees_of_freedom: n1 + n2 - 2.0,
            p_value,
            mean_difference: diff,
            confidence_interval: [diff, diff],
        });
    }

    let t = diff / se;
    let df = (a + b).powi(2) / (a.powi(2) / (n1 - 1.0) + b.powi(2) / (n2 - 1.0));
    let p_value = two_sided_p(t, df)?;
    let margin = t_critical(df, CI_ALPHA)? * se;

    Some(WelchTest {
        t_statistic: t,
        degrees_of_freedom: df,
        p_value,
        mean_difference: diff,
        confidence_interval: [diff - margin, diff + margin],
    })
}

/// `P(|T| >= |t|)` for a Student-t with `df` degrees of freedom.
///
/// Returns `None` when `df` is not a valid degrees-of-freedom value.
#[must_use]
pub fn two_sided_p(t: f64, df: f64) -> Option<f64> {
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    if !t.is_finite() {
        return Some(0.0);
    }
    Some((2.0 * dist.sf(t.abs())).clamp(0.0, 1.0))
}

/// Two-sided critical value: the `t` for which `two_sided_p(t, df) == alpha`.
fn t_critical(df: f64, alpha: f64) -> Option<f64> {
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some(dist.inverse_cdf(1.0 - alpha / 2.0))
}
