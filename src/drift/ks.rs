//! Two-sample Kolmogorov-Smirnov test

use super::{TestOutcome, TwoSampleTest};
use crate::error::{Result, SentinelError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Kolmogorov-Smirnov test for distribution comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KolmogorovSmirnovTest {
    /// Significance level (alpha)
    alpha: f64,
}

impl KolmogorovSmirnovTest {
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(SentinelError::invalid_parameter(
                "alpha",
                alpha,
                "must lie in (0, 1)",
            ));
        }
        Ok(Self { alpha })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Asymptotic two-sample critical value `c(alpha) * sqrt((n + m) / (n * m))`
    pub fn critical_value(&self, n1: usize, n2: usize) -> f64 {
        let c_alpha = (-0.5 * (self.alpha / 2.0).ln()).sqrt();
        let (n1, n2) = (n1 as f64, n2 as f64);
        c_alpha * ((n1 + n2) / (n1 * n2)).sqrt()
    }

    /// Largest absolute gap between the two empirical CDFs.
    ///
    /// Both inputs must be sorted ascending.
    pub fn statistic(reference: &[f64], candidate: &[f64]) -> f64 {
        let (n, m) = (reference.len(), candidate.len());
        if n == 0 || m == 0 {
            return 0.0;
        }
        let (mut i, mut j) = (0usize, 0usize);
        let mut d: f64 = 0.0;

        while i < n && j < m {
            let x = reference[i].min(candidate[j]);
            while i < n && reference[i] <= x {
                i += 1;
            }
            while j < m && candidate[j] <= x {
                j += 1;
            }
            let gap = (i as f64 / n as f64 - j as f64 / m as f64).abs();
            d = d.max(gap);
        }
        d
    }

    /// Asymptotic p-value with the Stephens small-sample correction
    pub fn p_value(statistic: f64, n1: usize, n2: usize) -> f64 {
        let ne = (n1 * n2) as f64 / (n1 + n2) as f64;
        let sqrt_ne = ne.sqrt();
        let lambda = (sqrt_ne + 0.12 + 0.11 / sqrt_ne) * statistic;
        q_ks(lambda)
    }
}

impl Default for KolmogorovSmirnovTest {
    fn default() -> Self {
        Self { alpha: 0.05 }
    }
}

impl TwoSampleTest for KolmogorovSmirnovTest {
    fn name(&self) -> &'static str {
        "kolmogorov_smirnov"
    }

    fn compare(&self, reference: &[f64], candidate: &[f64]) -> Result<TestOutcome> {
        if reference.is_empty() || candidate.is_empty() {
            return Err(SentinelError::DataError(
                "Empty sample provided".to_string(),
            ));
        }

        let mut ref_sorted = reference.to_vec();
        let mut cand_sorted = candidate.to_vec();
        ref_sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        cand_sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let statistic = Self::statistic(&ref_sorted, &cand_sorted);
        Ok(TestOutcome {
            statistic,
            p_value: Self::p_value(statistic, reference.len(), candidate.len()),
            critical_value: self.critical_value(reference.len(), candidate.len()),
        })
    }
}

/// Kolmogorov distribution tail `Q(lambda) = 2 * sum (-1)^(j-1) exp(-2 j^2 lambda^2)`
fn q_ks(lambda: f64) -> f64 {
    if lambda < 1e-3 {
        return 1.0;
    }
    let a2 = -2.0 * lambda * lambda;
    let mut sum = 0.0;
    let mut sign = 1.0;
    let mut previous_term = 0.0;

    for j in 1..=100 {
        let j = j as f64;
        let term = sign * 2.0 * (a2 * j * j).exp();
        sum += term;
        if term.abs() <= 1e-10 * previous_term || term.abs() <= 1e-16 * sum.abs() {
            return sum.clamp(0.0, 1.0);
        }
        sign = -sign;
        previous_term = term.abs();
    }
    // Series failed to converge; only happens for tiny lambda
    1.0
}
