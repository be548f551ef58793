//! Truncated L-function estimate of h*R.
//!
//! By the analytic class number formula, L(1, chi_D) = 2*h*R/sqrt(D) for the
//! Kronecker character chi_D. Truncating the Dirichlet series at Q terms and
//! applying one Richardson step (2*S_{2Q} - S_Q) gives an estimate E of h*R
//! with a computable error bound F, so the true h*R lies in [E - F, E + F].
//! The regulator search only has to sweep that interval.

use crate::order::QuadraticOrder;

pub struct LFunctionEstimator<'a> {
    ord: &'a QuadraticOrder,
    terms: u64,
}

impl<'a> LFunctionEstimator<'a> {
    pub fn new(ord: &'a QuadraticOrder, terms: u64) -> Self {
        LFunctionEstimator {
            ord,
            terms: terms.max(16),
        }
    }

    /// Number of Dirichlet terms actually summed, after clamping.
    pub fn terms_used(&self) -> u64 {
        self.terms
    }

    /// Truncated value of L(1, chi_D) with Richardson extrapolation:
    /// 2*S_{2Q} - S_Q for 2Q = terms.
    pub fn l_value(&self) -> f64 {
        let half = self.terms / 2;
        let mut sum = 0.0;
        let mut sum_half = 0.0;
        for n in 1..=self.terms {
            sum += f64::from(self.ord.kronecker(n)) / n as f64;
            if n == half {
                sum_half = sum;
            }
        }
        2.0 * sum - sum_half
    }

    /// Estimate of h*R: sqrt(D) * L / 2.
    pub fn hr_estimate(&self) -> f64 {
        let root = (crate::numeric::ln_big(self.ord.delta()) * 0.5).exp();
        root * self.l_value() / 2.0
    }

    /// Error bound F on the estimate, from the Polya-Vinogradov tail bound
    /// exp(+-A) on the truncated product with A = sqrt(D)*ln(D)/terms.
    pub fn error_bound(&self) -> f64 {
        let ln_d = crate::numeric::ln_big(self.ord.delta());
        let root = (ln_d * 0.5).exp();
        let a = root * ln_d / self.terms as f64;
        let spread = (a.exp() - 1.0).max(1.0 - (-a).exp());
        spread * self.l_value().abs() * root / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn ord(delta: i64) -> QuadraticOrder {
        QuadraticOrder::new(BigInt::from(delta), 53).unwrap()
    }

    #[test]
    fn test_l_value_delta_5() {
        // L(1, chi_5) = 2*ln((1+sqrt(5))/2)/sqrt(5) = 0.43041...
        let o = ord(5);
        let expected = 2.0 * ((1.0 + 5f64.sqrt()) / 2.0).ln() / 5f64.sqrt();
        let l = LFunctionEstimator::new(&o, 50_000).l_value();
        assert!((l - expected).abs() < 1e-3, "got {}", l);
    }

    #[test]
    fn test_l_value_delta_13() {
        // h = 1, R = ln((3+sqrt(13))/2), so L = 2R/sqrt(13) = 0.66272...
        let o = ord(13);
        let expected = 2.0 * ((3.0 + 13f64.sqrt()) / 2.0).ln() / 13f64.sqrt();
        let l = LFunctionEstimator::new(&o, 50_000).l_value();
        assert!((l - expected).abs() < 1e-3, "got {}", l);
    }

    #[test]
    fn test_estimate_brackets_hr() {
        // D = 316: h = 3, R = ln(80 + 9*sqrt(79)) = 5.07513..., hR = 15.225.
        let o = ord(316);
        let est = LFunctionEstimator::new(&o, 50_000);
        let e = est.hr_estimate();
        let f = est.error_bound();
        let hr = 3.0 * (80.0 + 9.0 * 79f64.sqrt()).ln();
        assert!(
            (e - hr).abs() <= f,
            "true hR {} outside [{} - {}, {} + {}]",
            hr,
            e,
            f,
            e,
            f
        );
    }

    #[test]
    fn test_fewer_terms_widen_the_bound() {
        let o = ord(316);
        let tight = LFunctionEstimator::new(&o, 50_000).error_bound();
        let loose = LFunctionEstimator::new(&o, 400).error_bound();
        assert!(loose > tight);
    }

    #[test]
    fn test_terms_are_clamped() {
        let o = ord(13);
        assert_eq!(LFunctionEstimator::new(&o, 3).terms_used(), 16);
        assert_eq!(LFunctionEstimator::new(&o, 400).terms_used(), 400);
    }
}
