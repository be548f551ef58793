//! The infrastructure of a real quadratic order.
//!
//! An `InfElement` pairs a reduced principal-cycle ideal with its distance
//! ln|theta| from the identity, where (theta) generates the ideal. Distances
//! live on a circle of circumference R (the regulator): baby steps move one
//! reduction step forward or back, giant steps compose two elements and add
//! their distances up to the exact relative generator, and `near` lands on
//! the reduced ideal closest below an arbitrary target distance in
//! O(log target) operations.

use num_bigint::BigInt;

use crate::ideal::{nucomp, nudupl, Ideal};
use crate::numeric::Real;
use crate::order::QuadraticOrder;
use crate::InfraError;

/// A reduced principal ideal together with its infrastructure distance.
#[derive(Debug, Clone)]
pub struct InfElement<'a, R: Real> {
    ord: &'a QuadraticOrder,
    ideal: Ideal,
    distance: R,
}

impl<'a, R: Real> InfElement<'a, R> {
    /// The identity element: the principal ideal (1, b0, c0) at distance 0.
    pub fn one(ord: &'a QuadraticOrder) -> Self {
        InfElement {
            ord,
            ideal: ord.identity_ideal(),
            distance: R::zero(ord.precision()),
        }
    }

    pub fn from_parts(ord: &'a QuadraticOrder, ideal: Ideal, distance: R) -> Self {
        InfElement {
            ord,
            ideal,
            distance,
        }
    }

    pub fn ideal(&self) -> &Ideal {
        &self.ideal
    }

    pub fn distance(&self) -> f64 {
        self.distance.to_f64()
    }

    pub fn is_one(&self) -> bool {
        self.ideal.is_one()
    }

    /// Canonical hash of the owned (reduced) ideal, the baby-step table key.
    pub fn hash_real(&self) -> u64 {
        crate::table::hash_coeffs(&self.ideal.a, &self.ideal.b)
    }

    /// One reduction step forward. The distance increment is
    /// ln|2a'/(b' - sqrt(D))| of the stepped form, positive for every
    /// reduced form; a non-increasing distance means the representation
    /// has lost the cycle.
    pub fn baby_step(&mut self) -> Result<(), InfraError> {
        self.ideal.advance(self.ord)?;
        let inc = R::ln_quad(
            &self.ideal.b,
            &BigInt::from(-1),
            &(&self.ideal.a << 1),
            self.ord.delta(),
            self.ord.precision(),
        );
        let next = self.distance.clone() - inc;
        if next.to_f64() <= self.distance.to_f64() {
            return Err(InfraError::PrecisionDrift {
                distance: self.distance.to_f64(),
            });
        }
        self.distance = next;
        Ok(())
    }

    /// One reduction step backward, the exact inverse of `baby_step`. The
    /// distance must strictly decrease.
    pub fn inverse_rho(&mut self) -> Result<(), InfraError> {
        let dec = R::ln_quad(
            &self.ideal.b,
            &BigInt::from(-1),
            &(&self.ideal.a << 1),
            self.ord.delta(),
            self.ord.precision(),
        );
        let next = self.distance.clone() + dec;
        if next.to_f64() >= self.distance.to_f64() {
            return Err(InfraError::PrecisionDrift {
                distance: self.distance.to_f64(),
            });
        }
        self.distance = next;
        self.ideal.recede(self.ord)
    }

    /// Compose with another element. Distances add exactly:
    /// dist = dist_self + dist_other - ln|gamma|.
    pub fn giant_step(&mut self, other: &InfElement<'a, R>) -> Result<(), InfraError> {
        let (c, gamma) = nucomp(&self.ideal, &other.ideal, self.ord)?;
        let lg: R = gamma.ln(self.ord.delta(), self.ord.precision());
        self.distance = self.distance.clone() + other.distance.clone() - lg;
        self.ideal = c;
        Ok(())
    }

    /// Square in place via NUDUPL.
    pub fn square(&mut self) -> Result<(), InfraError> {
        let (c, gamma) = nudupl(&self.ideal, self.ord)?;
        let lg: R = gamma.ln(self.ord.delta(), self.ord.precision());
        self.distance = self.distance.clone() + self.distance.clone() - lg;
        self.ideal = c;
        Ok(())
    }

    /// The conjugate element, at distance ln(a) - dist plus the reduction
    /// generator. Inverts the element on the distance circle.
    pub fn conjugate(&self) -> Result<InfElement<'a, R>, InfraError> {
        let mut ideal = self.ideal.conjugate();
        let prec = self.ord.precision();
        let mut distance =
            R::ln_int(&ideal.a, prec) - self.distance.clone();
        let gamma = ideal.reduce_tracked(self.ord)?;
        distance = distance + gamma.ln(self.ord.delta(), prec);
        Ok(InfElement {
            ord: self.ord,
            ideal,
            distance,
        })
    }

    /// Step until dist <= target < dist-of-next-step. Walks forward or
    /// backward as needed; the steps themselves guarantee progress, so the
    /// walk terminates.
    pub fn adjust(&mut self, target: f64) -> Result<(), InfraError> {
        if self.distance() > target {
            while self.distance() > target {
                self.inverse_rho()?;
            }
        } else {
            while self.distance() <= target {
                self.baby_step()?;
            }
            self.inverse_rho()?;
        }
        Ok(())
    }

    /// The element closest below `target`, by repeated squaring from the
    /// identity with an adjustment after each doubling.
    pub fn near(ord: &'a QuadraticOrder, target: f64) -> Result<Self, InfraError> {
        if target <= 4.0 {
            let mut e = Self::one(ord);
            if target > 0.0 {
                e.adjust(target)?;
            }
            return Ok(e);
        }
        let mut e = Self::near(ord, target / 2.0)?;
        e.square()?;
        e.adjust(target)?;
        Ok(e)
    }
}

/// Check that an ideal is the identity after at most one extra step, with
/// the stepped distance within `slack` of `target`. Used when snapping an
/// estimated multiple of the regulator onto an exact distance.
pub fn closes_at<R: Real>(
    e: &InfElement<'_, R>,
    target: f64,
    slack: f64,
) -> Result<Option<f64>, InfraError> {
    let mut probe = e.clone();
    for _ in 0..2 {
        if probe.is_one() && (probe.distance() - target).abs() < slack {
            return Ok(Some(probe.distance()));
        }
        probe.baby_step()?;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    // R = ln(4 + sqrt(17)), first step lands at ln((3 + sqrt(17))/2).
    fn r17() -> f64 {
        (4.0 + 17f64.sqrt()).ln()
    }

    fn d17_first() -> f64 {
        ((3.0 + 17f64.sqrt()) / 2.0).ln()
    }

    fn ord(delta: i64) -> QuadraticOrder {
        QuadraticOrder::new(BigInt::from(delta), 53).unwrap()
    }

    #[test]
    fn test_baby_step_distances_on_17() {
        let o = ord(17);
        let mut e: InfElement<f64> = InfElement::one(&o);
        assert_eq!(e.distance(), 0.0);
        e.baby_step().unwrap();
        assert!((e.distance() - d17_first()).abs() < 1e-12);
        e.baby_step().unwrap();
        e.baby_step().unwrap();
        assert!(e.is_one(), "period of D=17 cycle is three");
        assert!(
            (e.distance() - r17()).abs() < 1e-12,
            "full cycle distance must be the regulator, got {}",
            e.distance()
        );
    }

    #[test]
    fn test_period_one_cycle_13() {
        let o = ord(13);
        let mut e: InfElement<f64> = InfElement::one(&o);
        e.baby_step().unwrap();
        assert!(e.is_one());
        let r13 = ((3.0 + 13f64.sqrt()) / 2.0).ln();
        assert!((e.distance() - r13).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_rho_undoes_baby_step() {
        let o = ord(229);
        let mut e: InfElement<f64> = InfElement::one(&o);
        for _ in 0..4 {
            e.baby_step().unwrap();
        }
        let d = e.distance();
        let ideal = e.ideal().clone();
        e.baby_step().unwrap();
        e.inverse_rho().unwrap();
        assert_eq!(*e.ideal(), ideal);
        assert!((e.distance() - d).abs() < 1e-10);
    }

    #[test]
    fn test_square_distance_law_17() {
        // Squaring (2, 3, -1) at distance d lands on the identity at
        // 2d - ln((sqrt(17)-1)/2), one full cycle.
        let o = ord(17);
        let mut e: InfElement<f64> = InfElement::one(&o);
        e.baby_step().unwrap();
        e.square().unwrap();
        assert!(e.is_one());
        assert!((e.distance() - r17()).abs() < 1e-12);
    }

    #[test]
    fn test_giant_step_adds_distances() {
        let o = ord(229);
        let mut walk: InfElement<f64> = InfElement::one(&o);
        for _ in 0..3 {
            walk.baby_step().unwrap();
        }
        let mut double = walk.clone();
        double.giant_step(&walk).unwrap();
        // Compare against an exhaustive walk to the same ideal.
        let mut probe: InfElement<f64> = InfElement::one(&o);
        for _ in 0..200 {
            if probe.ideal() == double.ideal()
                && (probe.distance() - double.distance()).abs() < 1e-9
            {
                return;
            }
            probe.baby_step().unwrap();
        }
        panic!(
            "giant-step result not found on the cycle at distance {}",
            double.distance()
        );
    }

    #[test]
    fn test_conjugate_inverts_distance() {
        let o = ord(17);
        let mut e: InfElement<f64> = InfElement::one(&o);
        e.baby_step().unwrap();
        let c = e.conjugate().unwrap();
        // (2,3,-1) at d conjugates to (2,1,-2) at ln(2) - d.
        assert_eq!(
            *c.ideal(),
            Ideal::new(BigInt::from(2), BigInt::from(1), BigInt::from(-2))
        );
        assert!((c.distance() - (2f64.ln() - d17_first())).abs() < 1e-12);
    }

    #[test]
    fn test_hash_real_follows_the_ideal() {
        let o = ord(17);
        let mut e: InfElement<f64> = InfElement::one(&o);
        let id_hash = e.hash_real();
        e.baby_step().unwrap();
        assert_ne!(e.hash_real(), id_hash);
        let mut f: InfElement<f64> = InfElement::one(&o);
        f.baby_step().unwrap();
        assert_eq!(e.hash_real(), f.hash_real());
    }

    #[test]
    fn test_steps_reject_stalled_distance() {
        // At distance 1e18 an f64 absorbs a step increment of order 1: the
        // distance stops moving, and the step must report the drift rather
        // than silently walk in place.
        let o = ord(17);
        let mut e: InfElement<f64> = InfElement::from_parts(&o, o.identity_ideal(), 1e18);
        assert!(matches!(
            e.baby_step(),
            Err(InfraError::PrecisionDrift { .. })
        ));
        let mut e: InfElement<f64> = InfElement::from_parts(&o, o.identity_ideal(), 1e18);
        assert!(matches!(
            e.inverse_rho(),
            Err(InfraError::PrecisionDrift { .. })
        ));
    }

    #[test]
    fn test_adjust_brackets_target() {
        let o = ord(229);
        let mut e: InfElement<f64> = InfElement::one(&o);
        for _ in 0..6 {
            e.baby_step().unwrap();
        }
        e.adjust(1.5).unwrap();
        assert!(e.distance() <= 1.5);
        let mut next = e.clone();
        next.baby_step().unwrap();
        assert!(next.distance() > 1.5);
    }

    #[test]
    fn test_near_lands_below_target() {
        let o = ord(316);
        for target in [3.0, 7.5, 20.0, 100.0] {
            let e: InfElement<f64> = InfElement::near(&o, target).unwrap();
            assert!(
                e.distance() <= target,
                "near({}) overshot to {}",
                target,
                e.distance()
            );
            let mut next = e.clone();
            next.baby_step().unwrap();
            assert!(next.distance() > target);
        }
    }

    #[test]
    fn test_near_multiple_of_regulator_closes() {
        let o = ord(17);
        let target = 3.0 * r17();
        let mut e: InfElement<f64> = InfElement::near(&o, target).unwrap();
        e.adjust(target).unwrap();
        let hit = closes_at(&e, target, 0.5).unwrap();
        assert!(hit.is_some(), "3R must be a closing distance");
        assert!((hit.unwrap() - target).abs() < 1e-9);
    }
}
