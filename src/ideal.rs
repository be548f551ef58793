//! Quadratic ideals and their arithmetic.
//!
//! An `Ideal` is a primitive integral ideal of a real quadratic order,
//! written as a binary form (a, b, c) with b^2 - 4ac = D and a > 0: the
//! Z-module [a, (b + sqrt(D))/2]. Composition is ideal multiplication; the
//! product A*B equals (gamma)*C for the reduced output C and an exact
//! relative generator gamma = (p + q*sqrt(D))/d, which is what makes
//! infrastructure distances exact:
//!
//! ```text
//! dist(C) = dist(A) + dist(B) - ln|gamma|.
//! ```
//!
//! Squaring uses the NUDUPL split: below floor(D^{1/4}) the plain squaring
//! formula, above it a partial extended GCD that keeps every intermediate
//! near D^{1/4}. General composition (NUCOMP) uses the same split with two
//! assembly cofactors, since the leading coefficients of the inputs differ.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, Zero};

use crate::numeric::QuadNumber;
use crate::order::QuadraticOrder;
use crate::InfraError;

/// A primitive ideal (a, b, c) with discriminant b^2 - 4ac.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ideal {
    pub a: BigInt,
    pub b: BigInt,
    pub c: BigInt,
}

/// Extended GCD result: g = u*x + v*y.
struct ExtGcd {
    g: BigInt,
    u: BigInt,
    v: BigInt,
}

fn ext_gcd(x: &BigInt, y: &BigInt) -> ExtGcd {
    let mut old_r = x.clone();
    let mut r = y.clone();
    let mut old_u = BigInt::one();
    let mut u = BigInt::zero();
    let mut old_v = BigInt::zero();
    let mut v = BigInt::one();

    while !r.is_zero() {
        let q = &old_r / &r;
        let t = &old_r - &q * &r;
        old_r = std::mem::replace(&mut r, t);
        let t = &old_u - &q * &u;
        old_u = std::mem::replace(&mut u, t);
        let t = &old_v - &q * &v;
        old_v = std::mem::replace(&mut v, t);
    }

    if old_r.is_negative() {
        ExtGcd {
            g: -old_r,
            u: -old_u,
            v: -old_v,
        }
    } else {
        ExtGcd {
            g: old_r,
            u: old_u,
            v: old_v,
        }
    }
}

/// Three-way extended GCD: g = u*x + v*y + w*z.
fn ext_gcd3(x: &BigInt, y: &BigInt, z: &BigInt) -> (BigInt, BigInt, BigInt, BigInt) {
    let r1 = ext_gcd(x, y);
    let r2 = ext_gcd(&r1.g, z);
    (r2.g, &r2.u * &r1.u, &r2.u * &r1.v, r2.v)
}

/// Partial extended Euclid: reduce (r2, r1) until r1 <= bound, carrying the
/// cosequence seeded with (c2, c1) = (0, -1). Used by the NUDUPL large path.
fn partial_xgcd(
    r2: &mut BigInt,
    r1: &mut BigInt,
    c2: &mut BigInt,
    c1: &mut BigInt,
    bound: &BigInt,
) {
    while &*r1 > bound {
        let q = &*r2 / &*r1;
        let r = &*r2 - &q * &*r1;
        *r2 = std::mem::replace(r1, r);
        let t = &*c2 - &q * &*c1;
        *c2 = std::mem::replace(c1, t);
    }
}

impl Ideal {
    pub fn new(a: BigInt, b: BigInt, c: BigInt) -> Self {
        Ideal { a, b, c }
    }

    pub fn discriminant(&self) -> BigInt {
        &self.b * &self.b - BigInt::from(4) * &self.a * &self.c
    }

    /// The principal reduced ideal has a = 1.
    pub fn is_one(&self) -> bool {
        self.a.is_one()
    }

    /// The conjugate ideal (a, -b, c), inverse in the class group.
    pub fn conjugate(&self) -> Ideal {
        Ideal {
            a: self.a.clone(),
            b: -&self.b,
            c: self.c.clone(),
        }
    }

    /// Normalize: force a > 0 and move b into the normalization interval,
    /// (rootD - 2a, rootD] when a <= rootD, (-a, a] otherwise. Neither step
    /// changes the underlying Z-module.
    pub fn normalize(&mut self, ord: &QuadraticOrder) -> Result<(), InfraError> {
        if self.a.is_zero() {
            return Err(InfraError::DegenerateForm {
                a: self.a.clone(),
                b: self.b.clone(),
                c: self.c.clone(),
            });
        }
        if self.a.is_negative() {
            self.a = -&self.a;
            self.c = -&self.c;
        }
        let root = ord.root_delta();
        let two_a: BigInt = &self.a << 1;
        let new_b = if &self.a <= root {
            let r = (root - &self.b).mod_floor(&two_a);
            root - r
        } else {
            let r = self.b.mod_floor(&two_a);
            if r > self.a {
                r - &two_a
            } else {
                r
            }
        };
        if new_b != self.b {
            self.b = new_b;
            self.c = (&self.b * &self.b - ord.delta()) / (&two_a << 1);
        }
        Ok(())
    }

    /// Reduced test for normalized real forms:
    /// 0 < b <= rootD and rootD - 2a < b and 2a - rootD <= b.
    pub fn is_reduced(&self, ord: &QuadraticOrder) -> bool {
        if !self.a.is_positive() || !self.b.is_positive() {
            return false;
        }
        let root = ord.root_delta();
        let two_a: BigInt = &self.a << 1;
        &self.b <= root && root - &two_a < self.b && &two_a - root <= self.b
    }

    /// Reduce in place, discarding the relative generator.
    pub fn reduce(&mut self, ord: &QuadraticOrder) -> Result<(), InfraError> {
        self.reduce_tracked(ord).map(|_| ())
    }

    /// Reduce in place and return gamma with I_reduced = (gamma) * I_in.
    ///
    /// Each swap step (a, b, c) -> (c, -b, a) multiplies the module by
    /// psi = (sqrt(D) - b)/(2a) in the pre-swap coefficients; normalization
    /// contributes nothing. The accumulated product is exact.
    pub fn reduce_tracked(&mut self, ord: &QuadraticOrder) -> Result<QuadNumber, InfraError> {
        let delta = ord.delta();
        let mut gamma = QuadNumber::one();
        self.normalize(ord)?;
        while !self.is_reduced(ord) {
            let psi = QuadNumber::new(-&self.b, BigInt::one(), &self.a << 1);
            gamma = gamma.mul(&psi, delta);
            let (a, b, c) = (self.a.clone(), self.b.clone(), self.c.clone());
            self.a = c;
            self.b = -b;
            self.c = a;
            self.normalize(ord)?;
        }
        // The exit form is already canonical: `is_reduced` admits only
        // b > 0, and a reduced form of positive discriminant has ac < 0,
        // so no two reduced forms share an (a, |b|) pair.
        Ok(gamma)
    }

    /// One forward step along the cycle of reduced forms. Returns the new
    /// (a, b) from which the caller derives the distance increment.
    pub fn advance(&mut self, ord: &QuadraticOrder) -> Result<(), InfraError> {
        let root = ord.root_delta();
        let two_a: BigInt = &self.a << 1;
        if two_a.is_zero() {
            return Err(InfraError::DegenerateForm {
                a: self.a.clone(),
                b: self.b.clone(),
                c: self.c.clone(),
            });
        }
        let r = (&self.b + root).mod_floor(&two_a);
        let p = root - &r;
        let q_new = {
            let q = (&self.b + root - &r) / &two_a;
            &q * ((&self.b - &p) >> 1) - &self.c
        };
        self.c = -std::mem::replace(&mut self.a, q_new);
        self.b = p;
        self.normalize(ord)
    }

    /// One backward step: the exact inverse of `advance`.
    pub fn recede(&mut self, ord: &QuadraticOrder) -> Result<(), InfraError> {
        let root = ord.root_delta();
        let old_a = self.a.clone();
        self.a = -&self.c;
        let two_a: BigInt = &self.a << 1;
        if two_a.is_zero() {
            return Err(InfraError::DegenerateForm {
                a: self.a.clone(),
                b: self.b.clone(),
                c: self.c.clone(),
            });
        }
        let q = (root + &self.b).div_floor(&two_a);
        let r = (root + &self.b).mod_floor(&two_a);
        let nb = root - r;
        self.c = &q * ((&nb - &self.b) >> 1) - &old_a;
        self.b = nb;
        if self.a.is_negative() {
            self.a = -&self.a;
            self.c = -&self.c;
        }
        Ok(())
    }
}

/// NUDUPL: square an ideal, returning the reduced result and gamma with
/// A^2 = (gamma) * C.
pub fn nudupl(x: &Ideal, ord: &QuadraticOrder) -> Result<(Ideal, QuadNumber), InfraError> {
    let delta = ord.delta();

    let mut a1 = x.a.clone();
    let b1 = x.b.clone();
    let mut c1 = x.c.clone();

    // s = gcd(b, a) = v1*b + u1*a; only v1 is needed.
    let eg = ext_gcd(&b1, &a1);
    let s = eg.g;
    let v1 = eg.u;

    let mut k = -(&v1 * &c1);
    if !s.is_one() {
        a1 = &a1 / &s;
        c1 = &c1 * &s;
    }
    k = k.mod_floor(&a1);

    let (mut raw, co2, co1);
    // k = 0 must take the plain path: the partial reduction below would
    // start from a zero remainder.
    if &a1 <= ord.nc_bound() || k.is_zero() {
        // Plain squaring formula; the result is already near-reduced.
        let t = &a1 * &k;
        let ca = &a1 * &a1;
        let cb = &b1 + (&t << 1);
        let cc = (&c1 + &k * (&b1 + &t)) / &a1;
        raw = Ideal::new(ca, cb, cc);
        co2 = BigInt::one();
        co1 = BigInt::zero();
    } else {
        // Partial reduction keeps every intermediate near D^{1/4}.
        let mut r2 = a1.clone();
        let mut r1 = k.clone();
        let mut c2 = BigInt::zero();
        let mut c1_ = -BigInt::one();
        partial_xgcd(&mut r2, &mut r1, &mut c2, &mut c1_, ord.nc_bound());

        let m2 = (&r1 * &b1 - &c1 * &c1_) / &a1;
        let mut ca = &r1 * &r1;
        let t = &c1_ * &m2;
        if c1_.is_positive() {
            ca -= t;
        } else {
            ca = t - ca;
        }
        let mut cb: BigInt = (&a1 * &r1 + &c2 * &ca) << 1;
        cb = cb / &c1_;
        cb -= &b1;
        let cc = (&cb * &cb - delta) / (&ca << 2);
        raw = Ideal::new(ca, cb, cc);
        co2 = c2.abs();
        co1 = c1_.abs();
    }

    // Relative generator of the raw composite:
    //   gamma_p = s * (2*|c2|*a' + |c1|*b' - |c1|*sqrt(D)) / (2a').
    let rel_p = &s * (((&co2 * &raw.a) << 1) + &co1 * &raw.b);
    let rel_q = -(&s * &co1);
    let rel_d: BigInt = &raw.a << 1;
    let gamma_p = QuadNumber::new(rel_p, rel_q, rel_d);

    let psi = raw.reduce_tracked(ord)?;
    let gamma = gamma_p.mul(&psi.invert(delta), delta);
    Ok((raw, gamma))
}

/// NUCOMP: compose two distinct ideals, returning the reduced result and
/// gamma with A*B = (gamma) * C. Small leading coefficients take the plain
/// composition formula; above D^{1/4} a partial extended GCD reduces the
/// composite while it is assembled, exactly as in NUDUPL, with assembly
/// cofactors m1, m2 replacing the single NUDUPL cofactor.
pub fn nucomp(
    x: &Ideal,
    y: &Ideal,
    ord: &QuadraticOrder,
) -> Result<(Ideal, QuadNumber), InfraError> {
    if x == y {
        return nudupl(x, ord);
    }
    // The partial reduction runs against the larger leading coefficient.
    let (x, y) = if x.a < y.a { (y, x) } else { (x, y) };
    let delta = ord.delta();

    let half_sum: BigInt = (&x.b + &y.b) >> 1;
    let half_diff: BigInt = (&x.b - &y.b) >> 1;
    let (d1, _u, v, w) = ext_gcd3(&x.a, &y.a, &half_sum);

    let a1 = &x.a / &d1;
    let a2 = &y.a / &d1;
    let k = (&v * &half_diff - &w * &y.c).mod_floor(&a1);

    let (mut raw, co2, co1);
    if &a1 <= ord.nc_bound() || k.is_zero() {
        // Plain composition formula.
        let t = &a2 * &k;
        let ca = &a1 * &a2;
        let cb = &y.b + (&t << 1);
        let cc = (&d1 * &y.c + &k * (&y.b + &t)) / &a1;
        raw = Ideal::new(ca, cb, cc);
        co2 = BigInt::one();
        co1 = BigInt::zero();
    } else {
        // Partial reduction of (a1, k) keeps the assembled coefficients
        // near D^{1/4}.
        let mut r2 = a1.clone();
        let mut r1 = k.clone();
        let mut c2 = BigInt::zero();
        let mut c1_ = -BigInt::one();
        partial_xgcd(&mut r2, &mut r1, &mut c2, &mut c1_, ord.nc_bound());

        let m1 = (&a2 * &r1 + &half_diff * &c1_) / &a1;
        let m2 = (&half_sum * &r1 - &d1 * &y.c * &c1_) / &a1;
        let mut ca = &m1 * &r1;
        let t = &c1_ * &m2;
        if c1_.is_positive() {
            ca -= t;
        } else {
            ca = t - ca;
        }
        let mut cb: BigInt = (&a2 * &r1 + &c2 * &ca) << 1;
        cb = cb / &c1_;
        cb -= &y.b;
        let cc = (&cb * &cb - delta) / (&ca << 2);
        raw = Ideal::new(ca, cb, cc);
        co2 = c2.abs();
        co1 = c1_.abs();
    }

    // Same generator shape as NUDUPL, scaled by the composition gcd:
    //   gamma_p = d1 * (2*|c2|*a' + |c1|*b' - |c1|*sqrt(D)) / (2a').
    let rel_p = &d1 * (((&co2 * &raw.a) << 1) + &co1 * &raw.b);
    let rel_q = -(&d1 * &co1);
    let rel_d: BigInt = &raw.a << 1;
    let gamma_p = QuadNumber::new(rel_p, rel_q, rel_d);

    let psi = raw.reduce_tracked(ord)?;
    let gamma = gamma_p.mul(&psi.invert(delta), delta);
    Ok((raw, gamma))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ord(delta: i64) -> QuadraticOrder {
        QuadraticOrder::new(BigInt::from(delta), 53).unwrap()
    }

    fn ideal(a: i64, b: i64, c: i64) -> Ideal {
        Ideal::new(BigInt::from(a), BigInt::from(b), BigInt::from(c))
    }

    #[test]
    fn test_normalize_restores_interval() {
        let o = ord(17);
        let mut f = ideal(4, 7, 2);
        f.normalize(&o).unwrap();
        assert_eq!(f, ideal(4, -1, -1));
        assert_eq!(f.discriminant(), BigInt::from(17));
    }

    #[test]
    fn test_normalize_rejects_degenerate() {
        let o = ord(17);
        let mut f = ideal(0, 3, 1);
        assert!(matches!(
            f.normalize(&o),
            Err(InfraError::DegenerateForm { .. })
        ));
    }

    #[test]
    fn test_reduce_idempotent() {
        let o = ord(229);
        let mut f = ideal(3, 1, -19);
        f.reduce(&o).unwrap();
        assert!(f.is_reduced(&o));
        assert_eq!(f, ideal(3, 13, -5));
        let snapshot = f.clone();
        let gamma = f.reduce_tracked(&o).unwrap();
        assert_eq!(f, snapshot, "reducing a reduced form must not move it");
        assert!(gamma.is_one());
    }

    #[test]
    fn test_reduce_preserves_discriminant() {
        let o = ord(316);
        let mut g = ideal(2, 2, -39);
        assert_eq!(g.discriminant(), BigInt::from(316));
        g.reduce(&o).unwrap();
        assert_eq!(g.discriminant(), BigInt::from(316));
        assert!(g.is_reduced(&o));
    }

    #[test]
    fn test_reduce_tracked_generator_is_exact() {
        // Reducing (4, 7, 2) over D = 17 takes one swap with
        // psi = (sqrt(17) + 1)/8 and ends at the identity (1, 3, -2).
        let o = ord(17);
        let mut f = ideal(4, 7, 2);
        let gamma = f.reduce_tracked(&o).unwrap();
        assert_eq!(f, ideal(1, 3, -2));
        let expected = QuadNumber::new(BigInt::from(1), BigInt::from(1), BigInt::from(8));
        assert_eq!(gamma, expected);
    }

    #[test]
    fn test_reduce_exits_with_positive_b() {
        // Conjugating flips b; reduction must land back on a b > 0 form,
        // the only kind `is_reduced` admits.
        let o = ord(40);
        for f in [ideal(2, 4, -3), ideal(3, 2, -3), ideal(3, 4, -2)] {
            let mut g = f.conjugate();
            g.reduce(&o).unwrap();
            assert!(g.b.is_positive(), "reduced {:?} has b <= 0", g);
            assert!(g.is_reduced(&o));
        }
    }

    #[test]
    fn test_advance_recede_round_trip() {
        let o = ord(229);
        let mut f = o.identity_ideal();
        let start = f.clone();
        for _ in 0..5 {
            f.advance(&o).unwrap();
            assert!(f.is_reduced(&o));
        }
        for _ in 0..5 {
            f.recede(&o).unwrap();
        }
        assert_eq!(f, start);
    }

    #[test]
    fn test_advance_walks_known_cycle() {
        // D = 17: (1,3,-2) -> (2,3,-1) -> (2,1,-2) -> (1,3,-2)
        let o = ord(17);
        let mut f = o.identity_ideal();
        assert_eq!(f, ideal(1, 3, -2));
        f.advance(&o).unwrap();
        assert_eq!(f, ideal(2, 3, -1));
        f.advance(&o).unwrap();
        assert_eq!(f, ideal(2, 1, -2));
        f.advance(&o).unwrap();
        assert_eq!(f, ideal(1, 3, -2));
    }

    #[test]
    fn test_nudupl_small_path() {
        // D = 17, squaring (2, 3, -1): the direct path (a <= D^{1/4} = 2)
        // assembles (4, 7, 2) and reduction lands on the identity.
        let o = ord(17);
        let x = ideal(2, 3, -1);
        let (c, gamma) = nudupl(&x, &o).unwrap();
        assert_eq!(c, ideal(1, 3, -2));
        // gamma = (sqrt(17) - 1)/2
        let lg: f64 = gamma.ln(o.delta(), 53);
        assert!((lg - ((17f64.sqrt() - 1.0) / 2.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_nudupl_partial_path() {
        // D = 229, squaring (5, 13, -3) forces the partial-XGCD path
        // (a = 5 > D^{1/4} = 3) and must agree with plain composition.
        let o = ord(229);
        let x = ideal(5, 13, -3);
        assert_eq!(x.discriminant(), BigInt::from(229));
        let (c, gamma) = nudupl(&x, &o).unwrap();
        assert!(c.is_reduced(&o));
        assert_eq!(c.discriminant(), BigInt::from(229));
        // A^2 = (gamma) C: norms must satisfy a^2 = |N(gamma)| * c.a
        let norm = &gamma.p * &gamma.p - &gamma.q * &gamma.q * o.delta();
        let dd = &gamma.d * &gamma.d;
        assert_eq!(
            (&x.a * &x.a) * &dd,
            norm.abs() * &c.a,
            "relative generator norm must connect the ideal norms"
        );
    }

    #[test]
    fn test_nucomp_matches_norm_relation() {
        let o = ord(229);
        let x = ideal(3, 13, -5);
        let y = ideal(5, 13, -3);
        let (c, gamma) = nucomp(&x, &y, &o).unwrap();
        assert!(c.is_reduced(&o));
        let norm = &gamma.p * &gamma.p - &gamma.q * &gamma.q * o.delta();
        let dd = &gamma.d * &gamma.d;
        assert_eq!((&x.a * &y.a) * &dd, norm.abs() * &c.a);
    }

    #[test]
    fn test_nucomp_partial_path() {
        // D = 229, composing (9, 11, -3) with (5, 7, -9): a1 = 9 exceeds
        // D^{1/4} = 3, so the partial-XGCD path runs. One Euclid step gives
        // (r1, c2, c1) = (1, -1, 2), m1 = 1, m2 = 3, and the assembled form
        // (-5, 3, 11) normalizes to (5, 13, -3) with gamma = (2 + sqrt(229))/5.
        let o = ord(229);
        let x = ideal(9, 11, -3);
        let y = ideal(5, 7, -9);
        let (c, gamma) = nucomp(&x, &y, &o).unwrap();
        assert_eq!(c, ideal(5, 13, -3));
        assert_eq!(
            gamma,
            QuadNumber::new(BigInt::from(2), BigInt::from(1), BigInt::from(5))
        );
        // A*B = (gamma) C: a_x * a_y = |N(gamma)| * a_c.
        let norm = &gamma.p * &gamma.p - &gamma.q * &gamma.q * o.delta();
        let dd = &gamma.d * &gamma.d;
        assert_eq!((&x.a * &y.a) * &dd, norm.abs() * &c.a);
    }

    #[test]
    fn test_nucomp_paths_agree_on_class() {
        // The partial path and the plain assembly may land on different
        // reduced forms, but always in the same class: composing with the
        // conjugate of the partial-path result must be principal.
        let o = ord(229);
        let (c, _) = nucomp(&ideal(9, 11, -3), &ideal(5, 7, -9), &o).unwrap();
        let mut expected = ideal(9, 7, -5); // plain Gauss composite, reduced
        expected.reduce(&o).unwrap();
        let mut conj = expected.conjugate();
        conj.reduce(&o).unwrap();
        let (prod, _) = nucomp(&c, &conj, &o).unwrap();
        assert!(prod.is_one(), "paths disagree: {:?} vs {:?}", c, expected);
    }

    #[test]
    fn test_nucomp_with_identity() {
        let o = ord(229);
        let id = o.identity_ideal();
        let x = ideal(3, 13, -5);
        let (c, _gamma) = nucomp(&x, &id, &o).unwrap();
        assert_eq!(c, x, "composing with the principal ideal fixes the class");
    }

    #[test]
    fn test_conjugate_composes_to_principal() {
        let o = ord(229);
        let x = ideal(3, 13, -5);
        let mut conj = x.conjugate();
        conj.reduce(&o).unwrap();
        let (c, _gamma) = nucomp(&x, &conj, &o).unwrap();
        assert!(c.is_one(), "I * conj(I) must be principal, got {:?}", c);
    }
}
