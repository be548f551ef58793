//! Distance arithmetic for the infrastructure.
//!
//! Distances are real numbers known only approximately; ideals and relative
//! generators are exact. The `Real` trait is the capability the rest of the
//! crate asks of its distance representation: field operations, comparisons,
//! and logarithms of quadratic irrationals evaluated without catastrophic
//! cancellation. The supplied backend is `f64` (53 bits); the precision
//! parameter is threaded through so a multiprecision backend can honor it.
//!
//! `QuadNumber` is an exact element (p + q*sqrt(D))/d of the field, used as
//! the relative generator gamma with A*B = (gamma)*C in composition.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::ops::{Add, Neg, Sub};

/// Approximate real arithmetic for infrastructure distances.
pub trait Real:
    Clone
    + PartialOrd
    + std::fmt::Debug
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    fn zero(prec: u32) -> Self;
    fn from_f64(x: f64, prec: u32) -> Self;
    fn to_f64(&self) -> f64;
    fn abs(&self) -> Self;

    /// Natural log of |n| for an exact integer.
    fn ln_int(n: &BigInt, prec: u32) -> Self;

    /// Natural log of |(p + q*sqrt(delta))/d|, computed so that the near
    /// cancellation of p against q*sqrt(delta) does not destroy accuracy.
    fn ln_quad(p: &BigInt, q: &BigInt, d: &BigInt, delta: &BigInt, prec: u32) -> Self;
}

impl Real for f64 {
    fn zero(_prec: u32) -> f64 {
        0.0
    }

    fn from_f64(x: f64, _prec: u32) -> f64 {
        x
    }

    fn to_f64(&self) -> f64 {
        *self
    }

    fn abs(&self) -> f64 {
        f64::abs(*self)
    }

    fn ln_int(n: &BigInt, _prec: u32) -> f64 {
        ln_big(n)
    }

    fn ln_quad(p: &BigInt, q: &BigInt, d: &BigInt, delta: &BigInt, _prec: u32) -> f64 {
        ln_quad_f64(p, q, d, delta)
    }
}

/// Natural log of |n|, valid beyond the f64 exponent range: take the top
/// 53 bits as a mantissa and account for the shift.
pub fn ln_big(n: &BigInt) -> f64 {
    if n.is_zero() {
        return f64::NEG_INFINITY;
    }
    let bits = n.bits();
    if bits <= 53 {
        return n.abs().to_f64().unwrap_or(1.0).ln();
    }
    let shift = bits - 53;
    let top = (n.abs() >> shift).to_f64().unwrap_or(1.0);
    top.ln() + shift as f64 * std::f64::consts::LN_2
}

/// log(e^x + e^y) for finite x, y (log-domain addition of two positives).
fn ln_sum(x: f64, y: f64) -> f64 {
    if x == f64::NEG_INFINITY {
        return y;
    }
    if y == f64::NEG_INFINITY {
        return x;
    }
    let (hi, lo) = if x >= y { (x, y) } else { (y, x) };
    hi + (1.0 + (lo - hi).exp()).ln()
}

/// ln |p + q*sqrt(delta)| when p and q*sqrt(delta) have the same sign, so
/// the sum has no cancellation and can be formed in the log domain.
fn ln_no_cancel(p: &BigInt, q: &BigInt, delta: &BigInt) -> f64 {
    ln_sum(ln_big(p), ln_big(q) + 0.5 * ln_big(delta))
}

fn ln_quad_f64(p: &BigInt, q: &BigInt, d: &BigInt, delta: &BigInt) -> f64 {
    let base = if q.is_zero() {
        ln_big(p)
    } else if p.is_zero() {
        ln_big(q) + 0.5 * ln_big(delta)
    } else if p.sign() == q.sign() {
        ln_no_cancel(p, q, delta)
    } else {
        // p and q*sqrt(delta) nearly cancel; divide the exact norm by the
        // conjugate, whose terms have equal signs.
        let norm = p * p - q * q * delta;
        ln_big(&norm) - ln_no_cancel(p, &-q, delta)
    };
    base - ln_big(d)
}

/// An exact quadratic number (p + q*sqrt(delta)) / d.
///
/// The denominator is kept positive and the triple is divided by its gcd, so
/// products of many reduction-step generators stay small.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuadNumber {
    pub p: BigInt,
    pub q: BigInt,
    pub d: BigInt,
}

impl QuadNumber {
    pub fn new(p: BigInt, q: BigInt, d: BigInt) -> Self {
        let mut x = QuadNumber { p, q, d };
        x.canonicalize();
        x
    }

    pub fn one() -> Self {
        QuadNumber {
            p: BigInt::from(1),
            q: BigInt::zero(),
            d: BigInt::from(1),
        }
    }

    pub fn is_one(&self) -> bool {
        self.q.is_zero() && self.p == self.d
    }

    fn canonicalize(&mut self) {
        if self.d.is_negative() {
            self.p = -&self.p;
            self.q = -&self.q;
            self.d = -&self.d;
        }
        let g = self.p.gcd(&self.q).gcd(&self.d);
        if !g.is_zero() && !g.is_one() {
            self.p = &self.p / &g;
            self.q = &self.q / &g;
            self.d = &self.d / &g;
        }
    }

    /// Product of two quadratic numbers over the same discriminant.
    pub fn mul(&self, rhs: &QuadNumber, delta: &BigInt) -> QuadNumber {
        let p = &self.p * &rhs.p + &self.q * &rhs.q * delta;
        let q = &self.p * &rhs.q + &self.q * &rhs.p;
        let d = &self.d * &rhs.d;
        QuadNumber::new(p, q, d)
    }

    /// Multiplicative inverse: d*(p - q*sqrt(delta)) / (p^2 - q^2*delta).
    pub fn invert(&self, delta: &BigInt) -> QuadNumber {
        let norm = &self.p * &self.p - &self.q * &self.q * delta;
        QuadNumber::new(&self.d * &self.p, -(&self.d * &self.q), norm)
    }

    /// ln of the absolute value, in the requested distance representation.
    pub fn ln<R: Real>(&self, delta: &BigInt, prec: u32) -> R {
        R::ln_quad(&self.p, &self.q, &self.d, delta, prec)
    }
}
