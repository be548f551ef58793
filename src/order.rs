//! Real quadratic orders.
//!
//! A `QuadraticOrder` carries the discriminant D, the integer square root
//! floor(sqrt(D)) used by normalization and reduction, and the NUCOMP
//! partial-reduction bound floor(D^{1/4}).

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::ideal::Ideal;
use crate::InfraError;

/// A real quadratic order of discriminant D > 0.
#[derive(Debug, Clone)]
pub struct QuadraticOrder {
    delta: BigInt,
    root_delta: BigInt,
    nc_bound: BigInt,
    precision: u32,
}

impl QuadraticOrder {
    /// Validate the discriminant and precompute the reduction bounds.
    ///
    /// Requires D > 0, D ≡ 0 or 1 (mod 4), and D not a perfect square.
    pub fn new(delta: BigInt, precision: u32) -> Result<Self, InfraError> {
        if !delta.is_positive() {
            return Err(InfraError::NotRealDiscriminant(delta));
        }
        let residue = delta.mod_floor(&BigInt::from(4));
        if !residue.is_zero() && !residue.is_one() {
            return Err(InfraError::NotRealDiscriminant(delta));
        }
        let root_delta = isqrt(&delta);
        if &root_delta * &root_delta == delta {
            return Err(InfraError::NotRealDiscriminant(delta));
        }
        let nc_bound = isqrt(&root_delta);
        Ok(QuadraticOrder {
            delta,
            root_delta,
            nc_bound,
            precision,
        })
    }

    pub fn delta(&self) -> &BigInt {
        &self.delta
    }

    /// floor(sqrt(D)).
    pub fn root_delta(&self) -> &BigInt {
        &self.root_delta
    }

    /// floor(D^{1/4}), the NUCOMP partial-reduction bound.
    pub fn nc_bound(&self) -> &BigInt {
        &self.nc_bound
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// The reduced principal ideal (1, b0, c0) with b0 the largest integer
    /// of the parity of D not exceeding floor(sqrt(D)).
    pub fn identity_ideal(&self) -> Ideal {
        let parity = self.delta.mod_floor(&BigInt::from(2));
        let b = if self.root_delta.mod_floor(&BigInt::from(2)) == parity {
            self.root_delta.clone()
        } else {
            &self.root_delta - BigInt::one()
        };
        let c = (&b * &b - &self.delta) / BigInt::from(4);
        Ideal::new(BigInt::one(), b, c)
    }

    /// The Kronecker symbol (D | n).
    pub fn kronecker(&self, n: u64) -> i32 {
        kronecker(&self.delta, n)
    }

    /// The prime ideal above p: a form (p, b, c) with b^2 ≡ D (mod 4p).
    /// Returns `None` when p is inert.
    pub fn prime_ideal(&self, p: u64) -> Option<Ideal> {
        if p == 2 {
            for b in 0u64..4 {
                let bb = BigInt::from(b);
                if bb.mod_floor(&BigInt::from(2)) != self.delta.mod_floor(&BigInt::from(2)) {
                    continue;
                }
                let num = &bb * &bb - &self.delta;
                if num.mod_floor(&BigInt::from(8)).is_zero() {
                    let c = num / BigInt::from(8);
                    return Some(Ideal::new(BigInt::from(2), bb, c));
                }
            }
            return None;
        }
        if self.kronecker(p) == -1 {
            return None;
        }
        let dm = self.delta.mod_floor(&BigInt::from(p)).to_u64()?;
        let r = sqrt_mod_prime(dm, p)?;
        let four_p = BigInt::from(4 * p as u128);
        for cand in [r, p - r, r + p, 2 * p - r] {
            let b = BigInt::from(cand);
            if b.mod_floor(&BigInt::from(2)) != self.delta.mod_floor(&BigInt::from(2)) {
                continue;
            }
            let num = &b * &b - &self.delta;
            if num.mod_floor(&four_p).is_zero() {
                let c = num / &four_p;
                return Some(Ideal::new(BigInt::from(p), b, c));
            }
        }
        None
    }
}

/// Integer square root by Newton iteration; n must be non-negative.
pub fn isqrt(n: &BigInt) -> BigInt {
    if n.is_zero() || n.is_one() {
        return n.clone();
    }
    let mut x: BigInt = BigInt::one() << (n.bits() / 2 + 1);
    loop {
        let y = (&x + n / &x) >> 1;
        if y >= x {
            return x;
        }
        x = y;
    }
}

/// Kronecker symbol (a | n) for n >= 1.
pub fn kronecker(a: &BigInt, n: u64) -> i32 {
    if n == 0 {
        return if a.abs().is_one() { 1 } else { 0 };
    }
    let mut k = 1i32;
    let mut n = n;
    let a_mod8 = a
        .mod_floor(&BigInt::from(8))
        .to_u64()
        .unwrap_or(0);
    while n % 2 == 0 {
        n /= 2;
        if a_mod8 % 2 == 0 {
            return 0;
        }
        if a_mod8 == 3 || a_mod8 == 5 {
            k = -k;
        }
    }
    if n == 1 {
        return k;
    }
    // Jacobi symbol on the odd part.
    let mut x = a.mod_floor(&BigInt::from(n)).to_u64().unwrap_or(0);
    let mut y = n;
    while x != 0 {
        while x % 2 == 0 {
            x /= 2;
            let r = y % 8;
            if r == 3 || r == 5 {
                k = -k;
            }
        }
        std::mem::swap(&mut x, &mut y);
        if x % 4 == 3 && y % 4 == 3 {
            k = -k;
        }
        x %= y;
    }
    if y == 1 {
        k
    } else {
        0
    }
}

fn pow_mod(mut base: u128, mut exp: u64, modulus: u128) -> u128 {
    let mut acc = 1u128;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc * base % modulus;
        }
        base = base * base % modulus;
        exp >>= 1;
    }
    acc
}

/// Square root of a modulo an odd prime p (Tonelli-Shanks), or `None` when
/// a is a non-residue.
fn sqrt_mod_prime(a: u64, p: u64) -> Option<u64> {
    let a = (a as u128) % p as u128;
    if a == 0 {
        return Some(0);
    }
    let pm = p as u128;
    if pow_mod(a, (p - 1) / 2, pm) != 1 {
        return None;
    }
    if p % 4 == 3 {
        return Some(pow_mod(a, (p + 1) / 4, pm) as u64);
    }
    // p ≡ 1 mod 4: full Tonelli-Shanks.
    let mut q = p - 1;
    let mut s = 0u32;
    while q % 2 == 0 {
        q /= 2;
        s += 1;
    }
    let mut z = 2u64;
    while pow_mod(z as u128, (p - 1) / 2, pm) == 1 {
        z += 1;
    }
    let mut m = s;
    let mut c = pow_mod(z as u128, q, pm);
    let mut t = pow_mod(a, q, pm);
    let mut r = pow_mod(a, (q + 1) / 2, pm);
    while t != 1 {
        let mut i = 0u32;
        let mut tt = t;
        while tt != 1 {
            tt = tt * tt % pm;
            i += 1;
            if i == m {
                return None;
            }
        }
        let b = pow_mod(c, 1 << (m - i - 1) as u64, pm);
        m = i;
        c = b * b % pm;
        t = t * c % pm;
        r = r * b % pm;
    }
    Some(r as u64)
}
