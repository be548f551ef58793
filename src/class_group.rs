//! Class group structure from prime ideals and the regulator.
//!
//! With R known, the L-function estimate E pins the class number h down to
//! the interval [E - F, E + F] / R. Prime ideals of small norm are adjoined
//! one at a time: for each new generator, a baby-step giant-step on the
//! exponent finds the smallest power landing in the subgroup built so far,
//! yielding a relation, and the subgroup order grows until doubling it
//! would leave the interval. The relation matrix's Smith normal form then
//! gives the invariant factors of the group.
//!
//! Classes are compared by a canonical representative, the
//! lexicographically least (a, b) on the cycle of reduced ideals, so
//! equality testing needs no distance bookkeeping at all.

use std::collections::HashMap;

use log::{debug, info};
use serde::Serialize;

use crate::ideal::{nucomp, Ideal};
use crate::lfunction::LFunctionEstimator;
use crate::numeric::ln_big;
use crate::order::QuadraticOrder;
use crate::regulator::{RegulatorResult, SearchParams};
use crate::InfraError;

#[derive(Debug, Clone, Serialize)]
pub struct ClassGroupResult {
    /// Invariant factors d_1 | d_2 | ... of the group, omitting 1s.
    pub invariants: Vec<u64>,
    pub class_number: u64,
    pub regulator: f64,
}

/// The lexicographically least (a, b) among the reduced ideals equivalent
/// to this one. Two ideals lie in the same class iff their representatives
/// coincide.
pub fn canonical_rep(ideal: &Ideal, ord: &QuadraticOrder) -> Result<Ideal, InfraError> {
    let mut cur = ideal.clone();
    cur.reduce(ord)?;
    let start = cur.clone();
    let mut best = cur.clone();
    let mut steps = 0usize;
    loop {
        cur.advance(ord)?;
        if cur == start {
            break;
        }
        if (&cur.a, &cur.b) < (&best.a, &best.b) {
            best = cur.clone();
        }
        steps += 1;
        if steps > 1 << 24 {
            return Err(InfraError::BoundExceeded {
                bound: steps as f64,
            });
        }
    }
    Ok(best)
}

pub fn is_principal(ideal: &Ideal, ord: &QuadraticOrder) -> Result<bool, InfraError> {
    Ok(canonical_rep(ideal, ord)? == canonical_rep(&ord.identity_ideal(), ord)?)
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}

/// P^e by binary exponentiation over NUCOMP.
fn ideal_pow(base: &Ideal, mut e: u64, ord: &QuadraticOrder) -> Result<Ideal, InfraError> {
    let mut acc = ord.identity_ideal();
    let mut sq = base.clone();
    loop {
        if e & 1 == 1 {
            let (next, _) = nucomp(&acc, &sq, ord)?;
            acc = next;
        }
        e >>= 1;
        if e == 0 {
            return Ok(acc);
        }
        let (next, _) = nucomp(&sq, &sq, ord)?;
        sq = next;
    }
}

/// Smallest e >= 1 with P^e in the subgroup, by a baby-step giant-step on
/// the exponent. Baby steps tabulate the representatives of s * P^j over
/// every enumerated class s and j < m = ceil(sqrt(bound)); giant steps
/// stride by P^m. A hit at stride i against offset j certifies P^{im-j}
/// in the subgroup, and keeping the largest j per representative makes the
/// first such e minimal. None means every e <= bound misses the subgroup.
fn subgroup_order(
    pid: &Ideal,
    subgroup: &HashMap<Ideal, (Ideal, Vec<i64>)>,
    bound: u64,
    ord: &QuadraticOrder,
) -> Result<Option<u64>, InfraError> {
    let m = ((bound as f64).sqrt().ceil() as u64).max(1);
    let mut baby: HashMap<Ideal, u64> = HashMap::new();
    for (s, _) in subgroup.values() {
        let mut cur = s.clone();
        for j in 0..m {
            let rep = canonical_rep(&cur, ord)?;
            let offset = baby.entry(rep).or_insert(j);
            if *offset < j {
                *offset = j;
            }
            if j + 1 < m {
                let (next, _) = nucomp(&cur, pid, ord)?;
                cur = next;
            }
        }
    }
    let stride = ideal_pow(pid, m, ord)?;
    let mut giant = stride.clone();
    let mut i = 1u64;
    while (i - 1) * m < bound {
        if let Some(&j) = baby.get(&canonical_rep(&giant, ord)?) {
            return Ok(Some(i * m - j));
        }
        let (next, _) = nucomp(&giant, &stride, ord)?;
        giant = next;
        i += 1;
    }
    Ok(None)
}

/// Compute the class group structure of the order from its regulator.
pub fn compute_class_group(
    ord: &QuadraticOrder,
    reg: &RegulatorResult,
    params: &SearchParams,
) -> Result<ClassGroupResult, InfraError> {
    let r = reg.regulator;
    let est = LFunctionEstimator::new(ord, params.terms);
    let e_val = est.hr_estimate();
    let slack = est.error_bound();
    let accepted =
        |h: u64| (e_val - slack) <= h as f64 * r && 2.0 * h as f64 * r > e_val + slack;
    let expected = reg.h_star.max(1);

    // Subgroup built so far, enumerated as class representative ->
    // (a reduced ideal of the class, exponents on the generators).
    let mut subgroup: HashMap<Ideal, (Ideal, Vec<i64>)> = HashMap::new();
    let identity = ord.identity_ideal();
    subgroup.insert(canonical_rep(&identity, ord)?, (identity.clone(), Vec::new()));
    let mut relations: Vec<Vec<i64>> = Vec::new();
    let mut h_sub = 1u64;

    if accepted(h_sub) {
        info!("class number 1, no primes needed");
        return Ok(finish(relations, h_sub, r));
    }

    let ln_d = ln_big(ord.delta());
    let prime_bound = (6.0 * ln_d * ln_d).max(50.0) as u64;
    let max_order = ((e_val + slack) / r).ceil() as u64 + 1;

    for p in 2..=prime_bound {
        if !is_prime(p) {
            continue;
        }
        let mut pid = match ord.prime_ideal(p) {
            Some(pid) => pid,
            None => continue,
        };
        pid.reduce(ord)?;

        let e = match subgroup_order(&pid, &subgroup, max_order, ord)? {
            Some(e) => e,
            None => {
                return Err(InfraError::ClassGroupIncomplete {
                    found: h_sub,
                    expected,
                })
            }
        };
        let power = ideal_pow(&pid, e, ord)?;
        let in_subgroup = match subgroup.get(&canonical_rep(&power, ord)?) {
            Some((_, v)) => v.clone(),
            None => {
                return Err(InfraError::ClassGroupIncomplete {
                    found: h_sub,
                    expected,
                })
            }
        };
        debug!("prime {} has order {} in the quotient", p, e);

        let mut row: Vec<i64> = in_subgroup.iter().map(|x| -x).collect();
        row.push(e as i64);
        for earlier in relations.iter_mut() {
            earlier.push(0);
        }
        relations.push(row);

        if e > 1 {
            // Re-enumerate: every old class times each power of the new
            // generator.
            let base: Vec<(Ideal, Vec<i64>)> = subgroup.values().cloned().collect();
            let mut next_map = HashMap::new();
            let mut pj = identity.clone();
            for j in 0..e {
                for (ideal, v) in &base {
                    let (product, _) = nucomp(ideal, &pj, ord)?;
                    let mut ev = v.clone();
                    ev.push(j as i64);
                    next_map.insert(canonical_rep(&product, ord)?, (product, ev));
                }
                let (next_pj, _) = nucomp(&pj, &pid, ord)?;
                pj = next_pj;
            }
            subgroup = next_map;
            h_sub *= e;
        } else {
            for (_, v) in subgroup.values_mut() {
                v.push(0);
            }
        }

        if accepted(h_sub) {
            info!("class number {} confirmed after prime {}", h_sub, p);
            return Ok(finish(relations, h_sub, r));
        }
    }

    Err(InfraError::ClassGroupIncomplete {
        found: h_sub,
        expected,
    })
}

fn finish(relations: Vec<Vec<i64>>, class_number: u64, regulator: f64) -> ClassGroupResult {
    let invariants = smith_invariants(relations);
    ClassGroupResult {
        invariants,
        class_number,
        regulator,
    }
}

/// Invariant factors of the integer matrix: the diagonal of its Smith
/// normal form with unit entries dropped.
pub fn smith_invariants(mut m: Vec<Vec<i64>>) -> Vec<u64> {
    let rows = m.len();
    let cols = if rows == 0 { 0 } else { m[0].len() };
    let mut t = 0usize;
    'outer: while t < rows.min(cols) {
        // Pivot on the smallest nonzero entry of the remaining block.
        let mut pivot: Option<(usize, usize)> = None;
        for i in t..rows {
            for j in t..cols {
                if m[i][j] != 0
                    && pivot.map_or(true, |(pi, pj)| m[i][j].abs() < m[pi][pj].abs())
                {
                    pivot = Some((i, j));
                }
            }
        }
        let (pi, pj) = match pivot {
            Some(p) => p,
            None => break,
        };
        m.swap(t, pi);
        for row in m.iter_mut() {
            row.swap(t, pj);
        }

        let mut dirty = false;
        for i in t + 1..rows {
            let q = m[i][t].div_euclid(m[t][t]);
            if q != 0 {
                for j in t..cols {
                    m[i][j] -= q * m[t][j];
                }
            }
            if m[i][t] != 0 {
                dirty = true;
            }
        }
        for j in t + 1..cols {
            let q = m[t][j].div_euclid(m[t][t]);
            if q != 0 {
                for i in t..rows {
                    m[i][j] -= q * m[i][t];
                }
            }
            if m[t][j] != 0 {
                dirty = true;
            }
        }
        if dirty {
            continue;
        }
        // Divisibility: the pivot must divide every remaining entry.
        for i in t + 1..rows {
            for j in t + 1..cols {
                if m[i][j] % m[t][t] != 0 {
                    for jj in t..cols {
                        m[t][jj] += m[i][jj];
                    }
                    continue 'outer;
                }
            }
        }
        t += 1;
    }
    (0..t)
        .map(|i| m[i][i].unsigned_abs())
        .filter(|&d| d > 1)
        .collect()
}
