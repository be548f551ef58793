//! Regulator computation by Lenstra's estimate-guided baby-step giant-step.
//!
//! The truncated L-function gives h*R = E with |h*R - E| <= 2K, so the
//! search only sweeps an interval of width 4K around E instead of [0, h*R].
//! A table of baby steps near the identity is probed from two giant walkers
//! started at distance E and -E; a hit pins down an exact multiple S of R,
//! and a second, much smaller search extracts R itself from S. Everything
//! is exact: matches compare ideal coefficients and every distance is the
//! logarithm of an explicitly tracked generator, so the reported R is the
//! true regulator to working precision, not an estimate.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::infrastructure::{closes_at, InfElement};
use crate::lfunction::LFunctionEstimator;
use crate::order::QuadraticOrder;
use crate::table::{estimate_entry_size, BabyStepTable};
use crate::InfraError;

/// Tuning knobs for the search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Total memory budget for baby-step tables, in bytes.
    pub max_memory: usize,
    /// Worker threads for table building and probing.
    pub workers: usize,
    /// Bits of working precision for distances.
    pub precision: u32,
    /// Terms of the L-function series; more terms shrink the search window.
    pub terms: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            max_memory: 64 << 20,
            workers: 1,
            precision: 53,
            terms: 50_000,
        }
    }
}

/// Which phase of the search produced the regulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchCase {
    /// The window was small enough for a plain baby-step giant-step.
    InitialBsgs,
    /// The ideal nearest the estimate E was already principal.
    EstimateClosed,
    /// The identity reappeared while the baby-step table was being built.
    BabyStepList,
    /// The forward walker hit the table.
    FoundC,
    /// The conjugate of the forward walker hit the table.
    FoundCInverse,
    /// The backward walker hit the table.
    FoundD,
    /// The conjugate of the backward walker hit the table.
    FoundDInverse,
    /// R was extracted from S by the follow-up baby-step giant-step.
    SecondBsgs,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegulatorResult {
    pub regulator: f64,
    /// Estimated class number h* = round(S/R), at least 1.
    pub h_star: u64,
    pub case: SearchCase,
    pub table_entries: usize,
    pub giant_steps: u64,
}

#[derive(Default)]
struct Stats {
    table_entries: usize,
    giant_steps: u64,
}

/// Compute the regulator of the order, retrying with a tighter estimate or
/// a leaner table when a pass exhausts its bound or its memory share.
pub fn compute_regulator(
    ord: &QuadraticOrder,
    params: &SearchParams,
) -> Result<RegulatorResult, InfraError> {
    let mut terms = params.terms;
    let mut l_boost = 1u64;
    let mut last_err = None;
    for attempt in 0..3 {
        match lenstra_search(ord, params, terms, l_boost) {
            Ok(result) => return Ok(result),
            Err(e @ InfraError::BoundExceeded { .. }) => {
                info!("attempt {} exhausted its bound, doubling terms: {}", attempt, e);
                terms *= 2;
                last_err = Some(e);
            }
            Err(e @ (InfraError::TableFull { .. } | InfraError::MemoryBudgetExceeded { .. })) => {
                info!("attempt {} ran out of table, doubling stride: {}", attempt, e);
                l_boost *= 2;
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(InfraError::BoundExceeded { bound: 0.0 }))
}

fn lenstra_search(
    ord: &QuadraticOrder,
    params: &SearchParams,
    terms: u64,
    l_boost: u64,
) -> Result<RegulatorResult, InfraError> {
    let workers = params.workers.max(1);
    let est = LFunctionEstimator::new(ord, terms);
    let e_val = est.hr_estimate();
    let k = est.error_bound() / 2.0;
    info!(
        "hR estimate {:.4}, half-width 2K = {:.4} ({} terms)",
        e_val,
        2.0 * k,
        est.terms_used()
    );

    // Table geometry. mu is the empirical cost ratio of a giant step to a
    // baby step; N baby entries spaced l apart balance the two phases.
    let bits = ord.delta().bits();
    let mu = 6.85 + 10.62 * bits as f64 / 135.0;
    let mut entry = estimate_entry_size(bits, false);
    let max_n = 1 + (params.max_memory / (workers * entry)) as u64;
    let mut n = (k * mu / workers as f64).sqrt().floor() as u64;
    let mut l = 1u64;
    if n > max_n {
        entry = entry * 3 / 2;
        n = 1 + (params.max_memory / (workers * entry)) as u64;
        l = (((k * mu / (2.0 * workers as f64)).sqrt() / n as f64).floor() as u64).max(1);
    }
    l = (l * l_boost).max(1);
    let b = (n * l) as f64;
    debug!("table to distance {}, every {}th step, {} workers", b, l, workers);

    let mut stats = Stats::default();

    if b < 1.0 {
        // Window too narrow to pay for a table: sweep [0, E + 2K] directly.
        let bound = e_val + 2.0 * k + 2.0;
        let r = shanks_bsgs(ord, bound, params, &mut stats)?
            .ok_or(InfraError::BoundExceeded { bound })?;
        return Ok(finish(r, e_val / r, SearchCase::InitialBsgs, stats));
    }

    // The walker nearest the estimate; principal already means E itself is
    // (up to adjustment) a multiple of R.
    let mut aa: InfElement<f64> = InfElement::near(ord, e_val)?;
    aa.adjust(e_val)?;
    if aa.is_one() && aa.distance() > 0.5 {
        let s = aa.distance();
        return resolve(ord, s, SearchCase::EstimateClosed, params, stats);
    }

    let table = match build_table(ord, b, l, params, workers)? {
        TableBuild::Done(table) => table,
        TableBuild::Closed(r) => {
            return Ok(finish(r, e_val / r, SearchCase::BabyStepList, stats));
        }
    };
    stats.table_entries = table.len();

    // Giant stride: just under the table's reach, doubled so the forward
    // and backward windows tile the interval with overlap.
    let s_g = (b - 3.0).max(b / 2.0);
    let mut g: InfElement<f64> = InfElement::near(ord, s_g)?;
    g.square()?;
    g.adjust(2.0 * s_g)?;
    if g.is_one() {
        g.baby_step()?;
    }
    let u = g.distance();
    let mut gg = g.conjugate()?;
    gg.adjust(-u)?;

    let mut c = aa.clone();
    let mut d = aa.conjugate()?;
    let mut sc = c.distance();
    let mut sd = d.distance();
    let m = l + 1;
    let max_strides = ((2.0 * k + b) / u).ceil() as u64 + 64;

    for _ in 0..max_strides {
        let hit = if workers > 1 {
            let (up, down) = rayon::join(
                || probe_pair(&table, &c, m),
                || probe_pair(&table, &d, m),
            );
            match (up?, down?) {
                (Some((s, conj)), _) => Some(if conj {
                    (s, SearchCase::FoundCInverse)
                } else {
                    (s, SearchCase::FoundC)
                }),
                (_, Some((s, conj))) => Some(if conj {
                    (s, SearchCase::FoundDInverse)
                } else {
                    (s, SearchCase::FoundD)
                }),
                _ => None,
            }
        } else {
            match probe_pair(&table, &c, m)? {
                Some((s, conj)) => Some(if conj {
                    (s, SearchCase::FoundCInverse)
                } else {
                    (s, SearchCase::FoundC)
                }),
                None => probe_pair(&table, &d, m)?.map(|(s, conj)| {
                    if conj {
                        (s, SearchCase::FoundDInverse)
                    } else {
                        (s, SearchCase::FoundD)
                    }
                }),
            }
        };

        if let Some((s_raw, case)) = hit {
            let s = s_raw.abs();
            // A hit with |S| < 1 is the walker meeting its own table entry,
            // not a wrap of the cycle.
            if s >= 1.0 {
                debug!("matched multiple S = {:.4} ({:?})", s, case);
                return resolve(ord, s, case, params, stats);
            }
        }

        sc += u;
        c.giant_step(&g)?;
        c.adjust(sc)?;
        sd -= u;
        d.giant_step(&gg)?;
        d.adjust(sd)?;
        stats.giant_steps += 2;
    }

    Err(InfraError::BoundExceeded {
        bound: e_val + 2.0 * k,
    })
}

/// Probe one walker and its conjugate against the table over a window of
/// `m` consecutive baby steps. A hit returns the exact distance difference
/// and whether it came from the conjugate.
fn probe_pair(
    table: &BabyStepTable,
    x: &InfElement<'_, f64>,
    m: u64,
) -> Result<Option<(f64, bool)>, InfraError> {
    if let Some(s) = probe_window(table, x, m)? {
        return Ok(Some((s, false)));
    }
    let conj = x.conjugate()?;
    Ok(probe_window(table, &conj, m)?.map(|s| (s, true)))
}

fn probe_window(
    table: &BabyStepTable,
    x: &InfElement<'_, f64>,
    m: u64,
) -> Result<Option<f64>, InfraError> {
    let mut probe = x.clone();
    for _ in 0..m {
        if let Some(entry) = table.search(probe.ideal()) {
            return Ok(Some(probe.distance() - entry.distance));
        }
        probe.baby_step()?;
    }
    Ok(None)
}

enum TableBuild {
    Done(BabyStepTable),
    /// The identity came back at this distance, which is therefore R.
    Closed(f64),
}

fn build_table(
    ord: &QuadraticOrder,
    b: f64,
    l: u64,
    params: &SearchParams,
    workers: usize,
) -> Result<TableBuild, InfraError> {
    let entry = estimate_entry_size(ord.delta().bits(), false);
    if workers <= 1 {
        let mut table = BabyStepTable::with_budget(params.max_memory, 1, entry)?;
        let walk: InfElement<f64> = InfElement::one(ord);
        return build_slice(ord, walk, b, l, 0, &mut table).map(|closed| match closed {
            Some(r) => TableBuild::Closed(r),
            None => TableBuild::Done(table),
        });
    }

    use rayon::prelude::*;
    let width = b / workers as f64;
    let pieces: Vec<(BabyStepTable, Option<f64>)> = (0..workers)
        .into_par_iter()
        .map(|w| -> Result<(BabyStepTable, Option<f64>), InfraError> {
            let mut table = BabyStepTable::with_budget(params.max_memory, workers, entry)?;
            let start = w as f64 * width;
            let anchor: InfElement<f64> = InfElement::near(ord, start)?;
            let closed = build_slice(ord, anchor, start + width, l, w as u32, &mut table)?;
            Ok((table, closed))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut merged = BabyStepTable::with_capacity(0);
    let mut closed = None;
    for (piece, hit) in pieces {
        if let Some(r) = hit {
            closed = Some(closed.map_or(r, |c: f64| c.min(r)));
        }
        merged.merge(piece);
    }
    match closed {
        Some(r) => Ok(TableBuild::Closed(r)),
        None => Ok(TableBuild::Done(merged)),
    }
}

/// Walk baby steps up to `end`, inserting the anchor and then every l-th
/// step plus `l` overlap steps past the end so probe windows never straddle
/// a gap between slices.
fn build_slice(
    ord: &QuadraticOrder,
    mut walk: InfElement<'_, f64>,
    end: f64,
    l: u64,
    window: u32,
    table: &mut BabyStepTable,
) -> Result<Option<f64>, InfraError> {
    let mut index = 0u64;
    loop {
        if index % l == 0 {
            table.insert(walk.ideal(), walk.distance(), index, window)?;
        }
        if walk.distance() > end {
            break;
        }
        walk.baby_step()?;
        index += 1;
        if walk.is_one() && walk.distance() > 0.5 {
            return Ok(Some(walk.distance()));
        }
    }
    for _ in 0..l {
        walk.baby_step()?;
        index += 1;
        if index % l == 0 {
            table.insert(walk.ideal(), walk.distance(), index, window)?;
        }
    }
    Ok(None)
}

/// Extract R from an exact multiple S: try a plain search up to S^(2/3),
/// and failing that test each candidate divisor from the largest down.
fn resolve(
    ord: &QuadraticOrder,
    s: f64,
    case: SearchCase,
    params: &SearchParams,
    mut stats: Stats,
) -> Result<RegulatorResult, InfraError> {
    let b2 = s.powf(2.0 / 3.0).ceil().max(8.0);
    if let Some(r) = shanks_bsgs(ord, b2, params, &mut stats)? {
        return Ok(finish(r, s / r, SearchCase::SecondBsgs, stats));
    }
    let p_max = 1 + (s / b2).ceil() as u64;
    for h in (1..=p_max).rev() {
        let candidate = s / h as f64;
        if candidate < 0.5 {
            continue;
        }
        let mut probe: InfElement<f64> = InfElement::near(ord, candidate)?;
        probe.adjust(candidate)?;
        if let Some(r) = closes_at(&probe, candidate, 0.5)? {
            return Ok(finish(r, s / r, case, stats));
        }
    }
    Err(InfraError::BoundExceeded { bound: s })
}

fn finish(regulator: f64, multiple: f64, case: SearchCase, stats: Stats) -> RegulatorResult {
    info!("regulator {:.6} via {:?}", regulator, case);
    RegulatorResult {
        regulator,
        h_star: (multiple.round() as u64).max(1),
        case,
        table_entries: stats.table_entries,
        giant_steps: stats.giant_steps,
    }
}

/// Plain Shanks search: store all baby steps to sqrt(bound), stride by the
/// last of them. The first giant match with a positive distance difference
/// is exactly R; returns None when R exceeds the bound.
fn shanks_bsgs(
    ord: &QuadraticOrder,
    bound: f64,
    params: &SearchParams,
    stats: &mut Stats,
) -> Result<Option<f64>, InfraError> {
    let m = bound.sqrt() + 1.0;
    let entry = estimate_entry_size(ord.delta().bits(), false);
    let mut table = BabyStepTable::with_budget(params.max_memory, 1, entry)?;

    let mut walk: InfElement<f64> = InfElement::one(ord);
    let mut index = 0u64;
    let mut stride = walk.clone();
    while walk.distance() <= m {
        table.insert(walk.ideal(), walk.distance(), index, 0)?;
        stride = walk.clone();
        walk.baby_step()?;
        index += 1;
        if walk.is_one() && walk.distance() > 0.5 {
            stats.table_entries = stats.table_entries.max(table.len());
            return Ok(Some(walk.distance()));
        }
    }
    stats.table_entries = stats.table_entries.max(table.len());
    if stride.distance() <= 0.0 {
        // Bound below the first baby step; nothing to stride with.
        return Ok(None);
    }

    let mut c = stride.clone();
    while c.distance() <= bound + m {
        if let Some(hit) = table.search(c.ideal()) {
            let diff = c.distance() - hit.distance;
            if diff > 0.25 {
                return Ok(Some(diff));
            }
        }
        c.giant_step(&stride)?;
        stats.giant_steps += 1;
    }
    Ok(None)
}
