//! Run packing and categorical split search.
//!
//! In a staged group of a factor predictor, tuples with the same rank (= the
//! same factor level) sit adjacently, forming *runs*. The categorical search
//! operates on runs rather than tuples: regression and binary classification
//! order runs by mean response and scan the ordering like a numeric split;
//! wider classification enumerates level subsets exhaustively up to the
//! configured run-width cap, and past it falls back to an ordered scan by
//! the share of the node's majority category.
//!
//! The winning candidate keeps its run bounds and chosen left-hand slots so
//! the coordinator can replay per run and set the factor bits of the split.

use super::splitsig::{finite_or_lost, NodeStats, SplitParams};
use super::stage::SampleNode;

/// One run: all tuples of a single factor level within a node's group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Run {
    /// Factor level.
    pub rank: u32,
    /// Offset of the run within the node's group.
    pub start: u32,
    pub extent: u32,
    pub s_count: u32,
    pub sum: f64,
}

/// A winning categorical candidate: its runs and the slots routed left.
#[derive(Debug, Clone)]
pub(crate) struct RunInfo {
    pub runs: Vec<Run>,
    /// Indices into `runs` whose levels go to the left-hand side.
    pub lh_slots: Vec<u32>,
}

/// Level-wide table of winning categorical candidates; `set_idx` in a split
/// signature indexes into it.
#[derive(Debug, Default)]
pub(crate) struct RunTable {
    sets: Vec<RunInfo>,
}

impl RunTable {
    pub fn clear(&mut self) {
        self.sets.clear();
    }

    pub fn push(&mut self, info: RunInfo) -> u32 {
        self.sets.push(info);
        (self.sets.len() - 1) as u32
    }

    pub fn get(&self, set_idx: u32) -> &RunInfo {
        &self.sets[set_idx as usize]
    }
}

/// Pack a group into runs, with per-run category masses when classifying.
///
/// Returns the runs plus a flat `runs x ctg_width` mass matrix (empty for
/// regression).
fn pack_runs(chunk: &[SampleNode], ctg_width: usize) -> (Vec<Run>, Vec<f64>) {
    let mut runs: Vec<Run> = Vec::new();
    let mut ctg_mass: Vec<f64> = Vec::new();
    for (i, node) in chunk.iter().enumerate() {
        let fresh = match runs.last() {
            Some(run) => run.rank != node.rank,
            None => true,
        };
        if fresh {
            runs.push(Run {
                rank: node.rank,
                start: i as u32,
                extent: 0,
                s_count: 0,
                sum: 0.0,
            });
            ctg_mass.extend(std::iter::repeat(0.0).take(ctg_width));
        }
        let run = runs.last_mut().expect("run just pushed");
        run.extent += 1;
        run.s_count += node.s_count;
        run.sum += node.y_sum;
        if ctg_width > 0 {
            let base = (runs.len() - 1) * ctg_width;
            ctg_mass[base + node.ctg as usize] += node.y_sum;
        }
    }
    (runs, ctg_mass)
}

/// Search a factor predictor's staged group for the best level subset.
///
/// Returns `(lh_idx_count, lh_s_count, info, run_info)` or `None` when the
/// group holds fewer than two runs or no admissible subset exists.
pub(crate) fn categorical_split(
    chunk: &[SampleNode],
    stats: &NodeStats,
    params: &SplitParams<'_>,
) -> Option<(usize, u32, f64, RunInfo)> {
    let k = params.ctg_width;
    let (runs, ctg_mass) = pack_runs(chunk, k);
    if runs.len() < 2 {
        return None;
    }

    // The mask fits a u32; wider sets always take the ordered scan.
    if k > 2 && runs.len() <= params.max_run_width && runs.len() < 32 {
        subset_split(&runs, &ctg_mass, stats, params)
    } else {
        ordered_split(&runs, &ctg_mass, stats, params)
    }
}

/// Ordered scan over runs sorted by mean response (regression), category-1
/// share (binary), or majority-category share (wide multiclass fallback).
fn ordered_split(
    runs: &[Run],
    ctg_mass: &[f64],
    stats: &NodeStats,
    params: &SplitParams<'_>,
) -> Option<(usize, u32, f64, RunInfo)> {
    let k = params.ctg_width;
    let extent: u32 = runs.iter().map(|r| r.extent).sum();

    let key = |slot: usize| -> f64 {
        let run = &runs[slot];
        match k {
            0 => run.sum / f64::from(run.s_count),
            2 => ctg_mass[slot * 2 + 1] / run.sum,
            _ => {
                let major = stats
                    .ctg_sum
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).expect("finite mass"))
                    .map(|(c, _)| c)
                    .expect("classification has categories");
                ctg_mass[slot * k + major] / run.sum
            }
        }
    };

    let mut order: Vec<u32> = (0..runs.len() as u32).collect();
    order.sort_by(|&a, &b| {
        key(a as usize)
            .partial_cmp(&key(b as usize))
            .expect("finite run keys")
    });

    let mut sum_l = 0.0;
    let mut sc_l = 0u32;
    let mut idx_l = 0u32;
    let mut sum_lc = vec![0.0; k];
    let mut sum_rc = stats.ctg_sum.clone();
    let mut ss_l = 0.0;
    let mut ss_r: f64 = sum_rc.iter().map(|&s| s * s).sum();

    let mut best: Option<(usize, usize, u32, f64)> = None; // (cut, lh_idx, lh_sc, info)
    for (j, &slot) in order.iter().enumerate().take(order.len() - 1) {
        let run = &runs[slot as usize];
        sum_l += run.sum;
        sc_l += run.s_count;
        idx_l += run.extent;
        if k > 0 {
            let base = slot as usize * k;
            for (c, lc) in sum_lc.iter_mut().enumerate() {
                let d = ctg_mass[base + c];
                if d != 0.0 {
                    ss_l += d * (2.0 * *lc + d);
                    ss_r -= d * (2.0 * sum_rc[c] - d);
                    *lc += d;
                    sum_rc[c] -= d;
                }
            }
        }
        if (idx_l as usize) < params.min_node || ((extent - idx_l) as usize) < params.min_node {
            continue;
        }
        let info = if k > 0 {
            finite_or_lost(ss_l / sum_l + ss_r / (stats.sum - sum_l) - stats.pre_bias)
        } else {
            let sc_r = stats.s_count - sc_l;
            let sum_r = stats.sum - sum_l;
            finite_or_lost(
                sum_l * sum_l / f64::from(sc_l) + sum_r * sum_r / f64::from(sc_r)
                    - stats.pre_bias,
            )
        };
        if best.map_or(info > f64::NEG_INFINITY, |(_, _, _, b)| info > b) {
            best = Some((j, idx_l as usize, sc_l, info));
        }
    }

    best.map(|(cut, lh_idx, lh_sc, info)| {
        let lh_slots = order[..=cut].to_vec();
        (
            lh_idx,
            lh_sc,
            info,
            RunInfo {
                runs: runs.to_vec(),
                lh_slots,
            },
        )
    })
}

/// Exhaustive subset enumeration for multiclass responses over few runs.
///
/// The last run is pinned to the right-hand side, halving the subset space
/// without loss of generality.
fn subset_split(
    runs: &[Run],
    ctg_mass: &[f64],
    stats: &NodeStats,
    params: &SplitParams<'_>,
) -> Option<(usize, u32, f64, RunInfo)> {
    let k = params.ctg_width;
    let rc = runs.len();
    let extent: u32 = runs.iter().map(|r| r.extent).sum();

    let mut sum_lc = vec![0.0; k];
    let mut best: Option<(u32, usize, u32, f64)> = None; // (mask, lh_idx, lh_sc, info)
    for mask in 1u32..(1 << (rc - 1)) {
        let mut sum_l = 0.0;
        let mut sc_l = 0u32;
        let mut idx_l = 0u32;
        sum_lc.iter_mut().for_each(|s| *s = 0.0);
        for (slot, run) in runs.iter().enumerate() {
            if mask & (1 << slot) != 0 {
                sum_l += run.sum;
                sc_l += run.s_count;
                idx_l += run.extent;
                for c in 0..k {
                    sum_lc[c] += ctg_mass[slot * k + c];
                }
            }
        }
        if (idx_l as usize) < params.min_node || ((extent - idx_l) as usize) < params.min_node {
            continue;
        }
        let mut ss_l = 0.0;
        let mut ss_r = 0.0;
        for (c, &lc) in sum_lc.iter().enumerate() {
            let rc_mass = stats.ctg_sum[c] - lc;
            ss_l += lc * lc;
            ss_r += rc_mass * rc_mass;
        }
        let info = finite_or_lost(ss_l / sum_l + ss_r / (stats.sum - sum_l) - stats.pre_bias);
        if best.map_or(info > f64::NEG_INFINITY, |(_, _, _, b)| info > b) {
            best = Some((mask, idx_l as usize, sc_l, info));
        }
    }

    best.map(|(mask, lh_idx, lh_sc, info)| {
        let lh_slots = (0..rc as u32).filter(|slot| mask & (1 << slot) != 0).collect();
        (
            lh_idx,
            lh_sc,
            info,
            RunInfo {
                runs: runs.to_vec(),
                lh_slots,
            },
        )
    })
}
