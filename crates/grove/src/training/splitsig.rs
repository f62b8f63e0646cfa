//! Split signatures and numeric split search.
//!
//! Per level the engine owns a dense matrix of split signatures, one slot per
//! (predictor, splittable node) pair. Searches write their best candidate
//! into their own slot; the level coordinator then takes the argmax per node.
//! Unwritten slots keep `info = -inf` and can never win.
//!
//! The information metric is the impurity decrease: for regression the
//! within-node variance reduction (in the `sum^2 / count` formulation that
//! avoids a second pass), for classification the proxy-weighted Gini
//! decrease. Both are expressed as `child_term(LH) + child_term(RH) -
//! pre_bias`, with `pre_bias` the parent's own term.

use super::stage::SampleNode;

// =============================================================================
// SSNode matrix
// =============================================================================

/// Best split found for one (predictor, node) pair.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SsNode {
    pub pred_idx: u32,
    /// Index into the level's run table for categorical splits.
    pub set_idx: Option<u32>,
    /// Sample count of the left-hand side.
    pub s_count: u32,
    /// Index count of the left-hand side.
    pub lh_idx_count: u32,
    /// Information gain; `-inf` marks an unwritten slot.
    pub info: f64,
}

impl Default for SsNode {
    fn default() -> Self {
        Self {
            pred_idx: 0,
            set_idx: None,
            s_count: 0,
            lh_idx_count: 0,
            info: f64::NEG_INFINITY,
        }
    }
}

/// Dense `n_pred x split_count` signature matrix, predictor-major: the slot
/// of `(pred, node)` is `pred * split_count + node`, so the per-node argmax
/// strides by `split_count` and resolves ties toward the lowest predictor.
pub(crate) struct SplitSig {
    n_pred: usize,
    split_count: usize,
    level_ss: Vec<SsNode>,
}

impl SplitSig {
    pub fn new(n_pred: usize) -> Self {
        Self {
            n_pred,
            split_count: 0,
            level_ss: Vec::new(),
        }
    }

    /// Allocate the level's signatures, all initialized unwritten.
    pub fn level_init(&mut self, split_count: usize) {
        self.split_count = split_count;
        self.level_ss.clear();
        self.level_ss
            .resize(self.n_pred * split_count, SsNode::default());
    }

    /// Release the level's signatures.
    pub fn level_clear(&mut self) {
        self.split_count = 0;
        self.level_ss.clear();
        self.level_ss.shrink_to_fit();
    }

    /// Record the winning candidate of a (predictor, node) search.
    pub fn write(&mut self, node_idx: usize, ssn: SsNode) {
        debug_assert!(node_idx < self.split_count);
        debug_assert!(ssn.info.is_finite());
        self.level_ss[ssn.pred_idx as usize * self.split_count + node_idx] = ssn;
    }

    /// Signature with the greatest `info` strictly above `gain_max`, or
    /// `None` if no predictor clears the bar. Ties break toward the lowest
    /// predictor index (the scan replaces only on strict improvement).
    pub fn arg_max(&self, node_idx: usize, mut gain_max: f64) -> Option<SsNode> {
        debug_assert!(node_idx < self.split_count);
        let mut arg_max = None;
        let mut off = node_idx;
        for _ in 0..self.n_pred {
            let cand = &self.level_ss[off];
            if cand.info > gain_max {
                arg_max = Some(*cand);
                gain_max = cand.info;
            }
            off += self.split_count;
        }
        arg_max
    }
}

// =============================================================================
// Node statistics
// =============================================================================

/// Response statistics of one splittable node, recomputed per level from its
/// staged group.
#[derive(Debug, Clone)]
pub(crate) struct NodeStats {
    pub s_count: u32,
    pub sum: f64,
    /// Per-category response mass; empty for regression.
    pub ctg_sum: Vec<f64>,
    /// The parent term of the gain: `sum^2 / s_count` for regression,
    /// `sum_c(s_c^2) / sum` for classification.
    pub pre_bias: f64,
}

impl NodeStats {
    pub fn from_chunk(chunk: &[SampleNode], ctg_width: usize) -> Self {
        let mut s_count = 0u32;
        let mut sum = 0.0;
        let mut ctg_sum = vec![0.0; ctg_width];
        for node in chunk {
            s_count += node.s_count;
            sum += node.y_sum;
            if ctg_width > 0 {
                ctg_sum[node.ctg as usize] += node.y_sum;
            }
        }
        let pre_bias = if ctg_width > 0 {
            let ss: f64 = ctg_sum.iter().map(|&s| s * s).sum();
            if sum > 0.0 { ss / sum } else { 0.0 }
        } else {
            sum * sum / f64::from(s_count)
        };
        Self {
            s_count,
            sum,
            ctg_sum,
            pre_bias,
        }
    }
}

/// Level-invariant split policy.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SplitParams<'a> {
    pub min_node: usize,
    pub max_run_width: usize,
    /// Zero for regression.
    pub ctg_width: usize,
    pub reg_mono: Option<&'a [i8]>,
}

/// Clamp a possibly-degenerate gain; non-finite values lose the argmax.
#[inline]
pub(crate) fn finite_or_lost(info: f64) -> f64 {
    if info.is_finite() {
        info
    } else {
        f64::NEG_INFINITY
    }
}

// =============================================================================
// Numeric split search
// =============================================================================

/// Scan a numeric predictor's staged group for the best cut.
///
/// Returns `(lh_idx_count, lh_s_count, info)`, or `None` when no admissible
/// cut exists (all ranks tied, node-size floor, or a monotone constraint
/// rejecting every candidate).
pub(crate) fn numeric_split(
    chunk: &[SampleNode],
    stats: &NodeStats,
    params: &SplitParams<'_>,
    pred: usize,
) -> Option<(usize, u32, f64)> {
    if params.ctg_width > 0 {
        numeric_split_ctg(chunk, stats, params)
    } else {
        numeric_split_reg(chunk, stats, params, pred)
    }
}

fn numeric_split_reg(
    chunk: &[SampleNode],
    stats: &NodeStats,
    params: &SplitParams<'_>,
    pred: usize,
) -> Option<(usize, u32, f64)> {
    let extent = chunk.len();
    let mono = params.reg_mono.map_or(0, |m| m[pred]);

    let mut sum_l = 0.0;
    let mut sc_l = 0u32;
    let mut best: Option<(usize, u32, f64)> = None;
    for i in 0..extent - 1 {
        sum_l += chunk[i].y_sum;
        sc_l += chunk[i].s_count;
        if chunk[i].rank == chunk[i + 1].rank {
            continue;
        }
        let lh_idx = i + 1;
        if lh_idx < params.min_node || extent - lh_idx < params.min_node {
            continue;
        }
        let sc_r = stats.s_count - sc_l;
        let sum_r = stats.sum - sum_l;
        if mono != 0 {
            let mean_l = sum_l / f64::from(sc_l);
            let mean_r = sum_r / f64::from(sc_r);
            let ordered = if mono > 0 {
                mean_r >= mean_l
            } else {
                mean_r <= mean_l
            };
            if !ordered {
                continue;
            }
        }
        let info = finite_or_lost(
            sum_l * sum_l / f64::from(sc_l) + sum_r * sum_r / f64::from(sc_r) - stats.pre_bias,
        );
        if best.map_or(info > f64::NEG_INFINITY, |(_, _, b)| info > b) {
            best = Some((lh_idx, sc_l, info));
        }
    }
    best
}

fn numeric_split_ctg(
    chunk: &[SampleNode],
    stats: &NodeStats,
    params: &SplitParams<'_>,
) -> Option<(usize, u32, f64)> {
    let extent = chunk.len();
    let k = params.ctg_width;

    let mut sum_lc = vec![0.0; k];
    let mut sum_rc = stats.ctg_sum.clone();
    let mut ss_l = 0.0;
    let mut ss_r: f64 = sum_rc.iter().map(|&s| s * s).sum();
    let mut sum_l = 0.0;
    let mut sc_l = 0u32;

    let mut best: Option<(usize, u32, f64)> = None;
    for i in 0..extent - 1 {
        let node = &chunk[i];
        let c = node.ctg as usize;
        let d = node.y_sum;
        ss_l += d * (2.0 * sum_lc[c] + d);
        ss_r -= d * (2.0 * sum_rc[c] - d);
        sum_lc[c] += d;
        sum_rc[c] -= d;
        sum_l += d;
        sc_l += node.s_count;

        if node.rank == chunk[i + 1].rank {
            continue;
        }
        let lh_idx = i + 1;
        if lh_idx < params.min_node || extent - lh_idx < params.min_node {
            continue;
        }
        let sum_r = stats.sum - sum_l;
        let info = finite_or_lost(ss_l / sum_l + ss_r / sum_r - stats.pre_bias);
        if best.map_or(info > f64::NEG_INFINITY, |(_, _, b)| info > b) {
            best = Some((lh_idx, sc_l, info));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(y_sum: f64, rank: u32, s_idx: u32, ctg: u32) -> SampleNode {
        SampleNode {
            y_sum,
            rank,
            s_idx,
            s_count: 1,
            ctg,
        }
    }

    fn params(min_node: usize, ctg_width: usize) -> SplitParams<'static> {
        SplitParams {
            min_node,
            max_run_width: 10,
            ctg_width,
            reg_mono: None,
        }
    }

    #[test]
    fn argmax_prefers_lowest_predictor_on_tie() {
        let mut sig = SplitSig::new(3);
        sig.level_init(2);
        for pred in [2u32, 0, 1] {
            sig.write(
                1,
                SsNode {
                    pred_idx: pred,
                    set_idx: None,
                    s_count: 4,
                    lh_idx_count: 4,
                    info: 1.0,
                },
            );
        }
        let best = sig.arg_max(1, 0.0).unwrap();
        assert_eq!(best.pred_idx, 0);
    }

    #[test]
    fn argmax_requires_strict_improvement() {
        let mut sig = SplitSig::new(2);
        sig.level_init(1);
        sig.write(
            0,
            SsNode {
                pred_idx: 0,
                set_idx: None,
                s_count: 2,
                lh_idx_count: 2,
                info: 0.5,
            },
        );
        assert!(sig.arg_max(0, 0.5).is_none());
        assert!(sig.arg_max(0, 0.49).is_some());
    }

    #[test]
    fn unwritten_slots_never_win() {
        let mut sig = SplitSig::new(4);
        sig.level_init(3);
        assert!(sig.arg_max(2, f64::MIN).is_none());
    }

    #[test]
    fn numeric_regression_finds_obvious_cut() {
        // Two clusters: y = 0 for low ranks, y = 10 for high ranks.
        let chunk: Vec<SampleNode> = (0..8)
            .map(|i| node(if i < 4 { 0.0 } else { 10.0 }, i, i as u32, 0))
            .collect();
        let stats = NodeStats::from_chunk(&chunk, 0);
        let (lh_idx, lh_sc, info) = numeric_split(&chunk, &stats, &params(1, 0), 0).unwrap();
        assert_eq!(lh_idx, 4);
        assert_eq!(lh_sc, 4);
        assert!(info > 0.0);
    }

    #[test]
    fn tied_ranks_admit_no_cut() {
        let chunk: Vec<SampleNode> = (0..6).map(|i| node(i as f64, 3, i, 0)).collect();
        let stats = NodeStats::from_chunk(&chunk, 0);
        assert!(numeric_split(&chunk, &stats, &params(1, 0), 0).is_none());
    }

    #[test]
    fn min_node_floors_both_sides() {
        let chunk: Vec<SampleNode> = (0..6)
            .map(|i| node(if i < 1 { 100.0 } else { 0.0 }, i, i as u32, 0))
            .collect();
        let stats = NodeStats::from_chunk(&chunk, 0);
        // Best unconstrained cut is after the first tuple; min_node = 2
        // forbids it.
        let (lh_idx, _, _) = numeric_split(&chunk, &stats, &params(2, 0), 0).unwrap();
        assert!(lh_idx >= 2 && lh_idx <= 4);
    }

    #[test]
    fn monotone_constraint_rejects_decreasing_cut() {
        // Response decreases with rank: any cut puts the larger mean left.
        let chunk: Vec<SampleNode> = (0..6).map(|i| node(10.0 - i as f64, i, i as u32, 0)).collect();
        let stats = NodeStats::from_chunk(&chunk, 0);
        let mono = [1i8];
        let p = SplitParams {
            min_node: 1,
            max_run_width: 10,
            ctg_width: 0,
            reg_mono: Some(&mono),
        };
        assert!(numeric_split(&chunk, &stats, &p, 0).is_none());

        let mono_down = [-1i8];
        let p = SplitParams {
            reg_mono: Some(&mono_down),
            ..p
        };
        assert!(numeric_split(&chunk, &stats, &p, 0).is_some());
    }

    #[test]
    fn numeric_classification_separates_pure_halves() {
        let chunk: Vec<SampleNode> = (0..8)
            .map(|i| node(1.0, i, i as u32, u32::from(i >= 4)))
            .collect();
        let stats = NodeStats::from_chunk(&chunk, 2);
        let (lh_idx, _, info) = numeric_split(&chunk, &stats, &params(1, 2), 0).unwrap();
        assert_eq!(lh_idx, 4);
        assert!(info > 0.0);
    }

    #[test]
    fn pure_node_yields_no_positive_gain() {
        let chunk: Vec<SampleNode> = (0..6).map(|i| node(1.0, i, i, 1)).collect();
        let stats = NodeStats::from_chunk(&chunk, 3);
        if let Some((_, _, info)) = numeric_split(&chunk, &stats, &params(1, 3), 0) {
            assert!(info.abs() < 1e-12);
        }
    }
}
