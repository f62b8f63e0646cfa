//! Level-synchronous growth coordinator.
//!
//! Drives one tree from its staged bag to a finished pre-tree. Per level:
//! draw a predictor mask per splittable node, search every (node, predictor)
//! pair for its best split, take the per-node argmax, promote winners in the
//! pre-tree, replay the sample-to-node map, and restage the buffers for the
//! next level. Searches target disjoint signature slots and run
//! concurrently; everything that consumes random variates stays sequential
//! so a fixed seed reproduces the forest.

use crate::data::PredictorFrame;
use crate::sampling::{TreeBag, UniformSource};
use crate::utils::Parallelism;

use super::config::PredSampling;
use super::pretree::PreTree;
use super::runs::{categorical_split, RunInfo, RunTable};
use super::splitsig::{numeric_split, NodeStats, SplitParams, SplitSig, SsNode};
use super::stage::{RestageJob, SamplePred};

/// One splittable node of the current level: its pre-tree id, its tuple
/// range in the staged buffers, the gain of the split that created it, and
/// the buffer currently holding its tuples.
#[derive(Debug, Clone, Copy)]
struct NodeCand {
    pt_id: u32,
    start: usize,
    extent: usize,
    parent_info: f64,
    source_bit: u8,
}

/// Per-session growth coordinator, reused across trees.
pub(crate) struct Bottom<'a> {
    frame: &'a PredictorFrame,
    split_params: SplitParams<'a>,
    min_ratio: f64,
    tot_levels: u32,
    sampling: PredSampling,
    splitsig: SplitSig,
    run_table: RunTable,
}

impl<'a> Bottom<'a> {
    pub fn new(
        frame: &'a PredictorFrame,
        split_params: SplitParams<'a>,
        min_ratio: f64,
        tot_levels: u32,
        sampling: PredSampling,
    ) -> Self {
        Self {
            frame,
            split_params,
            min_ratio,
            tot_levels,
            sampling,
            splitsig: SplitSig::new(frame.n_pred()),
            run_table: RunTable::default(),
        }
    }

    /// Grow one tree over the staged bag. `pred_info` accumulates the gain
    /// of every split actually taken, keyed by predictor.
    pub fn grow(
        &mut self,
        sample_pred: &mut SamplePred,
        bag: &TreeBag,
        height_est: usize,
        rng: &mut UniformSource,
        pred_info: &mut [f64],
        parallelism: Parallelism,
    ) -> PreTree {
        let bag_count = bag.bag_count();
        let bit_stride = if self.frame.n_pred_fac() > 0 {
            self.frame.max_card() as usize
        } else {
            0
        };
        let mut pretree = PreTree::new(height_est, bag_count, bit_stride);

        let min_node = self.split_params.min_node;
        let mut cands: Vec<NodeCand> = Vec::new();
        if bag_count >= 2 * min_node {
            cands.push(NodeCand {
                pt_id: 0,
                start: 0,
                extent: bag_count,
                parent_info: 0.0,
                source_bit: 0,
            });
        }

        let mut level = 0u32;
        while !cands.is_empty() && (self.tot_levels == 0 || level < self.tot_levels) {
            self.splitsig.level_init(cands.len());
            self.run_table.clear();

            // Group statistics, shared by every predictor's search.
            let stats: Vec<NodeStats> = cands
                .iter()
                .map(|c| {
                    let chunk = &sample_pred.chunk(0, c.source_bit)[c.start..c.start + c.extent];
                    NodeStats::from_chunk(chunk, self.split_params.ctg_width)
                })
                .collect();

            // Predictor masks consume variates sequentially, per node.
            let mut pairs: Vec<(usize, usize)> = Vec::new();
            for cand_idx in 0..cands.len() {
                for pred in self.draw_mask(rng) {
                    pairs.push((cand_idx, pred));
                }
            }

            // Search every chosen (node, predictor) pair; slots are disjoint.
            let frame = self.frame;
            let split_params = &self.split_params;
            let cands_ref = &cands;
            let stats_ref = &stats;
            let sp_ref = &*sample_pred;
            type SearchHit = (usize, SsNode, Option<RunInfo>);
            let found: Vec<Option<SearchHit>> =
                parallelism.maybe_par_map(pairs, move |(cand_idx, pred)| {
                    let cand = &cands_ref[cand_idx];
                    let chunk =
                        &sp_ref.chunk(pred, cand.source_bit)[cand.start..cand.start + cand.extent];
                    let node_stats = &stats_ref[cand_idx];
                    if frame.fac_idx(pred).is_none() {
                        numeric_split(chunk, node_stats, split_params, pred).map(
                            |(lh_idx, lh_sc, info)| {
                                let ssn = SsNode {
                                    pred_idx: pred as u32,
                                    set_idx: None,
                                    s_count: lh_sc,
                                    lh_idx_count: lh_idx as u32,
                                    info,
                                };
                                (cand_idx, ssn, None)
                            },
                        )
                    } else {
                        categorical_split(chunk, node_stats, split_params).map(
                            |(lh_idx, lh_sc, info, run_info)| {
                                let ssn = SsNode {
                                    pred_idx: pred as u32,
                                    set_idx: None,
                                    s_count: lh_sc,
                                    lh_idx_count: lh_idx as u32,
                                    info,
                                };
                                (cand_idx, ssn, Some(run_info))
                            },
                        )
                    }
                });

            for hit in found.into_iter().flatten() {
                let (cand_idx, mut ssn, run_info) = hit;
                if let Some(run_info) = run_info {
                    ssn.set_idx = Some(self.run_table.push(run_info));
                }
                self.splitsig.write(cand_idx, ssn);
            }

            // Argmax per node, then promote winners and replay.
            let mut next: Vec<NodeCand> = Vec::new();
            let mut jobs: Vec<RestageJob> = Vec::new();
            for (cand_idx, cand) in cands.iter().enumerate() {
                let ssn = match self
                    .splitsig
                    .arg_max(cand_idx, cand.parent_info * self.min_ratio)
                {
                    Some(ssn) => ssn,
                    None => continue, // Node stays terminal.
                };
                let lh_idx = ssn.lh_idx_count as usize;
                assert!(
                    lh_idx > 0 && lh_idx < cand.extent,
                    "split claimed with an empty side"
                );
                pred_info[ssn.pred_idx as usize] += ssn.info;

                let pred = ssn.pred_idx as usize;
                let (lh, rh) = match ssn.set_idx {
                    Some(set_idx) => self.promote_fac(
                        &mut pretree,
                        sample_pred,
                        cand,
                        &ssn,
                        set_idx,
                    ),
                    None => {
                        let (rk_lo, rk_hi) = sample_pred.split_ranks(
                            pred,
                            cand.source_bit,
                            cand.start + lh_idx - 1,
                        );
                        let split_val = 0.5
                            * (self.frame.value_at_rank(pred, rk_lo)
                                + self.frame.value_at_rank(pred, rk_hi));
                        let (lh, rh) = pretree.non_terminal_num(
                            cand.pt_id as usize,
                            ssn.info,
                            ssn.pred_idx,
                            split_val,
                        );
                        sample_pred.replay(
                            pretree.sample2pt_mut(),
                            pred,
                            cand.source_bit,
                            cand.start,
                            lh_idx,
                            lh,
                        );
                        sample_pred.replay(
                            pretree.sample2pt_mut(),
                            pred,
                            cand.source_bit,
                            cand.start + lh_idx,
                            cand.extent - lh_idx,
                            rh,
                        );
                        (lh, rh)
                    }
                };

                let children = [
                    (lh, cand.start, lh_idx),
                    (rh, cand.start + lh_idx, cand.extent - lh_idx),
                ];
                for (pt_id, start, extent) in children {
                    if extent >= 2 * min_node {
                        next.push(NodeCand {
                            pt_id,
                            start,
                            extent,
                            parent_info: ssn.info,
                            source_bit: cand.source_bit ^ 1,
                        });
                    }
                }
                jobs.push(RestageJob {
                    start: cand.start,
                    extent: cand.extent,
                    lh_idx_count: lh_idx,
                    lh_pt: lh,
                    source_bit: cand.source_bit,
                });
            }
            self.splitsig.level_clear();

            sample_pred.restage(&jobs, pretree.sample2pt(), parallelism);
            cands = next;
            level += 1;
        }

        pretree
    }

    /// Promote a factor split: the whole extent replays right-hand first,
    /// then each chosen run overwrites with the left-hand index while its
    /// level bit is set.
    fn promote_fac(
        &self,
        pretree: &mut PreTree,
        sample_pred: &SamplePred,
        cand: &NodeCand,
        ssn: &SsNode,
        set_idx: u32,
    ) -> (u32, u32) {
        let pred = ssn.pred_idx as usize;
        let (lh, rh) = pretree.non_terminal_fac(cand.pt_id as usize, ssn.info, ssn.pred_idx);
        sample_pred.replay(
            pretree.sample2pt_mut(),
            pred,
            cand.source_bit,
            cand.start,
            cand.extent,
            rh,
        );
        let run_info = self.run_table.get(set_idx);
        for &slot in &run_info.lh_slots {
            let run = run_info.runs[slot as usize];
            pretree.lh_bit(cand.pt_id as usize, run.rank);
            sample_pred.replay(
                pretree.sample2pt_mut(),
                pred,
                cand.source_bit,
                cand.start + run.start as usize,
                run.extent as usize,
                lh,
            );
        }
        (lh, rh)
    }

    /// Predictor subset for one node. Fixed plans draw a `k`-subset without
    /// replacement; Bernoulli plans keep each predictor independently and
    /// retain the nearest miss when the draw comes up empty.
    fn draw_mask(&self, rng: &mut UniformSource) -> Vec<usize> {
        let n_pred = self.frame.n_pred();
        match &self.sampling {
            PredSampling::Fixed(k) => {
                let mut preds: Vec<usize> = (0..n_pred).collect();
                for i in 0..*k {
                    let j = i + rng.next_index(n_pred - i);
                    preds.swap(i, j);
                }
                preds.truncate(*k);
                preds
            }
            PredSampling::Prob(probs) => {
                let mut chosen = Vec::new();
                let mut nearest = 0;
                let mut nearest_margin = f64::INFINITY;
                for (pred, &prob) in probs.iter().enumerate() {
                    let u = rng.next_uniform();
                    if u < prob {
                        chosen.push(pred);
                    } else if u - prob < nearest_margin {
                        nearest_margin = u - prob;
                        nearest = pred;
                    }
                }
                if chosen.is_empty() {
                    chosen.push(nearest);
                }
                chosen
            }
        }
    }
}
