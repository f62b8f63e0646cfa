//! Double-buffered sample staging per predictor.
//!
//! For every predictor the buffer holds one tuple per bag sample, grouped
//! contiguously by the pre-tree node currently owning the sample and, within
//! a group, ordered by the predictor's rank. Split search scans groups in
//! place; after each level the groups of split nodes are rewritten into the
//! alternate buffer to reflect the new partition ("restaging").
//!
//! Restaging buckets on the sample-to-node map rather than re-evaluating the
//! split, which keeps the pass O(bag_count) per predictor and preserves rank
//! order inside each destination group.

use rayon::prelude::*;

use crate::data::PredictorFrame;
use crate::sampling::TreeBag;
use crate::utils::Parallelism;

/// One staged sample: the predictor rank of its row, its bag index, and its
/// response summary.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct SampleNode {
    pub y_sum: f64,
    pub rank: u32,
    pub s_idx: u32,
    pub s_count: u32,
    pub ctg: u32,
}

/// A split node's pending restage: partition `[start, start + extent)` into
/// an LH prefix of `lh_idx_count` tuples and an RH suffix, bucketing each
/// tuple on `sample2pt`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RestageJob {
    pub start: usize,
    pub extent: usize,
    pub lh_idx_count: usize,
    pub lh_pt: u32,
    pub source_bit: u8,
}

/// The ping-pong staging buffers, reused across all trees of a session.
///
/// Each buffer is `n_pred` chunks of `max_bag` tuples; per tree only the
/// first `bag_count` slots of each chunk are live.
pub(crate) struct SamplePred {
    n_pred: usize,
    max_bag: usize,
    bag_count: usize,
    bufs: [Vec<SampleNode>; 2],
}

impl SamplePred {
    /// `max_bag` is the worst-case bag size over the session.
    pub fn new(n_pred: usize, max_bag: usize) -> Self {
        let len = n_pred * max_bag;
        Self {
            n_pred,
            max_bag,
            bag_count: 0,
            bufs: [vec![SampleNode::default(); len], vec![SampleNode::default(); len]],
        }
    }

    #[inline]
    pub fn bag_count(&self) -> usize {
        self.bag_count
    }

    /// Initial staging for one tree: for each predictor, walk its presorted
    /// order and emit a tuple for every in-bag row, into buffer 0.
    pub fn stage(&mut self, frame: &PredictorFrame, bag: &TreeBag) {
        self.bag_count = bag.bag_count();
        debug_assert!(self.bag_count <= self.max_bag);

        let stride = self.max_bag;
        let buf = &mut self.bufs[0];
        for pred in 0..self.n_pred {
            let chunk = &mut buf[pred * stride..pred * stride + self.bag_count];
            let mut out = 0;
            for k in 0..frame.n_row() {
                let ranked = frame.ranked_row(pred, k);
                if let Some(s_idx) = bag.row2sample[ranked.row as usize] {
                    let s = bag.samples[s_idx as usize];
                    chunk[out] = SampleNode {
                        y_sum: s.y_sum,
                        rank: ranked.rank,
                        s_idx,
                        s_count: s.s_count,
                        ctg: s.ctg,
                    };
                    out += 1;
                }
            }
            debug_assert_eq!(out, self.bag_count, "bag must stage exactly once per predictor");
        }
    }

    /// The live tuples of `pred` in the buffer selected by `source_bit`.
    #[inline]
    pub fn chunk(&self, pred: usize, source_bit: u8) -> &[SampleNode] {
        let start = pred * self.max_bag;
        &self.bufs[source_bit as usize][start..start + self.bag_count]
    }

    /// Ranks of the two tuples straddling position `idx_mid`; used to place a
    /// numeric cut between two observed values.
    #[inline]
    pub fn split_ranks(&self, pred: usize, source_bit: u8, idx_mid: usize) -> (u32, u32) {
        let chunk = self.chunk(pred, source_bit);
        (chunk[idx_mid].rank, chunk[idx_mid + 1].rank)
    }

    /// Assign `pt_id` to every sample in `[start, start + extent)` of the
    /// source group and return the response mass replayed.
    pub fn replay(
        &self,
        sample2pt: &mut [u32],
        pred: usize,
        source_bit: u8,
        start: usize,
        extent: usize,
        pt_id: u32,
    ) -> f64 {
        let chunk = self.chunk(pred, source_bit);
        let mut sum = 0.0;
        for node in &chunk[start..start + extent] {
            sample2pt[node.s_idx as usize] = pt_id;
            sum += node.y_sum;
        }
        sum
    }

    /// Restage every predictor for the level's split nodes, writing the
    /// complement buffer. Destination chunks are disjoint per predictor, so
    /// the pass parallelizes across predictors.
    pub fn restage(&mut self, jobs: &[RestageJob], sample2pt: &[u32], parallelism: Parallelism) {
        if jobs.is_empty() {
            return;
        }
        // Nodes of one level share their restage history, hence their bit.
        let bit = jobs[0].source_bit;
        debug_assert!(jobs.iter().all(|j| j.source_bit == bit));

        let stride = self.max_bag;
        let [b0, b1] = &mut self.bufs;
        let (src, dst): (&[SampleNode], &mut [SampleNode]) = if bit == 0 {
            (b0.as_slice(), b1.as_mut_slice())
        } else {
            (b1.as_slice(), b0.as_mut_slice())
        };

        let work = |(d, s): (&mut [SampleNode], &[SampleNode])| {
            for job in jobs {
                let mut lh = job.start;
                let mut rh = job.start + job.lh_idx_count;
                for node in &s[job.start..job.start + job.extent] {
                    if sample2pt[node.s_idx as usize] == job.lh_pt {
                        d[lh] = *node;
                        lh += 1;
                    } else {
                        d[rh] = *node;
                        rh += 1;
                    }
                }
                debug_assert_eq!(lh, job.start + job.lh_idx_count);
                debug_assert_eq!(rh, job.start + job.extent);
            }
        };

        if parallelism.is_parallel() {
            dst.par_chunks_mut(stride)
                .zip(src.par_chunks(stride))
                .for_each(work);
        } else {
            dst.chunks_mut(stride).zip(src.chunks(stride)).for_each(work);
        }
    }
}
