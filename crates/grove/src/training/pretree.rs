//! The mutable tree grown during a training pass.
//!
//! Nodes are allocated as terminals and promoted to nonterminals when found
//! splittable; offspring are allocated speculatively as adjacent terminals,
//! so dangling nonterminals never need revising. After the last level the
//! pre-tree is consumed into the packed forest vectors and freed.

use crate::repr::{BagRow, BitVec, ConsumedTree, LeafNode};
use crate::sampling::TreeBag;

/// One pre-tree node. `lh_id = -1` marks a terminal; a nonterminal's
/// right-hand child sits at `lh_id + 1`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PtNode {
    pub lh_id: i32,
    pub pred_idx: u32,
    pub split_val: f64,
    pub info: f64,
}

impl PtNode {
    fn terminal() -> Self {
        Self {
            lh_id: -1,
            pred_idx: 0,
            split_val: 0.0,
            info: 0.0,
        }
    }

    #[inline]
    pub fn is_nonterminal(&self) -> bool {
        self.lh_id > 0
    }
}

/// Growable pre-tree plus its sample-to-node map and factor-split bits.
pub(crate) struct PreTree {
    nodes: Vec<PtNode>,
    leaf_count: usize,
    sample2pt: Vec<u32>,
    split_bits: BitVec,
    bit_offset: usize,
    /// Bits reserved per factor split: the frame's widest cardinality.
    bit_stride: usize,
}

impl PreTree {
    /// `height_est` seeds the node allocation; `bit_stride` is zero when the
    /// frame has no factor predictors.
    pub fn new(height_est: usize, bag_count: usize, bit_stride: usize) -> Self {
        let mut nodes = Vec::with_capacity(height_est.max(1));
        nodes.push(PtNode::terminal());
        let split_bits = if bit_stride > 0 {
            BitVec::zeros(height_est.max(1) * bit_stride)
        } else {
            BitVec::new()
        };
        Self {
            nodes,
            leaf_count: 1,
            sample2pt: vec![0; bag_count],
            split_bits,
            bit_offset: 0,
            bit_stride,
        }
    }

    /// Current height (high watermark of allocated nodes).
    #[inline]
    pub fn height(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    #[inline]
    pub fn sample2pt(&self) -> &[u32] {
        &self.sample2pt
    }

    #[inline]
    pub fn sample2pt_mut(&mut self) -> &mut [u32] {
        &mut self.sample2pt
    }

    /// Width of the factor-bit region written so far.
    #[inline]
    pub fn split_fac_width(&self) -> usize {
        self.bit_offset
    }

    /// Allocate two adjacent terminal offspring for `parent`.
    fn terminal_offspring(&mut self, parent: usize) -> (u32, u32) {
        let lh = self.nodes.len() as u32;
        self.nodes.push(PtNode::terminal());
        self.nodes.push(PtNode::terminal());
        self.nodes[parent].lh_id = lh as i32;
        self.leaf_count += 1; // Two leaves in, one parent out.
        (lh, lh + 1)
    }

    /// Promote `id` to a numeric nonterminal cutting at `split_val`.
    pub fn non_terminal_num(
        &mut self,
        id: usize,
        info: f64,
        pred_idx: u32,
        split_val: f64,
    ) -> (u32, u32) {
        let (lh, rh) = self.terminal_offspring(id);
        let node = &mut self.nodes[id];
        node.pred_idx = pred_idx;
        node.split_val = split_val;
        node.info = info;
        debug_assert!((id as u32) < lh && lh < rh);
        (lh, rh)
    }

    /// Promote `id` to a factor nonterminal; its split value is the offset of
    /// its freshly reserved slice of the tree's bit region.
    pub fn non_terminal_fac(&mut self, id: usize, info: f64, pred_idx: u32) -> (u32, u32) {
        debug_assert!(self.bit_stride > 0, "factor split without factor predictors");
        let fac_offset = self.bit_offset;
        self.bit_offset += self.bit_stride;
        if self.bit_offset > self.split_bits.len() {
            // Doubling keeps amortized growth linear, as with the node vector.
            self.split_bits
                .grow_to((self.split_bits.len() * 2).max(self.bit_offset));
        }

        let (lh, rh) = self.terminal_offspring(id);
        let node = &mut self.nodes[id];
        node.pred_idx = pred_idx;
        node.split_val = fac_offset as f64;
        node.info = info;
        (lh, rh)
    }

    /// Route factor `level` of nonterminal `id` to the left-hand side.
    pub fn lh_bit(&mut self, id: usize, level: u32) {
        let fac_offset = self.nodes[id].split_val as usize;
        self.split_bits.set(fac_offset + level as usize);
    }

    /// Consume the pre-tree into packed vectors, scoring leaves from the
    /// bag summaries partitioned by `sample2pt`.
    ///
    /// `row2rank` carries the response ranks for regression (quantile
    /// bookkeeping); `ctg_width` is zero for regression.
    pub fn consume(
        self,
        bag: &TreeBag,
        ctg_width: usize,
        row2rank: Option<&[u32]>,
    ) -> ConsumedTree {
        let height = self.nodes.len();
        let is_regression = ctg_width == 0;

        // Partition the bag summaries by their final pre-tree node.
        let mut extent = vec![0u32; height];
        let mut s_count = vec![0u32; height];
        let mut sum = vec![0.0f64; height];
        let mut census = vec![0u32; height * ctg_width];
        for (s_idx, s) in bag.samples.iter().enumerate() {
            let pt = self.sample2pt[s_idx] as usize;
            extent[pt] += 1;
            s_count[pt] += s.s_count;
            if is_regression {
                sum[pt] += s.y_sum;
            } else {
                census[pt * ctg_width + s.ctg as usize] += s.s_count;
            }
        }

        let mut pred_idx = Vec::with_capacity(height);
        let mut split_val = Vec::with_capacity(height);
        let mut lh_bump = Vec::with_capacity(height);
        let mut leaf_nodes = Vec::with_capacity(height);
        let mut weight = Vec::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            if node.is_nonterminal() {
                debug_assert_eq!(extent[idx], 0, "samples must drain to the leaves");
                debug_assert!(node.info.is_finite(), "admitted split carries a finite gain");
                pred_idx.push(node.pred_idx as i32);
                split_val.push(node.split_val);
                lh_bump.push(node.lh_id - idx as i32);
                leaf_nodes.push(LeafNode {
                    score: 0.0,
                    extent: 0,
                });
            } else {
                debug_assert!(extent[idx] > 0, "every leaf owns at least one sample");
                let score = if is_regression {
                    sum[idx] / f64::from(s_count[idx])
                } else {
                    let row = &census[idx * ctg_width..(idx + 1) * ctg_width];
                    let total = f64::from(s_count[idx]);
                    for &count in row {
                        weight.push(f64::from(count) / total);
                    }
                    arg_max_census(row) as f64
                };
                pred_idx.push(if is_regression { -1 } else { score as i32 });
                split_val.push(score);
                lh_bump.push(0);
                leaf_nodes.push(LeafNode {
                    score,
                    extent: extent[idx],
                });
            }
        }

        // Group the bag by leaf via a counting sort over sample2pt.
        let bag_count = bag.bag_count();
        let mut cursor = vec![0u32; height];
        let mut acc = 0u32;
        for idx in 0..height {
            cursor[idx] = acc;
            acc += extent[idx];
        }
        debug_assert_eq!(acc as usize, bag_count);
        let mut bag_row = vec![BagRow { row: 0, s_count: 0 }; bag_count];
        let mut sample_rank = vec![0u32; if is_regression { bag_count } else { 0 }];
        for (s_idx, s) in bag.samples.iter().enumerate() {
            let pt = self.sample2pt[s_idx] as usize;
            let pos = cursor[pt] as usize;
            cursor[pt] += 1;
            bag_row[pos] = BagRow {
                row: s.row,
                s_count: s.s_count,
            };
            if let Some(ranks) = row2rank {
                sample_rank[pos] = ranks[s.row as usize];
            }
        }

        ConsumedTree {
            pred_idx,
            split_val,
            lh_bump,
            split_bits: self.split_bits,
            fac_width: self.bit_offset as u32,
            leaf_nodes,
            bag_row,
            sample_rank,
            weight,
            in_bag_words: bag.in_bag_words().to_vec(),
        }
    }
}

/// Winning category of a leaf census; ties go to the lowest code.
fn arg_max_census(row: &[u32]) -> u32 {
    let mut best = 0;
    let mut best_count = row[0];
    for (c, &count) in row.iter().enumerate().skip(1) {
        if count > best_count {
            best = c;
            best_count = count;
        }
    }
    best as u32
}

/// Session-wide height estimate, refined tree by tree.
///
/// Starts from the smallest balanced tree covering `n_samp` leaves of
/// `min_node` samples and tracks the next power of two above the tallest
/// tree seen, informing the next tree's initial allocation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeightEst {
    height: usize,
}

impl HeightEst {
    pub fn new(n_samp: usize, min_node: usize) -> Self {
        let mut two_l = 1usize;
        while two_l * min_node < n_samp {
            two_l <<= 1;
        }
        Self { height: two_l << 2 }
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.height
    }

    /// Raise the estimate to the next power of two above `observed`.
    pub fn refine(&mut self, observed: usize) {
        while self.height <= observed {
            self.height <<= 1;
        }
    }
}
