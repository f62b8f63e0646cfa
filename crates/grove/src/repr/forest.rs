//! The persisted forest bundle and its training-side builder.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bits::{BagMatrix, BitVec};

/// Forest storage is reserved ahead of consumption using this growth
/// estimate and trimmed once the last tree lands.
pub(crate) const SLOP_FACTOR: f64 = 1.2;

// =============================================================================
// Leaf store
// =============================================================================

/// Per-node leaf record. `extent` is the number of bag samples reaching the
/// node; zero marks a nonterminal slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeafNode {
    pub score: f64,
    pub extent: u32,
}

/// A sampled observation as persisted with its tree: row and multiplicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagRow {
    pub row: u32,
    pub s_count: u32,
}

/// Leaf-side payload of the bundle.
///
/// `nodes` aligns with the packed node vectors (one record per forest node).
/// `bag_row` holds each tree's samples grouped by leaf: tree `t` owns
/// `bag_row[sample_origin[t]..sample_origin[t+1]]`, and within a tree the
/// samples of a leaf are contiguous, ordered by node index, with extents
/// taken from `nodes`. `sample_rank` aligns with `bag_row` (regression only)
/// and records each sample's response rank for quantile estimation.
/// `weight` packs, for classification, one row of `ctg_width` census
/// proportions per leaf, in node order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafStore {
    pub leaf_origin: Vec<u32>,
    pub sample_origin: Vec<u32>,
    pub nodes: Vec<LeafNode>,
    pub bag_row: Vec<BagRow>,
    pub sample_rank: Vec<u32>,
    pub weight: Vec<f64>,
}

// =============================================================================
// ForestBundle
// =============================================================================

/// Response-specific bundle metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskMeta {
    /// Regression: the training response sorted ascending (distinct values),
    /// indexed by the ranks in [`LeafStore::sample_rank`].
    Regression { y_ranked: Vec<f64> },
    /// Classification with `ctg_width` categories.
    Classification { ctg_width: u32 },
}

/// Packed persistent forest.
///
/// Three aligned node vectors of length `forest_size`: `pred_idx` (splitting
/// predictor for nonterminals, leaf category or `-1` for terminals),
/// `split_val` (numeric cut or factor-bit offset for nonterminals, leaf
/// score for terminals) and `lh_bump` (distance to the left child; zero iff
/// terminal, right child at `lh_bump + 1`). Tree `t` occupies
/// `origin[t]..origin[t] + tree_len(t)` and its factor bits start at
/// `fac_origin[t]` in the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestBundle {
    pub n_row: u32,
    pub n_pred_num: u32,
    pub n_pred_fac: u32,

    pub origin: Vec<u32>,
    pub fac_origin: Vec<u32>,
    pub pred_idx: Vec<i32>,
    pub split_val: Vec<f64>,
    pub lh_bump: Vec<i32>,
    pub fac_split_bits: BitVec,

    pub in_bag: BagMatrix,
    /// Gain contribution per predictor, scaled by `1 / n_tree`.
    pub pred_info: Vec<f64>,

    pub leaf: LeafStore,
    pub task: TaskMeta,
}

/// Structural validation errors for [`ForestBundle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleValidationError {
    #[error("bundle has no trees")]
    NoTrees,
    #[error("node vectors disagree on forest size")]
    NodeVectorMismatch,
    #[error("tree {tree}: origin {origin} out of order or out of bounds")]
    BadOrigin { tree: usize, origin: u32 },
    #[error("node {node}: left-hand bump {bump} escapes its tree")]
    BumpOutOfTree { node: usize, bump: i32 },
    #[error("node {node}: negative left-hand bump {bump}")]
    NegativeBump { node: usize, bump: i32 },
    #[error("leaf store misaligned with node vectors")]
    LeafMismatch,
}

impl ForestBundle {
    #[inline]
    pub fn n_tree(&self) -> usize {
        self.origin.len()
    }

    #[inline]
    pub fn n_pred(&self) -> usize {
        (self.n_pred_num + self.n_pred_fac) as usize
    }

    #[inline]
    pub fn forest_size(&self) -> usize {
        self.pred_idx.len()
    }

    /// Node range of tree `t` within the packed vectors.
    #[inline]
    pub fn tree_range(&self, tree: usize) -> std::ops::Range<usize> {
        let start = self.origin[tree] as usize;
        let end = if tree + 1 < self.origin.len() {
            self.origin[tree + 1] as usize
        } else {
            self.forest_size()
        };
        start..end
    }

    /// Sample range of tree `t` within the leaf store.
    #[inline]
    pub fn sample_range(&self, tree: usize) -> std::ops::Range<usize> {
        let start = self.leaf.sample_origin[tree] as usize;
        let end = if tree + 1 < self.leaf.sample_origin.len() {
            self.leaf.sample_origin[tree + 1] as usize
        } else {
            self.leaf.bag_row.len()
        };
        start..end
    }

    /// Factor-block index of predictor `pred`, or `None` for numeric.
    #[inline]
    pub fn fac_idx(&self, pred: usize) -> Option<usize> {
        if pred < self.n_pred_num as usize {
            None
        } else {
            Some(pred - self.n_pred_num as usize)
        }
    }

    /// Validate packing invariants. Intended for tests and load-time checks.
    pub fn validate(&self) -> Result<(), BundleValidationError> {
        if self.origin.is_empty() {
            return Err(BundleValidationError::NoTrees);
        }
        let size = self.forest_size();
        if self.split_val.len() != size || self.lh_bump.len() != size {
            return Err(BundleValidationError::NodeVectorMismatch);
        }
        if self.leaf.nodes.len() != size {
            return Err(BundleValidationError::LeafMismatch);
        }
        if matches!(self.task, TaskMeta::Regression { .. })
            && self.leaf.sample_rank.len() != self.leaf.bag_row.len()
        {
            return Err(BundleValidationError::LeafMismatch);
        }

        let mut prev = 0u32;
        for (tree, &origin) in self.origin.iter().enumerate() {
            if origin as usize > size || (tree > 0 && origin < prev) {
                return Err(BundleValidationError::BadOrigin { tree, origin });
            }
            prev = origin;

            let range = self.tree_range(tree);
            let len = range.len();
            for idx in range.clone() {
                let bump = self.lh_bump[idx];
                if bump < 0 {
                    return Err(BundleValidationError::NegativeBump { node: idx, bump });
                }
                if bump > 0 {
                    let local = idx - range.start;
                    if local + bump as usize + 1 >= len {
                        return Err(BundleValidationError::BumpOutOfTree { node: idx, bump });
                    }
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Training-side assembly
// =============================================================================

/// A consumed pre-tree, ready to append to the packed vectors.
#[derive(Debug)]
pub(crate) struct ConsumedTree {
    pub pred_idx: Vec<i32>,
    pub split_val: Vec<f64>,
    pub lh_bump: Vec<i32>,
    pub split_bits: BitVec,
    pub fac_width: u32,
    pub leaf_nodes: Vec<LeafNode>,
    pub bag_row: Vec<BagRow>,
    pub sample_rank: Vec<u32>,
    pub weight: Vec<f64>,
    pub in_bag_words: Vec<u32>,
}

/// Accumulates consumed trees into a [`ForestBundle`].
pub(crate) struct ForestBuilder {
    n_row: usize,
    n_pred_num: u32,
    n_pred_fac: u32,
    n_tree: usize,

    origin: Vec<u32>,
    fac_origin: Vec<u32>,
    pred_idx: Vec<i32>,
    split_val: Vec<f64>,
    lh_bump: Vec<i32>,
    fac_split_bits: BitVec,
    in_bag: BagMatrix,

    leaf_origin: Vec<u32>,
    sample_origin: Vec<u32>,
    leaf_nodes: Vec<LeafNode>,
    bag_row: Vec<BagRow>,
    sample_rank: Vec<u32>,
    weight: Vec<f64>,
}

impl ForestBuilder {
    pub fn new(n_tree: usize, n_row: usize, n_pred_num: usize, n_pred_fac: usize, height_est: usize) -> Self {
        let reserve = (n_tree as f64 * height_est as f64 * SLOP_FACTOR) as usize;
        Self {
            n_row,
            n_pred_num: n_pred_num as u32,
            n_pred_fac: n_pred_fac as u32,
            n_tree,
            origin: Vec::with_capacity(n_tree),
            fac_origin: Vec::with_capacity(n_tree),
            pred_idx: Vec::with_capacity(reserve),
            split_val: Vec::with_capacity(reserve),
            lh_bump: Vec::with_capacity(reserve),
            fac_split_bits: BitVec::new(),
            in_bag: BagMatrix::new(n_tree, n_row),
            leaf_origin: Vec::with_capacity(n_tree),
            sample_origin: Vec::with_capacity(n_tree),
            leaf_nodes: Vec::with_capacity(reserve),
            bag_row: Vec::new(),
            sample_rank: Vec::new(),
            weight: Vec::new(),
        }
    }

    /// Append one consumed tree at the next origin.
    pub fn push_tree(&mut self, tree: ConsumedTree) {
        debug_assert!(self.origin.len() < self.n_tree, "all requested trees built");
        let tree_num = self.origin.len();
        self.origin.push(self.pred_idx.len() as u32);
        self.leaf_origin.push(self.leaf_nodes.len() as u32);
        self.sample_origin.push(self.bag_row.len() as u32);
        self.fac_origin.push(self.fac_split_bits.len() as u32);

        self.pred_idx.extend_from_slice(&tree.pred_idx);
        self.split_val.extend_from_slice(&tree.split_val);
        self.lh_bump.extend_from_slice(&tree.lh_bump);
        self.fac_split_bits
            .append(&tree.split_bits, tree.fac_width as usize);
        self.in_bag.set_tree(tree_num, &tree.in_bag_words);

        self.leaf_nodes.extend_from_slice(&tree.leaf_nodes);
        self.bag_row.extend_from_slice(&tree.bag_row);
        self.sample_rank.extend_from_slice(&tree.sample_rank);
        self.weight.extend_from_slice(&tree.weight);
    }

    /// Trim and seal the bundle. `pred_info` arrives unscaled and is divided
    /// by the tree count here.
    pub fn finish(self, mut pred_info: Vec<f64>, task: TaskMeta) -> ForestBundle {
        debug_assert_eq!(
            self.origin.len(),
            self.n_tree,
            "tree count shortfall is a training failure, not a bundle"
        );
        for info in &mut pred_info {
            *info /= self.n_tree as f64;
        }

        let mut pred_idx = self.pred_idx;
        let mut split_val = self.split_val;
        let mut lh_bump = self.lh_bump;
        pred_idx.shrink_to_fit();
        split_val.shrink_to_fit();
        lh_bump.shrink_to_fit();

        ForestBundle {
            n_row: self.n_row as u32,
            n_pred_num: self.n_pred_num,
            n_pred_fac: self.n_pred_fac,
            origin: self.origin,
            fac_origin: self.fac_origin,
            pred_idx,
            split_val,
            lh_bump,
            fac_split_bits: self.fac_split_bits,
            in_bag: self.in_bag,
            pred_info,
            leaf: LeafStore {
                leaf_origin: self.leaf_origin,
                sample_origin: self.sample_origin,
                nodes: self.leaf_nodes,
                bag_row: self.bag_row,
                sample_rank: self.sample_rank,
                weight: self.weight,
            },
            task,
        }
    }
}
