//! Packed forest representation.
//!
//! Training consumes each pre-tree into three aligned node vectors plus the
//! factor-split bit pool, the in-bag bit matrix, and the leaf store. The
//! result is a [`ForestBundle`]: a self-contained, serializable value that
//! the prediction walker consumes without further transformation.

mod bits;
mod forest;

pub use bits::{BagMatrix, BitVec};
pub use forest::{
    BagRow, BundleValidationError, ForestBundle, LeafNode, LeafStore, TaskMeta,
};
pub(crate) use forest::{ConsumedTree, ForestBuilder};
