//! Immutable predictor column store with presorted ranks.

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

/// Errors raised while assembling a [`PredictorFrame`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    /// Neither numeric nor factor columns were supplied.
    #[error("frame has no predictor columns")]
    NoPredictors,
    /// Numeric and factor blocks disagree on the observation count.
    #[error("row count mismatch: numeric block has {num_rows}, factor block has {fac_rows}")]
    RowMismatch { num_rows: usize, fac_rows: usize },
    /// The frame has no observations.
    #[error("frame has no rows")]
    NoRows,
    /// Cardinality vector does not match the factor block.
    #[error("expected {expected} factor cardinalities, got {got}")]
    CardinalityLen { expected: usize, got: usize },
    /// A factor cardinality of zero admits no levels.
    #[error("factor predictor {pred} has zero cardinality")]
    ZeroCardinality { pred: usize },
    /// A factor code at or above its declared cardinality.
    #[error("factor predictor {pred} row {row}: code {code} >= cardinality {card}")]
    CodeOutOfRange {
        pred: usize,
        row: usize,
        code: u32,
        card: u32,
    },
    /// Non-finite numeric observation; the engine has no missing-value path.
    #[error("numeric predictor {pred} row {row} is not finite")]
    NonFinite { pred: usize, row: usize },
}

/// One entry of a column's presorted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedRow {
    pub row: u32,
    pub rank: u32,
}

/// Immutable column store shared read-only across a training session.
///
/// Holds `n_row x n_pred` observations split into numeric and factor blocks,
/// plus per-column presorted rank order. Ranks are stable: tied values
/// collapse to the same rank, so a column with `d` distinct values uses ranks
/// `0..d`. For factor columns the rank of an observation is its level code.
///
/// Storage is feature-major (`[n_pred_num, n_row]` / `[n_pred_fac, n_row]`)
/// so each column's observations are contiguous.
#[derive(Debug, Clone)]
pub struct PredictorFrame {
    n_row: usize,
    num: Array2<f64>,
    fac: Array2<u32>,
    card: Vec<u32>,
    /// Per predictor: presorted (row, rank), rank ascending, ties stable.
    rank2row: Vec<Vec<RankedRow>>,
    /// Per predictor: row -> rank.
    row2rank: Vec<Vec<u32>>,
    /// Per numeric predictor: rank -> observed value.
    rank_vals: Vec<Vec<f64>>,
}

impl PredictorFrame {
    /// Build a frame from feature-major numeric and factor blocks.
    ///
    /// `num` has shape `[n_pred_num, n_row]`, `fac` has `[n_pred_fac, n_row]`
    /// and `card` one cardinality per factor column. Either block may be
    /// empty (zero rows in the first dimension), but not both.
    ///
    /// Presorting happens here, once per session.
    pub fn new(
        num: ArrayView2<f64>,
        fac: ArrayView2<u32>,
        card: &[u32],
    ) -> Result<Self, FrameError> {
        let n_pred_num = num.nrows();
        let n_pred_fac = fac.nrows();
        if n_pred_num == 0 && n_pred_fac == 0 {
            return Err(FrameError::NoPredictors);
        }
        if n_pred_num > 0 && n_pred_fac > 0 && num.ncols() != fac.ncols() {
            return Err(FrameError::RowMismatch {
                num_rows: num.ncols(),
                fac_rows: fac.ncols(),
            });
        }
        let n_row = if n_pred_num > 0 { num.ncols() } else { fac.ncols() };
        if n_row == 0 {
            return Err(FrameError::NoRows);
        }
        if card.len() != n_pred_fac {
            return Err(FrameError::CardinalityLen {
                expected: n_pred_fac,
                got: card.len(),
            });
        }
        for (p, col) in num.outer_iter().enumerate() {
            for (row, &v) in col.iter().enumerate() {
                if !v.is_finite() {
                    return Err(FrameError::NonFinite { pred: p, row });
                }
            }
        }
        for (f, col) in fac.outer_iter().enumerate() {
            let c = card[f];
            if c == 0 {
                return Err(FrameError::ZeroCardinality { pred: n_pred_num + f });
            }
            for (row, &code) in col.iter().enumerate() {
                if code >= c {
                    return Err(FrameError::CodeOutOfRange {
                        pred: n_pred_num + f,
                        row,
                        code,
                        card: c,
                    });
                }
            }
        }

        // Own the blocks first: owned arrays are standard layout, so each
        // column is a contiguous slice regardless of the caller's view.
        let num = num.to_owned();
        let fac = fac.to_owned();

        let n_pred = n_pred_num + n_pred_fac;
        let mut rank2row = Vec::with_capacity(n_pred);
        let mut row2rank = Vec::with_capacity(n_pred);
        let mut rank_vals = Vec::with_capacity(n_pred_num);

        for col in num.outer_iter() {
            let (r2r, inv, vals) = presort_numeric(col.as_slice().expect("owned column"));
            rank2row.push(r2r);
            row2rank.push(inv);
            rank_vals.push(vals);
        }
        for col in fac.outer_iter() {
            let (r2r, inv) = presort_factor(col.as_slice().expect("owned column"));
            rank2row.push(r2r);
            row2rank.push(inv);
        }

        Ok(Self {
            n_row,
            num,
            fac,
            card: card.to_vec(),
            rank2row,
            row2rank,
            rank_vals,
        })
    }

    /// Build a frame from numeric columns only.
    pub fn numeric(num: ArrayView2<f64>) -> Result<Self, FrameError> {
        let empty = ArrayView2::from_shape((0, num.ncols()), &[]).expect("empty factor block");
        Self::new(num, empty, &[])
    }

    /// Build a frame from factor columns only.
    pub fn factor(fac: ArrayView2<u32>, card: &[u32]) -> Result<Self, FrameError> {
        let empty = ArrayView2::from_shape((0, fac.ncols()), &[]).expect("empty numeric block");
        Self::new(empty, fac, card)
    }

    #[inline]
    pub fn n_row(&self) -> usize {
        self.n_row
    }

    #[inline]
    pub fn n_pred(&self) -> usize {
        self.num.nrows() + self.fac.nrows()
    }

    #[inline]
    pub fn n_pred_num(&self) -> usize {
        self.num.nrows()
    }

    #[inline]
    pub fn n_pred_fac(&self) -> usize {
        self.fac.nrows()
    }

    /// Factor-block index of predictor `p`, or `None` for a numeric predictor.
    #[inline]
    pub fn fac_idx(&self, pred: usize) -> Option<usize> {
        let n_num = self.num.nrows();
        if pred < n_num {
            None
        } else {
            Some(pred - n_num)
        }
    }

    /// Numeric observation. `pred` must be a numeric predictor.
    #[inline]
    pub fn num_val(&self, row: usize, pred: usize) -> f64 {
        self.num[[pred, row]]
    }

    /// Factor code. `pred` must be a factor predictor.
    #[inline]
    pub fn fac_val(&self, row: usize, pred: usize) -> u32 {
        self.fac[[pred - self.num.nrows(), row]]
    }

    /// Cardinality of a factor predictor.
    #[inline]
    pub fn cardinality(&self, pred: usize) -> u32 {
        self.card[pred - self.num.nrows()]
    }

    /// Widest factor cardinality, or zero when the frame is all numeric.
    pub fn max_card(&self) -> u32 {
        self.card.iter().copied().max().unwrap_or(0)
    }

    /// `k`-th entry of predictor `p`'s presorted order.
    #[inline]
    pub fn ranked_row(&self, pred: usize, k: usize) -> RankedRow {
        self.rank2row[pred][k]
    }

    /// Rank of `row` within predictor `p`'s sort order.
    #[inline]
    pub fn rank_of(&self, pred: usize, row: usize) -> u32 {
        self.row2rank[pred][row]
    }

    /// Observed value at `rank` of a numeric predictor.
    #[inline]
    pub fn value_at_rank(&self, pred: usize, rank: u32) -> f64 {
        self.rank_vals[pred][rank as usize]
    }
}

/// Stable presort of a numeric column; ties collapse to equal rank.
fn presort_numeric(col: &[f64]) -> (Vec<RankedRow>, Vec<u32>, Vec<f64>) {
    let n = col.len();
    let mut order: Vec<u32> = (0..n as u32).collect();
    order.sort_by(|&a, &b| {
        col[a as usize]
            .partial_cmp(&col[b as usize])
            .expect("finite values")
    });

    let mut rank2row = Vec::with_capacity(n);
    let mut row2rank = vec![0u32; n];
    let mut rank_vals = Vec::new();
    let mut rank = 0u32;
    for (k, &row) in order.iter().enumerate() {
        let v = col[row as usize];
        if k > 0 && v != col[order[k - 1] as usize] {
            rank += 1;
        }
        if rank as usize == rank_vals.len() {
            rank_vals.push(v);
        }
        rank2row.push(RankedRow { row, rank });
        row2rank[row as usize] = rank;
    }
    (rank2row, row2rank, rank_vals)
}

/// Factor presort: the rank of an observation is its level code.
fn presort_factor(col: &[u32]) -> (Vec<RankedRow>, Vec<u32>) {
    let n = col.len();
    let mut order: Vec<u32> = (0..n as u32).collect();
    order.sort_by_key(|&r| col[r as usize]);

    let rank2row = order
        .iter()
        .map(|&row| RankedRow {
            row,
            rank: col[row as usize],
        })
        .collect();
    let row2rank = col.to_vec();
    (rank2row, row2rank)
}
