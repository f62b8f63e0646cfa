//! Raw observation view for prediction.

use ndarray::ArrayView2;

/// Feature-major view of prediction-time observations.
///
/// Unlike [`PredictorFrame`](super::PredictorFrame) this carries no rank
/// order; the prediction walker only compares raw values against stored
/// split points. Layouts match the frame: `[n_pred_num, n_row]` numeric and
/// `[n_pred_fac, n_row]` factor codes.
#[derive(Clone, Copy)]
pub struct PredictorValues<'a> {
    num: ArrayView2<'a, f64>,
    fac: ArrayView2<'a, u32>,
}

impl<'a> PredictorValues<'a> {
    /// Wrap numeric and factor blocks. Either may have zero columns.
    pub fn new(num: ArrayView2<'a, f64>, fac: ArrayView2<'a, u32>) -> Self {
        debug_assert!(
            num.nrows() == 0 || fac.nrows() == 0 || num.ncols() == fac.ncols(),
            "numeric and factor blocks must agree on row count"
        );
        Self { num, fac }
    }

    /// Wrap a numeric-only block.
    pub fn numeric(num: ArrayView2<'a, f64>) -> Self {
        Self {
            num,
            fac: ArrayView2::from_shape((0, num.ncols()), &[]).expect("empty factor block"),
        }
    }

    /// Wrap a factor-only block.
    pub fn factor(fac: ArrayView2<'a, u32>) -> Self {
        Self {
            num: ArrayView2::from_shape((0, fac.ncols()), &[]).expect("empty numeric block"),
            fac,
        }
    }

    #[inline]
    pub fn n_row(&self) -> usize {
        if self.num.nrows() > 0 {
            self.num.ncols()
        } else {
            self.fac.ncols()
        }
    }

    #[inline]
    pub fn n_pred_num(&self) -> usize {
        self.num.nrows()
    }

    #[inline]
    pub fn n_pred_fac(&self) -> usize {
        self.fac.nrows()
    }

    /// Numeric value of predictor `pred` (global index) at `row`.
    #[inline]
    pub fn num_val(&self, row: usize, pred: usize) -> f64 {
        self.num[[pred, row]]
    }

    /// Factor code of factor-block column `fac_idx` at `row`.
    #[inline]
    pub fn fac_val(&self, row: usize, fac_idx: usize) -> u32 {
        self.fac[[fac_idx, row]]
    }
}
