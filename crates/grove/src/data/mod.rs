//! Observation handling for training and prediction.
//!
//! The training side consumes a [`PredictorFrame`]: an immutable column store
//! holding numeric and categorical predictor columns together with their
//! presorted rank order. Prediction consumes the lighter [`PredictorValues`]
//! view, which carries raw values only.
//!
//! # Predictor indexing
//!
//! Predictors are indexed `0..n_pred` with numeric columns first: predictor
//! `p` is numeric iff `p < n_pred_num`, otherwise it is the factor column
//! `p - n_pred_num`. [`PredictorFrame::fac_idx`] encodes this convention.

mod frame;
mod values;

pub use frame::{FrameError, PredictorFrame, RankedRow};
pub use values::PredictorValues;
