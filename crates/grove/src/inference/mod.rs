//! Prediction over a packed forest.
//!
//! The walker descends the three packed node vectors directly: at each
//! nonterminal the left-hand bump is added for a left step, bump + 1 for a
//! right step, and a zero bump marks the leaf. The hot loop stays
//! monomorphic by branching locally on the predictor kind instead of
//! dispatching through a trait object.
//!
//! Prediction is embarrassingly parallel across rows: each row owns its
//! leaf vector and census slice.

mod predictor;
mod quant;

pub use predictor::{
    oob_mse, predict_classification, predict_regression, validate_classification,
    CtgPrediction, CtgValidation, PredictError,
};
pub use quant::predict_quantiles;
