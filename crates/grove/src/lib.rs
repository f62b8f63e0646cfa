//! grove: random forest training and prediction for tabular data.
//!
//! Trains an ensemble of decision trees over numeric and categorical
//! predictors using bootstrap sampling and random predictor subsets per
//! split, and packs the result into a compact columnar [`ForestBundle`]
//! suitable for out-of-bag validation, per-row prediction and quantile
//! regression.
//!
//! # Key Types
//!
//! - [`PredictorFrame`] - Immutable, presorted predictor columns
//! - [`Response`] - Regression or classification targets
//! - [`TrainConfig`] - Session configuration with builder and validation
//! - [`ForestBundle`] - The packed, serializable forest
//!
//! # Training
//!
//! ```
//! use grove::{train_regression, PredictorFrame, TrainConfig};
//! use ndarray::array;
//!
//! // Feature-major: one row per predictor.
//! let num = array![[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]];
//! let frame = PredictorFrame::numeric(num.view()).unwrap();
//! let config = TrainConfig::builder().n_tree(50).n_threads(1).build().unwrap();
//!
//! let bundle = train_regression(&frame, vec![0.0, 0.1, 0.2, 5.0, 5.1, 5.2], config).unwrap();
//! assert_eq!(bundle.n_tree(), 50);
//! ```
//!
//! # Prediction
//!
//! [`predict_regression`] and [`predict_classification`] walk the packed
//! forest per row; with `use_bag` they skip each row's in-bag trees, which
//! yields the out-of-bag estimates behind [`oob_mse`] and
//! [`validate_classification`]. [`predict_quantiles`] reads arbitrary
//! response quantiles off the leaf rank multisets recorded at training time.

pub mod data;
pub mod inference;
pub mod repr;
pub mod sampling;
pub mod testing;
pub mod training;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Data preparation
pub use data::{FrameError, PredictorFrame, PredictorValues};
pub use sampling::{Response, ResponseError};

// Training
pub use training::{
    train_classification, train_regression, ConfigError, TrainConfig, TrainError, Trainer,
    Verbosity,
};

// The packed forest
pub use repr::{BundleValidationError, ForestBundle, TaskMeta};

// Prediction
pub use inference::{
    oob_mse, predict_classification, predict_quantiles, predict_regression,
    validate_classification, CtgPrediction, CtgValidation, PredictError,
};

// Shared utilities
pub use utils::{run_with_threads, Parallelism};
