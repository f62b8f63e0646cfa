//! Training pipeline.
//!
//! The pipeline is level-synchronous within each tree:
//!
//! - `stage`: double-buffered per-predictor sample tuples, restaged level
//!   by level to mirror the current partition
//! - `splitsig` / `runs`: per-(node, predictor) split search, numeric
//!   ordered scans and categorical run packing, argmax dispatch
//! - `bottom`: the level coordinator driving search, replay and restaging
//! - `pretree`: the growable tree being built, consumed into the packed
//!   forest when its last level ends
//! - `trainer`: block-wise orchestration over all requested trees
//!
//! [`config`] and [`logger`] carry the session knobs and progress output.

mod bottom;
pub mod config;
mod logger;
mod pretree;
mod runs;
mod splitsig;
mod stage;
mod trainer;

pub use config::{ConfigError, TrainConfig};
pub use logger::{TrainingLogger, Verbosity};
pub use trainer::{train_classification, train_regression, TrainError, Trainer};
