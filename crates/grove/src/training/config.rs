//! Training configuration with builder pattern.
//!
//! [`TrainConfig`] gathers every knob of a training session. It uses the
//! `bon` crate for builder generation with validation at build time; checks
//! that need the data shape (vector lengths, sample counts) run again at the
//! training entry, before any tree is built.
//!
//! # Example
//!
//! ```
//! use grove::TrainConfig;
//!
//! // All defaults
//! let config = TrainConfig::builder().build().unwrap();
//!
//! // Small forest, fixed predictor subsets, reproducible
//! let config = TrainConfig::builder()
//!     .n_tree(100)
//!     .pred_fixed(2)
//!     .with_replacement(false)
//!     .seed(7)
//!     .build()
//!     .unwrap();
//! ```

use bon::Builder;

use super::logger::Verbosity;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors reported at the training entry, before any tree is built.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Tree count must be at least 1.
    InvalidNTree,
    /// Block size must be at least 1.
    InvalidTrainBlock,
    /// Minimal node size must be at least 1.
    InvalidMinNode,
    /// Information ratio must be finite and non-negative.
    InvalidMinRatio(f64),
    /// Subset-enumeration cap must be at least 2.
    InvalidMaxRunWidth(u32),
    /// Predictor sampling probability outside `[0, 1]`.
    InvalidPredProb { pred: usize, value: f64 },
    /// Probability vector length does not match the predictor count.
    PredProbLen { expected: usize, got: usize },
    /// Monotone constraint must be -1, 0 or +1.
    InvalidRegMono { pred: usize, value: i8 },
    /// Constraint vector length does not match the predictor count.
    RegMonoLen { expected: usize, got: usize },
    /// Monotone constraints apply to regression only.
    RegMonoForClassification,
    /// Sample weights must be positive and finite.
    InvalidSampleWeight { row: usize },
    /// Weight vector length does not match the row count.
    SampleWeightLen { expected: usize, got: usize },
    /// Without replacement, at most `n_row` samples can be drawn.
    SampleCountExceedsRows { n_samp: u32, n_row: usize },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNTree => write!(f, "n_tree must be at least 1"),
            Self::InvalidTrainBlock => write!(f, "train_block must be at least 1"),
            Self::InvalidMinNode => write!(f, "min_node must be at least 1"),
            Self::InvalidMinRatio(v) => {
                write!(f, "min_ratio must be finite and non-negative, got {}", v)
            }
            Self::InvalidMaxRunWidth(v) => {
                write!(f, "max_run_width must be at least 2, got {}", v)
            }
            Self::InvalidPredProb { pred, value } => {
                write!(f, "pred_prob[{}] must be in [0, 1], got {}", pred, value)
            }
            Self::PredProbLen { expected, got } => {
                write!(f, "pred_prob must have {} entries, got {}", expected, got)
            }
            Self::InvalidRegMono { pred, value } => {
                write!(f, "reg_mono[{}] must be -1, 0 or +1, got {}", pred, value)
            }
            Self::RegMonoLen { expected, got } => {
                write!(f, "reg_mono must have {} entries, got {}", expected, got)
            }
            Self::RegMonoForClassification => {
                write!(f, "monotone constraints apply to regression only")
            }
            Self::InvalidSampleWeight { row } => {
                write!(f, "sample_weight[{}] must be positive and finite", row)
            }
            Self::SampleWeightLen { expected, got } => {
                write!(f, "sample_weight must have {} entries, got {}", expected, got)
            }
            Self::SampleCountExceedsRows { n_samp, n_row } => write!(
                f,
                "cannot draw {} samples from {} rows without replacement",
                n_samp, n_row
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

// =============================================================================
// TrainConfig
// =============================================================================

/// Configuration of a training session.
///
/// Defaults follow random-forest convention: 500 bootstrap trees drawn with
/// replacement, unbounded depth, and (when neither `pred_fixed` nor
/// `pred_prob` is given) per-node predictor subsets of `sqrt(n_pred)` for
/// classification and `n_pred / 3` for regression.
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct TrainConfig {
    // === Forest shape ===
    /// Number of trees. Default: 500.
    #[builder(default = 500)]
    pub n_tree: u32,

    /// Samples drawn per tree. 0 = one per row.
    #[builder(default = 0)]
    pub n_samp: u32,

    /// Draw with replacement (bootstrap). Default: true.
    #[builder(default = true)]
    pub with_replacement: bool,

    /// Trees consumed into the forest per block. Default: 64.
    #[builder(default = 64)]
    pub train_block: u32,

    // === Splitting policy ===
    /// Minimal index count on either side of a split. Default: 2.
    #[builder(default = 2)]
    pub min_node: u32,

    /// A node splits only when the best gain exceeds
    /// `parent_info * min_ratio`. Default: 0.0.
    #[builder(default = 0.0)]
    pub min_ratio: f64,

    /// Level cap; 0 = unbounded. Default: 0.
    #[builder(default = 0)]
    pub tot_levels: u32,

    /// Factor runs eligible for exhaustive subset enumeration; wider factors
    /// fall back to the mean-ordered scan. Default: 10.
    #[builder(default = 10)]
    pub max_run_width: u32,

    // === Predictor sampling ===
    /// Predictors evaluated per node; 0 = use `pred_prob` (or the
    /// task-dependent default subset size). Default: 0.
    #[builder(default = 0)]
    pub pred_fixed: u32,

    /// Per-predictor Bernoulli sampling probability, one entry per predictor.
    pub pred_prob: Option<Vec<f64>>,

    // === Constraints and weights ===
    /// Monotone constraints (+1 non-decreasing, -1 non-increasing, 0 free),
    /// one entry per predictor. Regression only.
    pub reg_mono: Option<Vec<i8>>,

    /// Per-row sampling weights.
    pub sample_weight: Option<Vec<f64>>,

    // === Reproducibility, logging, resources ===
    /// Random seed. Default: 42.
    #[builder(default = 42)]
    pub seed: u64,

    /// Verbosity level. Default: `Silent`.
    #[builder(default)]
    pub verbosity: Verbosity,

    /// Thread count: 0 = auto, 1 = sequential, n = exactly n. Default: 0.
    #[builder(default = 0)]
    pub n_threads: usize,
}

/// Custom finishing function that validates the config.
impl<S: train_config_builder::IsComplete> TrainConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for any shape-independent violation:
    /// zero trees, zero block size, negative `min_ratio`, probabilities
    /// outside `[0, 1]`, constraints outside `{-1, 0, +1}`.
    pub fn build(self) -> Result<TrainConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl TrainConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.n_tree == 0 {
            return Err(ConfigError::InvalidNTree);
        }
        if self.train_block == 0 {
            return Err(ConfigError::InvalidTrainBlock);
        }
        if self.min_node == 0 {
            return Err(ConfigError::InvalidMinNode);
        }
        if !self.min_ratio.is_finite() || self.min_ratio < 0.0 {
            return Err(ConfigError::InvalidMinRatio(self.min_ratio));
        }
        if self.max_run_width < 2 {
            return Err(ConfigError::InvalidMaxRunWidth(self.max_run_width));
        }
        if let Some(probs) = &self.pred_prob {
            for (pred, &p) in probs.iter().enumerate() {
                if !(0.0..=1.0).contains(&p) {
                    return Err(ConfigError::InvalidPredProb { pred, value: p });
                }
            }
        }
        if let Some(mono) = &self.reg_mono {
            for (pred, &m) in mono.iter().enumerate() {
                if !(-1..=1).contains(&m) {
                    return Err(ConfigError::InvalidRegMono { pred, value: m });
                }
            }
        }
        if let Some(weights) = &self.sample_weight {
            for (row, &w) in weights.iter().enumerate() {
                if !w.is_finite() || w <= 0.0 {
                    return Err(ConfigError::InvalidSampleWeight { row });
                }
            }
        }
        Ok(())
    }

    /// Shape-dependent validation, run at the training entry.
    pub(crate) fn validate_shape(
        &self,
        n_row: usize,
        n_pred: usize,
        is_regression: bool,
    ) -> Result<(), ConfigError> {
        if let Some(probs) = &self.pred_prob {
            if probs.len() != n_pred {
                return Err(ConfigError::PredProbLen {
                    expected: n_pred,
                    got: probs.len(),
                });
            }
        }
        if let Some(mono) = &self.reg_mono {
            if !is_regression {
                return Err(ConfigError::RegMonoForClassification);
            }
            if mono.len() != n_pred {
                return Err(ConfigError::RegMonoLen {
                    expected: n_pred,
                    got: mono.len(),
                });
            }
        }
        if let Some(weights) = &self.sample_weight {
            if weights.len() != n_row {
                return Err(ConfigError::SampleWeightLen {
                    expected: n_row,
                    got: weights.len(),
                });
            }
        }
        let n_samp = self.resolved_n_samp(n_row);
        if !self.with_replacement && n_samp > n_row {
            return Err(ConfigError::SampleCountExceedsRows {
                n_samp: n_samp as u32,
                n_row,
            });
        }
        Ok(())
    }

    /// Samples drawn per tree after resolving the 0 = `n_row` default.
    #[inline]
    pub(crate) fn resolved_n_samp(&self, n_row: usize) -> usize {
        if self.n_samp == 0 {
            n_row
        } else {
            self.n_samp as usize
        }
    }

    /// Per-node predictor sampling plan. `pred_fixed` wins when set;
    /// otherwise an explicit `pred_prob`; otherwise the task default subset.
    pub(crate) fn pred_sampling(&self, n_pred: usize, is_regression: bool) -> PredSampling {
        if self.pred_fixed > 0 {
            PredSampling::Fixed((self.pred_fixed as usize).min(n_pred))
        } else if let Some(probs) = &self.pred_prob {
            PredSampling::Prob(probs.clone())
        } else {
            let k = if is_regression {
                (n_pred / 3).max(1)
            } else {
                (n_pred as f64).sqrt().ceil() as usize
            };
            PredSampling::Fixed(k.min(n_pred))
        }
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self::builder().build().expect("default config is valid")
    }
}

/// Resolved predictor-sampling plan.
#[derive(Debug, Clone)]
pub(crate) enum PredSampling {
    /// Draw exactly `k` predictors per node, without replacement.
    Fixed(usize),
    /// Bernoulli draw per predictor; at least one candidate is retained.
    Prob(Vec<f64>),
}

// =============================================================================
// Tests
// =============================================================================
