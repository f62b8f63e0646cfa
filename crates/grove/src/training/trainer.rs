//! Training orchestration.
//!
//! [`Trainer::train`] drives the whole pipeline: validate, then per tree
//! sample -> stage -> level loop -> consume, in blocks of `train_block`
//! trees. Either every requested tree lands in the bundle or the call fails
//! before the first tree; there is no silent shortfall.

use thiserror::Error;

use crate::data::{FrameError, PredictorFrame};
use crate::repr::{ForestBuilder, ForestBundle, TaskMeta};
use crate::sampling::{Response, ResponseError, Sampler, UniformSource};
use crate::utils::run_with_threads;
use crate::utils::Parallelism;

use super::bottom::Bottom;
use super::config::{ConfigError, TrainConfig};
use super::logger::TrainingLogger;
use super::pretree::HeightEst;
use super::splitsig::SplitParams;
use super::stage::SamplePred;

/// Errors reported at the training entry; no tree is built past any of them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("predictor frame: {0}")]
    Frame(#[from] FrameError),
    #[error("response: {0}")]
    Response(#[from] ResponseError),
    #[error("frame has {frame_rows} rows but response has {response_rows}")]
    RowMismatch {
        frame_rows: usize,
        response_rows: usize,
    },
}

/// Orchestrates a training session over one frame and response.
pub struct Trainer {
    config: TrainConfig,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Train the forest. Consumes the thread-count setting to install a
    /// rayon pool for the session; all parallelism below is within a single
    /// tree (split search, restaging), never across trees.
    pub fn train(
        &self,
        frame: &PredictorFrame,
        response: &Response,
    ) -> Result<ForestBundle, TrainError> {
        if frame.n_row() != response.n_row() {
            return Err(TrainError::RowMismatch {
                frame_rows: frame.n_row(),
                response_rows: response.n_row(),
            });
        }
        self.config
            .validate_shape(frame.n_row(), frame.n_pred(), response.is_regression())?;

        run_with_threads(self.config.n_threads, |parallelism| {
            Ok(self.train_session(frame, response, parallelism))
        })
    }

    fn train_session(
        &self,
        frame: &PredictorFrame,
        response: &Response,
        parallelism: Parallelism,
    ) -> ForestBundle {
        let config = &self.config;
        let n_row = frame.n_row();
        let n_pred = frame.n_pred();
        let n_tree = config.n_tree as usize;
        let n_samp = config.resolved_n_samp(n_row);
        let ctg_width = response.ctg_width() as usize;

        let rank_data = response.rank_response();
        let row2rank = rank_data.as_ref().map(|(_, r2r)| r2r.as_slice());

        let sampler = Sampler::new(
            n_row,
            n_samp,
            config.with_replacement,
            config.sample_weight.as_deref(),
        );
        let mut rng = UniformSource::new(config.seed);

        let max_bag = n_samp.min(n_row);
        let mut sample_pred = SamplePred::new(n_pred, max_bag);
        let mut height_est = HeightEst::new(n_samp, config.min_node as usize);

        let split_params = SplitParams {
            min_node: config.min_node as usize,
            max_run_width: config.max_run_width as usize,
            ctg_width,
            reg_mono: config.reg_mono.as_deref(),
        };
        let mut bottom = Bottom::new(
            frame,
            split_params,
            config.min_ratio,
            config.tot_levels,
            config.pred_sampling(n_pred, response.is_regression()),
        );

        let mut builder = ForestBuilder::new(
            n_tree,
            n_row,
            frame.n_pred_num(),
            frame.n_pred_fac(),
            height_est.get(),
        );
        let mut pred_info = vec![0.0; n_pred];

        let mut logger = TrainingLogger::new(config.verbosity);
        logger.start_training(n_tree);

        let block_size = config.train_block as usize;
        let mut trees_done = 0usize;
        let mut forest_size = 0usize;
        while trees_done < n_tree {
            let block = block_size.min(n_tree - trees_done);

            let mut pt_block = Vec::with_capacity(block);
            for tree in 0..block {
                let bag = sampler.sample(response, &mut rng);
                sample_pred.stage(frame, &bag);
                let pretree = bottom.grow(
                    &mut sample_pred,
                    &bag,
                    height_est.get(),
                    &mut rng,
                    &mut pred_info,
                    parallelism,
                );
                height_est.refine(pretree.height());
                logger.log_tree(trees_done + tree, pretree.height(), bag.bag_count());
                pt_block.push((pretree, bag));
            }

            for (pretree, bag) in pt_block {
                forest_size += pretree.height();
                builder.push_tree(pretree.consume(&bag, ctg_width, row2rank));
            }
            trees_done += block;
            logger.log_block(trees_done, forest_size);
        }

        let task = match rank_data {
            Some((y_ranked, _)) => TaskMeta::Regression { y_ranked },
            None => TaskMeta::Classification {
                ctg_width: ctg_width as u32,
            },
        };
        let bundle = builder.finish(pred_info, task);
        logger.finish_training(bundle.forest_size());
        bundle
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Train a regression forest over `y`.
pub fn train_regression(
    frame: &PredictorFrame,
    y: Vec<f64>,
    config: TrainConfig,
) -> Result<ForestBundle, TrainError> {
    let response = Response::regression(y)?;
    Trainer::new(config).train(frame, &response)
}

/// Train a classification forest over category codes in `0..ctg_width`,
/// optionally proxy-weighted.
pub fn train_classification(
    frame: &PredictorFrame,
    y_ctg: Vec<u32>,
    ctg_width: u32,
    proxy: Option<Vec<f64>>,
    config: TrainConfig,
) -> Result<ForestBundle, TrainError> {
    let response = Response::classification(y_ctg, ctg_width, proxy)?;
    Trainer::new(config).train(frame, &response)
}
