//! Forest walker, vote aggregation and out-of-bag validation.

use ndarray::Array2;
use thiserror::Error;

use crate::data::PredictorValues;
use crate::repr::{ForestBundle, TaskMeta};
use crate::utils::Parallelism;

/// Errors raised at the prediction entry points.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    #[error("bundle expects {expected_num} numeric and {expected_fac} factor predictors, got {got_num} and {got_fac}")]
    ShapeMismatch {
        expected_num: usize,
        expected_fac: usize,
        got_num: usize,
        got_fac: usize,
    },
    #[error("bagged prediction needs the training rows: expected {expected}, got {got}")]
    RowCountForBag { expected: usize, got: usize },
    #[error("response length {got} does not match {expected} rows")]
    ResponseLen { expected: usize, got: usize },
    #[error("bundle was not trained for regression")]
    NotRegression,
    #[error("bundle was not trained for classification")]
    NotClassification,
    #[error("quantile {0} outside [0, 1]")]
    InvalidQuantile(f64),
}

/// Leaf sentinel for a tree skipped under bagged prediction.
pub(crate) const LEAF_SKIPPED: i32 = -1;

fn check_shape(bundle: &ForestBundle, values: &PredictorValues<'_>) -> Result<(), PredictError> {
    if values.n_pred_num() != bundle.n_pred_num as usize
        || values.n_pred_fac() != bundle.n_pred_fac as usize
    {
        return Err(PredictError::ShapeMismatch {
            expected_num: bundle.n_pred_num as usize,
            expected_fac: bundle.n_pred_fac as usize,
            got_num: values.n_pred_num(),
            got_fac: values.n_pred_fac(),
        });
    }
    Ok(())
}

fn check_bag(
    bundle: &ForestBundle,
    values: &PredictorValues<'_>,
    use_bag: bool,
) -> Result<(), PredictError> {
    if use_bag && values.n_row() != bundle.n_row as usize {
        return Err(PredictError::RowCountForBag {
            expected: bundle.n_row as usize,
            got: values.n_row(),
        });
    }
    Ok(())
}

/// Walk one tree for one row; returns the tree-local leaf index.
pub(crate) fn walk_tree(
    bundle: &ForestBundle,
    values: &PredictorValues<'_>,
    tree: usize,
    row: usize,
) -> usize {
    let range = bundle.tree_range(tree);
    let preds = &bundle.pred_idx[range.clone()];
    let vals = &bundle.split_val[range.clone()];
    let bumps = &bundle.lh_bump[range];
    let fac_base = bundle.fac_origin[tree] as usize;

    let mut idx = 0usize;
    loop {
        let bump = bumps[idx];
        if bump == 0 {
            return idx;
        }
        let pred = preds[idx] as usize;
        let go_left = match bundle.fac_idx(pred) {
            None => values.num_val(row, pred) <= vals[idx],
            Some(fac) => {
                let off = fac_base + vals[idx] as usize + values.fac_val(row, fac) as usize;
                bundle.fac_split_bits.get(off)
            }
        };
        idx += (if go_left { bump } else { bump + 1 }) as usize;
    }
}

/// Fill one row's per-tree leaves, with [`LEAF_SKIPPED`] for in-bag trees.
pub(crate) fn row_leaves(
    bundle: &ForestBundle,
    values: &PredictorValues<'_>,
    row: usize,
    use_bag: bool,
    leaves: &mut [i32],
) {
    for tree in 0..bundle.n_tree() {
        leaves[tree] = if use_bag && bundle.in_bag.get(tree, row) {
            LEAF_SKIPPED
        } else {
            walk_tree(bundle, values, tree, row) as i32
        };
    }
}

// =============================================================================
// Regression
// =============================================================================

/// Per-row mean leaf score across trees.
///
/// With `use_bag` the row's in-bag trees are skipped; a row every tree
/// bagged has no defined prediction and yields `None`.
pub fn predict_regression(
    bundle: &ForestBundle,
    values: &PredictorValues<'_>,
    use_bag: bool,
    parallelism: Parallelism,
) -> Result<Vec<Option<f64>>, PredictError> {
    check_shape(bundle, values)?;
    check_bag(bundle, values, use_bag)?;
    if !matches!(bundle.task, TaskMeta::Regression { .. }) {
        return Err(PredictError::NotRegression);
    }

    let n_tree = bundle.n_tree();
    let predictions = parallelism.maybe_par_map(0..values.n_row(), |row| {
        let mut leaves = vec![LEAF_SKIPPED; n_tree];
        row_leaves(bundle, values, row, use_bag, &mut leaves);

        let mut score = 0.0;
        let mut trees_seen = 0u32;
        for (tree, &leaf) in leaves.iter().enumerate() {
            if leaf >= 0 {
                score += bundle.split_val[bundle.origin[tree] as usize + leaf as usize];
                trees_seen += 1;
            }
        }
        if trees_seen == 0 {
            None
        } else {
            Some(score / f64::from(trees_seen))
        }
    });
    Ok(predictions)
}

/// Out-of-bag mean squared error against the training response.
///
/// Rows with no out-of-bag tree are excluded; `None` if every row is.
pub fn oob_mse(
    bundle: &ForestBundle,
    values: &PredictorValues<'_>,
    y: &[f64],
    parallelism: Parallelism,
) -> Result<Option<f64>, PredictError> {
    if y.len() != bundle.n_row as usize {
        return Err(PredictError::ResponseLen {
            expected: bundle.n_row as usize,
            got: y.len(),
        });
    }
    let predictions = predict_regression(bundle, values, true, parallelism)?;

    let mut sse = 0.0;
    let mut defined = 0usize;
    for (row, prediction) in predictions.iter().enumerate() {
        if let Some(estimate) = prediction {
            let err = estimate - y[row];
            sse += err * err;
            defined += 1;
        }
    }
    Ok(if defined == 0 {
        None
    } else {
        Some(sse / defined as f64)
    })
}

// =============================================================================
// Classification
// =============================================================================

/// Census votes and predicted categories.
#[derive(Debug, Clone, PartialEq)]
pub struct CtgPrediction {
    /// Winning category per row; `None` when no tree voted.
    pub y_pred: Vec<Option<u32>>,
    /// Vote counts, `[n_row, ctg_width]`.
    pub census: Array2<u32>,
}

/// Out-of-bag validation of a classification forest.
#[derive(Debug, Clone, PartialEq)]
pub struct CtgValidation {
    pub y_pred: Vec<Option<u32>>,
    /// `confusion[[actual, predicted]]` over rows with a defined prediction.
    pub confusion: Array2<u32>,
    /// Mispredict rate per actual category; zero for categories never seen.
    pub per_class_error: Vec<f64>,
    /// Overall mispredict rate over defined rows.
    pub oob_error: f64,
}

/// Vote across trees: each tree's leaf category increments the row's census;
/// the argmax wins, lowest category on ties.
pub fn predict_classification(
    bundle: &ForestBundle,
    values: &PredictorValues<'_>,
    use_bag: bool,
    parallelism: Parallelism,
) -> Result<CtgPrediction, PredictError> {
    check_shape(bundle, values)?;
    check_bag(bundle, values, use_bag)?;
    let ctg_width = match bundle.task {
        TaskMeta::Classification { ctg_width } => ctg_width as usize,
        TaskMeta::Regression { .. } => return Err(PredictError::NotClassification),
    };

    let n_row = values.n_row();
    let n_tree = bundle.n_tree();
    let rows = parallelism.maybe_par_map(0..n_row, |row| {
        let mut census_row = vec![0u32; ctg_width];
        for tree in 0..n_tree {
            if use_bag && bundle.in_bag.get(tree, row) {
                continue;
            }
            let leaf = walk_tree(bundle, values, tree, row);
            let ctg = bundle.split_val[bundle.origin[tree] as usize + leaf] as usize;
            census_row[ctg] += 1;
        }
        let y = vote(&census_row);
        (census_row, y)
    });

    let mut census = Array2::zeros((n_row, ctg_width));
    let mut y_pred = Vec::with_capacity(n_row);
    for (row, (census_row, y)) in rows.into_iter().enumerate() {
        for (ctg, &count) in census_row.iter().enumerate() {
            census[[row, ctg]] = count;
        }
        y_pred.push(y);
    }
    Ok(CtgPrediction { y_pred, census })
}

/// Out-of-bag confusion matrix and per-class error rates.
pub fn validate_classification(
    bundle: &ForestBundle,
    values: &PredictorValues<'_>,
    y_ctg: &[u32],
    parallelism: Parallelism,
) -> Result<CtgValidation, PredictError> {
    if y_ctg.len() != bundle.n_row as usize {
        return Err(PredictError::ResponseLen {
            expected: bundle.n_row as usize,
            got: y_ctg.len(),
        });
    }
    let prediction = predict_classification(bundle, values, true, parallelism)?;
    let ctg_width = prediction.census.ncols();

    let mut confusion = Array2::zeros((ctg_width, ctg_width));
    for (row, y) in prediction.y_pred.iter().enumerate() {
        if let Some(predicted) = y {
            confusion[[y_ctg[row] as usize, *predicted as usize]] += 1;
        }
    }

    let mut per_class_error = vec![0.0; ctg_width];
    let mut wrong_total = 0u32;
    let mut total = 0u32;
    for actual in 0..ctg_width {
        let mut wrong = 0u32;
        let mut right = 0u32;
        for predicted in 0..ctg_width {
            let count = confusion[[actual, predicted]];
            if predicted == actual {
                right += count;
            } else {
                wrong += count;
            }
        }
        if wrong + right > 0 {
            per_class_error[actual] = f64::from(wrong) / f64::from(wrong + right);
        }
        wrong_total += wrong;
        total += wrong + right;
    }
    let oob_error = if total > 0 {
        f64::from(wrong_total) / f64::from(total)
    } else {
        0.0
    };

    Ok(CtgValidation {
        y_pred: prediction.y_pred,
        confusion,
        per_class_error,
        oob_error,
    })
}

/// Census argmax; `None` when no tree voted. Ties resolve to the lowest
/// category code.
fn vote(census_row: &[u32]) -> Option<u32> {
    let mut arg_max = None;
    let mut pop_max = 0u32;
    for (ctg, &count) in census_row.iter().enumerate() {
        if count > pop_max {
            pop_max = count;
            arg_max = Some(ctg as u32);
        }
    }
    arg_max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PredictorFrame;
    use crate::training::{train_classification, train_regression, TrainConfig};
    use ndarray::array;

    fn config(n_tree: u32) -> TrainConfig {
        TrainConfig::builder()
            .n_tree(n_tree)
            .n_threads(1)
            .seed(99)
            .build()
            .unwrap()
    }

    #[test]
    fn vote_ties_prefer_lowest_category() {
        assert_eq!(vote(&[3, 3, 1]), Some(0));
        assert_eq!(vote(&[1, 4, 4]), Some(1));
        assert_eq!(vote(&[0, 0, 0]), None);
    }

    #[test]
    fn regression_walk_matches_training_scores() {
        let num = array![[0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 13.0]];
        let frame = PredictorFrame::numeric(num.view()).unwrap();
        let y = vec![1.0, 1.0, 1.0, 1.0, 9.0, 9.0, 9.0, 9.0];
        let bundle = train_regression(&frame, y, config(20)).unwrap();

        let values = PredictorValues::numeric(num.view());
        let predictions =
            predict_regression(&bundle, &values, false, Parallelism::Sequential).unwrap();
        for (row, p) in predictions.iter().enumerate() {
            let expect = if row < 4 { 1.0 } else { 9.0 };
            assert!((p.unwrap() - expect).abs() < 1e-9, "row {}: {:?}", row, p);
        }
    }

    #[test]
    fn bagged_prediction_skips_in_bag_trees() {
        let num = array![[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]];
        let frame = PredictorFrame::numeric(num.view()).unwrap();
        let y = vec![0.0, 0.0, 0.0, 4.0, 4.0, 4.0];
        let bundle = train_regression(&frame, y, config(30)).unwrap();

        let values = PredictorValues::numeric(num.view());
        let mut leaves = vec![0i32; bundle.n_tree()];
        for row in 0..6 {
            row_leaves(&bundle, &values, row, true, &mut leaves);
            for (tree, &leaf) in leaves.iter().enumerate() {
                assert_eq!(leaf == LEAF_SKIPPED, bundle.in_bag.get(tree, row));
            }
        }
    }

    #[test]
    fn classification_votes_recover_labels() {
        let num = array![[0.0, 0.5, 1.0, 5.0, 5.5, 6.0, 10.0, 10.5, 11.0]];
        let frame = PredictorFrame::numeric(num.view()).unwrap();
        let y_ctg = vec![0, 0, 0, 1, 1, 1, 2, 2, 2];
        let bundle = train_classification(&frame, y_ctg.clone(), 3, None, config(40)).unwrap();

        let values = PredictorValues::numeric(num.view());
        let prediction =
            predict_classification(&bundle, &values, false, Parallelism::Sequential).unwrap();
        for (row, &expect) in y_ctg.iter().enumerate() {
            assert_eq!(prediction.y_pred[row], Some(expect), "row {}", row);
        }
        // Unbagged prediction: every tree votes.
        for row in 0..9 {
            let votes: u32 = (0..3).map(|c| prediction.census[[row, c]]).sum();
            assert_eq!(votes as usize, bundle.n_tree());
        }
    }

    #[test]
    fn task_kind_is_enforced() {
        let num = array![[0.0, 1.0, 2.0, 3.0]];
        let frame = PredictorFrame::numeric(num.view()).unwrap();
        let bundle = train_regression(&frame, vec![0.0, 1.0, 2.0, 3.0], config(3)).unwrap();

        let values = PredictorValues::numeric(num.view());
        assert_eq!(
            predict_classification(&bundle, &values, false, Parallelism::Sequential).unwrap_err(),
            PredictError::NotClassification
        );
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let num = array![[0.0, 1.0, 2.0, 3.0]];
        let frame = PredictorFrame::numeric(num.view()).unwrap();
        let bundle = train_regression(&frame, vec![0.0, 1.0, 2.0, 3.0], config(3)).unwrap();

        let wide = array![[0.0, 1.0], [2.0, 3.0]];
        let values = PredictorValues::numeric(wide.view());
        assert!(matches!(
            predict_regression(&bundle, &values, false, Parallelism::Sequential),
            Err(PredictError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn parallel_prediction_matches_sequential() {
        let num = array![[3.0, 1.0, 4.0, 1.5, 9.0, 2.6, 5.3, 5.8]];
        let frame = PredictorFrame::numeric(num.view()).unwrap();
        let y = vec![1.0, 7.0, 2.0, 8.0, 3.0, 9.0, 4.0, 6.0];
        let bundle = train_regression(&frame, y, config(15)).unwrap();

        let values = PredictorValues::numeric(num.view());
        let seq = predict_regression(&bundle, &values, true, Parallelism::Sequential).unwrap();
        let par = predict_regression(&bundle, &values, true, Parallelism::Parallel).unwrap();
        assert_eq!(seq, par);
    }
}
