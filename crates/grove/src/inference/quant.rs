//! Quantile prediction from per-leaf rank multisets.
//!
//! During training every sample lands in the leaf store grouped by leaf,
//! carrying its response rank and multiplicity. For a given row the leaves
//! reached across trees therefore describe an empirical response
//! distribution; quantiles are read off its cumulative counts as a step
//! function (no interpolation) against the sorted training response.

use crate::data::PredictorValues;
use crate::repr::{ForestBundle, TaskMeta};
use crate::utils::Parallelism;

use super::predictor::{walk_tree, PredictError};

/// Requested quantiles of the per-row response distribution.
///
/// Returns one `Vec` of `quantiles.len()` values per row, or `None` for a
/// row with no contributing tree (all in-bag under `use_bag`). Regression
/// bundles only.
pub fn predict_quantiles(
    bundle: &ForestBundle,
    values: &PredictorValues<'_>,
    quantiles: &[f64],
    use_bag: bool,
    parallelism: Parallelism,
) -> Result<Vec<Option<Vec<f64>>>, PredictError> {
    let y_ranked = match &bundle.task {
        TaskMeta::Regression { y_ranked } => y_ranked.as_slice(),
        TaskMeta::Classification { .. } => return Err(PredictError::NotRegression),
    };
    for &q in quantiles {
        if !(0.0..=1.0).contains(&q) || q.is_nan() {
            return Err(PredictError::InvalidQuantile(q));
        }
    }
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
    if use_bag && values.n_row() != bundle.n_row as usize {
        return Err(PredictError::RowCountForBag {
            expected: bundle.n_row as usize,
            got: values.n_row(),
        });
    }

    // Per tree, the sample offset of each node: a prefix sum over extents.
    let n_tree = bundle.n_tree();
    let mut leaf_start: Vec<Vec<u32>> = Vec::with_capacity(n_tree);
    for tree in 0..n_tree {
        let range = bundle.tree_range(tree);
        let mut starts = Vec::with_capacity(range.len());
        let mut acc = 0u32;
        for idx in range {
            starts.push(acc);
            acc += bundle.leaf.nodes[idx].extent;
        }
        leaf_start.push(starts);
    }
    let leaf_start = &leaf_start;

    let n_rank = y_ranked.len();
    let rows = parallelism.maybe_par_map(0..values.n_row(), move |row| {
        let mut counts = vec![0u64; n_rank];
        let mut total = 0u64;
        for tree in 0..n_tree {
            if use_bag && bundle.in_bag.get(tree, row) {
                continue;
            }
            let leaf = walk_tree(bundle, values, tree, row);
            let node = bundle.origin[tree] as usize + leaf;
            let extent = bundle.leaf.nodes[node].extent as usize;
            let base = bundle.leaf.sample_origin[tree] as usize + leaf_start[tree][leaf] as usize;
            for offset in base..base + extent {
                let s_count = u64::from(bundle.leaf.bag_row[offset].s_count);
                counts[bundle.leaf.sample_rank[offset] as usize] += s_count;
                total += s_count;
            }
        }
        if total == 0 {
            return None;
        }

        let estimates = quantiles
            .iter()
            .map(|&q| {
                let threshold = q * total as f64;
                let mut cumulative = 0u64;
                for (rank, &count) in counts.iter().enumerate() {
                    cumulative += count;
                    if cumulative as f64 >= threshold {
                        return y_ranked[rank];
                    }
                }
                y_ranked[n_rank - 1]
            })
            .collect();
        Some(estimates)
    });
    Ok(rows)
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
            .seed(4)
            .build()
            .unwrap()
    }

    #[test]
    fn quantiles_bracket_the_leaf_distribution() {
        // Two clean clusters: low rows respond near 0, high rows near 10.
        let num = array![[0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 13.0]];
        let frame = PredictorFrame::numeric(num.view()).unwrap();
        let y = vec![0.0, 0.2, 0.4, 0.6, 10.0, 10.2, 10.4, 10.6];
        let bundle = train_regression(&frame, y, config(25)).unwrap();

        let values = PredictorValues::numeric(num.view());
        let rows = predict_quantiles(
            &bundle,
            &values,
            &[0.1, 0.5, 0.9],
            false,
            Parallelism::Sequential,
        )
        .unwrap();

        for row in 0..4 {
            let qs = rows[row].as_ref().unwrap();
            assert!(qs.iter().all(|&v| v <= 0.6), "row {}: {:?}", row, qs);
            assert!(qs.windows(2).all(|w| w[0] <= w[1]));
        }
        for row in 4..8 {
            let qs = rows[row].as_ref().unwrap();
            assert!(qs.iter().all(|&v| v >= 10.0), "row {}: {:?}", row, qs);
        }
    }

    #[test]
    fn median_of_degenerate_leaf_is_its_value() {
        let num = array![[0.5]];
        let frame = PredictorFrame::numeric(num.view()).unwrap();
        let cfg = TrainConfig::builder()
            .n_tree(3)
            .n_samp(1)
            .n_threads(1)
            .build()
            .unwrap();
        let bundle = train_regression(&frame, vec![7.5], cfg).unwrap();

        let values = PredictorValues::numeric(num.view());
        let rows =
            predict_quantiles(&bundle, &values, &[0.5], false, Parallelism::Sequential).unwrap();
        assert_eq!(rows[0], Some(vec![7.5]));
    }

    #[test]
    fn rejects_classification_bundles() {
        let num = array![[0.0, 1.0, 2.0, 3.0]];
        let frame = PredictorFrame::numeric(num.view()).unwrap();
        let bundle = train_classification(&frame, vec![0, 0, 1, 1], 2, None, config(3)).unwrap();

        let values = PredictorValues::numeric(num.view());
        assert_eq!(
            predict_quantiles(&bundle, &values, &[0.5], false, Parallelism::Sequential)
                .unwrap_err(),
            PredictError::NotRegression
        );
    }

    #[test]
    fn rejects_out_of_range_quantile() {
        let num = array![[0.0, 1.0, 2.0, 3.0]];
        let frame = PredictorFrame::numeric(num.view()).unwrap();
        let bundle = train_regression(&frame, vec![0.0, 1.0, 2.0, 3.0], config(3)).unwrap();

        let values = PredictorValues::numeric(num.view());
        assert_eq!(
            predict_quantiles(&bundle, &values, &[1.5], false, Parallelism::Sequential)
                .unwrap_err(),
            PredictError::InvalidQuantile(1.5)
        );
    }
}
