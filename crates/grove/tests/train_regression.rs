//! End-to-end regression training scenarios.

use grove::testing::{linear_regression_targets, random_frame_data};
use grove::{
    oob_mse, predict_regression, PredictorFrame, PredictorValues, TrainConfig, Parallelism,
};
use ndarray::array;
use rstest::rstest;

#[rstest]
#[case(true, 200)]
#[case(false, 150)]
#[case(false, 200)]
fn sampling_modes_produce_full_forests(#[case] with_replacement: bool, #[case] n_samp: u32) {
    let features = random_frame_data(3, 200, 1, 0.0, 1.0);
    let y = linear_regression_targets(&features, 2, 0.1);
    let frame = PredictorFrame::numeric(features.view()).unwrap();

    let config = TrainConfig::builder()
        .n_tree(12)
        .n_samp(n_samp)
        .with_replacement(with_replacement)
        .n_threads(1)
        .seed(1)
        .build()
        .unwrap();
    let bundle = grove::train_regression(&frame, y, config).unwrap();

    assert_eq!(bundle.n_tree(), 12);
    assert!(bundle.validate().is_ok());
    for tree in 0..12 {
        let drawn: u32 = bundle
            .sample_range(tree)
            .map(|i| bundle.leaf.bag_row[i].s_count)
            .sum();
        assert_eq!(drawn, n_samp);
        if !with_replacement {
            assert_eq!(bundle.sample_range(tree).len(), n_samp as usize);
        }
    }
}

fn base_config(n_tree: u32, seed: u64) -> TrainConfig {
    TrainConfig::builder()
        .n_tree(n_tree)
        .n_threads(1)
        .seed(seed)
        .build()
        .unwrap()
}

/// Leaves of the subtree rooted at `local` (tree-local indices).
fn subtree_leaves(bundle: &grove::ForestBundle, tree: usize, local: usize) -> Vec<usize> {
    let range = bundle.tree_range(tree);
    let bumps = &bundle.lh_bump[range];
    let mut leaves = Vec::new();
    let mut stack = vec![local];
    while let Some(idx) = stack.pop() {
        let bump = bumps[idx] as usize;
        if bump == 0 {
            leaves.push(idx);
        } else {
            stack.push(idx + bump);
            stack.push(idx + bump + 1);
        }
    }
    leaves
}

/// Response mass and sample count of one leaf, from the leaf store.
fn leaf_mass(bundle: &grove::ForestBundle, tree: usize, leaf_local: usize) -> (f64, u64) {
    let node = bundle.origin[tree] as usize + leaf_local;
    let leaf = bundle.leaf.nodes[node];

    // Sample offset of the leaf: prefix of extents over earlier nodes.
    let range = bundle.tree_range(tree);
    let mut offset = bundle.leaf.sample_origin[tree] as u64;
    for idx in range.start..node {
        offset += u64::from(bundle.leaf.nodes[idx].extent);
    }
    let mut s_count = 0u64;
    for i in 0..leaf.extent as u64 {
        s_count += u64::from(bundle.leaf.bag_row[(offset + i) as usize].s_count);
    }
    (leaf.score * s_count as f64, s_count)
}

#[test]
fn synthetic_linear_signal_is_learned() {
    // y = 2 x0 + x1 + noise over ten predictors; only the first two matter.
    let features = random_frame_data(10, 1000, 31, 0.0, 1.0);
    let y = linear_regression_targets(&features, 32, 0.1);
    let frame = PredictorFrame::numeric(features.view()).unwrap();

    let bundle = grove::train_regression(&frame, y.clone(), base_config(60, 7)).unwrap();

    // In-bag fit approaches the noise floor.
    let values = PredictorValues::numeric(features.view());
    let fitted = predict_regression(&bundle, &values, false, Parallelism::Sequential).unwrap();
    let mse: f64 = fitted
        .iter()
        .zip(&y)
        .map(|(fit, &target)| {
            let err = fit.unwrap() - target;
            err * err
        })
        .sum::<f64>()
        / y.len() as f64;
    assert!(mse < 0.08, "in-bag MSE {} too far above the noise floor", mse);

    // Gain attribution follows the signal strengths.
    let info = &bundle.pred_info;
    assert!(info[0] > info[1], "pred_info: {:?}", info);
    let background = info[2..].iter().cloned().fold(0.0f64, f64::max);
    assert!(info[1] > background, "pred_info: {:?}", info);

    // Out-of-bag error stays in the same regime.
    let oob = oob_mse(&bundle, &values, &y, Parallelism::Sequential)
        .unwrap()
        .unwrap();
    assert!(oob < 0.2, "OOB MSE {}", oob);
}

#[test]
fn more_trees_do_not_degrade_oob() {
    let features = random_frame_data(5, 300, 41, 0.0, 1.0);
    let y = linear_regression_targets(&features, 42, 0.1);
    let frame = PredictorFrame::numeric(features.view()).unwrap();
    let values = PredictorValues::numeric(features.view());

    let few = grove::train_regression(&frame, y.clone(), base_config(25, 5)).unwrap();
    let many = grove::train_regression(&frame, y.clone(), base_config(100, 5)).unwrap();

    let oob_few = oob_mse(&few, &values, &y, Parallelism::Sequential)
        .unwrap()
        .unwrap();
    let oob_many = oob_mse(&many, &values, &y, Parallelism::Sequential)
        .unwrap()
        .unwrap();
    // Averaging over more i.i.d. trees keeps the error in the same band.
    assert!(
        oob_many <= oob_few * 1.25 + 0.01,
        "OOB rose from {} to {}",
        oob_few,
        oob_many
    );
}

#[test]
fn constant_predictor_contributes_nothing() {
    // Column 1 is constant: rank variance zero, no split is admissible.
    let features = array![
        [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        [4.2, 4.2, 4.2, 4.2, 4.2, 4.2, 4.2, 4.2],
    ];
    let frame = PredictorFrame::numeric(features.view()).unwrap();
    let y = vec![0.0, 0.2, 0.1, 0.3, 5.0, 5.2, 5.1, 5.3];

    let bundle = grove::train_regression(&frame, y, base_config(30, 3)).unwrap();
    assert_eq!(bundle.pred_info[1], 0.0);
    for (node, &pred) in bundle.pred_idx.iter().enumerate() {
        if bundle.lh_bump[node] != 0 {
            assert_eq!(pred, 0, "split on the constant predictor at node {}", node);
        }
    }
}

#[test]
fn in_bag_bit_iff_sampled() {
    let features = random_frame_data(3, 60, 51, 0.0, 1.0);
    let y = linear_regression_targets(&features, 52, 0.1);
    let frame = PredictorFrame::numeric(features.view()).unwrap();
    let bundle = grove::train_regression(&frame, y, base_config(12, 9)).unwrap();

    for tree in 0..bundle.n_tree() {
        let mut sampled = vec![false; 60];
        for i in bundle.sample_range(tree) {
            sampled[bundle.leaf.bag_row[i].row as usize] = true;
        }
        for row in 0..60 {
            assert_eq!(
                bundle.in_bag.get(tree, row),
                sampled[row],
                "tree {} row {}",
                tree,
                row
            );
        }
    }
}

#[test]
fn leaves_respect_min_node() {
    let features = random_frame_data(4, 200, 61, 0.0, 1.0);
    let y = linear_regression_targets(&features, 62, 0.2);
    let frame = PredictorFrame::numeric(features.view()).unwrap();

    let config = TrainConfig::builder()
        .n_tree(10)
        .min_node(5)
        .n_threads(1)
        .seed(8)
        .build()
        .unwrap();
    let bundle = grove::train_regression(&frame, y, config).unwrap();

    for (node, leaf) in bundle.leaf.nodes.iter().enumerate() {
        if bundle.lh_bump[node] == 0 {
            assert!(leaf.extent >= 5, "leaf {} has extent {}", node, leaf.extent);
        }
    }
}

#[test]
fn training_rows_replay_into_their_leaves() {
    // Consuming then walking reproduces the training partition: every in-bag
    // row must land in a leaf whose bag slice contains it.
    let features = random_frame_data(3, 80, 71, 0.0, 1.0);
    let y = linear_regression_targets(&features, 72, 0.1);
    let frame = PredictorFrame::numeric(features.view()).unwrap();
    let bundle = grove::train_regression(&frame, y, base_config(15, 6)).unwrap();
    let values = PredictorValues::numeric(features.view());

    for tree in 0..bundle.n_tree() {
        let range = bundle.tree_range(tree);
        // Leaf -> rows of its bag slice.
        let mut offset = bundle.leaf.sample_origin[tree] as usize;
        let mut rows_by_leaf = vec![Vec::new(); range.len()];
        for local in 0..range.len() {
            let extent = bundle.leaf.nodes[range.start + local].extent as usize;
            for i in offset..offset + extent {
                rows_by_leaf[local].push(bundle.leaf.bag_row[i].row as usize);
            }
            offset += extent;
        }

        for row in 0..80 {
            if !bundle.in_bag.get(tree, row) {
                continue;
            }
            // Walk without bagging so in-bag rows traverse too.
            let leaf = walk_one(&bundle, &values, tree, row);
            assert!(
                rows_by_leaf[leaf].contains(&row),
                "tree {} row {} walked to leaf {} outside its bag slice",
                tree,
                row,
                leaf
            );
        }
    }
}

/// Re-derive the walker locally from the packed vectors.
fn walk_one(
    bundle: &grove::ForestBundle,
    values: &PredictorValues<'_>,
    tree: usize,
    row: usize,
) -> usize {
    let range = bundle.tree_range(tree);
    let mut idx = 0usize;
    loop {
        let bump = bundle.lh_bump[range.start + idx];
        if bump == 0 {
            return idx;
        }
        let pred = bundle.pred_idx[range.start + idx] as usize;
        let split_val = bundle.split_val[range.start + idx];
        let go_left = match bundle.fac_idx(pred) {
            None => values.num_val(row, pred) <= split_val,
            Some(fac) => bundle.fac_split_bits.get(
                bundle.fac_origin[tree] as usize
                    + split_val as usize
                    + values.fac_val(row, fac) as usize,
            ),
        };
        idx += (if go_left { bump } else { bump + 1 }) as usize;
    }
}

#[test]
fn identical_runs_are_bit_identical() {
    let features = random_frame_data(4, 100, 81, 0.0, 1.0);
    let y = linear_regression_targets(&features, 82, 0.1);
    let frame = PredictorFrame::numeric(features.view()).unwrap();

    let a = grove::train_regression(&frame, y.clone(), base_config(20, 123)).unwrap();
    let b = grove::train_regression(&frame, y.clone(), base_config(20, 123)).unwrap();
    assert_eq!(a, b);

    let c = grove::train_regression(&frame, y, base_config(20, 124)).unwrap();
    assert_ne!(a, c);
}

#[test]
fn monotone_constraint_orders_subtree_means() {
    // With reg_mono = +1 on predictor 0, every numeric split on it must put
    // the smaller response mean on the left-hand side.
    let features = random_frame_data(2, 150, 91, 0.0, 1.0);
    let y: Vec<f64> = (0..150)
        .map(|row| 3.0 * features[[0, row]] + 0.3 * (features[[1, row]] - 0.5))
        .collect();
    let frame = PredictorFrame::numeric(features.view()).unwrap();

    let config = TrainConfig::builder()
        .n_tree(15)
        .reg_mono(vec![1, 0])
        .n_threads(1)
        .seed(10)
        .build()
        .unwrap();
    let bundle = grove::train_regression(&frame, y, config).unwrap();

    for tree in 0..bundle.n_tree() {
        let range = bundle.tree_range(tree);
        for local in 0..range.len() {
            let node = range.start + local;
            let bump = bundle.lh_bump[node];
            if bump == 0 || bundle.pred_idx[node] != 0 {
                continue;
            }
            let mean = |root: usize| -> f64 {
                let mut mass = 0.0;
                let mut count = 0u64;
                for leaf in subtree_leaves(&bundle, tree, root) {
                    let (leaf_mass_value, leaf_count) = leaf_mass(&bundle, tree, leaf);
                    mass += leaf_mass_value;
                    count += leaf_count;
                }
                mass / count as f64
            };
            let mean_left = mean(local + bump as usize);
            let mean_right = mean(local + bump as usize + 1);
            assert!(
                mean_left <= mean_right + 1e-9,
                "tree {} node {}: left mean {} exceeds right mean {}",
                tree,
                local,
                mean_left,
                mean_right
            );
        }
    }
}
