//! Bundle serialization round trips.

use grove::testing::{clustered_classification_data, linear_regression_targets, random_frame_data};
use grove::{ForestBundle, PredictorFrame, PredictorValues, Parallelism, TrainConfig};

fn config(n_tree: u32) -> TrainConfig {
    TrainConfig::builder()
        .n_tree(n_tree)
        .n_threads(1)
        .seed(1234)
        .build()
        .unwrap()
}

#[test]
fn regression_bundle_round_trips_exactly() {
    let features = random_frame_data(4, 80, 11, 0.0, 1.0);
    let y = linear_regression_targets(&features, 12, 0.1);
    let frame = PredictorFrame::numeric(features.view()).unwrap();
    let bundle = grove::train_regression(&frame, y, config(10)).unwrap();

    let encoded = serde_json::to_string(&bundle).unwrap();
    let decoded: ForestBundle = serde_json::from_str(&encoded).unwrap();
    assert_eq!(bundle, decoded);
    assert!(decoded.validate().is_ok());
}

#[test]
fn reloaded_bundle_predicts_identically() {
    let (features, labels) = clustered_classification_data(3, 60, 3, 21, 3.0, 1.0);
    let frame = PredictorFrame::numeric(features.view()).unwrap();
    let bundle = grove::train_classification(&frame, labels, 3, None, config(12)).unwrap();

    let encoded = serde_json::to_vec(&bundle).unwrap();
    let decoded: ForestBundle = serde_json::from_slice(&encoded).unwrap();

    let values = PredictorValues::numeric(features.view());
    let before =
        grove::predict_classification(&bundle, &values, true, Parallelism::Sequential).unwrap();
    let after =
        grove::predict_classification(&decoded, &values, true, Parallelism::Sequential).unwrap();
    assert_eq!(before, after);
}

#[test]
fn quantiles_survive_reload() {
    let features = random_frame_data(3, 50, 31, 0.0, 1.0);
    let y = linear_regression_targets(&features, 32, 0.05);
    let frame = PredictorFrame::numeric(features.view()).unwrap();
    let bundle = grove::train_regression(&frame, y, config(8)).unwrap();

    let decoded: ForestBundle =
        serde_json::from_str(&serde_json::to_string(&bundle).unwrap()).unwrap();

    let values = PredictorValues::numeric(features.view());
    let quantiles = [0.25, 0.5, 0.75];
    let before =
        grove::predict_quantiles(&bundle, &values, &quantiles, true, Parallelism::Sequential)
            .unwrap();
    let after =
        grove::predict_quantiles(&decoded, &values, &quantiles, true, Parallelism::Sequential)
            .unwrap();
    assert_eq!(before, after);
}
