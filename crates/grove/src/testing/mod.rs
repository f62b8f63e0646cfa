//! Dataset generators and fixtures for tests.

use ndarray::Array2;
use rand::prelude::*;

mod iris;

pub use iris::iris;

/// Random feature-major numeric block, values uniform in `[min, max]`.
pub fn random_frame_data(
    n_pred: usize,
    n_row: usize,
    seed: u64,
    min: f64,
    max: f64,
) -> Array2<f64> {
    assert!(max >= min);
    let mut rng = StdRng::seed_from_u64(seed);
    let width = max - min;
    Array2::from_shape_fn((n_pred, n_row), |_| min + rng.gen::<f64>() * width)
}

/// Linear regression targets `y = 2 x0 + x1 + noise`, with uniform noise of
/// the given amplitude. Predictors beyond the first two carry no signal.
pub fn linear_regression_targets(
    features: &Array2<f64>,
    seed: u64,
    noise_amplitude: f64,
) -> Vec<f64> {
    assert!(features.nrows() >= 2);
    let mut rng = StdRng::seed_from_u64(seed);
    (0..features.ncols())
        .map(|row| {
            let signal = 2.0 * features[[0, row]] + features[[1, row]];
            signal + (rng.gen::<f64>() * 2.0 - 1.0) * noise_amplitude
        })
        .collect()
}

/// Clustered classification data: class `c` draws each feature uniformly
/// from `[c * separation, c * separation + spread]`.
///
/// Returns the feature-major block and the labels, rows interleaved across
/// classes.
pub fn clustered_classification_data(
    n_pred: usize,
    n_row: usize,
    n_class: u32,
    seed: u64,
    separation: f64,
    spread: f64,
) -> (Array2<f64>, Vec<u32>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let labels: Vec<u32> = (0..n_row).map(|row| row as u32 % n_class).collect();
    let features = Array2::from_shape_fn((n_pred, n_row), |(_, row)| {
        f64::from(labels[row]) * separation + rng.gen::<f64>() * spread
    });
    (features, labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generators_are_seed_deterministic() {
        let a = random_frame_data(3, 10, 5, -1.0, 1.0);
        let b = random_frame_data(3, 10, 5, -1.0, 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn linear_targets_track_signal() {
        let features = random_frame_data(4, 50, 1, 0.0, 1.0);
        let y = linear_regression_targets(&features, 2, 0.0);
        for (row, &target) in y.iter().enumerate() {
            let expect = 2.0 * features[[0, row]] + features[[1, row]];
            assert!((target - expect).abs() < 1e-12);
        }
    }

    #[test]
    fn iris_shape() {
        let (features, labels) = iris();
        assert_eq!(features.dim(), (4, 150));
        assert_eq!(labels.len(), 150);
        assert_eq!(labels.iter().filter(|&&c| c == 0).count(), 50);
        assert_eq!(labels.iter().filter(|&&c| c == 2).count(), 50);
    }
}
