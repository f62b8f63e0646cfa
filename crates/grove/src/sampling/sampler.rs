//! Per-tree bootstrap draws.

use super::response::Response;
use super::rng::UniformSource;

/// One sampled observation with its multiplicity and response summary.
///
/// `s_count >= 1` always; rows absent from the bag have no entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSummary {
    pub row: u32,
    pub s_count: u32,
    /// Response mass: `y * s_count` (regression) or `proxy * s_count`.
    pub y_sum: f64,
    /// Category code; zero for regression.
    pub ctg: u32,
}

/// The bag drawn for a single tree.
#[derive(Debug, Clone)]
pub struct TreeBag {
    /// Sampled rows, row-ascending.
    pub samples: Vec<SampleSummary>,
    /// Row -> sample index, `None` for out-of-bag rows.
    pub row2sample: Vec<Option<u32>>,
    /// In-bag bits, one per row, word-packed.
    in_bag: Vec<u32>,
    /// Total response mass over the bag.
    pub sum: f64,
}

impl TreeBag {
    /// Number of distinct rows in the bag.
    #[inline]
    pub fn bag_count(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn in_bag(&self, row: usize) -> bool {
        self.in_bag[row >> 5] & (1 << (row & 31)) != 0
    }

    /// Word-packed in-bag bits, row-indexed.
    #[inline]
    pub fn in_bag_words(&self) -> &[u32] {
        &self.in_bag
    }
}

/// Draws one bootstrap sample per tree.
///
/// `n_samp` independent draws from `0..n_row`, with or without replacement,
/// optionally weighted by a per-row weight vector. Weighted draws without
/// replacement use exponential keys (each row keyed by `u^(1/w)`, the
/// `n_samp` largest keys win), which preserves determinism under a fixed
/// variate stream.
#[derive(Debug, Clone)]
pub struct Sampler {
    n_row: usize,
    n_samp: usize,
    with_replacement: bool,
    /// Cumulative weights for replacement draws; `None` when uniform.
    cdf: Option<Vec<f64>>,
    weights: Option<Vec<f64>>,
}

impl Sampler {
    /// `sample_weight`, when present, must be positive and of length `n_row`
    /// (validated at the training entry).
    pub fn new(
        n_row: usize,
        n_samp: usize,
        with_replacement: bool,
        sample_weight: Option<&[f64]>,
    ) -> Self {
        debug_assert!(n_row > 0 && n_samp > 0);
        debug_assert!(with_replacement || n_samp <= n_row);
        let cdf = sample_weight.filter(|_| with_replacement).map(|w| {
            let mut acc = 0.0;
            w.iter()
                .map(|&wi| {
                    acc += wi;
                    acc
                })
                .collect()
        });
        Self {
            n_row,
            n_samp,
            with_replacement,
            cdf,
            weights: sample_weight.map(<[f64]>::to_vec),
        }
    }

    /// Draw the bag for one tree and summarize the response per sample.
    pub fn sample(&self, response: &Response, rng: &mut UniformSource) -> TreeBag {
        let mut counts = vec![0u32; self.n_row];
        if self.with_replacement {
            self.draw_with_replacement(&mut counts, rng);
        } else {
            self.draw_without_replacement(&mut counts, rng);
        }

        let mut samples = Vec::new();
        let mut row2sample = vec![None; self.n_row];
        let mut in_bag = vec![0u32; (self.n_row + 31) / 32];
        let mut sum = 0.0;
        for (row, &s_count) in counts.iter().enumerate() {
            if s_count == 0 {
                continue;
            }
            let y_sum = response.sample_val(row) * f64::from(s_count);
            row2sample[row] = Some(samples.len() as u32);
            in_bag[row >> 5] |= 1 << (row & 31);
            sum += y_sum;
            samples.push(SampleSummary {
                row: row as u32,
                s_count,
                y_sum,
                ctg: response.sample_ctg(row),
            });
        }

        TreeBag {
            samples,
            row2sample,
            in_bag,
            sum,
        }
    }

    fn draw_with_replacement(&self, counts: &mut [u32], rng: &mut UniformSource) {
        match &self.cdf {
            None => {
                for _ in 0..self.n_samp {
                    counts[rng.next_index(self.n_row)] += 1;
                }
            }
            Some(cdf) => {
                let total = *cdf.last().expect("nonempty cdf");
                for _ in 0..self.n_samp {
                    let target = rng.next_uniform() * total;
                    let row = cdf.partition_point(|&c| c <= target).min(self.n_row - 1);
                    counts[row] += 1;
                }
            }
        }
    }

    fn draw_without_replacement(&self, counts: &mut [u32], rng: &mut UniformSource) {
        match &self.weights {
            None => {
                // Partial Fisher-Yates over the row indices.
                let mut rows: Vec<u32> = (0..self.n_row as u32).collect();
                for i in 0..self.n_samp {
                    let j = i + rng.next_index(self.n_row - i);
                    rows.swap(i, j);
                    counts[rows[i] as usize] = 1;
                }
            }
            Some(w) => {
                let mut keyed: Vec<(f64, u32)> = w
                    .iter()
                    .enumerate()
                    .map(|(row, &wi)| (rng.next_uniform().powf(1.0 / wi), row as u32))
                    .collect();
                keyed.sort_by(|a, b| b.0.partial_cmp(&a.0).expect("finite keys"));
                for &(_, row) in keyed.iter().take(self.n_samp) {
                    counts[row as usize] = 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(n: usize) -> Response {
        Response::regression((0..n).map(|i| i as f64).collect()).unwrap()
    }

    #[test]
    fn bag_counts_sum_to_n_samp() {
        let sampler = Sampler::new(50, 50, true, None);
        let bag = sampler.sample(&reg(50), &mut UniformSource::new(3));

        let drawn: u32 = bag.samples.iter().map(|s| s.s_count).sum();
        assert_eq!(drawn, 50);
        assert!(bag.bag_count() <= 50);
        assert!(bag.samples.iter().all(|s| s.s_count >= 1));
    }

    #[test]
    fn in_bag_iff_sampled() {
        let sampler = Sampler::new(40, 40, true, None);
        let bag = sampler.sample(&reg(40), &mut UniformSource::new(11));

        for row in 0..40 {
            assert_eq!(bag.in_bag(row), bag.row2sample[row].is_some());
        }
        for (s_idx, s) in bag.samples.iter().enumerate() {
            assert_eq!(bag.row2sample[s.row as usize], Some(s_idx as u32));
        }
    }

    #[test]
    fn without_replacement_is_distinct() {
        let sampler = Sampler::new(30, 20, false, None);
        let bag = sampler.sample(&reg(30), &mut UniformSource::new(5));

        assert_eq!(bag.bag_count(), 20);
        assert!(bag.samples.iter().all(|s| s.s_count == 1));
    }

    #[test]
    fn samples_row_ascending() {
        let sampler = Sampler::new(64, 64, true, None);
        let bag = sampler.sample(&reg(64), &mut UniformSource::new(9));
        assert!(bag.samples.windows(2).all(|w| w[0].row < w[1].row));
    }

    #[test]
    fn response_mass_accumulates_multiplicity() {
        let sampler = Sampler::new(4, 12, true, None);
        let bag = sampler.sample(&reg(4), &mut UniformSource::new(2));
        for s in &bag.samples {
            assert_eq!(s.y_sum, f64::from(s.row) * f64::from(s.s_count));
        }
        let total: f64 = bag.samples.iter().map(|s| s.y_sum).sum();
        assert_eq!(total, bag.sum);
    }

    #[test]
    fn heavy_weight_dominates_draws() {
        let mut w = vec![1e-9; 10];
        w[7] = 1.0;
        let sampler = Sampler::new(10, 10, true, Some(&w));
        let bag = sampler.sample(&reg(10), &mut UniformSource::new(13));

        assert_eq!(bag.bag_count(), 1);
        assert_eq!(bag.samples[0].row, 7);
        assert_eq!(bag.samples[0].s_count, 10);
    }
}
