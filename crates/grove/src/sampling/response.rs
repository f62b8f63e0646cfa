//! Response vector as a tagged variant.

use thiserror::Error;

/// Errors raised while assembling a [`Response`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResponseError {
    #[error("response is empty")]
    Empty,
    #[error("category width must be at least 2, got {0}")]
    NarrowCtg(u32),
    #[error("row {row}: category {ctg} >= width {width}")]
    CtgOutOfRange { row: usize, ctg: u32, width: u32 },
    #[error("proxy length {got} does not match response length {expected}")]
    ProxyLen { expected: usize, got: usize },
    #[error("response value at row {0} is not finite")]
    NonFinite(usize),
    #[error("proxy weight at row {0} must be positive")]
    NonPositiveProxy(usize),
}

/// Training response: continuous or categorical.
///
/// Split-gain evaluation and leaf scoring dispatch on the variant; everything
/// else (sampling, staging, restaging, the packed forest) is shared.
#[derive(Debug, Clone)]
pub enum Response {
    Regression {
        y: Vec<f64>,
    },
    Classification {
        y_ctg: Vec<u32>,
        ctg_width: u32,
        /// Per-row proxy weight feeding the Gini sums. Uniform by default.
        proxy: Vec<f64>,
    },
}

impl Response {
    /// Continuous response.
    pub fn regression(y: Vec<f64>) -> Result<Self, ResponseError> {
        if y.is_empty() {
            return Err(ResponseError::Empty);
        }
        if let Some(row) = y.iter().position(|v| !v.is_finite()) {
            return Err(ResponseError::NonFinite(row));
        }
        Ok(Response::Regression { y })
    }

    /// Categorical response with `ctg_width` classes and optional per-row
    /// proxy weights (defaults to 1.0 each).
    pub fn classification(
        y_ctg: Vec<u32>,
        ctg_width: u32,
        proxy: Option<Vec<f64>>,
    ) -> Result<Self, ResponseError> {
        if y_ctg.is_empty() {
            return Err(ResponseError::Empty);
        }
        if ctg_width < 2 {
            return Err(ResponseError::NarrowCtg(ctg_width));
        }
        for (row, &ctg) in y_ctg.iter().enumerate() {
            if ctg >= ctg_width {
                return Err(ResponseError::CtgOutOfRange {
                    row,
                    ctg,
                    width: ctg_width,
                });
            }
        }
        let proxy = match proxy {
            Some(p) => {
                if p.len() != y_ctg.len() {
                    return Err(ResponseError::ProxyLen {
                        expected: y_ctg.len(),
                        got: p.len(),
                    });
                }
                if let Some(row) = p.iter().position(|v| !v.is_finite() || *v <= 0.0) {
                    return Err(ResponseError::NonPositiveProxy(row));
                }
                p
            }
            None => vec![1.0; y_ctg.len()],
        };
        Ok(Response::Classification {
            y_ctg,
            ctg_width,
            proxy,
        })
    }

    #[inline]
    pub fn n_row(&self) -> usize {
        match self {
            Response::Regression { y } => y.len(),
            Response::Classification { y_ctg, .. } => y_ctg.len(),
        }
    }

    /// Number of categories; zero for regression.
    #[inline]
    pub fn ctg_width(&self) -> u32 {
        match self {
            Response::Regression { .. } => 0,
            Response::Classification { ctg_width, .. } => *ctg_width,
        }
    }

    #[inline]
    pub fn is_regression(&self) -> bool {
        matches!(self, Response::Regression { .. })
    }

    /// Value summed into sample summaries: `y` for regression, the proxy
    /// weight for classification.
    #[inline]
    pub(crate) fn sample_val(&self, row: usize) -> f64 {
        match self {
            Response::Regression { y } => y[row],
            Response::Classification { proxy, .. } => proxy[row],
        }
    }

    /// Category of a row; zero for regression.
    #[inline]
    pub(crate) fn sample_ctg(&self, row: usize) -> u32 {
        match self {
            Response::Regression { .. } => 0,
            Response::Classification { y_ctg, .. } => y_ctg[row],
        }
    }

    /// Sort order of the regression response, for quantile bookkeeping:
    /// `(y_ranked, row2rank)` with stable ties. `None` for classification.
    pub(crate) fn rank_response(&self) -> Option<(Vec<f64>, Vec<u32>)> {
        let y = match self {
            Response::Regression { y } => y,
            Response::Classification { .. } => return None,
        };
        let mut order: Vec<u32> = (0..y.len() as u32).collect();
        order.sort_by(|&a, &b| {
            y[a as usize]
                .partial_cmp(&y[b as usize])
                .expect("finite response")
        });
        let mut y_ranked = Vec::with_capacity(y.len());
        let mut row2rank = vec![0u32; y.len()];
        let mut rank = 0u32;
        for (k, &row) in order.iter().enumerate() {
            let v = y[row as usize];
            if k > 0 && v != y[order[k - 1] as usize] {
                rank += 1;
            }
            if rank as usize == y_ranked.len() {
                y_ranked.push(v);
            }
            row2rank[row as usize] = rank;
        }
        Some((y_ranked, row2rank))
    }
}
