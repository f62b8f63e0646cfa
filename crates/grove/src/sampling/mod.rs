//! Bootstrap sampling and response bookkeeping.
//!
//! One [`TreeBag`] is drawn per tree: the multiset of sampled rows with
//! multiplicities, the in-bag bit row, and per-sample response summaries.
//! Rows absent from the bag are out-of-bag for that tree and feed the
//! validation pass.
//!
//! The response itself is a tagged variant ([`Response`]): regression and
//! classification share the sampling machinery and dispatch only at the
//! split-gain and leaf-scoring boundaries.

mod response;
mod rng;
mod sampler;

pub use response::{Response, ResponseError};
pub use rng::UniformSource;
pub use sampler::{SampleSummary, Sampler, TreeBag};
