//! Feature extraction for entity pairs
//!
//! Turns graph-store reads into a [`FeatureVector`](crate::domain::FeatureVector)
//! whose values always lie in `[0, 1]`.

mod extractor;
pub mod normalize;

pub use extractor::FeatureExtractor;
pub use normalize::{capped, inverse_log, normalize, ratio};
