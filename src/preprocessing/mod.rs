//! Preprocessing: categorical encoding and KNN imputation fitted on the
//! training split only.

mod encoder;
mod pipeline;

pub use encoder::OrdinalEncoder;
pub use pipeline::{TransformArtifact, TransformConfig, TransformPipeline, TransformedDataset};
