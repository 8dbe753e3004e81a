// Normalization, windowing and chronological train/test split

pub mod builder;
pub mod normalizer;

pub use builder::{DatasetSplit, SequenceBuilder, WindowSet};
pub use normalizer::MinMaxNormalizer;
