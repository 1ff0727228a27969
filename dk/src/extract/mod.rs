//! Document to raw model response

mod extractor;
mod normalize;

pub use extractor::{ExtractError, HierarchyExtractor};
pub use normalize::{NormalizedText, TextNormalizer};
