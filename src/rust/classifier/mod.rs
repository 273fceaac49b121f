mod error;
mod meaning;
mod exemplar;
#[allow(clippy::module_inception)]
mod classifier;
pub mod builder;
mod utils;

pub use error::ClassifierError;
pub use meaning::MeaningVector;
pub use exemplar::{ExemplarSet, ExemplarSource, ReloadPolicy};
pub use classifier::{classify, Classifier, ClassificationResult};
pub use builder::ClassifierBuilder;

use crate::config::ClassifierConfig;

/// Information about the current state and configuration of a classifier
#[derive(Debug, Clone)]
pub struct ClassifierInfo {
    /// Dimensionality of the embedding vectors
    pub dimensions: usize,
    /// Where the target exemplars are read from
    pub target_source: String,
    /// Target terms in the source at the last read
    pub target_terms: usize,
    /// Target terms found in the vocabulary
    pub target_resolved: usize,
    /// Where the reject exemplars are read from
    pub reject_source: String,
    pub reject_terms: usize,
    pub reject_resolved: usize,
    /// How the exemplar sets refresh
    pub reload_policy: ReloadPolicy,
    /// Thresholds in effect
    pub config: ClassifierConfig,
}
