use thiserror::Error;

/// Represents the different types of errors that can occur while setting up the classifier.
///
/// Everything here is a startup (configuration) fault. Per-item problems during
/// classification are handled with fallback values and never surface as errors.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Error occurred while loading or parsing a word-vector table
    #[error("Vector table error: {0}")]
    VectorTableError(String),
    /// Error occurred while reading an exemplar term source
    #[error("Exemplar source error: {0}")]
    ExemplarError(String),
    /// Error occurred during the build phase
    #[error("Build error: {0}")]
    BuildError(String),
    /// Error occurred due to invalid input parameters
    #[error("Validation error: {0}")]
    ValidationError(String),
}
