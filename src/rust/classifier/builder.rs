use std::sync::Arc;

use log::{error, info};

use super::classifier::Classifier;
use super::error::ClassifierError;
use super::exemplar::{ExemplarSet, ExemplarSource, ReloadPolicy};
use crate::config::ClassifierConfig;
use crate::embedding::EmbeddingProvider;

/// A builder for constructing a Classifier with a fluent interface.
#[derive(Default)]
pub struct ClassifierBuilder {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    target: Option<ExemplarSource>,
    reject: Option<ExemplarSource>,
    config: ClassifierConfig,
    reload_policy: ReloadPolicy,
}

impl ClassifierBuilder {
    /// Creates a new empty ClassifierBuilder instance with default thresholds
    ///
    /// # Example
    /// ```
    /// use topicsieve::ClassifierBuilder;
    ///
    /// let builder = ClassifierBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the embedding provider shared by the classifier and both exemplar sets
    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sets the classification thresholds
    ///
    /// # Example
    /// ```
    /// use topicsieve::{ClassifierBuilder, ClassifierConfig};
    ///
    /// let builder = ClassifierBuilder::new()
    ///     .with_config(ClassifierConfig::new(-15.0, 0.75, 0.6));
    /// ```
    pub fn with_config(mut self, config: ClassifierConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the exemplars describing the topic to match
    pub fn with_target(mut self, source: ExemplarSource) -> Self {
        self.target = Some(source);
        self
    }

    /// Sets the exemplars describing the noise topic to reject
    pub fn with_reject(mut self, source: ExemplarSource) -> Self {
        self.reject = Some(source);
        self
    }

    /// Sets how often both exemplar sets re-read their sources
    pub fn with_reload_policy(mut self, policy: ReloadPolicy) -> Self {
        self.reload_policy = policy;
        self
    }

    /// Validates an exemplar source before anything is read:
    /// - File paths must not be empty
    fn validate_source(label: &str, source: &ExemplarSource) -> Result<(), ClassifierError> {
        if let ExemplarSource::File(path) = source {
            if path.as_os_str().is_empty() {
                return Err(ClassifierError::ValidationError(format!(
                    "{} exemplar path cannot be empty",
                    label
                )));
            }
        }
        Ok(())
    }

    /// Builds and returns the final Classifier instance
    ///
    /// # Returns
    /// * `Result<Classifier, ClassifierError>` - The constructed Classifier if successful, or an error if:
    ///   - No embedding provider is set
    ///   - Either exemplar source is missing, empty or unreadable
    ///   - A threshold is not a finite number
    pub fn build(self) -> Result<Classifier, ClassifierError> {
        let provider = self
            .provider
            .ok_or_else(|| ClassifierError::BuildError("An embedding provider must be set".into()))?;
        let target_source = self
            .target
            .ok_or_else(|| ClassifierError::BuildError("Target exemplars must be set".into()))?;
        let reject_source = self
            .reject
            .ok_or_else(|| ClassifierError::BuildError("Reject exemplars must be set".into()))?;

        self.config.validate()?;
        Self::validate_source("Target", &target_source)?;
        Self::validate_source("Reject", &reject_source)?;

        let target = ExemplarSet::load("target", target_source, Arc::clone(&provider), self.reload_policy)
            .map_err(|e| {
                error!("Failed to load target exemplars: {}", e);
                e
            })?;
        let reject = ExemplarSet::load("reject", reject_source, Arc::clone(&provider), self.reload_policy)
            .map_err(|e| {
                error!("Failed to load reject exemplars: {}", e);
                e
            })?;

        info!(
            "Classifier ready: min_log_prob={} min_match={} max_reject={} reload={:?}",
            self.config.min_log_prob,
            self.config.min_match_similarity,
            self.config.max_reject_similarity,
            self.reload_policy
        );

        Ok(Classifier {
            provider,
            target,
            reject,
            config: self.config,
        })
    }
}
