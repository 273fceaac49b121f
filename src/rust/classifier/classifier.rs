use std::fmt;
use std::sync::Arc;

use log::debug;
use serde::Serialize;

use super::exemplar::ExemplarSet;
use super::meaning::MeaningVector;
use crate::config::ClassifierConfig;
use crate::embedding::EmbeddingProvider;

/// Outcome of classifying one item.
///
/// The three flags are evaluated independently: an item can be both a match
/// and a reject at the same time when it sits close to both topics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// The text that was classified
    pub text: String,
    /// Mean token log-probability
    pub prob: f32,
    /// Cosine similarity to the target exemplars, `None` when not comparable
    pub match_score: Option<f32>,
    /// Cosine similarity to the reject exemplars, `None` when not comparable
    pub reject_score: Option<f32>,
    pub is_rare: bool,
    pub is_match: bool,
    pub is_reject: bool,
}

impl ClassificationResult {
    /// Applies the threshold rules to already computed scores.
    ///
    /// - `is_rare`: `prob < min_log_prob`
    /// - `is_match`: not rare and `match_score >= min_match_similarity`
    /// - `is_reject`: not rare and `reject_score >= max_reject_similarity`
    ///
    /// A `None` score never reaches a threshold.
    ///
    /// # Example
    /// ```
    /// use topicsieve::{ClassificationResult, ClassifierConfig};
    ///
    /// let config = ClassifierConfig::default();
    /// let result = ClassificationResult::from_scores("text", -5.0, Some(0.95), Some(0.9), &config);
    /// assert!(!result.is_rare);
    /// assert!(result.is_match && result.is_reject);
    /// ```
    pub fn from_scores(
        text: impl Into<String>,
        prob: f32,
        match_score: Option<f32>,
        reject_score: Option<f32>,
        config: &ClassifierConfig,
    ) -> Self {
        let common = prob >= config.min_log_prob;
        let reaches = |score: Option<f32>, threshold: f32| score.is_some_and(|s| s >= threshold);

        Self {
            text: text.into(),
            prob,
            match_score,
            reject_score,
            is_rare: prob < config.min_log_prob,
            is_match: common && reaches(match_score, config.min_match_similarity),
            is_reject: common && reaches(reject_score, config.max_reject_similarity),
        }
    }

    /// A match that is neither rare nor rejected.
    pub fn is_clean_match(&self) -> bool {
        self.is_match && !self.is_rare && !self.is_reject
    }
}

/// Classifies `text` against a target and a reject exemplar set.
///
/// Both exemplar meanings are fetched through [`ExemplarSet::meaning`] on
/// every call, so the sets' reload policy decides how fresh they are.
///
/// Text that tokenizes to nothing gets a mean log-probability of
/// `min_log_prob - 1`, which marks it rare and neither match nor reject.
pub fn classify(
    text: &str,
    provider: &dyn EmbeddingProvider,
    target: &ExemplarSet,
    reject: &ExemplarSet,
    config: &ClassifierConfig,
) -> ClassificationResult {
    let tokens = provider.tokenize(text);

    let prob = if tokens.is_empty() {
        config.min_log_prob - 1.0
    } else {
        tokens.iter().map(|t| t.log_prob()).sum::<f32>() / tokens.len() as f32
    };

    let meaning = MeaningVector::build(&tokens);
    let match_score = meaning.similarity(&target.meaning());
    let reject_score = meaning.similarity(&reject.meaning());

    debug!(
        "Classified {} tokens: prob={:.3} match={:?} reject={:?}",
        tokens.len(),
        prob,
        match_score,
        reject_score
    );

    ClassificationResult::from_scores(text, prob, match_score, reject_score, config)
}

/// A topic filter built from one embedding provider and two exemplar sets.
///
/// # Thread Safety
///
/// `Classifier` is `Send + Sync`; share it across tasks with `Arc`.
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use std::sync::Arc;
/// use topicsieve::{Classifier, ExemplarSource, VectorTable};
///
/// let table = VectorTable::parse(
///     "cat -5.0 1.0 0.0\nkitten -8.0 0.9 0.1\nstock -6.0 0.0 1.0\nmarket -6.0 0.1 0.9\n",
/// )?;
/// let classifier = Classifier::builder()
///     .with_provider(Arc::new(table))
///     .with_target(ExemplarSource::inline(vec!["cat", "kitten"]))
///     .with_reject(ExemplarSource::inline(vec!["stock", "market"]))
///     .build()?;
///
/// let result = classifier.classify("cat");
/// assert!(result.is_match);
/// assert!(!result.is_reject);
/// # Ok(())
/// # }
/// ```
pub struct Classifier {
    pub(crate) provider: Arc<dyn EmbeddingProvider>,
    pub(crate) target: ExemplarSet,
    pub(crate) reject: ExemplarSet,
    pub(crate) config: ClassifierConfig,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Classifier>();
    }
};

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("target", &self.target)
            .field("reject", &self.reject)
            .field("config", &self.config)
            .finish()
    }
}

impl Classifier {
    /// Creates a new ClassifierBuilder for fluent construction
    pub fn builder() -> super::builder::ClassifierBuilder {
        super::builder::ClassifierBuilder::new()
    }

    /// Classifies a single text item.
    pub fn classify(&self, text: &str) -> ClassificationResult {
        classify(
            text,
            self.provider.as_ref(),
            &self.target,
            &self.reject,
            &self.config,
        )
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn target(&self) -> &ExemplarSet {
        &self.target
    }

    pub fn reject(&self) -> &ExemplarSet {
        &self.reject
    }

    /// Returns information about the classifier's current state
    pub fn info(&self) -> super::ClassifierInfo {
        super::ClassifierInfo {
            dimensions: self.provider.dimensions(),
            target_source: self.target.source().to_string(),
            target_terms: self.target.term_count(),
            target_resolved: self.target.resolved_count(),
            reject_source: self.reject.source().to_string(),
            reject_terms: self.reject.term_count(),
            reject_resolved: self.reject.resolved_count(),
            reload_policy: self.target.policy(),
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClassifierConfig {
        ClassifierConfig::new(-20.0, 0.8, 0.5)
    }

    #[test]
    fn test_match_only() {
        let result = ClassificationResult::from_scores("t", -5.0, Some(0.95), Some(0.1), &config());
        assert!(!result.is_rare);
        assert!(result.is_match);
        assert!(!result.is_reject);
        assert!(result.is_clean_match());
    }

    #[test]
    fn test_match_and_reject_together() {
        let result = ClassificationResult::from_scores("t", -5.0, Some(0.95), Some(0.9), &config());
        assert!(!result.is_rare);
        assert!(result.is_match);
        assert!(result.is_reject);
        assert!(!result.is_clean_match());
    }

    #[test]
    fn test_rare_overrides_scores() {
        let result = ClassificationResult::from_scores("t", -25.0, Some(0.99), Some(0.99), &config());
        assert!(result.is_rare);
        assert!(!result.is_match);
        assert!(!result.is_reject);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let result = ClassificationResult::from_scores("t", -20.0, Some(0.8), Some(0.5), &config());
        assert!(!result.is_rare);
        assert!(result.is_match);
        assert!(result.is_reject);
    }

    #[test]
    fn test_missing_scores_never_trigger() {
        let result = ClassificationResult::from_scores("t", -5.0, None, None, &config());
        assert!(!result.is_rare);
        assert!(!result.is_match);
        assert!(!result.is_reject);
    }

    #[test]
    fn test_result_serializes_flags() {
        let result = ClassificationResult::from_scores("hi", -5.0, Some(0.9), None, &config());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["text"], "hi");
        assert_eq!(json["is_match"], true);
        assert!(json["reject_score"].is_null());
    }
}
