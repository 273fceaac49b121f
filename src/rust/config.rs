use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierError;

pub const DEFAULT_MIN_LOG_PROB: f32 = -20.0;
pub const DEFAULT_MIN_MATCH_SIMILARITY: f32 = 0.8;
pub const DEFAULT_MAX_REJECT_SIMILARITY: f32 = 0.5;

/// Thresholds applied to every classified item.
///
/// Set once at startup and read-only for the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Rarity floor: items whose mean token log-probability is below this are rare
    pub min_log_prob: f32,
    /// Similarity to the target exemplars needed for a match
    pub min_match_similarity: f32,
    /// Similarity to the reject exemplars at which an item is rejected
    pub max_reject_similarity: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_log_prob: DEFAULT_MIN_LOG_PROB,
            min_match_similarity: DEFAULT_MIN_MATCH_SIMILARITY,
            max_reject_similarity: DEFAULT_MAX_REJECT_SIMILARITY,
        }
    }
}

impl ClassifierConfig {
    pub fn new(min_log_prob: f32, min_match_similarity: f32, max_reject_similarity: f32) -> Self {
        Self {
            min_log_prob,
            min_match_similarity,
            max_reject_similarity,
        }
    }

    /// Checks that every threshold is a finite number.
    ///
    /// Similarity thresholds outside `[-1, 1]` are allowed (they simply never
    /// or always trigger) but a NaN would silently disable a rule.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        let fields = [
            ("min_log_prob", self.min_log_prob),
            ("min_match_similarity", self.min_match_similarity),
            ("max_reject_similarity", self.max_reject_similarity),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ClassifierError::ValidationError(format!(
                "{} must be a finite number, got {}",
                name, value
            )));
        }
        Ok(())
    }
}
