use ndarray::Array1;

mod table;

pub use table::{VectorTable, DEFAULT_OOV_LOG_PROB};

/// A single token resolved through an [`EmbeddingProvider`]: its text, a
/// fixed-length vector and the token's log-probability in the provider's
/// training corpus.
///
/// Token vectors are produced only by a provider and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenVector {
    text: String,
    vector: Array1<f32>,
    log_prob: f32,
}

impl TokenVector {
    pub fn new(text: impl Into<String>, vector: Array1<f32>, log_prob: f32) -> Self {
        Self {
            text: text.into(),
            vector,
            log_prob,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn vector(&self) -> &Array1<f32> {
        &self.vector
    }

    pub fn log_prob(&self) -> f32 {
        self.log_prob
    }

    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// Source of token embeddings and lexical log-probabilities.
///
/// A single provider handle is shared (behind `Arc`) by the classifier and
/// both exemplar sets. Implementations must be deterministic: the same term
/// always resolves to the same vector.
///
/// Failing to resolve a term is a normal outcome, not an error:
/// - `resolve` returns `None` for terms outside the vocabulary
/// - `tokenize` decides for itself how unknown tokens are represented
pub trait EmbeddingProvider: Send + Sync {
    /// Dimensionality D of every vector this provider returns
    fn dimensions(&self) -> usize;

    /// Looks up a single exemplar term.
    fn resolve(&self, term: &str) -> Option<TokenVector>;

    /// Splits free text into tokens and resolves each of them.
    ///
    /// The default splits on whitespace and keeps only the tokens that
    /// [`resolve`](Self::resolve) knows about.
    fn tokenize(&self, text: &str) -> Vec<TokenVector> {
        text.split_whitespace()
            .filter_map(|word| self.resolve(word))
            .collect()
    }
}
