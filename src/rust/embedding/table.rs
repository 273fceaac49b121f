use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, error, info, warn};
use ndarray::Array1;
use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::{OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer};

use super::{EmbeddingProvider, TokenVector};
use crate::classifier::ClassifierError;

/// Log-probability given to out-of-vocabulary tokens when the table is empty
pub const DEFAULT_OOV_LOG_PROB: f32 = -30.0;

#[derive(Debug, Clone)]
struct Entry {
    vector: Array1<f32>,
    log_prob: f32,
}

/// An in-memory word-vector table used as the embedding provider.
///
/// The text format has one entry per line:
///
/// ```text
/// term log_prob v1 v2 ... vD
/// ```
///
/// Blank lines and lines starting with `#` are ignored. A word2vec-style
/// `<count> <dim>` header on the first line is accepted; when present its
/// dimension must match the rows.
///
/// Free text is split with the `tokenizers` whitespace pre-tokenizer (runs of
/// word characters and runs of punctuation). Unknown tokens still take part
/// in a text's statistics with a zero vector and the table's
/// out-of-vocabulary log-probability, so noisy text reads as rare.
///
/// # Example
/// ```
/// use topicsieve::{EmbeddingProvider, VectorTable};
///
/// let table = VectorTable::parse("cat -5.0 1.0 0.0\ndog -6.0 0.0 1.0\n").unwrap();
/// assert_eq!(table.dimensions(), 2);
/// assert!(table.resolve("Cat").is_some());
/// assert_eq!(table.tokenize("cat, dog!").len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct VectorTable {
    entries: HashMap<String, Entry>,
    dimensions: usize,
    oov_log_prob: f32,
}

impl VectorTable {
    /// Loads a table from a file on disk.
    ///
    /// # Errors
    /// - `VectorTableError` if the file cannot be opened or read
    /// - `VectorTableError` for any malformed line (see [`from_reader`](Self::from_reader))
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        info!("Loading vector table from {:?}", path);
        let file = File::open(path).map_err(|e| {
            error!("Failed to open vector table: {}", e);
            ClassifierError::VectorTableError(format!("Failed to open {}: {}", path.display(), e))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parses a table held in memory.
    pub fn parse(text: &str) -> Result<Self, ClassifierError> {
        Self::from_reader(text.as_bytes())
    }

    /// Parses a table from any buffered reader.
    ///
    /// # Errors
    /// - `VectorTableError` if a line has no log-probability or no vector values
    /// - `VectorTableError` if a number cannot be parsed
    /// - `VectorTableError` if a row's dimension differs from the first row (or the header)
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ClassifierError> {
        let mut entries = HashMap::new();
        let mut dimensions: Option<usize> = None;
        let mut min_log_prob = f32::INFINITY;
        let mut seen_content = false;

        for (index, line) in reader.lines().enumerate() {
            let line_no = index + 1;
            let line = line.map_err(|e| {
                ClassifierError::VectorTableError(format!("Failed to read line {}: {}", line_no, e))
            })?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            let first_content = !seen_content;
            seen_content = true;

            if first_content {
                if let Some(header_dim) = Self::parse_header(&fields) {
                    debug!("Vector table header declares {} dimensions", header_dim);
                    dimensions = Some(header_dim);
                    continue;
                }
            }

            if fields.len() < 3 {
                return Err(ClassifierError::VectorTableError(format!(
                    "Line {}: expected 'term log_prob v1 .. vD', found {} fields",
                    line_no,
                    fields.len()
                )));
            }

            let log_prob = Self::parse_number(fields[1], line_no)?;
            let values = fields[2..]
                .iter()
                .map(|v| Self::parse_number(v, line_no))
                .collect::<Result<Vec<f32>, _>>()?;

            match dimensions {
                Some(expected) if expected != values.len() => {
                    return Err(ClassifierError::VectorTableError(format!(
                        "Line {}: vector has {} dimensions, expected {}",
                        line_no,
                        values.len(),
                        expected
                    )));
                }
                Some(_) => {}
                None => dimensions = Some(values.len()),
            }

            min_log_prob = min_log_prob.min(log_prob);
            let term = fields[0].to_string();
            if entries.contains_key(&term) {
                debug!("Duplicate term '{}' on line {}, keeping the later entry", term, line_no);
            }
            entries.insert(
                term,
                Entry {
                    vector: Array1::from_vec(values),
                    log_prob,
                },
            );
        }

        if entries.is_empty() {
            warn!("Vector table contains no entries");
        }

        let oov_log_prob = if min_log_prob.is_finite() {
            min_log_prob
        } else {
            DEFAULT_OOV_LOG_PROB
        };

        info!(
            "Vector table loaded: {} terms, {} dimensions",
            entries.len(),
            dimensions.unwrap_or(0)
        );

        Ok(Self {
            entries,
            dimensions: dimensions.unwrap_or(0),
            oov_log_prob,
        })
    }

    /// Overrides the log-probability assigned to out-of-vocabulary tokens.
    pub fn with_oov_log_prob(mut self, log_prob: f32) -> Self {
        self.oov_log_prob = log_prob;
        self
    }

    pub fn oov_log_prob(&self) -> f32 {
        self.oov_log_prob
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn parse_header(fields: &[&str]) -> Option<usize> {
        if fields.len() != 2 {
            return None;
        }
        let _count: usize = fields[0].parse().ok()?;
        fields[1].parse().ok()
    }

    fn parse_number(field: &str, line_no: usize) -> Result<f32, ClassifierError> {
        field.parse::<f32>().map_err(|_| {
            ClassifierError::VectorTableError(format!("Line {}: invalid number '{}'", line_no, field))
        })
    }

    fn lookup(&self, term: &str) -> Option<&Entry> {
        self.entries
            .get(term)
            .or_else(|| self.entries.get(&term.to_lowercase()))
    }

    fn split_words<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut pretokenized = PreTokenizedString::from(text);
        match Whitespace::default().pre_tokenize(&mut pretokenized) {
            Ok(()) => pretokenized
                .get_splits(OffsetReferential::Original, OffsetType::Byte)
                .into_iter()
                .map(|(_, (start, end), _)| &text[start..end])
                .collect(),
            Err(e) => {
                warn!("Pre-tokenizer failed ({}), falling back to whitespace split", e);
                text.split_whitespace().collect()
            }
        }
    }
}

impl EmbeddingProvider for VectorTable {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn resolve(&self, term: &str) -> Option<TokenVector> {
        self.lookup(term)
            .map(|entry| TokenVector::new(term, entry.vector.clone(), entry.log_prob))
    }

    fn tokenize(&self, text: &str) -> Vec<TokenVector> {
        self.split_words(text)
            .into_iter()
            .map(|word| match self.lookup(word) {
                Some(entry) => TokenVector::new(word, entry.vector.clone(), entry.log_prob),
                None => TokenVector::new(word, Array1::zeros(self.dimensions), self.oov_log_prob),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
# sample table
3 2
cat -5.0 1.0 0.0
Dog -6.5 0.0 1.0

kitten -9.0 0.5 0.5
";

    #[test]
    fn test_parse_with_header_and_comments() {
        let table = VectorTable::parse(TABLE).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.dimensions(), 2);
        assert_eq!(table.oov_log_prob(), -9.0);
    }

    #[test]
    fn test_lowercase_fallback() {
        let table = VectorTable::parse(TABLE).unwrap();
        let token = table.resolve("CAT").unwrap();
        assert_eq!(token.log_prob(), -5.0);
        assert_eq!(token.text(), "CAT");
        // Stored with a capital; the exact match wins, the lowercase form does not exist.
        assert!(table.resolve("Dog").is_some());
        assert!(table.resolve("dog").is_none());
    }

    #[test]
    fn test_tokenize_keeps_unknown_tokens() {
        let table = VectorTable::parse(TABLE).unwrap().with_oov_log_prob(-25.0);
        let tokens = table.tokenize("cat zzyzx!");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text()).collect();
        assert_eq!(texts, vec!["cat", "zzyzx", "!"]);
        assert_eq!(tokens[1].log_prob(), -25.0);
        assert!(tokens[1].vector().iter().all(|&x| x == 0.0));
        assert_eq!(tokens[1].dimensions(), 2);
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let result = VectorTable::parse("cat -5.0 1.0 0.0\ndog -6.0 1.0\n");
        assert!(matches!(result, Err(ClassifierError::VectorTableError(_))));
    }

    #[test]
    fn test_header_dimension_is_enforced() {
        let result = VectorTable::parse("2 3\ncat -5.0 1.0 0.0\n");
        assert!(matches!(result, Err(ClassifierError::VectorTableError(_))));
    }

    #[test]
    fn test_invalid_number_reports_line() {
        let err = VectorTable::parse("cat -5.0 1.0\ndog abc 1.0\n").unwrap_err();
        assert!(err.to_string().contains("Line 2"));
    }

    #[test]
    fn test_empty_table_uses_default_oov() {
        let table = VectorTable::parse("").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.oov_log_prob(), DEFAULT_OOV_LOG_PROB);
        assert!(table.tokenize("").is_empty());
    }
}
