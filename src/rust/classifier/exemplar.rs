use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use log::{debug, info, warn};

use super::error::ClassifierError;
use super::meaning::MeaningVector;
use crate::embedding::{EmbeddingProvider, TokenVector};

/// Where an exemplar set's terms come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ExemplarSource {
    /// A UTF-8 text file of whitespace-delimited terms
    File(PathBuf),
    /// A fixed list of terms held in memory
    Inline(Vec<String>),
}

impl ExemplarSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn inline(terms: Vec<impl Into<String>>) -> Self {
        Self::Inline(terms.into_iter().map(Into::into).collect())
    }

    /// Reads the current list of terms.
    ///
    /// Inline entries are split on whitespace too, so `"cat dog"` counts as two terms.
    pub fn read_terms(&self) -> std::io::Result<Vec<String>> {
        match self {
            Self::File(path) => {
                let content = fs::read_to_string(path)?;
                Ok(content.split_whitespace().map(str::to_string).collect())
            }
            Self::Inline(terms) => Ok(terms
                .iter()
                .flat_map(|t| t.split_whitespace())
                .map(str::to_string)
                .collect()),
        }
    }

    /// Change stamp used by [`ReloadPolicy::OnChange`]. `None` when unknown.
    fn stamp(&self) -> Option<FileStamp> {
        match self {
            Self::File(path) => {
                let metadata = fs::metadata(path).ok()?;
                Some(FileStamp {
                    modified: metadata.modified().ok()?,
                    len: metadata.len(),
                })
            }
            Self::Inline(_) => None,
        }
    }
}

impl fmt::Display for ExemplarSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Inline(terms) => write!(f, "<inline: {} terms>", terms.len()),
        }
    }
}

/// When an exemplar set re-reads its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadPolicy {
    /// Re-read and re-resolve on every `meaning()` call. Edits to the source
    /// apply to the very next item, at the cost of a read per item.
    #[default]
    EveryCall,
    /// Keep the computed meaning and re-read only when the file's
    /// modification time or length changes. Inline sources are read once.
    ///
    /// An edit that keeps the length and lands within the filesystem's
    /// timestamp granularity of the previous one goes unnoticed.
    OnChange,
}

/// Modification time and length of an exemplar file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

#[derive(Debug, Clone)]
struct Snapshot {
    meaning: MeaningVector,
    stamp: Option<FileStamp>,
    term_count: usize,
    resolved_count: usize,
}

/// A named topic defined by the averaged embeddings of its exemplar terms.
pub struct ExemplarSet {
    name: String,
    source: ExemplarSource,
    provider: Arc<dyn EmbeddingProvider>,
    policy: ReloadPolicy,
    last_good: RwLock<Snapshot>,
}

impl fmt::Debug for ExemplarSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExemplarSet")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("policy", &self.policy)
            .finish()
    }
}

impl ExemplarSet {
    /// Reads and resolves the source for the first time.
    ///
    /// Terms the provider does not know are skipped. A source whose terms are
    /// all unknown still loads; its meaning is undefined and every similarity
    /// against it is "not comparable".
    ///
    /// # Errors
    /// - `ExemplarError` if the source cannot be read. Without both exemplar
    ///   sets nothing meaningful can be classified, so this is fatal at startup.
    pub fn load(
        name: impl Into<String>,
        source: ExemplarSource,
        provider: Arc<dyn EmbeddingProvider>,
        policy: ReloadPolicy,
    ) -> Result<Self, ClassifierError> {
        let name = name.into();
        let stamp = source.stamp();
        let terms = source.read_terms().map_err(|e| {
            ClassifierError::ExemplarError(format!(
                "Failed to read {} exemplars from {}: {}",
                name, source, e
            ))
        })?;

        let snapshot = Self::snapshot(&name, provider.as_ref(), &terms, stamp);
        info!(
            "Exemplar set '{}' loaded from {}: {}/{} terms resolved",
            name, source, snapshot.resolved_count, snapshot.term_count
        );
        if !snapshot.meaning.is_comparable() {
            warn!(
                "Exemplar set '{}' has no usable terms; similarity against it will be undefined",
                name
            );
        }

        Ok(Self {
            name,
            source,
            provider,
            policy,
            last_good: RwLock::new(snapshot),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &ExemplarSource {
        &self.source
    }

    pub fn policy(&self) -> ReloadPolicy {
        self.policy
    }

    /// Number of terms in the source as of the last successful read.
    pub fn term_count(&self) -> usize {
        self.read_snapshot().term_count
    }

    /// Number of those terms the provider could resolve.
    pub fn resolved_count(&self) -> usize {
        self.read_snapshot().resolved_count
    }

    /// The topic's meaning, refreshed according to the reload policy.
    ///
    /// A source that fails to re-read at runtime is not fatal: the meaning
    /// from the last successful read is returned instead.
    pub fn meaning(&self) -> MeaningVector {
        if self.policy == ReloadPolicy::OnChange {
            let cached = self.read_snapshot();
            let unchanged = match &self.source {
                ExemplarSource::Inline(_) => true,
                ExemplarSource::File(_) => {
                    cached.stamp.is_some() && cached.stamp == self.source.stamp()
                }
            };
            if unchanged {
                return cached.meaning;
            }
            debug!("Exemplar source for '{}' changed, reloading", self.name);
        }
        self.reload()
    }

    fn reload(&self) -> MeaningVector {
        let stamp = self.source.stamp();
        match self.source.read_terms() {
            Ok(terms) => {
                let snapshot = Self::snapshot(&self.name, self.provider.as_ref(), &terms, stamp);
                let meaning = snapshot.meaning.clone();
                match self.last_good.write() {
                    Ok(mut guard) => *guard = snapshot,
                    Err(poisoned) => *poisoned.into_inner() = snapshot,
                }
                meaning
            }
            Err(e) => {
                warn!(
                    "Failed to re-read exemplars for '{}' from {} ({}), using last loaded terms",
                    self.name, self.source, e
                );
                self.read_snapshot().meaning
            }
        }
    }

    fn read_snapshot(&self) -> Snapshot {
        match self.last_good.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn snapshot(
        name: &str,
        provider: &dyn EmbeddingProvider,
        terms: &[String],
        stamp: Option<FileStamp>,
    ) -> Snapshot {
        let resolved: Vec<TokenVector> = terms
            .iter()
            .filter_map(|term| {
                let token = provider.resolve(term);
                if token.is_none() {
                    debug!("Exemplar term '{}' in '{}' is not in the vocabulary", term, name);
                }
                token
            })
            .collect();

        Snapshot {
            meaning: MeaningVector::build(&resolved),
            stamp,
            term_count: terms.len(),
            resolved_count: resolved.len(),
        }
    }
}
