//! A streaming topic filter built on averaged word embeddings.
//!
//! Each incoming text is compared against two exemplar sets, a *target*
//! topic and a *reject* (noise) topic, and gated by how common its words are.
//! The outcome is a [`ClassificationResult`] carrying three independent
//! flags: rare, match and reject.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use topicsieve::{Classifier, ClassifierConfig, ExemplarSource, VectorTable};
//!
//! let table = VectorTable::parse(
//!     "cat -5.0 1.0 0.0 0.0\n\
//!      kitten -9.0 0.9 0.1 0.0\n\
//!      stock -6.0 0.0 1.0 0.0\n\
//!      market -6.5 0.0 0.9 0.1\n",
//! )?;
//!
//! let classifier = Classifier::builder()
//!     .with_provider(Arc::new(table))
//!     .with_config(ClassifierConfig::default())
//!     .with_target(ExemplarSource::inline(vec!["cat", "kitten"]))
//!     .with_reject(ExemplarSource::inline(vec!["stock", "market"]))
//!     .build()?;
//!
//! let result = classifier.classify("kitten");
//! assert!(result.is_match && !result.is_reject && !result.is_rare);
//! # Ok(())
//! # }
//! ```
//!
//! # Streaming
//!
//! Feed transports ([`LinesFeed`], [`HttpFeed`]) push [`FeedEvent`]s into a
//! tokio channel; a [`StreamIngestor`] classifies each item and hands the
//! result to a [`ResultSink`] until its shutdown token fires.

pub mod classifier;
pub mod config;
pub mod embedding;
pub mod sink;
pub mod stream;
pub mod vector_store;

pub use classifier::{
    classify, ClassificationResult, Classifier, ClassifierBuilder, ClassifierError, ClassifierInfo,
    ExemplarSet, ExemplarSource, MeaningVector, ReloadPolicy,
};
pub use config::ClassifierConfig;
pub use embedding::{EmbeddingProvider, TokenVector, VectorTable};
pub use sink::{ConsoleSink, JsonLinesSink, ResultSink};
pub use stream::{
    DecodeFailure, FeedEvent, FeedFormat, FeedItem, HttpFeed, IngestStats, LinesFeed, Payload,
    StreamIngestor,
};
pub use vector_store::{StoreError, VectorSource, VectorStore};

/// Initializes `env_logger`, honouring `RUST_LOG` and defaulting to `info`.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
