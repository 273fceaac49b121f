use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

use super::{DecodeFailure, FeedEvent, FeedItem, Payload};
use crate::classifier::{ClassificationResult, Classifier};
use crate::sink::ResultSink;

/// How long an in-flight classification may run after shutdown is requested
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Items received from the feed
    pub received: u64,
    /// Results handed to the sink
    pub emitted: u64,
    /// Items that could not be classified
    pub dropped: u64,
    /// Transport errors reported by the feed
    pub transport_errors: u64,
}

/// Classifies the payload exactly as delivered. Only decoded text is accepted.
fn classify_as_received(
    classifier: &Classifier,
    payload: &Payload,
) -> Result<ClassificationResult, DecodeFailure> {
    match payload {
        Payload::Text(text) => Ok(classifier.classify(text)),
        Payload::Bytes(_) => Err(DecodeFailure::NotText),
    }
}

/// First attempt with the payload as received; on `NotText`, one retry
/// after decoding the bytes as UTF-8.
pub(crate) fn classify_with_fallback(
    classifier: &Classifier,
    payload: Payload,
) -> Result<ClassificationResult, DecodeFailure> {
    match classify_as_received(classifier, &payload) {
        Err(DecodeFailure::NotText) => {
            debug!("Payload is not text, retrying as UTF-8");
            let decoded = Payload::Text(payload.decode_utf8()?);
            classify_as_received(classifier, &decoded)
        }
        outcome => outcome,
    }
}

/// Drives classification of a feed until shutdown.
///
/// Items are processed one at a time in arrival order. A failure on one item
/// (undecodable bytes, a panicking classification) drops that item only, and
/// transport errors are logged; neither ends the loop.
pub struct StreamIngestor {
    classifier: Arc<Classifier>,
    sink: Arc<dyn ResultSink>,
    drain_timeout: Duration,
    stats: IngestStats,
}

impl StreamIngestor {
    pub fn new(classifier: Arc<Classifier>, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            classifier,
            sink,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            stats: IngestStats::default(),
        }
    }

    /// Sets how long an in-flight item may take to finish once shutdown is requested.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Runs until `shutdown` fires or every feed sender is gone.
    pub async fn run(&mut self, mut events: Receiver<FeedEvent>, shutdown: CancellationToken) -> IngestStats {
        info!("Ingestor started");
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Ingestor received shutdown signal");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        info!("Feed closed, no more items");
                        break;
                    }
                },
            };

            match event {
                FeedEvent::Item(item) => self.process(item, &shutdown).await,
                FeedEvent::TransportError { status, message } => {
                    self.stats.transport_errors += 1;
                    match status {
                        Some(code) => error!("Feed transport error (status {}): {}", code, message),
                        None => error!("Feed transport error: {}", message),
                    }
                }
            }
        }

        events.close();
        info!(
            "Ingestor stopped: received={} emitted={} dropped={} transport_errors={}",
            self.stats.received, self.stats.emitted, self.stats.dropped, self.stats.transport_errors
        );
        self.stats
    }

    async fn process(&mut self, item: FeedItem, shutdown: &CancellationToken) {
        self.stats.received += 1;
        let payload = item.text.unwrap_or_else(|| Payload::Text(String::new()));

        let classifier = Arc::clone(&self.classifier);
        let mut task = tokio::task::spawn_blocking(move || classify_with_fallback(&classifier, payload));

        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = shutdown.cancelled() => {
                match tokio::time::timeout(self.drain_timeout, &mut task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!("In-flight item did not finish within {:?}, abandoning it", self.drain_timeout);
                        task.abort();
                        self.stats.dropped += 1;
                        return;
                    }
                }
            }
        };

        match joined {
            Ok(Ok(result)) => {
                self.sink.emit(&result);
                self.stats.emitted += 1;
            }
            Ok(Err(failure)) => {
                error!("Dropping item: {}", failure);
                self.stats.dropped += 1;
            }
            Err(e) => {
                error!("Classification task failed: {}", e);
                self.stats.dropped += 1;
            }
        }
    }
}
