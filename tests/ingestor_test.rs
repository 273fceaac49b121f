use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use topicsieve::{
    ClassificationResult, Classifier, ExemplarSource, FeedEvent, FeedFormat, FeedItem, IngestStats,
    LinesFeed, Payload, ResultSink, StreamIngestor, VectorTable,
};

#[derive(Default)]
struct CollectingSink {
    results: Mutex<Vec<ClassificationResult>>,
}

impl CollectingSink {
    fn results(&self) -> Vec<ClassificationResult> {
        self.results.lock().unwrap().clone()
    }
}

impl ResultSink for CollectingSink {
    fn emit(&self, result: &ClassificationResult) {
        self.results.lock().unwrap().push(result.clone());
    }
}

fn classifier() -> Arc<Classifier> {
    let table = VectorTable::parse("cat -5.0 1.0 0.0\nkitten -6.0 0.9 0.1\nstock -5.0 0.0 1.0\n").unwrap();
    Arc::new(
        Classifier::builder()
            .with_provider(Arc::new(table))
            .with_target(ExemplarSource::inline(vec!["cat", "kitten"]))
            .with_reject(ExemplarSource::inline(vec!["stock"]))
            .build()
            .unwrap(),
    )
}

fn ingestor(sink: &Arc<CollectingSink>) -> StreamIngestor {
    StreamIngestor::new(classifier(), Arc::clone(sink) as Arc<dyn ResultSink>)
        .with_drain_timeout(Duration::from_secs(1))
}

async fn wait_for_results(sink: &CollectingSink, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while sink.results().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("results did not arrive in time");
}

#[tokio::test]
async fn test_bytes_payload_is_decoded_on_retry() {
    let sink = Arc::new(CollectingSink::default());
    let (tx, rx) = mpsc::channel(8);
    tx.send(FeedEvent::Item(FeedItem::new(b"kitten".to_vec()))).await.unwrap();
    drop(tx);

    let stats = ingestor(&sink).run(rx, CancellationToken::new()).await;

    assert_eq!(
        stats,
        IngestStats {
            received: 1,
            emitted: 1,
            dropped: 0,
            transport_errors: 0,
        }
    );
    let results = sink.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "kitten");
    assert!(results[0].is_match);
}

#[tokio::test]
async fn test_transport_error_does_not_stop_the_loop() {
    let sink = Arc::new(CollectingSink::default());
    let (tx, rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();

    let handle = {
        let sink = Arc::clone(&sink);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { ingestor(&sink).run(rx, shutdown).await })
    };

    tx.send(FeedEvent::TransportError {
        status: Some(420),
        message: "enhance your calm".into(),
    })
    .await
    .unwrap();
    tx.send(FeedEvent::Item(FeedItem::new("cat"))).await.unwrap();

    wait_for_results(&sink, 1).await;
    assert!(!handle.is_finished(), "ingestor must keep listening after a transport error");

    shutdown.cancel();
    let stats = handle.await.unwrap();
    assert_eq!(stats.transport_errors, 1);
    assert_eq!(stats.emitted, 1);
    assert_eq!(sink.results().len(), 1);
    drop(tx);
}

#[tokio::test]
async fn test_bad_items_are_dropped_in_isolation() {
    let sink = Arc::new(CollectingSink::default());
    let (tx, rx) = mpsc::channel(8);
    tx.send(FeedEvent::Item(FeedItem::new(vec![0x63, 0x61, 0xff]))).await.unwrap();
    tx.send(FeedEvent::Item(FeedItem::default())).await.unwrap();
    tx.send(FeedEvent::Item(FeedItem {
        text: Some(Payload::Text("stock".into())),
    }))
    .await
    .unwrap();
    drop(tx);

    let stats = ingestor(&sink).run(rx, CancellationToken::new()).await;

    assert_eq!(stats.received, 3);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.emitted, 2);

    let results = sink.results();
    // A missing text is classified as the empty string.
    assert_eq!(results[0].text, "");
    assert!(results[0].is_rare);
    assert_eq!(results[1].text, "stock");
    assert!(results[1].is_reject);
    assert!(!results[1].is_match);
}

#[tokio::test]
async fn test_shutdown_stops_an_idle_loop() {
    let sink = Arc::new(CollectingSink::default());
    let (_tx, rx) = mpsc::channel::<FeedEvent>(8);
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let stats = ingestor(&sink).run(rx, shutdown).await;
    assert_eq!(stats, IngestStats::default());
}

#[tokio::test]
async fn test_raw_line_feed_end_to_end() {
    let sink = Arc::new(CollectingSink::default());
    let (tx, rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();

    let input: &'static [u8] = b"cat kitten\r\nstock\n\xff\xfe\n";
    let feed = LinesFeed::new(input, FeedFormat::Raw).spawn(tx, shutdown.clone());
    let stats = ingestor(&sink).run(rx, shutdown).await;
    feed.await.unwrap();

    assert_eq!(stats.received, 3);
    assert_eq!(stats.emitted, 2);
    assert_eq!(stats.dropped, 1);
    let texts: Vec<String> = sink.results().into_iter().map(|r| r.text).collect();
    assert_eq!(texts, vec!["cat kitten", "stock"]);
}

#[tokio::test]
async fn test_read_error_keeps_ingestor_listening() {
    let sink = Arc::new(CollectingSink::default());
    let (tx, rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();

    let reader = tokio_test::io::Builder::new()
        .read(b"{\"text\":\"cat\"}\n")
        .read_error(io::Error::new(io::ErrorKind::Other, "device unplugged"))
        .build();
    let feed = LinesFeed::new(BufReader::new(reader), FeedFormat::Json).spawn(tx, shutdown.clone());

    let handle = {
        let sink = Arc::clone(&sink);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { ingestor(&sink).run(rx, shutdown).await })
    };

    wait_for_results(&sink, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished(), "a read error must not end ingestion");
    assert!(!feed.is_finished());

    shutdown.cancel();
    let stats = handle.await.unwrap();
    feed.await.unwrap();
    assert_eq!(stats.emitted, 1);
    assert_eq!(stats.transport_errors, 1);
}
