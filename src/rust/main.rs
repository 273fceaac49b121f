use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use topicsieve::{
    Classifier, ClassifierConfig, ConsoleSink, ExemplarSource, FeedFormat, HttpFeed, JsonLinesSink,
    LinesFeed, ReloadPolicy, ResultSink, StreamIngestor, VectorSource, VectorStore, VectorTable,
};

const FEED_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InputFormat {
    /// One JSON object per line with a `text` field
    Json,
    /// Each line is raw text bytes
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    /// Print clean matches with their scores
    Matches,
    /// Print every result as a JSON line
    Json,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Query term the feed server tracks (sent as `track=` to --feed-url)
    #[arg(long, env = "TOPICSIEVE_TRACK")]
    track: Option<String>,

    /// File of whitespace-separated terms describing the topic to match
    #[arg(long, env = "TOPICSIEVE_TARGET")]
    target: PathBuf,

    /// File of whitespace-separated terms describing the noise to reject
    #[arg(long, env = "TOPICSIEVE_REJECT")]
    reject: PathBuf,

    /// Items whose mean token log-probability is below this are rare
    #[arg(long, default_value_t = topicsieve::config::DEFAULT_MIN_LOG_PROB, allow_hyphen_values = true)]
    min_log_prob: f32,

    /// Minimum similarity to the target exemplars for a match
    #[arg(long, default_value_t = topicsieve::config::DEFAULT_MIN_MATCH_SIMILARITY, allow_hyphen_values = true)]
    min_match: f32,

    /// Similarity to the reject exemplars at which an item is rejected
    #[arg(long, default_value_t = topicsieve::config::DEFAULT_MAX_REJECT_SIMILARITY, allow_hyphen_values = true)]
    max_reject: f32,

    /// Local word-vector table (`term log_prob v1 .. vD` per line)
    #[arg(long, env = "TOPICSIEVE_VECTORS", conflicts_with = "vectors_url")]
    vectors: Option<PathBuf>,

    /// Download the word-vector table from this URL into the local cache
    #[arg(long, requires = "vectors_sha256")]
    vectors_url: Option<String>,

    /// Expected SHA-256 of the downloaded vector table
    #[arg(long)]
    vectors_sha256: Option<String>,

    /// Force a fresh download of the vector table
    #[arg(short, long)]
    fresh: bool,

    /// Stream items from this URL instead of standard input
    #[arg(long)]
    feed_url: Option<String>,

    /// How feed lines are interpreted
    #[arg(long, value_enum, default_value_t = InputFormat::Json)]
    format: InputFormat,

    /// What to print for each classified item
    #[arg(long, value_enum, default_value_t = OutputMode::Matches)]
    output: OutputMode,

    /// Cache exemplar meanings and reload only when the files change
    #[arg(long)]
    cache_exemplars: bool,

    /// Time allowed for the in-flight item to finish after shutdown
    #[arg(long, default_value_t = 5000)]
    drain_timeout_ms: u64,
}

impl From<InputFormat> for FeedFormat {
    fn from(format: InputFormat) -> Self {
        match format {
            InputFormat::Json => FeedFormat::Json,
            InputFormat::Raw => FeedFormat::Raw,
        }
    }
}

async fn resolve_vector_table(args: &Args) -> Result<PathBuf> {
    if let Some(path) = &args.vectors {
        return Ok(path.clone());
    }

    let Some(url) = &args.vectors_url else {
        bail!("No word vectors configured: pass --vectors <path> or --vectors-url with --vectors-sha256");
    };
    let sha256 = args
        .vectors_sha256
        .as_deref()
        .context("--vectors-url requires --vectors-sha256")?;

    let store = VectorStore::new_default().context("Failed to create vector cache directory")?;
    let source = VectorSource::from_url(url.as_str(), sha256);

    if args.fresh {
        info!("Fresh download requested - removing any cached table...");
        store.remove_download(&source.name)?;
    }

    let path = store
        .ensure_downloaded(&source)
        .await
        .with_context(|| format!("Failed to fetch vector table from {}", url))?;
    Ok(path)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}

async fn run(args: Args) -> Result<()> {
    info!("=== Starting topicsieve ===");

    let config = ClassifierConfig::new(args.min_log_prob, args.min_match, args.max_reject);
    config.validate()?;

    let table_path = resolve_vector_table(&args).await?;
    let table = VectorTable::from_file(&table_path)
        .with_context(|| format!("Failed to load word vectors from {}", table_path.display()))?;

    let policy = if args.cache_exemplars {
        ReloadPolicy::OnChange
    } else {
        ReloadPolicy::EveryCall
    };

    let classifier = Classifier::builder()
        .with_provider(Arc::new(table))
        .with_config(config)
        .with_target(ExemplarSource::file(&args.target))
        .with_reject(ExemplarSource::file(&args.reject))
        .with_reload_policy(policy)
        .build()
        .context("Failed to build classifier")?;

    let info = classifier.info();
    info!(
        "Target: {} ({}/{} terms), reject: {} ({}/{} terms), {} dimensions",
        info.target_source,
        info.target_resolved,
        info.target_terms,
        info.reject_source,
        info.reject_resolved,
        info.reject_terms,
        info.dimensions
    );

    let sink: Arc<dyn ResultSink> = match args.output {
        OutputMode::Matches => Arc::new(ConsoleSink::stdout()),
        OutputMode::Json => Arc::new(JsonLinesSink::stdout()),
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let (sender, receiver) = mpsc::channel(FEED_CHANNEL_CAPACITY);
    let feed = match &args.feed_url {
        Some(url) => {
            let mut feed = HttpFeed::new(url.as_str()).with_format(args.format.into());
            if let Some(term) = &args.track {
                feed = feed.with_track(term.as_str());
            }
            feed.spawn(sender, shutdown.clone())
        }
        None => {
            if args.track.is_some() {
                warn!("--track only applies to --feed-url; reading standard input unfiltered");
            }
            LinesFeed::stdin(args.format.into()).spawn(sender, shutdown.clone())
        }
    };

    let drain_timeout = Duration::from_millis(args.drain_timeout_ms);
    let mut ingestor = StreamIngestor::new(Arc::new(classifier), sink).with_drain_timeout(drain_timeout);
    let stats = ingestor.run(receiver, shutdown.clone()).await;

    shutdown.cancel();
    if tokio::time::timeout(drain_timeout, feed).await.is_err() {
        warn!("Feed did not stop within {:?}", drain_timeout);
    }

    info!(
        "=== Done: {} received, {} emitted, {} dropped, {} transport errors ===",
        stats.received, stats.emitted, stats.dropped, stats.transport_errors
    );
    Ok(())
}

fn main() -> Result<()> {
    topicsieve::init_logger();
    let args = Args::parse();
    let drain_timeout = Duration::from_millis(args.drain_timeout_ms);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(run(args));
    // A pending stdin read lives on a blocking thread; don't wait on it forever.
    runtime.shutdown_timeout(drain_timeout);
    result
}
