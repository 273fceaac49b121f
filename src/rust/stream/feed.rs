use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{FeedEvent, FeedItem, Payload};

/// How each line of a feed is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedFormat {
    /// One JSON object per line, text under the `text` key
    #[default]
    Json,
    /// Each line is an item's raw bytes
    Raw,
}

fn strip_line_ending(mut line: &[u8]) -> &[u8] {
    while let Some((&last, rest)) = line.split_last() {
        if last == b'\n' || last == b'\r' {
            line = rest;
        } else {
            break;
        }
    }
    line
}

/// Turns one line of input into a feed event. Blank lines yield nothing.
pub(crate) fn parse_line(format: FeedFormat, line: &[u8]) -> Option<FeedEvent> {
    let line = strip_line_ending(line);
    match format {
        FeedFormat::Raw => Some(FeedEvent::Item(FeedItem {
            text: Some(Payload::Bytes(line.to_vec())),
        })),
        FeedFormat::Json => {
            if line.iter().all(u8::is_ascii_whitespace) {
                return None;
            }
            match serde_json::from_slice::<FeedItem>(line) {
                Ok(item) => Some(FeedEvent::Item(item)),
                Err(e) => Some(FeedEvent::TransportError {
                    status: None,
                    message: format!("malformed feed line: {}", e),
                }),
            }
        }
    }
}

/// Longest HTTP feed line accepted before it is discarded
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
enum FramedLine {
    Complete(Vec<u8>),
    /// A line longer than the cap. Its bytes are discarded up to the next newline.
    Oversized,
}

/// Splits a chunked byte stream into newline-terminated lines.
///
/// Bytes already searched for a newline are not scanned again, and a pending
/// partial line never grows past `max_line` bytes.
#[derive(Debug)]
struct LineBuffer {
    buf: Vec<u8>,
    scanned: usize,
    max_line: usize,
    discarding: bool,
}

impl LineBuffer {
    fn new(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_line,
            discarding: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Vec<FramedLine> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset + 1;
            if self.discarding {
                self.discarding = false;
            } else if end - start > self.max_line {
                lines.push(FramedLine::Oversized);
            } else {
                lines.push(FramedLine::Complete(self.buf[start..end].to_vec()));
            }
            start = end;
            self.scanned = end;
        }

        self.buf.drain(..start);
        self.scanned = self.buf.len();

        if self.buf.len() > self.max_line {
            self.buf.clear();
            self.scanned = 0;
            if !self.discarding {
                self.discarding = true;
                lines.push(FramedLine::Oversized);
            }
        }
        lines
    }

    /// The trailing partial line, if any, once the stream has ended.
    fn finish(&mut self) -> Option<Vec<u8>> {
        if self.discarding || self.buf.is_empty() {
            return None;
        }
        self.scanned = 0;
        Some(std::mem::take(&mut self.buf))
    }
}

/// Returns `false` once the receiving side has gone away.
async fn push(sender: &Sender<FeedEvent>, event: FeedEvent) -> bool {
    if sender.send(event).await.is_err() {
        debug!("Feed receiver dropped, stopping feed");
        return false;
    }
    true
}

/// A newline-delimited feed read from any async reader (stdin, a file, a pipe).
///
/// End of input ends the feed. A read error is reported as a transport error,
/// after which the feed stops reading but keeps its sender open until shutdown,
/// so the ingestor keeps listening.
pub struct LinesFeed<R> {
    reader: R,
    format: FeedFormat,
}

impl LinesFeed<BufReader<Stdin>> {
    pub fn stdin(format: FeedFormat) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), format)
    }
}

impl<R> LinesFeed<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, format: FeedFormat) -> Self {
        Self { reader, format }
    }

    /// Starts reading on a new task. The reader is dropped when the task ends.
    pub fn spawn(self, sender: Sender<FeedEvent>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(sender, shutdown))
    }

    async fn run(mut self, sender: Sender<FeedEvent>, shutdown: CancellationToken) {
        info!("Line feed started ({:?})", self.format);
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Line feed received shutdown signal");
                    break;
                }
                read = self.reader.read_until(b'\n', &mut line) => read,
            };

            match read {
                Ok(0) => {
                    info!("Line feed reached end of input");
                    break;
                }
                Ok(_) => {
                    if let Some(event) = parse_line(self.format, &line) {
                        if !push(&sender, event).await {
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!("Line feed read failed: {}", e);
                    let event = FeedEvent::TransportError {
                        status: None,
                        message: format!("read failed: {}", e),
                    };
                    if push(&sender, event).await {
                        warn!("Line feed is no longer delivering items; waiting for shutdown");
                        shutdown.cancelled().await;
                    }
                    break;
                }
            }
        }
        info!("Line feed stopped");
    }
}

/// A long-lived streaming HTTP feed.
///
/// Issues a single GET (with `track=<term>` when a term is configured) and
/// reads the body as newline-delimited items. A non-2xx status or a
/// connection fault is reported as a transport error; the feed then stays
/// idle until shutdown rather than reconnecting.
pub struct HttpFeed {
    url: String,
    track: Option<String>,
    format: FeedFormat,
    client: reqwest::Client,
    max_line_bytes: usize,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            track: None,
            format: FeedFormat::Json,
            client: reqwest::Client::new(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Sets the query term the server filters the stream by.
    pub fn with_track(mut self, term: impl Into<String>) -> Self {
        self.track = Some(term.into());
        self
    }

    pub fn with_format(mut self, format: FeedFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Sets the longest line kept. Longer lines are reported and skipped.
    pub fn with_max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max;
        self
    }

    /// Connects and streams on a new task. The connection is dropped when the task ends.
    pub fn spawn(self, sender: Sender<FeedEvent>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(sender, shutdown))
    }

    async fn run(self, sender: Sender<FeedEvent>, shutdown: CancellationToken) {
        let fault = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("HTTP feed received shutdown signal");
                return;
            }
            fault = self.stream(&sender) => fault,
        };

        if let Some(event) = fault {
            if !push(&sender, event).await {
                return;
            }
        }

        warn!("HTTP feed is no longer delivering items; waiting for shutdown");
        shutdown.cancelled().await;
        info!("HTTP feed stopped");
    }

    /// Streams until the connection ends. Returns the transport error to report, if any.
    async fn stream(&self, sender: &Sender<FeedEvent>) -> Option<FeedEvent> {
        let mut request = self.client.get(&self.url);
        if let Some(term) = &self.track {
            request = request.query(&[("track", term.as_str())]);
        }

        info!("Connecting to feed at {}", self.url);
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Feed connection failed: {}", e);
                return Some(FeedEvent::TransportError {
                    status: e.status().map(|s| s.as_u16()),
                    message: format!("connection failed: {}", e),
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!("Feed responded with status {}", status);
            return Some(FeedEvent::TransportError {
                status: Some(status.as_u16()),
                message: format!("unexpected status {}", status),
            });
        }
        info!("Feed connected ({})", status);

        let mut body = response.bytes_stream();
        let mut lines = LineBuffer::new(self.max_line_bytes);
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    error!("Feed stream failed: {}", e);
                    return Some(FeedEvent::TransportError {
                        status: None,
                        message: format!("stream failed: {}", e),
                    });
                }
            };

            for framed in lines.push(&chunk) {
                let event = match framed {
                    FramedLine::Complete(line) => parse_line(self.format, &line),
                    FramedLine::Oversized => {
                        warn!("Feed line exceeds {} bytes, discarding it", self.max_line_bytes);
                        Some(FeedEvent::TransportError {
                            status: None,
                            message: format!("line exceeds {} bytes, discarded", self.max_line_bytes),
                        })
                    }
                };
                if let Some(event) = event {
                    if !push(sender, event).await {
                        return None;
                    }
                }
            }
        }

        if let Some(rest) = lines.finish() {
            if let Some(event) = parse_line(self.format, &rest) {
                push(sender, event).await;
            }
        }

        Some(FeedEvent::TransportError {
            status: None,
            message: "feed connection closed by server".to_string(),
        })
    }
}
