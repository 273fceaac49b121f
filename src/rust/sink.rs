use std::io::{self, Write};
use std::sync::Mutex;

use log::error;

use crate::classifier::ClassificationResult;

/// Destination for classification results. Emitting is fire-and-forget.
pub trait ResultSink: Send + Sync {
    fn emit(&self, result: &ClassificationResult);
}

fn format_score(score: Option<f32>) -> String {
    score.map_or_else(|| "n/a".to_string(), |s| format!("{:.3}", s))
}

/// Prints matches that are neither rare nor rejected, one block per item:
/// match score, reject score and mean log-probability, then the quoted text.
pub struct ConsoleSink<W: Write + Send = io::Stdout> {
    out: Mutex<W>,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_result(out: &mut W, result: &ClassificationResult) -> io::Result<()> {
        writeln!(
            out,
            "{} {} {:.5}",
            format_score(result.match_score),
            format_score(result.reject_score),
            result.prob
        )?;
        writeln!(out, "{:?}", result.text)?;
        writeln!(out)?;
        out.flush()
    }
}

impl<W: Write + Send> ResultSink for ConsoleSink<W> {
    fn emit(&self, result: &ClassificationResult) {
        if !result.is_clean_match() {
            return;
        }
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = Self::write_result(&mut out, result) {
            error!("Failed to write result: {}", e);
        }
    }
}

/// Writes every result as a single JSON line.
pub struct JsonLinesSink<W: Write + Send = io::Stdout> {
    out: Mutex<W>,
}

impl JsonLinesSink {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ResultSink for JsonLinesSink<W> {
    fn emit(&self, result: &ClassificationResult) {
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let written = serde_json::to_writer(&mut *out, result)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(out))
            .and_then(|()| out.flush());
        if let Err(e) = written {
            error!("Failed to write result: {}", e);
        }
    }
}
