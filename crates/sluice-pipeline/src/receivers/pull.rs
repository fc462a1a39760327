//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Pull receivers
//!
//! A [`PullReceiver`] asks its [`PullSource`] for new lines on a fixed
//! interval. Missed ticks are delayed rather than bursted, so a slow scrape
//! never triggers a catch-up storm. A source reports each unreadable line as
//! an error of its own, which the receiver counts as malformed input.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use sluice_core::{PipelineError, PipelineResult};
use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::{
    shutdown_signalled, LineDecoder, Receiver, ReceiverContext, ReceiverMode, RecordEmitter,
};

/// Longest line a [`FileSource`] buffers while waiting for its newline
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Lines from one scrape; an `Err` entry is a line that could not be read
pub type ScrapedLines = Vec<PipelineResult<String>>;

/// Source polled by a pull receiver
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PullSource: Send {
    /// Human readable location for logs
    fn describe(&self) -> String;

    /// Lines produced since the previous scrape
    async fn scrape(&mut self) -> PipelineResult<ScrapedLines>;
}

/// Reads lines appended to a file between scrapes
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    offset: u64,
    partial: Vec<u8>,
    max_line: usize,
    /// Inside a line already reported as too long
    skipping: bool,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            partial: Vec::new(),
            max_line: MAX_LINE_BYTES,
            skipping: false,
        }
    }

    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line.max(1);
        self
    }

    fn too_long(&self) -> PipelineError {
        PipelineError::source_read(format!(
            "line in {} exceeds {} bytes",
            self.path.display(),
            self.max_line
        ))
    }

    fn decode_line(&self, line: &[u8]) -> PipelineResult<String> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.len() > self.max_line {
            return Err(self.too_long());
        }
        std::str::from_utf8(line).map(str::to_string).map_err(|e| {
            let message = format!("invalid UTF-8 in {}", self.path.display());
            PipelineError::source_read_with_source(message, e)
        })
    }

    /// Split buffered bytes into complete lines, keeping the unterminated tail
    fn take_lines(&mut self) -> ScrapedLines {
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.partial[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            if self.skipping {
                self.skipping = false;
            } else {
                lines.push(self.decode_line(&self.partial[start..end]));
            }
            start = end + 1;
        }
        self.partial.drain(..start);

        if self.skipping {
            self.partial.clear();
        } else if self.partial.len() > self.max_line {
            debug!(path = %self.path.display(), "Discarding overlong partial line");
            lines.push(Err(self.too_long()));
            self.partial.clear();
            self.skipping = true;
        }
        lines
    }
}

#[async_trait]
impl PullSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn scrape(&mut self) -> PipelineResult<ScrapedLines> {
        let path = self.path.clone();
        let read_error = |e: std::io::Error| {
            PipelineError::source_read_with_source(format!("failed to read {}", path.display()), e)
        };

        let mut file = tokio::fs::File::open(&path).await.map_err(read_error)?;
        let len = file.metadata().await.map_err(read_error)?.len();

        // Rotated or truncated
        if len < self.offset {
            debug!(path = %path.display(), "File shrank, reading from start");
            self.offset = 0;
            self.partial.clear();
            self.skipping = false;
        }

        file.seek(SeekFrom::Start(self.offset)).await.map_err(read_error)?;
        let mut appended = Vec::new();
        file.read_to_end(&mut appended).await.map_err(read_error)?;
        self.offset += appended.len() as u64;
        self.partial.extend_from_slice(&appended);

        Ok(self.take_lines())
    }
}

/// Scrapes an HTTP endpoint
#[derive(Debug)]
pub struct HttpScrapeSource {
    client: reqwest::Client,
    url: String,
}

impl HttpScrapeSource {
    pub fn new(url: String, timeout: Duration) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::internal_with_source("failed to create HTTP client", e))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl PullSource for HttpScrapeSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn scrape(&mut self) -> PipelineResult<ScrapedLines> {
        let failed = |e: reqwest::Error| {
            PipelineError::source_read_with_source(format!("scrape of {} failed", self.url), e)
        };
        let response = self.client.get(&self.url).send().await.map_err(failed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::source_read(format!(
                "scrape of {} returned status {}",
                self.url, status
            )));
        }

        let body = response.text().await.map_err(failed)?;
        Ok(body.lines().map(|line| Ok(line.to_string())).collect())
    }
}

/// Interval-driven receiver
pub struct PullReceiver {
    id: String,
    interval: Duration,
    decoder: LineDecoder,
    source: Box<dyn PullSource>,
}

impl PullReceiver {
    pub fn new(
        id: &str,
        interval: Duration,
        decoder: LineDecoder,
        source: Box<dyn PullSource>,
    ) -> Self {
        Self {
            id: id.to_string(),
            interval,
            decoder,
            source,
        }
    }

    async fn poll(&mut self, emitter: &RecordEmitter) {
        let lines = match self.source.scrape().await {
            Ok(lines) => lines,
            Err(e) => {
                emitter.source_error(&e);
                return;
            }
        };

        for line in lines {
            match line.and_then(|line| self.decoder.decode(&line)) {
                Ok(Some(record)) => emitter.emit(record),
                Ok(None) => {}
                Err(e) => emitter.malformed(&e),
            }
        }
    }
}

#[async_trait]
impl Receiver for PullReceiver {
    fn id(&self) -> &str {
        &self.id
    }

    fn mode(&self) -> ReceiverMode {
        ReceiverMode::Pull
    }

    async fn run(&mut self, ctx: ReceiverContext) -> PipelineResult<()> {
        let ReceiverContext { emitter, mut shutdown } = ctx;
        info!(receiver = %self.id, source = %self.source.describe(), "Pull receiver started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown) => break,
                _ = ticker.tick() => self.poll(&emitter).await,
            }
        }

        info!(receiver = %self.id, "Pull receiver stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineInput, Router};
    use sluice_core::metrics::names::{self, labels};
    use sluice_core::{
        Body, EngineMetrics, PipelineInputSpec, RecordFormat, SharedRecord, SignalType,
    };
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::{mpsc, watch};

    fn emitter(metrics: Arc<EngineMetrics>) -> (RecordEmitter, mpsc::Receiver<SharedRecord>) {
        let (tx, rx) = mpsc::channel(64);
        let mut router = Router::new(metrics.clone());
        router.add_route(
            "scrape",
            SignalType::Log,
            PipelineInput::new("logs", tx, &PipelineInputSpec::default()),
        );
        let resource = [sluice_core::AttributeSpec::new("host", "a")];
        (RecordEmitter::new("scrape", &resource, Arc::new(router), metrics), rx)
    }

    async fn append(path: &std::path::Path, text: &str) {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .unwrap();
        file.write_all(text.as_bytes()).await.unwrap();
    }

    async fn scrape_ok(source: &mut FileSource) -> Vec<String> {
        source
            .scrape()
            .await
            .unwrap()
            .into_iter()
            .map(Result::unwrap)
            .collect()
    }

    #[tokio::test]
    async fn test_file_source_tracks_offset_and_partial_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut source = FileSource::new(&path);

        append(&path, "one\ntwo\r\nthr").await;
        assert_eq!(scrape_ok(&mut source).await, vec!["one", "two"]);

        append(&path, "ee\n").await;
        assert_eq!(scrape_ok(&mut source).await, vec!["three"]);
        assert!(scrape_ok(&mut source).await.is_empty());

        tokio::fs::write(&path, "new\n").await.unwrap();
        assert_eq!(scrape_ok(&mut source).await, vec!["new"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_an_error_of_its_own() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        tokio::fs::write(&path, b"before\n\xff\xfebad\nafter\n").await.unwrap();
        let mut source = FileSource::new(&path);

        let lines = source.scrape().await.unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].as_deref().unwrap(), "before");
        assert_eq!(lines[1].as_ref().unwrap_err().error_type(), "SourceRead");
        assert_eq!(lines[2].as_deref().unwrap(), "after");
    }

    #[tokio::test]
    async fn test_overlong_line_discarded_until_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let mut source = FileSource::new(&path).with_max_line(8);

        append(&path, "short\n0123456789").await;
        let lines = source.scrape().await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].as_deref().unwrap(), "short");
        assert!(lines[1].is_err());
        assert!(source.partial.is_empty());

        append(&path, "still the same line").await;
        assert!(source.scrape().await.unwrap().is_empty());
        assert!(source.partial.is_empty());

        append(&path, " end\nnext\n").await;
        assert_eq!(scrape_ok(&mut source).await, vec!["next"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let mut source = FileSource::new(dir.path().join("absent.log"));
        assert_eq!(source.scrape().await.unwrap_err().error_type(), "SourceRead");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_receiver_decodes_and_counts() {
        let metrics = EngineMetrics::shared();
        let (emitter, mut rx) = emitter(metrics.clone());

        let mut source = MockPullSource::new();
        source.expect_describe().return_const("mock".to_string());
        let mut calls = 0;
        source.expect_scrape().returning(move || {
            calls += 1;
            match calls {
                1 => Ok(vec![
                    Ok("{\"body\":\"ok\"}".to_string()),
                    Ok("{broken".to_string()),
                    Err(PipelineError::source_read("invalid UTF-8")),
                    Ok(String::new()),
                ]),
                2 => Err(PipelineError::source_read("unreachable")),
                _ => Ok(Vec::new()),
            }
        });

        let mut receiver = PullReceiver::new(
            "scrape",
            Duration::from_secs(1),
            LineDecoder::new(RecordFormat::Json, SignalType::Log),
            Box::new(source),
        );
        let (tx, shutdown) = watch::channel(false);
        let task = tokio::spawn(async move {
            receiver.run(ReceiverContext::new(emitter, shutdown)).await
        });

        let record = rx.recv().await.unwrap();
        assert_eq!(record.body(), &Body::Text("ok".into()));
        assert_eq!(record.resource_attribute("host"), Some("a"));
        assert_eq!(record.origin(), Some("scrape"));

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        tx.send(true).unwrap();
        task.await.unwrap().unwrap();

        let by_receiver = [(labels::RECEIVER, "scrape")];
        assert_eq!(metrics.counter_value(names::RECORDS_RECEIVED_TOTAL, &by_receiver), 1);
        assert_eq!(metrics.counter_value(names::RECEIVER_MALFORMED_TOTAL, &by_receiver), 2);
        assert_eq!(metrics.counter_value(names::RECEIVER_ERRORS_TOTAL, &by_receiver), 1);
    }
}
