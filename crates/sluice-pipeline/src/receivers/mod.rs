//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Receivers for the Sluice pipeline
//!
//! A receiver turns external input into [`TelemetryRecord`]s and hands them to
//! the router through a [`RecordEmitter`]. Pull receivers scrape a source on a
//! fixed interval; push receivers consume payloads sent to their
//! [`PushHandle`]. Malformed input and read failures are counted and logged,
//! they never stop a receiver.

pub mod decode;
pub mod pull;
pub mod push;

pub use decode::{LineDecoder, METRIC_NAME_ATTRIBUTE};
pub use pull::{FileSource, HttpScrapeSource, PullReceiver, PullSource};
pub use push::{PushBody, PushHandle, PushPayload, PushReceiver};

use async_trait::async_trait;
use sluice_core::metrics::names::{self, labels};
use sluice_core::{
    AttributeSpec, EngineMetrics, PipelineError, PipelineResult, ReceiverKind, ReceiverSpec,
    TelemetryRecord,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

use crate::pipeline::Router;

/// How a receiver obtains input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverMode {
    Pull,
    Push,
}

/// Receiver trait
#[async_trait]
pub trait Receiver: Send {
    /// Configured receiver id
    fn id(&self) -> &str;

    fn mode(&self) -> ReceiverMode;

    /// Run until the shutdown signal fires
    async fn run(&mut self, ctx: ReceiverContext) -> PipelineResult<()>;
}

/// Everything a running receiver needs from the engine
pub struct ReceiverContext {
    pub emitter: RecordEmitter,
    pub shutdown: watch::Receiver<bool>,
}

impl ReceiverContext {
    pub fn new(emitter: RecordEmitter, shutdown: watch::Receiver<bool>) -> Self {
        Self { emitter, shutdown }
    }
}

/// Wait for the shutdown signal; a dropped sender counts as shutdown
pub(crate) async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Tags records with receiver metadata and hands them to the router
#[derive(Clone)]
pub struct RecordEmitter {
    receiver: Arc<str>,
    resource: Arc<[(String, String)]>,
    router: Arc<Router>,
    metrics: Arc<EngineMetrics>,
}

impl RecordEmitter {
    pub fn new(
        receiver: &str,
        resource_attributes: &[AttributeSpec],
        router: Arc<Router>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            receiver: Arc::from(receiver),
            resource: resource_attributes
                .iter()
                .map(|attr| (attr.key.clone(), attr.value.clone()))
                .collect(),
            router,
            metrics,
        }
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    /// Stamp origin and resource attributes, then route
    ///
    /// Configured resource attributes overwrite values carried by the input.
    pub fn emit(&self, record: TelemetryRecord) {
        let record = record
            .derive()
            .resources(self.resource.iter().cloned())
            .origin(&*self.receiver)
            .build_shared();

        self.metrics.increment(
            names::RECORDS_RECEIVED_TOTAL,
            &[(labels::RECEIVER, &*self.receiver)],
            1,
        );
        self.router.route(&self.receiver, record);
    }

    /// Input that could not be decoded
    pub fn malformed(&self, err: &PipelineError) {
        warn!(
            receiver = %self.receiver,
            context = %err.context(),
            error = %err,
            "Dropping malformed input"
        );
        self.metrics.increment(
            names::RECEIVER_MALFORMED_TOTAL,
            &[(labels::RECEIVER, &*self.receiver)],
            1,
        );
    }

    /// The source could not be read
    pub fn source_error(&self, err: &PipelineError) {
        warn!(
            receiver = %self.receiver,
            context = %err.context(),
            error = %err,
            "Receiver source read failed"
        );
        self.metrics.increment(
            names::RECEIVER_ERRORS_TOTAL,
            &[(labels::RECEIVER, &*self.receiver)],
            1,
        );
    }
}

/// Build a receiver from its spec
///
/// Push receivers also return the handle producers use to feed them.
pub fn build_receiver(
    id: &str,
    spec: &ReceiverSpec,
) -> PipelineResult<(Box<dyn Receiver>, Option<PushHandle>)> {
    spec.validate_kind(id)?;
    let decoder = LineDecoder::new(spec.format, spec.signal_type);

    let source: Box<dyn PullSource> = match spec.kind {
        ReceiverKind::File => {
            let path = spec.path.clone().ok_or_else(|| {
                PipelineError::configuration(format!("receiver '{}' requires 'path'", id))
            })?;
            Box::new(FileSource::new(path))
        }
        ReceiverKind::HttpScrape => {
            let url = spec.url.clone().ok_or_else(|| {
                PipelineError::configuration(format!("receiver '{}' requires 'url'", id))
            })?;
            Box::new(HttpScrapeSource::new(url, spec.timeout())?)
        }
        ReceiverKind::Push => {
            let (receiver, handle) = PushReceiver::new(id, decoder, spec.buffer);
            let receiver: Box<dyn Receiver> = Box::new(receiver);
            return Ok((receiver, Some(handle)));
        }
    };

    let receiver: Box<dyn Receiver> =
        Box::new(PullReceiver::new(id, spec.interval(), decoder, source));
    Ok((receiver, None))
}
