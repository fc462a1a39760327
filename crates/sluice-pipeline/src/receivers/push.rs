//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Push receivers
//!
//! Producers send [`PushPayload`]s through a cloneable [`PushHandle`] backed
//! by a bounded channel. On shutdown the receiver stops accepting payloads
//! and emits whatever is already buffered.

use async_trait::async_trait;
use sluice_core::utils::trace_context::{parse_traceparent, TraceContext};
use sluice_core::{PipelineError, PipelineResult, TelemetryRecord};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};

use super::{
    shutdown_signalled, LineDecoder, Receiver, ReceiverContext, ReceiverMode, RecordEmitter,
};

/// Payload content
#[derive(Debug, Clone)]
pub enum PushBody {
    /// Newline-delimited input decoded with the receiver's format
    Lines(String),
    /// Records built by the producer
    Records(Vec<TelemetryRecord>),
}

/// One push delivery
#[derive(Debug, Clone)]
pub struct PushPayload {
    pub body: PushBody,

    /// W3C `traceparent` header sent with the payload
    pub traceparent: Option<String>,
}

impl PushPayload {
    pub fn lines(body: impl Into<String>) -> Self {
        Self {
            body: PushBody::Lines(body.into()),
            traceparent: None,
        }
    }

    pub fn records(records: Vec<TelemetryRecord>) -> Self {
        Self {
            body: PushBody::Records(records),
            traceparent: None,
        }
    }

    pub fn with_traceparent(mut self, traceparent: impl Into<String>) -> Self {
        self.traceparent = Some(traceparent.into());
        self
    }
}

/// Producer side of a push receiver
#[derive(Debug, Clone)]
pub struct PushHandle {
    receiver: String,
    sender: mpsc::Sender<PushPayload>,
}

impl PushHandle {
    pub fn receiver_id(&self) -> &str {
        &self.receiver
    }

    /// Send a payload, waiting for buffer space
    pub async fn push(&self, payload: PushPayload) -> PipelineResult<()> {
        self.sender.send(payload).await.map_err(|_| {
            PipelineError::internal(format!("receiver '{}' is stopped", self.receiver))
        })
    }

    /// Send a payload without waiting; a full buffer is a queue overflow
    pub fn try_push(&self, payload: PushPayload) -> PipelineResult<()> {
        self.sender.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => PipelineError::queue_overflow(format!(
                "receiver '{}' buffer is full",
                self.receiver
            )),
            TrySendError::Closed(_) => {
                PipelineError::internal(format!("receiver '{}' is stopped", self.receiver))
            }
        })
    }
}

/// Receiver fed through a [`PushHandle`]
pub struct PushReceiver {
    id: String,
    decoder: LineDecoder,
    inbox: mpsc::Receiver<PushPayload>,
}

impl PushReceiver {
    pub fn new(id: &str, decoder: LineDecoder, buffer: usize) -> (Self, PushHandle) {
        let (sender, inbox) = mpsc::channel(buffer.max(1));
        let receiver = Self {
            id: id.to_string(),
            decoder,
            inbox,
        };
        let handle = PushHandle {
            receiver: id.to_string(),
            sender,
        };
        (receiver, handle)
    }

    fn accept(&self, payload: PushPayload, emitter: &RecordEmitter) {
        let trace = payload
            .traceparent
            .as_deref()
            .and_then(|header| match parse_traceparent(header) {
                Ok(context) => Some(context),
                Err(e) => {
                    warn!(receiver = %self.id, error = %e, "Ignoring invalid traceparent");
                    None
                }
            });

        match payload.body {
            PushBody::Lines(body) => {
                for line in body.lines() {
                    match self.decoder.decode(line) {
                        Ok(Some(record)) => emitter.emit(with_trace(record, trace.as_ref())),
                        Ok(None) => {}
                        Err(e) => emitter.malformed(&e),
                    }
                }
            }
            PushBody::Records(records) => {
                for record in records {
                    emitter.emit(with_trace(record, trace.as_ref()));
                }
            }
        }
    }
}

/// Insert trace attributes the record does not already carry
fn with_trace(record: TelemetryRecord, trace: Option<&TraceContext>) -> TelemetryRecord {
    let trace = match trace {
        Some(trace) => trace,
        None => return record,
    };

    let missing: Vec<_> = trace
        .attributes()
        .into_iter()
        .filter(|(key, _)| record.attribute(key).is_none())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    if missing.is_empty() {
        return record;
    }
    record.derive().attributes(missing).build()
}

#[async_trait]
impl Receiver for PushReceiver {
    fn id(&self) -> &str {
        &self.id
    }

    fn mode(&self) -> ReceiverMode {
        ReceiverMode::Push
    }

    async fn run(&mut self, ctx: ReceiverContext) -> PipelineResult<()> {
        let ReceiverContext { emitter, mut shutdown } = ctx;
        info!(receiver = %self.id, "Push receiver started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown) => break,
                payload = self.inbox.recv() => match payload {
                    Some(payload) => self.accept(payload, &emitter),
                    None => break,
                },
            }
        }

        self.inbox.close();
        while let Ok(payload) = self.inbox.try_recv() {
            self.accept(payload, &emitter);
        }

        info!(receiver = %self.id, "Push receiver stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineInput, Router};
    use sluice_core::metrics::names::{self, labels};
    use sluice_core::utils::trace_context::{SPAN_ID_ATTRIBUTE, TRACE_ID_ATTRIBUTE};
    use sluice_core::{EngineMetrics, PipelineInputSpec, RecordFormat, SharedRecord, SignalType};
    use std::sync::Arc;
    use tokio::sync::watch;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    type Setup = (
        PushReceiver,
        PushHandle,
        RecordEmitter,
        mpsc::Receiver<SharedRecord>,
        Arc<EngineMetrics>,
    );

    fn setup(buffer: usize) -> Setup {
        let metrics = EngineMetrics::shared();
        let (tx, rx) = mpsc::channel(64);
        let mut router = Router::new(metrics.clone());
        let input = PipelineInput::new("logs", tx, &PipelineInputSpec::default());
        router.add_route("ingest", SignalType::Log, input);
        let emitter = RecordEmitter::new("ingest", &[], Arc::new(router), metrics.clone());
        let decoder = LineDecoder::new(RecordFormat::Text, SignalType::Log);
        let (receiver, handle) = PushReceiver::new("ingest", decoder, buffer);
        (receiver, handle, emitter, rx, metrics)
    }

    #[tokio::test]
    async fn test_traceparent_stamped_unless_present() {
        let (mut receiver, handle, emitter, mut rx, _) = setup(8);
        let (tx, shutdown) = watch::channel(false);

        let own = TelemetryRecord::builder(SignalType::Log)
            .attribute(TRACE_ID_ATTRIBUTE, "mine")
            .build();
        let lines = PushPayload::lines("first\n\nsecond").with_traceparent(TRACEPARENT);
        handle.push(lines).await.unwrap();
        handle.push(PushPayload::records(vec![own]).with_traceparent(TRACEPARENT)).await.unwrap();
        handle.push(PushPayload::lines("third").with_traceparent("garbage")).await.unwrap();
        tx.send(true).unwrap();

        receiver.run(ReceiverContext::new(emitter, shutdown)).await.unwrap();

        let mut records = Vec::new();
        while let Ok(record) = rx.try_recv() {
            records.push(record);
        }
        assert_eq!(records.len(), 4);
        let trace_id = Some("4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(records[0].attribute(TRACE_ID_ATTRIBUTE), trace_id);
        assert_eq!(records[1].attribute(SPAN_ID_ATTRIBUTE), Some("00f067aa0ba902b7"));
        assert_eq!(records[2].attribute(TRACE_ID_ATTRIBUTE), Some("mine"));
        assert_eq!(records[2].attribute(SPAN_ID_ATTRIBUTE), Some("00f067aa0ba902b7"));
        assert_eq!(records[3].attribute(TRACE_ID_ATTRIBUTE), None);
    }

    #[tokio::test]
    async fn test_try_push_reports_overflow() {
        let (_receiver, handle, _emitter, _rx, _) = setup(1);
        handle.try_push(PushPayload::lines("a")).unwrap();
        let err = handle.try_push(PushPayload::lines("b")).unwrap_err();
        assert_eq!(err.error_type(), "QueueOverflow");
    }

    #[tokio::test]
    async fn test_buffered_payloads_emitted_on_shutdown() {
        let (mut receiver, handle, emitter, mut rx, metrics) = setup(8);
        let (tx, shutdown) = watch::channel(false);
        for i in 0..3 {
            handle.push(PushPayload::lines(format!("line {}", i))).await.unwrap();
        }
        tx.send(true).unwrap();

        receiver.run(ReceiverContext::new(emitter, shutdown)).await.unwrap();
        assert!(handle.try_push(PushPayload::lines("late")).is_err());

        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(
            metrics.counter_value(names::RECORDS_RECEIVED_TOTAL, &[(labels::RECEIVER, "ingest")]),
            3
        );
    }
}
