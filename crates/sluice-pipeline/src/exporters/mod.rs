//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Exporters for the Sluice pipeline
//!
//! Each exporter owns a bounded [`ExportQueue`], a retry state machine and
//! one [`ExportSink`] that talks to the destination. Exporters never share
//! queues, so a failing destination only affects its own exporter.

pub mod file_sink;
pub mod http_sink;
pub mod memory_sink;
pub mod queue;
pub mod retry;
pub mod secrets;
pub mod stdout_sink;
pub mod worker;

// Re-export exporter implementations
pub use file_sink::FileSink;
pub use http_sink::HttpSink;
pub use memory_sink::{MemorySink, ScriptedFailure};
pub use queue::{EnqueueOutcome, ExportQueue};
pub use retry::{BackoffPolicy, RetryDecision, RetryPhase, RetryState};
pub use secrets::{EnvSecretResolver, Secret, SecretResolver, StaticSecretResolver};
pub use stdout_sink::StdoutSink;
pub use worker::{Exporter, ExporterHandle, ExporterStatus, UnsentWork};

use async_trait::async_trait;
use sluice_core::{Batch, ExporterKind, ExporterSpec, PipelineError, PipelineResult};
use std::sync::Arc;

/// Destination acknowledgement for one delivered batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryReceipt {
    /// Records the destination accepted
    pub accepted: usize,

    /// Records the destination rejected; counted, never retried
    pub rejected_records: usize,
}

impl DeliveryReceipt {
    /// Whole batch accepted
    pub fn full(batch: &Batch) -> Self {
        Self {
            accepted: batch.size(),
            rejected_records: 0,
        }
    }

    /// Batch partially accepted
    pub fn partial(batch: &Batch, rejected_records: usize) -> Self {
        let rejected_records = rejected_records.min(batch.size());
        Self {
            accepted: batch.size() - rejected_records,
            rejected_records,
        }
    }
}

/// Destination adapter
///
/// A transient failure is reported as a retryable error
/// ([`PipelineError::ExportDelivery`], timeout, io); a payload the
/// destination will never accept as [`PipelineError::ExportPermanent`].
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Deliver one batch
    async fn deliver(&self, batch: &Batch) -> PipelineResult<DeliveryReceipt>;

    /// Release destination resources
    async fn close(&self) -> PipelineResult<()> {
        Ok(())
    }
}

/// Build the sink for an exporter spec
pub fn build_sink(
    id: &str,
    spec: &ExporterSpec,
    secrets: &dyn SecretResolver,
) -> PipelineResult<Arc<dyn ExportSink>> {
    let credential = spec
        .credential
        .as_ref()
        .map(|handle| secrets.resolve(handle))
        .transpose()?;

    let endpoint = || {
        spec.endpoint.clone().ok_or_else(|| {
            PipelineError::configuration(format!("exporter '{}' requires 'endpoint'", id))
        })
    };

    let sink: Arc<dyn ExportSink> = match spec.kind {
        ExporterKind::Http => Arc::new(HttpSink::new(
            endpoint()?,
            spec.headers.clone(),
            credential,
            spec.timeout(),
        )?),
        ExporterKind::File => Arc::new(FileSink::new(endpoint()?)),
        ExporterKind::Stdout => Arc::new(StdoutSink::new()),
        ExporterKind::Memory => Arc::new(MemorySink::new()),
    };
    Ok(sink)
}
