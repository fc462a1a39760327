//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! In-memory sink
//!
//! Keeps delivered batches in memory. Failures can be scripted so exporter
//! behaviour is observable without a network destination.

use async_trait::async_trait;
use sluice_core::{Batch, PipelineError, PipelineResult};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{DeliveryReceipt, ExportSink};

/// Failure returned by a scripted delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    Transient,
    Permanent,
}

impl ScriptedFailure {
    fn into_error(self) -> PipelineError {
        match self {
            ScriptedFailure::Transient => {
                PipelineError::export_delivery("scripted transient failure")
            }
            ScriptedFailure::Permanent => {
                PipelineError::export_permanent("scripted permanent failure")
            }
        }
    }
}

/// Memory sink
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Batch>>,
    attempts: Mutex<Vec<Instant>>,
    script: Mutex<VecDeque<ScriptedFailure>>,
    always_fail: Option<ScriptedFailure>,
    delay: Option<Duration>,
    rejected_per_batch: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next attempts in order, then succeed
    pub fn with_failures(self, failures: impl IntoIterator<Item = ScriptedFailure>) -> Self {
        self.fail_next(failures);
        self
    }

    /// Fail the next attempts in order on a sink that is already shared
    pub fn fail_next(&self, failures: impl IntoIterator<Item = ScriptedFailure>) {
        if let Ok(mut script) = self.script.lock() {
            script.extend(failures);
        }
    }

    /// Fail every attempt
    pub fn always_failing(mut self, failure: ScriptedFailure) -> Self {
        self.always_fail = Some(failure);
        self
    }

    /// Take this long for every attempt
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Acknowledge each batch with this many rejected records
    pub fn rejecting(mut self, records: usize) -> Self {
        self.rejected_per_batch = records;
        self
    }

    /// Batches delivered so far
    pub fn batches(&self) -> Vec<Batch> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Records across delivered batches
    pub fn delivered_records(&self) -> usize {
        self.batches
            .lock()
            .map(|b| b.iter().map(Batch::size).sum())
            .unwrap_or_default()
    }

    /// Start time of every attempt, failed ones included
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ExportSink for MemorySink {
    async fn deliver(&self, batch: &Batch) -> PipelineResult<DeliveryReceipt> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(Instant::now());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = self.always_fail {
            return Err(failure.into_error());
        }
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        if let Some(failure) = scripted {
            return Err(failure.into_error());
        }

        self.batches
            .lock()
            .map_err(|_| PipelineError::internal("memory sink lock poisoned"))?
            .push(batch.clone());
        Ok(DeliveryReceipt::partial(batch, self.rejected_per_batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failures_then_success() {
        let sink = MemorySink::new()
            .with_failures([ScriptedFailure::Transient, ScriptedFailure::Permanent]);
        let batch = Batch::new("logs", Vec::new());

        assert!(sink.deliver(&batch).await.unwrap_err().is_retryable());
        assert!(sink.deliver(&batch).await.unwrap_err().is_permanent());
        assert!(sink.deliver(&batch).await.is_ok());

        assert_eq!(sink.attempts().len(), 3);
        assert_eq!(sink.batches().len(), 1);
    }
}
