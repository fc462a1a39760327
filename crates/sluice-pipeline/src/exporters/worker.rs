//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Exporter worker
//!
//! An [`Exporter`] task pops batches from its queue and drives them through
//! the retry state machine. Pipelines only hold an [`ExporterHandle`], whose
//! `enqueue` never blocks.

use sluice_core::metrics::names::{self, labels, reasons};
use sluice_core::{Batch, EngineMetrics, ExporterSpec, PipelineError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::queue::{EnqueueOutcome, ExportQueue};
use super::retry::{BackoffPolicy, RetryDecision, RetryState};
use super::ExportSink;

/// Delivery status of an exporter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExporterStatus {
    /// Batches delivered since start
    pub delivered_batches: u64,

    /// A retry budget was exhausted after the last successful delivery
    pub exhausted: bool,

    /// Most recent delivery error, cleared by the next success
    pub last_error: Option<String>,
}

impl ExporterStatus {
    /// Ready once anything was delivered, or while no retry budget has run out
    pub fn is_ready(&self) -> bool {
        self.delivered_batches > 0 || !self.exhausted
    }
}

/// Work still owned by an exporter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnsentWork {
    pub batches: usize,
    pub records: usize,
}

#[derive(Debug)]
struct Shared {
    id: String,
    queue: Mutex<ExportQueue>,
    in_flight: Mutex<Option<usize>>,
    status: Mutex<ExporterStatus>,
    notify: Notify,
    metrics: Arc<EngineMetrics>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking holder cannot leave these values half-updated
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn labels(&self) -> [(&str, &str); 1] {
        [(labels::EXPORTER, self.id.as_str())]
    }

    fn count_dropped(&self, reason: &str, records: usize) {
        self.metrics.increment(
            names::EXPORTER_BATCHES_DROPPED_TOTAL,
            &[(labels::EXPORTER, self.id.as_str()), (labels::REASON, reason)],
            1,
        );
        self.metrics
            .increment(names::RECORDS_LOST_TOTAL, &self.labels(), records as u64);
    }

    fn publish_depth(&self, depth: usize) {
        self.metrics
            .set_gauge(names::EXPORTER_QUEUE_DEPTH, &self.labels(), depth as f64);
    }

    fn pop(&self) -> Option<Batch> {
        let mut queue = lock(&self.queue);
        let batch = queue.pop();
        if let Some(batch) = &batch {
            *lock(&self.in_flight) = Some(batch.size());
        }
        self.publish_depth(queue.len());
        batch
    }
}

/// Cloneable producer side of an exporter
#[derive(Debug, Clone)]
pub struct ExporterHandle {
    shared: Arc<Shared>,
}

impl ExporterHandle {
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Queue a batch; applies the overflow policy when full
    pub fn enqueue(&self, batch: Batch) -> bool {
        let (outcome, depth) = {
            let mut queue = lock(&self.shared.queue);
            let outcome = queue.push(batch);
            (outcome, queue.len())
        };
        self.shared.publish_depth(depth);

        let rejected_incoming = matches!(outcome, EnqueueOutcome::DroppedIncoming(_));
        match outcome {
            EnqueueOutcome::Enqueued => {}
            EnqueueOutcome::DroppedOldest(dropped) | EnqueueOutcome::DroppedIncoming(dropped) => {
                self.shared.metrics.increment(
                    names::EXPORTER_QUEUE_OVERFLOW_TOTAL,
                    &self.shared.labels(),
                    1,
                );
                self.shared.count_dropped(reasons::QUEUE_OVERFLOW, dropped.size());
                warn!(
                    exporter = %self.shared.id,
                    batch = %dropped.id,
                    records = dropped.size(),
                    "Exporter queue full, dropped batch"
                );
            }
        }

        self.shared.notify.notify_one();
        !rejected_incoming
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.shared.queue).len()
    }

    pub fn status(&self) -> ExporterStatus {
        lock(&self.shared.status).clone()
    }

    /// Discard everything queued or in flight and count it as lost
    ///
    /// Called once the worker is stopped; the in-flight slot is cleared so
    /// nothing is counted twice.
    pub fn discard_unsent(&self, reason: &str) -> UnsentWork {
        let mut unsent = UnsentWork::default();
        let queued = lock(&self.shared.queue).drain_all();
        let in_flight = lock(&self.shared.in_flight).take();

        for records in queued.iter().map(Batch::size).chain(in_flight) {
            unsent.batches += 1;
            unsent.records += records;
            self.shared.count_dropped(reason, records);
        }
        self.shared.publish_depth(0);
        unsent
    }
}

/// Exporter task state
pub struct Exporter {
    sink: Arc<dyn ExportSink>,
    retry: RetryState,
    timeout: Duration,
    shared: Arc<Shared>,
}

impl Exporter {
    pub fn new(
        id: impl Into<String>,
        spec: &ExporterSpec,
        sink: Arc<dyn ExportSink>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let shared = Arc::new(Shared {
            id: id.into(),
            queue: Mutex::new(ExportQueue::new(spec.queue_capacity, spec.overflow)),
            in_flight: Mutex::new(None),
            status: Mutex::new(ExporterStatus::default()),
            notify: Notify::new(),
            metrics,
        });

        Self {
            sink,
            retry: RetryState::new(BackoffPolicy::from(&spec.retry)),
            timeout: spec.timeout(),
            shared,
        }
    }

    pub fn handle(&self) -> ExporterHandle {
        ExporterHandle {
            shared: self.shared.clone(),
        }
    }

    /// Deliver until `shutdown` fires and the queue is empty
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(exporter = %self.shared.id, "Exporter started");
        let mut closing = *shutdown.borrow();

        loop {
            if let Some(batch) = self.shared.pop() {
                self.deliver(batch).await;
                *lock(&self.shared.in_flight) = None;
                continue;
            }
            if closing {
                break;
            }
            tokio::select! {
                _ = self.shared.notify.notified() => {}
                changed = shutdown.changed() => {
                    closing = changed.is_err() || *shutdown.borrow();
                }
            }
        }

        if let Err(e) = self.sink.close().await {
            warn!(exporter = %self.shared.id, error = %e, "Failed to close exporter sink");
        }
        info!(exporter = %self.shared.id, "Exporter stopped");
    }

    async fn deliver(&mut self, batch: Batch) {
        let labels = self.shared.labels();
        let metrics = &self.shared.metrics;

        loop {
            self.retry.on_send();
            let result = match tokio::time::timeout(self.timeout, self.sink.deliver(&batch)).await {
                Ok(result) => result,
                Err(elapsed) => Err(PipelineError::from(elapsed)),
            };

            let err = match result {
                Ok(receipt) => {
                    self.retry.on_success();
                    metrics.increment(names::EXPORTER_BATCHES_DELIVERED_TOTAL, &labels, 1);
                    metrics.increment(
                        names::EXPORTER_RECORDS_DELIVERED_TOTAL,
                        &labels,
                        receipt.accepted as u64,
                    );
                    metrics.increment(
                        names::EXPORTER_RECORDS_REJECTED_TOTAL,
                        &labels,
                        receipt.rejected_records as u64,
                    );
                    let mut status = lock(&self.shared.status);
                    status.delivered_batches += 1;
                    status.exhausted = false;
                    status.last_error = None;
                    debug!(
                        exporter = %self.shared.id,
                        batch = %batch.id,
                        accepted = receipt.accepted,
                        rejected = receipt.rejected_records,
                        "Batch delivered"
                    );
                    return;
                }
                Err(err) => err,
            };

            lock(&self.shared.status).last_error = Some(err.to_string());

            if !err.is_retryable() {
                self.retry.on_discard();
                self.shared.count_dropped(reasons::PERMANENT, batch.size());
                warn!(
                    exporter = %self.shared.id,
                    batch = %batch.id,
                    context = %err.context(),
                    error = %err,
                    "Destination rejected batch, dropping"
                );
                return;
            }

            match self.retry.on_failure(Instant::now()) {
                RetryDecision::Retry(delay) => {
                    metrics.increment(names::EXPORTER_RETRIES_TOTAL, &labels, 1);
                    debug!(
                        exporter = %self.shared.id,
                        batch = %batch.id,
                        attempt = self.retry.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Delivery failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    self.shared.count_dropped(reasons::RETRY_EXHAUSTED, batch.size());
                    lock(&self.shared.status).exhausted = true;
                    warn!(
                        exporter = %self.shared.id,
                        batch = %batch.id,
                        context = %err.context(),
                        error = %err,
                        "Retry budget exhausted, dropping batch"
                    );
                    return;
                }
            }
        }
    }
}
