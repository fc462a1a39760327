//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Record router
//!
//! Routes are keyed by (receiver id, signal type). Every matching pipeline
//! gets a clone of the same shared record through its own bounded input.
//! Routing itself never waits: a `block` pipeline is fed through a
//! [`BlockForwarder`] task that does the waiting for that pipeline alone.

use sluice_core::metrics::names::{self, labels, reasons};
use sluice_core::{
    BackpressurePolicy, EngineMetrics, PipelineInputSpec, SharedRecord, SignalType,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace};

use crate::receivers::shutdown_signalled;

/// Router side of one pipeline's input
#[derive(Debug)]
pub struct PipelineInput {
    pipeline: String,
    /// Where the router offers records: the pipeline queue itself, or the
    /// staging buffer of a forwarder
    sender: mpsc::Sender<SharedRecord>,
    queue: mpsc::Sender<SharedRecord>,
    forwarder: Option<BlockForwarder>,
}

impl PipelineInput {
    pub fn new(
        pipeline: impl Into<String>,
        queue: mpsc::Sender<SharedRecord>,
        spec: &PipelineInputSpec,
    ) -> Self {
        let pipeline = pipeline.into();
        match spec.backpressure {
            BackpressurePolicy::Drop => Self {
                pipeline,
                sender: queue.clone(),
                queue,
                forwarder: None,
            },
            BackpressurePolicy::Block => {
                let (sender, staging) = mpsc::channel(spec.capacity.max(1));
                let forwarder = BlockForwarder {
                    pipeline: pipeline.clone(),
                    staging,
                    queue: queue.clone(),
                    block_timeout: spec.block_timeout(),
                };
                Self {
                    pipeline,
                    sender,
                    queue,
                    forwarder: Some(forwarder),
                }
            }
        }
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Returns false when the record was not accepted
    fn offer(&self, record: SharedRecord) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Closed(_)) => {
                debug!(pipeline = %self.pipeline, "Pipeline input closed");
                false
            }
        }
    }
}

fn queue_depth(queue: &mpsc::Sender<SharedRecord>) -> usize {
    queue.max_capacity() - queue.capacity()
}

fn count_backpressure(metrics: &EngineMetrics, pipeline: &str) {
    metrics.increment(
        names::RECORDS_DROPPED_TOTAL,
        &[(labels::PIPELINE, pipeline), (labels::REASON, reasons::BACKPRESSURE)],
        1,
    );
}

/// Feeds a `block` pipeline from its staging buffer
///
/// Waits up to the block timeout for queue space on each record, then drops
/// and counts it. On shutdown the staging buffer is flushed the same way.
#[derive(Debug)]
pub struct BlockForwarder {
    pipeline: String,
    staging: mpsc::Receiver<SharedRecord>,
    queue: mpsc::Sender<SharedRecord>,
    block_timeout: Duration,
}

impl BlockForwarder {
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    pub async fn run(mut self, metrics: Arc<EngineMetrics>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown) => break,
                record = self.staging.recv() => match record {
                    Some(record) => self.forward(record, &metrics).await,
                    None => break,
                },
            }
        }

        self.staging.close();
        let mut flushed = 0usize;
        while let Ok(record) = self.staging.try_recv() {
            self.forward(record, &metrics).await;
            flushed += 1;
        }
        info!(pipeline = %self.pipeline, flushed, "Block forwarder stopped");
    }

    async fn forward(&self, record: SharedRecord, metrics: &EngineMetrics) {
        match self.queue.send_timeout(record, self.block_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => count_backpressure(metrics, &self.pipeline),
            Err(SendTimeoutError::Closed(_)) => {
                debug!(pipeline = %self.pipeline, "Pipeline input closed");
                count_backpressure(metrics, &self.pipeline);
            }
        }
        metrics.set_gauge(
            names::PIPELINE_QUEUE_DEPTH,
            &[(labels::PIPELINE, self.pipeline.as_str())],
            queue_depth(&self.queue) as f64,
        );
    }
}

/// Route table from receivers to pipeline inputs
#[derive(Debug)]
pub struct Router {
    routes: HashMap<(String, SignalType), Vec<PipelineInput>>,
    forwarders: Vec<BlockForwarder>,
    metrics: Arc<EngineMetrics>,
}

impl Router {
    pub fn new(metrics: Arc<EngineMetrics>) -> Self {
        Self {
            routes: HashMap::new(),
            forwarders: Vec::new(),
            metrics,
        }
    }

    /// Append a pipeline input for records of `signal_type` from `receiver`
    pub fn add_route(&mut self, receiver: &str, signal_type: SignalType, mut input: PipelineInput) {
        if let Some(forwarder) = input.forwarder.take() {
            self.forwarders.push(forwarder);
        }
        self.routes
            .entry((receiver.to_string(), signal_type))
            .or_default()
            .push(input);
    }

    /// Forwarders of `block` inputs, to be spawned by the owner
    pub fn take_forwarders(&mut self) -> Vec<BlockForwarder> {
        std::mem::take(&mut self.forwarders)
    }

    /// Pipelines fed by `receiver` for `signal_type`, in declaration order
    pub fn targets(&self, receiver: &str, signal_type: SignalType) -> Vec<&str> {
        self.routes
            .get(&(receiver.to_string(), signal_type))
            .map(|inputs| inputs.iter().map(PipelineInput::pipeline).collect())
            .unwrap_or_default()
    }

    /// Fan a record out to every matching pipeline
    ///
    /// Returns the number of pipeline inputs that accepted it.
    pub fn route(&self, receiver: &str, record: SharedRecord) -> usize {
        let inputs = match self.routes.get(&(receiver.to_string(), record.signal_type())) {
            Some(inputs) => inputs,
            None => {
                trace!(receiver, signal_type = %record.signal_type(), "No pipeline for record");
                self.metrics.increment(
                    names::RECORDS_DROPPED_TOTAL,
                    &[(labels::RECEIVER, receiver), (labels::REASON, reasons::UNROUTED)],
                    1,
                );
                return 0;
            }
        };

        let mut accepted = 0;
        for input in inputs {
            if input.offer(record.clone()) {
                accepted += 1;
            } else {
                count_backpressure(&self.metrics, &input.pipeline);
            }
            self.metrics.set_gauge(
                names::PIPELINE_QUEUE_DEPTH,
                &[(labels::PIPELINE, input.pipeline.as_str())],
                queue_depth(&input.queue) as f64,
            );
        }
        accepted
    }
}
