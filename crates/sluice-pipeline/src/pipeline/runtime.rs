//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Pipeline task
//!
//! Pulls records from the pipeline's input channel through its processor
//! chain and hands every emitted unit to each of its exporters. A timer
//! drives batch timeouts and group expiry.

use sluice_core::SharedRecord;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::exporters::ExporterHandle;
use crate::processors::{ChainItem, ProcessorChain};
use crate::receivers::shutdown_signalled;

/// Runtime state of one pipeline
pub struct PipelineRuntime {
    chain: ProcessorChain,
    input: mpsc::Receiver<SharedRecord>,
    exporters: Vec<ExporterHandle>,
    tick_interval: Duration,
}

impl PipelineRuntime {
    pub fn new(
        chain: ProcessorChain,
        input: mpsc::Receiver<SharedRecord>,
        exporters: Vec<ExporterHandle>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            chain,
            input,
            exporters,
            tick_interval,
        }
    }

    pub fn id(&self) -> &str {
        self.chain.pipeline()
    }

    /// Run until shutdown, then drain input and chain into the exporters
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(pipeline = %self.id(), stages = self.chain.len(), "Pipeline started");

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_signalled(&mut shutdown) => break,
                record = self.input.recv() => match record {
                    Some(record) => {
                        let items = self.chain.process(record, Instant::now());
                        self.dispatch(items);
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    let items = self.chain.tick(Instant::now());
                    self.dispatch(items);
                }
            }
        }

        self.input.close();
        let mut drained = 0usize;
        while let Ok(record) = self.input.try_recv() {
            let items = self.chain.process(record, Instant::now());
            self.dispatch(items);
            drained += 1;
        }
        let items = self.chain.drain();
        self.dispatch(items);

        debug!(pipeline = %self.id(), drained, "Pipeline drained");
        info!(pipeline = %self.id(), "Pipeline stopped");
    }

    fn dispatch(&self, items: Vec<ChainItem>) {
        for item in items {
            let batch = item.into_batch(self.chain.pipeline());
            if batch.is_empty() {
                continue;
            }
            for exporter in &self.exporters {
                exporter.enqueue(batch.clone());
            }
        }
    }
}
