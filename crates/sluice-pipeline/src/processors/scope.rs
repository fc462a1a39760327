//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Scoped stage invocation
//!
//! A [`StageScope`] is opened for every stage invocation. It holds the
//! tracing span, collects emitted items and counts records in and out. The
//! counters are published in `Drop`, so they are released on every exit path.

use sluice_core::metrics::names::{self, labels};
use sluice_core::{EngineMetrics, PipelineError};
use tokio::time::Instant;
use tracing::span::EnteredSpan;
use tracing::{debug_span, warn};

use super::{ChainItem, DropReason};

pub struct StageScope<'a> {
    pipeline: &'a str,
    stage: &'a str,
    metrics: &'a EngineMetrics,
    now: Instant,
    records_in: u64,
    records_out: u64,
    out: Vec<ChainItem>,
    _span: EnteredSpan,
}

impl<'a> StageScope<'a> {
    /// Open a scope for one invocation of `stage`
    pub fn enter(
        pipeline: &'a str,
        stage: &'a str,
        metrics: &'a EngineMetrics,
        now: Instant,
    ) -> Self {
        let span = debug_span!("stage", pipeline = pipeline, stage = stage).entered();
        Self {
            pipeline,
            stage,
            metrics,
            now,
            records_in: 0,
            records_out: 0,
            out: Vec::new(),
            _span: span,
        }
    }

    /// Time of this invocation
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Pipeline owning the stage
    pub fn pipeline(&self) -> &'a str {
        self.pipeline
    }

    /// Stage label (`kind#position`)
    pub fn stage(&self) -> &'a str {
        self.stage
    }

    pub fn count_in(&mut self, records: usize) {
        self.records_in += records as u64;
    }

    /// Pass an item to the next stage
    pub fn emit(&mut self, item: ChainItem) {
        self.records_out += item.record_count() as u64;
        self.out.push(item);
    }

    /// Count records removed by the stage
    pub fn drop_records(&self, reason: DropReason, count: usize) {
        self.metrics.increment(
            names::RECORDS_DROPPED_TOTAL,
            &[
                (labels::PIPELINE, self.pipeline),
                (labels::STAGE, self.stage),
                (labels::REASON, reason.as_str()),
            ],
            count as u64,
        );
    }

    /// Log and count records that failed processing
    pub fn record_error(&self, error: &PipelineError, count: usize) {
        let context = error.context();
        warn!(
            pipeline = self.pipeline,
            stage = self.stage,
            error_type = context.error_type,
            retryable = context.retryable,
            count,
            "Dropping record: {}",
            error
        );
        self.drop_records(DropReason::ProcessingError, count);
    }

    /// Close the scope, returning the emitted items
    pub fn finish(mut self) -> Vec<ChainItem> {
        std::mem::take(&mut self.out)
    }
}

impl Drop for StageScope<'_> {
    fn drop(&mut self) {
        let stage_labels = [(labels::PIPELINE, self.pipeline), (labels::STAGE, self.stage)];
        self.metrics
            .increment(names::STAGE_RECORDS_IN_TOTAL, &stage_labels, self.records_in);
        self.metrics
            .increment(names::STAGE_RECORDS_OUT_TOTAL, &stage_labels, self.records_out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support::log;

    #[test]
    fn test_counters_published_on_drop() {
        let metrics = EngineMetrics::new();
        {
            let mut scope = StageScope::enter("logs", "filter#0", &metrics, Instant::now());
            scope.count_in(3);
            scope.emit(ChainItem::Record(log(&[])));
            scope.drop_records(DropReason::Filtered, 2);
        }

        let stage_labels = [("pipeline", "logs"), ("stage", "filter#0")];
        assert_eq!(metrics.counter_value(names::STAGE_RECORDS_IN_TOTAL, &stage_labels), 3);
        assert_eq!(metrics.counter_value(names::STAGE_RECORDS_OUT_TOTAL, &stage_labels), 1);
        assert_eq!(
            metrics.counter_sum(names::RECORDS_DROPPED_TOTAL, &[("reason", "filtered")]),
            2
        );
    }
}
