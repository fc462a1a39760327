//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Exporter reliability tests
//!
//! Timing assertions run on a paused clock so backoff delays are exact.

use async_trait::async_trait;
use mockall::mock;
use sluice_core::metrics::names::{self, labels, reasons};
use sluice_core::{
    Batch, EngineMetrics, ExporterKind, ExporterSpec, OverflowPolicy, PipelineError,
    PipelineResult, SignalType, TelemetryRecord,
};
use sluice_pipeline::exporters::{Exporter, ExporterHandle};
use sluice_pipeline::{DeliveryReceipt, ExportSink, MemorySink, ScriptedFailure};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

mock! {
    pub Sink {}

    #[async_trait]
    impl ExportSink for Sink {
        async fn deliver(&self, batch: &Batch) -> PipelineResult<DeliveryReceipt>;
        async fn close(&self) -> PipelineResult<()>;
    }
}

fn batch(records: usize) -> Batch {
    let records = (0..records)
        .map(|_| TelemetryRecord::builder(SignalType::Log).build_shared())
        .collect();
    Batch::new("logs", records)
}

fn spawn(
    spec: &ExporterSpec,
    sink: Arc<dyn ExportSink>,
    metrics: Arc<EngineMetrics>,
) -> (ExporterHandle, watch::Sender<bool>, JoinHandle<()>) {
    let exporter = Exporter::new("out", spec, sink, metrics);
    let handle = exporter.handle();
    let (stop, shutdown) = watch::channel(false);
    let task = tokio::spawn(exporter.run(shutdown));
    (handle, stop, task)
}

fn assert_close(actual: Duration, expected_secs: u64) {
    let expected = Duration::from_secs(expected_secs);
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(10),
        "expected ~{:?}, got {:?}",
        expected,
        actual
    );
}

#[tokio::test(start_paused = true)]
async fn test_backoff_delays_follow_policy() {
    let metrics = EngineMetrics::shared();
    let sink = Arc::new(MemorySink::new().with_failures([ScriptedFailure::Transient; 4]));
    let spec = ExporterSpec::new(ExporterKind::Memory);
    let (handle, stop, task) = spawn(&spec, sink.clone(), metrics.clone());

    handle.enqueue(batch(3));
    tokio::time::sleep(Duration::from_secs(120)).await;

    let attempts = sink.attempts();
    assert_eq!(attempts.len(), 5);
    let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
    for (gap, expected) in gaps.iter().zip([5, 10, 20, 30]) {
        assert_close(*gap, expected);
    }

    assert_eq!(sink.delivered_records(), 3);
    assert_eq!(
        metrics.counter_value(names::EXPORTER_RETRIES_TOTAL, &[(labels::EXPORTER, "out")]),
        4
    );
    assert!(handle.status().is_ready());

    stop.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_batch_dropped_exactly_once() {
    let metrics = EngineMetrics::shared();
    let sink = Arc::new(MemorySink::new().always_failing(ScriptedFailure::Transient));
    let mut spec = ExporterSpec::new(ExporterKind::Memory);
    spec.retry.max_elapsed_time_ms = 40_000;
    let (handle, stop, task) = spawn(&spec, sink.clone(), metrics.clone());

    handle.enqueue(batch(2));
    tokio::time::sleep(Duration::from_secs(600)).await;

    // Attempts at 0s, 5s, 15s, 35s; the next retry would land past 40s
    assert_eq!(sink.attempts().len(), 4);
    assert_eq!(
        metrics.counter_value(
            names::EXPORTER_BATCHES_DROPPED_TOTAL,
            &[(labels::EXPORTER, "out"), (labels::REASON, reasons::RETRY_EXHAUSTED)]
        ),
        1
    );
    assert_eq!(
        metrics.counter_value(names::RECORDS_LOST_TOTAL, &[(labels::EXPORTER, "out")]),
        2
    );
    assert!(!handle.status().is_ready());

    stop.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_readiness_restored_after_success() {
    let metrics = EngineMetrics::shared();
    let sink = Arc::new(MemorySink::new().with_failures([ScriptedFailure::Transient]));
    let mut spec = ExporterSpec::new(ExporterKind::Memory);
    spec.retry.max_elapsed_time_ms = 1_000;
    let (handle, stop, task) = spawn(&spec, sink.clone(), metrics);

    // The first batch gives up on its first failure
    handle.enqueue(batch(1));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!handle.status().is_ready());

    handle.enqueue(batch(1));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(handle.status().is_ready());
    assert_eq!(sink.batches().len(), 1);

    stop.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_permanent_error_never_retried() {
    let metrics = EngineMetrics::shared();
    let mut sink = MockSink::new();
    sink.expect_deliver()
        .times(1)
        .returning(|_| Err(PipelineError::export_permanent("payload rejected")));
    sink.expect_close().times(1).returning(|| Ok(()));

    let spec = ExporterSpec::new(ExporterKind::Memory);
    let (handle, stop, task) = spawn(&spec, Arc::new(sink), metrics.clone());
    handle.enqueue(batch(4));
    stop.send(true).unwrap();
    task.await.unwrap();

    assert_eq!(
        metrics.counter_value(
            names::EXPORTER_BATCHES_DROPPED_TOTAL,
            &[(labels::EXPORTER, "out"), (labels::REASON, reasons::PERMANENT)]
        ),
        1
    );
    assert_eq!(
        metrics.counter_value(names::EXPORTER_RETRIES_TOTAL, &[(labels::EXPORTER, "out")]),
        0
    );
}

#[tokio::test]
async fn test_partial_acceptance_counts_rejections() {
    let metrics = EngineMetrics::shared();
    let sink = Arc::new(MemorySink::new().rejecting(2));
    let spec = ExporterSpec::new(ExporterKind::Memory);
    let (handle, stop, task) = spawn(&spec, sink, metrics.clone());

    handle.enqueue(batch(5));
    stop.send(true).unwrap();
    task.await.unwrap();

    let by_exporter = [(labels::EXPORTER, "out")];
    assert_eq!(metrics.counter_value(names::EXPORTER_RECORDS_DELIVERED_TOTAL, &by_exporter), 3);
    assert_eq!(metrics.counter_value(names::EXPORTER_RECORDS_REJECTED_TOTAL, &by_exporter), 2);
    assert_eq!(metrics.counter_value(names::EXPORTER_RETRIES_TOTAL, &by_exporter), 0);
}

#[test]
fn test_queue_never_exceeds_capacity() {
    for overflow in [OverflowPolicy::DropOldest, OverflowPolicy::DropNewest] {
        let metrics = EngineMetrics::shared();
        let mut spec = ExporterSpec::new(ExporterKind::Memory);
        spec.queue_capacity = 5;
        spec.overflow = overflow;
        let exporter = Exporter::new("out", &spec, Arc::new(MemorySink::new()), metrics.clone());
        let handle = exporter.handle();

        for _ in 0..20 {
            handle.enqueue(batch(1));
            assert!(handle.queue_len() <= 5);
        }
        assert_eq!(
            metrics.counter_value(
                names::EXPORTER_QUEUE_OVERFLOW_TOTAL,
                &[(labels::EXPORTER, "out")]
            ),
            15
        );
        assert_eq!(
            metrics.counter_value(
                names::EXPORTER_BATCHES_DROPPED_TOTAL,
                &[(labels::EXPORTER, "out"), (labels::REASON, reasons::QUEUE_OVERFLOW)]
            ),
            15
        );
    }
}
