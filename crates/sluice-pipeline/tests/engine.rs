//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! End-to-end tests driving a full engine through push receivers

use serde_json::json;
use sluice_core::metrics::names::{self, labels, reasons};
use sluice_core::{
    EngineConfig, ExporterKind, ExporterSpec, PipelineError, PipelineSpec, ReceiverKind,
    ReceiverSpec, SignalType, StageSpec, TelemetryRecord,
};
use sluice_pipeline::processors::group::{GROUP_KEY_METADATA, GROUP_REASON_METADATA};
use sluice_pipeline::{Engine, MemorySink, PushPayload, ScriptedFailure};
use std::sync::Arc;
use std::time::Duration;

fn base_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config
        .receivers
        .insert("ingest".into(), ReceiverSpec::new(ReceiverKind::Push));
    config
}

fn log_record(severity: &str, index: usize) -> TelemetryRecord {
    TelemetryRecord::builder(SignalType::Log)
        .attribute("severity", severity)
        .attribute("index", index.to_string())
        .build()
}

#[tokio::test]
async fn test_filter_and_batch_end_to_end() {
    let mut config = base_config();
    config
        .exporters
        .insert("mem".into(), ExporterSpec::new(ExporterKind::Memory));
    config.pipelines.insert(
        "logs".into(),
        PipelineSpec::new(SignalType::Log, vec!["ingest".into()], vec!["mem".into()])
            .with_stage(StageSpec::new(
                "filter",
                json!({ "mode": "exclude", "rules": [{ "field": "severity", "equals": "debug" }] }),
            ))
            .with_stage(StageSpec::new("batch", json!({ "size": 100, "timeout_ms": 60000 }))),
    );

    let sink = Arc::new(MemorySink::new());
    let mut engine = Engine::builder(config)
        .sink_override("mem", sink.clone())
        .build()
        .unwrap();
    engine.start().unwrap();

    let severities = ["debug", "info", "warn", "error"];
    let handle = engine.push_handle("ingest").unwrap();
    for chunk in 0..10 {
        let records = (0..100)
            .map(|i| {
                let index = chunk * 100 + i;
                log_record(severities[index % 4], index)
            })
            .collect();
        handle.push(PushPayload::records(records)).await.unwrap();
    }

    let report = engine.shutdown(Duration::from_secs(10)).await;
    assert!(!report.timed_out);
    assert_eq!(report.records_lost, 0);

    let batches = sink.batches();
    let sizes: Vec<usize> = batches.iter().map(|b| b.size()).collect();
    assert_eq!(sizes, vec![100, 100, 100, 100, 100, 100, 100, 50]);
    assert!(batches
        .iter()
        .flat_map(|b| b.records.iter())
        .all(|r| r.attribute("severity") != Some("debug")));

    // Arrival order is preserved inside and across batches
    let indices: Vec<usize> = batches
        .iter()
        .flat_map(|b| b.records.iter())
        .filter_map(|r| r.attribute("index").and_then(|i| i.parse().ok()))
        .collect();
    assert!(indices.windows(2).all(|w| w[0] < w[1]));

    let metrics = engine.metrics();
    assert_eq!(
        metrics.counter_value(names::RECORDS_RECEIVED_TOTAL, &[(labels::RECEIVER, "ingest")]),
        1000
    );
    assert_eq!(
        metrics.counter_sum(names::RECORDS_DROPPED_TOTAL, &[(labels::REASON, reasons::FILTERED)]),
        250
    );
    assert_eq!(
        metrics.counter_value(
            names::EXPORTER_RECORDS_DELIVERED_TOTAL,
            &[(labels::EXPORTER, "mem")]
        ),
        750
    );
}

#[tokio::test]
async fn test_failing_exporter_does_not_block_sibling() {
    let mut config = base_config();
    config
        .exporters
        .insert("broken".into(), ExporterSpec::new(ExporterKind::Memory));
    config
        .exporters
        .insert("healthy".into(), ExporterSpec::new(ExporterKind::Memory));
    config.pipelines.insert(
        "to-broken".into(),
        PipelineSpec::new(SignalType::Log, vec!["ingest".into()], vec!["broken".into()]),
    );
    config.pipelines.insert(
        "to-healthy".into(),
        PipelineSpec::new(SignalType::Log, vec!["ingest".into()], vec!["healthy".into()]),
    );

    let broken = Arc::new(MemorySink::new().always_failing(ScriptedFailure::Transient));
    let healthy = Arc::new(MemorySink::new());
    let mut engine = Engine::builder(config)
        .sink_override("broken", broken.clone())
        .sink_override("healthy", healthy.clone())
        .build()
        .unwrap();
    engine.start().unwrap();

    let handle = engine.push_handle("ingest").unwrap();
    let records = (0..10).map(|i| log_record("info", i)).collect();
    handle.push(PushPayload::records(records)).await.unwrap();

    let report = engine.shutdown(Duration::from_millis(500)).await;

    // No batch or group stage: every record is its own batch
    assert_eq!(healthy.batches().len(), 10);
    assert_eq!(healthy.delivered_records(), 10);
    assert!(broken.batches().is_empty());

    assert!(report.timed_out);
    assert_eq!(report.batches_lost, 10);
    assert_eq!(report.records_lost, 10);

    let metrics = engine.metrics();
    assert_eq!(
        metrics.counter_value(
            names::EXPORTER_BATCHES_DROPPED_TOTAL,
            &[(labels::EXPORTER, "broken"), (labels::REASON, reasons::SHUTDOWN)]
        ),
        10
    );
    assert_eq!(
        metrics.counter_value(names::RECORDS_LOST_TOTAL, &[(labels::EXPORTER, "broken")]),
        10
    );
}

#[tokio::test]
async fn test_group_stage_flushes_on_shutdown() {
    let mut config = base_config();
    config
        .exporters
        .insert("mem".into(), ExporterSpec::new(ExporterKind::Memory));
    config.pipelines.insert(
        "traces".into(),
        PipelineSpec::new(SignalType::Log, vec!["ingest".into()], vec!["mem".into()]).with_stage(
            StageSpec::new("group", json!({ "key": "trace_id", "window_ms": 60000 })),
        ),
    );

    let sink = Arc::new(MemorySink::new());
    let mut engine = Engine::builder(config)
        .sink_override("mem", sink.clone())
        .build()
        .unwrap();
    engine.start().unwrap();

    let records = ["a", "b", "a"]
        .iter()
        .map(|trace| {
            TelemetryRecord::builder(SignalType::Log)
                .attribute("trace_id", *trace)
                .build()
        })
        .collect();
    engine
        .push_handle("ingest")
        .unwrap()
        .push(PushPayload::records(records))
        .await
        .unwrap();

    engine.shutdown(Duration::from_secs(5)).await;

    let mut groups: Vec<(String, usize, String)> = sink
        .batches()
        .iter()
        .map(|b| {
            (
                b.metadata[GROUP_KEY_METADATA].clone(),
                b.size(),
                b.metadata[GROUP_REASON_METADATA].clone(),
            )
        })
        .collect();
    groups.sort();
    assert_eq!(
        groups,
        vec![
            ("a".to_string(), 2, "drained".to_string()),
            ("b".to_string(), 1, "drained".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_traceparent_header_correlates_pushed_lines() {
    let mut config = base_config();
    config
        .exporters
        .insert("mem".into(), ExporterSpec::new(ExporterKind::Memory));
    config.pipelines.insert(
        "logs".into(),
        PipelineSpec::new(SignalType::Log, vec!["ingest".into()], vec!["mem".into()]),
    );

    let sink = Arc::new(MemorySink::new());
    let mut engine = Engine::builder(config)
        .sink_override("mem", sink.clone())
        .build()
        .unwrap();
    engine.start().unwrap();

    engine
        .push_handle("ingest")
        .unwrap()
        .push(
            PushPayload::lines("GET /index\nGET /about")
                .with_traceparent("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        )
        .await
        .unwrap();
    engine.shutdown(Duration::from_secs(5)).await;

    let batches = sink.batches();
    assert_eq!(batches.len(), 2);
    for batch in batches {
        assert_eq!(
            batch.records[0].attribute("trace_id"),
            Some("4bf92f3577b34da6a3ce929d0e0e4736")
        );
        assert_eq!(batch.records[0].origin(), Some("ingest"));
    }
}

#[test]
fn test_configuration_errors_are_fatal() {
    let dangling = r#"
        [receivers.ingest]
        kind = "push"

        [pipelines.logs]
        signal_type = "log"
        receivers = ["ingest"]
        exporters = ["nowhere"]
    "#;
    let err = EngineConfig::from_toml_str(dangling).unwrap_err();
    assert!(matches!(err, PipelineError::Configuration { .. }));
    assert!(err.is_fatal());

    let mut config = base_config();
    config
        .exporters
        .insert("mem".into(), ExporterSpec::new(ExporterKind::Memory));
    config.pipelines.insert(
        "logs".into(),
        PipelineSpec::new(SignalType::Log, vec!["ingest".into()], vec!["mem".into()]).with_stage(
            StageSpec::new("filter", json!({ "rules": [{ "field": "body", "regex": "([" }] })),
        ),
    );
    let err = Engine::builder(config).build().err().unwrap();
    assert!(matches!(err, PipelineError::StageConfig { .. }));
}
