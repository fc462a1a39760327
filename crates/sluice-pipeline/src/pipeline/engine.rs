//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Engine lifecycle
//!
//! Building validates the whole configuration before anything runs; any
//! configuration or stage error aborts the build. Shutdown proceeds in phases
//! (receivers, block forwarders, pipelines, exporters) under one deadline, and
//! whatever is still queued or in flight when the deadline passes is counted
//! as lost.

use futures::future::join_all;
use sluice_core::metrics::names::reasons;
use sluice_core::{
    AttributeSpec, ComponentHealth, ComponentKind, EngineConfig, EngineMetrics, HealthReport,
    HealthStatus, PipelineError, PipelineResult,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::router::{BlockForwarder, PipelineInput, Router};
use super::runtime::PipelineRuntime;
use crate::exporters::{
    build_sink, EnvSecretResolver, ExportSink, Exporter, ExporterHandle, SecretResolver,
};
use crate::processors::{ProcessorChain, StageRegistry};
use crate::receivers::{
    build_receiver, PushHandle, Receiver, ReceiverContext, RecordEmitter,
};

/// Outcome of [`Engine::shutdown`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Batches discarded at the deadline
    pub batches_lost: usize,

    /// Records in those batches
    pub records_lost: usize,

    /// Some task had to be aborted
    pub timed_out: bool,

    /// Wall time spent shutting down
    pub duration: Duration,
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    config: EngineConfig,
    metrics: Option<Arc<EngineMetrics>>,
    registry: StageRegistry,
    secrets: Arc<dyn SecretResolver>,
    sink_overrides: HashMap<String, Arc<dyn ExportSink>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            metrics: None,
            registry: StageRegistry::with_builtins(),
            secrets: Arc::new(EnvSecretResolver),
            sink_overrides: HashMap::new(),
        }
    }

    /// Share an existing metrics registry
    pub fn metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the stage registry, e.g. to add custom stage kinds
    pub fn stage_registry(mut self, registry: StageRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn secret_resolver(mut self, secrets: Arc<dyn SecretResolver>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Use `sink` for exporter `id` instead of the one its spec describes
    pub fn sink_override(mut self, id: impl Into<String>, sink: Arc<dyn ExportSink>) -> Self {
        self.sink_overrides.insert(id.into(), sink);
        self
    }

    pub fn build(mut self) -> PipelineResult<Engine> {
        self.config.validate_config()?;
        let config = self.config;
        let metrics = self.metrics.unwrap_or_else(EngineMetrics::shared);

        for id in self.sink_overrides.keys() {
            if !config.exporters.contains_key(id) {
                return Err(PipelineError::configuration(format!(
                    "sink override for unknown exporter '{}'",
                    id
                )));
            }
        }

        let mut exporters = Vec::new();
        let mut exporter_handles = BTreeMap::new();
        for (id, spec) in &config.exporters {
            let sink = match self.sink_overrides.remove(id) {
                Some(sink) => sink,
                None => build_sink(id, spec, self.secrets.as_ref())?,
            };
            let exporter = Exporter::new(id.clone(), spec, sink, metrics.clone());
            exporter_handles.insert(id.clone(), exporter.handle());
            exporters.push(exporter);
        }

        let mut router = Router::new(metrics.clone());
        let mut pipelines = Vec::new();
        for (id, spec) in &config.pipelines {
            let chain = ProcessorChain::from_specs(
                id.clone(),
                &spec.stages,
                &self.registry,
                metrics.clone(),
            )?;
            let (sender, input) = mpsc::channel(spec.input.capacity.max(1));
            for receiver in &spec.receivers {
                router.add_route(
                    receiver,
                    spec.signal_type,
                    PipelineInput::new(id.clone(), sender.clone(), &spec.input),
                );
            }

            let targets = spec
                .exporters
                .iter()
                .filter_map(|exporter| exporter_handles.get(exporter).cloned())
                .collect();
            pipelines.push(PipelineRuntime::new(chain, input, targets, spec.tick_interval()));
        }
        let forwarders = router.take_forwarders();

        let mut receivers = Vec::new();
        let mut push_handles = HashMap::new();
        for (id, spec) in &config.receivers {
            let (receiver, handle) = build_receiver(id, spec)?;
            if let Some(handle) = handle {
                push_handles.insert(id.clone(), handle);
            }
            receivers.push((receiver, spec.resource_attributes.clone()));
        }

        info!(
            engine = %config.name,
            receivers = receivers.len(),
            pipelines = pipelines.len(),
            exporters = exporters.len(),
            "Engine built"
        );

        let (receivers_stop, _) = watch::channel(false);
        let (forwarders_stop, _) = watch::channel(false);
        let (pipelines_stop, _) = watch::channel(false);
        let (exporters_stop, _) = watch::channel(false);

        Ok(Engine {
            config,
            metrics,
            router: Arc::new(router),
            pending: Some(Pending {
                receivers,
                forwarders,
                pipelines,
                exporters,
            }),
            push_handles,
            exporter_handles,
            tasks: Tasks::default(),
            receivers_stop,
            forwarders_stop,
            pipelines_stop,
            exporters_stop,
            state: EngineState::Built,
        })
    }
}

struct Pending {
    receivers: Vec<(Box<dyn Receiver>, Vec<AttributeSpec>)>,
    forwarders: Vec<BlockForwarder>,
    pipelines: Vec<PipelineRuntime>,
    exporters: Vec<Exporter>,
}

struct Task {
    name: String,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Tasks {
    receivers: Vec<Task>,
    forwarders: Vec<Task>,
    pipelines: Vec<Task>,
    exporters: Vec<Task>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Built,
    Running,
    Stopped,
}

/// Running telemetry pipeline engine
pub struct Engine {
    config: EngineConfig,
    metrics: Arc<EngineMetrics>,
    router: Arc<Router>,
    pending: Option<Pending>,
    push_handles: HashMap<String, PushHandle>,
    exporter_handles: BTreeMap<String, ExporterHandle>,
    tasks: Tasks,
    receivers_stop: watch::Sender<bool>,
    forwarders_stop: watch::Sender<bool>,
    pipelines_stop: watch::Sender<bool>,
    exporters_stop: watch::Sender<bool>,
    state: EngineState,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    /// Producer handle for a push receiver
    pub fn push_handle(&self, receiver: &str) -> Option<PushHandle> {
        self.push_handles.get(receiver).cloned()
    }

    pub fn exporter(&self, id: &str) -> Option<&ExporterHandle> {
        self.exporter_handles.get(id)
    }

    pub fn is_running(&self) -> bool {
        self.state == EngineState::Running
    }

    /// Spawn every exporter, pipeline and receiver task
    ///
    /// Downstream tasks start first so nothing is routed into a pipeline
    /// that is not yet consuming.
    pub fn start(&mut self) -> PipelineResult<()> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| PipelineError::internal("engine already started"))?;

        for exporter in pending.exporters {
            let name = exporter.handle().id().to_string();
            let shutdown = self.exporters_stop.subscribe();
            let handle = tokio::spawn(exporter.run(shutdown));
            self.tasks.exporters.push(Task { name, handle });
        }

        for pipeline in pending.pipelines {
            let name = pipeline.id().to_string();
            let shutdown = self.pipelines_stop.subscribe();
            let handle = tokio::spawn(pipeline.run(shutdown));
            self.tasks.pipelines.push(Task { name, handle });
        }

        for forwarder in pending.forwarders {
            let name = format!("{}.forwarder", forwarder.pipeline());
            let shutdown = self.forwarders_stop.subscribe();
            let handle = tokio::spawn(forwarder.run(self.metrics.clone(), shutdown));
            self.tasks.forwarders.push(Task { name, handle });
        }

        for (mut receiver, resource) in pending.receivers {
            let name = receiver.id().to_string();
            let emitter =
                RecordEmitter::new(&name, &resource, self.router.clone(), self.metrics.clone());
            let ctx = ReceiverContext::new(emitter, self.receivers_stop.subscribe());
            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = receiver.run(ctx).await {
                    error!(receiver = %task_name, error = %e, "Receiver failed");
                }
            });
            self.tasks.receivers.push(Task { name, handle });
        }

        self.state = EngineState::Running;
        info!(engine = %self.config.name, "Engine started");
        Ok(())
    }

    /// Current liveness and readiness
    pub fn health(&self) -> HealthReport {
        let running = |task: &Task| !task.handle.is_finished();
        let mut components = Vec::new();

        for task in &self.tasks.receivers {
            let health =
                ComponentHealth::new(&task.name, ComponentKind::Receiver, HealthStatus::Healthy);
            components.push(if running(task) { health } else { health.stopped() });
        }
        for task in self.tasks.pipelines.iter().chain(&self.tasks.forwarders) {
            let health =
                ComponentHealth::new(&task.name, ComponentKind::Pipeline, HealthStatus::Healthy);
            components.push(if running(task) { health } else { health.stopped() });
        }
        for task in &self.tasks.exporters {
            let status = self
                .exporter_handles
                .get(&task.name)
                .map(ExporterHandle::status)
                .unwrap_or_default();
            let health_status = if status.is_ready() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            };
            let mut health =
                ComponentHealth::new(&task.name, ComponentKind::Exporter, health_status);
            if let Some(message) = status.last_error {
                health = health.with_message(message);
            }
            components.push(if running(task) { health } else { health.stopped() });
        }

        HealthReport::from_components(self.state == EngineState::Running, components)
    }

    /// Stop everything within `grace`
    pub async fn shutdown(&mut self, grace: Duration) -> ShutdownReport {
        let started = Instant::now();
        let deadline = started + grace;
        let mut report = ShutdownReport::default();
        info!(
            engine = %self.config.name,
            grace_ms = grace.as_millis() as u64,
            "Engine shutting down"
        );

        // Nothing was spawned; pending work is simply dropped
        self.pending.take();

        let _ = self.receivers_stop.send(true);
        report.timed_out |= join_until(deadline, &mut self.tasks.receivers, "receiver").await;

        let _ = self.forwarders_stop.send(true);
        report.timed_out |= join_until(deadline, &mut self.tasks.forwarders, "forwarder").await;

        let _ = self.pipelines_stop.send(true);
        report.timed_out |= join_until(deadline, &mut self.tasks.pipelines, "pipeline").await;

        let _ = self.exporters_stop.send(true);
        report.timed_out |= join_until(deadline, &mut self.tasks.exporters, "exporter").await;

        for handle in self.exporter_handles.values() {
            let unsent = handle.discard_unsent(reasons::SHUTDOWN);
            report.batches_lost += unsent.batches;
            report.records_lost += unsent.records;
        }

        self.state = EngineState::Stopped;
        report.duration = started.elapsed();
        if report.batches_lost > 0 {
            warn!(
                batches = report.batches_lost,
                records = report.records_lost,
                "Discarded undelivered batches at shutdown"
            );
        }
        info!(engine = %self.config.name, timed_out = report.timed_out, "Engine stopped");
        report
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.receivers_stop.send(true);
        let _ = self.forwarders_stop.send(true);
        let _ = self.pipelines_stop.send(true);
        let _ = self.exporters_stop.send(true);
    }
}

/// Wait for `tasks` until `deadline`, aborting whatever is still running
///
/// Returns true when a task had to be aborted.
async fn join_until(deadline: Instant, tasks: &mut Vec<Task>, kind: &str) -> bool {
    let handles = tasks.iter_mut().map(|t| &mut t.handle);
    let joined = tokio::time::timeout_at(deadline, join_all(handles)).await;
    let timed_out = joined.is_err();

    if timed_out {
        for task in tasks.iter() {
            if !task.handle.is_finished() {
                warn!(task = %task.name, kind, "Shutdown deadline passed, aborting task");
                task.handle.abort();
            }
        }
        // Aborted tasks stop at their next suspension point
        join_all(tasks.iter_mut().map(|t| &mut t.handle)).await;
    }
    tasks.clear();
    timed_out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporters::MemorySink;
    use sluice_core::{
        ExporterKind, ExporterSpec, PipelineSpec, ReceiverKind, ReceiverSpec, SignalType,
    };

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config
            .receivers
            .insert("ingest".into(), ReceiverSpec::new(ReceiverKind::Push));
        config
            .exporters
            .insert("mem".into(), ExporterSpec::new(ExporterKind::Memory));
        config.pipelines.insert(
            "logs".into(),
            PipelineSpec::new(SignalType::Log, vec!["ingest".into()], vec!["mem".into()]),
        );
        config
    }

    #[tokio::test]
    async fn test_lifecycle_and_health() {
        let sink = Arc::new(MemorySink::new());
        let mut engine = Engine::builder(config())
            .sink_override("mem", sink.clone())
            .build()
            .unwrap();

        assert!(!engine.health().live);
        engine.start().unwrap();
        assert!(engine.start().is_err());

        let health = engine.health();
        assert!(health.live && health.ready);
        assert_eq!(health.components.len(), 3);

        let report = engine.shutdown(Duration::from_secs(5)).await;
        assert!(!report.timed_out);
        assert_eq!(report.batches_lost, 0);
        assert!(!engine.health().live);
    }

    #[tokio::test]
    async fn test_block_pipeline_forwarder_flushed_on_shutdown() {
        let mut config = config();
        if let Some(pipeline) = config.pipelines.get_mut("logs") {
            pipeline.input.backpressure = sluice_core::BackpressurePolicy::Block;
        }
        let sink = Arc::new(MemorySink::new());
        let mut engine = Engine::builder(config)
            .sink_override("mem", sink.clone())
            .build()
            .unwrap();
        engine.start().unwrap();

        let health = engine.health();
        assert_eq!(health.components.len(), 4);
        assert!(health.components.iter().any(|c| c.name == "logs.forwarder"));

        let handle = engine.push_handle("ingest").unwrap();
        handle
            .push(crate::receivers::PushPayload::lines("a\nb"))
            .await
            .unwrap();

        let report = engine.shutdown(Duration::from_secs(5)).await;
        assert!(!report.timed_out);
        assert_eq!(sink.delivered_records(), 2);
    }

    #[test]
    fn test_override_for_unknown_exporter_rejected() {
        let result = Engine::builder(config())
            .sink_override("missing", Arc::new(MemorySink::new()))
            .build();
        assert!(result.err().unwrap().is_fatal());
    }

    #[test]
    fn test_unknown_stage_kind_rejected() {
        let mut config = config();
        if let Some(pipeline) = config.pipelines.get_mut("logs") {
            pipeline
                .stages
                .push(sluice_core::StageSpec::new("dedupe", serde_json::json!({})));
        }
        let err = Engine::builder(config).build().err().unwrap();
        assert!(matches!(err, PipelineError::StageConfig { .. }));
    }
}
