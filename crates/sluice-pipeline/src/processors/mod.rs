//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Processor stages for the Sluice pipeline
//!
//! Stages are synchronous. A stage receives [`ChainItem`]s through
//! [`Stage::process`], may emit any number of items into its
//! [`StageScope`], and is driven by timer ticks and a final drain.
//! Record-level stages implement the simpler [`RecordStage`] and are adapted
//! over batches by [`RecordStageAdapter`].

pub mod batch;
pub mod chain;
pub mod enrich;
pub mod filter;
pub mod group;
pub mod registry;
pub mod sampler;
pub mod scope;
pub mod transform;

// Re-export processor implementations
pub use batch::BatchStage;
pub use chain::ProcessorChain;
pub use enrich::ResourceEnrichStage;
pub use filter::FilterStage;
pub use group::GroupStage;
pub use registry::{StageFactory, StageKind, StageRegistry};
pub use sampler::SamplerStage;
pub use scope::StageScope;
pub use transform::TransformStage;

use serde::de::DeserializeOwned;
use sluice_core::{Batch, PipelineError, PipelineResult, SharedRecord, StageSpec};
use tokio::time::Instant;

/// Unit travelling through a chain
#[derive(Debug, Clone)]
pub enum ChainItem {
    Record(SharedRecord),
    Batch(Batch),
}

impl ChainItem {
    /// Number of records carried by the item
    pub fn record_count(&self) -> usize {
        match self {
            ChainItem::Record(_) => 1,
            ChainItem::Batch(batch) => batch.size(),
        }
    }

    /// Convert into a delivery batch; a lone record becomes a singleton batch
    pub fn into_batch(self, pipeline: &str) -> Batch {
        match self {
            ChainItem::Record(record) => Batch::new(pipeline, vec![record]),
            ChainItem::Batch(batch) => batch,
        }
    }
}

/// Why a stage removed a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Filtered,
    Sampled,
    ProcessingError,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        use sluice_core::metrics::names::reasons;
        match self {
            DropReason::Filtered => reasons::FILTERED,
            DropReason::Sampled => reasons::SAMPLED,
            DropReason::ProcessingError => reasons::PROCESSING_ERROR,
        }
    }
}

/// Outcome of a record-level stage
#[derive(Debug, Clone)]
pub enum Verdict {
    Keep(SharedRecord),
    Drop(DropReason),
}

/// Stage handler
pub trait Stage: Send {
    /// Stage kind name
    fn kind(&self) -> &str;

    /// Handle one item, emitting results into `scope`
    fn process(&mut self, item: ChainItem, scope: &mut StageScope<'_>);

    /// Timer tick; emit anything whose time threshold has passed
    fn on_tick(&mut self, _scope: &mut StageScope<'_>) {}

    /// Flush all buffered state
    fn drain(&mut self, _scope: &mut StageScope<'_>) {}
}

/// Stage that decides about one record at a time
pub trait RecordStage: Send {
    fn kind(&self) -> &str;

    fn apply(&mut self, record: SharedRecord, now: Instant) -> PipelineResult<Verdict>;
}

/// Runs a [`RecordStage`] over records and batches
pub struct RecordStageAdapter<S> {
    inner: S,
}

impl<S: RecordStage> RecordStageAdapter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    fn apply_one(
        &mut self,
        record: SharedRecord,
        scope: &mut StageScope<'_>,
    ) -> Option<SharedRecord> {
        match self.inner.apply(record, scope.now()) {
            Ok(Verdict::Keep(record)) => Some(record),
            Ok(Verdict::Drop(reason)) => {
                scope.drop_records(reason, 1);
                None
            }
            Err(e) => {
                scope.record_error(&e, 1);
                None
            }
        }
    }
}

impl<S: RecordStage> Stage for RecordStageAdapter<S> {
    fn kind(&self) -> &str {
        self.inner.kind()
    }

    fn process(&mut self, item: ChainItem, scope: &mut StageScope<'_>) {
        match item {
            ChainItem::Record(record) => {
                if let Some(record) = self.apply_one(record, scope) {
                    scope.emit(ChainItem::Record(record));
                }
            }
            ChainItem::Batch(mut batch) => {
                let records = std::mem::take(&mut batch.records);
                batch.records = records
                    .into_iter()
                    .filter_map(|record| self.apply_one(record, scope))
                    .collect();
                if !batch.is_empty() {
                    scope.emit(ChainItem::Batch(batch));
                }
            }
        }
    }
}

/// Deserialize stage parameters, mapping failures to a stage configuration error
pub fn parse_parameters<T: DeserializeOwned>(spec: &StageSpec) -> PipelineResult<T> {
    serde_json::from_value(spec.parameters.clone()).map_err(|e| {
        PipelineError::stage_config_with_source(&spec.kind, "invalid stage parameters", e)
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use sluice_core::{Body, EngineMetrics, SignalType, TelemetryRecord};

    pub fn log(attributes: &[(&str, &str)]) -> SharedRecord {
        let mut builder = TelemetryRecord::builder(SignalType::Log).body(Body::Text("line".into()));
        for (k, v) in attributes {
            builder = builder.attribute(*k, *v);
        }
        builder.build_shared()
    }

    /// Feed items through one stage and collect its output
    pub fn run(
        stage: &mut dyn Stage,
        metrics: &EngineMetrics,
        now: Instant,
        items: Vec<ChainItem>,
    ) -> Vec<ChainItem> {
        let label = stage.kind().to_string();
        let mut scope = StageScope::enter("test", &label, metrics, now);
        for item in items {
            scope.count_in(item.record_count());
            stage.process(item, &mut scope);
        }
        scope.finish()
    }

    pub fn tick(stage: &mut dyn Stage, metrics: &EngineMetrics, now: Instant) -> Vec<ChainItem> {
        let label = stage.kind().to_string();
        let mut scope = StageScope::enter("test", &label, metrics, now);
        stage.on_tick(&mut scope);
        scope.finish()
    }

    pub fn drain(stage: &mut dyn Stage, metrics: &EngineMetrics) -> Vec<ChainItem> {
        let label = stage.kind().to_string();
        let mut scope = StageScope::enter("test", &label, metrics, Instant::now());
        stage.drain(&mut scope);
        scope.finish()
    }

    pub fn records(items: &[ChainItem]) -> Vec<SharedRecord> {
        items
            .iter()
            .flat_map(|item| match item {
                ChainItem::Record(record) => vec![record.clone()],
                ChainItem::Batch(batch) => batch.records.clone(),
            })
            .collect()
    }
}
