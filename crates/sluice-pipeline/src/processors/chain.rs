//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Ordered processor chain bound to one pipeline

use sluice_core::{EngineMetrics, PipelineResult, SharedRecord, StageSpec};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use super::{ChainItem, Stage, StageRegistry, StageScope};

struct BoundStage {
    label: String,
    stage: Box<dyn Stage>,
}

/// Ordered sequence of stages owned by exactly one pipeline
pub struct ProcessorChain {
    pipeline: String,
    stages: Vec<BoundStage>,
    metrics: Arc<EngineMetrics>,
}

impl ProcessorChain {
    /// Create an empty chain
    pub fn new(pipeline: impl Into<String>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            pipeline: pipeline.into(),
            stages: Vec::new(),
            metrics,
        }
    }

    /// Build a chain from stage specs in declared order
    pub fn from_specs(
        pipeline: impl Into<String>,
        specs: &[StageSpec],
        registry: &StageRegistry,
        metrics: Arc<EngineMetrics>,
    ) -> PipelineResult<Self> {
        let mut chain = Self::new(pipeline, metrics);
        for (position, spec) in specs.iter().enumerate() {
            let label = format!("{}#{}", spec.kind, position);
            let stage = registry.build(&label, spec)?;
            chain.stages.push(BoundStage { label, stage });
        }
        debug!(pipeline = %chain.pipeline, stages = chain.stages.len(), "Built processor chain");
        Ok(chain)
    }

    /// Append a stage
    pub fn push_stage(&mut self, stage: Box<dyn Stage>) {
        let label = format!("{}#{}", stage.kind(), self.stages.len());
        self.stages.push(BoundStage { label, stage });
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage labels in execution order
    pub fn stage_labels(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.label.as_str()).collect()
    }

    /// Run one record through every stage
    pub fn process(&mut self, record: SharedRecord, now: Instant) -> Vec<ChainItem> {
        self.run_from(0, vec![ChainItem::Record(record)], now)
    }

    /// Drive time thresholds; each stage's tick output continues down the chain
    pub fn tick(&mut self, now: Instant) -> Vec<ChainItem> {
        let mut output = Vec::new();
        for index in 0..self.stages.len() {
            let emitted = {
                let bound = &mut self.stages[index];
                let mut scope = StageScope::enter(&self.pipeline, &bound.label, &self.metrics, now);
                bound.stage.on_tick(&mut scope);
                scope.finish()
            };
            if !emitted.is_empty() {
                output.extend(self.run_from(index + 1, emitted, now));
            }
        }
        output
    }

    /// Flush every stage in order
    pub fn drain(&mut self) -> Vec<ChainItem> {
        let now = Instant::now();
        let mut output = Vec::new();
        for index in 0..self.stages.len() {
            let emitted = {
                let bound = &mut self.stages[index];
                let mut scope = StageScope::enter(&self.pipeline, &bound.label, &self.metrics, now);
                bound.stage.drain(&mut scope);
                scope.finish()
            };
            if !emitted.is_empty() {
                output.extend(self.run_from(index + 1, emitted, now));
            }
        }
        output
    }

    fn run_from(
        &mut self,
        start: usize,
        mut items: Vec<ChainItem>,
        now: Instant,
    ) -> Vec<ChainItem> {
        for bound in self.stages.iter_mut().skip(start) {
            if items.is_empty() {
                break;
            }
            let mut scope = StageScope::enter(&self.pipeline, &bound.label, &self.metrics, now);
            for item in items {
                scope.count_in(item.record_count());
                bound.stage.process(item, &mut scope);
            }
            items = scope.finish();
        }
        items
    }
}

impl std::fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorChain")
            .field("pipeline", &self.pipeline)
            .field("stages", &self.stage_labels())
            .finish()
    }
}
