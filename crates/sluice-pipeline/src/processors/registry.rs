//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Stage kinds and their factories

use sluice_core::{PipelineError, PipelineResult, StageSpec};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{
    BatchStage, FilterStage, GroupStage, RecordStageAdapter, ResourceEnrichStage, SamplerStage,
    Stage, TransformStage,
};

/// Declared kind of a stage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StageKind {
    Filter,
    Transform,
    ResourceEnrich,
    Batch,
    Sampler,
    Group,
    Custom(String),
}

impl StageKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "filter" => StageKind::Filter,
            "transform" => StageKind::Transform,
            "resource_enrich" => StageKind::ResourceEnrich,
            "batch" => StageKind::Batch,
            "sampler" => StageKind::Sampler,
            "group" => StageKind::Group,
            other => StageKind::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StageKind::Filter => "filter",
            StageKind::Transform => "transform",
            StageKind::ResourceEnrich => "resource_enrich",
            StageKind::Batch => "batch",
            StageKind::Sampler => "sampler",
            StageKind::Group => "group",
            StageKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a stage handler from its configuration
pub type StageFactory = Arc<dyn Fn(&StageSpec) -> PipelineResult<Box<dyn Stage>> + Send + Sync>;

/// Maps stage kinds to factories
#[derive(Clone)]
pub struct StageRegistry {
    factories: HashMap<StageKind, StageFactory>,
}

impl StageRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with the built-in stage kinds
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("filter", |spec| {
            Ok(Box::new(RecordStageAdapter::new(FilterStage::from_spec(spec)?)) as Box<dyn Stage>)
        });
        registry.register("transform", |spec| {
            Ok(Box::new(RecordStageAdapter::new(TransformStage::from_spec(spec)?))
                as Box<dyn Stage>)
        });
        registry.register("resource_enrich", |spec| {
            Ok(Box::new(RecordStageAdapter::new(ResourceEnrichStage::from_spec(spec)?))
                as Box<dyn Stage>)
        });
        registry.register("sampler", |spec| {
            Ok(Box::new(RecordStageAdapter::new(SamplerStage::from_spec(spec)?)) as Box<dyn Stage>)
        });
        registry.register("batch", |spec| {
            Ok(Box::new(BatchStage::from_spec(spec)?) as Box<dyn Stage>)
        });
        registry.register("group", |spec| {
            Ok(Box::new(GroupStage::from_spec(spec)?) as Box<dyn Stage>)
        });
        registry
    }

    /// Register a factory for a stage kind, replacing any previous one
    pub fn register<F>(&mut self, kind: impl AsRef<str>, factory: F)
    where
        F: Fn(&StageSpec) -> PipelineResult<Box<dyn Stage>> + Send + Sync + 'static,
    {
        self.factories
            .insert(StageKind::parse(kind.as_ref()), Arc::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(&StageKind::parse(kind))
    }

    /// Build the stage at `label` (`kind#position`)
    pub fn build(&self, label: &str, spec: &StageSpec) -> PipelineResult<Box<dyn Stage>> {
        let kind = StageKind::parse(&spec.kind);
        let factory = self.factories.get(&kind).ok_or_else(|| {
            PipelineError::stage_config(label, format!("unknown stage kind '{}'", kind))
        })?;

        factory(spec).map_err(|e| match e {
            PipelineError::StageConfig {
                message, source, ..
            } => PipelineError::StageConfig {
                stage: label.to_string(),
                message,
                source,
            },
            other => other,
        })
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.factories.keys().map(StageKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("StageRegistry").field("kinds", &kinds).finish()
    }
}
