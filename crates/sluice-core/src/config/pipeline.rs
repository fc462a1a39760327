//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::types::SignalType;

/// What a router does when a pipeline input channel is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Drop the record and count it
    #[default]
    Drop,
    /// Wait for capacity up to `block_timeout_ms`, then drop and count
    Block,
}

/// Bounded input channel between the router and a pipeline
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineInputSpec {
    #[serde(default = "default_capacity")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub capacity: usize,

    #[serde(default)]
    pub backpressure: BackpressurePolicy,

    #[serde(default = "default_block_timeout_ms")]
    #[validate(range(min = 1, max = 60_000))]
    pub block_timeout_ms: u64,
}

fn default_capacity() -> usize {
    4_096
}

fn default_block_timeout_ms() -> u64 {
    1_000
}

impl Default for PipelineInputSpec {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            backpressure: BackpressurePolicy::default(),
            block_timeout_ms: default_block_timeout_ms(),
        }
    }
}

impl PipelineInputSpec {
    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }
}

/// One processor stage: a kind name plus free-form parameters
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StageSpec {
    #[validate(length(min = 1, max = 64))]
    pub kind: String,

    #[serde(default = "default_parameters")]
    pub parameters: serde_json::Value,
}

fn default_parameters() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl StageSpec {
    pub fn new(kind: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            parameters,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineSpec {
    /// Signal type this pipeline accepts
    pub signal_type: SignalType,

    /// Receivers feeding this pipeline
    #[validate(length(min = 1))]
    pub receivers: Vec<String>,

    /// Ordered processor stages
    #[serde(default)]
    pub stages: Vec<StageSpec>,

    /// Exporters receiving this pipeline's batches
    #[validate(length(min = 1))]
    pub exporters: Vec<String>,

    /// Input channel settings
    #[serde(default)]
    pub input: PipelineInputSpec,

    /// Interval driving batch timeouts and group expiry
    #[serde(default = "default_tick_interval_ms")]
    #[validate(range(min = 1, max = 60_000))]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    100
}

impl PipelineSpec {
    pub fn new(signal_type: SignalType, receivers: Vec<String>, exporters: Vec<String>) -> Self {
        Self {
            signal_type,
            receivers,
            stages: Vec::new(),
            exporters,
            input: PipelineInputSpec::default(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }

    pub fn with_stage(mut self, stage: StageSpec) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
