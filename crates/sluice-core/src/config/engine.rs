//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Top-level engine configuration
//!
//! Loading runs three layers of checks: serde shape, `validator` field rules,
//! then cross-reference checks between pipelines, receivers and exporters.
//! Any failure is a fatal [`PipelineError::Configuration`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use validator::Validate;

use super::{ExporterSpec, PipelineSpec, ReceiverSpec};
use crate::error::{PipelineError, PipelineResult};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineConfig {
    /// Engine instance name
    #[serde(default = "default_name")]
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    #[validate(length(min = 1, max = 20))]
    pub environment: String,

    /// How long shutdown may spend draining exporters
    #[serde(default = "default_shutdown_grace_ms")]
    #[validate(range(max = 600_000))]
    pub shutdown_grace_ms: u64,

    /// Receivers by id
    #[serde(default)]
    pub receivers: BTreeMap<String, ReceiverSpec>,

    /// Exporters by id
    #[serde(default)]
    pub exporters: BTreeMap<String, ExporterSpec>,

    /// Pipelines by id
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineSpec>,
}

fn default_name() -> String {
    crate::SLUICE_NAME.to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_shutdown_grace_ms() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            environment: default_environment(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            receivers: BTreeMap::new(),
            exporters: BTreeMap::new(),
            pipelines: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file, with `SLUICE__`-prefixed environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        debug!(path = %path.as_ref().display(), "Loading engine configuration");
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("SLUICE").separator("__"))
            .build()
            .map_err(|e| {
                PipelineError::configuration_with_source("Failed to load configuration", e)
            })?;

        let engine_config: EngineConfig = config.try_deserialize().map_err(|e| {
            PipelineError::configuration_with_source("Failed to deserialize configuration", e)
        })?;

        engine_config.validate_config()?;
        info!(
            engine = %engine_config.name,
            path = %path.as_ref().display(),
            receivers = engine_config.receivers.len(),
            pipelines = engine_config.pipelines.len(),
            exporters = engine_config.exporters.len(),
            "Loaded engine configuration"
        );
        Ok(engine_config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        let engine_config: EngineConfig = toml::from_str(content)?;
        engine_config.validate_config()?;
        Ok(engine_config)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Validate field rules and cross references
    pub fn validate_config(&self) -> PipelineResult<()> {
        self.validate()?;

        for (id, receiver) in &self.receivers {
            receiver.validate().map_err(|e| {
                let message = format!("receiver '{}' is invalid", id);
                PipelineError::configuration_with_source(message, e)
            })?;
            for attribute in &receiver.resource_attributes {
                attribute.validate()?;
            }
            receiver.validate_kind(id)?;
        }

        for (id, exporter) in &self.exporters {
            exporter.validate().map_err(|e| {
                PipelineError::configuration_with_source(format!("exporter '{}' is invalid", id), e)
            })?;
            exporter.retry.validate()?;
            exporter.validate_kind(id)?;
        }

        for (id, pipeline) in &self.pipelines {
            pipeline.validate().map_err(|e| {
                PipelineError::configuration_with_source(format!("pipeline '{}' is invalid", id), e)
            })?;
            pipeline.input.validate()?;

            for (position, stage) in pipeline.stages.iter().enumerate() {
                stage.validate().map_err(|e| {
                    PipelineError::stage_config_with_source(
                        format!("{}#{}", id, position),
                        "invalid stage",
                        e,
                    )
                })?;
            }

            for receiver in &pipeline.receivers {
                if !self.receivers.contains_key(receiver) {
                    return Err(PipelineError::configuration(format!(
                        "pipeline '{}' references unknown receiver '{}'",
                        id, receiver
                    )));
                }
            }

            for exporter in &pipeline.exporters {
                if !self.exporters.contains_key(exporter) {
                    return Err(PipelineError::configuration(format!(
                        "pipeline '{}' references unknown exporter '{}'",
                        id, exporter
                    )));
                }
            }
            debug!(pipeline = %id, stages = pipeline.stages.len(), "Pipeline configuration valid");
        }

        Ok(())
    }

    /// Get a pipeline by id
    pub fn pipeline(&self, id: &str) -> Option<&PipelineSpec> {
        self.pipelines.get(id)
    }
}
