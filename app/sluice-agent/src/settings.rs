//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Process settings read from the environment

use sluice_core::{EngineConfig, PipelineResult};
use std::path::PathBuf;
use tracing::info;

/// Engine configuration file path variable
pub const CONFIG_ENV: &str = "SLUICE_CONFIG";

/// HTTP listen address variable
pub const HTTP_ENDPOINT_ENV: &str = "SLUICE_HTTP_ENDPOINT";

/// Log output format variable (`json` or `text`)
pub const LOG_FORMAT_ENV: &str = "SLUICE_LOG_FORMAT";

pub const DEFAULT_CONFIG_PATH: &str = "config/sluice.toml";
pub const DEFAULT_HTTP_ENDPOINT: &str = "0.0.0.0:8090";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Agent settings
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub config_path: PathBuf,

    /// Whether the path came from the environment rather than the default
    pub config_explicit: bool,

    pub http_endpoint: String,
    pub log_format: LogFormat,
}

impl AgentSettings {
    /// Read settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let explicit = lookup(CONFIG_ENV);
        let log_format = match lookup(LOG_FORMAT_ENV) {
            Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            config_explicit: explicit.is_some(),
            config_path: PathBuf::from(explicit.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())),
            http_endpoint: lookup(HTTP_ENDPOINT_ENV)
                .unwrap_or_else(|| DEFAULT_HTTP_ENDPOINT.to_string()),
            log_format,
        }
    }

    /// Load the engine configuration
    ///
    /// An explicitly named file must load. A missing default file falls back
    /// to an empty engine.
    pub fn load_engine_config(&self) -> PipelineResult<EngineConfig> {
        if self.config_explicit || self.config_path.exists() {
            let config = EngineConfig::from_file(&self.config_path)?;
            info!(path = %self.config_path.display(), "Configuration loaded");
            return Ok(config);
        }

        info!(
            path = %self.config_path.display(),
            "No configuration file found, using default configuration"
        );
        Ok(EngineConfig::default())
    }
}
