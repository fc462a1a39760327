//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Exporter configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use validator::Validate;

use crate::error::{PipelineError, PipelineResult};

/// Destination kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExporterKind {
    /// POST JSON batches to an HTTP endpoint
    Http,
    /// Append JSON lines to a file
    File,
    /// Write JSON lines to stdout
    Stdout,
    /// Keep batches in memory
    Memory,
}

/// Queue overflow behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued batch
    #[default]
    DropOldest,
    /// Reject the incoming batch
    DropNewest,
}

/// Opaque reference to a credential held by a secret store
///
/// Only the handle is kept in configuration. Its Debug output is redacted
/// so handles never leak the lookup path into logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialHandle(String);

impl CredentialHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialHandle(..)")
    }
}

/// Retry and backoff settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetrySpec {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_initial_interval_ms")]
    #[validate(range(min = 1))]
    pub initial_interval_ms: u64,

    #[serde(default = "default_max_interval_ms")]
    #[validate(range(min = 1))]
    pub max_interval_ms: u64,

    #[serde(default = "default_multiplier")]
    #[validate(range(min = 1.0, max = 100.0))]
    pub multiplier: f64,

    #[serde(default = "default_max_elapsed_time_ms")]
    #[validate(range(min = 1))]
    pub max_elapsed_time_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_initial_interval_ms() -> u64 {
    5_000
}

fn default_max_interval_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_elapsed_time_ms() -> u64 {
    300_000
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            multiplier: default_multiplier(),
            max_elapsed_time_ms: default_max_elapsed_time_ms(),
        }
    }
}

impl RetrySpec {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn max_elapsed_time(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_time_ms)
    }
}

/// Exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExporterSpec {
    /// Destination kind
    pub kind: ExporterKind,

    /// Destination URL (`http`) or file path (`file`)
    pub endpoint: Option<String>,

    /// Credential reference resolved at build time
    pub credential: Option<CredentialHandle>,

    /// Queue capacity in batches
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub queue_capacity: usize,

    /// Overflow policy
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Retry settings
    #[serde(default)]
    pub retry: RetrySpec,

    /// Per-attempt delivery timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1, max = 600_000))]
    pub timeout_ms: u64,

    /// Extra request headers (`http`)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_queue_capacity() -> usize {
    1_000
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl ExporterSpec {
    pub fn new(kind: ExporterKind) -> Self {
        Self {
            kind,
            endpoint: None,
            credential: None,
            queue_capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
            retry: RetrySpec::default(),
            timeout_ms: default_timeout_ms(),
            headers: BTreeMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check the fields required by the exporter kind and the retry bounds
    pub fn validate_kind(&self, id: &str) -> PipelineResult<()> {
        match self.kind {
            ExporterKind::Http | ExporterKind::File
                if self.endpoint.as_deref().map_or(true, str::is_empty) =>
            {
                return Err(PipelineError::configuration(format!(
                    "exporter '{}': {:?} exporter requires 'endpoint'",
                    id, self.kind
                )));
            }
            _ => {}
        }

        if self.retry.max_interval_ms < self.retry.initial_interval_ms {
            return Err(PipelineError::configuration(format!(
                "exporter '{}': retry.max_interval_ms must be >= retry.initial_interval_ms",
                id
            )));
        }

        Ok(())
    }
}
