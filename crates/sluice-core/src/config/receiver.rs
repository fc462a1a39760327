//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Receiver configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::error::{PipelineError, PipelineResult};
use crate::types::SignalType;

/// How a receiver obtains input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverKind {
    /// Tail a local file on an interval
    File,
    /// HTTP GET an endpoint on an interval
    HttpScrape,
    /// Accept payloads pushed by producers
    Push,
}

/// Line format understood by the decoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    /// One JSON object per line
    Json,
    /// One log record per line
    #[default]
    Text,
    /// Prometheus text exposition
    Prometheus,
}

/// A key/value pair of configured attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AttributeSpec {
    #[validate(length(min = 1, max = 256))]
    pub key: String,
    pub value: String,
}

impl AttributeSpec {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Receiver configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiverSpec {
    /// Receiver kind
    pub kind: ReceiverKind,

    /// Input line format
    #[serde(default)]
    pub format: RecordFormat,

    /// Signal type for formats that do not carry one
    #[serde(default = "default_signal_type")]
    pub signal_type: SignalType,

    /// File path for `file` receivers
    pub path: Option<String>,

    /// Endpoint for `http_scrape` receivers
    #[validate(url)]
    pub url: Option<String>,

    /// Pull interval in milliseconds
    #[serde(default = "default_interval_ms")]
    #[validate(range(min = 1, max = 86_400_000))]
    pub interval_ms: u64,

    /// Scrape request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1, max = 300_000))]
    pub timeout_ms: u64,

    /// Push channel capacity
    #[serde(default = "default_buffer")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub buffer: usize,

    /// Resource attributes stamped on every record (configured values win)
    #[serde(default)]
    pub resource_attributes: Vec<AttributeSpec>,
}

fn default_signal_type() -> SignalType {
    SignalType::Log
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_buffer() -> usize {
    1_024
}

impl ReceiverSpec {
    /// Create a spec of the given kind with default settings
    pub fn new(kind: ReceiverKind) -> Self {
        Self {
            kind,
            format: RecordFormat::default(),
            signal_type: default_signal_type(),
            path: None,
            url: None,
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
            buffer: default_buffer(),
            resource_attributes: Vec::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check the fields required by the receiver kind
    pub fn validate_kind(&self, id: &str) -> PipelineResult<()> {
        match self.kind {
            ReceiverKind::File if self.path.as_deref().map_or(true, str::is_empty) => {
                Err(PipelineError::configuration(format!(
                    "receiver '{}': file receiver requires 'path'",
                    id
                )))
            }
            ReceiverKind::HttpScrape if self.url.is_none() => Err(PipelineError::configuration(
                format!("receiver '{}': http_scrape receiver requires 'url'", id),
            )),
            _ => Ok(()),
        }
    }
}
