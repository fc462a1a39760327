//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Sluice core
//!
//! Shared building blocks for the Sluice telemetry pipeline: the immutable
//! record model, the configuration model and its loaders, the error taxonomy,
//! health types and the engine's own operational counters.

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::{
    AttributeSpec, BackpressurePolicy, CredentialHandle, EngineConfig, ExporterKind,
    ExporterSpec, OverflowPolicy, PipelineInputSpec, PipelineSpec, ReceiverKind, ReceiverSpec,
    RecordFormat, RetrySpec, StageSpec,
};
pub use error::{ErrorContext, PipelineError, PipelineResult};
pub use health::{ComponentHealth, ComponentKind, HealthReport, HealthStatus};
pub use metrics::{EngineMetrics, MetricKind, MetricSample};
pub use types::{Attributes, Batch, Body, SharedRecord, SignalType, TelemetryRecord};

/// Sluice version information
pub const SLUICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sluice name
pub const SLUICE_NAME: &str = "sluice";

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/sluice.toml";

/// Default agent HTTP endpoint (health, metrics, push ingest)
pub const DEFAULT_HTTP_ENDPOINT: &str = "0.0.0.0:8088";
