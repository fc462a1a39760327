//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Configuration management for the Sluice pipeline engine
//!
//! This module provides type-safe configuration structures with validation
//! and layered file + environment loading.

pub mod engine;
pub mod exporter;
pub mod pipeline;
pub mod receiver;

// Re-export commonly used types
pub use engine::EngineConfig;
pub use exporter::{CredentialHandle, ExporterKind, ExporterSpec, OverflowPolicy, RetrySpec};
pub use pipeline::{BackpressurePolicy, PipelineInputSpec, PipelineSpec, StageSpec};
pub use receiver::{AttributeSpec, ReceiverKind, ReceiverSpec, RecordFormat};
