//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Sluice pipeline engine
//!
//! Receivers normalize input into records, the router fans records out to
//! pipelines, each pipeline runs its own processor chain and hands batches
//! to per-destination exporters with bounded queues and retry/backoff.
//!
//! ```text
//! Receiver -> Router -> ProcessorChain (per pipeline) -> ExportQueue -> ExportSink
//! ```

pub mod exporters;
pub mod pipeline;
pub mod processors;
pub mod receivers;

// Re-export commonly used types
pub use exporters::{
    DeliveryReceipt, EnvSecretResolver, ExportSink, MemorySink, ScriptedFailure, Secret,
    SecretResolver, StaticSecretResolver,
};
pub use pipeline::{Engine, EngineBuilder, ShutdownReport};
pub use processors::{ChainItem, ProcessorChain, Stage, StageKind, StageRegistry, StageScope};
pub use receivers::{PushBody, PushHandle, PushPayload, Receiver, ReceiverMode};

pub use sluice_core::{PipelineError, PipelineResult};
