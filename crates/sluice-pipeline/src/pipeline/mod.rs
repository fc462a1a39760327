//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Engine assembly and runtime
//!
//! The [`Engine`] wires receivers, the [`Router`], pipeline tasks and
//! exporter tasks from an `EngineConfig` and owns their lifecycle.

pub mod engine;
pub mod router;
pub mod runtime;

pub use engine::{Engine, EngineBuilder, ShutdownReport};
pub use router::{PipelineInput, Router};
pub use runtime::PipelineRuntime;
