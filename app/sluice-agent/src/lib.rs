//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Sluice agent
//!
//! Hosts one [`sluice_pipeline::Engine`] behind an HTTP surface for health
//! health checks, metrics and push ingest.

pub mod http;
pub mod settings;

/// Agent version
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
