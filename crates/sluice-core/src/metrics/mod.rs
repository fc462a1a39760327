//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Self-observability for the Sluice pipeline engine
//!
//! [`EngineMetrics`] is an explicitly owned handle passed to every receiver,
//! chain, router input and exporter. Values are readable in-process and are
//! mirrored to the `metrics` facade for whichever recorder the host installs.

pub mod collector;
pub mod names;

// Re-export commonly used types
pub use collector::{EngineMetrics, MetricKind, MetricSample};
