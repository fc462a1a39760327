//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Health reporting for the Sluice pipeline engine

pub mod types;

// Re-export commonly used types
pub use types::{ComponentHealth, ComponentKind, HealthReport, HealthStatus};
