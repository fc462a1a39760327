//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Error handling for the Sluice pipeline engine
//!
//! Only configuration-load errors are fatal. Everything raised while records
//! flow is contained by the component that raised it and surfaced as a
//! counter.

pub mod context;
pub mod conversions;
pub mod types;

// Re-export commonly used types
pub use context::ErrorContext;
pub use types::{PipelineError, PipelineResult};
