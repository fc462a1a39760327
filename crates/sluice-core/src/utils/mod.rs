//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Utility functions for the Sluice pipeline engine

pub mod trace_context;

// Re-export commonly used types
pub use trace_context::{parse_traceparent, TraceContext};
