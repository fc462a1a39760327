//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! W3C trace context (`traceparent`) parsing
//!
//! Records pushed with a `traceparent` header are correlated by stamping the
//! trace and span ids on their attributes.

use crate::error::{PipelineError, PipelineResult};

pub const TRACE_ID_ATTRIBUTE: &str = "trace_id";
pub const SPAN_ID_ATTRIBUTE: &str = "span_id";
pub const TRACE_FLAGS_ATTRIBUTE: &str = "trace_flags";

/// Parsed `traceparent` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub trace_flags: String,
}

impl TraceContext {
    /// Attribute pairs stamped on correlated records
    pub fn attributes(&self) -> [(&'static str, &str); 3] {
        [
            (TRACE_ID_ATTRIBUTE, self.trace_id.as_str()),
            (SPAN_ID_ATTRIBUTE, self.span_id.as_str()),
            (TRACE_FLAGS_ATTRIBUTE, self.trace_flags.as_str()),
        ]
    }
}

fn is_lower_hex(field: &str, len: usize) -> bool {
    field.len() == len && field.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Parse `version-trace_id-span_id-flags`
///
/// Version `ff` and all-zero ids are invalid. Future versions may append
/// fields after the flags; those are ignored.
pub fn parse_traceparent(header: &str) -> PipelineResult<TraceContext> {
    let invalid = || PipelineError::source_read(format!("invalid traceparent '{}'", header));

    let mut parts = header.trim().split('-');
    let version = parts.next().ok_or_else(invalid)?;
    let trace_id = parts.next().ok_or_else(invalid)?;
    let span_id = parts.next().ok_or_else(invalid)?;
    let trace_flags = parts.next().ok_or_else(invalid)?;

    if !is_lower_hex(version, 2) || version == "ff" {
        return Err(invalid());
    }
    if version == "00" && parts.next().is_some() {
        return Err(invalid());
    }
    if !is_lower_hex(trace_id, 32) || trace_id.bytes().all(|b| b == b'0') {
        return Err(invalid());
    }
    if !is_lower_hex(span_id, 16) || span_id.bytes().all(|b| b == b'0') {
        return Err(invalid());
    }
    if !is_lower_hex(trace_flags, 2) {
        return Err(invalid());
    }

    Ok(TraceContext {
        trace_id: trace_id.to_string(),
        span_id: span_id.to_string(),
        trace_flags: trace_flags.to_string(),
    })
}
