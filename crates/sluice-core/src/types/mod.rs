//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Core data types for the Sluice pipeline
//!
//! This module provides the in-flight record representation and the batch
//! unit handed to exporters.

pub mod batch;
pub mod record;

pub use batch::Batch;
pub use record::{
    Attributes, Body, FieldRef, RecordBuilder, SharedRecord, SignalType, TelemetryRecord,
};
