//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Delivery batch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::record::SharedRecord;

/// Ordered, bounded group of records delivered together in one attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Unique batch identifier
    pub id: Uuid,

    /// Pipeline that assembled the batch
    pub pipeline: String,

    /// Assembly timestamp
    pub created_at: DateTime<Utc>,

    /// Records in arrival order
    pub records: Vec<SharedRecord>,

    /// Batch metadata
    pub metadata: BTreeMap<String, String>,
}

impl Batch {
    /// Create a new batch
    pub fn new(pipeline: impl Into<String>, records: Vec<SharedRecord>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            created_at: Utc::now(),
            records,
            metadata: BTreeMap::new(),
        }
    }

    /// Add metadata to the batch
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Number of records in the batch
    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
