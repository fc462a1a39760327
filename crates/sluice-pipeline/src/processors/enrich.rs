//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Resource enrichment stage

use serde::Deserialize;
use sluice_core::{PipelineError, PipelineResult, SharedRecord, StageSpec};
use tokio::time::Instant;

use super::{parse_parameters, RecordStage, Verdict};

/// How an enrichment entry treats an existing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnrichAction {
    /// Set only if the key is absent
    Insert,
    /// Always overwrite
    #[default]
    Upsert,
}

/// One resource attribute to apply
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichEntry {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub action: EnrichAction,
}

#[derive(Debug, Deserialize)]
struct EnrichParams {
    attributes: Vec<EnrichEntry>,
}

/// Resource enrichment stage
///
/// Applying the stage twice yields the same record as applying it once.
#[derive(Debug)]
pub struct ResourceEnrichStage {
    entries: Vec<EnrichEntry>,
}

impl ResourceEnrichStage {
    pub fn new(entries: Vec<EnrichEntry>) -> Self {
        Self { entries }
    }

    pub fn from_spec(spec: &StageSpec) -> PipelineResult<Self> {
        let params: EnrichParams = parse_parameters(spec)?;
        if let Some(entry) = params.attributes.iter().find(|e| e.key.is_empty()) {
            return Err(PipelineError::stage_config(
                "resource_enrich",
                format!("empty key for value '{}'", entry.value),
            ));
        }
        Ok(Self::new(params.attributes))
    }
}

impl RecordStage for ResourceEnrichStage {
    fn kind(&self) -> &str {
        "resource_enrich"
    }

    fn apply(&mut self, record: SharedRecord, _now: Instant) -> PipelineResult<Verdict> {
        let mut resource = record.resource().clone();
        for entry in &self.entries {
            match entry.action {
                EnrichAction::Insert => {
                    resource
                        .entry(entry.key.clone())
                        .or_insert_with(|| entry.value.clone());
                }
                EnrichAction::Upsert => {
                    resource.insert(entry.key.clone(), entry.value.clone());
                }
            }
        }

        if &resource == record.resource() {
            return Ok(Verdict::Keep(record));
        }
        Ok(Verdict::Keep(record.derive().replace_resource(resource).build_shared()))
    }
}
