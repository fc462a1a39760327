//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Group (correlate) stage
//!
//! Buffers records sharing a key value inside a window opened by the first
//! record of the group. A group is emitted as one batch, tagged with
//! `group.key` and `group.reason`, when it expires, completes, is evicted to
//! respect `max_groups`, or on drain. Records without the key pass through.
//! Open groups are indexed by opening order, so expiry and eviction never
//! scan every key.

use serde::Deserialize;
use sluice_core::types::FieldRef;
use sluice_core::{Batch, PipelineError, PipelineResult, SharedRecord, StageSpec};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

use super::{parse_parameters, ChainItem, Stage, StageScope};

pub const GROUP_KEY_METADATA: &str = "group.key";
pub const GROUP_REASON_METADATA: &str = "group.reason";

fn default_max_groups() -> usize {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionParams {
    field: String,
    equals: String,
}

#[derive(Debug, Deserialize)]
struct GroupParams {
    key: String,
    window_ms: u64,
    max_records: Option<usize>,
    complete_when: Option<CompletionParams>,
    #[serde(default = "default_max_groups")]
    max_groups: usize,
}

/// Why a group was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Expired,
    Completed,
    Evicted,
    Drained,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Expired => "expired",
            CloseReason::Completed => "completed",
            CloseReason::Evicted => "evicted",
            CloseReason::Drained => "drained",
        }
    }
}

/// Position in the age index; the sequence breaks ties within one instant
type AgeKey = (Instant, u64);

#[derive(Debug)]
struct OpenGroup {
    age: AgeKey,
    records: Vec<SharedRecord>,
}

/// Group stage
#[derive(Debug)]
pub struct GroupStage {
    key: FieldRef,
    window: Duration,
    max_records: Option<usize>,
    complete_when: Option<(FieldRef, String)>,
    max_groups: usize,
    groups: HashMap<String, OpenGroup>,
    by_age: BTreeMap<AgeKey, String>,
    next_seq: u64,
}

impl GroupStage {
    pub fn new(key: &str, window: Duration) -> Self {
        Self {
            key: FieldRef::parse(key),
            window,
            max_records: None,
            complete_when: None,
            max_groups: default_max_groups(),
            groups: HashMap::new(),
            by_age: BTreeMap::new(),
            next_seq: 0,
        }
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    pub fn with_completion(mut self, field: &str, equals: impl Into<String>) -> Self {
        self.complete_when = Some((FieldRef::parse(field), equals.into()));
        self
    }

    pub fn with_max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = max_groups;
        self
    }

    pub fn from_spec(spec: &StageSpec) -> PipelineResult<Self> {
        let params: GroupParams = parse_parameters(spec)?;
        if params.window_ms == 0 {
            return Err(PipelineError::stage_config("group", "window_ms must be at least 1"));
        }
        if params.max_groups == 0 || params.max_records == Some(0) {
            return Err(PipelineError::stage_config(
                "group",
                "max_groups and max_records must be at least 1",
            ));
        }

        let mut stage = Self::new(&params.key, Duration::from_millis(params.window_ms))
            .with_max_groups(params.max_groups);
        if let Some(max_records) = params.max_records {
            stage = stage.with_max_records(max_records);
        }
        if let Some(completion) = params.complete_when {
            stage = stage.with_completion(&completion.field, completion.equals);
        }
        Ok(stage)
    }

    /// Number of open groups
    pub fn open_groups(&self) -> usize {
        self.groups.len()
    }

    fn open(&mut self, key: String, now: Instant) {
        let age = (now, self.next_seq);
        self.next_seq += 1;
        self.by_age.insert(age, key.clone());
        self.groups.insert(
            key,
            OpenGroup {
                age,
                records: Vec::new(),
            },
        );
    }

    fn close(&mut self, key: &str, reason: CloseReason, scope: &mut StageScope<'_>) {
        if let Some(group) = self.groups.remove(key) {
            self.by_age.remove(&group.age);
            let batch = Batch::new(scope.pipeline(), group.records)
                .with_metadata(GROUP_KEY_METADATA, key)
                .with_metadata(GROUP_REASON_METADATA, reason.as_str());
            scope.emit(ChainItem::Batch(batch));
        }
    }

    fn oldest(&self) -> Option<String> {
        self.by_age.values().next().cloned()
    }

    /// Keys of groups whose window has passed, oldest first
    fn expired_keys(&self, now: Instant) -> Vec<String> {
        self.by_age
            .iter()
            .take_while(|((opened_at, _), _)| {
                now.saturating_duration_since(*opened_at) >= self.window
            })
            .map(|(_, key)| key.clone())
            .collect()
    }

    fn is_complete(&self, group: &OpenGroup, record: &SharedRecord) -> bool {
        if matches!(self.max_records, Some(max) if group.records.len() >= max) {
            return true;
        }
        match &self.complete_when {
            Some((field, expected)) => {
                record.field(field).map_or(false, |v| v.as_ref() == expected)
            }
            None => false,
        }
    }

    fn accept(&mut self, record: SharedRecord, scope: &mut StageScope<'_>) {
        let key = record.field(&self.key).map(|key| key.into_owned());
        let key = match key {
            Some(key) => key,
            None => {
                scope.emit(ChainItem::Record(record));
                return;
            }
        };
        let now = scope.now();

        let expired = self.groups.get(&key).map_or(false, |group| {
            now.saturating_duration_since(group.age.0) >= self.window
        });
        if expired {
            self.close(&key, CloseReason::Expired, scope);
        }

        if !self.groups.contains_key(&key) {
            while self.groups.len() >= self.max_groups {
                match self.oldest() {
                    Some(oldest) => self.close(&oldest, CloseReason::Evicted, scope),
                    None => break,
                }
            }
            self.open(key.clone(), now);
        }

        if let Some(group) = self.groups.get_mut(&key) {
            group.records.push(record.clone());
        }
        let complete = self
            .groups
            .get(&key)
            .map_or(false, |group| self.is_complete(group, &record));

        if complete {
            self.close(&key, CloseReason::Completed, scope);
        }
    }
}

impl Stage for GroupStage {
    fn kind(&self) -> &str {
        "group"
    }

    fn process(&mut self, item: ChainItem, scope: &mut StageScope<'_>) {
        match item {
            ChainItem::Record(record) => self.accept(record, scope),
            ChainItem::Batch(batch) => {
                for record in batch.records {
                    self.accept(record, scope);
                }
            }
        }
    }

    fn on_tick(&mut self, scope: &mut StageScope<'_>) {
        for key in self.expired_keys(scope.now()) {
            self.close(&key, CloseReason::Expired, scope);
        }
    }

    fn drain(&mut self, scope: &mut StageScope<'_>) {
        let keys: Vec<String> = self.by_age.values().cloned().collect();
        for key in keys {
            self.close(&key, CloseReason::Drained, scope);
        }
    }
}
