//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Filter stage
//!
//! Keeps or drops records by matching rules against record fields. A field
//! that is absent never matches.

use regex::Regex;
use serde::Deserialize;
use sluice_core::types::FieldRef;
use sluice_core::{PipelineError, PipelineResult, SharedRecord, StageSpec, TelemetryRecord};
use tokio::time::Instant;

use super::{parse_parameters, DropReason, RecordStage, Verdict};

/// Filter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Keep only matching records
    #[default]
    Include,
    /// Drop matching records
    Exclude,
}

/// How multiple rules combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleCombination {
    #[default]
    All,
    Any,
}

#[derive(Debug, Deserialize)]
struct RuleParams {
    field: String,
    equals: Option<String>,
    regex: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilterParams {
    #[serde(default)]
    mode: FilterMode,
    #[serde(default)]
    combine: RuleCombination,
    rules: Vec<RuleParams>,
}

#[derive(Debug)]
enum Matcher {
    Equals(String),
    Regex(Regex),
}

/// Compiled filter rule
#[derive(Debug)]
pub struct FilterRule {
    field: FieldRef,
    matcher: Matcher,
}

impl FilterRule {
    pub fn equals(field: &str, value: impl Into<String>) -> Self {
        Self {
            field: FieldRef::parse(field),
            matcher: Matcher::Equals(value.into()),
        }
    }

    pub fn regex(field: &str, pattern: &str) -> PipelineResult<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            let message = format!("invalid regex '{}'", pattern);
            PipelineError::stage_config_with_source("filter", message, e)
        })?;
        Ok(Self {
            field: FieldRef::parse(field),
            matcher: Matcher::Regex(regex),
        })
    }

    pub fn matches(&self, record: &TelemetryRecord) -> bool {
        match record.field(&self.field) {
            None => false,
            Some(value) => match &self.matcher {
                Matcher::Equals(expected) => value.as_ref() == expected,
                Matcher::Regex(regex) => regex.is_match(&value),
            },
        }
    }
}

/// Filter stage
#[derive(Debug)]
pub struct FilterStage {
    mode: FilterMode,
    combine: RuleCombination,
    rules: Vec<FilterRule>,
}

impl FilterStage {
    pub fn new(mode: FilterMode, combine: RuleCombination, rules: Vec<FilterRule>) -> Self {
        Self {
            mode,
            combine,
            rules,
        }
    }

    pub fn from_spec(spec: &StageSpec) -> PipelineResult<Self> {
        let params: FilterParams = parse_parameters(spec)?;
        if params.rules.is_empty() {
            return Err(PipelineError::stage_config("filter", "at least one rule is required"));
        }

        let rules = params
            .rules
            .iter()
            .map(|rule| match (&rule.equals, &rule.regex) {
                (Some(value), None) => Ok(FilterRule::equals(&rule.field, value.clone())),
                (None, Some(pattern)) => FilterRule::regex(&rule.field, pattern),
                _ => Err(PipelineError::stage_config(
                    "filter",
                    format!("rule on '{}' needs exactly one of 'equals' or 'regex'", rule.field),
                )),
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        Ok(Self::new(params.mode, params.combine, rules))
    }

    /// Whether the rules match the record
    pub fn matches(&self, record: &TelemetryRecord) -> bool {
        match self.combine {
            RuleCombination::All => self.rules.iter().all(|rule| rule.matches(record)),
            RuleCombination::Any => self.rules.iter().any(|rule| rule.matches(record)),
        }
    }
}

impl RecordStage for FilterStage {
    fn kind(&self) -> &str {
        "filter"
    }

    fn apply(&mut self, record: SharedRecord, _now: Instant) -> PipelineResult<Verdict> {
        let keep = self.matches(&record) == (self.mode == FilterMode::Include);
        if keep {
            Ok(Verdict::Keep(record))
        } else {
            Ok(Verdict::Drop(DropReason::Filtered))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support::{log, records, run};
    use crate::processors::{ChainItem, RecordStageAdapter};
    use serde_json::json;
    use sluice_core::metrics::names;
    use sluice_core::{Batch, EngineMetrics};

    fn stage(parameters: serde_json::Value) -> FilterStage {
        FilterStage::from_spec(&StageSpec::new("filter", parameters)).unwrap()
    }

    #[test]
    fn test_kept_iff_match_equals_include() {
        let severities = ["debug", "info", "warn", "error"];
        for mode in ["include", "exclude"] {
            let mut filter = stage(json!({
                "mode": mode,
                "rules": [{ "field": "severity", "equals": "debug" }]
            }));

            for severity in severities {
                let record = log(&[("severity", severity)]);
                let matched = filter.matches(&record);
                let verdict = filter.apply(record, Instant::now()).unwrap();
                let kept = matches!(verdict, Verdict::Keep(_));
                assert_eq!(kept, matched == (mode == "include"), "{} {}", mode, severity);
            }
        }
    }

    #[test]
    fn test_missing_field_never_matches() {
        let filter = stage(json!({ "rules": [{ "field": "attributes.tenant", "regex": ".*" }] }));
        assert!(!filter.matches(&log(&[])));
        assert!(filter.matches(&log(&[("tenant", "")])));
    }

    #[test]
    fn test_any_and_all_combination() {
        let rules = json!([
            { "field": "severity", "equals": "error" },
            { "field": "body", "regex": "^timeout" }
        ]);
        let all = stage(json!({ "combine": "all", "rules": rules.clone() }));
        let any = stage(json!({ "combine": "any", "rules": rules }));

        let record = log(&[("severity", "error")]);
        assert!(!all.matches(&record));
        assert!(any.matches(&record));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let bad_regex =
            StageSpec::new("filter", json!({ "rules": [{ "field": "body", "regex": "(" }] }));
        assert!(FilterStage::from_spec(&bad_regex).unwrap_err().is_fatal());

        let ambiguous = StageSpec::new(
            "filter",
            json!({ "rules": [{ "field": "body", "equals": "a", "regex": "a" }] }),
        );
        assert!(FilterStage::from_spec(&ambiguous).is_err());

        let empty = StageSpec::new("filter", json!({ "rules": [] }));
        assert!(FilterStage::from_spec(&empty).is_err());
    }

    #[test]
    fn test_batch_filtered_per_record_and_drops_counted() {
        let metrics = EngineMetrics::new();
        let mut adapter = RecordStageAdapter::new(stage(json!({
            "mode": "exclude",
            "rules": [{ "field": "severity", "equals": "debug" }]
        })));

        let batch = Batch::new(
            "test",
            vec![log(&[("severity", "debug")]), log(&[("severity", "info")])],
        );
        let all_debug = Batch::new("test", vec![log(&[("severity", "debug")])]);

        let output = run(
            &mut adapter,
            &metrics,
            Instant::now(),
            vec![ChainItem::Batch(batch), ChainItem::Batch(all_debug)],
        );

        assert_eq!(output.len(), 1);
        assert_eq!(records(&output)[0].attribute("severity"), Some("info"));
        assert_eq!(
            metrics.counter_sum(names::RECORDS_DROPPED_TOTAL, &[("reason", "filtered")]),
            2
        );
    }
}
