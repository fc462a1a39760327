//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Transform stage
//!
//! Applies ordered attribute operations. Each operation sees the result of
//! the previous one. A referenced field that is absent makes the operation a
//! no-op; only a strict `extract_json` turns bad input into a record error.

use regex::Regex;
use serde::Deserialize;
use sluice_core::types::FieldRef;
use sluice_core::{
    Attributes, Body, PipelineError, PipelineResult, SharedRecord, StageSpec, TelemetryRecord,
};
use std::borrow::Cow;
use tokio::time::Instant;

use super::{parse_parameters, RecordStage, Verdict};

fn default_source() -> String {
    "body".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum OperationParams {
    ExtractJson {
        #[serde(default = "default_source")]
        source: String,
        #[serde(default)]
        prefix: String,
        #[serde(default)]
        strict: bool,
    },
    RegexCapture {
        #[serde(default = "default_source")]
        source: String,
        pattern: String,
    },
    Set {
        key: String,
        value: String,
    },
    Copy {
        from: String,
        to: String,
    },
    Rename {
        from: String,
        to: String,
    },
    Delete {
        key: String,
    },
}

#[derive(Debug, Deserialize)]
struct TransformParams {
    operations: Vec<OperationParams>,
}

/// Compiled transform operation
#[derive(Debug)]
pub enum Operation {
    ExtractJson {
        source: FieldRef,
        prefix: String,
        strict: bool,
    },
    RegexCapture {
        source: FieldRef,
        regex: Regex,
    },
    Set {
        key: String,
        value: String,
    },
    Copy {
        from: FieldRef,
        to: String,
    },
    Rename {
        from: String,
        to: String,
    },
    Delete {
        key: String,
    },
}

impl Operation {
    fn compile(params: OperationParams) -> PipelineResult<Self> {
        Ok(match params {
            OperationParams::ExtractJson {
                source,
                prefix,
                strict,
            } => Operation::ExtractJson {
                source: FieldRef::parse(&source),
                prefix,
                strict,
            },
            OperationParams::RegexCapture { source, pattern } => {
                let regex = Regex::new(&pattern).map_err(|e| {
                    PipelineError::stage_config_with_source(
                        "transform",
                        format!("invalid regex '{}'", pattern),
                        e,
                    )
                })?;
                if regex.capture_names().flatten().next().is_none() {
                    return Err(PipelineError::stage_config(
                        "transform",
                        format!("regex '{}' has no named capture groups", pattern),
                    ));
                }
                Operation::RegexCapture {
                    source: FieldRef::parse(&source),
                    regex,
                }
            }
            OperationParams::Set { key, value } => Operation::Set { key, value },
            OperationParams::Copy { from, to } => Operation::Copy {
                from: FieldRef::parse(&from),
                to,
            },
            OperationParams::Rename { from, to } => Operation::Rename { from, to },
            OperationParams::Delete { key } => Operation::Delete { key },
        })
    }
}

/// Transform stage
#[derive(Debug)]
pub struct TransformStage {
    operations: Vec<Operation>,
}

impl TransformStage {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn from_spec(spec: &StageSpec) -> PipelineResult<Self> {
        let params: TransformParams = parse_parameters(spec)?;
        let operations = params
            .operations
            .into_iter()
            .map(Operation::compile)
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(Self::new(operations))
    }

    fn read<'a>(
        record: &'a TelemetryRecord,
        attributes: &'a Attributes,
        field: &FieldRef,
    ) -> Option<Cow<'a, str>> {
        match field {
            FieldRef::Attribute(key) => attributes.get(key).map(|v| Cow::Borrowed(v.as_str())),
            other => record.field(other),
        }
    }

    fn extract_json(
        record: &TelemetryRecord,
        attributes: &mut Attributes,
        source: &FieldRef,
        prefix: &str,
        strict: bool,
    ) -> PipelineResult<()> {
        let parsed = match (source, record.body()) {
            (FieldRef::Body, Body::Structured(value)) => Some(value.clone()),
            _ => match Self::read(record, attributes, source) {
                None => None,
                Some(text) => match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(value) => Some(value),
                    Err(e) if strict => {
                        return Err(PipelineError::record_processing_with_source(
                            format!("'{}' is not valid JSON", source),
                            e,
                        ))
                    }
                    Err(_) => None,
                },
            },
        };

        match parsed {
            Some(serde_json::Value::Object(map)) => {
                for (key, value) in map {
                    flatten_into(attributes, &format!("{}{}", prefix, key), value);
                }
                Ok(())
            }
            Some(_) if strict => Err(PipelineError::record_processing(format!(
                "'{}' is not a JSON object",
                source
            ))),
            _ => Ok(()),
        }
    }

    fn transform(&self, record: &TelemetryRecord) -> PipelineResult<Attributes> {
        let mut attributes = record.attributes().clone();

        for operation in &self.operations {
            match operation {
                Operation::ExtractJson {
                    source,
                    prefix,
                    strict,
                } => Self::extract_json(record, &mut attributes, source, prefix, *strict)?,
                Operation::RegexCapture { source, regex } => {
                    let captured: Vec<(String, String)> =
                        match Self::read(record, &attributes, source) {
                            None => Vec::new(),
                            Some(text) => match regex.captures(&text) {
                                None => Vec::new(),
                                Some(captures) => regex
                                    .capture_names()
                                    .flatten()
                                    .filter_map(|name| {
                                        captures
                                            .name(name)
                                            .map(|m| (name.to_string(), m.as_str().to_string()))
                                    })
                                    .collect(),
                            },
                        };
                    attributes.extend(captured);
                }
                Operation::Set { key, value } => {
                    attributes.insert(key.clone(), value.clone());
                }
                Operation::Copy { from, to } => {
                    let value = Self::read(record, &attributes, from).map(Cow::into_owned);
                    if let Some(value) = value {
                        attributes.insert(to.clone(), value);
                    }
                }
                Operation::Rename { from, to } => {
                    if let Some(value) = attributes.remove(from) {
                        attributes.insert(to.clone(), value);
                    }
                }
                Operation::Delete { key } => {
                    attributes.remove(key);
                }
            }
        }

        Ok(attributes)
    }
}

fn flatten_into(attributes: &mut Attributes, key: &str, value: serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (child, value) in map {
                flatten_into(attributes, &format!("{}.{}", key, child), value);
            }
        }
        serde_json::Value::String(text) => {
            attributes.insert(key.to_string(), text);
        }
        serde_json::Value::Null => {}
        other => {
            attributes.insert(key.to_string(), other.to_string());
        }
    }
}

impl RecordStage for TransformStage {
    fn kind(&self) -> &str {
        "transform"
    }

    fn apply(&mut self, record: SharedRecord, _now: Instant) -> PipelineResult<Verdict> {
        let attributes = self.transform(&record)?;
        if &attributes == record.attributes() {
            return Ok(Verdict::Keep(record));
        }
        Ok(Verdict::Keep(
            record.derive().replace_attributes(attributes).build_shared(),
        ))
    }
}
