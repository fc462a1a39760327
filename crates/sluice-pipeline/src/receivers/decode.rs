//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Line decoders for receiver input
//!
//! Every format decodes one line into at most one record. Blank lines and
//! comments decode to `None`; anything else that cannot be decoded is a
//! [`PipelineError::SourceRead`].

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use sluice_core::{
    Attributes, Body, PipelineError, PipelineResult, RecordFormat, SignalType, TelemetryRecord,
};

/// Attribute holding the sample name of a Prometheus record
pub const METRIC_NAME_ATTRIBUTE: &str = "metric.name";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonTimestamp {
    Nanos(i64),
    Rfc3339(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonLine {
    signal_type: Option<String>,
    timestamp: Option<JsonTimestamp>,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    resource: serde_json::Map<String, serde_json::Value>,
    body: Option<serde_json::Value>,
}

/// Decoder for one receiver's input format
#[derive(Debug, Clone, Copy)]
pub struct LineDecoder {
    format: RecordFormat,
    signal_type: SignalType,
}

impl LineDecoder {
    /// `signal_type` applies to formats that do not carry one
    pub fn new(format: RecordFormat, signal_type: SignalType) -> Self {
        Self { format, signal_type }
    }

    pub fn decode(&self, line: &str) -> PipelineResult<Option<TelemetryRecord>> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(None);
        }

        match self.format {
            RecordFormat::Text => Ok(Some(
                TelemetryRecord::builder(self.signal_type)
                    .body(Body::Text(line.to_string()))
                    .build(),
            )),
            RecordFormat::Json => self.decode_json(line).map(Some),
            RecordFormat::Prometheus => decode_prometheus(line),
        }
    }

    fn decode_json(&self, line: &str) -> PipelineResult<TelemetryRecord> {
        let parsed: JsonLine = serde_json::from_str(line)
            .map_err(|e| PipelineError::source_read_with_source("invalid JSON record", e))?;

        let signal_type = match parsed.signal_type {
            Some(signal) => signal.parse()?,
            None => self.signal_type,
        };

        let mut builder = TelemetryRecord::builder(signal_type)
            .attributes(flatten_values(parsed.attributes)?)
            .resources(flatten_values(parsed.resource)?);

        if let Some(timestamp) = parsed.timestamp {
            builder = builder.timestamp(parse_timestamp(timestamp)?);
        }

        let body = match parsed.body {
            None | Some(serde_json::Value::Null) => Body::Empty,
            Some(serde_json::Value::String(text)) => Body::Text(text),
            Some(serde_json::Value::Number(n)) => match n.as_f64() {
                Some(value) => Body::Value(value),
                None => Body::Structured(serde_json::Value::Number(n)),
            },
            Some(other) => Body::Structured(other),
        };

        Ok(builder.body(body).build())
    }
}

fn parse_timestamp(timestamp: JsonTimestamp) -> PipelineResult<DateTime<Utc>> {
    match timestamp {
        JsonTimestamp::Nanos(nanos) => Ok(Utc.timestamp_nanos(nanos)),
        JsonTimestamp::Rfc3339(text) => DateTime::parse_from_rfc3339(&text)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| {
                let message = format!("invalid timestamp '{}'", text);
                PipelineError::source_read_with_source(message, e)
            }),
    }
}

/// Attribute values must be scalars; they are stored as strings
fn flatten_values(map: serde_json::Map<String, serde_json::Value>) -> PipelineResult<Attributes> {
    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                other => {
                    return Err(PipelineError::source_read(format!(
                        "attribute '{}' must be a scalar, got {}",
                        key, other
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}

/// Decode one sample line of the Prometheus text exposition format
///
/// `name{label="value",...} value [timestamp_ms]`
fn decode_prometheus(line: &str) -> PipelineResult<Option<TelemetryRecord>> {
    let line = line.trim();
    if line.starts_with('#') {
        return Ok(None);
    }

    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .ok_or_else(|| PipelineError::source_read(format!("sample without value: '{}'", line)))?;
    let name = &line[..name_end];
    if !is_metric_name(name) {
        return Err(PipelineError::source_read(format!("invalid metric name '{}'", name)));
    }

    let mut builder =
        TelemetryRecord::builder(SignalType::Metric).attribute(METRIC_NAME_ATTRIBUTE, name);
    let mut rest = &line[name_end..];

    if let Some(labels) = rest.strip_prefix('{') {
        let (labels, remaining) = parse_labels(labels)?;
        builder = builder.attributes(labels);
        rest = remaining;
    }

    let mut fields = rest.split_whitespace();
    let value = fields
        .next()
        .ok_or_else(|| PipelineError::source_read(format!("sample '{}' has no value", name)))
        .and_then(parse_sample_value)?;
    builder = builder.body(Body::Value(value));

    if let Some(ts) = fields.next() {
        let millis: i64 = ts
            .parse()
            .map_err(|_| PipelineError::source_read(format!("invalid sample timestamp '{}'", ts)))?;
        let timestamp = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| {
                PipelineError::source_read(format!("sample timestamp out of range: {}", millis))
            })?;
        builder = builder.timestamp(timestamp);
    }
    if fields.next().is_some() {
        return Err(PipelineError::source_read(format!("trailing data after sample '{}'", name)));
    }

    Ok(Some(builder.build()))
}

fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn parse_sample_value(value: &str) -> PipelineResult<f64> {
    match value {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        other => other
            .parse()
            .map_err(|_| PipelineError::source_read(format!("invalid sample value '{}'", other))),
    }
}

/// Parse `label="value",...}` and return the labels and the text after `}`
fn parse_labels(input: &str) -> PipelineResult<(Vec<(String, String)>, &str)> {
    let mut labels = Vec::new();
    let mut rest = input.trim_start();

    loop {
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = rest
            .find('=')
            .ok_or_else(|| PipelineError::source_read("unterminated label set"))?;
        let key = rest[..eq].trim();
        if key.is_empty() {
            return Err(PipelineError::source_read("empty label name"));
        }
        rest = rest[eq + 1..].trim_start();
        rest = rest
            .strip_prefix('"')
            .ok_or_else(|| {
                PipelineError::source_read(format!("label '{}' value is not quoted", key))
            })?;

        let mut value = String::new();
        let mut chars = rest.char_indices();
        let end = loop {
            match chars.next() {
                Some((i, '"')) => break i,
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, c)) => value.push(c),
                    None => return Err(PipelineError::source_read("unterminated label value")),
                },
                Some((_, c)) => value.push(c),
                None => return Err(PipelineError::source_read("unterminated label value")),
            }
        };
        labels.push((key.to_string(), value));

        rest = rest[end + 1..].trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after.trim_start();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_lines() {
        let decoder = LineDecoder::new(RecordFormat::Text, SignalType::Log);
        let record = decoder.decode("hello world\n").unwrap().unwrap();
        assert_eq!(record.body(), &Body::Text("hello world".into()));
        assert_eq!(record.signal_type(), SignalType::Log);
        assert!(decoder.decode("   ").unwrap().is_none());
    }

    #[test]
    fn test_json_record() {
        let decoder = LineDecoder::new(RecordFormat::Json, SignalType::Log);
        let record = decoder
            .decode(concat!(
                r#"{"signal_type":"trace","timestamp":"2024-01-02T03:04:05Z","#,
                r#""attributes":{"status":500,"ok":false},"#,
                r#""resource":{"service.name":"api"},"body":{"msg":"x"}}"#,
            ))
            .unwrap()
            .unwrap();

        assert_eq!(record.signal_type(), SignalType::Trace);
        assert_eq!(record.timestamp().to_rfc3339(), "2024-01-02T03:04:05+00:00");
        assert_eq!(record.attribute("status"), Some("500"));
        assert_eq!(record.attribute("ok"), Some("false"));
        assert_eq!(record.resource_attribute("service.name"), Some("api"));
        assert!(matches!(record.body(), Body::Structured(_)));
    }

    #[test]
    fn test_json_nanos_timestamp() {
        let decoder = LineDecoder::new(RecordFormat::Json, SignalType::Log);
        let record = decoder
            .decode(r#"{"timestamp":1700000000000000000,"body":"x"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(record.timestamp().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_json_schema_violations() {
        let decoder = LineDecoder::new(RecordFormat::Json, SignalType::Log);
        for line in [
            "{not json",
            r#"{"signal_type":"profile"}"#,
            r#"{"attributes":{"nested":{"a":1}}}"#,
            r#"{"timestamp":"yesterday"}"#,
            r#"{"unexpected":1}"#,
        ] {
            let err = decoder.decode(line).unwrap_err();
            assert_eq!(err.error_type(), "SourceRead", "{}", line);
        }
    }

    #[test]
    fn test_prometheus_samples() {
        let decoder = LineDecoder::new(RecordFormat::Prometheus, SignalType::Log);
        assert!(decoder.decode("# HELP http_requests_total Requests").unwrap().is_none());

        let record = decoder
            .decode(r#"http_requests_total{method="post",path="/a\"b"} 1027 1395066363000"#)
            .unwrap()
            .unwrap();
        assert_eq!(record.signal_type(), SignalType::Metric);
        assert_eq!(record.attribute(METRIC_NAME_ATTRIBUTE), Some("http_requests_total"));
        assert_eq!(record.attribute("method"), Some("post"));
        assert_eq!(record.attribute("path"), Some("/a\"b"));
        assert_eq!(record.body(), &Body::Value(1027.0));
        assert_eq!(record.timestamp().timestamp_millis(), 1_395_066_363_000);

        let bare = decoder.decode("up +Inf").unwrap().unwrap();
        assert_eq!(bare.body(), &Body::Value(f64::INFINITY));
    }

    #[test]
    fn test_prometheus_malformed() {
        let decoder = LineDecoder::new(RecordFormat::Prometheus, SignalType::Log);
        for line in ["1abc 2", "up", "up{a=b} 1", "up{a=\"b\" 1", "up abc", "up 1 2 3"] {
            assert!(decoder.decode(line).is_err(), "{}", line);
        }
    }
}
