//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Telemetry record model
//!
//! A [`TelemetryRecord`] is immutable once built. Stages that need a different
//! value call [`TelemetryRecord::derive`] and build a new record, so a record
//! shared across pipelines through [`SharedRecord`] is never changed under
//! another holder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::PipelineError;

/// Attribute mapping; keys are unique and iterate in sorted order
pub type Attributes = BTreeMap<String, String>;

/// A record shared between pipelines after fan-out
pub type SharedRecord = Arc<TelemetryRecord>;

/// Telemetry signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Log,
    Metric,
    Trace,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Log => "log",
            SignalType::Metric => "metric",
            SignalType::Trace => "trace",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" | "logs" => Ok(SignalType::Log),
            "metric" | "metrics" => Ok(SignalType::Metric),
            "trace" | "traces" | "span" => Ok(SignalType::Trace),
            other => Err(PipelineError::source_read(format!(
                "unknown signal type '{}'",
                other
            ))),
        }
    }
}

/// Opaque record payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Value(f64),
    Structured(serde_json::Value),
}

impl Body {
    /// Text view of the payload used for matching and extraction
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Body::Empty => None,
            Body::Text(text) => Some(Cow::Borrowed(text.as_str())),
            Body::Value(value) => Some(Cow::Owned(value.to_string())),
            Body::Structured(serde_json::Value::String(text)) => {
                Some(Cow::Borrowed(text.as_str()))
            }
            Body::Structured(value) => Some(Cow::Owned(value.to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }
}

/// Reference to a readable field of a record
///
/// Parsed from `body`, `signal_type`, `attributes.<key>`, `resource.<key>`;
/// any other string names an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRef {
    Body,
    SignalType,
    Attribute(String),
    Resource(String),
}

impl FieldRef {
    pub fn parse(path: &str) -> Self {
        match path {
            "body" => FieldRef::Body,
            "signal_type" => FieldRef::SignalType,
            _ => {
                if let Some(key) = path.strip_prefix("attributes.") {
                    FieldRef::Attribute(key.to_string())
                } else if let Some(key) = path.strip_prefix("resource.") {
                    FieldRef::Resource(key.to_string())
                } else {
                    FieldRef::Attribute(path.to_string())
                }
            }
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Body => f.write_str("body"),
            FieldRef::SignalType => f.write_str("signal_type"),
            FieldRef::Attribute(key) => write!(f, "attributes.{}", key),
            FieldRef::Resource(key) => write!(f, "resource.{}", key),
        }
    }
}

/// Canonical in-flight representation of one unit of signal data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    id: Uuid,
    signal_type: SignalType,
    timestamp: DateTime<Utc>,
    resource: Attributes,
    attributes: Attributes,
    body: Body,
    origin: Option<String>,
}

impl TelemetryRecord {
    /// Start building a new record
    pub fn builder(signal_type: SignalType) -> RecordBuilder {
        RecordBuilder::new(signal_type)
    }

    /// Start building a new record derived from this one
    pub fn derive(&self) -> RecordBuilder {
        RecordBuilder {
            inner: self.clone(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn signal_type(&self) -> SignalType {
        self.signal_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn resource(&self) -> &Attributes {
        &self.resource
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn resource_attribute(&self, key: &str) -> Option<&str> {
        self.resource.get(key).map(String::as_str)
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Id of the receiver that produced this record
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Read a field; `None` when the field is absent
    pub fn field(&self, field: &FieldRef) -> Option<Cow<'_, str>> {
        match field {
            FieldRef::Body => self.body.as_text(),
            FieldRef::SignalType => Some(Cow::Borrowed(self.signal_type.as_str())),
            FieldRef::Attribute(key) => self.attribute(key).map(Cow::Borrowed),
            FieldRef::Resource(key) => self.resource_attribute(key).map(Cow::Borrowed),
        }
    }

    /// Wrap the record for sharing between pipelines
    pub fn into_shared(self) -> SharedRecord {
        Arc::new(self)
    }
}

/// Builder for new and derived records
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    inner: TelemetryRecord,
}

impl RecordBuilder {
    pub fn new(signal_type: SignalType) -> Self {
        Self {
            inner: TelemetryRecord {
                id: Uuid::new_v4(),
                signal_type,
                timestamp: Utc::now(),
                resource: Attributes::new(),
                attributes: Attributes::new(),
                body: Body::Empty,
                origin: None,
            },
        }
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.inner.timestamp = timestamp;
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.inner.body = body;
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.inner.origin = Some(origin.into());
        self
    }

    /// Set an attribute, overwriting any existing value
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attributes(mut self, attributes: impl IntoIterator<Item = (String, String)>) -> Self {
        self.inner.attributes.extend(attributes);
        self
    }

    pub fn remove_attribute(mut self, key: &str) -> Self {
        self.inner.attributes.remove(key);
        self
    }

    /// Replace the whole attribute map
    pub fn replace_attributes(mut self, attributes: Attributes) -> Self {
        self.inner.attributes = attributes;
        self
    }

    /// Replace the whole resource map
    pub fn replace_resource(mut self, resource: Attributes) -> Self {
        self.inner.resource = resource;
        self
    }

    /// Set a resource attribute, overwriting any existing value
    pub fn resource(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.resource.insert(key.into(), value.into());
        self
    }

    pub fn resources(mut self, resource: impl IntoIterator<Item = (String, String)>) -> Self {
        self.inner.resource.extend(resource);
        self
    }

    pub fn build(self) -> TelemetryRecord {
        self.inner
    }

    pub fn build_shared(self) -> SharedRecord {
        Arc::new(self.inner)
    }
}
