//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Engine metrics collector
//!
//! Counters and gauges keyed by name plus a sorted label set. Updates are
//! shard-locked by `DashMap` and never held across an await.

use dashmap::DashMap;
use metrics::{counter, gauge, Label};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        labels.sort();
        Self {
            name: name.to_string(),
            labels,
        }
    }

    fn facade_labels(&self) -> Vec<Label> {
        self.labels
            .iter()
            .map(|(k, v)| Label::new(k.clone(), v.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum MetricValue {
    Counter(u64),
    Gauge(f64),
}

/// Kind of a sampled metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// Point-in-time value of one metric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub kind: MetricKind,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Engine metrics handle
#[derive(Debug, Default)]
pub struct EngineMetrics {
    values: DashMap<MetricKey, MetricValue>,
}

impl EngineMetrics {
    /// Create a new metrics handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new shared metrics handle
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Add `value` to a counter
    pub fn increment(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        if value == 0 {
            return;
        }

        let key = MetricKey::new(name, labels);
        counter!(key.name.clone(), value, key.facade_labels());

        let mut entry = self.values.entry(key).or_insert(MetricValue::Counter(0));
        if let MetricValue::Counter(current) = entry.value_mut() {
            *current = current.saturating_add(value);
        }
    }

    /// Set a gauge
    pub fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = MetricKey::new(name, labels);
        gauge!(key.name.clone(), value, key.facade_labels());
        self.values.insert(key, MetricValue::Gauge(value));
    }

    /// Current value of one counter series; zero when never incremented
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        match self.values.get(&MetricKey::new(name, labels)).map(|v| *v) {
            Some(MetricValue::Counter(value)) => value,
            _ => 0,
        }
    }

    /// Sum of a counter over every label set that contains `labels`
    pub fn counter_sum(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.values
            .iter()
            .filter(|entry| {
                let key = entry.key();
                key.name == name
                    && labels.iter().all(|(k, v)| {
                        key.labels
                            .iter()
                            .any(|(lk, lv)| lk.as_str() == *k && lv.as_str() == *v)
                    })
            })
            .map(|entry| match entry.value() {
                MetricValue::Counter(value) => *value,
                MetricValue::Gauge(_) => 0,
            })
            .sum()
    }

    /// Current value of one gauge series
    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        match self.values.get(&MetricKey::new(name, labels)).map(|v| *v) {
            Some(MetricValue::Gauge(value)) => Some(value),
            _ => None,
        }
    }

    /// Snapshot every series, ordered by name and labels
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let mut entries: Vec<(MetricKey, MetricValue)> = self
            .values
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        entries
            .into_iter()
            .map(|(key, value)| {
                let (kind, value) = match value {
                    MetricValue::Counter(v) => (MetricKind::Counter, v as f64),
                    MetricValue::Gauge(v) => (MetricKind::Gauge, v),
                };
                MetricSample {
                    name: key.name,
                    kind,
                    labels: key.labels.into_iter().collect(),
                    value,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::names;

    #[test]
    fn test_counter_label_order_is_irrelevant() {
        let metrics = EngineMetrics::new();
        metrics.increment(
            names::RECORDS_DROPPED_TOTAL,
            &[("pipeline", "logs"), ("reason", "filtered")],
            2,
        );
        metrics.increment(
            names::RECORDS_DROPPED_TOTAL,
            &[("reason", "filtered"), ("pipeline", "logs")],
            3,
        );

        assert_eq!(
            metrics.counter_value(
                names::RECORDS_DROPPED_TOTAL,
                &[("pipeline", "logs"), ("reason", "filtered")]
            ),
            5
        );
    }

    #[test]
    fn test_counter_sum_across_labels() {
        let metrics = EngineMetrics::new();
        metrics.increment(names::RECORDS_DROPPED_TOTAL, &[("reason", "filtered")], 4);
        metrics.increment(names::RECORDS_DROPPED_TOTAL, &[("reason", "unrouted")], 1);

        assert_eq!(metrics.counter_sum(names::RECORDS_DROPPED_TOTAL, &[]), 5);
        assert_eq!(
            metrics.counter_sum(names::RECORDS_DROPPED_TOTAL, &[("reason", "unrouted")]),
            1
        );
        assert_eq!(metrics.counter_value(names::RECORDS_LOST_TOTAL, &[]), 0);
    }

    #[test]
    fn test_gauge_and_snapshot() {
        let metrics = EngineMetrics::new();
        metrics.set_gauge(names::EXPORTER_QUEUE_DEPTH, &[("exporter", "backend")], 7.0);
        metrics.set_gauge(names::EXPORTER_QUEUE_DEPTH, &[("exporter", "backend")], 3.0);
        metrics.increment(names::RECORDS_RECEIVED_TOTAL, &[], 1);

        assert_eq!(
            metrics.gauge_value(names::EXPORTER_QUEUE_DEPTH, &[("exporter", "backend")]),
            Some(3.0)
        );

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, names::EXPORTER_QUEUE_DEPTH);
        assert_eq!(snapshot[0].kind, MetricKind::Gauge);
        assert_eq!(snapshot[1].value, 1.0);
    }
}
