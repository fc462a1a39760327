//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Batch stage
//!
//! Accumulates records and emits a batch when `size` records are buffered or
//! when the oldest buffered record has waited `timeout_ms`.

use serde::Deserialize;
use sluice_core::{Batch, PipelineError, PipelineResult, SharedRecord, StageSpec};
use std::time::Duration;
use tokio::time::Instant;

use super::{parse_parameters, ChainItem, Stage, StageScope};

fn default_size() -> usize {
    100
}

fn default_timeout_ms() -> u64 {
    1_000
}

#[derive(Debug, Deserialize)]
struct BatchParams {
    #[serde(default = "default_size")]
    size: usize,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
}

/// Batch stage
#[derive(Debug)]
pub struct BatchStage {
    size: usize,
    timeout: Duration,
    buffer: Vec<SharedRecord>,
    oldest: Option<Instant>,
}

impl BatchStage {
    pub fn new(size: usize, timeout: Duration) -> Self {
        Self {
            size,
            timeout,
            buffer: Vec::with_capacity(size),
            oldest: None,
        }
    }

    pub fn from_spec(spec: &StageSpec) -> PipelineResult<Self> {
        let params: BatchParams = parse_parameters(spec)?;
        if params.size == 0 {
            return Err(PipelineError::stage_config("batch", "size must be at least 1"));
        }
        if params.timeout_ms == 0 {
            return Err(PipelineError::stage_config("batch", "timeout_ms must be at least 1"));
        }
        Ok(Self::new(params.size, Duration::from_millis(params.timeout_ms)))
    }

    /// Records currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn push(&mut self, record: SharedRecord, scope: &mut StageScope<'_>) {
        if self.buffer.is_empty() {
            self.oldest = Some(scope.now());
        }
        self.buffer.push(record);
        if self.buffer.len() >= self.size {
            self.flush(scope);
        }
    }

    fn flush(&mut self, scope: &mut StageScope<'_>) {
        if self.buffer.is_empty() {
            return;
        }
        let records = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.size));
        self.oldest = None;
        let batch = Batch::new(scope.pipeline(), records);
        scope.emit(ChainItem::Batch(batch));
    }
}

impl Stage for BatchStage {
    fn kind(&self) -> &str {
        "batch"
    }

    fn process(&mut self, item: ChainItem, scope: &mut StageScope<'_>) {
        match item {
            ChainItem::Record(record) => self.push(record, scope),
            ChainItem::Batch(batch) => {
                for record in batch.records {
                    self.push(record, scope);
                }
            }
        }
    }

    fn on_tick(&mut self, scope: &mut StageScope<'_>) {
        if let Some(oldest) = self.oldest {
            if scope.now().saturating_duration_since(oldest) >= self.timeout {
                self.flush(scope);
            }
        }
    }

    fn drain(&mut self, scope: &mut StageScope<'_>) {
        self.flush(scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support::{drain, log, run, tick};
    use sluice_core::EngineMetrics;

    #[test]
    fn test_flush_on_size() {
        let metrics = EngineMetrics::new();
        let mut stage = BatchStage::new(3, Duration::from_secs(60));
        let items: Vec<_> = (0..7).map(|_| ChainItem::Record(log(&[]))).collect();

        let output = run(&mut stage, &metrics, Instant::now(), items);
        assert_eq!(output.len(), 2);
        assert!(output.iter().all(|item| item.record_count() == 3));
        assert_eq!(stage.buffered(), 1);
    }

    #[test]
    fn test_flush_on_timeout_measured_from_oldest_record() {
        let metrics = EngineMetrics::new();
        let mut stage = BatchStage::new(100, Duration::from_millis(500));
        let start = Instant::now();

        run(&mut stage, &metrics, start, vec![ChainItem::Record(log(&[]))]);
        run(
            &mut stage,
            &metrics,
            start + Duration::from_millis(400),
            vec![ChainItem::Record(log(&[]))],
        );

        assert!(tick(&mut stage, &metrics, start + Duration::from_millis(499)).is_empty());
        let output = tick(&mut stage, &metrics, start + Duration::from_millis(500));
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].record_count(), 2);
        assert!(tick(&mut stage, &metrics, start + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_drain_emits_partial_batch_in_order() {
        let metrics = EngineMetrics::new();
        let mut stage = BatchStage::new(10, Duration::from_secs(1));
        let input: Vec<_> = (0..4).map(|i| log(&[("seq", &i.to_string())])).collect();
        run(
            &mut stage,
            &metrics,
            Instant::now(),
            input.iter().cloned().map(ChainItem::Record).collect(),
        );

        let output = drain(&mut stage, &metrics);
        match &output[..] {
            [ChainItem::Batch(batch)] => {
                let seq: Vec<_> = batch.records.iter().map(|r| r.attribute("seq")).collect();
                assert_eq!(seq, vec![Some("0"), Some("1"), Some("2"), Some("3")]);
                assert_eq!(batch.pipeline, "test");
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[test]
    fn test_zero_size_rejected() {
        let spec = StageSpec::new("batch", serde_json::json!({ "size": 0 }));
        assert!(BatchStage::from_spec(&spec).is_err());
    }
}
