//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Probabilistic sampler stage
//!
//! The decision for a record is derived from `SHA-256(seed || id)` where `id`
//! is the value of the correlation key, so every record sharing an id gets
//! the same decision for the lifetime of the chain.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sluice_core::types::FieldRef;
use sluice_core::{PipelineError, PipelineResult, SharedRecord, StageSpec};
use tokio::time::Instant;

use super::{parse_parameters, DropReason, RecordStage, Verdict};

/// Treatment of records without the correlation key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    #[default]
    Keep,
    Drop,
    Random,
}

fn default_key() -> String {
    sluice_core::utils::trace_context::TRACE_ID_ATTRIBUTE.to_string()
}

#[derive(Debug, Deserialize)]
struct SamplerParams {
    probability: f64,
    #[serde(default = "default_key")]
    key: String,
    #[serde(default)]
    seed: String,
    #[serde(default)]
    missing_key: MissingKeyPolicy,
}

/// Sampler stage
#[derive(Debug)]
pub struct SamplerStage {
    probability: f64,
    key: FieldRef,
    seed: String,
    missing_key: MissingKeyPolicy,
    rng: StdRng,
}

impl SamplerStage {
    pub fn new(
        probability: f64,
        key: &str,
        seed: impl Into<String>,
        missing_key: MissingKeyPolicy,
    ) -> Self {
        Self {
            probability,
            key: FieldRef::parse(key),
            seed: seed.into(),
            missing_key,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn from_spec(spec: &StageSpec) -> PipelineResult<Self> {
        let params: SamplerParams = parse_parameters(spec)?;
        if !(0.0..=1.0).contains(&params.probability) {
            return Err(PipelineError::stage_config(
                "sampler",
                format!("probability {} is outside [0, 1]", params.probability),
            ));
        }
        Ok(Self::new(
            params.probability,
            &params.key,
            params.seed,
            params.missing_key,
        ))
    }

    /// Map `seed || id` to a point in [0, 1)
    pub fn position(&self, id: &str) -> f64 {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.as_bytes());
        hasher.update(id.as_bytes());
        let digest = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Deterministic decision for a correlation id
    pub fn sampled(&self, id: &str) -> bool {
        self.position(id) < self.probability
    }
}

impl RecordStage for SamplerStage {
    fn kind(&self) -> &str {
        "sampler"
    }

    fn apply(&mut self, record: SharedRecord, _now: Instant) -> PipelineResult<Verdict> {
        let keep = match record.field(&self.key) {
            Some(id) => self.sampled(&id),
            None => match self.missing_key {
                MissingKeyPolicy::Keep => true,
                MissingKeyPolicy::Drop => false,
                MissingKeyPolicy::Random => self.rng.gen::<f64>() < self.probability,
            },
        };

        if keep {
            Ok(Verdict::Keep(record))
        } else {
            Ok(Verdict::Drop(DropReason::Sampled))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support::log;

    fn kept(stage: &mut SamplerStage, record: SharedRecord) -> bool {
        matches!(stage.apply(record, Instant::now()).unwrap(), Verdict::Keep(_))
    }

    #[test]
    fn test_decision_stable_per_correlation_id() {
        let mut stage = SamplerStage::new(0.5, "trace_id", "s1", MissingKeyPolicy::Keep);
        for i in 0..200 {
            let trace_id = format!("{:032x}", i * 7919);
            let first = kept(&mut stage, log(&[("trace_id", &trace_id)]));
            for _ in 0..3 {
                assert_eq!(kept(&mut stage, log(&[("trace_id", &trace_id)])), first);
            }
        }
    }

    #[test]
    fn test_probability_bounds() {
        let mut all = SamplerStage::new(1.0, "trace_id", "", MissingKeyPolicy::Keep);
        let mut none = SamplerStage::new(0.0, "trace_id", "", MissingKeyPolicy::Keep);
        for i in 0..100 {
            let id = i.to_string();
            assert!(kept(&mut all, log(&[("trace_id", &id)])));
            assert!(!kept(&mut none, log(&[("trace_id", &id)])));
        }
    }

    #[test]
    fn test_rate_roughly_matches_probability() {
        let stage = SamplerStage::new(0.25, "trace_id", "seed", MissingKeyPolicy::Keep);
        let sampled = (0..10_000).filter(|i| stage.sampled(&i.to_string())).count();
        assert!((2_000..3_000).contains(&sampled), "sampled {}", sampled);
    }

    #[test]
    fn test_missing_key_policy() {
        let mut keep = SamplerStage::new(0.0, "trace_id", "", MissingKeyPolicy::Keep);
        let mut drop = SamplerStage::new(1.0, "trace_id", "", MissingKeyPolicy::Drop);
        assert!(kept(&mut keep, log(&[])));
        assert!(!kept(&mut drop, log(&[])));
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let spec = StageSpec::new("sampler", serde_json::json!({ "probability": 1.5 }));
        assert!(SamplerStage::from_spec(&spec).is_err());
    }
}
