//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Retry and backoff state machine for exporters
//!
//! ```text
//! Idle --dequeue--> Sending --ok--> Idle
//!                      |  \--permanent--> Idle (dropped)
//!                      v
//!                   Backoff --delay--> Sending
//!                      \--budget exhausted--> Idle (dropped)
//! ```

use sluice_core::RetrySpec;
use std::time::Duration;
use tokio::time::Instant;

/// Backoff policy
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Retry transient failures at all
    pub enabled: bool,

    /// Delay before the first retry
    pub initial_interval: Duration,

    /// Upper bound for any delay
    pub max_interval: Duration,

    /// Growth factor between consecutive delays
    pub multiplier: f64,

    /// Retry budget measured from the first failure of a batch
    pub max_elapsed_time: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&RetrySpec::default())
    }
}

impl From<&RetrySpec> for BackoffPolicy {
    fn from(spec: &RetrySpec) -> Self {
        Self {
            enabled: spec.enabled,
            initial_interval: spec.initial_interval(),
            max_interval: spec.max_interval(),
            multiplier: spec.multiplier,
            max_elapsed_time: spec.max_elapsed_time(),
        }
    }
}

impl BackoffPolicy {
    /// `min(initial * multiplier^attempt, max_interval)`, attempts counted from 0
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        if !delay.is_finite() || delay >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

/// Current phase of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Idle,
    Sending,
    Backoff,
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then send again
    Retry(Duration),
    /// Discard the batch
    GiveUp,
}

/// Per-exporter retry state for the batch in flight
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: BackoffPolicy,
    phase: RetryPhase,
    attempts: u32,
    first_failure: Option<Instant>,
}

impl RetryState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            phase: RetryPhase::Idle,
            attempts: 0,
            first_failure: None,
        }
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    /// Retries scheduled for the current batch
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// A send attempt is starting
    pub fn on_send(&mut self) {
        self.phase = RetryPhase::Sending;
    }

    /// The batch was delivered
    pub fn on_success(&mut self) {
        self.reset();
    }

    /// The batch was dropped without retrying
    pub fn on_discard(&mut self) {
        self.reset();
    }

    /// A transient failure occurred at `now`
    ///
    /// Gives up when retry is disabled or when the next attempt would land
    /// beyond `max_elapsed_time` from the first failure. Giving up resets the
    /// state, so a batch is given up at most once.
    pub fn on_failure(&mut self, now: Instant) -> RetryDecision {
        if !self.policy.enabled {
            self.reset();
            return RetryDecision::GiveUp;
        }

        let first_failure = *self.first_failure.get_or_insert(now);
        let delay = self.policy.delay_for(self.attempts);
        if now.saturating_duration_since(first_failure) + delay > self.policy.max_elapsed_time {
            self.reset();
            return RetryDecision::GiveUp;
        }

        self.attempts += 1;
        self.phase = RetryPhase::Backoff;
        RetryDecision::Retry(delay)
    }

    fn reset(&mut self) {
        self.phase = RetryPhase::Idle;
        self.attempts = 0;
        self.first_failure = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_elapsed_secs: u64) -> BackoffPolicy {
        BackoffPolicy {
            enabled: true,
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            max_elapsed_time: Duration::from_secs(max_elapsed_secs),
        }
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let policy = policy(300);
        let delays: Vec<_> = (0..6).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 30, 30, 30]);
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_consecutive_failures_follow_backoff() {
        let mut state = RetryState::new(policy(300));
        let mut now = Instant::now();
        let mut delays = Vec::new();

        for _ in 0..4 {
            state.on_send();
            match state.on_failure(now) {
                RetryDecision::Retry(delay) => {
                    assert_eq!(state.phase(), RetryPhase::Backoff);
                    delays.push(delay.as_secs());
                    now += delay;
                }
                RetryDecision::GiveUp => panic!("gave up too early"),
            }
        }
        assert_eq!(delays, vec![5, 10, 20, 30]);

        state.on_success();
        assert_eq!(state.phase(), RetryPhase::Idle);
        assert_eq!(state.attempts(), 0);
    }

    #[test]
    fn test_gives_up_once_budget_exhausted() {
        let mut state = RetryState::new(policy(40));
        let mut now = Instant::now();
        let mut decisions = Vec::new();

        loop {
            state.on_send();
            let decision = state.on_failure(now);
            decisions.push(decision);
            match decision {
                RetryDecision::Retry(delay) => now += delay,
                RetryDecision::GiveUp => break,
            }
        }

        // 5 + 10 + 20 = 35s elapsed; a further 30s would exceed 40s
        assert_eq!(decisions.len(), 4);
        assert_eq!(decisions[3], RetryDecision::GiveUp);
        assert_eq!(state.phase(), RetryPhase::Idle);
        assert_eq!(state.attempts(), 0);
    }

    #[test]
    fn test_disabled_retry_gives_up_immediately() {
        let mut state = RetryState::new(BackoffPolicy {
            enabled: false,
            ..policy(300)
        });
        state.on_send();
        assert_eq!(state.on_failure(Instant::now()), RetryDecision::GiveUp);
    }
}
