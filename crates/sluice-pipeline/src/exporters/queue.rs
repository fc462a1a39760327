//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Bounded export queue

use sluice_core::{Batch, OverflowPolicy};
use std::collections::VecDeque;

/// Result of pushing a batch
#[derive(Debug)]
pub enum EnqueueOutcome {
    Enqueued,
    /// The oldest queued batch was evicted to make room
    DroppedOldest(Batch),
    /// The incoming batch was rejected
    DroppedIncoming(Batch),
}

/// Bounded FIFO of batches; never holds more than `capacity`
#[derive(Debug)]
pub struct ExportQueue {
    items: VecDeque<Batch>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl ExportQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    pub fn push(&mut self, batch: Batch) -> EnqueueOutcome {
        if self.items.len() < self.capacity {
            self.items.push_back(batch);
            return EnqueueOutcome::Enqueued;
        }

        match self.policy {
            OverflowPolicy::DropNewest => EnqueueOutcome::DroppedIncoming(batch),
            OverflowPolicy::DropOldest => match self.items.pop_front() {
                Some(evicted) => {
                    self.items.push_back(batch);
                    EnqueueOutcome::DroppedOldest(evicted)
                }
                None => {
                    self.items.push_back(batch);
                    EnqueueOutcome::Enqueued
                }
            },
        }
    }

    pub fn pop(&mut self) -> Option<Batch> {
        self.items.pop_front()
    }

    /// Remove and return everything queued
    pub fn drain_all(&mut self) -> Vec<Batch> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(tag: &str) -> Batch {
        Batch::new("logs", Vec::new()).with_metadata("tag", tag)
    }

    #[test]
    fn test_drop_oldest_keeps_newest() {
        let mut queue = ExportQueue::new(2, OverflowPolicy::DropOldest);
        queue.push(batch("a"));
        queue.push(batch("b"));

        match queue.push(batch("c")) {
            EnqueueOutcome::DroppedOldest(evicted) => assert_eq!(evicted.metadata["tag"], "a"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().metadata["tag"], "b");
    }

    #[test]
    fn test_drop_newest_rejects_incoming() {
        let mut queue = ExportQueue::new(1, OverflowPolicy::DropNewest);
        queue.push(batch("a"));

        assert!(matches!(queue.push(batch("b")), EnqueueOutcome::DroppedIncoming(_)));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().metadata["tag"], "a");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        for policy in [OverflowPolicy::DropOldest, OverflowPolicy::DropNewest] {
            let mut queue = ExportQueue::new(5, policy);
            let mut dropped = 0;
            for i in 0..50 {
                if !matches!(queue.push(batch(&i.to_string())), EnqueueOutcome::Enqueued) {
                    dropped += 1;
                }
                assert!(queue.len() <= queue.capacity());
            }
            assert_eq!(dropped, 45);
        }
    }
}
