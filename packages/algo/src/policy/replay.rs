use std::collections::VecDeque;

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default replay capacity
pub const DEFAULT_REPLAY_CAPACITY: usize = 10_000;

/// One unit of policy training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub state: Vec<f64>,
    pub action: usize,
    pub reward: f64,
    pub next_state: Vec<f64>,
    pub done: bool,
}

/// Bounded FIFO of transitions; the oldest is evicted when full.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    capacity: usize,
    items: VecDeque<Transition>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn push(&mut self, transition: Transition) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(transition);
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

    /// Uniform sample without replacement. `None` when fewer than
    /// `batch_size` transitions are stored.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Option<Vec<&Transition>> {
        if batch_size == 0 || self.items.len() < batch_size {
            return None;
        }
        Some(
            index::sample(rng, self.items.len(), batch_size)
                .into_iter()
                .map(|i| &self.items[i])
                .collect(),
        )
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
