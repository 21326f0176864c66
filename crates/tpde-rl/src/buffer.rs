use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use tpde_types::Transition;

/// Fixed-capacity ring buffer of RL transitions (C7). `push` overwrites the
/// oldest entry once full; `sample` draws uniformly at random with
/// replacement (§4.7).
pub struct ExperienceBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<Transition>>,
    rng: Mutex<SmallRng>,
}

pub const DEFAULT_CAPACITY: usize = 10_000;

impl ExperienceBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    pub fn push(&self, transition: Transition) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(transition);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample `batch_size` transitions uniformly at random with replacement.
    /// Returns fewer than `batch_size` only when the buffer itself is empty.
    pub fn sample(&self, batch_size: usize) -> Vec<Transition> {
        let entries = self.entries.lock();
        if entries.is_empty() {
            return Vec::new();
        }
        let mut rng = self.rng.lock();
        (0..batch_size)
            .map(|_| entries[rng.gen_range(0..entries.len())])
            .collect()
    }

    /// Copy out every stored transition, oldest first, for persistence.
    pub fn snapshot(&self) -> Vec<Transition> {
        self.entries.lock().iter().copied().collect()
    }

    /// Replace the buffer's contents with `transitions`, truncating to the
    /// most recent `capacity` entries if `transitions` is longer.
    pub fn load(&self, transitions: Vec<Transition>) {
        let mut entries = self.entries.lock();
        entries.clear();
        let skip = transitions.len().saturating_sub(self.capacity);
        entries.extend(transitions.into_iter().skip(skip));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpde_types::{Action, State};

    fn dummy_transition(reward: f32) -> Transition {
        Transition {
            state: State::zero(),
            action: Action::clamped([0.0; tpde_types::ACTION_DIM]),
            reward,
            next_state: State::zero(),
            done: false,
        }
    }

    #[test]
    fn push_past_capacity_overwrites_oldest() {
        let buffer = ExperienceBuffer::new(2);
        buffer.push(dummy_transition(1.0));
        buffer.push(dummy_transition(2.0));
        buffer.push(dummy_transition(3.0));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn sample_draws_requested_batch_size() {
        let buffer = ExperienceBuffer::with_seed(10, 1);
        for i in 0..5 {
            buffer.push(dummy_transition(i as f32));
        }
        let batch = buffer.sample(8);
        assert_eq!(batch.len(), 8);
    }

    #[test]
    fn sample_from_empty_buffer_is_empty() {
        let buffer = ExperienceBuffer::new(10);
        assert!(buffer.sample(4).is_empty());
    }
}
