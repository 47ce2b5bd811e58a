use super::policy::QTable;
use crate::models::{Action, Experience, StateKey, Q_VALUE_BOUND, REWARD_BOUND};
use rand::Rng;
use std::collections::VecDeque;

/// Clamp a reward into `[-REWARD_BOUND, REWARD_BOUND]`; NaN becomes 0.
pub fn clamp_reward(reward: f64) -> f64 {
    if reward.is_nan() {
        0.0
    } else {
        reward.clamp(-REWARD_BOUND, REWARD_BOUND)
    }
}

/// One-step temporal-difference updater
#[derive(Debug, Clone, Copy)]
pub struct QLearner {
    pub learning_rate: f64,
    pub discount_factor: f64,
}

impl QLearner {
    pub fn new(learning_rate: f64, discount_factor: f64) -> Self {
        Self {
            learning_rate,
            discount_factor,
        }
    }

    /// `Q(s,a) += α·(r + γ·max Q(s',·) − Q(s,a))`, clamped afterwards.
    ///
    /// Moderation is single-step, so callers pass `next == state`. Entries for
    /// both keys are created on demand. Returns the new value.
    pub fn td_update(
        &self,
        table: &mut QTable,
        state: &StateKey,
        action: Action,
        reward: f64,
        next: &StateKey,
    ) -> f64 {
        let reward = clamp_reward(reward);
        let next_max = table.ensure(next).max_value();

        let entry = table.ensure(state);
        let current = entry.get(action);
        let target = reward + self.discount_factor * next_max;
        let updated = current + self.learning_rate * (target - current);
        let updated = if updated.is_nan() {
            0.0
        } else {
            updated.clamp(-Q_VALUE_BOUND, Q_VALUE_BOUND)
        };
        entry.set(action, updated);

        tracing::debug!(
            state_key = %state,
            action = %action,
            reward,
            old_value = current,
            new_value = updated,
            "Q-value updated"
        );
        updated
    }

    pub fn apply(&self, table: &mut QTable, experience: &Experience) -> f64 {
        self.td_update(
            table,
            &experience.state_key,
            experience.action,
            experience.reward,
            &experience.next_state_key,
        )
    }
}

/// Bounded FIFO of past experiences
#[derive(Debug)]
pub struct ReplayBuffer {
    experiences: VecDeque<Experience>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            experiences: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, experience: Experience) {
        if self.experiences.len() >= self.capacity {
            self.experiences.pop_front();
        }
        self.experiences.push_back(experience);
    }

    /// Up to `batch_size` distinct experiences chosen uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, batch_size: usize) -> Vec<Experience> {
        let amount = batch_size.min(self.experiences.len());
        rand::seq::index::sample(rng, self.experiences.len(), amount)
            .into_iter()
            .map(|idx| self.experiences[idx].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.experiences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn key(name: &str) -> StateKey {
        StateKey::new(name)
    }

    #[test]
    fn test_clamp_reward() {
        assert_eq!(clamp_reward(5.0), 2.0);
        assert_eq!(clamp_reward(-3.0), -2.0);
        assert_eq!(clamp_reward(0.7), 0.7);
        assert_eq!(clamp_reward(f64::NAN), 0.0);
    }

    #[test]
    fn test_single_step_update() {
        let learner = QLearner::new(0.01, 0.99);
        let mut table = QTable::new();
        let s = key("s");

        let value = learner.td_update(&mut table, &s, Action::Flag, 1.0, &s);
        assert!((value - 0.01).abs() < 1e-12);

        // second update sees max Q(s,·) = 0.01
        let value = learner.td_update(&mut table, &s, Action::Flag, 1.0, &s);
        let expected = 0.01 + 0.01 * (1.0 + 0.99 * 0.01 - 0.01);
        assert!((value - expected).abs() < 1e-12);
    }

    #[test]
    fn test_update_clamps_reward_and_value() {
        let learner = QLearner::new(1.0, 0.99);
        let mut table = QTable::new();
        let s = key("s");

        let value = learner.td_update(&mut table, &s, Action::Approve, 50.0, &s);
        assert_eq!(value, 2.0);

        for _ in 0..500 {
            learner.td_update(&mut table, &s, Action::Approve, 2.0, &s);
        }
        let entry = table.get(&s).copied().unwrap_or_default();
        assert!(entry.values().iter().all(|v| v.abs() <= Q_VALUE_BOUND));
    }

    #[test]
    fn test_update_creates_next_state_entry() {
        let learner = QLearner::new(0.1, 0.9);
        let mut table = QTable::new();
        learner.td_update(&mut table, &key("a"), Action::Review, -1.0, &key("b"));
        assert!(table.contains(&key("a")));
        assert!(table.contains(&key("b")));
    }

    #[test]
    fn test_replay_buffer_is_bounded_fifo() {
        let mut buffer = ReplayBuffer::new(3);
        for idx in 0..5 {
            buffer.push(Experience {
                state_key: key(&format!("s{}", idx)),
                action: Action::Approve,
                reward: 0.5,
                next_state_key: key(&format!("s{}", idx)),
            });
        }
        assert_eq!(buffer.len(), 3);

        let mut rng = StdRng::seed_from_u64(1);
        let sample = buffer.sample(&mut rng, 10);
        assert_eq!(sample.len(), 3);
        assert!(sample.iter().all(|e| e.state_key != key("s0")));
    }

    #[test]
    fn test_sample_from_empty_buffer() {
        let buffer = ReplayBuffer::new(3);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(buffer.sample(&mut rng, 32).is_empty());
    }
}
