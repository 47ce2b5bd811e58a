use crate::models::{Action, PolicyEntry, StateKey};
use rand::Rng;
use std::collections::{BTreeMap, HashMap};

/// Values within this distance of zero carry no learned preference.
pub const UNINFORMATIVE_TOLERANCE: f64 = 1e-9;

/// In-memory policy table: state key to per-action values
#[derive(Debug, Default, Clone)]
pub struct QTable {
    entries: HashMap<StateKey, PolicyEntry>,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from a persisted snapshot, clamping every value into bounds.
    pub fn from_snapshot(snapshot: BTreeMap<StateKey, PolicyEntry>) -> Self {
        Self {
            entries: snapshot
                .into_iter()
                .map(|(key, entry)| (key, entry.clamped()))
                .collect(),
        }
    }

    /// Sorted copy suitable for serialization.
    pub fn snapshot(&self) -> BTreeMap<StateKey, PolicyEntry> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), *entry))
            .collect()
    }

    /// Lazily create a zeroed entry for `key`.
    pub fn ensure(&mut self, key: &StateKey) -> &mut PolicyEntry {
        self.entries.entry(key.clone()).or_default()
    }

    pub fn get(&self, key: &StateKey) -> Option<&PolicyEntry> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &StateKey) -> Option<PolicyEntry> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &PolicyEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Epsilon-greedy action selection over the policy table
#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy {
    pub epsilon: f64,
}

impl DecisionPolicy {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon: epsilon.clamp(0.0, 1.0),
        }
    }

    /// With probability `epsilon` pick uniformly at random; otherwise take the
    /// best learned action, or the score heuristic when the state has no
    /// learned preference yet.
    ///
    /// An entry whose values are all zero (within tolerance) counts as "no
    /// learned preference" too, so a freshly materialized state follows the
    /// score heuristic instead of argmax tie-breaking to `Approve`.
    pub fn select_action<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        table: &QTable,
        key: &StateKey,
        score: f64,
    ) -> Action {
        if rng.gen::<f64>() < self.epsilon {
            let action = Action::ALL[rng.gen_range(0..Action::ALL.len())];
            tracing::debug!(state_key = %key, action = %action, "Exploring");
            return action;
        }

        match table.get(key) {
            Some(entry) if !entry.is_uninformative(UNINFORMATIVE_TOLERANCE) => entry.best_action(),
            _ => Action::from_score(score),
        }
    }
}
