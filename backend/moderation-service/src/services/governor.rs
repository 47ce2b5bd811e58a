use super::policy::{QTable, UNINFORMATIVE_TOLERANCE};
use crate::models::StateKey;
use std::cmp::Ordering;

/// Keeps the policy table within a fixed entry budget.
///
/// Uninformative entries go first, then the entries with the smallest
/// largest-magnitude value. Ties are broken by key so eviction is
/// deterministic for a given table.
#[derive(Debug, Clone, Copy)]
pub struct TableGovernor {
    pub max_size: usize,
    pub tolerance: f64,
}

impl TableGovernor {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            tolerance: UNINFORMATIVE_TOLERANCE,
        }
    }

    /// Evict until `table.len() <= max_size`. `keep` is never evicted.
    /// Returns the number of evicted entries.
    pub fn enforce(&self, table: &mut QTable, keep: Option<&StateKey>) -> usize {
        if table.len() <= self.max_size {
            return 0;
        }
        let excess = table.len() - self.max_size;

        let mut candidates: Vec<(bool, f64, StateKey)> = table
            .iter()
            .filter(|(key, _)| Some(*key) != keep)
            .map(|(key, entry)| {
                let magnitude = entry
                    .values()
                    .iter()
                    .fold(0.0_f64, |acc, value| acc.max(value.abs()));
                (entry.is_uninformative(self.tolerance), magnitude, key.clone())
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
                .then_with(|| a.2.cmp(&b.2))
        });

        let mut evicted = 0;
        for (_, _, key) in candidates.into_iter().take(excess) {
            if table.remove(&key).is_some() {
                evicted += 1;
            }
        }

        tracing::info!(
            evicted,
            remaining = table.len(),
            max_size = self.max_size,
            "Policy table trimmed"
        );
        evicted
    }
}
