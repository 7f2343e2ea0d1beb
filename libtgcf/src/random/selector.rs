//! Batch selection without replacement

use rand::seq::index;
use rand::Rng;
use std::collections::HashSet;

use crate::types::Message;

/// Pick up to `batch_size` messages whose ids are not in `posted`
///
/// When every eligible message fits in the batch they are returned in pool
/// order; otherwise `batch_size` of them are drawn uniformly without
/// replacement. An empty result is normal.
pub fn select<R: Rng + ?Sized>(
    pool: &[Message],
    posted: &HashSet<i64>,
    batch_size: usize,
    rng: &mut R,
) -> Vec<Message> {
    let mut seen = HashSet::new();
    let eligible: Vec<&Message> = pool
        .iter()
        .filter(|m| !posted.contains(&m.id) && seen.insert(m.id))
        .collect();

    if eligible.len() <= batch_size {
        return eligible.into_iter().cloned().collect();
    }

    index::sample(rng, eligible.len(), batch_size)
        .into_iter()
        .map(|i| eligible[i].clone())
        .collect()
}
