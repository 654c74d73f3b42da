//! Sibling ordering.
//!
//! DESIGN
//! ======
//! Instances that share a `parent_id` on one page form a sibling group whose
//! order indices must be the dense sequence `0..N-1`. Every mutation that
//! changes relative position rewrites the whole group's indices, but only the
//! rows whose stored index actually differs are written.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ComponentInstance, ReorderRequest};

/// One sibling whose order index changes as part of a reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderChange {
    pub instance_id: Uuid,
    pub from: i32,
    pub to: i32,
}

/// Result of moving one instance within its sibling group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    pub parent_id: Option<Uuid>,
    /// Full sibling order after the move.
    pub ordered_ids: Vec<Uuid>,
    /// Siblings whose stored index differs from their new position.
    pub changes: Vec<OrderChange>,
}

impl ReorderPlan {
    /// Batch request carrying the complete new order of the group.
    #[must_use]
    pub fn to_request(&self) -> ReorderRequest {
        ReorderRequest { parent_id: self.parent_id, ordered_ids: self.ordered_ids.clone() }
    }

    /// Apply the planned indices to a local copy of the page's instances.
    pub fn apply(&self, instances: &mut [ComponentInstance]) {
        let targets: HashMap<Uuid, i32> = self
            .changes
            .iter()
            .map(|change| (change.instance_id, change.to))
            .collect();
        for instance in instances.iter_mut() {
            if let Some(to) = targets.get(&instance.id) {
                instance.order_index = *to;
            }
        }
    }
}

/// Convert a position in a sibling list into an order index.
#[must_use]
pub fn to_order_index(position: usize) -> i32 {
    i32::try_from(position).unwrap_or(i32::MAX)
}

/// Move the element at `from` so it ends up at `to`, shifting the elements in
/// between. Out-of-range positions leave the slice untouched.
pub fn array_move<T>(items: &mut Vec<T>, from: usize, to: usize) {
    if from >= items.len() || to >= items.len() || from == to {
        return;
    }
    let item = items.remove(from);
    items.insert(to, item);
}

/// Instances under `parent_id`, ascending by order index (ties by id).
#[must_use]
pub fn sort_siblings(instances: &[ComponentInstance], parent_id: Option<Uuid>) -> Vec<&ComponentInstance> {
    let mut siblings = instances
        .iter()
        .filter(|instance| instance.parent_id == parent_id)
        .collect::<Vec<_>>();
    siblings.sort_by_key(|instance| (instance.order_index, instance.id));
    siblings
}

/// True if the indices are exactly `0..N-1` in some order.
#[must_use]
pub fn is_dense<I>(indices: I) -> bool
where
    I: IntoIterator<Item = i32>,
{
    let mut sorted = indices.into_iter().collect::<Vec<_>>();
    sorted.sort_unstable();
    sorted
        .iter()
        .enumerate()
        .all(|(position, index)| *index == to_order_index(position))
}

/// Changes required to give `ordered_ids` the dense indices `0..N-1`,
/// skipping ids whose current index already matches.
#[must_use]
pub fn dense_changes(ordered_ids: &[Uuid], current: &HashMap<Uuid, i32>) -> Vec<OrderChange> {
    ordered_ids
        .iter()
        .enumerate()
        .filter_map(|(position, id)| {
            let to = to_order_index(position);
            let from = current.get(id).copied().unwrap_or(-1);
            (from != to).then_some(OrderChange { instance_id: *id, from, to })
        })
        .collect()
}

/// Plan moving `active_id` onto the position currently held by `over_id`
/// within the sibling group under `parent_id`.
///
/// Returns `None` if either id is not in the group or the move would not
/// change the group's order or indices.
#[must_use]
pub fn plan_reorder(
    instances: &[ComponentInstance],
    parent_id: Option<Uuid>,
    active_id: Uuid,
    over_id: Uuid,
) -> Option<ReorderPlan> {
    let siblings = sort_siblings(instances, parent_id);
    let old_index = siblings.iter().position(|instance| instance.id == active_id)?;
    let new_index = siblings.iter().position(|instance| instance.id == over_id)?;
    if old_index == new_index {
        return None;
    }

    let current = siblings
        .iter()
        .map(|instance| (instance.id, instance.order_index))
        .collect::<HashMap<_, _>>();
    let mut ordered_ids = siblings.iter().map(|instance| instance.id).collect::<Vec<_>>();
    array_move(&mut ordered_ids, old_index, new_index);

    let changes = dense_changes(&ordered_ids, &current);
    if changes.is_empty() {
        return None;
    }
    Some(ReorderPlan { parent_id, ordered_ids, changes })
}

#[cfg(test)]
#[path = "order_test.rs"]
mod tests;
