//! Z-order operations over a selection.
//!
//! Every operation renormalizes the whole store to a contiguous `[0, N-1]`
//! range so z-indices never drift, and reports only the shapes whose index
//! actually changed.

#[cfg(test)]
#[path = "zorder_test.rs"]
mod zorder_test;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::shape::ShapeId;
use crate::store::ShapeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZOrderOp {
    BringToFront,
    SendToBack,
    BringForward,
    SendBackward,
}

/// One shape's z-index before and after a reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZChange {
    pub id: ShapeId,
    pub before: i64,
    pub after: i64,
}

/// Compute the z-index changes for applying `op` to `selected`.
#[must_use]
pub fn reorder(store: &ShapeStore, selected: &HashSet<ShapeId>, op: ZOrderOp) -> Vec<ZChange> {
    let current: Vec<(ShapeId, i64)> = store.get_all().iter().map(|s| (s.id, s.z_index)).collect();
    let mut order: Vec<ShapeId> = current.iter().map(|(id, _)| *id).collect();
    let is_selected = |id: &ShapeId| selected.contains(id);

    match op {
        ZOrderOp::BringToFront => {
            let (picked, rest): (Vec<ShapeId>, Vec<ShapeId>) = order.iter().partition(|id| selected.contains(*id));
            order = rest.into_iter().chain(picked).collect();
        }
        ZOrderOp::SendToBack => {
            let (picked, rest): (Vec<ShapeId>, Vec<ShapeId>) = order.iter().partition(|id| selected.contains(*id));
            order = picked.into_iter().chain(rest).collect();
        }
        ZOrderOp::BringForward => {
            for i in (0..order.len().saturating_sub(1)).rev() {
                if is_selected(&order[i]) && !is_selected(&order[i + 1]) {
                    order.swap(i, i + 1);
                }
            }
        }
        ZOrderOp::SendBackward => {
            for i in 1..order.len() {
                if is_selected(&order[i]) && !is_selected(&order[i - 1]) {
                    order.swap(i, i - 1);
                }
            }
        }
    }

    let before: std::collections::HashMap<ShapeId, i64> = current.into_iter().collect();
    order
        .into_iter()
        .zip(0_i64..)
        .filter_map(|(id, after)| {
            let before = before.get(&id).copied().unwrap_or(after);
            (before != after).then_some(ZChange { id, before, after })
        })
        .collect()
}

/// Whether the store's z-indices already form `[0, N-1]`.
#[must_use]
pub fn is_normalized(store: &ShapeStore) -> bool {
    store.get_all().iter().zip(0_i64..).all(|(s, expected)| s.z_index == expected)
}
