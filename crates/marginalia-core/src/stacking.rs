//! Z-order across the session tree.
//!
//! Invariant: for every (parent, child) edge with known values,
//! `z(child) > z(parent)`. A parent can never be raised above one of its
//! descendants; raising a child pushes its ancestors down and its own
//! descendants up until the tree is consistent again.

use crate::graph::SessionGraph;
use crate::session::{MAX_NESTING_LEVEL, SessionId};

pub const DEFAULT_BASE_Z: i64 = 10_000;

#[derive(Debug)]
pub struct ZIndexStackCoordinator {
    base_z: i64,
    /// Monotonic counter; never decreases.
    next_z: i64,
    /// Bring-to-front sequence, used to order equal z values.
    seq: u64,
}

impl Default for ZIndexStackCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_Z)
    }
}

impl ZIndexStackCoordinator {
    pub fn new(base_z: i64) -> Self {
        Self {
            base_z,
            next_z: base_z - 1,
            seq: 0,
        }
    }

    /// Raises a session as far as the tree allows and returns its new z.
    ///
    /// Returns `None` if the session is not in the graph.
    pub fn bring_to_front(&mut self, graph: &mut SessionGraph, id: &SessionId) -> Option<i64> {
        let session = graph.get(id)?;

        self.next_z += 1;
        let mut z = self.next_z.max(self.base_z);

        let parent_z = session
            .parent_session_id
            .as_ref()
            .and_then(|p| graph.get(p))
            .and_then(|p| p.target_z_index);
        if let Some(parent_z) = parent_z {
            z = z.max(parent_z + 1);
        }

        let min_child_z = session
            .child_session_ids
            .iter()
            .filter_map(|c| graph.get(c).and_then(|c| c.target_z_index))
            .min();
        if let Some(min_child_z) = min_child_z {
            z = z.min(min_child_z - 1);
        }

        self.seq += 1;
        self.next_z = self.next_z.max(z);
        if let Some(session) = graph.get_mut(id) {
            session.target_z_index = Some(z);
            session.front_seq = self.seq;
        }

        self.settle(graph, id);

        let z = graph.get(id).and_then(|s| s.target_z_index);
        tracing::trace!("[Stacking] {} -> {:?}", id, z);
        z
    }

    /// Session ids ordered bottom to top.
    ///
    /// Equal z values are ordered by bring-to-front recency, so the most
    /// recently raised session wins the tie.
    pub fn stacking_order(&self, graph: &SessionGraph) -> Vec<SessionId> {
        let mut entries: Vec<_> = graph
            .iter()
            .map(|s| (s.target_z_index.unwrap_or(i64::MIN), s.front_seq, s.id.clone()))
            .collect();
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        entries.into_iter().map(|(_, _, id)| id).collect()
    }

    /// The top-most session, if any.
    pub fn front_most(&self, graph: &SessionGraph) -> Option<SessionId> {
        self.stacking_order(graph).pop()
    }

    /// Re-applies both inequalities around `id` until nothing changes.
    fn settle(&mut self, graph: &mut SessionGraph, id: &SessionId) {
        for _ in 0..=MAX_NESTING_LEVEL {
            let lowered = Self::push_ancestors_below(graph, id);
            let raised = self.push_descendants_above(graph, id);
            if !lowered && !raised {
                return;
            }
        }
        tracing::warn!("[Stacking] Stack around {} did not settle", id);
    }

    /// Walks leaf to root, lowering any ancestor that is not below its child.
    fn push_ancestors_below(graph: &mut SessionGraph, id: &SessionId) -> bool {
        let mut changed = false;
        let mut current = id.clone();

        while let Some(session) = graph.get(&current) {
            let (Some(child_z), Some(parent_id)) =
                (session.target_z_index, session.parent_session_id.clone())
            else {
                break;
            };
            let Some(parent) = graph.get_mut(&parent_id) else {
                break;
            };
            if parent.target_z_index.is_none_or(|pz| pz >= child_z) {
                parent.target_z_index = Some(child_z - 1);
                changed = true;
            }
            current = parent_id;
        }

        changed
    }

    /// Walks root to leaf, raising any descendant that is not above its parent.
    fn push_descendants_above(&mut self, graph: &mut SessionGraph, id: &SessionId) -> bool {
        let mut changed = false;
        let mut stack = vec![id.clone()];

        while let Some(parent_id) = stack.pop() {
            let Some(parent) = graph.get(&parent_id) else {
                continue;
            };
            let Some(parent_z) = parent.target_z_index else {
                continue;
            };
            for child_id in parent.child_session_ids.clone() {
                if let Some(child) = graph.get_mut(&child_id) {
                    if child.target_z_index.is_some_and(|cz| cz <= parent_z) {
                        child.target_z_index = Some(parent_z + 1);
                        self.next_z = self.next_z.max(parent_z + 1);
                        changed = true;
                    }
                }
                stack.push(child_id);
            }
        }

        changed
    }
}
