//! Arena of live sessions and their parent/child links.
//!
//! The graph owns every `Session`. A child's `parent_session_id` is a plain id
//! used for lookup; the parent's `child_session_ids` list is the owning side,
//! so detaching a parent always detaches its subtree first.

use crate::error::{MarginaliaError, Result};
use crate::session::{MAX_NESTING_LEVEL, Session, SessionId};
use std::collections::HashMap;

/// Options for [`SessionGraph::detach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetachOptions {
    /// Detach every descendant first (post-order).
    pub cascade: bool,
    /// Ignore the pinned flag.
    pub force: bool,
}

impl DetachOptions {
    /// Explicit user close: cascades and ignores pins.
    pub fn forced() -> Self {
        Self {
            cascade: true,
            force: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionGraph {
    sessions: HashMap<SessionId, Session>,
    /// Creation order, used for stable listing.
    order: Vec<SessionId>,
}

impl SessionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// Sessions in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.order.iter().filter_map(|id| self.sessions.get(id))
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.order.clone()
    }

    /// Inserts a session, optionally as a child of `parent`.
    ///
    /// A parent that starts hosting its first child is auto-pinned; its prior
    /// pin state is remembered and restored when the last child detaches.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `parent` is not in the graph
    /// - `NestingLimitExceeded` if the child would sit at `MAX_NESTING_LEVEL`
    ///   or deeper; the graph is unchanged
    pub fn attach(&mut self, mut session: Session, parent: Option<&SessionId>) -> Result<SessionId> {
        let level = match parent {
            Some(parent_id) => {
                let parent = self
                    .sessions
                    .get(parent_id)
                    .ok_or_else(|| MarginaliaError::not_found("session", parent_id.as_str()))?;
                parent.nesting_level + 1
            }
            None => 0,
        };

        if level >= MAX_NESTING_LEVEL {
            return Err(MarginaliaError::NestingLimitExceeded {
                level,
                limit: MAX_NESTING_LEVEL,
            });
        }

        session.nesting_level = level;
        session.parent_session_id = parent.cloned();
        let id = session.id.clone();

        if let Some(parent) = parent.and_then(|p| self.sessions.get_mut(p)) {
            parent.child_session_ids.push(id.clone());
            if parent.auto_pinned_for_child.is_none() {
                parent.auto_pinned_for_child = Some(parent.is_pinned);
                parent.is_pinned = true;
            }
        }

        tracing::debug!("[SessionGraph] Attached {} at level {}", id, level);
        self.order.push(id.clone());
        self.sessions.insert(id.clone(), session);
        Ok(id)
    }

    /// Removes a session and returns the removed sessions in detach order.
    ///
    /// With `cascade`, descendants are removed post-order (children before
    /// their parent). A forced detach ignores the pinned flag of the target
    /// and of every descendant; otherwise one pinned session anywhere in the
    /// subtree refuses the whole detach.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the session is not in the graph
    /// - `HasChildren` if not cascading and the target owns children
    /// - `SessionPinned` if not forced and the target or a descendant is
    ///   pinned; the graph is unchanged
    pub fn detach(&mut self, id: &SessionId, options: DetachOptions) -> Result<Vec<Session>> {
        let session = self
            .sessions
            .get(id)
            .ok_or_else(|| MarginaliaError::not_found("session", id.as_str()))?;

        if !options.cascade && !session.child_session_ids.is_empty() {
            return Err(MarginaliaError::HasChildren {
                session_id: id.to_string(),
            });
        }

        let parent_id = session.parent_session_id.clone();

        let mut detach_order = Vec::new();
        self.collect_post_order(id, &mut detach_order);

        if !options.force {
            if let Some(pinned) = detach_order
                .iter()
                .rev()
                .find(|sid| self.sessions.get(*sid).is_some_and(|s| s.is_pinned))
            {
                return Err(MarginaliaError::SessionPinned {
                    session_id: pinned.to_string(),
                });
            }
        }

        let mut removed = Vec::with_capacity(detach_order.len());
        for target in &detach_order {
            if let Some(session) = self.sessions.remove(target) {
                tracing::debug!("[SessionGraph] Detached {}", target);
                removed.push(session);
            }
        }
        self.order.retain(|sid| self.sessions.contains_key(sid));

        if let Some(parent) = parent_id.and_then(|p| self.sessions.get_mut(&p)) {
            parent.child_session_ids.retain(|c| c != id);
            if parent.child_session_ids.is_empty() {
                if let Some(previous) = parent.auto_pinned_for_child.take() {
                    parent.is_pinned = previous;
                }
            }
        }

        Ok(removed)
    }

    /// Sets the pin flag explicitly.
    ///
    /// An explicit pin change discards any remembered auto-pin state, so a
    /// later child detach does not override the user's choice.
    pub fn set_pinned(&mut self, id: &SessionId, pinned: bool) -> Result<()> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| MarginaliaError::not_found("session", id.as_str()))?;
        session.is_pinned = pinned;
        session.auto_pinned_for_child = None;
        Ok(())
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: &SessionId) -> Vec<SessionId> {
        let mut out = Vec::new();
        let mut current = self.sessions.get(id).and_then(|s| s.parent_session_id.clone());
        while let Some(parent_id) = current {
            current = self
                .sessions
                .get(&parent_id)
                .and_then(|s| s.parent_session_id.clone());
            out.push(parent_id);
        }
        out
    }

    /// Descendants of `id` in post-order, excluding `id` itself.
    pub fn descendants(&self, id: &SessionId) -> Vec<SessionId> {
        let mut out = Vec::new();
        self.collect_post_order(id, &mut out);
        out.pop();
        out
    }

    /// Removes every session.
    pub fn clear(&mut self) -> Vec<Session> {
        self.order.clear();
        self.sessions.drain().map(|(_, s)| s).collect()
    }

    /// Checks depth and bidirectional link consistency for every session.
    pub fn is_consistent(&self) -> bool {
        self.sessions.values().all(|session| {
            let level_ok = match &session.parent_session_id {
                None => session.nesting_level == 0,
                Some(parent_id) => self.sessions.get(parent_id).is_some_and(|p| {
                    p.nesting_level + 1 == session.nesting_level
                        && p.child_session_ids.contains(&session.id)
                }),
            };
            let children_ok = session.child_session_ids.iter().all(|child_id| {
                self.sessions
                    .get(child_id)
                    .is_some_and(|c| c.parent_session_id.as_ref() == Some(&session.id))
            });
            level_ok && children_ok
        })
    }

    fn collect_post_order(&self, id: &SessionId, out: &mut Vec<SessionId>) {
        if let Some(session) = self.sessions.get(id) {
            for child in &session.child_session_ids {
                self.collect_post_order(child, out);
            }
            out.push(id.clone());
        }
    }
}
