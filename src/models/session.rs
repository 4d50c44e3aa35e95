use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::ids::{GroupId, SessionId};
use super::layout::LayoutTree;

/// Launch metadata carried over when a session is spawned next to another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTemplate {
    pub shell: Option<String>,
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionGroup {
    pub id: GroupId,
    pub layout: LayoutTree<SessionId>,
    pub active_session_id: SessionId,
    pub session_ids: Vec<SessionId>,
}

impl SessionGroup {
    pub fn single(id: GroupId, session_id: SessionId) -> Self {
        Self {
            id,
            layout: LayoutTree::leaf(session_id.clone()),
            active_session_id: session_id.clone(),
            session_ids: vec![session_id],
        }
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.session_ids.contains(session_id)
    }

    /// Drop a session from the member list and the layout. Returns `false`
    /// when that leaves the group empty; the caller must delete it then.
    pub fn remove_session(&mut self, session_id: &SessionId) -> bool {
        self.session_ids.retain(|id| id != session_id);
        if self.session_ids.is_empty() {
            return false;
        }
        let members = &self.session_ids;
        self.layout = match self.layout.remove_leaf(session_id) {
            Some(layout) => layout
                .retain(&mut |id| members.contains(id))
                .unwrap_or_else(|| LayoutTree::leaf(members[0].clone())),
            None => LayoutTree::leaf(members[0].clone()),
        };
        if !self.contains(&self.active_session_id) {
            self.active_session_id = self.layout.first_leaf().clone();
        }
        true
    }

    /// Swap one session id for another everywhere inside the group.
    pub fn replace_session(&mut self, old: &SessionId, new: SessionId) {
        for id in self.session_ids.iter_mut() {
            if id == old {
                *id = new.clone();
            }
        }
        self.layout = self.layout.replace_leaf(old, new.clone());
        if &self.active_session_id == old {
            self.active_session_id = new;
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        if self.session_ids.is_empty() {
            return Err(format!("group {} has no sessions", self.id));
        }
        if !self.contains(&self.active_session_id) {
            return Err(format!("group {} active session is not a member", self.id));
        }
        let mut seen = HashSet::new();
        for leaf in self.layout.leaves() {
            if !self.contains(&leaf) {
                return Err(format!("group {} layout has orphan leaf {}", self.id, leaf));
            }
            if !seen.insert(leaf) {
                return Err(format!("group {} layout repeats a leaf", self.id));
            }
        }
        Ok(())
    }
}

/// The two resource namespaces, tagged where they meet at the command boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ResourceRef {
    Note(String),
    Session(SessionId),
}
