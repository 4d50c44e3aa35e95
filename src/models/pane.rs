use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use super::ids::{PaneId, TabId};

pub const RECENTLY_CLOSED_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    pub resource: String,
    #[serde(default)]
    pub pinned: bool,
}

impl Tab {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            id: TabId::generate(),
            resource: resource.into(),
            pinned: false,
        }
    }
}

/// Entry of a pane's recently-closed history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTab {
    pub resource: String,
    #[serde(default)]
    pub pinned: bool,
    pub index: usize,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pane {
    pub id: PaneId,
    pub tabs: Vec<Tab>,
    pub active_tab_id: TabId,
    #[serde(default)]
    pub recently_closed: VecDeque<ClosedTab>,
}

impl Pane {
    pub fn with_tab(id: PaneId, tab: Tab) -> Self {
        Self {
            id,
            active_tab_id: tab.id.clone(),
            tabs: vec![tab],
            recently_closed: VecDeque::new(),
        }
    }

    pub fn tab(&self, tab_id: &TabId) -> Option<&Tab> {
        self.tabs.iter().find(|tab| &tab.id == tab_id)
    }

    pub fn tab_index(&self, tab_id: &TabId) -> Option<usize> {
        self.tabs.iter().position(|tab| &tab.id == tab_id)
    }

    pub fn tab_for_resource(&self, resource: &str) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.resource == resource)
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.tab(&self.active_tab_id)
    }

    pub fn pinned_count(&self) -> usize {
        self.tabs.iter().take_while(|tab| tab.pinned).count()
    }

    /// Insert on the correct side of the pinned boundary: pinned tabs go to the
    /// end of the pinned prefix, unpinned tabs to the end of the list.
    pub fn insert_tab(&mut self, tab: Tab) {
        if tab.pinned {
            let boundary = self.pinned_count();
            self.tabs.insert(boundary, tab);
        } else {
            self.tabs.push(tab);
        }
    }

    /// Remove a tab. When it was active, the tab now sitting at the same
    /// index (clamped to the new end) becomes active.
    pub fn remove_tab(&mut self, tab_id: &TabId) -> Option<(usize, Tab)> {
        let index = self.tab_index(tab_id)?;
        let tab = self.tabs.remove(index);
        if self.active_tab_id == tab.id && !self.tabs.is_empty() {
            let next = index.min(self.tabs.len() - 1);
            self.active_tab_id = self.tabs[next].id.clone();
        }
        Some((index, tab))
    }

    pub fn remember_closed(&mut self, tab: &Tab, index: usize) {
        self.recently_closed.push_back(ClosedTab {
            resource: tab.resource.clone(),
            pinned: tab.pinned,
            index,
            closed_at: Utc::now(),
        });
        while self.recently_closed.len() > RECENTLY_CLOSED_CAPACITY {
            self.recently_closed.pop_front();
        }
    }

    /// Stable partition: pinned tabs first, relative order kept on both sides.
    pub fn normalize_pins(&mut self) {
        let (pinned, unpinned): (Vec<Tab>, Vec<Tab>) =
            self.tabs.drain(..).partition(|tab| tab.pinned);
        self.tabs = pinned;
        self.tabs.extend(unpinned);
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        if self.tabs.is_empty() {
            return Err(format!("pane {} has no tabs", self.id));
        }
        let mut seen = HashSet::new();
        if !self.tabs.iter().all(|tab| seen.insert(&tab.id)) {
            return Err(format!("pane {} has duplicate tab ids", self.id));
        }
        if self.active_tab().is_none() {
            return Err(format!("pane {} active tab is not a member", self.id));
        }
        if self.tabs.iter().skip(self.pinned_count()).any(|tab| tab.pinned) {
            return Err(format!("pane {} pinned tabs are not a prefix", self.id));
        }
        if self.recently_closed.len() > RECENTLY_CLOSED_CAPACITY {
            return Err(format!("pane {} history exceeds capacity", self.id));
        }
        Ok(())
    }
}
