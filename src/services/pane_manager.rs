use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::LayoutSettings;
use crate::errors::EngineResult;
use crate::models::{
    FocusDirection, LayoutTree, Pane, PaneId, SplitDirection, SplitPosition, Tab, TabId,
    DEFAULT_SPLIT_RATIO,
};
use crate::services::persistence::{decode_pane_state, encode_pane_state, Persistence};
use crate::services::snapshot_cell::SnapshotCell;

/// Everything the editor side publishes: the pane tree, the pane table and
/// the focused pane.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaneLayoutState {
    pub layout: Option<LayoutTree<PaneId>>,
    pub panes: HashMap<PaneId, Pane>,
    pub active_pane_id: Option<PaneId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenedTab {
    pub pane_id: PaneId,
    pub tab_id: TabId,
    pub created_pane: bool,
    pub created_tab: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTabOutcome {
    pub tab: Tab,
    pub index: usize,
    pub pane_destroyed: bool,
}

impl PaneLayoutState {
    pub fn pane(&self, pane_id: &PaneId) -> Option<&Pane> {
        self.panes.get(pane_id)
    }

    pub fn pane_for_tab(&self, tab_id: &TabId) -> Option<&Pane> {
        self.panes.values().find(|pane| pane.tab(tab_id).is_some())
    }

    /// Panes holding `resource`, in layout order.
    pub fn panes_with_resource(&self, resource: &str) -> Vec<PaneId> {
        self.pane_order()
            .into_iter()
            .filter(|id| {
                self.panes
                    .get(id)
                    .is_some_and(|pane| pane.tab_for_resource(resource).is_some())
            })
            .collect()
    }

    pub fn pane_order(&self) -> Vec<PaneId> {
        self.layout.as_ref().map(|l| l.leaves()).unwrap_or_default()
    }

    pub fn adjacent_pane(&self, pane_id: &PaneId, direction: FocusDirection) -> Option<PaneId> {
        self.layout.as_ref()?.adjacent_leaf(pane_id, direction).cloned()
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        let leaves = self.pane_order();
        if leaves.len() != self.panes.len() {
            return Err(format!(
                "layout has {} leaves but {} panes are registered",
                leaves.len(),
                self.panes.len()
            ));
        }
        let mut seen = HashSet::new();
        for leaf in &leaves {
            if !seen.insert(leaf) {
                return Err(format!("pane {} appears twice in the layout", leaf));
            }
            let pane = self
                .panes
                .get(leaf)
                .ok_or_else(|| format!("layout leaf {} has no pane", leaf))?;
            pane.check_invariants()?;
        }
        match &self.active_pane_id {
            Some(id) if !self.panes.contains_key(id) => {
                Err(format!("active pane {} does not exist", id))
            }
            None if !self.panes.is_empty() => Err("panes exist but none is active".to_string()),
            _ => Ok(()),
        }
    }

    /// Open `resource` in the given pane, or the focused one when no pane is
    /// named. A pane that already shows the resource only switches to it; no
    /// usable target means a fresh pane.
    pub fn open_tab(&mut self, resource: &str, pane_id: Option<&PaneId>, ratio: u8) -> Option<OpenedTab> {
        let target = match pane_id {
            Some(id) => Some(id.clone()),
            None => self.active_pane_id.clone(),
        }
        .filter(|id| self.panes.contains_key(id));

        let Some(target) = target else {
            let tab = Tab::new(resource);
            let tab_id = tab.id.clone();
            let pane_id = self.insert_pane(tab, ratio);
            log::debug!("Opened '{}' in new pane {}", resource, pane_id);
            return Some(OpenedTab {
                pane_id,
                tab_id,
                created_pane: true,
                created_tab: true,
            });
        };

        let pane = self.panes.get_mut(&target)?;
        let (tab_id, created_tab) = match pane.tab_for_resource(resource) {
            Some(existing) => (existing.id.clone(), false),
            None => {
                let tab = Tab::new(resource);
                let tab_id = tab.id.clone();
                pane.insert_tab(tab);
                (tab_id, true)
            }
        };
        pane.active_tab_id = tab_id.clone();
        self.active_pane_id = Some(target.clone());
        Some(OpenedTab {
            pane_id: target,
            tab_id,
            created_pane: false,
            created_tab,
        })
    }

    fn insert_pane(&mut self, tab: Tab, ratio: u8) -> PaneId {
        let pane_id = PaneId::generate();
        self.layout = Some(match self.layout.take() {
            Some(layout) => LayoutTree::branch(
                SplitDirection::Row,
                layout,
                LayoutTree::leaf(pane_id.clone()),
                ratio,
            ),
            None => LayoutTree::leaf(pane_id.clone()),
        });
        self.panes
            .insert(pane_id.clone(), Pane::with_tab(pane_id.clone(), tab));
        self.active_pane_id = Some(pane_id.clone());
        pane_id
    }

    /// Close a tab and record it in the pane's history. Closing the last tab
    /// destroys the pane and moves focus to the first remaining leaf.
    pub fn close_tab(&mut self, pane_id: &PaneId, tab_id: &TabId) -> Option<ClosedTabOutcome> {
        let pane = self.panes.get_mut(pane_id)?;
        let (index, tab) = pane.remove_tab(tab_id)?;
        pane.remember_closed(&tab, index);
        let pane_destroyed = pane.tabs.is_empty();
        if pane_destroyed {
            self.destroy_pane(pane_id);
            self.active_pane_id = self.layout.as_ref().map(|l| l.first_leaf().clone());
        }
        Some(ClosedTabOutcome {
            tab,
            index,
            pane_destroyed,
        })
    }

    /// Destroy a pane with all of its tabs.
    pub fn close_pane(&mut self, pane_id: &PaneId) -> Option<Pane> {
        self.destroy_pane(pane_id)
    }

    fn destroy_pane(&mut self, pane_id: &PaneId) -> Option<Pane> {
        let pane = self.panes.remove(pane_id)?;
        self.layout = self.layout.take().and_then(|layout| layout.remove_leaf(pane_id));
        if self.active_pane_id.as_ref() == Some(pane_id) {
            self.active_pane_id = self.layout.as_ref().map(|l| l.first_leaf().clone());
        }
        log::debug!("Destroyed pane {}", pane_id);
        Some(pane)
    }

    /// Remove a tab without recording history; an emptied pane is destroyed.
    fn detach_tab(&mut self, pane_id: &PaneId, tab_id: &TabId) -> Option<Tab> {
        let pane = self.panes.get_mut(pane_id)?;
        let (_, tab) = pane.remove_tab(tab_id)?;
        if pane.tabs.is_empty() {
            self.destroy_pane(pane_id);
        }
        Some(tab)
    }

    /// Split a pane, giving the new `second` pane a copy of the active tab.
    pub fn split_pane(&mut self, pane_id: &PaneId, direction: SplitDirection, ratio: u8) -> Option<PaneId> {
        let resource = self.panes.get(pane_id)?.active_tab()?.resource.clone();
        let layout = self.layout.as_ref().filter(|l| l.contains(pane_id))?;
        let new_pane_id = PaneId::generate();
        self.layout = Some(layout.split_at(
            pane_id,
            direction,
            SplitPosition::Second,
            new_pane_id.clone(),
            ratio,
        ));
        self.panes.insert(
            new_pane_id.clone(),
            Pane::with_tab(new_pane_id.clone(), Tab::new(resource)),
        );
        self.active_pane_id = Some(new_pane_id.clone());
        Some(new_pane_id)
    }

    /// Move `tab_id` out of `from` into a new pane placed on `position` of a
    /// split around `target`. Splitting a pane with its own only tab copies
    /// the tab instead, so the pane being split survives.
    pub fn split_pane_with_tab(
        &mut self,
        target: &PaneId,
        direction: SplitDirection,
        position: SplitPosition,
        from: &PaneId,
        tab_id: &TabId,
        ratio: u8,
    ) -> Option<PaneId> {
        if !self.panes.contains_key(target) {
            return None;
        }
        let source = self.panes.get(from)?;
        let tab = source.tab(tab_id)?.clone();
        let keep_source_tab = from == target && source.tabs.len() == 1;
        let layout = self.layout.as_ref().filter(|l| l.contains(target))?;

        let new_pane_id = PaneId::generate();
        self.layout = Some(layout.split_at(target, direction, position, new_pane_id.clone(), ratio));
        let moved = if keep_source_tab {
            Tab {
                id: TabId::generate(),
                ..tab
            }
        } else {
            tab
        };
        self.panes
            .insert(new_pane_id.clone(), Pane::with_tab(new_pane_id.clone(), moved));
        if !keep_source_tab {
            self.detach_tab(from, tab_id);
        }
        self.active_pane_id = Some(new_pane_id.clone());
        Some(new_pane_id)
    }

    pub fn pin_tab(&mut self, pane_id: &PaneId, tab_id: &TabId) -> Option<()> {
        let pane = self.panes.get_mut(pane_id)?;
        let index = pane.tab_index(tab_id)?;
        if pane.tabs[index].pinned {
            return None;
        }
        let mut tab = pane.tabs.remove(index);
        tab.pinned = true;
        let boundary = pane.pinned_count();
        pane.tabs.insert(boundary, tab);
        Some(())
    }

    pub fn unpin_tab(&mut self, pane_id: &PaneId, tab_id: &TabId) -> Option<()> {
        let pane = self.panes.get_mut(pane_id)?;
        let index = pane.tab_index(tab_id)?;
        if !pane.tabs[index].pinned {
            return None;
        }
        let mut tab = pane.tabs.remove(index);
        tab.pinned = false;
        let boundary = pane.pinned_count();
        pane.tabs.insert(boundary, tab);
        Some(())
    }

    /// Move a tab to `to_index` inside its own partition. A destination on the
    /// other side of the pinned boundary is rejected.
    pub fn reorder_tab(&mut self, pane_id: &PaneId, tab_id: &TabId, to_index: usize) -> Option<()> {
        let pane = self.panes.get_mut(pane_id)?;
        let index = pane.tab_index(tab_id)?;
        let pinned_count = pane.pinned_count();
        let allowed = if pane.tabs[index].pinned {
            0..pinned_count
        } else {
            pinned_count..pane.tabs.len()
        };
        if !allowed.contains(&to_index) {
            log::debug!("Rejected reorder of tab {} across the pinned boundary", tab_id);
            return None;
        }
        if to_index == index {
            return None;
        }
        let tab = pane.tabs.remove(index);
        pane.tabs.insert(to_index, tab);
        Some(())
    }

    /// Move a tab into another pane and focus it there. If the target already
    /// shows the same resource, that tab is focused and the moved one dropped.
    pub fn move_tab_to_pane(&mut self, from: &PaneId, tab_id: &TabId, to: &PaneId) -> Option<TabId> {
        if from == to || !self.panes.contains_key(to) {
            return None;
        }
        let tab = self.panes.get(from)?.tab(tab_id)?.clone();
        let existing = self.panes.get(to)?.tab_for_resource(&tab.resource).map(|t| t.id.clone());
        self.detach_tab(from, tab_id)?;

        let target = self.panes.get_mut(to)?;
        let active = match existing {
            Some(id) => id,
            None => {
                let id = tab.id.clone();
                target.insert_tab(tab);
                id
            }
        };
        target.active_tab_id = active.clone();
        self.active_pane_id = Some(to.clone());
        Some(active)
    }

    pub fn activate_tab(&mut self, pane_id: &PaneId, tab_id: &TabId) -> Option<()> {
        let pane = self.panes.get_mut(pane_id)?;
        pane.tab(tab_id)?;
        pane.active_tab_id = tab_id.clone();
        self.active_pane_id = Some(pane_id.clone());
        Some(())
    }

    pub fn focus_pane(&mut self, pane_id: &PaneId) -> Option<()> {
        if !self.panes.contains_key(pane_id) {
            return None;
        }
        self.active_pane_id = Some(pane_id.clone());
        Some(())
    }

    /// Re-open the newest entry of a pane's closed-tab history.
    pub fn reopen_closed_tab(&mut self, pane_id: &PaneId, ratio: u8) -> Option<OpenedTab> {
        let closed = self.panes.get_mut(pane_id)?.recently_closed.pop_back()?;
        let opened = self.open_tab(&closed.resource, Some(pane_id), ratio)?;
        if closed.pinned && opened.created_tab {
            self.pin_tab(&opened.pane_id, &opened.tab_id);
        }
        Some(opened)
    }

    /// Point every tab showing `old` at `new`. A pane that already shows
    /// `new` drops its stale tab instead. Returns the number of panes touched.
    pub fn retarget_resource(&mut self, old: &str, new: &str) -> Option<usize> {
        if old == new {
            return None;
        }
        let mut touched = 0;
        for pane_id in self.pane_order() {
            let Some(pane) = self.panes.get_mut(&pane_id) else {
                continue;
            };
            for closed in pane.recently_closed.iter_mut().filter(|c| c.resource == old) {
                closed.resource = new.to_string();
            }
            let Some(stale) = pane.tab_for_resource(old).map(|t| t.id.clone()) else {
                continue;
            };
            touched += 1;
            if pane.tab_for_resource(new).is_some() {
                self.detach_tab(&pane_id, &stale);
            } else if let Some(tab) = pane.tabs.iter_mut().find(|t| t.id == stale) {
                tab.resource = new.to_string();
            }
        }
        (touched > 0).then_some(touched)
    }

    /// Close every tab showing `resource`. Returns the number of tabs closed.
    pub fn close_resource(&mut self, resource: &str) -> Option<usize> {
        let mut closed = 0;
        for pane_id in self.panes_with_resource(resource) {
            let tab_id = self
                .panes
                .get(&pane_id)
                .and_then(|pane| pane.tab_for_resource(resource))
                .map(|tab| tab.id.clone());
            if let Some(tab_id) = tab_id {
                if self.detach_tab(&pane_id, &tab_id).is_some() {
                    closed += 1;
                }
            }
        }
        (closed > 0).then_some(closed)
    }
}

/// Owner of the editor pane registry.
///
/// Every mutation runs against a private draft. With persistence attached the
/// draft is written first and only published once the write succeeded.
pub struct PaneManager {
    state: SnapshotCell<PaneLayoutState>,
    persistence: Option<Persistence>,
    split_ratio: u8,
}

impl PaneManager {
    pub fn new() -> Self {
        Self {
            state: SnapshotCell::default(),
            persistence: None,
            split_ratio: DEFAULT_SPLIT_RATIO,
        }
    }

    pub fn with_config(mut self, settings: &LayoutSettings) -> Self {
        self.split_ratio = crate::utils::clamp_ratio(settings.default_split_ratio);
        self
    }

    /// Attach a store and restore whatever it holds.
    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        let restored = decode_pane_state(persistence.load().as_ref());
        log::info!(
            "Restored {} editor pane(s) from '{}'",
            restored.panes.len(),
            persistence.key()
        );
        self.state.replace(restored);
        self.persistence = Some(persistence);
        self
    }

    pub fn snapshot(&self) -> Arc<PaneLayoutState> {
        self.state.snapshot()
    }

    fn commit<R>(&self, operation: impl FnOnce(&mut PaneLayoutState) -> Option<R>) -> EngineResult<Option<R>> {
        self.state.commit_with(|draft| {
            let Some(outcome) = operation(draft) else {
                return Ok(None);
            };
            if let Some(persistence) = &self.persistence {
                persistence.save(&encode_pane_state(draft))?;
            }
            Ok(Some(outcome))
        })
    }

    pub fn open_tab(&self, resource: &str, pane_id: Option<&PaneId>) -> EngineResult<Option<OpenedTab>> {
        let ratio = self.split_ratio;
        self.commit(|state| state.open_tab(resource, pane_id, ratio))
    }

    pub fn close_tab(&self, pane_id: &PaneId, tab_id: &TabId) -> EngineResult<Option<ClosedTabOutcome>> {
        self.commit(|state| state.close_tab(pane_id, tab_id))
    }

    pub fn close_pane(&self, pane_id: &PaneId) -> EngineResult<bool> {
        Ok(self.commit(|state| state.close_pane(pane_id))?.is_some())
    }

    pub fn split_pane(&self, pane_id: &PaneId, direction: SplitDirection) -> EngineResult<Option<PaneId>> {
        let ratio = self.split_ratio;
        self.commit(|state| state.split_pane(pane_id, direction, ratio))
    }

    pub fn split_pane_with_tab(
        &self,
        target: &PaneId,
        direction: SplitDirection,
        position: SplitPosition,
        from: &PaneId,
        tab_id: &TabId,
    ) -> EngineResult<Option<PaneId>> {
        let ratio = self.split_ratio;
        self.commit(|state| state.split_pane_with_tab(target, direction, position, from, tab_id, ratio))
    }

    pub fn pin_tab(&self, pane_id: &PaneId, tab_id: &TabId) -> EngineResult<bool> {
        Ok(self.commit(|state| state.pin_tab(pane_id, tab_id))?.is_some())
    }

    pub fn unpin_tab(&self, pane_id: &PaneId, tab_id: &TabId) -> EngineResult<bool> {
        Ok(self.commit(|state| state.unpin_tab(pane_id, tab_id))?.is_some())
    }

    pub fn reorder_tab(&self, pane_id: &PaneId, tab_id: &TabId, to_index: usize) -> EngineResult<bool> {
        Ok(self
            .commit(|state| state.reorder_tab(pane_id, tab_id, to_index))?
            .is_some())
    }

    pub fn move_tab_to_pane(&self, from: &PaneId, tab_id: &TabId, to: &PaneId) -> EngineResult<Option<TabId>> {
        self.commit(|state| state.move_tab_to_pane(from, tab_id, to))
    }

    pub fn activate_tab(&self, pane_id: &PaneId, tab_id: &TabId) -> EngineResult<bool> {
        Ok(self.commit(|state| state.activate_tab(pane_id, tab_id))?.is_some())
    }

    pub fn focus_pane(&self, pane_id: &PaneId) -> EngineResult<bool> {
        Ok(self.commit(|state| state.focus_pane(pane_id))?.is_some())
    }

    pub fn reopen_closed_tab(&self, pane_id: &PaneId) -> EngineResult<Option<OpenedTab>> {
        let ratio = self.split_ratio;
        self.commit(|state| state.reopen_closed_tab(pane_id, ratio))
    }

    pub fn retarget_resource(&self, old: &str, new: &str) -> EngineResult<usize> {
        Ok(self
            .commit(|state| state.retarget_resource(old, new))?
            .unwrap_or(0))
    }

    pub fn close_resource(&self, resource: &str) -> EngineResult<usize> {
        Ok(self.commit(|state| state.close_resource(resource))?.unwrap_or(0))
    }

    pub fn pane_for_tab(&self, tab_id: &TabId) -> Option<PaneId> {
        self.snapshot().pane_for_tab(tab_id).map(|pane| pane.id.clone())
    }

    pub fn panes_with_resource(&self, resource: &str) -> Vec<PaneId> {
        self.snapshot().panes_with_resource(resource)
    }

    pub fn adjacent_pane(&self, pane_id: &PaneId, direction: FocusDirection) -> Option<PaneId> {
        self.snapshot().adjacent_pane(pane_id, direction)
    }

    pub fn active_pane(&self) -> Option<PaneId> {
        self.snapshot().active_pane_id.clone()
    }
}

impl Default for PaneManager {
    fn default() -> Self {
        Self::new()
    }
}
