//! # Session Group Manager
//!
//! Terminal counterpart of the pane manager. Each bottom-panel tab owns a
//! group; a group arranges its sessions in a layout tree. Editor paths may
//! own a standalone session of their own.
//!
//! Registry changes are synchronous transforms published through a
//! [`SnapshotCell`]. Talking to the PTY transport is the only async step and
//! always happens outside the transform: sessions are spawned before the
//! commit that records them and killed after the commit that forgot them.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::{SessionSettings, WorkspaceConfig};
use crate::errors::{EngineError, EngineResult};
use crate::models::{
    FocusDirection, GroupId, LayoutTree, PanelTabId, SessionGroup, SessionId, SessionTemplate,
    SplitDirection, SplitPosition, DEFAULT_SPLIT_RATIO,
};
use crate::services::persistence::{decode_session_state, encode_session_state, Persistence};
use crate::services::single_flight::SingleFlight;
use crate::services::snapshot_cell::SnapshotCell;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub session_id: SessionId,
    pub template: SessionTemplate,
    pub cols: u16,
    pub rows: u16,
}

/// The PTY transport. The engine calls it, never implements it.
#[allow(async_fn_in_trait)]
pub trait SessionBackend {
    async fn create(&self, request: &SpawnRequest) -> anyhow::Result<()>;
    async fn kill(&self, session_id: &SessionId) -> anyhow::Result<()>;
    async fn resize(&self, session_id: &SessionId, cols: u16, rows: u16) -> anyhow::Result<()>;
    async fn write(&self, session_id: &SessionId, data: &str) -> anyhow::Result<()>;
    /// Whether the transport still reports the session as running.
    fn is_live(&self, session_id: &SessionId) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionGroupState {
    pub groups: HashMap<GroupId, SessionGroup>,
    pub panel_tabs: HashMap<PanelTabId, GroupId>,
    pub editor_sessions: HashMap<String, SessionId>,
    pub templates: HashMap<SessionId, SessionTemplate>,
    session_groups: HashMap<SessionId, GroupId>,
}

/// What a session exit or kill cleaned up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionExit {
    pub group_id: Option<GroupId>,
    pub group_removed: bool,
    /// Panel tabs whose group lost its last session; the UI closes them.
    pub closed_panel_tabs: Vec<PanelTabId>,
    pub editor_paths: Vec<String>,
}

impl SessionGroupState {
    pub fn group(&self, group_id: &GroupId) -> Option<&SessionGroup> {
        self.groups.get(group_id)
    }

    pub fn group_for_panel_tab(&self, tab_id: &PanelTabId) -> Option<&SessionGroup> {
        self.groups.get(self.panel_tabs.get(tab_id)?)
    }

    pub fn group_for_session(&self, session_id: &SessionId) -> Option<&GroupId> {
        self.session_groups.get(session_id)
    }

    pub fn session_index(&self) -> &HashMap<SessionId, GroupId> {
        &self.session_groups
    }

    /// Derive session→group from the group list. Never read from storage.
    pub fn rebuild_index(&mut self) {
        self.session_groups = self
            .groups
            .values()
            .flat_map(|group| {
                group
                    .session_ids
                    .iter()
                    .map(move |session| (session.clone(), group.id.clone()))
            })
            .collect();
    }

    pub fn is_referenced(&self, session_id: &SessionId) -> bool {
        self.session_groups.contains_key(session_id)
            || self.editor_sessions.values().any(|id| id == session_id)
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        let mut owners: HashMap<&SessionId, &GroupId> = HashMap::new();
        for (id, group) in &self.groups {
            if id != &group.id {
                return Err(format!("group {} is filed under {}", group.id, id));
            }
            group.check_invariants()?;
            for session in &group.session_ids {
                if owners.insert(session, &group.id).is_some() {
                    return Err(format!("session {} belongs to two groups", session));
                }
            }
            if !self.panel_tabs.values().any(|g| g == id) {
                return Err(format!("group {} is not owned by any panel tab", id));
            }
        }
        for (tab, group) in &self.panel_tabs {
            if !self.groups.contains_key(group) {
                return Err(format!("panel tab {} points at missing group {}", tab, group));
            }
        }
        let derived: HashMap<&SessionId, &GroupId> = self.session_groups.iter().collect();
        if derived != owners {
            return Err("session index is out of sync with the groups".to_string());
        }
        Ok(())
    }

    /// Give `tab_id` a fresh single-session group, replacing whatever it had.
    /// Returns the sessions that are no longer referenced afterwards.
    pub fn install_group(
        &mut self,
        tab_id: &PanelTabId,
        group_id: GroupId,
        session_id: SessionId,
        template: SessionTemplate,
    ) -> Vec<SessionId> {
        let previous = self
            .panel_tabs
            .insert(tab_id.clone(), group_id.clone())
            .and_then(|old| self.release_group(&old));
        self.templates.insert(session_id.clone(), template);
        self.groups
            .insert(group_id.clone(), SessionGroup::single(group_id, session_id));
        self.rebuild_index();
        self.collect_unreferenced(previous.map(|g| g.session_ids).unwrap_or_default())
    }

    /// Drop a group unless another panel tab still points at it.
    fn release_group(&mut self, group_id: &GroupId) -> Option<SessionGroup> {
        if self.panel_tabs.values().any(|g| g == group_id) {
            return None;
        }
        self.groups.remove(group_id)
    }

    fn collect_unreferenced(&mut self, candidates: Vec<SessionId>) -> Vec<SessionId> {
        let orphaned: Vec<SessionId> = candidates
            .into_iter()
            .filter(|session| !self.is_referenced(session))
            .collect();
        for session in &orphaned {
            self.templates.remove(session);
        }
        orphaned
    }

    /// Add a session to a group, either appended at the root or split off an
    /// existing leaf, and make it active.
    pub fn add_session(
        &mut self,
        group_id: &GroupId,
        session_id: SessionId,
        template: SessionTemplate,
        split: Option<(&SessionId, SplitDirection)>,
        ratio: u8,
    ) -> Option<()> {
        let group = self.groups.get_mut(group_id)?;
        group.layout = match split {
            Some((target, direction)) => {
                if !group.layout.contains(target) {
                    return None;
                }
                group.layout.split_at(
                    target,
                    direction,
                    SplitPosition::Second,
                    session_id.clone(),
                    ratio,
                )
            }
            None => LayoutTree::branch(
                SplitDirection::Row,
                group.layout.clone(),
                LayoutTree::leaf(session_id.clone()),
                ratio,
            ),
        };
        group.session_ids.push(session_id.clone());
        group.active_session_id = session_id.clone();
        self.templates.insert(session_id.clone(), template);
        self.session_groups.insert(session_id, group_id.clone());
        Some(())
    }

    /// Forget a session everywhere. A group losing its last session is
    /// deleted together with the panel tabs that pointed at it.
    pub fn remove_session(&mut self, session_id: &SessionId) -> Option<SessionExit> {
        let mut exit = SessionExit::default();
        if let Some(group_id) = self.session_groups.get(session_id).cloned() {
            let survives = self
                .groups
                .get_mut(&group_id)
                .map(|group| group.remove_session(session_id))
                .unwrap_or(false);
            if !survives {
                self.groups.remove(&group_id);
                exit.closed_panel_tabs = self
                    .panel_tabs
                    .iter()
                    .filter(|(_, g)| *g == &group_id)
                    .map(|(tab, _)| tab.clone())
                    .collect();
                self.panel_tabs.retain(|_, g| g != &group_id);
                exit.group_removed = true;
            }
            exit.group_id = Some(group_id);
        }
        exit.editor_paths = self
            .editor_sessions
            .iter()
            .filter(|(_, s)| *s == session_id)
            .map(|(path, _)| path.clone())
            .collect();
        if exit.group_id.is_none() && exit.editor_paths.is_empty() {
            return None;
        }
        self.editor_sessions.retain(|_, s| s != session_id);
        self.templates.remove(session_id);
        self.rebuild_index();
        Some(exit)
    }

    /// Fold the source tab's group into the target tab's group. Only sessions
    /// in `live` move over; the source group and every association to it go.
    pub fn merge_panel_tabs(
        &mut self,
        source_tab: &PanelTabId,
        target_tab: &PanelTabId,
        live: &HashSet<SessionId>,
        ratio: u8,
    ) -> Option<GroupId> {
        let source_id = self.panel_tabs.get(source_tab)?.clone();
        let target_id = self
            .panel_tabs
            .get(target_tab)
            .filter(|id| self.groups.contains_key(*id))
            .cloned();
        if source_tab == target_tab || target_id.as_ref() == Some(&source_id) {
            return None;
        }
        let source = self.groups.remove(&source_id)?;
        self.panel_tabs.retain(|_, g| g != &source_id);

        let moved: Vec<SessionId> = source
            .session_ids
            .iter()
            .filter(|session| live.contains(*session))
            .cloned()
            .collect();

        let merged_id = match target_id {
            Some(target_id) => {
                let target = self.groups.get_mut(&target_id)?;
                let mut members = target.session_ids.clone();
                members.extend(moved.iter().cloned());
                crate::utils::dedup_in_order(&mut members);

                let active = if members.contains(&target.active_session_id) {
                    target.active_session_id.clone()
                } else {
                    members[0].clone()
                };
                let combined = LayoutTree::branch(
                    SplitDirection::Row,
                    target.layout.clone(),
                    source.layout.clone(),
                    ratio,
                );
                let mut placed = HashSet::new();
                target.layout = combined
                    .retain(&mut |id| members.contains(id) && placed.insert(id.clone()))
                    .unwrap_or_else(|| LayoutTree::leaf(active.clone()));
                target.session_ids = members;
                target.active_session_id = active;
                Some(target_id)
            }
            None if !moved.is_empty() => {
                let active = if moved.contains(&source.active_session_id) {
                    source.active_session_id.clone()
                } else {
                    moved[0].clone()
                };
                let layout = source
                    .layout
                    .retain(&mut |id| moved.contains(id))
                    .unwrap_or_else(|| LayoutTree::leaf(active.clone()));
                let group = SessionGroup {
                    id: GroupId::generate(),
                    layout,
                    active_session_id: active,
                    session_ids: moved.clone(),
                };
                let group_id = group.id.clone();
                self.panel_tabs.insert(target_tab.clone(), group_id.clone());
                self.groups.insert(group_id.clone(), group);
                Some(group_id)
            }
            None => None,
        };

        self.rebuild_index();
        let dropped: Vec<SessionId> = source
            .session_ids
            .into_iter()
            .filter(|session| !live.contains(session))
            .collect();
        self.collect_unreferenced(dropped);
        log::debug!(
            "Merged group {} into {:?} ({} live session(s) moved)",
            source_id,
            merged_id,
            moved.len()
        );
        Some(merged_id.unwrap_or(source_id))
    }

    /// Forget a panel tab's group. Returns sessions nothing references anymore.
    pub fn detach_panel_tab(&mut self, tab_id: &PanelTabId) -> Option<Vec<SessionId>> {
        let group_id = self.panel_tabs.remove(tab_id)?;
        let released = self.release_group(&group_id);
        self.rebuild_index();
        Some(self.collect_unreferenced(released.map(|g| g.session_ids).unwrap_or_default()))
    }

    /// Forget an editor path's session. Returns it if nothing else uses it.
    pub fn detach_editor_path(&mut self, path: &str) -> Option<Vec<SessionId>> {
        let session = self.editor_sessions.remove(path)?;
        Some(self.collect_unreferenced(vec![session]))
    }

    /// Point an editor path at a session. Returns the previous session if it
    /// is now unreferenced.
    pub fn bind_editor_path(
        &mut self,
        path: &str,
        session_id: SessionId,
        template: SessionTemplate,
    ) -> Vec<SessionId> {
        self.templates.insert(session_id.clone(), template);
        let previous = self.editor_sessions.insert(path.to_string(), session_id);
        self.collect_unreferenced(previous.into_iter().collect())
    }

    /// Substitute a recreated session for an exited one in every association.
    pub fn replace_session(
        &mut self,
        old: &SessionId,
        new: SessionId,
        template: SessionTemplate,
    ) -> Option<()> {
        if !self.is_referenced(old) {
            return None;
        }
        if let Some(group_id) = self.session_groups.get(old).cloned() {
            if let Some(group) = self.groups.get_mut(&group_id) {
                group.replace_session(old, new.clone());
            }
        }
        for session in self.editor_sessions.values_mut().filter(|s| *s == old) {
            *session = new.clone();
        }
        self.templates.remove(old);
        self.templates.insert(new, template);
        self.rebuild_index();
        Some(())
    }

    pub fn focus_session(&mut self, group_id: &GroupId, session_id: &SessionId) -> Option<()> {
        let group = self.groups.get_mut(group_id)?;
        if !group.contains(session_id) {
            return None;
        }
        group.active_session_id = session_id.clone();
        Some(())
    }
}

/// Owner of the terminal session registry.
pub struct SessionGroupManager<B: SessionBackend> {
    backend: Arc<B>,
    state: SnapshotCell<SessionGroupState>,
    persistence: Option<Persistence>,
    settings: SessionSettings,
    split_ratio: u8,
    panel_flights: SingleFlight<PanelTabId, EngineResult<GroupId>>,
    editor_flights: SingleFlight<String, EngineResult<SessionId>>,
    recreate_flights: SingleFlight<SessionId, EngineResult<SessionId>>,
}

impl<B: SessionBackend> SessionGroupManager<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: SnapshotCell::default(),
            persistence: None,
            settings: SessionSettings::default(),
            split_ratio: DEFAULT_SPLIT_RATIO,
            panel_flights: SingleFlight::new(),
            editor_flights: SingleFlight::new(),
            recreate_flights: SingleFlight::new(),
        }
    }

    pub fn with_config(mut self, config: &WorkspaceConfig) -> Self {
        self.settings = config.sessions.clone();
        self.split_ratio = crate::utils::clamp_ratio(config.layout.default_split_ratio);
        self
    }

    /// Attach a store and restore whatever it holds.
    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        let restored = decode_session_state(persistence.load().as_ref());
        log::info!(
            "Restored {} session group(s) from '{}'",
            restored.groups.len(),
            persistence.key()
        );
        self.state.replace(restored);
        self.persistence = Some(persistence);
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn snapshot(&self) -> Arc<SessionGroupState> {
        self.state.snapshot()
    }

    fn commit<R>(
        &self,
        operation: impl FnOnce(&mut SessionGroupState) -> Option<R>,
    ) -> EngineResult<Option<R>> {
        self.state.commit_with(|draft| {
            let Some(outcome) = operation(draft) else {
                return Ok(None);
            };
            if let Some(persistence) = &self.persistence {
                persistence.save(&encode_session_state(draft))?;
            }
            Ok(Some(outcome))
        })
    }

    async fn spawn(&self, template: SessionTemplate) -> EngineResult<SessionId> {
        let request = SpawnRequest {
            session_id: SessionId::generate(),
            template,
            cols: self.settings.cols,
            rows: self.settings.rows,
        };
        self.backend.create(&request).await.map_err(|e| {
            log::error!("Failed to spawn session: {:#}", e);
            EngineError::external(format!("Failed to spawn session: {:#}", e))
        })?;
        log::info!("Spawned session {}", request.session_id);
        Ok(request.session_id)
    }

    /// Best-effort kill; the session may already be gone.
    async fn teardown(&self, sessions: Vec<SessionId>) {
        for session in sessions {
            match self.backend.kill(&session).await {
                Ok(()) => log::debug!("Killed session {}", session),
                Err(e) => log::warn!("Ignoring teardown failure for session {}: {:#}", session, e),
            }
        }
    }

    fn has_live_session(&self, group: &SessionGroup) -> bool {
        group.session_ids.iter().any(|s| self.backend.is_live(s))
    }

    /// Template for a new session in `group_id`: copied from the active
    /// session when it is live, else from the first live one.
    fn template_for_group(&self, group_id: &GroupId) -> Option<SessionTemplate> {
        let snapshot = self.snapshot();
        let group = snapshot.group(group_id)?;
        Some(self.inherited_template(&snapshot, group))
    }

    fn inherited_template(&self, state: &SessionGroupState, group: &SessionGroup) -> SessionTemplate {
        let source = Some(&group.active_session_id)
            .filter(|s| self.backend.is_live(s))
            .or_else(|| group.session_ids.iter().find(|s| self.backend.is_live(s)))
            .unwrap_or(&group.active_session_id);
        state
            .templates
            .get(source)
            .cloned()
            .unwrap_or_else(|| self.settings.template())
    }

    /// Make sure a panel tab has a group with at least one live session.
    /// Concurrent calls for the same tab share one in-flight creation.
    pub async fn ensure_group_for_panel_tab(&self, tab_id: &PanelTabId) -> EngineResult<GroupId> {
        self.ensure_group_for_panel_tab_with(tab_id, None).await
    }

    /// Like [`ensure_group_for_panel_tab`](Self::ensure_group_for_panel_tab),
    /// spawning with `template` when a session has to be created. Without
    /// one, a dead group's template is reused, then the configured default.
    pub async fn ensure_group_for_panel_tab_with(
        &self,
        tab_id: &PanelTabId,
        template: Option<SessionTemplate>,
    ) -> EngineResult<GroupId> {
        self.panel_flights
            .run(tab_id.clone(), || self.ensure_group_once(tab_id.clone(), template))
            .await
    }

    async fn ensure_group_once(
        &self,
        tab_id: PanelTabId,
        template: Option<SessionTemplate>,
    ) -> EngineResult<GroupId> {
        let snapshot = self.snapshot();
        let inherited = match snapshot.group_for_panel_tab(&tab_id) {
            Some(group) if self.has_live_session(group) => return Ok(group.id.clone()),
            Some(group) => {
                log::info!("Group {} for tab {} has no live session", group.id, tab_id);
                Some(self.inherited_template(&snapshot, group))
            }
            None => None,
        };
        drop(snapshot);

        let template = template
            .or(inherited)
            .unwrap_or_else(|| self.settings.template());
        let session_id = self.spawn(template.clone()).await?;
        let group_id = GroupId::generate();
        let committed = self.commit(|state| {
            Some(state.install_group(&tab_id, group_id.clone(), session_id.clone(), template))
        });
        match committed {
            Ok(displaced) => {
                self.teardown(displaced.unwrap_or_default()).await;
                log::info!("Created group {} for panel tab {}", group_id, tab_id);
                Ok(group_id)
            }
            Err(e) => {
                self.teardown(vec![session_id]).await;
                Err(e)
            }
        }
    }

    /// Editor analogue of [`ensure_group_for_panel_tab`](Self::ensure_group_for_panel_tab).
    pub async fn ensure_session_for_editor_path(&self, path: &str) -> EngineResult<SessionId> {
        self.ensure_session_for_editor_path_with(path, None).await
    }

    pub async fn ensure_session_for_editor_path_with(
        &self,
        path: &str,
        template: Option<SessionTemplate>,
    ) -> EngineResult<SessionId> {
        self.editor_flights
            .run(path.to_string(), || self.ensure_editor_session_once(path, template))
            .await
    }

    async fn ensure_editor_session_once(
        &self,
        path: &str,
        template: Option<SessionTemplate>,
    ) -> EngineResult<SessionId> {
        let snapshot = self.snapshot();
        let previous = snapshot.editor_sessions.get(path).cloned();
        if let Some(session) = previous.as_ref().filter(|s| self.backend.is_live(s)) {
            return Ok(session.clone());
        }
        let template = template
            .or_else(|| previous.as_ref().and_then(|s| snapshot.templates.get(s).cloned()))
            .unwrap_or_else(|| self.settings.template());
        drop(snapshot);

        let session_id = self.spawn(template.clone()).await?;
        match self.commit(|state| Some(state.bind_editor_path(path, session_id.clone(), template))) {
            Ok(displaced) => {
                self.teardown(displaced.unwrap_or_default()).await;
                Ok(session_id)
            }
            Err(e) => {
                self.teardown(vec![session_id]).await;
                Err(e)
            }
        }
    }

    pub async fn create_session_in_group(&self, group_id: &GroupId) -> EngineResult<Option<SessionId>> {
        self.add_session_to_group(group_id, None).await
    }

    pub async fn split_session_in_group(
        &self,
        group_id: &GroupId,
        session_id: &SessionId,
        direction: SplitDirection,
    ) -> EngineResult<Option<SessionId>> {
        let splittable = self
            .snapshot()
            .group(group_id)
            .is_some_and(|group| group.layout.contains(session_id));
        if !splittable {
            return Ok(None);
        }
        self.add_session_to_group(group_id, Some((session_id, direction)))
            .await
    }

    async fn add_session_to_group(
        &self,
        group_id: &GroupId,
        split: Option<(&SessionId, SplitDirection)>,
    ) -> EngineResult<Option<SessionId>> {
        let Some(template) = self.template_for_group(group_id) else {
            return Ok(None);
        };
        let session_id = self.spawn(template.clone()).await?;
        let ratio = self.split_ratio;
        let committed = self.commit(|state| {
            state.add_session(group_id, session_id.clone(), template, split, ratio)
        });
        match committed {
            Ok(Some(())) => Ok(Some(session_id)),
            Ok(None) => {
                log::info!("Group {} changed while spawning, discarding session", group_id);
                self.teardown(vec![session_id]).await;
                Ok(None)
            }
            Err(e) => {
                self.teardown(vec![session_id]).await;
                Err(e)
            }
        }
    }

    /// Merge `source_tab`'s group into `target_tab`'s. Returns `false` when
    /// nothing happened (unknown source, or a group merged into itself).
    pub async fn merge_group_tabs(
        &self,
        source_tab: &PanelTabId,
        target_tab: &PanelTabId,
    ) -> EngineResult<bool> {
        let live: HashSet<SessionId> = match self.snapshot().group_for_panel_tab(source_tab) {
            Some(source) => source
                .session_ids
                .iter()
                .filter(|s| self.backend.is_live(s))
                .cloned()
                .collect(),
            None => return Ok(false),
        };
        let ratio = self.split_ratio;
        let merged = self.commit(|state| state.merge_panel_tabs(source_tab, target_tab, &live, ratio))?;
        Ok(merged.is_some())
    }

    /// Drop a panel tab's group and kill the sessions nothing else uses.
    /// Bookkeeping completes even when a kill fails.
    pub async fn detach_panel_tab(&self, tab_id: &PanelTabId) -> EngineResult<Vec<SessionId>> {
        let orphaned = self
            .commit(|state| state.detach_panel_tab(tab_id))?
            .unwrap_or_default();
        self.teardown(orphaned.clone()).await;
        Ok(orphaned)
    }

    pub async fn detach_editor_path(&self, path: &str) -> EngineResult<Vec<SessionId>> {
        let orphaned = self
            .commit(|state| state.detach_editor_path(path))?
            .unwrap_or_default();
        self.teardown(orphaned.clone()).await;
        Ok(orphaned)
    }

    /// The transport reported that a session exited.
    pub fn handle_session_exit(&self, session_id: &SessionId) -> EngineResult<Option<SessionExit>> {
        let exit = self.commit(|state| state.remove_session(session_id))?;
        if let Some(exit) = &exit {
            log::info!(
                "Session {} exited (group removed: {})",
                session_id,
                exit.group_removed
            );
        }
        Ok(exit)
    }

    pub async fn kill_session(&self, session_id: &SessionId) -> EngineResult<Option<SessionExit>> {
        let exit = self.commit(|state| state.remove_session(session_id))?;
        self.teardown(vec![session_id.clone()]).await;
        Ok(exit)
    }

    /// Write to a session. A session that has exited is recreated with the
    /// same template, every association is moved to the new id and the write
    /// is retried once. Returns the id that received the data.
    pub async fn write_to_session(&self, session_id: &SessionId, data: &str) -> EngineResult<SessionId> {
        let error = match self.backend.write(session_id, data).await {
            Ok(()) => return Ok(session_id.clone()),
            Err(e) => e,
        };
        if self.backend.is_live(session_id) {
            return Err(EngineError::external(format!(
                "Write to session {} failed: {:#}",
                session_id, error
            )));
        }
        log::info!("Session {} has exited, recreating it for a write", session_id);
        let replacement = self
            .recreate_flights
            .run(session_id.clone(), || self.recreate_session(session_id.clone()))
            .await?;
        self.backend.write(&replacement, data).await.map_err(|e| {
            EngineError::external(format!("Write to session {} failed: {:#}", replacement, e))
        })?;
        Ok(replacement)
    }

    async fn recreate_session(&self, session_id: SessionId) -> EngineResult<SessionId> {
        let template = {
            let snapshot = self.snapshot();
            if !snapshot.is_referenced(&session_id) {
                return Err(EngineError::external(format!("Unknown session {}", session_id)));
            }
            snapshot
                .templates
                .get(&session_id)
                .cloned()
                .unwrap_or_else(|| self.settings.template())
        };
        let replacement = self.spawn(template.clone()).await?;
        let committed =
            self.commit(|state| state.replace_session(&session_id, replacement.clone(), template));
        match committed {
            Ok(Some(())) => Ok(replacement),
            Ok(None) => {
                self.teardown(vec![replacement]).await;
                Err(EngineError::external(format!("Session {} is no longer tracked", session_id)))
            }
            Err(e) => {
                self.teardown(vec![replacement]).await;
                Err(e)
            }
        }
    }

    /// Best-effort resize; `false` when the transport refused.
    pub async fn resize_session(&self, session_id: &SessionId, cols: u16, rows: u16) -> bool {
        match self.backend.resize(session_id, cols, rows).await {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Resize of session {} failed: {:#}", session_id, e);
                false
            }
        }
    }

    pub fn focus_session(&self, group_id: &GroupId, session_id: &SessionId) -> EngineResult<bool> {
        Ok(self
            .commit(|state| state.focus_session(group_id, session_id))?
            .is_some())
    }

    pub fn adjacent_session(
        &self,
        group_id: &GroupId,
        session_id: &SessionId,
        direction: FocusDirection,
    ) -> Option<SessionId> {
        self.snapshot()
            .group(group_id)?
            .layout
            .adjacent_leaf(session_id, direction)
            .cloned()
    }

    pub fn group_for_panel_tab(&self, tab_id: &PanelTabId) -> Option<GroupId> {
        self.snapshot().panel_tabs.get(tab_id).cloned()
    }

    pub fn group_for_session(&self, session_id: &SessionId) -> Option<GroupId> {
        self.snapshot().group_for_session(session_id).cloned()
    }

    pub fn session_for_editor_path(&self, path: &str) -> Option<SessionId> {
        self.snapshot().editor_sessions.get(path).cloned()
    }

    pub fn live_sessions(&self, group_id: &GroupId) -> Vec<SessionId> {
        self.snapshot()
            .group(group_id)
            .map(|group| {
                group
                    .session_ids
                    .iter()
                    .filter(|s| self.backend.is_live(s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
