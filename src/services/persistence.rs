//! # Persistence Module
//!
//! Keyed snapshot storage plus the codecs that turn registry state into a
//! versioned JSON snapshot and back.
//!
//! Loading is fail-soft: malformed entries are skipped, the stored
//! session→group reverse index is ignored and rebuilt from the group list, and
//! anything no longer reachable from a layout leaf or an association is
//! pruned. Schema precedence is current → legacy → empty.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::errors::{EngineError, EngineResult};
use crate::models::{
    ClosedTab, GroupId, LayoutTree, Pane, PaneId, PanelTabId, SessionGroup, SessionId,
    SessionTemplate, Tab, TabId, RECENTLY_CLOSED_CAPACITY,
};
use crate::services::pane_manager::PaneLayoutState;
use crate::services::session_groups::SessionGroupState;

pub const PANE_SNAPSHOT_VERSION: u64 = 1;
/// Version 1 was the flat tab→session map handled by the legacy path.
pub const SESSION_SNAPSHOT_VERSION: u64 = 2;

/// Keyed durable storage for snapshots.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Value>>;
    fn save(&self, key: &str, snapshot: &Value) -> Result<()>;
}

/// In-process store, used by hosts without durable storage and by tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: &str, snapshot: Value) -> Self {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), snapshot);
        self
    }

    /// Make every subsequent save fail, simulating a full or read-only disk.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, snapshot: &Value) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(anyhow!("store rejected write for '{}'", key));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), snapshot.clone());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
pub struct JsonFileStore {
    directory: PathBuf,
}

impl JsonFileStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(anyhow!("invalid snapshot key '{}'", key));
        }
        Ok(self.directory.join(format!("{}.json", key)))
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;
        Ok(Some(value))
    }

    fn save(&self, key: &str, snapshot: &Value) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.directory).with_context(|| {
            format!("Failed to create snapshot directory {}", self.directory.display())
        })?;
        let staging = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(snapshot)?;
        fs::write(&staging, content)
            .with_context(|| format!("Failed to write snapshot {}", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("Failed to replace snapshot {}", path.display()))?;
        Ok(())
    }
}

/// A store bound to the key one registry persists under.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn SnapshotStore>,
    key: String,
}

impl Persistence {
    pub fn new(store: Arc<dyn SnapshotStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the raw snapshot. Unreadable storage counts as "nothing saved".
    pub fn load(&self) -> Option<Value> {
        match self.store.load(&self.key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Could not load snapshot '{}': {:#}", self.key, e);
                None
            }
        }
    }

    pub fn save(&self, snapshot: &Value) -> EngineResult<()> {
        self.store.save(&self.key, snapshot).map_err(|e| {
            log::error!("Failed to persist snapshot '{}': {:#}", self.key, e);
            EngineError::persistence(format!("{:#}", e))
        })
    }
}

// --- Editor panes ---------------------------------------------------------

pub fn encode_pane_state(state: &PaneLayoutState) -> Value {
    let order = state.layout.as_ref().map(|l| l.leaves()).unwrap_or_default();
    let panes: Vec<&Pane> = order.iter().filter_map(|id| state.panes.get(id)).collect();
    json!({
        "version": PANE_SNAPSHOT_VERSION,
        "saved_at": Utc::now().to_rfc3339(),
        "layout": state.layout,
        "panes": panes,
        "active_pane_id": state.active_pane_id,
    })
}

#[derive(Deserialize)]
struct RawPane {
    id: PaneId,
    tabs: Vec<Value>,
    #[serde(default)]
    active_tab_id: Option<TabId>,
    #[serde(default)]
    recently_closed: Vec<Value>,
}

pub fn decode_pane_state(snapshot: Option<&Value>) -> PaneLayoutState {
    let Some(snapshot) = snapshot else {
        return PaneLayoutState::default();
    };
    match decode_current_panes(snapshot) {
        Some(state) => state,
        None => {
            log::warn!("Pane snapshot has an unknown shape, starting empty");
            PaneLayoutState::default()
        }
    }
}

fn decode_current_panes(snapshot: &Value) -> Option<PaneLayoutState> {
    let object = snapshot.as_object()?;
    let version = object.get("version")?.as_u64()?;
    if version > PANE_SNAPSHOT_VERSION {
        log::warn!("Pane snapshot version {} is newer than supported", version);
    }
    let entries = object.get("panes")?.as_array()?;
    let layout = object
        .get("layout")
        .and_then(|raw| serde_json::from_value::<LayoutTree<PaneId>>(raw.clone()).ok());
    let in_layout: HashSet<PaneId> = layout
        .as_ref()
        .map(|l| l.leaves().into_iter().collect())
        .unwrap_or_default();

    // Tab ids are claimed only by panes that can survive pruning.
    let mut panes: HashMap<PaneId, Pane> = HashMap::new();
    let mut seen_tabs: HashSet<TabId> = HashSet::new();
    for entry in entries {
        let Some(id) = entry_id::<PaneId>(entry) else {
            log::warn!("Skipping pane entry without an id");
            continue;
        };
        if !in_layout.contains(&id) {
            log::info!("Skipping pane {} missing from the layout", id);
            continue;
        }
        if panes.contains_key(&id) {
            log::warn!("Skipping duplicate pane {}", id);
            continue;
        }
        if let Some(pane) = decode_pane(entry, &mut seen_tabs) {
            panes.insert(pane.id.clone(), pane);
        }
    }

    let mut placed: HashSet<PaneId> = HashSet::new();
    let layout = layout.and_then(|layout| {
        layout.retain(&mut |id| panes.contains_key(id) && placed.insert(id.clone()))
    });

    let before = panes.len();
    panes.retain(|id, _| placed.contains(id));
    if panes.len() < before {
        log::info!("Pruned {} pane(s) missing from the layout", before - panes.len());
    }

    let active_pane_id = object
        .get("active_pane_id")
        .and_then(|raw| serde_json::from_value::<PaneId>(raw.clone()).ok())
        .filter(|id| panes.contains_key(id))
        .or_else(|| layout.as_ref().map(|l| l.first_leaf().clone()));

    Some(PaneLayoutState {
        layout,
        panes,
        active_pane_id,
    })
}

fn decode_pane(entry: &Value, seen_tabs: &mut HashSet<TabId>) -> Option<Pane> {
    let raw: RawPane = match serde_json::from_value(entry.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!("Skipping malformed pane entry: {}", e);
            return None;
        }
    };

    let mut resources = HashSet::new();
    let mut tabs: Vec<Tab> = Vec::new();
    for value in raw.tabs {
        let tab = match serde_json::from_value::<Tab>(value) {
            Ok(tab) => tab,
            Err(e) => {
                log::warn!("Skipping malformed tab in pane {}: {}", raw.id, e);
                continue;
            }
        };
        if seen_tabs.contains(&tab.id) || resources.contains(&tab.resource) {
            log::warn!("Skipping duplicate tab {} in pane {}", tab.id, raw.id);
            continue;
        }
        seen_tabs.insert(tab.id.clone());
        resources.insert(tab.resource.clone());
        tabs.push(tab);
    }
    let first = tabs.first()?.id.clone();

    let mut recently_closed: Vec<ClosedTab> = raw
        .recently_closed
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();
    let overflow = recently_closed.len().saturating_sub(RECENTLY_CLOSED_CAPACITY);
    recently_closed.drain(..overflow);

    let mut pane = Pane {
        id: raw.id,
        active_tab_id: first,
        tabs,
        recently_closed: recently_closed.into(),
    };
    if let Some(active) = raw.active_tab_id.filter(|id| pane.tab(id).is_some()) {
        pane.active_tab_id = active;
    }
    pane.normalize_pins();
    Some(pane)
}

// --- Terminal session groups ---------------------------------------------

pub fn encode_session_state(state: &SessionGroupState) -> Value {
    let mut groups: Vec<&SessionGroup> = state.groups.values().collect();
    groups.sort_by(|a, b| a.id.cmp(&b.id));
    json!({
        "version": SESSION_SNAPSHOT_VERSION,
        "saved_at": Utc::now().to_rfc3339(),
        "groups": groups,
        "panel_tabs": state.panel_tabs,
        "editor_sessions": state.editor_sessions,
        "templates": state.templates,
        // Written for external readers only; never read back.
        "session_groups": state.session_index(),
    })
}

#[derive(Deserialize)]
struct RawGroup {
    id: GroupId,
    session_ids: Vec<Value>,
    #[serde(default)]
    layout: Option<Value>,
    #[serde(default)]
    active_session_id: Option<SessionId>,
}

pub fn decode_session_state(snapshot: Option<&Value>) -> SessionGroupState {
    let Some(snapshot) = snapshot else {
        return SessionGroupState::default();
    };
    if let Some(state) = decode_current_sessions(snapshot) {
        return state;
    }
    if let Some(state) = migrate_legacy_sessions(snapshot) {
        log::info!(
            "Migrated legacy session map into {} group(s)",
            state.groups.len()
        );
        return state;
    }
    log::warn!("Session snapshot has an unknown shape, starting empty");
    SessionGroupState::default()
}

fn decode_current_sessions(snapshot: &Value) -> Option<SessionGroupState> {
    let object = snapshot.as_object()?;
    let version = object.get("version")?.as_u64()?;
    if version > SESSION_SNAPSHOT_VERSION {
        log::warn!("Session snapshot version {} is newer than supported", version);
    }
    let entries = object.get("groups")?.as_array()?;
    let panel_tabs = string_map(object.get("panel_tabs"));
    let referenced: HashSet<GroupId> = panel_tabs
        .iter()
        .map(|(_, group)| GroupId::from(group.as_str()))
        .collect();

    // Sessions are claimed only by groups some panel tab still points at.
    let mut state = SessionGroupState::default();
    let mut claimed: HashSet<SessionId> = HashSet::new();
    for entry in entries {
        let Some(id) = entry_id::<GroupId>(entry) else {
            log::warn!("Skipping group entry without an id");
            continue;
        };
        if !referenced.contains(&id) {
            log::info!("Skipping orphaned group {}", id);
            continue;
        }
        if state.groups.contains_key(&id) {
            log::warn!("Skipping duplicate group {}", id);
            continue;
        }
        if let Some(group) = decode_group(entry, &mut claimed) {
            state.groups.insert(group.id.clone(), group);
        }
    }

    for (tab, group) in panel_tabs {
        let group = GroupId::from(group);
        if state.groups.contains_key(&group) {
            state.panel_tabs.insert(PanelTabId::from(tab), group);
        }
    }
    for (path, session) in string_map(object.get("editor_sessions")) {
        state.editor_sessions.insert(path, SessionId::from(session));
    }
    if let Some(Value::Object(templates)) = object.get("templates") {
        for (session, raw) in templates {
            if let Ok(template) = serde_json::from_value::<SessionTemplate>(raw.clone()) {
                state.templates.insert(SessionId::from(session.as_str()), template);
            }
        }
    }

    prune_orphans(&mut state);
    Some(state)
}

fn decode_group(entry: &Value, claimed: &mut HashSet<SessionId>) -> Option<SessionGroup> {
    let raw: RawGroup = match serde_json::from_value(entry.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!("Skipping malformed group entry: {}", e);
            return None;
        }
    };

    let members: Vec<SessionId> = raw
        .session_ids
        .iter()
        .filter_map(Value::as_str)
        .map(SessionId::from)
        .filter(|id| claimed.insert(id.clone()))
        .collect();
    if members.is_empty() {
        log::warn!("Skipping group {} without sessions", raw.id);
        return None;
    }

    let active_session_id = raw
        .active_session_id
        .filter(|id| members.contains(id))
        .unwrap_or_else(|| members[0].clone());

    let mut placed: HashSet<SessionId> = HashSet::new();
    let layout = raw
        .layout
        .and_then(|value| serde_json::from_value::<LayoutTree<SessionId>>(value).ok())
        .and_then(|layout| {
            layout.retain(&mut |id| members.contains(id) && placed.insert(id.clone()))
        })
        .unwrap_or_else(|| LayoutTree::leaf(active_session_id.clone()));

    Some(SessionGroup {
        id: raw.id,
        layout,
        active_session_id,
        session_ids: members,
    })
}

fn migrate_legacy_sessions(snapshot: &Value) -> Option<SessionGroupState> {
    let object = snapshot.as_object()?;
    let legacy = object
        .get("tab_sessions")
        .or_else(|| object.get("tabSessions"))?
        .as_object()?;

    let mut state = SessionGroupState::default();
    let mut claimed: HashSet<SessionId> = HashSet::new();
    for (tab, session) in legacy {
        let Some(session) = session.as_str().map(SessionId::from) else {
            log::warn!("Skipping legacy entry for tab {} without a session", tab);
            continue;
        };
        if !claimed.insert(session.clone()) {
            continue;
        }
        let group = SessionGroup::single(GroupId::generate(), session);
        state
            .panel_tabs
            .insert(PanelTabId::from(tab.as_str()), group.id.clone());
        state.groups.insert(group.id.clone(), group);
    }
    let editor = object
        .get("editor_sessions")
        .or_else(|| object.get("editorSessions"));
    for (path, session) in string_map(editor) {
        state.editor_sessions.insert(path, SessionId::from(session));
    }

    prune_orphans(&mut state);
    Some(state)
}

/// Drop groups no panel tab points at and templates no session uses, then
/// rebuild the reverse index from the surviving groups.
fn prune_orphans(state: &mut SessionGroupState) {
    let referenced: HashSet<GroupId> = state.panel_tabs.values().cloned().collect();
    let before = state.groups.len();
    state.groups.retain(|id, _| referenced.contains(id));
    if state.groups.len() < before {
        log::info!("Pruned {} orphaned group(s)", before - state.groups.len());
    }

    let mut live: HashSet<&SessionId> = state.editor_sessions.values().collect();
    for group in state.groups.values() {
        live.extend(group.session_ids.iter());
    }
    let live: HashSet<SessionId> = live.into_iter().cloned().collect();
    state.templates.retain(|id, _| live.contains(id));

    state.rebuild_index();
}

fn entry_id<T: DeserializeOwned>(entry: &Value) -> Option<T> {
    serde_json::from_value(entry.get("id")?.clone()).ok()
}

fn string_map(value: Option<&Value>) -> Vec<(String, String)> {
    let Some(Value::Object(map)) = value else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
        .collect()
}
