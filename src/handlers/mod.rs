use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};
use crate::models::*;
use crate::services::{
    ClosedTabOutcome, OpenedTab, PaneManager, SessionBackend, SessionExit, SessionGroupManager,
};

/// One UI event, addressed to either registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WorkspaceCommand {
    // --- Editor panes ---
    OpenTab {
        resource: String,
        #[serde(default)]
        pane_id: Option<PaneId>,
    },
    CloseTab {
        pane_id: PaneId,
        tab_id: TabId,
    },
    ClosePane {
        pane_id: PaneId,
    },
    SplitPane {
        pane_id: PaneId,
        direction: SplitDirection,
    },
    SplitPaneWithTab {
        target: PaneId,
        direction: SplitDirection,
        position: SplitPosition,
        from: PaneId,
        tab_id: TabId,
    },
    PinTab {
        pane_id: PaneId,
        tab_id: TabId,
    },
    UnpinTab {
        pane_id: PaneId,
        tab_id: TabId,
    },
    ReorderTab {
        pane_id: PaneId,
        tab_id: TabId,
        to_index: usize,
    },
    MoveTabToPane {
        from: PaneId,
        tab_id: TabId,
        to: PaneId,
    },
    ActivateTab {
        pane_id: PaneId,
        tab_id: TabId,
    },
    FocusPane {
        pane_id: PaneId,
    },
    ReopenClosedTab {
        pane_id: PaneId,
    },
    RenameResource {
        old: String,
        new: String,
    },
    CloseResource {
        resource: String,
    },
    AdjacentPane {
        pane_id: PaneId,
        direction: FocusDirection,
    },
    // --- Terminal session groups ---
    EnsurePanelGroup {
        tab_id: PanelTabId,
        #[serde(default)]
        template: Option<SessionTemplate>,
    },
    CreateSession {
        group_id: GroupId,
    },
    SplitSession {
        group_id: GroupId,
        session_id: SessionId,
        direction: SplitDirection,
    },
    MergePanelTabs {
        source: PanelTabId,
        target: PanelTabId,
    },
    DetachPanelTab {
        tab_id: PanelTabId,
    },
    EnsureEditorSession {
        path: String,
        #[serde(default)]
        template: Option<SessionTemplate>,
    },
    DetachEditorPath {
        path: String,
    },
    FocusSession {
        group_id: GroupId,
        session_id: SessionId,
    },
    SessionExited {
        session_id: SessionId,
    },
    KillSession {
        session_id: SessionId,
    },
    WriteSession {
        session_id: SessionId,
        data: String,
    },
    ResizeSession {
        session_id: SessionId,
        cols: u16,
        rows: u16,
    },
    // --- Queries ---
    Locate {
        resource: ResourceRef,
    },
}

/// Where a resource currently lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "owner", rename_all = "snake_case")]
pub enum Owner {
    Pane { pane_id: PaneId, tab_id: TabId },
    Group { group_id: GroupId },
    EditorPath { path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "value", rename_all = "snake_case")]
pub enum CommandReply {
    /// The target was missing or the transition was rejected.
    Unchanged,
    Done,
    OpenedTab(OpenedTab),
    ClosedTab(ClosedTabOutcome),
    Pane(PaneId),
    Tab(TabId),
    Group(GroupId),
    Session(SessionId),
    Sessions(Vec<SessionId>),
    SessionExit(SessionExit),
    Count(usize),
    Owner(Owner),
}

impl CommandReply {
    fn from_flag(changed: bool) -> Self {
        if changed {
            CommandReply::Done
        } else {
            CommandReply::Unchanged
        }
    }

    fn from_option<T>(value: Option<T>, wrap: impl FnOnce(T) -> Self) -> Self {
        value.map(wrap).unwrap_or(CommandReply::Unchanged)
    }
}

pub type CommandResult<T> = EngineResult<T>;

fn require(value: &str, what: &str) -> CommandResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(format!("{} cannot be empty", what)));
    }
    Ok(())
}

/// Routes UI commands to the pane and session registries it owns.
pub struct WorkspaceHandler<B: SessionBackend> {
    panes: PaneManager,
    sessions: SessionGroupManager<B>,
}

impl<B: SessionBackend> WorkspaceHandler<B> {
    pub fn new(panes: PaneManager, sessions: SessionGroupManager<B>) -> Self {
        Self { panes, sessions }
    }

    pub fn panes(&self) -> &PaneManager {
        &self.panes
    }

    pub fn sessions(&self) -> &SessionGroupManager<B> {
        &self.sessions
    }

    pub async fn dispatch(&self, command: WorkspaceCommand) -> CommandResult<CommandReply> {
        log::debug!("Dispatching {:?}", command);
        use WorkspaceCommand::*;
        let reply = match command {
            OpenTab { resource, pane_id } => {
                require(&resource, "Resource")?;
                CommandReply::from_option(
                    self.panes.open_tab(&resource, pane_id.as_ref())?,
                    CommandReply::OpenedTab,
                )
            }
            CloseTab { pane_id, tab_id } => CommandReply::from_option(
                self.panes.close_tab(&pane_id, &tab_id)?,
                CommandReply::ClosedTab,
            ),
            ClosePane { pane_id } => CommandReply::from_flag(self.panes.close_pane(&pane_id)?),
            SplitPane { pane_id, direction } => CommandReply::from_option(
                self.panes.split_pane(&pane_id, direction)?,
                CommandReply::Pane,
            ),
            SplitPaneWithTab {
                target,
                direction,
                position,
                from,
                tab_id,
            } => CommandReply::from_option(
                self.panes
                    .split_pane_with_tab(&target, direction, position, &from, &tab_id)?,
                CommandReply::Pane,
            ),
            PinTab { pane_id, tab_id } => {
                CommandReply::from_flag(self.panes.pin_tab(&pane_id, &tab_id)?)
            }
            UnpinTab { pane_id, tab_id } => {
                CommandReply::from_flag(self.panes.unpin_tab(&pane_id, &tab_id)?)
            }
            ReorderTab {
                pane_id,
                tab_id,
                to_index,
            } => CommandReply::from_flag(self.panes.reorder_tab(&pane_id, &tab_id, to_index)?),
            MoveTabToPane { from, tab_id, to } => CommandReply::from_option(
                self.panes.move_tab_to_pane(&from, &tab_id, &to)?,
                CommandReply::Tab,
            ),
            ActivateTab { pane_id, tab_id } => {
                CommandReply::from_flag(self.panes.activate_tab(&pane_id, &tab_id)?)
            }
            FocusPane { pane_id } => CommandReply::from_flag(self.panes.focus_pane(&pane_id)?),
            ReopenClosedTab { pane_id } => CommandReply::from_option(
                self.panes.reopen_closed_tab(&pane_id)?,
                CommandReply::OpenedTab,
            ),
            RenameResource { old, new } => {
                require(&new, "Resource")?;
                CommandReply::Count(self.panes.retarget_resource(&old, &new)?)
            }
            CloseResource { resource } => {
                CommandReply::Count(self.panes.close_resource(&resource)?)
            }
            AdjacentPane { pane_id, direction } => CommandReply::from_option(
                self.panes.adjacent_pane(&pane_id, direction),
                CommandReply::Pane,
            ),
            EnsurePanelGroup { tab_id, template } => {
                require(tab_id.as_str(), "Panel tab id")?;
                CommandReply::Group(
                    self.sessions
                        .ensure_group_for_panel_tab_with(&tab_id, template)
                        .await?,
                )
            }
            CreateSession { group_id } => CommandReply::from_option(
                self.sessions.create_session_in_group(&group_id).await?,
                CommandReply::Session,
            ),
            SplitSession {
                group_id,
                session_id,
                direction,
            } => CommandReply::from_option(
                self.sessions
                    .split_session_in_group(&group_id, &session_id, direction)
                    .await?,
                CommandReply::Session,
            ),
            MergePanelTabs { source, target } => {
                CommandReply::from_flag(self.sessions.merge_group_tabs(&source, &target).await?)
            }
            DetachPanelTab { tab_id } => {
                CommandReply::Sessions(self.sessions.detach_panel_tab(&tab_id).await?)
            }
            EnsureEditorSession { path, template } => {
                require(&path, "Editor path")?;
                CommandReply::Session(
                    self.sessions
                        .ensure_session_for_editor_path_with(&path, template)
                        .await?,
                )
            }
            DetachEditorPath { path } => {
                CommandReply::Sessions(self.sessions.detach_editor_path(&path).await?)
            }
            FocusSession {
                group_id,
                session_id,
            } => CommandReply::from_flag(self.sessions.focus_session(&group_id, &session_id)?),
            SessionExited { session_id } => CommandReply::from_option(
                self.sessions.handle_session_exit(&session_id)?,
                CommandReply::SessionExit,
            ),
            KillSession { session_id } => CommandReply::from_option(
                self.sessions.kill_session(&session_id).await?,
                CommandReply::SessionExit,
            ),
            WriteSession { session_id, data } => {
                CommandReply::Session(self.sessions.write_to_session(&session_id, &data).await?)
            }
            ResizeSession {
                session_id,
                cols,
                rows,
            } => CommandReply::from_flag(
                self.sessions.resize_session(&session_id, cols, rows).await,
            ),
            Locate { resource } => {
                CommandReply::from_option(self.locate(&resource), CommandReply::Owner)
            }
        };
        Ok(reply)
    }

    /// Find the pane or group that currently owns a resource.
    pub fn locate(&self, resource: &ResourceRef) -> Option<Owner> {
        match resource {
            ResourceRef::Note(path) => {
                let snapshot = self.panes.snapshot();
                let pane_id = snapshot.panes_with_resource(path).into_iter().next()?;
                let tab_id = snapshot.pane(&pane_id)?.tab_for_resource(path)?.id.clone();
                Some(Owner::Pane { pane_id, tab_id })
            }
            ResourceRef::Session(session_id) => {
                if let Some(group_id) = self.sessions.group_for_session(session_id) {
                    return Some(Owner::Group { group_id });
                }
                self.sessions
                    .snapshot()
                    .editor_sessions
                    .iter()
                    .find(|(_, s)| *s == session_id)
                    .map(|(path, _)| Owner::EditorPath { path: path.clone() })
            }
        }
    }
}
