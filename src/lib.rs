// Modules
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use config::{load_config, WorkspaceConfig};
pub use errors::{EngineError, EngineResult};
pub use handlers::{CommandReply, Owner, WorkspaceCommand, WorkspaceHandler};
pub use services::{
    JsonFileStore, PaneManager, Persistence, SessionBackend, SessionGroupManager, SnapshotStore,
};

/// Install the process-wide logger. Later calls are ignored.
pub fn init_logging(level: log::LevelFilter) {
    if env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init()
        .is_err()
    {
        log::debug!("Logger already initialized");
    }
}

/// Build both registries from `config`, restoring them from disk when
/// persistence is enabled.
pub fn open_workspace<B: SessionBackend>(
    config: &WorkspaceConfig,
    backend: Arc<B>,
) -> WorkspaceHandler<B> {
    let store: Option<Arc<dyn SnapshotStore>> = if config.persistence.enabled {
        log::info!(
            "Persisting workspace under {}",
            config.persistence.directory.display()
        );
        Some(Arc::new(JsonFileStore::new(config.persistence.directory.clone())))
    } else {
        log::info!("Workspace persistence disabled");
        None
    };
    open_workspace_with_store(config, backend, store)
}

/// Like [`open_workspace`] but with a caller-supplied store.
pub fn open_workspace_with_store<B: SessionBackend>(
    config: &WorkspaceConfig,
    backend: Arc<B>,
    store: Option<Arc<dyn SnapshotStore>>,
) -> WorkspaceHandler<B> {
    let mut panes = PaneManager::new().with_config(&config.layout);
    let mut sessions = SessionGroupManager::new(backend).with_config(config);
    if let Some(store) = store {
        panes = panes.with_persistence(Persistence::new(
            Arc::clone(&store),
            config.persistence.pane_key.clone(),
        ));
        sessions = sessions.with_persistence(Persistence::new(
            store,
            config.persistence.session_key.clone(),
        ));
    }
    log::info!("Workspace ready");
    WorkspaceHandler::new(panes, sessions)
}
