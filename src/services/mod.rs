pub mod pane_manager;
pub mod persistence;
pub mod session_groups;
pub mod single_flight;
pub mod snapshot_cell;

pub use pane_manager::*;
pub use persistence::*;
pub use session_groups::*;
pub use single_flight::*;
pub use snapshot_cell::*;
