pub mod ids;
pub mod layout;
pub mod pane;
pub mod session;

pub use ids::*;
pub use layout::*;
pub use pane::*;
pub use session::*;
