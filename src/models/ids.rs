use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh, globally unique id.
            pub fn generate() -> Self {
                Self(crate::utils::new_id())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Editor pane, one leaf of the editor layout tree.
    PaneId
);
opaque_id!(
    /// Tab inside an editor pane.
    TabId
);
opaque_id!(
    /// Terminal session group, the terminal analogue of a pane.
    GroupId
);
opaque_id!(
    /// Session handle issued to the external PTY transport.
    SessionId
);
opaque_id!(
    /// Bottom-panel tab owned by the UI. The engine only maps it to a group.
    PanelTabId
);
