//! Liveness signal published by the connectivity monitor

use serde::{Deserialize, Serialize};

/// Two-state liveness of the remote server.
///
/// Defaults to `Offline` until a probe has confirmed the server is
/// reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionState {
    Online,
    #[default]
    Offline,
}

crate::impl_domain_status_conversions!(ConnectionState {
    Online => "online",
    Offline => "offline",
});

impl ConnectionState {
    /// Map a probe result onto a state.
    pub const fn from_reachable(reachable: bool) -> Self {
        if reachable {
            Self::Online
        } else {
            Self::Offline
        }
    }

    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}
