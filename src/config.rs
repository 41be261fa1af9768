//! Engine configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Tunables for the engine. Every field has a default, so a partial JSON
/// document is a valid configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Buffer size for event subscriptions created through the manager.
    pub event_buffer_size: usize,

    /// Capacity of the owner actor's mailbox.
    pub mailbox_capacity: usize,

    /// Run a passive refresh right after every successful `configure`.
    pub refresh_on_configure: bool,

    /// Run a passive refresh when the network signal flips back to allowed.
    pub refresh_on_network_restore: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 256,
            mailbox_capacity: 1024,
            refresh_on_configure: false,
            refresh_on_network_restore: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
