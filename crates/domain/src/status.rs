//! Item status — the lifecycle state of a registered item.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an item.
///
/// `Stopped` is terminal for an item instance: a stopped item has released
/// its native resources and will never serve state again. `Online` and
/// `Offline` may alternate during an item's life (e.g. a device connection
/// dropping and coming back).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Initialised and serving state.
    Online,
    /// Constructed but not working (failed init, lost connection, missing
    /// dependency). State reads return "unavailable", mutation fails.
    #[default]
    Offline,
    /// Torn down; terminal.
    Stopped,
}

impl ItemStatus {
    /// Whether the item serves state (`Online` only).
    #[must_use]
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }

    /// Whether the item has been torn down.
    #[must_use]
    pub fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => f.write_str("online"),
            Self::Offline => f.write_str("offline"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_report_online_only_when_online() {
        assert!(ItemStatus::Online.is_online());
        assert!(!ItemStatus::Offline.is_online());
        assert!(!ItemStatus::Stopped.is_online());
    }

    #[test]
    fn should_default_to_offline() {
        assert_eq!(ItemStatus::default(), ItemStatus::Offline);
    }

    #[test]
    fn should_display_lowercase_variant_name() {
        assert_eq!(ItemStatus::Online.to_string(), "online");
        assert_eq!(ItemStatus::Stopped.to_string(), "stopped");
    }

    #[test]
    fn should_roundtrip_through_serde_json() {
        let json = serde_json::to_string(&ItemStatus::Offline).unwrap();
        assert_eq!(json, "\"offline\"");
        let parsed: ItemStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ItemStatus::Offline);
    }
}
