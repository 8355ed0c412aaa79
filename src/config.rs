//! Configuration for a ledger and its stores.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for a [`Ledger`](crate::ledger::Ledger).
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// event_capacity = 1024
/// max_conditions_per_agreement = 16
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How far a live event subscriber may lag before it starts missing events.
    pub event_capacity: usize,

    /// Require an agreement to bind exactly as many conditions as its
    /// template has condition types.
    pub strict_template_length: bool,

    /// Upper bound on conditions per agreement. `0` disables the check.
    pub max_conditions_per_agreement: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            strict_template_length: true,
            max_conditions_per_agreement: 64,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load from a TOML file. Returns `None` (and logs why) when the file
    /// is missing or unreadable.
    pub fn load(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read store config at {:?}: {}", path, err);
                return None;
            }
        };

        match Self::from_toml_str(&content) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!("Failed to parse store config at {:?}: {}", path, err);
                None
            }
        }
    }

    /// Set event channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set strict template length enforcement
    pub fn strict_template_length(mut self, strict: bool) -> Self {
        self.strict_template_length = strict;
        self
    }

    /// Set the per-agreement condition cap
    pub fn max_conditions_per_agreement(mut self, max: usize) -> Self {
        self.max_conditions_per_agreement = max;
        self
    }
}
