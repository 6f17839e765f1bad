//! Name-to-decoder table for call variants.

use super::{Call, CALL_ENTRIES};
use crate::error::{BridgeError, Result};
use serde_json::Value;

/// One registered call variant.
#[derive(Clone, Copy)]
pub struct CallEntry {
    pub name: &'static str,
    pub decode: fn(&Value) -> Result<Call>,
}

impl std::fmt::Debug for CallEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallEntry").field("name", &self.name).finish()
    }
}

/// Static registry of call variants, keyed by wire name.
///
/// [`CallRegistry::standard`] holds every variant in this crate. Other tables
/// can be built with [`CallRegistry::from_entries`], e.g. to restrict what a
/// relay accepts.
#[derive(Debug, Clone, Copy)]
pub struct CallRegistry {
    entries: &'static [CallEntry],
}

impl CallRegistry {
    pub const fn from_entries(entries: &'static [CallEntry]) -> Self {
        Self { entries }
    }

    pub const fn standard() -> Self {
        Self::from_entries(CALL_ENTRIES)
    }

    pub fn lookup(&self, name: &str) -> Option<&CallEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Decode `data` as the variant registered under `name`.
    pub fn decode(&self, name: &str, data: &Value) -> Result<Call> {
        let entry = self.lookup(name).ok_or_else(|| BridgeError::UnknownVariant {
            name: name.to_string(),
        })?;
        (entry.decode)(data)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
