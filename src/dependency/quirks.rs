//! Per-(ecosystem, version) overrides of the default verification and
//! ordering policy.
//!
//! The table is read once and never written afterwards. Lookups are by exact
//! ecosystem name and version string; versions without an entry get the
//! default strict policy.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use serde::Deserialize;
use thiserror::Error;

const BUILTIN_QUIRKS: &str = include_str!("quirks.json");

static BUILTIN: LazyLock<Arc<Quirks>> = LazyLock::new(|| {
    Arc::new(Quirks::from_json(BUILTIN_QUIRKS).expect("Built-in quirks table is invalid"))
});

#[derive(Debug, Error)]
pub enum QuirksError {
    #[error("could not read quirks table: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse quirks table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Overrides recorded for one version
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct QuirkEntry {
    /// Upstream publishes no usable integrity material for this version
    pub skip_verification: bool,
    /// The published checksum is wrong and must not be compared against
    pub known_wrong_checksum: bool,
    /// Channel the version is actually catalogued under
    pub channel_override: Option<String>,
    /// Drop the version from the catalog
    pub excluded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quirks {
    entries: HashMap<String, HashMap<String, QuirkEntry>>,
}

impl Quirks {
    /// The table embedded in the binary
    pub fn builtin() -> Arc<Quirks> {
        Arc::clone(&BUILTIN)
    }

    /// A table without any overrides
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, QuirksError> {
        Ok(Self {
            entries: serde_json::from_str(json)?,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, QuirksError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn lookup(&self, ecosystem: &str, version: &str) -> Option<&QuirkEntry> {
        self.entries.get(ecosystem)?.get(version)
    }

    pub fn skip_verification(&self, ecosystem: &str, version: &str) -> bool {
        self.lookup(ecosystem, version)
            .is_some_and(|q| q.skip_verification)
    }

    pub fn known_wrong_checksum(&self, ecosystem: &str, version: &str) -> bool {
        self.lookup(ecosystem, version)
            .is_some_and(|q| q.known_wrong_checksum)
    }

    /// Whether the artifact may be hashed without comparing it against
    /// published integrity material
    pub fn allows_unverified(&self, ecosystem: &str, version: &str) -> bool {
        self.lookup(ecosystem, version)
            .is_some_and(|q| q.skip_verification || q.known_wrong_checksum)
    }

    pub fn channel_override(&self, ecosystem: &str, version: &str) -> Option<&str> {
        self.lookup(ecosystem, version)?.channel_override.as_deref()
    }

    pub fn is_excluded(&self, ecosystem: &str, version: &str) -> bool {
        self.lookup(ecosystem, version).is_some_and(|q| q.excluded)
    }
}
