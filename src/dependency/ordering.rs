//! Version ordering and deduplication
//!
//! Turns an ecosystem's raw release list into one deterministic newest-first
//! sequence of final versions without duplicates. Identifiers are normalized
//! into `semver::Version` (missing components padded with zeros, extra
//! components and build suffixes kept as build metadata) so that versions
//! from different schemes compare numerically.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use semver::{BuildMetadata, Version};
use tracing::debug;

use crate::dependency::error::DependencyError;
use crate::dependency::quirks::Quirks;

/// Default prerelease markers, matched case-insensitively
pub const DEFAULT_PRERELEASE_MARKERS: &[&str] = &["alpha", "beta", "rc", "preview", "pre"];

/// One upstream release as seen by an adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseCandidate {
    pub version: String,
    pub released_at: Option<DateTime<Utc>>,
}

impl ReleaseCandidate {
    pub fn new(version: impl Into<String>, released_at: Option<DateTime<Utc>>) -> Self {
        Self {
            version: version.into(),
            released_at,
        }
    }

    pub fn undated(version: impl Into<String>) -> Self {
        Self::new(version, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingStrategy {
    /// Descending semantic version
    Semantic,
    /// Descending release date, ties broken by descending semantic version.
    /// Undated releases go last.
    ReleaseDate,
    /// Upstream already lists newest first; only filter and dedupe
    Preordered,
}

/// How one ecosystem spells its version identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionScheme {
    /// Prefixes stripped before parsing (e.g. `v`)
    pub prefixes: Vec<String>,
    /// Suffix markers that make a version a prerelease
    pub prerelease_markers: Vec<String>,
    /// Suffix markers that still denote a final release (e.g. PEP 440 `post`)
    pub final_markers: Vec<String>,
}

impl Default for VersionScheme {
    fn default() -> Self {
        Self {
            prefixes: vec!["v".to_string()],
            prerelease_markers: DEFAULT_PRERELEASE_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            final_markers: Vec::new(),
        }
    }
}

impl VersionScheme {
    /// PEP 440 identifiers: `a`, `b`, `rc`, `dev` prereleases, `post` finals
    pub fn pep440() -> Self {
        Self {
            prefixes: vec!["v".to_string()],
            prerelease_markers: ["a", "b", "c", "rc", "dev", "alpha", "beta", "pre", "preview"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            final_markers: vec!["post".to_string()],
        }
    }

    /// Normalizes `raw`; `Ok(None)` marks a prerelease.
    pub fn classify(&self, raw: &str) -> Result<Option<Version>, DependencyError> {
        let malformed = |reason: &str| {
            DependencyError::malformed("version ordering", format!("'{}': {}", raw, reason))
        };

        let trimmed = raw.trim();
        let stripped = self
            .prefixes
            .iter()
            .find_map(|p| trimmed.strip_prefix(p.as_str()))
            .unwrap_or(trimmed);

        let core_len = stripped
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(stripped.len());
        let (core, rest) = stripped.split_at(core_len);
        let core = core.strip_suffix('.').unwrap_or(core);

        if core.is_empty() {
            return Err(malformed("no numeric version"));
        }

        let numbers = core
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| malformed("invalid numeric component"))?;

        let mut version = Version::new(
            numbers[0],
            numbers.get(1).copied().unwrap_or(0),
            numbers.get(2).copied().unwrap_or(0),
        );

        let mut build = numbers
            .iter()
            .skip(3)
            .map(|n| n.to_string())
            .collect::<Vec<_>>();

        if let Some(meta) = rest.strip_prefix('+') {
            build.push(meta.to_string());
        } else if rest.starts_with('-') {
            return Ok(None);
        } else if !rest.is_empty() {
            let lower = rest.to_ascii_lowercase();
            if self
                .prerelease_markers
                .iter()
                .any(|m| lower.starts_with(m.as_str()))
            {
                return Ok(None);
            }
            if !self
                .final_markers
                .iter()
                .any(|m| lower.starts_with(m.as_str()))
            {
                return Err(malformed("unrecognized suffix"));
            }
            build.push(lower);
        }

        if !build.is_empty() {
            version.build = BuildMetadata::new(&build.join("."))
                .map_err(|_| malformed("invalid build suffix"))?;
        }

        Ok(Some(version))
    }
}

/// Orders release candidates for one ecosystem
#[derive(Debug, Clone)]
pub struct VersionOrderer {
    ecosystem: String,
    strategy: OrderingStrategy,
    scheme: VersionScheme,
    quirks: Arc<Quirks>,
}

impl VersionOrderer {
    pub fn new(ecosystem: &str, strategy: OrderingStrategy, quirks: Arc<Quirks>) -> Self {
        Self {
            ecosystem: ecosystem.to_string(),
            strategy,
            scheme: VersionScheme::default(),
            quirks,
        }
    }

    pub fn with_scheme(mut self, scheme: VersionScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Returns the final releases newest first, deduplicated on the
    /// normalized version (first occurrence wins).
    ///
    /// Fails with `MalformedUpstreamData` on any identifier that cannot be
    /// normalized, rather than dropping it.
    pub fn order(
        &self,
        candidates: Vec<ReleaseCandidate>,
    ) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let mut finals = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            if self.quirks.is_excluded(&self.ecosystem, &candidate.version) {
                debug!("{}: {} excluded by quirks", self.ecosystem, candidate.version);
                continue;
            }
            match self.scheme.classify(&candidate.version)? {
                Some(version) => finals.push((version, candidate)),
                None => debug!("{}: skipping prerelease {}", self.ecosystem, candidate.version),
            }
        }

        match self.strategy {
            OrderingStrategy::Semantic => finals.sort_by(|(a, _), (b, _)| b.cmp(a)),
            OrderingStrategy::ReleaseDate => finals.sort_by(|(va, a), (vb, b)| {
                // `None < Some`, so reversing puts undated entries last
                b.released_at.cmp(&a.released_at).then_with(|| vb.cmp(va))
            }),
            OrderingStrategy::Preordered => {}
        }

        let mut seen = HashSet::new();
        Ok(finals
            .into_iter()
            .filter(|(version, _)| seen.insert(version.clone()))
            .map(|(_, candidate)| candidate)
            .collect())
    }

    /// Flattens per-channel release lists and orders them as one list
    pub fn order_channels(
        &self,
        channels: Vec<Vec<ReleaseCandidate>>,
    ) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        self.order(channels.into_iter().flatten().collect())
    }

    /// Convenience wrapper returning only the version strings
    pub fn order_versions(
        &self,
        candidates: Vec<ReleaseCandidate>,
    ) -> Result<Vec<String>, DependencyError> {
        Ok(self
            .order(candidates)?
            .into_iter()
            .map(|c| c.version)
            .collect())
    }
}
