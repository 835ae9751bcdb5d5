//! The contract every ecosystem adapter implements

use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use crate::dependency::error::DependencyError;
use crate::dependency::types::{ResolvedVersion, VersionRef};

/// Trait for resolving the releases of one upstream dependency
///
/// No operation retries or caches: every call re-derives its answer from
/// upstream state.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait DependencySource: Send + Sync {
    /// The case-sensitive ecosystem name this source was created for
    fn name(&self) -> &str;

    /// Lists final releases, newest first, without duplicates
    ///
    /// # Returns
    /// * `Ok(Vec<VersionRef>)` - Versions in the ecosystem's own spelling
    /// * `Err(DependencyError)` - `UpstreamUnavailable` or `MalformedUpstreamData`
    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError>;

    /// Resolves one listed version to its verified metadata
    ///
    /// `NoSourceCode` means the release exists but has no artifact for the
    /// supported platform; callers skip it instead of failing.
    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError>;

    /// Release date of `version`; `NotFound` when the version or its date is unknown
    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError>;
}
