//! Batch operations over one dependency source

use std::collections::HashSet;

use tracing::{info, warn};

use crate::dependency::error::DependencyError;
use crate::dependency::source::DependencySource;
use crate::dependency::types::{ResolvedVersion, VersionRef};

/// Listed versions not yet in `known`, newest first
pub async fn new_versions(
    source: &dyn DependencySource,
    known: &[VersionRef],
) -> Result<Vec<VersionRef>, DependencyError> {
    let known: HashSet<&str> = known.iter().map(String::as_str).collect();

    let versions: Vec<VersionRef> = source
        .list_versions()
        .await?
        .into_iter()
        .filter(|v| !known.contains(v.as_str()))
        .collect();

    info!("{}: {} new version(s)", source.name(), versions.len());
    Ok(versions)
}

/// Resolves `versions` one after another
///
/// Versions without a source artifact are skipped; any other failure
/// aborts the batch.
pub async fn resolve_all(
    source: &dyn DependencySource,
    versions: &[VersionRef],
) -> Result<Vec<ResolvedVersion>, DependencyError> {
    let mut resolved = Vec::with_capacity(versions.len());

    for version in versions {
        match source.resolve(version).await {
            Ok(metadata) => resolved.push(metadata),
            Err(e) if e.is_skippable() => {
                warn!("{} {}: skipped: {}", source.name(), version, e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::source::MockDependencySource;
    use crate::dependency::types::Digest;
    use crate::dependency::types::DigestAlgorithm;
    use mockall::predicate::eq;

    fn resolved(version: &str) -> ResolvedVersion {
        ResolvedVersion {
            version: version.to_string(),
            uri: format!("https://example.test/{}.tar.gz", version),
            digest: Digest::new(DigestAlgorithm::Sha256, &"a".repeat(64)).unwrap(),
            release_date: None,
            deprecation_date: None,
            cpe: None,
            purl: format!("pkg:generic/node@{}", version),
            licenses: vec![],
        }
    }

    fn mock_source() -> MockDependencySource {
        let mut source = MockDependencySource::new();
        source.expect_name().return_const("node".to_string());
        source
    }

    #[tokio::test]
    async fn new_versions_filters_known_and_keeps_order() {
        let mut source = mock_source();
        source.expect_list_versions().times(1).returning(|| {
            Ok(vec![
                "22.1.0".to_string(),
                "22.0.0".to_string(),
                "20.12.2".to_string(),
                "18.20.2".to_string(),
            ])
        });

        let versions = new_versions(&source, &["22.0.0".to_string(), "18.20.2".to_string()])
            .await
            .unwrap();

        assert_eq!(versions, vec!["22.1.0", "20.12.2"]);
    }

    #[tokio::test]
    async fn new_versions_propagates_listing_error() {
        let mut source = mock_source();
        source
            .expect_list_versions()
            .returning(|| Err(DependencyError::malformed("index", "truncated")));

        let err = new_versions(&source, &[]).await.unwrap_err();

        assert!(matches!(err, DependencyError::MalformedUpstreamData { .. }));
    }

    #[tokio::test]
    async fn resolve_all_skips_versions_without_source() {
        let mut source = mock_source();
        source
            .expect_resolve()
            .with(eq("2.0.0"))
            .returning(|v| Ok(resolved(v)));
        source
            .expect_resolve()
            .with(eq("1.5.0"))
            .returning(|v| Err(DependencyError::no_source_code(v)));
        source
            .expect_resolve()
            .with(eq("1.0.0"))
            .returning(|v| Ok(resolved(v)));

        let results = resolve_all(
            &source,
            &["2.0.0".to_string(), "1.5.0".to_string(), "1.0.0".to_string()],
        )
        .await
        .unwrap();

        let versions: Vec<_> = results.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["2.0.0", "1.0.0"]);
    }

    #[tokio::test]
    async fn resolve_all_aborts_on_other_errors() {
        let mut source = mock_source();
        source
            .expect_resolve()
            .with(eq("2.0.0"))
            .times(1)
            .returning(|v| Err(DependencyError::NotFound(v.to_string())));
        source.expect_resolve().with(eq("1.0.0")).never();

        let err = resolve_all(&source, &["2.0.0".to_string(), "1.0.0".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, DependencyError::NotFound(_)));
    }
}
