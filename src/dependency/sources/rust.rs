//! Rust compiler releases from the rust-lang/rust GitHub tags

use chrono::{DateTime, Utc};

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate, Remote};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate, VersionScheme};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, find_release};
use crate::dependency::types::{ResolvedVersion, VersionRef};

const NAME: &str = "rust";
const ORG: &str = "rust-lang";
const REPO: &str = "rust";

/// Default base URL for static.rust-lang.org
pub const DEFAULT_BASE_URL: &str = "https://static.rust-lang.org";

pub struct RustSource {
    ctx: Collaborators,
    base_url: String,
    scheme: VersionScheme,
}

impl RustSource {
    pub fn new(ctx: Collaborators) -> Self {
        Self::with_base_url(ctx, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(ctx: Collaborators, base_url: &str) -> Self {
        Self {
            ctx,
            base_url: base_url.trim_end_matches('/').to_string(),
            scheme: VersionScheme::default(),
        }
    }

    async fn releases(&self) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let tags = self
            .ctx
            .github()
            .tags(ORG, REPO)
            .await
            .map_err(DependencyError::github("could not get rust tags"))?;

        let mut candidates = Vec::new();
        for tag in tags {
            // Pre-1.0 snapshots use `release-*` tags or a 0.x number
            if tag.name.starts_with("release-") {
                continue;
            }
            if let Some(version) = self.scheme.classify(&tag.name)? {
                if version.major == 0 {
                    continue;
                }
            }
            candidates.push(ReleaseCandidate::new(tag.name, tag.committed_at));
        }

        self.ctx
            .orderer(NAME, OrderingStrategy::Preordered)
            .with_scheme(self.scheme.clone())
            .order(candidates)
    }

    async fn tag_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        let commit = self
            .ctx
            .github()
            .tag_commit(ORG, REPO, version)
            .await
            .map_err(DependencyError::github(format!(
                "could not get commit of {}",
                version
            )))?;
        Ok(commit.date)
    }
}

#[async_trait::async_trait]
impl DependencySource for RustSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        Ok(self.releases().await?.into_iter().map(|r| r.version).collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        find_release(NAME, &self.releases().await?, version)?;
        let release_date = self.tag_date(version).await?;

        let uri = format!("{}/dist/rustc-{}-src.tar.gz", self.base_url, version);
        let digest = self
            .ctx
            .verifier()
            .verify(
                NAME,
                version,
                &Artifact::from_url(&uri),
                vec![ChecksumCandidate::signature(
                    Remote::url(format!("{}.asc", uri)),
                    Remote::url(format!("{}/rust-key.gpg.ascii", self.base_url)),
                )],
            )
            .await?;

        Ok(ResolvedVersion {
            release_date: Some(release_date),
            cpe: Some(format!("cpe:2.3:a:rust-lang:rust:{}:*:*:*:*:*:*:*", version)),
            ..self.ctx.finish(NAME, version, &uri, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        find_release(NAME, &self.releases().await?, version)?;
        self.tag_date(version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::clients::github::{MockGithubClient, TagCommit, TagInfo};
    use crate::dependency::integrity::checksummer::MockChecksummer;
    use crate::dependency::quirks::Quirks;
    use crate::dependency::sources::testing::{HELLO_SHA256, collaborators_with};
    use chrono::TimeZone;
    use mockall::predicate::eq;
    use mockito::Server;

    fn github(tags: &'static [&'static str]) -> MockGithubClient {
        let mut github = MockGithubClient::new();
        github.expect_tags().returning(move |_, _| {
            Ok(tags
                .iter()
                .map(|name| TagInfo {
                    name: name.to_string(),
                    committed_at: None,
                })
                .collect())
        });
        github
            .expect_tag_commit()
            .with(eq(ORG), eq(REPO), eq("1.78.0"))
            .returning(|_, _, _| {
                Ok(TagCommit {
                    sha: "9b00956e56009bab2aa15d7bff10916599e3d6d6".to_string(),
                    date: Utc.with_ymd_and_hms(2024, 4, 29, 12, 0, 0).unwrap(),
                })
            });
        github
    }

    fn source(github: MockGithubClient, checksummer: MockChecksummer, base_url: &str) -> RustSource {
        RustSource::with_base_url(
            collaborators_with(github, checksummer, Quirks::empty()),
            base_url,
        )
    }

    #[tokio::test]
    async fn list_versions_skips_snapshots_and_prereleases() {
        let versions = source(
            github(&["1.78.0", "1.79.0-beta.1", "1.77.2", "release-0.12.0", "0.12.0"]),
            MockChecksummer::new(),
            "http://unused.test",
        )
        .list_versions()
        .await
        .unwrap();

        assert_eq!(versions, vec!["1.78.0", "1.77.2"]);
    }

    #[tokio::test]
    async fn list_versions_fails_on_unparseable_tag() {
        let err = source(
            github(&["1.78.0", "nightly"]),
            MockChecksummer::new(),
            "http://unused.test",
        )
        .list_versions()
        .await
        .unwrap_err();

        assert!(matches!(err, DependencyError::MalformedUpstreamData { .. }));
    }

    #[tokio::test]
    async fn resolve_verifies_source_tarball_signature() {
        let mut server = Server::new_async().await;
        let tarball = server
            .mock("GET", "/dist/rustc-1.78.0-src.tar.gz")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;
        server
            .mock("GET", "/dist/rustc-1.78.0-src.tar.gz.asc")
            .with_status(200)
            .with_body("SIGNATURE")
            .create_async()
            .await;
        server
            .mock("GET", "/rust-key.gpg.ascii")
            .with_status(200)
            .with_body("KEY")
            .create_async()
            .await;

        let mut checksummer = MockChecksummer::new();
        checksummer
            .expect_split_key_blocks()
            .returning(|doc| vec![doc.to_string()]);
        checksummer
            .expect_verify_signature()
            .with(eq("SIGNATURE"), mockall::predicate::always(), eq("KEY"))
            .returning(|_, _, _| Ok(()));
        checksummer
            .expect_sha256()
            .returning(|_| Ok(HELLO_SHA256.to_string()));

        let resolved = source(github(&["1.78.0"]), checksummer, &server.url())
            .resolve("1.78.0")
            .await
            .unwrap();

        tarball.assert_async().await;
        assert_eq!(resolved.digest.hex(), HELLO_SHA256);
        assert_eq!(
            resolved.release_date,
            Some(Utc.with_ymd_and_hms(2024, 4, 29, 12, 0, 0).unwrap())
        );
        assert_eq!(
            resolved.licenses,
            vec!["MIT".to_string(), "Apache-2.0".to_string()]
        );
    }
}
