//! Yarn (classic) releases from the yarnpkg/yarn GitHub releases

use chrono::{DateTime, Utc};
use semver::Version;

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate, Remote};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate, VersionScheme};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, dated_release, find_release, github_error};
use crate::dependency::types::{ResolvedVersion, VersionRef};

const NAME: &str = "yarn";
const ORG: &str = "yarnpkg";
const REPO: &str = "yarn";

/// Releases before this one ship no source tarball
const FIRST_SOURCE_RELEASE: Version = Version::new(0, 7, 0);

/// Default location of the release signing key
pub const DEFAULT_KEY_URL: &str = "https://dl.yarnpkg.com/debian/pubkey.gpg";

pub struct YarnSource {
    ctx: Collaborators,
    key_url: String,
    scheme: VersionScheme,
}

impl YarnSource {
    pub fn new(ctx: Collaborators) -> Self {
        Self::with_key_url(ctx, DEFAULT_KEY_URL)
    }

    pub fn with_key_url(ctx: Collaborators, key_url: &str) -> Self {
        Self {
            ctx,
            key_url: key_url.to_string(),
            scheme: VersionScheme::default(),
        }
    }

    async fn releases(&self) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let tags = self
            .ctx
            .github()
            .release_tags(ORG, REPO)
            .await
            .map_err(DependencyError::github("could not get yarn releases"))?;

        let mut candidates = Vec::new();
        for tag in tags {
            let version = tag.tag_name.trim_start_matches('v');
            if let Some(parsed) = self.scheme.classify(version)? {
                if parsed < FIRST_SOURCE_RELEASE {
                    continue;
                }
            }
            candidates.push(ReleaseCandidate::new(version, tag.published_at));
        }

        self.ctx
            .orderer(NAME, OrderingStrategy::Preordered)
            .order(candidates)
    }
}

#[async_trait::async_trait]
impl DependencySource for YarnSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        Ok(self.releases().await?.into_iter().map(|r| r.version).collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        let releases = self.releases().await?;
        let release = find_release(NAME, &releases, version)?;

        let tag = format!("v{}", version);
        let asset_name = format!("yarn-{}.tar.gz", tag);
        let asset = self
            .ctx
            .github()
            .release_asset_info(ORG, REPO, &tag, &asset_name)
            .await
            .map_err(github_error(version, format!("could not find {}", asset_name)))?;

        let digest = self
            .ctx
            .verifier()
            .verify(
                NAME,
                version,
                &Artifact::new(
                    &asset_name,
                    Remote::release_asset(ORG, REPO, &tag, &asset_name),
                ),
                vec![ChecksumCandidate::signature(
                    Remote::release_asset(ORG, REPO, &tag, &format!("{}.asc", asset_name)),
                    Remote::url(&self.key_url),
                )],
            )
            .await?;

        Ok(ResolvedVersion {
            release_date: release.released_at,
            cpe: Some(format!("cpe:2.3:a:yarnpkg:yarn:{}:*:*:*:*:*:*:*", version)),
            ..self
                .ctx
                .finish(NAME, version, &asset.browser_download_url, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        dated_release(NAME, &self.releases().await?, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::clients::github::{MockGithubClient, ReleaseAsset, ReleaseTag};
    use crate::dependency::integrity::checksummer::MockChecksummer;
    use crate::dependency::quirks::Quirks;
    use crate::dependency::sources::testing::{HELLO_SHA256, collaborators_with};
    use chrono::TimeZone;
    use mockall::predicate::{always, eq};
    use mockito::Server;

    fn tag(name: &str, day: u32) -> ReleaseTag {
        ReleaseTag {
            tag_name: name.to_string(),
            published_at: Some(Utc.with_ymd_and_hms(2022, 5, day, 0, 0, 0).unwrap()),
            created_at: None,
        }
    }

    fn github() -> MockGithubClient {
        let mut github = MockGithubClient::new();
        github.expect_release_tags().returning(|_, _| {
            Ok(vec![
                tag("v1.22.19", 10),
                tag("v1.22.18", 9),
                tag("v1.23.0-20220130.1630", 8),
                tag("v0.7.0", 2),
                tag("0.6.3", 1),
            ])
        });
        github
    }

    #[tokio::test]
    async fn list_versions_strips_prefix_and_drops_early_releases() {
        let source = YarnSource::with_key_url(
            collaborators_with(github(), MockChecksummer::new(), Quirks::empty()),
            "unused",
        );

        let versions = source.list_versions().await.unwrap();

        assert_eq!(versions, vec!["1.22.19", "1.22.18", "0.7.0"]);
    }

    #[tokio::test]
    async fn resolve_verifies_release_asset_signature() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/pubkey.gpg")
            .with_status(200)
            .with_body("KEY")
            .create_async()
            .await;

        let mut github = github();
        github
            .expect_release_asset_info()
            .with(eq(ORG), eq(REPO), eq("v1.22.19"), eq("yarn-v1.22.19.tar.gz"))
            .returning(|_, _, _, name| {
                Ok(ReleaseAsset {
                    name: name.to_string(),
                    url: "https://api.github.test/assets/7".to_string(),
                    browser_download_url: format!(
                        "https://github.com/yarnpkg/yarn/releases/download/v1.22.19/{}",
                        name
                    ),
                })
            });
        github
            .expect_download_release_asset()
            .with(
                eq(ORG),
                eq(REPO),
                eq("v1.22.19"),
                eq("yarn-v1.22.19.tar.gz"),
                always(),
            )
            .times(1)
            .returning(|_, _, _, _, _| Ok("https://api.github.test/assets/7".to_string()));
        github
            .expect_release_asset()
            .with(eq(ORG), eq(REPO), eq("v1.22.19"), eq("yarn-v1.22.19.tar.gz.asc"))
            .returning(|_, _, _, _| Ok(b"SIGNATURE".to_vec()));

        let mut checksummer = MockChecksummer::new();
        checksummer
            .expect_split_key_blocks()
            .returning(|doc| vec![doc.to_string()]);
        checksummer
            .expect_verify_signature()
            .with(eq("SIGNATURE"), always(), eq("KEY"))
            .returning(|_, _, _| Ok(()));
        checksummer
            .expect_sha256()
            .returning(|_| Ok(HELLO_SHA256.to_string()));

        let source = YarnSource::with_key_url(
            collaborators_with(github, checksummer, Quirks::empty()),
            &format!("{}/pubkey.gpg", server.url()),
        );
        let resolved = source.resolve("1.22.19").await.unwrap();

        assert_eq!(
            resolved.uri,
            "https://github.com/yarnpkg/yarn/releases/download/v1.22.19/yarn-v1.22.19.tar.gz"
        );
        assert_eq!(resolved.digest.hex(), HELLO_SHA256);
        assert_eq!(
            resolved.release_date,
            Some(Utc.with_ymd_and_hms(2022, 5, 10, 0, 0, 0).unwrap())
        );
        assert_eq!(
            resolved.cpe.as_deref(),
            Some("cpe:2.3:a:yarnpkg:yarn:1.22.19:*:*:*:*:*:*:*")
        );
    }
}
