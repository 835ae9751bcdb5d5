//! ICU4C releases from the unicode-org/icu GitHub releases

use chrono::{DateTime, Utc};

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate, Remote};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, dated_release, find_release, github_error};
use crate::dependency::types::{ResolvedVersion, VersionRef};

const NAME: &str = "icu";
const ORG: &str = "unicode-org";
const REPO: &str = "icu";

/// Default location of the project's signing keys
pub const DEFAULT_KEYS_URL: &str = "https://raw.githubusercontent.com/unicode-org/icu/master/KEYS";

pub struct IcuSource {
    ctx: Collaborators,
    keys_url: String,
}

/// `release-74-1` -> `74.1`
fn tag_to_version(tag: &str) -> String {
    tag.trim_start_matches("release-").replace('-', ".")
}

/// `74.1` -> `release-74-1`
fn version_to_tag(version: &str) -> String {
    format!("release-{}", version.replace('.', "-"))
}

/// `74.1` -> `icu4c-74_1-src.tgz`
fn source_asset(version: &str) -> String {
    format!("icu4c-{}-src.tgz", version.replace('.', "_"))
}

impl IcuSource {
    pub fn new(ctx: Collaborators) -> Self {
        Self::with_keys_url(ctx, DEFAULT_KEYS_URL)
    }

    pub fn with_keys_url(ctx: Collaborators, keys_url: &str) -> Self {
        Self {
            ctx,
            keys_url: keys_url.to_string(),
        }
    }

    async fn releases(&self) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let tags = self
            .ctx
            .github()
            .release_tags(ORG, REPO)
            .await
            .map_err(DependencyError::github("could not get icu releases"))?;

        let candidates = tags
            .into_iter()
            .map(|tag| ReleaseCandidate::new(tag_to_version(&tag.tag_name), tag.created_at))
            .collect();

        self.ctx
            .orderer(NAME, OrderingStrategy::ReleaseDate)
            .order(candidates)
    }
}

#[async_trait::async_trait]
impl DependencySource for IcuSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        Ok(self.releases().await?.into_iter().map(|r| r.version).collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        let releases = self.releases().await?;
        let release = find_release(NAME, &releases, version)?;

        let tag = version_to_tag(version);
        let asset_name = source_asset(version);
        let asset = self
            .ctx
            .github()
            .release_asset_info(ORG, REPO, &tag, &asset_name)
            .await
            .map_err(github_error(version, format!("could not find {}", asset_name)))?;

        let signature_name = format!("{}.asc", asset_name);
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
                    Remote::release_asset(ORG, REPO, &tag, &signature_name),
                    Remote::url(&self.keys_url),
                )],
            )
            .await?;

        Ok(ResolvedVersion {
            release_date: release.released_at,
            cpe: Some(format!(
                r"cpe:2.3:a:icu-project:international_components_for_unicode:{}:*:*:*:*:c\/c\+\+:*:*",
                version
            )),
            ..self
                .ctx
                .finish(NAME, version, &asset.browser_download_url, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        dated_release(NAME, &self.releases().await?, version)
    }
}
