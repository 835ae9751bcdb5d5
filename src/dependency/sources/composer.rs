//! Composer releases from GitHub, artifacts from getcomposer.org

use chrono::{DateTime, Utc};

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate, Remote};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, dated_release, find_release};
use crate::dependency::types::{DigestAlgorithm, ResolvedVersion, VersionRef};

const NAME: &str = "composer";
const ORG: &str = "composer";
const REPO: &str = "composer";

/// Default base URL for getcomposer.org
pub const DEFAULT_BASE_URL: &str = "https://getcomposer.org";

pub struct ComposerSource {
    ctx: Collaborators,
    base_url: String,
}

impl ComposerSource {
    pub fn new(ctx: Collaborators) -> Self {
        Self::with_base_url(ctx, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(ctx: Collaborators, base_url: &str) -> Self {
        Self {
            ctx,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn releases(&self) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let tags = self
            .ctx
            .github()
            .release_tags(ORG, REPO)
            .await
            .map_err(DependencyError::github("could not get composer releases"))?;

        let candidates = tags
            .into_iter()
            .map(|tag| ReleaseCandidate::new(tag.tag_name, tag.published_at))
            .collect();

        self.ctx
            .orderer(NAME, OrderingStrategy::Preordered)
            .order(candidates)
    }
}

#[async_trait::async_trait]
impl DependencySource for ComposerSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        Ok(self.releases().await?.into_iter().map(|r| r.version).collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        let releases = self.releases().await?;
        let release = find_release(NAME, &releases, version)?;

        let uri = format!("{}/download/{}/composer.phar", self.base_url, version);
        let digest = self
            .ctx
            .verifier()
            .verify(
                NAME,
                version,
                &Artifact::from_url(&uri),
                vec![ChecksumCandidate::listing(
                    DigestAlgorithm::Sha256,
                    Remote::url(format!("{}.sha256sum", uri)),
                    "composer.phar",
                )],
            )
            .await?;

        Ok(ResolvedVersion {
            release_date: release.released_at,
            ..self.ctx.finish(NAME, version, &uri, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        dated_release(NAME, &self.releases().await?, version)
    }
}
