//! nginx releases from the nginx/nginx GitHub tags

use chrono::{DateTime, Utc};

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate, Remote};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, find_release};
use crate::dependency::types::{ResolvedVersion, VersionRef};

const NAME: &str = "nginx";
const ORG: &str = "nginx";
const REPO: &str = "nginx";
const TAG_PREFIX: &str = "release-";

/// Default base URL for nginx.org
pub const DEFAULT_BASE_URL: &str = "http://nginx.org";

pub struct NginxSource {
    ctx: Collaborators,
    base_url: String,
}

impl NginxSource {
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
            .tags(ORG, REPO)
            .await
            .map_err(DependencyError::github("could not get nginx tags"))?;

        let candidates = tags
            .into_iter()
            .filter_map(|tag| {
                tag.name
                    .strip_prefix(TAG_PREFIX)
                    .map(|version| ReleaseCandidate::new(version, tag.committed_at))
            })
            .collect();

        self.ctx
            .orderer(NAME, OrderingStrategy::Preordered)
            .order(candidates)
    }

    async fn tag_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        let tag = format!("{}{}", TAG_PREFIX, version);
        let commit = self
            .ctx
            .github()
            .tag_commit(ORG, REPO, &tag)
            .await
            .map_err(DependencyError::github(format!(
                "could not get commit of {}",
                tag
            )))?;
        Ok(commit.date)
    }
}

#[async_trait::async_trait]
impl DependencySource for NginxSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        Ok(self.releases().await?.into_iter().map(|r| r.version).collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        find_release(NAME, &self.releases().await?, version)?;
        let release_date = self.tag_date(version).await?;

        let uri = format!("{}/download/nginx-{}.tar.gz", self.base_url, version);
        let digest = self
            .ctx
            .verifier()
            .verify(
                NAME,
                version,
                &Artifact::from_url(&uri),
                vec![ChecksumCandidate::signature(
                    Remote::url(format!("{}.asc", uri)),
                    Remote::url(format!("{}/keys/mdounin.key", self.base_url)),
                )],
            )
            .await?;

        Ok(ResolvedVersion {
            release_date: Some(release_date),
            cpe: Some(format!("cpe:2.3:a:nginx:nginx:{}:*:*:*:*:*:*:*", version)),
            ..self.ctx.finish(NAME, version, &uri, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        find_release(NAME, &self.releases().await?, version)?;
        self.tag_date(version).await
    }
}
