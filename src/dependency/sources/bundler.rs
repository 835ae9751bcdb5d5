//! Bundler releases from the rubygems.org versions API

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{
    Collaborators, dated_release, find_release, parse_timestamp,
};
use crate::dependency::types::{DigestAlgorithm, ResolvedVersion, VersionRef};

const NAME: &str = "bundler";

/// Default base URL for rubygems.org
pub const DEFAULT_BASE_URL: &str = "https://rubygems.org";

#[derive(Debug, Deserialize)]
struct GemVersion {
    number: String,
    created_at: String,
    sha: Option<String>,
}

pub struct BundlerSource {
    ctx: Collaborators,
    base_url: String,
    /// Final releases are plain `N.N.N`
    final_re: Regex,
}

impl BundlerSource {
    pub fn new(ctx: Collaborators) -> Self {
        Self::with_base_url(ctx, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(ctx: Collaborators, base_url: &str) -> Self {
        Self {
            ctx,
            base_url: base_url.trim_end_matches('/').to_string(),
            final_re: Regex::new(r"^\d+\.\d+\.\d+$").unwrap(),
        }
    }

    async fn gem_versions(&self) -> Result<Vec<GemVersion>, DependencyError> {
        let versions: Vec<GemVersion> = self
            .ctx
            .get_json(&format!("{}/api/v1/versions/bundler.json", self.base_url))
            .await?;

        Ok(versions
            .into_iter()
            .filter(|v| self.final_re.is_match(&v.number))
            .collect())
    }

    async fn releases(&self) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let candidates = self
            .gem_versions()
            .await?
            .into_iter()
            .map(|v| Ok(ReleaseCandidate::new(v.number, Some(parse_timestamp(&v.created_at)?))))
            .collect::<Result<Vec<_>, DependencyError>>()?;

        self.ctx
            .orderer(NAME, OrderingStrategy::Preordered)
            .order(candidates)
    }
}

#[async_trait::async_trait]
impl DependencySource for BundlerSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        Ok(self.releases().await?.into_iter().map(|r| r.version).collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        let releases = self.releases().await?;
        let release = find_release(NAME, &releases, version)?;
        let sha = self
            .gem_versions()
            .await?
            .into_iter()
            .find(|v| v.number == version)
            .and_then(|v| v.sha);

        let uri = format!("{}/downloads/bundler-{}.gem", self.base_url, version);
        let candidates = sha
            .into_iter()
            .map(|sha| ChecksumCandidate::inline(DigestAlgorithm::Sha256, sha))
            .collect();

        let digest = self
            .ctx
            .verifier()
            .verify(NAME, version, &Artifact::from_url(&uri), candidates)
            .await?;

        Ok(ResolvedVersion {
            release_date: release.released_at,
            cpe: Some(format!(
                "cpe:2.3:a:bundler:bundler:{}:*:*:*:*:ruby:*:*",
                version
            )),
            ..self.ctx.finish(NAME, version, &uri, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        dated_release(NAME, &self.releases().await?, version)
    }
}
