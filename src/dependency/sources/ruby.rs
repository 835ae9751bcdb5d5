//! Ruby releases from ruby-lang.org

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, dated_release, find_release, parse_day};
use crate::dependency::types::{DigestAlgorithm, ResolvedVersion, VersionRef};

const NAME: &str = "ruby";

/// Default base URL for ruby-lang.org
pub const DEFAULT_BASE_URL: &str = "https://www.ruby-lang.org";

/// Release data the ruby-lang.org site is generated from
pub const DEFAULT_RELEASES_DATA_URL: &str =
    "https://raw.githubusercontent.com/ruby/www.ruby-lang.org/master/_data/releases.yml";

/// Index of every tarball on the download mirror
pub const DEFAULT_MIRROR_INDEX_URL: &str = "https://cache.ruby-lang.org/pub/ruby/index.txt";

#[derive(Debug, Deserialize)]
struct ReleaseData {
    version: serde_yaml_ng::Value,
    #[serde(default)]
    url: Formats,
    #[serde(default)]
    sha256: Formats,
}

#[derive(Debug, Default, Deserialize)]
struct Formats {
    #[serde(default)]
    gz: Option<String>,
}

impl ReleaseData {
    fn version(&self) -> Option<String> {
        match &self.version {
            serde_yaml_ng::Value::String(s) => Some(s.clone()),
            serde_yaml_ng::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Tarball location and its published SHA-256
#[derive(Debug, PartialEq, Eq)]
struct Tarball {
    url: String,
    sha256: String,
}

pub struct RubySource {
    ctx: Collaborators,
    base_url: String,
    releases_data_url: String,
    mirror_index_url: String,
    release_re: Regex,
}

impl RubySource {
    pub fn new(ctx: Collaborators) -> Self {
        Self::with_urls(
            ctx,
            DEFAULT_BASE_URL,
            DEFAULT_RELEASES_DATA_URL,
            DEFAULT_MIRROR_INDEX_URL,
        )
    }

    pub fn with_urls(
        ctx: Collaborators,
        base_url: &str,
        releases_data_url: &str,
        mirror_index_url: &str,
    ) -> Self {
        Self {
            ctx,
            base_url: base_url.trim_end_matches('/').to_string(),
            releases_data_url: releases_data_url.to_string(),
            mirror_index_url: mirror_index_url.to_string(),
            release_re: Regex::new(r">Ruby (\d+\.\d+\.\d+)</td>\n<td>(\d{4}-\d{2}-\d{2})<")
                .unwrap(),
        }
    }

    async fn releases(&self) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let page = self
            .ctx
            .get_text(&format!("{}/en/downloads/releases/", self.base_url))
            .await?;

        let candidates = self
            .release_re
            .captures_iter(&page)
            .map(|caps| {
                Ok(ReleaseCandidate::new(
                    &caps[1],
                    Some(parse_day(&caps[2], &["%Y-%m-%d"])?),
                ))
            })
            .collect::<Result<Vec<_>, DependencyError>>()?;

        self.ctx
            .orderer(NAME, OrderingStrategy::Preordered)
            .order(candidates)
    }

    async fn tarball(&self, version: &str) -> Result<Tarball, DependencyError> {
        if let Some(tarball) = self.tarball_from_release_data(version).await? {
            return Ok(tarball);
        }
        debug!("ruby {}: not in release data, trying mirror index", version);

        self.tarball_from_mirror(version)
            .await?
            .ok_or_else(|| DependencyError::no_source_code(version))
    }

    async fn tarball_from_release_data(
        &self,
        version: &str,
    ) -> Result<Option<Tarball>, DependencyError> {
        let body = self.ctx.get_text(&self.releases_data_url).await?;
        let releases: Vec<ReleaseData> = serde_yaml_ng::from_str(&body)
            .map_err(|e| DependencyError::malformed(&self.releases_data_url, e))?;

        Ok(releases
            .into_iter()
            .find(|r| r.version().as_deref() == Some(version))
            .and_then(|r| match (r.url.gz, r.sha256.gz) {
                (Some(url), Some(sha256)) if !url.is_empty() && !sha256.is_empty() => {
                    Some(Tarball { url, sha256 })
                }
                _ => None,
            }))
    }

    async fn tarball_from_mirror(&self, version: &str) -> Result<Option<Tarball>, DependencyError> {
        let index = self.ctx.get_text(&self.mirror_index_url).await?;
        Ok(parse_mirror_index(&index, version))
    }
}

/// Finds the `.tar.gz` of `version` in the mirror's whitespace separated
/// `name url sha1 sha256 sha512` index.
fn parse_mirror_index(index: &str, version: &str) -> Option<Tarball> {
    let names = [
        format!("ruby-{}", version),
        format!("ruby-{}-0", version),
        format!("ruby-{}-p0", version),
    ];

    index
        .lines()
        .filter(|line| line.starts_with("ruby"))
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|fields| {
            fields.len() >= 4 && names.iter().any(|n| n == fields[0]) && fields[1].ends_with("tar.gz")
        })
        .map(|fields| Tarball {
            url: fields[1].to_string(),
            sha256: fields[3].to_string(),
        })
}

#[async_trait::async_trait]
impl DependencySource for RubySource {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        Ok(self.releases().await?.into_iter().map(|r| r.version).collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        let releases = self.releases().await?;
        let release = find_release(NAME, &releases, version)?;
        let tarball = self.tarball(version).await?;

        let digest = self
            .ctx
            .verifier()
            .verify(
                NAME,
                version,
                &Artifact::from_url(&tarball.url),
                vec![ChecksumCandidate::inline(
                    DigestAlgorithm::Sha256,
                    &tarball.sha256,
                )],
            )
            .await?;

        Ok(ResolvedVersion {
            release_date: release.released_at,
            cpe: Some(format!("cpe:2.3:a:ruby-lang:ruby:{}:*:*:*:*:*:*:*", version)),
            ..self.ctx.finish(NAME, version, &tarball.url, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        dated_release(NAME, &self.releases().await?, version)
    }
}
