//! curl releases from the curl.se release table

use chrono::{DateTime, Utc};
use semver::Version;

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate, Remote};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate, VersionScheme};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, dated_release, find_release, parse_day};
use crate::dependency::types::{ResolvedVersion, VersionRef};

const NAME: &str = "curl";

const VERSION_COLUMN: usize = 1;
const DATE_COLUMN: usize = 3;

/// Default base URL for curl.se
pub const DEFAULT_BASE_URL: &str = "https://curl.se";

/// Default location of the release signing key
pub const DEFAULT_KEY_URL: &str = "https://daniel.haxx.se/mykey.asc";

pub struct CurlSource {
    ctx: Collaborators,
    base_url: String,
    key_url: String,
    scheme: VersionScheme,
}

impl CurlSource {
    pub fn new(ctx: Collaborators) -> Self {
        Self::with_urls(ctx, DEFAULT_BASE_URL, DEFAULT_KEY_URL)
    }

    pub fn with_urls(ctx: Collaborators, base_url: &str, key_url: &str) -> Self {
        Self {
            ctx,
            base_url: base_url.trim_end_matches('/').to_string(),
            key_url: key_url.to_string(),
            scheme: VersionScheme::default(),
        }
    }

    async fn releases(&self) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let url = format!("{}/docs/releases.csv", self.base_url);
        let table = self.ctx.get_text(&url).await?;

        let mut candidates = Vec::new();
        for line in table.lines().filter(|l| !l.trim().is_empty()) {
            let columns: Vec<&str> = line.split(';').collect();
            let (Some(version), Some(date)) = (columns.get(VERSION_COLUMN), columns.get(DATE_COLUMN))
            else {
                return Err(DependencyError::malformed(&url, format!("short row '{}'", line)));
            };

            if !self.has_download(version)? {
                continue;
            }
            candidates.push(ReleaseCandidate::new(
                version.trim(),
                Some(parse_day(date, &["%Y-%m-%d"])?),
            ));
        }

        self.ctx
            .orderer(NAME, OrderingStrategy::ReleaseDate)
            .order(candidates)
    }

    fn semver(&self, version: &str) -> Result<Version, DependencyError> {
        self.scheme
            .classify(version)?
            .ok_or_else(|| DependencyError::malformed(NAME, format!("prerelease '{}'", version)))
    }

    /// Early releases listed in the table that were never published as tarballs
    fn has_download(&self, version: &str) -> Result<bool, DependencyError> {
        let v = self.semver(version)?;
        let missing = (v.major == 4 && v != Version::new(4, 8, 0))
            || (v.major == 5 && v != Version::new(5, 9, 0))
            || v == Version::new(6, 3, 0)
            || v == Version::new(6, 5, 0)
            || v == Version::new(6, 5, 1)
            || v == Version::new(7, 1, 0);
        Ok(!missing)
    }

    fn artifact_url(&self, version: &Version, raw: &str) -> String {
        if *version < Version::new(7, 30, 0) {
            format!("{}/download/archeology/curl-{}.tar.gz", self.base_url, raw)
        } else {
            format!("{}/download/curl-{}.tar.gz", self.base_url, raw)
        }
    }
}

#[async_trait::async_trait]
impl DependencySource for CurlSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        Ok(self.releases().await?.into_iter().map(|r| r.version).collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        let releases = self.releases().await?;
        let release = find_release(NAME, &releases, version)?;
        let semver = self.semver(version)?;

        let uri = self.artifact_url(&semver, version);
        // Signatures are published from 7.30.0 on
        let candidates = if semver > Version::new(7, 29, 0) {
            vec![ChecksumCandidate::signature(
                Remote::url(format!("{}/download/curl-{}.tar.gz.asc", self.base_url, version)),
                Remote::url(&self.key_url),
            )]
        } else {
            Vec::new()
        };

        let digest = self
            .ctx
            .verifier()
            .verify(NAME, version, &Artifact::from_url(&uri), candidates)
            .await?;

        Ok(ResolvedVersion {
            release_date: release.released_at,
            cpe: Some(format!("cpe:2.3:a:haxx:curl:{}:*:*:*:*:*:*:*", version)),
            ..self.ctx.finish(NAME, version, &uri, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        dated_release(NAME, &self.releases().await?, version)
    }
}
