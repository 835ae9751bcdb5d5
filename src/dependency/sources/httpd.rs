//! Apache httpd releases from the archive.apache.org directory index

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate, Remote};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, dated_release, find_release};
use crate::dependency::types::{DigestAlgorithm, ResolvedVersion, VersionRef};

const NAME: &str = "httpd";

/// Companion checksum files, strongest first
const CHECKSUM_FILES: &[(DigestAlgorithm, &str)] = &[
    (DigestAlgorithm::Sha256, "sha256"),
    (DigestAlgorithm::Sha1, "sha1"),
    (DigestAlgorithm::Md5, "md5"),
];

/// Default base URL of the httpd archive
pub const DEFAULT_BASE_URL: &str = "http://archive.apache.org/dist/httpd";

pub struct HttpdSource {
    ctx: Collaborators,
    base_url: String,
    /// `>httpd-2.4.59.tar.bz2</a> ... 2024-04-04 12:34`
    entry_re: Regex,
}

impl HttpdSource {
    pub fn new(ctx: Collaborators) -> Self {
        Self::with_base_url(ctx, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(ctx: Collaborators, base_url: &str) -> Self {
        Self {
            ctx,
            base_url: base_url.trim_end_matches('/').to_string(),
            entry_re: Regex::new(r">httpd-([\d\.]+)\.tar\.bz2<.*(\d\d\d\d-\d\d-\d\d \d\d:\d\d)")
                .unwrap(),
        }
    }

    /// The directory listing of tarballs and their checksum files
    async fn index(&self) -> Result<String, DependencyError> {
        self.ctx
            .get_text(&format!(
                "{}/?F=2&C=M&O=D&P=httpd-*.tar.bz2*",
                self.base_url
            ))
            .await
    }

    fn releases(&self, index: &str) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let candidates = index
            .lines()
            .filter_map(|line| self.entry_re.captures(line))
            .map(|caps| {
                let date = NaiveDateTime::parse_from_str(&caps[2], "%Y-%m-%d %H:%M")
                    .map_err(|e| {
                        DependencyError::malformed(
                            "httpd archive index",
                            format!("date '{}' of {}: {}", &caps[2], &caps[1], e),
                        )
                    })?
                    .and_utc();
                Ok(ReleaseCandidate::new(&caps[1], Some(date)))
            })
            .collect::<Result<Vec<_>, DependencyError>>()?;

        self.ctx
            .orderer(NAME, OrderingStrategy::ReleaseDate)
            .order(candidates)
    }
}

#[async_trait::async_trait]
impl DependencySource for HttpdSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        let index = self.index().await?;
        Ok(self.releases(&index)?.into_iter().map(|r| r.version).collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        let index = self.index().await?;
        let releases = self.releases(&index)?;
        let release = find_release(NAME, &releases, version)?;

        let file_name = format!("httpd-{}.tar.bz2", version);
        let uri = format!("{}/{}", self.base_url, file_name);

        // Only checksum files the index actually lists are offered
        let candidates = CHECKSUM_FILES
            .iter()
            .map(|(algorithm, extension)| (algorithm, format!("{}.{}", file_name, extension)))
            .filter(|(_, checksum_file)| index.contains(checksum_file.as_str()))
            .map(|(algorithm, checksum_file)| {
                ChecksumCandidate::listing(
                    *algorithm,
                    Remote::url(format!("{}/{}", self.base_url, checksum_file)),
                    &file_name,
                )
            })
            .collect();

        let digest = self
            .ctx
            .verifier()
            .verify(
                NAME,
                version,
                &Artifact::new(&file_name, Remote::url(&uri)),
                candidates,
            )
            .await?;

        Ok(ResolvedVersion {
            release_date: release.released_at,
            cpe: Some(format!(
                "cpe:2.3:a:apache:http_server:{}:*:*:*:*:*:*:*",
                version
            )),
            ..self.ctx.finish(NAME, version, &uri, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        let index = self.index().await?;
        dated_release(NAME, &self.releases(&index)?, version)
    }
}
