//! PHP releases from the php.net releases API

use std::collections::BTreeMap;

use chrono::{DateTime, Months, Utc};
use serde::Deserialize;

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate, Remote};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate, VersionScheme};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, not_found, parse_day};
use crate::dependency::types::{DigestAlgorithm, ResolvedVersion, VersionRef};

const NAME: &str = "php";

const DATE_FORMATS: &[&str] = &["%d %b %Y", "%d %B %Y"];

/// Support window assumed for every release
const SUPPORT_MONTHS: u32 = 36;

/// Default base URL for php.net
pub const DEFAULT_BASE_URL: &str = "https://www.php.net";

/// Default base URL of the archive of retired releases
pub const DEFAULT_MUSEUM_URL: &str = "https://museum.php.net";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRelease {
    date: String,
    source: Vec<SourceFile>,
    museum: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SourceFile {
    filename: String,
    sha256: String,
    md5: String,
}

pub struct PhpSource {
    ctx: Collaborators,
    base_url: String,
    museum_url: String,
}

impl PhpSource {
    pub fn new(ctx: Collaborators) -> Self {
        Self::with_urls(ctx, DEFAULT_BASE_URL, DEFAULT_MUSEUM_URL)
    }

    pub fn with_urls(ctx: Collaborators, base_url: &str, museum_url: &str) -> Self {
        Self {
            ctx,
            base_url: base_url.trim_end_matches('/').to_string(),
            museum_url: museum_url.trim_end_matches('/').to_string(),
        }
    }

    fn scheme() -> VersionScheme {
        VersionScheme {
            // `4.0pl1` style patch levels are final releases
            final_markers: vec!["pl".to_string()],
            ..VersionScheme::default()
        }
    }

    async fn releases(&self) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let lines: BTreeMap<String, serde_json::Value> = self
            .ctx
            .get_json(&format!("{}/releases/index.php?json", self.base_url))
            .await?;

        // Sorted maps keep the input to the orderer stable, so duplicate
        // spellings of one version always resolve the same way.
        let mut candidates = Vec::new();
        for line in lines.into_keys().filter(|line| line != "3") {
            let releases: BTreeMap<String, RawRelease> = self
                .ctx
                .get_json(&format!(
                    "{}/releases/index.php?json&version={}&max=1000",
                    self.base_url, line
                ))
                .await?;

            for (version, release) in releases {
                let date = parse_day(&release.date, DATE_FORMATS)?;
                candidates.push(ReleaseCandidate::new(version, Some(date)));
            }
        }

        self.ctx
            .orderer(NAME, OrderingStrategy::ReleaseDate)
            .with_scheme(Self::scheme())
            .order(candidates)
    }

    /// Metadata of a single final release
    async fn release(&self, version: &str) -> Result<RawRelease, DependencyError> {
        if Self::scheme().classify(version)?.is_none() {
            return Err(not_found(NAME, version));
        }

        let release: RawRelease = self
            .ctx
            .get_json(&format!(
                "{}/releases/index.php?json&version={}",
                self.base_url, version
            ))
            .await?;

        // Unknown versions come back as `{"error": ...}`
        if release.date.is_empty() {
            return Err(not_found(NAME, version));
        }
        Ok(release)
    }

    fn artifact_url(&self, release: &RawRelease, version: &str) -> String {
        if release.museum {
            let major = version.split('.').next().unwrap_or(version);
            format!("{}/php{}/php-{}.tar.gz", self.museum_url, major, version)
        } else {
            format!("{}/distributions/php-{}.tar.gz", self.base_url, version)
        }
    }
}

#[async_trait::async_trait]
impl DependencySource for PhpSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        Ok(self.releases().await?.into_iter().map(|r| r.version).collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        let release = self.release(version).await?;
        let release_date = parse_day(&release.date, DATE_FORMATS)?;

        let tarball = release
            .source
            .iter()
            .find(|file| file.filename.ends_with(".gz"))
            .ok_or_else(|| DependencyError::no_source_code(version))?;

        let candidates = if !tarball.sha256.is_empty() {
            vec![ChecksumCandidate::inline(
                DigestAlgorithm::Sha256,
                &tarball.sha256,
            )]
        } else if !tarball.md5.is_empty() {
            vec![ChecksumCandidate::inline(DigestAlgorithm::Md5, &tarball.md5)]
        } else {
            Vec::new()
        };

        let uri = self.artifact_url(&release, version);
        let digest = self
            .ctx
            .verifier()
            .verify(
                NAME,
                version,
                &Artifact::new(&tarball.filename, Remote::url(&uri)),
                candidates,
            )
            .await?;

        Ok(ResolvedVersion {
            release_date: Some(release_date),
            deprecation_date: release_date.checked_add_months(Months::new(SUPPORT_MONTHS)),
            cpe: Some(format!("cpe:2.3:a:php:php:{}:*:*:*:*:*:*:*", version)),
            ..self.ctx.finish(NAME, version, &uri, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        let release = self.release(version).await?;
        parse_day(&release.date, DATE_FORMATS)
    }
}
