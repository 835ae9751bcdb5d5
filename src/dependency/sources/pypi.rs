//! Source distributions of a PyPI project (pip, pipenv)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate, VersionScheme};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, dated_release, find_release, parse_timestamp};
use crate::dependency::types::{DigestAlgorithm, ResolvedVersion, VersionRef};

/// Default base URL for pypi.org
pub const DEFAULT_BASE_URL: &str = "https://pypi.org";

#[derive(Debug, Deserialize)]
struct ProjectMetadata {
    #[serde(default)]
    releases: HashMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    packagetype: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    upload_time_iso_8601: String,
    #[serde(default)]
    digests: HashMap<String, String>,
}

/// The sdist chosen for one version
#[derive(Debug, Clone)]
struct Sdist {
    url: String,
    sha256: String,
}

pub struct PypiSource {
    ctx: Collaborators,
    project: String,
    base_url: String,
}

impl PypiSource {
    pub fn new(ctx: Collaborators, project: &str) -> Self {
        Self::with_base_url(ctx, project, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(ctx: Collaborators, project: &str, base_url: &str) -> Self {
        Self {
            ctx,
            project: project.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Ordered catalog plus the sdist of every listed version
    async fn releases(
        &self,
    ) -> Result<(Vec<ReleaseCandidate>, HashMap<String, Sdist>), DependencyError> {
        let metadata: ProjectMetadata = self
            .ctx
            .get_json(&format!("{}/pypi/{}/json", self.base_url, self.project))
            .await?;

        let mut candidates = Vec::new();
        let mut sdists = HashMap::new();
        for (version, files) in metadata.releases {
            // Old releases sometimes carry a .zip next to the .tar.gz
            let mut files: Vec<_> = files
                .into_iter()
                .filter(|f| f.packagetype == "sdist")
                .collect();
            files.sort_by_key(|f| !f.url.ends_with(".tar.gz"));

            let Some(file) = files.into_iter().next() else {
                continue;
            };

            let uploaded = parse_timestamp(&file.upload_time_iso_8601)?;
            let sha256 = file
                .digests
                .get("sha256")
                .filter(|sha| !sha.is_empty())
                .cloned()
                .ok_or_else(|| {
                    DependencyError::malformed(
                        &self.project,
                        format!("no sha256 for version {}", version),
                    )
                })?;

            candidates.push(ReleaseCandidate::new(&version, Some(uploaded)));
            sdists.insert(
                version,
                Sdist {
                    url: file.url,
                    sha256,
                },
            );
        }

        let ordered = self
            .ctx
            .orderer(&self.project, OrderingStrategy::ReleaseDate)
            .with_scheme(VersionScheme::pep440())
            .order(candidates)?;
        Ok((ordered, sdists))
    }
}

#[async_trait::async_trait]
impl DependencySource for PypiSource {
    fn name(&self) -> &str {
        &self.project
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        let (releases, _) = self.releases().await?;
        Ok(releases.into_iter().map(|r| r.version).collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        let (releases, sdists) = self.releases().await?;
        let release = find_release(&self.project, &releases, version)?;
        let sdist = sdists
            .get(version)
            .ok_or_else(|| DependencyError::no_source_code(version))?;

        let digest = self
            .ctx
            .verifier()
            .verify(
                &self.project,
                version,
                &Artifact::from_url(&sdist.url),
                vec![ChecksumCandidate::inline(
                    DigestAlgorithm::Sha256,
                    &sdist.sha256,
                )],
            )
            .await?;

        Ok(ResolvedVersion {
            release_date: release.released_at,
            ..self.ctx.finish(&self.project, version, &sdist.url, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        let (releases, _) = self.releases().await?;
        dated_release(&self.project, &releases, version)
    }
}
