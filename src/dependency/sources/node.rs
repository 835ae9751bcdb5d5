//! Node.js releases from the nodejs.org distribution index

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate, Remote};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, dated_release, find_release, parse_day};
use crate::dependency::types::{DigestAlgorithm, ResolvedVersion, VersionRef};

const NAME: &str = "node";

/// Default base URL of the distribution server
pub const DEFAULT_DIST_URL: &str = "https://nodejs.org/dist";

/// Default location of the release schedule (end-of-life dates per line)
pub const DEFAULT_SCHEDULE_URL: &str =
    "https://raw.githubusercontent.com/nodejs/Release/master/schedule.json";

#[derive(Debug, Deserialize)]
struct IndexEntry {
    version: String,
    date: String,
}

#[derive(Debug, Deserialize)]
struct ScheduleEntry {
    end: Option<String>,
}

pub struct NodeSource {
    ctx: Collaborators,
    dist_url: String,
    schedule_url: String,
}

impl NodeSource {
    pub fn new(ctx: Collaborators) -> Self {
        Self::with_urls(ctx, DEFAULT_DIST_URL, DEFAULT_SCHEDULE_URL)
    }

    pub fn with_urls(ctx: Collaborators, dist_url: &str, schedule_url: &str) -> Self {
        Self {
            ctx,
            dist_url: dist_url.trim_end_matches('/').to_string(),
            schedule_url: schedule_url.to_string(),
        }
    }

    async fn releases(&self) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let index: Vec<IndexEntry> = self
            .ctx
            .get_json(&format!("{}/index.json", self.dist_url))
            .await?;

        let candidates = index
            .into_iter()
            .map(|entry| {
                let date = parse_day(&entry.date, &["%Y-%m-%d"])?;
                Ok(ReleaseCandidate::new(entry.version, Some(date)))
            })
            .collect::<Result<Vec<_>, DependencyError>>()?;

        self.ctx
            .orderer(NAME, OrderingStrategy::ReleaseDate)
            .order(candidates)
    }

    /// End of life of the release line `version` belongs to
    async fn deprecation_date(
        &self,
        version: &str,
    ) -> Result<Option<DateTime<Utc>>, DependencyError> {
        let schedule: HashMap<String, ScheduleEntry> =
            self.ctx.get_json(&self.schedule_url).await?;

        let line = schedule_key(version);
        let end = schedule.get(&line).and_then(|entry| entry.end.as_deref());
        match end.map(|end| parse_day(end, &["%Y-%m-%d"])) {
            Some(Ok(date)) => Ok(Some(date)),
            Some(Err(e)) => {
                debug!("ignoring end of life of {}: {}", line, e);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// `v22.1.0` -> `v22`; the 0.x lines are keyed by minor (`v0.12`)
fn schedule_key(version: &str) -> String {
    let mut parts = version.split('.');
    match (parts.next(), parts.next()) {
        (Some("v0"), Some(minor)) => format!("v0.{}", minor),
        (Some(major), _) => major.to_string(),
        _ => version.to_string(),
    }
}

#[async_trait::async_trait]
impl DependencySource for NodeSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        Ok(self.releases().await?.into_iter().map(|r| r.version).collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        let releases = self.releases().await?;
        let release = find_release(NAME, &releases, version)?;

        let file_name = format!("node-{}.tar.gz", version);
        let uri = format!("{}/{}/{}", self.dist_url, version, file_name);
        let checksums = Remote::url(format!("{}/{}/SHASUMS256.txt", self.dist_url, version));

        let digest = self
            .ctx
            .verifier()
            .verify(
                NAME,
                version,
                &Artifact::new(&file_name, Remote::url(&uri)),
                vec![ChecksumCandidate::listing(
                    DigestAlgorithm::Sha256,
                    checksums,
                    &file_name,
                )],
            )
            .await?;

        Ok(ResolvedVersion {
            release_date: release.released_at,
            deprecation_date: self.deprecation_date(version).await?,
            cpe: Some(format!(
                "cpe:2.3:a:nodejs:node.js:{}:*:*:*:*:*:*:*",
                version.trim_start_matches('v')
            )),
            ..self.ctx.finish(NAME, version, &uri, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        dated_release(NAME, &self.releases().await?, version)
    }
}
