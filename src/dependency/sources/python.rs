//! CPython releases scraped from python.org

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, find_release, parse_day};
use crate::dependency::types::{DigestAlgorithm, ResolvedVersion, VersionRef};

const NAME: &str = "python";

/// How many lines below an anchor the related table cell may appear
const LOOKAHEAD: usize = 3;

/// Default base URL for python.org
pub const DEFAULT_BASE_URL: &str = "https://www.python.org";

/// What a release page tells about one version
#[derive(Debug)]
struct ReleasePage {
    source_uri: String,
    release_date: DateTime<Utc>,
    md5s: Vec<String>,
}

pub struct PythonSource {
    ctx: Collaborators,
    base_url: String,
    release_number_re: Regex,
    release_date_re: Regex,
    source_uri_re: Regex,
    md5_cell_re: Regex,
    md5_listing_re: Regex,
    md5_literal_re: Regex,
    support_end_re: Regex,
}

impl PythonSource {
    pub fn new(ctx: Collaborators) -> Self {
        Self::with_base_url(ctx, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(ctx: Collaborators, base_url: &str) -> Self {
        Self {
            ctx,
            base_url: base_url.trim_end_matches('/').to_string(),
            release_number_re: Regex::new(r"release-number.*Python (\d+\.\d+\.\d+)<").unwrap(),
            release_date_re: Regex::new(r"Release Date:</strong> (\w{3})[\w.]* (\d+, \d+)")
                .unwrap(),
            source_uri_re: Regex::new(r#"<a href="(.*)">Gzipped source tar ?ball"#).unwrap(),
            md5_cell_re: Regex::new(r"<td>([0-9a-f]{32})</td>").unwrap(),
            md5_listing_re: Regex::new(r"([0-9a-f]{32}).*\d+.*\.tgz").unwrap(),
            md5_literal_re: Regex::new(r"<tt .*>([0-9a-f]{32})</tt>.*\.tgz").unwrap(),
            support_end_re: Regex::new(r#"release-end">(\d{4}-\d{2})(-\d{2})?"#).unwrap(),
        }
    }

    async fn downloads_page(&self) -> Result<String, DependencyError> {
        self.ctx
            .get_text(&format!("{}/downloads/", self.base_url))
            .await
    }

    fn releases(&self, page: &str) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let candidates = self
            .release_number_re
            .captures_iter(page)
            .map(|caps| ReleaseCandidate::undated(&caps[1]))
            .collect();

        self.ctx
            .orderer(NAME, OrderingStrategy::Preordered)
            .order(candidates)
    }

    /// End of support of the `major.minor` line of `version`, if the
    /// downloads page lists one
    fn support_end(&self, page: &str, version: &str) -> Option<DateTime<Utc>> {
        let line = version.split('.').take(2).collect::<Vec<_>>().join(".");
        let anchor = format!(r#"release-version">{}<"#, line);

        let lines: Vec<&str> = page.lines().collect();
        let index = lines.iter().position(|l| l.contains(&anchor))?;

        lines
            .iter()
            .skip(index + 1)
            .take(LOOKAHEAD)
            .find_map(|l| self.support_end_re.captures(l))
            .and_then(|caps| {
                let day = caps.get(2).map_or("-01", |d| d.as_str());
                parse_day(&format!("{}{}", &caps[1], day), &["%Y-%m-%d"]).ok()
            })
    }

    async fn release_page(&self, version: &str) -> Result<ReleasePage, DependencyError> {
        let url = format!(
            "{}/downloads/release/python-{}/",
            self.base_url,
            version.replace('.', "")
        );
        let page = self.ctx.get_text(&url).await?;
        let lines: Vec<&str> = page.lines().collect();

        let mut release_date = None;
        let mut source_uri = None;
        let mut md5s = Vec::new();

        for (index, line) in lines.iter().enumerate() {
            if let Some(caps) = self.release_date_re.captures(line) {
                release_date = Some(format!("{} {}", &caps[1], &caps[2]));
            } else if let Some(caps) = self.source_uri_re.captures(line) {
                source_uri = Some(caps[1].to_string());
                md5s.extend(
                    lines
                        .iter()
                        .skip(index + 1)
                        .take(LOOKAHEAD)
                        .filter_map(|l| self.md5_cell_re.captures(l))
                        .map(|caps| caps[1].to_string()),
                );
            } else if let Some(caps) = self
                .md5_listing_re
                .captures(line)
                .or_else(|| self.md5_literal_re.captures(line))
            {
                md5s.push(caps[1].to_string());
            }
        }

        let source_uri = source_uri.ok_or_else(|| DependencyError::no_source_code(version))?;
        let release_date = release_date
            .ok_or_else(|| DependencyError::malformed(&url, "no release date"))?;

        Ok(ReleasePage {
            source_uri: self.absolute(&source_uri),
            release_date: parse_day(&release_date, &["%b %d, %Y"])?,
            md5s,
        })
    }

    fn absolute(&self, uri: &str) -> String {
        if uri.starts_with('/') {
            format!("{}{}", self.base_url, uri)
        } else {
            uri.to_string()
        }
    }
}

#[async_trait::async_trait]
impl DependencySource for PythonSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        let page = self.downloads_page().await?;
        Ok(self
            .releases(&page)?
            .into_iter()
            .map(|r| r.version)
            .collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        let downloads = self.downloads_page().await?;
        find_release(NAME, &self.releases(&downloads)?, version)?;

        let release = self.release_page(version).await?;
        let candidates = release
            .md5s
            .iter()
            .map(|md5| ChecksumCandidate::inline(DigestAlgorithm::Md5, md5))
            .collect();

        let digest = self
            .ctx
            .verifier()
            .verify(
                NAME,
                version,
                &Artifact::from_url(&release.source_uri),
                candidates,
            )
            .await?;

        Ok(ResolvedVersion {
            release_date: Some(release.release_date),
            deprecation_date: self.support_end(&downloads, version),
            cpe: Some(format!("cpe:2.3:a:python:python:{}:*:*:*:*:*:*:*", version)),
            ..self
                .ctx
                .finish(NAME, version, &release.source_uri, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        let downloads = self.downloads_page().await?;
        find_release(NAME, &self.releases(&downloads)?, version)?;
        Ok(self.release_page(version).await?.release_date)
    }
}
