//! Go toolchain releases from the go.dev release history

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate, VersionScheme};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, dated_release, find_release, parse_day};
use crate::dependency::types::{DigestAlgorithm, ResolvedVersion, VersionRef};

const NAME: &str = "go";

/// Default base URL for go.dev
pub const DEFAULT_BASE_URL: &str = "https://go.dev";

/// Default base URL source tarballs are served from
pub const DEFAULT_DOWNLOAD_URL: &str = "https://dl.google.com/go";

#[derive(Debug, Deserialize)]
struct DownloadRelease {
    version: String,
    #[serde(default)]
    files: Vec<DownloadFile>,
}

#[derive(Debug, Deserialize)]
struct DownloadFile {
    #[serde(default)]
    sha256: String,
    kind: String,
}

pub struct GoSource {
    ctx: Collaborators,
    base_url: String,
    download_url: String,
    /// `>go1.22.1 (released 2024-03-05)`
    release_re: Regex,
}

impl GoSource {
    pub fn new(ctx: Collaborators) -> Self {
        Self::with_urls(ctx, DEFAULT_BASE_URL, DEFAULT_DOWNLOAD_URL)
    }

    pub fn with_urls(ctx: Collaborators, base_url: &str, download_url: &str) -> Self {
        Self {
            ctx,
            base_url: base_url.trim_end_matches('/').to_string(),
            download_url: download_url.trim_end_matches('/').to_string(),
            release_re: Regex::new(r">\s*?(go[0-9.]*?)\s*\(released\s*(.*?)\)").unwrap(),
        }
    }

    /// Releases with downloadable files, keyed by version
    async fn downloads(&self) -> Result<HashMap<String, Vec<DownloadFile>>, DependencyError> {
        let releases: Vec<DownloadRelease> = self
            .ctx
            .get_json(&format!("{}/dl/?mode=json&include=all", self.base_url))
            .await?;

        Ok(releases
            .into_iter()
            .map(|release| (release.version, release.files))
            .collect())
    }

    async fn releases(
        &self,
        downloads: &HashMap<String, Vec<DownloadFile>>,
    ) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let page = self
            .ctx
            .get_text(&format!("{}/doc/devel/release", self.base_url))
            .await?;

        let candidates = self
            .release_re
            .captures_iter(&page)
            .filter(|caps| {
                downloads
                    .get(&caps[1])
                    .is_some_and(|files| self.verifiable(&caps[1], files))
            })
            .map(|caps| {
                Ok(ReleaseCandidate::new(
                    &caps[1],
                    Some(parse_day(&caps[2], &["%Y-%m-%d"])?),
                ))
            })
            .collect::<Result<Vec<_>, DependencyError>>()?;

        self.ctx
            .orderer(NAME, OrderingStrategy::ReleaseDate)
            .with_scheme(VersionScheme {
                prefixes: vec!["go".to_string()],
                ..VersionScheme::default()
            })
            .order(candidates)
    }

    /// A source file published without a hash is only listed when a quirk
    /// lets it be hashed unverified
    fn verifiable(&self, version: &str, files: &[DownloadFile]) -> bool {
        let unhashed = files
            .iter()
            .any(|file| file.kind == "source" && file.sha256.is_empty());
        if unhashed && !self.ctx.quirks().allows_unverified(NAME, version) {
            debug!("{} {}: source file has no sha256, not listed", NAME, version);
            return false;
        }
        true
    }
}

#[async_trait::async_trait]
impl DependencySource for GoSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        let downloads = self.downloads().await?;
        Ok(self
            .releases(&downloads)
            .await?
            .into_iter()
            .map(|r| r.version)
            .collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        let downloads = self.downloads().await?;
        let releases = self.releases(&downloads).await?;
        let release = find_release(NAME, &releases, version)?;

        let source = downloads
            .get(version)
            .and_then(|files| files.iter().find(|file| file.kind == "source"))
            .ok_or_else(|| DependencyError::no_source_code(version))?;

        let uri = format!("{}/{}.src.tar.gz", self.download_url, version);
        let candidates = if source.sha256.is_empty() {
            Vec::new()
        } else {
            vec![ChecksumCandidate::inline(
                DigestAlgorithm::Sha256,
                &source.sha256,
            )]
        };

        let digest = self
            .ctx
            .verifier()
            .verify(NAME, version, &Artifact::from_url(&uri), candidates)
            .await?;

        Ok(ResolvedVersion {
            release_date: release.released_at,
            cpe: Some(format!(
                "cpe:2.3:a:golang:go:{}:*:*:*:*:*:*:*",
                version.trim_start_matches("go")
            )),
            ..self.ctx.finish(NAME, version, &uri, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        let downloads = self.downloads().await?;
        dated_release(NAME, &self.releases(&downloads).await?, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::clients::github::MockGithubClient;
    use crate::dependency::integrity::checksummer::FileChecksummer;
    use crate::dependency::quirks::Quirks;
    use crate::dependency::sources::testing::{HELLO_SHA256, collaborators, collaborators_with};
    use chrono::TimeZone;
    use mockito::Server;

    const RELEASE_PAGE: &str = r#"
<p>
  go1.22.1 (released 2024-03-05) includes security fixes.
</p>
<h2 id="go1.22.0">go1.22.0 (released 2024-02-06)</h2>
<p id="go1.21.8">
go1.21.8 (released 2024-03-05) includes security fixes.
</p>
<h2 id="go1.21.0">go1.21.0 (released 2023-08-08)</h2>
<h2 id="go1">go1 (released 2012-03-28)</h2>
"#;

    fn downloads_body() -> String {
        format!(
            r#"[
                {{"version": "go1.22.1", "stable": true, "files": [
                    {{"filename": "go1.22.1.src.tar.gz", "kind": "source", "sha256": "{HELLO_SHA256}"}},
                    {{"filename": "go1.22.1.linux-amd64.tar.gz", "kind": "archive", "sha256": "{zeros}"}}
                ]}},
                {{"version": "go1.22.0", "stable": true, "files": [
                    {{"filename": "go1.22.0.linux-amd64.tar.gz", "kind": "archive", "sha256": "{zeros}"}}
                ]}},
                {{"version": "go1.21.8", "stable": true, "files": [
                    {{"filename": "go1.21.8.src.tar.gz", "kind": "source", "sha256": ""}}
                ]}},
                {{"version": "go1.21.0", "stable": true, "files": []}}
            ]"#,
            zeros = "0".repeat(64)
        )
    }

    async fn mock_upstream(server: &mut mockito::ServerGuard) {
        server
            .mock("GET", "/doc/devel/release")
            .with_status(200)
            .with_body(RELEASE_PAGE)
            .create_async()
            .await;
        server
            .mock("GET", "/dl/")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("mode".into(), "json".into()),
                mockito::Matcher::UrlEncoded("include".into(), "all".into()),
            ]))
            .with_status(200)
            .with_body(downloads_body())
            .create_async()
            .await;
    }

    fn source(server: &mockito::ServerGuard) -> GoSource {
        GoSource::with_urls(collaborators(), &server.url(), &format!("{}/go", server.url()))
    }

    fn quirked_source(server: &mockito::ServerGuard) -> GoSource {
        let quirks = Quirks::from_json(r#"{"go": {"go1.21.8": {"skipVerification": true}}}"#)
            .unwrap();
        GoSource::with_urls(
            collaborators_with(MockGithubClient::new(), FileChecksummer::new(), quirks),
            &server.url(),
            &format!("{}/go", server.url()),
        )
    }

    #[tokio::test]
    async fn list_versions_keeps_releases_with_files_newest_first() {
        let mut server = Server::new_async().await;
        mock_upstream(&mut server).await;

        let versions = source(&server).list_versions().await.unwrap();

        assert_eq!(versions, vec!["go1.22.1", "go1.22.0", "go1.21.0"]);
    }

    #[tokio::test]
    async fn list_versions_keeps_unhashed_source_under_quirk() {
        let mut server = Server::new_async().await;
        mock_upstream(&mut server).await;

        let versions = quirked_source(&server).list_versions().await.unwrap();

        assert_eq!(versions, vec!["go1.22.1", "go1.21.8", "go1.22.0", "go1.21.0"]);
    }

    #[tokio::test]
    async fn resolve_trusts_source_file_sha256() {
        let mut server = Server::new_async().await;
        mock_upstream(&mut server).await;

        let resolved = source(&server).resolve("go1.22.1").await.unwrap();

        assert_eq!(resolved.digest.hex(), HELLO_SHA256);
        assert_eq!(resolved.uri, format!("{}/go/go1.22.1.src.tar.gz", server.url()));
        assert_eq!(
            resolved.release_date,
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(
            resolved.cpe.as_deref(),
            Some("cpe:2.3:a:golang:go:1.22.1:*:*:*:*:*:*:*")
        );
    }

    #[tokio::test]
    async fn resolve_without_source_file_is_no_source_code() {
        let mut server = Server::new_async().await;
        mock_upstream(&mut server).await;

        let err = source(&server).resolve("go1.22.0").await.unwrap_err();

        assert!(err.is_skippable());
    }

    #[tokio::test]
    async fn resolve_with_empty_source_sha_is_not_found() {
        let mut server = Server::new_async().await;
        mock_upstream(&mut server).await;

        let err = source(&server).resolve("go1.21.8").await.unwrap_err();

        assert!(matches!(err, DependencyError::NotFound(_)));
    }

    #[tokio::test]
    async fn resolve_with_empty_source_sha_hashes_download_under_quirk() {
        let mut server = Server::new_async().await;
        mock_upstream(&mut server).await;
        let download = server
            .mock("GET", "/go/go1.21.8.src.tar.gz")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;

        let resolved = quirked_source(&server).resolve("go1.21.8").await.unwrap();

        download.assert_async().await;
        assert_eq!(resolved.digest.hex(), HELLO_SHA256);
    }

    #[tokio::test]
    async fn release_date_of_pruned_release_is_not_found() {
        let mut server = Server::new_async().await;
        mock_upstream(&mut server).await;

        let err = source(&server).release_date("go1").await.unwrap_err();

        assert!(matches!(err, DependencyError::NotFound(_)));
    }
}
