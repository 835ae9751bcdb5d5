//! .NET products from the dotnet release metadata
//!
//! The SDK, the runtime and the ASP.NET Core runtime share one catalog
//! layout: a release index naming every channel (`8.0`, `7.0`, ...) and one
//! `releases.json` per channel. `DotnetSource` walks that layout once; a
//! `DotnetProduct` picks out the product-specific parts of each release.

mod product;

pub use product::{AspNetCore, DotnetRuntime, DotnetSdk};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::dependency::error::DependencyError;
use crate::dependency::integrity::{Artifact, ChecksumCandidate, Remote};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate, VersionScheme};
use crate::dependency::quirks::Quirks;
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{Collaborators, not_found, parse_day};
use crate::dependency::types::{DigestAlgorithm, ResolvedVersion, VersionRef};

/// Default base URL of the release metadata
pub const DEFAULT_BASE_URL: &str =
    "https://dotnetcli.blob.core.windows.net/dotnet/release-metadata";

/// Runtime identifiers of the Linux archive, in order of preference
const LINUX_RIDS: &[&str] = &["linux-x64", "ubuntu-x64"];

const DATE_FORMAT: &[&str] = &["%Y-%m-%d"];

#[derive(Debug, Deserialize)]
struct ReleaseIndex {
    #[serde(rename = "releases-index")]
    channels: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    #[serde(rename = "channel-version")]
    channel_version: String,
}

/// One `releases.json`
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Channel {
    pub eol_date: Option<String>,
    pub releases: Vec<ChannelRelease>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ChannelRelease {
    pub release_date: String,
    pub sdk: Option<Component>,
    pub sdks: Vec<Component>,
    pub runtime: Option<Component>,
    pub aspnetcore_runtime: Option<Component>,
}

/// One product build inside a release
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Component {
    pub version: String,
    pub files: Vec<ReleaseFile>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ReleaseFile {
    pub name: String,
    pub rid: String,
    pub url: String,
    pub hash: String,
}

/// What distinguishes one .NET product from another
pub trait DotnetProduct: Send + Sync {
    /// Ecosystem name, e.g. `dotnet-sdk`
    fn name(&self) -> &'static str;

    /// Builds of this product shipped with `release`
    fn components<'a>(&self, release: &'a ChannelRelease) -> Vec<&'a Component>;

    /// Channel whose `releases.json` lists `version`
    fn channel(&self, _quirks: &Quirks, version: &str) -> String {
        major_minor(version)
    }

    fn cpe(&self, version: &str) -> Result<Option<String>, DependencyError>;
}

/// `8.0.4` -> `8.0`
pub(crate) fn major_minor(version: &str) -> String {
    version.split('.').take(2).collect::<Vec<_>>().join(".")
}

pub struct DotnetSource<P> {
    ctx: Collaborators,
    base_url: String,
    product: P,
}

impl<P: DotnetProduct> DotnetSource<P> {
    pub fn new(ctx: Collaborators, product: P) -> Self {
        Self::with_base_url(ctx, product, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(ctx: Collaborators, product: P, base_url: &str) -> Self {
        Self {
            ctx,
            base_url: base_url.trim_end_matches('/').to_string(),
            product,
        }
    }

    async fn channel(&self, channel: &str) -> Result<Channel, DependencyError> {
        self.ctx
            .get_json(&format!("{}/{}/releases.json", self.base_url, channel))
            .await
    }

    /// Versions of one channel, oldest release first, each at its first
    /// appearance
    fn channel_candidates(&self, channel: &Channel) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let mut candidates: Vec<ReleaseCandidate> = Vec::new();
        for release in channel.releases.iter().rev() {
            let date = parse_day(&release.release_date, DATE_FORMAT)?;
            for component in self.product.components(release) {
                if component.version.is_empty()
                    || candidates.iter().any(|c| c.version == component.version)
                    || !self.verifiable(channel, &component.version)
                {
                    continue;
                }
                candidates.push(ReleaseCandidate::new(&component.version, Some(date)));
            }
        }
        Ok(candidates)
    }

    async fn releases(&self) -> Result<Vec<ReleaseCandidate>, DependencyError> {
        let index: ReleaseIndex = self
            .ctx
            .get_json(&format!("{}/releases-index.json", self.base_url))
            .await?;

        let mut channels = Vec::with_capacity(index.channels.len());
        for entry in &index.channels {
            let channel = self.channel(&entry.channel_version).await?;
            channels.push(self.channel_candidates(&channel)?);
        }

        self.ctx
            .orderer(self.product.name(), OrderingStrategy::ReleaseDate)
            .order_channels(channels)
    }

    /// A Linux archive published with an empty hash is only listed when a
    /// quirk lets it be hashed unverified
    fn verifiable(&self, channel: &Channel, version: &str) -> bool {
        let name = self.product.name();
        let unhashed = channel
            .releases
            .iter()
            .find(|release| {
                self.product
                    .components(release)
                    .iter()
                    .any(|c| c.version == version)
            })
            .and_then(|release| self.linux_file(release, version))
            .is_some_and(|file| file.hash.trim().is_empty());

        if unhashed && !self.ctx.quirks().allows_unverified(name, version) {
            debug!("{} {}: linux archive has no hash, not listed", name, version);
            return false;
        }
        true
    }

    /// The channel listing `version` and the release that shipped it
    async fn locate(&self, version: &str) -> Result<(Channel, usize), DependencyError> {
        if !matches!(VersionScheme::default().classify(version), Ok(Some(_))) {
            return Err(not_found(self.product.name(), version));
        }

        let channel = self
            .channel(&self.product.channel(self.ctx.quirks(), version))
            .await?;
        let index = channel
            .releases
            .iter()
            .position(|release| {
                self.product
                    .components(release)
                    .iter()
                    .any(|c| c.version == version)
            })
            .ok_or_else(|| not_found(self.product.name(), version))?;

        if !self.verifiable(&channel, version) {
            return Err(not_found(self.product.name(), version));
        }
        Ok((channel, index))
    }

    fn linux_file<'a>(&self, release: &'a ChannelRelease, version: &str) -> Option<&'a ReleaseFile> {
        let files: Vec<&ReleaseFile> = self
            .product
            .components(release)
            .into_iter()
            .filter(|c| c.version == version)
            .flat_map(|c| c.files.iter())
            .collect();

        LINUX_RIDS
            .iter()
            .find_map(|rid| files.iter().find(|f| f.rid == *rid).copied())
    }
}

/// SHA-256 when the published hash has its length, SHA-512 otherwise
fn hash_candidates(hash: &str) -> Vec<ChecksumCandidate> {
    let hash = hash.trim();
    if hash.is_empty() {
        Vec::new()
    } else if hash.len() == DigestAlgorithm::Sha256.hex_len() {
        vec![ChecksumCandidate::inline(DigestAlgorithm::Sha256, hash)]
    } else {
        vec![ChecksumCandidate::inline(DigestAlgorithm::Sha512, hash)]
    }
}

#[async_trait::async_trait]
impl<P: DotnetProduct> DependencySource for DotnetSource<P> {
    fn name(&self) -> &str {
        self.product.name()
    }

    async fn list_versions(&self) -> Result<Vec<VersionRef>, DependencyError> {
        Ok(self.releases().await?.into_iter().map(|r| r.version).collect())
    }

    async fn resolve(&self, version: &str) -> Result<ResolvedVersion, DependencyError> {
        let name = self.product.name();
        let (channel, index) = self.locate(version).await?;
        let release = &channel.releases[index];

        let file = self
            .linux_file(release, version)
            .ok_or_else(|| DependencyError::no_source_code(version))?;

        let artifact = Artifact::new(&file.name, Remote::url(&file.url));
        let digest = self
            .ctx
            .verifier()
            .verify(name, version, &artifact, hash_candidates(&file.hash))
            .await?;

        let deprecation_date = channel
            .eol_date
            .as_deref()
            .filter(|date| !date.is_empty())
            .map(|date| parse_day(date, DATE_FORMAT))
            .transpose()?;

        Ok(ResolvedVersion {
            release_date: Some(parse_day(&release.release_date, DATE_FORMAT)?),
            deprecation_date,
            cpe: self.product.cpe(version)?,
            ..self.ctx.finish(name, version, &file.url, digest)
        })
    }

    async fn release_date(&self, version: &str) -> Result<DateTime<Utc>, DependencyError> {
        let (channel, index) = self.locate(version).await?;
        parse_day(&channel.releases[index].release_date, DATE_FORMAT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::clients::github::MockGithubClient;
    use crate::dependency::integrity::checksummer::FileChecksummer;
    use crate::dependency::sources::testing::{
        HELLO_SHA256, HELLO_SHA512, collaborators, collaborators_with,
    };
    use chrono::TimeZone;
    use mockito::Server;
    use rstest::rstest;

    const INDEX: &str = r#"{"releases-index": [
        {"channel-version": "8.0"},
        {"channel-version": "2.0"}
    ]}"#;

    fn channel_8(runtime_hash: &str, sdk_rid: &str) -> String {
        format!(
            r#"{{
            "channel-version": "8.0",
            "eol-date": "2026-11-10",
            "releases": [
                {{
                    "release-date": "2024-04-09",
                    "runtime": {{"version": "8.0.4", "files": [
                        {{"name": "dotnet-runtime-win-x64.zip", "rid": "win-x64", "url": "https://dl.test/win.zip", "hash": "00"}},
                        {{"name": "dotnet-runtime-linux-x64.tar.gz", "rid": "linux-x64", "url": "{{url}}/runtime-8.0.4.tar.gz", "hash": "{runtime_hash}"}}
                    ]}},
                    "sdk": {{"version": "8.0.204", "files": [
                        {{"name": "dotnet-sdk.tar.gz", "rid": "{sdk_rid}", "url": "https://dl.test/sdk-8.0.204.tar.gz", "hash": "{sha256}"}}
                    ]}},
                    "sdks": [
                        {{"version": "8.0.204", "files": []}},
                        {{"version": "8.0.104", "files": []}}
                    ],
                    "aspnetcore-runtime": {{"version": "8.0.4", "files": []}}
                }},
                {{
                    "release-date": "2024-03-12",
                    "runtime": {{"version": "8.0.3", "files": []}},
                    "sdk": {{"version": "8.0.203", "files": []}},
                    "sdks": [{{"version": "8.0.104", "files": []}}],
                    "aspnetcore-runtime": {{"version": "8.0.3", "files": []}}
                }},
                {{
                    "release-date": "2023-10-10",
                    "runtime": {{"version": "8.0.0-rc.2.23479.6", "files": []}},
                    "sdk": {{"version": "8.0.100-rc.2.23502.2", "files": []}},
                    "aspnetcore-runtime": {{"version": "8.0.0-rc.2.23480.2", "files": []}}
                }}
            ]
        }}"#,
            sha256 = HELLO_SHA256
        )
    }

    const CHANNEL_2: &str = r#"{
        "channel-version": "2.0",
        "eol-date": "2018-10-01",
        "releases": [
            {
                "release-date": "2018-05-08",
                "runtime": {"version": "2.0.7", "files": []},
                "sdk": {"version": "2.1.200", "files": [
                    {"name": "dotnet-sdk-2.1.200-linux-x64.tar.gz", "rid": "ubuntu-x64", "url": "https://dl.test/sdk-2.1.200.tar.gz",
                     "hash": "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824"}
                ]}
            }
        ]
    }"#;

    async fn server(channel: String) -> mockito::ServerGuard {
        let mut server = Server::new_async().await;
        let channel = channel.replace("{url}", &server.url());
        for (path, body) in [
            ("/releases-index.json", INDEX.to_string()),
            ("/8.0/releases.json", channel),
            ("/2.0/releases.json", CHANNEL_2.to_string()),
        ] {
            server
                .mock("GET", path)
                .with_status(200)
                .with_body(body)
                .create_async()
                .await;
        }
        server
            .mock("GET", "/runtime-8.0.4.tar.gz")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;
        server
    }

    #[tokio::test]
    async fn list_versions_orders_sdks_across_channels() {
        let server = server(channel_8(HELLO_SHA512, "linux-x64")).await;

        let versions = DotnetSource::with_base_url(collaborators(), DotnetSdk, &server.url())
            .list_versions()
            .await
            .unwrap();

        assert_eq!(versions, vec!["8.0.204", "8.0.203", "8.0.104", "2.1.200"]);
    }

    #[tokio::test]
    async fn list_versions_of_runtime() {
        let server = server(channel_8(HELLO_SHA512, "linux-x64")).await;

        let versions =
            DotnetSource::with_base_url(collaborators(), DotnetRuntime, &server.url())
                .list_versions()
                .await
                .unwrap();

        assert_eq!(versions, vec!["8.0.4", "8.0.3", "2.0.7"]);
    }

    fn quirked_runtime(server: &mockito::ServerGuard) -> DotnetSource<DotnetRuntime> {
        let quirks =
            Quirks::from_json(r#"{"dotnet-runtime": {"8.0.4": {"skipVerification": true}}}"#)
                .unwrap();
        DotnetSource::with_base_url(
            collaborators_with(MockGithubClient::new(), FileChecksummer::new(), quirks),
            DotnetRuntime,
            &server.url(),
        )
    }

    #[tokio::test]
    async fn list_versions_drops_archive_with_empty_hash() {
        let server = server(channel_8("", "linux-x64")).await;

        let versions =
            DotnetSource::with_base_url(collaborators(), DotnetRuntime, &server.url())
                .list_versions()
                .await
                .unwrap();

        assert_eq!(versions, vec!["8.0.3", "2.0.7"]);
    }

    #[tokio::test]
    async fn resolve_archive_with_empty_hash_is_not_found() {
        let server = server(channel_8("", "linux-x64")).await;

        let err = DotnetSource::with_base_url(collaborators(), DotnetRuntime, &server.url())
            .resolve("8.0.4")
            .await
            .unwrap_err();

        assert!(matches!(err, DependencyError::NotFound(_)));
    }

    #[tokio::test]
    async fn archive_with_empty_hash_is_listed_and_hashed_under_quirk() {
        let server = server(channel_8("", "linux-x64")).await;
        let source = quirked_runtime(&server);

        let versions = source.list_versions().await.unwrap();
        let resolved = source.resolve("8.0.4").await.unwrap();

        assert_eq!(versions, vec!["8.0.4", "8.0.3", "2.0.7"]);
        assert_eq!(resolved.digest.hex(), HELLO_SHA256);
    }

    #[tokio::test]
    async fn resolve_runtime_verifies_sha512_after_download() {
        let server = server(channel_8(HELLO_SHA512, "linux-x64")).await;

        let resolved =
            DotnetSource::with_base_url(collaborators(), DotnetRuntime, &server.url())
                .resolve("8.0.4")
                .await
                .unwrap();

        assert_eq!(resolved.uri, format!("{}/runtime-8.0.4.tar.gz", server.url()));
        assert_eq!(resolved.digest.hex(), HELLO_SHA256);
        assert_eq!(
            resolved.release_date,
            Some(Utc.with_ymd_and_hms(2024, 4, 9, 0, 0, 0).unwrap())
        );
        assert_eq!(
            resolved.deprecation_date,
            Some(Utc.with_ymd_and_hms(2026, 11, 10, 0, 0, 0).unwrap())
        );
        assert_eq!(
            resolved.cpe.as_deref(),
            Some("cpe:2.3:a:microsoft:.net:8.0.4:*:*:*:*:*:*:*")
        );
    }

    #[tokio::test]
    async fn resolve_runtime_rejects_wrong_sha512() {
        let server = server(channel_8(&"0".repeat(128), "linux-x64")).await;

        let err = DotnetSource::with_base_url(collaborators(), DotnetRuntime, &server.url())
            .resolve("8.0.4")
            .await
            .unwrap_err();

        assert!(matches!(err, DependencyError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn resolve_sdk_trusts_sha256_without_download() {
        let server = server(channel_8(HELLO_SHA512, "linux-x64")).await;

        let resolved = DotnetSource::with_base_url(collaborators(), DotnetSdk, &server.url())
            .resolve("8.0.204")
            .await
            .unwrap();

        assert_eq!(resolved.uri, "https://dl.test/sdk-8.0.204.tar.gz");
        assert_eq!(resolved.digest.hex(), HELLO_SHA256);
        assert_eq!(resolved.cpe, None);
    }

    #[tokio::test]
    async fn resolve_sdk_follows_channel_override_and_ubuntu_rid() {
        let server = server(channel_8(HELLO_SHA512, "linux-x64")).await;

        let source = DotnetSource::with_base_url(
            collaborators_with(
                MockGithubClient::new(),
                FileChecksummer::new(),
                Quirks::builtin().as_ref().clone(),
            ),
            DotnetSdk,
            &server.url(),
        );
        let resolved = source.resolve("2.1.200").await.unwrap();

        assert_eq!(resolved.uri, "https://dl.test/sdk-2.1.200.tar.gz");
        assert_eq!(resolved.digest.hex(), HELLO_SHA256);
        assert_eq!(
            resolved.deprecation_date,
            Some(Utc.with_ymd_and_hms(2018, 10, 1, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn resolve_without_linux_archive_is_no_source_code() {
        let server = server(channel_8(HELLO_SHA512, "osx-x64")).await;

        let err = DotnetSource::with_base_url(collaborators(), DotnetSdk, &server.url())
            .resolve("8.0.204")
            .await
            .unwrap_err();

        assert!(err.is_skippable());
    }

    #[tokio::test]
    async fn resolve_version_missing_from_channel_is_not_found() {
        let server = server(channel_8(HELLO_SHA512, "linux-x64")).await;

        let source = DotnetSource::with_base_url(collaborators(), AspNetCore, &server.url());

        assert!(matches!(
            source.resolve("8.0.9").await,
            Err(DependencyError::NotFound(_))
        ));
        assert!(matches!(
            source.release_date("8.0.0-rc.2.23480.2").await,
            Err(DependencyError::NotFound(_))
        ));
    }

    #[rstest]
    #[case("", 0)]
    #[case("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824", 1)]
    fn hash_candidates_skip_empty_hash(#[case] hash: &str, #[case] expected: usize) {
        assert_eq!(hash_candidates(hash).len(), expected);
    }

    #[test]
    fn hash_candidates_pick_algorithm_by_length() {
        assert_eq!(
            hash_candidates(HELLO_SHA512),
            vec![ChecksumCandidate::inline(DigestAlgorithm::Sha512, HELLO_SHA512)]
        );
        assert_eq!(
            hash_candidates(HELLO_SHA256),
            vec![ChecksumCandidate::inline(DigestAlgorithm::Sha256, HELLO_SHA256)]
        );
    }
}
