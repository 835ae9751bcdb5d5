//! Ecosystem adapters implementing `DependencySource`
//!
//! Each adapter turns one upstream's release data into release candidates,
//! orders them through `VersionOrderer` and resolves artifacts through
//! `IntegrityVerifier`. Shared plumbing lives in `Collaborators`.

pub mod bundler;
pub mod composer;
pub mod curl;
pub mod dotnet;
pub mod go;
pub mod httpd;
pub mod icu;
pub mod nginx;
pub mod node;
pub mod php;
pub mod pypi;
pub mod python;
pub mod ruby;
pub mod rust;
pub mod yarn;

pub use bundler::BundlerSource;
pub use composer::ComposerSource;
pub use curl::CurlSource;
pub use dotnet::{AspNetCore, DotnetRuntime, DotnetSdk, DotnetSource};
pub use go::GoSource;
pub use httpd::HttpdSource;
pub use icu::IcuSource;
pub use nginx::NginxSource;
pub use node::NodeSource;
pub use php::PhpSource;
pub use pypi::PypiSource;
pub use python::PythonSource;
pub use ruby::RubySource;
pub use rust::RustSource;
pub use yarn::YarnSource;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::de::DeserializeOwned;

use crate::dependency::clients::github::{GithubClient, GithubError};
use crate::dependency::clients::web::{Headers, WebClient};
use crate::dependency::error::DependencyError;
use crate::dependency::integrity::checksummer::Checksummer;
use crate::dependency::integrity::IntegrityVerifier;
use crate::dependency::metadata::{LicenseRetriever, PurlGenerator};
use crate::dependency::ordering::{OrderingStrategy, ReleaseCandidate, VersionOrderer};
use crate::dependency::quirks::Quirks;
use crate::dependency::types::{Digest, ResolvedVersion};

/// Shared, read-only collaborators injected into every adapter
#[derive(Clone)]
pub struct Collaborators {
    web: Arc<dyn WebClient>,
    github: Arc<dyn GithubClient>,
    licenses: Arc<dyn LicenseRetriever>,
    purl: Arc<dyn PurlGenerator>,
    quirks: Arc<Quirks>,
    verifier: Arc<IntegrityVerifier>,
}

impl Collaborators {
    pub fn new(
        web: Arc<dyn WebClient>,
        github: Arc<dyn GithubClient>,
        checksummer: Arc<dyn Checksummer>,
        licenses: Arc<dyn LicenseRetriever>,
        purl: Arc<dyn PurlGenerator>,
        quirks: Arc<Quirks>,
    ) -> Self {
        let verifier = Arc::new(IntegrityVerifier::new(
            Arc::clone(&web),
            Arc::clone(&github),
            checksummer,
            Arc::clone(&quirks),
        ));

        Self {
            web,
            github,
            licenses,
            purl,
            quirks,
            verifier,
        }
    }

    pub fn github(&self) -> &dyn GithubClient {
        self.github.as_ref()
    }

    pub fn verifier(&self) -> &IntegrityVerifier {
        &self.verifier
    }

    pub fn quirks(&self) -> &Quirks {
        &self.quirks
    }

    pub fn orderer(&self, ecosystem: &str, strategy: OrderingStrategy) -> VersionOrderer {
        VersionOrderer::new(ecosystem, strategy, Arc::clone(&self.quirks))
    }

    pub async fn get(&self, url: &str) -> Result<Vec<u8>, DependencyError> {
        self.web
            .get(url, &Headers::new())
            .await
            .map_err(DependencyError::upstream(format!("could not get {}", url)))
    }

    pub async fn get_text(&self, url: &str) -> Result<String, DependencyError> {
        let body = self.get(url).await?;
        String::from_utf8(body).map_err(|e| DependencyError::malformed(url, e))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DependencyError> {
        let body = self.get(url).await?;
        serde_json::from_slice(&body).map_err(|e| DependencyError::malformed(url, e))
    }

    /// Assembles the record for a verified artifact; license lookup and
    /// package URL are filled in here so every adapter derives them alike.
    pub fn finish(
        &self,
        ecosystem: &str,
        version: &str,
        uri: &str,
        digest: Digest,
    ) -> ResolvedVersion {
        let licenses = self.licenses.lookup_licenses(ecosystem, uri);
        let purl = self.purl.generate(ecosystem, version, digest.hex(), uri);

        ResolvedVersion {
            version: version.to_string(),
            uri: uri.to_string(),
            digest,
            release_date: None,
            deprecation_date: None,
            cpe: None,
            purl,
            licenses,
        }
    }
}

/// Maps a source-control failure, treating missing assets as `NoSourceCode`
pub(crate) fn github_error(
    version: &str,
    context: impl Into<String>,
) -> impl FnOnce(GithubError) -> DependencyError {
    let context = context.into();
    let version = version.to_string();
    move |error| match error {
        GithubError::AssetNotFound { .. } => DependencyError::no_source_code(&version),
        other => DependencyError::github(context)(other),
    }
}

pub(crate) fn not_found(ecosystem: &str, version: &str) -> DependencyError {
    DependencyError::NotFound(format!("{} version {}", ecosystem, version))
}

/// Finds `version` in an ordered catalog
pub(crate) fn find_release<'a>(
    ecosystem: &str,
    releases: &'a [ReleaseCandidate],
    version: &str,
) -> Result<&'a ReleaseCandidate, DependencyError> {
    releases
        .iter()
        .find(|r| r.version == version)
        .ok_or_else(|| not_found(ecosystem, version))
}

/// Release date of `version` in an ordered catalog
pub(crate) fn dated_release(
    ecosystem: &str,
    releases: &[ReleaseCandidate],
    version: &str,
) -> Result<DateTime<Utc>, DependencyError> {
    find_release(ecosystem, releases, version)?
        .released_at
        .ok_or_else(|| {
            DependencyError::NotFound(format!(
                "release date of {} version {}",
                ecosystem, version
            ))
        })
}

/// Parses a day-only date as midnight UTC
pub(crate) fn parse_day(value: &str, formats: &[&str]) -> Result<DateTime<Utc>, DependencyError> {
    let value = value.trim();
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .ok_or_else(|| DependencyError::malformed("release date", format!("'{}'", value)))
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DependencyError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| DependencyError::malformed("release date", format!("'{}': {}", value, e)))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::dependency::clients::github::MockGithubClient;
    use crate::dependency::clients::web::ReqwestWebClient;
    use crate::dependency::integrity::checksummer::FileChecksummer;
    use crate::dependency::metadata::{GenericPurlGenerator, StaticLicenseRetriever};

    /// Digests of the artifact body `hello`
    pub const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";
    pub const HELLO_SHA1: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
    pub const HELLO_SHA256: &str =
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    pub const HELLO_SHA512: &str = "9b71d224bd62f3785d96d46ad3ea3d73319bfbc2890caadae2dff72519673ca72323c3d99ba5c11d7c7acc6e14b8c5da0c4663475c2e5c3adef46f73bcdec043";

    pub fn collaborators() -> Collaborators {
        collaborators_with(MockGithubClient::new(), FileChecksummer::new(), Quirks::empty())
    }

    pub fn collaborators_with(
        github: MockGithubClient,
        checksummer: impl Checksummer + 'static,
        quirks: Quirks,
    ) -> Collaborators {
        Collaborators::new(
            Arc::new(ReqwestWebClient::default()),
            Arc::new(github),
            Arc::new(checksummer),
            Arc::new(StaticLicenseRetriever::default()),
            Arc::new(GenericPurlGenerator),
            Arc::new(quirks),
        )
    }
}
