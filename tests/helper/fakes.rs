//! In-memory collaborators for integration tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use depwatch::dependency::clients::github::{
    GithubClient, GithubError, ReleaseAsset, ReleaseTag, TagCommit, TagInfo,
};
use depwatch::dependency::clients::web::{Headers, TransportError, WebClient};
use depwatch::dependency::integrity::checksummer::FileChecksummer;
use depwatch::dependency::metadata::{GenericPurlGenerator, StaticLicenseRetriever};
use depwatch::dependency::quirks::Quirks;
use depwatch::dependency::sources::Collaborators;

/// Body of every fake artifact; its SHA-256 is `HELLO_SHA256`
pub const HELLO: &str = "hello";
pub const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

/// Web client answering from a fixed URL table and recording requests
#[derive(Default)]
pub struct FakeWebClient {
    bodies: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl FakeWebClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.as_bytes().to_vec());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::UnsuccessfulResponse {
                url: url.to_string(),
                status: 404,
                body: String::new(),
            })
    }
}

#[async_trait]
impl WebClient for FakeWebClient {
    async fn get(&self, url: &str, _headers: &Headers) -> Result<Vec<u8>, TransportError> {
        self.respond(url)
    }

    async fn post(
        &self,
        url: &str,
        _body: &[u8],
        _headers: &Headers,
    ) -> Result<Vec<u8>, TransportError> {
        self.respond(url)
    }

    async fn download(
        &self,
        url: &str,
        path: &Path,
        _headers: &Headers,
    ) -> Result<(), TransportError> {
        let body = self.respond(url)?;
        std::fs::write(path, body)?;
        Ok(())
    }
}

/// GitHub client with fixed releases per repository and no assets
#[derive(Default)]
pub struct FakeGithubClient {
    releases: HashMap<String, Vec<ReleaseTag>>,
}

impl FakeGithubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_releases(mut self, org: &str, repo: &str, releases: Vec<ReleaseTag>) -> Self {
        self.releases.insert(format!("{}/{}", org, repo), releases);
        self
    }

    fn missing(tag: &str, name: &str) -> GithubError {
        GithubError::AssetNotFound {
            asset: format!("{}/{}", tag, name),
        }
    }
}

#[async_trait]
impl GithubClient for FakeGithubClient {
    async fn release_tags(&self, org: &str, repo: &str) -> Result<Vec<ReleaseTag>, GithubError> {
        Ok(self
            .releases
            .get(&format!("{}/{}", org, repo))
            .cloned()
            .unwrap_or_default())
    }

    async fn tags(&self, _org: &str, _repo: &str) -> Result<Vec<TagInfo>, GithubError> {
        Ok(vec![])
    }

    async fn release_asset(
        &self,
        _org: &str,
        _repo: &str,
        tag: &str,
        name: &str,
    ) -> Result<Vec<u8>, GithubError> {
        Err(Self::missing(tag, name))
    }

    async fn release_asset_info(
        &self,
        _org: &str,
        _repo: &str,
        tag: &str,
        name: &str,
    ) -> Result<ReleaseAsset, GithubError> {
        Err(Self::missing(tag, name))
    }

    async fn download_release_asset(
        &self,
        _org: &str,
        _repo: &str,
        tag: &str,
        name: &str,
        _path: &Path,
    ) -> Result<String, GithubError> {
        Err(Self::missing(tag, name))
    }

    async fn tag_commit(
        &self,
        _org: &str,
        _repo: &str,
        tag: &str,
    ) -> Result<TagCommit, GithubError> {
        Err(GithubError::InvalidResponse(format!("unknown tag {}", tag)))
    }
}

/// Production collaborators over the given fakes and the built-in quirks
pub fn collaborators(web: Arc<FakeWebClient>, github: FakeGithubClient) -> Collaborators {
    Collaborators::new(
        web,
        Arc::new(github),
        Arc::new(FileChecksummer::new()),
        Arc::new(StaticLicenseRetriever::default()),
        Arc::new(GenericPurlGenerator),
        Quirks::builtin(),
    )
}
