//! GitHub REST/GraphQL client
//!
//! Only the handful of calls the dependency sources need: release and tag
//! listings, release assets, and tag commit lookups.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::dependency::clients::web::{Headers, TransportError, WebClient};

/// Default base URL for the GitHub API
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const RELEASES_PER_PAGE: usize = 100;

#[derive(Debug, Error)]
pub enum GithubError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("could not find release asset {asset}")]
    AssetNotFound { asset: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A published (non-draft, non-prerelease) GitHub release
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseTag {
    pub tag_name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A git tag with the commit date of the commit it points to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub name: String,
    pub committed_at: Option<DateTime<Utc>>,
}

/// Metadata of one release asset
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    /// API URL of the asset
    pub url: String,
    pub browser_download_url: String,
}

/// The commit a tag resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCommit {
    pub sha: String,
    pub date: DateTime<Utc>,
}

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait GithubClient: Send + Sync {
    /// Lists published releases in upstream order (newest first)
    async fn release_tags(&self, org: &str, repo: &str) -> Result<Vec<ReleaseTag>, GithubError>;

    /// Lists the newest tags ordered by tag commit date, descending
    async fn tags(&self, org: &str, repo: &str) -> Result<Vec<TagInfo>, GithubError>;

    /// Fetches the bytes of a named release asset
    async fn release_asset(
        &self,
        org: &str,
        repo: &str,
        tag: &str,
        name: &str,
    ) -> Result<Vec<u8>, GithubError>;

    async fn release_asset_info(
        &self,
        org: &str,
        repo: &str,
        tag: &str,
        name: &str,
    ) -> Result<ReleaseAsset, GithubError>;

    /// Downloads a named release asset to `path` and returns its API URL
    async fn download_release_asset(
        &self,
        org: &str,
        repo: &str,
        tag: &str,
        name: &str,
        path: &Path,
    ) -> Result<String, GithubError>;

    async fn tag_commit(&self, org: &str, repo: &str, tag: &str)
    -> Result<TagCommit, GithubError>;
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    published_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    committer: CommitSignature,
}

#[derive(Debug, Deserialize)]
struct CommitSignature {
    date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<GraphqlData>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GraphqlData {
    repository: Option<GraphqlRepository>,
}

#[derive(Debug, Deserialize)]
struct GraphqlRepository {
    refs: GraphqlRefs,
}

#[derive(Debug, Deserialize)]
struct GraphqlRefs {
    nodes: Vec<GraphqlRef>,
}

#[derive(Debug, Deserialize)]
struct GraphqlRef {
    name: String,
    target: Option<GraphqlTarget>,
}

/// Lightweight tags point at a commit, annotated tags at a tag object
/// that in turn points at the commit.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlTarget {
    committed_date: Option<DateTime<Utc>>,
    target: Option<Box<GraphqlTarget>>,
}

impl GraphqlTarget {
    fn commit_date(&self) -> Option<DateTime<Utc>> {
        self.committed_date
            .or_else(|| self.target.as_ref().and_then(|t| t.commit_date()))
    }
}

const TAGS_QUERY: &str = r#"query($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) {
    refs(refPrefix: "refs/tags/", first: 100, orderBy: {field: TAG_COMMIT_DATE, direction: DESC}) {
      nodes {
        name
        target {
          ... on Commit { committedDate }
          ... on Tag { target { ... on Commit { committedDate } } }
        }
      }
    }
  }
}"#;

/// `GithubClient` talking to the GitHub REST and GraphQL APIs
pub struct RestGithubClient {
    web: Arc<dyn WebClient>,
    api_url: String,
    token: Option<String>,
}

impl RestGithubClient {
    pub fn new(web: Arc<dyn WebClient>, api_url: &str, token: Option<String>) -> Self {
        Self {
            web,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn headers(&self, accept: &str) -> Headers {
        let mut headers = vec![("Accept".to_string(), accept.to_string())];
        if let Some(token) = &self.token {
            headers.push(("Authorization".to_string(), format!("token {}", token)));
        }
        headers
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, GithubError> {
        let body = self
            .web
            .get(url, &self.headers("application/vnd.github+json"))
            .await?;
        serde_json::from_slice(&body).map_err(|e| GithubError::InvalidResponse(e.to_string()))
    }

    async fn find_asset(
        &self,
        org: &str,
        repo: &str,
        tag: &str,
        name: &str,
    ) -> Result<ReleaseAsset, GithubError> {
        let url = format!("{}/repos/{}/{}/releases/tags/{}", self.api_url, org, repo, tag);
        let release: ReleaseResponse = match self.get_json(&url).await {
            Err(GithubError::Transport(e)) if e.is_not_found() => {
                return Err(GithubError::AssetNotFound {
                    asset: format!("{}/{}", tag, name),
                });
            }
            other => other?,
        };

        release
            .assets
            .into_iter()
            .find(|asset| asset.name == name)
            .ok_or_else(|| GithubError::AssetNotFound {
                asset: format!("{}/{}", tag, name),
            })
    }
}

#[async_trait::async_trait]
impl GithubClient for RestGithubClient {
    async fn release_tags(&self, org: &str, repo: &str) -> Result<Vec<ReleaseTag>, GithubError> {
        let mut tags = Vec::new();
        let mut page = 1;

        loop {
            let url = format!(
                "{}/repos/{}/{}/releases?per_page={}&page={}",
                self.api_url, org, repo, RELEASES_PER_PAGE, page
            );
            let releases: Vec<ReleaseResponse> = self.get_json(&url).await?;
            if releases.is_empty() {
                break;
            }

            debug!("{}/{}: got {} releases on page {}", org, repo, releases.len(), page);
            tags.extend(
                releases
                    .into_iter()
                    .filter(|r| !r.draft && !r.prerelease)
                    .map(|r| ReleaseTag {
                        tag_name: r.tag_name,
                        published_at: r.published_at,
                        created_at: r.created_at,
                    }),
            );
            page += 1;
        }

        Ok(tags)
    }

    async fn tags(&self, org: &str, repo: &str) -> Result<Vec<TagInfo>, GithubError> {
        let url = format!("{}/graphql", self.api_url);
        let body = serde_json::json!({
            "query": TAGS_QUERY,
            "variables": { "owner": org, "name": repo },
        });

        let response = self
            .web
            .post(
                &url,
                body.to_string().as_bytes(),
                &self.headers("application/json"),
            )
            .await?;
        let response: GraphqlResponse = serde_json::from_slice(&response)
            .map_err(|e| GithubError::InvalidResponse(e.to_string()))?;

        if !response.errors.is_empty() {
            return Err(GithubError::InvalidResponse(format!(
                "graphql errors: {}",
                serde_json::Value::from(response.errors)
            )));
        }

        let repository = response
            .data
            .and_then(|d| d.repository)
            .ok_or_else(|| GithubError::InvalidResponse(format!("no repository {}/{}", org, repo)))?;

        Ok(repository
            .refs
            .nodes
            .into_iter()
            .map(|node| TagInfo {
                committed_at: node.target.as_ref().and_then(|t| t.commit_date()),
                name: node.name,
            })
            .collect())
    }

    async fn release_asset(
        &self,
        org: &str,
        repo: &str,
        tag: &str,
        name: &str,
    ) -> Result<Vec<u8>, GithubError> {
        let asset = self.find_asset(org, repo, tag, name).await?;
        Ok(self
            .web
            .get(&asset.url, &self.headers("application/octet-stream"))
            .await?)
    }

    async fn release_asset_info(
        &self,
        org: &str,
        repo: &str,
        tag: &str,
        name: &str,
    ) -> Result<ReleaseAsset, GithubError> {
        self.find_asset(org, repo, tag, name).await
    }

    async fn download_release_asset(
        &self,
        org: &str,
        repo: &str,
        tag: &str,
        name: &str,
        path: &Path,
    ) -> Result<String, GithubError> {
        let asset = self.find_asset(org, repo, tag, name).await?;
        self.web
            .download(&asset.url, path, &self.headers("application/octet-stream"))
            .await?;
        Ok(asset.url)
    }

    async fn tag_commit(
        &self,
        org: &str,
        repo: &str,
        tag: &str,
    ) -> Result<TagCommit, GithubError> {
        let url = format!("{}/repos/{}/{}/commits/{}", self.api_url, org, repo, tag);
        let commit: CommitResponse = self.get_json(&url).await?;

        Ok(TagCommit {
            sha: commit.sha,
            date: commit.commit.committer.date,
        })
    }
}
