//! Integrity verification
//!
//! Decides how to obtain a trustworthy digest for one artifact from the
//! integrity claims its ecosystem publishes, and executes that decision.
//! Checked in order:
//!
//! 1. an inline SHA-256 digest is trusted as is, nothing is downloaded
//! 2. other claims (inline MD5/SHA-1/SHA-512, checksum files) are checked
//!    against the downloaded artifact, strongest algorithm first
//! 3. a detached signature is checked against every key of the published
//!    keyring until one validates
//! 4. versions the quirks table marks as unverifiable are downloaded and
//!    hashed without comparison
//!
//! Anything else fails; an unverified digest is never returned outside of
//! rule 4.

pub mod checksum_file;
pub mod checksummer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::dependency::clients::github::{GithubClient, GithubError};
use crate::dependency::clients::web::{Headers, WebClient};
use crate::dependency::error::DependencyError;
use crate::dependency::integrity::checksum_file::ChecksumFileParser;
use crate::dependency::integrity::checksummer::{ChecksumError, Checksummer};
use crate::dependency::quirks::Quirks;
use crate::dependency::types::{Digest, DigestAlgorithm};

/// Where a piece of integrity material or an artifact can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remote {
    Url(String),
    ReleaseAsset {
        org: String,
        repo: String,
        tag: String,
        name: String,
    },
}

impl Remote {
    pub fn url(url: impl Into<String>) -> Self {
        Remote::Url(url.into())
    }

    pub fn release_asset(org: &str, repo: &str, tag: &str, name: &str) -> Self {
        Remote::ReleaseAsset {
            org: org.to_string(),
            repo: repo.to_string(),
            tag: tag.to_string(),
            name: name.to_string(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Remote::Url(url) => url.clone(),
            Remote::ReleaseAsset {
                org,
                repo,
                tag,
                name,
            } => format!("{}/{}@{}:{}", org, repo, tag, name),
        }
    }
}

/// The artifact a digest is produced for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub remote: Remote,
}

impl Artifact {
    pub fn new(file_name: impl Into<String>, remote: Remote) -> Self {
        Self {
            file_name: file_name.into(),
            remote,
        }
    }

    /// Artifact whose file name is the last path segment of `url`
    pub fn from_url(url: &str) -> Self {
        let file_name = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .rsplit('/')
            .next()
            .unwrap_or("artifact");
        Self::new(file_name, Remote::url(url))
    }
}

/// One integrity claim published for an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumCandidate {
    /// A digest published in the ecosystem's own metadata
    Inline {
        algorithm: DigestAlgorithm,
        hex: String,
    },
    /// A checksum file; `file_name` selects the line when it lists several
    ChecksumFile {
        algorithm: DigestAlgorithm,
        remote: Remote,
        file_name: Option<String>,
    },
    /// A detached armored signature and the keyring to check it against
    Signature { signature: Remote, keyring: Remote },
}

impl ChecksumCandidate {
    pub fn inline(algorithm: DigestAlgorithm, hex: impl Into<String>) -> Self {
        ChecksumCandidate::Inline {
            algorithm,
            hex: hex.into(),
        }
    }

    pub fn checksum_file(algorithm: DigestAlgorithm, remote: Remote) -> Self {
        ChecksumCandidate::ChecksumFile {
            algorithm,
            remote,
            file_name: None,
        }
    }

    pub fn listing(algorithm: DigestAlgorithm, remote: Remote, file_name: &str) -> Self {
        ChecksumCandidate::ChecksumFile {
            algorithm,
            remote,
            file_name: Some(file_name.to_string()),
        }
    }

    pub fn signature(signature: Remote, keyring: Remote) -> Self {
        ChecksumCandidate::Signature { signature, keyring }
    }
}

/// Executes the integrity decision chain for one artifact
pub struct IntegrityVerifier {
    web: Arc<dyn WebClient>,
    github: Arc<dyn GithubClient>,
    checksummer: Arc<dyn Checksummer>,
    quirks: Arc<Quirks>,
    parser: ChecksumFileParser,
}

impl IntegrityVerifier {
    pub fn new(
        web: Arc<dyn WebClient>,
        github: Arc<dyn GithubClient>,
        checksummer: Arc<dyn Checksummer>,
        quirks: Arc<Quirks>,
    ) -> Self {
        Self {
            web,
            github,
            checksummer,
            quirks,
            parser: ChecksumFileParser::new(),
        }
    }

    /// Produces the digest to report for `artifact` of `ecosystem` `version`.
    pub async fn verify(
        &self,
        ecosystem: &str,
        version: &str,
        artifact: &Artifact,
        candidates: Vec<ChecksumCandidate>,
    ) -> Result<Digest, DependencyError> {
        if self.quirks.skip_verification(ecosystem, version) {
            info!("{} {}: verification skipped by quirks", ecosystem, version);
            let dir = TempDir::new()?;
            let path = self.download(version, artifact, dir.path()).await?;
            return self.sha256_of(artifact, &path);
        }

        let known_wrong = self.quirks.known_wrong_checksum(ecosystem, version);
        if known_wrong {
            info!(
                "{} {}: published checksum is known to be wrong, ignoring it",
                ecosystem, version
            );
        }

        let mut claims = Vec::new();
        let mut files = Vec::new();
        let mut signatures = Vec::new();
        for candidate in candidates {
            match candidate {
                ChecksumCandidate::Inline { algorithm, hex } if !known_wrong => {
                    let digest = Digest::new(algorithm, &hex)
                        .map_err(|e| DependencyError::malformed(&artifact.file_name, e))?;
                    claims.push(digest);
                }
                ChecksumCandidate::ChecksumFile {
                    algorithm,
                    remote,
                    file_name,
                } if !known_wrong => files.push((algorithm, remote, file_name)),
                ChecksumCandidate::Signature { signature, keyring } => {
                    signatures.push((signature, keyring))
                }
                _ => {}
            }
        }

        if let Some(trusted) = trusted_claim(&claims) {
            debug!(
                "{} {}: trusting published {} digest",
                ecosystem,
                version,
                trusted.algorithm()
            );
            return Ok(trusted.clone());
        }

        if !claims.is_empty() || !files.is_empty() {
            for (algorithm, remote, file_name) in &files {
                let content = self.fetch_text(version, remote).await?;
                let wanted = file_name.as_deref().unwrap_or(&artifact.file_name);
                claims.push(self.parser.parse(&content, *algorithm, Some(wanted))?);
            }
            return self.verify_claims(ecosystem, version, artifact, &claims).await;
        }

        if let Some((signature, keyring)) = signatures.first() {
            return self
                .verify_signature(ecosystem, version, artifact, signature, keyring)
                .await;
        }

        if known_wrong {
            let dir = TempDir::new()?;
            let path = self.download(version, artifact, dir.path()).await?;
            return self.sha256_of(artifact, &path);
        }

        Err(DependencyError::UnverifiableArtifact {
            artifact: artifact.file_name.clone(),
            reason: "no checksum or signature is published".to_string(),
        })
    }

    /// Downloads the artifact and checks it against the strongest algorithm
    /// among `claims`; any matching claim of that algorithm suffices.
    async fn verify_claims(
        &self,
        ecosystem: &str,
        version: &str,
        artifact: &Artifact,
        claims: &[Digest],
    ) -> Result<Digest, DependencyError> {
        let Some(strongest) = claims.iter().map(|d| d.algorithm()).max() else {
            return Err(DependencyError::UnverifiableArtifact {
                artifact: artifact.file_name.clone(),
                reason: "no checksum claims".to_string(),
            });
        };

        let dir = TempDir::new()?;
        let path = self.download(version, artifact, dir.path()).await?;

        let mut last_error = None;
        // Claims of weaker algorithms are not consulted once a stronger one exists.
        for claim in claims.iter().filter(|d| d.algorithm() == strongest) {
            match self.checksummer.verify(&path, strongest, claim.hex()) {
                Ok(()) => {
                    info!(
                        "{} {}: verified {} against published {}",
                        ecosystem, version, artifact.file_name, strongest
                    );
                    return self.sha256_of(artifact, &path);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(DependencyError::ChecksumMismatch {
            artifact: artifact.file_name.clone(),
            source: last_error.unwrap_or(ChecksumError::SignatureRejected { tried: 0 }),
        })
    }

    async fn verify_signature(
        &self,
        ecosystem: &str,
        version: &str,
        artifact: &Artifact,
        signature: &Remote,
        keyring: &Remote,
    ) -> Result<Digest, DependencyError> {
        let dir = TempDir::new()?;
        let path = self.download(version, artifact, dir.path()).await?;
        let signature = self.fetch_text(version, signature).await?;
        let keyring = self.fetch_text(version, keyring).await?;

        let keys = self.checksummer.split_key_blocks(&keyring);
        if keys.is_empty() {
            return Err(DependencyError::UnverifiableArtifact {
                artifact: artifact.file_name.clone(),
                reason: "keyring contains no public key blocks".to_string(),
            });
        }

        for (index, key) in keys.iter().enumerate() {
            match self.checksummer.verify_signature(&signature, &path, key) {
                Ok(()) => {
                    info!(
                        "{} {}: signature of {} validated with key {} of {}",
                        ecosystem,
                        version,
                        artifact.file_name,
                        index + 1,
                        keys.len()
                    );
                    return self.sha256_of(artifact, &path);
                }
                Err(e) => debug!("key {} rejected: {}", index + 1, e),
            }
        }

        warn!(
            "{} {}: no key validated the signature of {}",
            ecosystem, version, artifact.file_name
        );
        Err(DependencyError::ChecksumMismatch {
            artifact: artifact.file_name.clone(),
            source: ChecksumError::SignatureRejected { tried: keys.len() },
        })
    }

    fn sha256_of(&self, artifact: &Artifact, path: &Path) -> Result<Digest, DependencyError> {
        let hex = self.checksummer.sha256(path).map_err(|e| match e {
            ChecksumError::Io(e) => DependencyError::Io(e),
            source => DependencyError::ChecksumMismatch {
                artifact: artifact.file_name.clone(),
                source,
            },
        })?;
        Digest::sha256(&hex).map_err(|e| DependencyError::malformed(&artifact.file_name, e))
    }

    async fn download(
        &self,
        version: &str,
        artifact: &Artifact,
        dir: &Path,
    ) -> Result<PathBuf, DependencyError> {
        let path = dir.join(&artifact.file_name);
        match &artifact.remote {
            Remote::Url(url) => self
                .web
                .download(url, &path, &Headers::new())
                .await
                .map_err(DependencyError::upstream(format!("could not download {}", url)))?,
            Remote::ReleaseAsset {
                org,
                repo,
                tag,
                name,
            } => {
                self.github
                    .download_release_asset(org, repo, tag, name, &path)
                    .await
                    .map_err(|e| github_error(version, &artifact.remote, e))?;
            }
        }
        Ok(path)
    }

    async fn fetch_text(&self, version: &str, remote: &Remote) -> Result<String, DependencyError> {
        let body = match remote {
            Remote::Url(url) => self
                .web
                .get(url, &Headers::new())
                .await
                .map_err(DependencyError::upstream(format!("could not fetch {}", url)))?,
            Remote::ReleaseAsset {
                org,
                repo,
                tag,
                name,
            } => self
                .github
                .release_asset(org, repo, tag, name)
                .await
                .map_err(|e| github_error(version, remote, e))?,
        };
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// An inline claim that can be reported without a download
fn trusted_claim(claims: &[Digest]) -> Option<&Digest> {
    claims
        .iter()
        .find(|d| d.algorithm() == DigestAlgorithm::Sha256)
}

fn github_error(version: &str, remote: &Remote, error: GithubError) -> DependencyError {
    match error {
        GithubError::AssetNotFound { .. } => DependencyError::no_source_code(version),
        other => DependencyError::github(format!("could not fetch {}", remote.describe()))(other),
    }
}
