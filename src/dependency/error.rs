use thiserror::Error;

use crate::dependency::clients::github::GithubError;
use crate::dependency::clients::web::TransportError;
use crate::dependency::integrity::checksummer::ChecksumError;

/// Errors surfaced by the dependency source contract.
///
/// `NoSourceCode` is the only variant a batch caller should treat as
/// "skip this version"; everything else aborts.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("dependency '{0}' is not supported")]
    Unsupported(String),

    #[error("{context}: {source}")]
    UpstreamUnavailable {
        context: String,
        #[source]
        source: TransportError,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("could not find source code for dependency version {version}")]
    NoSourceCode { version: String },

    #[error("checksum mismatch for {artifact}: {source}")]
    ChecksumMismatch {
        artifact: String,
        #[source]
        source: ChecksumError,
    },

    #[error("unverifiable artifact {artifact}: {reason}")]
    UnverifiableArtifact { artifact: String, reason: String },

    #[error("malformed upstream data ({context}): {reason}")]
    MalformedUpstreamData { context: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DependencyError {
    /// Returns an adapter that wraps a transport failure with `context`.
    pub fn upstream(context: impl Into<String>) -> impl FnOnce(TransportError) -> Self {
        let context = context.into();
        move |source| DependencyError::UpstreamUnavailable { context, source }
    }

    /// Returns an adapter that sorts a GitHub failure by cause: transport
    /// failures are outages and unreadable payloads are malformed data.
    pub fn github(context: impl Into<String>) -> impl FnOnce(GithubError) -> Self {
        let context = context.into();
        move |error| match error {
            GithubError::Transport(source) => {
                DependencyError::UpstreamUnavailable { context, source }
            }
            GithubError::InvalidResponse(reason) => {
                DependencyError::MalformedUpstreamData { context, reason }
            }
            GithubError::AssetNotFound { asset } => {
                DependencyError::NotFound(format!("{}: {}", context, asset))
            }
        }
    }

    pub fn malformed(context: impl Into<String>, reason: impl ToString) -> Self {
        DependencyError::MalformedUpstreamData {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    pub fn no_source_code(version: &str) -> Self {
        DependencyError::NoSourceCode {
            version: version.to_string(),
        }
    }

    /// True when a batch caller should continue with the next version.
    pub fn is_skippable(&self) -> bool {
        matches!(self, DependencyError::NoSourceCode { .. })
    }

    /// True when the failure traces back to the network or an upstream outage.
    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(self, DependencyError::UpstreamUnavailable { .. })
    }
}
