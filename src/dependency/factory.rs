//! Maps ecosystem names to dependency sources
//!
//! The factory owns one set of collaborators and hands a clone of it to
//! every source it creates. Whether a name is supported is answered by
//! trying to create its source, so there is no second list to keep in sync.

use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::dependency::clients::github::RestGithubClient;
use crate::dependency::clients::web::{ReqwestWebClient, WebClient};
use crate::dependency::error::DependencyError;
use crate::dependency::integrity::checksummer::FileChecksummer;
use crate::dependency::metadata::{GenericPurlGenerator, StaticLicenseRetriever};
use crate::dependency::quirks::{Quirks, QuirksError};
use crate::dependency::source::DependencySource;
use crate::dependency::sources::{
    AspNetCore, BundlerSource, Collaborators, ComposerSource, CurlSource, DotnetRuntime,
    DotnetSdk, DotnetSource, GoSource, HttpdSource, IcuSource, NginxSource, NodeSource,
    PhpSource, PypiSource, PythonSource, RubySource, RustSource, YarnSource,
};

pub struct DependencyFactory {
    ctx: Collaborators,
}

impl DependencyFactory {
    pub fn new(ctx: Collaborators) -> Self {
        Self { ctx }
    }

    /// Wires the production collaborators described by `config`
    pub fn from_config(config: &Config) -> Result<Self, QuirksError> {
        let quirks = match &config.quirks_path {
            Some(path) => {
                debug!("Loading quirks from {}", path.display());
                Arc::new(Quirks::from_path(path)?)
            }
            None => Quirks::builtin(),
        };

        let web: Arc<dyn WebClient> = Arc::new(ReqwestWebClient::new(
            config.http.timeout(),
            &config.http.user_agent,
        ));
        let github = Arc::new(RestGithubClient::new(
            Arc::clone(&web),
            &config.github.api_url,
            config.github.token.clone(),
        ));

        Ok(Self::new(Collaborators::new(
            web,
            github,
            Arc::new(FileChecksummer::new()),
            Arc::new(StaticLicenseRetriever::new(&config.licenses)),
            Arc::new(GenericPurlGenerator),
            quirks,
        )))
    }

    /// Creates the source for a case-sensitive ecosystem name
    ///
    /// # Returns
    /// * `Ok(Box<dyn DependencySource>)` - A source sharing this factory's collaborators
    /// * `Err(DependencyError::Unsupported)` - The name is not a known ecosystem
    pub fn create(&self, name: &str) -> Result<Box<dyn DependencySource>, DependencyError> {
        let ctx = self.ctx.clone();
        let source: Box<dyn DependencySource> = match name {
            "bundler" => Box::new(BundlerSource::new(ctx)),
            "composer" => Box::new(ComposerSource::new(ctx)),
            "curl" => Box::new(CurlSource::new(ctx)),
            "dotnet-aspnetcore" => Box::new(DotnetSource::new(ctx, AspNetCore)),
            "dotnet-runtime" => Box::new(DotnetSource::new(ctx, DotnetRuntime)),
            "dotnet-sdk" => Box::new(DotnetSource::new(ctx, DotnetSdk)),
            "go" => Box::new(GoSource::new(ctx)),
            "httpd" => Box::new(HttpdSource::new(ctx)),
            "icu" => Box::new(IcuSource::new(ctx)),
            "nginx" => Box::new(NginxSource::new(ctx)),
            "node" => Box::new(NodeSource::new(ctx)),
            "php" => Box::new(PhpSource::new(ctx)),
            "pip" | "pipenv" => Box::new(PypiSource::new(ctx, name)),
            "python" => Box::new(PythonSource::new(ctx)),
            "ruby" => Box::new(RubySource::new(ctx)),
            "rust" => Box::new(RustSource::new(ctx)),
            "yarn" => Box::new(YarnSource::new(ctx)),
            _ => return Err(DependencyError::Unsupported(name.to_string())),
        };
        Ok(source)
    }

    pub fn supports(&self, name: &str) -> bool {
        self.create(name).is_ok()
    }
}
