use semver::Version;

use crate::dependency::error::DependencyError;
use crate::dependency::ordering::VersionScheme;
use crate::dependency::quirks::Quirks;
use crate::dependency::sources::dotnet::{ChannelRelease, Component, DotnetProduct, major_minor};

/// The .NET SDK; one release may ship several SDK feature bands
#[derive(Debug, Clone, Copy, Default)]
pub struct DotnetSdk;

/// The .NET runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct DotnetRuntime;

/// The ASP.NET Core runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct AspNetCore;

/// The product was renamed from .NET Core to .NET with 5.0
const DOTNET_RENAME: Version = Version::new(5, 0, 0);

impl DotnetProduct for DotnetSdk {
    fn name(&self) -> &'static str {
        "dotnet-sdk"
    }

    fn components<'a>(&self, release: &'a ChannelRelease) -> Vec<&'a Component> {
        release.sdk.iter().chain(release.sdks.iter()).collect()
    }

    /// Some early SDKs are catalogued under an older channel
    fn channel(&self, quirks: &Quirks, version: &str) -> String {
        quirks
            .channel_override(self.name(), version)
            .map(str::to_string)
            .unwrap_or_else(|| major_minor(version))
    }

    fn cpe(&self, _version: &str) -> Result<Option<String>, DependencyError> {
        Ok(None)
    }
}

impl DotnetProduct for DotnetRuntime {
    fn name(&self) -> &'static str {
        "dotnet-runtime"
    }

    fn components<'a>(&self, release: &'a ChannelRelease) -> Vec<&'a Component> {
        release.runtime.iter().collect()
    }

    fn cpe(&self, version: &str) -> Result<Option<String>, DependencyError> {
        let product = match VersionScheme::default().classify(version)? {
            Some(parsed) if parsed < DOTNET_RENAME => ".net_core",
            _ => ".net",
        };
        Ok(Some(format!(
            "cpe:2.3:a:microsoft:{}:{}:*:*:*:*:*:*:*",
            product, version
        )))
    }
}

impl DotnetProduct for AspNetCore {
    fn name(&self) -> &'static str {
        "dotnet-aspnetcore"
    }

    fn components<'a>(&self, release: &'a ChannelRelease) -> Vec<&'a Component> {
        release.aspnetcore_runtime.iter().collect()
    }

    fn cpe(&self, version: &str) -> Result<Option<String>, DependencyError> {
        Ok(Some(format!(
            "cpe:2.3:a:microsoft:asp.net_core:{}:*:*:*:*:*:*:*",
            major_minor(version)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("3.1.32", "cpe:2.3:a:microsoft:.net_core:3.1.32:*:*:*:*:*:*:*")]
    #[case("5.0.0", "cpe:2.3:a:microsoft:.net:5.0.0:*:*:*:*:*:*:*")]
    #[case("8.0.4", "cpe:2.3:a:microsoft:.net:8.0.4:*:*:*:*:*:*:*")]
    fn runtime_cpe_follows_product_rename(#[case] version: &str, #[case] expected: &str) {
        assert_eq!(DotnetRuntime.cpe(version).unwrap().as_deref(), Some(expected));
    }

    #[test]
    fn aspnetcore_cpe_uses_major_minor() {
        assert_eq!(
            AspNetCore.cpe("6.0.29").unwrap().as_deref(),
            Some("cpe:2.3:a:microsoft:asp.net_core:6.0:*:*:*:*:*:*:*")
        );
    }

    #[rstest]
    #[case("2.1.104", "2.0")]
    #[case("2.1.202", "2.1")]
    #[case("8.0.204", "8.0")]
    fn sdk_channel_honors_override(#[case] version: &str, #[case] expected: &str) {
        assert_eq!(DotnetSdk.channel(&Quirks::builtin(), version), expected);
    }

    #[test]
    fn sdk_components_include_feature_bands() {
        let release: ChannelRelease = serde_json::from_str(
            r#"{
                "release-date": "2024-04-09",
                "sdk": {"version": "8.0.204"},
                "sdks": [{"version": "8.0.204"}, {"version": "8.0.104"}]
            }"#,
        )
        .unwrap();

        let versions: Vec<_> = DotnetSdk
            .components(&release)
            .iter()
            .map(|c| c.version.as_str())
            .collect();

        assert_eq!(versions, vec!["8.0.204", "8.0.204", "8.0.104"]);
        assert!(DotnetRuntime.components(&release).is_empty());
    }
}
