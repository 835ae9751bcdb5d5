//! License lookup and package URL generation

use std::collections::{BTreeMap, HashMap};

#[cfg(test)]
use mockall::automock;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Characters escaped in purl name, version and qualifier values
const PURL_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// SPDX identifiers used when the configuration does not override them
const DEFAULT_LICENSES: &[(&str, &[&str])] = &[
    ("bundler", &["MIT"]),
    ("composer", &["MIT"]),
    ("curl", &["curl"]),
    ("dotnet-aspnetcore", &["MIT"]),
    ("dotnet-runtime", &["MIT"]),
    ("dotnet-sdk", &["MIT"]),
    ("go", &["BSD-3-Clause"]),
    ("httpd", &["Apache-2.0"]),
    ("icu", &["ICU", "Unicode-3.0"]),
    ("nginx", &["BSD-2-Clause"]),
    ("node", &["MIT"]),
    ("php", &["PHP-3.01"]),
    ("pip", &["MIT"]),
    ("pipenv", &["MIT"]),
    ("python", &["PSF-2.0"]),
    ("ruby", &["Ruby", "BSD-2-Clause"]),
    ("rust", &["MIT", "Apache-2.0"]),
    ("yarn", &["BSD-2-Clause"]),
];

#[cfg_attr(test, automock)]
pub trait LicenseRetriever: Send + Sync {
    /// SPDX identifiers of the artifact at `source_url`, in a stable order
    fn lookup_licenses(&self, ecosystem: &str, source_url: &str) -> Vec<String>;
}

#[cfg_attr(test, automock)]
pub trait PurlGenerator: Send + Sync {
    fn generate(&self, name: &str, version: &str, sha256: &str, source_url: &str) -> String;
}

/// Answers license lookups from a fixed per-ecosystem table
#[derive(Debug, Clone)]
pub struct StaticLicenseRetriever {
    licenses: HashMap<String, Vec<String>>,
}

impl StaticLicenseRetriever {
    /// Built-in table with `overrides` replacing the entries they name
    pub fn new(overrides: &HashMap<String, Vec<String>>) -> Self {
        let mut licenses: HashMap<String, Vec<String>> = DEFAULT_LICENSES
            .iter()
            .map(|(name, ids)| {
                (
                    name.to_string(),
                    ids.iter().map(|id| id.to_string()).collect(),
                )
            })
            .collect();
        licenses.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self { licenses }
    }
}

impl Default for StaticLicenseRetriever {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

impl LicenseRetriever for StaticLicenseRetriever {
    fn lookup_licenses(&self, ecosystem: &str, _source_url: &str) -> Vec<String> {
        self.licenses.get(ecosystem).cloned().unwrap_or_default()
    }
}

/// Generates `pkg:generic` package URLs
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericPurlGenerator;

impl PurlGenerator for GenericPurlGenerator {
    fn generate(&self, name: &str, version: &str, sha256: &str, source_url: &str) -> String {
        let qualifiers: BTreeMap<&str, &str> =
            BTreeMap::from([("checksum", sha256), ("download_url", source_url)]);

        let qualifiers = qualifiers
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("{}={}", key, encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        let mut purl = format!("pkg:generic/{}@{}", encode(name), encode(version));
        if !qualifiers.is_empty() {
            purl.push('?');
            purl.push_str(&qualifiers);
        }
        purl
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, PURL_ENCODE_SET).to_string()
}
