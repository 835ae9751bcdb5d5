//! Common types shared by every dependency source

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, ecosystem-scoped version identifier.
pub type VersionRef = String;

/// Hash algorithms a digest claim can be expressed in.
///
/// Variants are declared weakest first so `Ord` ranks them by strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Number of hex characters a digest of this algorithm has
    pub fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 32,
            DigestAlgorithm::Sha1 => 40,
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha512 => 128,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    /// Guess the algorithm from the length of a hex digest
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            32 => Some(DigestAlgorithm::Md5),
            40 => Some(DigestAlgorithm::Sha1),
            64 => Some(DigestAlgorithm::Sha256),
            128 => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha1" => Ok(DigestAlgorithm::Sha1),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(()),
        }
    }
}

/// Error returned when a hex string is not a valid digest for its algorithm
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {algorithm} digest '{value}': expected {expected} hex characters")]
pub struct InvalidDigest {
    pub algorithm: DigestAlgorithm,
    pub value: String,
    pub expected: usize,
}

/// A validated digest: lowercase hex whose length matches its algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDigest")]
pub struct Digest {
    algorithm: DigestAlgorithm,
    hex: String,
}

/// Wire shape of `Digest` before validation
#[derive(Deserialize)]
struct RawDigest {
    algorithm: DigestAlgorithm,
    hex: String,
}

impl TryFrom<RawDigest> for Digest {
    type Error = InvalidDigest;

    fn try_from(raw: RawDigest) -> Result<Self, Self::Error> {
        Digest::new(raw.algorithm, &raw.hex)
    }
}

impl Digest {
    /// Validate and normalize `hex` (surrounding whitespace trimmed, lowercased).
    pub fn new(algorithm: DigestAlgorithm, hex: &str) -> Result<Self, InvalidDigest> {
        let normalized = hex.trim().to_ascii_lowercase();
        if normalized.len() != algorithm.hex_len()
            || !normalized.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(InvalidDigest {
                algorithm,
                value: hex.to_string(),
                expected: algorithm.hex_len(),
            });
        }

        Ok(Self {
            algorithm,
            hex: normalized,
        })
    }

    pub fn sha256(hex: &str) -> Result<Self, InvalidDigest> {
        Self::new(DigestAlgorithm::Sha256, hex)
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Verified metadata for one released version of a dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVersion {
    pub version: VersionRef,
    pub uri: String,
    pub digest: Digest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpe: Option<String>,
    pub purl: String,
    pub licenses: Vec<String>,
}
