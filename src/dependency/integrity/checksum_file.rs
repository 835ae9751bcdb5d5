//! Checksum file parser
//!
//! Extracts one digest from a published checksum file. Tolerated layouts:
//! - GNU coreutils: `HASH  file` or `HASH *file`
//! - BSD: `ALG (file) = HASH` or `ALG(file)= HASH`
//! - A bare `HASH` on its own line

use regex::Regex;

use crate::dependency::error::DependencyError;
use crate::dependency::types::{Digest, DigestAlgorithm};

pub struct ChecksumFileParser {
    /// `SHA256 (file) = HASH`
    bsd_re: Regex,
    /// `HASH  file` / `HASH *file`
    gnu_re: Regex,
    /// `HASH`
    bare_re: Regex,
}

impl ChecksumFileParser {
    pub fn new() -> Self {
        Self {
            bsd_re: Regex::new(r"^([A-Za-z0-9-]+)\s*\((.+)\)\s*=\s*([0-9A-Fa-f]+)$").unwrap(),
            gnu_re: Regex::new(r"^([0-9A-Fa-f]+)\s+\*?(\S.*)$").unwrap(),
            bare_re: Regex::new(r"^([0-9A-Fa-f]+)$").unwrap(),
        }
    }

    /// Finds the `algorithm` digest for `file_name` in `content`.
    ///
    /// Lines naming a different file are ignored; a bare hash line matches
    /// any file. Without a file name the first digest line wins.
    pub fn parse(
        &self,
        content: &str,
        algorithm: DigestAlgorithm,
        file_name: Option<&str>,
    ) -> Result<Digest, DependencyError> {
        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let (listed_file, hex) = if let Some(caps) = self.bsd_re.captures(trimmed) {
                match caps[1].parse::<DigestAlgorithm>() {
                    Ok(alg) if alg == algorithm => {}
                    _ => continue,
                }
                (
                    caps.get(2).map(|m| m.as_str()),
                    caps.get(3).map_or("", |m| m.as_str()),
                )
            } else if let Some(caps) = self.gnu_re.captures(trimmed) {
                (
                    caps.get(2).map(|m| m.as_str()),
                    caps.get(1).map_or("", |m| m.as_str()),
                )
            } else if let Some(caps) = self.bare_re.captures(trimmed) {
                (None, caps.get(1).map_or("", |m| m.as_str()))
            } else {
                continue;
            };

            if let (Some(wanted), Some(listed)) = (file_name, listed_file) {
                if base_name(listed.trim()) != wanted {
                    continue;
                }
            }

            return Digest::new(algorithm, hex)
                .map_err(|e| DependencyError::malformed("checksum file", e));
        }

        Err(DependencyError::malformed(
            "checksum file",
            format!(
                "no {} entry for {}",
                algorithm,
                file_name.unwrap_or("artifact")
            ),
        ))
    }
}

impl Default for ChecksumFileParser {
    fn default() -> Self {
        Self::new()
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
