//! Checksum and signature primitives over local files

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

#[cfg(test)]
use mockall::automock;
use pgp::{Deserializable, SignedPublicKey, StandaloneSignature};
use thiserror::Error;

use crate::dependency::types::DigestAlgorithm;

const KEY_BLOCK_BEGIN: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";
const KEY_BLOCK_END: &str = "-----END PGP PUBLIC KEY BLOCK-----";

#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{algorithm} mismatch: expected {expected}, got {actual}")]
    Mismatch {
        algorithm: DigestAlgorithm,
        expected: String,
        actual: String,
    },

    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signature was not made by any of the {tried} candidate keys")]
    SignatureRejected { tried: usize },
}

#[cfg_attr(test, automock)]
pub trait Checksummer: Send + Sync {
    /// Lowercase hex SHA-256 of the file at `path`
    fn sha256(&self, path: &Path) -> Result<String, ChecksumError>;

    /// Lowercase hex SHA-512 of the file at `path`
    fn sha512(&self, path: &Path) -> Result<String, ChecksumError>;

    /// Checks the file at `path` against an expected digest
    fn verify(
        &self,
        path: &Path,
        algorithm: DigestAlgorithm,
        expected: &str,
    ) -> Result<(), ChecksumError>;

    /// Checks an armored detached signature of `path` against one armored public key
    fn verify_signature(&self, signature: &str, path: &Path, key: &str)
    -> Result<(), ChecksumError>;

    /// Splits a concatenated keyring document into its key blocks, in order
    fn split_key_blocks(&self, document: &str) -> Vec<String>;
}

/// `Checksummer` implemented with RustCrypto hashes and rPGP
#[derive(Debug, Default, Clone, Copy)]
pub struct FileChecksummer;

impl FileChecksummer {
    pub fn new() -> Self {
        Self
    }

    pub fn digest(&self, path: &Path, algorithm: DigestAlgorithm) -> Result<String, ChecksumError> {
        match algorithm {
            DigestAlgorithm::Md5 => hash_file::<md5::Md5>(path),
            DigestAlgorithm::Sha1 => hash_file::<sha1::Sha1>(path),
            DigestAlgorithm::Sha256 => hash_file::<sha2::Sha256>(path),
            DigestAlgorithm::Sha512 => hash_file::<sha2::Sha512>(path),
        }
    }
}

fn hash_file<D: sha2::Digest + Write>(path: &Path) -> Result<String, ChecksumError> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

impl Checksummer for FileChecksummer {
    fn sha256(&self, path: &Path) -> Result<String, ChecksumError> {
        self.digest(path, DigestAlgorithm::Sha256)
    }

    fn sha512(&self, path: &Path) -> Result<String, ChecksumError> {
        self.digest(path, DigestAlgorithm::Sha512)
    }

    fn verify(
        &self,
        path: &Path,
        algorithm: DigestAlgorithm,
        expected: &str,
    ) -> Result<(), ChecksumError> {
        let actual = self.digest(path, algorithm)?;
        let expected = expected.trim().to_ascii_lowercase();
        if actual != expected {
            return Err(ChecksumError::Mismatch {
                algorithm,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn verify_signature(
        &self,
        signature: &str,
        path: &Path,
        key: &str,
    ) -> Result<(), ChecksumError> {
        let (key, _) = SignedPublicKey::from_string(key)
            .map_err(|e| ChecksumError::InvalidKey(e.to_string()))?;
        let (signature, _) = StandaloneSignature::from_string(signature)
            .map_err(|e| ChecksumError::InvalidSignature(e.to_string()))?;
        let content = std::fs::read(path)?;

        if signature.verify(&key, &content).is_ok() {
            return Ok(());
        }

        // Release signing is commonly done with a subkey.
        if key
            .public_subkeys
            .iter()
            .any(|subkey| signature.verify(subkey, &content).is_ok())
        {
            return Ok(());
        }

        Err(ChecksumError::SignatureRejected { tried: 1 })
    }

    fn split_key_blocks(&self, document: &str) -> Vec<String> {
        let mut blocks = Vec::new();
        let mut current: Option<Vec<&str>> = None;

        for line in document.lines() {
            let trimmed = line.trim();
            if trimmed == KEY_BLOCK_BEGIN {
                current = Some(vec![trimmed]);
            } else if let Some(lines) = current.as_mut() {
                lines.push(line.trim_end());
                if trimmed == KEY_BLOCK_END {
                    if let Some(lines) = current.take() {
                        blocks.push(lines.join("\n"));
                    }
                }
            }
        }

        blocks
    }
}
