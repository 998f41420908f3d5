//! SHA-256 content fingerprints
//!
//! A single canonical fingerprint format (`sha256:<hex>`) is used for every
//! equality check between local files, the state tracker and the server.

use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Prefix for all fingerprints produced by this module
const PREFIX: &str = "sha256:";

/// Length of a hex-encoded SHA-256 digest
const HEX_LEN: usize = 64;

/// Deterministic content fingerprint.
///
/// Identical bytes always produce the same fingerprint, wherever they live,
/// so two fingerprints can be compared instead of the content itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint an in-memory buffer.
    pub fn of_bytes(content: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_ref());
        Self(format!("{}{:x}", PREFIX, hasher.finalize()))
    }

    /// Fingerprint everything a reader yields.
    pub fn of_reader(mut reader: impl Read) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(format!("{}{:x}", PREFIX, hasher.finalize())))
    }

    /// Fingerprint a file's contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn of_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        Self::of_reader(std::io::BufReader::new(file)).map_err(|e| Error::io(path, e))
    }

    /// The hex digest without the `sha256:` prefix.
    pub fn hex(&self) -> &str {
        &self.0[PREFIX.len()..]
    }

    /// The canonical `sha256:<hex>` form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    /// Accepts the canonical form, or a bare 64-character hex digest.
    fn from_str(s: &str) -> Result<Self> {
        let hex = s.strip_prefix(PREFIX).unwrap_or(s);
        let valid = hex.len() == HEX_LEN && hex.bytes().all(|b| b.is_ascii_hexdigit());
        if !valid {
            return Err(Error::InvalidFingerprint {
                value: s.to_string(),
            });
        }
        Ok(Self(format!("{}{}", PREFIX, hex.to_ascii_lowercase())))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// Hex SHA-256 digest of a file, without prefix.
///
/// This is the format release registries expect.
pub fn file_sha256_hex(path: &Path) -> Result<String> {
    Fingerprint::of_file(path).map(|fp| fp.hex().to_string())
}
