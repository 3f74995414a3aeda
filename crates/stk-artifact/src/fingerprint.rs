//! Directory fingerprints
//!
//! Provides [`Fingerprint`], a strongly-typed SHA-256 digest used as the
//! immutable tag of a deployable image, and [`fingerprint`], which derives
//! one from the top-level files of a source directory.

use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Length of a fingerprint in bytes
pub const FINGERPRINT_LEN: usize = 32;

/// A 32-byte content fingerprint (SHA-256)
///
/// Renders as 64 lowercase hex characters. Has no identity beyond its
/// value: two fingerprints are the same artifact tag iff they are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Create a fingerprint from raw digest bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Create fingerprint from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        let arr: [u8; FINGERPRINT_LEN] =
            bytes.try_into().map_err(|_| HashError::InvalidLength {
                expected: FINGERPRINT_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Fingerprint of an in-memory byte sequence
    #[inline]
    #[must_use]
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Short form (first 12 hex chars), for log lines
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Compute the fingerprint of a source directory.
///
/// Only the raw bytes of the directory's immediate regular files are hashed,
/// concatenated in file-name order. Subdirectories, file names, permissions
/// and timestamps never affect the result. An empty directory yields the
/// SHA-256 of the empty byte sequence.
///
/// # Errors
/// Returns [`HashError::Io`] if the directory or any of its files cannot be
/// read. No partial fingerprint is ever produced.
pub fn fingerprint(dir: impl AsRef<Path>) -> Result<Fingerprint, HashError> {
    let dir = dir.as_ref();
    let mut hasher = Sha256::new();

    for path in top_level_files(dir)? {
        let mut file = File::open(&path).map_err(|source| HashError::io(&path, source))?;
        let bytes = io::copy(&mut file, &mut hasher).map_err(|source| HashError::io(&path, source))?;
        tracing::trace!(path = %path.display(), bytes, "hashed file");
    }

    let fp = Fingerprint::new(hasher.finalize().into());
    tracing::debug!(dir = %dir.display(), fingerprint = %fp.short(), "computed directory fingerprint");
    Ok(fp)
}

/// List the regular files directly inside `dir`, sorted by file name.
///
/// Symlinks are followed; entries resolving to directories are skipped.
///
/// # Errors
/// Returns [`HashError::Io`] if the directory cannot be enumerated or an
/// entry cannot be inspected.
pub fn top_level_files(dir: &Path) -> Result<Vec<PathBuf>, HashError> {
    let entries = fs::read_dir(dir).map_err(|source| HashError::io(dir, source))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| HashError::io(dir, source))?;
        let path = entry.path();
        let metadata = fs::metadata(&path).map_err(|source| HashError::io(&path, source))?;
        if metadata.is_dir() {
            continue;
        }
        files.push((entry.file_name(), path));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Errors that can occur when computing or parsing fingerprints
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// A directory or file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Invalid digest length
    #[error("invalid fingerprint length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

impl HashError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
