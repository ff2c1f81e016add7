//! Content fingerprints used as the deduplication key.

use sha2::{Digest, Sha256};
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use crate::constants::SHORT_FINGERPRINT_LEN;

/// SHA-256 digest over the exact payload bytes written to storage
/// (after any envelope decoding, before any storage compression).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Fingerprint(hasher.finalize().into())
    }

    /// Rebuild a fingerprint from its stored binary form.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Fingerprint(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 16 hex characters, used in storage filenames.
    pub fn short_hex(&self) -> String {
        let mut full = self.hex();
        full.truncate(SHORT_FINGERPRINT_LEN);
        full
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.hex())
    }
}

impl Debug for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Fingerprint({})", self.hex())
    }
}
