//! Read-only lookups exposed to remote callers.

use std::sync::Arc;

use index_attest_core::{ChecksumHash, Epoch, EpochRange};
use index_attest_store::ChecksumRepository;

use crate::error::Result;

/// The attestation query surface. Both calls go straight to the repository.
#[derive(Clone)]
pub struct AttestationApi {
    repo: Arc<dyn ChecksumRepository>,
}

impl AttestationApi {
    pub fn new(repo: Arc<dyn ChecksumRepository>) -> Self {
        Self { repo }
    }

    /// Whether some chunk was published with hash `hash` (hex).
    pub async fn checksum_exists(&self, hash: &str) -> Result<bool> {
        let hash = ChecksumHash::from_hex(hash)?;
        Ok(self.repo.checksum_exists(&hash).await?)
    }

    /// The hex hash published for exactly `[start, stop]`, empty if none.
    pub async fn get_checksum(&self, start: Epoch, stop: Epoch) -> Result<String> {
        let range = EpochRange::new(start, stop)?;
        Ok(self
            .repo
            .get_checksum(range)
            .await?
            .map(|hash| hash.to_hex())
            .unwrap_or_default())
    }
}
