//! Canonical chunk digest.
//!
//! The digest covers exactly the messages of one chunk, in canonical order
//! (epoch ascending, then cid ascending), so it does not depend on the
//! physical order rows were stored in.
//!
//! Layout fed to BLAKE3:
//!
//! ```text
//! DIGEST_DOMAIN
//! start: u64 BE || stop: u64 BE
//! for each message:
//!     epoch: u64 BE
//!     len(cid): u32 BE || cid
//!     len(tipset_cid): u32 BE || tipset_cid
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::{ChecksumHash, Epoch, EpochRange};

/// Domain separation tag for chunk digests.
pub const DIGEST_DOMAIN: &[u8] = b"index-attest-chunk-v1:";

/// One row of the message index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Content address of the message.
    pub cid: String,
    /// Content address of the tipset that included it.
    pub tipset_cid: String,
    pub epoch: Epoch,
}

impl MessageRecord {
    pub fn new(cid: impl Into<String>, tipset_cid: impl Into<String>, epoch: Epoch) -> Self {
        Self {
            cid: cid.into(),
            tipset_cid: tipset_cid.into(),
            epoch,
        }
    }

    fn sort_key(&self) -> (Epoch, &str) {
        (self.epoch, self.cid.as_str())
    }
}

/// Streaming digest over a chunk's messages.
///
/// Messages must arrive in strictly increasing `(epoch, cid)` order and fall
/// inside the chunk; anything else is rejected rather than silently hashed.
pub struct ChunkHasher {
    range: EpochRange,
    hasher: blake3::Hasher,
    last: Option<(Epoch, String)>,
    count: u64,
}

impl ChunkHasher {
    pub fn new(range: EpochRange) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DIGEST_DOMAIN);
        hasher.update(&range.start().to_be_bytes());
        hasher.update(&range.stop().to_be_bytes());
        Self {
            range,
            hasher,
            last: None,
            count: 0,
        }
    }

    pub fn update(&mut self, message: &MessageRecord) -> Result<()> {
        if !self.range.contains(message.epoch) {
            return Err(CoreError::MessageOutOfRange {
                epoch: message.epoch,
                range: self.range.to_string(),
            });
        }
        if let Some((epoch, cid)) = &self.last {
            if (*epoch, cid.as_str()) >= message.sort_key() {
                return Err(CoreError::UnorderedMessages {
                    epoch: message.epoch,
                    cid: message.cid.clone(),
                });
            }
        }

        self.hasher.update(&message.epoch.to_be_bytes());
        write_field(&mut self.hasher, &message.cid);
        write_field(&mut self.hasher, &message.tipset_cid);

        self.last = Some((message.epoch, message.cid.clone()));
        self.count += 1;
        Ok(())
    }

    /// Number of messages hashed so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn finalize(self) -> ChecksumHash {
        ChecksumHash(*self.hasher.finalize().as_bytes())
    }

    /// Sort `messages` canonically and digest them in one go.
    pub fn digest(range: EpochRange, messages: &mut [MessageRecord]) -> Result<ChecksumHash> {
        messages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let mut hasher = Self::new(range);
        for message in messages.iter() {
            hasher.update(message)?;
        }
        Ok(hasher.finalize())
    }
}

fn write_field(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u32).to_be_bytes());
    hasher.update(value.as_bytes());
}
