//! Proptest generators for property-based testing.

use std::collections::BTreeSet;

use proptest::prelude::*;

use index_attest_core::{ChecksumHash, Epoch, EpochRange, MessageRecord};

/// Generate a random ChecksumHash.
pub fn checksum_hash() -> impl Strategy<Value = ChecksumHash> {
    any::<[u8; 32]>().prop_map(ChecksumHash::from_bytes)
}

/// Generate a usable chunk size.
pub fn chunk_size() -> impl Strategy<Value = u64> {
    1u64..=64
}

/// Generate a range inside `[0, max_epoch]`.
pub fn epoch_range(max_epoch: Epoch) -> impl Strategy<Value = EpochRange> {
    (0..=max_epoch, 0..=max_epoch).prop_map(|(a, b)| {
        EpochRange::new(a.min(b), a.max(b)).expect("ordered bounds below max_epoch")
    })
}

/// Generate the set of epochs present in an index.
pub fn epoch_set(max_epoch: Epoch, max_len: usize) -> impl Strategy<Value = BTreeSet<Epoch>> {
    prop::collection::btree_set(0..=max_epoch, 0..=max_len)
}

/// Generate messages with unique cids, in no particular order.
pub fn messages(max_epoch: Epoch, max_len: usize) -> impl Strategy<Value = Vec<MessageRecord>> {
    prop::collection::vec((0..=max_epoch, "[a-z0-9]{1,12}"), 0..=max_len).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (epoch, tipset))| MessageRecord::new(format!("bafy-{:06}", i), tipset, epoch))
            .collect()
    })
}
