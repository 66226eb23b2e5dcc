//! Property tests for gap reporting against generated stores.

use std::collections::BTreeSet;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use index_attest::core::{ChecksumHash, ChecksumRecord, Epoch, EpochRange, Gap};
use index_attest::store::{ChecksumRepository, SqliteChecksumRepo};
use index_attest_testkit::generators::{chunk_size, epoch_range, epoch_set};
use index_attest_testkit::SourceIndexFixture;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Maximal runs of `query` epochs that are absent but have data on both sides.
fn expected_gaps(present: &BTreeSet<Epoch>, query: EpochRange) -> Vec<Gap> {
    let (Some(&first), Some(&last)) = (present.first(), present.last()) else {
        return Vec::new();
    };
    let mut gaps: Vec<Gap> = Vec::new();
    for epoch in query.start()..=query.stop() {
        if epoch <= first || epoch >= last || present.contains(&epoch) {
            continue;
        }
        match gaps.last_mut() {
            Some(gap) if gap.stop + 1 == epoch => gap.stop = epoch,
            _ => gaps.push(Gap::new(epoch, epoch)),
        }
    }
    gaps
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_source_gaps_match_missing_epochs(
        present in epoch_set(80, 40),
        query in epoch_range(80),
    ) {
        let fixture = SourceIndexFixture::with_epochs(present.iter().copied());
        let gaps = runtime().block_on(fixture.open().find_gaps(query)).unwrap();
        prop_assert_eq!(gaps, expected_gaps(&present, query));
    }

    #[test]
    fn prop_repo_gaps_are_unpublished_chunks(
        published in epoch_set(20, 12),
        size in chunk_size(),
        query in epoch_range(20 * 64),
    ) {
        runtime().block_on(async {
            let repo = SqliteChecksumRepo::open_memory(size).unwrap();
            for (i, chunk) in published.iter().enumerate() {
                let start = chunk * size;
                let record = ChecksumRecord::new(
                    EpochRange::new(start, start + size - 1).unwrap(),
                    ChecksumHash::from_bytes([i as u8; 32]),
                );
                repo.publish(&record).await.unwrap();
            }

            // Chunk-aligned records mean each missing chunk spans its whole width.
            let covered: BTreeSet<Epoch> = published
                .iter()
                .flat_map(|chunk| chunk * size..(chunk + 1) * size)
                .collect();
            let gaps = repo.find_gaps(query).await.unwrap();
            prop_assert_eq!(gaps, expected_gaps(&covered, query));
            Ok::<(), TestCaseError>(())
        })?;
    }
}
