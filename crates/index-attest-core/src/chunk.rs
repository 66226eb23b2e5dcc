//! Chunk planning.
//!
//! Chunks tile the epoch axis from 0 upward with no overlap. The planner is
//! advisory: it says which range comes next, callers decide whether the
//! source data for that range is final.

use crate::error::{CoreError, Result};
use crate::types::{Epoch, EpochRange};

/// One day of Filecoin epochs (30s block time).
pub const DEFAULT_CHUNK_SIZE: u64 = 2880;

/// The start of the next chunk given the last published stop, if any.
pub fn next_start_after(last_stop: Option<Epoch>) -> Epoch {
    last_stop.map_or(0, |stop| stop + 1)
}

/// `[next_start, next_start + chunk_size - 1]`.
pub fn plan_chunk(next_start: Epoch, chunk_size: u64) -> Result<EpochRange> {
    if chunk_size == 0 {
        return Err(CoreError::ZeroChunkSize);
    }
    let stop = next_start
        .checked_add(chunk_size - 1)
        .ok_or(CoreError::EpochOverflow(next_start))?;
    EpochRange::new(next_start, stop)
}
