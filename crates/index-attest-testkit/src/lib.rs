//! # Index Attest Testkit
//!
//! Testing utilities for index attestation.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: A temporary, populated `msgindex.db` standing in for the ingestor
//! - **Generators**: Proptest strategies for ranges, epoch sets, messages and hashes
//!
//! ## Test Fixtures
//!
//! ```rust
//! use index_attest_testkit::SourceIndexFixture;
//!
//! let fixture = SourceIndexFixture::with_epochs(0..=99);
//! fixture.insert_epochs([100, 101]);
//! assert_eq!(fixture.messages().len(), 102);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use index_attest_testkit::generators::{epoch_range, epoch_set};
//!
//! proptest! {
//!     #[test]
//!     fn gaps_are_inside_query(present in epoch_set(200, 80), query in epoch_range(200)) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::SourceIndexFixture;
