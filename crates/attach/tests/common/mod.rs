pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{Harness, seeded_bytes};
#[allow(unused_imports)]
pub use mocks::{FaultyMetadata, FaultyObjectStore};
