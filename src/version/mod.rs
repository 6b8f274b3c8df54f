pub mod accumulator;
pub mod classifier;
pub mod semver;

pub use accumulator::{Accumulation, VersionAccumulator, VersionedEvent};
pub use classifier::IncrementClassifier;
pub use semver::{compare_versions, valid_version_bump, versions_in_sync, Increment, SemVer};
