pub mod types;

pub use types::{Config, LabelIncrementConfig, PackageManifest, Settings};
