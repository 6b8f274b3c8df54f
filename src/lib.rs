//! Derives a repository's semantic version and changelog from its history of
//! merged pull requests and independent commits.

pub mod changelog;
pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod release;
pub mod timeline;
pub mod version;

pub use error::{Error, Result};
