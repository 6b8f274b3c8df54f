use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::event::{CommitEvent, PullRequestEvent};
use crate::error::Result;

/// Supplier of the raw history a timeline is built from.
///
/// Implementations hand back fully materialized lists; paging, auth and
/// retries stay behind this boundary.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Closed and merged pull requests, with their labels.
    async fn merged_pull_requests(&self) -> Result<Vec<PullRequestEvent>>;

    /// Every commit of the repository, optionally only those after `since`.
    async fn commits(&self, since: Option<DateTime<Utc>>) -> Result<Vec<CommitEvent>>;

    /// Hashes of the commits contained in pull request `number`, in order.
    async fn pull_request_commits(&self, number: u64) -> Result<Vec<String>>;
}

/// Single-item lookups the release workflow needs for the newest change.
#[async_trait]
pub trait ChangeLookup: EventSource {
    /// `None` when the pull request was never merged.
    async fn pull_request(&self, number: u64) -> Result<Option<PullRequestEvent>>;

    async fn commit(&self, hash: &str) -> Result<Option<CommitEvent>>;
}
