use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::info;

use super::builder::{Timeline, TimelineBuilder};
use super::source::EventSource;
use crate::error::Result;

pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Upper bound on in-flight pull request commit requests.
    pub concurrency: usize,
    pub since: Option<DateTime<Utc>>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_FETCH_CONCURRENCY,
            since: None,
        }
    }
}

/// Pulls the full history from `source` and builds the timeline.
///
/// The per-PR commit lookups run concurrently, capped by
/// `options.concurrency`. Any failing lookup aborts the whole fetch, so the
/// builder only ever sees complete input.
pub async fn fetch_timeline<S>(source: &S, options: &FetchOptions) -> Result<Timeline>
where
    S: EventSource + ?Sized,
{
    info!("Fetching all merged pull requests for the repo...");
    let merged_prs = source.merged_pull_requests().await?;
    info!("Merged pull requests fetched: {}", merged_prs.len());

    info!("Fetching all commits for the repo...");
    let commits = source.commits(options.since).await?;
    info!("Commits fetched: {}", commits.len());

    info!("Fetching the commits associated with the pull requests");
    let numbers: Vec<u64> = merged_prs.iter().map(|pr| pr.number).collect();
    let pr_commits: Vec<Vec<String>> = stream::iter(numbers)
        .map(|number| source.pull_request_commits(number))
        .buffer_unordered(options.concurrency.max(1))
        .try_collect()
        .await?;
    info!(
        "Commits (attached to PRs) fetched: {}",
        pr_commits.iter().map(Vec::len).sum::<usize>()
    );

    Ok(TimelineBuilder::build(merged_prs, commits, pr_commits))
}
