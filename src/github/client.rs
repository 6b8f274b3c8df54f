use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::{Octocrab, Page};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{CommitRef, IntoEvent};
use crate::config::types::DEFAULT_FETCH_RETRIES;
use crate::error::Result;
use crate::timeline::{ChangeLookup, CommitEvent, EventSource, PullRequestEvent};

const PER_PAGE: u8 = 100;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Query of the list endpoints octocrab has no builder for.
#[derive(Serialize)]
struct PageParams {
    per_page: u8,
    page: u32,
}

pub struct GitHubClient {
    client: Octocrab,
    owner: String,
    repo: String,
    retries: u32,
}

impl GitHubClient {
    pub fn new(token: Option<String>, owner: String, repo: String) -> Result<Self> {
        let mut builder = Octocrab::builder();
        if let Some(token) = token {
            builder = builder.personal_token(token);
        }
        Ok(Self::from_octocrab(builder.build()?, owner, repo))
    }

    /// Client against a GitHub Enterprise (or test) server.
    pub fn with_base_uri(
        base_uri: &str,
        token: Option<String>,
        owner: String,
        repo: String,
    ) -> Result<Self> {
        let mut builder = Octocrab::builder().base_uri(base_uri)?;
        if let Some(token) = token {
            builder = builder.personal_token(token);
        }
        Ok(Self::from_octocrab(builder.build()?, owner, repo))
    }

    fn from_octocrab(client: Octocrab, owner: String, repo: String) -> Self {
        Self {
            client,
            owner,
            repo,
            retries: DEFAULT_FETCH_RETRIES,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// `repo:owner/name key:"value" ...`
    pub fn search_query(&self, filters: &[(&str, &str)]) -> String {
        let mut q = format!("repo:{}/{}", self.owner, self.repo);
        for (key, value) in filters {
            q.push_str(&format!(" {}:\"{}\"", key, value));
        }
        q
    }

    pub async fn get_pull_request(&self, number: u64) -> Result<Option<PullRequestEvent>> {
        let client = &self.client;
        let (owner, repo) = (self.owner.as_str(), self.repo.as_str());
        let pr = self
            .with_retry(&format!("pull request #{}", number), move || async move {
                client.pulls(owner, repo).get(number).await
            })
            .await?;
        Ok(pr.into_event())
    }

    pub async fn get_commit(&self, sha: &str) -> Result<Option<CommitEvent>> {
        let client = &self.client;
        let (owner, repo) = (self.owner.as_str(), self.repo.as_str());
        let commit = self
            .with_retry(&format!("commit {}", sha), move || async move {
                client.commits(owner, repo).get(sha).await
            })
            .await?;
        Ok(commit.into_event())
    }

    /// Follows the `next` links of `page`, retrying each request on its own.
    async fn remaining_pages<T>(&self, what: &str, mut page: Page<T>) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut items = page.take_items();
        let mut number = 1;
        debug!("{} page {}: {} items", what, number, items.len());

        while page.next.is_some() {
            number += 1;
            let client = &self.client;
            let next = &page.next;
            let fetched = self
                .with_retry(what, move || client.get_page::<T>(next))
                .await?;
            let Some(mut fetched) = fetched else {
                break;
            };
            let batch = fetched.take_items();
            debug!("{} page {}: {} items", what, number, batch.len());
            items.extend(batch);
            page = fetched;
        }

        Ok(items)
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut request: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = octocrab::Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.retries && is_retryable(&err) => {
                    let delay = retry_delay(attempt);
                    attempt += 1;
                    warn!(
                        "{} failed ({}), retrying in {:?} ({}/{})",
                        what, err, delay, attempt, self.retries
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Exponential backoff, capped at [`RETRY_MAX_DELAY`].
fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(RETRY_MAX_DELAY)
}

/// Rate limiting, server errors and dropped connections are worth another
/// attempt. A 404, a validation failure or a payload that does not decode is
/// not.
fn is_retryable(err: &octocrab::Error) -> bool {
    match err {
        octocrab::Error::GitHub { source, .. } => {
            let message = source.message.to_lowercase();
            message.contains("rate limit")
                || message.contains("abuse")
                || message.contains("server error")
        }
        octocrab::Error::Hyper { .. } | octocrab::Error::Service { .. } => true,
        _ => false,
    }
}

#[async_trait]
impl EventSource for GitHubClient {
    async fn merged_pull_requests(&self) -> Result<Vec<PullRequestEvent>> {
        let q = self.search_query(&[("state", "closed"), ("type", "pr"), ("is", "merged")]);
        let client = &self.client;
        let query = q.as_str();

        let first = self
            .with_retry("pull request search", move || {
                client
                    .search()
                    .issues_and_pull_requests(query)
                    .per_page(PER_PAGE)
                    .page(1u32)
                    .send()
            })
            .await?;
        if first.incomplete_results == Some(true) {
            warn!("GitHub reported incomplete search results");
        }
        let total = first.total_count;

        let items = self.remaining_pages("pull request search", first).await?;
        if let Some(total) = total.filter(|&total| total > items.len() as u64) {
            // The search API stops paging after its first 1000 results.
            warn!(
                "Search matched {} pull requests but only {} could be listed",
                total,
                items.len()
            );
        }

        Ok(items.into_iter().filter_map(IntoEvent::into_event).collect())
    }

    async fn commits(&self, since: Option<DateTime<Utc>>) -> Result<Vec<CommitEvent>> {
        let client = &self.client;
        let (owner, repo) = (self.owner.as_str(), self.repo.as_str());

        let first = self
            .with_retry("commit listing", move || async move {
                let handler = client.repos(owner, repo);
                let mut builder = handler.list_commits().per_page(PER_PAGE).page(1u32);
                if let Some(since) = since {
                    builder = builder.since(since);
                }
                builder.send().await
            })
            .await?;

        let items = self.remaining_pages("commit listing", first).await?;
        Ok(items.into_iter().filter_map(IntoEvent::into_event).collect())
    }

    async fn pull_request_commits(&self, number: u64) -> Result<Vec<String>> {
        let route = format!("/repos/{}/{}/pulls/{}/commits", self.owner, self.repo, number);
        let what = format!("commits of #{}", number);
        let client = &self.client;
        let route = route.as_str();
        let params = &PageParams {
            per_page: PER_PAGE,
            page: 1,
        };

        let first = self
            .with_retry(&what, move || {
                client.get::<Page<CommitRef>, _, _>(route, Some(params))
            })
            .await?;

        let commits = self.remaining_pages(&what, first).await?;
        Ok(commits.into_iter().map(|commit| commit.sha).collect())
    }
}

#[async_trait]
impl ChangeLookup for GitHubClient {
    async fn pull_request(&self, number: u64) -> Result<Option<PullRequestEvent>> {
        self.get_pull_request(number).await
    }

    async fn commit(&self, hash: &str) -> Result<Option<CommitEvent>> {
        self.get_commit(hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_query_format() {
        let client =
            GitHubClient::new(None, "acme".to_string(), "widgets".to_string()).unwrap();

        assert_eq!(
            client.search_query(&[("state", "closed"), ("type", "pr"), ("is", "merged")]),
            r#"repo:acme/widgets state:"closed" type:"pr" is:"merged""#
        );
    }

    #[test]
    fn test_retry_delay_doubles_up_to_the_cap() {
        assert_eq!(retry_delay(0), Duration::from_millis(500));
        assert_eq!(retry_delay(1), Duration::from_secs(1));
        assert_eq!(retry_delay(3), Duration::from_secs(4));
        assert_eq!(retry_delay(6), RETRY_MAX_DELAY);
        assert_eq!(retry_delay(32), RETRY_MAX_DELAY);
        assert_eq!(retry_delay(u32::MAX), RETRY_MAX_DELAY);
    }
}
