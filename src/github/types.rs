use octocrab::models::{self, issues::Issue, pulls::PullRequest, repos::RepoCommit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

use crate::timeline::{CommitEvent, PullRequestEvent};

/// Entry of `/repos/{owner}/{repo}/pulls/{number}/commits`; only the hash is
/// needed, so the full commit payload is not decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

/// Conversion of an API model into a timeline event.
///
/// Items that cannot be placed on the timeline (no usable date) are logged
/// and dropped.
pub trait IntoEvent {
    type Event;

    fn into_event(self) -> Option<Self::Event>;
}

fn label_names(labels: Vec<models::Label>) -> BTreeSet<String> {
    labels.into_iter().map(|label| label.name).collect()
}

/// A pull request as returned by the issue search API.
impl IntoEvent for Issue {
    type Event = PullRequestEvent;

    fn into_event(self) -> Option<PullRequestEvent> {
        let Some(date) = self.closed_at else {
            warn!("Skipping pull request #{}: no close date", self.number);
            return None;
        };

        Some(PullRequestEvent {
            date,
            number: self.number,
            title: self.title,
            author: self.user.login,
            url: self.html_url.to_string(),
            labels: label_names(self.labels),
        })
    }
}

impl IntoEvent for PullRequest {
    type Event = PullRequestEvent;

    fn into_event(self) -> Option<PullRequestEvent> {
        let Some(date) = self.merged_at else {
            warn!("Skipping pull request #{}: never merged", self.number);
            return None;
        };

        Some(PullRequestEvent {
            date,
            number: self.number,
            title: self.title.unwrap_or_default(),
            author: self.user.map(|user| user.login).unwrap_or_default(),
            url: self.html_url.map(|url| url.to_string()).unwrap_or_default(),
            labels: label_names(self.labels.unwrap_or_default()),
        })
    }
}

impl IntoEvent for RepoCommit {
    type Event = CommitEvent;

    fn into_event(self) -> Option<CommitEvent> {
        let signature = self.commit.author;
        let Some(date) = signature.as_ref().and_then(|s| s.date) else {
            warn!("Skipping commit {}: no author date", self.sha);
            return None;
        };

        Some(CommitEvent {
            date,
            hash: self.sha,
            message: self.commit.message,
            author: self.author.map(|account| account.login),
            author_name: signature.map(|s| s.user.name).unwrap_or_default(),
            url: self.html_url,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_without_account() {
        let item: RepoCommit = serde_json::from_value(fixtures::commit(
            "9fceb02d0ae598e95dc970b74767f19372d61af8",
            "Fix build",
            "2024-01-05T10:00:00Z",
            None,
        ))
        .unwrap();

        let event = item.into_event().unwrap();
        assert_eq!(event.author, None);
        assert_eq!(event.author_name, "Jane Doe");
        assert_eq!(event.date.to_rfc3339(), "2024-01-05T10:00:00+00:00");
    }

    #[test]
    fn test_search_item_keeps_labels() {
        let item: Issue = serde_json::from_value(fixtures::issue(
            4,
            "Add widgets",
            Some("2024-05-02T12:00:00Z"),
            &["Version: Minor", "enhancement"],
        ))
        .unwrap();

        let event = item.into_event().unwrap();
        assert_eq!(event.author, "octocat");
        assert_eq!(event.url, "https://github.com/acme/widgets/pull/4");
        assert!(event.labels.contains("Version: Minor"));
    }

    #[test]
    fn test_search_item_without_close_date_is_skipped() {
        let item: Issue =
            serde_json::from_value(fixtures::issue(3, "Open", None, &[])).unwrap();

        assert!(item.into_event().is_none());
    }

    #[test]
    fn test_closed_but_unmerged_pull_request_is_skipped() {
        let merged: PullRequest =
            serde_json::from_value(fixtures::pull_request(5, Some("2024-05-02T12:00:00Z")))
                .unwrap();
        let abandoned: PullRequest =
            serde_json::from_value(fixtures::pull_request(6, None)).unwrap();

        assert_eq!(merged.into_event().map(|pr| pr.title), Some("Change 5".to_string()));
        assert!(abandoned.into_event().is_none());
    }
}
