use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    /// When the pull request was merged.
    pub date: DateTime<Utc>,
    pub number: u64,
    pub title: String,
    pub author: String,
    pub url: String,
    pub labels: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    /// Author timestamp of the commit.
    pub date: DateTime<Utc>,
    pub hash: String,
    pub message: String,
    /// Platform login, absent when the commit author has no account.
    pub author: Option<String>,
    pub author_name: String,
    pub url: String,
}

/// One unit of release history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    PullRequest(PullRequestEvent),
    Commit(CommitEvent),
}

/// Short reference shown in the changelog: `12` for pull requests,
/// the abbreviated hash for commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventId<'a> {
    Number(u64),
    Hash(&'a str),
}

impl fmt::Display for EventId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::Number(number) => write!(f, "{}", number),
            EventId::Hash(hash) => write!(f, "{}", hash),
        }
    }
}

impl Event {
    pub fn date(&self) -> DateTime<Utc> {
        match self {
            Event::PullRequest(pr) => pr.date,
            Event::Commit(commit) => commit.date,
        }
    }

    pub fn identifier(&self) -> EventId<'_> {
        match self {
            Event::PullRequest(pr) => EventId::Number(pr.number),
            Event::Commit(commit) => {
                let end = commit
                    .hash
                    .char_indices()
                    .nth(7)
                    .map(|(idx, _)| idx)
                    .unwrap_or(commit.hash.len());
                EventId::Hash(&commit.hash[..end])
            }
        }
    }

    /// PR title, or the commit message with newlines collapsed to spaces.
    pub fn summary(&self) -> String {
        match self {
            Event::PullRequest(pr) => pr.title.clone(),
            Event::Commit(commit) => commit.message.replace("\r\n", " ").replace('\n', " "),
        }
    }

    /// `@handle` when a platform account is known, otherwise the display name.
    pub fn author(&self) -> String {
        match self {
            Event::PullRequest(pr) => format!("@{}", pr.author),
            Event::Commit(CommitEvent {
                author: Some(login),
                ..
            }) => format!("@{}", login),
            Event::Commit(commit) => commit.author_name.clone(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Event::PullRequest(pr) => &pr.url,
            Event::Commit(commit) => &commit.url,
        }
    }

    /// Commits never carry labels.
    pub fn labels(&self) -> Option<&BTreeSet<String>> {
        match self {
            Event::PullRequest(pr) => Some(&pr.labels),
            Event::Commit(_) => None,
        }
    }
}

impl From<PullRequestEvent> for Event {
    fn from(pr: PullRequestEvent) -> Self {
        Event::PullRequest(pr)
    }
}

impl From<CommitEvent> for Event {
    fn from(commit: CommitEvent) -> Self {
        Event::Commit(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn commit(author: Option<&str>) -> Event {
        Event::Commit(CommitEvent {
            date: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            hash: "0123456789abcdef".to_string(),
            message: "Fix typo\n\nin the readme".to_string(),
            author: author.map(str::to_string),
            author_name: "Jane Doe".to_string(),
            url: "https://github.com/acme/widgets/commit/0123456789abcdef".to_string(),
        })
    }

    #[test]
    fn test_commit_identifier_is_abbreviated_hash() {
        assert_eq!(commit(None).identifier().to_string(), "0123456");
    }

    #[test]
    fn test_commit_summary_collapses_newlines() {
        assert_eq!(commit(None).summary(), "Fix typo  in the readme");
    }

    #[test]
    fn test_author_prefers_handle() {
        assert_eq!(commit(Some("jdoe")).author(), "@jdoe");
        assert_eq!(commit(None).author(), "Jane Doe");
    }

    #[test]
    fn test_pull_request_accessors() {
        let event = Event::PullRequest(PullRequestEvent {
            date: Utc.with_ymd_and_hms(2024, 3, 2, 9, 30, 0).unwrap(),
            number: 42,
            title: "Add widgets".to_string(),
            author: "octocat".to_string(),
            url: "https://github.com/acme/widgets/pull/42".to_string(),
            labels: BTreeSet::from(["Version: Minor".to_string()]),
        });

        assert_eq!(event.identifier(), EventId::Number(42));
        assert_eq!(event.summary(), "Add widgets");
        assert_eq!(event.author(), "@octocat");
        assert_eq!(event.labels().map(BTreeSet::len), Some(1));
    }
}
