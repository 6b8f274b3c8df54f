//! Local git plumbing: branch detection, tags, commit ranges and the last
//! merged pull request.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::version::SemVer;

/// Environment variables CI providers use for the branch being built.
const BRANCH_VARS: [&str; 3] = ["BRANCH", "CIRCLE_BRANCH", "TRAVIS_BRANCH"];

/// `%an|%ae|%s`
pub const LOG_FORMAT: &str = "--format=%an|%ae|%s";

static HEAD_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ref: refs/heads/([^\n]+)").expect("valid HEAD pattern"));

/// Merge commits (`Merge pull request #12 ...`) or squash commits (`Title (#12)`).
static PR_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Merge pull request #(\d+)|\(#(\d+)\)$").expect("valid pull request pattern")
});

static RELEASE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v(\d+)\.(\d+)\.(\d+)$").expect("valid tag pattern"));

/// One `%an|%ae|%s` line of `git log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl LogLine {
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.trim_matches('\'').splitn(3, '|');
        let name = parts.next()?;
        let email = parts.next()?;
        let message = parts.next().filter(|m| !m.is_empty())?;

        Some(Self {
            name: name.to_string(),
            email: email.to_string(),
            message: message.to_string(),
        })
    }

    pub fn pull_request_number(&self) -> Option<u64> {
        let caps = PR_REFERENCE.captures(&self.message)?;
        caps.get(2)
            .or_else(|| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

/// First pull request referenced in `git log` output, newest first.
/// Lines that do not split into name, email and message are skipped.
pub fn find_pull_request<'a>(lines: impl IntoIterator<Item = &'a str>) -> Option<u64> {
    lines.into_iter().find_map(|line| match LogLine::parse(line) {
        Some(entry) => entry.pull_request_number(),
        None => {
            warn!("Could not parse name, email, & message from: {}", line);
            None
        }
    })
}

/// `(owner, repo)` from an ssh or https remote url.
pub fn parse_remote_url(url: &str) -> Option<(String, String)> {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let mut segments = trimmed.rsplit(|c: char| c == '/' || c == ':');
    let repo = segments.next().filter(|s| !s.is_empty())?;
    let owner = segments.next().filter(|s| !s.is_empty())?;
    Some((owner.to_string(), repo.to_string()))
}

pub fn parse_head_ref(contents: &str) -> Option<String> {
    HEAD_REF
        .captures(contents)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Highest `vX.Y.Z` tag, compared as versions rather than strings.
pub fn latest_release_tag<'a>(tags: impl IntoIterator<Item = &'a str>) -> Option<(String, SemVer)> {
    tags.into_iter()
        .filter(|tag| RELEASE_TAG.is_match(tag))
        .filter_map(|tag| tag.parse::<SemVer>().ok().map(|v| (tag.to_string(), v)))
        .max_by_key(|(_, version)| *version)
}

pub struct Git {
    dir: PathBuf,
}

impl Git {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Runs `git <args>` and returns the non-empty output lines.
    pub fn exec(&self, args: &[&str]) -> Result<Vec<String>> {
        run_command(&self.dir, "git", args)
    }

    pub fn current_branch(&self) -> Result<Option<String>> {
        for var in BRANCH_VARS {
            if let Ok(branch) = std::env::var(var) {
                if !branch.is_empty() {
                    return Ok(Some(branch));
                }
            }
        }

        let head = std::fs::read_to_string(self.dir.join(".git").join("HEAD"))?;
        Ok(parse_head_ref(&head))
    }

    pub fn latest_tag(&self) -> Result<Option<String>> {
        if let Err(err) = self.exec(&["fetch", "--tags"]) {
            debug!("Could not fetch tags: {}", err);
        }

        let tags = self.exec(&["tag", "-l", "v*"])?;
        let latest = latest_release_tag(tags.iter().map(String::as_str)).map(|(tag, _)| tag);

        match &latest {
            Some(tag) => info!("Latest tag: {}", tag),
            None => warn!("No tags found"),
        }
        Ok(latest)
    }

    pub fn initial_commit(&self) -> Result<Option<String>> {
        Ok(self
            .exec(&["log", "--format=%h", "--max-parents=0", "HEAD"])?
            .pop())
    }

    /// Full hash of `HEAD`.
    pub fn last_commit(&self) -> Result<Option<String>> {
        Ok(self.exec(&["log", "-1", "--format=%H", "HEAD"])?.pop())
    }

    /// `<latest tag or initial commit>..HEAD`
    pub fn commit_range(&self) -> Result<String> {
        let start = match self.latest_tag()? {
            Some(tag) => tag,
            None => self
                .initial_commit()?
                .ok_or_else(|| Error::Config("repository has no commits".to_string()))?,
        };
        Ok(format!("{}..HEAD", start))
    }

    /// Most recent pull request merged (or squashed) since the last release.
    pub fn last_pull_request(&self) -> Result<Option<u64>> {
        let range = self.commit_range()?;

        let merges = self.exec(&["log", "--merges", "-n1", LOG_FORMAT, range.as_str()])?;
        if let Some(number) = find_pull_request(merges.iter().map(String::as_str)) {
            return Ok(Some(number));
        }
        warn!("No merge commits found between: {}", range);
        info!("Checking for squash commits.");

        let commits = self.exec(&["log", LOG_FORMAT, range.as_str()])?;
        if commits.is_empty() {
            warn!("No squash commits found between: {}", range);
            return Ok(None);
        }

        Ok(find_pull_request(commits.iter().map(String::as_str)))
    }

    /// Author of the newest commit in the release range.
    pub fn last_author(&self) -> Result<Option<LogLine>> {
        let range = self.commit_range()?;
        let lines = self.exec(&["log", "-n1", LOG_FORMAT, range.as_str()])?;
        Ok(lines.first().and_then(|line| LogLine::parse(line)))
    }

    pub fn user_repo(&self) -> Result<(String, String)> {
        let url = self
            .exec(&["config", "--get", "remote.origin.url"])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Config("no `remote.origin.url` configured".to_string()))?;

        let (owner, repo) = parse_remote_url(&url)
            .ok_or_else(|| Error::Config(format!("cannot parse remote url {}", url)))?;
        info!("User: {}", owner);
        info!("Repo: {}", repo);
        Ok((owner, repo))
    }
}

pub fn run_command(dir: &Path, program: &str, args: &[&str]) -> Result<Vec<String>> {
    let command_line = format!("{} {}", program, args.join(" "));
    debug!("Executing: {}", command_line);

    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|err| Error::Command {
            command: command_line.clone(),
            stderr: err.to_string(),
        })?;

    if !output.status.success() {
        return Err(Error::Command {
            command: command_line,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
