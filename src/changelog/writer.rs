use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::renderer::{current_version_heading, day_heading, ChangelogDocument};
use crate::error::{Error, Result};
use crate::version::SemVer;

/// Title, description, blank, semver notice, blank.
const HEADER_LINES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Added under today's current-version section.
    SameDay,
    /// Opened a new current-version section for today.
    NewDay,
    /// Today's section already lists the line.
    AlreadyPresent,
}

/// Owns every write to the changelog file.
pub struct ChangelogWriter {
    path: PathBuf,
    dry_run: bool,
}

impl ChangelogWriter {
    pub fn new(path: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            path: path.into(),
            dry_run,
        }
    }

    /// Replaces the whole file with `document`.
    pub fn rewrite(&self, document: &ChangelogDocument) -> Result<()> {
        let content = document.to_markdown();

        if self.dry_run {
            warn!("[DRY RUN] writing changelog to {}", self.path.display());
            info!("{}", content);
            return Ok(());
        }

        info!("Writing out the changelog contents to {}", self.path.display());
        write_atomic(&self.path, &content)
    }

    /// Adds the newest entry to the existing file.
    ///
    /// Fails with [`Error::ChangelogMissing`] when there is no file yet; the
    /// caller decides whether to fall back to a full rewrite.
    pub fn append(&self, line: &str, version: SemVer, today: NaiveDate) -> Result<AppendOutcome> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(content) if !content.trim().is_empty() => content,
            Ok(_) => return Err(Error::ChangelogMissing(self.path.clone())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ChangelogMissing(self.path.clone()))
            }
            Err(err) => return Err(err.into()),
        };

        let (content, outcome) = merge_latest(&existing, line, version, today)?;
        if outcome == AppendOutcome::AlreadyPresent {
            info!("Changelog already lists \"{}\"", line);
            return Ok(outcome);
        }

        if self.dry_run {
            warn!("[DRY RUN] appending \"{}\" to {}", line, self.path.display());
            return Ok(outcome);
        }

        info!("Appending latest change to {}", self.path.display());
        write_atomic(&self.path, &content)?;
        Ok(outcome)
    }
}

/// Inserts `line` into `existing` under a current-version heading for `today`.
///
/// Same day: the line joins the existing section under a refreshed heading.
/// New day: the old heading is demoted to a plain date and a new section opens
/// above it. A line that is already in today's section is left alone.
pub fn merge_latest(
    existing: &str,
    line: &str,
    version: SemVer,
    today: NaiveDate,
) -> Result<(String, AppendOutcome)> {
    let lines: Vec<&str> = existing.lines().collect();

    if lines.len() < HEADER_LINES || !lines[0].starts_with("# ") {
        return Err(Error::MalformedChangelog(
            "missing the title and description header".to_string(),
        ));
    }

    let current_heading = current_version_heading(today, &version);
    let demoted;
    let mut merged: Vec<&str> = lines[..HEADER_LINES].to_vec();
    merged.push(&current_heading);
    merged.push("");
    merged.push(line);

    let outcome = match lines.get(HEADER_LINES) {
        None => AppendOutcome::NewDay,
        Some(heading) => {
            let latest = heading_date(heading)?;
            let rest = lines.get(HEADER_LINES + 2..).unwrap_or_default();

            if latest == today {
                let already_listed = rest
                    .iter()
                    .take_while(|l| !l.trim().is_empty())
                    .any(|existing_line| *existing_line == line);
                if already_listed {
                    return Ok((existing.to_string(), AppendOutcome::AlreadyPresent));
                }
                merged.extend_from_slice(rest);
                AppendOutcome::SameDay
            } else {
                demoted = day_heading(latest);
                merged.push("");
                merged.push(&demoted);
                merged.extend_from_slice(lines.get(HEADER_LINES + 1..).unwrap_or_default());
                AppendOutcome::NewDay
            }
        }
    };

    let mut content = merged.join("\n");
    content.push('\n');
    Ok((content, outcome))
}

/// Date of a `## YYYY-MM-DD...` heading.
fn heading_date(heading: &str) -> Result<NaiveDate> {
    heading
        .strip_prefix("## ")
        .and_then(|rest| rest.get(..10))
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        .ok_or_else(|| {
            Error::MalformedChangelog(format!("expected a dated section heading, found {:?}", heading))
        })
}

/// New content replaces old in one rename; readers never see a partial file.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    fs::write(&staging, content)?;
    fs::rename(&staging, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::renderer::header;
    use pretty_assertions::assert_eq;

    const EXISTING: &str = "# Change Log\n\
        All notable changes to this project will be documented in this file.\n\
        \n\
        This project adheres to [Semantic Versioning](http://semver.org/).\n\
        \n\
        ## 2024-02-04 - [0.3.0 - current version]\n\
        \n\
        - 0.3.0 - ([3](u3)) - Feature 3 (@octocat)\n\
        \n\
        ## 2024-02-01\n\
        \n\
        - 0.2.0 - ([2](u2)) - Feature 2 (@octocat)\n";

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    #[test]
    fn test_same_day_joins_current_section() {
        let (content, outcome) =
            merge_latest(EXISTING, "- 0.3.1 - ([4](u4)) - Fix (@octocat)", SemVer::new(0, 3, 1), day(4))
                .unwrap();

        assert_eq!(outcome, AppendOutcome::SameDay);
        assert_eq!(
            content,
            "# Change Log\n\
             All notable changes to this project will be documented in this file.\n\
             \n\
             This project adheres to [Semantic Versioning](http://semver.org/).\n\
             \n\
             ## 2024-02-04 - [0.3.1 - current version]\n\
             \n\
             - 0.3.1 - ([4](u4)) - Fix (@octocat)\n\
             - 0.3.0 - ([3](u3)) - Feature 3 (@octocat)\n\
             \n\
             ## 2024-02-01\n\
             \n\
             - 0.2.0 - ([2](u2)) - Feature 2 (@octocat)\n"
        );
    }

    #[test]
    fn test_new_day_demotes_previous_heading() {
        let (content, outcome) =
            merge_latest(EXISTING, "- 1.0.0 - ([5](u5)) - Rewrite (@octocat)", SemVer::new(1, 0, 0), day(9))
                .unwrap();

        assert_eq!(outcome, AppendOutcome::NewDay);
        assert_eq!(
            content,
            "# Change Log\n\
             All notable changes to this project will be documented in this file.\n\
             \n\
             This project adheres to [Semantic Versioning](http://semver.org/).\n\
             \n\
             ## 2024-02-09 - [1.0.0 - current version]\n\
             \n\
             - 1.0.0 - ([5](u5)) - Rewrite (@octocat)\n\
             \n\
             ## 2024-02-04\n\
             \n\
             - 0.3.0 - ([3](u3)) - Feature 3 (@octocat)\n\
             \n\
             ## 2024-02-01\n\
             \n\
             - 0.2.0 - ([2](u2)) - Feature 2 (@octocat)\n"
        );
    }

    #[test]
    fn test_repeat_append_is_idempotent() {
        let line = "- 1.0.0 - ([5](u5)) - Rewrite (@octocat)";
        let (first, _) = merge_latest(EXISTING, line, SemVer::new(1, 0, 0), day(9)).unwrap();
        let (second, outcome) = merge_latest(&first, line, SemVer::new(1, 0, 0), day(9)).unwrap();

        assert_eq!(outcome, AppendOutcome::AlreadyPresent);
        assert_eq!(first, second);
        assert_eq!(second.matches(line).count(), 1);
    }

    #[test]
    fn test_header_only_document_opens_first_section() {
        let (content, outcome) =
            merge_latest(&header(), "- 0.0.1 - ([1](u1)) - Init (@octocat)", SemVer::new(0, 0, 1), day(1))
                .unwrap();

        assert_eq!(outcome, AppendOutcome::NewDay);
        assert_eq!(
            content,
            format!(
                "{}## 2024-02-01 - [0.0.1 - current version]\n\n- 0.0.1 - ([1](u1)) - Init (@octocat)\n",
                header()
            )
        );
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            merge_latest("just some notes\n", "- x", SemVer::new(0, 0, 1), day(1)),
            Err(Error::MalformedChangelog(_))
        ));

        let undated = format!("{}## Unreleased\n\n- y\n", header());
        assert!(matches!(
            merge_latest(&undated, "- x", SemVer::new(0, 0, 1), day(1)),
            Err(Error::MalformedChangelog(_))
        ));
    }

    #[test]
    fn test_append_without_file_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ChangelogWriter::new(dir.path().join("CHANGELOG.md"), false);

        let err = writer.append("- x", SemVer::new(0, 0, 1), day(1)).unwrap_err();
        assert!(matches!(err, Error::ChangelogMissing(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_rewrite_and_append_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHANGELOG.md");
        fs::write(&path, EXISTING).unwrap();
        let writer = ChangelogWriter::new(&path, false);

        writer.append("- 0.3.1 - ([4](u4)) - Fix (@octocat)", SemVer::new(0, 3, 1), day(4)).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("## 2024-02-04 - [0.3.1 - current version]"));
        assert!(!dir.path().join("CHANGELOG.md.tmp").exists());

        writer.rewrite(&ChangelogDocument::default()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), header());
    }

    #[test]
    fn test_dry_run_never_touches_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHANGELOG.md");
        fs::write(&path, EXISTING).unwrap();
        let writer = ChangelogWriter::new(&path, true);

        let outcome = writer.append("- 9.9.9 - x", SemVer::new(9, 9, 9), day(20)).unwrap();
        writer.rewrite(&ChangelogDocument::default()).unwrap();

        assert_eq!(outcome, AppendOutcome::NewDay);
        assert_eq!(fs::read_to_string(&path).unwrap(), EXISTING);
    }
}
