use chrono::{NaiveDate, Utc};
use std::path::PathBuf;
use tracing::{info, warn};

use super::tasks::{Step, StepOutcome, TaskList, DRY_RUN_MSG, NO_PUSH_MSG};
use crate::changelog::{ChangelogDocument, ChangelogRenderer, ChangelogWriter};
use crate::config::{PackageManifest, Settings};
use crate::error::{Error, Result};
use crate::git::Git;
use crate::timeline::{fetch_timeline, ChangeLookup, Event, EventSource, FetchOptions, Timeline};
use crate::version::{
    Accumulation, Increment, IncrementClassifier, SemVer, VersionAccumulator, VersionedEvent,
};

#[derive(Debug, Clone, Default)]
pub struct ReleaseOptions {
    pub dry_run: bool,
    pub push: bool,
    pub publish: bool,
    /// Append the released change to the changelog.
    pub changelog: bool,
    /// Running inside a CI job.
    pub ci: bool,
    /// Token used to rewrite the origin url before pushing from CI.
    pub push_token: Option<String>,
    pub repository: Option<(String, String)>,
}

impl ReleaseOptions {
    pub fn should_push(&self) -> bool {
        self.push || self.publish
    }
}

/// Anything outside the release branch only previews, unless initialising.
pub fn effective_dry_run(
    dry_run: bool,
    init: bool,
    current_branch: Option<&str>,
    release_branch: &str,
) -> bool {
    dry_run || (!init && current_branch != Some(release_branch))
}

#[derive(Debug)]
pub struct RefreshReport {
    pub accumulation: Accumulation,
    pub document: ChangelogDocument,
    pub in_sync: bool,
    pub outcomes: Vec<StepOutcome>,
}

#[derive(Debug)]
pub struct ReleaseReport {
    pub previous_version: SemVer,
    pub change: VersionedEvent,
    pub outcomes: Vec<StepOutcome>,
}

pub struct Workflow<'a, S: ?Sized> {
    settings: &'a Settings,
    manifest: &'a PackageManifest,
    source: &'a S,
    git: Git,
    options: ReleaseOptions,
    classifier: IncrementClassifier,
    renderer: ChangelogRenderer,
    today: NaiveDate,
}

impl<'a, S> Workflow<'a, S>
where
    S: EventSource + ?Sized,
{
    pub fn new(
        settings: &'a Settings,
        manifest: &'a PackageManifest,
        source: &'a S,
        dir: impl Into<PathBuf>,
        options: ReleaseOptions,
    ) -> Result<Self> {
        if options.dry_run {
            info!("Dry-run enabled");
        }
        if options.should_push() {
            info!("Version updates will be pushed to the repo");
        }
        if options.publish {
            info!("Version updates will be published to NPM");
        }

        Ok(Self {
            settings,
            manifest,
            source,
            git: Git::new(dir),
            classifier: IncrementClassifier::new(settings.labels.clone()),
            renderer: ChangelogRenderer::new(settings.line_template.as_deref())?,
            options,
            today: Utc::now().date_naive(),
        })
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    fn writer(&self) -> ChangelogWriter {
        ChangelogWriter::new(self.git.dir().join(&self.settings.changelog), self.options.dry_run)
    }

    /// Version in the package manifest, or the configured start version.
    pub fn recorded_version(&self) -> Result<SemVer> {
        Ok(self.manifest.version()?.unwrap_or(self.settings.start_version))
    }

    pub async fn timeline(&self) -> Result<Timeline> {
        let options = FetchOptions {
            concurrency: self.settings.fetch_concurrency,
            since: None,
        };
        fetch_timeline(self.source, &options).await
    }

    pub fn accumulate(&self, timeline: &Timeline) -> Accumulation {
        VersionAccumulator::new(&self.classifier).accumulate(timeline, self.settings.start_version)
    }

    pub fn render(&self, accumulation: &Accumulation) -> Result<ChangelogDocument> {
        self.renderer.render(&accumulation.entries)
    }

    pub async fn calculate_current_version(&self) -> Result<SemVer> {
        info!("Calculating the repo's current version");
        let timeline = self.timeline().await?;
        Ok(VersionAccumulator::new(&self.classifier)
            .calculate_current_version(&timeline, self.settings.start_version))
    }

    /// One-off regeneration of the changelog and the package version from the
    /// whole history.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let timeline = self.timeline().await?;
        self.refresh_with(&timeline)
    }

    pub fn refresh_with(&self, timeline: &Timeline) -> Result<RefreshReport> {
        let accumulation = self.accumulate(timeline);
        let version = accumulation.final_version;
        info!("Generating the changelog contents");
        let document = self.render(&accumulation)?;

        let mut push = self.options.should_push();
        let mut publish = self.options.publish;
        let mut in_sync = false;
        let mut tasks = TaskList::new();

        if let Some(recorded) = self.manifest.version()? {
            if recorded > version {
                warn!(
                    "The current version listed in package.json ({}) is > the calculated version ({}). \
                     To ensure a consistent changelog, either make use of `startVersion` in your \
                     config, or label existing PRs as you would expect them to affect the repo version.",
                    recorded, version
                );
                return Err(Error::VersionRegression {
                    recorded: recorded.to_string(),
                    calculated: version.to_string(),
                });
            }

            if recorded == version {
                warn!(
                    "The current version listed in package.json is the same as the calculated \
                     version: {}. Use of --push and --publish will be ignored and you'll need to \
                     manually commit and push these changes to your repo.",
                    version
                );
                push = false;
                publish = false;
                in_sync = true;
            }
        }

        if !in_sync {
            let target = version.to_string();
            tasks.add(
                Step::npm(
                    "Setting the package version",
                    &["version", target.as_str(), "--no-git-tag-version"],
                )
                .skip_if(self.options.dry_run, DRY_RUN_MSG),
            );
        }

        self.writer().rewrite(&document)?;

        if push {
            self.commit_refreshed_changes(&mut tasks, version);
            self.push_steps(&mut tasks);
            if publish {
                self.publish_step(&mut tasks);
            }
        }

        let outcomes = tasks.run(self.git.dir())?;

        Ok(RefreshReport {
            accumulation,
            document,
            in_sync,
            outcomes,
        })
    }

    fn commit_refreshed_changes(&self, tasks: &mut TaskList, version: SemVer) {
        let dry_run = self.options.dry_run;
        let branch = self.settings.branch.as_str();
        let target = version.to_string();
        let changelog = self.settings.changelog.to_string_lossy();
        let message = release_commit_message(version);
        let tag = format!("v{}", version);

        tasks.add(
            Step::git(format!("Checking out {}", branch), &["checkout", branch])
                .skip_if(dry_run, DRY_RUN_MSG),
        );
        tasks.add(
            Step::npm("Bumping package version", &["version", target.as_str(), "--no-git-tag-version"])
                .skip_if(dry_run, DRY_RUN_MSG),
        );
        tasks.add(
            Step::git("Adding package.json to the commit list", &["add", "package.json"])
                .skip_if(dry_run, DRY_RUN_MSG),
        );
        tasks.add(
            Step::git("Adding the changelog to the commit list", &["add", changelog.as_ref()])
                .skip_if(dry_run, DRY_RUN_MSG),
        );
        tasks.add(
            Step::git("Committing changes", &["commit", "-m", message.as_str()])
                .skip_if(dry_run, DRY_RUN_MSG),
        );
        tasks.add(
            Step::git("Creating a tag for the new changes", &["tag", tag.as_str()])
                .skip_if(dry_run, DRY_RUN_MSG),
        );
    }

    fn push_steps(&self, tasks: &mut TaskList) {
        if let (true, Some(token), Some((owner, repo))) = (
            self.options.ci,
            self.options.push_token.as_deref(),
            self.options.repository.as_ref(),
        ) {
            let origin = format!("https://{}:{}@github.com/{}/{}.git", owner, token, owner, repo);
            info!("Explicitly setting git origin for {}/{}", owner, repo);
            tasks.add(
                Step::git(
                    format!("Explicitly setting git origin for {}/{}", owner, repo),
                    &["remote", "set-url", "origin", origin.as_str()],
                )
                .skip_if(self.options.dry_run, DRY_RUN_MSG),
            );
        }

        let branch = self.settings.branch.as_str();
        tasks.add(
            Step::git(
                format!("Pushing changes to {}", branch),
                &["push", "origin", branch, "--tags"],
            )
            .skip_if(self.options.dry_run, DRY_RUN_MSG),
        );
    }

    fn publish_step(&self, tasks: &mut TaskList) {
        tasks.add(
            Step::npm("Publishing to NPM", &["publish"])
                .skip_if(self.manifest.private, "This package is marked private")
                .skip_if(self.options.dry_run, DRY_RUN_MSG),
        );
    }
}

impl<'a, S> Workflow<'a, S>
where
    S: ChangeLookup + ?Sized,
{
    /// The newest change since the last release with the increment it asks for.
    pub async fn last_change(&self) -> Result<(Increment, Event)> {
        if let Some(number) = self.git.last_pull_request()? {
            if let Some(pr) = self.source.pull_request(number).await? {
                let event = Event::PullRequest(pr);
                let increment = match self.classifier.classify(&event) {
                    Some(increment) => {
                        info!("Found {} label on PR #{}.", increment, number);
                        increment
                    }
                    None => {
                        warn!(
                            "No labels found on PR #{}. Defaulting to {}.",
                            number,
                            Increment::Patch
                        );
                        Increment::Patch
                    }
                };
                return Ok((increment, event));
            }
        }

        warn!("Only commits found. Defaulting to {}.", Increment::Patch);
        let hash = self
            .git
            .last_commit()?
            .ok_or_else(|| Error::Config("repository has no commits".to_string()))?;
        let commit = self
            .source
            .commit(&hash)
            .await?
            .ok_or_else(|| Error::Config(format!("commit {} not found on GitHub", hash)))?;

        Ok((Increment::Patch, Event::Commit(commit)))
    }

    /// Bumps the package for the newest change; meant to run after a
    /// successful CI build.
    pub async fn release(&self) -> Result<ReleaseReport> {
        info!("Getting last change and determining the new version");
        let (increment, event) = self.last_change().await?;
        self.release_change(increment, event)
    }

    pub fn release_change(&self, increment: Increment, event: Event) -> Result<ReleaseReport> {
        let previous_version = self.recorded_version()?;
        let version = previous_version.bump(increment);
        info!("Bumping v{} with {} release...", previous_version, increment);

        let dry_run = self.options.dry_run;
        let push = self.options.should_push();
        let branch = self.settings.branch.as_str();
        let mut tasks = TaskList::new();

        if self.options.ci && !dry_run {
            match self.git.last_author()? {
                Some(author) => {
                    tasks.add(Step::git(
                        format!("Overriding user.name to {}", author.name),
                        &["config", "user.name", author.name.as_str()],
                    ));
                    tasks.add(Step::git(
                        format!("Overriding user.email to {}", author.email),
                        &["config", "user.email", author.email.as_str()],
                    ));
                }
                None => warn!("No commits found to take the git user/email from"),
            }
        }

        tasks.add(
            Step::git(format!("Checking out the {} branch", branch), &["checkout", branch])
                .skip_if(!push, NO_PUSH_MSG)
                .skip_if(dry_run, DRY_RUN_MSG),
        );
        tasks.add(
            Step::npm(
                "Bumping the package version",
                &["version", increment.as_str(), "--no-git-tag-version"],
            )
            .skip_if(dry_run, DRY_RUN_MSG),
        );
        tasks.add(
            Step::git("Add package.json to commit list", &["add", "package.json"])
                .skip_if(!push, NO_PUSH_MSG)
                .skip_if(dry_run, DRY_RUN_MSG),
        );

        let change = VersionedEvent {
            version,
            increment,
            event,
        };

        if self.options.changelog {
            let line = self.renderer.render_line(&change)?;
            let appended = match self.writer().append(&line, version, self.today) {
                Ok(_) => true,
                Err(err) if err.is_recoverable() => {
                    warn!("Skipping appending to the changelog: {}", err);
                    false
                }
                Err(err) => return Err(err),
            };

            let changelog = self.settings.changelog.to_string_lossy();
            tasks.add(
                Step::git("Adding the changelog to the commit list", &["add", changelog.as_ref()])
                    .skip_if(!appended, "Writing to the changelog failed")
                    .skip_if(!push, NO_PUSH_MSG)
                    .skip_if(dry_run, DRY_RUN_MSG),
            );
        }

        let message = release_commit_message(version);
        let tag = format!("v{}", version);
        tasks.add(
            Step::git("Committing current changes", &["commit", "-m", message.as_str()])
                .skip_if(!push, NO_PUSH_MSG)
                .skip_if(dry_run, DRY_RUN_MSG),
        );
        tasks.add(
            Step::git(format!("Tagging the new version {}", tag), &["tag", tag.as_str()])
                .skip_if(!push, NO_PUSH_MSG)
                .skip_if(dry_run, DRY_RUN_MSG),
        );

        if push {
            self.push_steps(&mut tasks);
            if self.options.publish {
                self.publish_step(&mut tasks);
            }
        }

        let outcomes = tasks.run(self.git.dir())?;

        Ok(ReleaseReport {
            previous_version,
            change,
            outcomes,
        })
    }
}

/// Message of the commit a release creates; the timeline filters these out.
pub fn release_commit_message(version: SemVer) -> String {
    format!("Automated release: v{}\n\n[ci skip]", version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::TimelineBuilder;

    #[test]
    fn test_effective_dry_run() {
        assert!(effective_dry_run(true, false, Some("master"), "master"));
        assert!(!effective_dry_run(false, false, Some("master"), "master"));
        assert!(effective_dry_run(false, false, Some("feature/x"), "master"));
        assert!(effective_dry_run(false, false, None, "master"));
        assert!(!effective_dry_run(false, true, Some("feature/x"), "master"));
    }

    #[test]
    fn test_release_commits_are_filtered_from_the_timeline() {
        let message = release_commit_message(SemVer::new(1, 2, 3));
        assert!(TimelineBuilder::is_automation_message(&message));
    }
}
