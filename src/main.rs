use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};

use semver_timeline::changelog::{format_preview, OutputFormat};
use semver_timeline::config::{Config, PackageManifest};
use semver_timeline::git::Git;
use semver_timeline::github::GitHubClient;
use semver_timeline::release::{effective_dry_run, ReleaseOptions, Workflow};
use semver_timeline::Error;

#[derive(Parser)]
#[command(name = "semver-timeline")]
#[command(about = "Derive a repository's version and changelog from its pull request labels")]
struct Cli {
    /// GitHub token (falls back to GITHUB_TOKEN)
    #[arg(long, env = "GH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Repository as owner/name (defaults to the origin remote)
    #[arg(long)]
    repo: Option<String>,

    /// Config file: package.json, a JSON file or a TOML file
    #[arg(short, long, default_value = "package.json")]
    config: PathBuf,

    /// Release branch, others are ignored. `BRANCH` names the branch being
    /// built, so the release branch has its own variable.
    #[arg(short, long, env = "RELEASE_BRANCH")]
    branch: Option<String>,

    /// Perform a dry-run without pushing or publishing
    #[arg(short, long)]
    dry_run: bool,

    /// Bypass the CI environment check
    #[arg(short, long)]
    force: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bump the version for the newest change (run after a successful CI build)
    Release {
        #[arg(long)]
        push: bool,

        #[arg(long)]
        publish: bool,

        /// Append the change to the changelog
        #[arg(long)]
        changelog: bool,
    },

    /// Regenerate the changelog and package version from the whole history
    Refresh {
        /// Allow running outside the release branch
        #[arg(long)]
        init: bool,

        #[arg(long)]
        push: bool,

        #[arg(long)]
        publish: bool,
    },

    /// Print the version calculated from the history
    Version,

    /// Preview the changelog without writing it
    Changelog {
        /// Output file path (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Preview format
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(Cli::parse()).await {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ci = std::env::var_os("CI").is_some();
    let mutating = matches!(cli.command, Commands::Release { .. } | Commands::Refresh { .. });
    if mutating && !(ci || cli.dry_run || cli.force) {
        return Err(Error::NotInCi.into());
    }

    let dir = std::env::current_dir()?;
    let git = Git::new(&dir);

    let config = Config::load(&cli.config)
        .with_context(|| format!("reading config from {}", cli.config.display()))?;
    let mut settings = config.validate()?;
    if let Some(branch) = cli.branch {
        settings.branch = branch;
    }
    let manifest = match PackageManifest::load(&dir.join("package.json")) {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!("No readable package.json ({}); using the configured start version", err);
            PackageManifest::default()
        }
    };

    let (owner, repo) = match cli.repo.as_deref() {
        Some(full) => full
            .split_once('/')
            .map(|(owner, repo)| (owner.to_string(), repo.to_string()))
            .with_context(|| format!("--repo must be owner/name, got {}", full))?,
        None => git.user_repo()?,
    };
    let token = cli.token.or_else(|| std::env::var("GITHUB_TOKEN").ok());
    let github_client = GitHubClient::new(token, owner.clone(), repo.clone())?
        .with_retries(settings.fetch_retries);

    let current_branch = git.current_branch().unwrap_or_else(|err| {
        warn!("Could not determine the current branch: {}", err);
        None
    });
    info!("Current branch: {}", current_branch.as_deref().unwrap_or("<unknown>"));
    info!("Release branch: {}", settings.branch);

    let init = matches!(cli.command, Commands::Refresh { init: true, .. });
    let mut options = ReleaseOptions {
        dry_run: effective_dry_run(cli.dry_run, init, current_branch.as_deref(), &settings.branch),
        ci,
        push_token: std::env::var("GH_TOKEN").ok(),
        repository: Some((owner, repo)),
        ..ReleaseOptions::default()
    };

    match cli.command {
        Commands::Release {
            push,
            publish,
            changelog,
        } => {
            options.push = push;
            options.publish = publish;
            options.changelog = changelog;
            let workflow = Workflow::new(&settings, &manifest, &github_client, &dir, options)?;
            let report = workflow.release().await?;
            println!(
                "Released v{} (was v{})",
                report.change.version, report.previous_version
            );
        }
        Commands::Refresh { push, publish, .. } => {
            options.push = push;
            options.publish = publish;
            let workflow = Workflow::new(&settings, &manifest, &github_client, &dir, options)?;
            let report = workflow.refresh().await?;
            println!(
                "Changelog refreshed at v{}",
                report.accumulation.final_version
            );
        }
        Commands::Version => {
            let workflow = Workflow::new(&settings, &manifest, &github_client, &dir, options)?;
            println!("{}", workflow.calculate_current_version().await?);
        }
        Commands::Changelog { output, format } => {
            let workflow = Workflow::new(&settings, &manifest, &github_client, &dir, options)?;
            let timeline = workflow.timeline().await?;
            let accumulation = workflow.accumulate(&timeline);
            let document = workflow.render(&accumulation)?;
            let content = format_preview(format, &document, &accumulation)?;

            if let Some(output_path) = output {
                std::fs::write(&output_path, content)?;
                println!("Changelog preview written to {}", output_path.display());
            } else {
                println!("{}", content);
            }
        }
    }

    Ok(())
}
