use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing required `{0}` option in the configuration")]
    MissingLabel(&'static str),

    #[error("invalid version `{0}`: expected <major>.<minor>.<patch>")]
    InvalidVersion(String),

    #[error("no changelog found at {}", .0.display())]
    ChangelogMissing(PathBuf),

    #[error("changelog is not in the expected format: {0}")]
    MalformedChangelog(String),

    #[error("recorded version {recorded} is ahead of the calculated version {calculated}")]
    VersionRegression { recorded: String, calculated: String },

    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("not running in a CI environment (pass --dry-run or --force to override)")]
    NotInCi,

    #[error(transparent)]
    GitHub(#[from] octocrab::Error),

    #[error(transparent)]
    TemplateRender(#[from] handlebars::RenderError),

    #[error(transparent)]
    TemplateParse(#[from] handlebars::TemplateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Conditions the workflows report and continue past.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::ChangelogMissing(_) | Error::MalformedChangelog(_))
    }
}
