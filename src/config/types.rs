use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::timeline::fetcher::DEFAULT_FETCH_CONCURRENCY;
use crate::version::{Increment, SemVer};

pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_CHANGELOG: &str = "CHANGELOG.md";
pub const DEFAULT_FETCH_RETRIES: u32 = 3;

/// Options as written in the config file.
///
/// Reads a `package.json` as-is (its top-level keys), a dedicated JSON file,
/// or a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub major_label: Option<String>,
    pub minor_label: Option<String>,
    pub patch_label: Option<String>,
    #[serde(alias = "startVersion")]
    pub start_version: Option<String>,
    pub branch: Option<String>,
    pub changelog: Option<PathBuf>,
    pub line_template: Option<String>,
    pub fetch_concurrency: Option<usize>,
    pub fetch_retries: Option<u32>,
}

/// The three labels that drive version increments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelIncrementConfig {
    pub major: String,
    pub minor: String,
    pub patch: String,
}

/// Validated configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub labels: LabelIncrementConfig,
    pub start_version: SemVer,
    pub branch: String,
    pub changelog: PathBuf,
    pub line_template: Option<String>,
    pub fetch_concurrency: usize,
    pub fetch_retries: u32,
}

/// The fields of `package.json` the release workflows care about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub private: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(content)?),
            _ => Ok(serde_json::from_str(content)?),
        }
    }

    /// Checks everything up front so later stages never see a half-configured run.
    pub fn validate(&self) -> Result<Settings> {
        let labels = self.labels()?;

        let start_version = match self.start_version.as_deref() {
            Some(raw) => raw.parse()?,
            None => SemVer::default(),
        };

        let fetch_concurrency = self.fetch_concurrency.unwrap_or(DEFAULT_FETCH_CONCURRENCY);
        if fetch_concurrency == 0 {
            return Err(Error::Config(
                "`fetch-concurrency` must be at least 1".to_string(),
            ));
        }

        Ok(Settings {
            labels,
            start_version,
            branch: self
                .branch
                .clone()
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            changelog: self
                .changelog
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHANGELOG)),
            line_template: self.line_template.clone(),
            fetch_concurrency,
            fetch_retries: self.fetch_retries.unwrap_or(DEFAULT_FETCH_RETRIES),
        })
    }

    pub fn labels(&self) -> Result<LabelIncrementConfig> {
        fn required(value: &Option<String>, key: &'static str) -> Result<String> {
            match value.as_deref().map(str::trim) {
                Some(label) if !label.is_empty() => Ok(label.to_string()),
                _ => Err(Error::MissingLabel(key)),
            }
        }

        let labels = LabelIncrementConfig {
            major: required(&self.major_label, "major-label")?,
            minor: required(&self.minor_label, "minor-label")?,
            patch: required(&self.patch_label, "patch-label")?,
        };

        if labels.major == labels.minor
            || labels.major == labels.patch
            || labels.minor == labels.patch
        {
            return Err(Error::Config(
                "`major-label`, `minor-label` and `patch-label` must all differ".to_string(),
            ));
        }

        Ok(labels)
    }
}

impl LabelIncrementConfig {
    pub fn new(
        major: impl Into<String>,
        minor: impl Into<String>,
        patch: impl Into<String>,
    ) -> Self {
        Self {
            major: major.into(),
            minor: minor.into(),
            patch: patch.into(),
        }
    }

    pub fn label_for(&self, increment: Increment) -> &str {
        match increment {
            Increment::Major => &self.major,
            Increment::Minor => &self.minor,
            Increment::Patch => &self.patch,
        }
    }
}

impl PackageManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn version(&self) -> Result<Option<SemVer>> {
        self.version.as_deref().map(str::parse).transpose()
    }
}
