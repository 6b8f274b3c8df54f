use std::path::Path;
use tracing::{info, warn};

use crate::error::Result;
use crate::git::run_command;

pub const DRY_RUN_MSG: &str = "The --dry-run option was passed";
pub const NO_PUSH_MSG: &str = "Neither --push or --publish options were passed";

/// One external command the workflow may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub title: String,
    pub program: String,
    pub args: Vec<String>,
    /// Why the step will not run, if it won't.
    pub skip: Option<String>,
}

impl Step {
    pub fn new(title: impl Into<String>, program: &str, args: &[&str]) -> Self {
        Self {
            title: title.into(),
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            skip: None,
        }
    }

    pub fn git(title: impl Into<String>, args: &[&str]) -> Self {
        Self::new(title, "git", args)
    }

    pub fn npm(title: impl Into<String>, args: &[&str]) -> Self {
        Self::new(title, "npm", args)
    }

    /// Keeps the first reason that applies.
    pub fn skip_if(mut self, condition: bool, reason: &str) -> Self {
        if condition && self.skip.is_none() {
            self.skip = Some(reason.to_string());
        }
        self
    }

    pub fn command_line(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Ran(String),
    Skipped { title: String, reason: String },
}

/// Ordered list of steps, run one after another, stopping at the first failure.
#[derive(Debug, Default)]
pub struct TaskList {
    steps: Vec<Step>,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn run(self, dir: &Path) -> Result<Vec<StepOutcome>> {
        let mut outcomes = Vec::with_capacity(self.steps.len());

        for mut step in self.steps {
            if let Some(reason) = step.skip.take() {
                warn!("{} [skipped: {}] ({})", step.title, reason, step.command_line());
                outcomes.push(StepOutcome::Skipped {
                    title: step.title,
                    reason,
                });
                continue;
            }

            info!("{}", step.title);
            let args: Vec<&str> = step.args.iter().map(String::as_str).collect();
            run_command(dir, &step.program, &args)?;
            outcomes.push(StepOutcome::Ran(step.title));
        }

        Ok(outcomes)
    }
}
