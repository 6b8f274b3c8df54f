pub mod tasks;
pub mod workflow;

pub use tasks::{Step, StepOutcome, TaskList};
pub use workflow::{
    effective_dry_run, release_commit_message, RefreshReport, ReleaseOptions, ReleaseReport,
    Workflow,
};
