pub mod format;
pub mod renderer;
pub mod writer;

pub use format::{format_preview, OutputFormat};
pub use renderer::{ChangelogDocument, ChangelogRenderer, DaySection};
pub use writer::{AppendOutcome, ChangelogWriter};
