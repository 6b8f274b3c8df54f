use chrono::NaiveDate;
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;

use crate::error::Result;
use crate::version::{SemVer, VersionedEvent};

pub const TITLE: &str = "# Change Log";
pub const DESCRIPTION: &str = "All notable changes to this project will be documented in this file.";
pub const SEMVER_NOTICE: &str = "This project adheres to [Semantic Versioning](http://semver.org/).";

/// One changelog line per event.
pub const DEFAULT_LINE_TEMPLATE: &str =
    "- {{version}} - ([{{id}}]({{url}})) - {{summary}} ({{author}})";

const LINE_TEMPLATE: &str = "line";

/// Header block every changelog starts with, trailing blank line included.
pub fn header() -> String {
    format!("{}\n{}\n\n{}\n\n", TITLE, DESCRIPTION, SEMVER_NOTICE)
}

pub fn current_version_heading(date: NaiveDate, version: &SemVer) -> String {
    format!("## {} - [{} - current version]", date.format("%Y-%m-%d"), version)
}

pub fn day_heading(date: NaiveDate) -> String {
    format!("## {}", date.format("%Y-%m-%d"))
}

/// Events that closed on the same calendar day, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySection {
    pub date: NaiveDate,
    pub lines: Vec<String>,
}

/// Rendered changelog, newest day first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangelogDocument {
    pub current_version: Option<SemVer>,
    pub sections: Vec<DaySection>,
}

impl ChangelogDocument {
    pub fn to_markdown(&self) -> String {
        let mut output = header();

        for (idx, section) in self.sections.iter().enumerate() {
            match (idx, self.current_version.as_ref()) {
                (0, Some(version)) => {
                    output.push_str(&current_version_heading(section.date, version));
                    output.push_str("\n\n");
                }
                _ => {
                    output.push('\n');
                    output.push_str(&day_heading(section.date));
                    output.push_str("\n\n");
                }
            }

            for line in &section.lines {
                output.push_str(line);
                output.push('\n');
            }
        }

        output
    }
}

pub struct ChangelogRenderer {
    template_engine: Handlebars<'static>,
}

impl ChangelogRenderer {
    pub fn new(line_template: Option<&str>) -> Result<Self> {
        let mut template_engine = Handlebars::new();
        template_engine.register_escape_fn(handlebars::no_escape);
        template_engine.set_strict_mode(true);
        template_engine
            .register_template_string(LINE_TEMPLATE, line_template.unwrap_or(DEFAULT_LINE_TEMPLATE))?;

        Ok(Self { template_engine })
    }

    pub fn render_line(&self, entry: &VersionedEvent) -> Result<String> {
        let event = &entry.event;
        let data = json!({
            "version": entry.version.to_string(),
            "increment": entry.increment.as_str(),
            "id": event.identifier().to_string(),
            "url": event.url(),
            "summary": event.summary(),
            "author": event.author(),
            "date": event.date().format("%Y-%m-%d").to_string(),
        });

        Ok(self.template_engine.render(LINE_TEMPLATE, &data)?)
    }

    /// Groups the ascending per-event trace by day and reverses it, so the
    /// newest day and the newest line come first.
    pub fn render(&self, entries: &[VersionedEvent]) -> Result<ChangelogDocument> {
        let mut sections: Vec<DaySection> = Vec::new();

        for entry in entries {
            let date = entry.event.date().date_naive();
            let line = self.render_line(entry)?;

            match sections.last_mut() {
                Some(section) if section.date == date => section.lines.push(line),
                _ => sections.push(DaySection {
                    date,
                    lines: vec![line],
                }),
            }
        }

        sections.reverse();
        for section in &mut sections {
            section.lines.reverse();
        }

        Ok(ChangelogDocument {
            current_version: entries.last().map(|entry| entry.version),
            sections,
        })
    }
}
