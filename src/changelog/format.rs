use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::renderer::ChangelogDocument;
use crate::error::Result;
use crate::version::Accumulation;

/// What `changelog` prints instead of writing `CHANGELOG.md`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The changelog text exactly as it would be written
    #[default]
    #[value(alias = "md")]
    Markdown,
    /// Version trace and day sections as structured data
    Json,
    /// A standalone page for a quick look in the browser
    Html,
}

/// Renders a changelog preview without touching the changelog file.
pub fn format_preview(
    format: OutputFormat,
    document: &ChangelogDocument,
    accumulation: &Accumulation,
) -> Result<String> {
    match format {
        OutputFormat::Markdown => Ok(document.to_markdown()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
            "start_version": accumulation.start_version,
            "current_version": accumulation.final_version,
            "entries": accumulation.entries,
            "sections": document.sections,
        }))?),
        OutputFormat::Html => Ok(to_html(&document.to_markdown(), accumulation)),
    }
}

fn to_html(markdown: &str, accumulation: &Accumulation) -> String {
    let mut body = String::new();
    pulldown_cmark::html::push_html(&mut body, pulldown_cmark::Parser::new(markdown));

    let mut page = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    page.push_str(&format!(
        "<title>{} preview</title>\n</head>\n<body>\n",
        accumulation.final_version
    ));
    page.push_str(&format!(
        "<p><code>{}</code> to <code>{}</code> over {} changes</p>\n",
        accumulation.start_version,
        accumulation.final_version,
        accumulation.entries.len()
    ));
    page.push_str(&body);
    page.push_str("</body>\n</html>\n");
    page
}
