//! Output module for exporting crawl results
//!
//! This module handles:
//! - Writing results as JSON, CSV or a markdown report
//! - Aggregating crawl statistics for reports and the CLI

mod csv_output;
mod json_output;
mod markdown;
pub mod stats;
mod traits;

pub use csv_output::{CsvWriter, CSV_HEADER};
pub use json_output::JsonWriter;
pub use markdown::{format_markdown_report, format_markdown_summary, MarkdownWriter};
pub use stats::{print_statistics, summarize, unique_pages};
pub use traits::{CrawlSummary, OutputWriter};

use crate::config::OutputFormat;
use crate::model::PageResult;
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writers producing `format`
pub fn writers_for(format: OutputFormat) -> Vec<Box<dyn OutputWriter>> {
    match format {
        OutputFormat::Json => vec![Box::new(JsonWriter)],
        OutputFormat::Csv => vec![Box::new(CsvWriter)],
        OutputFormat::Markdown => vec![Box::new(MarkdownWriter)],
        OutputFormat::All => vec![
            Box::new(JsonWriter),
            Box::new(CsvWriter),
            Box::new(MarkdownWriter),
        ],
    }
}

/// Writes `pages` in `format` next to `path_stem`
///
/// Each writer appends its own extension to the stem, so
/// `crawl-output` becomes `crawl-output.json`, `crawl-output.csv` and so on.
/// Missing parent directories are created.
///
/// # Returns
///
/// The paths of the files written
pub fn write_results(
    pages: &[Arc<PageResult>],
    format: OutputFormat,
    path_stem: &Path,
) -> Result<Vec<PathBuf>> {
    if let Some(parent) = path_stem.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut written = Vec::new();
    for writer in writers_for(format) {
        let path = path_with_extension(path_stem, writer.extension());
        writer.write(pages, &path)?;
        tracing::info!("Wrote {} results to {}", writer.extension(), path.display());
        written.push(path);
    }

    Ok(written)
}

fn path_with_extension(stem: &Path, extension: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}
