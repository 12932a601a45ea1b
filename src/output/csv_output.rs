//! CSV export: one row per crawled page

use crate::model::PageResult;
use crate::output::stats::unique_pages;
use crate::output::traits::OutputWriter;
use crate::Result;
use std::path::Path;
use std::sync::Arc;

pub const CSV_HEADER: [&str; 10] = [
    "url",
    "final_url",
    "status",
    "title",
    "word_count",
    "links",
    "images",
    "documents",
    "load_time_ms",
    "fetched_at",
];

pub struct CsvWriter;

impl OutputWriter for CsvWriter {
    fn extension(&self) -> &'static str {
        "csv"
    }

    fn write(&self, pages: &[Arc<PageResult>], path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(CSV_HEADER)?;

        for page in unique_pages(pages) {
            writer.write_record([
                page.url.as_str(),
                page.final_url.as_str(),
                &page.status.to_string(),
                page.content.title.as_deref().unwrap_or(""),
                &page.content.word_count.to_string(),
                &page.links.len().to_string(),
                &page.media.images.len().to_string(),
                &page.media.documents.len().to_string(),
                &page.load_time_ms.to_string(),
                &page.fetched_at.to_rfc3339(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }
}
