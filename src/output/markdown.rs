//! Markdown report generation
//!
//! This module generates a human-readable report of crawl results: overall
//! statistics followed by one section per crawled page.

use crate::model::PageResult;
use crate::output::stats::{summarize, unique_pages};
use crate::output::traits::{CrawlSummary, OutputWriter};
use crate::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Links listed per page before the list is truncated
const MAX_LISTED_LINKS: usize = 25;

pub struct MarkdownWriter;

impl OutputWriter for MarkdownWriter {
    fn extension(&self) -> &'static str {
        "md"
    }

    fn write(&self, pages: &[Arc<PageResult>], path: &Path) -> Result<()> {
        let markdown = format_markdown_report(pages);

        let mut file = File::create(path)?;
        file.write_all(markdown.as_bytes())?;

        Ok(())
    }
}

/// Formats crawl results as markdown
pub fn format_markdown_report(pages: &[Arc<PageResult>]) -> String {
    let summary = summarize(pages);
    let mut md = format_markdown_summary(&summary);

    md.push_str("## Pages\n\n");
    for page in unique_pages(pages) {
        format_page(&mut md, page);
    }

    md
}

/// Formats the summary statistics as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Lantern Crawl Report\n\n");
    md.push_str(&format!(
        "- **Generated**: {}\n",
        summary.generated_at.to_rfc3339()
    ));
    for root in &summary.roots {
        md.push_str(&format!("- **Root**: <{}>\n", root));
    }
    md.push('\n');

    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Pages Crawled**: {}\n", summary.total_pages));
    md.push_str(&format!("- **Unique Domains**: {}\n", summary.unique_domains));
    md.push_str(&format!("- **Total Links**: {}\n", summary.total_links));
    md.push_str(&format!("- **Media Items**: {}\n", summary.total_media()));
    md.push_str(&format!(
        "- **Average Load Time**: {:.0} ms\n",
        summary.average_load_ms()
    ));
    md.push_str(&format!(
        "- **Average Words per Page**: {:.0}\n\n",
        summary.average_words()
    ));

    if !summary.links_by_classification.is_empty() {
        md.push_str("## Links by Classification\n\n");
        md.push_str("| Classification | Count |\n");
        md.push_str("|----------------|-------|\n");
        for (classification, count) in &summary.links_by_classification {
            md.push_str(&format!("| {} | {} |\n", classification, count));
        }
        md.push('\n');
    }

    if !summary.domains.is_empty() {
        md.push_str("## Domains\n\n");
        for domain in &summary.domains {
            md.push_str(&format!("- {}\n", domain));
        }
        md.push('\n');
    }

    md
}

fn format_page(md: &mut String, page: &PageResult) {
    let title = page
        .content
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(page.url.as_str());
    md.push_str(&format!("### {}\n\n", escape(title)));
    md.push_str(&format!("- **URL**: <{}>\n", page.url));
    if page.final_url != page.url {
        md.push_str(&format!("- **Final URL**: <{}>\n", page.final_url));
    }
    md.push_str(&format!("- **Status**: {}\n", page.status));
    md.push_str(&format!("- **Words**: {}\n", page.content.word_count));
    md.push_str(&format!("- **Load Time**: {} ms\n", page.load_time_ms));
    if let Some(description) = &page.content.description {
        md.push_str(&format!("- **Description**: {}\n", escape(description)));
    }
    md.push('\n');

    if !page.content.headings.is_empty() {
        md.push_str("**Headings**\n\n");
        for heading in &page.content.headings {
            let indent = "  ".repeat(heading.level.saturating_sub(1) as usize);
            md.push_str(&format!("{}- {}\n", indent, escape(&heading.text)));
        }
        md.push('\n');
    }

    if !page.links.is_empty() {
        md.push_str(&format!("**Links** ({})\n\n", page.links.len()));
        for link in page.links.iter().take(MAX_LISTED_LINKS) {
            let text = if link.text.is_empty() {
                link.url.as_str()
            } else {
                link.text.as_str()
            };
            let crawled = if link.child().is_some() { " ✓" } else { "" };
            md.push_str(&format!(
                "- [{}]({}) _{}_{}\n",
                escape(text),
                link.url,
                link.classification.as_str(),
                crawled
            ));
        }
        if page.links.len() > MAX_LISTED_LINKS {
            md.push_str(&format!(
                "- … and {} more\n",
                page.links.len() - MAX_LISTED_LINKS
            ));
        }
        md.push('\n');
    }

    if !page.media.documents.is_empty() {
        md.push_str("**Documents**\n\n");
        for document in &page.media.documents {
            md.push_str(&format!(
                "- [{}]({}) ({})\n",
                escape(&document.text),
                document.url,
                document.extension
            ));
        }
        md.push('\n');
    }
}

fn escape(text: &str) -> String {
    text.replace('[', "\\[").replace(']', "\\]").replace('\n', " ")
}
