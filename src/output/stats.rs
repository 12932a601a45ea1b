//! Statistics over crawl results
//!
//! This module flattens result trees and aggregates them into a
//! [`CrawlSummary`] for the writers and the CLI.

use crate::model::PageResult;
use crate::output::traits::CrawlSummary;
use crate::url::extract_domain;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Every page of `roots` and their attached descendants, each URL once
///
/// Order is breadth first per root, roots in the given order.
pub fn unique_pages(roots: &[Arc<PageResult>]) -> Vec<&PageResult> {
    let mut seen = HashSet::new();
    roots
        .iter()
        .flat_map(|root| root.walk())
        .filter(|page| seen.insert(page.url.as_str()))
        .collect()
}

/// Aggregates statistics over `roots` and their attached descendants
pub fn summarize(roots: &[Arc<PageResult>]) -> CrawlSummary {
    let mut summary = CrawlSummary::new();
    summary.roots = roots.iter().map(|r| r.url.to_string()).collect();

    let mut domains = BTreeSet::new();
    for page in unique_pages(roots) {
        summary.total_pages += 1;
        summary.total_words += page.content.word_count as u64;
        summary.total_load_ms += page.load_time_ms;
        summary.total_links += page.links.len() as u64;

        for link in &page.links {
            *summary
                .links_by_classification
                .entry(link.classification.as_str().to_string())
                .or_default() += 1;
        }

        summary.total_images += page.media.images.len() as u64;
        summary.total_videos += page.media.videos.len() as u64;
        summary.total_audio += page.media.audio.len() as u64;
        summary.total_documents += page.media.documents.len() as u64;

        *summary.status_breakdown.entry(page.status).or_default() += 1;

        if let Some(domain) = extract_domain(&page.url) {
            domains.insert(domain);
        }
    }

    summary.unique_domains = domains.len() as u64;
    summary.domains = domains.into_iter().collect();
    summary
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(summary: &CrawlSummary) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Pages crawled: {}", summary.total_pages);
    println!("  Unique domains: {}", summary.unique_domains);
    println!("  Links found: {}", summary.total_links);
    println!("  Media items: {}", summary.total_media());
    println!("  Average load time: {:.0} ms", summary.average_load_ms());
    println!("  Average words per page: {:.0}", summary.average_words());
    println!();

    if !summary.links_by_classification.is_empty() {
        println!("Links by Classification:");
        for (classification, count) in &summary.links_by_classification {
            println!("  {}: {}", classification, count);
        }
        println!();
    }

    if !summary.status_breakdown.is_empty() {
        println!("Pages by Status:");
        for (status, count) in &summary.status_breakdown {
            println!("  {}: {}", status, count);
        }
    }
}
