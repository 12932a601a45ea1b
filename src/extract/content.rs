use crate::extract::collapse_whitespace;
use crate::model::{Heading, PageContent};
use scraper::{ElementRef, Html, Node, Selector};

/// Elements whose text is never page content
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

pub fn extract_content(document: &Html) -> PageContent {
    let text = main_element(document)
        .map(|element| visible_text(&element))
        .unwrap_or_default();
    let word_count = text.split_whitespace().count();

    PageContent {
        title: extract_title(document),
        description: extract_description(document),
        headings: extract_headings(document),
        text,
        word_count,
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn extract_description(document: &Html) -> Option<String> {
    let selector = Selector::parse(r#"meta[name="description"][content]"#).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
}

fn extract_headings(document: &Html) -> Vec<Heading> {
    let Ok(selector) = Selector::parse("h1, h2, h3") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|h| {
            let level = h.value().name().strip_prefix('h')?.parse().ok()?;
            let text = collapse_whitespace(&h.text().collect::<String>());
            (!text.is_empty()).then_some(Heading { level, text })
        })
        .collect()
}

/// The first of `main`, `article` or `body` present in the document
fn main_element(document: &Html) -> Option<ElementRef<'_>> {
    ["main", "article", "body"].iter().find_map(|name| {
        let selector = Selector::parse(name).ok()?;
        document.select(&selector).next()
    })
}

fn visible_text(element: &ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in element.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()))
        });
        if !hidden {
            parts.push(&**text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}
