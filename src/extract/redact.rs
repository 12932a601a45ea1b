//! Redaction of personal data in extracted page content

use crate::model::PageContent;
use crate::{ConfigError, ConfigResult};
use regex::{NoExpand, Regex};
use std::borrow::Cow;

const PATTERNS: &[(&str, &str)] = &[
    ("EMAIL", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
    ("PHONE", r"\b(\+\d{1,2}\s?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b"),
    ("SSN", r"\b\d{3}-\d{2}-\d{4}\b"),
    ("CREDIT_CARD", r"\b(?:\d{4}[ -]?){3}\d{4}\b"),
];

/// Replaces emails, phone numbers, SSNs and card numbers with
/// `[REDACTED_<KIND>]` markers
#[derive(Debug, Clone)]
pub struct Redactor {
    rules: Vec<(Regex, String)>,
}

impl Redactor {
    pub fn new() -> ConfigResult<Self> {
        let rules = PATTERNS
            .iter()
            .map(|(kind, pattern)| {
                Regex::new(pattern)
                    .map(|regex| (regex, format!("[REDACTED_{}]", kind)))
                    .map_err(|e| ConfigError::InvalidPattern(e.to_string()))
            })
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut text = Cow::Borrowed(text);
        for (regex, marker) in &self.rules {
            let replaced = match regex.replace_all(&text, NoExpand(marker)) {
                Cow::Owned(replaced) => Some(replaced),
                Cow::Borrowed(_) => None,
            };
            if let Some(replaced) = replaced {
                text = Cow::Owned(replaced);
            }
        }
        text
    }

    /// Redacts every text field of `content` in place
    pub fn redact_content(&self, content: &mut PageContent) {
        if let Some(title) = &mut content.title {
            *title = self.redact(title).into_owned();
        }
        if let Some(description) = &mut content.description {
            *description = self.redact(description).into_owned();
        }
        for heading in &mut content.headings {
            heading.text = self.redact(&heading.text).into_owned();
        }
        content.text = self.redact(&content.text).into_owned();
    }
}
