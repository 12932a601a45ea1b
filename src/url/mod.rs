//! URL handling module for Lantern
//!
//! This module provides URL normalization, domain extraction, and the
//! crawl-scope filter applied before every fetch.

mod domain;
mod filter;
mod normalize;

pub use domain::{extract_domain, is_private_host, is_same_or_subdomain};
pub use filter::{Rejection, UrlFilter};
pub use normalize::{normalize_parsed, normalize_url};

use url::Url;

/// Returns `url` with the query parameter `name` set to `value`
///
/// An existing value for `name` is replaced; other parameters keep their order.
pub fn with_query_param(url: &Url, name: &str, value: &str) -> Url {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut updated = url.clone();
    updated
        .query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(name, value);
    updated
}
