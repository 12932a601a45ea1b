//! Helpers shared by the integration tests

#![allow(dead_code)]

use lantern_crawl::config::Config;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration tuned for fast tests against a local mock server
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.crawler.respect_robots = false;
    config.crawler.max_depth = 5;
    config.rate_limit.requests_per_second = 100.0;
    config.rate_limit.burst_allowance = 100;
    config.retry.retry_count = 2;
    config.retry.retry_delay_ms = 10;
    config.retry.request_timeout_secs = 5;
    config.user_agent.crawler_name = "TestBot".to_string();
    config
}

/// An HTML page with the given title and `(href, text)` links
pub fn html_page(title: &str, links: &[(&str, &str)]) -> String {
    let anchors: String = links
        .iter()
        .map(|(href, text)| format!("<a href=\"{}\">{}</a>\n", href, text))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body><main><h1>{}</h1><p>Some text about {}.</p>{}</main></body></html>",
        title, title, title, anchors
    )
}

pub fn html_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

/// Serves `body` at `route`, expecting exactly `times` requests
pub async fn mount_page(server: &MockServer, route: &str, body: String, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html_response(body))
        .expect(times)
        .mount(server)
        .await;
}
