//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

mod common;

use async_trait::async_trait;
use common::{html_page, html_response, mount_page, test_config};
use lantern_crawl::render::{RenderError, RenderingBackend};
use lantern_crawl::{Crawler, LanternError, LinkClassification};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{any, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn child_titles(page: &lantern_crawl::PageResult) -> BTreeSet<String> {
    page.links
        .iter()
        .filter_map(|l| l.child())
        .filter_map(|c| c.content.title.clone())
        .collect()
}

#[tokio::test]
async fn test_seed_with_two_children() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html_page("Home", &[("/a", "A"), ("/b", "B")]), 1).await;
    mount_page(&server, "/a", html_page("Page A", &[]), 1).await;
    mount_page(&server, "/b", html_page("Page B", &[]), 1).await;

    let crawler = Crawler::setup(test_config()).unwrap();
    let page = crawler
        .crawl(&server.uri(), 2)
        .await
        .unwrap()
        .expect("seed page should be crawled");

    assert_eq!(page.content.title.as_deref(), Some("Home"));
    assert_eq!(page.links.len(), 2);
    assert_eq!(page.attached_children(), 2);
    assert_eq!(
        child_titles(&page),
        BTreeSet::from(["Page A".to_string(), "Page B".to_string()])
    );
    assert_eq!(page.walk().len(), 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_repeated_crawl_returns_cached_page() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html_page("Home", &[]), 1).await;

    let crawler = Crawler::setup(test_config()).unwrap();
    let first = crawler.crawl(&server.uri(), 1).await.unwrap().unwrap();
    let second = crawler.crawl(&server.uri(), 1).await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(crawler.page_cache().len(), 1);
}

#[tokio::test]
async fn test_depth_zero_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(html_response(html_page("Home", &[])))
        .expect(0)
        .mount(&server)
        .await;

    let crawler = Crawler::setup(test_config()).unwrap();
    let result = crawler.crawl(&server.uri(), 0).await.unwrap();

    assert!(result.is_none());
    assert!(crawler.visited().is_empty());
}

#[tokio::test]
async fn test_depth_one_fetches_only_the_seed() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html_page("Home", &[("/a", "A")]), 1).await;
    mount_page(&server, "/a", html_page("Page A", &[]), 0).await;

    let crawler = Crawler::setup(test_config()).unwrap();
    let page = crawler.crawl(&server.uri(), 1).await.unwrap().unwrap();

    assert_eq!(page.links.len(), 1);
    assert_eq!(page.attached_children(), 0);
}

#[tokio::test]
async fn test_depth_is_capped_by_max_depth() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html_page("Home", &[("/a", "A")]), 1).await;
    mount_page(&server, "/a", html_page("Page A", &[]), 0).await;

    let mut config = test_config();
    config.crawler.max_depth = 1;
    let crawler = Crawler::setup(config).unwrap();
    let page = crawler.crawl(&server.uri(), 50).await.unwrap().unwrap();

    assert_eq!(page.attached_children(), 0);
    assert_eq!(crawler.pages_fetched(), 1);
}

#[tokio::test]
async fn test_diamond_fetches_shared_page_once() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html_page("Home", &[("/a", "A"), ("/b", "B")]), 1).await;
    mount_page(&server, "/a", html_page("Page A", &[("/c", "C")]), 1).await;
    mount_page(&server, "/b", html_page("Page B", &[("/c", "C")]), 1).await;
    mount_page(&server, "/c", html_page("Page C", &[("/", "Home")]), 1).await;

    let crawler = Crawler::setup(test_config()).unwrap();
    let page = crawler.crawl(&server.uri(), 3).await.unwrap().unwrap();

    let c_attachments: usize = page
        .links
        .iter()
        .filter_map(|l| l.child())
        .map(|child| child.attached_children())
        .sum();
    assert_eq!(c_attachments, 1);
    assert_eq!(page.walk().len(), 4);
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_duplicate_links_on_one_page_crawled_once() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        html_page("Home", &[("/a", "A"), ("/a#top", "A again"), ("/a/", "A slash")]),
        1,
    )
    .await;
    mount_page(&server, "/a", html_page("Page A", &[]), 1).await;

    let crawler = Crawler::setup(test_config()).unwrap();
    let page = crawler.crawl(&server.uri(), 2).await.unwrap().unwrap();

    assert_eq!(page.attached_children(), 1);
    assert!(page.links[0].child().is_some());
}

#[tokio::test]
async fn test_failed_child_does_not_abort_siblings() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html_page("Home", &[("/ok", "OK"), ("/broken", "Broken")]), 1).await;
    mount_page(&server, "/ok", html_page("Fine", &[]), 1).await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let crawler = Crawler::setup(test_config()).unwrap();
    let page = crawler.crawl(&server.uri(), 2).await.unwrap().unwrap();

    assert_eq!(page.attached_children(), 1);
    assert_eq!(child_titles(&page), BTreeSet::from(["Fine".to_string()]));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let crawler = Crawler::setup(test_config()).unwrap();
    let result = crawler
        .crawl(&format!("{}/missing", server.uri()), 1)
        .await
        .unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn test_external_links_are_not_followed() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        html_page("Home", &[("https://elsewhere.invalid/page", "Elsewhere")]),
        1,
    )
    .await;

    let crawler = Crawler::setup(test_config()).unwrap();
    let page = crawler.crawl(&server.uri(), 2).await.unwrap().unwrap();

    assert_eq!(page.links.len(), 1);
    assert_eq!(page.links[0].classification, LinkClassification::External);
    assert!(page.links[0].child().is_none());
}

#[tokio::test]
async fn test_exclude_pattern_skips_links() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html_page("Home", &[("/a", "A"), ("/admin", "Admin")]), 1).await;
    mount_page(&server, "/a", html_page("Page A", &[]), 1).await;
    mount_page(&server, "/admin", html_page("Admin", &[]), 0).await;

    let mut config = test_config();
    config.crawler.exclude_pattern = Some("/admin".to_string());
    let crawler = Crawler::setup(config).unwrap();
    let page = crawler.crawl(&server.uri(), 2).await.unwrap().unwrap();

    assert_eq!(page.attached_children(), 1);
}

#[tokio::test]
async fn test_page_budget_limits_fetches() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        html_page("Home", &[("/a", "A"), ("/b", "B"), ("/c", "C")]),
        1,
    )
    .await;
    for route in ["/a", "/b", "/c"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(html_response(html_page(route, &[])))
            .mount(&server)
            .await;
    }

    let mut config = test_config();
    config.crawler.max_pages = Some(2);
    let crawler = Crawler::setup(config).unwrap();
    let page = crawler.crawl(&server.uri(), 2).await.unwrap().unwrap();

    assert_eq!(page.attached_children(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_cancel_stops_in_flight_crawl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html_response(html_page("Slow", &[])).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let crawler = Crawler::setup(test_config()).unwrap();
    let task = {
        let crawler = crawler.clone();
        let url = server.uri();
        tokio::spawn(async move { crawler.crawl(&url, 1).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    crawler.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("crawl should stop promptly")
        .unwrap();
    assert!(matches!(result, Err(LanternError::Cancelled)));
    assert!(!crawler.is_closed());
}

#[tokio::test]
async fn test_crawl_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html_response(html_page("Slow", &[])).set_delay(Duration::from_secs(4)))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.crawler.crawl_timeout_secs = Some(1);
    let crawler = Crawler::setup(config).unwrap();

    let result = crawler.crawl(&server.uri(), 1).await;
    assert!(matches!(result, Err(LanternError::CrawlTimeout(_))));
}

fn listing_page(next: bool) -> String {
    let mut links: Vec<(&str, &str)> = vec![
        ("/item/1", "Item 1"),
        ("/item/2", "Item 2"),
        ("/item/3", "Item 3"),
        ("/item/4", "Item 4"),
        ("/item/5", "Item 5"),
    ];
    if next {
        links.push(("/list?page=2", "Next page"));
    }
    let anchors: String = links
        .iter()
        .map(|(href, text)| format!("<a href=\"{}\">{}</a>", href, text))
        .collect();
    format!(
        "<html><head><title>Listing</title></head><body><main><p>{}</p>{}</main></body></html>",
        "listing entry ".repeat(100),
        anchors
    )
}

#[tokio::test]
async fn test_pagination_stops_at_last_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "1"))
        .respond_with(html_response(listing_page(true)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "2"))
        .respond_with(html_response(listing_page(false)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "3"))
        .respond_with(html_response(listing_page(true)))
        .expect(0)
        .mount(&server)
        .await;

    let crawler = Crawler::setup(test_config()).unwrap();
    let pages = crawler
        .crawl_paginated(&format!("{}/list", server.uri()), 1, "page", 5)
        .await
        .unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].url.query(), Some("page=1"));
    assert_eq!(pages[1].url.query(), Some("page=2"));
}

#[tokio::test]
async fn test_pagination_stops_on_missing_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "1"))
        .respond_with(html_response(listing_page(true)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let crawler = Crawler::setup(test_config()).unwrap();
    let pages = crawler
        .crawl_paginated(&format!("{}/list?page=7", server.uri()), 1, "page", 5)
        .await
        .unwrap();

    assert_eq!(pages.len(), 1);
}

struct FakeBrowser {
    navigations: Arc<AtomicUsize>,
    current: String,
}

#[async_trait]
impl RenderingBackend for FakeBrowser {
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        self.current = url.to_string();
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, RenderError> {
        Ok(html_page(&format!("Rendered {}", self.current), &[]))
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_rendering_backend_fetches_pages() {
    let navigations = Arc::new(AtomicUsize::new(0));
    let mut config = test_config();
    config.crawler.use_rendering_backend = true;

    let crawler = Crawler::builder(config)
        .with_rendering_backend(FakeBrowser {
            navigations: navigations.clone(),
            current: String::new(),
        })
        .build()
        .unwrap();

    let page = crawler
        .crawl("https://rendered.example/", 1)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        page.content.title.as_deref(),
        Some("Rendered https://rendered.example/")
    );
    assert_eq!(navigations.load(Ordering::SeqCst), 1);
    crawler.close().await.unwrap();
}

#[tokio::test]
async fn test_close_rejects_new_crawls() {
    let server = MockServer::start().await;
    mount_page(&server, "/", html_page("Home", &[]), 0).await;

    let crawler = Crawler::setup(test_config()).unwrap();
    crawler.close().await.unwrap();

    assert!(matches!(
        crawler.crawl(&server.uri(), 1).await,
        Err(LanternError::Closed)
    ));
}

#[tokio::test]
async fn test_sensitive_data_is_redacted() {
    let server = MockServer::start().await;
    let body = "<html><head><title>Contact</title></head><body><main>\
                <p>Mail office@example.com or call 555-123-4567.</p></main></body></html>";
    mount_page(&server, "/", body.to_string(), 1).await;

    let mut config = test_config();
    config.output.redact_sensitive = true;
    let crawler = Crawler::setup(config).unwrap();
    let page = crawler.crawl(&server.uri(), 1).await.unwrap().unwrap();

    assert!(page.content.text.contains("[REDACTED_EMAIL]"));
    assert!(page.content.text.contains("[REDACTED_PHONE]"));
    assert!(!page.content.text.contains("office@example.com"));
}

#[tokio::test]
async fn test_user_agent_pool_is_rotated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header_regex("user-agent", "^Rotated/"))
        .respond_with(html_response(html_page("Home", &[])))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.user_agent.agents = vec!["Rotated/1.0".to_string()];
    let crawler = Crawler::setup(config).unwrap();

    assert!(crawler.crawl(&server.uri(), 1).await.unwrap().is_some());
}
