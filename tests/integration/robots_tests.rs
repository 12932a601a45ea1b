//! Integration tests for robots.txt compliance

mod common;

use common::{html_page, mount_page, test_config};
use lantern_crawl::config::Config;
use lantern_crawl::robots::RobotsCache;
use lantern_crawl::Crawler;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn robots_config() -> Config {
    let mut config = test_config();
    config.crawler.respect_robots = true;
    config
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_allow_overrides_disallow() {
    let server = MockServer::start().await;
    mount_robots(
        &server,
        "User-agent: *\nDisallow: /private\nAllow: /private/public\n",
    )
    .await;
    mount_page(
        &server,
        "/",
        html_page(
            "Home",
            &[("/private/secret", "Secret"), ("/private/public/page", "Public")],
        ),
        1,
    )
    .await;
    mount_page(&server, "/private/secret", html_page("Secret", &[]), 0).await;
    mount_page(&server, "/private/public/page", html_page("Public", &[]), 1).await;

    let crawler = Crawler::setup(robots_config()).unwrap();
    let page = crawler.crawl(&server.uri(), 2).await.unwrap().unwrap();

    assert_eq!(page.attached_children(), 1);
    assert!(page.links[0].child().is_none());
    assert!(page.links[1].child().is_some());
}

#[tokio::test]
async fn test_missing_robots_allows_everything() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/", html_page("Home", &[("/a", "A")]), 1).await;
    mount_page(&server, "/a", html_page("Page A", &[]), 1).await;

    let crawler = Crawler::setup(robots_config()).unwrap();
    let page = crawler.crawl(&server.uri(), 2).await.unwrap().unwrap();

    assert_eq!(page.attached_children(), 1);
}

#[tokio::test]
async fn test_agent_specific_group_wins() {
    let server = MockServer::start().await;
    mount_robots(
        &server,
        "User-agent: TestBot\nDisallow: /\n\nUser-agent: *\nAllow: /\n",
    )
    .await;
    mount_page(&server, "/", html_page("Home", &[]), 0).await;

    let crawler = Crawler::setup(robots_config()).unwrap();
    let result = crawler.crawl(&server.uri(), 1).await.unwrap();

    assert!(result.is_none());
    assert!(crawler.visited().is_empty());
}

#[tokio::test]
async fn test_robots_ignored_when_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .expect(0)
        .mount(&server)
        .await;
    mount_page(&server, "/", html_page("Home", &[]), 1).await;

    let crawler = Crawler::setup(test_config()).unwrap();
    assert!(crawler.crawl(&server.uri(), 1).await.unwrap().is_some());
}

#[tokio::test]
async fn test_crawl_delay_reaches_rate_limiter() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nCrawl-delay: 2\n").await;
    mount_page(&server, "/", html_page("Home", &[]), 1).await;

    let crawler = Crawler::setup(robots_config()).unwrap();
    crawler.crawl(&server.uri(), 1).await.unwrap().unwrap();

    let stats = crawler.rate_limiter().stats("127.0.0.1").unwrap();
    assert_eq!(stats.crawl_delay, Some(Duration::from_secs(2)));
}

#[tokio::test]
async fn test_rules_are_cached_per_domain() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /admin\n").await;

    let cache = RobotsCache::new(
        reqwest::Client::new(),
        Duration::from_secs(3600),
        Duration::from_secs(300),
    );
    let cancel = CancellationToken::new();
    let base = Url::parse(&server.uri()).unwrap();

    assert!(cache.is_allowed(&base.join("/docs").unwrap(), "TestBot/1.0", &cancel).await);
    assert!(!cache.is_allowed(&base.join("/admin/users").unwrap(), "TestBot/1.0", &cancel).await);
    assert!(!cache.is_allowed(&base.join("/admin").unwrap(), "TestBot/1.0", &cancel).await);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_cancelled_fetch_is_allowed_and_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nDisallow: /\n")
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let cache = RobotsCache::new(
        reqwest::Client::new(),
        Duration::from_secs(3600),
        Duration::from_secs(300),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let url = Url::parse(&server.uri()).unwrap();
    assert!(cache.is_allowed(&url, "TestBot/1.0", &cancel).await);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_concurrent_crawls_share_one_robots_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nDisallow: /admin\n")
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;
    for route in ["/a", "/b", "/c", "/d"] {
        mount_page(&server, route, html_page(route, &[]), 1).await;
    }

    let crawler = Crawler::setup(robots_config()).unwrap();
    let base = server.uri();
    let crawl = |route: &'static str| {
        let crawler = crawler.clone();
        let url = format!("{}{}", base, route);
        async move { crawler.crawl(&url, 1).await }
    };

    let (a, b, c, d) = tokio::join!(crawl("/a"), crawl("/b"), crawl("/c"), crawl("/d"));
    for result in [a, b, c, d] {
        assert!(result.unwrap().is_some());
    }
    assert_eq!(crawler.robots().map(|r| r.len()), Some(1));
}
