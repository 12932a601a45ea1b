//! Integration tests for the fetcher: retries, classification, proxies

mod common;

use common::{html_page, html_response, test_config};
use lantern_crawl::config::Config;
use lantern_crawl::crawler::{ClientSettings, FetchError, Fetcher, RateLimiter, RetryPolicy};
use lantern_crawl::proxy::ProxyManager;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{any, header_regex, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn fetcher(config: &Config) -> (Fetcher, Arc<RateLimiter>) {
    let settings = ClientSettings::from_config(config);
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    let fetcher = Fetcher::new(
        settings.build(None).unwrap(),
        limiter.clone(),
        RetryPolicy::from_config(config),
        4,
    );
    (fetcher, limiter)
}

fn url(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
}

#[tokio::test]
async fn test_fetch_html_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header_regex("user-agent", "^TestBot/"))
        .respond_with(html_response(html_page("Hello", &[])))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config();
    let (fetcher, limiter) = fetcher(&config);
    let page = fetcher
        .fetch(&url(&server, "/page"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.status, 200);
    assert_eq!(page.attempts, 1);
    assert!(page.body.contains("<title>Hello</title>"));

    let stats = limiter.stats("127.0.0.1").unwrap();
    assert_eq!(stats.success_count, 1);
    assert_eq!(stats.fail_count, 0);
}

#[tokio::test]
async fn test_transient_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html_response(html_page("Recovered", &[])))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.retry.retry_count = 3;
    let (fetcher, limiter) = fetcher(&config);
    let page = fetcher
        .fetch(&url(&server, "/flaky"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.attempts, 2);
    let stats = limiter.stats("127.0.0.1").unwrap();
    assert_eq!(stats.fail_count, 1);
    assert_eq!(stats.success_count, 1);
}

#[tokio::test]
async fn test_retries_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.retry.retry_count = 3;
    let (fetcher, limiter) = fetcher(&config);
    let err = fetcher
        .fetch(&url(&server, "/down"), &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        FetchError::Exhausted { attempts, last } => {
            assert_eq!(*attempts, 3);
            assert!(matches!(**last, FetchError::Status { code: 500, .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(err.attempts(), 3);
    assert_eq!(limiter.stats("127.0.0.1").unwrap().fail_count, 3);
}

#[tokio::test]
async fn test_permanent_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 16], "image/png"))
        .expect(1)
        .mount(&server)
        .await;

    let (fetcher, limiter) = fetcher(&test_config());
    let cancel = CancellationToken::new();

    let gone = fetcher.fetch(&url(&server, "/gone"), &cancel).await;
    assert!(matches!(gone, Err(FetchError::Status { code: 410, .. })));

    let image = fetcher.fetch(&url(&server, "/logo.png"), &cancel).await;
    assert!(matches!(image, Err(FetchError::NotHtml { .. })));

    // Permanent outcomes still count against the domain
    let stats = limiter.stats("127.0.0.1").unwrap();
    assert_eq!(stats.fail_count, 2);
    assert_eq!(stats.success_count, 0);
}

#[tokio::test]
async fn test_retry_after_is_honoured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(html_response(html_page("Ready", &[])))
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher(&test_config());
    let start = Instant::now();
    let page = fetcher
        .fetch(&url(&server, "/busy"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.attempts, 2);
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn test_redirects_are_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html_response(html_page("New", &[])))
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher(&test_config());
    let page = fetcher
        .fetch(&url(&server, "/old"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(page.final_url.path(), "/new");
}

#[tokio::test]
async fn test_cancelled_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html_response(html_page("Slow", &[])).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let (fetcher, _) = fetcher(&test_config());
    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        }
    };

    let target = url(&server, "/slow");
    let (result, _) = tokio::join!(fetcher.fetch(&target, &cancel), canceller);
    assert!(matches!(result, Err(FetchError::Cancelled)));
}

#[tokio::test]
async fn test_fetch_through_proxy() {
    let proxy = MockServer::start().await;
    Mock::given(any())
        .respond_with(html_response(html_page("Proxied", &[])))
        .expect(1)
        .mount(&proxy)
        .await;

    let mut config = test_config();
    config.proxy.proxies = vec![proxy.uri()];
    let manager = ProxyManager::new(
        &config.proxy,
        ClientSettings::from_config(&config),
        CancellationToken::new(),
    );
    let (fetcher, _) = fetcher(&config);
    let fetcher = fetcher.with_proxy_manager(manager.clone());

    let target = Url::parse("http://lantern.test/page").unwrap();
    let page = fetcher.fetch(&target, &CancellationToken::new()).await.unwrap();

    assert!(page.body.contains("Proxied"));
    let record = manager.record(&proxy.uri()).unwrap();
    assert_eq!(record.success_count, 1);
    assert!(record.last_used_at.is_some());
}

#[tokio::test]
async fn test_unreachable_proxy_is_reported() {
    let dead_proxy = "http://127.0.0.1:1".to_string();
    let mut config = test_config();
    config.proxy.proxies = vec![dead_proxy.clone()];
    let manager = ProxyManager::new(
        &config.proxy,
        ClientSettings::from_config(&config),
        CancellationToken::new(),
    );
    let (fetcher, _) = fetcher(&config);
    let fetcher = fetcher.with_proxy_manager(manager.clone());

    let target = Url::parse("http://lantern.test/page").unwrap();
    let err = fetcher
        .fetch(&target, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        FetchError::Exhausted { last, .. } => {
            assert!(matches!(*last, FetchError::Proxy { .. }))
        }
        other => panic!("unexpected error: {}", other),
    }
    let record = manager.record(&dead_proxy).unwrap();
    assert_eq!(record.failure_count, 2);
    assert_eq!(record.success_count, 0);
}

#[tokio::test]
async fn test_empty_proxy_pool_never_goes_direct() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(html_response(html_page("Direct", &[])))
        .expect(0)
        .mount(&server)
        .await;

    let config = test_config();
    let manager = ProxyManager::new(
        &config.proxy,
        ClientSettings::from_config(&config),
        CancellationToken::new(),
    );
    assert!(manager.is_empty());
    let (fetcher, _) = fetcher(&config);
    let fetcher = fetcher.with_proxy_manager(manager);

    let err = fetcher
        .fetch(&url(&server, "/page"), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        FetchError::Exhausted { last, .. } => {
            assert!(matches!(*last, FetchError::Proxy { .. }))
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_queued_requests_keep_domain_spacing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html_response(html_page("Slow", &[])).set_delay(Duration::from_millis(600)))
        .mount(&server)
        .await;

    let starts = Arc::new(Mutex::new(Vec::new()));
    let recorded = starts.clone();
    Mock::given(method("GET"))
        .and(path("/fast"))
        .respond_with(move |_: &Request| {
            recorded.lock().unwrap().push(Instant::now());
            html_response(html_page("Fast", &[]))
        })
        .expect(2)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.rate_limit.requests_per_second = 4.0;
    config.rate_limit.burst_allowance = 0;
    let settings = ClientSettings::from_config(&config);
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    let fetcher = Fetcher::new(
        settings.build(None).unwrap(),
        limiter,
        RetryPolicy::from_config(&config),
        1,
    );

    // The slow request holds the only permit while two more queue behind it
    let cancel = CancellationToken::new();
    let slow = url(&server, "/slow");
    let fast = url(&server, "/fast");
    let (fetcher, fast, cancel) = (&fetcher, &fast, &cancel);
    let queued = move || async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        fetcher.fetch(fast, cancel).await
    };
    let (first, second, third) = tokio::join!(fetcher.fetch(&slow, cancel), queued(), queued());
    assert!(first.is_ok() && second.is_ok() && third.is_ok());

    let starts = starts.lock().unwrap();
    assert_eq!(starts.len(), 2);
    let gap = if starts[1] > starts[0] {
        starts[1] - starts[0]
    } else {
        starts[0] - starts[1]
    };
    assert!(gap >= Duration::from_millis(200), "queued requests started {:?} apart", gap);
}
