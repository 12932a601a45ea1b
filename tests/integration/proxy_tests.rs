//! Integration tests for proxy verification and persistence

mod common;

use common::test_config;
use lantern_crawl::config::Config;
use lantern_crawl::crawler::ClientSettings;
use lantern_crawl::proxy::{read_state, ProxyManager};
use lantern_crawl::Crawler;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn proxy_config(proxies: Vec<String>) -> Config {
    let mut config = test_config();
    config.proxy.proxies = proxies;
    config.proxy.verify_url = "http://lantern.test/ip".to_string();
    config.proxy.verify_timeout_secs = 5;
    config
}

fn manager(config: &Config) -> ProxyManager {
    ProxyManager::new(
        &config.proxy,
        ClientSettings::from_config(config),
        CancellationToken::new(),
    )
}

#[tokio::test]
async fn test_failed_verifications_then_recovery() {
    let proxy = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .expect(3)
        .mount(&proxy)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"origin\": \"10.0.0.1\"}"))
        .expect(1)
        .mount(&proxy)
        .await;

    let address = proxy.uri();
    let config = proxy_config(vec![address.clone()]);
    let manager = manager(&config);

    for _ in 0..3 {
        let (ok, _) = manager.verify(&address).await;
        assert!(!ok);
    }

    let record = manager.record(&address).expect("verification never removes");
    assert!(!record.is_available);
    assert_eq!(record.consecutive_failures, 3);
    assert_eq!(record.failure_count, 3);

    let (ok, _) = manager.verify(&address).await;
    assert!(ok);

    let record = manager.record(&address).unwrap();
    assert!(record.is_available);
    assert_eq!(record.consecutive_failures, 0);
    assert_eq!(record.success_count, 1);
    assert!(record.supported_protocols.contains("http"));
}

#[tokio::test]
async fn test_state_saved_on_close_and_reloaded() {
    let dir = TempDir::new().unwrap();
    let state_file = dir.path().join("proxies.json");

    let mut config = proxy_config(vec![
        "http://10.0.0.1:8080".to_string(),
        "socks5://10.0.0.2:1080".to_string(),
    ]);
    config.proxy.use_proxies = true;
    config.proxy.state_file = Some(state_file.to_string_lossy().into_owned());

    let crawler = Crawler::setup(config.clone()).unwrap();
    let proxies = crawler.proxy_manager().expect("proxies enabled");
    proxies.report_success("http://10.0.0.1:8080", 250);
    proxies.report_failure("socks5://10.0.0.2:1080");
    crawler.close().await.unwrap();

    let saved = read_state(&state_file).unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved["http://10.0.0.1:8080"].success_count, 1);
    assert_eq!(saved["socks5://10.0.0.2:1080"].failure_count, 1);

    let reopened = Crawler::setup(config).unwrap();
    let manager = reopened.proxy_manager().unwrap();
    assert_eq!(manager.records().len(), 2);
    let record = manager.record("http://10.0.0.1:8080").unwrap();
    assert_eq!(record.success_count, 1);
    assert!((record.average_response_time_ms - 250.0).abs() < f64::EPSILON);
    reopened.close().await.unwrap();
}

#[tokio::test]
async fn test_proxy_file_is_loaded() {
    let dir = TempDir::new().unwrap();
    let list = dir.path().join("proxies.txt");
    std::fs::write(
        &list,
        "# office proxies\nhttp://10.0.0.1:8080\n\nnot-a-proxy\nsocks5h://10.0.0.3:1080\n",
    )
    .unwrap();

    let mut config = proxy_config(Vec::new());
    config.proxy.use_proxies = true;
    config.proxy.proxy_file = Some(list.to_string_lossy().into_owned());

    let crawler = Crawler::setup(config).unwrap();
    let proxies = crawler.proxy_manager().unwrap();
    assert_eq!(proxies.len(), 2);
    assert!(proxies.record("socks5h://10.0.0.3:1080").is_some());
}

#[tokio::test]
async fn test_sweep_restores_unavailable_proxy() {
    let proxy = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"origin\": \"10.0.0.1\"}"))
        .expect(1)
        .mount(&proxy)
        .await;

    let address = proxy.uri();
    let config = proxy_config(vec![address.clone()]);
    let manager = manager(&config);

    for _ in 0..3 {
        manager.report_failure(&address);
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let restored = manager.record(&address).map_or(false, |r| r.is_available);
            if restored && !manager.is_sweep_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("sweep restores the proxy");

    let record = manager.record(&address).unwrap();
    assert_eq!(record.consecutive_failures, 0);
    assert_eq!(record.failure_count, 3);
    assert_eq!(record.success_count, 1);
}
