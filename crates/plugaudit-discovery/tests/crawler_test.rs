use plugaudit_core::{DiscoveryConfig, ProgressCallback};
use plugaudit_discovery::{CrawlTarget, DiscoveryCrawler, StopReason};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn listing(slugs: &[&str]) -> String {
    let links: String = slugs
        .iter()
        .map(|slug| format!("<a href=\"https://wordpress.org/plugins/{slug}/\">{slug}</a>\n"))
        .collect();
    format!("<html><body>{links}</body></html>")
}

fn crawler(server: &MockServer) -> DiscoveryCrawler {
    let config = DiscoveryConfig {
        search_url_template: format!("{}/search/{{kw}}/page/{{page}}/", server.uri()),
        category_url_template: format!("{}/browse/{{category}}/page/{{page}}/", server.uri()),
        timeout_secs: 5,
        ..DiscoveryConfig::default()
    };
    DiscoveryCrawler::new(config).expect("create crawler")
}

const FAST: Duration = Duration::from_millis(5);

#[tokio::test]
async fn test_stops_after_three_pages_without_new_identifiers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/upload/page/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&["alpha", "beta"])))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    // Every later page repeats what page 1 already yielded
    Mock::given(method("GET"))
        .and(path_regex(r"^/search/upload/page/\d+/$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&["beta", "alpha"])))
        .expect(3)
        .mount(&server)
        .await;

    let report = crawler(&server)
        .crawl(&CrawlTarget::Keyword("upload".into()), 100, FAST, None)
        .await;

    assert_eq!(report.identifiers, vec!["alpha", "beta"]);
    assert_eq!(report.stop_reason, StopReason::EmptyPages);
    assert_eq!(report.pages_fetched, 4);
}

#[tokio::test]
async fn test_search_respects_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/form/page/1/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(listing(&["a", "b", "b", "c", "d", "e"])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let found = crawler(&server).search("form", 3, FAST, None).await;
    assert_eq!(found, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_rate_limit_backoff_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/browse/popular/page/1/"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/browse/popular/page/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&["one", "two"])))
        .mount(&server)
        .await;

    let report = crawler(&server)
        .crawl(&CrawlTarget::Category("popular".into()), 2, FAST, None)
        .await;

    assert_eq!(report.identifiers, vec!["one", "two"]);
    assert_eq!(report.stop_reason, StopReason::LimitReached);
}

#[tokio::test]
async fn test_persistent_rate_limit_returns_partial_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/gallery/page/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&["x", "y"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/gallery/page/2/"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let messages = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&messages);
    let progress: ProgressCallback = Arc::new(move |m: &str| {
        sink.lock().expect("lock").push(m.to_string());
    });

    let report = crawler(&server)
        .crawl(
            &CrawlTarget::Keyword("gallery".into()),
            100,
            FAST,
            Some(progress),
        )
        .await;

    assert_eq!(report.identifiers, vec!["x", "y"]);
    assert_eq!(report.stop_reason, StopReason::RateLimited);
    let messages = messages.lock().expect("lock");
    assert!(messages.iter().any(|m| m.contains("Rate limited")));
}

#[tokio::test]
async fn test_non_retryable_status_ends_crawl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/seo/page/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&["seo-one"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/seo/page/2/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let report = crawler(&server)
        .crawl(&CrawlTarget::Keyword("seo".into()), 100, FAST, None)
        .await;
    assert_eq!(report.identifiers, vec!["seo-one"]);
    assert_eq!(report.stop_reason, StopReason::TransportError);
}

#[tokio::test]
async fn test_page_ceiling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/browse/new/page/(\d+)/$"))
        .respond_with(PageEcho)
        .expect(2)
        .mount(&server)
        .await;

    let config = DiscoveryConfig {
        category_url_template: format!("{}/browse/{{category}}/page/{{page}}/", server.uri()),
        max_pages: 2,
        ..DiscoveryConfig::default()
    };
    let report = DiscoveryCrawler::new(config)
        .expect("crawler")
        .crawl(&CrawlTarget::Category("new".into()), 100, FAST, None)
        .await;
    assert_eq!(report.identifiers, vec!["slug-1", "slug-2"]);
    assert_eq!(report.stop_reason, StopReason::PageCeiling);
}

#[tokio::test]
async fn test_empty_keyword_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let found = crawler(&server).search("  ", 10, FAST, None).await;
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_stop_interrupts_wait() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/browse/popular/page/(\d+)/$"))
        .respond_with(PageEcho)
        .mount(&server)
        .await;

    let crawler = Arc::new(crawler(&server));
    let running = Arc::clone(&crawler);
    let handle = tokio::spawn(async move {
        running
            .crawl(
                &CrawlTarget::Category("popular".into()),
                100,
                Duration::from_secs(60),
                None,
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    crawler.stop();

    let report = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("crawl ends promptly after stop")
        .expect("join");
    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.identifiers, vec!["slug-1"]);
}

#[tokio::test]
async fn test_estimate_total() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/browse/popular/page/(\d+)/$"))
        .respond_with(LastPage(37))
        .mount(&server)
        .await;

    let estimate = crawler(&server)
        .estimate_total(&CrawlTarget::Category("popular".into()), Duration::ZERO, None)
        .await;
    assert_eq!(estimate, Some(37 * 24));
}

#[tokio::test]
async fn test_estimate_unknown_when_first_page_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let estimate = crawler(&server)
        .estimate_total(&CrawlTarget::Category("popular".into()), Duration::ZERO, None)
        .await;
    assert_eq!(estimate, None);
}

fn page_number(request: &Request) -> u32 {
    request
        .url
        .path()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Each page lists one identifier named after its page number.
struct PageEcho;

impl Respond for PageEcho {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let slug = format!("slug-{}", page_number(request));
        ResponseTemplate::new(200).set_body_string(listing(&[&slug]))
    }
}

/// Pages up to and including the given number have items, later ones are empty.
struct LastPage(u32);

impl Respond for LastPage {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let page = page_number(request);
        if page <= self.0 {
            let slug = format!("p{page}");
            ResponseTemplate::new(200).set_body_string(listing(&[&slug]))
        } else {
            ResponseTemplate::new(200).set_body_string(listing(&[]))
        }
    }
}
