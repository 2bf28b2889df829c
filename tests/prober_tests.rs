use std::time::{Duration, Instant};

use page_insight::context::RequestContext;
use page_insight::prober::{LinkProber, MAX_LINKS, Prober};
use page_insight::transport::{DialPolicy, SafeTransport};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod test_helpers {
    use super::*;

    pub fn prober(concurrency: usize) -> LinkProber {
        LinkProber::new(
            SafeTransport::new(DialPolicy::AllowAll),
            concurrency,
            Duration::from_secs(4),
        )
        .unwrap()
    }

    pub async fn respond(server: &MockServer, verb: &str, route: &str, status: u16) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    pub async fn count(prober: &LinkProber, links: Vec<String>) -> usize {
        prober.probe(&RequestContext::background(), links).await
    }
}

use test_helpers::*;

#[tokio::test]
async fn test_status_codes_decide_accessibility() {
    let server = MockServer::start().await;
    respond(&server, "HEAD", "/ok", 200).await;
    respond(&server, "HEAD", "/no-content", 204).await;
    respond(&server, "HEAD", "/moved", 301).await;
    respond(&server, "HEAD", "/missing", 404).await;
    respond(&server, "HEAD", "/broken", 500).await;
    respond(&server, "HEAD", "/auth", 401).await;

    let prober = prober(5);
    let base = server.uri();

    assert_eq!(count(&prober, vec![format!("{base}/ok")]).await, 0);
    assert_eq!(count(&prober, vec![format!("{base}/no-content")]).await, 0);
    // redirects are judged on their own status
    assert_eq!(count(&prober, vec![format!("{base}/moved")]).await, 0);
    assert_eq!(count(&prober, vec![format!("{base}/missing")]).await, 1);
    assert_eq!(count(&prober, vec![format!("{base}/broken")]).await, 1);
    assert_eq!(count(&prober, vec![format!("{base}/auth")]).await, 1);

    let all = ["ok", "no-content", "moved", "missing", "broken", "auth"]
        .iter()
        .map(|p| format!("{base}/{p}"))
        .collect();
    assert_eq!(count(&prober, all).await, 3);
}

#[tokio::test]
async fn test_head_refusal_falls_back_to_ranged_get() {
    let server = MockServer::start().await;
    respond(&server, "HEAD", "/no-head", 405).await;
    respond(&server, "HEAD", "/head-forbidden", 403).await;
    respond(&server, "HEAD", "/really-forbidden", 403).await;
    respond(&server, "GET", "/really-forbidden", 403).await;
    Mock::given(method("GET"))
        .and(path_regex("^/(no-head|head-forbidden)$"))
        .and(header("range", "bytes=0-0"))
        .respond_with(ResponseTemplate::new(206))
        .mount(&server)
        .await;

    let prober = prober(3);
    let base = server.uri();

    assert_eq!(count(&prober, vec![format!("{base}/no-head")]).await, 0);
    assert_eq!(count(&prober, vec![format!("{base}/head-forbidden")]).await, 0);
    assert_eq!(count(&prober, vec![format!("{base}/really-forbidden")]).await, 1);
}

#[tokio::test]
async fn test_unusable_links_are_inaccessible() {
    let prober = prober(2);
    let links = vec![
        "://bad-url".to_string(),
        "not a url at all".to_string(),
        // nothing listens on the discard port
        "http://127.0.0.1:9/".to_string(),
    ];
    assert_eq!(count(&prober, links).await, 3);
}

#[tokio::test]
async fn test_empty_input() {
    assert_eq!(count(&prober(4), vec![]).await, 0);
}

#[tokio::test]
async fn test_cancelled_context_counts_nothing() {
    let server = MockServer::start().await;
    respond(&server, "HEAD", "/missing", 404).await;

    let ctx = RequestContext::background();
    ctx.cancel();
    let links = (0..20).map(|i| format!("{}/missing?i={i}", server.uri())).collect();

    assert_eq!(prober(4).probe(&ctx, links).await, 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_during_requests_blames_no_link() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let ctx = RequestContext::background();
    tokio::spawn({
        let ctx = ctx.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            ctx.cancel();
        }
    });
    let links = (0..8).map(|i| format!("{}/slow/{i}", server.uri())).collect();

    let started = Instant::now();
    assert_eq!(prober(4).probe(&ctx, links).await, 0);
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    // the first batch was already on the wire when the cancel landed
    assert!(!server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deadline_during_requests_blames_no_link() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let ctx = RequestContext::background().with_timeout(Duration::from_millis(100));
    let links = (0..8).map(|i| format!("{}/slow/{i}", server.uri())).collect();

    let started = Instant::now();
    assert_eq!(prober(4).probe(&ctx, links).await, 0);
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
}

#[tokio::test]
async fn test_links_beyond_cap_are_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let links = (0..MAX_LINKS + 100)
        .map(|i| format!("{}/page/{i}", server.uri()))
        .collect();

    assert_eq!(count(&prober(25), links).await, MAX_LINKS);
    assert_eq!(server.received_requests().await.unwrap().len(), MAX_LINKS);
}

#[tokio::test]
async fn test_public_only_policy_refuses_loopback_links() {
    let server = MockServer::start().await;
    respond(&server, "HEAD", "/ok", 200).await;

    let prober = LinkProber::new(
        SafeTransport::new(DialPolicy::PublicOnly),
        2,
        Duration::from_secs(4),
    )
    .unwrap();

    let links = vec![
        format!("{}/ok", server.uri()),
        "http://169.254.169.254/latest/meta-data/".to_string(),
    ];
    assert_eq!(count(&prober, links).await, 2);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrency_is_clamped_to_one() {
    let server = MockServer::start().await;
    respond(&server, "HEAD", "/ok", 200).await;

    let prober = prober(0);
    assert_eq!(prober.concurrency(), 1);
    let links = (0..5).map(|i| format!("{}/ok?{i}", server.uri())).collect();
    assert_eq!(count(&prober, links).await, 0);
}
