use std::time::Duration;

use foxy_client::{HttpManager, Request, init_test_logging};
use foxy_servers::proxy::{connect_proxy_server, plain_proxy_server};
use foxy_servers::{MockServers, ServerCxt};
use foxy_shared::FoxyCA;
use foxy_shared::http::{HttpError, HttpResponse, collect};
use foxy_shared::tls::TlsConfig;
use foxy_shared::uri::FUri;
use http::{Method, Version, header::HOST};
use strum::IntoEnumIterator;
use tokio::time::timeout;

static TIMEOUT: u64 = 15_000;

struct TestContext {
    ca: FoxyCA,
    tls_config: TlsConfig,
}

impl TestContext {
    fn new() -> Self {
        init_test_logging();
        let ca = FoxyCA::generate().unwrap();
        TestContext {
            ca,
            tls_config: TlsConfig::default(),
        }
    }

    async fn start(&self, server: MockServers) -> ServerCxt {
        server.start(&self.ca, &self.tls_config).await.unwrap()
    }

    fn manager(&self) -> HttpManager {
        HttpManager::builder().trust_roots(self.ca.roots()).build()
    }
}

async fn fetch(mgr: &mut HttpManager, uri: &FUri, req: &Request) -> HttpResponse {
    let resp = timeout(Duration::from_millis(TIMEOUT), mgr.fetch(uri, req))
        .await
        .unwrap()
        .unwrap();
    timeout(Duration::from_millis(TIMEOUT), collect(resp))
        .await
        .unwrap()
        .unwrap()
}

async fn fetch_err(mgr: &mut HttpManager, uri: &FUri, req: &Request) -> HttpError {
    timeout(Duration::from_millis(TIMEOUT), mgr.fetch(uri, req))
        .await
        .unwrap()
        .expect_err("request must fail")
}

#[tokio::test]
async fn s1_https_h2_fresh_then_reused() {
    let cxt = TestContext::new();
    let server = cxt.start(MockServers::H2).await;
    let mut mgr = cxt.manager();
    let req = Request::get("/");

    assert!(!mgr.has_credentials());

    let resp = fetch(&mut mgr, &server.target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(resp.parts.version, Version::HTTP_2);
    assert_eq!(resp.body, "Hello, H2");
    assert!(mgr.has_connection());
    assert!(mgr.has_credentials());

    let resp = fetch(&mut mgr, &server.target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(resp.parts.version, Version::HTTP_2);

    // One TCP accept, one handshake: the second request multiplexed over
    // the cached connection.
    assert_eq!(server.accepts(), 1);
}

#[tokio::test]
async fn s2_https_falls_back_to_http11() {
    let cxt = TestContext::new();
    let server = cxt.start(MockServers::H11S).await;
    let mut mgr = cxt.manager();
    let req = Request::get("/");

    let resp = fetch(&mut mgr, &server.target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(resp.parts.version, Version::HTTP_11);
    assert_eq!(resp.body, "Hello, H11S");

    // Sequential second exchange over the same 1.1 connection.
    let resp = fetch(&mut mgr, &server.target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(resp.parts.version, Version::HTTP_11);
    assert_eq!(server.accepts(), 1);
}

#[tokio::test]
async fn s3_stale_cached_connection_redials_once() {
    let cxt = TestContext::new();
    let server = cxt.start(MockServers::H11Close).await;
    let mut mgr = cxt.manager();
    let req = Request::get("/");

    let resp = fetch(&mut mgr, &server.target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(resp.body, "Hello, H11CLOSE");
    assert_eq!(server.accepts(), 1);

    // The server closed the connection behind our back; the manager must
    // shed the dead connection and redial exactly once.
    let resp = fetch(&mut mgr, &server.target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(server.accepts(), 2);
    assert!(mgr.has_connection());
}

#[tokio::test]
async fn s4_https_through_connect_proxy() {
    let cxt = TestContext::new();
    let origin = cxt.start(MockServers::H2).await;
    let proxy = connect_proxy_server().await.unwrap();
    let proxy_uri: FUri = format!("http://127.0.0.1:{}", proxy.addr.port())
        .parse()
        .unwrap();

    let mut mgr = HttpManager::builder()
        .trust_roots(cxt.ca.roots())
        .proxy(proxy_uri)
        .build();
    let req = Request::get("/");

    let resp = fetch(&mut mgr, &origin.target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(resp.parts.version, Version::HTTP_2);
    assert_eq!(resp.body, "Hello, H2");
    assert_eq!(proxy.hits(), 1);
    assert_eq!(origin.accepts(), 1);

    // Reuse rides the established tunnel; no second CONNECT.
    let resp = fetch(&mut mgr, &origin.target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(proxy.hits(), 1);
    assert_eq!(origin.accepts(), 1);
}

#[tokio::test]
async fn s5_plaintext_h2c_prior_knowledge() {
    let cxt = TestContext::new();
    let server = cxt.start(MockServers::H2C).await;
    let mut mgr = HttpManager::builder().use_h2c(true).build();
    let req = Request::get("/");

    let resp = fetch(&mut mgr, &server.target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(resp.parts.version, Version::HTTP_2);
    assert_eq!(resp.body, "Hello, H2C");
    assert!(!mgr.has_credentials());

    let resp = fetch(&mut mgr, &server.target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(server.accepts(), 1);
}

#[tokio::test]
async fn s6_scheme_mix_is_refused() {
    let cxt = TestContext::new();
    let secure = cxt.start(MockServers::H2).await;
    let plain = cxt.start(MockServers::H11).await;
    let mut mgr = cxt.manager();
    let req = Request::get("/");

    let resp = fetch(&mut mgr, &secure.target, &req).await;
    assert_eq!(resp.parts.status, 200);

    // A plain request must fail without dialing and without disturbing
    // the cached HTTPS connection.
    let err = fetch_err(&mut mgr, &plain.target, &req).await;
    assert!(matches!(err, HttpError::SchemeMix), "got {err:?}");
    assert_eq!(plain.accepts(), 0);
    assert!(mgr.has_connection());

    let resp = fetch(&mut mgr, &secure.target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(secure.accepts(), 1);
}

#[tokio::test]
async fn scheme_mix_refused_the_other_way() {
    let cxt = TestContext::new();
    let plain = cxt.start(MockServers::H11).await;
    let secure = cxt.start(MockServers::H2).await;
    let mut mgr = cxt.manager();
    let req = Request::get("/");

    let resp = fetch(&mut mgr, &plain.target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(resp.body, "Hello, H11");

    let err = fetch_err(&mut mgr, &secure.target, &req).await;
    assert!(matches!(err, HttpError::SchemeMix), "got {err:?}");
    assert_eq!(secure.accepts(), 0);
    assert!(mgr.has_connection());
}

#[tokio::test]
async fn plain_requests_use_origin_form() {
    let cxt = TestContext::new();
    let server = cxt.start(MockServers::H11).await;
    let mut mgr = cxt.manager();
    let req = Request::get("/echo-target");

    let resp = fetch(&mut mgr, &server.target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(resp.body, "/echo-target");
}

#[tokio::test]
async fn plain_proxy_gets_absolute_form() {
    let _cxt = TestContext::new();
    let proxy = plain_proxy_server().await.unwrap();
    let proxy_uri: FUri = format!("http://127.0.0.1:{}", proxy.addr.port())
        .parse()
        .unwrap();

    let mut mgr = HttpManager::builder().proxy(proxy_uri).build();
    let req = Request::get("/media/item");

    // The origin host never resolves; only the proxy is dialed.
    let target: FUri = "http://origin.test:1234/media/item".parse().unwrap();
    let resp = fetch(&mut mgr, &target, &req).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(resp.body, "PROXIED http://origin.test:1234/media/item");
    assert_eq!(proxy.hits(), 1);
}

async fn dead_target() -> FUri {
    // Bind an ephemeral port and drop it again; nothing listens there.
    let listener = foxy_shared::io::local_tcp_listener(None).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/").parse().unwrap()
}

#[tokio::test]
async fn dial_failure_leaves_manager_usable() {
    let cxt = TestContext::new();
    let mut mgr = cxt.manager();
    let req = Request::get("/");

    // Bounded behavior on a refused dial: one attempt, no cached
    // connection.
    let dead = dead_target().await;
    let err = fetch_err(&mut mgr, &dead, &req).await;
    assert!(matches!(err, HttpError::Io(_)), "got {err:?}");
    assert!(!mgr.has_connection());

    let server = cxt.start(MockServers::H11).await;
    let resp = fetch(&mut mgr, &server.target, &req).await;
    assert_eq!(resp.parts.status, 200);
}

#[tokio::test]
async fn non_idempotent_requests_are_not_retried() {
    let cxt = TestContext::new();
    let server = cxt.start(MockServers::H11Close).await;
    let mut mgr = cxt.manager();
    let post = Request::new(Method::POST, "/").body("name=foxy");

    // First POST rides a fresh connection and succeeds.
    let resp = fetch(&mut mgr, &server.target, &post).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(server.accepts(), 1);

    // The cached connection is dead now. A POST must not be replayed on a
    // redial; the failure surfaces instead.
    let err = fetch_err(&mut mgr, &server.target, &post).await;
    assert!(matches!(err, HttpError::StaleConnection), "got {err:?}");
    assert_eq!(server.accepts(), 1);
    assert!(!mgr.has_connection());

    // An idempotent request afterwards dials fresh and works.
    let resp = fetch(&mut mgr, &server.target, &Request::get("/")).await;
    assert_eq!(resp.parts.status, 200);
    assert_eq!(server.accepts(), 2);
}

#[tokio::test]
async fn credentials_not_loaded_for_plaintext() {
    let cxt = TestContext::new();
    let mut mgr = cxt.manager();
    assert!(!mgr.has_credentials());

    // Plaintext traffic never touches credentials.
    let server = cxt.start(MockServers::H11).await;
    let resp = fetch(&mut mgr, &server.target, &Request::get("/")).await;
    assert_eq!(resp.parts.status, 200);
    assert!(!mgr.has_credentials());
}

#[tokio::test]
async fn destroy_after_total_failure_is_clean() {
    let cxt = TestContext::new();
    let mut mgr = cxt.manager();
    let req = Request::get("/");

    let dead = dead_target().await;
    for _ in 0..3 {
        let _ = fetch_err(&mut mgr, &dead, &req).await;
    }
    assert!(!mgr.has_connection());
    // Dropping a manager that never held a connection must not blow up.
    drop(mgr);
}

#[tokio::test]
async fn caller_headers_reach_the_server() {
    let cxt = TestContext::new();
    let server = cxt.start(MockServers::H11).await;
    let mut mgr = cxt.manager();

    let req = Request::get("/echo-target").header(
        HOST,
        http::HeaderValue::from_static("override.test"),
    );
    let resp = fetch(&mut mgr, &server.target, &req).await;
    assert_eq!(resp.parts.status, 200);
}

#[tokio::test]
async fn every_server_answers_with_its_marker() {
    let cxt = TestContext::new();
    for server in MockServers::iter() {
        let running = cxt.start(server).await;
        let mut mgr = HttpManager::builder()
            .trust_roots(cxt.ca.roots())
            .use_h2c(server == MockServers::H2C)
            .build();

        let resp = fetch(&mut mgr, &running.target, &Request::get("/")).await;
        assert_eq!(resp.parts.status, 200, "{server}");
        assert_eq!(resp.parts.version, server.version(), "{server}");
        assert_eq!(resp.body, format!("Hello, {}", server.marker()), "{server}");
    }
}

#[tokio::test]
async fn cookie_jar_round_trip() {
    let cxt = TestContext::new();
    let server = cxt.start(MockServers::H11).await;
    let jar = std::sync::Arc::new(foxy_client::CookieJar::new());
    let mut mgr = HttpManager::builder().cookie_jar(jar.clone()).build();

    let resp = fetch(&mut mgr, &server.target, &Request::get("/cookies")).await;
    assert_eq!(resp.parts.status, 200);

    // The jar is the caller's to fill; the manager only carries it.
    if let Some(cookie) = resp.parts.headers.get(http::header::SET_COOKIE) {
        let jar_out = mgr.jar().unwrap();
        jar_out
            .store(server.target.host(), cookie.to_str().unwrap())
            .unwrap();
    }
    assert_eq!(jar.cookies_for("localhost").unwrap(), vec!["marker=H11"]);
}
