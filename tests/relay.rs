//! End-to-end relay behaviour against mock upstreams.

use std::time::{Duration, Instant};

use reqwest::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE,
};
use reqwest::{Method, StatusCode};

mod common;

use common::Canned;

#[tokio::test]
async fn preflight_answers_locally() {
    let upstream = common::start_upstream(Canned::new(200, "audio")).await;
    let relay = common::start_relay(common::relay_config(&upstream.url())).await;

    let res = common::client()
        .request(Method::OPTIONS, relay.url())
        .header("Origin", "https://radio.example.org")
        .header("Access-Control-Request-Method", "GET")
        .send()
        .await
        .expect("Relay unreachable");

    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_METHODS], "GET, OPTIONS");
    assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");

    let access_control = res
        .headers()
        .keys()
        .filter(|name| name.as_str().starts_with("access-control-"))
        .count();
    assert_eq!(access_control, 3);

    assert!(res.bytes().await.unwrap().is_empty());
    assert_eq!(upstream.hits(), 0, "Pre-flight must not touch upstream");
}

#[tokio::test]
async fn get_relays_audio_with_cors() {
    let audio: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
    let upstream = common::start_upstream(
        Canned::new(200, audio.clone())
            .header("Content-Type", "audio/mpeg")
            .header("icy-name", "Campus Radio")
            .header("Access-Control-Allow-Origin", "https://only.example.org"),
    )
    .await;
    let relay = common::start_relay(common::relay_config(&upstream.url())).await;

    let res = common::client().get(relay.url()).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[CONTENT_TYPE], "audio/mpeg");
    assert_eq!(res.headers()["icy-name"], "Campus Radio");

    let origins: Vec<_> = res.headers().get_all(ACCESS_CONTROL_ALLOW_ORIGIN).iter().collect();
    assert_eq!(origins, vec!["*"], "Upstream value must be overwritten, not merged");

    let body = res.bytes().await.unwrap();
    assert_eq!(body.as_ref(), audio.as_slice());
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn upstream_status_is_forwarded_unchanged() {
    for status in [200u16, 404, 503] {
        let upstream =
            common::start_upstream(Canned::new(status, format!("status {status}"))).await;
        let relay = common::start_relay(common::relay_config(&upstream.url())).await;

        let res = common::client().get(relay.url()).send().await.unwrap();

        assert_eq!(res.status().as_u16(), status);
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(res.text().await.unwrap(), format!("status {status}"));
        assert_eq!(upstream.hits(), 1, "Status {status} must not be retried");
    }
}

#[tokio::test]
async fn large_body_streams_through_intact() {
    let size = 10 * 1024 * 1024 + 17;
    let audio: Vec<u8> = (0..size).map(|i| (i * 31 % 256) as u8).collect();
    let upstream = common::start_upstream(
        Canned::new(200, audio.clone()).header("Content-Type", "audio/mpeg"),
    )
    .await;
    let relay = common::start_relay(common::relay_config(&upstream.url())).await;

    let res = common::client().get(relay.url()).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.bytes().await.unwrap();
    assert_eq!(body.len(), size);
    assert!(body.as_ref() == audio.as_slice(), "Relayed body differs from upstream");
}

#[tokio::test]
async fn inbound_method_and_headers_are_not_forwarded() {
    let upstream = common::start_upstream(Canned::new(200, "ok")).await;
    let relay = common::start_relay(common::relay_config(&upstream.url())).await;

    let res = common::client()
        .post(format!("{}stations/cfur?format=mp3", relay.url()))
        .header("Range", "bytes=100-")
        .header("Authorization", "Bearer secret")
        .header("X-Listener", "widget")
        .body("ignored")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "ok");

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);

    let head = requests[0].to_ascii_lowercase();
    assert!(head.starts_with("get /mp3 http/1.1\r\n"), "Unexpected request: {head}");
    assert!(!head.contains("range:"));
    assert!(!head.contains("authorization:"));
    assert!(!head.contains("x-listener:"));
    assert!(!head.contains("x-request-id:"));
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let url = format!("http://{}/mp3", common::closed_addr());
    let relay = common::start_relay(common::relay_config(&url)).await;

    let started = Instant::now();
    let res = common::client().get(relay.url()).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(res.bytes().await.unwrap().is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn silent_upstream_times_out() {
    let upstream = common::start_silent_upstream().await;
    let mut config = common::relay_config(&upstream.url());
    config.upstream.response_timeout_secs = 1;
    let relay = common::start_relay(config).await;

    let started = Instant::now();
    let res = common::client().get(relay.url()).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn client_disconnect_closes_upstream() {
    let upstream = common::start_endless_upstream().await;
    let relay = common::start_relay(common::relay_config(&upstream.url())).await;

    let mut res = common::client().get(relay.url()).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["icy-name"], "Test FM");

    let chunk = res.chunk().await.unwrap().expect("Stream should be live");
    assert!(!chunk.is_empty());
    assert_eq!(relay.tracker.active_count(), 1);

    drop(res);

    assert!(
        relay.tracker.wait_idle(Duration::from_secs(5)).await,
        "Relayed stream should close once the client is gone"
    );

    let deadline = Instant::now() + Duration::from_secs(5);
    while !upstream.client_gone() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(upstream.client_gone(), "Upstream connection should be closed");
}

#[tokio::test]
async fn preflight_over_tls() {
    let upstream = common::start_upstream(Canned::new(200, "audio")).await;
    let mut config = common::relay_config(&upstream.url());
    let tls = stream_relay::config::TlsConfig {
        cert_path: concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/cert.pem").into(),
        key_path: concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/key.pem").into(),
    };
    config.listener.tls = Some(tls.clone());

    let rustls = stream_relay::net::tls::load_tls_config(&tls).await.unwrap();
    let server = stream_relay::http::HttpServer::new(config).unwrap();
    let addr = common::closed_addr();

    let shutdown = stream_relay::lifecycle::Shutdown::new();
    let (_, updates) = tokio::sync::mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    let task =
        tokio::spawn(async move { server.run_tls(addr, rustls, updates, server_shutdown).await });

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    // The listener binds inside run_tls.
    let mut res = None;
    for _ in 0..50 {
        match client
            .request(Method::OPTIONS, format!("https://{addr}/live"))
            .send()
            .await
        {
            Ok(r) => {
                res = Some(r);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    let res = res.expect("TLS relay should accept connections");

    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(upstream.hits(), 0);

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("TLS server should stop after shutdown")
        .unwrap();
    assert!(result.is_ok());
}
