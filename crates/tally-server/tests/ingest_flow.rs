mod common;

use axum::http::StatusCode;
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tally_agent::sender::{Encoder, Sender};
use tally_agent::transport::HttpTransport;
use tally_common::crypto::{RsaPrivateKey, RsaPublicKey};
use tally_common::sign::HASH_HEADER;
use tally_common::types::{Metric, POLL_COUNT};
use tally_common::{codec, sign};
use tally_server::app;
use tally_storage::memory::MemStorage;
use tally_storage::MetricsStorage;

const KEY: &str = "shared-secret";

fn rsa_pair() -> (RsaPrivateKey, RsaPublicKey) {
    let private = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
    let public = RsaPublicKey::from(&private);
    (private, public)
}

fn sample_chunk() -> Vec<Metric> {
    vec![
        Metric::gauge("Alloc", 12.5),
        Metric::gauge("HeapInuse", 4096.0),
        Metric::counter(POLL_COUNT, 3),
    ]
}

#[tokio::test]
async fn gzip_batch_is_decoded_and_stored() {
    let ctx = build_test_context();
    let body = codec::compress(&serde_json::to_vec(&sample_chunk()).unwrap()).unwrap();

    let resp = post_bytes(&ctx.app, "/updates/", body, &[("Content-Encoding", "gzip")]).await;
    assert_eq!(resp.status, StatusCode::OK);

    assert_eq!(get(&ctx.app, "/value/gauge/Alloc").await.body, "12.5");
    assert_eq!(get(&ctx.app, "/value/counter/PollCount").await.body, "3");
}

#[tokio::test]
async fn hash_mismatch_is_rejected_and_missing_hash_is_accepted() {
    let ctx = build_context(Some(KEY), None);
    let body = codec::compress(br#"[{"id":"x","type":"gauge","value":1.0}]"#).unwrap();

    let forged = sign::sign(b"other-key", &body).unwrap();
    let resp = post_bytes(
        &ctx.app,
        "/updates/",
        body.clone(),
        &[("Content-Encoding", "gzip"), (HASH_HEADER, &forged)],
    )
    .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(ctx.storage.get_gauge("x").await.is_err());

    let resp = post_bytes(&ctx.app, "/updates/", body, &[("Content-Encoding", "gzip")]).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(ctx.storage.get_gauge("x").await.unwrap(), 1.0);
}

#[tokio::test]
async fn signed_and_encrypted_payload_round_trips() {
    let (private, public) = rsa_pair();
    let ctx = build_context(Some(KEY), Some(private));
    let payload = Encoder::new(Some(KEY), Some(public)).encode(&sample_chunk()).unwrap();
    let signature = payload.signature.clone().unwrap();

    let resp = post_bytes(
        &ctx.app,
        "/updates/",
        payload.body,
        &[("Content-Encoding", "gzip"), (HASH_HEADER, &signature)],
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(ctx.storage.get_gauge("HeapInuse").await.unwrap(), 4096.0);
    assert_eq!(ctx.storage.get_counter(POLL_COUNT).await.unwrap(), 3);
}

#[tokio::test]
async fn undecryptable_body_is_rejected() {
    let (private, _) = rsa_pair();
    let ctx = build_context(None, Some(private));
    let body = codec::compress(br#"[{"id":"x","type":"gauge","value":1.0}]"#).unwrap();

    let resp = post_bytes(&ctx.app, "/updates/", body, &[("Content-Encoding", "gzip")]).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn corrupt_gzip_is_rejected() {
    let ctx = build_test_context();
    let resp = post_bytes(
        &ctx.app,
        "/updates/",
        b"definitely not gzip".to_vec(),
        &[("Content-Encoding", "gzip")],
    )
    .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn responses_are_signed_when_a_key_is_set() {
    let ctx = build_context(Some(KEY), None);
    ctx.storage.update_gauge("Alloc", 2.0).await.unwrap();

    let resp = get(&ctx.app, "/value/gauge/Alloc").await;
    let header = resp.headers[HASH_HEADER].to_str().unwrap().to_string();
    sign::verify(KEY.as_bytes(), resp.body.as_bytes(), &header).unwrap();

    let unsigned = build_test_context();
    let resp = get(&unsigned.app, "/ping").await;
    assert!(!resp.headers.contains_key(HASH_HEADER));
}

#[tokio::test]
async fn agent_cycle_reaches_a_live_server() {
    let (private, public) = rsa_pair();
    let ctx = build_context(Some(KEY), Some(private));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_app = app::build_http_app(ctx.state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, server_app).await.unwrap();
    });

    let agent_storage: Arc<dyn MetricsStorage> = Arc::new(MemStorage::new());
    agent_storage.update_counter(POLL_COUNT, 2).await.unwrap();
    for (name, value) in [("Alloc", 1.5), ("Frees", 7.0), ("HeapIdle", 3.0), ("NumGC", 1.0)] {
        agent_storage.update_gauge(name, value).await.unwrap();
    }

    let sender = Sender::new(
        agent_storage.clone(),
        Arc::new(HttpTransport::new(&addr.to_string(), None)),
        Encoder::new(Some(KEY), Some(public)),
        2,
        Duration::from_secs(10),
    );
    let report = sender.report().await;
    assert_eq!(report.jobs, 2);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 0);

    assert_eq!(ctx.storage.get_counter(POLL_COUNT).await.unwrap(), 2);
    assert_eq!(ctx.storage.get_gauge("NumGC").await.unwrap(), 1.0);
    assert_eq!(ctx.storage.get_all_gauges().await.unwrap().len(), 4);
    assert_eq!(agent_storage.get_counter(POLL_COUNT).await.unwrap(), 0);

    server.abort();
}
