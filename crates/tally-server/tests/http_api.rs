mod common;

use axum::http::StatusCode;
use common::*;
use tally_common::types::POLL_COUNT;

#[tokio::test]
async fn path_updates_accumulate_counters_and_replace_gauges() {
    let ctx = build_test_context();

    for _ in 0..3 {
        assert_eq!(post(&ctx.app, "/update/counter/PollCount/1").await.status, StatusCode::OK);
    }
    assert_eq!(post(&ctx.app, "/update/gauge/Alloc/12.5").await.status, StatusCode::OK);
    assert_eq!(post(&ctx.app, "/update/gauge/Alloc/7").await.status, StatusCode::OK);

    let resp = get(&ctx.app, "/value/counter/PollCount").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body, "3");

    let resp = get(&ctx.app, "/value/gauge/Alloc").await;
    assert_eq!(resp.body, "7");
    assert!(resp.headers.contains_key("x-trace-id"));
}

#[tokio::test]
async fn path_update_rejects_bad_input() {
    let ctx = build_test_context();
    assert_eq!(
        post(&ctx.app, "/update/histogram/x/1").await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        post(&ctx.app, "/update/counter/x/1.5").await.status,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        post(&ctx.app, "/update/gauge/x/abc").await.status,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn unknown_metric_is_not_found() {
    let ctx = build_test_context();
    assert_eq!(get(&ctx.app, "/value/gauge/Unknown").await.status, StatusCode::NOT_FOUND);

    let resp = post_json(&ctx.app, "/value/", r#"{"id":"Unknown","type":"counter"}"#).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn json_update_answers_with_stored_value() {
    let ctx = build_test_context();

    post_json(&ctx.app, "/update/", r#"{"id":"hits","type":"counter","delta":4}"#).await;
    let resp = post_json(&ctx.app, "/update/", r#"{"id":"hits","type":"counter","delta":6}"#).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.json(),
        serde_json::json!({"id": "hits", "type": "counter", "delta": 10})
    );

    let resp = post_json(&ctx.app, "/value/", r#"{"id":"hits","type":"counter"}"#).await;
    assert_eq!(resp.json()["delta"], 10);
}

#[tokio::test]
async fn json_update_validation() {
    let ctx = build_test_context();
    let cases = [
        (r#"{"id":"g","type":"gauge"}"#, StatusCode::BAD_REQUEST),
        (r#"{"id":"c","type":"counter","value":1.0}"#, StatusCode::BAD_REQUEST),
        (r#"{"id":"x","type":"summary","value":1.0}"#, StatusCode::BAD_REQUEST),
        (r#"{"id":"","type":"gauge","value":1.0}"#, StatusCode::NOT_FOUND),
        ("not json", StatusCode::BAD_REQUEST),
    ];
    for (body, expected) in cases {
        let resp = post_json(&ctx.app, "/update/", body).await;
        assert_eq!(resp.status, expected, "body: {body}");
    }
}

#[tokio::test]
async fn batch_with_one_bad_record_stores_nothing() {
    let ctx = build_test_context();
    let resp = post_json(
        &ctx.app,
        "/updates/",
        r#"[{"id":"a","type":"gauge","value":1.0},{"id":"b","type":"counter"}]"#,
    )
    .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(resp.body.contains("record 1"));
    assert!(ctx.storage.get_gauge("a").await.is_err());
}

#[tokio::test]
async fn batch_applies_every_record() {
    let ctx = build_test_context();
    let resp = post_json(
        &ctx.app,
        "/updates/",
        r#"[
            {"id":"PollCount","type":"counter","delta":2},
            {"id":"PollCount","type":"counter","delta":3},
            {"id":"Alloc","type":"gauge","value":9.5}
        ]"#,
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(ctx.storage.get_counter(POLL_COUNT).await.unwrap(), 5);
    assert_eq!(ctx.storage.get_gauge("Alloc").await.unwrap(), 9.5);
}

#[tokio::test]
async fn listing_shows_every_metric() {
    let ctx = build_test_context();
    ctx.storage.update_counter(POLL_COUNT, 2).await.unwrap();
    ctx.storage.update_gauge("Alloc", 1.0).await.unwrap();

    let resp = get(&ctx.app, "/").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.headers["content-type"].to_str().unwrap().starts_with("text/html"));
    assert!(resp.body.contains("<td>PollCount</td><td>2</td>"));
    assert!(resp.body.contains("<td>Alloc</td><td>1.00</td>"));
}

#[tokio::test]
async fn ping_answers_when_storage_is_up() {
    let ctx = build_test_context();
    let resp = get(&ctx.app, "/ping").await;
    assert_eq!(resp.status, StatusCode::OK);
}
