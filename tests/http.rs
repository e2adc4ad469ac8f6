use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{Request, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use pairup::{
    db::Database,
    web::{router, AppState, Webhook},
};

fn app() -> Router {
    router(AppState::new(Database::open_in_memory().unwrap(), None))
}

type HookState = (mpsc::UnboundedSender<Value>, StatusCode);

async fn receive(State((tx, status)): State<HookState>, Json(body): Json<Value>) -> StatusCode {
    let _ = tx.send(body);
    status
}

/// Serves a local webhook that answers `status` and forwards every body it
/// receives. Returns the app wired to it.
async fn app_with_webhook(status: StatusCode) -> (Router, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let hook = Router::new()
        .route("/hook", post(receive))
        .with_state((tx, status));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, hook).await.unwrap() });

    let webhook = Webhook {
        url: format!("http://{addr}/hook"),
        timeout: Duration::from_secs(5),
    };
    let state = AppState::new(Database::open_in_memory().unwrap(), Some(webhook));
    (router(state), rx)
}

async fn four_people(app: &Router) {
    let (status, _) = call(
        app,
        "POST",
        "/people/import",
        Some(json!([
            {"email": "a@example.com", "name": "A"},
            {"email": "b@example.com", "name": "B"},
            {"email": "c@example.com", "name": "C"},
            {"email": "d@example.com", "name": "D"},
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn round_trip_through_the_service() {
    let app = app();

    let (status, summary) = call(
        &app,
        "POST",
        "/people/import",
        Some(json!([
            {"Email": "Ada@example.com", "Name": "Ada", "Team": "core"},
            {"Email": "bob@example.com", "Name": "Bob"},
            {"Email": "cy@example.com", "Name": "Cy"},
            {"Email": "di@example.com", "Name": "Di", "Include": false},
            {"Name": "No email"},
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary, json!({"imported": 3, "skipped": 2}));

    let (status, _) = call(
        &app,
        "POST",
        "/history/import",
        Some(json!([
            {"Person A (Email)": "ada@example.com", "Person B (Email)": "bob@example.com"}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, round) = call(&app, "POST", "/matches", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(round["generation"], 1);
    let records = round["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["match_type"], "triad");
    // Ada and Bob have met, so whichever of them is left over repeats a connection.
    assert_eq!(round["triad_fallback"], true);

    let (status, latest) = call(&app, "GET", "/matches", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["records"], round["records"]);
    assert_eq!(latest["approved"], false);

    // The round is still pending, so only the imported meeting is on record.
    let (status, history) = call(&app, "GET", "/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(history.get("cy@example.com").is_none());
    assert_eq!(history["ada@example.com"], json!(["bob@example.com"]));
}

#[tokio::test]
async fn regenerating_does_not_touch_history() {
    let app = app();
    four_people(&app).await;

    let (_, first) = call(&app, "POST", "/matches", None).await;
    let (_, second) = call(&app, "POST", "/matches", None).await;
    assert_eq!(second["generation"], 2);
    assert_eq!(first["records"], second["records"]);

    let (status, history) = call(&app, "GET", "/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history, json!({}));
}

#[tokio::test]
async fn too_few_included_is_a_bad_request() {
    let app = app();
    call(
        &app,
        "POST",
        "/people",
        Some(json!({"email": "solo@example.com", "name": "Solo"})),
    )
    .await;

    let (status, body) = call(&app, "POST", "/matches", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("found 1"));
}

#[tokio::test]
async fn include_toggle_and_unknown_person() {
    let app = app();
    call(
        &app,
        "POST",
        "/people",
        Some(json!({"email": "a@example.com", "name": "A", "desk": 12})),
    )
    .await;

    let (status, person) = call(
        &app,
        "POST",
        "/people/a@example.com/include",
        Some(json!({"include": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        person,
        json!({"email": "a@example.com", "name": "A", "desk": 12, "include": false})
    );

    let (status, _) = call(
        &app,
        "POST",
        "/people/ghost@example.com/include",
        Some(json!({"include": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn push_needs_a_webhook_and_a_round() {
    let app = app();
    let (status, _) = call(&app, "POST", "/matches/push", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = call(&app, "GET", "/matches", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn include_key_in_a_person_body_sets_the_flag() {
    let app = app();
    let (status, person) = call(
        &app,
        "POST",
        "/people",
        Some(json!({"email": "A@example.com", "name": "A", "Include": false, "desk": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        person,
        json!({"email": "a@example.com", "name": "A", "desk": 3, "include": false})
    );

    let (_, people) = call(&app, "GET", "/people", None).await;
    assert_eq!(people, json!([person]));
}

#[tokio::test]
async fn person_without_an_email_is_a_bad_request() {
    let app = app();
    for body in [json!({"email": "  ", "name": "Blank"}), json!({"name": "Nobody"})] {
        let (status, body) = call(&app, "POST", "/people", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("email"));
    }

    let (_, people) = call(&app, "GET", "/people", None).await;
    assert_eq!(people, json!([]));
}

#[tokio::test]
async fn push_delivers_the_round_and_approves_it() {
    let (app, mut received) = app_with_webhook(StatusCode::OK).await;
    four_people(&app).await;

    let (status, round) = call(&app, "POST", "/matches", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, pushed) = call(&app, "POST", "/matches/push", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        pushed,
        json!({"generation": 1, "pushed": 2, "history_updated": true})
    );
    assert_eq!(received.recv().await.unwrap(), round["records"]);

    let (_, latest) = call(&app, "GET", "/matches", None).await;
    assert_eq!(latest["approved"], true);
    let (_, history) = call(&app, "GET", "/history", None).await;
    assert_eq!(history.as_object().unwrap().len(), 4);

    // A second push redelivers but does not count the meetings twice.
    let (status, again) = call(&app, "POST", "/matches/push", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["history_updated"], false);
    assert_eq!(received.recv().await.unwrap(), round["records"]);
}

#[tokio::test]
async fn failed_push_leaves_the_round_pending() {
    let (app, mut received) = app_with_webhook(StatusCode::INTERNAL_SERVER_ERROR).await;
    four_people(&app).await;
    call(&app, "POST", "/matches", None).await;

    let (status, body) = call(&app, "POST", "/matches/push", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().starts_with("Webhook push failed"));
    assert!(received.recv().await.is_some());

    let (_, latest) = call(&app, "GET", "/matches", None).await;
    assert_eq!(latest["approved"], false);
    let (_, history) = call(&app, "GET", "/history", None).await;
    assert_eq!(history, json!({}));
}
