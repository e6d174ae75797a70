use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{Value, json};

use lendpool::api;
use lendpool::engine::Engine;

fn test_server(name: &str) -> TestServer {
    let dir = std::env::temp_dir().join("lendpool_test_http");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    let engine = Arc::new(Engine::new(path).unwrap());
    TestServer::new(api::router(engine)).unwrap()
}

fn sharer(id: i64) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-sharer-user-id"),
        HeaderValue::from_str(&id.to_string()).unwrap(),
    )
}

async fn create_user(server: &TestServer, name: &str, email: &str) -> i64 {
    let res = server
        .post("/users")
        .json(&json!({ "name": name, "email": email }))
        .await;
    res.assert_status_ok();
    res.json::<Value>()["id"].as_i64().unwrap()
}

async fn create_item(server: &TestServer, owner: i64, name: &str, description: &str) -> i64 {
    let (h, v) = sharer(owner);
    let res = server
        .post("/items")
        .add_header(h, v)
        .json(&json!({ "name": name, "description": description, "available": true }))
        .await;
    res.assert_status_ok();
    res.json::<Value>()["id"].as_i64().unwrap()
}

#[tokio::test]
async fn user_crud_roundtrip() {
    let server = test_server("user_crud.wal");

    let id = create_user(&server, "alice", "alice@example.com").await;

    let res = server.get(&format!("/users/{id}")).await;
    res.assert_status_ok();
    assert_eq!(res.json::<Value>()["email"], "alice@example.com");

    let res = server
        .patch(&format!("/users/{id}"))
        .json(&json!({ "name": "alicia" }))
        .await;
    res.assert_status_ok();
    assert_eq!(res.json::<Value>()["name"], "alicia");

    let res = server.get("/users").await;
    res.assert_status_ok();
    assert_eq!(res.json::<Value>().as_array().unwrap().len(), 1);

    server.delete(&format!("/users/{id}")).await.assert_status_ok();
    let res = server.get(&format!("/users/{id}")).await;
    res.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_email_is_conflict() {
    let server = test_server("user_conflict.wal");
    create_user(&server, "alice", "alice@example.com").await;

    let res = server
        .post("/users")
        .json(&json!({ "name": "clone", "email": "alice@example.com" }))
        .await;
    res.assert_status(StatusCode::CONFLICT);
    let body = res.json::<Value>();
    assert_eq!(body["error"], "Conflict");
}

#[tokio::test]
async fn malformed_user_payload_is_bad_request() {
    let server = test_server("user_invalid.wal");

    // Name below the minimum length.
    let res = server
        .post("/users")
        .json(&json!({ "name": "al", "email": "al@example.com" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);

    // Email without an @.
    let res = server
        .post("/users")
        .json(&json!({ "name": "alice", "email": "not-an-address" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn error_body_carries_error_and_description() {
    let server = test_server("error_shape.wal");
    let res = server.get("/users/42").await;
    res.assert_status(StatusCode::NOT_FOUND);
    let body = res.json::<Value>();
    assert_eq!(body["error"], "Not Found");
    assert!(body["description"].as_str().unwrap().contains("42"));
}

#[tokio::test]
async fn missing_or_malformed_identity_header_is_bad_request() {
    let server = test_server("header_missing.wal");

    let res = server
        .post("/bookings")
        .json(&json!({ "itemId": 1, "start": "2030-05-01T10:00:00", "end": "2030-05-01T12:00:00" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);

    let (h, _) = sharer(1);
    let res = server
        .post("/bookings")
        .add_header(h, HeaderValue::from_static("zero"))
        .json(&json!({ "itemId": 1, "start": "2030-05-01T10:00:00", "end": "2030-05-01T12:00:00" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn booking_lifecycle_over_http() {
    let server = test_server("booking_flow.wal");
    let owner = create_user(&server, "owner", "owner@example.com").await;
    let renter = create_user(&server, "renter", "renter@example.com").await;
    let item = create_item(&server, owner, "cordless drill", "18V, two batteries").await;

    // Create: 201, WAITING, resolved item and booker.
    let (h, v) = sharer(renter);
    let res = server
        .post("/bookings")
        .add_header(h, v)
        .json(&json!({
            "itemId": item,
            "start": "2030-05-01T10:00:00",
            "end": "2030-05-01T12:00:00",
        }))
        .await;
    res.assert_status(StatusCode::CREATED);
    let booking = res.json::<Value>();
    assert_eq!(booking["status"], "WAITING");
    assert_eq!(booking["item"]["name"], "cordless drill");
    assert_eq!(booking["booker"]["email"], "renter@example.com");
    let booking_id = booking["id"].as_i64().unwrap();

    // Overlapping window: 409 Conflict.
    let (h, v) = sharer(renter);
    let res = server
        .post("/bookings")
        .add_header(h, v)
        .json(&json!({
            "itemId": item,
            "start": "2030-05-01T11:00:00",
            "end": "2030-05-01T13:00:00",
        }))
        .await;
    res.assert_status(StatusCode::CONFLICT);

    // Touching the boundary: fine.
    let (h, v) = sharer(renter);
    let res = server
        .post("/bookings")
        .add_header(h, v)
        .json(&json!({
            "itemId": item,
            "start": "2030-05-01T12:00:00",
            "end": "2030-05-01T13:00:00",
        }))
        .await;
    res.assert_status(StatusCode::CREATED);

    // The renter may not decide.
    let (h, v) = sharer(renter);
    let res = server
        .patch(&format!("/bookings/{booking_id}?approved=true"))
        .add_header(h, v)
        .await;
    res.assert_status(StatusCode::FORBIDDEN);

    // The owner approves.
    let (h, v) = sharer(owner);
    let res = server
        .patch(&format!("/bookings/{booking_id}?approved=true"))
        .add_header(h, v)
        .await;
    res.assert_status_ok();
    assert_eq!(res.json::<Value>()["status"], "APPROVED");

    // A second decision always fails.
    let (h, v) = sharer(owner);
    let res = server
        .patch(&format!("/bookings/{booking_id}?approved=false"))
        .add_header(h, v)
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn booking_times_echo_iso_8601() {
    let server = test_server("booking_iso.wal");
    let owner = create_user(&server, "owner", "owner@example.com").await;
    let renter = create_user(&server, "renter", "renter@example.com").await;
    let item = create_item(&server, owner, "cordless drill", "18V, two batteries").await;

    let (h, v) = sharer(renter);
    let res = server
        .post("/bookings")
        .add_header(h, v)
        .json(&json!({
            "itemId": item,
            "start": "2030-05-01T10:00:00",
            "end": "2030-05-01T12:30:00",
        }))
        .await;
    res.assert_status(StatusCode::CREATED);
    let body = res.json::<Value>();
    assert_eq!(body["start"], "2030-05-01T10:00:00");
    assert_eq!(body["end"], "2030-05-01T12:30:00");
}

#[tokio::test]
async fn booking_visibility_and_repeat_reads() {
    let server = test_server("booking_visibility.wal");
    let owner = create_user(&server, "owner", "owner@example.com").await;
    let renter = create_user(&server, "renter", "renter@example.com").await;
    let stranger = create_user(&server, "stranger", "stranger@example.com").await;
    let item = create_item(&server, owner, "cordless drill", "18V, two batteries").await;

    let (h, v) = sharer(renter);
    let res = server
        .post("/bookings")
        .add_header(h, v)
        .json(&json!({
            "itemId": item,
            "start": "2030-05-01T10:00:00",
            "end": "2030-05-01T12:00:00",
        }))
        .await;
    let booking_id = res.json::<Value>()["id"].as_i64().unwrap();

    for viewer in [renter, owner] {
        let (h, v) = sharer(viewer);
        let res = server
            .get(&format!("/bookings/{booking_id}"))
            .add_header(h, v)
            .await;
        res.assert_status_ok();
    }

    let (h, v) = sharer(stranger);
    let res = server
        .get(&format!("/bookings/{booking_id}"))
        .add_header(h, v)
        .await;
    res.assert_status(StatusCode::FORBIDDEN);

    // Reads are side-effect-free: two identical calls, identical bodies.
    let (h1, v1) = sharer(renter);
    let first = server
        .get(&format!("/bookings/{booking_id}"))
        .add_header(h1, v1)
        .await
        .json::<Value>();
    let (h2, v2) = sharer(renter);
    let second = server
        .get(&format!("/bookings/{booking_id}"))
        .add_header(h2, v2)
        .await
        .json::<Value>();
    assert_eq!(first, second);
}

#[tokio::test]
async fn booking_listings_filter_by_state() {
    let server = test_server("booking_listings.wal");
    let owner = create_user(&server, "owner", "owner@example.com").await;
    let renter = create_user(&server, "renter", "renter@example.com").await;
    let item = create_item(&server, owner, "cordless drill", "18V, two batteries").await;

    let (h, v) = sharer(renter);
    let res = server
        .post("/bookings")
        .add_header(h, v)
        .json(&json!({
            "itemId": item,
            "start": "2030-05-01T10:00:00",
            "end": "2030-05-01T12:00:00",
        }))
        .await;
    let booking_id = res.json::<Value>()["id"].as_i64().unwrap();

    // Default state is ALL.
    let (h, v) = sharer(renter);
    let res = server.get("/bookings").add_header(h, v).await;
    res.assert_status_ok();
    assert_eq!(res.json::<Value>().as_array().unwrap().len(), 1);

    let (h, v) = sharer(renter);
    let res = server
        .get("/bookings")
        .add_query_param("state", "WAITING")
        .add_header(h, v)
        .await;
    assert_eq!(res.json::<Value>().as_array().unwrap().len(), 1);

    let (h, v) = sharer(renter);
    let res = server
        .get("/bookings")
        .add_query_param("state", "REJECTED")
        .add_header(h, v)
        .await;
    assert_eq!(res.json::<Value>().as_array().unwrap().len(), 0);

    // Owner-side listing sees the same booking.
    let (h, v) = sharer(owner);
    let res = server.get("/bookings/owner").add_header(h, v).await;
    res.assert_status_ok();
    let listed = res.json::<Value>();
    assert_eq!(listed[0]["id"].as_i64().unwrap(), booking_id);

    // An unrecognized filter is an error, not ALL.
    let (h, v) = sharer(renter);
    let res = server
        .get("/bookings")
        .add_query_param("state", "SOMEDAY")
        .add_header(h, v)
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn comment_requires_completed_stay() {
    let server = test_server("comment_flow.wal");
    let owner = create_user(&server, "owner", "owner@example.com").await;
    let renter = create_user(&server, "renter", "renter@example.com").await;
    let item = create_item(&server, owner, "cordless drill", "18V, two batteries").await;

    // No booking yet: not eligible.
    let (h, v) = sharer(renter);
    let res = server
        .post(&format!("/items/{item}/comment"))
        .add_header(h, v)
        .json(&json!({ "text": "great drill" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);

    // A past stay, approved by the owner.
    let (h, v) = sharer(renter);
    let res = server
        .post("/bookings")
        .add_header(h, v)
        .json(&json!({
            "itemId": item,
            "start": "2020-01-01T10:00:00",
            "end": "2020-01-01T12:00:00",
        }))
        .await;
    res.assert_status(StatusCode::CREATED);
    let booking_id = res.json::<Value>()["id"].as_i64().unwrap();

    let (h, v) = sharer(owner);
    server
        .patch(&format!("/bookings/{booking_id}?approved=true"))
        .add_header(h, v)
        .await
        .assert_status_ok();

    // The same comment call now succeeds.
    let (h, v) = sharer(renter);
    let res = server
        .post(&format!("/items/{item}/comment"))
        .add_header(h, v)
        .json(&json!({ "text": "great drill" }))
        .await;
    res.assert_status(StatusCode::CREATED);
    let comment = res.json::<Value>();
    assert_eq!(comment["authorName"], "renter");

    // And the item view carries it.
    let (h, v) = sharer(renter);
    let res = server.get(&format!("/items/{item}")).add_header(h, v).await;
    res.assert_status_ok();
    let view = res.json::<Value>();
    assert_eq!(view["comments"][0]["text"], "great drill");
}

#[tokio::test]
async fn comment_text_bounds_checked_at_boundary() {
    let server = test_server("comment_bounds.wal");
    let owner = create_user(&server, "owner", "owner@example.com").await;
    let renter = create_user(&server, "renter", "renter@example.com").await;
    let item = create_item(&server, owner, "cordless drill", "18V, two batteries").await;

    let (h, v) = sharer(renter);
    let res = server
        .post(&format!("/items/{item}/comment"))
        .add_header(h, v)
        .json(&json!({ "text": "ok" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);

    let (h, v) = sharer(renter);
    let res = server
        .post(&format!("/items/{item}/comment"))
        .add_header(h, v)
        .json(&json!({ "text": "   " }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn item_search_over_http() {
    let server = test_server("item_search.wal");
    let owner = create_user(&server, "owner", "owner@example.com").await;
    create_item(&server, owner, "cordless drill", "18V, two batteries").await;
    create_item(&server, owner, "step ladder", "3m aluminium").await;

    let (h, v) = sharer(owner);
    let res = server
        .get("/items/search")
        .add_query_param("text", "DRILL")
        .add_header(h, v)
        .await;
    res.assert_status_ok();
    let found = res.json::<Value>();
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["name"], "cordless drill");

    let (h, v) = sharer(owner);
    let res = server.get("/items/search").add_header(h, v).await;
    res.assert_status_ok();
    assert_eq!(res.json::<Value>().as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn request_board_over_http() {
    let server = test_server("request_board.wal");
    let alice = create_user(&server, "alice", "alice@example.com").await;
    let bobby = create_user(&server, "bobby", "bobby@example.com").await;

    let (h, v) = sharer(alice);
    let res = server
        .post("/requests")
        .add_header(h, v)
        .json(&json!({ "description": "need a tall ladder" }))
        .await;
    res.assert_status_ok();
    let request_id = res.json::<Value>()["id"].as_i64().unwrap();

    // Bobby fulfills it; the request view lists his item.
    let (h, v) = sharer(bobby);
    let res = server
        .post("/items")
        .add_header(h, v)
        .json(&json!({
            "name": "step ladder",
            "description": "3m aluminium",
            "available": true,
            "requestId": request_id,
        }))
        .await;
    res.assert_status_ok();

    let (h, v) = sharer(alice);
    let res = server
        .get(&format!("/requests/{request_id}"))
        .add_header(h, v)
        .await;
    res.assert_status_ok();
    let view = res.json::<Value>();
    assert_eq!(view["items"][0]["name"], "step ladder");

    // Own vs. others' listings.
    let (h, v) = sharer(alice);
    let res = server.get("/requests").add_header(h, v).await;
    assert_eq!(res.json::<Value>().as_array().unwrap().len(), 1);

    let (h, v) = sharer(bobby);
    let res = server.get("/requests").add_header(h, v).await;
    assert_eq!(res.json::<Value>().as_array().unwrap().len(), 0);

    let (h, v) = sharer(bobby);
    let res = server.get("/requests/all").add_header(h, v).await;
    assert_eq!(res.json::<Value>().as_array().unwrap().len(), 1);

    let (h, v) = sharer(alice);
    let res = server.get("/requests/99").add_header(h, v).await;
    res.assert_status(StatusCode::NOT_FOUND);
}
