mod test_helpers;

use test_helpers::*;
use uuid::Uuid;

use room_types::{CleanupReport, RoomStatus, RoomSummary};

#[tokio::test]
async fn test_create_room_requires_premium() {
    let app = spawn_app().await;

    let response = warp::test::request()
        .method("POST")
        .path("/rooms")
        .header("authorization", bearer(Uuid::new_v4()))
        .json(&serde_json::json!({ "max_players": 8 }))
        .reply(&app.routes())
        .await;

    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_create_and_get_room() {
    let app = spawn_app().await;
    let host = Uuid::new_v4();

    let summary = create_room_http(&app, host).await;
    assert_eq!(summary.status, RoomStatus::Waiting);
    assert_eq!(summary.host_user_id, host);
    assert_eq!(summary.version, 0);
    assert_eq!(summary.participant_count, 1);
    assert_eq!(summary.code.len(), 6);

    let response = warp::test::request()
        .method("GET")
        .path(&format!("/rooms/{}", summary.id))
        .reply(&app.routes())
        .await;
    assert_eq!(response.status(), 200);
    let fetched: RoomSummary = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(fetched.id, summary.id);
}

#[tokio::test]
async fn test_join_is_idempotent_and_respects_capacity() {
    let app = spawn_app().await;
    let host = Uuid::new_v4();

    let response = warp::test::request()
        .method("POST")
        .path("/rooms")
        .header("authorization", premium_bearer(host))
        .json(&serde_json::json!({ "max_players": 2 }))
        .reply(&app.routes())
        .await;
    let room: RoomSummary = serde_json::from_slice(response.body()).unwrap();

    let player = Uuid::new_v4();
    join_room_http(&app, room.id, player).await;
    // Rejoining the same seat is a presence update, not a second seat.
    join_room_http(&app, room.id, player).await;
    assert_eq!(app.participants.count(room.id).await.unwrap(), 2);

    let response = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/join", room.id))
        .header("authorization", bearer(Uuid::new_v4()))
        .json(&serde_json::json!({}))
        .reply(&app.routes())
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_password_protected_join() {
    let app = spawn_app().await;
    let host = Uuid::new_v4();

    let response = warp::test::request()
        .method("POST")
        .path("/rooms")
        .header("authorization", premium_bearer(host))
        .json(&serde_json::json!({ "max_players": 8, "password": "sesame" }))
        .reply(&app.routes())
        .await;
    let room: RoomSummary = serde_json::from_slice(response.body()).unwrap();
    assert!(room.has_password);

    let player = Uuid::new_v4();
    let wrong = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/join", room.id))
        .header("authorization", bearer(player))
        .json(&serde_json::json!({ "password": "open" }))
        .reply(&app.routes())
        .await;
    assert_eq!(wrong.status(), 403);

    let right = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/join", room.id))
        .header("authorization", bearer(player))
        .json(&serde_json::json!({ "password": "sesame" }))
        .reply(&app.routes())
        .await;
    assert_eq!(right.status(), 200);
}

#[tokio::test]
async fn test_status_transitions_over_http() {
    let app = spawn_app().await;
    let host = Uuid::new_v4();
    let room = create_room_http(&app, host).await;

    activate_room_http(&app, room.id, host).await;

    // A player cannot complete the session.
    let player = Uuid::new_v4();
    join_room_http(&app, room.id, player).await;
    let forbidden = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/status", room.id))
        .header("authorization", bearer(player))
        .json(&serde_json::json!({ "status": "completed" }))
        .reply(&app.routes())
        .await;
    assert_eq!(forbidden.status(), 403);

    let done = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/status", room.id))
        .header("authorization", bearer(host))
        .json(&serde_json::json!({ "status": "completed" }))
        .reply(&app.routes())
        .await;
    assert_eq!(done.status(), 200);
    let summary: RoomSummary = serde_json::from_slice(done.body()).unwrap();
    assert_eq!(summary.status, RoomStatus::Completed);
    assert!(summary.completed_at.is_some());

    // COMPLETED -> ACTIVE is not an edge.
    let invalid = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/status", room.id))
        .header("authorization", bearer(host))
        .json(&serde_json::json!({ "status": "active" }))
        .reply(&app.routes())
        .await;
    assert_eq!(invalid.status(), 400);
}

#[tokio::test]
async fn test_transition_notifies_other_participants() {
    let app = spawn_app().await;
    let host = Uuid::new_v4();
    let room = create_room_http(&app, host).await;
    let player = Uuid::new_v4();
    join_room_http(&app, room.id, player).await;

    activate_room_http(&app, room.id, host).await;

    let sent = app.notifier.sent.lock().unwrap();
    assert!(sent
        .iter()
        .any(|(user, title, _)| *user == player && title == "Session Started"));
    // The actor is never notified about their own change.
    assert!(!sent.iter().any(|(user, _, _)| *user == host));
}

#[tokio::test]
async fn test_cleanup_expires_aged_rooms() {
    let app = spawn_app().await;
    let host = Uuid::new_v4();
    let room = create_room_http(&app, host).await;
    backdate_room(&app.db, room.id, 8).await;

    let report = app.lifecycle.run_cleanup().await.unwrap();
    assert_eq!(report.expired_rooms, 1);
    assert_eq!(report.deleted_rooms, 0);

    let model = app.rooms.find_by_id(room.id).await.unwrap().unwrap();
    assert_eq!(model.status, "expired");

    // Re-running the sweep is a no-op.
    let report = app.lifecycle.run_cleanup().await.unwrap();
    assert_eq!(report.expired_rooms, 0);
}

#[tokio::test]
async fn test_cleanup_expires_completed_rooms() {
    let app = spawn_app().await;
    let host = Uuid::new_v4();
    let room = create_room_http(&app, host).await;
    activate_room_http(&app, room.id, host).await;

    let done = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/status", room.id))
        .header("authorization", bearer(host))
        .json(&serde_json::json!({ "status": "completed" }))
        .reply(&app.routes())
        .await;
    assert_eq!(done.status(), 200);

    // A finished room still ages out and reaches the retention delete.
    backdate_room(&app.db, room.id, 60).await;
    let report = app.lifecycle.run_cleanup().await.unwrap();
    assert_eq!(report.expired_rooms, 1);

    let model = app.rooms.find_by_id(room.id).await.unwrap().unwrap();
    assert_eq!(model.status, "expired");

    backdate_room(&app.db, room.id, 60).await;
    let report = app.lifecycle.run_cleanup().await.unwrap();
    assert_eq!(report.deleted_rooms, 1);
    assert!(app.rooms.find_by_id(room.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_host_cannot_abandon_a_populated_room() {
    let app = spawn_app().await;
    let host = Uuid::new_v4();
    let room = create_room_http(&app, host).await;
    let player = Uuid::new_v4();
    join_room_http(&app, room.id, player).await;

    let blocked = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/leave", room.id))
        .header("authorization", bearer(host))
        .reply(&app.routes())
        .await;
    assert_eq!(blocked.status(), 400);
    assert_eq!(app.participants.count(room.id).await.unwrap(), 2);

    // Once the others are gone the host may close the door behind them.
    let player_leave = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/leave", room.id))
        .header("authorization", bearer(player))
        .reply(&app.routes())
        .await;
    assert_eq!(player_leave.status(), 200);

    let host_leave = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/leave", room.id))
        .header("authorization", bearer(host))
        .reply(&app.routes())
        .await;
    assert_eq!(host_leave.status(), 200);
    assert_eq!(app.participants.count(room.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cleanup_expires_empty_rooms() {
    let app = spawn_app().await;
    let host = Uuid::new_v4();
    let room = create_room_http(&app, host).await;

    let leave = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/leave", room.id))
        .header("authorization", bearer(host))
        .reply(&app.routes())
        .await;
    assert_eq!(leave.status(), 200);

    let report = app.lifecycle.run_cleanup().await.unwrap();
    assert_eq!(report.empty_rooms_expired, 1);
}

#[tokio::test]
async fn test_cleanup_hard_deletes_past_retention() {
    let app = spawn_app().await;
    let host = Uuid::new_v4();
    let room = create_room_http(&app, host).await;

    app.lifecycle
        .transition_room_status(room.id, RoomStatus::Waiting, RoomStatus::Expired, Some("test"), None)
        .await
        .unwrap();
    backdate_room(&app.db, room.id, 31).await;

    let report = app.lifecycle.run_cleanup().await.unwrap();
    assert_eq!(report.deleted_rooms, 1);
    assert!(app.rooms.find_by_id(room.id).await.unwrap().is_none());
    assert_eq!(app.participants.count(room.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cleanup_endpoint_requires_secret() {
    let app = spawn_app().await;

    let denied = warp::test::request()
        .method("POST")
        .path("/internal/cleanup")
        .reply(&app.routes())
        .await;
    assert_eq!(denied.status(), 403);

    let allowed = warp::test::request()
        .method("POST")
        .path("/internal/cleanup")
        .header("x-cleanup-secret", CLEANUP_SECRET)
        .reply(&app.routes())
        .await;
    assert_eq!(allowed.status(), 200);
    let report: CleanupReport = serde_json::from_slice(allowed.body()).unwrap();
    assert_eq!(report.expired_rooms, 0);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = spawn_app().await;
    let response = warp::test::request()
        .method("GET")
        .path("/health")
        .reply(&app.routes())
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.body(), "OK");
}
