mod test_helpers;

use test_helpers::*;
use uuid::Uuid;

use room_types::{
    ConnectionStatus, HostTransferInfo, ParticipantRole, TransferState, TransferStatus,
};

async fn transfer_post(
    app: &TestApp,
    room_id: Uuid,
    user: Uuid,
    body: serde_json::Value,
) -> (u16, serde_json::Value) {
    let response = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/transfer", room_id))
        .header("authorization", bearer(user))
        .json(&body)
        .reply(&app.routes())
        .await;
    let parsed = serde_json::from_slice(response.body()).unwrap_or(serde_json::Value::Null);
    (response.status().as_u16(), parsed)
}

async fn initiate(app: &TestApp, room_id: Uuid, from: Uuid, to: Uuid) -> (u16, serde_json::Value) {
    transfer_post(
        app,
        room_id,
        from,
        serde_json::json!({ "action": "initiate", "target_user_id": to }),
    )
    .await
}

async fn transfer_state(app: &TestApp, room_id: Uuid) -> TransferState {
    let response = warp::test::request()
        .method("GET")
        .path(&format!("/rooms/{}/transfer", room_id))
        .reply(&app.routes())
        .await;
    assert_eq!(response.status(), 200);
    serde_json::from_slice(response.body()).unwrap()
}

async fn seated_room(app: &TestApp) -> (Uuid, Uuid, Uuid) {
    let host = Uuid::new_v4();
    let player = Uuid::new_v4();
    let room = create_room_http(app, host).await;
    join_room_http(app, room.id, player).await;
    (room.id, host, player)
}

#[tokio::test]
async fn test_initiate_validations() {
    let app = spawn_app().await;
    let (room_id, host, player) = seated_room(&app).await;

    // Only the host may offer the seat.
    let (status, _) = initiate(&app, room_id, player, host).await;
    assert_eq!(status, 403);

    // Not to themselves.
    let (status, _) = initiate(&app, room_id, host, host).await;
    assert_eq!(status, 400);

    // Not to a stranger.
    let (status, _) = initiate(&app, room_id, host, Uuid::new_v4()).await;
    assert_eq!(status, 400);

    // Not to a disconnected participant.
    app.participants
        .set_connection(room_id, player, ConnectionStatus::Disconnected)
        .await
        .unwrap();
    let (status, _) = initiate(&app, room_id, host, player).await;
    assert_eq!(status, 400);

    app.participants
        .set_connection(room_id, player, ConnectionStatus::Connected)
        .await
        .unwrap();
    let (status, body) = initiate(&app, room_id, host, player).await;
    assert_eq!(status, 200);
    let info: HostTransferInfo = serde_json::from_value(body).unwrap();
    assert_eq!(info.status, TransferStatus::Pending);
    assert_eq!(info.from_user_id, host);
    assert_eq!(info.to_user_id, player);

    let sent = app.notifier.sent.lock().unwrap();
    assert!(sent
        .iter()
        .any(|(user, title, _)| *user == player && title == "Host Transfer Offered"));
}

#[tokio::test]
async fn test_second_pending_transfer_is_rejected() {
    let app = spawn_app().await;
    let (room_id, host, player) = seated_room(&app).await;
    let second = Uuid::new_v4();
    join_room_http(&app, room_id, second).await;

    let (status, _) = initiate(&app, room_id, host, player).await;
    assert_eq!(status, 200);
    let (status, _) = initiate(&app, room_id, host, second).await;
    assert_eq!(status, 409);
}

#[tokio::test]
async fn test_accept_swaps_host_and_roles() {
    let app = spawn_app().await;
    let (room_id, host, player) = seated_room(&app).await;
    initiate(&app, room_id, host, player).await;

    // Only the target can confirm.
    let (status, _) =
        transfer_post(&app, room_id, host, serde_json::json!({ "action": "confirm" })).await;
    assert_eq!(status, 403);

    let (status, body) =
        transfer_post(&app, room_id, player, serde_json::json!({ "action": "confirm" })).await;
    assert_eq!(status, 200);
    let info: HostTransferInfo = serde_json::from_value(body).unwrap();
    assert_eq!(info.status, TransferStatus::Completed);
    assert!(info.resolved_at.is_some());

    let room = app.rooms.find_by_id(room_id).await.unwrap().unwrap();
    assert_eq!(room.host_user_id, player);
    let new_host = app.participants.find(room_id, player).await.unwrap().unwrap();
    assert_eq!(new_host.role, ParticipantRole::Host.as_str());
    let old_host = app.participants.find(room_id, host).await.unwrap().unwrap();
    assert_eq!(old_host.role, ParticipantRole::Player.as_str());

    let sent = app.notifier.sent.lock().unwrap();
    assert!(sent
        .iter()
        .any(|(user, title, _)| *user == host && title == "Host Transfer Completed"));
}

#[tokio::test]
async fn test_decline_leaves_host_in_place() {
    let app = spawn_app().await;
    let (room_id, host, player) = seated_room(&app).await;
    initiate(&app, room_id, host, player).await;

    let (status, body) = transfer_post(
        &app,
        room_id,
        player,
        serde_json::json!({ "action": "confirm", "accept": false }),
    )
    .await;
    assert_eq!(status, 200);
    let info: HostTransferInfo = serde_json::from_value(body).unwrap();
    assert_eq!(info.status, TransferStatus::Cancelled);

    let room = app.rooms.find_by_id(room_id).await.unwrap().unwrap();
    assert_eq!(room.host_user_id, host);

    // The room is free for a fresh offer.
    let (status, _) = initiate(&app, room_id, host, player).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_cancel_is_limited_to_the_parties() {
    let app = spawn_app().await;
    let (room_id, host, player) = seated_room(&app).await;
    let bystander = Uuid::new_v4();
    join_room_http(&app, room_id, bystander).await;
    initiate(&app, room_id, host, player).await;

    let (status, _) =
        transfer_post(&app, room_id, bystander, serde_json::json!({ "action": "cancel" })).await;
    assert_eq!(status, 403);

    let (status, body) =
        transfer_post(&app, room_id, host, serde_json::json!({ "action": "cancel" })).await;
    assert_eq!(status, 200);
    let info: HostTransferInfo = serde_json::from_value(body).unwrap();
    assert_eq!(info.status, TransferStatus::Cancelled);

    // Nothing left to cancel.
    let (status, _) =
        transfer_post(&app, room_id, host, serde_json::json!({ "action": "cancel" })).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_expired_offer_cannot_be_accepted() {
    let app = spawn_app().await;
    let (room_id, host, player) = seated_room(&app).await;
    let (_, body) = initiate(&app, room_id, host, player).await;
    let info: HostTransferInfo = serde_json::from_value(body).unwrap();

    expire_transfer(&app.db, info.id).await;

    let (status, _) =
        transfer_post(&app, room_id, player, serde_json::json!({ "action": "confirm" })).await;
    assert_eq!(status, 410);

    // The stale offer was swept into the history as cancelled.
    let state = transfer_state(&app, room_id).await;
    assert!(state.pending.is_none());
    assert_eq!(state.history[0].status, TransferStatus::Cancelled);

    let room = app.rooms.find_by_id(room_id).await.unwrap().unwrap();
    assert_eq!(room.host_user_id, host);
}

#[tokio::test]
async fn test_state_reports_pending_and_history() {
    let app = spawn_app().await;
    let (room_id, host, player) = seated_room(&app).await;

    let state = transfer_state(&app, room_id).await;
    assert!(state.pending.is_none());
    assert!(state.history.is_empty());

    initiate(&app, room_id, host, player).await;
    let state = transfer_state(&app, room_id).await;
    assert_eq!(
        state.pending.as_ref().map(|p| p.to_user_id),
        Some(player)
    );

    transfer_post(&app, room_id, player, serde_json::json!({ "action": "confirm" })).await;
    let state = transfer_state(&app, room_id).await;
    assert!(state.pending.is_none());
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].status, TransferStatus::Completed);
}
