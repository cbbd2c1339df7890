#![allow(dead_code)]

use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use uuid::Uuid;
use warp::Filter;
use warp::Reply;
use warp::filters::BoxedFilter;

use room_core::lifecycle::CleanupPolicy;
use room_persistence::connection::connect_to_memory_database;
use room_persistence::entities::{host_transfers, prelude::*, rooms};
use room_persistence::repositories::{
    BackupRepository, OperationRepository, ParticipantRepository, RoomRepository,
    TransferRepository,
};
use room_server::auth::AuthService;
use room_server::lifecycle::RoomLifecycleManager;
use room_server::notify::testing::RecordingNotifier;
use room_server::recovery::RecoveryManager;
use room_server::sync::SyncCoordinator;
use room_server::transfer::HostTransferManager;
use room_server::{AppContext, create_routes};
use room_types::RoomSummary;

pub const CLEANUP_SECRET: &str = "test-secret";

pub struct TestApp {
    pub db: DatabaseConnection,
    pub ctx: Arc<AppContext>,
    pub rooms: Arc<RoomRepository>,
    pub participants: Arc<ParticipantRepository>,
    pub operations: Arc<OperationRepository>,
    pub backups: Arc<BackupRepository>,
    pub transfers: Arc<TransferRepository>,
    pub lifecycle: Arc<RoomLifecycleManager>,
    pub sync: Arc<SyncCoordinator>,
    pub recovery: Arc<RecoveryManager>,
    pub transfer: Arc<HostTransferManager>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    /// Owned, boxed route tree; `warp::test`'s `reply()` needs a
    /// `'static` filter, which borrowing `self` would not give it.
    pub fn routes(&self) -> BoxedFilter<(warp::reply::Response,)> {
        create_routes(self.ctx.clone())
            .map(Reply::into_response)
            .boxed()
    }
}

pub async fn spawn_app() -> TestApp {
    let db = connect_to_memory_database().await.unwrap();
    Migrator::up(&db, None).await.unwrap();

    let rooms = Arc::new(RoomRepository::new(db.clone()));
    let participants = Arc::new(ParticipantRepository::new(db.clone()));
    let operations = Arc::new(OperationRepository::new(db.clone()));
    let backups = Arc::new(BackupRepository::new(db.clone()));
    let transfers = Arc::new(TransferRepository::new(db.clone()));

    let notifier = Arc::new(RecordingNotifier::default());
    let lifecycle = Arc::new(RoomLifecycleManager::new(
        rooms.clone(),
        participants.clone(),
        notifier.clone(),
        CleanupPolicy::default(),
    ));
    let sync = Arc::new(SyncCoordinator::new(
        rooms.clone(),
        participants.clone(),
        operations.clone(),
    ));
    let recovery = Arc::new(RecoveryManager::new(
        rooms.clone(),
        participants.clone(),
        operations.clone(),
        backups.clone(),
        sync.clone(),
    ));
    let transfer = Arc::new(HostTransferManager::new(
        rooms.clone(),
        participants.clone(),
        transfers.clone(),
        notifier.clone(),
    ));

    let ctx = Arc::new(AppContext {
        lifecycle: lifecycle.clone(),
        sync: sync.clone(),
        recovery: recovery.clone(),
        transfer: transfer.clone(),
        auth: Arc::new(AuthService::new_dev_mode()),
        cleanup_secret: CLEANUP_SECRET.to_string(),
    });

    TestApp {
        db,
        ctx,
        rooms,
        participants,
        operations,
        backups,
        transfers,
        lifecycle,
        sync,
        recovery,
        transfer,
        notifier,
    }
}

pub fn bearer(user: Uuid) -> String {
    format!("Bearer {}", user)
}

pub fn premium_bearer(user: Uuid) -> String {
    format!("Bearer {}:premium", user)
}

/// Create a room over HTTP with `host` as the (premium) creator.
pub async fn create_room_http(app: &TestApp, host: Uuid) -> RoomSummary {
    let response = warp::test::request()
        .method("POST")
        .path("/rooms")
        .header("authorization", premium_bearer(host))
        .json(&serde_json::json!({ "max_players": 8, "is_private": false }))
        .reply(&app.routes())
        .await;
    assert_eq!(response.status(), 200, "create room failed: {:?}", response.body());
    serde_json::from_slice(response.body()).unwrap()
}

/// Join `user` over HTTP as a player.
pub async fn join_room_http(app: &TestApp, room_id: Uuid, user: Uuid) {
    let response = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/join", room_id))
        .header("authorization", bearer(user))
        .json(&serde_json::json!({}))
        .reply(&app.routes())
        .await;
    assert_eq!(response.status(), 200, "join failed: {:?}", response.body());
}

/// Move the room to ACTIVE as the host.
pub async fn activate_room_http(app: &TestApp, room_id: Uuid, host: Uuid) {
    let response = warp::test::request()
        .method("POST")
        .path(&format!("/rooms/{}/status", room_id))
        .header("authorization", bearer(host))
        .json(&serde_json::json!({ "status": "active", "reason": "start" }))
        .reply(&app.routes())
        .await;
    assert_eq!(response.status(), 200, "activate failed: {:?}", response.body());
}

/// Age a room's created/last-activity/updated timestamps by `days`.
pub async fn backdate_room(db: &DatabaseConnection, room_id: Uuid, days: i64) {
    let past: sea_orm::prelude::DateTimeWithTimeZone =
        (chrono::Utc::now() - chrono::Duration::days(days)).into();
    Rooms::update_many()
        .col_expr(rooms::Column::CreatedAt, Expr::value(past))
        .col_expr(rooms::Column::LastActivityAt, Expr::value(past))
        .col_expr(rooms::Column::UpdatedAt, Expr::value(past))
        .filter(rooms::Column::Id.eq(room_id))
        .exec(db)
        .await
        .unwrap();
}

/// Force a pending transfer to look expired.
pub async fn expire_transfer(db: &DatabaseConnection, transfer_id: Uuid) {
    let past: sea_orm::prelude::DateTimeWithTimeZone =
        (chrono::Utc::now() - chrono::Duration::minutes(1)).into();
    HostTransfers::update_many()
        .col_expr(host_transfers::Column::ExpiresAt, Expr::value(past))
        .filter(host_transfers::Column::Id.eq(transfer_id))
        .exec(db)
        .await
        .unwrap();
}
