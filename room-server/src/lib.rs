use std::sync::Arc;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;
use warp::Filter;
use warp::http::StatusCode;

use room_types::{
    CreateRoomRequest, JoinRoomRequest, RecoveryAction, RecoveryRequest, ResolveRequest,
    StatusChangeRequest, SyncError, SyncRequest, SyncResult, TransferAction, TransferRequest,
};

use crate::auth::{AuthService, AuthUser};
use crate::lifecycle::RoomLifecycleManager;
use crate::recovery::RecoveryManager;
use crate::sync::SyncCoordinator;
use crate::transfer::HostTransferManager;

pub mod auth;
pub mod config;
pub mod lifecycle;
pub mod notify;
pub mod recovery;
pub mod sync;
pub mod transfer;

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Everything the HTTP layer needs, shared across routes.
pub struct AppContext {
    pub lifecycle: Arc<RoomLifecycleManager>,
    pub sync: Arc<SyncCoordinator>,
    pub recovery: Arc<RecoveryManager>,
    pub transfer: Arc<HostTransferManager>,
    pub auth: Arc<AuthService>,
    pub cleanup_secret: String,
}

#[derive(Deserialize)]
struct OperationsQuery {
    since: Option<i64>,
}

pub fn create_routes(
    ctx: Arc<AppContext>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_ctx = warp::any().map({
        let ctx = ctx.clone();
        move || ctx.clone()
    });
    let auth_header = warp::header::optional::<String>("authorization");

    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    let create_room = warp::path!("rooms")
        .and(warp::post())
        .and(auth_header)
        .and(warp::body::json())
        .and(with_ctx.clone())
        .and_then(handle_create_room);

    let get_room = warp::path!("rooms" / Uuid)
        .and(warp::get())
        .and(with_ctx.clone())
        .and_then(handle_get_room);

    let join_room = warp::path!("rooms" / Uuid / "join")
        .and(warp::post())
        .and(auth_header)
        .and(warp::body::json())
        .and(with_ctx.clone())
        .and_then(handle_join_room);

    let leave_room = warp::path!("rooms" / Uuid / "leave")
        .and(warp::post())
        .and(auth_header)
        .and(with_ctx.clone())
        .and_then(handle_leave_room);

    let status_room = warp::path!("rooms" / Uuid / "status")
        .and(warp::post())
        .and(auth_header)
        .and(warp::body::json())
        .and(with_ctx.clone())
        .and_then(handle_status_change);

    let sync_room = warp::path!("rooms" / Uuid / "sync")
        .and(warp::post())
        .and(auth_header)
        .and(warp::body::json())
        .and(with_ctx.clone())
        .and_then(handle_sync);

    let operations = warp::path!("rooms" / Uuid / "operations")
        .and(warp::get())
        .and(warp::query::<OperationsQuery>())
        .and(with_ctx.clone())
        .and_then(handle_operations);

    let resolve = warp::path!("rooms" / Uuid / "resolve")
        .and(warp::post())
        .and(auth_header)
        .and(warp::body::json())
        .and(with_ctx.clone())
        .and_then(handle_resolve);

    let recovery_get = warp::path!("rooms" / Uuid / "recovery")
        .and(warp::get())
        .and(auth_header)
        .and(with_ctx.clone())
        .and_then(handle_recovery_state);

    let recovery_post = warp::path!("rooms" / Uuid / "recovery")
        .and(warp::post())
        .and(auth_header)
        .and(warp::body::json())
        .and(with_ctx.clone())
        .and_then(handle_recovery_action);

    let versions = warp::path!("rooms" / Uuid / "versions")
        .and(warp::get())
        .and(with_ctx.clone())
        .and_then(handle_versions);

    let transfer_get = warp::path!("rooms" / Uuid / "transfer")
        .and(warp::get())
        .and(with_ctx.clone())
        .and_then(handle_transfer_state);

    let transfer_post = warp::path!("rooms" / Uuid / "transfer")
        .and(warp::post())
        .and(auth_header)
        .and(warp::body::json())
        .and(with_ctx.clone())
        .and_then(handle_transfer_action);

    let cleanup = warp::path!("internal" / "cleanup")
        .and(warp::post())
        .and(warp::header::optional::<String>("x-cleanup-secret"))
        .and(with_ctx.clone())
        .and_then(handle_cleanup);

    let stats = warp::path!("internal" / "stats")
        .and(warp::get())
        .and(warp::header::optional::<String>("x-cleanup-secret"))
        .and(with_ctx.clone())
        .and_then(handle_stats);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization"])
        .allow_methods(vec!["GET", "POST"]);

    health
        .or(create_room)
        .or(join_room)
        .or(leave_room)
        .or(status_room)
        .or(sync_room)
        .or(operations)
        .or(resolve)
        .or(recovery_get)
        .or(recovery_post)
        .or(versions)
        .or(transfer_get)
        .or(transfer_post)
        .or(get_room)
        .or(cleanup)
        .or(stats)
        .with(cors)
        .with(warp::log("room_server"))
}

fn authenticate(ctx: &AppContext, header: Option<String>) -> SyncResult<AuthUser> {
    let header = header.ok_or_else(|| SyncError::authorization("authentication required"))?;
    let token = header.strip_prefix("Bearer ").unwrap_or(&header);
    ctx.auth
        .validate_token(token)
        .map_err(|_| SyncError::authorization("invalid authentication token"))
}

fn status_for(err: &SyncError) -> StatusCode {
    match err {
        SyncError::Validation(_) => StatusCode::BAD_REQUEST,
        SyncError::Authorization(_) => StatusCode::FORBIDDEN,
        SyncError::NotFound(_) => StatusCode::NOT_FOUND,
        SyncError::Conflict(_) => StatusCode::CONFLICT,
        SyncError::Expired(_) => StatusCode::GONE,
        SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply_result<T: serde::Serialize>(
    result: SyncResult<T>,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, warp::Rejection> {
    match result {
        Ok(value) => Ok(warp::reply::with_status(
            warp::reply::json(&value),
            StatusCode::OK,
        )),
        Err(err) => {
            if matches!(err, SyncError::Internal(_)) {
                tracing::error!("request failed: {}", err);
            }
            Ok(warp::reply::with_status(
                warp::reply::json(&serde_json::json!({ "error": err.to_string() })),
                status_for(&err),
            ))
        }
    }
}

async fn handle_create_room(
    auth_header: Option<String>,
    request: CreateRoomRequest,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = async {
        let user = authenticate(&ctx, auth_header)?;
        ctx.lifecycle.create_room(&user, &request).await
    }
    .await;
    reply_result(result)
}

async fn handle_get_room(
    room_id: Uuid,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    reply_result(ctx.lifecycle.get_room(room_id).await)
}

async fn handle_join_room(
    room_id: Uuid,
    auth_header: Option<String>,
    request: JoinRoomRequest,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = async {
        let user = authenticate(&ctx, auth_header)?;
        ctx.lifecycle.join_room(room_id, &user, &request).await
    }
    .await;
    reply_result(result)
}

async fn handle_leave_room(
    room_id: Uuid,
    auth_header: Option<String>,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = async {
        let user = authenticate(&ctx, auth_header)?;
        ctx.lifecycle.leave_room(room_id, &user).await?;
        Ok(serde_json::json!({ "left": true }))
    }
    .await;
    reply_result(result)
}

async fn handle_status_change(
    room_id: Uuid,
    auth_header: Option<String>,
    request: StatusChangeRequest,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = async {
        let user = authenticate(&ctx, auth_header)?;
        ctx.lifecycle
            .request_transition(room_id, &user, request.status, request.reason.as_deref())
            .await
    }
    .await;
    reply_result(result)
}

async fn handle_sync(
    room_id: Uuid,
    auth_header: Option<String>,
    request: SyncRequest,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = async {
        let user = authenticate(&ctx, auth_header)?;
        ctx.sync.submit_operations(room_id, &user, request).await
    }
    .await;
    reply_result(result)
}

async fn handle_operations(
    room_id: Uuid,
    query: OperationsQuery,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let since = query.since.unwrap_or(0);
    reply_result(ctx.sync.operations_since(room_id, since).await)
}

async fn handle_resolve(
    room_id: Uuid,
    auth_header: Option<String>,
    request: ResolveRequest,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = async {
        let user = authenticate(&ctx, auth_header)?;
        ctx.sync.resolve_conflicts(room_id, &user, request).await
    }
    .await;
    reply_result(result)
}

async fn handle_recovery_state(
    room_id: Uuid,
    auth_header: Option<String>,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = async {
        let user = authenticate(&ctx, auth_header)?;
        ctx.recovery.get_recovery_state(room_id, &user).await
    }
    .await;
    reply_result(result)
}

async fn handle_recovery_action(
    room_id: Uuid,
    auth_header: Option<String>,
    request: RecoveryRequest,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = async {
        let user = authenticate(&ctx, auth_header)?;
        match request.action {
            RecoveryAction::CreateBackup => {
                let backup = ctx.recovery.create_backup(room_id, &user).await?;
                Ok(serde_json::to_value(backup)
                    .map_err(|e| SyncError::internal(e.to_string()))?)
            }
            RecoveryAction::RestoreBackup => {
                let backup_id = request
                    .backup_id
                    .ok_or_else(|| SyncError::validation("restore_backup requires backup_id"))?;
                ctx.recovery
                    .restore_from_backup(room_id, &user, backup_id)
                    .await?;
                Ok(serde_json::json!({ "restored": true }))
            }
            RecoveryAction::RecoverSession => {
                ctx.recovery.recover_session(room_id, &user).await?;
                Ok(serde_json::json!({ "recovered": true }))
            }
        }
    }
    .await;
    reply_result(result)
}

async fn handle_versions(
    room_id: Uuid,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    reply_result(ctx.recovery.version_history(room_id).await)
}

async fn handle_transfer_state(
    room_id: Uuid,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    reply_result(ctx.transfer.get_state(room_id).await)
}

async fn handle_transfer_action(
    room_id: Uuid,
    auth_header: Option<String>,
    request: TransferRequest,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = async {
        let user = authenticate(&ctx, auth_header)?;
        match request.action {
            TransferAction::Initiate => {
                let target = request.target_user_id.ok_or_else(|| {
                    SyncError::validation("initiate requires target_user_id")
                })?;
                ctx.transfer.initiate(room_id, &user, target).await
            }
            TransferAction::Confirm => {
                let accept = request.accept.unwrap_or(true);
                ctx.transfer.confirm(room_id, &user, accept).await
            }
            TransferAction::Cancel => ctx.transfer.cancel(room_id, &user).await,
        }
    }
    .await;
    reply_result(result)
}

async fn handle_cleanup(
    secret: Option<String>,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if secret.as_deref() != Some(ctx.cleanup_secret.as_str()) {
        return reply_result::<()>(Err(SyncError::authorization("invalid cleanup secret")));
    }
    reply_result(ctx.lifecycle.run_cleanup().await)
}

async fn handle_stats(
    secret: Option<String>,
    ctx: Arc<AppContext>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if secret.as_deref() != Some(ctx.cleanup_secret.as_str()) {
        return reply_result::<()>(Err(SyncError::authorization("invalid cleanup secret")));
    }
    reply_result(ctx.lifecycle.get_statistics().await)
}
