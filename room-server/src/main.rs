use std::sync::Arc;
use tokio::signal;
use tracing::info;

use room_persistence::connection::connect_and_migrate;
use room_persistence::repositories::{
    BackupRepository, OperationRepository, ParticipantRepository, RoomRepository,
    TransferRepository,
};
use room_server::auth::AuthService;
use room_server::config::Config;
use room_server::lifecycle::RoomLifecycleManager;
use room_server::notify::LogNotifier;
use room_server::recovery::RecoveryManager;
use room_server::sync::SyncCoordinator;
use room_server::transfer::HostTransferManager;
use room_server::{AppContext, create_routes};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    info!("Starting room sync server...");

    let config = Config::new();

    let db = match connect_and_migrate().await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to connect to database and run migrations: {}", e);
            std::process::exit(1);
        }
    };

    let room_repo = Arc::new(RoomRepository::new(db.clone()));
    let participant_repo = Arc::new(ParticipantRepository::new(db.clone()));
    let operation_repo = Arc::new(OperationRepository::new(db.clone()));
    let backup_repo = Arc::new(BackupRepository::new(db.clone()));
    let transfer_repo = Arc::new(TransferRepository::new(db));

    let auth_service =
        if std::env::var("AUTH_DEV_MODE").unwrap_or_else(|_| "false".to_string()) == "true" {
            info!("Starting in development authentication mode - JWT validation disabled");
            Arc::new(AuthService::new_dev_mode())
        } else {
            let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
                tracing::error!("JWT_SECRET must be set outside dev mode");
                std::process::exit(1);
            });
            Arc::new(AuthService::new(&secret))
        };

    let notifier = Arc::new(LogNotifier);
    let lifecycle = Arc::new(RoomLifecycleManager::new(
        room_repo.clone(),
        participant_repo.clone(),
        notifier.clone(),
        config.cleanup_policy(),
    ));
    let sync = Arc::new(SyncCoordinator::new(
        room_repo.clone(),
        participant_repo.clone(),
        operation_repo.clone(),
    ));
    let recovery = Arc::new(RecoveryManager::new(
        room_repo.clone(),
        participant_repo.clone(),
        operation_repo,
        backup_repo,
        sync.clone(),
    ));
    let transfer = Arc::new(HostTransferManager::new(
        room_repo,
        participant_repo,
        transfer_repo,
        notifier,
    ));

    let ctx = Arc::new(AppContext {
        lifecycle: lifecycle.clone(),
        sync,
        recovery,
        transfer,
        auth: auth_service,
        cleanup_secret: config.cleanup_secret.clone(),
    });

    let routes = create_routes(ctx);

    // Scheduled sweep: same work as POST /internal/cleanup, on a timer.
    let sweep_lifecycle = lifecycle.clone();
    let sweep_interval = config.sweep_interval_seconds;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(sweep_interval));
        loop {
            interval.tick().await;
            match sweep_lifecycle.run_cleanup().await {
                Ok(report) => {
                    if report.expired_rooms + report.empty_rooms_expired + report.deleted_rooms > 0
                    {
                        info!(
                            expired = report.expired_rooms,
                            empty = report.empty_rooms_expired,
                            deleted = report.deleted_rooms,
                            "cleanup sweep finished"
                        );
                    }
                }
                Err(e) => tracing::warn!("cleanup sweep failed: {}", e),
            }
        }
    });

    info!("Server starting on {}:{}", config.host, config.port);

    let addr = (
        config
            .host
            .parse::<std::net::IpAddr>()
            .expect("Invalid HOST"),
        config.port,
    );

    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async {
        #[cfg(unix)]
        {
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).unwrap();
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).unwrap();

            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    });

    info!(
        "Server started successfully on {}. Press Ctrl+C to stop.",
        addr
    );
    server.await;
    info!("Server shutdown complete.");
}
