//! Presence Keeper
//!
//! Entry point: loads configuration, builds the upstream adapter and session
//! controller, optionally configures the startup session, and serves the
//! operator API until SIGINT/SIGTERM.

use presence_keeper::config::Config;
use presence_keeper::observability::metrics::init_metrics_recorder;
use presence_keeper::routes::{self, AppState};
use presence_keeper::services::{
    ControllerSettings, HttpPresenceAdapter, PresenceAdapter, SessionController,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "presence_keeper=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Presence Keeper");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        upstream_base_url = %config.upstream_base_url,
        heartbeat_interval_seconds = config.heartbeat_interval_seconds,
        max_retries = config.max_retries,
        bootstrap_steps = ?config.pipeline.step_names(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let adapter = HttpPresenceAdapter::new(&config).map_err(|e| {
        error!("Failed to create upstream adapter: {}", e);
        e
    })?;
    let adapter: Arc<dyn PresenceAdapter> = Arc::new(adapter);

    let controller = Arc::new(SessionController::new(
        adapter,
        ControllerSettings {
            heartbeat_interval: config.heartbeat_interval(),
            max_retries: config.max_retries,
        },
    ));

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;
    let drain_seconds = config.drain_seconds;
    let startup_session = config
        .default_cookie
        .clone()
        .zip(config.default_room_id.clone());

    let state = Arc::new(AppState {
        config,
        controller: Arc::clone(&controller),
    });
    let app = routes::build_routes(state, metrics_handle);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Presence Keeper listening on {}", addr);

    if let Some((cookie, room_id)) = startup_session {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            info!(room_id = %room_id, "Configuring startup session");
            match controller.configure(cookie, &room_id).await {
                Ok(snapshot) => info!(
                    room_id = ?snapshot.room_id,
                    user_id = ?snapshot.user_id,
                    "Startup session connected"
                ),
                Err(e) => warn!(error = %e, "Startup session failed, waiting for operator"),
            }
        });
    } else {
        info!("No startup session configured, waiting for /api/update-config");
    }

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(drain_seconds))
        .await?;

    controller.shutdown().await;

    info!("Presence Keeper shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal(drain_seconds: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    if drain_seconds > 0 {
        warn!("Draining connections for {} seconds...", drain_seconds);
        tokio::time::sleep(Duration::from_secs(drain_seconds)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    }
}
