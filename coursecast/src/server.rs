//! Server lifecycle management
//!
//! Wires the real-time components together and runs the HTTP/WebSocket
//! server until a shutdown signal arrives.

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use coursecast_api::http::{create_router, AppState};
use coursecast_core::{
    realtime::{
        ConnectionRegistry, CourseChannelHub, PresenceTracker, RealtimeLimits,
        UserNotificationRouter,
    },
    repository::ChatRepository,
    service::{ChatService, TokenService},
    Config,
};

pub struct CoursecastServer {
    config: Config,
    pool: PgPool,
}

impl CoursecastServer {
    #[must_use]
    pub fn new(config: Config, pool: PgPool) -> Self {
        Self { config, pool }
    }

    /// Build the shared state and serve until shutdown.
    pub async fn run(self) -> Result<()> {
        let hub = CourseChannelHub::new();
        let notifier = UserNotificationRouter::new();
        let presence = PresenceTracker::new(hub.clone());
        let registry = ConnectionRegistry::new(
            hub.clone(),
            notifier.clone(),
            presence.clone(),
            RealtimeLimits {
                max_total: self.config.realtime.max_connections,
                max_per_user: self.config.realtime.max_connections_per_user,
            },
        );

        let store = Arc::new(ChatRepository::new(self.pool.clone()));
        let chat_service = Arc::new(ChatService::new(
            store,
            hub,
            self.config.realtime.max_message_length,
        ));
        let token_service = Arc::new(TokenService::new(
            self.config.auth.token_secret.as_bytes(),
            self.config.auth.token_validity_hours,
        ));

        let state = AppState {
            registry,
            notifier,
            presence,
            chat_service,
            token_service,
        };

        let router = create_router(state);

        let addr = self.config.http_address();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("HTTP server listening on {addr}");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

/// Resolve on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install ctrl-c handler: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!("Failed to install SIGTERM handler: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received ctrl-c, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
