//! Server execution logic.

use std::{path::PathBuf, sync::Arc};

use axum::{Router, routing::get};
use parlor_shared::time::Clock;
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::usecase::{BroadcastCoordinator, CoordinatorHandle};

use super::{
    handler::{health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Network-facing configuration of the chat server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host address to bind to (e.g., "127.0.0.1")
    pub host: String,
    /// Port number to bind to (e.g., 5000)
    pub port: u16,
    /// Path of the WebSocket upgrade endpoint
    pub ws_path: String,
    /// Directory of frontend assets served at `/`; `None` disables it
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            ws_path: "/websocket".to_string(),
            static_dir: Some(PathBuf::from("./frontend/public")),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Chat room server
///
/// Owns the broadcast coordinator and exposes it to every WebSocket session.
///
/// # Example
///
/// ```ignore
/// let server = Server::new(ServerConfig::default(), Arc::new(SystemClock));
/// server.run().await?;
/// ```
pub struct Server {
    config: ServerConfig,
    coordinator: CoordinatorHandle,
}

impl Server {
    /// Create the server and start its coordinator task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        // The coordinator runs until the last handle (held by the router state) is dropped.
        let (coordinator, _task) = BroadcastCoordinator::spawn(clock);
        Self {
            config,
            coordinator,
        }
    }

    /// Build the HTTP router: WebSocket endpoint, health check and static assets
    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState {
            coordinator: self.coordinator.clone(),
        });

        let mut app = Router::new()
            // WebSocket エンドポイント
            .route(&self.config.ws_path, get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check));

        match &self.config.static_dir {
            Some(dir) if dir.is_dir() => {
                tracing::info!("Serving static files from {}", dir.display());
                app = app.fallback_service(ServeDir::new(dir));
            }
            Some(dir) => {
                tracing::warn!(
                    "Static directory {} not found, static file serving disabled",
                    dir.display()
                );
            }
            None => {}
        }

        app.layer(TraceLayer::new_for_http()).with_state(app_state)
    }

    /// Run the chat server until a shutdown signal arrives
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the configured address or
    /// if there's an error during server execution.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = self.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Chat server listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}{}", bind_addr, self.config.ws_path);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        let app = self.router();
        // Drop our handle so the coordinator only lives as long as the router.
        drop(self);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
