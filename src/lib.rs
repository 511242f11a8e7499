pub mod backend;
pub mod cli;
pub mod cors;
pub mod gateway;
pub mod session;
pub mod token;

use backend::Backend;
use cors::CorsPolicy;
use gateway::GatewayState;

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Backend handle shared by every request.
    pub backend: Arc<dyn Backend>,
    /// Origins allowed to make credentialed cross-origin requests.
    pub allowed_origins: Vec<String>,
    /// Default redirect target for sign-up confirmations.
    pub site_url: String,
}

/// Create the gateway router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let state = GatewayState {
        backend: config.backend.clone(),
        cors: CorsPolicy::new(config.allowed_origins.iter().cloned()),
        site_url: config.site_url.clone(),
    };
    gateway::router(state)
}

/// Run the server on the given listener. This function blocks until the
/// server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    axum::serve(listener, app).await
}

/// Start the server on the given port in a background task. Use port 0 to
/// let the OS choose a random port. Returns the actual address the server
/// is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> (tokio::task::JoinHandle<()>, SocketAddr) {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    let local_addr = listener.local_addr().expect("Failed to get local address");

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    (handle, local_addr)
}
