//! Chat room server relaying messages between WebSocket clients.
//!
//! Every message a client sends is broadcast to all other connected clients,
//! stamped with the server's UTC time.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin parlor-server
//! cargo run --bin parlor-server -- --host 0.0.0.0 --port 3000
//! ```

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use parlor_server::ui::{Server, ServerConfig};
use parlor_shared::{logger::setup_logger, time::SystemClock};

#[derive(Parser, Debug)]
#[command(name = "parlor-server")]
#[command(about = "WebSocket chat room server with broadcast support", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "5000")]
    port: u16,

    /// Path of the WebSocket endpoint
    #[arg(long, default_value = "/websocket")]
    ws_path: String,

    /// Directory of frontend assets served at `/`
    #[arg(long, default_value = "./frontend/public")]
    static_dir: PathBuf,

    /// Disable static file serving
    #[arg(long)]
    no_static: bool,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, default_value = "debug")]
    log_level: String,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            ws_path: args.ws_path,
            static_dir: (!args.no_static).then_some(args.static_dir),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(&[env!("CARGO_PKG_NAME"), "tower_http"], &args.log_level);

    let server = Server::new(ServerConfig::from(args), Arc::new(SystemClock));
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
