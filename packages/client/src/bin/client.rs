//! Terminal chat client.
//!
//! Connects to a chat server, announces the given username and sends each
//! entered line to the room. Incoming join notices and messages are printed
//! as they arrive.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin parlor-client -- --username Alice
//! cargo run --bin parlor-client -- -n Bob -u ws://127.0.0.1:5000/websocket
//! ```

use clap::Parser;
use parlor_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "parlor-client")]
#[command(about = "WebSocket chat room client", long_about = None)]
struct Args {
    /// Name shown to the other participants
    #[arg(short = 'n', long)]
    username: String,

    /// WebSocket server URL
    #[arg(short = 'u', long, default_value = "ws://127.0.0.1:5000/websocket")]
    url: String,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(&[env!("CARGO_PKG_NAME")], &args.log_level);

    if let Err(e) = parlor_client::run_client(&args.url, &args.username).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
