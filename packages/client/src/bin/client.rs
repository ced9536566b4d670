//! WebSocket chat client with reconnection support.
//!
//! Joins one chat and sends every line typed at the prompt.
//! A refused credential or membership (close code 1008) ends the client;
//! other disconnects are retried (max 5 attempts with 5 second interval).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-client -- --chat-id 1 --token "$TOKEN"
//! cargo run --bin hiroba-client -- -u ws://127.0.0.1:3000 -c 1 -t "$TOKEN"
//! ```

use clap::Parser;

use hiroba_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "hiroba-client")]
#[command(about = "WebSocket chat client for Hiroba chat rooms", long_about = None)]
struct Args {
    /// Chat to join
    #[arg(short = 'c', long)]
    chat_id: i64,

    /// Identity token (JWT)
    #[arg(short = 't', long, env = "HIROBA_TOKEN", hide_env_values = true)]
    token: String,

    /// WebSocket server URL
    #[arg(short = 'u', long, default_value = "ws://127.0.0.1:8080")]
    url: String,

    /// Default log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    // Run the client
    if let Err(e) = hiroba_client::run_client(args.url, args.chat_id, args.token).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
