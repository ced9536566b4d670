//! Multi-instance WebSocket chat relay server.
//!
//! Members of a chat room may be connected to different instances; every
//! instance relays room messages through the broker. With `--broker-url`
//! that broker is a Redis server shared by every process. Without it the
//! broker lives in this process and only its own connections share rooms.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-server -- --jwt-secret dev-secret
//! cargo run --bin hiroba-server -- --jwt-secret dev-secret --broker-url redis://127.0.0.1:6379
//! cargo run --bin hiroba-server -- --host 0.0.0.0 --port 3000 --jwt-public-key key.pem
//! ```

use std::sync::Arc;

use clap::Parser;
use hiroba_server::{
    config::{ServerArgs, ServerConfig},
    infrastructure::{repository::InMemoryChatRepository, search::InMemorySearchIndex},
    ui::{Collaborators, Server},
};
use hiroba_shared::logger::setup_logger;

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    let config = match ServerConfig::try_from(args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    tracing::debug!("Loaded configuration: {:?}", config);

    // Initialize dependencies in order:
    // 1. Identity verifier
    // 2. Storage, search index and broker
    // 3. Server (use cases and registry)
    let verifier = match config.jwt_key.verifier() {
        Ok(verifier) => verifier,
        Err(e) => {
            tracing::error!("Failed to load identity key: {}", e);
            std::process::exit(1);
        }
    };

    let broker = match config.broker.connect().await {
        Ok(broker) => broker,
        Err(e) => {
            tracing::error!("Failed to connect to broker: {}", e);
            std::process::exit(1);
        }
    };
    if !config.broker.is_shared() {
        tracing::warn!("No --broker-url given; rooms are not shared with other processes");
    }

    let collaborators = Collaborators {
        identity: Arc::new(verifier),
        repository: Arc::new(InMemoryChatRepository::new()),
        search: Arc::new(InMemorySearchIndex::new()),
        broker,
    };

    let server = Server::new(collaborators, config.sender_echo, config.history_limit);
    tracing::info!(
        "Instance {} starting (sender echo: {:?})",
        server.instance_id(),
        config.sender_echo
    );

    if let Err(e) = server.run(config.host, config.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
