//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::{
    config::SenderEcho,
    domain::{ChatRepository, IdentityVerifier, MessageBroker, SearchIndex},
    fanout::{RoomRegistry, close_code},
    usecase::{
        ConnectParticipantUseCase, CreateDirectChatUseCase, GetChatHistoryUseCase,
        ListChatsUseCase, RegisterUserUseCase, SearchMessagesUseCase, SearchUsersUseCase,
        SendMessageUseCase,
    },
};

use super::{
    handler::{
        create_chat, debug_rooms, get_chat_history, health_check, list_chats, search_messages,
        search_users, websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Collaborators the server is wired with.
///
/// Several servers built from clones of the same broker (and storage) behave
/// like independent instances of one deployment.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityVerifier>,
    pub repository: Arc<dyn ChatRepository>,
    pub search: Arc<dyn SearchIndex>,
    pub broker: Arc<dyn MessageBroker>,
}

/// Chat relay server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(collaborators, SenderEcho::Include, 50);
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
    instance_id: Uuid,
}

impl Server {
    /// Create a new Server instance with its own registry and instance id
    pub fn new(collaborators: Collaborators, sender_echo: SenderEcho, history_limit: usize) -> Self {
        let Collaborators {
            identity,
            repository,
            search,
            broker,
        } = collaborators;
        let instance_id = Uuid::new_v4();
        let registry = Arc::new(RoomRegistry::new());

        let state = AppState {
            connect_participant_usecase: Arc::new(ConnectParticipantUseCase::new(
                identity.clone(),
                repository.clone(),
                broker.clone(),
                registry.clone(),
                sender_echo,
                instance_id,
            )),
            send_message_usecase: Arc::new(SendMessageUseCase::new(
                repository.clone(),
                search.clone(),
                broker,
                instance_id,
            )),
            register_user_usecase: Arc::new(RegisterUserUseCase::new(
                identity,
                repository.clone(),
                search.clone(),
            )),
            create_direct_chat_usecase: Arc::new(CreateDirectChatUseCase::new(repository.clone())),
            list_chats_usecase: Arc::new(ListChatsUseCase::new(repository.clone())),
            get_chat_history_usecase: Arc::new(GetChatHistoryUseCase::new(repository.clone())),
            search_messages_usecase: Arc::new(SearchMessagesUseCase::new(
                repository,
                search.clone(),
            )),
            search_users_usecase: Arc::new(SearchUsersUseCase::new(search)),
            registry,
            history_limit,
        };

        Self {
            state: Arc::new(state),
            instance_id,
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Local room registry of this instance
    pub fn registry(&self) -> Arc<RoomRegistry> {
        self.state.registry.clone()
    }

    /// Define handlers
    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws/chat/{chat_id}", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/chat/chats/", post(create_chat).get(list_chats))
            .route("/api/chat/chats/{chat_id}/messages", get(get_chat_history))
            .route("/api/chat/chats/{chat_id}/search", get(search_messages))
            .route("/api/chat/users/search", get(search_users))
            .route("/debug/rooms", get(debug_rooms))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown every local connection is asked to close with 1001.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let registry = self.registry();

        tracing::info!(
            "Chat relay server {} listening on {}",
            self.instance_id,
            listener.local_addr()?
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                registry
                    .close_all(close_code::GOING_AWAY, "server shutting down")
                    .await;
            })
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }

    /// Run the chat relay server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Connect to: ws://{}/ws/chat/{{chat_id}}?token=...", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;
        Ok(())
    }
}
