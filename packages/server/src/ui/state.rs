//! Shared application state.

use std::sync::Arc;

use crate::{
    fanout::RoomRegistry,
    usecase::{
        ConnectParticipantUseCase, CreateDirectChatUseCase, GetChatHistoryUseCase,
        ListChatsUseCase, RegisterUserUseCase, SearchMessagesUseCase, SearchUsersUseCase,
        SendMessageUseCase,
    },
};

/// Shared application state
pub struct AppState {
    /// ConnectParticipantUseCase（WebSocket ハンドシェイク）
    pub connect_participant_usecase: Arc<ConnectParticipantUseCase>,
    /// SendMessageUseCase（受信メッセージの永続化と publish）
    pub send_message_usecase: Arc<SendMessageUseCase>,
    /// RegisterUserUseCase（HTTP API の認証）
    pub register_user_usecase: Arc<RegisterUserUseCase>,
    pub create_direct_chat_usecase: Arc<CreateDirectChatUseCase>,
    pub list_chats_usecase: Arc<ListChatsUseCase>,
    pub get_chat_history_usecase: Arc<GetChatHistoryUseCase>,
    pub search_messages_usecase: Arc<SearchMessagesUseCase>,
    pub search_users_usecase: Arc<SearchUsersUseCase>,
    /// ローカル接続の Registry（debug エンドポイントとシャットダウンで使用）
    pub registry: Arc<RoomRegistry>,
    /// 履歴 API の limit 未指定時の件数
    pub history_limit: usize,
}
