pub mod discord;
pub mod render;

use async_trait::async_trait;

use crate::error::ChatError;

pub use render::{render_status, room_label, RenderContext, UNKNOWN_LABEL};

/// Embed-style message posted to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub footer: Option<String>,
}

/// Who the bot is logged in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: String,
    pub username: String,
}

/// Server + output room the bot posts into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTarget {
    pub server_id: String,
    pub server_name: String,
    pub room_id: String,
    pub room_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    pub room_id: String,
    pub author_id: String,
    pub author_name: String,
    pub content: String,
}

/// Everything the bot needs from the chat service.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Validate credentials and learn the bot's identity.
    async fn connect(&self) -> Result<BotIdentity, ChatError>;

    /// Resolve `room_id` inside `server_id`; fails if either is unknown or they do not match.
    async fn resolve_target(&self, server_id: &str, room_id: &str) -> Result<ChatTarget, ChatError>;

    async fn post(&self, room_id: &str, msg: &StatusMessage) -> Result<(), ChatError>;

    /// Set the bot's display label (nickname) within the server.
    async fn rename_label(&self, server_id: &str, label: &str) -> Result<(), ChatError>;

    /// Messages from other users that arrived since the previous call.
    async fn poll_messages(&self, room_id: &str) -> Result<Vec<InboundMessage>, ChatError>;
}
