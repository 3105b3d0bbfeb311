use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use super::{BotIdentity, ChatPlatform, ChatTarget, InboundMessage, StatusMessage};
use crate::error::ChatError;

const API_BASE: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = concat!("DiscordBot (queue-watch-bot, ", env!("CARGO_PKG_VERSION"), ")");

/// Discord REST client. Commands are read by polling the channel history,
/// which needs the Message Content intent enabled for the bot.
pub struct DiscordClient {
    token: String,
    client: Client,
    base: String,
    timeout: Duration,
    max_retries: u8,
    /// Newest message id seen per channel.
    last_seen: Mutex<HashMap<String, u64>>,
    bot_id: Mutex<Option<String>>,
}

impl DiscordClient {
    pub fn new(token: String) -> Self {
        Self {
            token,
            client: Client::new(),
            base: API_BASE.to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            last_seen: Mutex::new(HashMap::new()),
            bot_id: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(header::AUTHORIZATION, format!("Bot {}", self.token))
            .header(header::USER_AGENT, USER_AGENT)
            .timeout(self.timeout)
    }

    async fn execute(&self, req: RequestBuilder, what: &str) -> Result<Response, ChatError> {
        let rsp = self.authed(req).send().await?;
        let status = rsp.status();
        if status.is_success() {
            return Ok(rsp);
        }
        Err(match status.as_u16() {
            401 => ChatError::Unauthorized,
            403 => ChatError::Forbidden(what.to_string()),
            404 => ChatError::NotFound(what.to_string()),
            429 => {
                let retry_after_ms = rsp
                    .json::<RateLimitBody>()
                    .await
                    .map(|b| (b.retry_after * 1000.0).ceil() as u64)
                    .unwrap_or(1000);
                ChatError::RateLimited { retry_after_ms }
            }
            s => {
                let body: String = rsp.text().await.unwrap_or_default().chars().take(200).collect();
                ChatError::Status { status: s, body }
            }
        })
    }

    /// Run `build` until it succeeds, fails permanently, or retries run out.
    async fn execute_with_retry<F>(&self, what: &str, build: F) -> Result<Response, ChatError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.execute(build(), what).await {
                Ok(rsp) => return Ok(rsp),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay_ms = match &e {
                        ChatError::RateLimited { retry_after_ms } => *retry_after_ms,
                        _ => 500u64 << (attempt - 1),
                    };
                    tracing::warn!(error = %e, attempt, delay_ms, what, "discord request failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn set_last_seen(&self, room_id: &str, id: u64) {
        let mut seen = self.last_seen.lock().unwrap_or_else(|p| p.into_inner());
        let slot = seen.entry(room_id.to_string()).or_insert(0);
        *slot = (*slot).max(id);
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn connect(&self) -> Result<BotIdentity, ChatError> {
        let me: DiscordUser = self
            .execute(self.client.get(self.url("/users/@me")), "current user")
            .await?
            .json()
            .await?;
        *self.bot_id.lock().unwrap_or_else(|p| p.into_inner()) = Some(me.id.clone());
        Ok(BotIdentity {
            id: me.id,
            username: me.username,
        })
    }

    async fn resolve_target(&self, server_id: &str, room_id: &str) -> Result<ChatTarget, ChatError> {
        let guild_what = format!("guild {server_id}");
        let guild: DiscordGuild = self
            .execute(self.client.get(self.url(&format!("/guilds/{server_id}"))), &guild_what)
            .await?
            .json()
            .await?;

        let channel_what = format!("channel {room_id}");
        let channel: DiscordChannel = self
            .execute(self.client.get(self.url(&format!("/channels/{room_id}"))), &channel_what)
            .await?
            .json()
            .await?;

        if channel.guild_id.as_deref() != Some(guild.id.as_str()) {
            return Err(ChatError::NotFound(format!("{channel_what} in {guild_what}")));
        }

        Ok(ChatTarget {
            server_id: guild.id,
            server_name: guild.name,
            room_id: channel.id,
            room_name: channel.name.unwrap_or_default(),
        })
    }

    async fn post(&self, room_id: &str, msg: &StatusMessage) -> Result<(), ChatError> {
        let payload = CreateMessage::embed(msg);
        let url = self.url(&format!("/channels/{room_id}/messages"));
        let what = format!("channel {room_id}");
        self.execute_with_retry(&what, || self.client.post(&url).json(&payload))
            .await?;
        Ok(())
    }

    async fn rename_label(&self, server_id: &str, label: &str) -> Result<(), ChatError> {
        let url = self.url(&format!("/guilds/{server_id}/members/@me"));
        let body = serde_json::json!({ "nick": label });
        let what = format!("nickname in guild {server_id}");
        self.execute_with_retry(&what, || self.client.patch(&url).json(&body))
            .await?;
        Ok(())
    }

    async fn poll_messages(&self, room_id: &str) -> Result<Vec<InboundMessage>, ChatError> {
        let after = self
            .last_seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(room_id)
            .copied();
        let what = format!("channel {room_id}");

        // First poll only anchors the cursor so old commands are not replayed.
        let Some(after) = after else {
            let url = self.url(&format!("/channels/{room_id}/messages?limit=1"));
            let newest: Vec<DiscordMessage> =
                self.execute(self.client.get(url), &what).await?.json().await?;
            let anchor = newest.iter().filter_map(|m| m.id.parse().ok()).max().unwrap_or(0);
            self.set_last_seen(room_id, anchor);
            return Ok(Vec::new());
        };

        let url = self.url(&format!("/channels/{room_id}/messages?after={after}&limit=50"));
        let mut msgs: Vec<DiscordMessage> =
            self.execute(self.client.get(url), &what).await?.json().await?;
        msgs.sort_by_key(|m| m.id.parse::<u64>().unwrap_or(0));
        if let Some(max) = msgs.iter().filter_map(|m| m.id.parse::<u64>().ok()).max() {
            self.set_last_seen(room_id, max);
        }

        let bot_id = self.bot_id.lock().unwrap_or_else(|p| p.into_inner()).clone();
        Ok(msgs
            .into_iter()
            .filter(|m| !m.author.bot && Some(&m.author.id) != bot_id.as_ref())
            .map(|m| InboundMessage {
                id: m.id,
                room_id: m.channel_id,
                author_id: m.author.id,
                author_name: m.author.username,
                content: m.content,
            })
            .collect())
    }
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

#[derive(Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Deserialize)]
struct DiscordGuild {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct DiscordChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    guild_id: Option<String>,
}

#[derive(Deserialize)]
struct DiscordMessage {
    id: String,
    channel_id: String,
    #[serde(default)]
    content: String,
    author: DiscordUser,
}

#[derive(Serialize)]
struct EmbedFooter {
    text: String,
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<EmbedFooter>,
}

#[derive(Serialize)]
struct CreateMessage {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl CreateMessage {
    fn embed(msg: &StatusMessage) -> Self {
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: msg.title.clone(),
                description: msg.description.clone(),
                color: msg.color,
                footer: msg.footer.clone().map(|text| EmbedFooter { text }),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embed_payload_shape() {
        let msg = StatusMessage {
            title: "Faerlina Queue: Unknown".into(),
            description: String::new(),
            color: 0xFF0000,
            footer: Some("No data was received from the API. It may be down.".into()),
        };
        let v = serde_json::to_value(CreateMessage::embed(&msg)).unwrap();
        assert_eq!(v["embeds"][0]["title"], "Faerlina Queue: Unknown");
        assert_eq!(v["embeds"][0]["color"], 0xFF0000);
        assert!(v["embeds"][0].get("description").is_none());
        assert_eq!(
            v["embeds"][0]["footer"]["text"],
            "No data was received from the API. It may be down."
        );
        assert!(v["content"].is_null());
    }

    #[test]
    fn builder_settings_apply() {
        let c = DiscordClient::new("t".into()).with_timeout(4).with_retries(0);
        assert_eq!(c.timeout, Duration::from_secs(4));
        assert_eq!(c.max_retries, 1);
    }

    #[test]
    fn base_url_is_normalised() {
        let c = DiscordClient::new("t".into()).with_base_url("http://localhost:9000/api/");
        assert_eq!(c.url("/users/@me"), "http://localhost:9000/api/users/@me");
    }
}
