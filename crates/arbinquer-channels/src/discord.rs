//! Discord Bot channel over the REST API.
//!
//! Status messages never need gateway events, so this binding covers just
//! the message endpoints plus `users/@me` to learn the bot's own id.

use arbinquer_core::error::{ArbinquerError, Result};
use arbinquer_core::traits::ChatTransport;
use arbinquer_core::types::ChannelMessage;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Discord caps `GET /channels/{id}/messages` at 100 per page.
const PAGE_SIZE: usize = 100;
const MAX_RETRY_AFTER_SECS: f64 = 3600.0;

/// Discord channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".into()
}

fn default_user_agent() -> String {
    concat!("DiscordBot (arbinquer, ", env!("CARGO_PKG_VERSION"), ")").into()
}

impl DiscordConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: default_api_base(),
            user_agent: default_user_agent(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

/// Discord Bot channel.
pub struct DiscordChannel {
    config: DiscordConfig,
    client: reqwest::Client,
    self_id: OnceCell<String>,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bot {}", config.bot_token))
            .map_err(|_| ArbinquerError::config("DISCORD_TOKEN contains invalid characters"))?;
        headers.insert(AUTHORIZATION, auth);
        let agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|_| ArbinquerError::config("invalid Discord user agent"))?;
        headers.insert(USER_AGENT, agent);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ArbinquerError::transport(format!("Discord client init failed: {e}")))?;

        Ok(Self {
            config,
            client,
            self_id: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base.trim_end_matches('/'))
    }

    /// Get current bot info.
    pub async fn get_me(&self) -> Result<DiscordUser> {
        let response = self
            .client
            .get(self.url("/users/@me"))
            .send()
            .await
            .map_err(|e| ArbinquerError::transport(format!("getMe failed: {e}")))?;
        let response = check_status(response, "getMe").await?;
        response
            .json()
            .await
            .map_err(|e| ArbinquerError::transport(format!("Invalid getMe response: {e}")))
    }

    /// The bot's own user id, fetched once and cached.
    pub async fn self_id(&self) -> Result<&str> {
        let id = self
            .self_id
            .get_or_try_init(|| async {
                let me = self.get_me().await?;
                tracing::info!("Discord bot: {} ({})", me.username, me.id);
                Ok::<_, ArbinquerError>(me.id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn fetch_page(&self, channel_id: &str, limit: usize, before: Option<&str>) -> Result<Vec<DiscordMessage>> {
        let mut request = self
            .client
            .get(self.url(&format!("/channels/{channel_id}/messages")))
            .query(&[("limit", limit.to_string())]);
        if let Some(before) = before {
            request = request.query(&[("before", before)]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ArbinquerError::transport(format!("Discord history failed: {e}")))?;
        let response = check_status(response, "history").await?;
        response
            .json()
            .await
            .map_err(|e| ArbinquerError::transport(format!("Invalid history response: {e}")))
    }
}

#[async_trait]
impl ChatTransport for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn create_message(&self, channel_id: &str, content: &str) -> Result<String> {
        let body = serde_json::json!({ "content": content });
        let response = self
            .client
            .post(self.url(&format!("/channels/{channel_id}/messages")))
            .json(&body)
            .send()
            .await
            .map_err(|e| ArbinquerError::transport(format!("Discord send failed: {e}")))?;
        let response = check_status(response, "create").await?;
        let message: DiscordMessage = response
            .json()
            .await
            .map_err(|e| ArbinquerError::transport(format!("Invalid create response: {e}")))?;
        Ok(message.id)
    }

    async fn edit_message(&self, channel_id: &str, message_id: &str, content: &str) -> Result<()> {
        let body = serde_json::json!({ "content": content });
        let response = self
            .client
            .patch(self.url(&format!("/channels/{channel_id}/messages/{message_id}")))
            .json(&body)
            .send()
            .await
            .map_err(|e| ArbinquerError::transport(format!("Discord edit failed: {e}")))?;
        check_status(response, "edit").await?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/channels/{channel_id}/messages/{message_id}")))
            .send()
            .await
            .map_err(|e| ArbinquerError::transport(format!("Discord delete failed: {e}")))?;
        check_status(response, "delete").await?;
        Ok(())
    }

    async fn list_recent_messages(&self, channel_id: &str, limit: usize) -> Result<Vec<ChannelMessage>> {
        let self_id = self.self_id().await?.to_string();
        let mut collected: Vec<ChannelMessage> = Vec::with_capacity(limit);
        let mut before: Option<String> = None;

        while collected.len() < limit {
            let want = (limit - collected.len()).min(PAGE_SIZE);
            let page = self.fetch_page(channel_id, want, before.as_deref()).await?;
            let exhausted = page.len() < want;
            before = page.last().map(|m| m.id.clone());
            collected.extend(
                page.into_iter()
                    .map(|m| ChannelMessage::new(m.id, m.author.id == self_id, m.content)),
            );
            if exhausted || before.is_none() {
                break;
            }
        }

        collected.truncate(limit);
        Ok(collected)
    }
}

/// Map non-2xx responses onto the transport error taxonomy.
async fn check_status(response: reqwest::Response, op: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = rate_limit_delay(response).await;
            tracing::warn!("Discord {op} rate limited, retry after {:?}", retry_after);
            Err(ArbinquerError::RateLimited { retry_after })
        }
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            let text = response.text().await.unwrap_or_default();
            Err(ArbinquerError::PermissionDenied(format!("Discord {op} {status}: {text}")))
        }
        StatusCode::NOT_FOUND => {
            let text = response.text().await.unwrap_or_default();
            Err(ArbinquerError::NotFound(format!("Discord {op}: {text}")))
        }
        _ => {
            let text = response.text().await.unwrap_or_default();
            Err(ArbinquerError::transport(format!("Discord {op} {status}: {text}")))
        }
    }
}

/// `retry_after` from the JSON body (float seconds), else the `Retry-After` header.
async fn rate_limit_delay(response: reqwest::Response) -> Duration {
    let header = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok());
    let body = response.json::<RateLimitBody>().await.ok().map(|b| b.retry_after);

    let secs = body.or(header).unwrap_or(1.0);
    if secs.is_finite() && secs >= 0.0 {
        Duration::from_secs_f64(secs.min(MAX_RETRY_AFTER_SECS))
    } else {
        Duration::from_secs(1)
    }
}

// --- Discord API Types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    pub bot: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    pub author: DiscordUser,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel_for(server: &MockServer) -> DiscordChannel {
        DiscordChannel::new(DiscordConfig::new("secret").with_api_base(server.uri())).unwrap()
    }

    fn message_json(id: &str, author: &str, content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "channel_id": "c1",
            "author": { "id": author, "username": author },
            "content": content,
        })
    }

    async fn mount_me(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/users/@me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "bot1", "username": "arbinquer", "bot": true
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_create_message_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/c1/messages"))
            .and(header("authorization", "Bot secret"))
            .and(body_json(serde_json::json!({ "content": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(message_json("m1", "bot1", "hello")))
            .mount(&server)
            .await;

        let discord = channel_for(&server);
        let id = discord.create_message("c1", "hello").await.unwrap();
        assert_eq!(id, "m1");
    }

    #[tokio::test]
    async fn test_edit_and_delete() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/channels/c1/messages/m1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(message_json("m1", "bot1", "v2")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/channels/c1/messages/m1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let discord = channel_for(&server);
        discord.edit_message("c1", "m1", "v2").await.unwrap();
        discord.delete_message("c1", "m1").await.unwrap();
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/channels/c1/messages/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Unknown Message"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/locked/messages"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Missing Permissions"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/channels/c1/messages/m1"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let discord = channel_for(&server);
        let err = discord.edit_message("c1", "gone", "x").await.unwrap_err();
        assert!(matches!(err, ArbinquerError::NotFound(_)));
        let err = discord.create_message("locked", "x").await.unwrap_err();
        assert!(matches!(err, ArbinquerError::PermissionDenied(_)));
        let err = discord.delete_message("c1", "m1").await.unwrap_err();
        assert!(matches!(err, ArbinquerError::Transport(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_body_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/c1/messages"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "message": "You are being rate limited.",
                "retry_after": 2.5,
                "global": false
            })))
            .mount(&server)
            .await;

        let discord = channel_for(&server);
        let err = discord.create_message("c1", "x").await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_millis(2500)));
    }

    #[tokio::test]
    async fn test_rate_limit_header_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/c1/messages"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "4"))
            .mount(&server)
            .await;

        let discord = channel_for(&server);
        let err = discord.create_message("c1", "x").await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(4)));
    }

    #[tokio::test]
    async fn test_list_marks_own_messages() {
        let server = MockServer::start().await;
        mount_me(&server).await;
        Mock::given(method("GET"))
            .and(path("/channels/c1/messages"))
            .and(query_param("limit", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                message_json("m3", "bot1", "newest"),
                message_json("m2", "user9", "chatter"),
                message_json("m1", "bot1", "oldest"),
            ])))
            .mount(&server)
            .await;

        let discord = channel_for(&server);
        let messages = discord.list_recent_messages("c1", 3).await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], ChannelMessage::new("m3", true, "newest"));
        assert!(!messages[1].author_is_self);

        // Self id is cached; `users/@me` expects exactly one call.
        discord.list_recent_messages("c1", 3).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_paginates_with_before() {
        let server = MockServer::start().await;
        mount_me(&server).await;

        let first: Vec<_> = (0..100)
            .map(|i| message_json(&format!("p1-{i}"), "bot1", "x"))
            .collect();
        Mock::given(method("GET"))
            .and(path("/channels/c1/messages"))
            .and(query_param("limit", "100"))
            .and(query_param_is_missing("before"))
            .respond_with(ResponseTemplate::new(200).set_body_json(first))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/channels/c1/messages"))
            .and(query_param("limit", "20"))
            .and(query_param("before", "p1-99"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                message_json("p2-0", "bot1", "y"),
                message_json("p2-1", "bot1", "y"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let discord = channel_for(&server);
        let messages = discord.list_recent_messages("c1", 120).await.unwrap();
        assert_eq!(messages.len(), 102);
        assert_eq!(messages[101].id, "p2-1");
    }

    #[test]
    fn test_invalid_token_rejected() {
        let result = DiscordChannel::new(DiscordConfig::new("bad\ntoken"));
        assert!(matches!(result, Err(ArbinquerError::Config(_))));
    }
}
