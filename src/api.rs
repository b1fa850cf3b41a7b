//! Helix REST API wrappers
//!
//! Thin single-shot request/response wrappers around the platform REST
//! surface: token validation, user id resolution, subscription creation,
//! and message sending. No retry, no state. The `ChatApi` trait is the seam
//! between the session machine / command handlers and the real client, so
//! tests can substitute a recording fake.

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::json;

/// Default Helix API base URL
pub const DEFAULT_API_BASE: &str = "https://api.twitch.tv/helix";

/// Default identity service base URL
pub const DEFAULT_ID_BASE: &str = "https://id.twitch.tv";

/// Platform-enforced maximum chat message length, in characters
pub const MAX_MESSAGE_LEN: usize = 500;

/// Truncate a reply to the platform maximum; excess characters are
/// silently dropped, never wrapped.
pub fn truncate_message(message: &str) -> &str {
    match message.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((index, _)) => &message[..index],
        None => message,
    }
}

/// Outbound platform operations used by the session loop and command handlers
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Subscribe to chat-message events for the current session.
    /// Returns the subscription id.
    async fn create_subscription(&self, config: &RuntimeConfig) -> Result<String>;

    /// Send a chat message to the channel, truncated to [`MAX_MESSAGE_LEN`]
    async fn send_message(&self, config: &RuntimeConfig, message: &str) -> Result<()>;
}

/// Helix REST client
pub struct HelixClient {
    client: reqwest::Client,
    client_id: String,
    api_base: String,
    id_base: String,
}

impl HelixClient {
    /// Create a client against the well-known endpoints
    pub fn new(client_id: impl Into<String>) -> Self {
        Self::with_base_urls(client_id, DEFAULT_API_BASE, DEFAULT_ID_BASE)
    }

    /// Create a client against explicit base URLs (tests)
    pub fn with_base_urls(
        client_id: impl Into<String>,
        api_base: impl Into<String>,
        id_base: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.into(),
            api_base: api_base.into(),
            id_base: id_base.into(),
        }
    }

    /// Validate the captured access token; non-200 is a fatal startup error
    pub async fn validate_token(&self, config: &RuntimeConfig) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/oauth2/validate", self.id_base))
            .header("Authorization", format!("OAuth {}", config.access_token))
            .send()
            .await?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            tracing::debug!(body = %resp.text().await.unwrap_or_default(), "Validation response");
            return Err(Error::Auth(format!(
                "/oauth2/validate returned status code {}",
                status.as_u16()
            )));
        }

        Ok(())
    }

    /// Resolve the channel and bot user ids into the runtime config
    ///
    /// The channel lookup also yields the channel owner's display name,
    /// which the admin guard compares command authors against.
    pub async fn resolve_users(&self, config: &mut RuntimeConfig, login: &str) -> Result<()> {
        let (channel_id, channel_name) = self
            .lookup_user(config, &format!("{}/users?login={}", self.api_base, login))
            .await
            .map_err(|e| Error::Api(format!("Failed to resolve channel {}: {}", login, e)))?;
        config.chat_channel_user_id = channel_id;
        config.chat_channel_user_name = channel_name;

        let (bot_id, _) = self
            .lookup_user(config, &format!("{}/users", self.api_base))
            .await
            .map_err(|e| Error::Api(format!("Failed to resolve bot user: {}", e)))?;
        config.bot_user_id = bot_id;

        Ok(())
    }

    /// GET a users endpoint and return `(id, display_name)` of the first row
    async fn lookup_user(&self, config: &RuntimeConfig, url: &str) -> Result<(String, String)> {
        let resp = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", config.access_token))
            .header("Client-Id", &self.client_id)
            .send()
            .await?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await?;
        if status != reqwest::StatusCode::OK {
            tracing::debug!(%body, "User lookup response");
            return Err(Error::Api(format!(
                "user lookup returned status code {}",
                status.as_u16()
            )));
        }

        let user = &body["data"][0];
        let id = user["id"]
            .as_str()
            .ok_or_else(|| Error::Api("user lookup response missing data[0].id".to_string()))?;
        let display_name = user["display_name"].as_str().unwrap_or_default();
        Ok((id.to_string(), display_name.to_string()))
    }
}

#[async_trait]
impl ChatApi for HelixClient {
    async fn create_subscription(&self, config: &RuntimeConfig) -> Result<String> {
        let payload = json!({
            "type": "channel.chat.message",
            "version": "1",
            "condition": {
                "broadcaster_user_id": config.chat_channel_user_id,
                "user_id": config.bot_user_id,
            },
            "transport": {
                "method": "websocket",
                "session_id": config.session_id,
            },
        });

        let resp = self
            .client
            .post(format!("{}/eventsub/subscriptions", self.api_base))
            .header("Authorization", format!("Bearer {}", config.access_token))
            .header("Client-Id", &self.client_id)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await?;
        if status != reqwest::StatusCode::ACCEPTED {
            tracing::error!(%body, "Subscription response");
            return Err(Error::Api(format!(
                "Failed to subscribe to channel.chat.message: status code {}",
                status.as_u16()
            )));
        }

        let id = body["data"][0]["id"].as_str().unwrap_or_default();
        Ok(id.to_string())
    }

    async fn send_message(&self, config: &RuntimeConfig, message: &str) -> Result<()> {
        let payload = json!({
            "broadcaster_id": config.chat_channel_user_id,
            "sender_id": config.bot_user_id,
            "message": truncate_message(message),
        });

        let resp = self
            .client
            .post(format!("{}/chat/messages", self.api_base))
            .header("Authorization", format!("Bearer {}", config.access_token))
            .header("Client-Id", &self.client_id)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!(body = %body, "Send response");
            return Err(Error::Api(format!(
                "Failed to send chat message: status code {}",
                status.as_u16()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn sample_config(token: &str) -> RuntimeConfig {
        RuntimeConfig {
            access_token: token.to_string(),
            session_id: "sess-1".to_string(),
            bot_user_id: "456".to_string(),
            chat_channel_user_id: "123".to_string(),
            chat_channel_user_name: "Streamer".to_string(),
        }
    }

    #[test]
    fn test_truncate_short_message_unchanged() {
        assert_eq!(truncate_message("hello"), "hello");
    }

    #[test]
    fn test_truncate_exact_limit_unchanged() {
        let msg = "x".repeat(MAX_MESSAGE_LEN);
        assert_eq!(truncate_message(&msg), msg);
    }

    #[test]
    fn test_truncate_over_limit() {
        let msg = "x".repeat(MAX_MESSAGE_LEN + 50);
        let truncated = truncate_message(&msg);
        assert_eq!(truncated.chars().count(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let msg = "é".repeat(MAX_MESSAGE_LEN + 1);
        let truncated = truncate_message(&msg);
        assert_eq!(truncated.chars().count(), MAX_MESSAGE_LEN);
    }

    #[tokio::test]
    async fn test_validate_token_ok() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/oauth2/validate")
                    .header("Authorization", "OAuth tok");
                then.status(200).json_body(serde_json::json!({"login": "bot"}));
            })
            .await;

        let client = HelixClient::with_base_urls("cid", server.base_url(), server.base_url());
        client.validate_token(&sample_config("tok")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_validate_token_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/oauth2/validate");
                then.status(401).json_body(serde_json::json!({"message": "invalid token"}));
            })
            .await;

        let client = HelixClient::with_base_urls("cid", server.base_url(), server.base_url());
        let err = client
            .validate_token(&sample_config("bad"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_resolve_users() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/users")
                    .query_param("login", "streamer")
                    .header("Client-Id", "cid");
                then.status(200).json_body(
                    serde_json::json!({"data": [{"id": "123", "display_name": "Streamer"}]}),
                );
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/users")
                    .matches(|req| req.query_params.as_ref().map_or(true, |q| q.is_empty()));
                then.status(200).json_body(
                    serde_json::json!({"data": [{"id": "456", "display_name": "Bot"}]}),
                );
            })
            .await;

        let client = HelixClient::with_base_urls("cid", server.base_url(), server.base_url());
        let mut config = RuntimeConfig {
            access_token: "tok".to_string(),
            ..RuntimeConfig::default()
        };
        client.resolve_users(&mut config, "streamer").await.unwrap();

        assert_eq!(config.chat_channel_user_id, "123");
        assert_eq!(config.chat_channel_user_name, "Streamer");
        assert_eq!(config.bot_user_id, "456");
    }

    #[tokio::test]
    async fn test_create_subscription_accepted() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/eventsub/subscriptions")
                    .json_body_partial(
                        r#"{"type": "channel.chat.message", "transport": {"method": "websocket", "session_id": "sess-1"}}"#,
                    );
                then.status(202)
                    .json_body(serde_json::json!({"data": [{"id": "sub-9"}]}));
            })
            .await;

        let client = HelixClient::with_base_urls("cid", server.base_url(), server.base_url());
        let id = client
            .create_subscription(&sample_config("tok"))
            .await
            .unwrap();
        assert_eq!(id, "sub-9");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_subscription_rejected_is_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/eventsub/subscriptions");
                then.status(400).json_body(serde_json::json!({"message": "bad condition"}));
            })
            .await;

        let client = HelixClient::with_base_urls("cid", server.base_url(), server.base_url());
        let err = client
            .create_subscription(&sample_config("tok"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("channel.chat.message"));
    }

    #[tokio::test]
    async fn test_send_message_truncates_body() {
        let server = MockServer::start_async().await;
        let expected: String = "x".repeat(MAX_MESSAGE_LEN);
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/messages").json_body(
                    serde_json::json!({
                        "broadcaster_id": "123",
                        "sender_id": "456",
                        "message": expected,
                    }),
                );
                then.status(200).json_body(serde_json::json!({"data": []}));
            })
            .await;

        let client = HelixClient::with_base_urls("cid", server.base_url(), server.base_url());
        let long = "x".repeat(MAX_MESSAGE_LEN + 123);
        client
            .send_message(&sample_config("tok"), &long)
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
