//! EventSub websocket session
//!
//! Owns the long-lived event-stream connection and drives the session
//! lifecycle: welcome → subscribe → keepalive / notification / reconnect /
//! revocation. Notifications carrying command-prefixed chat text are handed
//! to the dispatcher; everything else is observed and logged. The receive
//! loop is the only writer of `RuntimeConfig` after startup, and it does
//! not read the next inbound message until the current dispatch (including
//! any handler side effects) completes — replies go out in strict arrival
//! order.

use crate::api::ChatApi;
use crate::commands::{Dispatcher, COMMAND_PREFIX};
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::store::CommandStore;
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

/// Well-known event-stream endpoint
pub const DEFAULT_SESSION_URL: &str = "wss://eventsub.wss.twitch.tv/ws";

/// Status message sent through the chat channel once subscribed
const STARTUP_MESSAGE: &str = "Emberbot is up and running";

/// Outer envelope wrapping every inbound session message
#[derive(Debug, Deserialize)]
struct Envelope {
    metadata: EnvelopeMetadata,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EnvelopeMetadata {
    message_type: String,
}

/// Lifecycle states of the event-stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingWelcome,
    Subscribing,
    Active,
    Reconnecting,
    Closed,
}

/// What the receive loop does after an envelope is handled
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    /// Keep reading from the current connection
    Continue,
    /// Connect to the given URL, then abandon the current connection
    Reconnect(String),
    /// Terminal: close the session
    Close,
}

/// Event-stream session client
pub struct SessionClient {
    config: RuntimeConfig,
    dispatcher: Dispatcher,
    store: CommandStore,
    api: Arc<dyn ChatApi>,
    state: SessionState,
}

impl SessionClient {
    pub fn new(
        config: RuntimeConfig,
        dispatcher: Dispatcher,
        store: CommandStore,
        api: Arc<dyn ChatApi>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            store,
            api,
            state: SessionState::Disconnected,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current runtime config (session id is set once welcomed)
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Run the session against `url`, following server-directed reconnects
    /// until the session closes. Connect failure is fatal.
    pub async fn run(&mut self, url: &str) -> Result<()> {
        let result = self.run_session(url).await;
        if result.is_err() {
            // keep state() truthful when transport failure tears us down
            self.state = SessionState::Closed;
        }
        result
    }

    async fn run_session(&mut self, url: &str) -> Result<()> {
        self.state = SessionState::Connecting;
        let (mut stream, _) = connect_async(url).await?;
        tracing::info!(%url, "Event stream connected");
        self.state = SessionState::AwaitingWelcome;

        loop {
            let mut next_url = None;

            while let Some(message) = stream.next().await {
                let message = message?;
                let WsMessage::Text(text) = message else {
                    continue;
                };
                match self.handle_envelope(&text).await? {
                    Flow::Continue => {}
                    Flow::Reconnect(reconnect_url) => {
                        // Stop reading from this connection
                        next_url = Some(reconnect_url);
                        break;
                    }
                    Flow::Close => {
                        self.state = SessionState::Closed;
                        return Ok(());
                    }
                }
            }

            match next_url {
                Some(reconnect_url) => {
                    self.state = SessionState::Reconnecting;
                    // The current connection stays open until the replacement
                    // is established; any messages still buffered on it are
                    // discarded unread
                    let (new_stream, _) = connect_async(reconnect_url.as_str()).await?;
                    tracing::info!(url = %reconnect_url, "Event stream connected");
                    stream = new_stream;
                    self.state = SessionState::AwaitingWelcome;
                }
                None => {
                    tracing::info!("Event stream ended");
                    self.state = SessionState::Closed;
                    return Ok(());
                }
            }
        }
    }

    /// Classify and handle one inbound envelope
    async fn handle_envelope(&mut self, raw: &str) -> Result<Flow> {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error = %e, raw, "Unparseable envelope");
                return Ok(Flow::Continue);
            }
        };

        match envelope.metadata.message_type.as_str() {
            "session_welcome" => self.on_welcome(&envelope.payload).await,
            "session_keepalive" => Ok(Flow::Continue),
            "notification" => self.on_notification(&envelope.payload).await,
            "session_reconnect" => {
                let reconnect_url = envelope.payload["session"]["reconnect_url"]
                    .as_str()
                    .unwrap_or_default();
                if reconnect_url.is_empty() {
                    return Err(Error::Session(
                        "session_reconnect without reconnect_url".to_string(),
                    ));
                }
                tracing::warn!(%reconnect_url, "Session reconnect requested");
                Ok(Flow::Reconnect(reconnect_url.to_string()))
            }
            "revocation" => {
                tracing::error!(raw, "Subscription revoked");
                Ok(Flow::Close)
            }
            other => {
                tracing::error!(message_type = other, raw, "Unknown message type");
                Ok(Flow::Continue)
            }
        }
    }

    /// Store the session id, register the subscription, announce readiness
    async fn on_welcome(&mut self, payload: &serde_json::Value) -> Result<Flow> {
        let session_id = payload["session"]["id"].as_str().unwrap_or_default();
        if session_id.is_empty() {
            return Err(Error::Session(
                "session_welcome without session id".to_string(),
            ));
        }
        self.config.session_id = session_id.to_string();
        self.state = SessionState::Subscribing;

        // A rejected subscription is fatal; there is no retry policy
        let subscription_id = self.api.create_subscription(&self.config).await?;
        tracing::info!(
            subscription = %subscription_id,
            session = %self.config.session_id,
            "Subscribed to channel.chat.message"
        );

        self.api.send_message(&self.config, STARTUP_MESSAGE).await?;
        self.state = SessionState::Active;
        Ok(Flow::Continue)
    }

    /// Observe a chat message; dispatch it only if command-prefixed
    async fn on_notification(&mut self, payload: &serde_json::Value) -> Result<Flow> {
        let event = &payload["event"];
        let text = event["message"]["text"].as_str().unwrap_or_default();
        let author = event["chatter_user_name"].as_str().unwrap_or_default();
        tracing::info!(author, text, "Chat message");

        if text.starts_with(COMMAND_PREFIX) {
            // Command failures surface as chat replies or logs, never as
            // a session teardown
            if let Err(e) = self
                .dispatcher
                .dispatch(&self.config, &self.store, self.api.as_ref(), text, author)
                .await
            {
                tracing::error!(error = %e, text, "Command dispatch failed");
            }
        }

        Ok(Flow::Continue)
    }
}
