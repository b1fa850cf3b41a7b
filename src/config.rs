//! Startup settings and mutable runtime state
//!
//! `Settings` holds the externally sourced inputs (client id, redirect URL,
//! channel login) and never changes after startup. `RuntimeConfig` is the
//! per-process mutable state filled progressively during the startup
//! sequence: the token capture listener sets `access_token`, identity
//! resolution sets the user ids and channel name, and the session receive
//! loop sets `session_id` (again on every server-directed reconnect). After
//! startup completes, only the receive loop mutates it.

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Default port for the local token capture listener
pub const DEFAULT_LISTEN_PORT: u16 = 3000;

/// Default path for the command state database
pub const DEFAULT_STORE_PATH: &str = ".emberbot.sqlite3";

/// Immutable startup settings sourced from CLI flags and environment
#[derive(Debug, Clone)]
pub struct Settings {
    /// Application client id from the platform dev console
    pub client_id: String,

    /// OAuth redirect URL registered for the application
    pub redirect_url: String,

    /// Login of the channel the bot joins and listens to
    pub user_login: String,

    /// Local port the token capture listener binds
    pub listen_port: u16,

    /// Path to the command state database
    pub store_path: PathBuf,
}

impl Settings {
    /// Validate that all required inputs are present
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("client id is not set".to_string()));
        }
        if self.redirect_url.trim().is_empty() {
            return Err(Error::Config("redirect URL is not set".to_string()));
        }
        if self.user_login.trim().is_empty() {
            return Err(Error::Config("channel login is not set".to_string()));
        }
        Ok(())
    }
}

/// Mutable per-process runtime state
///
/// All fields start empty and are written exactly once during startup,
/// except `session_id` which is reset on every reconnect handoff.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Bearer token obtained via the implicit grant
    pub access_token: String,

    /// Identifier of the current event-stream session
    pub session_id: String,

    /// User id of the bot account
    pub bot_user_id: String,

    /// User id of the channel the bot listens to
    pub chat_channel_user_id: String,

    /// Display name of the channel owner (admin guard compares against this)
    pub chat_channel_user_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_settings() -> Settings {
        Settings {
            client_id: "abc123".to_string(),
            redirect_url: "http://localhost:3000/".to_string(),
            user_login: "streamer".to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }

    #[test]
    fn test_settings_validate_ok() {
        assert!(sample_settings().validate().is_ok());
    }

    #[test]
    fn test_settings_validate_missing_client_id() {
        let settings = Settings {
            client_id: "".to_string(),
            ..sample_settings()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("client id"));
    }

    #[test]
    fn test_settings_validate_missing_login() {
        let settings = Settings {
            user_login: "   ".to_string(),
            ..sample_settings()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_runtime_config_starts_empty() {
        let config = RuntimeConfig::default();
        assert!(config.access_token.is_empty());
        assert!(config.session_id.is_empty());
        assert!(config.bot_user_id.is_empty());
        assert!(config.chat_channel_user_id.is_empty());
        assert!(config.chat_channel_user_name.is_empty());
    }
}
