//! # emberbot
//!
//! Twitch chat bot runtime over EventSub websockets.
//!
//! ## Overview
//!
//! Emberbot obtains a bearer token via the implicit OAuth grant (captured by
//! a minimal local HTTP listener), opens a persistent EventSub websocket
//! session, and reacts to chat-message notifications by dispatching
//! registered `!`-prefixed commands backed by a small persistent store.
//!
//! ## Quick Start
//!
//! ```rust
//! use emberbot::commands::CommandRegistry;
//!
//! let registry = CommandRegistry::standard().unwrap();
//! assert!(registry.get("!help").is_some());
//! ```
//!
//! ## Architecture
//!
//! - **TokenCapture** — local listener that intercepts the OAuth redirect
//! - **HelixClient** — single-shot REST wrappers behind the `ChatApi` seam
//! - **CommandRegistry / Dispatcher** — prefixed chat text to guarded handlers
//! - **CommandStore** — durable key/value command state (SQLite, WAL)
//! - **SessionClient** — the event-stream session state machine

pub mod api;
pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod session;
pub mod store;

// Re-export core types
pub use api::{ChatApi, HelixClient, MAX_MESSAGE_LEN};
pub use auth::TokenCapture;
pub use commands::{CommandRegistry, Dispatcher, COMMAND_PREFIX};
pub use config::{RuntimeConfig, Settings};
pub use error::{Error, Result};
pub use session::{SessionClient, SessionState, DEFAULT_SESSION_URL};
pub use store::CommandStore;
