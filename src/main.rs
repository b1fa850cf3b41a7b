//! Emberbot - Twitch chat bot runtime
//!
//! Startup sequence: capture an access token through the local listener,
//! validate it, resolve the channel and bot user ids, then run the
//! EventSub session until it closes or Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use emberbot::api::HelixClient;
use emberbot::auth::TokenCapture;
use emberbot::commands::{CommandRegistry, Dispatcher};
use emberbot::config::{RuntimeConfig, Settings};
use emberbot::session::{SessionClient, DEFAULT_SESSION_URL};
use emberbot::store::CommandStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "emberbot")]
#[command(version)]
#[command(about = "Twitch chat bot runtime over EventSub websockets")]
struct Cli {
    /// Application client id from the dev console
    #[arg(long, env = "CLIENT_ID")]
    client_id: String,

    /// OAuth redirect URL registered for the application
    #[arg(long, env = "REDIRECT_URL")]
    redirect_url: String,

    /// Login of the channel the bot joins
    #[arg(long, env = "USER_LOGIN")]
    user_login: String,

    /// Local port for the token capture listener
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Path to the command state database
    #[arg(long, default_value = ".emberbot.sqlite3")]
    store: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("emberbot={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings {
        client_id: cli.client_id,
        redirect_url: cli.redirect_url,
        user_login: cli.user_login,
        listen_port: cli.port,
        store_path: cli.store,
    };
    settings.validate().context("Invalid configuration")?;

    let mut runtime = RuntimeConfig::default();

    // One-time authorization handshake through the local listener
    let capture = TokenCapture::bind(
        settings.listen_port,
        settings.client_id.clone(),
        settings.redirect_url.clone(),
    )
    .await
    .context("Failed to start token capture listener")?;
    println!(
        "Authorize via following url: http://localhost:{}/auth",
        settings.listen_port
    );
    runtime.access_token = capture.capture().await.context("Token capture failed")?;
    drop(capture);

    let api = HelixClient::new(settings.client_id.clone());
    api.validate_token(&runtime)
        .await
        .context("Token validation failed")?;
    tracing::info!("Valid token");

    api.resolve_users(&mut runtime, &settings.user_login)
        .await
        .context("Identity resolution failed")?;
    tracing::info!(
        channel_user_id = %runtime.chat_channel_user_id,
        bot_user_id = %runtime.bot_user_id,
        "Resolved user ids"
    );

    let registry = CommandRegistry::standard().context("Command registration failed")?;
    let store =
        CommandStore::open(&settings.store_path).context("Failed to open command store")?;

    let mut session = SessionClient::new(runtime, Dispatcher::new(registry), store, Arc::new(api));
    tokio::select! {
        result = session.run(DEFAULT_SESSION_URL) => {
            result.context("Event stream session failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }

    Ok(())
}
