//! Relay Bot - a Discord conversation bot backed by an OpenAI-compatible
//! completion API.
//!
//! ## Architecture
//!
//! ```text
//! Discord gateway → listener → queue → processor → Dispatcher → CompletionClient
//!                                                      ↓
//! Discord REST  ←────────────── send ←──────── reply fragments
//! ```
//!
//! Each user has a bounded conversation history that is replayed to the model
//! on every prompt, so the bot remembers recent context across messages.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod bridge;
pub mod discord;
pub mod dispatcher;
pub mod history;
pub mod message;
pub mod provider;
pub mod traits;

// Re-export commonly used types
pub use bridge::{spawn_processor, spawn_supervised_listener, EVENT_QUEUE_CAPACITY};
pub use discord::DiscordChannel;
pub use dispatcher::{Command, Dispatcher, Route, Skip, SYSTEM_PROMPT};
pub use history::HistoryStore;
pub use message::{
    BotIdentity, ChannelKind, ChannelMessage, Embed, EmbedField, GatewayEvent, OutgoingContent,
    OutgoingMessage, Role, Turn,
};
pub use provider::{
    CompletionClient, CompletionError, CompletionRequest, CompletionSettings, OpenAIClient,
};
pub use traits::{Channel, ChannelError, ChannelResult};

use relay_common::config::Config;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Listener restart backoff, in seconds.
const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;

/// Build the bot from configuration and run it until Ctrl-C.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let history = Arc::new(HistoryStore::new(config.history.max_turns));
    let client: Arc<dyn CompletionClient> = Arc::new(OpenAIClient::from_config(&config.llm));
    let dispatcher = Arc::new(Dispatcher::new(
        history,
        client,
        CompletionSettings::from(&config.llm),
    ));
    let channel: Arc<dyn Channel> = Arc::new(DiscordChannel::new(config.discord.bot_token.clone()));

    if let Err(e) = channel.health_check().await {
        if e.is_fatal() {
            return Err(e.into());
        }
        tracing::warn!(error = %e, "Discord health check failed; connecting anyway");
    }

    tracing::info!(
        model = %config.llm.model,
        max_history = config.history.max_turns,
        "Starting Discord bot"
    );

    serve(dispatcher, channel).await
}

/// Connect `channel` to `dispatcher` and run until Ctrl-C or until the
/// listener gives up.
pub async fn serve(dispatcher: Arc<Dispatcher>, channel: Arc<dyn Channel>) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let processor = spawn_processor(dispatcher, channel.clone(), rx);
    let mut listener =
        spawn_supervised_listener(channel, tx, INITIAL_BACKOFF_SECS, MAX_BACKOFF_SECS);

    let outcome = tokio::select! {
        result = &mut listener => {
            result?;
            Err(anyhow::anyhow!(
                "Discord listener stopped; check DISCORD_TOKEN and the bot's gateway intents"
            ))
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutdown signal received");
            listener.abort();
            Ok(())
        }
    };

    // The queue closes once the listener is gone; the processor then finishes
    // the messages already in flight.
    processor.await?;
    tracing::info!("Relay bot stopped");
    outcome
}
