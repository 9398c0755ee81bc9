//! Inbound message routing.
//!
//! Every message takes exactly one path, first match wins:
//! 1. authored by the bot itself → ignored
//! 2. starts with `!` → command (`reset`, `help`; anything else is dropped)
//! 3. direct message → the whole text is the prompt
//! 4. guild message mentioning the bot → text minus the mention tokens
//! 5. anything else → ignored
//!
//! Prompts go through the history store and the completion client; the reply
//! is cut into Discord-sized fragments, the first sent as a threaded reply and
//! the rest as plain follow-ups.

use crate::discord::format::{help_embed, split_message, MAX_MESSAGE_LENGTH, RESET_CONFIRMATION};
use crate::history::HistoryStore;
use crate::message::{
    BotIdentity, ChannelKind, ChannelMessage, OutgoingContent, OutgoingMessage, Role,
};
use crate::provider::{CompletionClient, CompletionError, CompletionSettings};
use crate::traits::{Channel, ChannelResult};
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Prefix that marks a message as a command.
pub const COMMAND_PREFIX: char = '!';

/// Discord typing indicators expire after ~10 seconds.
const TYPING_REFRESH: Duration = Duration::from_secs(8);

/// Instruction prepended to every conversation.
pub const SYSTEM_PROMPT: &str = "You are a friendly and helpful Discord bot assistant. You engage in natural conversations \
and help users with various tasks.

RESPONSE GUIDELINES:
- When asked questions, provide DETAILED and COMPREHENSIVE information
- Include relevant examples, explanations, and context to fully answer the question
- Break down complex topics into easy-to-understand parts
- Use bullet points, numbered lists, or formatting to organize information clearly
- Be thorough but still conversational and friendly
- Use occasional emojis to maintain an engaging tone
- If a topic is broad, cover multiple aspects of it

IMPORTANT CONTENT GUIDELINES - YOU MUST FOLLOW THESE STRICTLY:
- Keep ALL responses appropriate for PG-13 audiences (suitable for ages 13+)
- Do NOT use profanity, explicit language, or crude humor
- Avoid discussing violence, gore, or disturbing content in detail
- Do not engage with requests for adult content, illegal activities, or harmful information
- Keep discussions family-friendly and appropriate for all ages
- If asked about inappropriate topics, politely decline and redirect to appropriate conversation
- Be respectful and maintain a positive, wholesome tone at all times";

/// Chat commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Clear the caller's history
    Reset,
    /// Show the help embed
    Help,
    /// Any other `!word`; dropped without a response
    Unknown(String),
}

impl Command {
    /// Parse a command-prefixed message. The name is the word directly after
    /// the prefix, matched case-sensitively; trailing words are ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.strip_prefix(COMMAND_PREFIX)?;
        let name = rest.split(char::is_whitespace).next().unwrap_or_default();
        Some(match name {
            "reset" => Self::Reset,
            "help" => Self::Help,
            other => Self::Unknown(other.to_string()),
        })
    }
}

/// Why a message gets no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    OwnMessage,
    NotAddressed,
    EmptyPrompt,
    /// The gateway has not reported the bot's identity yet
    NoIdentity,
}

/// What to do with an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Ignore(Skip),
    Command(Command),
    /// Generate a reply to this prompt
    Reply(String),
}

/// Classify a message for a bot with the given identity.
pub fn route(message: &ChannelMessage, bot: &BotIdentity) -> Route {
    if message.author_id == bot.id {
        return Route::Ignore(Skip::OwnMessage);
    }

    if let Some(command) = Command::parse(&message.content) {
        return Route::Command(command);
    }

    let prompt = match message.kind {
        ChannelKind::Direct => message.content.clone(),
        ChannelKind::Shared if message.mentions_user(&bot.id) => {
            strip_mentions(&message.content, &bot.id)
        }
        ChannelKind::Shared => return Route::Ignore(Skip::NotAddressed),
    };

    if prompt.is_empty() {
        return Route::Ignore(Skip::EmptyPrompt);
    }
    Route::Reply(prompt)
}

/// Remove plain (`<@ID>`) and nickname (`<@!ID>`) mentions of `bot_id`,
/// then trim surrounding whitespace.
pub fn strip_mentions(text: &str, bot_id: &str) -> String {
    text.replace(&format!("<@{bot_id}>"), "")
        .replace(&format!("<@!{bot_id}>"), "")
        .trim()
        .to_string()
}

/// Apology sent in place of a reply when the completion fails.
pub fn apology(error: &CompletionError) -> String {
    format!("Sorry, I encountered an error: {error}")
        .chars()
        .take(MAX_MESSAGE_LENGTH)
        .collect()
}

/// Split `text` into outgoing fragments answering `message`.
pub fn fragments(message: &ChannelMessage, text: &str) -> Vec<OutgoingMessage> {
    split_message(text)
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let content = OutgoingContent::text(chunk);
            if i == 0 {
                OutgoingMessage::reply(message, content)
            } else {
                OutgoingMessage::follow_up(message, content)
            }
        })
        .collect()
}

/// Routes messages and produces responses.
pub struct Dispatcher {
    history: Arc<HistoryStore>,
    client: Arc<dyn CompletionClient>,
    settings: CompletionSettings,
    system_prompt: String,
    identity: OnceLock<BotIdentity>,
}

impl Dispatcher {
    pub fn new(
        history: Arc<HistoryStore>,
        client: Arc<dyn CompletionClient>,
        settings: CompletionSettings,
    ) -> Self {
        Self {
            history,
            client,
            settings,
            system_prompt: SYSTEM_PROMPT.to_string(),
            identity: OnceLock::new(),
        }
    }

    /// Replace the default system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn identity(&self) -> Option<&BotIdentity> {
        self.identity.get()
    }

    /// Record the bot's identity from the gateway's ready event.
    ///
    /// Reconnects deliver the same identity again; only the first is kept.
    pub fn on_ready(&self, identity: BotIdentity) {
        match self.identity.get() {
            Some(known) if known.id != identity.id => {
                tracing::warn!(
                    known_id = %known.id,
                    new_id = %identity.id,
                    "Gateway reported a different bot identity; keeping the first"
                );
            }
            Some(_) => tracing::info!("Discord session resumed"),
            None => {
                tracing::info!(name = %identity.name, id = %identity.id, "Bot is online");
                tracing::info!("Ready to chat! Mention me or send a DM.");
                let _ = self.identity.set(identity);
            }
        }
    }

    /// Classify a message against the known identity.
    pub fn classify(&self, message: &ChannelMessage) -> Route {
        match self.identity.get() {
            Some(bot) => route(message, bot),
            None => Route::Ignore(Skip::NoIdentity),
        }
    }

    /// Run one exchange for `user_id` through the history store and the
    /// completion client.
    ///
    /// On failure the user turn is rolled back, along with anything the trim
    /// dropped to make room for it, so the buffer is left as it was found.
    pub async fn converse(&self, user_id: &str, text: &str) -> Result<String, CompletionError> {
        self.history.append(user_id, Role::User, text);
        let dropped = self.history.trim(user_id);
        let context = self.history.render(user_id, &self.system_prompt);

        let request = self.settings.request(context);
        match self.client.complete(request).await {
            Ok(reply) => {
                self.history.append(user_id, Role::Assistant, reply.clone());
                self.history.trim(user_id);
                Ok(reply)
            }
            Err(e) => {
                self.history.rollback_last(user_id);
                self.history.restore_oldest(user_id, dropped);
                Err(e)
            }
        }
    }

    /// Responses for a command.
    pub fn run_command(&self, message: &ChannelMessage, command: &Command) -> Vec<OutgoingMessage> {
        match command {
            Command::Reset => {
                self.history.reset(&message.author_id);
                tracing::info!(user_id = %message.author_id, "Conversation reset");
                vec![OutgoingMessage::reply(
                    message,
                    OutgoingContent::text(RESET_CONFIRMATION),
                )]
            }
            Command::Help => vec![OutgoingMessage::reply(
                message,
                OutgoingContent::Embed(help_embed(self.history.max_turns())),
            )],
            Command::Unknown(name) => {
                tracing::debug!(command = %name, "Ignoring unknown command");
                Vec::new()
            }
        }
    }

    /// Handle one inbound message end to end. Returns how many messages were sent.
    ///
    /// Fragments are sent in order; a failed send stops the rest.
    pub async fn handle(&self, message: ChannelMessage, channel: &dyn Channel) -> ChannelResult<usize> {
        let outgoing = match self.classify(&message) {
            Route::Ignore(skip) => {
                tracing::trace!(message_id = %message.id, reason = ?skip, "Ignoring message");
                return Ok(0);
            }
            Route::Command(command) => self.run_command(&message, &command),
            Route::Reply(prompt) => {
                tracing::info!(
                    user_id = %message.author_id,
                    kind = ?message.kind,
                    chars = prompt.chars().count(),
                    "Generating reply"
                );
                let result = with_typing(
                    channel,
                    &message.channel_id,
                    self.converse(&message.author_id, &prompt),
                )
                .await;

                let text = match result {
                    Ok(reply) => reply,
                    Err(e) => {
                        tracing::error!(
                            user_id = %message.author_id,
                            provider = %self.client.name(),
                            error = %e,
                            "Completion request failed"
                        );
                        apology(&e)
                    }
                };
                fragments(&message, &text)
            }
        };

        let mut sent = 0;
        for msg in outgoing {
            channel.send(msg).await?;
            sent += 1;
        }
        Ok(sent)
    }
}

/// Drive `work` to completion while keeping a typing indicator alive.
///
/// The refresh loop is polled first, so the first indicator request is issued
/// before `work` starts. A slow indicator request never holds up `work`.
async fn with_typing<F>(channel: &dyn Channel, channel_id: &str, work: F) -> F::Output
where
    F: Future,
{
    let typing = keep_typing(channel, channel_id);
    tokio::pin!(work, typing);

    tokio::select! {
        biased;
        _ = &mut typing => {}
        output = &mut work => return output,
    }
    work.await
}

/// Refresh the typing indicator until dropped.
async fn keep_typing(channel: &dyn Channel, channel_id: &str) {
    loop {
        if let Err(e) = channel.trigger_typing(channel_id).await {
            tracing::debug!(error = %e, "Typing indicator failed");
        }
        tokio::time::sleep(TYPING_REFRESH).await;
    }
}
