//! Message types exchanged between the gateway, the dispatcher, and the
//! history store.

use serde::{Deserialize, Serialize};

/// Conversation role of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    #[serde(rename = "content")]
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Where a message was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// One-to-one DM; every message is addressed to the bot
    Direct,
    /// Guild channel; the bot must be mentioned
    Shared,
}

/// The bot's own account, learned from the gateway's ready event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: String,
    pub name: String,
}

/// An inbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Platform message ID, used as the target of threaded replies
    pub id: String,
    pub channel_id: String,
    pub kind: ChannelKind,
    pub author_id: String,
    pub author_name: String,
    /// Raw message text
    pub content: String,
    /// User IDs the platform resolved as mentioned in this message
    #[serde(default)]
    pub mentions: Vec<String>,
}

impl ChannelMessage {
    /// Whether `user_id` is mentioned, either in the resolved mention list or
    /// as a plain (`<@ID>`) or nickname (`<@!ID>`) token in the text.
    pub fn mentions_user(&self, user_id: &str) -> bool {
        self.mentions.iter().any(|m| m == user_id)
            || self.content.contains(&format!("<@{user_id}>"))
            || self.content.contains(&format!("<@!{user_id}>"))
    }
}

/// Events delivered by a gateway listener, in arrival order.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Session established
    Ready(BotIdentity),
    /// A message was posted somewhere the bot can see
    Message(ChannelMessage),
}

/// Outgoing message to send to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub channel_id: String,
    /// Message this one is a threaded reply to
    pub reply_to: Option<String>,
    pub content: OutgoingContent,
}

impl OutgoingMessage {
    /// Threaded reply to `message`.
    pub fn reply(message: &ChannelMessage, content: OutgoingContent) -> Self {
        Self {
            channel_id: message.channel_id.clone(),
            reply_to: Some(message.id.clone()),
            content,
        }
    }

    /// Plain message in the same channel as `message`.
    pub fn follow_up(message: &ChannelMessage, content: OutgoingContent) -> Self {
        Self {
            channel_id: message.channel_id.clone(),
            reply_to: None,
            content,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            OutgoingContent::Text { text } => Some(text),
            OutgoingContent::Embed(_) => None,
        }
    }
}

/// Outgoing message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingContent {
    Text { text: String },
    Embed(Embed),
}

impl OutgoingContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Rich structured message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    /// RGB color as 0xRRGGBB
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str, mentions: &[&str]) -> ChannelMessage {
        ChannelMessage {
            id: "m1".into(),
            channel_id: "c1".into(),
            kind: ChannelKind::Shared,
            author_id: "u1".into(),
            author_name: "alice".into(),
            content: content.into(),
            mentions: mentions.iter().map(|m| (*m).to_string()).collect(),
        }
    }

    #[test]
    fn test_turn_serializes_as_chat_message() {
        let json = serde_json::to_value(Turn::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_mentions_user_via_token() {
        assert!(message("<@42> hello", &[]).mentions_user("42"));
        assert!(message("hello <@!42>", &[]).mentions_user("42"));
        assert!(!message("hello <@421>", &[]).mentions_user("42"));
    }

    #[test]
    fn test_mentions_user_via_resolved_list() {
        assert!(message("hello", &["42"]).mentions_user("42"));
        assert!(!message("hello", &["7"]).mentions_user("42"));
    }

    #[test]
    fn test_reply_and_follow_up_targets() {
        let msg = message("hi", &[]);
        let reply = OutgoingMessage::reply(&msg, OutgoingContent::text("a"));
        let follow = OutgoingMessage::follow_up(&msg, OutgoingContent::text("b"));
        assert_eq!(reply.reply_to.as_deref(), Some("m1"));
        assert!(reply.is_reply());
        assert!(!follow.is_reply());
        assert_eq!(follow.channel_id, "c1");
        assert_eq!(follow.text(), Some("b"));
    }
}
