//! Discord message formatting.
//!
//! Discord caps a message at 2000 characters. Long replies are cut into
//! fixed-size slices with no attempt to respect words or markdown.

use crate::message::{Embed, EmbedField};

/// Maximum message length for Discord, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Discord's "blue" embed color.
pub const EMBED_COLOR_BLUE: u32 = 0x3498db;

/// Confirmation sent after `!reset`.
pub const RESET_CONFIRMATION: &str =
    "🔄 Conversation reset! I've forgotten our previous chat. Let's start fresh!";

/// Split text into consecutive chunks of at most `MAX_MESSAGE_LENGTH` characters.
pub fn split_message(text: &str) -> Vec<String> {
    split_message_at(text, MAX_MESSAGE_LENGTH)
}

/// Split text into consecutive chunks of at most `limit` characters.
///
/// Counts Unicode scalar values, so multi-byte text is never cut mid-character.
/// Empty input yields a single empty chunk.
pub fn split_message_at(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks: Vec<String> = Vec::new();
    let mut chars = text.chars().peekable();

    while chars.peek().is_some() {
        chunks.push(chars.by_ref().take(limit).collect());
    }

    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}

/// The `!help` embed.
pub fn help_embed(max_turns: usize) -> Embed {
    Embed {
        title: "🤖 Conversation Bot Help".into(),
        description: "I'm an AI-powered bot that can chat with you!".into(),
        color: EMBED_COLOR_BLUE,
        fields: vec![
            EmbedField {
                name: "💬 How to Chat".into(),
                value: "• **In DMs**: Just send me a message!\n• **In servers**: @mention me with your message".into(),
                inline: false,
            },
            EmbedField {
                name: "📝 Commands".into(),
                value: "• `!reset` - Clear our conversation history\n• `!help` - Show this help message".into(),
                inline: false,
            },
            EmbedField {
                name: "🧠 Memory".into(),
                value: format!(
                    "I remember up to {max_turns} messages per conversation. Use `!reset` to start fresh!"
                ),
                inline: false,
            },
        ],
        footer: Some("Powered by OpenAI GPT".into()),
    }
}

/// Discord REST representation of an embed.
pub fn embed_to_json(embed: &Embed) -> serde_json::Value {
    let fields: Vec<serde_json::Value> = embed
        .fields
        .iter()
        .map(|f| serde_json::json!({ "name": f.name, "value": f.value, "inline": f.inline }))
        .collect();

    let mut json = serde_json::json!({
        "title": embed.title,
        "description": embed.description,
        "color": embed.color,
        "fields": fields,
    });
    if let Some(ref footer) = embed.footer {
        json["footer"] = serde_json::json!({ "text": footer });
    }
    json
}
