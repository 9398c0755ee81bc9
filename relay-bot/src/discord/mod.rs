//! Discord channel.
//!
//! Receives messages over the Discord Gateway WebSocket and sends replies
//! through the REST API.

pub mod format;

use crate::message::{
    BotIdentity, ChannelKind, ChannelMessage, GatewayEvent, OutgoingContent, OutgoingMessage,
};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";

/// GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
pub const GATEWAY_INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 12) | (1 << 15);

const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;

/// Discord channel using Gateway WebSocket for real-time messaging.
pub struct DiscordChannel {
    bot_token: String,
    client: Client,
    api_base: String,
}

impl DiscordChannel {
    /// Create a new Discord channel.
    pub fn new(bot_token: String) -> Self {
        Self::with_api_base(bot_token, DEFAULT_API_BASE)
    }

    /// Create with a custom REST base URL.
    pub fn with_api_base(bot_token: String, api_base: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            bot_token,
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    async fn gateway_url(&self) -> ChannelResult<String> {
        let resp = self
            .client
            .get(format!("{}/gateway/bot", self.api_base))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| ChannelError::Connection(format!("Failed to get gateway: {e}")))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ChannelError::Auth("Discord rejected the bot token".into()));
        }

        let resp: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Connection(format!("Invalid gateway response: {e}")))?;

        let url = resp
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_GATEWAY_URL);
        Ok(format!("{url}/?v=10&encoding=json"))
    }
}

/// Identify payload (opcode 2).
fn identify_payload(token: &str) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": GATEWAY_INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "relay-bot",
                "device": "relay-bot"
            }
        }
    })
}

/// Heartbeat payload (opcode 1) carrying the last sequence number seen.
fn heartbeat_payload(sequence: Option<u64>) -> Value {
    json!({ "op": OP_HEARTBEAT, "d": sequence })
}

/// Gateway close codes that reconnecting cannot fix.
fn close_code_error(code: u16) -> Option<ChannelError> {
    match code {
        4004 => Some(ChannelError::Auth("Discord rejected the bot token".into())),
        4013 | 4014 => Some(ChannelError::Auth(
            "Gateway intents rejected; enable the Message Content intent for this bot".into(),
        )),
        _ => None,
    }
}

/// Parse the `d` object of a READY dispatch.
pub fn parse_ready(d: &Value) -> Option<BotIdentity> {
    let user = d.get("user")?;
    let id = user.get("id")?.as_str()?.to_string();
    let name = user
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(BotIdentity { id, name })
}

/// Parse the `d` object of a MESSAGE_CREATE dispatch.
///
/// Messages without a `guild_id` arrive over a DM channel.
pub fn parse_message_create(d: &Value) -> Option<ChannelMessage> {
    let author = d.get("author")?;
    let author_id = author.get("id")?.as_str()?.to_string();
    let author_name = author
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let kind = match d.get("guild_id").and_then(Value::as_str) {
        Some(_) => ChannelKind::Shared,
        None => ChannelKind::Direct,
    };

    let mentions: Vec<String> = d
        .get("mentions")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|m| m.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(ChannelMessage {
        id: d.get("id")?.as_str()?.to_string(),
        channel_id: d.get("channel_id")?.as_str()?.to_string(),
        kind,
        author_id,
        author_name,
        content: d
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        mentions,
    })
}

/// Build the REST body for an outgoing message.
fn message_body(message: &OutgoingMessage) -> Value {
    let mut body = match &message.content {
        OutgoingContent::Text { text } => json!({ "content": text }),
        OutgoingContent::Embed(embed) => json!({ "embeds": [format::embed_to_json(embed)] }),
    };

    if let Some(ref reply_to) = message.reply_to {
        body["message_reference"] = json!({ "message_id": reply_to, "fail_if_not_exists": false });
    }
    body
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        let url = format!("{}/channels/{}/messages", self.api_base, message.channel_id);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&message_body(&message))
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("Discord send error: {e}")))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after_secs = resp
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("retry_after").and_then(Value::as_f64))
                .map_or(1, |secs| secs.ceil() as u64);
            return Err(ChannelError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let error = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed(format!(
                "Discord API error ({status}): {error}"
            )));
        }

        let msg_data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Internal(format!("Failed to parse response: {e}")))?;

        Ok(msg_data
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    async fn trigger_typing(&self, channel_id: &str) -> ChannelResult<()> {
        let resp = self
            .client
            .post(format!("{}/channels/{channel_id}/typing", self.api_base))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("Discord typing error: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::SendFailed(format!(
                "Discord typing error ({})",
                resp.status()
            )))
        }
    }

    async fn listen(&self, tx: mpsc::Sender<GatewayEvent>) -> ChannelResult<()> {
        let ws_url = self.gateway_url().await?;
        tracing::info!("Discord: connecting to gateway...");

        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .map_err(|e| ChannelError::Connection(format!("WebSocket connection failed: {e}")))?;

        let (mut write, mut read) = ws_stream.split();

        // Hello (opcode 10) carries the heartbeat interval
        let hello = read
            .next()
            .await
            .ok_or_else(|| ChannelError::Connection("No hello from gateway".into()))?
            .map_err(|e| ChannelError::Connection(format!("WebSocket error: {e}")))?;

        let hello_data: Value = serde_json::from_str(&hello.to_string())
            .map_err(|e| ChannelError::Connection(format!("Invalid hello: {e}")))?;

        if hello_data.get("op").and_then(Value::as_u64) != Some(OP_HELLO) {
            return Err(ChannelError::Connection("Expected hello from gateway".into()));
        }

        let heartbeat_interval = hello_data
            .get("d")
            .and_then(|d| d.get("heartbeat_interval"))
            .and_then(Value::as_u64)
            .unwrap_or(41250);

        write
            .send(Message::Text(identify_payload(&self.bot_token).to_string()))
            .await
            .map_err(|e| ChannelError::Connection(format!("Failed to identify: {e}")))?;

        tracing::info!("Discord: connected and identified");

        let mut heartbeat = tokio::time::interval(Duration::from_millis(heartbeat_interval));
        // The first tick completes immediately; skip it so the first beat lands one interval in.
        heartbeat.tick().await;
        let mut sequence: Option<u64> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let hb = heartbeat_payload(sequence);
                    if write.send(Message::Text(hb.to_string())).await.is_err() {
                        return Err(ChannelError::Connection("Heartbeat send failed".into()));
                    }
                }
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(Message::Text(t))) => t,
                        Some(Ok(Message::Close(frame))) => {
                            if let Some(err) = frame.as_ref().and_then(|f| close_code_error(u16::from(f.code))) {
                                return Err(err);
                            }
                            tracing::warn!(?frame, "Discord: gateway closed the connection");
                            break;
                        }
                        None => break,
                        Some(Err(e)) => {
                            return Err(ChannelError::Connection(format!("WebSocket error: {e}")));
                        }
                        _ => continue,
                    };

                    let event: Value = match serde_json::from_str(&msg) {
                        Ok(e) => e,
                        Err(e) => {
                            tracing::debug!(error = %e, "Discord: skipping unparseable gateway frame");
                            continue;
                        }
                    };

                    if let Some(s) = event.get("s").and_then(Value::as_u64) {
                        sequence = Some(s);
                    }

                    match event.get("op").and_then(Value::as_u64) {
                        Some(OP_DISPATCH) => {}
                        Some(OP_HEARTBEAT) => {
                            let hb = heartbeat_payload(sequence);
                            if write.send(Message::Text(hb.to_string())).await.is_err() {
                                return Err(ChannelError::Connection("Heartbeat send failed".into()));
                            }
                            continue;
                        }
                        Some(OP_RECONNECT) => {
                            tracing::info!("Discord: gateway requested reconnect");
                            break;
                        }
                        Some(OP_INVALID_SESSION) => {
                            return Err(ChannelError::Connection("Invalid gateway session".into()));
                        }
                        // Heartbeat ACKs and anything unrecognised
                        _ => continue,
                    }

                    let Some(d) = event.get("d") else {
                        continue;
                    };

                    let gateway_event = match event.get("t").and_then(Value::as_str) {
                        Some("READY") => match parse_ready(d) {
                            Some(identity) => GatewayEvent::Ready(identity),
                            None => {
                                tracing::warn!("Discord: READY without a user object");
                                continue;
                            }
                        },
                        Some("MESSAGE_CREATE") => match parse_message_create(d) {
                            Some(message) => {
                                tracing::debug!(
                                    channel = "discord",
                                    user_id = %message.author_id,
                                    chat_id = %message.channel_id,
                                    kind = ?message.kind,
                                    "IM message received"
                                );
                                GatewayEvent::Message(message)
                            }
                            None => {
                                tracing::warn!("Discord: malformed MESSAGE_CREATE payload");
                                continue;
                            }
                        },
                        _ => continue,
                    };

                    if tx.send(gateway_event).await.is_err() {
                        // Processor is gone; nothing left to deliver to.
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        let resp = self
            .client
            .get(format!("{}/users/@me", self.api_base))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| ChannelError::Connection(format!("Health check failed: {e}")))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::UNAUTHORIZED => {
                Err(ChannelError::Auth("Discord authentication failed".into()))
            }
            s => Err(ChannelError::Connection(format!("Health check returned {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Embed;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn discord_channel_name() {
        let ch = DiscordChannel::new("fake".into());
        assert_eq!(ch.name(), "discord");
    }

    #[test]
    fn intents_include_direct_messages_and_content() {
        assert_eq!(GATEWAY_INTENTS, 37377);
        let identify = identify_payload("tok");
        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], "tok");
        assert_eq!(identify["d"]["intents"], 37377);
    }

    #[test]
    fn heartbeat_carries_sequence() {
        assert_eq!(heartbeat_payload(None), json!({"op": 1, "d": null}));
        assert_eq!(heartbeat_payload(Some(42)), json!({"op": 1, "d": 42}));
    }

    #[test]
    fn fatal_close_codes() {
        assert!(matches!(close_code_error(4004), Some(ChannelError::Auth(_))));
        assert!(matches!(close_code_error(4014), Some(ChannelError::Auth(_))));
        assert!(close_code_error(4000).is_none());
        assert!(close_code_error(1000).is_none());
    }

    #[test]
    fn parse_ready_identity() {
        let d = json!({"v": 10, "user": {"id": "999", "username": "relay", "bot": true}});
        assert_eq!(
            parse_ready(&d),
            Some(BotIdentity {
                id: "999".into(),
                name: "relay".into()
            })
        );
        assert_eq!(parse_ready(&json!({})), None);
    }

    #[test]
    fn parse_guild_message() {
        let d = json!({
            "id": "m1",
            "channel_id": "c1",
            "guild_id": "g1",
            "author": {"id": "u1", "username": "alice"},
            "content": "<@999> explain recursion",
            "mentions": [{"id": "999", "username": "relay"}]
        });
        let msg = parse_message_create(&d).unwrap();
        assert_eq!(msg.kind, ChannelKind::Shared);
        assert_eq!(msg.author_id, "u1");
        assert_eq!(msg.author_name, "alice");
        assert_eq!(msg.mentions, vec!["999".to_string()]);
        assert!(msg.mentions_user("999"));
    }

    #[test]
    fn parse_direct_message() {
        let d = json!({
            "id": "m2",
            "channel_id": "dm1",
            "author": {"id": "u1", "username": "alice"},
            "content": "hello"
        });
        let msg = parse_message_create(&d).unwrap();
        assert_eq!(msg.kind, ChannelKind::Direct);
        assert!(msg.mentions.is_empty());
        assert_eq!(msg.content, "hello");
    }

    #[test]
    fn parse_message_without_author_is_rejected() {
        let d = json!({"id": "m3", "channel_id": "c1", "content": "x"});
        assert!(parse_message_create(&d).is_none());
    }

    #[test]
    fn reply_body_has_reference() {
        let msg = OutgoingMessage {
            channel_id: "c1".into(),
            reply_to: Some("m1".into()),
            content: OutgoingContent::text("hi"),
        };
        let body = message_body(&msg);
        assert_eq!(body["content"], "hi");
        assert_eq!(body["message_reference"]["message_id"], "m1");
    }

    #[test]
    fn embed_body() {
        let msg = OutgoingMessage {
            channel_id: "c1".into(),
            reply_to: None,
            content: OutgoingContent::Embed(Embed {
                title: "t".into(),
                description: "d".into(),
                color: 1,
                fields: vec![],
                footer: None,
            }),
        };
        let body = message_body(&msg);
        assert_eq!(body["embeds"][0]["title"], "t");
        assert!(body.get("message_reference").is_none());
        assert!(body.get("content").is_none());
    }

    #[tokio::test]
    async fn send_posts_to_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/c1/messages"))
            .and(header("authorization", "Bot tok"))
            .and(body_json(json!({"content": "plain"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "sent-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let ch = DiscordChannel::with_api_base("tok".into(), server.uri());
        let id = ch
            .send(OutgoingMessage {
                channel_id: "c1".into(),
                reply_to: None,
                content: OutgoingContent::text("plain"),
            })
            .await
            .unwrap();
        assert_eq!(id, "sent-1");
    }

    #[tokio::test]
    async fn send_reports_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/c1/messages"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({"retry_after": 1.5})))
            .mount(&server)
            .await;

        let ch = DiscordChannel::with_api_base("tok".into(), server.uri());
        let err = ch
            .send(OutgoingMessage {
                channel_id: "c1".into(),
                reply_to: None,
                content: OutgoingContent::text("x"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::RateLimited { retry_after_secs: 2 }));
    }

    #[tokio::test]
    async fn typing_and_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/c1/typing"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/@me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let ch = DiscordChannel::with_api_base("tok".into(), server.uri());
        assert!(ch.trigger_typing("c1").await.is_ok());
        assert!(matches!(ch.health_check().await, Err(ChannelError::Auth(_))));
    }

    #[tokio::test]
    async fn listen_with_rejected_token_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gateway/bot"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let ch = DiscordChannel::with_api_base("bad".into(), server.uri());
        let (tx, _rx) = mpsc::channel(1);
        let err = ch.listen(tx).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
