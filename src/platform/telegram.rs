use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, Stream};
use teloxide::prelude::*;
use teloxide::types::UpdateKind;
use tracing::{debug, info, warn};

use crate::platform::{InboundEvent, IncomingMessage, OutboundReply, ReplySink};

/// Long-poll timeout passed to getUpdates, in seconds
const POLL_TIMEOUT_SECS: u32 = 60;

/// HTTP timeout for the bot client; must outlast a long poll
const CLIENT_TIMEOUT: Duration = Duration::from_secs(70);

/// Pause before polling again after a failed getUpdates
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Telegram rejects messages over 4096 characters
const MAX_MESSAGE_LEN: usize = 4000;

/// Build a bot whose HTTP client won't abort a long poll early.
pub fn connect(token: &str) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(CLIENT_TIMEOUT)
        .build()
        .context("Failed to build Telegram HTTP client")?;
    Ok(Bot::with_client(token, client))
}

/// Check the token against the API before entering the loop.
pub async fn verify(bot: &Bot) -> Result<()> {
    let me = bot
        .get_me()
        .await
        .context("Unable to connect to Telegram API")?;
    info!(
        "Authorized on Telegram as @{}",
        me.username.as_deref().unwrap_or("<unknown>")
    );
    Ok(())
}

struct PollState {
    bot: Bot,
    offset: i32,
    pending: VecDeque<Update>,
}

/// Lazy, never-ending feed of updates fetched by long polling.
///
/// The offset only moves past an update once that update has been yielded,
/// so Telegram keeps redelivering anything fetched but not yet consumed if
/// the process restarts.
pub fn updates(bot: Bot) -> impl Stream<Item = InboundEvent> {
    let state = PollState {
        bot,
        offset: 0,
        pending: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(update) = state.pending.pop_front() {
                state.offset = update.id.as_offset();
                return Some((to_event(update), state));
            }

            match state
                .bot
                .get_updates()
                .offset(state.offset)
                .timeout(POLL_TIMEOUT_SECS)
                .await
            {
                Ok(batch) => {
                    debug!("Received {} update(s)", batch.len());
                    state.pending.extend(batch);
                }
                Err(e) => {
                    warn!("Telegram getUpdates failed: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    })
}

/// Reduce a Telegram update to the parts the relay cares about.
pub fn to_event(update: Update) -> InboundEvent {
    let message = match update.kind {
        UpdateKind::Message(msg) => Some(IncomingMessage {
            sender: msg.from.as_ref().and_then(|user| user.username.clone()),
            chat_id: msg.chat.id,
            text: msg.text().unwrap_or_default().to_string(),
        }),
        _ => None,
    };

    InboundEvent {
        id: update.id.0,
        message,
    }
}

/// Cut a reply into pieces `TelegramSink` can send one by one, breaking at
/// the last newline or space inside each window when there is one.
fn chunk_reply(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > limit {
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let window = &rest[..cut];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|pos| pos + 1)
            .unwrap_or(cut);

        let (head, tail) = rest.split_at(cut);
        chunks.push(head.to_string());
        rest = tail;
    }

    chunks.push(rest.to_string());
    chunks
}

/// Sends replies with sendMessage.
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ReplySink for TelegramSink {
    async fn send(&self, reply: OutboundReply) -> Result<()> {
        for chunk in chunk_reply(&reply.text, MAX_MESSAGE_LEN) {
            self.bot
                .send_message(reply.chat_id, chunk)
                .await
                .with_context(|| format!("Failed to send message to chat {}", reply.chat_id.0))?;
        }
        Ok(())
    }
}
