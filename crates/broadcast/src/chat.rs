//! Inbound chat plumbing.
//!
//! The chat connection itself lives outside the engine. Whatever bridges it
//! pushes [`ChatMessage`]s into a bounded channel; the engine drains the
//! receiving end.

use score_core::ChatMessage;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use validator::Validate;

pub type ChatSender = mpsc::Sender<ChatMessage>;
pub type ChatReceiver = mpsc::Receiver<ChatMessage>;

/// Creates the bounded channel chat messages flow through.
pub fn chat_channel(capacity: usize) -> (ChatSender, ChatReceiver) {
    mpsc::channel(capacity)
}

/// Parses one newline-delimited JSON chat message. Blank and malformed lines
/// yield `None`.
pub fn parse_line(line: &str) -> Option<ChatMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<ChatMessage>(line) {
        Ok(message) if message.validate().is_ok() => Some(message),
        Ok(_) => {
            debug!("Dropping chat line with invalid fields");
            None
        }
        Err(e) => {
            debug!(error = %e, "Dropping malformed chat line");
            None
        }
    }
}

/// Forwards newline-delimited JSON chat messages from `reader` into `tx`
/// until the reader hits EOF or the receiver is dropped. Returns the number
/// of messages forwarded.
pub async fn forward_lines<R>(reader: R, tx: ChatSender) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(message) = parse_line(&line) else {
                    continue;
                };
                if tx.send(message).await.is_err() {
                    debug!("Chat receiver closed");
                    break;
                }
                forwarded += 1;
            }
            Ok(None) => {
                info!(forwarded = forwarded, "Chat input reached end of stream");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Chat input read failed");
                break;
            }
        }
    }

    forwarded
}
