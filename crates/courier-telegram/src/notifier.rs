//! Best-effort delivery of execution summaries via a Telegram bot.
//!
//! Tries MarkdownV2 first; falls back to plain text if Telegram rejects the
//! parse mode.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::debug;

use courier_channels::{ChannelError, Notifier};

/// Escape special characters for Telegram MarkdownV2.
///
/// MarkdownV2 requires escaping: `_ * [ ] ( ) ~ ` > # + - = | { } . !`
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '='
            | '|' | '{' | '}' | '.' | '!' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Notifier backed by a Telegram bot account.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str) -> Self {
        Self {
            bot: Bot::new(bot_token),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, remote_id: i64, text: &str) -> Result<(), ChannelError> {
        let chat_id = ChatId(remote_id);
        let escaped = escape_markdown_v2(text);

        let sent = self
            .bot
            .send_message(chat_id, &escaped)
            .parse_mode(ParseMode::MarkdownV2)
            .await;

        if let Err(e) = sent {
            // MarkdownV2 rejected — retry as plain text before giving up.
            debug!(error = %e, "MarkdownV2 notification rejected, retrying plain");
            self.bot
                .send_message(chat_id, text)
                .await
                .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_characters() {
        let input = "Task 'x' run #3: sent to 2/3 destinations.";
        let escaped = escape_markdown_v2(input);
        assert!(escaped.contains("\\#"));
        assert!(escaped.contains("\\."));
        assert!(!escaped.contains("\\'"));
    }

    #[test]
    fn leaves_normal_text_alone() {
        let input = "Hello world 123 abc";
        assert_eq!(escape_markdown_v2(input), input);
    }

    #[test]
    fn escapes_every_reserved_character_once() {
        let input = "_*[]()~`>#+-=|{}.!";
        let escaped = escape_markdown_v2(input);
        assert_eq!(escaped.len(), input.len() * 2);
        assert!(escaped.chars().step_by(2).all(|c| c == '\\'));
    }
}
