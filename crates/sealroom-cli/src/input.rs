//! Chat line parsing and message rendering.

use sealroom_core::{Conversation, ConversationKind, DecryptedMessage};
use thiserror::Error;

/// One line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLine {
    /// `#room text`
    Room {
        /// Room name
        room: String,
        /// Message text
        text: String,
    },
    /// `@peer text`
    Direct {
        /// Recipient username
        peer: String,
        /// Message text
        text: String,
    },
    /// `/history #room` or `/history @peer`
    History(Conversation),
    /// `/quit`
    Quit,
    /// Blank line
    Blank,
}

/// Lines the prompt cannot act on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// `#` or `@` with no name after it.
    #[error("missing room or user name")]
    MissingTarget,

    /// A target with nothing to send.
    #[error("nothing to send to {target}")]
    MissingText {
        /// The `#room` or `@peer` prefix as typed
        target: String,
    },

    /// Anything else.
    #[error("unrecognized input (use #room text, @user text, /history, /quit)")]
    Unrecognized,
}

impl ChatLine {
    /// Parse one prompt line.
    pub fn parse(line: &str) -> Result<Self, InputError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Blank);
        }

        if line == "/quit" {
            return Ok(Self::Quit);
        }

        if let Some(target) = line.strip_prefix("/history") {
            let conversation = parse_conversation(target.trim())?;
            return Ok(Self::History(conversation));
        }

        let (target, text) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let text = text.trim();
        let conversation = parse_conversation(target)?;
        if text.is_empty() {
            return Err(InputError::MissingText { target: target.to_string() });
        }

        Ok(match conversation.kind {
            ConversationKind::Room => Self::Room { room: conversation.id, text: text.to_string() },
            ConversationKind::Dm => Self::Direct { peer: conversation.id, text: text.to_string() },
        })
    }
}

fn parse_conversation(target: &str) -> Result<Conversation, InputError> {
    let (kind, name) = if let Some(name) = target.strip_prefix('#') {
        (ConversationKind::Room, name)
    } else if let Some(name) = target.strip_prefix('@') {
        (ConversationKind::Dm, name)
    } else {
        return Err(InputError::Unrecognized);
    };

    if name.is_empty() {
        return Err(InputError::MissingTarget);
    }
    Ok(Conversation { kind, id: name.to_string() })
}

/// Render a delivered message as one output line.
pub fn render<I>(message: &DecryptedMessage<I>) -> String {
    format!("[{}] {}: {}", message.conversation, message.sender, message.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_and_direct_lines() {
        assert_eq!(
            ChatLine::parse("#general hello there"),
            Ok(ChatLine::Room { room: "general".into(), text: "hello there".into() })
        );
        assert_eq!(
            ChatLine::parse("  @bob   secret  "),
            Ok(ChatLine::Direct { peer: "bob".into(), text: "secret".into() })
        );
    }

    #[test]
    fn commands() {
        assert_eq!(ChatLine::parse("/quit"), Ok(ChatLine::Quit));
        assert_eq!(ChatLine::parse("   "), Ok(ChatLine::Blank));
        assert_eq!(
            ChatLine::parse("/history @bob"),
            Ok(ChatLine::History(Conversation::dm("bob")))
        );
    }

    #[test]
    fn rejects_incomplete_lines() {
        assert_eq!(
            ChatLine::parse("#general"),
            Err(InputError::MissingText { target: "#general".into() })
        );
        assert_eq!(ChatLine::parse("@ hi"), Err(InputError::MissingTarget));
        assert_eq!(ChatLine::parse("hello"), Err(InputError::Unrecognized));
        assert_eq!(ChatLine::parse("/history"), Err(InputError::Unrecognized));
    }

    #[test]
    fn renders_conversation_prefix() {
        let message = DecryptedMessage {
            sender: "alice".to_string(),
            text: "hello".to_string(),
            conversation: Conversation::room("general"),
            received_at: 0u64,
        };
        insta::assert_snapshot!(render(&message), @"[#general] alice: hello");

        let dm = DecryptedMessage { conversation: Conversation::dm("alice"), ..message };
        insta::assert_snapshot!(render(&dm), @"[@alice] alice: hello");
    }
}
