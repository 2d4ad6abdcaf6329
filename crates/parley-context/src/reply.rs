// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Folding a replied-to message into the user's prompt.

/// The message a user replied to, reduced to what the prompt needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    /// Text or caption of the replied message.
    pub content: String,
    pub sender_id: i64,
    pub sender_name: String,
}

/// Who wrote the replied message, relative to the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyAuthor {
    Bot,
    Sender,
    Other,
}

impl ReplyAuthor {
    fn note(self) -> &'static str {
        match self {
            Self::Bot => "User replied to a bot message.",
            Self::Sender => "User replied to their own message.",
            Self::Other => "User replied to another user's message.",
        }
    }
}

/// Identity of the bot and the current sender, used to classify replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Participants {
    pub bot_id: Option<i64>,
    pub sender_id: Option<i64>,
}

impl Participants {
    pub fn classify(&self, target: &ReplyTarget) -> ReplyAuthor {
        if self.bot_id == Some(target.sender_id) {
            ReplyAuthor::Bot
        } else if self.sender_id == Some(target.sender_id) {
            ReplyAuthor::Sender
        } else {
            ReplyAuthor::Other
        }
    }
}

/// The prompt sent to the model for this turn.
///
/// Without a reply (or with an empty one) this is the trimmed prompt.
pub fn build_reply_prompt(
    prompt: &str,
    reply: Option<&ReplyTarget>,
    participants: Participants,
) -> String {
    let prompt = prompt.trim();
    let Some(target) = reply.filter(|t| !t.content.trim().is_empty()) else {
        return prompt.to_string();
    };

    let author = participants.classify(target);
    let mut context = format!(
        "_instruction: {} Use the replied message as context.\nReplied message content: '{}'",
        author.note(),
        target.content.trim()
    );
    if author == ReplyAuthor::Other {
        context.push_str("\nSent by: ");
        context.push_str(target.sender_name.trim());
    }
    format!("{context}\nUser Prompt: {prompt}")
}
