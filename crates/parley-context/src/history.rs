// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stored exchanges expanded back into conversation turns.

use parley_core::{ConversationRecord, Message};

/// One user turn and one assistant turn per record, oldest first.
pub fn history_to_messages(records: &[ConversationRecord]) -> Vec<Message> {
    records
        .iter()
        .flat_map(|record| {
            [
                Message::user(record.user_message.as_str()),
                Message::assistant(record.bot_response.as_str()),
            ]
        })
        .collect()
}
