// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types. Defined in `parley-core` so they can cross the adapter trait.

pub use parley_core::types::{ConversationRecord, WhitelistEntry};
