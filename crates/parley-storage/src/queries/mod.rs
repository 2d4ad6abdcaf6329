// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Free query functions over a [`Database`](crate::Database).

pub mod conversations;
pub mod whitelist;
