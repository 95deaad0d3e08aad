// Copyright (c) 2026 Kipu Labs. MIT License.
// See LICENSE for details.

//! # KipuBank Protocol — Core Library
//!
//! The primitives every KipuBank component shares. Nothing in here knows
//! what a vault is; it only knows what an account looks like, how much a
//! wei is worth, and how to undo a write.
//!
//! ## Architecture
//!
//! - **address** — 20-byte account identities with hex encoding.
//! - **units** — `Wei` amounts, unit constants, parsing and formatting.
//! - **events** — Notifications emitted by the ledger after state changes.
//! - **storage** — Journaled state with checkpoint / revert frames.
//! - **config** — Protocol constants and the construction-time vault config.
//!
//! ## Design Philosophy
//!
//! 1. Money is `u128` and every operation on it is checked.
//! 2. A failed call leaves nothing behind. Not a balance, not an event.
//! 3. If it touches money, it has tests.

pub mod address;
pub mod config;
pub mod events;
pub mod storage;
pub mod units;

pub use address::Address;
pub use events::VaultEvent;
pub use units::Wei;
