//! # KipuBank Contracts
//!
//! The personal vault: users deposit the native asset into their own
//! balance and withdraw it later, within two fixed limits.
//!
//! - **Personal Vault** — the ledger. Balances, counters, caps, and the
//!   deposit / withdraw entry points.
//! - **Guard** — a scoped reentrancy lock around the withdrawal path.
//! - **Recipient** — the seam where value leaves the vault and arbitrary
//!   recipient logic runs, possibly calling straight back in.
//! - **Entry** — call routing: named methods, plain value transfers
//!   (receive) and unrecognized calls carrying value (fallback).
//!
//! ## Design Principles
//!
//! 1. Checks, then effects, then interactions. Always in that order.
//! 2. Every entry point runs inside a state frame. Any error reverts the
//!    frame; there is no partial success.
//! 3. All monetary arithmetic is checked.

pub mod entry;
pub mod guard;
pub mod personal_vault;
pub mod recipient;

pub use entry::{dispatch, CallData, CallOutput, DispatchError, Message, VaultCall};
pub use guard::{Entered, ReentrancyGuard};
pub use personal_vault::{PersonalVault, VaultError};
pub use recipient::{ExternallyOwned, Recipient, Rejecting, TransferOutcome, VaultHandle};
