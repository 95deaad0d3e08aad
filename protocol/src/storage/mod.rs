//! # Storage Module
//!
//! State for a single vault instance, kept in memory and mutated only
//! through the journal.
//!
//! ## Architecture
//!
//! ```text
//! journal.rs — JournaledState: balances, reserves, counters, event log,
//!              plus the undo journal behind checkpoint / revert / commit
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! entry point ─► checkpoint() ─► writes (journaled) ─┬─► commit(cp)
//!                                                    └─► revert(cp)
//! ```
//!
//! Frames nest. A nested frame that commits can still be undone by an
//! enclosing frame that reverts, which is exactly what happens when a
//! withdrawal's transfer fails after the recipient re-entered the vault.

pub mod journal;

pub use journal::{Checkpoint, JournalEntry, JournaledState};
