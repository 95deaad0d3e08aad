//! # Journaled Vault State
//!
//! Every write records what it overwrote. Reverting to a [`Checkpoint`]
//! replays those records backwards until the state is byte-for-byte what
//! it was when the checkpoint was taken.
//!
//! ## Frame Rules
//!
//! 1. `checkpoint()` opens a frame and must be closed by exactly one of
//!    `commit()` or `revert()`, innermost first.
//! 2. `revert(cp)` undoes every write made since `cp`, including writes
//!    from nested frames that already committed.
//! 3. When the outermost frame commits, the journal is dropped. Nothing
//!    can be reverted after that; the call is final.

use std::collections::HashMap;

use crate::address::Address;
use crate::events::VaultEvent;
use crate::units::Wei;

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// One undo record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// `account`'s balance was overwritten. `None` means it had no entry.
    BalanceChanged {
        account: Address,
        previous: Option<Wei>,
    },
    /// Reserves were overwritten.
    ReservesChanged { previous: Wei },
    /// The deposit counter was overwritten.
    DepositCountChanged { previous: u64 },
    /// The withdrawal counter was overwritten.
    WithdrawalCountChanged { previous: u64 },
    /// An event was appended to the log.
    EventEmitted,
}

/// A position in the journal to revert to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a checkpoint must be committed or reverted"]
pub struct Checkpoint {
    journal_len: usize,
    depth: usize,
}

impl Checkpoint {
    /// Nesting depth of the frame this checkpoint opened (1 = outermost).
    pub fn depth(&self) -> usize {
        self.depth
    }
}

// ---------------------------------------------------------------------------
// JournaledState
// ---------------------------------------------------------------------------

/// Balances, reserves, counters and events of one vault.
#[derive(Debug, Default)]
pub struct JournaledState {
    balances: HashMap<Address, Wei>,
    reserves: Wei,
    total_deposits: u64,
    total_withdrawals: u64,
    /// Every committed event for the life of the vault. Never pruned: the
    /// log is the ledger's history, and readers page through it by index.
    events: Vec<VaultEvent>,
    journal: Vec<JournalEntry>,
    depth: usize,
}

impl JournaledState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    // -- Reads ---------------------------------------------------------------

    /// Balance of `account`, zero if it never deposited.
    pub fn balance(&self, account: &Address) -> Wei {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Total custodied asset.
    pub fn reserves(&self) -> Wei {
        self.reserves
    }

    /// Number of successful deposits.
    pub fn total_deposits(&self) -> u64 {
        self.total_deposits
    }

    /// Number of successful withdrawals.
    pub fn total_withdrawals(&self) -> u64 {
        self.total_withdrawals
    }

    /// Events emitted so far, oldest first.
    pub fn events(&self) -> &[VaultEvent] {
        &self.events
    }

    /// Iterates over every account that ever held a balance entry.
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Wei)> {
        self.balances.iter()
    }

    /// Sum of all balances, or `None` if it would overflow `u128`.
    pub fn total_balances(&self) -> Option<Wei> {
        self.balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b))
    }

    /// Current frame nesting depth. Zero outside of any call.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of undo records currently held.
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    // -- Writes --------------------------------------------------------------

    /// Overwrites `account`'s balance.
    pub fn set_balance(&mut self, account: Address, amount: Wei) {
        let previous = self.balances.insert(account, amount);
        self.record(JournalEntry::BalanceChanged { account, previous });
    }

    /// Overwrites the reserve figure.
    pub fn set_reserves(&mut self, amount: Wei) {
        let previous = std::mem::replace(&mut self.reserves, amount);
        self.record(JournalEntry::ReservesChanged { previous });
    }

    /// Overwrites the deposit counter.
    pub fn set_total_deposits(&mut self, count: u64) {
        let previous = std::mem::replace(&mut self.total_deposits, count);
        self.record(JournalEntry::DepositCountChanged { previous });
    }

    /// Overwrites the withdrawal counter.
    pub fn set_total_withdrawals(&mut self, count: u64) {
        let previous = std::mem::replace(&mut self.total_withdrawals, count);
        self.record(JournalEntry::WithdrawalCountChanged { previous });
    }

    /// Appends an event to the log.
    pub fn emit(&mut self, event: VaultEvent) {
        self.events.push(event);
        self.record(JournalEntry::EventEmitted);
    }

    // -- Frames --------------------------------------------------------------

    /// Opens a frame.
    pub fn checkpoint(&mut self) -> Checkpoint {
        self.depth += 1;
        Checkpoint {
            journal_len: self.journal.len(),
            depth: self.depth,
        }
    }

    /// Closes a frame, keeping its writes.
    pub fn commit(&mut self, checkpoint: Checkpoint) {
        self.close(checkpoint);
    }

    /// Closes a frame, undoing every write made since `checkpoint`.
    pub fn revert(&mut self, checkpoint: Checkpoint) {
        let undone = self.journal.len().saturating_sub(checkpoint.journal_len);
        while self.journal.len() > checkpoint.journal_len {
            if let Some(entry) = self.journal.pop() {
                self.undo(entry);
            }
        }
        tracing::trace!(depth = checkpoint.depth, undone, "reverted state frame");
        self.close(checkpoint);
    }

    fn close(&mut self, checkpoint: Checkpoint) {
        // Inner frames abandoned by an unwinding recipient are closed along
        // with their parent.
        debug_assert!(
            self.depth >= checkpoint.depth,
            "frame closed twice or out of order"
        );
        self.depth = checkpoint.depth.saturating_sub(1);
        if self.depth == 0 {
            self.journal.clear();
        }
    }

    fn record(&mut self, entry: JournalEntry) {
        // Outside a frame there is nothing to revert to.
        if self.depth > 0 {
            self.journal.push(entry);
        }
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::BalanceChanged { account, previous } => match previous {
                Some(amount) => {
                    self.balances.insert(account, amount);
                }
                None => {
                    self.balances.remove(&account);
                }
            },
            JournalEntry::ReservesChanged { previous } => self.reserves = previous,
            JournalEntry::DepositCountChanged { previous } => self.total_deposits = previous,
            JournalEntry::WithdrawalCountChanged { previous } => {
                self.total_withdrawals = previous
            }
            JournalEntry::EventEmitted => {
                self.events.pop();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
