//! # Personal Vault Contract
//!
//! Each user owns a balance of the native asset inside the vault. The
//! lifecycle of a unit of value is:
//!
//! 1. **Deposit** — value arrives with the call and is credited to the
//!    caller, provided total reserves stay within the bank cap.
//! 2. **Withdraw** — the caller asks for up to `limit_per_tx` of their own
//!    balance back. The balance is debited *before* the value is sent, and
//!    the send happens under the reentrancy guard.
//!
//! Both entry points run inside a state frame (see
//! [`kipu_protocol::storage::journal`]). A failure anywhere, including a
//! refused transfer at the very end of a withdrawal, reverts the whole
//! frame: balances, counters, reserves, events, and anything the recipient
//! did to the vault while it held control.

use std::panic::{self, AssertUnwindSafe};

use kipu_protocol::config::{ConfigError, VaultConfig};
use kipu_protocol::storage::JournaledState;
use kipu_protocol::{Address, VaultEvent, Wei};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::guard::ReentrancyGuard;
use crate::recipient::{Recipient, TransferOutcome, VaultHandle};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a vault call is rejected. Every one of them leaves the vault
/// exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// Zero was passed as a deposit or withdrawal amount.
    #[error("invalid amount: must be greater than zero")]
    InvalidAmount,

    /// The deposit would push reserves above the bank cap.
    #[error("bank cap exceeded: reserves would reach {requested}, cap is {cap}")]
    BankCapExceeded {
        /// Reserves the vault would hold after the deposit.
        requested: Wei,
        /// The configured bank cap.
        cap: Wei,
    },

    /// The withdrawal is larger than a single call may move.
    #[error("withdrawal of {requested} exceeds per-transaction limit of {limit}")]
    ExceedsPerTxLimit {
        /// Amount the caller asked for.
        requested: Wei,
        /// The configured per-transaction limit.
        limit: Wei,
    },

    /// The withdrawal is larger than the caller's balance.
    #[error("insufficient balance: have {balance}, requested {requested}")]
    InsufficientBalance {
        /// The caller's current balance.
        balance: Wei,
        /// Amount the caller asked for.
        requested: Wei,
    },

    /// The recipient refused the outbound transfer. Carries its revert data.
    #[error("transfer failed: 0x{}", hex::encode(.0))]
    TransactionFailed(Vec<u8>),

    /// A withdrawal was attempted while another one is still in flight.
    #[error("reentrant call")]
    Reentrancy,

    /// Checked arithmetic failed.
    #[error("arithmetic overflow")]
    Overflow,
}

impl VaultError {
    /// Stable name of the variant, used as an error code by interfaces.
    pub fn name(&self) -> &'static str {
        match self {
            VaultError::InvalidAmount => "InvalidAmount",
            VaultError::BankCapExceeded { .. } => "BankCapExceeded",
            VaultError::ExceedsPerTxLimit { .. } => "ExceedsPerTxLimit",
            VaultError::InsufficientBalance { .. } => "InsufficientBalance",
            VaultError::TransactionFailed(_) => "TransactionFailed",
            VaultError::Reentrancy => "Reentrancy",
            VaultError::Overflow => "Overflow",
        }
    }
}

// ---------------------------------------------------------------------------
// PersonalVault
// ---------------------------------------------------------------------------

/// The vault ledger.
///
/// Owned by whoever hosts it; there is no global instance. Interfaces hold
/// it behind whatever handle they need and funnel every mutation through
/// [`deposit`](Self::deposit) and [`withdraw`](Self::withdraw).
#[derive(Debug)]
pub struct PersonalVault {
    config: VaultConfig,
    state: JournaledState,
    guard: ReentrancyGuard,
}

impl PersonalVault {
    /// Creates an empty vault. `owner`, `limit_per_tx` and `bank_cap` are
    /// fixed for the life of the instance.
    pub fn new(owner: Address, limit_per_tx: Wei, bank_cap: Wei) -> Self {
        Self {
            config: VaultConfig {
                owner,
                limit_per_tx,
                bank_cap,
            },
            state: JournaledState::new(),
            guard: ReentrancyGuard::new(),
        }
    }

    /// Creates an empty vault from a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if either cap is zero.
    pub fn from_config(config: VaultConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config.owner, config.limit_per_tx, config.bank_cap))
    }

    // -- Entry points ----------------------------------------------------------

    /// Credits `amount`, attached to the call, to `caller`'s balance.
    ///
    /// The attached value lands in reserves first; the cap is then checked
    /// against reserves as they stand with the value included. On rejection
    /// the frame reverts, which hands the value back.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidAmount`] if `amount` is zero.
    /// - [`VaultError::BankCapExceeded`] if reserves would exceed the cap.
    pub fn deposit(&mut self, caller: Address, amount: Wei) -> Result<(), VaultError> {
        self.in_frame("deposit", |vault| vault.credit(caller, amount))
    }

    /// Debits `amount` from `caller` and sends it through `recipient`.
    ///
    /// Returns the raw data the recipient answered with.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Reentrancy`] if a withdrawal is already in flight.
    /// - [`VaultError::InvalidAmount`] if `amount` is zero.
    /// - [`VaultError::ExceedsPerTxLimit`] if `amount > limit_per_tx`.
    /// - [`VaultError::InsufficientBalance`] if `amount` exceeds the balance.
    /// - [`VaultError::TransactionFailed`] if the recipient refuses the value.
    pub fn withdraw(
        &mut self,
        caller: Address,
        amount: Wei,
        recipient: &mut dyn Recipient,
    ) -> Result<Vec<u8>, VaultError> {
        let _entered = self.guard.enter().map_err(|e| {
            warn!(caller = %caller, amount = %amount, "reentrant withdrawal rejected");
            e
        })?;
        self.in_frame("withdraw", |vault| vault.debit_and_send(caller, amount, recipient))
    }

    // -- Queries ---------------------------------------------------------------

    /// Balance of `account`; zero for accounts that never deposited.
    pub fn balance_of(&self, account: &Address) -> Wei {
        self.state.balance(account)
    }

    /// Total custodied asset. This is the figure the bank cap applies to.
    pub fn contract_balance(&self) -> Wei {
        self.state.reserves()
    }

    /// The owner recorded at creation.
    pub fn owner(&self) -> Address {
        self.config.owner
    }

    /// Per-transaction withdrawal ceiling.
    pub fn limit_per_tx(&self) -> Wei {
        self.config.limit_per_tx
    }

    /// Global reserve ceiling.
    pub fn bank_cap(&self) -> Wei {
        self.config.bank_cap
    }

    /// Number of successful deposits.
    pub fn total_deposits(&self) -> u64 {
        self.state.total_deposits()
    }

    /// Number of successful withdrawals.
    pub fn total_withdrawals(&self) -> u64 {
        self.state.total_withdrawals()
    }

    /// The construction-time configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Sum of every user balance. `None` only on overflow, which the
    /// bank cap makes unreachable.
    pub fn total_ledger(&self) -> Option<Wei> {
        self.state.total_balances()
    }

    /// Number of accounts that ever deposited.
    pub fn account_count(&self) -> usize {
        self.state.accounts().count()
    }

    /// `true` while a withdrawal is in flight.
    pub fn is_locked(&self) -> bool {
        self.guard.is_entered()
    }

    /// Every event emitted so far, oldest first.
    pub fn events(&self) -> &[VaultEvent] {
        self.state.events()
    }

    /// Events emitted after the first `cursor` ones. A cursor past the end
    /// yields nothing.
    pub fn events_since(&self, cursor: usize) -> &[VaultEvent] {
        let events = self.state.events();
        &events[cursor.min(events.len())..]
    }

    // -- Internals -------------------------------------------------------------

    /// Runs `call` inside a state frame: commit on `Ok`, revert on `Err`.
    fn in_frame<T>(
        &mut self,
        operation: &'static str,
        call: impl FnOnce(&mut Self) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        let checkpoint = self.state.checkpoint();
        match call(self) {
            Ok(value) => {
                self.state.commit(checkpoint);
                Ok(value)
            }
            Err(e) => {
                self.state.revert(checkpoint);
                debug!(operation, depth = checkpoint.depth(), error = %e, "call reverted");
                Err(e)
            }
        }
    }

    fn credit(&mut self, caller: Address, amount: Wei) -> Result<(), VaultError> {
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }

        // A sum past `Wei::MAX` is past any cap; report it saturated.
        let reserves = self
            .state
            .reserves()
            .checked_add(amount)
            .ok_or(VaultError::BankCapExceeded {
                requested: Wei::MAX,
                cap: self.config.bank_cap,
            })?;
        // The value is custodied before the cap check runs.
        self.state.set_reserves(reserves);

        if reserves > self.config.bank_cap {
            return Err(VaultError::BankCapExceeded {
                requested: reserves,
                cap: self.config.bank_cap,
            });
        }

        let balance = self
            .state
            .balance(&caller)
            .checked_add(amount)
            .ok_or(VaultError::Overflow)?;
        let deposits = self
            .state
            .total_deposits()
            .checked_add(1)
            .ok_or(VaultError::Overflow)?;

        self.state.set_balance(caller, balance);
        self.state.set_total_deposits(deposits);
        self.state.emit(VaultEvent::DepositPerformed {
            from: caller,
            amount,
        });

        info!(from = %caller, amount = %amount, reserves = %reserves, "deposit performed");
        Ok(())
    }

    fn debit_and_send(
        &mut self,
        caller: Address,
        amount: Wei,
        recipient: &mut dyn Recipient,
    ) -> Result<Vec<u8>, VaultError> {
        // Checks.
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        if amount > self.config.limit_per_tx {
            return Err(VaultError::ExceedsPerTxLimit {
                requested: amount,
                limit: self.config.limit_per_tx,
            });
        }
        let balance = self.state.balance(&caller);
        if amount > balance {
            return Err(VaultError::InsufficientBalance {
                balance,
                requested: amount,
            });
        }

        let remaining = balance - amount;
        let withdrawals = self
            .state
            .total_withdrawals()
            .checked_add(1)
            .ok_or(VaultError::Overflow)?;
        let reserves = self
            .state
            .reserves()
            .checked_sub(amount)
            .ok_or(VaultError::Overflow)?;

        // Effects.
        self.state.set_balance(caller, remaining);
        self.state.set_total_withdrawals(withdrawals);
        self.state.set_reserves(reserves);

        // Interaction. A panicking recipient is a failed transfer.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            recipient.receive(VaultHandle::new(self), caller, amount)
        }))
        .unwrap_or_else(|_| TransferOutcome::rejected(Vec::new()));

        if !outcome.success {
            warn!(
                to = %caller,
                amount = %amount,
                reason = %hex::encode(&outcome.data),
                "outbound transfer refused"
            );
            return Err(VaultError::TransactionFailed(outcome.data));
        }

        self.state.emit(VaultEvent::WithdrawalPerformed { to: caller, amount });
        info!(to = %caller, amount = %amount, remaining = %remaining, "withdrawal performed");
        Ok(outcome.data)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipient::{ExternallyOwned, Rejecting};

    const CAP: Wei = 1_000;
    const LIMIT: Wei = 50;

    fn vault() -> PersonalVault {
        PersonalVault::new(Address::repeat_byte(0xee), LIMIT, CAP)
    }

    fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    #[test]
    fn new_vault_is_empty() {
        let v = vault();
        assert_eq!(v.owner(), Address::repeat_byte(0xee));
        assert_eq!(v.limit_per_tx(), LIMIT);
        assert_eq!(v.bank_cap(), CAP);
        assert_eq!(v.contract_balance(), 0);
        assert_eq!(v.balance_of(&alice()), 0);
        assert_eq!(v.total_deposits(), 0);
        assert_eq!(v.total_withdrawals(), 0);
        assert!(!v.is_locked());
    }

    #[test]
    fn from_config_rejects_zero_cap() {
        let config = VaultConfig {
            owner: Address::ZERO,
            limit_per_tx: 1,
            bank_cap: 0,
        };
        assert_eq!(
            PersonalVault::from_config(config).unwrap_err(),
            ConfigError::ZeroBankCap
        );
    }

    #[test]
    fn deposit_credits_balance_and_reserves() {
        let mut v = vault();
        v.deposit(alice(), 40).unwrap();
        assert_eq!(v.balance_of(&alice()), 40);
        assert_eq!(v.contract_balance(), 40);
        assert_eq!(v.total_deposits(), 1);
        assert_eq!(
            v.events(),
            &[VaultEvent::DepositPerformed {
                from: alice(),
                amount: 40
            }]
        );
    }

    #[test]
    fn zero_deposit_is_invalid() {
        let mut v = vault();
        assert_eq!(v.deposit(alice(), 0), Err(VaultError::InvalidAmount));
        assert_eq!(v.contract_balance(), 0);
        assert_eq!(v.total_deposits(), 0);
    }

    #[test]
    fn deposit_over_cap_returns_the_value() {
        let mut v = vault();
        v.deposit(alice(), CAP - 10).unwrap();
        assert_eq!(
            v.deposit(alice(), 11),
            Err(VaultError::BankCapExceeded {
                requested: CAP + 1,
                cap: CAP
            })
        );
        assert_eq!(v.contract_balance(), CAP - 10);
        assert_eq!(v.balance_of(&alice()), CAP - 10);
        assert_eq!(v.total_deposits(), 1);
        assert_eq!(v.events().len(), 1);
    }

    #[test]
    fn deposit_overflowing_reserves_is_a_cap_violation() {
        let mut v = PersonalVault::new(Address::repeat_byte(0xee), LIMIT, Wei::MAX);
        v.deposit(alice(), 5).unwrap();

        assert_eq!(
            v.deposit(alice(), Wei::MAX),
            Err(VaultError::BankCapExceeded {
                requested: Wei::MAX,
                cap: Wei::MAX
            })
        );
        assert_eq!(v.contract_balance(), 5);
        assert_eq!(v.balance_of(&alice()), 5);
        assert_eq!(v.total_deposits(), 1);
        assert_eq!(v.events().len(), 1);
    }

    #[test]
    fn withdraw_checks_run_in_order() {
        let mut v = vault();
        v.deposit(alice(), 10).unwrap();

        // Zero beats everything.
        assert_eq!(
            v.withdraw(alice(), 0, &mut ExternallyOwned),
            Err(VaultError::InvalidAmount)
        );
        // Over the limit and over the balance: the limit is reported.
        assert_eq!(
            v.withdraw(alice(), LIMIT + 1, &mut ExternallyOwned),
            Err(VaultError::ExceedsPerTxLimit {
                requested: LIMIT + 1,
                limit: LIMIT
            })
        );
        assert_eq!(
            v.withdraw(alice(), 11, &mut ExternallyOwned),
            Err(VaultError::InsufficientBalance {
                balance: 10,
                requested: 11
            })
        );
        assert_eq!(v.total_withdrawals(), 0);
    }

    #[test]
    fn withdraw_debits_and_emits() {
        let mut v = vault();
        v.deposit(alice(), 30).unwrap();
        let data = v.withdraw(alice(), 20, &mut ExternallyOwned).unwrap();
        assert!(data.is_empty());
        assert_eq!(v.balance_of(&alice()), 10);
        assert_eq!(v.contract_balance(), 10);
        assert_eq!(v.total_withdrawals(), 1);
        assert_eq!(
            v.events_since(1),
            &[VaultEvent::WithdrawalPerformed {
                to: alice(),
                amount: 20
            }]
        );
    }

    #[test]
    fn refused_transfer_rolls_back_and_releases_guard() {
        let mut v = vault();
        v.deposit(alice(), 30).unwrap();
        let err = v
            .withdraw(alice(), 20, &mut Rejecting::with_reason(b"nope".to_vec()))
            .unwrap_err();
        assert_eq!(err, VaultError::TransactionFailed(b"nope".to_vec()));
        assert_eq!(err.to_string(), "transfer failed: 0x6e6f7065");
        assert_eq!(v.balance_of(&alice()), 30);
        assert_eq!(v.contract_balance(), 30);
        assert_eq!(v.total_withdrawals(), 0);
        assert!(!v.is_locked());
    }

    #[test]
    fn panicking_recipient_is_a_failed_transfer() {
        let mut v = vault();
        v.deposit(alice(), 30).unwrap();
        let mut exploding = |_: VaultHandle<'_>, _: Address, _: Wei| -> TransferOutcome {
            panic!("recipient exploded");
        };
        assert_eq!(
            v.withdraw(alice(), 5, &mut exploding),
            Err(VaultError::TransactionFailed(Vec::new()))
        );
        assert_eq!(v.balance_of(&alice()), 30);
        assert!(!v.is_locked());
    }

    #[test]
    fn events_since_clamps_cursor() {
        let mut v = vault();
        v.deposit(alice(), 1).unwrap();
        assert!(v.events_since(5).is_empty());
        assert_eq!(v.events_since(0).len(), 1);
    }

    #[test]
    fn error_names_are_stable() {
        assert_eq!(VaultError::Reentrancy.name(), "Reentrancy");
        assert_eq!(
            VaultError::BankCapExceeded { requested: 2, cap: 1 }.name(),
            "BankCapExceeded"
        );
    }
}
