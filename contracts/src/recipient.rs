//! # Value Transfer
//!
//! A withdrawal ends by sending value to the caller. On a real chain that
//! send runs the recipient's code, which can do anything, including calling
//! back into the vault. [`Recipient`] models that: for the duration of the
//! transfer the recipient holds a [`VaultHandle`], through which it can call
//! the vault's entry points and queries and nothing else.

use kipu_protocol::{Address, Wei};

use crate::personal_vault::{PersonalVault, VaultError};

/// Result of a value transfer: success flag plus the raw bytes the
/// recipient returned (or reverted with).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransferOutcome {
    /// Whether the recipient accepted the value.
    pub success: bool,
    /// Raw return or revert data.
    pub data: Vec<u8>,
}

impl TransferOutcome {
    /// Accepted, returning `data`.
    pub fn accepted(data: Vec<u8>) -> Self {
        Self {
            success: true,
            data,
        }
    }

    /// Refused, with `reason` as revert data.
    pub fn rejected(reason: Vec<u8>) -> Self {
        Self {
            success: false,
            data: reason,
        }
    }
}

/// The vault as seen from inside a transfer.
///
/// Exposes the public entry points and read-only queries. The vault's
/// storage stays out of reach, so whatever the recipient does goes through
/// the same frames and checks as any other caller.
#[derive(Debug)]
pub struct VaultHandle<'a> {
    vault: &'a mut PersonalVault,
}

impl<'a> VaultHandle<'a> {
    pub(crate) fn new(vault: &'a mut PersonalVault) -> Self {
        Self { vault }
    }

    /// See [`PersonalVault::deposit`].
    pub fn deposit(&mut self, caller: Address, amount: Wei) -> Result<(), VaultError> {
        self.vault.deposit(caller, amount)
    }

    /// See [`PersonalVault::withdraw`]. Always refused while the outer
    /// withdrawal is in flight.
    pub fn withdraw(
        &mut self,
        caller: Address,
        amount: Wei,
        recipient: &mut dyn Recipient,
    ) -> Result<Vec<u8>, VaultError> {
        self.vault.withdraw(caller, amount, recipient)
    }

    pub fn balance_of(&self, account: &Address) -> Wei {
        self.vault.balance_of(account)
    }

    pub fn contract_balance(&self) -> Wei {
        self.vault.contract_balance()
    }

    pub fn owner(&self) -> Address {
        self.vault.owner()
    }

    pub fn limit_per_tx(&self) -> Wei {
        self.vault.limit_per_tx()
    }

    pub fn bank_cap(&self) -> Wei {
        self.vault.bank_cap()
    }

    pub fn total_deposits(&self) -> u64 {
        self.vault.total_deposits()
    }

    pub fn total_withdrawals(&self) -> u64 {
        self.vault.total_withdrawals()
    }

    pub fn is_locked(&self) -> bool {
        self.vault.is_locked()
    }
}

/// Code that runs when the vault sends value to an account.
pub trait Recipient {
    /// Called with the value already moved out of the vault's reserves.
    ///
    /// Anything the recipient does through `vault` becomes part of the
    /// enclosing withdrawal and is reverted with it if the transfer
    /// ultimately fails.
    fn receive(&mut self, vault: VaultHandle<'_>, from: Address, amount: Wei) -> TransferOutcome;
}

/// A plain account with no code. Accepts everything, returns nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternallyOwned;

impl Recipient for ExternallyOwned {
    fn receive(&mut self, _vault: VaultHandle<'_>, _from: Address, _amount: Wei) -> TransferOutcome {
        TransferOutcome::accepted(Vec::new())
    }
}

/// An account that refuses every incoming transfer.
#[derive(Debug, Clone, Default)]
pub struct Rejecting {
    reason: Vec<u8>,
}

impl Rejecting {
    /// Refuses with `reason` as revert data.
    pub fn with_reason(reason: impl Into<Vec<u8>>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Recipient for Rejecting {
    fn receive(&mut self, _vault: VaultHandle<'_>, _from: Address, _amount: Wei) -> TransferOutcome {
        TransferOutcome::rejected(self.reason.clone())
    }
}

impl<F> Recipient for F
where
    F: for<'a> FnMut(VaultHandle<'a>, Address, Wei) -> TransferOutcome,
{
    fn receive(&mut self, vault: VaultHandle<'_>, from: Address, amount: Wei) -> TransferOutcome {
        self(vault, from, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_mirrors_vault_queries() {
        let owner = Address::repeat_byte(0x0e);
        let user = Address::repeat_byte(0x01);
        let mut vault = PersonalVault::new(owner, 10, 100);
        vault.deposit(user, 40).unwrap();

        let handle = VaultHandle::new(&mut vault);
        assert_eq!(handle.owner(), owner);
        assert_eq!(handle.balance_of(&user), 40);
        assert_eq!(handle.contract_balance(), 40);
        assert_eq!(handle.limit_per_tx(), 10);
        assert_eq!(handle.bank_cap(), 100);
        assert_eq!(handle.total_deposits(), 1);
        assert_eq!(handle.total_withdrawals(), 0);
        assert!(!handle.is_locked());
    }

    #[test]
    fn rejecting_returns_its_reason() {
        let mut vault = PersonalVault::new(Address::ZERO, 10, 100);
        let outcome = Rejecting::with_reason(b"closed".to_vec()).receive(
            VaultHandle::new(&mut vault),
            Address::ZERO,
            1,
        );
        assert_eq!(outcome, TransferOutcome::rejected(b"closed".to_vec()));
    }
}
