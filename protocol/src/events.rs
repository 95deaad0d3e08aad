//! Notifications emitted by the vault once a call has changed state.
//!
//! Events are journaled alongside the state they describe, so a reverted
//! call never leaves a stray `DepositPerformed` behind.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::units::Wei;

/// A state-change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VaultEvent {
    /// Value was credited to `from`'s balance.
    #[serde(rename = "deposit_performed")]
    DepositPerformed {
        from: Address,
        #[serde(with = "crate::units::wei_string")]
        amount: Wei,
    },
    /// Value was debited from `to`'s balance and sent to `to`.
    #[serde(rename = "withdrawal_performed")]
    WithdrawalPerformed {
        to: Address,
        #[serde(with = "crate::units::wei_string")]
        amount: Wei,
    },
}

impl VaultEvent {
    /// The account the event concerns.
    pub fn account(&self) -> Address {
        match self {
            VaultEvent::DepositPerformed { from, .. } => *from,
            VaultEvent::WithdrawalPerformed { to, .. } => *to,
        }
    }

    /// The amount moved.
    pub fn amount(&self) -> Wei {
        match self {
            VaultEvent::DepositPerformed { amount, .. }
            | VaultEvent::WithdrawalPerformed { amount, .. } => *amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = VaultEvent::DepositPerformed {
            from: Address::repeat_byte(2),
            amount: 42,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "deposit_performed");
        assert_eq!(json["amount"], "42");
        assert_eq!(json["from"], Address::repeat_byte(2).to_hex());

        let back: VaultEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn accessors_cover_both_kinds() {
        let deposit = VaultEvent::DepositPerformed {
            from: Address::repeat_byte(3),
            amount: 7,
        };
        let withdrawal = VaultEvent::WithdrawalPerformed {
            to: Address::repeat_byte(4),
            amount: 9,
        };
        assert_eq!(deposit.account(), Address::repeat_byte(3));
        assert_eq!(deposit.amount(), 7);
        assert_eq!(withdrawal.account(), Address::repeat_byte(4));
        assert_eq!(withdrawal.amount(), 9);
    }
}
