//! # Call Routing
//!
//! Turns an incoming message into a vault operation. Three shapes of
//! message reach the vault:
//!
//! | Shape                              | Route                      |
//! |------------------------------------|----------------------------|
//! | named method                       | that method                |
//! | value with no call data (receive)  | [`PersonalVault::deposit`] |
//! | unrecognized call data (fallback)  | [`PersonalVault::deposit`] |
//!
//! Receive and fallback run exactly the same deposit logic as the named
//! `deposit` method, checks included. Value attached to a method that does
//! not accept value is refused before the vault is touched.

use kipu_protocol::units::wei_string;
use kipu_protocol::{Address, Wei};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::personal_vault::{PersonalVault, VaultError};
use crate::recipient::Recipient;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while routing a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The vault rejected the operation.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Value was attached to a method that does not accept it.
    #[error("method '{0}' does not accept value")]
    NonPayable(&'static str),

    /// The method is known but its arguments are malformed.
    #[error("invalid arguments for '{method}': {reason}")]
    InvalidArguments {
        /// The method being called.
        method: &'static str,
        /// What was wrong with the arguments.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// A recognized vault method with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultCall {
    Deposit,
    Withdraw { amount: Wei },
    BalanceOf { account: Address },
    ContractBalance,
    Owner,
    LimitPerTx,
    BankCap,
    TotalDeposits,
    TotalWithdrawals,
}

#[derive(Deserialize)]
struct WithdrawArgs {
    #[serde(with = "wei_string")]
    amount: Wei,
}

#[derive(Deserialize)]
struct BalanceOfArgs {
    account: Address,
}

impl VaultCall {
    /// Method name as exposed on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            VaultCall::Deposit => "deposit",
            VaultCall::Withdraw { .. } => "withdraw",
            VaultCall::BalanceOf { .. } => "balanceOf",
            VaultCall::ContractBalance => "contractBalance",
            VaultCall::Owner => "owner",
            VaultCall::LimitPerTx => "limitPerTx",
            VaultCall::BankCap => "bankCap",
            VaultCall::TotalDeposits => "totalDeposits",
            VaultCall::TotalWithdrawals => "totalWithdrawals",
        }
    }

    /// Whether value may be attached.
    pub fn is_payable(&self) -> bool {
        matches!(self, VaultCall::Deposit)
    }

    /// Resolves a method name and its JSON arguments.
    ///
    /// Returns `Ok(None)` for names the vault does not know; those are
    /// fallback calls, not errors.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidArguments`] when a known method is
    /// given arguments it cannot decode.
    pub fn from_method(method: &str, args: &Value) -> Result<Option<VaultCall>, DispatchError> {
        let call = match method {
            "deposit" => VaultCall::Deposit,
            "withdraw" => {
                let parsed: WithdrawArgs = decode_args("withdraw", args)?;
                VaultCall::Withdraw {
                    amount: parsed.amount,
                }
            }
            "balanceOf" => {
                let parsed: BalanceOfArgs = decode_args("balanceOf", args)?;
                VaultCall::BalanceOf {
                    account: parsed.account,
                }
            }
            "contractBalance" => VaultCall::ContractBalance,
            "owner" => VaultCall::Owner,
            "limitPerTx" => VaultCall::LimitPerTx,
            "bankCap" => VaultCall::BankCap,
            "totalDeposits" => VaultCall::TotalDeposits,
            "totalWithdrawals" => VaultCall::TotalWithdrawals,
            _ => return Ok(None),
        };
        Ok(Some(call))
    }
}

fn decode_args<T: for<'de> Deserialize<'de>>(
    method: &'static str,
    args: &Value,
) -> Result<T, DispatchError> {
    T::deserialize(args).map_err(|e| DispatchError::InvalidArguments {
        method,
        reason: e.to_string(),
    })
}

/// What a message carries besides value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallData {
    /// Nothing: a plain value transfer.
    Empty,
    /// A recognized method.
    Call(VaultCall),
    /// Call data the vault does not understand, kept raw.
    Unrecognized(Vec<u8>),
}

/// One incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Who is calling.
    pub sender: Address,
    /// Value attached to the call.
    pub value: Wei,
    /// The call itself.
    pub data: CallData,
}

impl Message {
    /// A plain value transfer.
    pub fn transfer(sender: Address, value: Wei) -> Self {
        Self {
            sender,
            value,
            data: CallData::Empty,
        }
    }

    /// A named call.
    pub fn call(sender: Address, value: Wei, call: VaultCall) -> Self {
        Self {
            sender,
            value,
            data: CallData::Call(call),
        }
    }
}

/// Result of a routed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutput {
    /// The call returns nothing.
    Unit,
    /// An amount in wei.
    Amount(Wei),
    /// An account.
    Address(Address),
    /// A counter.
    Count(u64),
    /// Raw bytes, e.g. a withdrawal's transfer response.
    Bytes(Vec<u8>),
}

impl CallOutput {
    /// JSON form: amounts as decimal strings, bytes and addresses as hex.
    pub fn to_json(&self) -> Value {
        match self {
            CallOutput::Unit => Value::Null,
            CallOutput::Amount(amount) => Value::String(amount.to_string()),
            CallOutput::Address(address) => Value::String(address.to_hex()),
            CallOutput::Count(count) => Value::from(*count),
            CallOutput::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Routes `message` to the vault.
///
/// `recipient` is the code living at `message.sender`; it only runs if the
/// call is a withdrawal.
pub fn dispatch(
    vault: &mut PersonalVault,
    message: Message,
    recipient: &mut dyn Recipient,
) -> Result<CallOutput, DispatchError> {
    let Message {
        sender,
        value,
        data,
    } = message;

    let call = match data {
        CallData::Empty => {
            debug!(from = %sender, value = %value, "plain transfer routed to deposit");
            VaultCall::Deposit
        }
        CallData::Unrecognized(raw) => {
            debug!(
                from = %sender,
                value = %value,
                data = %hex::encode(&raw),
                "unrecognized call routed to deposit"
            );
            VaultCall::Deposit
        }
        CallData::Call(call) => call,
    };

    if value > 0 && !call.is_payable() {
        return Err(DispatchError::NonPayable(call.method()));
    }

    let output = match call {
        VaultCall::Deposit => {
            vault.deposit(sender, value)?;
            CallOutput::Unit
        }
        VaultCall::Withdraw { amount } => CallOutput::Bytes(vault.withdraw(sender, amount, recipient)?),
        VaultCall::BalanceOf { account } => CallOutput::Amount(vault.balance_of(&account)),
        VaultCall::ContractBalance => CallOutput::Amount(vault.contract_balance()),
        VaultCall::Owner => CallOutput::Address(vault.owner()),
        VaultCall::LimitPerTx => CallOutput::Amount(vault.limit_per_tx()),
        VaultCall::BankCap => CallOutput::Amount(vault.bank_cap()),
        VaultCall::TotalDeposits => CallOutput::Count(vault.total_deposits()),
        VaultCall::TotalWithdrawals => CallOutput::Count(vault.total_withdrawals()),
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipient::ExternallyOwned;
    use serde_json::json;

    fn vault() -> PersonalVault {
        PersonalVault::new(Address::repeat_byte(0x0e), 100, 1_000)
    }

    fn bob() -> Address {
        Address::repeat_byte(0xb0)
    }

    #[test]
    fn receive_and_fallback_match_explicit_deposit() {
        let mut explicit = vault();
        let mut receive = vault();
        let mut fallback = vault();

        dispatch(
            &mut explicit,
            Message::call(bob(), 70, VaultCall::Deposit),
            &mut ExternallyOwned,
        )
        .unwrap();
        dispatch(&mut receive, Message::transfer(bob(), 70), &mut ExternallyOwned).unwrap();
        dispatch(
            &mut fallback,
            Message {
                sender: bob(),
                value: 70,
                data: CallData::Unrecognized(vec![0xde, 0xad, 0xbe, 0xef]),
            },
            &mut ExternallyOwned,
        )
        .unwrap();

        for v in [&explicit, &receive, &fallback] {
            assert_eq!(v.balance_of(&bob()), 70);
            assert_eq!(v.total_deposits(), 1);
            assert_eq!(v.contract_balance(), 70);
            assert_eq!(v.events(), explicit.events());
        }
    }

    #[test]
    fn receive_applies_deposit_checks() {
        let mut v = vault();
        assert_eq!(
            dispatch(&mut v, Message::transfer(bob(), 0), &mut ExternallyOwned),
            Err(DispatchError::Vault(VaultError::InvalidAmount))
        );
        assert_eq!(
            dispatch(&mut v, Message::transfer(bob(), 1_001), &mut ExternallyOwned),
            Err(DispatchError::Vault(VaultError::BankCapExceeded {
                requested: 1_001,
                cap: 1_000
            }))
        );
    }

    #[test]
    fn value_on_non_payable_method_is_refused() {
        let mut v = vault();
        v.deposit(bob(), 10).unwrap();
        let err = dispatch(
            &mut v,
            Message::call(bob(), 1, VaultCall::Withdraw { amount: 5 }),
            &mut ExternallyOwned,
        )
        .unwrap_err();
        assert_eq!(err, DispatchError::NonPayable("withdraw"));
        assert_eq!(v.balance_of(&bob()), 10);
    }

    #[test]
    fn queries_route_to_views() {
        let mut v = vault();
        v.deposit(bob(), 10).unwrap();
        let mut query = |call: VaultCall| {
            dispatch(&mut v, Message::call(bob(), 0, call), &mut ExternallyOwned).unwrap()
        };
        assert_eq!(query(VaultCall::BalanceOf { account: bob() }), CallOutput::Amount(10));
        assert_eq!(query(VaultCall::ContractBalance), CallOutput::Amount(10));
        assert_eq!(query(VaultCall::Owner), CallOutput::Address(Address::repeat_byte(0x0e)));
        assert_eq!(query(VaultCall::LimitPerTx), CallOutput::Amount(100));
        assert_eq!(query(VaultCall::BankCap), CallOutput::Amount(1_000));
        assert_eq!(query(VaultCall::TotalDeposits), CallOutput::Count(1));
        assert_eq!(query(VaultCall::TotalWithdrawals), CallOutput::Count(0));
        assert_eq!(query(VaultCall::Withdraw { amount: 4 }), CallOutput::Bytes(Vec::new()));
    }

    #[test]
    fn from_method_parses_arguments() {
        let call = VaultCall::from_method("withdraw", &json!({ "amount": "0.00000000000000005 ether" }))
            .unwrap()
            .unwrap();
        assert_eq!(call, VaultCall::Withdraw { amount: 50 });

        let account = bob().to_hex();
        let call = VaultCall::from_method("balanceOf", &json!({ "account": account }))
            .unwrap()
            .unwrap();
        assert_eq!(call, VaultCall::BalanceOf { account: bob() });

        assert_eq!(VaultCall::from_method("mint", &Value::Null).unwrap(), None);
    }

    #[test]
    fn from_method_rejects_bad_arguments() {
        let err = VaultCall::from_method("withdraw", &json!({ "amount": "lots" })).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidArguments {
                method: "withdraw",
                ..
            }
        ));
    }

    #[test]
    fn outputs_render_as_json() {
        assert_eq!(CallOutput::Unit.to_json(), Value::Null);
        assert_eq!(CallOutput::Amount(u128::MAX).to_json(), json!(u128::MAX.to_string()));
        assert_eq!(CallOutput::Count(3).to_json(), json!(3));
        assert_eq!(CallOutput::Bytes(vec![0xab]).to_json(), json!("0xab"));
    }
}
