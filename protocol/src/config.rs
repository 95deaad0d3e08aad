//! # Protocol Configuration & Constants
//!
//! Every magic number in KipuBank lives here, together with the
//! construction-time [`VaultConfig`]. The caps inside a `VaultConfig` are
//! fixed the moment a vault is created; there is no setter and there never
//! will be.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::units::{Wei, WEI_PER_ETHER};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Protocol version string reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Vault Defaults
// ---------------------------------------------------------------------------

/// Default global reserve ceiling: 1 ether.
pub const DEFAULT_BANK_CAP: Wei = WEI_PER_ETHER;

/// Default per-transaction withdrawal ceiling: 0.05 ether.
pub const DEFAULT_LIMIT_PER_TX: Wei = WEI_PER_ETHER / 20;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default port for the HTTP / JSON-RPC API.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Capacity of the event broadcast channel feeding WebSocket subscribers.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Most events a single `GET /events` page returns.
pub const MAX_EVENTS_PAGE: usize = 500;

// ---------------------------------------------------------------------------
// VaultConfig
// ---------------------------------------------------------------------------

/// Errors from validating a [`VaultConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A zero bank cap would reject every deposit.
    #[error("bank cap must be greater than zero")]
    ZeroBankCap,

    /// A zero per-transaction limit would reject every withdrawal.
    #[error("per-transaction limit must be greater than zero")]
    ZeroLimitPerTx,
}

/// Construction-time parameters of a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Recorded at creation. Not consulted for authorization.
    pub owner: Address,
    /// Maximum amount a single withdrawal may move.
    pub limit_per_tx: Wei,
    /// Maximum total reserves the vault may hold after a deposit.
    pub bank_cap: Wei,
}

impl VaultConfig {
    /// Builds a config and validates it.
    pub fn new(owner: Address, limit_per_tx: Wei, bank_cap: Wei) -> Result<Self, ConfigError> {
        let config = Self {
            owner,
            limit_per_tx,
            bank_cap,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects caps that would make the vault unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bank_cap == 0 {
            return Err(ConfigError::ZeroBankCap);
        }
        if self.limit_per_tx == 0 {
            return Err(ConfigError::ZeroLimitPerTx);
        }
        Ok(())
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            owner: Address::ZERO,
            limit_per_tx: DEFAULT_LIMIT_PER_TX,
            bank_cap: DEFAULT_BANK_CAP,
        }
    }
}
