//! # Reentrancy Guard
//!
//! A single flag, acquired on entry to the withdrawal path and released
//! when the returned [`Entered`] token is dropped. Drop runs on every exit:
//! normal return, `?` early return, and panic unwinding.
//!
//! The token owns a handle to the flag instead of borrowing the guard, so
//! the vault can still hand `&mut self` to the recipient while the lock is
//! held. That is the whole point: the recipient gets full access to the
//! vault and still cannot get a second withdrawal in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::personal_vault::VaultError;

/// The reentrancy lock.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    entered: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    /// Creates an unlocked guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Reentrancy`] if it is already held. There is no
    /// waiting and no retry.
    pub fn enter(&self) -> Result<Entered, VaultError> {
        self.entered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| VaultError::Reentrancy)?;
        Ok(Entered {
            flag: Arc::clone(&self.entered),
        })
    }

    /// `true` while a guarded call is in flight.
    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

/// Proof that the guard is held. Releases it on drop.
#[derive(Debug)]
#[must_use = "the guard is released as soon as this token is dropped"]
pub struct Entered {
    flag: Arc<AtomicBool>,
}

impl Drop for Entered {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_enter_is_rejected_while_held() {
        let guard = ReentrancyGuard::new();
        let token = guard.enter().unwrap();
        assert!(guard.is_entered());
        assert!(matches!(guard.enter(), Err(VaultError::Reentrancy)));
        drop(token);
        assert!(!guard.is_entered());
        assert!(guard.enter().is_ok());
    }

    #[test]
    fn released_on_early_return() {
        fn guarded(guard: &ReentrancyGuard) -> Result<(), VaultError> {
            let _entered = guard.enter()?;
            Err(VaultError::InvalidAmount)
        }

        let guard = ReentrancyGuard::new();
        assert!(guarded(&guard).is_err());
        assert!(!guard.is_entered());
    }

    #[test]
    fn released_on_panic() {
        let guard = ReentrancyGuard::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _entered = guard.enter().unwrap();
            panic!("recipient blew up");
        }));
        assert!(result.is_err());
        assert!(!guard.is_entered());
    }
}
