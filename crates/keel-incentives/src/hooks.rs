//! Onward incentive hooks.
//!
//! A pool may forward every balance change to a secondary incentive
//! program. The controller does not own that program's state; it only
//! passes the notification along after its own bookkeeping.

use std::sync::{Arc, Mutex, PoisonError};

use keel_types::{Address, U256};

use crate::HookError;

/// Receiver of forwarded balance changes.
pub trait OnwardIncentives: Send {
    fn handle_action(
        &mut self,
        token: &Address,
        user: &Address,
        balance: U256,
        total_supply: U256,
    ) -> Result<(), HookError>;
}

/// A forwarded balance change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForwardedAction {
    /// Pool token that reported the change.
    pub token: Address,
    /// Account whose balance changed.
    pub user: Address,
    /// Balance after the change.
    pub balance: U256,
    /// Pool total supply after the change.
    pub total_supply: U256,
}

/// Hook that records what it receives. Clones share the same record.
#[derive(Clone, Debug, Default)]
pub struct RecordingHook {
    actions: Arc<Mutex<Vec<ForwardedAction>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingHook {
    /// An accepting hook with an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions received so far.
    pub fn actions(&self) -> Vec<ForwardedAction> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make subsequent notifications fail.
    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }
}

impl OnwardIncentives for RecordingHook {
    fn handle_action(
        &mut self,
        token: &Address,
        user: &Address,
        balance: U256,
        total_supply: U256,
    ) -> Result<(), HookError> {
        if *self.fail.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(HookError("hook rejected action".to_string()));
        }
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ForwardedAction {
                token: *token,
                user: *user,
                balance,
                total_supply,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_types::address_from_byte;

    #[test]
    fn test_clones_share_record() {
        let hook = RecordingHook::new();
        let mut handle = hook.clone();
        handle
            .handle_action(&address_from_byte(1), &address_from_byte(2), U256::ONE, U256::ONE)
            .expect("forward");
        assert_eq!(hook.actions().len(), 1);
    }

    #[test]
    fn test_failure_injection() {
        let hook = RecordingHook::new();
        hook.fail(true);
        let mut handle = hook.clone();
        assert!(handle
            .handle_action(&address_from_byte(1), &address_from_byte(2), U256::ONE, U256::ONE)
            .is_err());
        assert!(hook.actions().is_empty());
    }
}
