//! Entry unlock lifecycle
//!
//! The state of an entry is re-derived from `(unlock_timestamp, now)` on every
//! read. There is no stored "unlocked" flag, so a `Locked` entry becomes
//! `Unlocked` simply because the clock moved past its unlock time.
//!
//! ```text
//! unlock_timestamp == 0            -> NeverUnlock  (terminal)
//! now <  unlock_timestamp          -> Locked
//! now >= unlock_timestamp          -> Unlocked     (terminal)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Sentinel unlock timestamp meaning "never"
pub const NEVER_UNLOCK: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnlockState {
    Locked,
    Unlocked,
    NeverUnlock,
}

impl UnlockState {
    pub fn derive(unlock_timestamp: u64, now: u64) -> Self {
        if unlock_timestamp == NEVER_UNLOCK {
            UnlockState::NeverUnlock
        } else if now < unlock_timestamp {
            UnlockState::Locked
        } else {
            UnlockState::Unlocked
        }
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self, UnlockState::Unlocked)
    }

    /// Locked and never-unlock both count as locked for statistics
    pub fn counts_as_locked(&self) -> bool {
        !self.is_unlocked()
    }
}

impl fmt::Display for UnlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnlockState::Locked => write!(f, "locked"),
            UnlockState::Unlocked => write!(f, "unlocked"),
            UnlockState::NeverUnlock => write!(f, "never-unlock"),
        }
    }
}

/// Unlock condition chosen when writing an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockPolicy {
    Never,
    /// Unix seconds; must be non-zero
    At(u64),
}

impl UnlockPolicy {
    /// Timed unlock; `0` is reserved for "never" and rejected
    pub fn at(ts: u64) -> Result<Self, CoreError> {
        if ts == NEVER_UNLOCK {
            Err(CoreError::InvalidTimestamp(ts))
        } else {
            Ok(UnlockPolicy::At(ts))
        }
    }

    /// Like [`UnlockPolicy::to_timestamp`], but refuses `At(0)`
    pub fn checked_timestamp(self) -> Result<u64, CoreError> {
        match self {
            UnlockPolicy::At(NEVER_UNLOCK) => Err(CoreError::InvalidTimestamp(NEVER_UNLOCK)),
            policy => Ok(policy.to_timestamp()),
        }
    }

    /// Value submitted to the ledger's `createEntry`
    pub fn to_timestamp(self) -> u64 {
        match self {
            UnlockPolicy::Never => NEVER_UNLOCK,
            UnlockPolicy::At(ts) => ts,
        }
    }

    /// Inverse of [`UnlockPolicy::to_timestamp`]
    pub fn from_timestamp(ts: u64) -> Self {
        if ts == NEVER_UNLOCK {
            UnlockPolicy::Never
        } else {
            UnlockPolicy::At(ts)
        }
    }
}

/// Seconds left until unlock, `None` when unlocked or never unlocking
pub fn remaining(unlock_timestamp: u64, now: u64) -> Option<u64> {
    match UnlockState::derive(unlock_timestamp, now) {
        UnlockState::Locked => Some(unlock_timestamp - now),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_unlock_ignores_clock() {
        for now in [0, 1, 1_700_000_000, u64::MAX] {
            assert_eq!(UnlockState::derive(0, now), UnlockState::NeverUnlock);
        }
    }

    #[test]
    fn test_boundary_is_inclusive() {
        assert_eq!(UnlockState::derive(1000, 999), UnlockState::Locked);
        assert_eq!(UnlockState::derive(1000, 1000), UnlockState::Unlocked);
        assert_eq!(UnlockState::derive(1000, 1001), UnlockState::Unlocked);
    }

    #[test]
    fn test_monotonic_over_time() {
        let unlock = 5_000;
        let mut seen_unlocked = false;
        for now in (0..10_000).step_by(250) {
            let state = UnlockState::derive(unlock, now);
            if seen_unlocked {
                assert_eq!(state, UnlockState::Unlocked, "regressed at now={now}");
            }
            if state.is_unlocked() {
                seen_unlocked = true;
            } else {
                assert_eq!(state, UnlockState::Locked);
            }
        }
        assert!(seen_unlocked);
    }

    #[test]
    fn test_already_past_is_unlocked() {
        let now = 1_700_000_000;
        assert!(UnlockState::derive(now - 1, now).is_unlocked());
    }

    #[test]
    fn test_remaining() {
        assert_eq!(remaining(100, 40), Some(60));
        assert_eq!(remaining(100, 100), None);
        assert_eq!(remaining(0, 40), None);
    }

    #[test]
    fn test_policy_timestamp() {
        assert_eq!(UnlockPolicy::Never.to_timestamp(), 0);
        assert_eq!(UnlockPolicy::At(42).to_timestamp(), 42);
        assert_eq!(UnlockPolicy::from_timestamp(0), UnlockPolicy::Never);
        assert_eq!(UnlockPolicy::from_timestamp(42), UnlockPolicy::At(42));
    }

    #[test]
    fn test_timed_policy_rejects_zero() {
        assert_eq!(UnlockPolicy::at(0), Err(CoreError::InvalidTimestamp(0)));
        assert_eq!(UnlockPolicy::at(7), Ok(UnlockPolicy::At(7)));
        assert!(UnlockPolicy::At(0).checked_timestamp().is_err());
        assert_eq!(UnlockPolicy::Never.checked_timestamp(), Ok(0));
        assert_eq!(UnlockPolicy::At(7).checked_timestamp(), Ok(7));
    }

    #[test]
    fn test_counts_as_locked() {
        assert!(UnlockState::Locked.counts_as_locked());
        assert!(UnlockState::NeverUnlock.counts_as_locked());
        assert!(!UnlockState::Unlocked.counts_as_locked());
    }
}
