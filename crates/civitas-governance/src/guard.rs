//! Reentrancy protection for custody- and tally-mutating operations.
//!
//! A guarded operation marks the guard as entered for the whole call; any
//! nested attempt to enter a guarded operation before the outer call returns
//! is rejected. The guard is released on every return path, including errors.

use tracing::warn;

use crate::error::{GovernanceError, Result};

/// Tracks whether a guarded operation is in progress.
#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    /// Operation currently holding the guard
    active: Option<&'static str>,
    /// Number of rejected nested entries
    rejected: u64,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a guarded operation.
    ///
    /// # Errors
    /// Returns [`GovernanceError::ReentrantCall`] if another guarded
    /// operation has not finished yet.
    pub fn enter(&mut self, operation: &'static str) -> Result<()> {
        if let Some(active) = self.active {
            self.rejected += 1;
            warn!(active, attempted = operation, "Rejected reentrant call");
            return Err(GovernanceError::ReentrantCall);
        }
        self.active = Some(operation);
        Ok(())
    }

    /// Release the guard.
    pub fn exit(&mut self) {
        self.active = None;
    }

    pub fn is_entered(&self) -> bool {
        self.active.is_some()
    }

    /// Name of the operation holding the guard, if any.
    pub fn active_operation(&self) -> Option<&'static str> {
        self.active
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }
}

/// Components that run operations under a [`ReentrancyGuard`].
pub(crate) trait Guarded: Sized {
    fn reentrancy_guard(&mut self) -> &mut ReentrancyGuard;

    /// Run `f` with the guard held, releasing it whatever `f` returns.
    fn guarded<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.reentrancy_guard().enter(operation)?;
        let result = f(self);
        self.reentrancy_guard().exit();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        guard: ReentrancyGuard,
        value: u32,
    }

    impl Guarded for Counter {
        fn reentrancy_guard(&mut self) -> &mut ReentrancyGuard {
            &mut self.guard
        }
    }

    impl Counter {
        fn bump(&mut self) -> Result<u32> {
            self.guarded("bump", |this| {
                this.value += 1;
                Ok(this.value)
            })
        }

        fn bump_nested(&mut self) -> Result<u32> {
            self.guarded("bump_nested", |this| this.bump())
        }

        fn fail(&mut self) -> Result<u32> {
            self.guarded("fail", |_| Err(GovernanceError::ZeroTokens))
        }
    }

    #[test]
    fn test_enter_exit() {
        let mut guard = ReentrancyGuard::new();
        assert!(!guard.is_entered());

        guard.enter("commit").unwrap();
        assert_eq!(guard.active_operation(), Some("commit"));

        assert_eq!(guard.enter("vote"), Err(GovernanceError::ReentrantCall));
        assert_eq!(guard.rejected_count(), 1);

        guard.exit();
        assert!(guard.enter("vote").is_ok());
    }

    #[test]
    fn test_nested_guarded_call_rejected() {
        let mut counter = Counter { guard: ReentrancyGuard::new(), value: 0 };
        assert_eq!(counter.bump_nested(), Err(GovernanceError::ReentrantCall));
        assert_eq!(counter.value, 0);
        assert!(!counter.guard.is_entered());
    }

    #[test]
    fn test_released_after_error() {
        let mut counter = Counter { guard: ReentrancyGuard::new(), value: 0 };
        assert!(counter.fail().is_err());
        assert!(!counter.guard.is_entered());
        assert_eq!(counter.bump(), Ok(1));
    }
}
