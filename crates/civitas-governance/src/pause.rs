//! Pause state shared by the lifecycle (manual) and the timelock
//! (self-expiring).

use civitas_types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, Result};

/// Paused flag plus the time it was set.
///
/// A manual pause stays active until explicitly cleared. A self-expiring
/// pause stops blocking once `paused_at + expiry` has passed, and anyone may
/// then clear it with [`PauseState::auto_unpause`]. It cannot be set again
/// until another `expiry` seconds have elapsed after that, so a pauser can
/// hold the system at most half of the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseState {
    paused: bool,
    paused_at: Timestamp,
    expiry: Option<u64>,
    /// Earliest time a self-expiring pause may be set again
    cooldown_until: Timestamp,
}

impl PauseState {
    /// A pause that never expires on its own.
    pub fn manual() -> Self {
        Self {
            paused: false,
            paused_at: 0,
            expiry: None,
            cooldown_until: 0,
        }
    }

    /// A pause that lapses after `duration` seconds.
    pub fn self_expiring(duration: u64) -> Self {
        Self {
            paused: false,
            paused_at: 0,
            expiry: Some(duration),
            cooldown_until: 0,
        }
    }

    /// # Errors
    /// - `Paused` while a pause is in force
    /// - `PauseCooldown` if a self-expiring pause was set less than twice its
    ///   duration ago, even when it was cleared early
    pub fn pause(&mut self, now: Timestamp) -> Result<()> {
        if self.is_active(now) {
            return Err(GovernanceError::Paused);
        }
        if now < self.cooldown_until {
            return Err(GovernanceError::PauseCooldown {
                available_at: self.cooldown_until,
            });
        }
        self.paused = true;
        self.paused_at = now;
        if let Some(duration) = self.expiry {
            self.cooldown_until = now.saturating_add(duration.saturating_mul(2));
        }
        Ok(())
    }

    /// Earliest time [`Self::pause`] will succeed again, if later than now.
    pub fn cooldown_until(&self, now: Timestamp) -> Option<Timestamp> {
        (now < self.cooldown_until).then_some(self.cooldown_until)
    }

    pub fn unpause(&mut self) -> Result<()> {
        if !self.paused {
            return Err(GovernanceError::NotPaused);
        }
        self.paused = false;
        Ok(())
    }

    /// Clear an expired pause. Callable by anyone.
    ///
    /// # Errors
    /// - `NotPaused` if nothing is paused
    /// - `Unauthorized` for a manual pause, which never expires
    /// - `PauseNotExpired` before the expiry time
    pub fn auto_unpause(&mut self, now: Timestamp) -> Result<()> {
        if !self.paused {
            return Err(GovernanceError::NotPaused);
        }
        let expires_at = self.expires_at().ok_or_else(|| {
            GovernanceError::Unauthorized("manual pause does not expire".to_string())
        })?;
        if now < expires_at {
            return Err(GovernanceError::PauseNotExpired { expires_at });
        }
        self.paused = false;
        Ok(())
    }

    /// Whether the flag is set, regardless of expiry.
    pub fn is_flagged(&self) -> bool {
        self.paused
    }

    /// Whether the pause currently blocks guarded operations.
    pub fn is_active(&self, now: Timestamp) -> bool {
        match self.expires_at() {
            Some(expires_at) => self.paused && now < expires_at,
            None => self.paused,
        }
    }

    /// Drop the flag if it has lapsed. Returns `true` if it was cleared.
    pub fn clear_if_expired(&mut self, now: Timestamp) -> bool {
        if self.paused && !self.is_active(now) {
            self.paused = false;
            return true;
        }
        false
    }

    pub fn ensure_not_paused(&self, now: Timestamp) -> Result<()> {
        if self.is_active(now) {
            Err(GovernanceError::Paused)
        } else {
            Ok(())
        }
    }

    pub fn paused_at(&self) -> Option<Timestamp> {
        self.paused.then_some(self.paused_at)
    }

    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expiry
            .map(|duration| self.paused_at.saturating_add(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_pause() {
        let mut state = PauseState::manual();
        state.pause(100).unwrap();
        assert!(state.is_active(u64::MAX));
        assert_eq!(state.pause(101), Err(GovernanceError::Paused));
        assert!(matches!(state.auto_unpause(u64::MAX), Err(GovernanceError::Unauthorized(_))));

        state.unpause().unwrap();
        assert!(!state.is_active(100));
        assert_eq!(state.unpause(), Err(GovernanceError::NotPaused));
    }

    #[test]
    fn test_self_expiring_pause() {
        let mut state = PauseState::self_expiring(50);
        state.pause(100).unwrap();

        assert!(state.is_active(149));
        assert_eq!(state.ensure_not_paused(120), Err(GovernanceError::Paused));
        assert_eq!(
            state.auto_unpause(149),
            Err(GovernanceError::PauseNotExpired { expires_at: 150 })
        );

        assert!(!state.is_active(150));
        state.auto_unpause(150).unwrap();
        assert!(!state.is_flagged());
    }

    #[test]
    fn test_clear_if_expired() {
        let mut state = PauseState::self_expiring(10);
        state.pause(0).unwrap();
        assert!(!state.clear_if_expired(5));
        assert!(state.clear_if_expired(10));
        assert_eq!(state.paused_at(), None);
    }

    #[test]
    fn test_repause_after_expiry() {
        let mut state = PauseState::self_expiring(10);
        state.pause(0).unwrap();
        state.pause(20).unwrap();
        assert_eq!(state.expires_at(), Some(30));
    }

    #[test]
    fn test_expired_pause_cannot_be_chained() {
        let mut state = PauseState::self_expiring(10);
        state.pause(0).unwrap();
        assert!(!state.is_active(10));
        assert_eq!(
            state.pause(10),
            Err(GovernanceError::PauseCooldown { available_at: 20 })
        );
        assert_eq!(state.pause(19).unwrap_err().kind(), crate::ErrorKind::Timing);
        assert_eq!(state.cooldown_until(15), Some(20));
        assert_eq!(state.cooldown_until(20), None);

        // Clearing early does not reset the cooldown.
        state.pause(20).unwrap();
        state.unpause().unwrap();
        assert_eq!(
            state.pause(21),
            Err(GovernanceError::PauseCooldown { available_at: 40 })
        );
        state.pause(40).unwrap();
    }

    #[test]
    fn test_manual_pause_has_no_cooldown() {
        let mut state = PauseState::manual();
        state.pause(5).unwrap();
        state.unpause().unwrap();
        state.pause(5).unwrap();
        assert!(state.is_active(6));
    }
}
