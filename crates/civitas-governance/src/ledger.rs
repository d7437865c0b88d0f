//! Voting power ledger collaborator.
//!
//! The lifecycle reads voting power and total supply at a past snapshot so
//! that balances moved after the snapshot cannot change who may propose.

use std::collections::HashMap;

use civitas_types::{Address, Amount, Timestamp};
use tracing::debug;

use crate::error::{GovernanceError, Result};

/// Point-in-time voting power queries.
pub trait VotingPowerLedger {
    /// Voting power delegated to `account` as of `snapshot`.
    fn voting_power_at(&self, account: &Address, snapshot: Timestamp) -> Amount;

    /// Total supply as of `snapshot`.
    fn total_supply_at(&self, snapshot: Timestamp) -> Amount;

    /// Account currently receiving `account`'s voting power.
    fn current_delegate(&self, account: &Address) -> Address;
}

/// Ordered `(timestamp, value)` history. Later writes at the same timestamp
/// overwrite the earlier value.
#[derive(Debug, Clone, Default)]
struct Checkpoints(Vec<(Timestamp, Amount)>);

impl Checkpoints {
    fn latest(&self) -> Amount {
        self.0.last().map(|(_, value)| *value).unwrap_or(0)
    }

    fn at(&self, snapshot: Timestamp) -> Amount {
        let idx = self.0.partition_point(|(at, _)| *at <= snapshot);
        if idx == 0 {
            0
        } else {
            self.0[idx - 1].1
        }
    }

    fn push(&mut self, at: Timestamp, value: Amount) -> Result<()> {
        match self.0.last_mut() {
            Some((last_at, last_value)) if *last_at == at => {
                *last_value = value;
            }
            Some((last_at, _)) if *last_at > at => {
                return Err(GovernanceError::InvalidParameter(format!(
                    "checkpoint at {} precedes latest {}",
                    at, last_at
                )));
            }
            _ => self.0.push((at, value)),
        }
        Ok(())
    }
}

/// In-memory checkpointed balances with delegation.
///
/// Accounts delegate to themselves until they choose another delegate.
/// Writes must arrive in time order; a write older than the latest one is
/// rejected before any balance or checkpoint changes.
#[derive(Debug, Clone, Default)]
pub struct SnapshotLedger {
    /// Time of the latest write
    clock: Timestamp,
    balances: HashMap<Address, Amount>,
    delegates: HashMap<Address, Address>,
    votes: HashMap<Address, Checkpoints>,
    supply: Checkpoints,
}

impl SnapshotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn mint(&mut self, to: Address, amount: Amount, at: Timestamp) -> Result<()> {
        self.ensure_in_order(at)?;
        let supply = self
            .supply
            .latest()
            .checked_add(amount)
            .ok_or_else(|| {
                GovernanceError::InvalidParameter(format!("minting {} overflows supply", amount))
            })?;
        self.clock = at;
        self.supply.push(at, supply)?;
        *self.balances.entry(to).or_insert(0) += amount;
        let delegate = self.current_delegate(&to);
        self.move_votes(None, Some(delegate), amount, at)?;
        debug!(to = %to, amount, at, "Minted voting tokens");
        Ok(())
    }

    pub fn transfer(&mut self, from: Address, to: Address, amount: Amount, at: Timestamp) -> Result<()> {
        self.ensure_in_order(at)?;
        let available = self.balance_of(&from);
        if available < amount {
            return Err(GovernanceError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        self.clock = at;
        self.balances.insert(from, available - amount);
        *self.balances.entry(to).or_insert(0) += amount;
        let (src, dst) = (self.current_delegate(&from), self.current_delegate(&to));
        self.move_votes(Some(src), Some(dst), amount, at)
    }

    pub fn delegate(&mut self, account: Address, delegatee: Address, at: Timestamp) -> Result<()> {
        self.ensure_in_order(at)?;
        let previous = self.current_delegate(&account);
        if previous == delegatee {
            return Ok(());
        }
        self.clock = at;
        self.delegates.insert(account, delegatee);
        let balance = self.balance_of(&account);
        self.move_votes(Some(previous), Some(delegatee), balance, at)?;
        debug!(account = %account, from = %previous, to = %delegatee, at, "Delegation changed");
        Ok(())
    }

    /// Time of the latest accepted write.
    pub fn clock(&self) -> Timestamp {
        self.clock
    }

    fn ensure_in_order(&self, at: Timestamp) -> Result<()> {
        if at < self.clock {
            return Err(GovernanceError::InvalidParameter(format!(
                "write at {} precedes latest {}",
                at, self.clock
            )));
        }
        Ok(())
    }

    fn move_votes(
        &mut self,
        from: Option<Address>,
        to: Option<Address>,
        amount: Amount,
        at: Timestamp,
    ) -> Result<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        if let Some(from) = from {
            let history = self.votes.entry(from).or_default();
            let current = history.latest();
            history.push(at, current.saturating_sub(amount))?;
        }
        if let Some(to) = to {
            let history = self.votes.entry(to).or_default();
            let current = history.latest();
            history.push(at, current + amount)?;
        }
        Ok(())
    }
}

impl VotingPowerLedger for SnapshotLedger {
    fn voting_power_at(&self, account: &Address, snapshot: Timestamp) -> Amount {
        self.votes
            .get(account)
            .map(|history| history.at(snapshot))
            .unwrap_or(0)
    }

    fn total_supply_at(&self, snapshot: Timestamp) -> Amount {
        self.supply.at(snapshot)
    }

    fn current_delegate(&self, account: &Address) -> Address {
        self.delegates.get(account).copied().unwrap_or(*account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    #[test]
    fn test_historical_queries() {
        let mut ledger = SnapshotLedger::new();
        ledger.mint(addr(1), 100, 10).unwrap();
        ledger.mint(addr(2), 50, 20).unwrap();

        assert_eq!(ledger.total_supply_at(9), 0);
        assert_eq!(ledger.total_supply_at(10), 100);
        assert_eq!(ledger.total_supply_at(25), 150);

        assert_eq!(ledger.voting_power_at(&addr(1), 15), 100);
        assert_eq!(ledger.voting_power_at(&addr(2), 15), 0);
        assert_eq!(ledger.voting_power_at(&addr(2), 20), 50);
    }

    #[test]
    fn test_transfer_after_snapshot_does_not_change_past() {
        let mut ledger = SnapshotLedger::new();
        ledger.mint(addr(1), 100, 10).unwrap();
        ledger.transfer(addr(1), addr(2), 60, 30).unwrap();

        assert_eq!(ledger.voting_power_at(&addr(1), 29), 100);
        assert_eq!(ledger.voting_power_at(&addr(1), 30), 40);
        assert_eq!(ledger.voting_power_at(&addr(2), 30), 60);
    }

    #[test]
    fn test_out_of_order_write_changes_nothing() {
        let mut ledger = SnapshotLedger::new();
        ledger.mint(addr(1), 10, 10).unwrap();
        ledger.transfer(addr(1), addr(2), 5, 30).unwrap();

        assert!(matches!(
            ledger.mint(addr(1), 50, 20),
            Err(GovernanceError::InvalidParameter(_))
        ));
        assert_eq!(ledger.total_supply_at(u64::MAX), 10);
        assert_eq!(ledger.balance_of(&addr(1)), 5);
        assert_eq!(ledger.voting_power_at(&addr(1), u64::MAX), 5);

        assert!(ledger.transfer(addr(2), addr(1), 5, 29).is_err());
        assert!(ledger.delegate(addr(1), addr(3), 29).is_err());
        assert_eq!(ledger.balance_of(&addr(2)), 5);
        assert_eq!(ledger.current_delegate(&addr(1)), addr(1));
        assert_eq!(ledger.clock(), 30);

        // Same-time writes are still accepted.
        ledger.mint(addr(1), 50, 30).unwrap();
        assert_eq!(ledger.total_supply_at(30), 60);
    }

    #[test]
    fn test_failed_transfer_keeps_clock() {
        let mut ledger = SnapshotLedger::new();
        ledger.mint(addr(1), 10, 10).unwrap();
        assert!(matches!(
            ledger.transfer(addr(1), addr(2), 11, 40),
            Err(GovernanceError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.clock(), 10);
        ledger.mint(addr(2), 1, 20).unwrap();
    }

    #[test]
    fn test_delegation_moves_power() {
        let mut ledger = SnapshotLedger::new();
        ledger.mint(addr(1), 100, 10).unwrap();
        assert_eq!(ledger.current_delegate(&addr(1)), addr(1));

        ledger.delegate(addr(1), addr(3), 20).unwrap();
        assert_eq!(ledger.current_delegate(&addr(1)), addr(3));
        assert_eq!(ledger.voting_power_at(&addr(1), 20), 0);
        assert_eq!(ledger.voting_power_at(&addr(3), 20), 100);
        assert_eq!(ledger.voting_power_at(&addr(3), 19), 0);
    }

    #[test]
    fn test_out_of_order_checkpoint_rejected() {
        let mut ledger = SnapshotLedger::new();
        ledger.mint(addr(1), 100, 10).unwrap();
        assert!(ledger.mint(addr(1), 100, 5).is_err());
    }

    #[test]
    fn test_transfer_insufficient() {
        let mut ledger = SnapshotLedger::new();
        ledger.mint(addr(1), 10, 1).unwrap();
        let err = ledger.transfer(addr(1), addr(2), 11, 2).unwrap_err();
        assert_eq!(err, GovernanceError::InsufficientBalance { available: 10, required: 11 });
    }
}
