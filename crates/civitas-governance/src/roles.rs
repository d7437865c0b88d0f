//! Role-based access control.
//!
//! Each component owns a [`RoleStore`] holding an explicit permission set per
//! principal. Entry points check a capability with [`RoleStore::require`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use civitas_types::Address;
use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, Result};
use crate::events::{EventLog, GovernanceEvent};

/// Capabilities that gate governance entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Grants and revokes roles, updates parameters
    Admin,
    /// Relays signed off-chain votes
    Validator,
    /// Creates emergency proposals
    Emergency,
    /// Toggles pause state
    Pauser,
    /// Schedules timelock operations
    Proposer,
    /// Executes ready timelock operations
    Executor,
    /// Cancels pending timelock operations
    Canceller,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Permission sets keyed by principal.
#[derive(Debug, Clone, Default)]
pub struct RoleStore {
    grants: HashMap<Address, HashSet<Role>>,
}

impl RoleStore {
    /// Create a store whose only member is `admin` holding [`Role::Admin`].
    pub fn with_admin(admin: Address) -> Self {
        let mut store = Self::default();
        store.insert(admin, Role::Admin);
        store
    }

    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.grants
            .get(account)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false)
    }

    /// Fail with an authorization error unless `account` holds `role`.
    pub fn require(&self, role: Role, account: &Address) -> Result<()> {
        if self.has_role(role, account) {
            Ok(())
        } else {
            Err(GovernanceError::MissingRole {
                role,
                account: *account,
            })
        }
    }

    /// Grant `role` to `account`. Only admins may grant.
    ///
    /// Returns `false` if the account already held the role.
    pub fn grant(&mut self, caller: &Address, role: Role, account: Address) -> Result<bool> {
        self.require(Role::Admin, caller)?;
        Ok(self.insert(account, role))
    }

    /// Revoke `role` from `account`. Only admins may revoke.
    ///
    /// Returns `false` if the account did not hold the role.
    pub fn revoke(&mut self, caller: &Address, role: Role, account: &Address) -> Result<bool> {
        self.require(Role::Admin, caller)?;
        let removed = match self.grants.get_mut(account) {
            Some(roles) => roles.remove(&role),
            None => false,
        };
        if self.grants.get(account).is_some_and(|roles| roles.is_empty()) {
            self.grants.remove(account);
        }
        Ok(removed)
    }

    /// Roles currently held by `account`.
    pub fn roles_of(&self, account: &Address) -> Vec<Role> {
        self.grants
            .get(account)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default()
    }

    fn insert(&mut self, account: Address, role: Role) -> bool {
        self.grants.entry(account).or_default().insert(role)
    }
}

/// Components that expose role administration and record it as events.
pub trait AccessControlled {
    fn role_store(&self) -> &RoleStore;

    fn role_store_mut(&mut self) -> &mut RoleStore;

    fn event_log_mut(&mut self) -> &mut EventLog;

    fn has_role(&self, role: Role, account: &Address) -> bool {
        self.role_store().has_role(role, account)
    }

    /// Grant `role` to `account`, emitting `RoleGranted` if it was new.
    fn grant_role(&mut self, caller: Address, role: Role, account: Address) -> Result<bool> {
        let granted = self.role_store_mut().grant(&caller, role, account)?;
        if granted {
            self.event_log_mut().emit(GovernanceEvent::RoleGranted {
                role,
                account,
                by: caller,
            });
        }
        Ok(granted)
    }

    /// Revoke `role` from `account`, emitting `RoleRevoked` if it was held.
    fn revoke_role(&mut self, caller: Address, role: Role, account: Address) -> Result<bool> {
        let revoked = self.role_store_mut().revoke(&caller, role, &account)?;
        if revoked {
            self.event_log_mut().emit(GovernanceEvent::RoleRevoked {
                role,
                account,
                by: caller,
            });
        }
        Ok(revoked)
    }
}
