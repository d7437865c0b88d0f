//! Custody token collaborator.
//!
//! The voting engine only needs balance/transfer/transfer-from semantics to
//! move commitments in and out of custody, plus two metadata lookups that may
//! fail and fall back to documented defaults.

use std::collections::HashMap;

use civitas_types::{Address, Amount};
use thiserror::Error;

use crate::error::GovernanceError;

/// Symbol reported when the token cannot provide one.
pub const DEFAULT_SYMBOL: &str = "VOTE";
/// Decimals assumed when the token cannot provide them.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Errors raised by a custody token.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TokenError {
    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: Amount, required: Amount },

    #[error("Insufficient allowance: have {available}, need {required}")]
    InsufficientAllowance { available: Amount, required: Amount },

    #[error("Zero amount")]
    ZeroAmount,

    #[error("Zero address")]
    ZeroAddress,

    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(&'static str),
}

impl From<TokenError> for GovernanceError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InsufficientBalance { available, required } => {
                GovernanceError::InsufficientBalance { available, required }
            }
            other => GovernanceError::TokenTransferFailed(other.to_string()),
        }
    }
}

/// Standard fungible-token surface used for commitment custody.
pub trait CustodyToken {
    fn balance_of(&self, account: &Address) -> Amount;

    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError>;

    /// Move `amount` from `from` to `to`, spending `spender`'s allowance.
    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError>;

    fn symbol(&self) -> Result<String, TokenError>;

    fn decimals(&self) -> Result<u8, TokenError>;
}

/// Token symbol and decimals, with fallbacks already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

impl TokenMetadata {
    /// Query `token`, substituting [`DEFAULT_SYMBOL`] / [`DEFAULT_DECIMALS`]
    /// for any lookup that fails.
    pub fn resolve<T: CustodyToken + ?Sized>(token: &T) -> Self {
        Self {
            symbol: token.symbol().unwrap_or_else(|_| DEFAULT_SYMBOL.to_string()),
            decimals: token.decimals().unwrap_or(DEFAULT_DECIMALS),
        }
    }
}

/// In-memory token with balances and allowances.
#[derive(Debug, Clone, Default)]
pub struct InMemoryToken {
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    total_supply: Amount,
    metadata: Option<(String, u8)>,
}

impl InMemoryToken {
    pub fn new(symbol: &str, decimals: u8) -> Self {
        Self {
            metadata: Some((symbol.to_string(), decimals)),
            ..Self::default()
        }
    }

    /// A token whose metadata lookups always fail.
    pub fn without_metadata() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, to: Address, amount: Amount) {
        *self.balances.entry(to).or_insert(0) += amount;
        self.total_supply += amount;
    }

    pub fn approve(&mut self, owner: Address, spender: Address, amount: Amount) {
        if amount == 0 {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    fn move_balance(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError> {
        if amount == 0 {
            return Err(TokenError::ZeroAmount);
        }
        if to.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        if available == amount {
            self.balances.remove(from);
        } else {
            self.balances.insert(*from, available - amount);
        }
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }
}

impl CustodyToken for InMemoryToken {
    fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError> {
        self.move_balance(from, to, amount)
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let available = self.allowance(from, spender);
        if available < amount {
            return Err(TokenError::InsufficientAllowance {
                available,
                required: amount,
            });
        }
        self.move_balance(from, to, amount)?;
        self.approve(*from, *spender, available - amount);
        Ok(())
    }

    fn symbol(&self) -> Result<String, TokenError> {
        self.metadata
            .as_ref()
            .map(|(symbol, _)| symbol.clone())
            .ok_or(TokenError::MetadataUnavailable("symbol"))
    }

    fn decimals(&self) -> Result<u8, TokenError> {
        self.metadata
            .as_ref()
            .map(|(_, decimals)| *decimals)
            .ok_or(TokenError::MetadataUnavailable("decimals"))
    }
}
