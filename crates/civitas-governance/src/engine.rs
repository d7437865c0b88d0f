//! Quadratic voting engine.
//!
//! Proposals go through states: Created -> Open -> Closed -> Executed
//!
//! Voters commit tokens into custody, wait out the lock period and then vote
//! with `isqrt(tokens)` power split across options by percentage weights.
//! Validators may instead relay ballots signed off-chain; both channels share
//! one vote per (proposal, voter).

use std::collections::{HashMap, HashSet};

use civitas_types::{Address, Amount, Hash, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{GovernanceError, Result};
use crate::events::{EventLog, GovernanceEvent};
use crate::guard::{Guarded, ReentrancyGuard};
use crate::offchain::SignedVote;
use crate::pause::PauseState;
use crate::roles::{AccessControlled, Role, RoleStore};
use crate::token::{CustodyToken, TokenMetadata};
use crate::voting::{distribute_power, leading_option, validate_weights, voting_power};

/// Fewest options a proposal may offer.
pub const MIN_OPTIONS: usize = 2;
/// Most options a proposal may offer.
pub const MAX_OPTIONS: usize = 10;
/// Shortest voting window (1 hour).
pub const MIN_DURATION: u64 = 3_600;
/// Longest voting window (30 days).
pub const MAX_DURATION: u64 = 30 * 86_400;

/// Proposal phase at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalState {
    /// Window not yet started
    Created,
    /// `start_time <= now < end_time`
    Open,
    /// Window over, not executed
    Closed,
    /// Finalized, terminal
    Executed,
}

/// Quadratic vote proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Unique proposal ID
    pub id: u64,
    /// Proposer address
    pub proposer: Address,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Window start (inclusive)
    pub start_time: Timestamp,
    /// Window end (exclusive)
    pub end_time: Timestamp,
    /// Option labels
    pub options: Vec<String>,
    /// Accumulated power per option
    pub tally: Vec<Amount>,
    /// Tokens allocated across all votes
    pub total_tokens: Amount,
    /// Voting power across all votes, before distribution
    pub total_voting_power: Amount,
    /// Set once by `execute_proposal`
    pub executed: bool,
    /// Number of recorded votes
    pub voter_count: u64,
}

impl Proposal {
    pub fn state(&self, now: Timestamp) -> ProposalState {
        if self.executed {
            ProposalState::Executed
        } else if now < self.start_time {
            ProposalState::Created
        } else if now < self.end_time {
            ProposalState::Open
        } else {
            ProposalState::Closed
        }
    }

    pub fn is_closed(&self, now: Timestamp) -> bool {
        now >= self.end_time
    }

    fn ensure_open(&self, now: Timestamp) -> Result<()> {
        if now < self.start_time {
            return Err(GovernanceError::VotingNotStarted);
        }
        if self.executed || now >= self.end_time {
            return Err(GovernanceError::VotingClosed);
        }
        Ok(())
    }

    fn ensure_closed(&self, now: Timestamp) -> Result<()> {
        if !self.is_closed(now) {
            return Err(GovernanceError::VotingStillOpen {
                ends_at: self.end_time,
            });
        }
        Ok(())
    }
}

/// How a vote reached the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteChannel {
    /// Cast by the voter against committed tokens
    Direct,
    /// Signed off-chain and relayed by a validator
    OffChain,
}

/// A recorded vote. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserVote {
    pub tokens: Amount,
    pub voting_power: Amount,
    pub weights: Vec<u8>,
    pub timestamp: Timestamp,
    pub has_voted: bool,
    pub channel: VoteChannel,
}

/// Tokens held in custody for one voter on one proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCommitment {
    pub amount: Amount,
    pub committed_at: Timestamp,
    pub proposal_id: u64,
}

impl TokenCommitment {
    /// Earliest time the commitment may be spent on a vote.
    pub fn unlocks_at(&self, lock_period: u64) -> Timestamp {
        self.committed_at.saturating_add(lock_period)
    }
}

/// Quadratic voting engine.
#[derive(Debug)]
pub struct QuadraticVotingEngine<T: CustodyToken> {
    config: EngineConfig,
    custody: Address,
    token: T,
    proposals: HashMap<u64, Proposal>,
    next_id: u64,
    votes: HashMap<(u64, Address), UserVote>,
    commitments: HashMap<(u64, Address), TokenCommitment>,
    used_signatures: HashSet<Hash>,
    roles: RoleStore,
    pause: PauseState,
    guard: ReentrancyGuard,
    events: EventLog,
}

impl<T: CustodyToken> Guarded for QuadraticVotingEngine<T> {
    fn reentrancy_guard(&mut self) -> &mut ReentrancyGuard {
        &mut self.guard
    }
}

impl<T: CustodyToken> AccessControlled for QuadraticVotingEngine<T> {
    fn role_store(&self) -> &RoleStore {
        &self.roles
    }

    fn role_store_mut(&mut self) -> &mut RoleStore {
        &mut self.roles
    }

    fn event_log_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }
}

impl<T: CustodyToken> QuadraticVotingEngine<T> {
    /// Create an engine administered by `admin` that keeps commitments in
    /// `token`.
    pub fn new(admin: Address, token: T, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            custody: Address::for_module("quadratic-voting"),
            token,
            proposals: HashMap::new(),
            next_id: 1,
            votes: HashMap::new(),
            commitments: HashMap::new(),
            used_signatures: HashSet::new(),
            roles: RoleStore::with_admin(admin),
            pause: PauseState::manual(),
            guard: ReentrancyGuard::new(),
            events: EventLog::new("quadratic_voting"),
        })
    }

    /// Open a proposal whose window is `[now, now + duration)`.
    pub fn create_proposal(
        &mut self,
        proposer: Address,
        title: &str,
        description: &str,
        options: Vec<String>,
        duration: u64,
        now: Timestamp,
    ) -> Result<u64> {
        if title.trim().is_empty() {
            return Err(GovernanceError::EmptyTitle);
        }
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&options.len()) {
            return Err(GovernanceError::InvalidOptionCount {
                count: options.len(),
                min: MIN_OPTIONS,
                max: MAX_OPTIONS,
            });
        }
        if let Some(index) = options.iter().position(|o| o.trim().is_empty()) {
            return Err(GovernanceError::EmptyOption(index));
        }
        if !(MIN_DURATION..=MAX_DURATION).contains(&duration) {
            return Err(GovernanceError::InvalidDuration {
                duration,
                min: MIN_DURATION,
                max: MAX_DURATION,
            });
        }

        let id = self.next_id;
        self.next_id += 1;

        let end_time = now.saturating_add(duration);
        let proposal = Proposal {
            id,
            proposer,
            title: title.to_string(),
            description: description.to_string(),
            start_time: now,
            end_time,
            tally: vec![0; options.len()],
            options,
            total_tokens: 0,
            total_voting_power: 0,
            executed: false,
            voter_count: 0,
        };

        info!(id, proposer = %proposer, options = proposal.options.len(), end_time, "Quadratic proposal created");
        self.events.emit(GovernanceEvent::ProposalCreated {
            proposal_id: id,
            proposer,
            title: proposal.title.clone(),
            options: proposal.options.len(),
            start_time: now,
            end_time,
        });
        self.proposals.insert(id, proposal);
        Ok(id)
    }

    /// Commit `amount` tokens to a proposal.
    ///
    /// A later commitment replaces the earlier one instead of adding to it:
    /// the earlier amount goes back to the caller and the lock period starts
    /// over. Only the difference actually moves.
    pub fn commit_tokens(
        &mut self,
        caller: Address,
        proposal_id: u64,
        amount: Amount,
        now: Timestamp,
    ) -> Result<()> {
        self.guarded("commit_tokens", |this| {
            this.pause.ensure_not_paused(now)?;
            this.get_proposal(proposal_id)?.ensure_open(now)?;
            if this.has_voted(proposal_id, &caller) {
                return Err(GovernanceError::AlreadyVoted);
            }
            let (min, max) = (this.config.min_commitment, this.config.max_commitment);
            if amount < min || amount > max {
                return Err(GovernanceError::InvalidCommitment { amount, min, max });
            }

            let key = (proposal_id, caller);
            let replaced = this.commitments.get(&key).map(|c| c.amount).unwrap_or(0);
            let available = this.token.balance_of(&caller).saturating_add(replaced);
            if available < amount {
                return Err(GovernanceError::InsufficientBalance {
                    available,
                    required: amount,
                });
            }

            if amount > replaced {
                let custody = this.custody;
                this.token
                    .transfer_from(&custody, &caller, &custody, amount - replaced)?;
            } else if replaced > amount {
                let custody = this.custody;
                this.token.transfer(&custody, &caller, replaced - amount)?;
            }

            this.commitments.insert(
                key,
                TokenCommitment {
                    amount,
                    committed_at: now,
                    proposal_id,
                },
            );
            debug!(proposal_id, voter = %caller, amount, replaced, "Tokens committed");
            this.events.emit(GovernanceEvent::TokensCommitted {
                proposal_id,
                voter: caller,
                amount,
                replaced,
            });
            Ok(())
        })
    }

    /// Vote with `tokens` of the caller's commitment.
    ///
    /// Returns the voting power, `isqrt(tokens)`.
    pub fn vote(
        &mut self,
        caller: Address,
        proposal_id: u64,
        tokens: Amount,
        weights: Vec<u8>,
        now: Timestamp,
    ) -> Result<Amount> {
        self.guarded("vote", |this| {
            this.pause.ensure_not_paused(now)?;
            this.check_ballot(proposal_id, &caller, tokens, &weights, now)?;

            let commitment = this.commitments.get(&(proposal_id, caller)).copied();
            let committed = commitment.map(|c| c.amount).unwrap_or(0);
            if tokens > committed {
                return Err(GovernanceError::InsufficientCommitment {
                    committed,
                    requested: tokens,
                });
            }
            if let Some(commitment) = commitment {
                let unlocks_at = commitment.unlocks_at(this.config.lock_period);
                if now < unlocks_at {
                    return Err(GovernanceError::LockPeriodActive { unlocks_at });
                }
            }

            let power = this.record_vote(proposal_id, caller, tokens, weights.clone(), VoteChannel::Direct, now);
            this.events.emit(GovernanceEvent::VoteCast {
                proposal_id,
                voter: caller,
                tokens,
                voting_power: power,
                weights,
            });
            Ok(power)
        })
    }

    /// Record a ballot signed off-chain by `vote.voter`. Validator only.
    ///
    /// No tokens move, but the declared tokens must still fall within the
    /// commitment bounds. A signature already consumed is rejected before
    /// anything else about the ballot is checked; a fresh one is consumed in
    /// the same call that records the vote.
    pub fn verify_off_chain_vote(
        &mut self,
        caller: Address,
        proposal_id: u64,
        vote: &SignedVote,
        now: Timestamp,
    ) -> Result<Amount> {
        self.roles.require(Role::Validator, &caller)?;
        self.guarded("verify_off_chain_vote", |this| {
            this.pause.ensure_not_paused(now)?;
            let signature_hash = vote.signature_hash();
            if this.used_signatures.contains(&signature_hash) {
                warn!(proposal_id, voter = %vote.voter, signature = %signature_hash.short(), "Replayed signature");
                return Err(GovernanceError::SignatureReused(signature_hash));
            }

            this.check_ballot(proposal_id, &vote.voter, vote.tokens, &vote.weights, now)?;
            if vote.tokens < this.config.min_commitment || vote.tokens > this.config.max_commitment {
                return Err(GovernanceError::InvalidCommitment {
                    amount: vote.tokens,
                    min: this.config.min_commitment,
                    max: this.config.max_commitment,
                });
            }
            if let Err(e) = vote.verify(proposal_id, this.config.chain_id) {
                warn!(proposal_id, voter = %vote.voter, relayer = %caller, error = %e, "Rejected off-chain vote");
                return Err(e);
            }

            this.used_signatures.insert(signature_hash);
            let power = this.record_vote(
                proposal_id,
                vote.voter,
                vote.tokens,
                vote.weights.clone(),
                VoteChannel::OffChain,
                now,
            );
            this.events.emit(GovernanceEvent::OffChainVoteVerified {
                proposal_id,
                voter: vote.voter,
                relayer: caller,
                voting_power: power,
                signature_hash,
            });
            Ok(power)
        })
    }

    /// Finalize a closed proposal. Returns the winning option and its power.
    pub fn execute_proposal(
        &mut self,
        caller: Address,
        proposal_id: u64,
        now: Timestamp,
    ) -> Result<(usize, Amount)> {
        self.guarded("execute_proposal", |this| {
            let proposal = this.get_proposal(proposal_id)?;
            if proposal.executed {
                return Err(GovernanceError::AlreadyExecuted);
            }
            proposal.ensure_closed(now)?;
            let (winning_option, power) = leading_option(&proposal.tally);

            if let Some(proposal) = this.proposals.get_mut(&proposal_id) {
                proposal.executed = true;
            }
            info!(proposal_id, by = %caller, winning_option, power, "Quadratic proposal executed");
            this.events.emit(GovernanceEvent::ProposalExecuted {
                proposal_id,
                winning_option,
                voting_power: power,
            });
            Ok((winning_option, power))
        })
    }

    /// Leading option and its power once the window has closed.
    pub fn winning_option(&self, proposal_id: u64, now: Timestamp) -> Result<(usize, Amount)> {
        let proposal = self.get_proposal(proposal_id)?;
        proposal.ensure_closed(now)?;
        Ok(leading_option(&proposal.tally))
    }

    /// Return the caller's commitment after the window has closed.
    ///
    /// Returns the amount withdrawn; zero if nothing was committed.
    pub fn withdraw_tokens(&mut self, caller: Address, proposal_id: u64, now: Timestamp) -> Result<Amount> {
        self.guarded("withdraw_tokens", |this| this.withdraw(caller, proposal_id, now))
    }

    /// Withdraw from several proposals, skipping any that are unknown, still
    /// open, empty or fail to transfer. Returns the total withdrawn.
    pub fn batch_withdraw_tokens(
        &mut self,
        caller: Address,
        proposal_ids: &[u64],
        now: Timestamp,
    ) -> Result<Amount> {
        self.guarded("batch_withdraw_tokens", |this| {
            let mut total: Amount = 0;
            for &proposal_id in proposal_ids {
                match this.withdraw(caller, proposal_id, now) {
                    Ok(amount) => total = total.saturating_add(amount),
                    Err(e) => debug!(proposal_id, voter = %caller, reason = %e, "Skipped withdrawal"),
                }
            }
            Ok(total)
        })
    }

    pub fn set_lock_period(&mut self, caller: Address, lock_period: u64) -> Result<()> {
        self.roles.require(Role::Admin, &caller)?;
        if lock_period > MAX_DURATION {
            return Err(GovernanceError::InvalidPeriod {
                name: "lock_period",
                value: lock_period,
                min: 0,
                max: MAX_DURATION,
            });
        }
        let old = std::mem::replace(&mut self.config.lock_period, lock_period);
        self.parameter_updated("lock_period", old.into(), lock_period.into());
        Ok(())
    }

    pub fn set_commitment_bounds(&mut self, caller: Address, min: Amount, max: Amount) -> Result<()> {
        self.roles.require(Role::Admin, &caller)?;
        let candidate = EngineConfig {
            min_commitment: min,
            max_commitment: max,
            ..self.config.clone()
        };
        candidate.validate()?;

        let old_min = std::mem::replace(&mut self.config.min_commitment, min);
        let old_max = std::mem::replace(&mut self.config.max_commitment, max);
        self.parameter_updated("min_commitment", old_min, min);
        self.parameter_updated("max_commitment", old_max, max);
        Ok(())
    }

    /// Block commit and vote paths until [`Self::unpause`].
    pub fn pause(&mut self, caller: Address, now: Timestamp) -> Result<()> {
        self.roles.require(Role::Pauser, &caller)?;
        self.pause.pause(now)?;
        warn!(by = %caller, at = now, "Voting engine paused");
        self.events.emit(GovernanceEvent::Paused { by: caller, at: now });
        Ok(())
    }

    pub fn unpause(&mut self, caller: Address, now: Timestamp) -> Result<()> {
        self.roles.require(Role::Pauser, &caller)?;
        self.pause.unpause()?;
        info!(by = %caller, at = now, "Voting engine unpaused");
        self.events.emit(GovernanceEvent::Unpaused {
            by: Some(caller),
            at: now,
        });
        Ok(())
    }

    pub fn proposal(&self, proposal_id: u64) -> Option<&Proposal> {
        self.proposals.get(&proposal_id)
    }

    pub fn proposal_state(&self, proposal_id: u64, now: Timestamp) -> Result<ProposalState> {
        Ok(self.get_proposal(proposal_id)?.state(now))
    }

    pub fn proposal_count(&self) -> u64 {
        self.next_id - 1
    }

    pub fn user_vote(&self, proposal_id: u64, voter: &Address) -> Option<&UserVote> {
        self.votes.get(&(proposal_id, *voter))
    }

    /// Whether `voter` has voted on `proposal_id` through either channel.
    pub fn has_voted(&self, proposal_id: u64, voter: &Address) -> bool {
        self.votes
            .get(&(proposal_id, *voter))
            .is_some_and(|vote| vote.has_voted)
    }

    pub fn commitment(&self, proposal_id: u64, voter: &Address) -> Option<&TokenCommitment> {
        self.commitments.get(&(proposal_id, *voter))
    }

    pub fn is_signature_used(&self, signature_hash: &Hash) -> bool {
        self.used_signatures.contains(signature_hash)
    }

    /// Symbol and decimals of the custody token, with fallbacks.
    pub fn token_metadata(&self) -> TokenMetadata {
        TokenMetadata::resolve(&self.token)
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_flagged()
    }

    /// Address holding committed tokens. Voters approve it before committing.
    pub fn custody_address(&self) -> Address {
        self.custody
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    pub fn token_mut(&mut self) -> &mut T {
        &mut self.token
    }

    pub fn events(&self) -> &[GovernanceEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<GovernanceEvent> {
        self.events.drain()
    }

    fn get_proposal(&self, proposal_id: u64) -> Result<&Proposal> {
        self.proposals
            .get(&proposal_id)
            .ok_or(GovernanceError::ProposalNotFound(proposal_id))
    }

    /// Checks shared by both vote channels.
    fn check_ballot(
        &self,
        proposal_id: u64,
        voter: &Address,
        tokens: Amount,
        weights: &[u8],
        now: Timestamp,
    ) -> Result<()> {
        let proposal = self.get_proposal(proposal_id)?;
        proposal.ensure_open(now)?;
        if self.has_voted(proposal_id, voter) {
            return Err(GovernanceError::AlreadyVoted);
        }
        validate_weights(weights, proposal.options.len())?;
        if tokens == 0 {
            return Err(GovernanceError::ZeroTokens);
        }
        Ok(())
    }

    /// Apply a checked ballot to the tally and store it. Returns the power.
    fn record_vote(
        &mut self,
        proposal_id: u64,
        voter: Address,
        tokens: Amount,
        weights: Vec<u8>,
        channel: VoteChannel,
        now: Timestamp,
    ) -> Amount {
        let power = voting_power(tokens);
        let shares = distribute_power(power, &weights);

        if let Some(proposal) = self.proposals.get_mut(&proposal_id) {
            for (total, share) in proposal.tally.iter_mut().zip(&shares) {
                *total = total.saturating_add(*share);
            }
            proposal.total_tokens = proposal.total_tokens.saturating_add(tokens);
            proposal.total_voting_power = proposal.total_voting_power.saturating_add(power);
            proposal.voter_count += 1;
        }

        info!(proposal_id, voter = %voter, tokens, power, ?channel, "Vote recorded");
        self.votes.insert(
            (proposal_id, voter),
            UserVote {
                tokens,
                voting_power: power,
                weights,
                timestamp: now,
                has_voted: true,
                channel,
            },
        );
        power
    }

    fn withdraw(&mut self, caller: Address, proposal_id: u64, now: Timestamp) -> Result<Amount> {
        self.get_proposal(proposal_id)?.ensure_closed(now)?;

        let key = (proposal_id, caller);
        let amount = self.commitments.get(&key).map(|c| c.amount).unwrap_or(0);
        if amount == 0 {
            return Ok(0);
        }

        let custody = self.custody;
        self.token.transfer(&custody, &caller, amount)?;
        self.commitments.remove(&key);

        debug!(proposal_id, voter = %caller, amount, "Tokens withdrawn");
        self.events.emit(GovernanceEvent::TokensWithdrawn {
            proposal_id,
            voter: caller,
            amount,
        });
        Ok(amount)
    }

    fn parameter_updated(&mut self, name: &str, old: u128, new: u128) {
        if old == new {
            return;
        }
        info!(name, old, new, "Engine parameter updated");
        self.events.emit(GovernanceEvent::ParametersUpdated {
            name: name.to_string(),
            old,
            new,
        });
    }
}
