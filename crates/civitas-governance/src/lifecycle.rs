//! Proposal lifecycle management.
//!
//! Proposals go through states: Active -> AwaitingResults -> Succeeded/Defeated -> Queued
//!
//! Who may propose is decided by voting power at the snapshot one second
//! before the proposal, as a share of total supply at that snapshot.
//! Quadratic proposals are forwarded to the voting engine, and their results
//! are pulled back exactly once after the window closes.

use std::collections::HashMap;

use civitas_crypto::IncrementalHasher;
use civitas_types::{Address, Amount, Hash, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{validate_periods, validate_thresholds, LifecycleConfig};
use crate::engine::QuadraticVotingEngine;
use crate::error::{GovernanceError, Result};
use crate::events::{EventLog, GovernanceEvent};
use crate::ledger::VotingPowerLedger;
use crate::pause::PauseState;
use crate::roles::{AccessControlled, Role, RoleStore};
use crate::timelock::{Call, TimelockExecutor};
use crate::token::CustodyToken;

/// Shortest configurable voting period (1 hour).
pub const MIN_VOTING_PERIOD: u64 = 3_600;
/// Longest configurable voting period (30 days).
pub const MAX_VOTING_PERIOD: u64 = 30 * 86_400;
/// Most actions in a regular or emergency proposal.
pub const MAX_ACTIONS: usize = 10;
/// Most actions in a batch proposal.
pub const MAX_BATCH_ACTIONS: usize = 50;
/// Longest derived title, in characters.
pub const MAX_TITLE_CHARS: usize = 100;
/// Option that must win for a proposal's actions to be queued.
pub const APPROVAL_OPTION: usize = 0;

const QUEUE_SALT_DOMAIN: &str = "civitas/lifecycle/queue";

/// Type of governance proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalClass {
    /// Regular threshold and voting period
    Regular,
    /// Emergency role, lower threshold, shorter period
    Emergency,
    /// Up to 50 actions, batch voting period
    Batch,
}

impl ProposalClass {
    /// Most actions a proposal of this class may carry.
    pub fn max_actions(&self) -> usize {
        match self {
            ProposalClass::Regular | ProposalClass::Emergency => MAX_ACTIONS,
            ProposalClass::Batch => MAX_BATCH_ACTIONS,
        }
    }
}

/// Proposal state as seen by the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// No quadratic vote attached; decided elsewhere
    Registered,
    /// Voting window open
    Active,
    /// Window closed, results not processed yet
    AwaitingResults,
    /// Approval option won
    Succeeded,
    /// Any other outcome
    Defeated,
    /// Actions scheduled on the timelock
    Queued,
    /// Withdrawn by the proposer or an admin
    Canceled,
}

/// Set at creation, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalMetadata {
    pub class: ProposalClass,
    pub created_at: Timestamp,
    pub engine_proposal_id: Option<u64>,
    pub options: Vec<String>,
    pub use_quadratic: bool,
}

/// Lifecycle proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleProposal {
    /// Unique proposal ID
    pub id: u64,
    /// Proposer address
    pub proposer: Address,
    /// Title derived from the description
    pub title: String,
    /// Description
    pub description: String,
    /// Calls to schedule if approved
    pub actions: Vec<Call>,
    /// Time at which the threshold was checked
    pub snapshot: Timestamp,
    /// End of the voting window
    pub deadline: Timestamp,
    /// Creation metadata
    pub metadata: ProposalMetadata,
    /// Set by `cancel`
    pub canceled: bool,
    /// Timelock batch, once queued
    pub queued_batch: Option<Hash>,
}

/// Final outcome of a quadratic vote. Recorded once, never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadraticResult {
    pub engine_proposal_id: u64,
    pub winning_option: usize,
    /// Power accumulated by the winning option
    pub winning_power: Amount,
    /// Power cast across all options, before distribution
    pub total_voting_power: Amount,
    pub processed: bool,
    pub processed_at: Timestamp,
}

impl QuadraticResult {
    pub fn is_approved(&self) -> bool {
        self.winning_option == APPROVAL_OPTION && self.winning_power > 0
    }
}

/// Bounded prefix of `description`: everything before the first line break,
/// capped at [`MAX_TITLE_CHARS`] characters.
pub fn derive_title(description: &str) -> String {
    description
        .chars()
        .take_while(|c| *c != '\n' && *c != '\r')
        .take(MAX_TITLE_CHARS)
        .collect()
}

/// Threshold-gated proposal registry linked to a quadratic voting engine.
#[derive(Debug)]
pub struct ProposalLifecycle<L: VotingPowerLedger, T: CustodyToken> {
    address: Address,
    config: LifecycleConfig,
    ledger: L,
    engine: QuadraticVotingEngine<T>,
    proposals: HashMap<u64, LifecycleProposal>,
    results: HashMap<u64, QuadraticResult>,
    next_id: u64,
    roles: RoleStore,
    pause: PauseState,
    events: EventLog,
}

impl<L: VotingPowerLedger, T: CustodyToken> AccessControlled for ProposalLifecycle<L, T> {
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

impl<L: VotingPowerLedger, T: CustodyToken> ProposalLifecycle<L, T> {
    /// Create a lifecycle administered by `admin`.
    pub fn new(
        admin: Address,
        ledger: L,
        engine: QuadraticVotingEngine<T>,
        config: LifecycleConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            address: Address::for_module("proposal-lifecycle"),
            config,
            ledger,
            engine,
            proposals: HashMap::new(),
            results: HashMap::new(),
            next_id: 1,
            roles: RoleStore::with_admin(admin),
            pause: PauseState::manual(),
            events: EventLog::new("lifecycle"),
        })
    }

    /// Create a regular proposal with up to [`MAX_ACTIONS`] actions.
    pub fn propose(
        &mut self,
        caller: Address,
        actions: Vec<Call>,
        description: &str,
        options: Vec<String>,
        use_quadratic: bool,
        now: Timestamp,
    ) -> Result<u64> {
        self.create(ProposalClass::Regular, caller, actions, description, options, use_quadratic, now)
    }

    /// Create an emergency proposal. Emergency role only.
    pub fn propose_emergency(
        &mut self,
        caller: Address,
        actions: Vec<Call>,
        description: &str,
        options: Vec<String>,
        use_quadratic: bool,
        now: Timestamp,
    ) -> Result<u64> {
        self.roles.require(Role::Emergency, &caller)?;
        self.create(ProposalClass::Emergency, caller, actions, description, options, use_quadratic, now)
    }

    /// Create a batch proposal with up to [`MAX_BATCH_ACTIONS`] actions.
    pub fn propose_batch(
        &mut self,
        caller: Address,
        actions: Vec<Call>,
        description: &str,
        options: Vec<String>,
        use_quadratic: bool,
        now: Timestamp,
    ) -> Result<u64> {
        self.create(ProposalClass::Batch, caller, actions, description, options, use_quadratic, now)
    }

    /// Pull the winner from the engine once the window has closed.
    pub fn process_results(
        &mut self,
        caller: Address,
        proposal_id: u64,
        now: Timestamp,
    ) -> Result<QuadraticResult> {
        self.pause.ensure_not_paused(now)?;
        let proposal = self.get_proposal(proposal_id)?;
        if proposal.canceled {
            return Err(GovernanceError::ProposalCanceled(proposal_id));
        }
        let engine_id = proposal
            .metadata
            .engine_proposal_id
            .ok_or(GovernanceError::NoLinkedVote(proposal_id))?;
        if self.results.contains_key(&proposal_id) {
            return Err(GovernanceError::AlreadyProcessed(proposal_id));
        }

        let vote = self
            .engine
            .proposal(engine_id)
            .ok_or(GovernanceError::ProposalNotFound(engine_id))?;
        if !vote.is_closed(now) {
            return Err(GovernanceError::ResultsNotReady {
                ends_at: vote.end_time,
            });
        }
        let total_voting_power = vote.total_voting_power;
        let (winning_option, winning_power) = if vote.executed {
            self.engine.winning_option(engine_id, now)?
        } else {
            self.engine.execute_proposal(self.address, engine_id, now)?
        };

        let result = QuadraticResult {
            engine_proposal_id: engine_id,
            winning_option,
            winning_power,
            total_voting_power,
            processed: true,
            processed_at: now,
        };
        self.results.insert(proposal_id, result);

        info!(proposal_id, by = %caller, winning_option, winning_power, total_voting_power, "Results processed");
        self.events.emit(GovernanceEvent::ResultsProcessed {
            proposal_id,
            engine_proposal_id: engine_id,
            winning_option,
            total_voting_power,
        });
        Ok(result)
    }

    /// Schedule an approved proposal's actions as one timelock batch with the
    /// timelock's current minimum delay.
    ///
    /// The lifecycle must hold the timelock's Proposer role.
    pub fn queue(
        &mut self,
        caller: Address,
        proposal_id: u64,
        timelock: &mut TimelockExecutor,
        now: Timestamp,
    ) -> Result<Hash> {
        self.pause.ensure_not_paused(now)?;
        let proposal = self.get_proposal(proposal_id)?;
        if proposal.canceled {
            return Err(GovernanceError::ProposalCanceled(proposal_id));
        }
        if proposal.queued_batch.is_some() {
            return Err(GovernanceError::AlreadyQueued(proposal_id));
        }
        let result = self
            .results
            .get(&proposal_id)
            .ok_or(GovernanceError::NotProcessed(proposal_id))?;
        if !result.is_approved() {
            return Err(GovernanceError::ProposalDefeated(proposal_id));
        }

        let mut salt = IncrementalHasher::with_domain(QUEUE_SALT_DOMAIN);
        salt.update(self.address.as_bytes()).update_u64(proposal_id);
        let batch_id = timelock.schedule_batch(
            self.address,
            proposal.actions.clone(),
            salt.finalize(),
            timelock.min_delay(),
            now,
        )?;

        if let Some(proposal) = self.proposals.get_mut(&proposal_id) {
            proposal.queued_batch = Some(batch_id);
        }
        info!(proposal_id, by = %caller, batch = %batch_id.short(), "Proposal queued");
        self.events.emit(GovernanceEvent::ProposalQueued {
            proposal_id,
            batch_id,
        });
        Ok(batch_id)
    }

    /// Withdraw a proposal before its results are processed. Proposer or
    /// admin only.
    pub fn cancel(&mut self, caller: Address, proposal_id: u64, now: Timestamp) -> Result<()> {
        let proposal = self.get_proposal(proposal_id)?;
        if caller != proposal.proposer && !self.roles.has_role(Role::Admin, &caller) {
            return Err(GovernanceError::Unauthorized(
                "only the proposer or an admin can cancel".to_string(),
            ));
        }
        if proposal.canceled {
            return Err(GovernanceError::ProposalCanceled(proposal_id));
        }
        if self.results.contains_key(&proposal_id) {
            return Err(GovernanceError::AlreadyProcessed(proposal_id));
        }

        if let Some(proposal) = self.proposals.get_mut(&proposal_id) {
            proposal.canceled = true;
        }
        info!(proposal_id, by = %caller, at = now, "Proposal canceled");
        self.events.emit(GovernanceEvent::ProposalCanceled {
            proposal_id,
            by: caller,
        });
        Ok(())
    }

    /// Replace both thresholds. Requires `emergency < threshold <= 10000`.
    pub fn update_thresholds(
        &mut self,
        caller: Address,
        threshold_bps: u16,
        emergency_threshold_bps: u16,
    ) -> Result<()> {
        self.roles.require(Role::Admin, &caller)?;
        validate_thresholds(threshold_bps, emergency_threshold_bps)?;

        let old_threshold_bps = std::mem::replace(&mut self.config.threshold_bps, threshold_bps);
        let old_emergency_bps =
            std::mem::replace(&mut self.config.emergency_threshold_bps, emergency_threshold_bps);
        info!(old_threshold_bps, threshold_bps, old_emergency_bps, emergency_threshold_bps, "Thresholds updated");
        self.events.emit(GovernanceEvent::ThresholdUpdated {
            old_threshold_bps,
            new_threshold_bps: threshold_bps,
            old_emergency_bps,
            new_emergency_bps: emergency_threshold_bps,
        });
        Ok(())
    }

    /// Replace the three voting periods. Each must lie in
    /// `[MIN_VOTING_PERIOD, MAX_VOTING_PERIOD]` and the emergency period must
    /// not exceed the regular one.
    pub fn update_voting_periods(
        &mut self,
        caller: Address,
        voting_period: u64,
        emergency_voting_period: u64,
        batch_voting_period: u64,
    ) -> Result<()> {
        self.roles.require(Role::Admin, &caller)?;
        validate_periods(voting_period, emergency_voting_period, batch_voting_period)?;

        let changes = [
            (
                "voting_period",
                std::mem::replace(&mut self.config.voting_period, voting_period),
                voting_period,
            ),
            (
                "emergency_voting_period",
                std::mem::replace(&mut self.config.emergency_voting_period, emergency_voting_period),
                emergency_voting_period,
            ),
            (
                "batch_voting_period",
                std::mem::replace(&mut self.config.batch_voting_period, batch_voting_period),
                batch_voting_period,
            ),
        ];
        for (name, old, new) in changes {
            if old != new {
                info!(name, old, new, "Voting period updated");
                self.events.emit(GovernanceEvent::ParametersUpdated {
                    name: name.to_string(),
                    old: old.into(),
                    new: new.into(),
                });
            }
        }
        Ok(())
    }

    /// Block proposing and result processing until [`Self::unpause`].
    pub fn pause(&mut self, caller: Address, now: Timestamp) -> Result<()> {
        self.roles.require(Role::Pauser, &caller)?;
        self.pause.pause(now)?;
        warn!(by = %caller, at = now, "Lifecycle paused");
        self.events.emit(GovernanceEvent::Paused { by: caller, at: now });
        Ok(())
    }

    pub fn unpause(&mut self, caller: Address, now: Timestamp) -> Result<()> {
        self.roles.require(Role::Pauser, &caller)?;
        self.pause.unpause()?;
        info!(by = %caller, at = now, "Lifecycle unpaused");
        self.events.emit(GovernanceEvent::Unpaused {
            by: Some(caller),
            at: now,
        });
        Ok(())
    }

    pub fn proposal(&self, proposal_id: u64) -> Option<&LifecycleProposal> {
        self.proposals.get(&proposal_id)
    }

    pub fn metadata(&self, proposal_id: u64) -> Option<&ProposalMetadata> {
        self.proposals.get(&proposal_id).map(|p| &p.metadata)
    }

    pub fn result(&self, proposal_id: u64) -> Option<&QuadraticResult> {
        self.results.get(&proposal_id)
    }

    pub fn state(&self, proposal_id: u64, now: Timestamp) -> Result<LifecycleState> {
        let proposal = self.get_proposal(proposal_id)?;
        let state = if proposal.canceled {
            LifecycleState::Canceled
        } else if proposal.queued_batch.is_some() {
            LifecycleState::Queued
        } else if let Some(result) = self.results.get(&proposal_id) {
            if result.is_approved() {
                LifecycleState::Succeeded
            } else {
                LifecycleState::Defeated
            }
        } else if proposal.metadata.engine_proposal_id.is_none() {
            LifecycleState::Registered
        } else if now < proposal.deadline {
            LifecycleState::Active
        } else {
            LifecycleState::AwaitingResults
        };
        Ok(state)
    }

    pub fn proposal_count(&self) -> u64 {
        self.next_id - 1
    }

    /// Voting power `account` needs at `snapshot` to propose in `class`.
    pub fn proposal_threshold(&self, class: ProposalClass, snapshot: Timestamp) -> Amount {
        let bps = match class {
            ProposalClass::Emergency => self.config.emergency_threshold_bps,
            ProposalClass::Regular | ProposalClass::Batch => self.config.threshold_bps,
        };
        self.ledger
            .total_supply_at(snapshot)
            .saturating_mul(Amount::from(bps))
            / 10_000
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_flagged()
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Own address; proposer of every linked engine proposal.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn engine(&self) -> &QuadraticVotingEngine<T> {
        &self.engine
    }

    /// Voters commit and vote through the engine directly.
    pub fn engine_mut(&mut self) -> &mut QuadraticVotingEngine<T> {
        &mut self.engine
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn events(&self) -> &[GovernanceEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<GovernanceEvent> {
        self.events.drain()
    }

    fn get_proposal(&self, proposal_id: u64) -> Result<&LifecycleProposal> {
        self.proposals
            .get(&proposal_id)
            .ok_or(GovernanceError::ProposalNotFound(proposal_id))
    }

    fn voting_period(&self, class: ProposalClass) -> u64 {
        match class {
            ProposalClass::Regular => self.config.voting_period,
            ProposalClass::Emergency => self.config.emergency_voting_period,
            ProposalClass::Batch => self.config.batch_voting_period,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        &mut self,
        class: ProposalClass,
        caller: Address,
        actions: Vec<Call>,
        description: &str,
        options: Vec<String>,
        use_quadratic: bool,
        now: Timestamp,
    ) -> Result<u64> {
        self.pause.ensure_not_paused(now)?;
        if actions.is_empty() || actions.len() > class.max_actions() {
            return Err(GovernanceError::InvalidActionCount {
                count: actions.len(),
                max: class.max_actions(),
            });
        }
        if description.trim().is_empty() {
            return Err(GovernanceError::EmptyDescription);
        }

        let snapshot = now.saturating_sub(1);
        let power = self.ledger.voting_power_at(&caller, snapshot);
        let required = self.proposal_threshold(class, snapshot);
        if power < required {
            debug!(proposer = %caller, power, required, ?class, "Below proposal threshold");
            return Err(GovernanceError::BelowProposalThreshold { power, required });
        }

        let title = derive_title(description);
        let period = self.voting_period(class);
        let engine_proposal_id = if use_quadratic {
            Some(self.engine.create_proposal(
                self.address,
                &title,
                description,
                options.clone(),
                period,
                now,
            )?)
        } else {
            None
        };

        let id = self.next_id;
        self.next_id += 1;
        let deadline = now.saturating_add(period);

        self.proposals.insert(
            id,
            LifecycleProposal {
                id,
                proposer: caller,
                title,
                description: description.to_string(),
                actions,
                snapshot,
                deadline,
                metadata: ProposalMetadata {
                    class,
                    created_at: now,
                    engine_proposal_id,
                    options,
                    use_quadratic,
                },
                canceled: false,
                queued_batch: None,
            },
        );

        info!(id, proposer = %caller, ?class, ?engine_proposal_id, deadline, "Proposal created");
        self.events.emit(GovernanceEvent::LifecycleProposalCreated {
            proposal_id: id,
            proposer: caller,
            class,
            engine_proposal_id,
            deadline,
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, TimelockConfig};
    use crate::ledger::SnapshotLedger;
    use crate::timelock::RecordingRunner;
    use crate::token::InMemoryToken;

    const HOUR: u64 = 3_600;
    const DAY: u64 = 86_400;
    const NOW: u64 = 1_000;

    type Lifecycle = ProposalLifecycle<SnapshotLedger, InMemoryToken>;

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn admin() -> Address {
        addr(1)
    }

    /// Holds 2% of supply.
    fn whale() -> Address {
        addr(2)
    }

    /// Holds 0.6% of supply.
    fn minnow() -> Address {
        addr(3)
    }

    fn yes_no() -> Vec<String> {
        vec!["Yes".to_string(), "No".to_string()]
    }

    fn actions(n: usize) -> Vec<Call> {
        (0..n).map(|i| Call::new(addr(100), i as u128, vec![i as u8])).collect()
    }

    fn lifecycle() -> Lifecycle {
        let mut ledger = SnapshotLedger::new();
        ledger.mint(whale(), 200, 0).unwrap();
        ledger.mint(minnow(), 60, 0).unwrap();
        ledger.mint(addr(9), 9_740, 0).unwrap();

        let engine = QuadraticVotingEngine::new(
            admin(),
            InMemoryToken::new("GOV", 18),
            EngineConfig::default(),
        )
        .unwrap();
        let mut lifecycle = Lifecycle::new(admin(), ledger, engine, LifecycleConfig::default()).unwrap();
        lifecycle.grant_role(admin(), Role::Emergency, minnow()).unwrap();
        lifecycle.grant_role(admin(), Role::Pauser, admin()).unwrap();
        lifecycle
    }

    fn vote(lifecycle: &mut Lifecycle, engine_id: u64, voter: Address, tokens: Amount, weights: Vec<u8>) {
        let engine = lifecycle.engine_mut();
        let custody = engine.custody_address();
        engine.token_mut().mint(voter, tokens);
        engine.token_mut().approve(voter, custody, tokens);
        engine.commit_tokens(voter, engine_id, tokens, NOW).unwrap();
        engine.vote(voter, engine_id, tokens, weights, NOW + HOUR).unwrap();
    }

    #[test]
    fn test_derive_title() {
        assert_eq!(derive_title("Short title\nLong body"), "Short title");
        assert_eq!(derive_title("Windows\r\nbody"), "Windows");
        let long = "x".repeat(150);
        assert_eq!(derive_title(&long).len(), MAX_TITLE_CHARS);
        // Counted in characters, not bytes.
        let wide = "é".repeat(120);
        assert_eq!(derive_title(&wide).chars().count(), MAX_TITLE_CHARS);
        assert_eq!(derive_title("\nbody"), "");
    }

    #[test]
    fn test_threshold_gate() {
        let mut lifecycle = lifecycle();
        assert_eq!(lifecycle.proposal_threshold(ProposalClass::Regular, NOW - 1), 100);

        assert_eq!(
            lifecycle.propose(minnow(), actions(1), "Raise fee", yes_no(), true, NOW),
            Err(GovernanceError::BelowProposalThreshold { power: 60, required: 100 })
        );
        let id = lifecycle
            .propose(whale(), actions(1), "Raise fee\nDetails", yes_no(), true, NOW)
            .unwrap();

        let proposal = lifecycle.proposal(id).unwrap();
        assert_eq!(proposal.title, "Raise fee");
        assert_eq!(proposal.snapshot, NOW - 1);
        assert_eq!(proposal.deadline, NOW + 7 * DAY);

        let engine_id = proposal.metadata.engine_proposal_id.unwrap();
        let vote = lifecycle.engine().proposal(engine_id).unwrap();
        assert_eq!(vote.proposer, lifecycle.address());
        assert_eq!(vote.title, "Raise fee");
        assert_eq!(vote.end_time, NOW + 7 * DAY);
    }

    #[test]
    fn test_snapshot_ignores_same_block_transfers() {
        let mut lifecycle = lifecycle();
        // Power acquired at `now` does not count for a proposal at `now`.
        lifecycle.ledger_mut().transfer(addr(9), minnow(), 100, NOW).unwrap();
        assert!(matches!(
            lifecycle.propose(minnow(), actions(1), "d", yes_no(), false, NOW),
            Err(GovernanceError::BelowProposalThreshold { .. })
        ));
        assert!(lifecycle.propose(minnow(), actions(1), "d", yes_no(), false, NOW + 1).is_ok());
    }

    #[test]
    fn test_propose_validation() {
        let mut lifecycle = lifecycle();
        assert_eq!(
            lifecycle.propose(whale(), vec![], "d", yes_no(), false, NOW),
            Err(GovernanceError::InvalidActionCount { count: 0, max: MAX_ACTIONS })
        );
        assert_eq!(
            lifecycle.propose(whale(), actions(11), "d", yes_no(), false, NOW),
            Err(GovernanceError::InvalidActionCount { count: 11, max: MAX_ACTIONS })
        );
        assert_eq!(
            lifecycle.propose(whale(), actions(1), "  ", yes_no(), false, NOW),
            Err(GovernanceError::EmptyDescription)
        );
        assert!(matches!(
            lifecycle.propose(whale(), actions(1), "d", vec!["Yes".into()], true, NOW),
            Err(GovernanceError::InvalidOptionCount { .. })
        ));
        assert_eq!(lifecycle.proposal_count(), 0);
        assert_eq!(lifecycle.engine().proposal_count(), 0);
    }

    #[test]
    fn test_emergency_proposal() {
        let mut lifecycle = lifecycle();
        assert!(matches!(
            lifecycle.propose_emergency(whale(), actions(1), "Halt", yes_no(), true, NOW),
            Err(GovernanceError::MissingRole { role: Role::Emergency, .. })
        ));

        // 60 of 10000 clears the 50 bps emergency bar.
        let id = lifecycle
            .propose_emergency(minnow(), actions(1), "Halt", yes_no(), true, NOW)
            .unwrap();
        let proposal = lifecycle.proposal(id).unwrap();
        assert_eq!(proposal.metadata.class, ProposalClass::Emergency);
        assert_eq!(proposal.deadline, NOW + DAY);
    }

    #[test]
    fn test_batch_proposal() {
        let mut lifecycle = lifecycle();
        let id = lifecycle
            .propose_batch(whale(), actions(MAX_BATCH_ACTIONS), "Bulk", yes_no(), true, NOW)
            .unwrap();
        assert_eq!(lifecycle.proposal(id).unwrap().deadline, NOW + 10 * DAY);
        assert!(matches!(
            lifecycle.propose_batch(whale(), actions(MAX_BATCH_ACTIONS + 1), "Bulk", yes_no(), true, NOW),
            Err(GovernanceError::InvalidActionCount { .. })
        ));
    }

    #[test]
    fn test_process_results_once() {
        let mut lifecycle = lifecycle();
        let id = lifecycle
            .propose(whale(), actions(1), "Raise fee", yes_no(), true, NOW)
            .unwrap();
        let engine_id = lifecycle.metadata(id).unwrap().engine_proposal_id.unwrap();
        vote(&mut lifecycle, engine_id, addr(20), 400, vec![70, 30]);

        let err = lifecycle.process_results(admin(), id, NOW + DAY).unwrap_err();
        assert_eq!(err, GovernanceError::ResultsNotReady { ends_at: NOW + 7 * DAY });
        assert_eq!(err.kind(), crate::ErrorKind::Timing);
        assert_eq!(lifecycle.state(id, NOW + DAY), Ok(LifecycleState::Active));
        assert_eq!(lifecycle.state(id, NOW + 7 * DAY), Ok(LifecycleState::AwaitingResults));

        let result = lifecycle.process_results(admin(), id, NOW + 7 * DAY).unwrap();
        assert_eq!((result.winning_option, result.winning_power), (0, 14));
        assert_eq!(result.total_voting_power, 20);
        assert!(lifecycle.engine().proposal(engine_id).unwrap().executed);
        assert_eq!(lifecycle.state(id, NOW + 7 * DAY), Ok(LifecycleState::Succeeded));

        assert_eq!(
            lifecycle.process_results(admin(), id, NOW + 8 * DAY),
            Err(GovernanceError::AlreadyProcessed(id))
        );
    }

    #[test]
    fn test_process_results_after_direct_execution() {
        let mut lifecycle = lifecycle();
        let id = lifecycle
            .propose(whale(), actions(1), "Raise fee", yes_no(), true, NOW)
            .unwrap();
        let engine_id = lifecycle.metadata(id).unwrap().engine_proposal_id.unwrap();
        vote(&mut lifecycle, engine_id, addr(20), 100, vec![0, 100]);
        lifecycle
            .engine_mut()
            .execute_proposal(addr(20), engine_id, NOW + 7 * DAY)
            .unwrap();

        let result = lifecycle.process_results(admin(), id, NOW + 7 * DAY).unwrap();
        assert_eq!((result.winning_option, result.winning_power), (1, 10));
        assert_eq!(lifecycle.state(id, NOW + 7 * DAY), Ok(LifecycleState::Defeated));
    }

    #[test]
    fn test_process_requires_linked_vote() {
        let mut lifecycle = lifecycle();
        let id = lifecycle
            .propose(whale(), actions(1), "Off-platform", vec![], false, NOW)
            .unwrap();
        assert_eq!(lifecycle.state(id, NOW), Ok(LifecycleState::Registered));
        let err = lifecycle.process_results(admin(), id, NOW + 30 * DAY).unwrap_err();
        assert_eq!(err, GovernanceError::NoLinkedVote(id));
        assert_eq!(err.kind(), crate::ErrorKind::State);
    }

    #[test]
    fn test_queue_on_timelock() {
        let mut lifecycle = lifecycle();
        let mut timelock = TimelockExecutor::new(admin(), &TimelockConfig::default()).unwrap();
        timelock.grant_role(admin(), Role::Proposer, lifecycle.address()).unwrap();
        timelock.grant_role(admin(), Role::Executor, admin()).unwrap();

        let id = lifecycle
            .propose(whale(), actions(3), "Raise fee", yes_no(), true, NOW)
            .unwrap();
        let engine_id = lifecycle.metadata(id).unwrap().engine_proposal_id.unwrap();
        vote(&mut lifecycle, engine_id, addr(20), 400, vec![70, 30]);

        let end = NOW + 7 * DAY;
        assert_eq!(
            lifecycle.queue(admin(), id, &mut timelock, end),
            Err(GovernanceError::NotProcessed(id))
        );
        lifecycle.process_results(admin(), id, end).unwrap();

        let batch_id = lifecycle.queue(admin(), id, &mut timelock, end).unwrap();
        assert_eq!(lifecycle.state(id, end), Ok(LifecycleState::Queued));
        assert_eq!(
            lifecycle.queue(admin(), id, &mut timelock, end),
            Err(GovernanceError::AlreadyQueued(id))
        );

        let mut runner = RecordingRunner::default();
        let ready = end + timelock.min_delay();
        timelock.execute_batch(admin(), batch_id, &mut runner, ready).unwrap();
        assert_eq!(runner.calls, actions(3));
    }

    #[test]
    fn test_defeated_proposal_not_queued() {
        let mut lifecycle = lifecycle();
        let mut timelock = TimelockExecutor::new(admin(), &TimelockConfig::default()).unwrap();
        timelock.grant_role(admin(), Role::Proposer, lifecycle.address()).unwrap();

        let id = lifecycle
            .propose(whale(), actions(1), "Raise fee", yes_no(), true, NOW)
            .unwrap();
        // Nobody votes: option 0 leads with zero power.
        lifecycle.process_results(admin(), id, NOW + 7 * DAY).unwrap();
        assert_eq!(
            lifecycle.queue(admin(), id, &mut timelock, NOW + 7 * DAY),
            Err(GovernanceError::ProposalDefeated(id))
        );
    }

    #[test]
    fn test_cancel() {
        let mut lifecycle = lifecycle();
        let id = lifecycle
            .propose(whale(), actions(1), "Raise fee", yes_no(), true, NOW)
            .unwrap();

        assert!(matches!(
            lifecycle.cancel(minnow(), id, NOW),
            Err(GovernanceError::Unauthorized(_))
        ));
        lifecycle.cancel(whale(), id, NOW).unwrap();
        assert_eq!(lifecycle.state(id, NOW), Ok(LifecycleState::Canceled));
        assert_eq!(lifecycle.cancel(admin(), id, NOW), Err(GovernanceError::ProposalCanceled(id)));
        assert_eq!(
            lifecycle.process_results(admin(), id, NOW + 7 * DAY),
            Err(GovernanceError::ProposalCanceled(id))
        );
    }

    #[test]
    fn test_update_thresholds() {
        let mut lifecycle = lifecycle();
        assert!(matches!(
            lifecycle.update_thresholds(whale(), 200, 100),
            Err(GovernanceError::MissingRole { .. })
        ));
        for (threshold, emergency) in [(100, 100), (100, 150), (10_001, 50)] {
            assert_eq!(
                lifecycle.update_thresholds(admin(), threshold, emergency),
                Err(GovernanceError::InvalidThresholds {
                    threshold_bps: threshold,
                    emergency_bps: emergency
                })
            );
        }

        lifecycle.update_thresholds(admin(), 10_000, 9_999).unwrap();
        assert_eq!(
            lifecycle.events().last(),
            Some(&GovernanceEvent::ThresholdUpdated {
                old_threshold_bps: 100,
                new_threshold_bps: 10_000,
                old_emergency_bps: 50,
                new_emergency_bps: 9_999,
            })
        );
        assert!(lifecycle.propose(whale(), actions(1), "d", yes_no(), false, NOW).is_err());
    }

    #[test]
    fn test_update_voting_periods() {
        let mut lifecycle = lifecycle();
        assert!(matches!(
            lifecycle.update_voting_periods(admin(), HOUR - 1, HOUR, HOUR),
            Err(GovernanceError::InvalidPeriod { name: "voting_period", .. })
        ));
        assert!(matches!(
            lifecycle.update_voting_periods(admin(), 2 * HOUR, 3 * HOUR, HOUR),
            Err(GovernanceError::InvalidPeriod { name: "emergency_voting_period", .. })
        ));

        let before = lifecycle.events().len();
        lifecycle.update_voting_periods(admin(), 3 * DAY, DAY, 10 * DAY).unwrap();
        // Only the regular period changed.
        assert_eq!(lifecycle.events().len(), before + 1);
        assert_eq!(lifecycle.config().voting_period, 3 * DAY);

        let id = lifecycle.propose(whale(), actions(1), "d", yes_no(), true, NOW).unwrap();
        assert_eq!(lifecycle.proposal(id).unwrap().deadline, NOW + 3 * DAY);
    }

    #[test]
    fn test_pause_blocks_propose_and_process() {
        let mut lifecycle = lifecycle();
        let id = lifecycle.propose(whale(), actions(1), "d", yes_no(), true, NOW).unwrap();

        lifecycle.pause(admin(), NOW).unwrap();
        let err = lifecycle
            .propose(whale(), actions(1), "d", yes_no(), true, NOW)
            .unwrap_err();
        assert_eq!(err, GovernanceError::Paused);
        assert_eq!(err.kind(), crate::ErrorKind::State);
        assert_eq!(
            lifecycle.process_results(admin(), id, NOW + 365 * DAY),
            Err(GovernanceError::Paused)
        );

        lifecycle.unpause(admin(), NOW + 365 * DAY).unwrap();
        assert!(lifecycle.process_results(admin(), id, NOW + 365 * DAY).is_ok());
    }
}
