//! Domain events for external indexers.

use civitas_types::{Address, Amount, Hash, Timestamp};
use serde::Serialize;
use tracing::info;

use crate::lifecycle::ProposalClass;
use crate::roles::Role;

/// Everything an indexer may observe about governance state changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GovernanceEvent {
    ProposalCreated {
        proposal_id: u64,
        proposer: Address,
        title: String,
        options: usize,
        start_time: Timestamp,
        end_time: Timestamp,
    },
    TokensCommitted {
        proposal_id: u64,
        voter: Address,
        amount: Amount,
        /// Amount of the overwritten earlier commitment, refunded to the voter
        replaced: Amount,
    },
    VoteCast {
        proposal_id: u64,
        voter: Address,
        tokens: Amount,
        voting_power: Amount,
        weights: Vec<u8>,
    },
    OffChainVoteVerified {
        proposal_id: u64,
        voter: Address,
        relayer: Address,
        voting_power: Amount,
        signature_hash: Hash,
    },
    ProposalExecuted {
        proposal_id: u64,
        winning_option: usize,
        voting_power: Amount,
    },
    TokensWithdrawn {
        proposal_id: u64,
        voter: Address,
        amount: Amount,
    },
    ParametersUpdated {
        name: String,
        old: u128,
        new: u128,
    },
    Paused {
        by: Address,
        at: Timestamp,
    },
    Unpaused {
        /// `None` when an expired pause was cleared
        by: Option<Address>,
        at: Timestamp,
    },
    ThresholdUpdated {
        old_threshold_bps: u16,
        new_threshold_bps: u16,
        old_emergency_bps: u16,
        new_emergency_bps: u16,
    },
    DelayUpdated {
        old: u64,
        new: u64,
    },
    LifecycleProposalCreated {
        proposal_id: u64,
        proposer: Address,
        class: ProposalClass,
        engine_proposal_id: Option<u64>,
        deadline: Timestamp,
    },
    ResultsProcessed {
        proposal_id: u64,
        engine_proposal_id: u64,
        winning_option: usize,
        total_voting_power: Amount,
    },
    ProposalCanceled {
        proposal_id: u64,
        by: Address,
    },
    ProposalQueued {
        proposal_id: u64,
        batch_id: Hash,
    },
    CallScheduled {
        operation_id: Hash,
        target: Address,
        value: Amount,
        ready_at: Timestamp,
    },
    BatchScheduled {
        batch_id: Hash,
        operations: usize,
        ready_at: Timestamp,
    },
    CallExecuted {
        operation_id: Hash,
        target: Address,
        value: Amount,
    },
    BatchExecuted {
        batch_id: Hash,
        operations: usize,
    },
    OperationCancelled {
        operation_id: Hash,
    },
    RoleGranted {
        role: Role,
        account: Address,
        by: Address,
    },
    RoleRevoked {
        role: Role,
        account: Address,
        by: Address,
    },
}

impl GovernanceEvent {
    /// Stable event name, matching the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            GovernanceEvent::ProposalCreated { .. } => "proposal_created",
            GovernanceEvent::TokensCommitted { .. } => "tokens_committed",
            GovernanceEvent::VoteCast { .. } => "vote_cast",
            GovernanceEvent::OffChainVoteVerified { .. } => "off_chain_vote_verified",
            GovernanceEvent::ProposalExecuted { .. } => "proposal_executed",
            GovernanceEvent::TokensWithdrawn { .. } => "tokens_withdrawn",
            GovernanceEvent::ParametersUpdated { .. } => "parameters_updated",
            GovernanceEvent::Paused { .. } => "paused",
            GovernanceEvent::Unpaused { .. } => "unpaused",
            GovernanceEvent::ThresholdUpdated { .. } => "threshold_updated",
            GovernanceEvent::DelayUpdated { .. } => "delay_updated",
            GovernanceEvent::LifecycleProposalCreated { .. } => "lifecycle_proposal_created",
            GovernanceEvent::ResultsProcessed { .. } => "results_processed",
            GovernanceEvent::ProposalCanceled { .. } => "proposal_canceled",
            GovernanceEvent::ProposalQueued { .. } => "proposal_queued",
            GovernanceEvent::CallScheduled { .. } => "call_scheduled",
            GovernanceEvent::BatchScheduled { .. } => "batch_scheduled",
            GovernanceEvent::CallExecuted { .. } => "call_executed",
            GovernanceEvent::BatchExecuted { .. } => "batch_executed",
            GovernanceEvent::OperationCancelled { .. } => "operation_cancelled",
            GovernanceEvent::RoleGranted { .. } => "role_granted",
            GovernanceEvent::RoleRevoked { .. } => "role_revoked",
        }
    }

    /// JSON form handed to indexers.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Append-only event sink owned by each component.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    source: &'static str,
    events: Vec<GovernanceEvent>,
}

impl EventLog {
    pub fn new(source: &'static str) -> Self {
        Self {
            source,
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: GovernanceEvent) {
        info!(source = self.source, event = event.name(), detail = ?event, "Governance event");
        self.events.push(event);
    }

    pub fn events(&self) -> &[GovernanceEvent] {
        &self.events
    }

    pub fn last(&self) -> Option<&GovernanceEvent> {
        self.events.last()
    }

    /// Hand all buffered events to the caller, leaving the log empty.
    pub fn drain(&mut self) -> Vec<GovernanceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_drain() {
        let mut log = EventLog::new("test");
        log.emit(GovernanceEvent::DelayUpdated { old: 3600, new: 7200 });
        log.emit(GovernanceEvent::Paused { by: Address::ZERO, at: 5 });

        assert_eq!(log.len(), 2);
        assert_eq!(log.last().map(|e| e.name()), Some("paused"));

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_json_tag_matches_name() {
        let event = GovernanceEvent::ThresholdUpdated {
            old_threshold_bps: 100,
            new_threshold_bps: 200,
            old_emergency_bps: 50,
            new_emergency_bps: 60,
        };
        let json = event.to_json().unwrap();
        assert!(json.contains("\"type\":\"threshold_updated\""));
        assert!(json.contains("\"new_threshold_bps\":200"));
    }
}
