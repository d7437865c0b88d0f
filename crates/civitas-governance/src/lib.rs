//! Civitas Governance - Quadratic voting governance engine.
//!
//! This crate provides:
//! - Quadratic voting with token commitments and off-chain ballots
//! - Threshold-gated proposal lifecycle
//! - Timelocked execution of approved actions
//! - Role-based access control and pause switches

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
mod guard;
pub mod ledger;
pub mod lifecycle;
pub mod offchain;
pub mod pause;
pub mod roles;
pub mod telemetry;
pub mod timelock;
pub mod token;
pub mod voting;

pub use config::{EngineConfig, GovernanceConfig, LifecycleConfig, LoggingConfig, TimelockConfig};
pub use engine::{Proposal, ProposalState, QuadraticVotingEngine, TokenCommitment, UserVote, VoteChannel};
pub use error::{ErrorKind, GovernanceError, Result};
pub use events::{EventLog, GovernanceEvent};
pub use guard::ReentrancyGuard;
pub use ledger::{SnapshotLedger, VotingPowerLedger};
pub use lifecycle::{
    LifecycleProposal, LifecycleState, ProposalClass, ProposalLifecycle, ProposalMetadata,
    QuadraticResult,
};
pub use offchain::{SignedVote, VoteMessage};
pub use pause::PauseState;
pub use roles::{AccessControlled, Role, RoleStore};
pub use telemetry::init_telemetry;
pub use timelock::{ActionRunner, Batch, Call, Operation, OperationState, RecordingRunner, TimelockExecutor};
pub use token::{CustodyToken, InMemoryToken, TokenError, TokenMetadata};
pub use voting::{integer_sqrt, quadratic_cost, voting_power};
