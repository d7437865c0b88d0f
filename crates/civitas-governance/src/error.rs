use civitas_types::{Address, Amount, Hash, Timestamp};
use std::fmt;
use thiserror::Error;

use crate::roles::Role;

/// Broad failure category, so callers can branch on cause without matching
/// every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or out-of-range input
    Validation,
    /// Wrong lifecycle phase
    State,
    /// Missing role or wrong caller
    Authorization,
    /// Insufficient committed or available tokens
    Resource,
    /// Invalid or reused signature, reentrant call
    Security,
    /// A time gate has not opened yet
    Timing,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::State => "state",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Resource => "resource",
            ErrorKind::Security => "security",
            ErrorKind::Timing => "timing",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in governance operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GovernanceError {
    // --- validation ---
    #[error("Proposal not found: {0}")]
    ProposalNotFound(u64),

    #[error("Title must not be empty")]
    EmptyTitle,

    #[error("Description must not be empty")]
    EmptyDescription,

    #[error("Invalid option count {count}: expected {min}..={max}")]
    InvalidOptionCount { count: usize, min: usize, max: usize },

    #[error("Option {0} has an empty label")]
    EmptyOption(usize),

    #[error("Invalid duration {duration}s: expected {min}..={max}")]
    InvalidDuration { duration: u64, min: u64, max: u64 },

    #[error("Commitment {amount} outside bounds {min}..={max}")]
    InvalidCommitment { amount: Amount, min: Amount, max: Amount },

    #[error("Expected {expected} option weights, got {actual}")]
    InvalidWeightCount { expected: usize, actual: usize },

    #[error("Option weights must sum to 100, got {0}")]
    InvalidWeightSum(u64),

    #[error("Cannot vote with zero tokens")]
    ZeroTokens,

    #[error("Invalid action count {count}: expected 1..={max}")]
    InvalidActionCount { count: usize, max: usize },

    #[error("Invalid batch size {size}: expected 1..={max}")]
    InvalidBatchSize { size: usize, max: usize },

    #[error("Invalid thresholds: emergency {emergency_bps} must be below regular {threshold_bps} and regular at most 10000")]
    InvalidThresholds { threshold_bps: u16, emergency_bps: u16 },

    #[error("Invalid {name}: {value} outside {min}..={max}")]
    InvalidPeriod { name: &'static str, value: u64, min: u64, max: u64 },

    #[error("Delay {delay}s below minimum {min}s")]
    DelayBelowMinimum { delay: u64, min: u64 },

    #[error("Operation not found: {0}")]
    OperationNotFound(Hash),

    #[error("Batch not found: {0}")]
    BatchNotFound(Hash),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    // --- state ---
    #[error("Voting period not started")]
    VotingNotStarted,

    #[error("Voting period still open until {ends_at}")]
    VotingStillOpen { ends_at: Timestamp },

    #[error("Already voted")]
    AlreadyVoted,

    #[error("Proposal already executed")]
    AlreadyExecuted,

    #[error("Results already processed for proposal {0}")]
    AlreadyProcessed(u64),

    #[error("Proposal {0} has no linked quadratic vote")]
    NoLinkedVote(u64),

    #[error("Proposal {0} was canceled")]
    ProposalCanceled(u64),

    #[error("Results for proposal {0} have not been processed")]
    NotProcessed(u64),

    #[error("Proposal {0} was not approved")]
    ProposalDefeated(u64),

    #[error("Proposal {0} already queued")]
    AlreadyQueued(u64),

    #[error("Operations are paused")]
    Paused,

    #[error("Not paused")]
    NotPaused,

    #[error("Operation already scheduled: {0}")]
    OperationAlreadyScheduled(Hash),

    #[error("Operation already executed: {0}")]
    OperationAlreadyDone(Hash),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    // --- authorization ---
    #[error("Account {account} is missing role {role}")]
    MissingRole { role: Role, account: Address },

    #[error("Voting power {power} below proposal threshold {required}")]
    BelowProposalThreshold { power: Amount, required: Amount },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // --- resource ---
    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: Amount, required: Amount },

    #[error("Insufficient commitment: committed {committed}, requested {requested}")]
    InsufficientCommitment { committed: Amount, requested: Amount },

    #[error("Token transfer failed: {0}")]
    TokenTransferFailed(String),

    // --- security ---
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Signer does not match voter")]
    SignerMismatch,

    #[error("Signature already used: {0}")]
    SignatureReused(Hash),

    #[error("Reentrant call rejected")]
    ReentrantCall,

    // --- timing ---
    #[error("Voting period ended")]
    VotingClosed,

    #[error("Commitment locked until {unlocks_at}")]
    LockPeriodActive { unlocks_at: Timestamp },

    #[error("Results not ready until {ends_at}")]
    ResultsNotReady { ends_at: Timestamp },

    #[error("Operation not ready until {ready_at}")]
    OperationNotReady { ready_at: Timestamp },

    #[error("Pause does not expire until {expires_at}")]
    PauseNotExpired { expires_at: Timestamp },

    #[error("Pause cannot be set again until {available_at}")]
    PauseCooldown { available_at: Timestamp },
}

impl GovernanceError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        use GovernanceError::*;
        match self {
            ProposalNotFound(_)
            | EmptyTitle
            | EmptyDescription
            | InvalidOptionCount { .. }
            | EmptyOption(_)
            | InvalidDuration { .. }
            | InvalidCommitment { .. }
            | InvalidWeightCount { .. }
            | InvalidWeightSum(_)
            | ZeroTokens
            | InvalidActionCount { .. }
            | InvalidBatchSize { .. }
            | InvalidThresholds { .. }
            | InvalidPeriod { .. }
            | DelayBelowMinimum { .. }
            | OperationNotFound(_)
            | BatchNotFound(_)
            | InvalidParameter(_)
            | MalformedPayload(_) => ErrorKind::Validation,

            VotingNotStarted
            | VotingStillOpen { .. }
            | AlreadyVoted
            | AlreadyExecuted
            | AlreadyProcessed(_)
            | NoLinkedVote(_)
            | ProposalCanceled(_)
            | NotProcessed(_)
            | ProposalDefeated(_)
            | AlreadyQueued(_)
            | Paused
            | NotPaused
            | OperationAlreadyScheduled(_)
            | OperationAlreadyDone(_)
            | ExecutionFailed(_) => ErrorKind::State,

            MissingRole { .. } | BelowProposalThreshold { .. } | Unauthorized(_) => {
                ErrorKind::Authorization
            }

            InsufficientBalance { .. } | InsufficientCommitment { .. } | TokenTransferFailed(_) => {
                ErrorKind::Resource
            }

            InvalidSignature | SignerMismatch | SignatureReused(_) | ReentrantCall => {
                ErrorKind::Security
            }

            VotingClosed
            | LockPeriodActive { .. }
            | ResultsNotReady { .. }
            | OperationNotReady { .. }
            | PauseNotExpired { .. }
            | PauseCooldown { .. } => ErrorKind::Timing,
        }
    }
}

impl From<civitas_crypto::CryptoError> for GovernanceError {
    fn from(e: civitas_crypto::CryptoError) -> Self {
        match e {
            civitas_crypto::CryptoError::SignerMismatch { .. } => GovernanceError::SignerMismatch,
            _ => GovernanceError::InvalidSignature,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GovernanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GovernanceError::InvalidWeightSum(99);
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(GovernanceError::EmptyTitle.kind(), ErrorKind::Validation);
        assert_eq!(GovernanceError::AlreadyVoted.kind(), ErrorKind::State);
        assert_eq!(GovernanceError::Paused.kind(), ErrorKind::State);
        assert_eq!(
            GovernanceError::BelowProposalThreshold { power: 1, required: 2 }.kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            GovernanceError::InsufficientCommitment { committed: 1, requested: 2 }.kind(),
            ErrorKind::Resource
        );
        assert_eq!(GovernanceError::SignatureReused(Hash::ZERO).kind(), ErrorKind::Security);
        assert_eq!(
            GovernanceError::LockPeriodActive { unlocks_at: 10 }.kind(),
            ErrorKind::Timing
        );
    }

    #[test]
    fn test_crypto_error_mapping() {
        let mismatch = civitas_crypto::CryptoError::SignerMismatch {
            expected: "a".into(),
            actual: "b".into(),
        };
        assert_eq!(GovernanceError::from(mismatch), GovernanceError::SignerMismatch);
        assert_eq!(
            GovernanceError::from(civitas_crypto::CryptoError::VerificationFailed),
            GovernanceError::InvalidSignature
        );
    }

    #[test]
    fn test_missing_role_display() {
        let err = GovernanceError::MissingRole {
            role: Role::Validator,
            account: Address::ZERO,
        };
        assert!(err.to_string().contains("Validator"));
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }
}
