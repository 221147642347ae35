//! Ledger failures
//!
//! Every variant is a precondition that was checked before any state
//! changed, except `Storage`, which is raised when a changeset could not be
//! written and therefore was not applied either.

use thiserror::Error;

use crate::types::{ActorId, EscrowId, IssueId, ProposalId};

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Actor {0} is already registered in this role")]
    AlreadyRegistered(ActorId),

    #[error("Actor {0} is not registered")]
    NotRegistered(ActorId),

    #[error("No profile found for actor {0}")]
    NotFound(ActorId),

    #[error("Invalid actor id: {0:?}")]
    InvalidActorId(String),

    #[error("Issue {0} not found")]
    IssueNotFound(IssueId),

    #[error("Issue {0} is closed")]
    IssueClosed(IssueId),

    #[error("Issue {0} is already resolved")]
    AlreadyResolved(IssueId),

    #[error("Reward mismatch: reward is {reward} but {deposited} was deposited")]
    RewardMismatch { reward: u64, deposited: u64 },

    #[error("Reward {reward} is below the minimum of {minimum}")]
    RewardBelowMinimum { reward: u64, minimum: u64 },

    #[error("Reward {reward} exceeds the remaining escrow capacity of {available}")]
    RewardTooLarge { reward: u64, available: u64 },

    #[error("Field '{field}' exceeds {max} bytes")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("Hunter {hunter} already has a pending proposal on issue {issue_id}")]
    DuplicateProposal { issue_id: IssueId, hunter: ActorId },

    #[error("Proposal {proposal_id} not found on issue {issue_id}")]
    ProposalNotFound {
        issue_id: IssueId,
        proposal_id: ProposalId,
    },

    #[error("Proposal {0} is not pending")]
    ProposalNotPending(ProposalId),

    #[error("Actor {actor} does not own issue {issue_id}")]
    NotIssueOwner { issue_id: IssueId, actor: ActorId },

    #[error("Escrow {0} not found")]
    EscrowNotFound(EscrowId),

    #[error("Escrow {0} was already released")]
    AlreadyReleased(EscrowId),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Stable machine-readable name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyRegistered(_) => "already_registered",
            Self::NotRegistered(_) => "not_registered",
            Self::NotFound(_) => "not_found",
            Self::InvalidActorId(_) => "invalid_actor_id",
            Self::IssueNotFound(_) => "issue_not_found",
            Self::IssueClosed(_) => "issue_closed",
            Self::AlreadyResolved(_) => "already_resolved",
            Self::RewardMismatch { .. } => "reward_mismatch",
            Self::RewardBelowMinimum { .. } => "reward_below_minimum",
            Self::RewardTooLarge { .. } => "reward_too_large",
            Self::FieldTooLong { .. } => "field_too_long",
            Self::DuplicateProposal { .. } => "duplicate_proposal",
            Self::ProposalNotFound { .. } => "proposal_not_found",
            Self::ProposalNotPending(_) => "proposal_not_pending",
            Self::NotIssueOwner { .. } => "not_issue_owner",
            Self::EscrowNotFound(_) => "escrow_not_found",
            Self::AlreadyReleased(_) => "already_released",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
