//! Ledger records
//!
//! Plain data carried between the stores, the storage layer and the HTTP
//! surface. All records serialize to JSON with snake_case field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// Single currency unit of the ledger
pub type Amount = u64;

/// Ceiling on all funds ever deposited. Keeps every aggregate in range and
/// every stored amount a non-negative SQLite integer.
pub const MAX_AMOUNT: Amount = i64::MAX as Amount;

pub type IssueId = u64;
pub type ProposalId = u64;
pub type EscrowId = u64;

/// Length of an account address in bytes
pub const ACTOR_ID_BYTES: usize = 20;

// ============================================================================
// ACTORS
// ============================================================================

/// Account address of an external party, `0x` followed by 40 hex digits.
///
/// Always held in lowercase so two spellings of one address compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActorId(String);

impl ActorId {
    pub fn parse(raw: &str) -> Result<Self, LedgerError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| LedgerError::InvalidActorId(raw.to_string()))?;

        match hex::decode(digits) {
            Ok(bytes) if bytes.len() == ACTOR_ID_BYTES => {
                Ok(Self(format!("0x{}", hex::encode(bytes))))
            }
            _ => Err(LedgerError::InvalidActorId(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ActorId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ActorId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ActorId> for String {
    fn from(id: ActorId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub owner: ActorId,
    pub name: String,
    pub metadata_ref: String,
    pub is_registered: bool,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunter {
    pub owner: ActorId,
    pub name: String,
    pub is_registered: bool,
    pub registered_at: DateTime<Utc>,
}

// ============================================================================
// ISSUES AND ESCROW
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub company: ActorId,
    pub title: String,
    pub description: String,
    pub attachment_hash: String,
    pub reward_amount: Amount,
    pub status: IssueStatus,
    pub escrow_id: EscrowId,
    pub posted_at: DateTime<Utc>,
    /// Accepted proposal, set when the issue is resolved
    pub winning_proposal: Option<ProposalId>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Issue {
    pub fn is_open(&self) -> bool {
        self.status == IssueStatus::Open
    }
}

/// Funds held on behalf of one issue until it is resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    pub id: EscrowId,
    pub issue_id: IssueId,
    pub depositor: ActorId,
    pub amount_held: Amount,
    /// Deposit at creation; unchanged by release
    pub original_amount: Amount,
    pub released: bool,
    pub beneficiary: Option<ActorId>,
}

// ============================================================================
// PROPOSALS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionProposal {
    pub id: ProposalId,
    pub issue_id: IssueId,
    pub hunter: ActorId,
    pub status: ProposalStatus,
    pub submitted_at: DateTime<Utc>,
}

impl SolutionProposal {
    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }
}

// ============================================================================
// JOURNAL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEventKind {
    CompanyRegistered {
        actor: ActorId,
    },
    HunterRegistered {
        actor: ActorId,
    },
    IssuePosted {
        issue_id: IssueId,
        company: ActorId,
        reward_amount: Amount,
    },
    ProposalSubmitted {
        proposal_id: ProposalId,
        issue_id: IssueId,
        hunter: ActorId,
    },
    ProposalRejected {
        proposal_id: ProposalId,
        issue_id: IssueId,
    },
    ProposalAccepted {
        proposal_id: ProposalId,
        issue_id: IssueId,
    },
    EscrowReleased {
        escrow_id: EscrowId,
        issue_id: IssueId,
        beneficiary: ActorId,
        amount: Amount,
    },
    IssueResolved {
        issue_id: IssueId,
        winning_proposal: ProposalId,
    },
}

/// One committed entry of the append-only journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: LedgerEventKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub companies: u64,
    pub hunters: u64,
    pub open_issues: u64,
    pub resolved_issues: u64,
    pub proposals: u64,
    pub total_escrowed: Amount,
    pub total_released: Amount,
}
