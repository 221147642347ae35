//! DeBounty - a bounty marketplace ledger
//!
//! Companies register and post issues with a reward that is locked in
//! escrow at posting time. Hunters register and propose solutions to open
//! issues. When the issue owner accepts a proposal the escrow is released
//! to the winning hunter and the issue is resolved.
//!
//! # Guarantees
//!
//! - Every escrow holds exactly its issue's reward until it is released once
//! - A resolved issue never reopens and accepts no further proposals
//! - Only the posting company decides on proposals for its issue
//! - A failed operation leaves no trace, in memory or on disk

pub mod auth;
pub mod config;
pub mod error;
pub mod escrow;
pub mod issues;
pub mod ledger;
pub mod migrations;
pub mod proposals;
pub mod registry;
pub mod server;
pub mod storage;
pub mod types;

pub use auth::{caller_from_headers, is_valid_actor_id, ACTOR_HEADER};
pub use config::{Config, LedgerConfig};
pub use error::{LedgerError, LedgerResult};
pub use issues::NewIssue;
pub use ledger::Ledger;
pub use storage::LedgerStorage;
pub use types::{
    ActorId, Amount, Company, Escrow, Hunter, Issue, IssueId, IssueStatus, LedgerEvent,
    LedgerEventKind, LedgerStats, ProposalId, ProposalStatus, SolutionProposal,
};
