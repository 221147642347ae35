//! Issue store
//!
//! Issues are append-only: the only mutation after posting is the
//! `Open -> Resolved` transition. `Resolved` is terminal.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;

use crate::error::{LedgerError, LedgerResult};
use crate::types::{ActorId, Amount, EscrowId, Issue, IssueId, IssueStatus, ProposalId};

/// Fields supplied by the company when posting an issue
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub attachment_hash: String,
    pub reward_amount: Amount,
}

#[derive(Debug, Default, Clone)]
pub struct IssueStore {
    issues: BTreeMap<IssueId, Issue>,
    /// Ids of issues whose status is `Open`
    open: BTreeSet<IssueId>,
    by_company: HashMap<ActorId, Vec<IssueId>>,
}

impl IssueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> IssueId {
        self.issues.keys().next_back().map_or(1, |id| id + 1)
    }

    /// Build the record for a newly posted issue, without storing it
    pub fn check_post(&self, company: &ActorId, new: &NewIssue, escrow_id: EscrowId) -> Issue {
        Issue {
            id: self.next_id(),
            company: company.clone(),
            title: new.title.clone(),
            description: new.description.clone(),
            attachment_hash: new.attachment_hash.clone(),
            reward_amount: new.reward_amount,
            status: IssueStatus::Open,
            escrow_id,
            posted_at: Utc::now(),
            winning_proposal: None,
            resolved_at: None,
        }
    }

    /// Build the resolved image of an issue, without storing it
    pub fn check_resolve(&self, issue_id: IssueId, winner: ProposalId) -> LedgerResult<Issue> {
        let issue = self.get(issue_id)?;
        if !issue.is_open() {
            return Err(LedgerError::AlreadyResolved(issue_id));
        }
        Ok(Issue {
            status: IssueStatus::Resolved,
            winning_proposal: Some(winner),
            resolved_at: Some(Utc::now()),
            ..issue.clone()
        })
    }

    pub fn resolve_issue(&mut self, issue_id: IssueId, winner: ProposalId) -> LedgerResult<()> {
        let resolved = self.check_resolve(issue_id, winner)?;
        self.put(resolved);
        Ok(())
    }

    pub fn get(&self, issue_id: IssueId) -> LedgerResult<&Issue> {
        self.issues
            .get(&issue_id)
            .ok_or(LedgerError::IssueNotFound(issue_id))
    }

    /// Issue that accepts new proposals
    pub fn require_open(&self, issue_id: IssueId) -> LedgerResult<&Issue> {
        let issue = self.get(issue_id)?;
        if !issue.is_open() {
            return Err(LedgerError::IssueClosed(issue_id));
        }
        Ok(issue)
    }

    /// Every open issue, ascending id
    pub fn unsolved(&self) -> Vec<Issue> {
        self.open
            .iter()
            .filter_map(|id| self.issues.get(id))
            .cloned()
            .collect()
    }

    /// Every issue posted by `company`, ascending id
    pub fn by_company(&self, company: &ActorId) -> Vec<Issue> {
        self.by_company
            .get(company)
            .map(|ids| ids.iter().filter_map(|id| self.issues.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn put(&mut self, issue: Issue) {
        if issue.is_open() {
            self.open.insert(issue.id);
        } else {
            self.open.remove(&issue.id);
        }
        if !self.issues.contains_key(&issue.id) {
            self.by_company
                .entry(issue.company.clone())
                .or_default()
                .push(issue.id);
        }
        self.issues.insert(issue.id, issue);
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}
