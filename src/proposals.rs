//! Proposal store
//!
//! Proposals are kept per issue in submission order. A hunter holds at most
//! one pending proposal per issue; once that proposal is rejected the hunter
//! may submit again.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;

use crate::error::{LedgerError, LedgerResult};
use crate::issues::IssueStore;
use crate::types::{ActorId, IssueId, ProposalId, ProposalStatus, SolutionProposal};

#[derive(Debug, Default, Clone)]
pub struct ProposalStore {
    proposals: BTreeMap<ProposalId, SolutionProposal>,
    by_issue: HashMap<IssueId, Vec<ProposalId>>,
    by_hunter: HashMap<ActorId, Vec<ProposalId>>,
    pending: HashSet<(IssueId, ActorId)>,
}

impl ProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> ProposalId {
        self.proposals.keys().next_back().map_or(1, |id| id + 1)
    }

    /// Build a new pending proposal, without storing it
    pub fn check_submit(
        &self,
        issues: &IssueStore,
        issue_id: IssueId,
        hunter: &ActorId,
    ) -> LedgerResult<SolutionProposal> {
        issues.require_open(issue_id)?;

        if self.pending.contains(&(issue_id, hunter.clone())) {
            return Err(LedgerError::DuplicateProposal {
                issue_id,
                hunter: hunter.clone(),
            });
        }

        Ok(SolutionProposal {
            id: self.next_id(),
            issue_id,
            hunter: hunter.clone(),
            status: ProposalStatus::Pending,
            submitted_at: Utc::now(),
        })
    }

    /// Pending proposal `proposal_id` filed against `issue_id`
    fn pending_on(
        &self,
        issue_id: IssueId,
        proposal_id: ProposalId,
    ) -> LedgerResult<&SolutionProposal> {
        let proposal = self
            .proposals
            .get(&proposal_id)
            .filter(|p| p.issue_id == issue_id)
            .ok_or(LedgerError::ProposalNotFound {
                issue_id,
                proposal_id,
            })?;
        if !proposal.is_pending() {
            return Err(LedgerError::ProposalNotPending(proposal_id));
        }
        Ok(proposal)
    }

    /// Build the post-acceptance images: the winner first, then every sibling
    /// that was still pending, now rejected.
    pub fn check_accept(
        &self,
        issue_id: IssueId,
        proposal_id: ProposalId,
    ) -> LedgerResult<Vec<SolutionProposal>> {
        let winner = self.pending_on(issue_id, proposal_id)?;

        let mut updated = vec![SolutionProposal {
            status: ProposalStatus::Accepted,
            ..winner.clone()
        }];
        updated.extend(
            self.iter_issue(issue_id)
                .filter(|p| p.id != proposal_id && p.is_pending())
                .map(|p| SolutionProposal {
                    status: ProposalStatus::Rejected,
                    ..p.clone()
                }),
        );
        Ok(updated)
    }

    /// Build the rejected image of a single pending proposal
    pub fn check_reject(
        &self,
        issue_id: IssueId,
        proposal_id: ProposalId,
    ) -> LedgerResult<SolutionProposal> {
        let proposal = self.pending_on(issue_id, proposal_id)?;
        Ok(SolutionProposal {
            status: ProposalStatus::Rejected,
            ..proposal.clone()
        })
    }

    pub fn submit(
        &mut self,
        issues: &IssueStore,
        issue_id: IssueId,
        hunter: &ActorId,
    ) -> LedgerResult<SolutionProposal> {
        let proposal = self.check_submit(issues, issue_id, hunter)?;
        self.put(proposal.clone());
        Ok(proposal)
    }

    pub fn accept(&mut self, issue_id: IssueId, proposal_id: ProposalId) -> LedgerResult<()> {
        for proposal in self.check_accept(issue_id, proposal_id)? {
            self.put(proposal);
        }
        Ok(())
    }

    pub fn reject(&mut self, issue_id: IssueId, proposal_id: ProposalId) -> LedgerResult<()> {
        let rejected = self.check_reject(issue_id, proposal_id)?;
        self.put(rejected);
        Ok(())
    }

    pub fn get(&self, proposal_id: ProposalId) -> Option<&SolutionProposal> {
        self.proposals.get(&proposal_id)
    }

    fn iter_issue(&self, issue_id: IssueId) -> impl Iterator<Item = &SolutionProposal> {
        self.by_issue
            .get(&issue_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.proposals.get(id))
    }

    /// Every proposal on `issue_id` in submission order, any status
    pub fn for_issue(
        &self,
        issues: &IssueStore,
        issue_id: IssueId,
    ) -> LedgerResult<Vec<SolutionProposal>> {
        issues.get(issue_id)?;
        Ok(self.iter_issue(issue_id).cloned().collect())
    }

    /// Every proposal by `hunter` in submission order, any status
    pub fn by_hunter(&self, hunter: &ActorId) -> Vec<SolutionProposal> {
        self.by_hunter
            .get(hunter)
            .into_iter()
            .flatten()
            .filter_map(|id| self.proposals.get(id))
            .cloned()
            .collect()
    }

    pub(crate) fn put(&mut self, proposal: SolutionProposal) {
        let key = (proposal.issue_id, proposal.hunter.clone());
        if proposal.is_pending() {
            self.pending.insert(key);
        } else {
            self.pending.remove(&key);
        }

        if !self.proposals.contains_key(&proposal.id) {
            self.by_issue
                .entry(proposal.issue_id)
                .or_default()
                .push(proposal.id);
            self.by_hunter
                .entry(proposal.hunter.clone())
                .or_default()
                .push(proposal.id);
        }
        self.proposals.insert(proposal.id, proposal);
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::NewIssue;

    fn actor(n: u8) -> ActorId {
        ActorId::parse(&format!("0x{:040x}", n)).unwrap()
    }

    fn issues_with(count: usize) -> IssueStore {
        let mut issues = IssueStore::new();
        for i in 0..count {
            let new = NewIssue {
                title: format!("issue {}", i),
                description: String::new(),
                attachment_hash: String::new(),
                reward_amount: 50,
            };
            let issue = issues.check_post(&actor(1), &new, issues.next_id());
            issues.put(issue);
        }
        issues
    }

    #[test]
    fn test_submission_order_is_stable() {
        let issues = issues_with(2);
        let mut store = ProposalStore::new();

        let p1 = store.submit(&issues, 1, &actor(10)).unwrap();
        let p2 = store.submit(&issues, 1, &actor(11)).unwrap();
        store.submit(&issues, 2, &actor(10)).unwrap();

        let listed: Vec<ProposalId> = store
            .for_issue(&issues, 1)
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(listed, vec![p1.id, p2.id]);
        assert_eq!(store.for_issue(&issues, 2).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_pending_rejected() {
        let issues = issues_with(1);
        let mut store = ProposalStore::new();
        store.submit(&issues, 1, &actor(10)).unwrap();

        assert_eq!(
            store.submit(&issues, 1, &actor(10)).unwrap_err(),
            LedgerError::DuplicateProposal {
                issue_id: 1,
                hunter: actor(10)
            }
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_repropose_after_rejection() {
        let issues = issues_with(1);
        let mut store = ProposalStore::new();
        let first = store.submit(&issues, 1, &actor(10)).unwrap();

        store.reject(1, first.id).unwrap();
        let second = store.submit(&issues, 1, &actor(10)).unwrap();

        assert_ne!(first.id, second.id);
        let statuses: Vec<ProposalStatus> = store
            .by_hunter(&actor(10))
            .iter()
            .map(|p| p.status)
            .collect();
        assert_eq!(
            statuses,
            vec![ProposalStatus::Rejected, ProposalStatus::Pending]
        );
    }

    #[test]
    fn test_accept_rejects_pending_siblings() {
        let issues = issues_with(1);
        let mut store = ProposalStore::new();
        let a = store.submit(&issues, 1, &actor(10)).unwrap();
        let b = store.submit(&issues, 1, &actor(11)).unwrap();
        let c = store.submit(&issues, 1, &actor(12)).unwrap();

        store.accept(1, b.id).unwrap();

        assert_eq!(store.get(a.id).unwrap().status, ProposalStatus::Rejected);
        assert_eq!(store.get(b.id).unwrap().status, ProposalStatus::Accepted);
        assert_eq!(store.get(c.id).unwrap().status, ProposalStatus::Rejected);
    }

    #[test]
    fn test_accept_checks_issue_and_status() {
        let issues = issues_with(2);
        let mut store = ProposalStore::new();
        let p = store.submit(&issues, 1, &actor(10)).unwrap();

        assert_eq!(
            store.check_accept(2, p.id).unwrap_err(),
            LedgerError::ProposalNotFound {
                issue_id: 2,
                proposal_id: p.id
            }
        );

        store.reject(1, p.id).unwrap();
        assert_eq!(
            store.check_accept(1, p.id).unwrap_err(),
            LedgerError::ProposalNotPending(p.id)
        );
    }

    #[test]
    fn test_submit_requires_open_issue() {
        let mut issues = issues_with(1);
        let store = ProposalStore::new();

        assert_eq!(
            store.check_submit(&issues, 5, &actor(10)).unwrap_err(),
            LedgerError::IssueNotFound(5)
        );

        issues.resolve_issue(1, 1).unwrap();
        assert_eq!(
            store.check_submit(&issues, 1, &actor(10)).unwrap_err(),
            LedgerError::IssueClosed(1)
        );
        assert_eq!(
            store.for_issue(&issues, 5).unwrap_err(),
            LedgerError::IssueNotFound(5)
        );
    }
}
