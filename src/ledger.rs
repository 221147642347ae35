//! Ledger facade
//!
//! Owns the four stores behind a single `RwLock`. Every mutating operation
//! runs under the write lock in three steps: check every precondition and
//! collect the resulting rows into a [`Changeset`], write the changeset to
//! storage (when configured), then apply it to memory. A failure in either
//! of the first two steps leaves the ledger exactly as it was.
//!
//! Queries take the read lock and may run concurrently.

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::escrow::EscrowLedger;
use crate::issues::{IssueStore, NewIssue};
use crate::proposals::ProposalStore;
use crate::registry::IdentityRegistry;
use crate::storage::LedgerStorage;
use crate::types::{
    ActorId, Amount, Company, Escrow, Hunter, Issue, IssueId, LedgerEvent, LedgerEventKind,
    LedgerStats, ProposalId, SolutionProposal,
};

// ============================================================================
// STATE
// ============================================================================

/// Committed ledger contents
#[derive(Debug, Default, Clone)]
pub struct LedgerState {
    pub registry: IdentityRegistry,
    pub escrows: EscrowLedger,
    pub issues: IssueStore,
    pub proposals: ProposalStore,
    events: Vec<LedgerEvent>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.events.last().map_or(1, |e| e.seq + 1)
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub(crate) fn push_event(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    /// Write every row of `changes`. Cannot fail: the rows were validated
    /// when the changeset was built.
    pub(crate) fn apply(&mut self, changes: Changeset) {
        for company in changes.companies {
            self.registry.put_company(company);
        }
        for hunter in changes.hunters {
            self.registry.put_hunter(hunter);
        }
        for escrow in changes.escrows {
            self.escrows.put(escrow);
        }
        for issue in changes.issues {
            self.issues.put(issue);
        }
        for proposal in changes.proposals {
            self.proposals.put(proposal);
        }
        self.events.extend(changes.events);
    }
}

/// Post-images of every row one operation writes, plus its journal entries
#[derive(Debug, Default, Clone)]
pub struct Changeset {
    pub companies: Vec<Company>,
    pub hunters: Vec<Hunter>,
    pub issues: Vec<Issue>,
    pub escrows: Vec<Escrow>,
    pub proposals: Vec<SolutionProposal>,
    pub events: Vec<LedgerEvent>,
}

impl Changeset {
    fn event(&mut self, kind: LedgerEventKind) {
        self.events.push(LedgerEvent {
            seq: 0,
            at: Utc::now(),
            kind,
        });
    }

    fn number_events(&mut self, first_seq: u64) {
        for (seq, event) in (first_seq..).zip(self.events.iter_mut()) {
            event.seq = seq;
        }
    }
}

// ============================================================================
// LEDGER
// ============================================================================

pub struct Ledger {
    state: RwLock<LedgerState>,
    storage: Option<LedgerStorage>,
    limits: LedgerConfig,
}

impl Ledger {
    /// In-memory ledger with no persistence
    pub fn new(limits: LedgerConfig) -> Self {
        Self {
            state: RwLock::new(LedgerState::new()),
            storage: None,
            limits,
        }
    }

    /// Ledger backed by `storage`, rebuilt from its committed rows
    pub fn with_storage(limits: LedgerConfig, storage: LedgerStorage) -> LedgerResult<Self> {
        let state = storage.load()?;
        info!(
            "Loaded ledger: {} issues, {} proposals, {} events",
            state.issues.len(),
            state.proposals.len(),
            state.events().len()
        );
        Ok(Self {
            state: RwLock::new(state),
            storage: Some(storage),
            limits,
        })
    }

    /// Persist then apply. Called with the write lock held.
    fn commit(&self, state: &mut LedgerState, mut changes: Changeset) -> LedgerResult<()> {
        changes.number_events(state.next_seq());
        if let Some(storage) = &self.storage {
            storage.persist(&changes).inspect_err(|e| {
                error!("Failed to persist changeset: {}", e);
            })?;
        }
        state.apply(changes);
        Ok(())
    }

    fn check_text(&self, field: &'static str, value: &str) -> LedgerResult<()> {
        if value.len() > self.limits.max_text_len {
            return Err(LedgerError::FieldTooLong {
                field,
                max: self.limits.max_text_len,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Identity registry
    // ------------------------------------------------------------------------

    pub fn register_company(
        &self,
        actor: &ActorId,
        name: &str,
        metadata_ref: &str,
    ) -> LedgerResult<Company> {
        self.check_text("name", name)?;
        self.check_text("metadata_ref", metadata_ref)?;

        let mut state = self.state.write();
        let company = state
            .registry
            .check_register_company(actor, name, metadata_ref)
            .inspect_err(|e| debug!("register_company rejected: {}", e))?;

        let mut changes = Changeset {
            companies: vec![company.clone()],
            ..Default::default()
        };
        changes.event(LedgerEventKind::CompanyRegistered {
            actor: actor.clone(),
        });
        self.commit(&mut state, changes)?;

        info!("Registered company '{}' for {}", company.name, actor);
        Ok(company)
    }

    pub fn register_hunter(&self, actor: &ActorId, name: &str) -> LedgerResult<Hunter> {
        self.check_text("name", name)?;

        let mut state = self.state.write();
        let hunter = state
            .registry
            .check_register_hunter(actor, name)
            .inspect_err(|e| debug!("register_hunter rejected: {}", e))?;

        let mut changes = Changeset {
            hunters: vec![hunter.clone()],
            ..Default::default()
        };
        changes.event(LedgerEventKind::HunterRegistered {
            actor: actor.clone(),
        });
        self.commit(&mut state, changes)?;

        info!("Registered hunter '{}' for {}", hunter.name, actor);
        Ok(hunter)
    }

    pub fn get_company(&self, actor: &ActorId) -> LedgerResult<Company> {
        self.state.read().registry.get_company(actor).cloned()
    }

    pub fn get_hunter(&self, actor: &ActorId) -> LedgerResult<Hunter> {
        self.state.read().registry.get_hunter(actor).cloned()
    }

    // ------------------------------------------------------------------------
    // Issues and escrow
    // ------------------------------------------------------------------------

    /// Post an issue backed by `deposited` funds.
    ///
    /// The issue and its escrow are committed together or not at all.
    pub fn post_issue(
        &self,
        company: &ActorId,
        new: NewIssue,
        deposited: Amount,
    ) -> LedgerResult<Issue> {
        let mut state = self.state.write();
        state
            .registry
            .require_company(company)
            .inspect_err(|e| debug!("post_issue rejected: {}", e))?;

        if new.reward_amount < self.limits.min_reward {
            return Err(LedgerError::RewardBelowMinimum {
                reward: new.reward_amount,
                minimum: self.limits.min_reward,
            });
        }
        self.check_text("title", &new.title)?;
        self.check_text("description", &new.description)?;
        self.check_text("attachment_hash", &new.attachment_hash)?;

        let issue_id = state.issues.next_id();
        let escrow = state
            .escrows
            .check_open(issue_id, company, new.reward_amount, deposited)
            .inspect_err(|e| debug!("post_issue rejected: {}", e))?;
        let issue = state.issues.check_post(company, &new, escrow.id);

        let mut changes = Changeset {
            issues: vec![issue.clone()],
            escrows: vec![escrow],
            ..Default::default()
        };
        changes.event(LedgerEventKind::IssuePosted {
            issue_id: issue.id,
            company: company.clone(),
            reward_amount: issue.reward_amount,
        });
        self.commit(&mut state, changes)?;

        info!(
            "Issue #{} '{}' posted by {} with reward {}",
            issue.id, issue.title, company, issue.reward_amount
        );
        Ok(issue)
    }

    /// Every open issue, ascending id
    pub fn get_all_unsolved_issues(&self) -> Vec<Issue> {
        self.state.read().issues.unsolved()
    }

    pub fn get_issue(&self, issue_id: IssueId) -> LedgerResult<Issue> {
        self.state.read().issues.get(issue_id).cloned()
    }

    pub fn get_escrow(&self, issue_id: IssueId) -> LedgerResult<Escrow> {
        let state = self.state.read();
        let issue = state.issues.get(issue_id)?;
        state.escrows.get(issue.escrow_id).cloned()
    }

    pub fn issues_by_company(&self, company: &ActorId) -> Vec<Issue> {
        self.state.read().issues.by_company(company)
    }

    // ------------------------------------------------------------------------
    // Proposals
    // ------------------------------------------------------------------------

    pub fn post_solution_proposal(
        &self,
        hunter: &ActorId,
        issue_id: IssueId,
    ) -> LedgerResult<SolutionProposal> {
        let mut state = self.state.write();
        state
            .registry
            .require_hunter(hunter)
            .inspect_err(|e| debug!("post_solution_proposal rejected: {}", e))?;
        let proposal = state
            .proposals
            .check_submit(&state.issues, issue_id, hunter)
            .inspect_err(|e| debug!("post_solution_proposal rejected: {}", e))?;

        let mut changes = Changeset {
            proposals: vec![proposal.clone()],
            ..Default::default()
        };
        changes.event(LedgerEventKind::ProposalSubmitted {
            proposal_id: proposal.id,
            issue_id,
            hunter: hunter.clone(),
        });
        self.commit(&mut state, changes)?;

        info!(
            "Proposal #{} submitted by {} on issue #{}",
            proposal.id, hunter, issue_id
        );
        Ok(proposal)
    }

    /// Every proposal on `issue_id` in submission order, any status
    pub fn get_all_proposed_solution(
        &self,
        issue_id: IssueId,
    ) -> LedgerResult<Vec<SolutionProposal>> {
        let state = self.state.read();
        state.proposals.for_issue(&state.issues, issue_id)
    }

    pub fn proposals_by_hunter(&self, hunter: &ActorId) -> Vec<SolutionProposal> {
        self.state.read().proposals.by_hunter(hunter)
    }

    /// Issue owned by `company`, checked before any proposal decision
    fn owned_issue<'a>(
        state: &'a LedgerState,
        company: &ActorId,
        issue_id: IssueId,
    ) -> LedgerResult<&'a Issue> {
        let issue = state.issues.get(issue_id)?;
        if &issue.company != company {
            return Err(LedgerError::NotIssueOwner {
                issue_id,
                actor: company.clone(),
            });
        }
        Ok(issue)
    }

    /// Select the winning proposal of an issue.
    ///
    /// Marks the winner accepted and its pending siblings rejected, releases
    /// the escrow to the winning hunter and resolves the issue, all in one
    /// commit.
    pub fn accept_proposal(
        &self,
        company: &ActorId,
        issue_id: IssueId,
        proposal_id: ProposalId,
    ) -> LedgerResult<SolutionProposal> {
        let mut state = self.state.write();

        let (changes, winner) = Self::plan_accept(&state, company, issue_id, proposal_id)
            .inspect_err(|e| debug!("accept_proposal rejected: {}", e))?;
        self.commit(&mut state, changes)?;

        info!(
            "Issue #{} resolved: proposal #{} by {} accepted",
            issue_id, winner.id, winner.hunter
        );
        Ok(winner)
    }

    fn plan_accept(
        state: &LedgerState,
        company: &ActorId,
        issue_id: IssueId,
        proposal_id: ProposalId,
    ) -> LedgerResult<(Changeset, SolutionProposal)> {
        let issue = Self::owned_issue(state, company, issue_id)?;
        let resolved = state.issues.check_resolve(issue_id, proposal_id)?;
        let updated = state.proposals.check_accept(issue_id, proposal_id)?;
        let winner = updated[0].clone();
        let released = state.escrows.check_release(issue.escrow_id, &winner.hunter)?;
        let amount = state.escrows.get(issue.escrow_id)?.amount_held;

        let mut changes = Changeset::default();
        changes.event(LedgerEventKind::ProposalAccepted {
            proposal_id,
            issue_id,
        });
        for sibling in updated.iter().skip(1) {
            changes.event(LedgerEventKind::ProposalRejected {
                proposal_id: sibling.id,
                issue_id,
            });
        }
        changes.event(LedgerEventKind::EscrowReleased {
            escrow_id: released.id,
            issue_id,
            beneficiary: winner.hunter.clone(),
            amount,
        });
        changes.event(LedgerEventKind::IssueResolved {
            issue_id,
            winning_proposal: proposal_id,
        });
        changes.proposals = updated;
        changes.escrows = vec![released];
        changes.issues = vec![resolved];

        Ok((changes, winner))
    }

    /// Turn down a single pending proposal. The issue stays open and the
    /// hunter may propose again.
    pub fn reject_proposal(
        &self,
        company: &ActorId,
        issue_id: IssueId,
        proposal_id: ProposalId,
    ) -> LedgerResult<SolutionProposal> {
        let mut state = self.state.write();

        let rejected = Self::owned_issue(&state, company, issue_id)
            .and_then(|_| state.issues.require_open(issue_id))
            .and_then(|_| state.proposals.check_reject(issue_id, proposal_id))
            .inspect_err(|e| debug!("reject_proposal rejected: {}", e))?;

        let mut changes = Changeset {
            proposals: vec![rejected.clone()],
            ..Default::default()
        };
        changes.event(LedgerEventKind::ProposalRejected {
            proposal_id,
            issue_id,
        });
        self.commit(&mut state, changes)?;

        info!("Proposal #{} on issue #{} rejected", proposal_id, issue_id);
        Ok(rejected)
    }

    // ------------------------------------------------------------------------
    // Accounting and journal
    // ------------------------------------------------------------------------

    /// Funds currently held in escrow across all issues
    pub fn total_escrowed(&self) -> Amount {
        self.state.read().escrows.total_held()
    }

    /// Funds released to `actor` as a winning hunter
    pub fn payouts_to(&self, actor: &ActorId) -> Amount {
        self.state.read().escrows.paid_to(actor)
    }

    pub fn stats(&self) -> LedgerStats {
        let state = self.state.read();
        let open = state.issues.open_count();
        LedgerStats {
            companies: state.registry.company_count() as u64,
            hunters: state.registry.hunter_count() as u64,
            open_issues: open as u64,
            resolved_issues: (state.issues.len() - open) as u64,
            proposals: state.proposals.len() as u64,
            total_escrowed: state.escrows.total_held(),
            total_released: state.escrows.total_released(),
        }
    }

    /// Journal entries with a sequence number greater than `since`
    pub fn events(&self, since: u64) -> Vec<LedgerEvent> {
        self.state
            .read()
            .events()
            .iter()
            .filter(|e| e.seq > since)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IssueStatus, ProposalStatus, MAX_AMOUNT};

    fn actor(n: u8) -> ActorId {
        ActorId::parse(&format!("0x{:040x}", n)).unwrap()
    }

    fn new_issue(title: &str, reward: Amount) -> NewIssue {
        NewIssue {
            title: title.to_string(),
            description: "Button not properly working".to_string(),
            attachment_hash: "Test hash".to_string(),
            reward_amount: reward,
        }
    }

    fn ledger() -> Ledger {
        Ledger::new(LedgerConfig::default())
    }

    /// Company 1, hunters 2 and 3, one issue with reward 50 and a pending
    /// proposal from each hunter
    fn contested_issue() -> (Ledger, Issue, SolutionProposal, SolutionProposal) {
        let ledger = ledger();
        ledger.register_company(&actor(1), "APPLE", "meta").unwrap();
        ledger.register_hunter(&actor(2), "Mr Robot").unwrap();
        ledger.register_hunter(&actor(3), "Darlene").unwrap();
        let issue = ledger
            .post_issue(&actor(1), new_issue("BUG in UI", 50), 50)
            .unwrap();
        let p1 = ledger.post_solution_proposal(&actor(2), issue.id).unwrap();
        let p2 = ledger.post_solution_proposal(&actor(3), issue.id).unwrap();
        (ledger, issue, p1, p2)
    }

    #[test]
    fn test_end_to_end_scenario() {
        let ledger = ledger();
        let apple = actor(1);
        let robot = actor(2);
        let other = actor(3);

        let company = ledger.register_company(&apple, "APPLE", "Test metadaa").unwrap();
        assert_eq!(ledger.get_company(&apple).unwrap(), company);
        assert!(company.is_registered);

        ledger.register_hunter(&robot, "Mr Robot").unwrap();
        ledger.register_hunter(&other, "Whiterose").unwrap();
        assert_eq!(ledger.get_hunter(&robot).unwrap().name, "Mr Robot");

        let issue1 = ledger
            .post_issue(&apple, new_issue("BUG in UI", 50), 50)
            .unwrap();
        let issue2 = ledger
            .post_issue(&apple, new_issue("Network bug", 50), 50)
            .unwrap();
        assert_eq!(ledger.get_all_unsolved_issues().len(), 2);

        let p1 = ledger.post_solution_proposal(&robot, issue1.id).unwrap();
        let p2 = ledger.post_solution_proposal(&other, issue1.id).unwrap();
        ledger.post_solution_proposal(&robot, issue2.id).unwrap();

        let on_issue1 = ledger.get_all_proposed_solution(issue1.id).unwrap();
        assert_eq!(on_issue1.len(), 2);
        assert_eq!(on_issue1[0].id, p1.id);
        assert_eq!(on_issue1[1].id, p2.id);
        assert_eq!(ledger.get_all_proposed_solution(issue2.id).unwrap().len(), 1);

        assert_eq!(ledger.total_escrowed(), 100);

        ledger.accept_proposal(&apple, issue1.id, p1.id).unwrap();

        let unsolved = ledger.get_all_unsolved_issues();
        assert_eq!(unsolved.len(), 1);
        assert_eq!(unsolved[0].id, issue2.id);

        let on_issue1 = ledger.get_all_proposed_solution(issue1.id).unwrap();
        assert_eq!(on_issue1[0].status, ProposalStatus::Accepted);
        assert_eq!(on_issue1[1].status, ProposalStatus::Rejected);

        let escrow = ledger.get_escrow(issue1.id).unwrap();
        assert!(escrow.released);
        assert_eq!(escrow.beneficiary, Some(robot.clone()));
        assert_eq!(ledger.payouts_to(&robot), 50);
        assert_eq!(ledger.total_escrowed(), 50);

        let resolved = ledger.get_issue(issue1.id).unwrap();
        assert_eq!(resolved.status, IssueStatus::Resolved);
        assert_eq!(resolved.winning_proposal, Some(p1.id));
    }

    #[test]
    fn test_reward_mismatch_creates_nothing() {
        let ledger = ledger();
        ledger.register_company(&actor(1), "APPLE", "").unwrap();

        let err = ledger
            .post_issue(&actor(1), new_issue("BUG in UI", 50), 40)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::RewardMismatch {
                reward: 50,
                deposited: 40
            }
        );
        assert!(ledger.get_all_unsolved_issues().is_empty());
        assert_eq!(ledger.get_issue(1).unwrap_err(), LedgerError::IssueNotFound(1));
        assert_eq!(ledger.total_escrowed(), 0);

        // The failed attempt does not consume an id
        let issue = ledger
            .post_issue(&actor(1), new_issue("BUG in UI", 50), 50)
            .unwrap();
        assert_eq!(issue.id, 1);
        assert_eq!(issue.reward_amount, 50);
    }

    #[test]
    fn test_post_issue_requires_registered_company() {
        let ledger = ledger();
        ledger.register_hunter(&actor(1), "Hunter only").unwrap();
        assert_eq!(
            ledger
                .post_issue(&actor(1), new_issue("x", 50), 50)
                .unwrap_err(),
            LedgerError::NotRegistered(actor(1))
        );
        // Registration is checked before the reward and text limits
        assert_eq!(
            ledger
                .post_issue(&actor(2), new_issue(&"x".repeat(5000), 0), 7)
                .unwrap_err(),
            LedgerError::NotRegistered(actor(2))
        );
    }

    #[test]
    fn test_huge_rewards_keep_totals_in_range() {
        let ledger = ledger();
        ledger.register_company(&actor(1), "APPLE", "").unwrap();
        let half = u64::MAX / 2 + 1;

        for _ in 0..2 {
            assert_eq!(
                ledger
                    .post_issue(&actor(1), new_issue("huge", half), half)
                    .unwrap_err(),
                LedgerError::RewardTooLarge {
                    reward: half,
                    available: MAX_AMOUNT
                }
            );
        }

        ledger
            .post_issue(&actor(1), new_issue("max", MAX_AMOUNT), MAX_AMOUNT)
            .unwrap();
        assert_eq!(
            ledger
                .post_issue(&actor(1), new_issue("one more", 1), 1)
                .unwrap_err(),
            LedgerError::RewardTooLarge {
                reward: 1,
                available: 0
            }
        );

        let stats = ledger.stats();
        assert_eq!(stats.open_issues, 1);
        assert_eq!(stats.total_escrowed, MAX_AMOUNT);
        assert_eq!(ledger.total_escrowed(), MAX_AMOUNT);
    }

    #[test]
    fn test_limits_enforced() {
        let ledger = Ledger::new(LedgerConfig {
            min_reward: 10,
            max_text_len: 8,
        });
        ledger.register_company(&actor(1), "APPLE", "").unwrap();

        assert_eq!(
            ledger
                .post_issue(&actor(1), new_issue("short", 5), 5)
                .unwrap_err(),
            LedgerError::RewardBelowMinimum {
                reward: 5,
                minimum: 10
            }
        );
        assert!(matches!(
            ledger.post_issue(&actor(1), new_issue("far too long a title", 10), 10),
            Err(LedgerError::FieldTooLong { field: "title", .. })
        ));
        assert!(matches!(
            ledger.register_hunter(&actor(2), "a very long name"),
            Err(LedgerError::FieldTooLong { field: "name", .. })
        ));
    }

    #[test]
    fn test_proposal_requires_registered_hunter() {
        let ledger = ledger();
        ledger.register_company(&actor(1), "APPLE", "").unwrap();
        let issue = ledger.post_issue(&actor(1), new_issue("x", 50), 50).unwrap();

        assert_eq!(
            ledger
                .post_solution_proposal(&actor(1), issue.id)
                .unwrap_err(),
            LedgerError::NotRegistered(actor(1))
        );
    }

    #[test]
    fn test_duplicate_pending_proposal() {
        let (ledger, issue, _, _) = contested_issue();
        assert_eq!(
            ledger
                .post_solution_proposal(&actor(2), issue.id)
                .unwrap_err(),
            LedgerError::DuplicateProposal {
                issue_id: issue.id,
                hunter: actor(2)
            }
        );
        assert_eq!(ledger.get_all_proposed_solution(issue.id).unwrap().len(), 2);
    }

    #[test]
    fn test_reject_then_repropose() {
        let (ledger, issue, p1, _) = contested_issue();

        let rejected = ledger.reject_proposal(&actor(1), issue.id, p1.id).unwrap();
        assert_eq!(rejected.status, ProposalStatus::Rejected);
        assert!(ledger.get_issue(issue.id).unwrap().is_open());

        let again = ledger.post_solution_proposal(&actor(2), issue.id).unwrap();
        assert_eq!(again.status, ProposalStatus::Pending);

        let by_hunter = ledger.proposals_by_hunter(&actor(2));
        assert_eq!(by_hunter.len(), 2);
        assert_eq!(by_hunter[0].id, p1.id);
        assert_eq!(by_hunter[1].id, again.id);
    }

    #[test]
    fn test_only_owner_decides() {
        let (ledger, issue, p1, _) = contested_issue();
        ledger.register_company(&actor(9), "Rival", "").unwrap();

        let expected = LedgerError::NotIssueOwner {
            issue_id: issue.id,
            actor: actor(9),
        };
        assert_eq!(
            ledger.accept_proposal(&actor(9), issue.id, p1.id).unwrap_err(),
            expected
        );
        assert_eq!(
            ledger.reject_proposal(&actor(9), issue.id, p1.id).unwrap_err(),
            expected
        );
        assert_eq!(ledger.total_escrowed(), 50);
    }

    #[test]
    fn test_accept_failure_changes_nothing() {
        let (ledger, issue, p1, p2) = contested_issue();
        ledger.reject_proposal(&actor(1), issue.id, p2.id).unwrap();
        let events_before = ledger.events(0).len();

        // p2 is no longer pending
        assert_eq!(
            ledger.accept_proposal(&actor(1), issue.id, p2.id).unwrap_err(),
            LedgerError::ProposalNotPending(p2.id)
        );
        // unknown proposal
        assert!(matches!(
            ledger.accept_proposal(&actor(1), issue.id, 99),
            Err(LedgerError::ProposalNotFound { .. })
        ));

        assert!(ledger.get_issue(issue.id).unwrap().is_open());
        assert!(!ledger.get_escrow(issue.id).unwrap().released);
        let proposals = ledger.get_all_proposed_solution(issue.id).unwrap();
        assert_eq!(proposals[0].id, p1.id);
        assert_eq!(proposals[0].status, ProposalStatus::Pending);
        assert_eq!(ledger.events(0).len(), events_before);
    }

    #[test]
    fn test_resolved_issue_is_terminal() {
        let (ledger, issue, p1, p2) = contested_issue();
        ledger.accept_proposal(&actor(1), issue.id, p1.id).unwrap();

        assert_eq!(
            ledger.accept_proposal(&actor(1), issue.id, p1.id).unwrap_err(),
            LedgerError::AlreadyResolved(issue.id)
        );
        assert_eq!(
            ledger.accept_proposal(&actor(1), issue.id, p2.id).unwrap_err(),
            LedgerError::AlreadyResolved(issue.id)
        );
        assert_eq!(
            ledger.post_solution_proposal(&actor(3), issue.id).unwrap_err(),
            LedgerError::IssueClosed(issue.id)
        );
        assert_eq!(
            ledger.reject_proposal(&actor(1), issue.id, p2.id).unwrap_err(),
            LedgerError::IssueClosed(issue.id)
        );
        assert_eq!(ledger.payouts_to(&actor(2)), 50);
        assert_eq!(ledger.payouts_to(&actor(3)), 0);
    }

    #[test]
    fn test_escrow_conservation() {
        let ledger = ledger();
        ledger.register_company(&actor(1), "APPLE", "").unwrap();
        ledger.register_hunter(&actor(2), "Mr Robot").unwrap();
        for (i, reward) in [50, 20, 75].iter().enumerate() {
            ledger
                .post_issue(&actor(1), new_issue(&format!("issue {}", i), *reward), *reward)
                .unwrap();
        }

        let open_sum: Amount = ledger
            .get_all_unsolved_issues()
            .iter()
            .map(|i| i.reward_amount)
            .sum();
        assert_eq!(ledger.total_escrowed(), open_sum);

        let p = ledger.post_solution_proposal(&actor(2), 2).unwrap();
        ledger.accept_proposal(&actor(1), 2, p.id).unwrap();

        let open_sum: Amount = ledger
            .get_all_unsolved_issues()
            .iter()
            .map(|i| i.reward_amount)
            .sum();
        assert_eq!(ledger.total_escrowed(), open_sum);
        assert_eq!(open_sum, 125);

        let stats = ledger.stats();
        assert_eq!(stats.open_issues, 2);
        assert_eq!(stats.resolved_issues, 1);
        assert_eq!(stats.total_released, 20);
        assert_eq!(stats.total_escrowed, 125);
    }

    #[test]
    fn test_issues_by_company() {
        let ledger = ledger();
        ledger.register_company(&actor(1), "APPLE", "").unwrap();
        ledger.register_company(&actor(2), "ACME", "").unwrap();
        ledger.post_issue(&actor(1), new_issue("a", 50), 50).unwrap();
        ledger.post_issue(&actor(2), new_issue("b", 50), 50).unwrap();
        ledger.post_issue(&actor(1), new_issue("c", 50), 50).unwrap();

        let ids: Vec<IssueId> = ledger
            .issues_by_company(&actor(1))
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_events_journal() {
        let (ledger, issue, p1, p2) = contested_issue();
        let before = ledger.events(0).last().map(|e| e.seq).unwrap();

        ledger.accept_proposal(&actor(1), issue.id, p1.id).unwrap();

        let new_events: Vec<LedgerEventKind> =
            ledger.events(before).into_iter().map(|e| e.kind).collect();
        assert_eq!(
            new_events,
            vec![
                LedgerEventKind::ProposalAccepted {
                    proposal_id: p1.id,
                    issue_id: issue.id
                },
                LedgerEventKind::ProposalRejected {
                    proposal_id: p2.id,
                    issue_id: issue.id
                },
                LedgerEventKind::EscrowReleased {
                    escrow_id: issue.escrow_id,
                    issue_id: issue.id,
                    beneficiary: actor(2),
                    amount: 50
                },
                LedgerEventKind::IssueResolved {
                    issue_id: issue.id,
                    winning_proposal: p1.id
                },
            ]
        );

        let seqs: Vec<u64> = ledger.events(0).iter().map(|e| e.seq).collect();
        let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
        assert_eq!(seqs, expected);
    }

    #[test]
    fn test_concurrent_readers_see_committed_state() {
        use std::sync::Arc;

        let ledger = Arc::new(ledger());
        ledger.register_company(&actor(1), "APPLE", "").unwrap();

        let writer = {
            let ledger = ledger.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    ledger
                        .post_issue(&actor(1), new_issue(&format!("issue {}", i), 10), 10)
                        .unwrap();
                }
            })
        };
        let reader = {
            let ledger = ledger.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let unsolved = ledger.get_all_unsolved_issues();
                    let held: Amount = unsolved.iter().map(|i| i.reward_amount).sum();
                    assert!(held <= 500);
                    let ids: Vec<IssueId> = unsolved.iter().map(|i| i.id).collect();
                    let expected: Vec<IssueId> = (1..=ids.len() as u64).collect();
                    assert_eq!(ids, expected);
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(ledger.get_all_unsolved_issues().len(), 50);
        assert_eq!(ledger.total_escrowed(), 500);
    }
}
