//! Escrow ledger
//!
//! Holds the reward deposited with each issue. Funds leave an escrow exactly
//! once, through `release`, to the winning hunter. There is no refund path.

use std::collections::{BTreeMap, HashMap};

use crate::error::{LedgerError, LedgerResult};
use crate::types::{ActorId, Amount, Escrow, EscrowId, IssueId, MAX_AMOUNT};

#[derive(Debug, Default, Clone)]
pub struct EscrowLedger {
    escrows: BTreeMap<EscrowId, Escrow>,
    by_issue: HashMap<IssueId, EscrowId>,
    /// Sum of every original deposit, never above `MAX_AMOUNT`
    deposited: Amount,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> EscrowId {
        self.escrows.keys().next_back().map_or(1, |id| id + 1)
    }

    /// Build a fresh escrow for `issue_id`, without storing it.
    ///
    /// The deposit must cover the reward exactly, and the ledger's total
    /// deposits must stay within `MAX_AMOUNT`.
    pub fn check_open(
        &self,
        issue_id: IssueId,
        depositor: &ActorId,
        amount: Amount,
        deposited: Amount,
    ) -> LedgerResult<Escrow> {
        if deposited != amount {
            return Err(LedgerError::RewardMismatch {
                reward: amount,
                deposited,
            });
        }
        let available = self.available();
        if amount > available {
            return Err(LedgerError::RewardTooLarge {
                reward: amount,
                available,
            });
        }
        Ok(Escrow {
            id: self.next_id(),
            issue_id,
            depositor: depositor.clone(),
            amount_held: amount,
            original_amount: amount,
            released: false,
            beneficiary: None,
        })
    }

    /// Build the released image of an escrow, without storing it
    pub fn check_release(&self, id: EscrowId, beneficiary: &ActorId) -> LedgerResult<Escrow> {
        let escrow = self.get(id)?;
        if escrow.released {
            return Err(LedgerError::AlreadyReleased(id));
        }
        Ok(Escrow {
            amount_held: 0,
            released: true,
            beneficiary: Some(beneficiary.clone()),
            ..escrow.clone()
        })
    }

    pub fn open(
        &mut self,
        issue_id: IssueId,
        depositor: &ActorId,
        amount: Amount,
        deposited: Amount,
    ) -> LedgerResult<Escrow> {
        let escrow = self.check_open(issue_id, depositor, amount, deposited)?;
        self.put(escrow.clone());
        Ok(escrow)
    }

    /// Pay out the held amount to `beneficiary`. Returns the amount paid.
    pub fn release(&mut self, id: EscrowId, beneficiary: &ActorId) -> LedgerResult<Amount> {
        let held = self.get(id)?.amount_held;
        let released = self.check_release(id, beneficiary)?;
        self.put(released);
        Ok(held)
    }

    pub fn get(&self, id: EscrowId) -> LedgerResult<&Escrow> {
        self.escrows.get(&id).ok_or(LedgerError::EscrowNotFound(id))
    }

    pub fn for_issue(&self, issue_id: IssueId) -> Option<&Escrow> {
        self.by_issue
            .get(&issue_id)
            .and_then(|id| self.escrows.get(id))
    }

    /// Room left under `MAX_AMOUNT` for new deposits
    pub fn available(&self) -> Amount {
        MAX_AMOUNT.saturating_sub(self.deposited)
    }

    pub(crate) fn put(&mut self, escrow: Escrow) {
        if !self.escrows.contains_key(&escrow.id) {
            self.deposited = self.deposited.saturating_add(escrow.original_amount);
        }
        self.by_issue.insert(escrow.issue_id, escrow.id);
        self.escrows.insert(escrow.id, escrow);
    }

    /// Funds currently held across all escrows
    pub fn total_held(&self) -> Amount {
        self.escrows.values().map(|e| e.amount_held).sum()
    }

    /// Funds paid out across all released escrows
    pub fn total_released(&self) -> Amount {
        self.escrows
            .values()
            .filter(|e| e.released)
            .map(|e| e.original_amount)
            .sum()
    }

    /// Funds paid out to a single beneficiary
    pub fn paid_to(&self, actor: &ActorId) -> Amount {
        self.escrows
            .values()
            .filter(|e| e.beneficiary.as_ref() == Some(actor))
            .map(|e| e.original_amount)
            .sum()
    }
}
