//! Identity registry
//!
//! One company profile and one hunter profile per actor. The two roles live
//! in separate tables, so a single actor may hold both.

use std::collections::HashMap;

use chrono::Utc;

use crate::error::{LedgerError, LedgerResult};
use crate::types::{ActorId, Company, Hunter};

#[derive(Debug, Default, Clone)]
pub struct IdentityRegistry {
    companies: HashMap<ActorId, Company>,
    hunters: HashMap<ActorId, Hunter>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the company record that registration would store, without storing it
    pub fn check_register_company(
        &self,
        actor: &ActorId,
        name: &str,
        metadata_ref: &str,
    ) -> LedgerResult<Company> {
        if self.companies.contains_key(actor) {
            return Err(LedgerError::AlreadyRegistered(actor.clone()));
        }
        Ok(Company {
            owner: actor.clone(),
            name: name.to_string(),
            metadata_ref: metadata_ref.to_string(),
            is_registered: true,
            registered_at: Utc::now(),
        })
    }

    pub fn check_register_hunter(&self, actor: &ActorId, name: &str) -> LedgerResult<Hunter> {
        if self.hunters.contains_key(actor) {
            return Err(LedgerError::AlreadyRegistered(actor.clone()));
        }
        Ok(Hunter {
            owner: actor.clone(),
            name: name.to_string(),
            is_registered: true,
            registered_at: Utc::now(),
        })
    }

    pub fn register_company(
        &mut self,
        actor: &ActorId,
        name: &str,
        metadata_ref: &str,
    ) -> LedgerResult<Company> {
        let company = self.check_register_company(actor, name, metadata_ref)?;
        self.put_company(company.clone());
        Ok(company)
    }

    pub fn register_hunter(&mut self, actor: &ActorId, name: &str) -> LedgerResult<Hunter> {
        let hunter = self.check_register_hunter(actor, name)?;
        self.put_hunter(hunter.clone());
        Ok(hunter)
    }

    pub fn get_company(&self, actor: &ActorId) -> LedgerResult<&Company> {
        self.companies
            .get(actor)
            .ok_or_else(|| LedgerError::NotFound(actor.clone()))
    }

    pub fn get_hunter(&self, actor: &ActorId) -> LedgerResult<&Hunter> {
        self.hunters
            .get(actor)
            .ok_or_else(|| LedgerError::NotFound(actor.clone()))
    }

    /// Gate for actions that need a registered company
    pub fn require_company(&self, actor: &ActorId) -> LedgerResult<&Company> {
        match self.companies.get(actor) {
            Some(c) if c.is_registered => Ok(c),
            _ => Err(LedgerError::NotRegistered(actor.clone())),
        }
    }

    /// Gate for actions that need a registered hunter
    pub fn require_hunter(&self, actor: &ActorId) -> LedgerResult<&Hunter> {
        match self.hunters.get(actor) {
            Some(h) if h.is_registered => Ok(h),
            _ => Err(LedgerError::NotRegistered(actor.clone())),
        }
    }

    pub(crate) fn put_company(&mut self, company: Company) {
        self.companies.insert(company.owner.clone(), company);
    }

    pub(crate) fn put_hunter(&mut self, hunter: Hunter) {
        self.hunters.insert(hunter.owner.clone(), hunter);
    }

    pub fn company_count(&self) -> usize {
        self.companies.len()
    }

    pub fn hunter_count(&self) -> usize {
        self.hunters.len()
    }
}
