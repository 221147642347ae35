//! SQLite persistence for the ledger
//!
//! Each committed changeset is written in one transaction. On startup the
//! whole ledger is rebuilt from the tables.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use tracing::info;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{Changeset, LedgerState};
use crate::migrations::Migrator;
use crate::types::{
    ActorId, Amount, Company, Escrow, Hunter, Issue, IssueStatus, LedgerEvent, LedgerEventKind,
    ProposalStatus, SolutionProposal,
};

pub struct LedgerStorage {
    conn: Mutex<Connection>,
}

impl LedgerStorage {
    pub fn new(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!("Opened ledger database {}", path.display());
        Self::with_connection(conn)
    }

    pub fn in_memory() -> LedgerResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> LedgerResult<Self> {
        Migrator::new().run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Write every row of `changes` atomically
    pub fn persist(&self, changes: &Changeset) -> LedgerResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for c in &changes.companies {
            tx.execute(
                "INSERT OR REPLACE INTO companies (owner, name, metadata_ref, is_registered, registered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    c.owner.as_str(),
                    c.name,
                    c.metadata_ref,
                    c.is_registered,
                    c.registered_at.to_rfc3339(),
                ],
            )?;
        }

        for h in &changes.hunters {
            tx.execute(
                "INSERT OR REPLACE INTO hunters (owner, name, is_registered, registered_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    h.owner.as_str(),
                    h.name,
                    h.is_registered,
                    h.registered_at.to_rfc3339(),
                ],
            )?;
        }

        for i in &changes.issues {
            tx.execute(
                "INSERT OR REPLACE INTO issues (id, company, title, description, attachment_hash,
                    reward_amount, status, escrow_id, posted_at, winning_proposal, resolved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    i.id as i64,
                    i.company.as_str(),
                    i.title,
                    i.description,
                    i.attachment_hash,
                    i.reward_amount as i64,
                    issue_status_str(i.status),
                    i.escrow_id as i64,
                    i.posted_at.to_rfc3339(),
                    i.winning_proposal.map(|p| p as i64),
                    i.resolved_at.map(|t| t.to_rfc3339()),
                ],
            )?;
        }

        for e in &changes.escrows {
            tx.execute(
                "INSERT OR REPLACE INTO escrows (id, issue_id, depositor, amount_held,
                    original_amount, released, beneficiary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    e.id as i64,
                    e.issue_id as i64,
                    e.depositor.as_str(),
                    e.amount_held as i64,
                    e.original_amount as i64,
                    e.released,
                    e.beneficiary.as_ref().map(|b| b.as_str()),
                ],
            )?;
        }

        for p in &changes.proposals {
            tx.execute(
                "INSERT OR REPLACE INTO proposals (id, issue_id, hunter, status, submitted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    p.id as i64,
                    p.issue_id as i64,
                    p.hunter.as_str(),
                    proposal_status_str(p.status),
                    p.submitted_at.to_rfc3339(),
                ],
            )?;
        }

        for ev in &changes.events {
            let payload = serde_json::to_string(&ev.kind)
                .map_err(|e| LedgerError::Storage(e.to_string()))?;
            tx.execute(
                "INSERT INTO events (seq, at, payload) VALUES (?1, ?2, ?3)",
                params![ev.seq as i64, ev.at.to_rfc3339(), payload],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Rebuild the in-memory ledger from the stored rows
    pub fn load(&self) -> LedgerResult<LedgerState> {
        let conn = self.conn.lock();
        let mut state = LedgerState::new();

        let mut stmt = conn.prepare(
            "SELECT owner, name, metadata_ref, is_registered, registered_at FROM companies",
        )?;
        let companies = stmt
            .query_map([], |row| {
                Ok(Company {
                    owner: actor_col(row, 0)?,
                    name: row.get(1)?,
                    metadata_ref: row.get(2)?,
                    is_registered: row.get(3)?,
                    registered_at: time_col(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for company in companies {
            state.registry.put_company(company);
        }

        let mut stmt =
            conn.prepare("SELECT owner, name, is_registered, registered_at FROM hunters")?;
        let hunters = stmt
            .query_map([], |row| {
                Ok(Hunter {
                    owner: actor_col(row, 0)?,
                    name: row.get(1)?,
                    is_registered: row.get(2)?,
                    registered_at: time_col(row, 3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for hunter in hunters {
            state.registry.put_hunter(hunter);
        }

        let mut stmt = conn.prepare(
            "SELECT id, company, title, description, attachment_hash, reward_amount, status,
                    escrow_id, posted_at, winning_proposal, resolved_at
             FROM issues ORDER BY id",
        )?;
        let issues = stmt
            .query_map([], |row| {
                Ok(Issue {
                    id: row.get::<_, i64>(0)? as u64,
                    company: actor_col(row, 1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                    attachment_hash: row.get(4)?,
                    reward_amount: amount_col(row, 5)?,
                    status: parse_issue_status(row, 6)?,
                    escrow_id: row.get::<_, i64>(7)? as u64,
                    posted_at: time_col(row, 8)?,
                    winning_proposal: row.get::<_, Option<i64>>(9)?.map(|p| p as u64),
                    resolved_at: row
                        .get::<_, Option<String>>(10)?
                        .map(|s| parse_time(&s, 10))
                        .transpose()?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for issue in issues {
            state.issues.put(issue);
        }

        let mut stmt = conn.prepare(
            "SELECT id, issue_id, depositor, amount_held, original_amount, released, beneficiary
             FROM escrows ORDER BY id",
        )?;
        let escrows = stmt
            .query_map([], |row| {
                Ok(Escrow {
                    id: row.get::<_, i64>(0)? as u64,
                    issue_id: row.get::<_, i64>(1)? as u64,
                    depositor: actor_col(row, 2)?,
                    amount_held: amount_col(row, 3)?,
                    original_amount: amount_col(row, 4)?,
                    released: row.get(5)?,
                    beneficiary: row
                        .get::<_, Option<String>>(6)?
                        .map(|s| parse_actor(&s, 6))
                        .transpose()?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for escrow in escrows {
            state.escrows.put(escrow);
        }

        // Global ids follow submission order
        let mut stmt = conn.prepare(
            "SELECT id, issue_id, hunter, status, submitted_at FROM proposals ORDER BY id",
        )?;
        let proposals = stmt
            .query_map([], |row| {
                Ok(SolutionProposal {
                    id: row.get::<_, i64>(0)? as u64,
                    issue_id: row.get::<_, i64>(1)? as u64,
                    hunter: actor_col(row, 2)?,
                    status: parse_proposal_status(row, 3)?,
                    submitted_at: time_col(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for proposal in proposals {
            state.proposals.put(proposal);
        }

        let mut stmt = conn.prepare("SELECT seq, at, payload FROM events ORDER BY seq")?;
        let events = stmt
            .query_map([], |row| {
                let payload: String = row.get(2)?;
                let kind: LedgerEventKind = serde_json::from_str(&payload).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                })?;
                Ok(LedgerEvent {
                    seq: row.get::<_, i64>(0)? as u64,
                    at: time_col(row, 1)?,
                    kind,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for event in events {
            state.push_event(event);
        }

        Ok(state)
    }
}

// ============================================================================
// COLUMN CONVERSIONS
// ============================================================================

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_actor(raw: &str, idx: usize) -> rusqlite::Result<ActorId> {
    ActorId::parse(raw).map_err(|e| conversion_error(idx, e))
}

fn parse_time(raw: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn actor_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<ActorId> {
    parse_actor(&row.get::<_, String>(idx)?, idx)
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_time(&row.get::<_, String>(idx)?, idx)
}

/// Amounts never exceed `MAX_AMOUNT`, so a negative column is corrupt
fn amount_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Amount> {
    let raw: i64 = row.get(idx)?;
    Amount::try_from(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e))
    })
}

fn issue_status_str(status: IssueStatus) -> &'static str {
    match status {
        IssueStatus::Open => "open",
        IssueStatus::Resolved => "resolved",
    }
}

fn parse_issue_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<IssueStatus> {
    match row.get::<_, String>(idx)?.as_str() {
        "open" => Ok(IssueStatus::Open),
        "resolved" => Ok(IssueStatus::Resolved),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            format!("unknown status {:?}", other),
            Type::Text,
        )),
    }
}

fn proposal_status_str(status: ProposalStatus) -> &'static str {
    match status {
        ProposalStatus::Pending => "pending",
        ProposalStatus::Accepted => "accepted",
        ProposalStatus::Rejected => "rejected",
    }
}

fn parse_proposal_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<ProposalStatus> {
    match row.get::<_, String>(idx)?.as_str() {
        "pending" => Ok(ProposalStatus::Pending),
        "accepted" => Ok(ProposalStatus::Accepted),
        "rejected" => Ok(ProposalStatus::Rejected),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            format!("unknown status {:?}", other),
            Type::Text,
        )),
    }
}
