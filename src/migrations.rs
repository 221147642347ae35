//! Embedded SQLite schema migrations

use rusqlite::{params, Connection};
use tracing::info;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "001_ledger",
        sql: include_str!("../migrations/001_ledger.sql"),
    },
    Migration {
        version: 2,
        name: "002_events",
        sql: include_str!("../migrations/002_events.sql"),
    },
];

pub struct Migrator {
    migrations: &'static [Migration],
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Migrator {
    pub fn new() -> Self {
        Self {
            migrations: MIGRATIONS,
        }
    }

    /// Apply every migration not yet recorded in `schema_migrations`
    pub fn run(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        for migration in self.migrations {
            let applied: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
                params![migration.version],
                |row| row.get(0),
            )?;
            if applied {
                continue;
            }

            conn.execute_batch(migration.sql)?;
            conn.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                params![migration.version, chrono::Utc::now().to_rfc3339()],
            )?;
            info!("Applied migration {}", migration.name);
        }

        Ok(())
    }

    pub fn latest_version(&self) -> i64 {
        self.migrations.last().map_or(0, |m| m.version)
    }
}
