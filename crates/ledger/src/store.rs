use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use common::{Outcome, Owner, OwnerKind, Status};

use crate::error::{LedgerError, Result};
use crate::types::{session_name, LogRow, Session, SessionMode};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS owners (
        id INTEGER PRIMARY KEY,
        kind TEXT NOT NULL,
        name TEXT NOT NULL,
        UNIQUE(kind, name)
    );

    CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY,
        owner_id INTEGER NOT NULL REFERENCES owners(id),
        name TEXT NOT NULL,
        mode TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_owner_name ON sessions(owner_id, name);

    CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY,
        session_id INTEGER NOT NULL REFERENCES sessions(id),
        owner_id INTEGER NOT NULL REFERENCES owners(id),
        target TEXT NOT NULL,
        status TEXT NOT NULL,
        output TEXT NOT NULL,
        error TEXT NOT NULL,
        recorded_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_logs_session ON logs(session_id);
";

const SESSION_COLUMNS: &str = "id, owner_id, name, mode, created_at";
const LOG_COLUMNS: &str = "id, session_id, owner_id, target, status, output, error, recorded_at";

/// Append-only store of sessions and their per-target log rows.
///
/// Cloning is cheap; all clones share one connection.
#[derive(Clone)]
pub struct Ledger {
    conn: Arc<Mutex<Connection>>,
}

impl Ledger {
    /// Open or create a ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened session ledger");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LedgerError::Poisoned)
    }

    // -----------------------------------------------------------------------
    // Owners
    // -----------------------------------------------------------------------

    /// Return the owner row for `(kind, name)`, creating it on first use.
    pub fn register_owner(&self, kind: OwnerKind, name: &str) -> Result<Owner> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO owners (kind, name) VALUES (?1, ?2)
             ON CONFLICT(kind, name) DO NOTHING",
            params![kind.as_str(), name],
        )?;
        let id = conn.query_row(
            "SELECT id FROM owners WHERE kind = ?1 AND name = ?2",
            params![kind.as_str(), name],
            |row| row.get(0),
        )?;
        Ok(Owner {
            id,
            kind,
            name: name.to_string(),
        })
    }

    /// Look up an existing owner without creating it.
    pub fn owner(&self, kind: OwnerKind, name: &str) -> Result<Owner> {
        let conn = self.conn()?;
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM owners WHERE kind = ?1 AND name = ?2",
                params![kind.as_str(), name],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => Ok(Owner {
                id,
                kind,
                name: name.to_string(),
            }),
            None => Err(LedgerError::OwnerNotFound {
                kind,
                name: name.to_string(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Open a new session for `owner`, named after it and the current time.
    pub fn create_session(&self, owner: &Owner, mode: SessionMode) -> Result<Session> {
        self.create_session_at(owner, mode, Utc::now())
    }

    /// [`Ledger::create_session`] with an explicit clock reading.
    pub fn create_session_at(
        &self,
        owner: &Owner,
        mode: SessionMode,
        at: DateTime<Utc>,
    ) -> Result<Session> {
        // Stored as microseconds; keep the returned value equal to a re-read.
        let at = at.trunc_subsecs(6);
        let name = session_name(&owner.name, mode, at);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (owner_id, name, mode, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![owner.id, name, mode.as_str(), at.timestamp_micros()],
        )?;
        let session = Session {
            id: conn.last_insert_rowid(),
            owner_id: owner.id,
            name,
            mode,
            created_at: at,
        };
        debug!(session = %session.name, owner = %owner.name, "session created");
        Ok(session)
    }

    /// The newest session called `name` that belongs to `owner`.
    pub fn find_session(&self, owner: &Owner, name: &str) -> Result<Session> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE owner_id = ?1 AND name = ?2
                 ORDER BY created_at DESC, id DESC LIMIT 1"
            ),
            params![owner.id, name],
            session_from_row,
        )
        .optional()?
        .ok_or_else(|| LedgerError::SessionNotFound {
            owner: format!("{} '{}'", owner.kind, owner.name),
            name: name.to_string(),
        })
    }

    /// All sessions of `owner`, newest first.
    pub fn list_sessions(&self, owner: &Owner) -> Result<Vec<Session>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE owner_id = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;
        let sessions = stmt
            .query_map(params![owner.id], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    // -----------------------------------------------------------------------
    // Logs
    // -----------------------------------------------------------------------

    /// Append one row for `outcome` under `session`.
    pub fn record_outcome(&self, session: &Session, outcome: &Outcome) -> Result<LogRow> {
        let recorded_at = Utc::now().trunc_subsecs(6);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO logs (session_id, owner_id, target, status, output, error, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.owner_id,
                outcome.target(),
                outcome.status().as_str(),
                outcome.output(),
                outcome.error(),
                recorded_at.timestamp_micros(),
            ],
        )?;
        Ok(LogRow {
            id: conn.last_insert_rowid(),
            session_id: session.id,
            owner_id: session.owner_id,
            target: outcome.target().to_string(),
            status: outcome.status(),
            output: outcome.output().to_string(),
            error: outcome.error().to_string(),
            recorded_at,
        })
    }

    /// Rows recorded under the session `name` of `owner`, oldest first.
    pub fn fetch_logs(&self, owner: &Owner, name: &str) -> Result<Vec<LogRow>> {
        let session = self.find_session(owner, name)?;
        self.session_logs(&session)
    }

    pub fn session_logs(&self, session: &Session) -> Result<Vec<LogRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM logs
             WHERE session_id = ?1
             ORDER BY recorded_at ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map(params![session.id], log_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {micros} out of range").into(),
        )
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    let mode: String = row.get(3)?;
    let mode = mode.parse::<SessionMode>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
    })?;
    Ok(Session {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        mode,
        created_at: timestamp(row, 4)?,
    })
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<LogRow> {
    let status: String = row.get(4)?;
    let status = status.parse::<Status>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
    })?;
    Ok(LogRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        owner_id: row.get(2)?,
        target: row.get(3)?,
        status,
        output: row.get(5)?,
        error: row.get(6)?,
        recorded_at: timestamp(row, 7)?,
    })
}
