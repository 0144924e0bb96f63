//! SQLite storage layer -- schema, queries, migrations.
//!
//! Durable owner of all account and boost-log state.  Everything else in the
//! daemon holds only transient in-memory handles.

pub mod schema;

use anyhow::Result;
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use thiserror::Error;
use zeroize::Zeroize;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the account store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No account row with the given id.
    #[error("account {0} not found")]
    NotFound(i64),

    /// The owner already holds the configured maximum number of accounts.
    #[error("owner {owner_id} already holds {limit} accounts")]
    LimitExceeded { owner_id: i64, limit: u32 },

    /// The persistence backend is unreachable or rejected the operation.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Opaque marketplace credentials.
///
/// The daemon never parses the contents; the blob is stored verbatim and
/// forwarded to the automation agent.  The buffer is wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBlob(String);

impl CredentialBlob {
    pub fn new(raw: impl Into<String>) -> Self {
        CredentialBlob(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CredentialBlob {
    fn from(s: String) -> Self {
        CredentialBlob(s)
    }
}

impl std::fmt::Debug for CredentialBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CredentialBlob(<{} bytes>)", self.0.len())
    }
}

impl Drop for CredentialBlob {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Account lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Disabled,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Disabled => "disabled",
        }
    }

    fn from_db(s: &str) -> Self {
        // Unknown values are treated as disabled rather than silently re-armed.
        match s {
            "active" => AccountStatus::Active,
            _ => AccountStatus::Disabled,
        }
    }
}

/// Outcome of a single boost attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoostOutcome {
    /// The listing was renewed.
    Success,
    /// The attempt ran but the account could not be boosted (no renewable
    /// listing, re-authentication required, ...).
    Failure,
    /// The attempt itself broke: transport fault, agent unreachable.
    Error,
}

impl BoostOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoostOutcome::Success => "success",
            BoostOutcome::Failure => "failure",
            BoostOutcome::Error => "error",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "success" => BoostOutcome::Success,
            "failure" => BoostOutcome::Failure,
            _ => BoostOutcome::Error,
        }
    }
}

/// A registered marketplace account subject to periodic boosting.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub owner_id: i64,
    pub display_name: String,
    pub credential_blob: CredentialBlob,
    pub status: AccountStatus,
    pub interval_seconds: u64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub run_count: u64,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Parameters for creating a new account row.
#[derive(Debug)]
pub struct NewAccount {
    pub owner_id: i64,
    pub display_name: String,
    pub credential_blob: CredentialBlob,
    pub interval_seconds: u64,
    pub next_run_at: DateTime<Utc>,
}

/// One entry of the append-only boost log.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BoostRecord {
    pub account_id: i64,
    pub outcome: BoostOutcome,
    pub detail: String,
    pub diagnostic_ref: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregate counters shown in the owner stats view.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OwnerStats {
    pub total_accounts: u64,
    pub active_accounts: u64,
    pub total_boosts: u64,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Durable account store over the connection pool.
///
/// Schedule columns are single-writer-per-account: only the owning boost task
/// (or a manual trigger holding that account's execution gate) calls
/// [`Store::update_schedule`] / [`Store::record_outcome`] for an id, so no
/// cross-task locking happens here.
#[derive(Clone)]
pub struct Store {
    pool: Pool,
    max_accounts_per_owner: u32,
}

impl Store {
    pub fn new(pool: Pool, max_accounts_per_owner: u32) -> Self {
        Self {
            pool,
            max_accounts_per_owner,
        }
    }

    /// Register an owner; a no-op if the owner is already known.
    pub fn put_owner(&self, owner_id: i64, display_name: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR IGNORE INTO owners (owner_id, display_name) VALUES (?1, ?2)",
            rusqlite::params![owner_id, display_name],
        )?;
        Ok(())
    }

    pub fn owner_exists(&self, owner_id: i64) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM owners WHERE owner_id = ?1",
            [owner_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Create an account, enforcing the per-owner ceiling inside one
    /// transaction.
    pub fn create(&self, new: &NewAccount) -> Result<i64, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let held: u32 = tx.query_row(
            "SELECT COUNT(*) FROM accounts WHERE owner_id = ?1",
            [new.owner_id],
            |row| row.get(0),
        )?;
        if held >= self.max_accounts_per_owner {
            return Err(StoreError::LimitExceeded {
                owner_id: new.owner_id,
                limit: self.max_accounts_per_owner,
            });
        }

        tx.execute(
            "INSERT INTO accounts
                 (owner_id, display_name, credential_blob, status,
                  interval_seconds, next_run_at)
             VALUES (?1, ?2, ?3, 'active', ?4, ?5)",
            rusqlite::params![
                new.owner_id,
                new.display_name,
                new.credential_blob.as_str(),
                new.interval_seconds as i64,
                new.next_run_at.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(id)
    }

    pub fn load(&self, id: i64) -> Result<Account, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, display_name, credential_blob, status,
                    interval_seconds, next_run_at, last_run_at, run_count
             FROM accounts WHERE id = ?1",
        )?;

        let mut rows = stmt.query_map([id], account_from_row)?;
        match rows.next() {
            Some(row) => Ok(row?),
            None => Err(StoreError::NotFound(id)),
        }
    }

    /// Persist the next deadline and the interval that produced it.
    pub fn update_schedule(
        &self,
        id: i64,
        next_run_at: DateTime<Utc>,
        interval_seconds: u64,
    ) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE accounts SET next_run_at = ?1, interval_seconds = ?2 WHERE id = ?3",
            rusqlite::params![next_run_at.to_rfc3339(), interval_seconds as i64, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Append a boost record; a Success additionally bumps `run_count` and
    /// `last_run_at` in the same transaction.
    pub fn record_outcome(&self, record: &BoostRecord) -> Result<(), StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO boost_log (account_id, outcome, detail, diagnostic_ref, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                record.account_id,
                record.outcome.as_str(),
                record.detail,
                record.diagnostic_ref,
                record.occurred_at.to_rfc3339(),
            ],
        )?;

        if record.outcome == BoostOutcome::Success {
            tx.execute(
                "UPDATE accounts SET run_count = run_count + 1, last_run_at = ?1 WHERE id = ?2",
                rusqlite::params![record.occurred_at.to_rfc3339(), record.account_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Snapshot of active accounts, optionally restricted to one owner.
    /// Used for startup recovery and enumeration.
    pub fn list_active(&self, owner_id: Option<i64>) -> Result<Vec<Account>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, display_name, credential_blob, status,
                    interval_seconds, next_run_at, last_run_at, run_count
             FROM accounts
             WHERE status = 'active' AND (?1 IS NULL OR owner_id = ?1)
             ORDER BY id",
        )?;

        let rows = stmt.query_map([owner_id], account_from_row)?;
        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?);
        }
        Ok(accounts)
    }

    /// All accounts of one owner regardless of status, newest first.
    pub fn list_for_owner(&self, owner_id: i64) -> Result<Vec<Account>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, display_name, credential_blob, status,
                    interval_seconds, next_run_at, last_run_at, run_count
             FROM accounts WHERE owner_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;

        let rows = stmt.query_map([owner_id], account_from_row)?;
        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?);
        }
        Ok(accounts)
    }

    pub fn set_status(&self, id: i64, status: AccountStatus) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE accounts SET status = ?1 WHERE id = ?2",
            rusqlite::params![status.as_str(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Recent boost records for one account, newest first.
    pub fn history(&self, account_id: i64, limit: usize) -> Result<Vec<BoostRecord>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT account_id, outcome, detail, diagnostic_ref, occurred_at
             FROM boost_log WHERE account_id = ?1
             ORDER BY occurred_at DESC, id DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(
            rusqlite::params![account_id, limit as i64],
            record_from_row,
        )?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Recent boost records across all of an owner's accounts, newest first,
    /// paired with the account display name.
    pub fn recent_history(
        &self,
        owner_id: i64,
        limit: usize,
    ) -> Result<Vec<(String, BoostRecord)>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT a.display_name, l.account_id, l.outcome, l.detail,
                    l.diagnostic_ref, l.occurred_at
             FROM boost_log l
             JOIN accounts a ON l.account_id = a.id
             WHERE a.owner_id = ?1
             ORDER BY l.occurred_at DESC, l.id DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(rusqlite::params![owner_id, limit as i64], |row| {
            let name: String = row.get(0)?;
            let occurred_at: String = row.get(5)?;
            Ok((
                name,
                BoostRecord {
                    account_id: row.get(1)?,
                    outcome: BoostOutcome::from_db(&row.get::<_, String>(2)?),
                    detail: row.get(3)?,
                    diagnostic_ref: row.get(4)?,
                    occurred_at: parse_timestamp(&occurred_at),
                },
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn owner_stats(&self, owner_id: i64) -> Result<OwnerStats, StoreError> {
        let conn = self.pool.get()?;
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END),
                    SUM(run_count)
             FROM accounts WHERE owner_id = ?1",
            [owner_id],
            |row| {
                Ok(OwnerStats {
                    total_accounts: row.get::<_, i64>(0)? as u64,
                    active_accounts: row.get::<_, Option<i64>>(1)?.unwrap_or(0) as u64,
                    total_boosts: row.get::<_, Option<i64>>(2)?.unwrap_or(0) as u64,
                })
            },
        )?;
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    let status: String = row.get(4)?;
    let next_run_at: Option<String> = row.get(6)?;
    let last_run_at: Option<String> = row.get(7)?;

    Ok(Account {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        display_name: row.get(2)?,
        credential_blob: CredentialBlob::new(row.get::<_, String>(3)?),
        status: AccountStatus::from_db(&status),
        interval_seconds: row.get::<_, i64>(5)? as u64,
        next_run_at: next_run_at.as_deref().and_then(parse_timestamp_opt),
        last_run_at: last_run_at.as_deref().and_then(parse_timestamp_opt),
        run_count: row.get::<_, i64>(8)? as u64,
    })
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BoostRecord> {
    let occurred_at: String = row.get(4)?;
    Ok(BoostRecord {
        account_id: row.get(0)?,
        outcome: BoostOutcome::from_db(&row.get::<_, String>(1)?),
        detail: row.get(2)?,
        diagnostic_ref: row.get(3)?,
        occurred_at: parse_timestamp(&occurred_at),
    })
}

fn parse_timestamp_opt(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    parse_timestamp_opt(s).unwrap_or_else(Utc::now)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
