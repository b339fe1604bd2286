// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod ledger;

pub use ledger::{BundleLedger, DispatchRejection, DispatchReport};

use anyhow::{Context, Result, anyhow, bail};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use upkeep_app::PersistedBundle;

pub const APP_NAME: &str = "upkeep";
pub const DB_PATH_ENV: &str = "UPKEEP_DB_PATH";

/// Bundles awaiting or past dispatch, as shown on the dispatch board.
pub const DISPATCH_QUEUE: &str = "dispatch_queue";
/// Append-only audit of every accepted bundle.
pub const BUNDLE_HISTORY: &str = "bundle_history";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[("collections", &["name", "payload", "updated_at"])];

/// Read-modify-write access to named collections of persisted bundles.
///
/// Writes replace the whole collection. Reads and writes that must land
/// together across collections go through [`QueueStore::write_scope`].
pub trait QueueStore {
    fn load_collection(&self, name: &str) -> Result<Vec<PersistedBundle>>;
    fn save_collection(&self, name: &str, bundles: &[PersistedBundle]) -> Result<()>;

    /// Runs `body` with exclusive write access to every collection. Other
    /// writers, including other handles on the same database file, wait
    /// until `body` returns. On `Err` nothing `body` wrote is kept.
    fn write_scope<T, E>(&self, body: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<anyhow::Error>;

    fn get_queue(&self) -> Result<Vec<PersistedBundle>> {
        self.load_collection(DISPATCH_QUEUE)
    }

    fn save_queue(&self, bundles: &[PersistedBundle]) -> Result<()> {
        self.save_collection(DISPATCH_QUEUE, bundles)
    }

    fn get_history(&self) -> Result<Vec<PersistedBundle>> {
        self.load_collection(BUNDLE_HISTORY)
    }

    fn save_history(&self, bundles: &[PersistedBundle]) -> Result<()> {
        self.save_collection(BUNDLE_HISTORY, bundles)
    }
}

/// Keeps serialized collections in memory. Used by `--demo` and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, String>>,
    scope: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for MemoryStore {
    fn load_collection(&self, name: &str) -> Result<Vec<PersistedBundle>> {
        let collections = self
            .collections
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        match collections.get(name) {
            Some(payload) => decode_collection(name, payload),
            None => Ok(Vec::new()),
        }
    }

    fn save_collection(&self, name: &str, bundles: &[PersistedBundle]) -> Result<()> {
        let payload = encode_collection(name, bundles)?;
        self.collections
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .insert(name.to_owned(), payload);
        Ok(())
    }

    fn write_scope<T, E>(&self, body: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<anyhow::Error>,
    {
        let _scope = self
            .scope
            .lock()
            .map_err(|_| anyhow!("memory store scope lock poisoned"))?;
        let snapshot = self
            .collections
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .clone();
        let outcome = body(self);
        if outcome.is_err() {
            *self
                .collections
                .lock()
                .map_err(|_| anyhow!("memory store lock poisoned"))? = snapshot;
        }
        outcome
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
        }
        Ok(())
    }

    pub fn collection_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM collections ORDER BY name ASC")
            .context("prepare collection names query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("query collection names")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect collection names")
    }
}

impl QueueStore for Store {
    fn load_collection(&self, name: &str) -> Result<Vec<PersistedBundle>> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM collections WHERE name = ?",
                params![name],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("read collection {name}"))?;
        match payload {
            Some(payload) => decode_collection(name, &payload),
            None => Ok(Vec::new()),
        }
    }

    fn save_collection(&self, name: &str, bundles: &[PersistedBundle]) -> Result<()> {
        // Inside a write scope the enclosing transaction owns the commit.
        if !self.conn.is_autocommit() {
            return upsert_collection(&self.conn, name, bundles);
        }
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .with_context(|| format!("begin write of collection {name}"))?;
        upsert_collection(&tx, name, bundles)?;
        tx.commit()
            .with_context(|| format!("commit collection {name}"))
    }

    fn write_scope<T, E>(&self, body: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<anyhow::Error>,
    {
        // IMMEDIATE takes the write lock before the first read.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .context("begin write scope")?;
        let value = body(self)?;
        tx.commit().context("commit write scope")?;
        Ok(value)
    }
}

fn upsert_collection(conn: &Connection, name: &str, bundles: &[PersistedBundle]) -> Result<()> {
    let payload = encode_collection(name, bundles)?;
    let now = now_rfc3339()?;
    conn.execute(
        "
        INSERT INTO collections (name, payload, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
          payload = excluded.payload,
          updated_at = excluded.updated_at
        ",
        params![name, payload, now],
    )
    .with_context(|| format!("write collection {name}"))?;
    Ok(())
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os(DB_PATH_ENV) {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set {DB_PATH_ENV} to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("upkeep.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn encode_collection(name: &str, bundles: &[PersistedBundle]) -> Result<String> {
    serde_json::to_string(bundles).with_context(|| format!("encode collection {name}"))
}

fn decode_collection(name: &str, payload: &str) -> Result<Vec<PersistedBundle>> {
    serde_json::from_str(payload).with_context(|| {
        format!("collection {name} holds unreadable data; restore it from a backup or delete it")
    })
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        let columns = table_columns(conn, table)?;
        if columns.is_empty() {
            bail!(
                "database is missing required table `{table}`; point {DB_PATH_ENV} at an upkeep database"
            );
        }

        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();
        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; the database was not created by upkeep",
                missing.join(", ")
            );
        }
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}
