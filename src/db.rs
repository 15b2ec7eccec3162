//! Embedded document store for order records.
//!
//! Uses rusqlite with WAL mode, matching the key pragmas of a
//! browser-grade embedded database. One collection (`orders`) keyed by
//! order id, each row holding the serialized record; a `schema_version`
//! table guards numbered migrations. The store may be unavailable in a
//! given runtime (data directory not creatable); availability is probed
//! without side effects via [`DocumentStore::is_supported`] and resolved
//! once by the sync engine at construction.

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::models::Order;
use crate::StoreError;

/// Database file name inside the data directory.
pub const DB_FILE: &str = "storefront.db";

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Handle to the embedded order database.
pub struct DocumentStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl DocumentStore {
    /// Pure capability probe: whether the runtime can plausibly provide
    /// the embedded database at `data_dir`.
    ///
    /// Walks up to the nearest existing ancestor and checks it is a
    /// writable directory. No directory or file is created; safe to
    /// call before any other operation and never panics.
    pub fn is_supported(data_dir: &Path) -> bool {
        let mut probe = data_dir;
        loop {
            match probe.metadata() {
                Ok(meta) => return meta.is_dir() && !meta.permissions().readonly(),
                Err(_) => match probe.parent() {
                    Some(parent) if parent != probe => probe = parent,
                    _ => return false,
                },
            }
        }
    }

    /// Open (and lazily create) the database at `{data_dir}/storefront.db`.
    ///
    /// Creates the directory if needed, applies pragmas, and runs any
    /// pending migrations. Fails with [`StoreError::UnsupportedStorage`]
    /// when the runtime cannot provide the database.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir)
            .map_err(|e| StoreError::UnsupportedStorage(format!("create data dir: {e}")))?;

        let db_path = data_dir.join(DB_FILE);
        let conn = open_and_configure(&db_path)
            .map_err(|e| StoreError::UnsupportedStorage(format!("sqlite open: {e}")))?;
        run_migrations(&conn)?;

        info!(path = %db_path.display(), "document store opened (schema v{CURRENT_SCHEMA_VERSION})");

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// In-memory store with the full schema applied. Used by tests and
    /// ephemeral embedders; contents vanish when the handle drops.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::UnsupportedStorage(format!("sqlite open: {e}")))?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Upsert an order by id.
    pub async fn put(&self, order: &Order) -> Result<(), StoreError> {
        let body = serde_json::to_string(order)
            .map_err(|e| StoreError::WriteFailure(format!("serialize order {}: {e}", order.id)))?;

        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::WriteFailure(format!("db lock: {e}")))?;
        conn.execute(
            "INSERT INTO orders (id, body) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET body = excluded.body",
            params![order.id, body],
        )
        .map_err(|e| StoreError::WriteFailure(format!("upsert order {}: {e}", order.id)))?;
        Ok(())
    }

    /// All stored orders, in unspecified order.
    ///
    /// Rows whose body no longer deserializes are skipped with a
    /// warning rather than failing the whole read.
    pub async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::ReadFailure(format!("db lock: {e}")))?;
        let mut stmt = conn
            .prepare("SELECT id, body FROM orders")
            .map_err(|e| StoreError::ReadFailure(format!("prepare order query: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StoreError::ReadFailure(format!("query orders: {e}")))?;

        let mut orders = Vec::new();
        for row in rows {
            let (id, body) = row.map_err(|e| StoreError::ReadFailure(format!("read row: {e}")))?;
            match serde_json::from_str::<Order>(&body) {
                Ok(order) => orders.push(order),
                Err(e) => warn!(order_id = %id, error = %e, "skipping undeserializable order row"),
            }
        }
        Ok(orders)
    }

    /// Number of stored orders.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::ReadFailure(format!("db lock: {e}")))?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
            .map_err(|e| StoreError::ReadFailure(format!("count orders: {e}")))?;
        Ok(count as u64)
    }
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| StoreError::UnsupportedStorage(format!("create schema_version: {e}")))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    info!("migrating document store from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Migration v1: the orders collection.
fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            body TEXT NOT NULL
        );
        INSERT INTO schema_version (version) VALUES (1);",
    )
    .map_err(|e| StoreError::UnsupportedStorage(format!("migration v1: {e}")))
}
