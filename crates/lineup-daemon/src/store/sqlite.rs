//! `SQLite`-backed store implementation.
//!
//! Lists are stored as whole JSON documents with a version column; every
//! conditional write runs as one `SQLite` transaction that re-reads the
//! row, compares versions, and either rewrites the document or backs off.
//! WAL mode keeps concurrent readers cheap.

// SQLite returns i64 for counts and versions, but ours are always
// non-negative and far below i64::MAX.
// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_panics_doc
)]

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use lineup_core::list::{ListDoc, UserProfile};
use lineup_core::reconcile::{self, SpotUpdates};
use lineup_core::signup::ListMutation;
use lineup_core::store::{
    CommitOutcome, DocVersion, ListChange, ListStore, StoreError, VersionedList,
};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tokio::sync::mpsc;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// `SQLite` document store.
pub struct SqliteListStore {
    conn: Mutex<Connection>,
    events: Option<mpsc::UnboundedSender<ListChange>>,
}

fn db_err(err: rusqlite::Error) -> StoreError {
    StoreError::backend(err.to_string())
}

impl SqliteListStore {
    /// Opens or creates a store at the specified path.
    ///
    /// If the database doesn't exist, it is created with the appropriate
    /// schema. WAL mode is enabled for concurrent reads.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(db_err)?;
        Self::initialize_connection(conn)
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_connection(conn)
    }

    fn initialize_connection(conn: Connection) -> Result<Self, StoreError> {
        // journal_mode returns the resulting mode as a row; query it rather
        // than batching it with the schema.
        let _mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA_SQL).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            events: None,
        })
    }

    /// Attaches the change-event sender. Every subsequent List mutation
    /// emits a [`ListChange`] on it.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ListChange>) -> Self {
        self.events = Some(events);
        self
    }

    /// Creates or replaces a list document. List provisioning happens
    /// outside the consistency logic; this is its entry point.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be encoded or written.
    pub fn put_list(&self, list_id: &str, doc: &ListDoc) -> Result<(), StoreError> {
        let change = {
            let mut conn = self.conn.lock().expect("store mutex poisoned");
            let tx = conn.transaction().map_err(db_err)?;

            let previous = read_list_row(&tx, list_id)?;
            let version = previous
                .as_ref()
                .map_or(DocVersion(1), |v| v.version.next());
            tx.execute(
                "INSERT INTO lists (list_id, doc, version) VALUES (?1, ?2, ?3)
                 ON CONFLICT(list_id) DO UPDATE SET doc = excluded.doc, version = excluded.version",
                params![list_id, serde_json::to_string(doc)?, version.0 as i64],
            )
            .map_err(db_err)?;
            tx.commit().map_err(db_err)?;

            ListChange {
                list_id: list_id.to_string(),
                before: previous.map(|v| v.doc),
                after: Some(doc.clone()),
                version,
            }
        };
        self.emit(change);
        Ok(())
    }

    /// Stores a user profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be encoded or written.
    pub fn put_profile(&self, user_id: &str, profile: &UserProfile) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO user_profiles (user_id, profile) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET profile = excluded.profile",
            params![user_id, serde_json::to_string(profile)?],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Adds a bucket signup record under a list.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub fn add_bucket_signup(&self, list_id: &str, signup_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO bucket_signups (list_id, signup_id) VALUES (?1, ?2)",
            params![list_id, signup_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Number of bucket signups currently held for a list.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn bucket_len(&self, list_id: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM bucket_signups WHERE list_id = ?1",
                params![list_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }

    fn emit(&self, change: ListChange) {
        if let Some(events) = &self.events {
            let _ = events.send(change);
        }
    }
}

/// Reads one list row inside an open transaction.
fn read_list_row(conn: &Connection, list_id: &str) -> Result<Option<VersionedList>, StoreError> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT doc, version FROM lists WHERE list_id = ?1",
            params![list_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;
    let Some((doc_json, version)) = row else {
        return Ok(None);
    };
    let doc: ListDoc = serde_json::from_str(&doc_json)?;
    Ok(Some(VersionedList {
        doc,
        version: DocVersion(version as u64),
    }))
}

/// Shared shape of both conditional writes: re-read, compare versions,
/// transform the document, rewrite the row.
fn conditional_write<F>(
    conn: &mut Connection,
    list_id: &str,
    expected: DocVersion,
    transform: F,
) -> Result<(CommitOutcome, Option<ListChange>), StoreError>
where
    F: FnOnce(&mut ListDoc, DateTime<Utc>),
{
    let tx = conn.transaction().map_err(db_err)?;

    let Some(current) = read_list_row(&tx, list_id)? else {
        return Ok((CommitOutcome::Missing, None));
    };
    if current.version != expected {
        return Ok((CommitOutcome::Conflict, None));
    }

    let before = current.doc.clone();
    let mut doc = current.doc;
    let now = Utc::now();
    transform(&mut doc, now);

    let version = expected.next();
    tx.execute(
        "UPDATE lists SET doc = ?2, version = ?3 WHERE list_id = ?1",
        params![list_id, serde_json::to_string(&doc)?, version.0 as i64],
    )
    .map_err(db_err)?;
    tx.commit().map_err(db_err)?;

    let change = ListChange {
        list_id: list_id.to_string(),
        before: Some(before),
        after: Some(doc),
        version,
    };
    Ok((CommitOutcome::Committed { at: now }, Some(change)))
}

impl ListStore for SqliteListStore {
    fn load_list(&self, list_id: &str) -> Result<Option<VersionedList>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        read_list_row(&conn, list_id)
    }

    fn load_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let row: Option<String> = conn
            .query_row(
                "SELECT profile FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        row.map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    fn commit_mutation(
        &self,
        list_id: &str,
        expected: DocVersion,
        mutation: &ListMutation,
    ) -> Result<CommitOutcome, StoreError> {
        let (outcome, change) = {
            let mut conn = self.conn.lock().expect("store mutex poisoned");
            conditional_write(&mut conn, list_id, expected, |doc, now| {
                mutation.apply_to(doc, now);
            })?
        };
        if let Some(change) = change {
            self.emit(change);
        }
        Ok(outcome)
    }

    fn apply_spot_updates(
        &self,
        list_id: &str,
        expected: DocVersion,
        updates: &SpotUpdates,
    ) -> Result<CommitOutcome, StoreError> {
        let (outcome, change) = {
            let mut conn = self.conn.lock().expect("store mutex poisoned");
            conditional_write(&mut conn, list_id, expected, |doc, _now| {
                reconcile::apply_updates(doc, updates);
            })?
        };
        if let Some(change) = change {
            self.emit(change);
        }
        Ok(outcome)
    }

    fn delete_list(&self, list_id: &str) -> Result<(), StoreError> {
        let change = {
            let mut conn = self.conn.lock().expect("store mutex poisoned");
            let tx = conn.transaction().map_err(db_err)?;
            let Some(current) = read_list_row(&tx, list_id)? else {
                return Ok(());
            };
            tx.execute("DELETE FROM lists WHERE list_id = ?1", params![list_id])
                .map_err(db_err)?;
            tx.commit().map_err(db_err)?;

            ListChange {
                list_id: list_id.to_string(),
                before: Some(current.doc),
                after: None,
                version: current.version,
            }
        };
        self.emit(change);
        Ok(())
    }

    fn bucket_signup_page(
        &self,
        list_id: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT signup_id FROM bucket_signups
                 WHERE list_id = ?1 AND (?2 IS NULL OR signup_id > ?2)
                 ORDER BY signup_id
                 LIMIT ?3",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![list_id, start_after, limit as i64], |row| {
                row.get::<_, String>(0)
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn delete_bucket_signups(&self, list_id: &str, ids: &[String]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare("DELETE FROM bucket_signups WHERE list_id = ?1 AND signup_id = ?2")
                .map_err(db_err)?;
            for id in ids {
                stmt.execute(params![list_id, id]).map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        Ok(())
    }
}
