//! Store traits and the SQLite implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::error::StoreError;
use super::schema;
use super::types::{EntityKind, EntityWrite, FieldValue, LocalEntity, LogEntry, RunStatus};
use crate::auth::credentials::Credentials;

/// Lookup and write access to the local entity tables.
///
/// Object-safe so the reconciler can run against `&dyn EntityStore`.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Find the local primary key of the entity whose natural key equals `key`.
    async fn find_entity_id(&self, kind: EntityKind, key: &str) -> Result<Option<i64>, StoreError>;

    /// Apply a batch of creates and updates atomically.
    ///
    /// Updates touch only the listed columns; everything else on the row is
    /// left as it was.
    async fn apply_writes(&self, kind: EntityKind, writes: &[EntityWrite])
        -> Result<(), StoreError>;

    /// Read one entity back by natural key.
    async fn get_entity(&self, kind: EntityKind, key: &str)
        -> Result<Option<LocalEntity>, StoreError>;

    /// Number of rows in an entity table.
    async fn count_entities(&self, kind: EntityKind) -> Result<u64, StoreError>;
}

/// Persistence for credential configurations.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load_credentials(&self, name: &str) -> Result<Option<Credentials>, StoreError>;

    /// Insert or overwrite the configuration with `credentials.name`.
    async fn save_credentials(&self, credentials: &Credentials) -> Result<(), StoreError>;
}

/// Append-only record of sync runs.
#[async_trait]
pub trait OperationLog: Send + Sync {
    /// Append one entry and return its row id.
    async fn append_log(&self, entry: &LogEntry) -> Result<i64, StoreError>;

    /// Most recent entries for a configuration, newest first.
    async fn recent_logs(
        &self,
        config_ref: &str,
        limit: u32,
        failures_only: bool,
    ) -> Result<Vec<LogEntry>, StoreError>;
}

/// SQLite implementation of every store trait.
pub struct SqliteRecordStore {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    /// Path to the database file (for error messages).
    path: PathBuf,
}

impl std::fmt::Debug for SqliteRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteRecordStore {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone).map_err(|e| StoreError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StoreError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StoreError::Migration)?;
            conn.pragma_update(None, "foreign_keys", "ON")
                .map_err(StoreError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StoreError>(conn)
        })
        .await
        .map_err(|e| StoreError::Query(format!("Failed to spawn blocking task: {}", e)))??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Get the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))
    }
}

/// Reject columns that are not part of the table's writable set. Column names
/// end up in SQL text, so only the static whitelist may reach it.
fn check_columns(kind: EntityKind, write: &EntityWrite) -> Result<(), StoreError> {
    let allowed = kind.columns();
    for (column, _) in write.values() {
        if !allowed.contains(column) {
            return Err(StoreError::UnknownColumn {
                table: kind.table(),
                column: *column,
            });
        }
    }
    Ok(())
}

fn apply_write(
    conn: &Connection,
    kind: EntityKind,
    write: &EntityWrite,
    now: i64,
) -> Result<(), StoreError> {
    check_columns(kind, write)?;
    match write {
        EntityWrite::Create { values } => {
            let columns: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
            let placeholders: Vec<String> =
                (1..=values.len() + 2).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "INSERT INTO {} ({}, created_at, updated_at) VALUES ({})",
                kind.table(),
                columns.join(", "),
                placeholders.join(", ")
            );
            let mut params: Vec<&dyn rusqlite::ToSql> =
                values.iter().map(|(_, v)| v as &dyn rusqlite::ToSql).collect();
            params.push(&now);
            params.push(&now);
            conn.prepare_cached(&sql)
                .and_then(|mut stmt| stmt.execute(params.as_slice()))
                .map_err(StoreError::query)?;
        }
        EntityWrite::Update { id, values } => {
            let assignments: Vec<String> = values
                .iter()
                .enumerate()
                .map(|(i, (c, _))| format!("{} = ?{}", c, i + 1))
                .collect();
            let sql = format!(
                "UPDATE {} SET {}, updated_at = ?{} WHERE id = ?{}",
                kind.table(),
                assignments.join(", "),
                values.len() + 1,
                values.len() + 2
            );
            let mut params: Vec<&dyn rusqlite::ToSql> =
                values.iter().map(|(_, v)| v as &dyn rusqlite::ToSql).collect();
            params.push(&now);
            params.push(id);
            conn.prepare_cached(&sql)
                .and_then(|mut stmt| stmt.execute(params.as_slice()))
                .map_err(StoreError::query)?;
        }
    }
    Ok(())
}

fn timestamp_to_utc(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

#[async_trait]
impl EntityStore for SqliteRecordStore {
    async fn find_entity_id(&self, kind: EntityKind, key: &str) -> Result<Option<i64>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT id FROM {} WHERE {} = ?1",
            kind.table(),
            kind.key_column()
        );
        conn.query_row(&sql, [key], |row| row.get(0))
            .optional()
            .map_err(StoreError::query)
    }

    async fn apply_writes(
        &self,
        kind: EntityKind,
        writes: &[EntityWrite],
    ) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }

        let conn = self.lock()?;
        let now = Utc::now().timestamp();

        conn.execute("BEGIN TRANSACTION", [])
            .map_err(StoreError::query)?;

        let result = (|| {
            for write in writes {
                apply_write(&conn, kind, write, now)?;
            }
            Ok::<_, StoreError>(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", []).map_err(StoreError::query)?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    async fn get_entity(
        &self,
        kind: EntityKind,
        key: &str,
    ) -> Result<Option<LocalEntity>, StoreError> {
        let conn = self.lock()?;
        let columns = kind.columns();
        let sql = format!(
            "SELECT id, {} FROM {} WHERE {} = ?1",
            columns.join(", "),
            kind.table(),
            kind.key_column()
        );
        conn.query_row(&sql, [key], |row| {
            let mut values = BTreeMap::new();
            for (i, column) in columns.iter().enumerate() {
                values.insert(column.to_string(), row.get::<_, FieldValue>(i + 1)?);
            }
            Ok(LocalEntity {
                id: row.get(0)?,
                kind,
                values,
            })
        })
        .optional()
        .map_err(StoreError::query)
    }

    async fn count_entities(&self, kind: EntityKind) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", kind.table()), [], |row| {
                row.get(0)
            })
            .map_err(StoreError::query)?;
        Ok(count as u64)
    }
}

#[async_trait]
impl CredentialStore for SqliteRecordStore {
    async fn load_credentials(&self, name: &str) -> Result<Option<Credentials>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT name, client_id, client_secret, redirect_uri, access_token, refresh_token, token_expiry FROM credentials WHERE name = ?1",
            [name],
            |row| {
                let expiry: Option<i64> = row.get(6)?;
                Ok(Credentials {
                    name: row.get(0)?,
                    client_id: row.get(1)?,
                    client_secret: row.get(2)?,
                    redirect_uri: row.get(3)?,
                    access_token: row.get(4)?,
                    refresh_token: row.get(5)?,
                    token_expiry: expiry.map(timestamp_to_utc),
                })
            },
        )
        .optional()
        .map_err(StoreError::query)
    }

    async fn save_credentials(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO credentials (name, client_id, client_secret, redirect_uri, access_token, refresh_token, token_expiry, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(name) DO UPDATE SET
                client_id = excluded.client_id,
                client_secret = excluded.client_secret,
                redirect_uri = excluded.redirect_uri,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_expiry = excluded.token_expiry,
                updated_at = excluded.updated_at
            "#,
            rusqlite::params![
                &credentials.name,
                &credentials.client_id,
                &credentials.client_secret,
                &credentials.redirect_uri,
                &credentials.access_token,
                &credentials.refresh_token,
                credentials.token_expiry.map(|dt| dt.timestamp()),
                Utc::now().timestamp(),
            ],
        )
        .map_err(StoreError::query)?;
        Ok(())
    }
}

#[async_trait]
impl OperationLog for SqliteRecordStore {
    async fn append_log(&self, entry: &LogEntry) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO operation_log (config_ref, table_name, record_count, status, error_message, timestamp, initiated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                &entry.config_ref,
                &entry.table_name,
                entry.record_count as i64,
                entry.status.as_str(),
                &entry.error_message,
                entry.timestamp.timestamp(),
                entry.initiated_at.timestamp(),
            ],
        )
        .map_err(StoreError::query)?;
        Ok(conn.last_insert_rowid())
    }

    async fn recent_logs(
        &self,
        config_ref: &str,
        limit: u32,
        failures_only: bool,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let conn = self.lock()?;
        let sql = if failures_only {
            "SELECT config_ref, table_name, record_count, status, error_message, timestamp, initiated_at FROM operation_log WHERE config_ref = ?1 AND status = 'failure' ORDER BY id DESC LIMIT ?2"
        } else {
            "SELECT config_ref, table_name, record_count, status, error_message, timestamp, initiated_at FROM operation_log WHERE config_ref = ?1 ORDER BY id DESC LIMIT ?2"
        };
        let mut stmt = conn.prepare_cached(sql).map_err(StoreError::query)?;
        let entries = stmt
            .query_map(rusqlite::params![config_ref, limit as i64], |row| {
                let status: String = row.get(3)?;
                let record_count: i64 = row.get(2)?;
                Ok(LogEntry {
                    config_ref: row.get(0)?,
                    table_name: row.get(1)?,
                    record_count: record_count as u64,
                    status: RunStatus::from_str(&status).unwrap_or(RunStatus::Failure),
                    error_message: row.get(4)?,
                    timestamp: timestamp_to_utc(row.get(5)?),
                    initiated_at: timestamp_to_utc(row.get(6)?),
                })
            })
            .map_err(StoreError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query)?;
        Ok(entries)
    }
}
