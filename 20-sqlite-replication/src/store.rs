//! Local SQLite storage for a node.
//!
//! Every node owns one database file. The connection is shared by all request
//! tasks; statements run one at a time on tokio's blocking pool and there is
//! no transaction wrapping, so each statement is its own unit of work.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, params_from_iter};
use thiserror::Error;

use crate::protocol::Record;
use crate::value::Value;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage connection lock poisoned")]
    Poisoned,
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Thread-safe handle to the node's database.
///
/// `rusqlite::Connection` is `Send` but not `Sync`, so it lives behind a
/// `Mutex`. Cloning the store shares the same connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_connection(conn))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Executes a mutating statement with positional parameters and returns
    /// the number of rows it changed.
    ///
    /// Rows the statement yields (`INSERT ... RETURNING`, `PRAGMA`) are
    /// stepped through and discarded.
    pub async fn apply(&self, statement: &str, params: &[Value]) -> Result<usize, StorageError> {
        let statement = statement.to_owned();
        let params = params.to_vec();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&statement)?;
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            while rows.next()?.is_some() {}
            drop(rows);
            drop(stmt);
            Ok(usize::try_from(conn.changes()).unwrap_or(usize::MAX))
        })
        .await
    }

    /// Runs a read statement and materializes every row before returning.
    pub async fn fetch(
        &self,
        statement: &str,
        params: &[Value],
    ) -> Result<Vec<Record>, StorageError> {
        let statement = statement.to_owned();
        let params = params.to_vec();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&statement)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = Record::new();
                for (index, column) in columns.iter().enumerate() {
                    record.insert(column.clone(), Value::from(row.get_ref(index)?));
                }
                records.push(record);
            }
            Ok(records)
        })
        .await
    }

    async fn with_connection<T, F>(&self, work: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StorageError::Poisoned)?;
            work(&conn).map_err(StorageError::from)
        })
        .await?
    }
}
