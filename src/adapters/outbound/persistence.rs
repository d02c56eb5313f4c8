use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{Context as AnyhowContext, Result, anyhow};
use async_trait::async_trait;
use rusqlite::{Connection, params};

use crate::core::{
    domain::{EvaluationRow, RatedResponse},
    error::Error as CoreError,
    ports::ResultStore,
};

/// Where the evaluation database lives, parsed from the connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

impl DatabaseLocation {
    /// Accepts `sqlite://<path>`, `sqlite::memory:`, `:memory:` or a bare path.
    /// Any other `scheme://` URL is rejected.
    pub fn parse(connection_string: &str) -> Result<Self> {
        let raw = connection_string.trim();
        if raw.is_empty() {
            return Err(anyhow!("Database connection string may not be empty"));
        }
        if matches!(raw, ":memory:" | "sqlite::memory:" | "sqlite://:memory:") {
            return Ok(DatabaseLocation::Memory);
        }
        if let Some((scheme, _)) = raw.split_once("://")
            && !scheme.eq_ignore_ascii_case("sqlite")
        {
            return Err(anyhow!(
                "Unsupported database scheme '{scheme}': only sqlite:// connection strings or file paths are accepted"
            ));
        }
        let path = raw
            .strip_prefix("sqlite://")
            .or_else(|| raw.strip_prefix("sqlite:"))
            .unwrap_or(raw);
        if path.is_empty() {
            return Err(anyhow!(
                "Database connection string '{raw}' does not name a file"
            ));
        }
        Ok(DatabaseLocation::File(PathBuf::from(path)))
    }

    pub fn describe(&self) -> String {
        match self {
            DatabaseLocation::File(path) => path.display().to_string(),
            DatabaseLocation::Memory => ":memory:".to_string(),
        }
    }
}

/// SQLite-backed store for evaluation rows.
///
/// One connection is opened at startup and shared by every operation for the
/// life of the process.
#[derive(Clone)]
pub struct SqliteResultStore {
    conn: Arc<Mutex<Connection>>,
    location: DatabaseLocation,
}

impl SqliteResultStore {
    pub fn open(connection_string: &str) -> Result<Self> {
        let location = DatabaseLocation::parse(connection_string)?;
        let conn = match &location {
            DatabaseLocation::Memory => {
                Connection::open_in_memory().context("Failed to open in-memory database")?
            }
            DatabaseLocation::File(path) => {
                ensure_parent_dir(path)?;
                Connection::open(path).with_context(|| {
                    format!("Failed to open evaluation database {}", path.display())
                })?
            }
        };
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    pub fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS llm_evaluations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prompt TEXT NOT NULL CHECK (length(prompt) > 0),
                model_name TEXT NOT NULL,
                response TEXT NOT NULL,
                rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );
            "#,
        )
        .context("Failed to create llm_evaluations table")?;
        Ok(())
    }

    /// Insert all rows or none of them.
    pub fn insert_batch(&self, prompt: &str, rows: &[RatedResponse]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO llm_evaluations (prompt, model_name, response, rating)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )?;
            for (index, row) in rows.iter().enumerate() {
                stmt.execute(params![
                    prompt,
                    row.model_name,
                    row.response,
                    row.rating.value()
                ])
                .with_context(|| {
                    format!("Failed to insert evaluation {index} ({})", row.model_name)
                })?;
            }
        }
        // Dropping `tx` on any error above rolls the whole batch back.
        tx.commit().context("Failed to commit evaluation batch")?;
        Ok(rows.len())
    }

    pub fn fetch_all(&self) -> Result<Vec<EvaluationRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, prompt, model_name, response, rating, created_at
            FROM llm_evaluations
            ORDER BY created_at DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EvaluationRow {
                id: row.get(0)?,
                prompt: row.get(1)?,
                model_name: row.get(2)?,
                response: row.get(3)?,
                rating: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Evaluation database connection lock poisoned"))
    }
}

impl std::fmt::Debug for SqliteResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteResultStore")
            .field("location", &self.location)
            .finish()
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory {}", parent.display())
        })?;
    }
    Ok(())
}

fn persistence_error(err: anyhow::Error) -> CoreError {
    CoreError::Persistence(format!("{err:#}"))
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn ensure_schema(&self) -> crate::core::Result<()> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.init_schema().map_err(persistence_error))
            .await
            .map_err(|e| CoreError::System(format!("Join error: {e}")))?
    }

    async fn save_batch(&self, prompt: &str, rows: &[RatedResponse]) -> crate::core::Result<usize> {
        let store = self.clone();
        let prompt = prompt.to_string();
        let rows = rows.to_vec();
        tokio::task::spawn_blocking(move || {
            store
                .insert_batch(&prompt, &rows)
                .map_err(persistence_error)
        })
        .await
        .map_err(|e| CoreError::System(format!("Join error: {e}")))?
    }

    async fn list_all(&self) -> crate::core::Result<Vec<EvaluationRow>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.fetch_all().map_err(persistence_error))
            .await
            .map_err(|e| CoreError::System(format!("Join error: {e}")))?
    }
}
