use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use taskd_core::*;

/// Default number of connections in the pool.
/// SQLite WAL mode supports 1 writer + N readers, so even a small pool
/// eliminates head-of-line blocking for concurrent read queries.
const DEFAULT_POOL_SIZE: usize = 4;

const TODO_COLUMNS: &str = "id, title, description, completed, priority, due_date, color, starred, created_at, updated_at";

/// Sequence for naming shared-cache in-memory databases; each open gets a
/// distinct URI so test stores never alias each other.
static MEM_DB_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct SqliteTodoStore {
    /// Connection pool, round-robin across `DEFAULT_POOL_SIZE` connections.
    /// Each connection is independently protected by a Mutex so callers can
    /// run synchronous rusqlite operations without holding an async lock.
    pool: Vec<Mutex<Connection>>,
    next_slot: AtomicUsize,
}

impl SqliteTodoStore {
    /// Execute a synchronous closure with a pooled database connection.
    ///
    /// Picks the next connection via round-robin, locks it, runs the
    /// closure, then releases. Because the closure is `FnOnce` (not async),
    /// the `MutexGuard` is guaranteed to drop before any `.await`.
    fn with_conn<F, T>(&self, f: F) -> TdResult<T>
    where
        F: FnOnce(&Connection) -> TdResult<T>,
    {
        let idx = self.next_slot.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        let conn = self.pool[idx]
            .lock()
            .map_err(|e| TdError::Storage(e.to_string()))?;
        f(&conn)
    }

    fn open_connection(path: &Path) -> TdResult<Connection> {
        let conn = Connection::open(path)
            .map_err(|e| TdError::Storage(format!("failed to open sqlite: {e}")))?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
        )
        .map_err(|e| TdError::Storage(format!("pragma error: {e}")))?;

        Ok(conn)
    }

    pub fn open(path: &Path) -> TdResult<Self> {
        let mut pool = Vec::with_capacity(DEFAULT_POOL_SIZE);
        for _ in 0..DEFAULT_POOL_SIZE {
            pool.push(Mutex::new(Self::open_connection(path)?));
        }

        let store = Self {
            pool,
            next_slot: AtomicUsize::new(0),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn open_in_memory() -> TdResult<Self> {
        // In-memory DBs: use a shared cache URI so all pool connections see
        // the same data. Without this, each Connection::open_in_memory()
        // gets its own isolated database.
        //
        // SQLITE_OPEN_URI is required for rusqlite to parse the URI; the
        // default OpenFlags do NOT include it.
        let uri = format!(
            "file:memdb-{}-{}?mode=memory&cache=shared",
            std::process::id(),
            MEM_DB_SEQ.fetch_add(1, Ordering::Relaxed),
        );
        let flags = rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
            | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
            | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX
            | rusqlite::OpenFlags::SQLITE_OPEN_URI;
        let mut pool = Vec::with_capacity(DEFAULT_POOL_SIZE);
        for _ in 0..DEFAULT_POOL_SIZE {
            let conn = Connection::open_with_flags(&uri, flags)
                .map_err(|e| TdError::Storage(format!("failed to open in-memory sqlite: {e}")))?;
            conn.execute_batch("PRAGMA foreign_keys=ON;")
                .map_err(|e| TdError::Storage(format!("pragma error: {e}")))?;
            pool.push(Mutex::new(conn));
        }

        let store = Self {
            pool,
            next_slot: AtomicUsize::new(0),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> TdResult<()> {
        // Migrations run on slot 0 only, they need exclusive access.
        let conn = self.pool[0]
            .lock()
            .map_err(|e| TdError::Storage(e.to_string()))?;

        // Table-driven migration registry.
        const MIGRATIONS: &[(i64, &str)] = &[(
            1,
            include_str!("../../../migrations/001_initial.sql"),
        )];

        // Migration 001 must always run first to create the schema_version
        // table. After that, check which versions are already applied.
        conn.execute_batch(MIGRATIONS[0].1)
            .map_err(|e| TdError::Migration(format!("migration 001 failed: {e}")))?;

        let max_version: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for &(version, sql) in &MIGRATIONS[1..] {
            if version <= max_version {
                continue;
            }
            conn.execute_batch(sql)
                .map_err(|e| TdError::Migration(format!("migration {version:03} failed: {e}")))?;
        }

        tracing::debug!(
            applied_up_to = MIGRATIONS.last().map(|(v, _)| *v).unwrap_or(0),
            "migrations complete"
        );

        Ok(())
    }

    fn as_sql_conversion_error(column: usize, message: impl Into<String>) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                message.into(),
            )),
        )
    }

    fn parse_dt(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Self::as_sql_conversion_error(column, format!("bad timestamp: {e}")))
    }

    fn parse_optional_dt(
        column: usize,
        value: Option<String>,
    ) -> rusqlite::Result<Option<DateTime<Utc>>> {
        value.map(|v| Self::parse_dt(column, &v)).transpose()
    }

    fn row_to_todo(row: &rusqlite::Row<'_>) -> rusqlite::Result<Todo> {
        let id: TodoId = row.get(0)?;
        let title: String = row.get(1)?;
        let description: Option<String> = row.get(2)?;
        let completed: bool = row.get(3)?;
        let priority_str: String = row.get(4)?;
        let due_date: Option<String> = row.get(5)?;
        let color: Option<String> = row.get(6)?;
        let starred: bool = row.get(7)?;
        let created_at: String = row.get(8)?;
        let updated_at: String = row.get(9)?;

        Ok(Todo {
            id,
            title,
            description,
            completed,
            priority: priority_str
                .parse()
                .map_err(|err: String| Self::as_sql_conversion_error(4, err))?,
            due_date: Self::parse_optional_dt(5, due_date)?,
            tags: Vec::new(), // loaded separately
            color,
            starred,
            created_at: Self::parse_dt(8, &created_at)?,
            updated_at: Self::parse_dt(9, &updated_at)?,
        })
    }

    fn load_tags(conn: &Connection, todo_id: TodoId) -> TdResult<Vec<String>> {
        let mut stmt = conn
            .prepare("SELECT tag FROM todo_tags WHERE todo_id = ?1 ORDER BY tag")
            .map_err(|e| TdError::Storage(e.to_string()))?;

        let mut tags = Vec::new();
        let rows = stmt
            .query_map(params![todo_id], |row| row.get(0))
            .map_err(|e| TdError::Storage(e.to_string()))?;

        for row in rows {
            tags.push(row.map_err(|e| TdError::Storage(e.to_string()))?);
        }

        Ok(tags)
    }

    fn save_tags(conn: &Connection, todo_id: TodoId, tags: &[String]) -> TdResult<()> {
        conn.execute("DELETE FROM todo_tags WHERE todo_id = ?1", params![todo_id])
            .map_err(|e| TdError::Storage(e.to_string()))?;
        let mut stmt = conn
            .prepare("INSERT OR IGNORE INTO todo_tags (todo_id, tag) VALUES (?1, ?2)")
            .map_err(|e| TdError::Storage(e.to_string()))?;
        for tag in tags {
            stmt.execute(params![todo_id, tag])
                .map_err(|e| TdError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    /// Run a SELECT over the todo columns and load each row's tags.
    fn query_todos(
        conn: &Connection,
        sql: &str,
        query_params: &[&dyn rusqlite::types::ToSql],
    ) -> TdResult<Vec<Todo>> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| TdError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(query_params, Self::row_to_todo)
            .map_err(|e| TdError::Storage(e.to_string()))?;

        let mut todos = Vec::new();
        for row in rows {
            let mut todo = row.map_err(|e| TdError::Storage(e.to_string()))?;
            todo.tags = Self::load_tags(conn, todo.id)?;
            todos.push(todo);
        }

        Ok(todos)
    }
}

#[async_trait]
impl TodoStore for SqliteTodoStore {
    async fn insert(&self, todo: &Todo) -> TdResult<TodoId> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO todos (title, description, completed, priority, due_date, color, starred, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    todo.title,
                    todo.description,
                    todo.completed,
                    todo.priority.as_str(),
                    todo.due_date.map(|dt| dt.to_rfc3339()),
                    todo.color,
                    todo.starred,
                    todo.created_at.to_rfc3339(),
                    todo.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| TdError::Storage(format!("insert failed: {e}")))?;

            let id = conn.last_insert_rowid();
            Self::save_tags(conn, id, &todo.tags)?;
            Ok(id)
        })
    }

    async fn get(&self, id: TodoId) -> TdResult<Option<Todo>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1"))
                .map_err(|e| TdError::Storage(e.to_string()))?;

            let todo = stmt
                .query_row(params![id], Self::row_to_todo)
                .optional()
                .map_err(|e| TdError::Storage(e.to_string()))?;

            if let Some(mut todo) = todo {
                todo.tags = Self::load_tags(conn, todo.id)?;
                Ok(Some(todo))
            } else {
                Ok(None)
            }
        })
    }

    async fn update(&self, todo: &Todo) -> TdResult<()> {
        self.with_conn(|conn| {
            // created_at is immutable and stays out of the SET list.
            let rows = conn
                .execute(
                    "UPDATE todos SET title = ?2, description = ?3, completed = ?4, priority = ?5,
                     due_date = ?6, color = ?7, starred = ?8, updated_at = ?9
                     WHERE id = ?1",
                    params![
                        todo.id,
                        todo.title,
                        todo.description,
                        todo.completed,
                        todo.priority.as_str(),
                        todo.due_date.map(|dt| dt.to_rfc3339()),
                        todo.color,
                        todo.starred,
                        todo.updated_at.to_rfc3339(),
                    ],
                )
                .map_err(|e| TdError::Storage(format!("update failed: {e}")))?;

            if rows == 0 {
                return Err(TdError::TodoNotFound(todo.id));
            }

            Self::save_tags(conn, todo.id, &todo.tags)?;
            Ok(())
        })
    }

    async fn delete(&self, id: TodoId) -> TdResult<bool> {
        self.with_conn(|conn| {
            // Tag rows go with the record via ON DELETE CASCADE.
            let rows = conn
                .execute("DELETE FROM todos WHERE id = ?1", params![id])
                .map_err(|e| TdError::Storage(format!("delete failed: {e}")))?;
            Ok(rows > 0)
        })
    }

    async fn list(&self) -> TdResult<Vec<Todo>> {
        self.with_conn(|conn| {
            Self::query_todos(conn, &format!("SELECT {TODO_COLUMNS} FROM todos"), &[])
        })
    }

    async fn list_by_priority_rank(&self) -> TdResult<Vec<Todo>> {
        self.with_conn(|conn| {
            // Unknown priority values rank last; tie-break within a rank is
            // newest first.
            Self::query_todos(
                conn,
                &format!(
                    "SELECT {TODO_COLUMNS} FROM todos ORDER BY
                     CASE priority WHEN 'HIGH' THEN 1 WHEN 'MEDIUM' THEN 2 WHEN 'LOW' THEN 3 ELSE 4 END,
                     created_at DESC"
                ),
                &[],
            )
        })
    }

    async fn count(&self) -> TdResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM todos", [], |row| row.get(0))
                .map_err(|e| TdError::Storage(e.to_string()))?;
            Ok(count as usize)
        })
    }

    async fn by_completed(&self, completed: bool) -> TdResult<Vec<Todo>> {
        self.with_conn(|conn| {
            Self::query_todos(
                conn,
                &format!("SELECT {TODO_COLUMNS} FROM todos WHERE completed = ?1"),
                &[&completed],
            )
        })
    }

    async fn by_priority(&self, priority: &str) -> TdResult<Vec<Todo>> {
        self.with_conn(|conn| {
            Self::query_todos(
                conn,
                &format!("SELECT {TODO_COLUMNS} FROM todos WHERE priority = ?1"),
                &[&priority],
            )
        })
    }

    async fn by_starred(&self, starred: bool) -> TdResult<Vec<Todo>> {
        self.with_conn(|conn| {
            Self::query_todos(
                conn,
                &format!("SELECT {TODO_COLUMNS} FROM todos WHERE starred = ?1"),
                &[&starred],
            )
        })
    }

    async fn by_tag(&self, tag: &str) -> TdResult<Vec<Todo>> {
        self.with_conn(|conn| {
            Self::query_todos(
                conn,
                &format!(
                    "SELECT {TODO_COLUMNS} FROM todos WHERE EXISTS
                     (SELECT 1 FROM todo_tags tt WHERE tt.todo_id = todos.id AND tt.tag = ?1)"
                ),
                &[&tag],
            )
        })
    }

    async fn search(&self, keyword: &str) -> TdResult<Vec<Todo>> {
        self.with_conn(|conn| {
            // instr() is a plain byte-substring match; LIKE folds ASCII case.
            Self::query_todos(
                conn,
                &format!(
                    "SELECT {TODO_COLUMNS} FROM todos
                     WHERE instr(title, ?1) > 0 OR instr(COALESCE(description, ''), ?1) > 0"
                ),
                &[&keyword],
            )
        })
    }

    async fn due_before(&self, bound: DateTime<Utc>) -> TdResult<Vec<Todo>> {
        self.with_conn(|conn| {
            Self::query_todos(
                conn,
                &format!("SELECT {TODO_COLUMNS} FROM todos WHERE due_date < ?1"),
                &[&bound.to_rfc3339()],
            )
        })
    }

    async fn due_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> TdResult<Vec<Todo>> {
        self.with_conn(|conn| {
            Self::query_todos(
                conn,
                &format!(
                    "SELECT {TODO_COLUMNS} FROM todos WHERE due_date >= ?1 AND due_date <= ?2"
                ),
                &[&start.to_rfc3339(), &end.to_rfc3339()],
            )
        })
    }

    async fn overdue(&self, now: DateTime<Utc>) -> TdResult<Vec<Todo>> {
        self.with_conn(|conn| {
            Self::query_todos(
                conn,
                &format!(
                    "SELECT {TODO_COLUMNS} FROM todos
                     WHERE completed = 0 AND due_date < ?1 ORDER BY due_date ASC"
                ),
                &[&now.to_rfc3339()],
            )
        })
    }

    async fn distinct_tags(&self) -> TdResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT DISTINCT tag FROM todo_tags ORDER BY tag")
                .map_err(|e| TdError::Storage(e.to_string()))?;

            let mut tags = Vec::new();
            let rows = stmt
                .query_map([], |row| row.get(0))
                .map_err(|e| TdError::Storage(e.to_string()))?;

            for row in rows {
                tags.push(row.map_err(|e| TdError::Storage(e.to_string()))?);
            }

            Ok(tags)
        })
    }
}
