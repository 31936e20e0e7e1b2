use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};

use taskd_core::*;
use taskd_storage::SqliteTodoStore;

use crate::config::EngineConfig;

const DB_FILE: &str = "taskd.db";

/// Service layer over a [`TodoStore`]: default-value application, timestamp
/// stamping, and derived views. Stateless between calls.
pub struct TodoEngine {
    pub store: Arc<dyn TodoStore>,
    pub config: EngineConfig,
}

impl TodoEngine {
    pub fn new(store: Arc<dyn TodoStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Open (creating if needed) the SQLite store under `config.data_dir`.
    pub fn init(config: EngineConfig) -> TdResult<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| TdError::Config(format!("failed to create data dir: {e}")))?;
        let db_path = Path::new(&config.data_dir).join(DB_FILE);
        let store = SqliteTodoStore::open(&db_path)?;
        tracing::info!(db = %db_path.display(), "todo store ready");
        Ok(Self::new(Arc::new(store), config))
    }

    // -- listing & filtering ------------------------------------------------

    pub async fn list_todos(&self, sort: Option<&str>) -> TdResult<Vec<Todo>> {
        if sort == Some("priority") {
            self.store.list_by_priority_rank().await
        } else {
            self.store.list().await
        }
    }

    pub async fn todo_by_id(&self, id: TodoId) -> TdResult<Option<Todo>> {
        self.store.get(id).await
    }

    pub async fn todos_by_status(&self, completed: bool) -> TdResult<Vec<Todo>> {
        self.store.by_completed(completed).await
    }

    pub async fn todos_by_priority(&self, priority: &str) -> TdResult<Vec<Todo>> {
        self.store.by_priority(priority).await
    }

    pub async fn starred_todos(&self) -> TdResult<Vec<Todo>> {
        self.store.by_starred(true).await
    }

    pub async fn todos_by_tag(&self, tag: &str) -> TdResult<Vec<Todo>> {
        self.store.by_tag(tag).await
    }

    /// Blank keywords (absent, empty, all-whitespace) behave as an
    /// unfiltered listing.
    pub async fn search_todos(&self, keyword: Option<&str>) -> TdResult<Vec<Todo>> {
        match keyword {
            Some(kw) if !kw.trim().is_empty() => self.store.search(kw).await,
            _ => self.store.list().await,
        }
    }

    pub async fn all_tags(&self) -> TdResult<TagSet> {
        let tags = self.store.distinct_tags().await?;
        Ok(tags.into_iter().collect())
    }

    pub async fn overdue_todos(&self) -> TdResult<Vec<Todo>> {
        self.store.overdue(Utc::now()).await
    }

    /// Records due within today's local-time window. The window runs
    /// [00:00:00, 23:59:59]; the final sub-second of the day stays outside
    /// it.
    pub async fn todos_due_today(&self) -> TdResult<Vec<Todo>> {
        let (start, end) = local_day_bounds(Local::now().date_naive())?;
        self.store.due_between(start, end).await
    }

    pub async fn statistics(&self) -> TdResult<TodoStatistics> {
        let todos = self.store.list().await?;
        let overdue = self.store.overdue(Utc::now()).await?;

        let total = todos.len() as u64;
        let completed = todos.iter().filter(|t| t.completed).count() as u64;

        Ok(TodoStatistics {
            total,
            completed,
            active: total - completed,
            high_priority: todos
                .iter()
                .filter(|t| t.priority == Priority::High)
                .count() as u64,
            overdue: overdue.len() as u64,
            starred: todos.iter().filter(|t| t.starred).count() as u64,
        })
    }

    pub async fn todo_count(&self) -> TdResult<usize> {
        self.store.count().await
    }

    // -- mutations ----------------------------------------------------------

    pub async fn create_todo(&self, draft: TodoDraft) -> TdResult<Todo> {
        let now = Utc::now();
        let mut todo = todo_from_draft(draft, 0, now, now);
        todo.id = self.store.insert(&todo).await?;
        tracing::debug!(id = todo.id, "created todo");
        Ok(todo)
    }

    /// Full field replacement except `id` and `created_at`; absent draft
    /// fields fall back to null/default rather than keeping old values.
    pub async fn update_todo(&self, id: TodoId, draft: TodoDraft) -> TdResult<Todo> {
        let existing = self
            .store
            .get(id)
            .await?
            .ok_or(TdError::TodoNotFound(id))?;

        let todo = todo_from_draft(draft, id, existing.created_at, Utc::now());
        self.store.update(&todo).await?;
        Ok(todo)
    }

    pub async fn toggle_starred(&self, id: TodoId) -> TdResult<Todo> {
        let mut todo = self
            .store
            .get(id)
            .await?
            .ok_or(TdError::TodoNotFound(id))?;

        todo.starred = !todo.starred;
        todo.updated_at = Utc::now();
        self.store.update(&todo).await?;
        Ok(todo)
    }

    pub async fn delete_todo(&self, id: TodoId) -> TdResult<()> {
        if !self.store.delete(id).await? {
            return Err(TdError::TodoNotFound(id));
        }
        tracing::debug!(id, "deleted todo");
        Ok(())
    }
}

/// Pre-save normalization: defaults for absent fields, tag set semantics,
/// timestamp stamping. `created_at` is supplied by the caller (creation
/// instant for new records, the existing value for replacements).
fn todo_from_draft(
    draft: TodoDraft,
    id: TodoId,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Todo {
    Todo {
        id,
        title: draft.title,
        description: draft.description,
        completed: draft.completed.unwrap_or(false),
        priority: draft.priority.unwrap_or_default(),
        due_date: draft.due_date,
        tags: normalize_tags(draft.tags),
        color: draft.color,
        starred: draft.starred.unwrap_or(false),
        created_at,
        updated_at: now,
    }
}

fn normalize_tags(tags: Option<Vec<String>>) -> Vec<String> {
    let mut tags = tags.unwrap_or_default();
    tags.sort();
    tags.dedup();
    tags
}

fn local_day_bounds(day: NaiveDate) -> TdResult<(DateTime<Utc>, DateTime<Utc>)> {
    let start = day
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(Local).earliest())
        .ok_or_else(|| TdError::Internal("no valid start of day".into()))?;
    let end = day
        .and_hms_opt(23, 59, 59)
        .and_then(|dt| dt.and_local_timezone(Local).latest())
        .ok_or_else(|| TdError::Internal("no valid end of day".into()))?;
    Ok((start.with_timezone(&Utc), end.with_timezone(&Utc)))
}
