use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::TdResult;
use crate::model::{Todo, TodoId};

/// Storage backend for todo records.
///
/// Queries returning lists come back in the store's default order unless the
/// method documents otherwise.
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// Persist a new record. The todo's own `id` is ignored; the assigned
    /// identity is returned.
    async fn insert(&self, todo: &Todo) -> TdResult<TodoId>;

    async fn get(&self, id: TodoId) -> TdResult<Option<Todo>>;

    /// Full-row replace keyed by `todo.id`. Fails with `TodoNotFound` if the
    /// id has no row.
    async fn update(&self, todo: &Todo) -> TdResult<()>;

    /// Remove a record (tag rows cascade). Returns whether a row existed.
    async fn delete(&self, id: TodoId) -> TdResult<bool>;

    async fn list(&self) -> TdResult<Vec<Todo>>;

    /// All records ordered by priority rank (HIGH, MEDIUM, LOW, then
    /// anything else), `created_at` descending within equal rank.
    async fn list_by_priority_rank(&self) -> TdResult<Vec<Todo>>;

    async fn count(&self) -> TdResult<usize>;

    async fn by_completed(&self, completed: bool) -> TdResult<Vec<Todo>>;

    /// Raw text match on the priority column; an unknown value yields an
    /// empty list rather than an error.
    async fn by_priority(&self, priority: &str) -> TdResult<Vec<Todo>>;

    async fn by_starred(&self, starred: bool) -> TdResult<Vec<Todo>>;

    /// Records whose tag set contains `tag`.
    async fn by_tag(&self, tag: &str) -> TdResult<Vec<Todo>>;

    /// Case-sensitive substring match over title or description.
    async fn search(&self, keyword: &str) -> TdResult<Vec<Todo>>;

    async fn due_before(&self, bound: DateTime<Utc>) -> TdResult<Vec<Todo>>;

    /// Due date within `[start, end]`, both ends inclusive.
    async fn due_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> TdResult<Vec<Todo>>;

    /// Incomplete records past their due date, ordered by `due_date`
    /// ascending.
    async fn overdue(&self, now: DateTime<Utc>) -> TdResult<Vec<Todo>>;

    /// Distinct tags across all records, sorted.
    async fn distinct_tags(&self) -> TdResult<Vec<String>>;
}
