use thiserror::Error;

use crate::model::TodoId;

#[derive(Error, Debug)]
pub enum TdError {
    #[error("todo not found: {0}")]
    TodoNotFound(TodoId),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type TdResult<T> = Result<T, TdError>;
