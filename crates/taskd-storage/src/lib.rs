pub mod sqlite;

pub use sqlite::SqliteTodoStore;
