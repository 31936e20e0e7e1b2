use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the SQLite database file.
    pub data_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
        }
    }
}
