use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding persisted monitor state (`segments.json`).
    #[serde(default = "d_state_dir")]
    pub state_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_dir: d_state_dir(),
        }
    }
}

fn d_state_dir() -> String {
    "./data".into()
}
