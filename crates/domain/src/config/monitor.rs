use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval for the periodic policy sweep, in seconds. `0` disables
    /// the sweep entirely (the built-in policy never uses it).
    #[serde(default)]
    pub check_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 0,
        }
    }
}
