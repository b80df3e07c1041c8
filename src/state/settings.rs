/// Watcher settings
///
/// This struct stores the pacing and comparison knobs of the watcher.
/// It is serialized to JSON and stored in the catalog database,
/// so changes made from the command line are picked up by a running
/// sweep on its next iteration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// All tunable settings of the watcher
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    // ========== Sweep ==========

    /// Run the automatic sweep at all
    /// - false = the worker idles and polls this flag every `poll_secs`
    pub automated_checks: bool,

    /// Pause after a complete sweep, in seconds
    pub cooldown_secs: u64,

    /// Pause between two projects of the same sweep, in seconds
    /// - Keeps tile requests under the canvas rate limit
    pub project_delay_secs: u64,

    /// How often an idle worker re-reads `automated_checks`, in seconds
    pub poll_secs: u64,

    // ========== Fetch & compare ==========

    /// Per-request timeout for tile downloads, in seconds
    pub fetch_timeout_secs: u64,

    /// Mean squared error at or below which two snapshots count as identical
    /// - 0.0 = exact match only
    pub similarity_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            automated_checks: false,
            cooldown_secs: 300,
            project_delay_secs: 5,
            poll_secs: 5,
            fetch_timeout_secs: 10,
            similarity_threshold: 0.0,
        }
    }
}

impl Settings {
    /// Convert to JSON string for database storage
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON string (from database)
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn project_delay(&self) -> Duration {
        Duration::from_secs(self.project_delay_secs)
    }

    /// Never zero, so an idle worker cannot spin
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}
