// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persisted sync preferences (traversal bounds, endpoint, timeouts).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Config key under which [`SyncPrefs`] are stored.
pub const SYNC_PREFS_KEY: &str = "sync";

/// Tunables for talking to the render engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPrefs {
    /// Deepest traversal level (top level is 1).
    pub max_depth: u32,
    /// Pause between top-level subtree expansions, in milliseconds.
    pub sibling_delay_ms: u64,
    /// Per-call transport timeout, in milliseconds.
    pub call_timeout_ms: Option<u64>,
    /// Endpoint of the engine bridge (Unix socket path).
    pub endpoint: String,
}

impl Default for SyncPrefs {
    fn default() -> Self {
        Self {
            max_depth: 5,
            sibling_delay_ms: 25,
            call_timeout_ms: None,
            endpoint: String::new(),
        }
    }
}

impl SyncPrefs {
    /// Clamp values into their usable range.
    pub fn sanitized(mut self) -> Self {
        self.max_depth = self.max_depth.max(1);
        self
    }

    /// Sibling delay as a `Duration`.
    pub fn sibling_delay(&self) -> Duration {
        Duration::from_millis(self.sibling_delay_ms)
    }

    /// Call timeout as a `Duration`.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}
