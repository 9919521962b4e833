//! Cassette data structures for recorded port traffic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One call made through a port during a recorded run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    /// Position in the cassette, assigned by the recorder.
    pub seq: u64,
    /// Port name (`llm` or `images`).
    pub port: String,
    /// Method invoked on the port.
    pub method: String,
    /// Call arguments.
    pub input: serde_json::Value,
    /// Returned value, `{"ok": ..}` / `{"err": ..}` for fallible calls.
    pub output: serde_json::Value,
}

/// A named, ordered list of interactions for one port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cassette {
    /// Human-readable name, `<timestamp>-<port>` for recorded sessions.
    pub name: String,
    /// When recording finished.
    pub recorded_at: DateTime<Utc>,
    /// Model identifier in use while recording.
    #[serde(default)]
    pub model: String,
    /// Interactions in call order.
    pub interactions: Vec<Interaction>,
}

impl Cassette {
    /// Number of interactions recorded for `port`.
    #[must_use]
    pub fn count(&self, port: &str) -> usize {
        self.interactions.iter().filter(|i| i.port == port).count()
    }
}
