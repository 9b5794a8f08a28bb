//! Judge-server metadata and status types

use serde::{Deserialize, Serialize};

/// Persisted judge-worker endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub id: String,
    pub name: String,
    pub uri: String,
}

impl ServerDescriptor {
    /// The URI the worker session is opened against
    pub fn session_uri(&self) -> String {
        if self.uri.ends_with("/session") {
            self.uri.clone()
        } else {
            format!("{}/session", self.uri.trim_end_matches('/'))
        }
    }
}

/// Lifecycle state of one worker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Busy,
    Paused,
    Closed,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Paused => "paused",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of one pool entry, as reported by the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub id: String,
    pub name: String,
    pub status: WorkerState,
}
