//! Judge dispatch core
//!
//! Long-lived worker connections, the connection lifecycle, the admission
//! queue, the two dispatch policies and verdict aggregation.

pub mod connection;
pub mod dispatcher;
pub mod partition;
pub mod protocol;
pub mod registry;
pub mod transcript;
pub mod transport;

pub use connection::{JudgeEvent, WorkerConnection};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use registry::ServerRegistry;
pub use transcript::{Transcript, TranscriptStore};

use rand::distr::Alphanumeric;
use rand::Rng;

use crate::constants::{JUDGE_QUEUE_PREFIX, RUN_ID_LENGTH};

/// Judge dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    // Transport / lifecycle
    #[error("failed to connect to judge server: {0}")]
    Connection(String),

    #[error("connection is not receiving")]
    NotReceiving,

    #[error("already connected to judge server {0}")]
    AlreadyConnected(String),

    #[error("judge server {0} not found")]
    ServerNotFound(String),

    #[error("connection is closed")]
    Closed,

    // Protocol
    #[error("judge server is busy")]
    ServerBusy,

    #[error("session initialisation failed: {0}")]
    Init(String),

    #[error("code write failed: {0}")]
    CodeWrite(String),

    #[error("testcase write failed: {0}")]
    TestcaseWrite(String),

    #[error("judger write failed: {0}")]
    JudgerWrite(String),

    #[error("testcase index mismatch: sent {sent}, acknowledged {acked}")]
    TestcaseMismatch { sent: u32, acked: u32 },

    // Persistence
    #[error("servers registry error: {0}")]
    Registry(String),

    #[error("transcript store error: {0}")]
    Transcript(String),
}

/// Queue name of one judge run: `judge::<submission_id>:<run_id>`
pub fn run_queue_name(submission_id: &str, run_id: &str) -> String {
    format!("{JUDGE_QUEUE_PREFIX}{submission_id}:{run_id}")
}

/// Split a run queue name back into `(submission_id, run_id)`
pub fn parse_run_queue(name: &str) -> Option<(&str, &str)> {
    name.strip_prefix(JUDGE_QUEUE_PREFIX)?.split_once(':')
}

/// Fresh short run id
pub fn new_run_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(RUN_ID_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_queue_names_round_trip() {
        let name = run_queue_name("s1", "r1");
        assert_eq!(name, "judge::s1:r1");
        assert_eq!(parse_run_queue(&name), Some(("s1", "r1")));
        assert_eq!(parse_run_queue("other::s1:r1"), None);
        assert_eq!(parse_run_queue("judge::no-run-id"), None);
    }

    #[test]
    fn run_ids_have_the_declared_length() {
        let id = new_run_id();
        assert_eq!(id.len(), crate::constants::RUN_ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
