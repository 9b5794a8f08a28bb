//! Application-wide constants
//!
//! This module contains all constant values used throughout the application.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// SERVER DEFAULTS
// =============================================================================

/// Default server host address
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port
pub const DEFAULT_SERVER_PORT: u16 = 8080;

// =============================================================================
// DISPATCHER DEFAULTS
// =============================================================================

/// Default dispatch policy (0 = one submission per server)
pub const DEFAULT_JUDGE_MODE: u8 = 0;

/// Default delay between reconnect attempts, in seconds
pub const DEFAULT_RECONNECT_TIMEOUT_SECS: u64 = 5;

/// Default budget for a single protocol receive, in seconds
pub const DEFAULT_RECV_TIMEOUT_SECS: u64 = 5;

/// Default cap on reconnect attempts per worker
pub const DEFAULT_MAX_RETRY: u32 = 5;

/// Default interval between worker heartbeat pings, in seconds
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 5;

/// Scheduler idle poll interval, in seconds
pub const SCHEDULER_POLL_SECS: u64 = 1;

/// Poll interval while the scheduler waits for the first connection, in seconds
pub const CONNECTION_WAIT_POLL_SECS: u64 = 1;

/// Consecutive heartbeat failures tolerated before a connection is closed
pub const HEARTBEAT_MISS_LIMIT: u32 = 2;

/// Capacity of each demultiplexed inbound frame channel
pub const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Entries kept in a connection's debug trace ring
pub const DEBUG_TRACE_CAPACITY: usize = 256;

// =============================================================================
// QUEUE FABRIC
// =============================================================================

/// Prefix for per-run message queues (`judge::<submission_id>:<run_id>`)
pub const JUDGE_QUEUE_PREFIX: &str = "judge::";

/// Length of the random run-id suffix appended to a queue name
pub const RUN_ID_LENGTH: usize = 8;

// =============================================================================
// WIRE PROTOCOL TAGS
// =============================================================================

/// Frame tags used on the judge-worker wire and on run queues
pub mod tags {
    pub const STATUS: &str = "status";
    pub const JUDGE_PREFIX: &str = "judge.";

    pub const WAITING: &str = "waiting";
    pub const CATCHED: &str = "catched";
    pub const INITTING: &str = "initting";
    pub const JUDGING: &str = "judging";
    pub const COMPILER: &str = "compiler";
    pub const RESULT: &str = "result";
    pub const OVERALL: &str = "overall";
    pub const DEBUG: &str = "debug";
    pub const ERROR: &str = "error";
    pub const ABORT: &str = "abort";
    pub const CLOSED: &str = "closed";
}

// =============================================================================
// GATEWAY CLOSE REASONS
// =============================================================================

/// Close reasons sent to subscriber-gateway downstreams
pub mod close_reasons {
    pub const DONE: &str = "done";
    pub const ABORTED: &str = "aborted";
    pub const EOF_CACHE: &str = "eof cache";
    pub const INTERNAL_ERROR: &str = "internal error";
    pub const QUEUE_NOT_FOUND: &str = "can not find judge queue";
    pub const INVALID_ID: &str = "invalid id";
}

// =============================================================================
// STORAGE DEFAULTS
// =============================================================================

/// Default root for persisted state
pub const DEFAULT_DATA_PATH: &str = "data";

/// File holding the ordered judge-server map, relative to the data root
pub const SERVERS_FILE: &str = "servers.json";

/// Directory of per-submission state, relative to the data root
pub const SUBMISSIONS_DIR: &str = "submissions";

/// Directory of per-problem state, relative to the data root
pub const PROBLEMS_DIR: &str = "problems";

/// Directory holding the language/compiler declaration documents
pub const DECLARE_DIR: &str = "declare";

/// Subdirectory of a submission holding run transcripts
pub const LOGS_DIR: &str = "logs";

/// Subdirectory of a problem holding testcases
pub const TESTCASES_DIR: &str = "testcases";

// =============================================================================
// VALIDATION
// =============================================================================

/// Maximum source code size in bytes (1 MB)
pub const MAX_SOURCE_CODE_SIZE: usize = 1024 * 1024;

/// Maximum judge-server name length
pub const MAX_SERVER_NAME_LENGTH: u64 = 64;

/// Maximum judge-server URI length
pub const MAX_SERVER_URI_LENGTH: u64 = 512;
