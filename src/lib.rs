//! JudgeHub - Online Judge Control Plane
//!
//! This library provides the core functionality of the JudgeHub platform:
//! it admits code submissions, dispatches them to a pool of remote
//! sandboxed judge workers over persistent streaming sessions, aggregates
//! per-testcase verdicts and persists one final result per run.
//!
//! # Architecture
//!
//! The application follows a layered architecture:
//! - **Gateway**: HTTP/WebSocket surface (thin layer)
//! - **Judge**: worker connections, dispatch policies, aggregation
//! - **Queue fabric**: durable per-run message queues with subscribers
//! - **Stores**: problem/submission/user/role persistence behind traits
//! - **Models**: domain models and wire DTOs

pub mod config;
pub mod constants;
pub mod error;
pub mod gateway;
pub mod judge;
pub mod models;
pub mod queue;
pub mod state;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
