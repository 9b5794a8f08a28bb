//! Domain models

pub mod declare;
pub mod problem;
pub mod server;
pub mod submission;
pub mod user;

pub use declare::{CompilerDecl, Declarations, LanguageDecl};
pub use problem::{JudgeMode, Limit, Problem, TestType};
pub use server::{ServerDescriptor, ServerStatus, WorkerState};
pub use submission::{CompilerRef, LangRef, StatusCode, Submission, SubmissionResult};
pub use user::{Role, User};
