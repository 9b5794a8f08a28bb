//! Submission model and verdict types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-testcase and overall verdict codes.
///
/// The numeric order doubles as a severity order: worse outcomes compare
/// greater, which is what the dispatcher relies on when it aggregates the
/// overall verdicts of a split run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum StatusCode {
    Accepted = 0,
    WrongAnswer = 1,
    TimeLimitExceeded = 2,
    MemoryLimitExceeded = 3,
    RuntimeError = 4,
    CompileError = 5,
    CompileWarn = 6,
    SystemError = 7,
    Aborted = 8,
}

impl StatusCode {
    /// Get the verdict as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::WrongAnswer => "wrong_answer",
            Self::TimeLimitExceeded => "time_limit_exceeded",
            Self::MemoryLimitExceeded => "memory_limit_exceeded",
            Self::RuntimeError => "runtime_error",
            Self::CompileError => "compile_error",
            Self::CompileWarn => "compile_warn",
            Self::SystemError => "system_error",
            Self::Aborted => "aborted",
        }
    }

    /// Check if this verdict means the solution passed
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted | Self::CompileWarn)
    }
}

impl From<StatusCode> for u8 {
    fn from(code: StatusCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Accepted),
            1 => Ok(Self::WrongAnswer),
            2 => Ok(Self::TimeLimitExceeded),
            3 => Ok(Self::MemoryLimitExceeded),
            4 => Ok(Self::RuntimeError),
            5 => Ok(Self::CompileError),
            6 => Ok(Self::CompileWarn),
            7 => Ok(Self::SystemError),
            8 => Ok(Self::Aborted),
            other => Err(format!("unknown status code {other}")),
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Language reference of a submission: `(name, version)`.
///
/// Serialized as a two-element array to match the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangRef(pub String, pub Option<String>);

impl LangRef {
    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn version(&self) -> Option<&str> {
        self.1.as_deref()
    }
}

/// Compiler reference of a submission: `(name, version)`, version defaulting
/// to `"latest"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerRef(pub String, pub String);

impl CompilerRef {
    pub fn latest(name: impl Into<String>) -> Self {
        Self(name.into(), "latest".to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Final outcome of one judge run.
///
/// `time` and the memory pair are means over the problem's testcases; `-1.0`
/// marks "not measured" on the system-error, compile-error and abort paths.
/// `point` is the sum of per-testcase points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub status: StatusCode,
    pub warn: String,
    pub error: String,
    pub time: f64,
    pub memory: (f64, f64),
    pub point: f64,
}

impl SubmissionResult {
    /// Check whether resource figures were measured for this run
    pub fn measured(&self) -> bool {
        self.time >= 0.0
    }
}

/// Submission record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    /// Problem this submission answers
    pub problem: String,
    pub lang: LangRef,
    pub compiler: CompilerRef,
    pub author: String,
    /// Path of the stored source file, named from the language file template
    pub file_path: String,
    /// In-memory source, present only between intake and the disk write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub result: Option<SubmissionResult>,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// Check whether a run already produced a final result
    pub fn is_judged(&self) -> bool {
        self.result.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_orders_by_severity() {
        assert!(StatusCode::Accepted < StatusCode::WrongAnswer);
        assert!(StatusCode::SystemError < StatusCode::Aborted);
        assert_eq!(
            [StatusCode::WrongAnswer, StatusCode::Accepted]
                .into_iter()
                .max(),
            Some(StatusCode::WrongAnswer)
        );
    }

    #[test]
    fn status_code_round_trips_as_number() {
        let json = serde_json::to_string(&StatusCode::CompileError).unwrap();
        assert_eq!(json, "5");
        let back: StatusCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StatusCode::CompileError);
    }

    #[test]
    fn lang_ref_serializes_as_pair() {
        let lang = LangRef("python".to_string(), Some("3.12".to_string()));
        assert_eq!(
            serde_json::to_value(&lang).unwrap(),
            serde_json::json!(["python", "3.12"])
        );
    }
}
