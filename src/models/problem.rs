//! Problem model

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::TESTCASES_DIR;

/// How a testcase is fed to the submitted program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    /// Input on stdin, answer on stdout
    Std,
    /// Input/output through the declared file names
    File,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Std => "std",
            Self::File => "file",
        }
    }
}

/// Output comparison settings forwarded to the judge worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeMode {
    /// 0 = trimmed exact match, 1 = numeric match rounded to `precision` places
    pub mode: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
}

impl JudgeMode {
    pub fn exact() -> Self {
        Self {
            mode: 0,
            precision: None,
        }
    }
}

/// Per-testcase resource limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub time_ms: u64,
    pub memory_kb: u64,
    pub output_kb: u64,
}

/// Problem record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Number of testcases under `dir/testcases/`, numbered from 1
    pub total_testcases: u32,
    pub test_type: TestType,
    /// Input and output file names of every testcase directory
    pub test_name: (String, String),
    /// Language names allowed to answer this problem
    pub accept_language: Vec<String>,
    pub limit: Limit,
    pub mode: JudgeMode,
    pub point_per_testcase: f64,
    /// File name of a custom judger inside `dir`, when the problem ships one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judger: Option<String>,
    /// Roles allowed to see the problem; `@everyone` marks it public
    pub roles: Vec<String>,
    pub author: String,
    /// Data directory holding testcases and the optional judger
    pub dir: String,
    pub created_at: DateTime<Utc>,
}

impl Problem {
    /// Check whether the problem is visible to everyone
    pub fn is_public(&self) -> bool {
        self.roles.iter().any(|role| role == "@everyone")
    }

    /// Check whether a language is accepted for this problem
    pub fn accepts_language(&self, lang: &str) -> bool {
        self.accept_language.iter().any(|name| name == lang)
    }

    /// Input and output file paths of testcase `index` (1-based)
    pub fn testcase_paths(&self, index: u32) -> (PathBuf, PathBuf) {
        let base = PathBuf::from(&self.dir)
            .join(TESTCASES_DIR)
            .join(index.to_string());
        (base.join(&self.test_name.0), base.join(&self.test_name.1))
    }

    /// Path of the custom judger source, when the problem carries one
    pub fn judger_path(&self) -> Option<PathBuf> {
        self.judger
            .as_ref()
            .map(|name| PathBuf::from(&self.dir).join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Problem {
        Problem {
            id: "p1".to_string(),
            title: "A + B".to_string(),
            description: String::new(),
            total_testcases: 3,
            test_type: TestType::Std,
            test_name: ("input.txt".to_string(), "output.txt".to_string()),
            accept_language: vec!["python".to_string()],
            limit: Limit {
                time_ms: 1000,
                memory_kb: 262_144,
                output_kb: 1024,
            },
            mode: JudgeMode::exact(),
            point_per_testcase: 1.0,
            judger: None,
            roles: vec!["@everyone".to_string()],
            author: "admin".to_string(),
            dir: "/data/problems/p1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn testcase_paths_are_one_based() {
        let problem = sample();
        let (input, output) = problem.testcase_paths(2);
        assert!(input.ends_with("testcases/2/input.txt"));
        assert!(output.ends_with("testcases/2/output.txt"));
    }

    #[test]
    fn everyone_role_marks_public() {
        assert!(sample().is_public());
    }
}
