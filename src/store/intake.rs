//! Submission and problem intake
//!
//! Validation that runs synchronously on the REST path, before anything
//! reaches the dispatcher: declared-language checks, source-file placement,
//! problem shape checks.

use std::path::Path;

use crate::constants::SUBMISSIONS_DIR;
use crate::models::{Declarations, Problem, Submission, TestType};

use super::{StoreError, Stores};

/// Domain validation errors
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("language {0} is not supported")]
    LanguageNotSupport(String),

    #[error("language {0} is not accepted for this problem")]
    LanguageNotAccept(String),

    #[error("compiler {0} is not supported")]
    CompilerNotSupport(String),

    #[error("test type {0} is not supported")]
    TestTypeNotSupport(String),

    #[error("problem judger is invalid: {0}")]
    InvalidProblemJudger(String),

    #[error("invalid testcase extension: {0}")]
    InvalidTestcaseExtension(String),

    #[error("invalid testcase count: {0}")]
    InvalidTestcaseCount(String),
}

/// Intake failures
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to store source file: {0}")]
    Io(String),
}

/// Parse an externally supplied test type
pub fn parse_test_type(value: &str) -> Result<TestType, DomainError> {
    match value {
        "std" => Ok(TestType::Std),
        "file" => Ok(TestType::File),
        other => Err(DomainError::TestTypeNotSupport(other.to_string())),
    }
}

/// Validate and store a fresh submission.
///
/// Writes the source to `<data>/submissions/<id>/<template-name>`, clears
/// the in-memory code and persists the record.
pub async fn intake_submission(
    stores: &Stores,
    declarations: &Declarations,
    data_path: &Path,
    mut submission: Submission,
) -> Result<Submission, IntakeError> {
    let problem = stores.problems.get(&submission.problem).await?;

    let language = declarations
        .language(submission.lang.name())
        .ok_or_else(|| DomainError::LanguageNotSupport(submission.lang.name().to_string()))?;
    if let Some(version) = submission.lang.version() {
        if !language.versions.iter().any(|v| v == version) {
            return Err(DomainError::LanguageNotSupport(format!(
                "{} {version}",
                submission.lang.name()
            ))
            .into());
        }
    }
    if !problem.accepts_language(submission.lang.name()) {
        return Err(DomainError::LanguageNotAccept(submission.lang.name().to_string()).into());
    }

    if declarations.compiler(submission.compiler.name()).is_none() {
        return Err(DomainError::CompilerNotSupport(submission.compiler.name().to_string()).into());
    }

    let code = submission
        .code
        .take()
        .ok_or_else(|| IntakeError::Io("submission carries no source code".to_string()))?;

    let dir = data_path.join(SUBMISSIONS_DIR).join(&submission.id);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| IntakeError::Io(e.to_string()))?;
    let file_path = dir.join(language.file_name_for(&submission.id));
    tokio::fs::write(&file_path, code)
        .await
        .map_err(|e| IntakeError::Io(e.to_string()))?;
    submission.file_path = file_path.to_string_lossy().into_owned();

    stores.submissions.add(&submission).await?;
    Ok(submission)
}

/// Validate a problem record before it is saved
pub async fn validate_problem(problem: &Problem) -> Result<(), DomainError> {
    if problem.total_testcases == 0 {
        return Err(DomainError::InvalidTestcaseCount(
            "a problem needs at least one testcase".to_string(),
        ));
    }

    for name in [&problem.test_name.0, &problem.test_name.1] {
        if Path::new(name).extension().is_none() {
            return Err(DomainError::InvalidTestcaseExtension(name.clone()));
        }
    }

    if let Some(judger_path) = problem.judger_path() {
        if !tokio::fs::try_exists(&judger_path)
            .await
            .unwrap_or(false)
        {
            return Err(DomainError::InvalidProblemJudger(format!(
                "{} does not exist",
                judger_path.display()
            )));
        }
    }

    Ok(())
}
