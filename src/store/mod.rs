//! Persistent stores
//!
//! The control plane programs against the store traits only; the file-backed
//! and relational implementations are selected at startup from
//! configuration.

pub mod file;
pub mod intake;
pub mod sql;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StorageConfig;
use crate::models::{Problem, Role, Submission, User};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("submission {0} not found")]
    SubmissionNotFound(String),

    #[error("problem {0} not found")]
    ProblemNotFound(String),

    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("role {0} not found")]
    RoleNotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Problem persistence
#[async_trait]
pub trait ProblemStore: Send + Sync {
    async fn ids(&self) -> Result<Vec<String>, StoreError>;

    async fn get(&self, id: &str) -> Result<Problem, StoreError>;

    async fn add(&self, problem: &Problem) -> Result<(), StoreError>;

    async fn update(&self, id: &str, problem: &Problem) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Submission persistence
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn ids(&self) -> Result<Vec<String>, StoreError>;

    async fn get(&self, id: &str) -> Result<Submission, StoreError>;

    async fn add(&self, submission: &Submission) -> Result<(), StoreError>;

    async fn update(&self, id: &str, submission: &Submission) -> Result<(), StoreError>;
}

/// User persistence
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn ids(&self) -> Result<Vec<String>, StoreError>;

    async fn get(&self, id: &str) -> Result<User, StoreError>;

    async fn add(&self, user: &User) -> Result<(), StoreError>;

    async fn update(&self, id: &str, user: &User) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Role persistence
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn ids(&self) -> Result<Vec<String>, StoreError>;

    async fn get(&self, id: &str) -> Result<Role, StoreError>;

    async fn add(&self, role: &Role) -> Result<(), StoreError>;

    async fn update(&self, id: &str, role: &Role) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// The capability set handed to the dispatcher and the gateway
#[derive(Clone)]
pub struct Stores {
    pub problems: Arc<dyn ProblemStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub users: Arc<dyn UserStore>,
    pub roles: Arc<dyn RoleStore>,
}

impl Stores {
    /// Build the store set the configuration asks for
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StoreError> {
        if let Some(url) = config.store_place.strip_prefix("sql:") {
            sql::connect(url).await
        } else {
            Ok(file::stores(config.data_path.clone()))
        }
    }
}
