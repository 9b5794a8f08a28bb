//! Relational stores
//!
//! Records are kept as JSONB rows keyed by id, one table per entity kind.
//! All queries use the runtime API so the schema can be created on first
//! start.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::models::{Problem, Role, Submission, User};

use super::{ProblemStore, RoleStore, StoreError, SubmissionStore, Stores, UserStore};

const TABLES: &[&str] = &["problems", "submissions", "users", "roles"];

/// Connect to Postgres, make sure the tables exist, and build the store set
pub async fn connect(url: &str) -> Result<Stores, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    for table in TABLES {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (id TEXT PRIMARY KEY, data JSONB NOT NULL)"
        ))
        .execute(&pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    }

    Ok(Stores {
        problems: Arc::new(SqlProblemStore { pool: pool.clone() }),
        submissions: Arc::new(SqlSubmissionStore { pool: pool.clone() }),
        users: Arc::new(SqlUserStore { pool: pool.clone() }),
        roles: Arc::new(SqlRoleStore { pool }),
    })
}

async fn fetch_ids(pool: &PgPool, table: &str) -> Result<Vec<String>, StoreError> {
    let rows = sqlx::query(&format!("SELECT id FROM {table} ORDER BY id"))
        .fetch_all(pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    rows.iter()
        .map(|row| row.try_get("id").map_err(|e| StoreError::Backend(e.to_string())))
        .collect()
}

async fn fetch_record<T: DeserializeOwned>(
    pool: &PgPool,
    table: &str,
    id: &str,
) -> Result<Option<T>, StoreError> {
    let row = sqlx::query(&format!("SELECT data FROM {table} WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    row.map(|row| {
        let data: serde_json::Value = row
            .try_get("data")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        serde_json::from_value(data).map_err(|e| StoreError::Backend(e.to_string()))
    })
    .transpose()
}

async fn insert_record<T: Serialize>(
    pool: &PgPool,
    table: &str,
    id: &str,
    record: &T,
) -> Result<bool, StoreError> {
    let data = serde_json::to_value(record).map_err(|e| StoreError::Backend(e.to_string()))?;
    let result = sqlx::query(&format!(
        "INSERT INTO {table} (id, data) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING"
    ))
    .bind(id)
    .bind(data)
    .execute(pool)
    .await
    .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(result.rows_affected() > 0)
}

async fn replace_record<T: Serialize>(
    pool: &PgPool,
    table: &str,
    id: &str,
    record: &T,
) -> Result<bool, StoreError> {
    let data = serde_json::to_value(record).map_err(|e| StoreError::Backend(e.to_string()))?;
    let result = sqlx::query(&format!("UPDATE {table} SET data = $2 WHERE id = $1"))
        .bind(id)
        .bind(data)
        .execute(pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(result.rows_affected() > 0)
}

async fn delete_record(pool: &PgPool, table: &str, id: &str) -> Result<bool, StoreError> {
    let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(result.rows_affected() > 0)
}

/// Problems in the `problems` table
pub struct SqlProblemStore {
    pool: PgPool,
}

#[async_trait]
impl ProblemStore for SqlProblemStore {
    async fn ids(&self) -> Result<Vec<String>, StoreError> {
        fetch_ids(&self.pool, "problems").await
    }

    async fn get(&self, id: &str) -> Result<Problem, StoreError> {
        fetch_record(&self.pool, "problems", id)
            .await?
            .ok_or_else(|| StoreError::ProblemNotFound(id.to_string()))
    }

    async fn add(&self, problem: &Problem) -> Result<(), StoreError> {
        if !insert_record(&self.pool, "problems", &problem.id, problem).await? {
            return Err(StoreError::AlreadyExists(problem.id.clone()));
        }
        Ok(())
    }

    async fn update(&self, id: &str, problem: &Problem) -> Result<(), StoreError> {
        if !replace_record(&self.pool, "problems", id, problem).await? {
            return Err(StoreError::ProblemNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        if !delete_record(&self.pool, "problems", id).await? {
            return Err(StoreError::ProblemNotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Submissions in the `submissions` table
pub struct SqlSubmissionStore {
    pool: PgPool,
}

#[async_trait]
impl SubmissionStore for SqlSubmissionStore {
    async fn ids(&self) -> Result<Vec<String>, StoreError> {
        fetch_ids(&self.pool, "submissions").await
    }

    async fn get(&self, id: &str) -> Result<Submission, StoreError> {
        fetch_record(&self.pool, "submissions", id)
            .await?
            .ok_or_else(|| StoreError::SubmissionNotFound(id.to_string()))
    }

    async fn add(&self, submission: &Submission) -> Result<(), StoreError> {
        if !insert_record(&self.pool, "submissions", &submission.id, submission).await? {
            return Err(StoreError::AlreadyExists(submission.id.clone()));
        }
        Ok(())
    }

    async fn update(&self, id: &str, submission: &Submission) -> Result<(), StoreError> {
        if !replace_record(&self.pool, "submissions", id, submission).await? {
            return Err(StoreError::SubmissionNotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Users in the `users` table
pub struct SqlUserStore {
    pool: PgPool,
}

#[async_trait]
impl UserStore for SqlUserStore {
    async fn ids(&self) -> Result<Vec<String>, StoreError> {
        fetch_ids(&self.pool, "users").await
    }

    async fn get(&self, id: &str) -> Result<User, StoreError> {
        fetch_record(&self.pool, "users", id)
            .await?
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))
    }

    async fn add(&self, user: &User) -> Result<(), StoreError> {
        if !insert_record(&self.pool, "users", &user.id, user).await? {
            return Err(StoreError::AlreadyExists(user.id.clone()));
        }
        Ok(())
    }

    async fn update(&self, id: &str, user: &User) -> Result<(), StoreError> {
        if !replace_record(&self.pool, "users", id, user).await? {
            return Err(StoreError::UserNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        if !delete_record(&self.pool, "users", id).await? {
            return Err(StoreError::UserNotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Roles in the `roles` table
pub struct SqlRoleStore {
    pool: PgPool,
}

#[async_trait]
impl RoleStore for SqlRoleStore {
    async fn ids(&self) -> Result<Vec<String>, StoreError> {
        fetch_ids(&self.pool, "roles").await
    }

    async fn get(&self, id: &str) -> Result<Role, StoreError> {
        fetch_record(&self.pool, "roles", id)
            .await?
            .ok_or_else(|| StoreError::RoleNotFound(id.to_string()))
    }

    async fn add(&self, role: &Role) -> Result<(), StoreError> {
        if !insert_record(&self.pool, "roles", &role.id, role).await? {
            return Err(StoreError::AlreadyExists(role.id.clone()));
        }
        Ok(())
    }

    async fn update(&self, id: &str, role: &Role) -> Result<(), StoreError> {
        if !replace_record(&self.pool, "roles", id, role).await? {
            return Err(StoreError::RoleNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        if !delete_record(&self.pool, "roles", id).await? {
            return Err(StoreError::RoleNotFound(id.to_string()));
        }
        Ok(())
    }
}
