//! User and role models
//!
//! The control plane only reads these through the store capability set; the
//! authentication surface that fills them in lives outside this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Opaque credential blob managed by the external auth surface
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Role record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub permissions: Vec<String>,
}

impl Role {
    pub fn allows(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}
