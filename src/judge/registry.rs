//! Judge-server registry
//!
//! Persists the ordered id → descriptor map in a single `servers.json`
//! document. The registry is pure metadata: connections are the
//! dispatcher's business.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::sync::Mutex;

use crate::models::ServerDescriptor;

use super::JudgeError;

/// Registry over `data/servers.json`.
///
/// Writes go to a temp file first and are renamed into place, so readers
/// never observe a torn document.
pub struct ServerRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ServerRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// All descriptors, in map order
    pub async fn list(&self) -> Result<Vec<ServerDescriptor>, JudgeError> {
        Ok(self.read_map().await?.into_values().collect())
    }

    /// Descriptor of one server
    pub async fn get(&self, id: &str) -> Result<ServerDescriptor, JudgeError> {
        self.read_map()
            .await?
            .remove(id)
            .ok_or_else(|| JudgeError::ServerNotFound(id.to_string()))
    }

    /// Add a server, assigning an id when the caller omitted one.
    /// Returns the stored descriptor.
    pub async fn add(
        &self,
        id: Option<String>,
        name: String,
        uri: String,
    ) -> Result<ServerDescriptor, JudgeError> {
        let _guard = self.write_lock.lock().await;

        let mut servers = self.read_map().await?;
        let id = id.unwrap_or_else(|| servers.len().to_string());
        if servers.contains_key(&id) {
            return Err(JudgeError::AlreadyConnected(id));
        }

        let descriptor = ServerDescriptor { id: id.clone(), name, uri };
        servers.insert(id, descriptor.clone());
        self.write_map(&servers).await?;
        Ok(descriptor)
    }

    /// Remove a server from the document
    pub async fn remove(&self, id: &str) -> Result<ServerDescriptor, JudgeError> {
        let _guard = self.write_lock.lock().await;

        let mut servers = self.read_map().await?;
        let removed = servers
            .remove(id)
            .ok_or_else(|| JudgeError::ServerNotFound(id.to_string()))?;
        self.write_map(&servers).await?;
        Ok(removed)
    }

    async fn read_map(&self) -> Result<BTreeMap<String, ServerDescriptor>, JudgeError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| JudgeError::Registry(format!("corrupt servers document: {e}"))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(JudgeError::Registry(err.to_string())),
        }
    }

    async fn write_map(
        &self,
        servers: &BTreeMap<String, ServerDescriptor>,
    ) -> Result<(), JudgeError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| JudgeError::Registry(e.to_string()))?;
        }

        let text = serde_json::to_string_pretty(servers)
            .map_err(|e| JudgeError::Registry(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| JudgeError::Registry(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| JudgeError::Registry(e.to_string()))
    }
}
