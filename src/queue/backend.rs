//! Durable append-only list backends
//!
//! Every queue is backed by a named append-only list so that late
//! subscribers can replay frames after the in-memory queue object is gone.
//! Production deployments point the fabric at redis; the in-memory backend
//! serves tests and single-process setups.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::QueueError;

/// A keyed append-only list store.
///
/// `append` returns the list length after the push; queues attach that
/// index to their put events so replaying subscribers can deduplicate.
#[async_trait]
pub trait ListBackend: Send + Sync {
    async fn append(&self, key: &str, item: String) -> Result<usize, QueueError>;

    async fn read_all(&self, key: &str) -> Result<Vec<String>, QueueError>;

    async fn len(&self, key: &str) -> Result<usize, QueueError>;
}

/// Redis-backed lists (RPUSH / LRANGE / LLEN)
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Open a connection manager against a redis URL
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client =
            redis::Client::open(url).map_err(|e| QueueError::Backend(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ListBackend for RedisBackend {
    async fn append(&self, key: &str, item: String) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let len: usize = conn
            .rpush(key, item)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(len)
    }

    async fn read_all(&self, key: &str) -> Result<Vec<String>, QueueError> {
        let mut conn = self.conn.clone();
        conn.lrange(key, 0, -1)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))
    }

    async fn len(&self, key: &str) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        conn.llen(key)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))
    }
}

/// Process-local lists for tests and redis-less deployments
#[derive(Default)]
pub struct MemoryBackend {
    lists: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListBackend for MemoryBackend {
    async fn append(&self, key: &str, item: String) -> Result<usize, QueueError> {
        let mut lists = self.lists.lock().unwrap();
        let list = lists.entry(key.to_string()).or_default();
        list.push(item);
        Ok(list.len())
    }

    async fn read_all(&self, key: &str) -> Result<Vec<String>, QueueError> {
        let lists = self.lists.lock().unwrap();
        Ok(lists.get(key).cloned().unwrap_or_default())
    }

    async fn len(&self, key: &str) -> Result<usize, QueueError> {
        let lists = self.lists.lock().unwrap();
        Ok(lists.get(key).map(Vec::len).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_appends_in_order() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.append("q", "a".to_string()).await.unwrap(), 1);
        assert_eq!(backend.append("q", "b".to_string()).await.unwrap(), 2);
        assert_eq!(backend.read_all("q").await.unwrap(), vec!["a", "b"]);
        assert_eq!(backend.len("q").await.unwrap(), 2);
        assert_eq!(backend.len("other").await.unwrap(), 0);
    }
}
