//! File-backed stores
//!
//! Each entity kind lives in one JSON document holding an ordered id → record
//! map. Writes rewrite the whole document through a temp file and an atomic
//! rename.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::constants::{PROBLEMS_DIR, SUBMISSIONS_DIR};
use crate::models::{Problem, Role, Submission, User};

use super::{ProblemStore, RoleStore, StoreError, SubmissionStore, Stores, UserStore};

/// One JSON document holding an ordered id → record map
struct JsonDocument<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> JsonDocument<T> {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    async fn read(&self) -> Result<BTreeMap<String, T>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| StoreError::Backend(format!("corrupt document {:?}: {e}", self.path))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(StoreError::Backend(err.to_string())),
        }
    }

    async fn write(&self, map: &BTreeMap<String, T>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        let text = serde_json::to_string_pretty(map)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read().await?.into_keys().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self.read().await?.remove(id))
    }

    async fn insert(&self, id: &str, record: &T) -> Result<bool, StoreError>
    where
        T: Clone,
    {
        let _guard = self.lock.lock().await;
        let mut map = self.read().await?;
        if map.contains_key(id) {
            return Ok(false);
        }
        map.insert(id.to_string(), record.clone());
        self.write(&map).await?;
        Ok(true)
    }

    async fn replace(&self, id: &str, record: &T) -> Result<bool, StoreError>
    where
        T: Clone,
    {
        let _guard = self.lock.lock().await;
        let mut map = self.read().await?;
        if !map.contains_key(id) {
            return Ok(false);
        }
        map.insert(id.to_string(), record.clone());
        self.write(&map).await?;
        Ok(true)
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read().await?;
        if map.remove(id).is_none() {
            return Ok(false);
        }
        self.write(&map).await?;
        Ok(true)
    }
}

/// Problems in `<data>/problems/problems.json`, one data directory per id
pub struct FileProblemStore {
    doc: JsonDocument<Problem>,
    base_dir: PathBuf,
}

impl FileProblemStore {
    pub fn new(data_path: PathBuf) -> Self {
        let base_dir = data_path.join(PROBLEMS_DIR);
        Self {
            doc: JsonDocument::new(base_dir.join("problems.json")),
            base_dir,
        }
    }
}

#[async_trait]
impl ProblemStore for FileProblemStore {
    async fn ids(&self) -> Result<Vec<String>, StoreError> {
        self.doc.ids().await
    }

    async fn get(&self, id: &str) -> Result<Problem, StoreError> {
        self.doc
            .get(id)
            .await?
            .ok_or_else(|| StoreError::ProblemNotFound(id.to_string()))
    }

    async fn add(&self, problem: &Problem) -> Result<(), StoreError> {
        let mut stored = problem.clone();
        let dir = self.base_dir.join(&problem.id);
        stored.dir = dir.to_string_lossy().into_owned();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if !self.doc.insert(&problem.id, &stored).await? {
            return Err(StoreError::AlreadyExists(problem.id.clone()));
        }
        Ok(())
    }

    async fn update(&self, id: &str, problem: &Problem) -> Result<(), StoreError> {
        if !self.doc.replace(id, problem).await? {
            return Err(StoreError::ProblemNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        if !self.doc.remove(id).await? {
            return Err(StoreError::ProblemNotFound(id.to_string()));
        }
        let _ = tokio::fs::remove_dir_all(self.base_dir.join(id)).await;
        Ok(())
    }
}

/// Submissions in `<data>/submissions/submissions.json`
pub struct FileSubmissionStore {
    doc: JsonDocument<Submission>,
}

impl FileSubmissionStore {
    pub fn new(data_path: PathBuf) -> Self {
        Self {
            doc: JsonDocument::new(data_path.join(SUBMISSIONS_DIR).join("submissions.json")),
        }
    }
}

#[async_trait]
impl SubmissionStore for FileSubmissionStore {
    async fn ids(&self) -> Result<Vec<String>, StoreError> {
        self.doc.ids().await
    }

    async fn get(&self, id: &str) -> Result<Submission, StoreError> {
        self.doc
            .get(id)
            .await?
            .ok_or_else(|| StoreError::SubmissionNotFound(id.to_string()))
    }

    async fn add(&self, submission: &Submission) -> Result<(), StoreError> {
        if !self.doc.insert(&submission.id, submission).await? {
            return Err(StoreError::AlreadyExists(submission.id.clone()));
        }
        Ok(())
    }

    async fn update(&self, id: &str, submission: &Submission) -> Result<(), StoreError> {
        if !self.doc.replace(id, submission).await? {
            return Err(StoreError::SubmissionNotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Users in `<data>/users.json`
pub struct FileUserStore {
    doc: JsonDocument<User>,
}

impl FileUserStore {
    pub fn new(data_path: PathBuf) -> Self {
        Self {
            doc: JsonDocument::new(data_path.join("users.json")),
        }
    }
}

#[async_trait]
impl UserStore for FileUserStore {
    async fn ids(&self) -> Result<Vec<String>, StoreError> {
        self.doc.ids().await
    }

    async fn get(&self, id: &str) -> Result<User, StoreError> {
        self.doc
            .get(id)
            .await?
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))
    }

    async fn add(&self, user: &User) -> Result<(), StoreError> {
        if !self.doc.insert(&user.id, user).await? {
            return Err(StoreError::AlreadyExists(user.id.clone()));
        }
        Ok(())
    }

    async fn update(&self, id: &str, user: &User) -> Result<(), StoreError> {
        if !self.doc.replace(id, user).await? {
            return Err(StoreError::UserNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        if !self.doc.remove(id).await? {
            return Err(StoreError::UserNotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Roles in `<data>/roles.json`
pub struct FileRoleStore {
    doc: JsonDocument<Role>,
}

impl FileRoleStore {
    pub fn new(data_path: PathBuf) -> Self {
        Self {
            doc: JsonDocument::new(data_path.join("roles.json")),
        }
    }
}

#[async_trait]
impl RoleStore for FileRoleStore {
    async fn ids(&self) -> Result<Vec<String>, StoreError> {
        self.doc.ids().await
    }

    async fn get(&self, id: &str) -> Result<Role, StoreError> {
        self.doc
            .get(id)
            .await?
            .ok_or_else(|| StoreError::RoleNotFound(id.to_string()))
    }

    async fn add(&self, role: &Role) -> Result<(), StoreError> {
        if !self.doc.insert(&role.id, role).await? {
            return Err(StoreError::AlreadyExists(role.id.clone()));
        }
        Ok(())
    }

    async fn update(&self, id: &str, role: &Role) -> Result<(), StoreError> {
        if !self.doc.replace(id, role).await? {
            return Err(StoreError::RoleNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        if !self.doc.remove(id).await? {
            return Err(StoreError::RoleNotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Build the file-backed store set rooted at `data_path`
pub fn stores(data_path: PathBuf) -> Stores {
    Stores {
        problems: Arc::new(FileProblemStore::new(data_path.clone())),
        submissions: Arc::new(FileSubmissionStore::new(data_path.clone())),
        users: Arc::new(FileUserStore::new(data_path.clone())),
        roles: Arc::new(FileRoleStore::new(data_path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompilerRef, LangRef};
    use chrono::Utc;

    fn submission(id: &str) -> Submission {
        Submission {
            id: id.to_string(),
            problem: "p1".to_string(),
            lang: LangRef("python".to_string(), None),
            compiler: CompilerRef::latest("cpython"),
            author: "u1".to_string(),
            file_path: format!("/tmp/{id}.py"),
            code: None,
            result: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn submission_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSubmissionStore::new(dir.path().to_path_buf());

        store.add(&submission("s1")).await.unwrap();
        assert!(matches!(
            store.add(&submission("s1")).await,
            Err(StoreError::AlreadyExists(_))
        ));

        let mut loaded = store.get("s1").await.unwrap();
        assert!(loaded.result.is_none());

        loaded.result = Some(crate::models::SubmissionResult {
            status: crate::models::StatusCode::Accepted,
            warn: String::new(),
            error: String::new(),
            time: 0.1,
            memory: (1024.0, 2048.0),
            point: 3.0,
        });
        store.update("s1", &loaded).await.unwrap();
        assert!(store.get("s1").await.unwrap().is_judged());

        assert!(matches!(
            store.get("missing").await,
            Err(StoreError::SubmissionNotFound(_))
        ));
        assert!(matches!(
            store.update("missing", &submission("missing")).await,
            Err(StoreError::SubmissionNotFound(_))
        ));
        assert_eq!(store.ids().await.unwrap(), vec!["s1"]);
    }
}
