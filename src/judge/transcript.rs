//! Run transcript store
//!
//! One immutable record per (submission, run), holding the frames published
//! to the run's queue. The subscriber gateway replays these after the
//! in-memory queue is gone.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{LOGS_DIR, SUBMISSIONS_DIR};

use super::JudgeError;

/// A persisted run transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: String,
    pub submission_id: String,
    pub frames: Vec<Value>,
}

/// File-backed transcript records under
/// `<data>/submissions/<submission_id>/logs/<run_id>.json`.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    data_path: PathBuf,
}

impl TranscriptStore {
    pub fn new(data_path: PathBuf) -> Self {
        Self { data_path }
    }

    fn logs_dir(&self, submission_id: &str) -> PathBuf {
        self.data_path
            .join(SUBMISSIONS_DIR)
            .join(submission_id)
            .join(LOGS_DIR)
    }

    fn record_path(&self, submission_id: &str, run_id: &str) -> PathBuf {
        self.logs_dir(submission_id).join(format!("{run_id}.json"))
    }

    /// Write the transcript of one completed run
    pub async fn dump(
        &self,
        submission_id: &str,
        run_id: &str,
        frames: Vec<Value>,
    ) -> Result<(), JudgeError> {
        let dir = self.logs_dir(submission_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| JudgeError::Transcript(e.to_string()))?;

        let record = Transcript {
            id: run_id.to_string(),
            submission_id: submission_id.to_string(),
            frames,
        };
        let text = serde_json::to_string_pretty(&record)
            .map_err(|e| JudgeError::Transcript(e.to_string()))?;

        let path = self.record_path(submission_id, run_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| JudgeError::Transcript(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| JudgeError::Transcript(e.to_string()))
    }

    /// Read one run transcript, if it was persisted
    pub async fn get(
        &self,
        submission_id: &str,
        run_id: &str,
    ) -> Result<Option<Transcript>, JudgeError> {
        let path = self.record_path(submission_id, run_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| JudgeError::Transcript(format!("corrupt transcript: {e}"))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(JudgeError::Transcript(err.to_string())),
        }
    }

    /// Enumerate the run ids recorded for a submission
    pub async fn run_ids(&self, submission_id: &str) -> Result<Vec<String>, JudgeError> {
        let dir = self.logs_dir(submission_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(JudgeError::Transcript(err.to_string())),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| JudgeError::Transcript(e.to_string()))?
        {
            let name = entry.file_name();
            if let Some(id) = name.to_string_lossy().strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn dump_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path().to_path_buf());

        let frames = vec![json!(["waiting"]), json!(["catched", "w0"])];
        store.dump("s1", "r1", frames.clone()).await.unwrap();

        let record = store.get("s1", "r1").await.unwrap().unwrap();
        assert_eq!(record.submission_id, "s1");
        assert_eq!(record.frames, frames);

        assert!(store.get("s1", "missing").await.unwrap().is_none());
        assert_eq!(store.run_ids("s1").await.unwrap(), vec!["r1"]);
        assert!(store.run_ids("other").await.unwrap().is_empty());
    }
}
