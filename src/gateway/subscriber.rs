//! Subscriber bridge
//!
//! Connects a run queue to one downstream observer: replays history
//! (persisted transcript or live backing list), then forwards new frames
//! until the run terminates. The bridge is transport agnostic; the
//! WebSocket handler is one `Downstream` implementation.

use async_trait::async_trait;
use serde_json::Value;

use crate::constants::{close_reasons, tags};
use crate::judge::{run_queue_name, TranscriptStore};
use crate::queue::QueueManager;

/// Why the downstream is being closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Done,
    Aborted,
    EofCache,
    InternalError(String),
    NotFound(String),
}

impl CloseReason {
    /// WebSocket close code for this reason
    pub fn code(&self) -> u16 {
        match self {
            Self::Done | Self::Aborted | Self::EofCache => 1000,
            Self::InternalError(_) => 1011,
            Self::NotFound(_) => 1013,
        }
    }

    /// Human-readable close text
    pub fn text(&self) -> String {
        match self {
            Self::Done => close_reasons::DONE.to_string(),
            Self::Aborted => close_reasons::ABORTED.to_string(),
            Self::EofCache => close_reasons::EOF_CACHE.to_string(),
            Self::InternalError(detail) => {
                if detail.is_empty() {
                    close_reasons::INTERNAL_ERROR.to_string()
                } else {
                    detail.clone()
                }
            }
            Self::NotFound(reason) => reason.clone(),
        }
    }
}

/// One observer of a run
#[async_trait]
pub trait Downstream: Send {
    /// Deliver one `{status, data}` frame. Returns false once the
    /// downstream hung up.
    async fn deliver(&mut self, status: &str, data: Option<Value>) -> bool;

    /// Close the downstream
    async fn finish(&mut self, reason: CloseReason);
}

enum RunFrame {
    Tagged { tag: String, data: Option<Value> },
    Error(String),
}

fn interpret(frame: &Value) -> RunFrame {
    match frame {
        Value::Array(parts) => {
            let tag = parts
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            RunFrame::Tagged {
                tag,
                data: parts.get(1).cloned(),
            }
        }
        Value::Object(map) => match map.get("error") {
            Some(error) => RunFrame::Error(
                error
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string()),
            ),
            None => RunFrame::Tagged {
                tag: String::new(),
                data: Some(frame.clone()),
            },
        },
        other => RunFrame::Tagged {
            tag: String::new(),
            data: Some(other.clone()),
        },
    }
}

/// Stream the run `submission_id:run_id` to one downstream.
///
/// Order of preference: persisted transcript, live queue, durable backing
/// list. Replay delivers every frame; live forwarding additionally maps the
/// terminal tags onto close reasons.
pub async fn stream_run(
    queues: &QueueManager,
    transcripts: &TranscriptStore,
    queue_id: &str,
    downstream: &mut dyn Downstream,
) {
    let Some((submission_id, run_id)) = queue_id.split_once(':') else {
        downstream
            .finish(CloseReason::NotFound(
                close_reasons::INVALID_ID.to_string(),
            ))
            .await;
        return;
    };
    if submission_id.is_empty() || run_id.is_empty() {
        downstream
            .finish(CloseReason::NotFound(
                close_reasons::INVALID_ID.to_string(),
            ))
            .await;
        return;
    }

    let name = run_queue_name(submission_id, run_id);

    // 1. A persisted transcript wins: the run is long finished.
    match transcripts.get(submission_id, run_id).await {
        Ok(Some(transcript)) => {
            replay(&transcript.frames, downstream).await;
            downstream.finish(CloseReason::EofCache).await;
            return;
        }
        Ok(None) => {}
        Err(err) => {
            tracing::error!(queue = %name, %err, "failed to read transcript");
            downstream
                .finish(CloseReason::InternalError(String::new()))
                .await;
            return;
        }
    }

    // 2. A live queue: replay its current content, then follow.
    if let Ok(queue) = queues.get(&name) {
        // Subscribe before the snapshot; frame indices weed out overlap.
        let (put_id, mut puts) = queue.put_events();
        let (close_id, mut closes) = queue.close_events();

        let snapshot = match queue.get_all().await {
            Ok(frames) => frames,
            Err(err) => {
                tracing::error!(queue = %name, %err, "failed to replay queue");
                queue.off(put_id);
                queue.off(close_id);
                downstream
                    .finish(CloseReason::InternalError(String::new()))
                    .await;
                return;
            }
        };
        let replayed = snapshot.len();
        replay(&snapshot, downstream).await;

        // 3. Closed between lookup and subscription: history is all there is.
        if queue.is_closed() {
            queue.off(put_id);
            queue.off(close_id);
            downstream.finish(CloseReason::EofCache).await;
            return;
        }

        // 4. Follow the live run. Pending frames win over the close
        // notification, so a terminal frame is always delivered before the
        // downstream is closed.
        loop {
            tokio::select! {
                biased;
                event = puts.recv() => {
                    let Some(event) = event else { break };
                    if event.index < replayed {
                        continue;
                    }
                    let frame: Value = serde_json::from_str(&event.item)
                        .unwrap_or(Value::String(event.item.clone()));
                    match interpret(&frame) {
                        RunFrame::Error(text) => {
                            downstream.finish(CloseReason::InternalError(text)).await;
                            break;
                        }
                        RunFrame::Tagged { tag, data } => {
                            if tag == tags::ABORT {
                                downstream.finish(CloseReason::Aborted).await;
                                break;
                            }
                            let delivered = downstream.deliver(&tag, data).await;
                            if tag == tags::OVERALL {
                                downstream.finish(CloseReason::Done).await;
                                break;
                            }
                            if !delivered {
                                break;
                            }
                        }
                    }
                }
                _ = closes.recv() => {
                    downstream.finish(CloseReason::Done).await;
                    break;
                }
            }
        }
        queue.off(put_id);
        queue.off(close_id);
        return;
    }

    // 5. No queue object, but the durable list may still hold the run.
    match queues.check_cache(&name).await {
        Ok(true) => {
            if let Ok(cache) = queues.get_cache(&name).await {
                if let Ok(frames) = cache.get_all().await {
                    replay(&frames, downstream).await;
                }
            }
            downstream.finish(CloseReason::EofCache).await;
        }
        _ => {
            downstream
                .finish(CloseReason::NotFound(
                    close_reasons::QUEUE_NOT_FOUND.to_string(),
                ))
                .await;
        }
    }
}

async fn replay(frames: &[Value], downstream: &mut dyn Downstream) {
    for frame in frames {
        match interpret(frame) {
            RunFrame::Tagged { tag, data } => {
                if !downstream.deliver(&tag, data).await {
                    return;
                }
            }
            RunFrame::Error(text) => {
                if !downstream.deliver(tags::ERROR, Some(Value::String(text))).await {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recording {
        frames: Vec<(String, Option<Value>)>,
        closed: Option<CloseReason>,
    }

    #[async_trait]
    impl Downstream for Recording {
        async fn deliver(&mut self, status: &str, data: Option<Value>) -> bool {
            self.frames.push((status.to_string(), data));
            true
        }

        async fn finish(&mut self, reason: CloseReason) {
            self.closed = Some(reason);
        }
    }

    fn fixtures(dir: &tempfile::TempDir) -> (QueueManager, TranscriptStore) {
        (
            QueueManager::new(Arc::new(MemoryBackend::new())),
            TranscriptStore::new(dir.path().to_path_buf()),
        )
    }

    #[tokio::test]
    async fn persisted_transcript_replays_then_eof() {
        let dir = tempfile::tempdir().unwrap();
        let (queues, transcripts) = fixtures(&dir);
        transcripts
            .dump(
                "s1",
                "r1",
                vec![json!(["waiting"]), json!(["overall", {"status": 0}])],
            )
            .await
            .unwrap();

        let mut downstream = Recording::default();
        stream_run(&queues, &transcripts, "s1:r1", &mut downstream).await;

        assert_eq!(downstream.frames.len(), 2);
        assert_eq!(downstream.frames[0].0, "waiting");
        assert_eq!(downstream.closed, Some(CloseReason::EofCache));
    }

    #[tokio::test]
    async fn live_queue_replays_then_follows_to_overall() {
        let dir = tempfile::tempdir().unwrap();
        let (queues, transcripts) = fixtures(&dir);
        let queue = queues.create("judge::s1:r1").unwrap();
        queue.put(&json!(["waiting"]), false).await.unwrap();

        let bridge = {
            let queue = queue.clone();
            tokio::spawn(async move {
                // Publish after the bridge had a chance to replay.
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                queue.put(&json!(["result", {"index": 1}]), false).await.unwrap();
                queue
                    .put(&json!(["overall", {"status": 0}]), false)
                    .await
                    .unwrap();
            })
        };

        let mut downstream = Recording::default();
        stream_run(&queues, &transcripts, "s1:r1", &mut downstream).await;
        bridge.await.unwrap();

        let statuses: Vec<&str> = downstream.frames.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(statuses, vec!["waiting", "result", "overall"]);
        assert_eq!(downstream.closed, Some(CloseReason::Done));
    }

    #[tokio::test]
    async fn closed_queue_without_transcript_reads_as_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (queues, transcripts) = fixtures(&dir);
        let queue = queues.create("judge::s1:r1").unwrap();
        queue.put(&json!(["waiting"]), false).await.unwrap();
        queue.close(false).await;

        let mut downstream = Recording::default();
        stream_run(&queues, &transcripts, "s1:r1", &mut downstream).await;

        assert_eq!(downstream.frames.len(), 1);
        assert_eq!(downstream.closed, Some(CloseReason::EofCache));
    }

    #[tokio::test]
    async fn error_frame_closes_with_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let (queues, transcripts) = fixtures(&dir);
        let queue = queues.create("judge::s1:r1").unwrap();

        let publisher = {
            let queue = queue.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                queue
                    .put(&json!({"error": "submission not found"}), false)
                    .await
                    .unwrap();
            })
        };

        let mut downstream = Recording::default();
        stream_run(&queues, &transcripts, "s1:r1", &mut downstream).await;
        publisher.await.unwrap();

        assert_eq!(
            downstream.closed,
            Some(CloseReason::InternalError("submission not found".to_string()))
        );
    }

    #[tokio::test]
    async fn unknown_run_closes_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (queues, transcripts) = fixtures(&dir);

        let mut downstream = Recording::default();
        stream_run(&queues, &transcripts, "nope:r9", &mut downstream).await;
        assert!(matches!(downstream.closed, Some(CloseReason::NotFound(_))));

        let mut downstream = Recording::default();
        stream_run(&queues, &transcripts, "malformed", &mut downstream).await;
        assert!(matches!(downstream.closed, Some(CloseReason::NotFound(_))));
    }

    #[tokio::test]
    async fn no_duplicates_when_frames_race_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (queues, transcripts) = fixtures(&dir);
        let queue = queues.create("judge::s1:r1").unwrap();
        queue.put(&json!(["waiting"]), false).await.unwrap();
        queue.put(&json!(["catched", "w0"]), false).await.unwrap();

        let publisher = {
            let queue = queue.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                queue
                    .put(&json!(["overall", {"status": 0}]), false)
                    .await
                    .unwrap();
            })
        };

        let mut downstream = Recording::default();
        stream_run(&queues, &transcripts, "s1:r1", &mut downstream).await;
        publisher.await.unwrap();

        let statuses: Vec<&str> = downstream.frames.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(statuses, vec!["waiting", "catched", "overall"]);
    }
}
