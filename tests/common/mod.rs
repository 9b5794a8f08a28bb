//! Shared fixtures: an in-process judge worker and a dispatcher harness

// Each test binary uses a different slice of the harness.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

use judgehub::judge::transport::local::{LocalConnect, LocalPeer};
use judgehub::judge::{
    run_queue_name, Dispatcher, DispatcherConfig, ServerRegistry, TranscriptStore,
};
use judgehub::models::{
    CompilerDecl, CompilerRef, Declarations, JudgeMode, LangRef, LanguageDecl, Limit, Problem,
    Submission, SubmissionResult, TestType,
};
use judgehub::queue::{MemoryBackend, Queue, QueueManager};
use judgehub::store::{file, Stores};

pub const WAIT: Duration = Duration::from_secs(20);

// =============================================================================
// Mock judge worker
// =============================================================================

#[derive(Clone)]
pub enum WorkerScript {
    /// Accept every testcase with fixed measurements
    AcceptAll {
        time: f64,
        memory: (f64, f64),
        point: f64,
    },
    /// Per-testcase status codes (missing entries accept); overall is the
    /// worst verdict of the chunk
    Verdicts(HashMap<u32, u8>),
    /// Fail compilation with this message
    CompileError(String),
    /// Emit a compiler warning, then accept every testcase
    WarnThenAccept(String),
    /// Emit this many verdicts, then go quiet until aborted
    HangAfter(usize),
    /// Drop the transport on the first testcase write
    DieOnTestcase,
}

pub fn spawn_worker(peer: LocalPeer, script: WorkerScript) {
    tokio::spawn(run_worker(peer, script));
}

async fn run_worker(mut peer: LocalPeer, script: WorkerScript) {
    let mut range = (1u32, 0u32);
    loop {
        let Some(text) = peer.recv().await else { return };
        let frame: Value = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(_) => continue,
        };
        let tag = frame.get(0).and_then(Value::as_str).unwrap_or_default();

        match tag {
            "command.status" => {
                peer.send(json!(["status", {"status": "idle"}]).to_string());
            }
            "command.init" => {
                if let Some(test_range) = frame.get(1).and_then(|p| p.get("test_range")) {
                    range = (
                        test_range[0].as_u64().unwrap_or(1) as u32,
                        test_range[1].as_u64().unwrap_or(0) as u32,
                    );
                }
                peer.send(json!(["judge.init", {"status": 0}]).to_string());
            }
            "command.code" => {
                peer.send(json!(["judge.write:code", {"status": 0}]).to_string());
            }
            "command.testcase" => {
                if matches!(script, WorkerScript::DieOnTestcase) {
                    return;
                }
                let index = frame[1][0].as_u64().unwrap_or(0);
                peer.send(
                    json!(["judge.write:testcase", {"status": 0, "index": index}]).to_string(),
                );
            }
            "command.judger" => {
                peer.send(json!(["judge.write:judger", {"status": 0}]).to_string());
            }
            "command.judge" => match &script {
                WorkerScript::AcceptAll {
                    time,
                    memory,
                    point,
                } => {
                    for index in range.0..=range.1 {
                        peer.send(
                            json!(["judge.result", {
                                "index": index,
                                "status": 0,
                                "time": time,
                                "memory": [memory.0, memory.1],
                                "point": point,
                            }])
                            .to_string(),
                        );
                    }
                    peer.send(json!(["judge.overall", 0]).to_string());
                    peer.send(json!(["judge.done", null]).to_string());
                }
                WorkerScript::Verdicts(statuses) => {
                    let mut worst = 0u8;
                    for index in range.0..=range.1 {
                        let status = statuses.get(&index).copied().unwrap_or(0);
                        worst = worst.max(status);
                        let point = if status == 0 { 1.0 } else { 0.0 };
                        peer.send(
                            json!(["judge.result", {
                                "index": index,
                                "status": status,
                                "time": 0.1,
                                "memory": [1024.0, 2048.0],
                                "point": point,
                            }])
                            .to_string(),
                        );
                    }
                    peer.send(json!(["judge.overall", worst]).to_string());
                    peer.send(json!(["judge.done", null]).to_string());
                }
                WorkerScript::CompileError(message) => {
                    peer.send(json!(["judge.error:compiler", message]).to_string());
                }
                WorkerScript::WarnThenAccept(warning) => {
                    peer.send(json!(["judge.compiler", warning]).to_string());
                    for index in range.0..=range.1 {
                        peer.send(
                            json!(["judge.result", {
                                "index": index,
                                "status": 0,
                                "time": 0.1,
                                "memory": [1024.0, 2048.0],
                                "point": 1.0,
                            }])
                            .to_string(),
                        );
                    }
                    peer.send(json!(["judge.overall", 0]).to_string());
                    peer.send(json!(["judge.done", null]).to_string());
                }
                WorkerScript::HangAfter(count) => {
                    for (offset, index) in (range.0..=range.1).enumerate() {
                        if offset >= *count {
                            break;
                        }
                        peer.send(
                            json!(["judge.result", {
                                "index": index,
                                "status": 0,
                                "time": 0.1,
                                "memory": [1024.0, 2048.0],
                                "point": 1.0,
                            }])
                            .to_string(),
                        );
                    }
                    // Stay quiet; the abort arrives through the main loop.
                }
                WorkerScript::DieOnTestcase => unreachable!(),
            },
            "command.abort" => {
                peer.send(json!(["judge.aborted", null]).to_string());
            }
            _ => {}
        }
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub _dir: tempfile::TempDir,
    pub data_path: PathBuf,
    pub stores: Stores,
    pub queues: Arc<QueueManager>,
    pub transcripts: TranscriptStore,
    pub connector: LocalConnect,
    pub dispatcher: Arc<Dispatcher>,
    pub declarations: Arc<Declarations>,
}

pub async fn harness(judge_mode: u8, max_retry: u32) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().to_path_buf();

    let stores = file::stores(data_path.clone());
    let queues = Arc::new(QueueManager::new(Arc::new(MemoryBackend::new())));
    let transcripts = TranscriptStore::new(data_path.clone());
    let connector = LocalConnect::new();
    let registry = Arc::new(ServerRegistry::new(data_path.join("servers.json")));
    let declarations = Arc::new(Declarations::from_parts(
        vec![LanguageDecl {
            name: "python".to_string(),
            versions: vec!["3.12".to_string()],
            file_name: "{id}.py".to_string(),
        }],
        vec![CompilerDecl {
            name: "cpython".to_string(),
            versions: vec!["3.12".to_string()],
        }],
    ));

    let dispatcher = Dispatcher::new(
        DispatcherConfig {
            judge_mode,
            reconnect_timeout: Duration::from_millis(100),
            recv_timeout: Duration::from_secs(2),
            max_retry,
            heartbeat_interval: Duration::from_millis(200),
            skip_connection_check: false,
        },
        Arc::new(connector.clone()),
        declarations.clone(),
        registry,
        transcripts.clone(),
        stores.submissions.clone(),
        stores.problems.clone(),
    );
    dispatcher.start();

    Harness {
        _dir: dir,
        data_path,
        stores,
        queues,
        transcripts,
        connector,
        dispatcher,
        declarations,
    }
}

impl Harness {
    /// Register a worker endpoint, connect the dispatcher to it and run the
    /// given script behind it.
    pub async fn add_worker(&self, id: &str, script: WorkerScript) {
        let uri = format!("ws://{id}");
        let peer = self.connector.register(&format!("{uri}/session"));
        spawn_worker(peer, script);
        self.dispatcher
            .add_server(Some(id.to_string()), format!("worker-{id}"), uri)
            .await
            .unwrap();
    }

    pub async fn seed_problem(&self, id: &str, testcases: u32) {
        let problem = Problem {
            id: id.to_string(),
            title: "echo".to_string(),
            description: String::new(),
            total_testcases: testcases,
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
            dir: String::new(),
            created_at: Utc::now(),
        };
        self.stores.problems.add(&problem).await.unwrap();

        let dir = self.data_path.join("problems").join(id);
        for index in 1..=testcases {
            let case_dir = dir.join("testcases").join(index.to_string());
            tokio::fs::create_dir_all(&case_dir).await.unwrap();
            tokio::fs::write(case_dir.join("input.txt"), format!("{index}"))
                .await
                .unwrap();
            tokio::fs::write(case_dir.join("output.txt"), format!("{index}"))
                .await
                .unwrap();
        }
    }

    pub async fn seed_submission(&self, id: &str, problem: &str) {
        let dir = self.data_path.join("submissions").join(id);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let file_path = dir.join(format!("{id}.py"));
        tokio::fs::write(&file_path, "print(input())").await.unwrap();

        let submission = Submission {
            id: id.to_string(),
            problem: problem.to_string(),
            lang: LangRef("python".to_string(), Some("3.12".to_string())),
            compiler: CompilerRef::latest("cpython"),
            author: "u1".to_string(),
            file_path: file_path.to_string_lossy().into_owned(),
            code: None,
            result: None,
            created_at: Utc::now(),
        };
        self.stores.submissions.add(&submission).await.unwrap();
    }

    /// Create the run queue, subscribe to its close event and admit the
    /// submission.
    pub async fn admit(
        &self,
        submission_id: &str,
        run_id: &str,
    ) -> (Arc<Queue>, mpsc::UnboundedReceiver<()>) {
        let queue = self
            .queues
            .create(&run_queue_name(submission_id, run_id))
            .unwrap();
        let (_close_id, closes) = queue.close_events();
        self.dispatcher
            .add_submission(submission_id.to_string(), queue.clone())
            .await;
        (queue, closes)
    }

    pub async fn wait_result(
        &self,
        submission_id: &str,
        closes: &mut mpsc::UnboundedReceiver<()>,
    ) -> SubmissionResult {
        timeout(WAIT, closes.recv())
            .await
            .expect("run did not finish in time")
            .expect("queue dropped without closing");
        self.stores
            .submissions
            .get(submission_id)
            .await
            .unwrap()
            .result
            .expect("run finished without a persisted result")
    }
}

pub fn frame_tags(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .map(|frame| {
            frame
                .get(0)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}
