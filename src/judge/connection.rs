//! Worker connection lifecycle and judge protocol state machine

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::constants::{tags, DEBUG_TRACE_CAPACITY, FRAME_CHANNEL_CAPACITY, HEARTBEAT_MISS_LIMIT};
use crate::models::{
    Declarations, Problem, ServerDescriptor, ServerStatus, StatusCode, Submission, WorkerState,
};

use super::protocol::{ClientFrame, FrameClass, JudgeReply, JudgeSession, ServerFrame, TestVerdict};
use super::transport::{Connect, FrameSink, FrameSource};
use super::JudgeError;

/// Events yielded by a judge run, in the order the worker produced them
#[derive(Debug, Clone)]
pub enum JudgeEvent {
    Initting,
    Judging,
    Compiler(String),
    Result(TestVerdict),
    Overall(StatusCode),
    CompileError(String),
    SystemError(String),
    Aborted,
    Done,
    Debug(Value),
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    status: String,
}

struct FrameSenders {
    status: mpsc::Sender<ServerFrame>,
    judge: mpsc::Sender<ServerFrame>,
    other: mpsc::Sender<ServerFrame>,
}

impl FrameSenders {
    fn push_sentinel(&self) {
        let _ = self.status.try_send(ServerFrame::closed_sentinel());
        let _ = self.judge.try_send(ServerFrame::closed_sentinel());
        let _ = self.other.try_send(ServerFrame::closed_sentinel());
    }
}

/// A single long-lived session to one judge worker.
///
/// The connection owns its transport and two background tasks (receiver and
/// heartbeat). At most one judge run is in flight at a time; once `closed`
/// every operation short-circuits and the dispatcher is expected to
/// reconnect.
pub struct WorkerConnection {
    descriptor: ServerDescriptor,
    recv_timeout: Duration,

    sink: tokio::sync::Mutex<Box<dyn FrameSink>>,
    senders: FrameSenders,
    status_rx: tokio::sync::Mutex<mpsc::Receiver<ServerFrame>>,
    judge_rx: tokio::sync::Mutex<mpsc::Receiver<ServerFrame>>,
    other_rx: tokio::sync::Mutex<mpsc::Receiver<ServerFrame>>,

    judging: AtomicBool,
    paused: AtomicBool,
    closed: AtomicBool,
    stop_judge: Mutex<CancellationToken>,
    stop_recv: CancellationToken,

    recv_task: Mutex<Option<JoinHandle<()>>>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,

    debug_trace: Mutex<VecDeque<Value>>,
}

impl WorkerConnection {
    /// Open the session: connect the transport, send the three declaration
    /// frames, then start the receiver and heartbeat tasks.
    pub async fn connect(
        descriptor: ServerDescriptor,
        connector: &dyn Connect,
        declarations: &Declarations,
        recv_timeout: Duration,
        heartbeat_interval: Duration,
    ) -> Result<Arc<Self>, JudgeError> {
        let uri = descriptor.session_uri();
        let (mut sink, source) = connector
            .connect(&uri)
            .await
            .map_err(|e| JudgeError::Connection(e.to_string()))?;

        for frame in [
            ClientFrame::DeclareLanguage(declarations.language_payload().to_string()),
            ClientFrame::DeclareCompiler(declarations.compiler_payload().to_string()),
            ClientFrame::DeclareLoad,
        ] {
            let text = frame
                .encode()
                .map_err(|e| JudgeError::Connection(e.to_string()))?;
            sink.send_text(text)
                .await
                .map_err(|e| JudgeError::Connection(e.to_string()))?;
        }

        let (status_tx, status_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (judge_tx, judge_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (other_tx, other_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);

        let connection = Arc::new(Self {
            descriptor,
            recv_timeout,
            sink: tokio::sync::Mutex::new(sink),
            senders: FrameSenders {
                status: status_tx,
                judge: judge_tx,
                other: other_tx,
            },
            status_rx: tokio::sync::Mutex::new(status_rx),
            judge_rx: tokio::sync::Mutex::new(judge_rx),
            other_rx: tokio::sync::Mutex::new(other_rx),
            judging: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            stop_judge: Mutex::new(CancellationToken::new()),
            stop_recv: CancellationToken::new(),
            recv_task: Mutex::new(None),
            heartbeat_task: Mutex::new(None),
            debug_trace: Mutex::new(VecDeque::with_capacity(DEBUG_TRACE_CAPACITY)),
        });

        connection.spawn_receiver(source);
        connection.spawn_heartbeat(heartbeat_interval);

        tracing::info!(server = %connection.descriptor.id, %uri, "connected to judge server");
        Ok(connection)
    }

    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_judging(&self) -> bool {
        self.judging.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Stop scheduling runs onto this worker without dropping the session
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Snapshot of the connection's local debug trace
    pub fn debug_trace(&self) -> Vec<Value> {
        self.debug_trace.lock().unwrap().iter().cloned().collect()
    }

    /// Tear the session down. Idempotent: signals both stop tokens, wakes
    /// any pending channel reader with a `closed` sentinel and closes the
    /// transport.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!(server = %self.descriptor.id, "closing judge server connection");
        self.stop_judge.lock().unwrap().cancel();
        self.stop_recv.cancel();
        self.senders.push_sentinel();
        self.sink.lock().await.close().await;
    }

    /// Await the background tasks after `close` (used on shutdown)
    pub async fn join_tasks(&self) {
        let recv = self.recv_task.lock().unwrap().take();
        let heartbeat = self.heartbeat_task.lock().unwrap().take();
        if let Some(task) = recv {
            let _ = task.await;
        }
        if let Some(task) = heartbeat {
            let _ = task.await;
        }
    }

    /// Query the worker's state. Transport trouble is absorbed: the
    /// connection turns `closed` and that is what gets reported.
    pub async fn status(&self) -> ServerStatus {
        let state = if self.is_closed() {
            WorkerState::Closed
        } else if self.is_paused() {
            WorkerState::Paused
        } else {
            match self.query_status().await {
                Ok(state) => state,
                Err(_) => {
                    self.close().await;
                    WorkerState::Closed
                }
            }
        };

        ServerStatus {
            id: self.descriptor.id.clone(),
            name: self.descriptor.name.clone(),
            status: state,
        }
    }

    async fn query_status(&self) -> Result<WorkerState, JudgeError> {
        self.send(ClientFrame::Status).await?;

        let mut status_rx = self.status_rx.lock().await;
        let frame = timeout(self.recv_timeout, status_rx.recv())
            .await
            .map_err(|_| JudgeError::NotReceiving)?
            .ok_or(JudgeError::Closed)?;
        if frame.tag == tags::CLOSED {
            return Err(JudgeError::Closed);
        }

        let payload: StatusPayload = frame
            .payload
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| JudgeError::Connection(e.to_string()))?
            .ok_or_else(|| JudgeError::Connection("status frame without payload".to_string()))?;

        Ok(match payload.status.as_str() {
            "idle" => WorkerState::Idle,
            _ => WorkerState::Busy,
        })
    }

    /// Run the judge protocol for `test_range` of this submission.
    ///
    /// Returns the event stream of the run. The driver task owns the wire
    /// exchange; cancelling `abort` makes it send `command.abort` and finish
    /// with [`JudgeEvent::Aborted`]. Step failures terminate the stream with
    /// [`JudgeEvent::SystemError`].
    pub fn judge(
        self: &Arc<Self>,
        submission: Submission,
        problem: Problem,
        test_range: (u32, u32),
        skip_debug: bool,
        abort: CancellationToken,
    ) -> Result<mpsc::Receiver<JudgeEvent>, JudgeError> {
        if self.is_closed() {
            return Err(JudgeError::Closed);
        }
        if self.judging.swap(true, Ordering::SeqCst) {
            return Err(JudgeError::ServerBusy);
        }
        *self.stop_judge.lock().unwrap() = abort.clone();

        let (events_tx, events_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let connection = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = connection
                .drive_judge(&submission, &problem, test_range, skip_debug, &abort, &events_tx)
                .await
            {
                tracing::error!(
                    server = %connection.descriptor.id,
                    submission = %submission.id,
                    %err,
                    "judge run failed"
                );
                let _ = events_tx.send(JudgeEvent::SystemError(err.to_string())).await;
            }
            connection.judging.store(false, Ordering::SeqCst);
        });

        Ok(events_rx)
    }

    async fn drive_judge(
        &self,
        submission: &Submission,
        problem: &Problem,
        test_range: (u32, u32),
        skip_debug: bool,
        abort: &CancellationToken,
        events: &mpsc::Sender<JudgeEvent>,
    ) -> Result<(), JudgeError> {
        let mut judge_rx = self.judge_rx.lock().await;

        // A previous run may have left late frames behind (an abort
        // acknowledgement, trailing results). They must not be mistaken for
        // this run's setup replies.
        while let Ok(stale) = judge_rx.try_recv() {
            if stale.tag == tags::CLOSED {
                return Err(JudgeError::Closed);
            }
            self.push_debug(json!([stale.tag, stale.payload]));
        }

        let _ = events.send(JudgeEvent::Initting).await;
        self.send(ClientFrame::Start).await?;

        self.send(ClientFrame::Init(Box::new(JudgeSession {
            submission_id: submission.id.clone(),
            lang: submission.lang.clone(),
            compiler: submission.compiler.clone(),
            test_range,
            test_file: problem.test_name.clone(),
            test_type: problem.test_type,
            judge_mode: problem.mode.clone(),
            point: problem.point_per_testcase,
            limit: problem.limit.clone(),
        })))
        .await?;
        match self.recv_reply(&mut judge_rx).await? {
            JudgeReply::Init(ack) if ack.ok() => {}
            JudgeReply::Init(ack) => {
                return Err(JudgeError::Init(ack.error.unwrap_or_default()));
            }
            JudgeReply::ConnectionClosed => return Err(JudgeError::Closed),
            other => return Err(JudgeError::Init(format!("unexpected reply {other:?}"))),
        }

        let code = tokio::fs::read_to_string(&submission.file_path)
            .await
            .map_err(|e| JudgeError::CodeWrite(e.to_string()))?;
        self.send(ClientFrame::Code(code)).await?;
        match self.recv_reply(&mut judge_rx).await? {
            JudgeReply::WriteCode(ack) if ack.ok() => {}
            JudgeReply::WriteCode(ack) => {
                return Err(JudgeError::CodeWrite(ack.error.unwrap_or_default()));
            }
            JudgeReply::ConnectionClosed => return Err(JudgeError::Closed),
            other => return Err(JudgeError::CodeWrite(format!("unexpected reply {other:?}"))),
        }

        for index in test_range.0..=test_range.1 {
            let (input_path, output_path) = problem.testcase_paths(index);
            let input = tokio::fs::read_to_string(&input_path)
                .await
                .map_err(|e| JudgeError::TestcaseWrite(e.to_string()))?;
            let output = tokio::fs::read_to_string(&output_path)
                .await
                .map_err(|e| JudgeError::TestcaseWrite(e.to_string()))?;

            self.send(ClientFrame::Testcase {
                index,
                input,
                output,
            })
            .await?;
            match self.recv_reply(&mut judge_rx).await? {
                JudgeReply::WriteTestcase(ack) if ack.ok() => {
                    if ack.index != Some(index) {
                        return Err(JudgeError::TestcaseMismatch {
                            sent: index,
                            acked: ack.index.unwrap_or(0),
                        });
                    }
                }
                JudgeReply::WriteTestcase(ack) => {
                    return Err(JudgeError::TestcaseWrite(ack.error.unwrap_or_default()));
                }
                JudgeReply::ConnectionClosed => return Err(JudgeError::Closed),
                other => {
                    return Err(JudgeError::TestcaseWrite(format!("unexpected reply {other:?}")));
                }
            }
        }

        if let Some(judger_path) = problem.judger_path() {
            let judger = tokio::fs::read_to_string(&judger_path)
                .await
                .map_err(|e| JudgeError::JudgerWrite(e.to_string()))?;
            self.send(ClientFrame::Judger(judger)).await?;
            match self.recv_reply(&mut judge_rx).await? {
                JudgeReply::WriteJudger(ack) if ack.ok() => {}
                JudgeReply::WriteJudger(ack) => {
                    return Err(JudgeError::JudgerWrite(ack.error.unwrap_or_default()));
                }
                JudgeReply::ConnectionClosed => return Err(JudgeError::Closed),
                other => {
                    return Err(JudgeError::JudgerWrite(format!("unexpected reply {other:?}")));
                }
            }
        }

        let _ = events.send(JudgeEvent::Judging).await;
        self.send(ClientFrame::Judge).await?;

        loop {
            let frame = tokio::select! {
                _ = abort.cancelled() => {
                    let _ = self.send(ClientFrame::Abort).await;
                    let _ = events.send(JudgeEvent::Aborted).await;
                    return Ok(());
                }
                _ = self.stop_recv.cancelled() => return Err(JudgeError::Closed),
                frame = judge_rx.recv() => frame.ok_or(JudgeError::Closed)?,
            };

            match JudgeReply::decode(frame) {
                JudgeReply::Result(verdict) => {
                    let _ = events.send(JudgeEvent::Result(verdict)).await;
                }
                JudgeReply::Compiler(warn) => {
                    let _ = events.send(JudgeEvent::Compiler(warn)).await;
                }
                JudgeReply::Overall(status) => {
                    let _ = events.send(JudgeEvent::Overall(status)).await;
                }
                JudgeReply::Done => {
                    let _ = events.send(JudgeEvent::Done).await;
                    return Ok(());
                }
                JudgeReply::Aborted => {
                    let _ = events.send(JudgeEvent::Aborted).await;
                    return Ok(());
                }
                JudgeReply::CompileError(text) => {
                    let _ = events.send(JudgeEvent::CompileError(text)).await;
                    return Ok(());
                }
                JudgeReply::SystemError(text) => {
                    let _ = events.send(JudgeEvent::SystemError(text)).await;
                    return Ok(());
                }
                JudgeReply::ConnectionClosed => return Err(JudgeError::Closed),
                JudgeReply::Unknown { tag, payload } => {
                    let entry = json!([tag, payload]);
                    self.push_debug(entry.clone());
                    if !skip_debug {
                        let _ = events.send(JudgeEvent::Debug(entry)).await;
                    }
                }
                // Write acknowledgements never arrive once judging started.
                other => self.push_debug(json!(format!("{other:?}"))),
            }
        }
    }

    /// Next frame from the `other` channel (anything not status or judge)
    pub async fn other_frame(&self) -> Option<ServerFrame> {
        self.other_rx.lock().await.recv().await
    }

    async fn recv_reply(
        &self,
        judge_rx: &mut mpsc::Receiver<ServerFrame>,
    ) -> Result<JudgeReply, JudgeError> {
        let frame = timeout(self.recv_timeout, judge_rx.recv())
            .await
            .map_err(|_| JudgeError::NotReceiving)?
            .ok_or(JudgeError::Closed)?;
        Ok(JudgeReply::decode(frame))
    }

    async fn send(&self, frame: ClientFrame) -> Result<(), JudgeError> {
        if self.is_closed() {
            return Err(JudgeError::Closed);
        }
        let text = frame
            .encode()
            .map_err(|e| JudgeError::Connection(e.to_string()))?;

        let result = self.sink.lock().await.send_text(text).await;
        if result.is_err() {
            self.close().await;
            return Err(JudgeError::Closed);
        }
        Ok(())
    }

    fn push_debug(&self, entry: Value) {
        let mut trace = self.debug_trace.lock().unwrap();
        if trace.len() == DEBUG_TRACE_CAPACITY {
            trace.pop_front();
        }
        trace.push_back(entry);
    }

    fn spawn_receiver(self: &Arc<Self>, mut source: Box<dyn FrameSource>) {
        let connection = Arc::clone(self);
        let token = self.stop_recv.clone();
        let handle = tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => break,
                    next = source.next_text() => next,
                };

                match next {
                    Ok(Some(text)) => match ServerFrame::decode(&text) {
                        Ok(frame) => connection.route(frame).await,
                        Err(err) => {
                            tracing::warn!(
                                server = %connection.descriptor.id,
                                %err,
                                "dropping undecodable frame"
                            );
                        }
                    },
                    Ok(None) => {
                        tracing::error!(server = %connection.descriptor.id, "connection closed");
                        break;
                    }
                    Err(err) => {
                        tracing::error!(server = %connection.descriptor.id, %err, "receive failed");
                        break;
                    }
                }
            }
            connection.close().await;
        });
        *self.recv_task.lock().unwrap() = Some(handle);
    }

    async fn route(&self, frame: ServerFrame) {
        let sender = match frame.class() {
            FrameClass::Status => &self.senders.status,
            FrameClass::Judge => &self.senders.judge,
            FrameClass::Other => &self.senders.other,
        };
        let _ = sender.send(frame).await;
    }

    fn spawn_heartbeat(self: &Arc<Self>, interval: Duration) {
        let connection = Arc::clone(self);
        let token = self.stop_recv.clone();
        let handle = tokio::spawn(async move {
            let mut misses = 0u32;
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }

                let ping = {
                    let mut sink = connection.sink.lock().await;
                    timeout(connection.recv_timeout, sink.ping()).await
                };
                match ping {
                    Ok(Ok(())) => misses = 0,
                    _ => {
                        misses += 1;
                        if misses >= HEARTBEAT_MISS_LIMIT {
                            tracing::error!(
                                server = %connection.descriptor.id,
                                "heartbeat failed, closing connection"
                            );
                            connection.close().await;
                            return;
                        }
                    }
                }
            }
        });
        *self.heartbeat_task.lock().unwrap() = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::super::transport::local;
    use super::*;
    use crate::models::{CompilerRef, JudgeMode, LangRef, Limit, TestType};
    use chrono::Utc;
    use std::path::Path;

    fn declarations() -> Declarations {
        Declarations::from_parts(
            vec![crate::models::LanguageDecl {
                name: "python".to_string(),
                versions: vec!["3.12".to_string()],
                file_name: "{id}.py".to_string(),
            }],
            vec![crate::models::CompilerDecl {
                name: "cpython".to_string(),
                versions: vec!["3.12".to_string()],
            }],
        )
    }

    fn descriptor() -> ServerDescriptor {
        ServerDescriptor {
            id: "0".to_string(),
            name: "worker-0".to_string(),
            uri: "ws://worker-0".to_string(),
        }
    }

    async fn submission_on_disk(dir: &Path) -> Submission {
        let file_path = dir.join("s1.py");
        tokio::fs::write(&file_path, "print(input())").await.unwrap();
        Submission {
            id: "s1".to_string(),
            problem: "p1".to_string(),
            lang: LangRef("python".to_string(), Some("3.12".to_string())),
            compiler: CompilerRef::latest("cpython"),
            author: "u1".to_string(),
            file_path: file_path.to_string_lossy().into_owned(),
            code: None,
            result: None,
            created_at: Utc::now(),
        }
    }

    async fn problem_on_disk(dir: &Path, testcases: u32) -> Problem {
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
        Problem {
            id: "p1".to_string(),
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
            dir: dir.to_string_lossy().into_owned(),
            created_at: Utc::now(),
        }
    }

    async fn connect(peer_uri: &str) -> (Arc<WorkerConnection>, local::LocalPeer) {
        let connector = local::LocalConnect::new();
        let mut peer = connector.register(peer_uri);
        let connection = WorkerConnection::connect(
            descriptor(),
            &connector,
            &declarations(),
            Duration::from_secs(1),
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        // Drain the three declaration frames.
        for expected in ["declare.language", "declare.compiler", "declare.load"] {
            let frame = peer.recv().await.unwrap();
            assert!(frame.contains(expected), "expected {expected} in {frame}");
        }
        (connection, peer)
    }

    #[tokio::test]
    async fn status_round_trip() {
        let (connection, mut peer) = connect("ws://worker-0/session").await;

        let status_task = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.status().await })
        };
        assert_eq!(peer.recv().await.unwrap(), r#"["command.status"]"#);
        peer.send(r#"["status", {"status": "idle"}]"#);

        let status = status_task.await.unwrap();
        assert_eq!(status.status, WorkerState::Idle);
        assert_eq!(status.name, "worker-0");

        connection.close().await;
        assert_eq!(connection.status().await.status, WorkerState::Closed);
    }

    #[tokio::test]
    async fn paused_connection_reports_paused_without_wire_traffic() {
        let (connection, _peer) = connect("ws://worker-0/session").await;
        connection.pause();
        assert_eq!(connection.status().await.status, WorkerState::Paused);
        connection.resume();
        assert!(!connection.is_paused());
    }

    #[tokio::test]
    async fn judge_run_walks_the_protocol_and_streams_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let submission = submission_on_disk(dir.path()).await;
        let problem = problem_on_disk(dir.path(), 2).await;
        let (connection, mut peer) = connect("ws://worker-0/session").await;

        let mut events = connection
            .judge(
                submission,
                problem,
                (1, 2),
                true,
                CancellationToken::new(),
            )
            .unwrap();
        assert!(connection.is_judging());

        assert!(matches!(events.recv().await, Some(JudgeEvent::Initting)));

        assert!(peer.recv().await.unwrap().contains("command.start"));
        let init = peer.recv().await.unwrap();
        assert!(init.contains("command.init"));
        assert!(init.contains("\"test_range\":[1,2]"));
        peer.send(r#"["judge.init", {"status": 0}]"#);

        assert!(peer.recv().await.unwrap().contains("command.code"));
        peer.send(r#"["judge.write:code", {"status": 0}]"#);

        for index in 1..=2 {
            let frame = peer.recv().await.unwrap();
            assert!(frame.contains("command.testcase"));
            peer.send(format!(
                r#"["judge.write:testcase", {{"status": 0, "index": {index}}}]"#
            ));
        }

        assert!(matches!(events.recv().await, Some(JudgeEvent::Judging)));
        assert!(peer.recv().await.unwrap().contains("command.judge"));

        peer.send(
            r#"["judge.result", {"index": 1, "status": 0, "time": 0.1, "memory": [1024.0, 2048.0], "point": 1.0}]"#,
        );
        peer.send(r#"["judge.overall", 0]"#);
        peer.send(r#"["judge.done", null]"#);

        assert!(matches!(events.recv().await, Some(JudgeEvent::Result(v)) if v.index == 1));
        assert!(matches!(
            events.recv().await,
            Some(JudgeEvent::Overall(StatusCode::Accepted))
        ));
        assert!(matches!(events.recv().await, Some(JudgeEvent::Done)));
        assert!(events.recv().await.is_none());
        assert!(!connection.is_judging());
    }

    #[tokio::test]
    async fn testcase_index_mismatch_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let submission = submission_on_disk(dir.path()).await;
        let problem = problem_on_disk(dir.path(), 1).await;
        let (connection, mut peer) = connect("ws://worker-0/session").await;

        let mut events = connection
            .judge(
                submission,
                problem,
                (1, 1),
                true,
                CancellationToken::new(),
            )
            .unwrap();

        assert!(matches!(events.recv().await, Some(JudgeEvent::Initting)));
        peer.recv().await.unwrap(); // start
        peer.recv().await.unwrap(); // init
        peer.send(r#"["judge.init", {"status": 0}]"#);
        peer.recv().await.unwrap(); // code
        peer.send(r#"["judge.write:code", {"status": 0}]"#);
        peer.recv().await.unwrap(); // testcase 1
        peer.send(r#"["judge.write:testcase", {"status": 0, "index": 2}]"#);

        assert!(matches!(
            events.recv().await,
            Some(JudgeEvent::SystemError(text)) if text.contains("mismatch")
        ));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn abort_sends_command_and_yields_aborted() {
        let dir = tempfile::tempdir().unwrap();
        let submission = submission_on_disk(dir.path()).await;
        let problem = problem_on_disk(dir.path(), 1).await;
        let (connection, mut peer) = connect("ws://worker-0/session").await;

        let abort = CancellationToken::new();
        let mut events = connection
            .judge(submission, problem, (1, 1), true, abort.clone())
            .unwrap();

        assert!(matches!(events.recv().await, Some(JudgeEvent::Initting)));
        peer.recv().await.unwrap(); // start
        peer.recv().await.unwrap(); // init
        peer.send(r#"["judge.init", {"status": 0}]"#);
        peer.recv().await.unwrap(); // code
        peer.send(r#"["judge.write:code", {"status": 0}]"#);
        peer.recv().await.unwrap(); // testcase 1
        peer.send(r#"["judge.write:testcase", {"status": 0, "index": 1}]"#);
        assert!(matches!(events.recv().await, Some(JudgeEvent::Judging)));
        peer.recv().await.unwrap(); // judge

        abort.cancel();
        assert!(matches!(events.recv().await, Some(JudgeEvent::Aborted)));
        assert!(events.recv().await.is_none());
        assert_eq!(peer.recv().await.unwrap(), r#"["command.abort"]"#);
    }

    #[tokio::test]
    async fn transport_death_mid_run_surfaces_as_system_error() {
        let dir = tempfile::tempdir().unwrap();
        let submission = submission_on_disk(dir.path()).await;
        let problem = problem_on_disk(dir.path(), 1).await;
        let (connection, mut peer) = connect("ws://worker-0/session").await;

        let mut events = connection
            .judge(
                submission,
                problem,
                (1, 1),
                true,
                CancellationToken::new(),
            )
            .unwrap();

        assert!(matches!(events.recv().await, Some(JudgeEvent::Initting)));
        peer.recv().await.unwrap(); // start
        peer.recv().await.unwrap(); // init
        drop(peer);

        assert!(matches!(events.recv().await, Some(JudgeEvent::SystemError(_))));
        assert!(events.recv().await.is_none());
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn second_judge_call_is_rejected_while_busy() {
        let dir = tempfile::tempdir().unwrap();
        let submission = submission_on_disk(dir.path()).await;
        let problem = problem_on_disk(dir.path(), 1).await;
        let (connection, _peer) = connect("ws://worker-0/session").await;

        let _events = connection
            .judge(
                submission.clone(),
                problem.clone(),
                (1, 1),
                true,
                CancellationToken::new(),
            )
            .unwrap();
        assert!(matches!(
            connection.judge(submission, problem, (1, 1), true, CancellationToken::new()),
            Err(JudgeError::ServerBusy)
        ));
    }
}
