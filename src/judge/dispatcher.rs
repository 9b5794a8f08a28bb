//! Judge dispatcher
//!
//! Owns the worker connection pool and the admission queue, drives
//! reconnection and supervision, schedules runs under the configured
//! dispatch policy and aggregates verdicts into the final submission
//! result.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::JudgeConfig;
use crate::constants::{
    tags, CONNECTION_WAIT_POLL_SECS, FRAME_CHANNEL_CAPACITY, SCHEDULER_POLL_SECS,
};
use crate::models::{
    Declarations, Problem, ServerDescriptor, ServerStatus, StatusCode, Submission,
    SubmissionResult, WorkerState,
};
use crate::queue::Queue;
use crate::store::{ProblemStore, SubmissionStore};

use super::connection::{JudgeEvent, WorkerConnection};
use super::partition::chunks;
use super::protocol::TestVerdict;
use super::registry::ServerRegistry;
use super::transcript::TranscriptStore;
use super::transport::Connect;
use super::{parse_run_queue, JudgeError};

/// Dispatcher knobs, a copy of the judge section of the configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub judge_mode: u8,
    pub reconnect_timeout: Duration,
    pub recv_timeout: Duration,
    pub max_retry: u32,
    pub heartbeat_interval: Duration,
    /// Let the scheduler poll the admission queue even with an empty pool
    pub skip_connection_check: bool,
}

impl From<&JudgeConfig> for DispatcherConfig {
    fn from(config: &JudgeConfig) -> Self {
        Self {
            judge_mode: config.judge_mode,
            reconnect_timeout: config.reconnect_timeout,
            recv_timeout: config.recv_timeout,
            max_retry: config.max_retry,
            heartbeat_interval: config.heartbeat_interval,
            skip_connection_check: false,
        }
    }
}

/// The judge dispatcher. Shared behind an `Arc`; the scheduler and
/// supervisor loops are spawned from [`Dispatcher::start`].
pub struct Dispatcher {
    config: DispatcherConfig,
    connector: Arc<dyn Connect>,
    declarations: Arc<Declarations>,
    registry: Arc<ServerRegistry>,
    transcripts: TranscriptStore,
    submissions: Arc<dyn SubmissionStore>,
    problems: Arc<dyn ProblemStore>,

    connections: Mutex<BTreeMap<String, Option<Arc<WorkerConnection>>>>,
    /// Reconnect attempts per worker; `-1` cancels a pending retry
    retries: Mutex<HashMap<String, i64>>,
    /// Workers with a reconnect task in flight
    retrying: Mutex<HashSet<String>>,
    admission: Mutex<VecDeque<(String, Arc<Queue>)>>,
    aborts: Mutex<HashMap<String, CancellationToken>>,
    stop: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DispatcherConfig,
        connector: Arc<dyn Connect>,
        declarations: Arc<Declarations>,
        registry: Arc<ServerRegistry>,
        transcripts: TranscriptStore,
        submissions: Arc<dyn SubmissionStore>,
        problems: Arc<dyn ProblemStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            connector,
            declarations,
            registry,
            transcripts,
            submissions,
            problems,
            connections: Mutex::new(BTreeMap::new()),
            retries: Mutex::new(HashMap::new()),
            retrying: Mutex::new(HashSet::new()),
            admission: Mutex::new(VecDeque::new()),
            aborts: Mutex::new(HashMap::new()),
            stop: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    /// Spawn the scheduler and supervisor loops
    pub fn start(self: &Arc<Self>) -> (JoinHandle<()>, JoinHandle<()>) {
        let scheduler = tokio::spawn(Arc::clone(self).run());
        let supervisor = tokio::spawn(Arc::clone(self).supervise());
        (scheduler, supervisor)
    }

    /// Signal every loop and close every connection
    pub async fn shutdown(&self) {
        self.stop.cancel();
        let connections: Vec<Arc<WorkerConnection>> = {
            let pool = self.connections.lock().unwrap();
            pool.values().filter_map(Clone::clone).collect()
        };
        for connection in connections {
            connection.close().await;
        }
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    // =========================================================================
    // Connection pool
    // =========================================================================

    /// Open a connection for this descriptor and store it in the pool
    pub async fn connect(&self, descriptor: ServerDescriptor) -> Result<(), JudgeError> {
        {
            let pool = self.connections.lock().unwrap();
            let open = |connection: &Option<Arc<WorkerConnection>>| {
                connection.as_ref().is_some_and(|c| !c.is_closed())
            };
            if pool.get(&descriptor.id).is_some_and(open) {
                return Err(JudgeError::AlreadyConnected(descriptor.id));
            }
            if pool
                .values()
                .flatten()
                .any(|c| !c.is_closed() && c.descriptor().uri == descriptor.uri)
            {
                return Err(JudgeError::AlreadyConnected(descriptor.uri));
            }
        }

        let connection = WorkerConnection::connect(
            descriptor.clone(),
            &*self.connector,
            &self.declarations,
            self.config.recv_timeout,
            self.config.heartbeat_interval,
        )
        .await?;

        self.connections
            .lock()
            .unwrap()
            .insert(descriptor.id.clone(), Some(connection));
        self.retries.lock().unwrap().remove(&descriptor.id);
        Ok(())
    }

    /// Launch a reconnect task for every registered server
    pub async fn from_registry(self: &Arc<Self>) -> Result<(), JudgeError> {
        let servers = self.registry.list().await?;
        if servers.is_empty() {
            tracing::warn!("no judge server registered");
        }
        for descriptor in servers {
            self.connections
                .lock()
                .unwrap()
                .entry(descriptor.id.clone())
                .or_insert(None);
            self.spawn_reconnect(descriptor.id);
        }
        Ok(())
    }

    /// Close a worker's connection and cancel any pending retry
    pub async fn disconnect(&self, id: &str) -> Result<(), JudgeError> {
        let connection = {
            let mut pool = self.connections.lock().unwrap();
            if !pool.contains_key(id) {
                return Err(JudgeError::ServerNotFound(id.to_string()));
            }
            pool.remove(id).flatten()
        };
        if let Some(connection) = connection {
            connection.close().await;
        }
        self.retries.lock().unwrap().insert(id.to_string(), -1);
        Ok(())
    }

    /// Reset a worker's retry budget and launch a fresh reconnect task
    pub async fn reconnect_with_id(self: &Arc<Self>, id: &str) -> Result<(), JudgeError> {
        self.registry.get(id).await?;
        self.retries.lock().unwrap().insert(id.to_string(), 0);
        self.connections
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_insert(None);
        self.spawn_reconnect(id.to_string());
        Ok(())
    }

    /// Register a new server and connect to it. Connection trouble falls
    /// back to the reconnect loop.
    pub async fn add_server(
        self: &Arc<Self>,
        id: Option<String>,
        name: String,
        uri: String,
    ) -> Result<ServerDescriptor, JudgeError> {
        if let Some(id) = &id {
            if self.connections.lock().unwrap().contains_key(id) {
                return Err(JudgeError::AlreadyConnected(id.clone()));
            }
        }

        let descriptor = self.registry.add(id, name, uri).await?;
        self.connections
            .lock()
            .unwrap()
            .insert(descriptor.id.clone(), None);
        self.retries.lock().unwrap().remove(&descriptor.id);

        if let Err(err) = self.connect(descriptor.clone()).await {
            tracing::error!(server = %descriptor.id, %err, "failed to connect to new judge server");
            self.spawn_reconnect(descriptor.id.clone());
        }
        Ok(descriptor)
    }

    /// Disconnect a worker and drop it from the registry
    pub async fn remove_server(&self, id: &str) -> Result<(), JudgeError> {
        self.disconnect(id).await?;
        self.registry.remove(id).await?;
        self.retries.lock().unwrap().remove(id);
        Ok(())
    }

    pub async fn pause(&self, id: &str) -> Result<(), JudgeError> {
        self.open_connection(id)?.pause();
        Ok(())
    }

    pub async fn resume(&self, id: &str) -> Result<(), JudgeError> {
        self.open_connection(id)?.resume();
        Ok(())
    }

    /// Status snapshot of every pool entry
    pub async fn status(&self) -> Vec<ServerStatus> {
        let snapshot: Vec<(String, Option<Arc<WorkerConnection>>)> = {
            let pool = self.connections.lock().unwrap();
            pool.iter().map(|(id, c)| (id.clone(), c.clone())).collect()
        };

        let mut statuses = Vec::with_capacity(snapshot.len());
        for (id, connection) in snapshot {
            match connection {
                Some(connection) => statuses.push(connection.status().await),
                None => {
                    let name = self
                        .registry
                        .get(&id)
                        .await
                        .map(|d| d.name)
                        .unwrap_or_default();
                    statuses.push(ServerStatus {
                        id,
                        name,
                        status: WorkerState::Closed,
                    });
                }
            }
        }
        statuses
    }

    fn open_connection(&self, id: &str) -> Result<Arc<WorkerConnection>, JudgeError> {
        let pool = self.connections.lock().unwrap();
        pool.get(id)
            .and_then(Clone::clone)
            .filter(|c| !c.is_closed())
            .ok_or_else(|| JudgeError::ServerNotFound(id.to_string()))
    }

    fn open_connections(&self) -> Vec<Arc<WorkerConnection>> {
        let pool = self.connections.lock().unwrap();
        pool.values()
            .flatten()
            .filter(|c| !c.is_closed())
            .cloned()
            .collect()
    }

    // =========================================================================
    // Reconnection and supervision
    // =========================================================================

    fn spawn_reconnect(self: &Arc<Self>, id: String) {
        if !self.retrying.lock().unwrap().insert(id.clone()) {
            return;
        }
        let dispatcher = Arc::clone(self);
        self.tasks
            .lock()
            .unwrap()
            .spawn(async move { dispatcher.reconnect_loop(id).await });
    }

    async fn reconnect_loop(self: Arc<Self>, id: String) {
        while !self.stop.is_cancelled() {
            if self.retries.lock().unwrap().get(&id).copied() == Some(-1) {
                self.retries.lock().unwrap().remove(&id);
                tracing::info!(server = %id, "cancelled connect request");
                break;
            }

            let descriptor = match self.registry.get(&id).await {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    tracing::error!(server = %id, %err, "server is gone from the registry");
                    break;
                }
            };

            match self.connect(descriptor).await {
                Ok(()) => {
                    tracing::info!(server = %id, "connected to judge server");
                    break;
                }
                Err(JudgeError::AlreadyConnected(_)) => {
                    self.retries.lock().unwrap().remove(&id);
                    tracing::error!(server = %id, "already connected");
                    break;
                }
                Err(err) => {
                    let attempts = {
                        let mut retries = self.retries.lock().unwrap();
                        let entry = retries.entry(id.clone()).or_insert(0);
                        if *entry == -1 {
                            retries.remove(&id);
                            break;
                        }
                        *entry += 1;
                        *entry
                    };
                    if attempts >= self.config.max_retry as i64 {
                        tracing::error!(server = %id, %err, "retry limit reached");
                        break;
                    }
                    tracing::error!(
                        server = %id,
                        %err,
                        "failed to connect, retry in {:?}",
                        self.config.reconnect_timeout
                    );
                    tokio::select! {
                        _ = self.stop.cancelled() => break,
                        _ = tokio::time::sleep(self.config.reconnect_timeout) => {}
                    }
                }
            }
        }
        self.retrying.lock().unwrap().remove(&id);
    }

    /// Supervisor loop: sweep the pool and relaunch reconnect tasks for
    /// workers whose connection died.
    pub async fn supervise(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = tokio::time::sleep(self.config.heartbeat_interval) => {}
            }

            let mut dead = Vec::new();
            {
                let mut pool = self.connections.lock().unwrap();
                for (id, slot) in pool.iter_mut() {
                    match slot {
                        Some(connection) if connection.is_closed() => {
                            *slot = None;
                            dead.push(id.clone());
                        }
                        None => dead.push(id.clone()),
                        _ => {}
                    }
                }
            }

            for id in dead {
                let skip = {
                    let retries = self.retries.lock().unwrap();
                    matches!(retries.get(&id), Some(count) if *count == -1 || *count >= self.config.max_retry as i64)
                };
                if skip || self.retrying.lock().unwrap().contains(&id) {
                    continue;
                }
                tracing::error!(server = %id, "judge server disconnected, reconnecting");
                self.spawn_reconnect(id);
            }
        }
    }

    fn reap_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        while let Some(result) = tasks.try_join_next() {
            if let Err(err) = result {
                if err.is_panic() {
                    tracing::error!(%err, "judge task panicked");
                }
            }
        }
    }

    // =========================================================================
    // Admission and scheduling
    // =========================================================================

    /// Queue a submission for judging. The caller keeps the queue for its
    /// subscribers; the dispatcher writes the run frames into it.
    pub async fn add_submission(&self, submission_id: String, queue: Arc<Queue>) {
        let abort = CancellationToken::new();
        self.aborts
            .lock()
            .unwrap()
            .insert(submission_id.clone(), abort);

        if let Err(err) = queue.put(&json!([tags::WAITING]), false).await {
            tracing::error!(submission = %submission_id, %err, "failed to write waiting frame");
        }
        self.admission
            .lock()
            .unwrap()
            .push_back((submission_id, queue));
    }

    /// Signal the stop_judge token of a live run
    pub fn abort_run(&self, submission_id: &str) -> bool {
        match self.aborts.lock().unwrap().get(submission_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn is_free(&self) -> bool {
        let connections = self.open_connections();
        if connections.is_empty() {
            return false;
        }

        if self.config.judge_mode == 0 {
            // A connection driving a run answers status late; its judging
            // flag already disqualifies it without a wire round trip.
            for connection in &connections {
                if connection.is_judging() {
                    continue;
                }
                if connection.status().await.status == WorkerState::Idle {
                    return true;
                }
            }
            false
        } else {
            if connections.iter().any(|c| c.is_judging()) {
                return false;
            }
            let mut any_open = false;
            for connection in &connections {
                let state = connection.status().await.status;
                if state == WorkerState::Closed {
                    continue;
                }
                any_open = true;
                if state != WorkerState::Idle {
                    return false;
                }
            }
            any_open
        }
    }

    /// Scheduler loop
    pub async fn run(self: Arc<Self>) {
        tracing::info!("scheduler loop started");
        loop {
            if self.stop.is_cancelled() {
                break;
            }

            if !self.config.skip_connection_check && self.open_connections().is_empty() {
                tracing::warn!("no judge server connected, scheduler sleeping");
                while self.open_connections().is_empty() && !self.stop.is_cancelled() {
                    tokio::select! {
                        _ = self.stop.cancelled() => {}
                        _ = tokio::time::sleep(Duration::from_secs(CONNECTION_WAIT_POLL_SECS)) => {}
                    }
                }
                if self.stop.is_cancelled() {
                    break;
                }
                tracing::info!("judge server available, scheduler resuming");
            }

            self.reap_tasks();

            let pending = !self.admission.lock().unwrap().is_empty();
            if pending && self.is_free().await {
                let next = self.admission.lock().unwrap().pop_front();
                if let Some((submission_id, queue)) = next {
                    self.dispatch(submission_id, queue).await;
                }
            }

            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(SCHEDULER_POLL_SECS)) => {}
            }
        }
        tracing::info!("scheduler loop stopped");
    }

    async fn dispatch(self: &Arc<Self>, submission_id: String, queue: Arc<Queue>) {
        let submission = match self.submissions.get(&submission_id).await {
            Ok(submission) => submission,
            Err(err) => {
                tracing::error!(submission = %submission_id, %err, "admitted submission is gone");
                let _ = queue.put(&json!({"error": "submission not found"}), false).await;
                queue.close(false).await;
                self.aborts.lock().unwrap().remove(&submission_id);
                return;
            }
        };
        let problem = match self.problems.get(&submission.problem).await {
            Ok(problem) => problem,
            Err(err) => {
                tracing::error!(submission = %submission_id, %err, "problem is gone");
                let _ = queue.put(&json!({"error": "problem not found"}), false).await;
                queue.close(false).await;
                self.aborts.lock().unwrap().remove(&submission_id);
                return;
            }
        };

        let abort = self
            .aborts
            .lock()
            .unwrap()
            .get(&submission_id)
            .cloned()
            .unwrap_or_default();
        if abort.is_cancelled() {
            let _ = queue.put(&json!([tags::ABORT]), false).await;
            queue.close(false).await;
            self.aborts.lock().unwrap().remove(&submission_id);
            return;
        }

        match self.config.judge_mode {
            0 => {
                let dispatcher = Arc::clone(self);
                self.tasks.lock().unwrap().spawn(async move {
                    dispatcher.judge_psps(submission, problem, queue, abort).await;
                });
            }
            _ => self.judge_ptps(submission, problem, queue, abort).await,
        }
    }

    // =========================================================================
    // Mode 0: one submission, one server
    // =========================================================================

    async fn judge_psps(
        self: &Arc<Self>,
        submission: Submission,
        problem: Problem,
        queue: Arc<Queue>,
        abort: CancellationToken,
    ) {
        let mut selected = None;
        for connection in self.open_connections() {
            if connection.is_judging() {
                continue;
            }
            if connection.status().await.status == WorkerState::Idle {
                selected = Some(connection);
                break;
            }
        }
        let Some(connection) = selected else {
            tracing::warn!(submission = %submission.id, "every judge server is busy, requeueing");
            self.admission
                .lock()
                .unwrap()
                .push_back((submission.id.clone(), queue));
            return;
        };

        let _ = queue
            .put(&json!([tags::CATCHED, connection.name()]), false)
            .await;

        let events = match connection.judge(
            submission.clone(),
            problem.clone(),
            (1, problem.total_testcases),
            true,
            abort.clone(),
        ) {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!(submission = %submission.id, %err, "selected server rejected the run, requeueing");
                self.admission
                    .lock()
                    .unwrap()
                    .push_back((submission.id.clone(), queue));
                return;
            }
        };

        let mut events = events;
        let mut run = RunAccumulator::new(problem.total_testcases);
        while let Some(event) = events.recv().await {
            if self.stop.is_cancelled() {
                return;
            }
            match event {
                JudgeEvent::Initting => {
                    let _ = queue.put(&json!([tags::INITTING]), false).await;
                }
                JudgeEvent::Judging => {
                    let _ = queue.put(&json!([tags::JUDGING]), false).await;
                }
                JudgeEvent::Result(verdict) => {
                    run.add_result(&verdict);
                    let _ = queue.put(&json!([tags::RESULT, verdict]), false).await;
                }
                JudgeEvent::Overall(status) => run.record_overall(status),
                JudgeEvent::Compiler(warn) => run.add_warn(warn),
                JudgeEvent::CompileError(text) => {
                    run.fail(StatusCode::CompileError, text);
                    break;
                }
                JudgeEvent::SystemError(text) => {
                    run.fail(StatusCode::SystemError, text);
                    break;
                }
                JudgeEvent::Aborted => {
                    run.mark_aborted();
                    break;
                }
                JudgeEvent::Done => break,
                JudgeEvent::Debug(_) => {}
            }
        }

        self.complete_run(&submission, run.finish(), &queue).await;
    }

    // =========================================================================
    // Mode 1: one submission, all servers
    // =========================================================================

    async fn judge_ptps(
        self: &Arc<Self>,
        submission: Submission,
        problem: Problem,
        queue: Arc<Queue>,
        abort: CancellationToken,
    ) {
        let connections = self.open_connections();
        if connections.is_empty() {
            tracing::warn!(submission = %submission.id, "no open connection left, requeueing");
            self.admission
                .lock()
                .unwrap()
                .push_back((submission.id.clone(), queue));
            return;
        }

        let _ = queue.put(&json!([tags::CATCHED, null]), false).await;

        let parts = chunks(problem.total_testcases, connections.len());
        let (merged_tx, mut merged_rx) =
            tokio::sync::mpsc::channel::<JudgeEvent>(FRAME_CHANNEL_CAPACITY);

        let mut participants = 0usize;
        for (connection, range) in connections.iter().zip(parts) {
            if range.is_empty() {
                continue;
            }
            participants += 1;

            let events = connection.judge(
                submission.clone(),
                problem.clone(),
                (*range.start(), *range.end()),
                true,
                abort.clone(),
            );
            let forward = merged_tx.clone();
            match events {
                Ok(mut events) => {
                    tokio::spawn(async move {
                        while let Some(event) = events.recv().await {
                            if forward.send(event).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(err) => {
                    let _ = forward.send(JudgeEvent::SystemError(err.to_string())).await;
                }
            }
        }
        drop(merged_tx);

        let mut run = RunAccumulator::new(problem.total_testcases);
        let mut initting = 0usize;
        let mut judging = 0usize;
        while let Some(event) = merged_rx.recv().await {
            if self.stop.is_cancelled() {
                return;
            }
            match event {
                JudgeEvent::Initting => {
                    initting += 1;
                    // State changes pass through only once every worker reported.
                    if initting == participants {
                        let _ = queue.put(&json!([tags::INITTING]), false).await;
                    }
                }
                JudgeEvent::Judging => {
                    judging += 1;
                    if judging == participants {
                        let _ = queue.put(&json!([tags::JUDGING]), false).await;
                    }
                }
                JudgeEvent::Result(verdict) => {
                    run.add_result(&verdict);
                    let _ = queue.put(&json!([tags::RESULT, verdict]), false).await;
                }
                JudgeEvent::Overall(status) => run.record_overall(status),
                JudgeEvent::Compiler(warn) => run.add_warn(warn),
                JudgeEvent::CompileError(text) | JudgeEvent::SystemError(text) => {
                    run.fail(StatusCode::SystemError, text);
                }
                JudgeEvent::Aborted => run.mark_aborted(),
                JudgeEvent::Done | JudgeEvent::Debug(_) => {}
            }
        }

        self.complete_run(&submission, run.finish(), &queue).await;
    }

    // =========================================================================
    // Completion
    // =========================================================================

    async fn complete_run(
        &self,
        submission: &Submission,
        result: SubmissionResult,
        queue: &Arc<Queue>,
    ) {
        let mut updated = submission.clone();
        updated.result = Some(result.clone());
        if let Err(err) = self.submissions.update(&submission.id, &updated).await {
            tracing::error!(submission = %submission.id, %err, "failed to persist submission result");
        }

        let _ = queue.put(&json!([tags::OVERALL, result]), false).await;

        if let Some((submission_id, run_id)) = parse_run_queue(queue.name()) {
            match queue.get_all().await {
                Ok(frames) => {
                    if let Err(err) = self.transcripts.dump(submission_id, run_id, frames).await {
                        tracing::error!(submission = %submission_id, %err, "failed to dump transcript");
                    }
                }
                Err(err) => {
                    tracing::error!(submission = %submission.id, %err, "failed to read run frames");
                }
            }
        }

        queue.close(false).await;
        self.aborts.lock().unwrap().remove(&submission.id);
        tracing::info!(
            submission = %submission.id,
            status = %result.status,
            "run complete"
        );
    }
}

/// Accumulates the per-testcase frames of one run into the final result
struct RunAccumulator {
    total_testcases: u32,
    time: f64,
    avg_memory: f64,
    peak_memory: f64,
    points: f64,
    warn: BTreeSet<String>,
    error: BTreeSet<String>,
    overall: Vec<StatusCode>,
    failure: Option<StatusCode>,
    aborted: bool,
}

impl RunAccumulator {
    fn new(total_testcases: u32) -> Self {
        Self {
            total_testcases,
            time: 0.0,
            avg_memory: 0.0,
            peak_memory: 0.0,
            points: 0.0,
            warn: BTreeSet::new(),
            error: BTreeSet::new(),
            overall: Vec::new(),
            failure: None,
            aborted: false,
        }
    }

    fn add_result(&mut self, verdict: &TestVerdict) {
        self.time += verdict.time;
        self.avg_memory += verdict.memory.0;
        self.peak_memory += verdict.memory.1;
        self.points += verdict.point;
    }

    fn add_warn(&mut self, warn: String) {
        self.warn.insert(warn);
    }

    fn record_overall(&mut self, status: StatusCode) {
        self.overall.push(status);
    }

    /// Record a terminal failure: the error text is kept and resource
    /// figures are pinned to "not measured".
    fn fail(&mut self, status: StatusCode, error: String) {
        self.error.insert(error);
        self.failure.get_or_insert(status);
    }

    fn mark_aborted(&mut self) {
        self.aborted = true;
    }

    fn finish(self) -> SubmissionResult {
        let status = if self.aborted {
            StatusCode::Aborted
        } else if let Some(failure) = self.failure {
            failure
        } else {
            self.overall
                .iter()
                .max()
                .copied()
                .unwrap_or(StatusCode::SystemError)
        };

        let measured = self.failure.is_none() && !self.aborted;
        let n = f64::from(self.total_testcases.max(1));
        let (time, memory) = if measured {
            (
                self.time / n,
                (self.avg_memory / n, self.peak_memory / n),
            )
        } else {
            (-1.0, (-1.0, -1.0))
        };

        SubmissionResult {
            status,
            warn: self.warn.into_iter().collect::<Vec<_>>().join("\n"),
            error: self.error.into_iter().collect::<Vec<_>>().join("\n"),
            time,
            memory,
            point: self.points,
        }
    }
}
