//! Gateway handler implementations

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::Response,
    Json,
};
use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    judge::{new_run_id, run_queue_name},
    models::ServerStatus,
    state::AppState,
};

use super::request::AddServerRequest;
use super::response::{AdmitResponse, MessageResponse, ServerAddedResponse};
use super::subscriber::{self, CloseReason, Downstream};

/// Schedule a judge run for a submission.
///
/// Allocates a fresh run queue and hands the submission to the dispatcher;
/// the returned queue id is what the judge socket subscribes to.
pub async fn admit_judge(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<(StatusCode, Json<AdmitResponse>)> {
    let submission = state.stores().submissions.get(&id).await?;
    state.stores().problems.get(&submission.problem).await?;

    // Re-roll until the run id collides with neither a live queue nor a
    // persisted one.
    let mut run_id = new_run_id();
    loop {
        let name = run_queue_name(&id, &run_id);
        if !state.queues().check(&name) && !state.queues().check_cache(&name).await? {
            break;
        }
        run_id = new_run_id();
    }

    let queue = state.queues().create(&run_queue_name(&id, &run_id))?;
    state.dispatcher().add_submission(id.clone(), queue).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(AdmitResponse {
            queue_id: format!("{id}:{run_id}"),
            message: "Submission queued for judging".to_string(),
        }),
    ))
}

/// Subscribe to a run over WebSocket
pub async fn judge_socket(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| stream_socket(state, id, socket))
}

async fn stream_socket(state: AppState, queue_id: String, socket: WebSocket) {
    let (sender, mut receiver) = socket.split();
    let submission_id = queue_id
        .split_once(':')
        .map(|(submission_id, _)| submission_id.to_string())
        .unwrap_or_default();

    // The upstream direction carries exactly one meaningful message: a
    // plain "abort" that cancels the run.
    let abort_listener = {
        let dispatcher = state.dispatcher().clone();
        tokio::spawn(async move {
            while let Some(Ok(message)) = receiver.next().await {
                if let Message::Text(text) = message {
                    if text.as_str() == "abort" {
                        dispatcher.abort_run(&submission_id);
                        break;
                    }
                }
            }
        })
    };

    let mut downstream = WsDownstream { sender };
    subscriber::stream_run(
        state.queues(),
        state.transcripts(),
        &queue_id,
        &mut downstream,
    )
    .await;
    abort_listener.abort();
}

struct WsDownstream {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl Downstream for WsDownstream {
    async fn deliver(&mut self, status: &str, data: Option<Value>) -> bool {
        let body = json!({"status": status, "data": data});
        let Ok(text) = serde_json::to_string(&body) else {
            return false;
        };
        self.sender.send(Message::Text(text.into())).await.is_ok()
    }

    async fn finish(&mut self, reason: CloseReason) {
        let frame = CloseFrame {
            code: reason.code(),
            reason: reason.text().into(),
        };
        let _ = self.sender.send(Message::Close(Some(frame))).await;
    }
}

/// List every judge server with its connection status
pub async fn list_servers(State(state): State<AppState>) -> Json<Vec<ServerStatus>> {
    Json(state.dispatcher().status().await)
}

/// Register and connect a new judge server
pub async fn add_server(
    State(state): State<AppState>,
    Json(payload): Json<AddServerRequest>,
) -> AppResult<(StatusCode, Json<ServerAddedResponse>)> {
    payload.validate()?;
    if !payload.uri.starts_with("ws://") && !payload.uri.starts_with("wss://") {
        return Err(AppError::Validation(format!(
            "Invalid judge server uri: {}",
            payload.uri
        )));
    }

    let descriptor = state
        .dispatcher()
        .add_server(payload.id, payload.name, payload.uri)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ServerAddedResponse {
            id: descriptor.id,
            name: descriptor.name,
            uri: descriptor.uri,
        }),
    ))
}

/// Pause scheduling on a server
pub async fn pause_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.dispatcher().pause(&id).await?;
    Ok(Json(MessageResponse {
        message: "paused".to_string(),
    }))
}

/// Resume scheduling on a server
pub async fn resume_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.dispatcher().resume(&id).await?;
    Ok(Json(MessageResponse {
        message: "resumed".to_string(),
    }))
}

/// Drop a server's connection and cancel its pending retry
pub async fn disconnect_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.dispatcher().disconnect(&id).await?;
    Ok(Json(MessageResponse {
        message: "disconnected".to_string(),
    }))
}

/// Reset a server's retry budget and reconnect
pub async fn reconnect_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.dispatcher().reconnect_with_id(&id).await?;
    Ok(Json(MessageResponse {
        message: "reconnecting".to_string(),
    }))
}

/// Disconnect a server and remove it from the registry
pub async fn remove_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.dispatcher().remove_server(&id).await?;
    Ok(Json(MessageResponse {
        message: "removed".to_string(),
    }))
}
