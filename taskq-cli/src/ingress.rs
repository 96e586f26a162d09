//! HTTP ingress that accepts tasks and hands them to the producer.

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use taskq_queue::{Producer, Task};
use tracing::{error, info};

#[derive(Clone)]
pub struct IngressState {
    producer: Producer,
    queues: Arc<HashSet<String>>,
    default_queue: Arc<str>,
}

impl IngressState {
    pub fn new(
        producer: Producer,
        queues: impl IntoIterator<Item = String>,
        default_queue: impl Into<String>,
    ) -> Self {
        Self {
            producer,
            queues: Arc::new(queues.into_iter().collect()),
            default_queue: Arc::from(default_queue.into()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EnqueueParams {
    /// Hold the task in the scheduled set for this many seconds
    pub delay_secs: Option<u64>,
}

pub fn router(state: IngressState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", post(enqueue_default))
        .route("/tasks/:queue", post(enqueue_named))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn enqueue_default(
    State(state): State<IngressState>,
    params: Result<Query<EnqueueParams>, QueryRejection>,
    body: Result<Json<Task>, JsonRejection>,
) -> Response {
    let queue = state.default_queue.to_string();
    enqueue(state, queue, params, body).await
}

async fn enqueue_named(
    State(state): State<IngressState>,
    Path(queue): Path<String>,
    params: Result<Query<EnqueueParams>, QueryRejection>,
    body: Result<Json<Task>, JsonRejection>,
) -> Response {
    enqueue(state, queue, params, body).await
}

async fn enqueue(
    state: IngressState,
    queue: String,
    params: Result<Query<EnqueueParams>, QueryRejection>,
    body: Result<Json<Task>, JsonRejection>,
) -> Response {
    let Json(task) = match body {
        Ok(task) => task,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    if !state.queues.contains(&queue) {
        return error_response(StatusCode::NOT_FOUND, format!("Unknown queue: {}", queue));
    }

    let delay = Duration::from_secs(params.delay_secs.unwrap_or(0));
    match state.producer.enqueue_delayed(&queue, &task, delay).await {
        Ok(()) => {
            info!(queue = %queue, task_id = %task.id, delay = ?delay, "Task accepted");
            (
                StatusCode::OK,
                Json(json!({"message": "Task added successfully"})),
            )
                .into_response()
        }
        Err(e) => {
            error!(queue = %queue, task_id = %task.id, error = %e, "Failed to add task");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to add task")
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"error": message.into()}))).into_response()
}
