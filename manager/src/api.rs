//! Manager HTTP surface: translates the four manager endpoints of the
//! external interface into `ManagerState` operations and back.
//!
//! `POST /tasks` only enqueues; `DELETE /tasks/{id}` enqueues a
//! Completed-targeted event for the dispatch loop to act on. Neither handler
//! calls a worker directly, keeping outbound HTTP exclusively in the
//! background loops.

use crate::state::ManagerState;
use axum::{
    extract::{FromRequest, Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use shared::api::{endpoints, ErrorResponse, HealthResponse, ListNodesResponse, ListTasksResponse};
use shared::{State as TaskState, Task, TaskEvent};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// `Json` extractor wrapper that maps every decode failure (malformed
/// syntax, wrong shape, unknown fields) to [`ApiError::BadRequest`], so
/// `POST /tasks` always surfaces 400 per the external interface rather than
/// axum's default 422 for valid-JSON-but-wrong-shape bodies.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.to_string()))?;
        Ok(Self(value))
    }
}

pub fn create_router(state: Arc<ManagerState>) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(health))
        .route(endpoints::TASKS, post(submit_task).get(list_tasks))
        .route(&format!("{}/{{id}}", endpoints::TASKS), delete(stop_task))
        .route(endpoints::NODES, get(list_nodes))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse::default())
}

async fn submit_task(
    State(state): State<Arc<ManagerState>>,
    ValidatedJson(event): ValidatedJson<TaskEvent>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    info!(task_id = %event.task.id, event_id = %event.id, "manager: task event accepted");
    let task = event.task.clone();
    state.enqueue(event);
    Ok((StatusCode::CREATED, Json(task)))
}

async fn list_tasks(State(state): State<Arc<ManagerState>>) -> Result<Json<ListTasksResponse>, ApiError> {
    let tasks = state
        .tasks
        .list()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(ListTasksResponse { tasks }))
}

async fn stop_task(
    State(state): State<Arc<ManagerState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::BadRequest("missing task id".to_string()));
    }
    let task_id: Uuid = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid task id: {id}")))?;

    let task = state
        .tasks
        .get(task_id)
        .map_err(|_| ApiError::NotFound(task_id))?;

    warn!(task_id = %task_id, "manager: stop requested");
    let event = TaskEvent::new(TaskState::Completed, task);
    state.enqueue(event);
    Ok(StatusCode::NO_CONTENT)
}

async fn list_nodes(State(state): State<Arc<ManagerState>>) -> Json<ListNodesResponse> {
    Json(ListNodesResponse {
        nodes: state.nodes(),
    })
}

/// Errors the manager's HTTP handlers can surface. Per the error-handling
/// design, validation failures are the only ones visible to callers as 4xx;
/// everything else (scheduling, transport, runtime, storage) surfaces only
/// through subsequent `GET /tasks` observations, never through this enum.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(Uuid),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(id) => (StatusCode::NOT_FOUND, format!("unknown task id: {id}")),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::RoundRobin;
    use shared::Node;

    fn state() -> Arc<ManagerState> {
        Arc::new(ManagerState::for_memory(
            vec![Node::new("a", "http://a")],
            Box::new(RoundRobin::new()),
        ))
    }

    #[tokio::test]
    async fn submit_task_enqueues_and_echoes_task() {
        let state = state();
        let task = Task::new("web", "nginx:latest");
        let event = TaskEvent::new(TaskState::Scheduled, task.clone());
        let (status, Json(echoed)) = submit_task(State(state.clone()), ValidatedJson(event))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(echoed.id, task.id);
        assert_eq!(state.pending_len(), 1);
    }

    #[tokio::test]
    async fn stop_unknown_task_is_not_found() {
        let state = state();
        let err = stop_task(State(state), Path(Uuid::new_v4().to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn stop_task_with_missing_id_is_bad_request() {
        let state = state();
        let err = stop_task(State(state), Path(String::new())).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn unknown_field_in_submitted_event_is_bad_request() {
        let task = Task::new("web", "nginx:latest");
        let event = TaskEvent::new(TaskState::Scheduled, task);
        let mut body = serde_json::to_value(&event).unwrap();
        body.as_object_mut()
            .unwrap()
            .insert("bogus".to_string(), serde_json::json!(true));

        let request = axum::http::Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap();

        let err = ValidatedJson::<TaskEvent>::from_request(request, &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn malformed_json_body_is_bad_request() {
        let request = axum::http::Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();

        let err = ValidatedJson::<TaskEvent>::from_request(request, &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
