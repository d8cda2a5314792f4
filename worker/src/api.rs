//! Worker HTTP surface: the four worker endpoints of the external
//! interface. `POST /tasks` only enqueues; `DELETE /tasks/{id}` enqueues a
//! Completed-targeted event for the execution loop to act on, following
//! the same split as the manager's handlers.

use crate::state::WorkerState;
use axum::{
    extract::{FromRequest, Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use shared::api::{endpoints, ErrorResponse, HealthResponse, ListTasksResponse, StatsResponse};
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

pub fn create_router(state: Arc<WorkerState>) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(health))
        .route(endpoints::TASKS, post(submit_task).get(list_tasks))
        .route(&format!("{}/{{id}}", endpoints::TASKS), delete(stop_task))
        .route(endpoints::STATS, get(stats))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse::default())
}

async fn submit_task(
    State(state): State<Arc<WorkerState>>,
    ValidatedJson(event): ValidatedJson<TaskEvent>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    info!(task_id = %event.task.id, event_id = %event.id, "worker: task event accepted");
    let task = event.task.clone();
    state.enqueue(event);
    Ok((StatusCode::CREATED, Json(task)))
}

async fn list_tasks(State(state): State<Arc<WorkerState>>) -> Result<Json<ListTasksResponse>, ApiError> {
    let tasks = state
        .tasks
        .list()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(ListTasksResponse { tasks }))
}

async fn stop_task(
    State(state): State<Arc<WorkerState>>,
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

    warn!(task_id = %task_id, "worker: stop requested");
    let event = TaskEvent::new(TaskState::Completed, task);
    state.enqueue(event);
    Ok(StatusCode::NO_CONTENT)
}

async fn stats(State(state): State<Arc<WorkerState>>) -> Result<Json<StatsResponse>, ApiError> {
    let snapshot = state.stats();
    let task_count = state
        .tasks
        .list()
        .map(|tasks| tasks.iter().filter(|t| t.state == TaskState::Running).count())
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(StatsResponse {
        memory_total: snapshot.memory_total,
        memory_available: snapshot.memory_available,
        disk_total: snapshot.disk_total,
        disk_available: snapshot.disk_available,
        load_avg_1: snapshot.load_avg_1,
        task_count,
    }))
}

/// Errors the worker's HTTP handlers can surface. As on the manager,
/// validation failures are the only ones visible to callers as 4xx.
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
    use crate::runtime::fake::FakeRuntime;
    use shared::Task;

    fn state() -> Arc<WorkerState> {
        Arc::new(WorkerState::for_memory("w1", Box::new(FakeRuntime::default())))
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
    async fn stats_reports_running_task_count() {
        let state = state();
        let mut task = Task::new("web", "nginx:latest");
        task.state = TaskState::Running;
        state.tasks.put(task.id, &task).unwrap();

        let Json(response) = stats(State(state)).await.unwrap();
        assert_eq!(response.task_count, 1);
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
