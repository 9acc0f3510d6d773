//! Task route handlers.
//!
//! Mutations go through the same hub as WebSocket requests, so connected
//! sessions receive the resulting broadcasts.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use taskpulse_core::protocol::{Request, Response};
use taskpulse_core::task::model::{CreateTaskInput, DeleteTaskInput, Task, TaskStatus, UpdateTaskInput};
use taskpulse_core::HubError;

use super::error_status;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}

/// Unwrap a JSON body, reporting decode failures the way the hub does.
///
/// A body that parses but does not fit the input type is a validation error;
/// anything else (bad syntax, wrong content type) is a bad request.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, (StatusCode, String)> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(JsonRejection::JsonDataError(e)) => Err(error_status(HubError::validation(e.body_text()))),
        Err(rejection) => Err(error_status(HubError::bad_request(rejection.body_text()))),
    }
}

fn expect_task(response: Response) -> Result<Task, (StatusCode, String)> {
    match response {
        Response::Task(task) => Ok(task),
        other => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unexpected hub response: {:?}", other),
        )),
    }
}

pub async fn list_tasks(State(state): State<AppState>) -> Json<Vec<Task>> {
    Json(state.hub.store().list())
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let task = state.hub.store().get(&id).map_err(error_status)?;
    Ok(Json(task))
}

pub async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<CreateTaskInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), (StatusCode, String)> {
    let input = json_body(payload)?;
    let response = state
        .hub
        .handle(Request::CreateTask(input))
        .map_err(error_status)?;

    Ok((StatusCode::CREATED, Json(expect_task(response)?)))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<Task>, (StatusCode, String)> {
    let req = json_body(payload)?;
    let input = UpdateTaskInput {
        id,
        title: req.title,
        description: req.description,
        status: req.status,
    };
    let response = state
        .hub
        .handle(Request::UpdateTask(input))
        .map_err(error_status)?;

    Ok(Json(expect_task(response)?))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .hub
        .handle(Request::DeleteTask(DeleteTaskInput { id }))
        .map_err(error_status)?;

    Ok(StatusCode::NO_CONTENT)
}
