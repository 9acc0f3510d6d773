//! Wire protocol of the mutation channel.
//!
//! Clients send `{"id": 1, "event": "createTask", "data": {...}}`. The server
//! answers each request with a `reply` frame carrying the same `id`, and pushes
//! broadcast events as `{"type": "taskCreated", "data": {...}}`.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HubError, HubResult};
use crate::presence::SessionId;
use crate::task::model::{CreateTaskInput, DeleteTaskInput, Task, UpdateTaskInput};
use crate::task::TaskEvent;

/// Raw inbound frame, before the payload is decoded for its event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl ClientFrame {
    pub fn parse(text: &str) -> HubResult<Self> {
        serde_json::from_str(text).map_err(|e| HubError::bad_request(format!("Malformed frame: {}", e)))
    }

    pub fn request(&self) -> HubResult<Request> {
        Request::decode(&self.event, self.data.clone())
    }
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetTasks,
    CreateTask(CreateTaskInput),
    UpdateTask(UpdateTaskInput),
    DeleteTask(DeleteTaskInput),
}

impl Request {
    /// Decode the payload for `event`. Payload shape errors are validation failures.
    pub fn decode(event: &str, data: Value) -> HubResult<Self> {
        match event {
            "getTasks" => Ok(Self::GetTasks),
            "createTask" => decode_payload(data).map(Self::CreateTask),
            "updateTask" => decode_payload(data).map(Self::UpdateTask),
            "deleteTask" => decode_payload(data).map(Self::DeleteTask),
            other => Err(HubError::bad_request(format!("Unknown event '{}'", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetTasks => "getTasks",
            Self::CreateTask(_) => "createTask",
            Self::UpdateTask(_) => "updateTask",
            Self::DeleteTask(_) => "deleteTask",
        }
    }
}

fn decode_payload<T: DeserializeOwned>(data: Value) -> HubResult<T> {
    serde_json::from_value(data).map_err(|e| HubError::validation(e.to_string()))
}

/// Successful result of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Tasks(Vec<Task>),
    Task(Task),
    Deleted(bool),
}

/// Server-initiated event pushed to sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    TaskCreated(Task),
    TaskUpdated(Task),
    TaskDeleted(String),
    UserJoined(SessionId),
    UserLeft(SessionId),
    OnlineUsers(Vec<SessionId>),
}

impl From<TaskEvent> for ServerEvent {
    fn from(event: TaskEvent) -> Self {
        match event {
            TaskEvent::Created(task) => Self::TaskCreated(task),
            TaskEvent::Updated(task) => Self::TaskUpdated(task),
            TaskEvent::Deleted(id) => Self::TaskDeleted(id),
        }
    }
}

/// Error details carried by a failed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&HubError> for ErrorBody {
    fn from(err: &HubError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Answer to one client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "reply")]
pub struct Reply {
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    pub fn from_result(id: Option<u64>, result: HubResult<Response>) -> Self {
        match result.and_then(|response| serde_json::to_value(response).map_err(HubError::from)) {
            Ok(data) => Self {
                id,
                ok: true,
                data: Some(data),
                error: None,
            },
            Err(err) => Self::failure(id, &err),
        }
    }

    pub fn failure(id: Option<u64>, err: &HubError) -> Self {
        Self {
            id,
            ok: false,
            data: None,
            error: Some(err.into()),
        }
    }
}

/// Anything the server writes to a session's socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Reply(Reply),
    Event(ServerEvent),
}

impl From<Reply> for ServerFrame {
    fn from(reply: Reply) -> Self {
        Self::Reply(reply)
    }
}

impl From<ServerEvent> for ServerFrame {
    fn from(event: ServerEvent) -> Self {
        Self::Event(event)
    }
}
