//! Task management: models, validation and the authoritative store.

pub mod model;
pub mod store;

use model::Task;

/// Change event emitted by the [`store::TaskStore`] after a committed mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Created(Task),
    Updated(Task),
    Deleted(String),
}

impl TaskEvent {
    /// Id of the task the event refers to.
    pub fn task_id(&self) -> &str {
        match self {
            Self::Created(task) | Self::Updated(task) => &task.id,
            Self::Deleted(id) => id,
        }
    }
}
