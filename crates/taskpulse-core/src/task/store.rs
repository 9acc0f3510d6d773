//! Authoritative in-memory task collection.
//!
//! All reads and writes go through one mutex. Change listeners are invoked
//! while that mutex is still held, so every listener observes events in the
//! exact order the mutations were committed.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::model::{validate_id, CreateTaskInput, Task, UpdateTaskInput};
use super::TaskEvent;
use crate::error::{HubError, HubResult};
use crate::lock;

type Listener = Box<dyn Fn(&TaskEvent) + Send + Sync>;

#[derive(Default)]
struct StoreState {
    tasks: Vec<Task>,
    listeners: Vec<Listener>,
}

impl StoreState {
    fn emit(&self, event: TaskEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }
}

/// The single owner of every task record.
#[derive(Default)]
pub struct TaskStore {
    state: Mutex<StoreState>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a change listener.
    ///
    /// Listeners run inside the store's critical section and must not call
    /// back into the store.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&TaskEvent) + Send + Sync + 'static,
    {
        lock(&self.state).listeners.push(Box::new(listener));
    }

    /// List all tasks in insertion order.
    pub fn list(&self) -> Vec<Task> {
        lock(&self.state).tasks.clone()
    }

    /// Get a task by ID.
    pub fn get(&self, id: &str) -> HubResult<Task> {
        let state = lock(&self.state);
        state
            .position(id)
            .map(|idx| state.tasks[idx].clone())
            .ok_or_else(|| HubError::not_found(id))
    }

    pub fn len(&self) -> usize {
        lock(&self.state).tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a new task.
    pub fn create(&self, input: CreateTaskInput) -> HubResult<Task> {
        input.validate()?;

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: input.title,
            description: input.description,
            status: input.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let mut state = lock(&self.state);
        state.tasks.push(task.clone());
        debug!(task_id = %task.id, tasks = state.tasks.len(), "Task created");
        state.emit(TaskEvent::Created(task.clone()));
        Ok(task)
    }

    /// Merge the fields present in `input` onto an existing task.
    pub fn update(&self, input: UpdateTaskInput) -> HubResult<Task> {
        input.validate()?;

        let mut state = lock(&self.state);
        let idx = state
            .position(&input.id)
            .ok_or_else(|| HubError::not_found(input.id.as_str()))?;

        let task = &mut state.tasks[idx];
        if let Some(title) = input.title {
            task.title = title;
        }
        if let Some(description) = input.description {
            task.description = Some(description);
        }
        if let Some(status) = input.status {
            task.status = status;
        }
        task.updated_at = next_timestamp(task.updated_at);

        let updated = task.clone();
        debug!(task_id = %updated.id, status = %updated.status, "Task updated");
        state.emit(TaskEvent::Updated(updated.clone()));
        Ok(updated)
    }

    /// Delete a task. Returns `false` when no task had that id.
    pub fn delete(&self, id: &str) -> HubResult<bool> {
        validate_id(id)?;

        let mut state = lock(&self.state);
        let Some(idx) = state.position(id) else {
            debug!(task_id = %id, "Delete requested for unknown task");
            return Ok(false);
        };

        state.tasks.remove(idx);
        debug!(task_id = %id, tasks = state.tasks.len(), "Task deleted");
        state.emit(TaskEvent::Deleted(id.to_string()));
        Ok(true)
    }
}

/// Current time, clamped to be strictly after `previous`.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::model::TaskStatus;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn recording_store() -> (TaskStore, Arc<Mutex<Vec<TaskEvent>>>) {
        let store = TaskStore::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        (store, events)
    }

    #[test]
    fn test_create_assigns_unique_ids_and_equal_timestamps() {
        let store = TaskStore::new();
        let mut ids = HashSet::new();
        for i in 0..50 {
            let task = store.create(CreateTaskInput::new(format!("task {}", i))).unwrap();
            assert_eq!(task.created_at, task.updated_at);
            assert_eq!(task.status, TaskStatus::Todo);
            assert!(ids.insert(task.id));
        }
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn test_create_rejects_empty_title_without_event() {
        let (store, events) = recording_store();
        let err = store.create(CreateTaskInput::new("")).unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));
        assert!(store.is_empty());
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let store = TaskStore::new();
        let created = store
            .create(CreateTaskInput {
                title: "Write report".to_string(),
                description: Some("quarterly".to_string()),
                status: None,
            })
            .unwrap();

        let updated = store
            .update(UpdateTaskInput::new(&created.id).with_status(TaskStatus::Done))
            .unwrap();

        assert_eq!(updated.title, "Write report");
        assert_eq!(updated.description.as_deref(), Some("quarterly"));
        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
    }

    #[test]
    fn test_update_keeps_position() {
        let store = TaskStore::new();
        let a = store.create(CreateTaskInput::new("a")).unwrap();
        let b = store.create(CreateTaskInput::new("b")).unwrap();
        store.update(UpdateTaskInput::new(&a.id).with_title("a2")).unwrap();

        let titles: Vec<_> = store.list().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["a2", "b"]);
        assert_eq!(store.get(&b.id).unwrap().title, "b");
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let (store, events) = recording_store();
        let err = store
            .update(UpdateTaskInput::new("missing").with_status(TaskStatus::Done))
            .unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_update_with_empty_title_is_validation_error() {
        let store = TaskStore::new();
        let task = store.create(CreateTaskInput::new("x")).unwrap();
        let err = store.update(UpdateTaskInput::new(&task.id).with_title("")).unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));
        assert_eq!(store.get(&task.id).unwrap().title, "x");
    }

    #[test]
    fn test_delete_reports_whether_removed() {
        let (store, events) = recording_store();
        let task = store.create(CreateTaskInput::new("x")).unwrap();

        assert!(!store.delete("does-not-exist").unwrap());
        assert!(store.delete(&task.id).unwrap());
        assert!(!store.delete(&task.id).unwrap());
        assert!(matches!(store.delete(""), Err(HubError::Validation(_))));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], TaskEvent::Deleted(task.id.clone()));
    }

    #[test]
    fn test_events_follow_commit_order() {
        let (store, events) = recording_store();
        let task = store.create(CreateTaskInput::new("x")).unwrap();
        store.update(UpdateTaskInput::new(&task.id).with_status(TaskStatus::InProgress)).unwrap();
        store.delete(&task.id).unwrap();

        let kinds: Vec<_> = events
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                TaskEvent::Created(_) => "created",
                TaskEvent::Updated(_) => "updated",
                TaskEvent::Deleted(_) => "deleted",
            })
            .collect();
        assert_eq!(kinds, vec!["created", "updated", "deleted"]);
    }

    #[test]
    fn test_concurrent_creates_from_many_threads() {
        let store = Arc::new(TaskStore::new());
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.create(CreateTaskInput::new(format!("{}-{}", n, i))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ids: HashSet<_> = store.list().into_iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 200);
    }
}
