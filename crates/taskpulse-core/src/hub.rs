//! Session hub: connection lifecycle, presence and task event fan-out.
//!
//! The hub registers a single listener on the [`TaskStore`] when it is built.
//! That listener republishes every change to the session channel as it stands
//! at emission time, so a session that joins later never sees an older event
//! and a session that left never sees a newer one.

use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::channel::{BroadcastChannel, Subscription};
use crate::error::{HubError, HubResult};
use crate::lock;
use crate::presence::{PresenceRegistry, SessionId};
use crate::protocol::{ClientFrame, Reply, Request, Response, ServerEvent};
use crate::task::store::TaskStore;
use crate::task::TaskEvent;

/// Lifecycle of one connection.
///
/// Connecting happens entirely inside [`SessionHub::connect`], under the
/// transitions lock, so a [`Session`] handle always starts out `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Disconnected,
}

struct HubInner {
    store: Arc<TaskStore>,
    presence: PresenceRegistry,
    sessions: BroadcastChannel<ServerEvent>,
    /// Serializes connect/disconnect so a presence change and its announcement
    /// are never interleaved with another transition.
    transitions: Mutex<()>,
}

/// Shared entry point for all sessions. Cheap to clone.
#[derive(Clone)]
pub struct SessionHub {
    inner: Arc<HubInner>,
}

impl SessionHub {
    /// Build the hub for `store`. Create exactly one hub per store.
    pub fn new(store: Arc<TaskStore>) -> Self {
        let sessions = BroadcastChannel::new();
        let fanout = sessions.clone();
        store.subscribe(move |event: &TaskEvent| {
            let delivered = fanout.publish(ServerEvent::from(event.clone()));
            debug!(task_id = %event.task_id(), delivered, "Broadcast task event");
        });

        Self {
            inner: Arc::new(HubInner {
                store,
                presence: PresenceRegistry::new(),
                sessions,
                transitions: Mutex::new(()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.inner.store
    }

    /// Ids of all connected sessions.
    pub fn online_users(&self) -> Vec<SessionId> {
        self.inner.presence.snapshot()
    }

    pub fn session_count(&self) -> usize {
        self.inner.presence.count()
    }

    /// Establish a new session.
    ///
    /// The new session is registered first, then receives `onlineUsers`
    /// (which includes itself) as its first event, and every other session
    /// receives `userJoined`.
    pub fn connect(&self) -> Session {
        let id = SessionId::generate();

        let _guard = lock(&self.inner.transitions);
        // Announced even if the id were already present: each connection is its own event.
        self.inner.presence.join(id.clone());
        let online = self.inner.presence.snapshot();
        let subscription = self.inner.sessions.join_with(ServerEvent::OnlineUsers(online));
        let notified = self
            .inner
            .sessions
            .publish_except(subscription.id(), ServerEvent::UserJoined(id.clone()));

        info!(
            session_id = %id,
            sessions = self.inner.presence.count(),
            notified,
            "Session connected"
        );

        Session {
            id,
            subscription,
            hub: self.clone(),
            state: SessionState::Connected,
        }
    }

    fn release(&self, id: &SessionId, subscription: &mut Subscription<ServerEvent>) {
        let _guard = lock(&self.inner.transitions);
        subscription.leave();
        self.inner.presence.leave(id);
        let notified = self.inner.sessions.publish(ServerEvent::UserLeft(id.clone()));
        info!(
            session_id = %id,
            sessions = self.inner.presence.count(),
            notified,
            "Session disconnected"
        );
    }

    /// Execute one request against the store.
    ///
    /// Broadcasts triggered by a mutation are queued to every connected
    /// session before this returns.
    pub fn handle(&self, request: Request) -> HubResult<Response> {
        let store = &self.inner.store;
        match request {
            Request::GetTasks => Ok(Response::Tasks(store.list())),
            Request::CreateTask(input) => store.create(input).map(Response::Task),
            Request::UpdateTask(input) => store.update(input).map(Response::Task),
            Request::DeleteTask(input) => {
                input.validate()?;
                if store.delete(&input.id)? {
                    Ok(Response::Deleted(true))
                } else {
                    Err(HubError::not_found(input.id))
                }
            }
        }
    }

    /// Decode and execute a raw text frame from `session_id`.
    pub fn handle_text(&self, session_id: &SessionId, text: &str) -> Reply {
        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Rejected frame");
                return Reply::failure(None, &err);
            }
        };

        let result = frame.request().and_then(|request| {
            debug!(session_id = %session_id, event = request.name(), "Handling request");
            self.handle(request)
        });
        if let Err(err) = &result {
            warn!(
                session_id = %session_id,
                event = %frame.event,
                kind = err.kind(),
                error = %err,
                "Request failed"
            );
        }
        Reply::from_result(frame.id, result)
    }
}

/// One connected client.
///
/// Dropping the session disconnects it.
pub struct Session {
    id: SessionId,
    subscription: Subscription<ServerEvent>,
    hub: SessionHub,
    state: SessionState,
}

impl Session {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Wait for the next event addressed to this session.
    ///
    /// Returns `None` once the session is disconnected and its queue drained.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.subscription.recv().await
    }

    /// Take a queued event without waiting.
    pub fn try_next_event(&mut self) -> Option<ServerEvent> {
        self.subscription.try_recv()
    }

    /// Execute a request on behalf of this session.
    pub fn request(&self, request: Request) -> HubResult<Response> {
        self.hub.handle(request)
    }

    /// Move to `Disconnected`. Idempotent.
    pub fn disconnect(&mut self) {
        if self.state != SessionState::Connected {
            return;
        }
        self.hub.release(&self.id, &mut self.subscription);
        self.state = SessionState::Disconnected;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::model::{CreateTaskInput, DeleteTaskInput, TaskStatus, UpdateTaskInput};

    fn hub() -> SessionHub {
        SessionHub::new(Arc::new(TaskStore::new()))
    }

    fn drain(session: &mut Session) -> Vec<ServerEvent> {
        std::iter::from_fn(|| session.try_next_event()).collect()
    }

    #[test]
    fn test_presence_announcements() {
        let hub = hub();
        let mut a = hub.connect();
        assert_eq!(drain(&mut a), vec![ServerEvent::OnlineUsers(vec![a.id().clone()])]);

        let mut b = hub.connect();
        assert_eq!(b.state(), SessionState::Connected);
        assert_eq!(drain(&mut a), vec![ServerEvent::UserJoined(b.id().clone())]);

        let events = drain(&mut b);
        assert_eq!(events.len(), 1);
        let ServerEvent::OnlineUsers(online) = &events[0] else {
            panic!("expected onlineUsers, got {:?}", events[0]);
        };
        assert!(online.contains(a.id()));
        assert!(online.contains(b.id()));
        assert_eq!(online.len(), 2);
    }

    #[test]
    fn test_create_fans_out_to_every_session_once() {
        let hub = hub();
        let mut sessions: Vec<_> = (0..3).map(|_| hub.connect()).collect();
        for session in sessions.iter_mut() {
            drain(session);
        }

        let Response::Task(task) = sessions[0]
            .request(Request::CreateTask(CreateTaskInput::new("Buy milk")))
            .unwrap()
        else {
            panic!("expected a task");
        };

        for session in sessions.iter_mut() {
            assert_eq!(drain(session), vec![ServerEvent::TaskCreated(task.clone())]);
        }
    }

    #[test]
    fn test_failed_requests_do_not_broadcast() {
        let hub = hub();
        let mut a = hub.connect();
        let mut b = hub.connect();
        drain(&mut a);
        drain(&mut b);

        let err = a
            .request(Request::DeleteTask(DeleteTaskInput { id: "nope".into() }))
            .unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));

        let err = a
            .request(Request::UpdateTask(UpdateTaskInput::new("nope").with_status(TaskStatus::Done)))
            .unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));

        let err = a.request(Request::CreateTask(CreateTaskInput::new(""))).unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));

        assert!(drain(&mut a).is_empty());
        assert!(drain(&mut b).is_empty());
    }

    #[test]
    fn test_task_lifecycle_end_to_end() {
        let hub = hub();
        let mut a = hub.connect();
        drain(&mut a);

        let Response::Task(task) = a.request(Request::CreateTask(CreateTaskInput::new("Buy milk"))).unwrap() else {
            panic!("expected a task");
        };
        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.description, None);

        let update = UpdateTaskInput::new(&task.id).with_status(TaskStatus::InProgress);
        let Response::Task(updated) = a.request(Request::UpdateTask(update)).unwrap() else {
            panic!("expected a task");
        };
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.title, "Buy milk");

        let deleted = a
            .request(Request::DeleteTask(DeleteTaskInput { id: task.id.clone() }))
            .unwrap();
        assert_eq!(deleted, Response::Deleted(true));

        let Response::Tasks(tasks) = a.request(Request::GetTasks).unwrap() else {
            panic!("expected tasks");
        };
        assert!(tasks.iter().all(|t| t.id != task.id));

        assert_eq!(
            drain(&mut a),
            vec![
                ServerEvent::TaskCreated(task.clone()),
                ServerEvent::TaskUpdated(updated),
                ServerEvent::TaskDeleted(task.id.clone()),
            ]
        );
    }

    #[test]
    fn test_disconnect_announces_and_stops_delivery() {
        let hub = hub();
        let mut a = hub.connect();
        let mut b = hub.connect();
        drain(&mut a);
        drain(&mut b);

        let b_id = b.id().clone();
        b.disconnect();
        b.disconnect();
        assert_eq!(b.state(), SessionState::Disconnected);
        assert_eq!(hub.session_count(), 1);
        assert_eq!(drain(&mut a), vec![ServerEvent::UserLeft(b_id)]);

        hub.handle(Request::CreateTask(CreateTaskInput::new("late"))).unwrap();
        assert!(drain(&mut b).is_empty());
        assert_eq!(drain(&mut a).len(), 1);
    }

    #[test]
    fn test_dropping_a_session_disconnects_it() {
        let hub = hub();
        let mut a = hub.connect();
        let b = hub.connect();
        let b_id = b.id().clone();
        drain(&mut a);

        drop(b);
        assert_eq!(hub.online_users(), vec![a.id().clone()]);
        assert_eq!(drain(&mut a), vec![ServerEvent::UserLeft(b_id)]);
    }

    #[test]
    fn test_mutation_survives_initiator_disconnect() {
        let hub = hub();
        let mut a = hub.connect();
        let mut b = hub.connect();
        drain(&mut b);

        let request = Request::CreateTask(CreateTaskInput::new("keep me"));
        a.disconnect();
        hub.handle(request).unwrap();

        assert_eq!(hub.store().len(), 1);
        let events = drain(&mut b);
        assert!(matches!(events.last(), Some(ServerEvent::TaskCreated(t)) if t.title == "keep me"));
    }

    #[test]
    fn test_reconnect_gets_new_identity() {
        let hub = hub();
        let mut first = hub.connect();
        let first_id = first.id().clone();
        first.disconnect();
        let second = hub.connect();
        assert_ne!(second.id(), &first_id);
    }

    #[test]
    fn test_handle_text_replies() {
        let hub = hub();
        let session = hub.connect();

        let reply = hub.handle_text(session.id(), r#"{"id":1,"event":"createTask","data":{"title":"x"}}"#);
        assert!(reply.ok);
        assert_eq!(reply.id, Some(1));

        let reply = hub.handle_text(session.id(), r#"{"id":2,"event":"createTask","data":{"title":""}}"#);
        assert!(!reply.ok);
        assert_eq!(reply.error.unwrap().kind, "validation");

        let reply = hub.handle_text(session.id(), "{");
        assert_eq!(reply.error.unwrap().kind, "bad_request");
    }

    #[tokio::test]
    async fn test_concurrent_sessions_observe_same_order() {
        let hub = hub();
        let mut observers: Vec<_> = (0..3).map(|_| hub.connect()).collect();
        for observer in observers.iter_mut() {
            drain(observer);
        }

        let writers: Vec<_> = (0..4)
            .map(|n| {
                let hub = hub.clone();
                tokio::task::spawn_blocking(move || {
                    for i in 0..10 {
                        hub.handle(Request::CreateTask(CreateTaskInput::new(format!("{}-{}", n, i))))
                            .unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let sequences: Vec<Vec<ServerEvent>> = observers.iter_mut().map(drain).collect();
        assert_eq!(sequences[0].len(), 40);
        assert!(sequences.iter().all(|seq| seq == &sequences[0]));
    }
}
