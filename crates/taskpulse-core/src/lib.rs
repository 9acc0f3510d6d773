//! TaskPulse Core Library
//!
//! Domain models and the concurrency core for the real-time task board:
//! the task store, presence tracking, session fan-out and the ticker stream.

pub mod channel;
pub mod config;
pub mod error;
pub mod hub;
pub mod presence;
pub mod protocol;
pub mod task;
pub mod ticker;

pub use config::ServerConfig;
pub use error::{HubError, HubResult};
pub use hub::{Session, SessionHub, SessionState};
pub use task::store::TaskStore;
pub use ticker::{TickerCore, TickerHandle};

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Every critical section in this crate leaves its state consistent before
/// any call that could panic, so a poisoned lock is still safe to reuse.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
