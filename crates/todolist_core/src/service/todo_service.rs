//! Todo use-case service.
//!
//! # Responsibility
//! - Provide the only entry points adapters call.
//! - Own identity generation and partial-update merge semantics.
//! - Own the backend handle for the service lifetime.
//!
//! # Invariants
//! - The backend is initialized before the service is handed out.
//! - Ids are generated here, once, and never regenerated.
//! - Not-found is `None`/`false`, never an error.
//! - `update_task`/`toggle_task` read then write without locking; two
//!   concurrent writers to the same id resolve as last-write-wins.

use crate::backend::{open_backend, BackendResult, TodoBackend};
use crate::config::BackendConfig;
use crate::model::todo::TodoItem;
use log::{debug, info};
use uuid::Uuid;

/// Partial update; `None` fields keep their stored value.
///
/// Any present field, even an unchanged one, still refreshes `updated_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

impl TaskUpdate {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.completed.is_none()
    }

    fn apply(self, item: &mut TodoItem) {
        if let Some(title) = self.title {
            item.title = title;
        }
        if let Some(completed) = self.completed {
            item.completed = completed;
        }
    }
}

/// Service bound to exactly one backend.
pub struct TodoService<B: TodoBackend> {
    backend: B,
}

impl<B: TodoBackend> TodoService<B> {
    /// Binds `backend` and initializes it.
    ///
    /// # Errors
    /// - Propagates backend setup failures (I/O, remote faults).
    pub fn new(mut backend: B) -> BackendResult<Self> {
        backend.initialize()?;
        info!(
            "event=service_init module=service status=ok backend={}",
            backend.kind().as_str()
        );
        Ok(Self { backend })
    }

    /// Creates a task with a fresh id and current timestamps.
    pub fn add_task(&self, title: impl Into<String>, completed: bool) -> BackendResult<TodoItem> {
        let item = TodoItem::new(Uuid::new_v4().to_string(), title, completed);
        let item = self.backend.add(item)?;
        debug!("event=task_add module=service status=ok");
        Ok(item)
    }

    pub fn get_task(&self, id: &str) -> BackendResult<Option<TodoItem>> {
        self.backend.get(id)
    }

    /// Returns every task in backend order.
    pub fn get_all_tasks(&self) -> BackendResult<Vec<TodoItem>> {
        self.backend.get_all()
    }

    /// Applies a partial update to the stored task.
    ///
    /// Returns `None` when the task does not exist.
    pub fn update_task(&self, id: &str, update: TaskUpdate) -> BackendResult<Option<TodoItem>> {
        let Some(mut item) = self.backend.get(id)? else {
            return Ok(None);
        };

        update.apply(&mut item);
        self.backend.update(item)
    }

    /// Flips `completed` on the stored task.
    ///
    /// Returns `None` when the task does not exist.
    pub fn toggle_task(&self, id: &str) -> BackendResult<Option<TodoItem>> {
        let Some(mut item) = self.backend.get(id)? else {
            return Ok(None);
        };

        item.completed = !item.completed;
        self.backend.update(item)
    }

    /// Returns whether a task was removed.
    pub fn delete_task(&self, id: &str) -> BackendResult<bool> {
        self.backend.delete(id)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Releases the backend handle to the caller.
    pub fn into_backend(self) -> B {
        self.backend
    }
}

/// Builds and initializes the service for `config`.
///
/// # Errors
/// - `BackendError::Config` for incomplete settings.
/// - Backend setup failures.
pub fn open_service(config: &BackendConfig) -> BackendResult<TodoService<Box<dyn TodoBackend>>> {
    let backend = open_backend(config)?;
    TodoService::new(backend)
}
