use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use nf_core::{NfError, NfResult, NfValue, TaskHandle};
use tracing::debug;

use super::Runtime;
use crate::call_state;
use crate::context::ContextId;

pub type TaskCleanup = Box<dyn FnOnce() + Send + 'static>;
type TaskBody = Box<dyn FnOnce() -> NfResult<NfValue> + Send + 'static>;

/// Unit of asynchronous work waiting to be spawned: a body, the call id it
/// runs under, and a cleanup hook that runs once the body has finished.
pub struct Task {
    label: String,
    call_id: Option<String>,
    body: TaskBody,
    cleanup: Option<TaskCleanup>,
}

impl Task {
    pub fn of<F>(label: &str, body: F) -> Self
    where
        F: FnOnce() -> NfResult<NfValue> + Send + 'static,
    {
        Self {
            label: label.to_string(),
            call_id: None,
            body: Box::new(body),
            cleanup: None,
        }
    }

    pub fn with_call_id(mut self, call_id: String) -> Self {
        self.call_id = Some(call_id);
        self
    }

    pub fn with_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.cleanup = Some(Box::new(cleanup));
        self
    }
}

/// Runs the cleanup hook and releases the owner's pending slot exactly
/// once, on the normal path or when dropped during unwinding.
struct CompletionGuard {
    runtime: Runtime,
    owner: ContextId,
    counter: Arc<AtomicUsize>,
    cleanup: Option<TaskCleanup>,
    completed: bool,
}

impl CompletionGuard {
    fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
        self.runtime.complete_task(self.owner, &self.counter);
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.complete();
    }
}

type Worker = Box<dyn FnOnce() + Send + 'static>;

impl Runtime {
    /// Spawns `task` on its own worker thread and returns its handle at
    /// once. The owner's pending counter stays raised until the body and
    /// the cleanup hook have both run; failures surface through `join`.
    pub fn spawn_task(&self, owner: ContextId, task: Task) -> NfResult<TaskHandle> {
        self.spawn_with(owner, task, |builder, worker| builder.spawn(worker).map(|_| ()))
    }

    /// The cleanup hook belongs to the worker thread: it only runs there,
    /// so a thread that never starts leaves the caller's state alone.
    fn spawn_with<S>(&self, owner: ContextId, task: Task, spawn: S) -> NfResult<TaskHandle>
    where
        S: FnOnce(thread::Builder, Worker) -> io::Result<()>,
    {
        let counter = self.arena().get(owner)?.pending_tasks.clone();
        let handle = TaskHandle::new(task.label.clone());
        handle.mark_spawned()?;
        counter.fetch_add(1, Ordering::SeqCst);
        debug!(task = handle.id(), label = %task.label, context = %owner, "spawn task");

        let runtime = self.clone();
        let worker_counter = counter.clone();
        let worker = handle.clone();
        let Task {
            call_id,
            body,
            cleanup,
            ..
        } = task;
        let builder = thread::Builder::new().name(format!("nf-task-{}", handle.id()));
        let spawned = spawn(
            builder,
            Box::new(move || {
                let mut guard = CompletionGuard {
                    runtime,
                    owner,
                    counter: worker_counter,
                    cleanup,
                    completed: false,
                };
                worker.mark_running();
                let outcome = {
                    let _call_id = call_id.map(call_state::enter_call_id);
                    panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|_| {
                        Err(NfError::new(
                            "RUNTIME_TASK_FAILED",
                            format!("Task {} panicked.", worker.id()),
                        ))
                    })
                };
                guard.complete();
                debug!(task = worker.id(), ok = outcome.is_ok(), "task finished");
                worker.store_result(outcome);
            }),
        );

        match spawned {
            Ok(()) => Ok(handle),
            Err(error) => {
                self.complete_task(owner, &counter);
                Err(NfError::new(
                    "RUNTIME_TASK_SPAWN",
                    format!("Task {} could not start: {}", handle.id(), error),
                ))
            }
        }
    }

    /// Releases one pending slot of `owner` and tears down every context in
    /// its chain that was waiting for its tasks to finish.
    fn complete_task(&self, owner: ContextId, counter: &AtomicUsize) {
        let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
            Some(count.saturating_sub(1))
        });
        let mut arena = self.arena();
        for id in arena.ready_removals(owner) {
            if arena.contains(id) && arena.remove(id).is_ok() {
                debug!(context = %id, "deferred deregistration completed");
            }
        }
    }
}
