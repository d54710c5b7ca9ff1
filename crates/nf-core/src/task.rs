use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{NfError, NfResult};
use crate::value::NfValue;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Created,
    Spawned,
    Running,
    Completed,
    Failed,
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    outcome: Option<NfResult<NfValue>>,
}

#[derive(Debug)]
struct TaskShared {
    id: u64,
    label: String,
    state: Mutex<TaskState>,
    finished: Condvar,
}

/// Handle to a unit of asynchronous work. Clones observe the same task.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(TaskShared {
                id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
                label: label.into(),
                state: Mutex::new(TaskState {
                    status: TaskStatus::Created,
                    outcome: None,
                }),
                finished: Condvar::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn status(&self) -> TaskStatus {
        self.shared.state.lock().status
    }

    pub fn is_done(&self) -> bool {
        matches!(
            self.status(),
            TaskStatus::Completed | TaskStatus::Failed
        )
    }

    /// A task is spawned at most once.
    pub fn mark_spawned(&self) -> NfResult<()> {
        let mut state = self.shared.state.lock();
        if state.status != TaskStatus::Created {
            return Err(NfError::new(
                "RUNTIME_TASK_SPAWN",
                format!("Task {} has already been spawned.", self.shared.id),
            ));
        }
        state.status = TaskStatus::Spawned;
        Ok(())
    }

    pub fn mark_running(&self) {
        let mut state = self.shared.state.lock();
        if state.status == TaskStatus::Spawned {
            state.status = TaskStatus::Running;
        }
    }

    pub fn store_result(&self, outcome: NfResult<NfValue>) {
        let mut state = self.shared.state.lock();
        state.status = if outcome.is_ok() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        state.outcome = Some(outcome);
        self.shared.finished.notify_all();
    }

    /// Blocks until the task has published its outcome. Joining twice yields
    /// the same outcome.
    pub fn join(&self) -> NfResult<NfValue> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(outcome) = state.outcome.as_ref() {
                return outcome.clone();
            }
            self.shared.finished.wait(&mut state);
        }
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<task {}>", self.shared.id)
    }
}
